/* src/build/core/src/lib.rs */

pub mod assets;
pub mod bundler;
pub mod config;
pub mod context;
pub mod dev;
pub mod error;
pub mod hash;
pub mod orchestrator;
pub mod plugin;
pub mod reference;
pub mod route;
pub mod scan;
pub mod virtual_module;

pub use bundler::{BundleOutput, BundleRequest, Bundler};
pub use config::{BuildConfig, BuildMode, Environment, RuntimeModules};
pub use context::BuildContext;
pub use error::{BuildError, Result};
pub use orchestrator::{BuildReport, EnvBuildCounts, Orchestrator};
pub use plugin::{PluginHost, TransformOutput};
pub use scan::Boundary;
