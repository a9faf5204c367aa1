/* src/cli/core/src/config/mod.rs */

mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use loader::{CONFIG_FILE, find_tandem_config, load_tandem_config};
pub use types::TandemConfig;
