/* src/cli/core/src/config/tests/mod.rs */

mod parsing;

use super::*;
