//! Host platform utility functions

use std::path::PathBuf;

/// Name of the environment variable pointing at the software root directory.
pub const SW_ROOT_ENV_VAR: &str = "STRIDER_SW_ROOT";

/// Get the root directory of the software installation.
///
/// This is read from the `STRIDER_SW_ROOT` environment variable, which must
/// be set before any parameter files or sessions can be used.
pub fn get_strider_sw_root() -> Result<PathBuf, std::env::VarError> {
    let root = std::env::var(SW_ROOT_ENV_VAR)?;
    Ok(PathBuf::from(root))
}
