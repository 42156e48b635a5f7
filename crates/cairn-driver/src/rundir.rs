//! Run-directory setup.

use std::env;
use std::fs;
use std::path::Path;

use cairn_core::SetupError;

/// Create the run directory if needed and make it the working
/// directory. An empty path is a no-op (run in place).
///
/// Called before the evolution loop; a failure here aborts the run
/// before any cycle executes.
///
/// # Errors
///
/// [`SetupError::RunDir`] when the directory cannot be created or
/// entered.
pub fn prepare_run_dir(dir: &str) -> Result<(), SetupError> {
    if dir.is_empty() {
        return Ok(());
    }
    let path = Path::new(dir);
    fs::create_dir_all(path).map_err(|source| SetupError::RunDir {
        path: dir.to_string(),
        source,
    })?;
    env::set_current_dir(path).map_err(|source| SetupError::RunDir {
        path: dir.to_string(),
        source,
    })
}
