//! Prerequisite tool checks

use crate::error::{RunnerError, RunnerResult};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Tools the WasmEdge installer script needs
pub const REQUIRED_TOOLS: &[&str] = &["bash", "curl", "git"];

/// Find an executable in the directories of a PATH-style value
pub fn find_in_path(tool: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

/// Find an executable on the current PATH
pub fn which(tool: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    find_in_path(tool, &path_var)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

/// Fail with the full list of missing tools
pub fn check_tools(tools: &[&str]) -> RunnerResult<()> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    check_tools_in(tools, &path_var)
}

pub fn check_tools_in(tools: &[&str], path_var: &OsStr) -> RunnerResult<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|tool| find_in_path(tool, path_var).is_none())
        .map(|tool| tool.to_string())
        .collect();

    if missing.is_empty() {
        tracing::debug!(tools = ?tools, "All required tools found");
        Ok(())
    } else {
        Err(RunnerError::MissingTools(missing))
    }
}
