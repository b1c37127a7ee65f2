//! Copies the running executable into the per-user Windows startup folder.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

const STARTUP_SUBDIR: &str = r"Microsoft\Windows\Start Menu\Programs\Startup";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("No per-user startup folder on this system (APPDATA is not set)")]
    NoStartupFolder,
    #[error("Executable path has no file name: {0}")]
    BadExecutable(PathBuf),
    #[error("Failed to add to startup: {0}")]
    Io(#[from] io::Error),
}

/// `%APPDATA%\Microsoft\Windows\Start Menu\Programs\Startup`, if `APPDATA` is set.
pub fn startup_folder() -> Option<PathBuf> {
    env::var_os("APPDATA").map(|appdata| PathBuf::from(appdata).join(STARTUP_SUBDIR))
}

/// Copies `exe` into the startup folder and returns where it landed.
pub fn install(exe: &Path) -> Result<PathBuf, StartupError> {
    let folder = startup_folder().ok_or(StartupError::NoStartupFolder)?;
    install_into(&folder, exe)
}

pub fn install_into(folder: &Path, exe: &Path) -> Result<PathBuf, StartupError> {
    let name = exe.file_name().ok_or_else(|| StartupError::BadExecutable(exe.to_path_buf()))?;
    fs::create_dir_all(folder)?;
    let target = folder.join(name);
    fs::copy(exe, &target)?;
    tracing::info!(target = %target.display(), "added to startup folder");
    Ok(target)
}
