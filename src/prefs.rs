use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const FILE_NAME: &str = ".autoclicker_config.json";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default, rename = "ignore_tos_warnings")]
    pub suppress_legal_warning: bool,
}

pub trait PrefsStore: Send {
    fn load(&self) -> Preferences;
    fn save(&self, prefs: &Preferences) -> std::io::Result<()>;
}

/// Preferences kept as one JSON object, by default in the home directory.
#[derive(Debug, Clone)]
pub struct FilePrefsStore {
    path: PathBuf,
}

impl FilePrefsStore {
    pub fn new() -> Self {
        let path = match BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(FILE_NAME),
            None => PathBuf::from(FILE_NAME),
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self { path: p.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl Default for FilePrefsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PrefsStore for FilePrefsStore {
    fn load(&self) -> Preferences {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), "ignoring malformed preferences: {e}");
                Preferences::default()
            }),
            Err(_) => Preferences::default(),
        }
    }

    fn save(&self, prefs: &Preferences) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() { fs::create_dir_all(parent)?; }
        }
        let data = serde_json::to_vec(prefs)?;
        fs::write(&self.path, data)
    }
}
