use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Settings {
    /// Program used to invoke DISM.
    pub dism_path: PathBuf,
    /// Where `ops.log` and the rolling diagnostic log go. No file logging when unset.
    pub log_dir: Option<PathBuf>,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dism_path: PathBuf::from("dism"),
            log_dir: None,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply command-line overrides on top of loaded settings.
    pub fn with_overrides(mut self, dism_path: Option<PathBuf>, log_dir: Option<PathBuf>) -> Self {
        if let Some(dism_path) = dism_path {
            self.dism_path = dism_path;
        }
        if log_dir.is_some() {
            self.log_dir = log_dir;
        }
        self
    }

    pub fn paths(&self) -> Option<AppPaths> {
        self.log_dir.clone().map(AppPaths::new)
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ops_log_path(&self) -> PathBuf {
        self.root.join("ops.log")
    }

    /// File name prefix for the daily diagnostic log.
    pub fn trace_log_prefix(&self) -> &'static str {
        "dism-kit.log"
    }

    /// Ensure the log directory exists.
    pub fn ensure_layout(&self) -> Result<()> {
        fs::create_dir_all(self.root())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dism-kit-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = scratch("partial");
        let path = dir.join("settings.json");
        fs::write(&path, r#"{ "log_filter": "debug" }"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.log_filter, "debug");
        assert_eq!(settings.dism_path, PathBuf::from("dism"));
        assert_eq!(settings.log_dir, None);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn bad_json_is_an_error() {
        let dir = scratch("bad");
        let path = dir.join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Settings::load(&path), Err(AppError::Serde(_))));
        assert!(matches!(
            Settings::load(dir.join("missing.json")),
            Err(AppError::Io(_))
        ));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn overrides_win() {
        let settings = Settings::default().with_overrides(
            Some(PathBuf::from("C:\\Windows\\System32\\Dism.exe")),
            Some(PathBuf::from("logs")),
        );
        assert_eq!(settings.dism_path, PathBuf::from("C:\\Windows\\System32\\Dism.exe"));
        let paths = settings.paths().unwrap();
        assert_eq!(paths.ops_log_path(), PathBuf::from("logs").join("ops.log"));

        let kept = settings.clone().with_overrides(None, None);
        assert_eq!(kept, settings);
    }
}
