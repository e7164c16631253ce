//! Persisted IME enablement and security mode.
//!
//! A deliberately small key/value store: one JSON document holding the
//! enabled-IME list and the security mode. Saves are atomic (write `.tmp`,
//! then rename) so a crash mid-save never leaves a torn file behind.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("settings store unavailable")]
    Unavailable,
}

/// How much of the IME surface is allowed for the focused field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// Restricted surface, e.g. for password fields.
    #[default]
    Basic,
    Full,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsData {
    enabled_imes: Vec<String>,
    security_mode: SecurityMode,
}

/// File-backed store for the enabled-IME list and security mode.
pub struct SettingsRepo {
    path: PathBuf,
    data: Mutex<SettingsData>,
}

impl SettingsRepo {
    /// Open the store at `path`. A missing file yields defaults.
    pub fn open(path: &Path) -> Result<Self, SettingsError> {
        let data = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => SettingsData::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        })
    }

    /// Atomic write: write to .tmp then rename.
    pub fn save(&self) -> Result<(), SettingsError> {
        let bytes = {
            let data = self.data.lock().map_err(|_| SettingsError::Unavailable)?;
            serde_json::to_vec_pretty(&*data)?
        };
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn enabled_imes(&self) -> Vec<String> {
        self.data
            .lock()
            .map(|d| d.enabled_imes.clone())
            .unwrap_or_default()
    }

    pub fn is_enabled(&self, ime: &str) -> bool {
        self.data
            .lock()
            .map(|d| d.enabled_imes.iter().any(|e| e == ime))
            .unwrap_or(false)
    }

    /// Enable or disable an IME and persist the change.
    pub fn set_enabled(&self, ime: &str, enabled: bool) -> Result<(), SettingsError> {
        {
            let mut data = self.data.lock().map_err(|_| SettingsError::Unavailable)?;
            let present = data.enabled_imes.iter().position(|e| e == ime);
            match (present, enabled) {
                (None, true) => data.enabled_imes.push(ime.to_string()),
                (Some(pos), false) => {
                    data.enabled_imes.remove(pos);
                }
                _ => return Ok(()), // already in the requested state
            }
        }
        self.save()
    }

    pub fn security_mode(&self) -> SecurityMode {
        self.data
            .lock()
            .map(|d| d.security_mode)
            .unwrap_or_default()
    }

    pub fn set_security_mode(&self, mode: SecurityMode) -> Result<(), SettingsError> {
        {
            let mut data = self.data.lock().map_err(|_| SettingsError::Unavailable)?;
            if data.security_mode == mode {
                return Ok(());
            }
            data.security_mode = mode;
        }
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_in(dir: &tempfile::TempDir) -> SettingsRepo {
        SettingsRepo::open(&dir.path().join("settings.json")).unwrap()
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);
        assert!(repo.enabled_imes().is_empty());
        assert_eq!(repo.security_mode(), SecurityMode::Basic);
    }

    #[test]
    fn test_enable_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let repo = SettingsRepo::open(&path).unwrap();
        repo.set_enabled("com.example.kana", true).unwrap();
        repo.set_security_mode(SecurityMode::Full).unwrap();

        let reopened = SettingsRepo::open(&path).unwrap();
        assert!(reopened.is_enabled("com.example.kana"));
        assert_eq!(reopened.security_mode(), SecurityMode::Full);
    }

    #[test]
    fn test_enable_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);
        repo.set_enabled("a", true).unwrap();
        repo.set_enabled("a", true).unwrap();
        assert_eq!(repo.enabled_imes(), vec!["a".to_string()]);

        repo.set_enabled("a", false).unwrap();
        repo.set_enabled("a", false).unwrap();
        assert!(repo.enabled_imes().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            SettingsRepo::open(&path),
            Err(SettingsError::Json(_))
        ));
    }
}
