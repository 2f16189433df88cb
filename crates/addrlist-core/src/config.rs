//! Configuration file loading.
//!
//! ```json
//! {
//!   "store": "~/.local/share/addrlist/addresses.csv",
//!   "accounts": [
//!     { "name": "work", "source": "maildir://~/Mail/work", "folder": "Sent" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One mail account to scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account name, used in logs.
    pub name: String,
    /// Source URI, e.g. `maildir://~/Mail`.
    pub source: String,
    /// Folder to scan. Accounts without one are skipped.
    #[serde(default)]
    pub folder: Option<String>,
    /// Extra backend settings, passed through with `Configure`.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Path of the address store.
    pub store: PathBuf,
    /// Accounts to scan.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl Config {
    /// Default configuration file location.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no configuration directory.
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("addrlist").join("config.json"))
            .ok_or_else(|| Error::Config("no configuration directory on this platform".into()))
    }

    /// Loads and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "reading configuration");
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid JSON or fails validation.
    pub fn from_json(contents: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(contents)?;
        config.store = expand_home(&config.store.to_string_lossy());

        if config.store.as_os_str().is_empty() {
            return Err(Error::Config("store path is empty".into()));
        }
        for account in &config.accounts {
            if account.name.trim().is_empty() {
                return Err(Error::Config("account with empty name".into()));
            }
        }
        Ok(config)
    }

    /// Accounts that name a folder to scan, paired with that folder.
    ///
    /// Accounts without a folder are logged and left out.
    pub fn scannable_accounts(&self) -> impl Iterator<Item = (&AccountConfig, &str)> {
        self.accounts.iter().filter_map(|account| {
            match account.folder.as_deref().filter(|f| !f.is_empty()) {
                Some(folder) => {
                    tracing::info!(account = %account.name, folder, "will scan folder");
                    Some((account, folder))
                }
                None => {
                    tracing::info!(account = %account.name, "no folder configured, skipping");
                    None
                }
            }
        })
    }
}

/// Expands a leading `~` to the home directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = Config::from_json(
            r#"{
                "store": "/tmp/addresses.csv",
                "accounts": [
                    {"name": "work", "source": "maildir:///srv/mail/work", "folder": "Sent",
                     "settings": {"readonly": "true"}},
                    {"name": "home", "source": "maildir:///srv/mail/home"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.store, PathBuf::from("/tmp/addresses.csv"));
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts[0].settings["readonly"], "true");
        assert_eq!(config.accounts[1].folder, None);

        let scannable: Vec<_> = config
            .scannable_accounts()
            .map(|(account, folder)| (account.name.as_str(), folder))
            .collect();
        assert_eq!(scannable, vec![("work", "Sent")]);
    }

    #[test]
    fn test_missing_store_is_error() {
        let err = Config::from_json(r#"{"accounts": []}"#).unwrap_err();
        assert!(matches!(err, Error::Serde(_)));
    }

    #[test]
    fn test_empty_account_name_is_error() {
        let err = Config::from_json(
            r#"{"store": "/tmp/a.csv", "accounts": [{"name": " ", "source": "maildir:///x"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("config.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("rel/~/path"), PathBuf::from("rel/~/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/Mail"), home.join("Mail"));
            assert_eq!(expand_home("~"), home);
        }
    }
}
