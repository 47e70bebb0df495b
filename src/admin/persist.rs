//! JSON-file config persistence
//!
//! The config file holds the durable registry state: the streampoint list
//! and the user map. It is read once at startup and rewritten after every
//! successful admin mutation. Keys the relay does not know about are
//! preserved across rewrites.
//!
//! ```json
//! {
//!     "streampoints": ["radio1"],
//!     "users": {
//!         "alice": { "password": "secret", "allowed_streampoints": ["radio1"] }
//!     }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::registry::{ConfigPersist, UserInfo, UserRecord};

/// One user in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEntry {
    pub password: String,
    #[serde(default)]
    pub allowed_streampoints: Vec<String>,
}

/// On-disk document shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub streampoints: Vec<String>,
    #[serde(default)]
    pub users: BTreeMap<String, UserEntry>,
    /// Unknown keys, carried through rewrites untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConfigDocument {
    /// Split into the shapes the registry is seeded with
    pub fn into_seed(self) -> (Vec<String>, HashMap<String, UserRecord>) {
        let users = self
            .users
            .into_iter()
            .map(|(login, entry)| {
                (
                    login,
                    UserRecord {
                        password: entry.password,
                        allowed_streampoints: entry.allowed_streampoints,
                    },
                )
            })
            .collect();
        (self.streampoints, users)
    }
}

/// File-backed implementation of the persistence collaborator
pub struct JsonConfigStore {
    path: PathBuf,
    /// Unknown top-level keys captured at load time
    extra: Mutex<serde_json::Map<String, serde_json::Value>>,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            extra: Mutex::new(serde_json::Map::new()),
        }
    }

    /// Read and parse the config file
    pub fn load(&self) -> Result<ConfigDocument> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let doc: ConfigDocument = serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("failed to parse {}: {}", self.path.display(), e))
        })?;
        *self.extra.lock().unwrap() = doc.extra.clone();
        Ok(doc)
    }
}

impl ConfigPersist for JsonConfigStore {
    fn persist(&self, streampoints: &[String], users: &[UserInfo]) -> std::io::Result<()> {
        let doc = ConfigDocument {
            streampoints: streampoints.to_vec(),
            users: users
                .iter()
                .map(|u| {
                    (
                        u.login.clone(),
                        UserEntry {
                            password: u.password.clone(),
                            allowed_streampoints: u.allowed_streampoints.clone(),
                        },
                    )
                })
                .collect(),
            extra: self.extra.lock().unwrap().clone(),
        };
        let raw = serde_json::to_string_pretty(&doc)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.path, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(raw: &str) -> (tempfile::TempDir, JsonConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app_settings.json");
        std::fs::write(&path, raw).unwrap();
        (dir, JsonConfigStore::new(path))
    }

    #[test]
    fn test_load_and_seed() {
        let (_dir, store) = write_config(
            r#"{
                "streampoints": ["radio1", "radio2"],
                "users": {
                    "alice": {"password": "secret", "allowed_streampoints": ["radio1"]},
                    "bob": {"password": "pw"}
                }
            }"#,
        );

        let (streampoints, users) = store.load().unwrap().into_seed();
        assert_eq!(streampoints, vec!["radio1", "radio2"]);
        assert_eq!(users.len(), 2);
        assert_eq!(users["alice"].allowed_streampoints, vec!["radio1"]);
        assert!(users["bob"].allowed_streampoints.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path().join("missing.json"));
        assert!(matches!(store.load(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_malformed_file() {
        let (_dir, store) = write_config("not json at all");
        assert!(matches!(store.load(), Err(Error::Config(_))));
    }

    #[test]
    fn test_persist_round_trip() {
        let (_dir, store) = write_config(r#"{"streampoints": [], "users": {}}"#);
        store.load().unwrap();

        let users = vec![UserInfo {
            login: "alice".to_string(),
            password: "secret".to_string(),
            allowed_streampoints: vec!["radio1".to_string()],
        }];
        store
            .persist(&["radio1".to_string()], &users)
            .unwrap();

        let (streampoints, loaded) = store.load().unwrap().into_seed();
        assert_eq!(streampoints, vec!["radio1"]);
        assert_eq!(loaded["alice"].password, "secret");
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let (_dir, store) = write_config(
            r#"{"streampoints": [], "users": {}, "log_level": "debug"}"#,
        );
        store.load().unwrap();
        store.persist(&[], &[]).unwrap();

        let doc = store.load().unwrap();
        assert_eq!(
            doc.extra.get("log_level"),
            Some(&serde_json::Value::String("debug".to_string()))
        );
    }
}
