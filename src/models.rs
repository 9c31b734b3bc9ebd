use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{VaultError, VaultResult};

/// One saved SSH connection profile.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(default)]
    pub label: String,
    pub user: String,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn new(label: String, user: String, host: String, port: u16, password: String) -> Self {
        Self {
            label,
            user,
            host,
            port,
            password,
            created_at: Utc::now(),
        }
    }

    /// `user@host:port`
    pub fn destination(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }

    pub fn validate(&self) -> VaultResult<()> {
        if self.label.trim().is_empty() {
            return Err(VaultError::InvalidEntry("label must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(VaultError::InvalidEntry("port must be between 1 and 65535".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("label", &self.label)
            .field("user", &self.user)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// Parses interactive port input, accepting 1-65535.
pub fn parse_port(input: &str) -> VaultResult<u16> {
    match input.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(VaultError::InvalidEntry(format!(
            "port must be between 1 and 65535, got '{}'",
            input.trim()
        ))),
    }
}

/// Decrypted vault contents. Lives only between a load and the next save.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub entries: BTreeMap<String, Entry>,
}

impl VaultSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(bytes: &[u8]) -> VaultResult<Self> {
        let mut snapshot: VaultSnapshot = serde_json::from_slice(bytes)?;
        // The map key is authoritative for the label.
        for (label, entry) in snapshot.entries.iter_mut() {
            if entry.label != *label {
                entry.label = label.clone();
            }
        }
        Ok(snapshot)
    }

    pub fn to_json(&self) -> VaultResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn insert(&mut self, entry: Entry) -> VaultResult<()> {
        if self.entries.contains_key(&entry.label) {
            return Err(VaultError::DuplicateLabel(entry.label.clone()));
        }
        self.entries.insert(entry.label.clone(), entry);
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Entry> {
        self.entries.get(label)
    }

    pub fn remove(&mut self, label: &str) -> bool {
        self.entries.remove(label).is_some()
    }

    /// Merges `other` into `self`; entries from `other` win on label conflicts.
    pub fn merge(&mut self, other: VaultSnapshot) -> usize {
        let merged = other.entries.len();
        self.entries.extend(other.entries);
        merged
    }

    /// Entries ordered by label.
    pub fn list(&self) -> Vec<Entry> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
