use std::fmt;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::crypto::HEADER_LEN;

/// What can be learned about the vault file without the master password.
#[derive(Debug, Clone)]
pub struct VaultReport {
    pub path: PathBuf,
    pub exists: bool,
    pub size: Option<u64>,
    pub mode: Option<u32>,
    pub modified: Option<SystemTime>,
    pub readable: bool,
}

impl VaultReport {
    /// True when the file is long enough to hold salt, nonce and a ciphertext.
    pub fn well_formed(&self) -> bool {
        self.size.map_or(false, |size| size > HEADER_LEN as u64)
    }

    /// True when group and others have no access.
    pub fn owner_only(&self) -> Option<bool> {
        self.mode.map(|mode| mode & 0o077 == 0)
    }
}

pub fn inspect(path: &Path) -> VaultReport {
    let metadata = fs::metadata(path).ok();

    #[cfg(unix)]
    let mode = metadata.as_ref().map(|m| m.permissions().mode() & 0o777);
    #[cfg(not(unix))]
    let mode = None;

    VaultReport {
        path: path.to_path_buf(),
        exists: metadata.is_some(),
        size: metadata.as_ref().map(|m| m.len()),
        mode,
        modified: metadata.as_ref().and_then(|m| m.modified().ok()),
        readable: fs::File::open(path).is_ok(),
    }
}

impl fmt::Display for VaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Vault Debug Information")?;
        writeln!(f, "=======================")?;
        writeln!(f, "Vault path: {}", self.path.display())?;
        writeln!(f, "Vault exists: {}", self.exists)?;
        if !self.exists {
            return Ok(());
        }
        if let Some(size) = self.size {
            writeln!(f, "File size: {} bytes", size)?;
        }
        if let Some(mode) = self.mode {
            let note = if self.owner_only() == Some(true) { "" } else { " (accessible by others!)" };
            writeln!(f, "Permissions: {:o}{}", mode, note)?;
        }
        if let Some(modified) = self.modified {
            let local: DateTime<Local> = modified.into();
            writeln!(f, "Modified: {}", local.format("%Y-%m-%d %H:%M:%S"))?;
        }
        writeln!(f, "File readable: {}", if self.readable { "yes" } else { "no" })?;
        write!(f, "Blob layout: {}", if self.well_formed() { "ok" } else { "truncated" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::VaultHandle;
    use tempfile::TempDir;

    #[test]
    fn missing_vault_report() {
        let dir = TempDir::new().unwrap();
        let report = inspect(&dir.path().join("store.enc"));
        assert!(!report.exists);
        assert!(!report.well_formed());
        assert!(report.to_string().contains("Vault exists: false"));
    }

    #[test]
    fn initialized_vault_report() {
        let dir = TempDir::new().unwrap();
        let vault = VaultHandle::new(dir.path().join("store.enc"));
        vault.init("pw").unwrap();

        let report = inspect(vault.path());
        assert!(report.exists);
        assert!(report.readable);
        assert!(report.well_formed());
        #[cfg(unix)]
        assert_eq!(report.owner_only(), Some(true));
    }

    #[test]
    fn truncated_file_is_flagged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.enc");
        fs::write(&path, [1u8; 8]).unwrap();

        let report = inspect(&path);
        assert!(!report.well_formed());
        assert!(report.to_string().contains("Blob layout: truncated"));
    }
}
