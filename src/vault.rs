use std::fs;
use std::io::{ErrorKind, Write};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::crypto;
use crate::error::{VaultError, VaultResult};
use crate::models::{Entry, VaultSnapshot};

/// Handle to the single encrypted vault file.
///
/// Every operation runs load-decrypt-(mutate-encrypt-save) while holding the
/// handle's lock, so commands sharing one handle never interleave. Nothing
/// guards against a second process writing the same file.
pub struct VaultHandle {
    path: PathBuf,
    lock: Mutex<()>,
}

impl VaultHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn init(&self, password: &str) -> VaultResult<()> {
        let _guard = self.guard();

        if self.exists() {
            return Err(VaultError::AlreadyExists);
        }
        if let Some(dir) = self.path.parent() {
            ensure_private_dir(dir)?;
        }

        self.save(password, &VaultSnapshot::new())?;
        info!(path = %self.path.display(), "vault initialized");
        Ok(())
    }

    pub fn load(&self, password: &str) -> VaultResult<VaultSnapshot> {
        let _guard = self.guard();
        self.read(password)
    }

    /// Checks that `password` opens the vault.
    pub fn verify(&self, password: &str) -> VaultResult<()> {
        self.load(password).map(|_| ())
    }

    pub fn add(&self, password: &str, entry: Entry) -> VaultResult<()> {
        entry.validate()?;
        let _guard = self.guard();

        let mut snapshot = self.read(password)?;
        let label = entry.label.clone();
        snapshot.insert(entry)?;
        self.save(password, &snapshot)?;
        info!(%label, "entry added");
        Ok(())
    }

    pub fn get(&self, password: &str, label: &str) -> VaultResult<Entry> {
        let _guard = self.guard();

        let snapshot = self.read(password)?;
        snapshot
            .get(label)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(label.to_string()))
    }

    /// All entries, sorted by label.
    pub fn list(&self, password: &str) -> VaultResult<Vec<Entry>> {
        let _guard = self.guard();
        Ok(self.read(password)?.list())
    }

    /// Removes `label` if present. Returns whether an entry was removed.
    pub fn delete(&self, password: &str, label: &str) -> VaultResult<bool> {
        let _guard = self.guard();

        let mut snapshot = self.read(password)?;
        let removed = snapshot.remove(label);
        self.save(password, &snapshot)?;
        info!(%label, removed, "entry deleted");
        Ok(removed)
    }

    /// Re-encrypts the vault under `new_password`. Nothing is written unless
    /// `old_password` opens the current file.
    pub fn rotate_master_password(&self, old_password: &str, new_password: &str) -> VaultResult<()> {
        let _guard = self.guard();

        let snapshot = self.read(old_password)?;
        self.save(new_password, &snapshot)?;
        info!("master password rotated");
        Ok(())
    }

    /// Merges entries from another vault blob, encrypted under `import_password`.
    /// Imported entries replace existing ones with the same label.
    pub fn import_merge(
        &self,
        master_password: &str,
        import_password: &str,
        blob: &[u8],
    ) -> VaultResult<usize> {
        let _guard = self.guard();

        let mut snapshot = self.read(master_password)?;
        let plain = crypto::decrypt_bytes(import_password.as_bytes(), blob)?;
        let imported = VaultSnapshot::from_json(&plain)?;
        let merged = snapshot.merge(imported);

        self.save(master_password, &snapshot)?;
        info!(merged, "entries imported");
        Ok(merged)
    }

    pub fn import_file(
        &self,
        master_password: &str,
        import_password: &str,
        file: &Path,
    ) -> VaultResult<usize> {
        let blob = fs::read(file)?;
        self.import_merge(master_password, import_password, &blob)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The lock protects no data, so a poisoned lock is still usable.
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self, password: &str) -> VaultResult<VaultSnapshot> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(VaultError::NotInitialized),
            Err(err) => return Err(err.into()),
        };
        let plain = crypto::decrypt_bytes(password.as_bytes(), &bytes)?;
        let snapshot = VaultSnapshot::from_json(&plain)?;
        debug!(entries = snapshot.len(), "vault loaded");
        Ok(snapshot)
    }

    /// Writes the snapshot to a temp file beside the vault and renames it into
    /// place, so a failure leaves the previous file intact.
    fn save(&self, password: &str, snapshot: &VaultSnapshot) -> VaultResult<()> {
        let plain = zeroize::Zeroizing::new(snapshot.to_json()?);
        let blob = crypto::encrypt(password.as_bytes(), &plain)?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;

        #[cfg(unix)]
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;

        file.write_all(&blob.to_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|err| VaultError::Io(err.error))?;

        debug!(path = %self.path.display(), "vault saved");
        Ok(())
    }
}

fn ensure_private_dir(dir: &Path) -> VaultResult<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;

    #[cfg(unix)]
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;

    Ok(())
}
