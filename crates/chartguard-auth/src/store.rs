//! Credential store: the single on-disk credential record
//!
//! Writes are atomic: the record is written to a hidden temp file in the same
//! directory, fsynced, then renamed over the target. A reader sees either the
//! previous record or the new one, never a torn write.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use secrecy::SecretString;

use chartguard_core::ChartguardConfig;
use chartguard_crypto::{derive_kek, generate_dek, generate_salt, wrap_dek, Dek, KdfParams};

use crate::error::{AuthError, AuthResult};
use crate::record::CredentialRecord;
use crate::validate_registration;

/// Owns the path of the credential record and the KDF cost used for
/// records it writes.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    kdf_params: KdfParams,
}

impl CredentialStore {
    /// `kdf_params` apply to records written from now on (registration and
    /// password change); loaded records always keep their own.
    pub fn new(path: impl Into<PathBuf>, kdf_params: KdfParams) -> AuthResult<Self> {
        kdf_params.validate()?;
        Ok(Self {
            path: path.into(),
            kdf_params,
        })
    }

    pub fn from_config(config: &ChartguardConfig) -> AuthResult<Self> {
        let params = KdfParams {
            memory_kib: config.kdf.memory_kib,
            iterations: config.kdf.iterations,
            parallelism: config.kdf.parallelism,
        };
        Self::new(config.auth_path(), params)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kdf_params(&self) -> &KdfParams {
        &self.kdf_params
    }

    /// Whether a record exists: chooses registration vs. login.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load and validate the record.
    pub fn load(&self) -> AuthResult<CredentialRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(AuthError::RecordNotFound),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(AuthError::RecordCorrupt(format!("not UTF-8: {e}")))
            }
            Err(e) => return Err(AuthError::Io(e)),
        };

        let record: CredentialRecord = serde_json::from_str(&content)
            .map_err(|e| AuthError::RecordCorrupt(format!("malformed JSON: {e}")))?;
        record.validate()?;

        tracing::debug!(path = %self.path.display(), "loaded credential record");
        Ok(record)
    }

    /// Atomically replace the record on disk.
    pub fn save(&self, record: &CredentialRecord) -> AuthResult<()> {
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| AuthError::RecordCorrupt(format!("serializing record: {e}")))?;
        atomic_write(&self.path, &json)?;
        tracing::debug!(path = %self.path.display(), "saved credential record");
        Ok(())
    }

    /// Register the installation's user. Fails if a record already exists.
    pub fn initialize(
        &self,
        username: &str,
        password: &SecretString,
    ) -> AuthResult<CredentialRecord> {
        let (record, _dek) = self.create(username, password)?;
        Ok(record)
    }

    /// Registration that also hands back the new DEK so a session can start
    /// without deriving the KEK a second time.
    pub(crate) fn create(
        &self,
        username: &str,
        password: &SecretString,
    ) -> AuthResult<(CredentialRecord, Dek)> {
        validate_registration(username, password)?;
        if self.exists() {
            return Err(AuthError::AlreadyInitialized);
        }

        let salt = generate_salt();
        let kek = derive_kek(password, &salt, &self.kdf_params)?;
        let dek = generate_dek();
        let wrapped = wrap_dek(&dek, &kek)?;

        let record = CredentialRecord::new(
            username.trim(),
            &salt,
            self.kdf_params,
            &wrapped,
            Utc::now(),
        );
        self.save(&record)?;

        tracing::info!(user_id = %record.user_id, "credential record created");
        Ok((record, dek))
    }

    /// Delete the record (explicit account reset). Every field encrypted
    /// under the old DEK becomes unreadable. Returns whether a record existed.
    pub fn reset(&self) -> AuthResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::warn!(path = %self.path.display(), "credential record deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AuthError::Io(e)),
        }
    }
}

/// Write `contents` to a temp file next to `path`, fsync, and rename over it.
fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));
    match fs::remove_file(&tmp_path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let written = open_private(&tmp_path).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|()| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    sync_dir(parent)
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fast_params;
    use chartguard_crypto::unwrap_dek;

    fn temp_store() -> (tempfile::TempDir, CredentialStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("auth.json"), fast_params()).unwrap();
        (dir, store)
    }

    fn password(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_initialize_then_exists() {
        let (_dir, store) = temp_store();
        assert!(!store.exists());

        let record = store.initialize("aled1027", &password("Tr0ub4dor&3")).unwrap();

        assert!(store.exists());
        assert_eq!(record.user.username, "aled1027");
        assert_eq!(record.kdf.params, fast_params());
    }

    #[test]
    fn test_load_roundtrip() {
        let (_dir, store) = temp_store();
        let record = store.initialize("aled1027", &password("Tr0ub4dor&3")).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn test_initialized_record_unwraps_with_password() {
        let (_dir, store) = temp_store();
        let (record, dek) = store.create("aled1027", &password("Tr0ub4dor&3")).unwrap();

        let kek = derive_kek(
            &password("Tr0ub4dor&3"),
            &record.salt().unwrap(),
            &record.kdf.params,
        )
        .unwrap();
        let unwrapped = unwrap_dek(&record.wrapped().unwrap(), &kek).unwrap();
        assert_eq!(unwrapped.as_bytes(), dek.as_bytes());
    }

    #[test]
    fn test_initialize_twice_fails() {
        let (_dir, store) = temp_store();
        store.initialize("aled1027", &password("Tr0ub4dor&3")).unwrap();
        let first = store.load().unwrap();

        let err = store.initialize("someone", &password("different-pw")).unwrap_err();
        assert!(matches!(err, AuthError::AlreadyInitialized));
        assert_eq!(store.load().unwrap(), first, "existing record must be untouched");
    }

    #[test]
    fn test_initialize_validates_input() {
        let (_dir, store) = temp_store();
        assert!(matches!(
            store.initialize("   ", &password("long-enough")),
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            store.initialize("aled1027", &password("short")),
            Err(AuthError::InvalidInput(_))
        ));
        assert!(!store.exists());
    }

    #[test]
    fn test_load_missing() {
        let (_dir, store) = temp_store();
        assert!(matches!(store.load(), Err(AuthError::RecordNotFound)));
    }

    #[test]
    fn test_load_malformed_json() {
        let (_dir, store) = temp_store();
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(AuthError::RecordCorrupt(_))));
    }

    #[test]
    fn test_load_missing_field() {
        let (_dir, store) = temp_store();
        store.initialize("aled1027", &password("Tr0ub4dor&3")).unwrap();

        let mut json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        json.as_object_mut().unwrap().remove("wrapped_dek");
        fs::write(store.path(), json.to_string()).unwrap();

        assert!(matches!(store.load(), Err(AuthError::RecordCorrupt(_))));
    }

    #[test]
    fn test_load_unknown_version() {
        let (_dir, store) = temp_store();
        store.initialize("aled1027", &password("Tr0ub4dor&3")).unwrap();

        let mut json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        json["version"] = serde_json::json!(7);
        fs::write(store.path(), json.to_string()).unwrap();

        assert!(matches!(store.load(), Err(AuthError::RecordCorrupt(_))));
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let (dir, store) = temp_store();
        store.initialize("aled1027", &password("Tr0ub4dor&3")).unwrap();
        let record = store.load().unwrap();
        store.save(&record).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["auth.json".to_string()]);
    }

    #[test]
    fn test_save_replaces_stale_temp_file() {
        let (dir, store) = temp_store();
        fs::write(dir.path().join(".auth.json.tmp"), "leftover from a crash").unwrap();

        store.initialize("aled1027", &password("Tr0ub4dor&3")).unwrap();

        store.load().unwrap();
        assert!(!dir.path().join(".auth.json.tmp").exists());
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            CredentialStore::new(dir.path().join("nested/app/auth.json"), fast_params()).unwrap();
        store.initialize("aled1027", &password("Tr0ub4dor&3")).unwrap();
        assert!(store.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_record_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = temp_store();
        store.initialize("aled1027", &password("Tr0ub4dor&3")).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_reset() {
        let (_dir, store) = temp_store();
        assert!(!store.reset().unwrap());

        store.initialize("aled1027", &password("Tr0ub4dor&3")).unwrap();
        assert!(store.reset().unwrap());
        assert!(!store.exists());

        // registration is possible again
        store.initialize("aled1027", &password("Tr0ub4dor&3")).unwrap();
    }

    #[test]
    fn test_invalid_params_rejected_at_construction() {
        let params = KdfParams {
            iterations: 0,
            ..fast_params()
        };
        let err = CredentialStore::new("auth.json", params).unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn test_from_config() {
        let mut config = ChartguardConfig::default();
        config.storage.data_dir = PathBuf::from("/srv/chartguard");
        config.kdf.iterations = 4;

        let store = CredentialStore::from_config(&config).unwrap();
        assert_eq!(store.path(), Path::new("/srv/chartguard/auth.json"));
        assert_eq!(store.kdf_params().iterations, 4);
    }
}
