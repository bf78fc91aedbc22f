//! `RebootFaultLedger` (spec 4.2): a single-record file noting the (app,
//! proc) that last caused a reboot-class fault, plus a grace timer that
//! unconditionally clears it.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Result, SupervisorError};

pub struct RebootFaultLedger {
    path: PathBuf,
}

impl RebootFaultLedger {
    pub fn at_path(path: PathBuf) -> Self {
        RebootFaultLedger { path }
    }

    fn record_for(app: &str, proc: &str) -> String {
        format!("{}/{}", app, proc)
    }

    /// Create-or-replace the record with `"<app>/<proc>"` (spec 4.2, 4.1.5,
    /// 7: "Reboot actions write the ledger before returning").
    pub fn write(&self, app: &str, proc: &str) -> Result<()> {
        let mut f = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|source| SupervisorError::LedgerIOFailure {
                path: self.path.clone(),
                source,
            })?;
        f.lock_exclusive().map_err(|source| SupervisorError::LedgerIOFailure {
            path: self.path.clone(),
            source,
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = f.set_permissions(fs::Permissions::from_mode(0o600));
        }
        let record = Self::record_for(app, proc);
        f.write_all(record.as_bytes())
            .map_err(|source| SupervisorError::LedgerIOFailure {
                path: self.path.clone(),
                source,
            })?;
        let _ = f.unlock();
        Ok(())
    }

    /// True iff the ledger exists and equals `"<app>/<proc>"` (spec 4.2, 4.1.5).
    pub fn is_for(&self, app: &str, proc: &str) -> bool {
        match self.read() {
            Ok(Some(contents)) => contents == Self::record_for(app, proc),
            _ => false,
        }
    }

    fn read(&self) -> std::io::Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut f = fs::File::open(&self.path)?;
        let _ = f.lock_shared();
        let mut contents = String::new();
        f.read_to_string(&mut contents)?;
        let _ = f.unlock();
        Ok(Some(contents.trim_end_matches('\0').to_string()))
    }

    /// Grace-timer expiry handler (spec 4.2): unconditionally removes the
    /// record. Never fails the caller; best-effort per spec 7.
    pub fn clear(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!(target: "ledger", "failed to remove reboot-fault record {}: {}", self.path.display(), e);
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_is_for() {
        let dir = tempdir().unwrap();
        let ledger = RebootFaultLedger::at_path(dir.path().join("appRebootFault"));
        assert!(!ledger.is_for("A", "P"));
        ledger.write("A", "P").unwrap();
        assert!(ledger.is_for("A", "P"));
        assert!(!ledger.is_for("A", "Q"));
    }

    #[test]
    fn clear_removes_record() {
        let dir = tempdir().unwrap();
        let ledger = RebootFaultLedger::at_path(dir.path().join("appRebootFault"));
        ledger.write("A", "P").unwrap();
        ledger.clear();
        assert!(!ledger.is_for("A", "P"));
        // idempotent
        ledger.clear();
    }

    #[test]
    fn overwrite_replaces_record() {
        let dir = tempdir().unwrap();
        let ledger = RebootFaultLedger::at_path(dir.path().join("appRebootFault"));
        ledger.write("A", "P").unwrap();
        ledger.write("B", "Q").unwrap();
        assert!(!ledger.is_for("A", "P"));
        assert!(ledger.is_for("B", "Q"));
    }
}
