use std::{fs::OpenOptions, io, path::Path};

use fs2::FileExt;

/// Result of a point-in-time advisory lock probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockProbe {
    /// An exclusive lock was acquired and released again.
    Unlocked,
    /// Another handle holds a conflicting lock; the file is presumed mid-write.
    Held,
    /// The file disappeared between listing and probing.
    Missing,
}

/// Tries a non-blocking exclusive lock on `path` and releases it immediately.
///
/// Nothing is held once this returns: the result may be stale by the time the caller
/// acts on it, so callers re-probe on every scan.
pub fn probe_lock(path: &Path) -> io::Result<LockProbe> {
    let file = match OpenOptions::new().read(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(LockProbe::Missing),
        Err(err) => return Err(err),
    };

    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            // Closing the handle releases the lock as well, so a failed unlock is harmless.
            let _ = FileExt::unlock(&file);
            Ok(LockProbe::Unlocked)
        }
        Err(err) if is_contended(&err) => Ok(LockProbe::Held),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(LockProbe::Missing),
        Err(err) => Err(err),
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn probe_reports_held_lock_and_releases_its_own() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(&path, "x").unwrap();

        assert_eq!(probe_lock(&path).unwrap(), LockProbe::Unlocked);
        // The probe must not leave a lock behind.
        assert_eq!(probe_lock(&path).unwrap(), LockProbe::Unlocked);

        let holder = File::open(&path).unwrap();
        FileExt::lock_exclusive(&holder).unwrap();
        assert_eq!(probe_lock(&path).unwrap(), LockProbe::Held);

        FileExt::unlock(&holder).unwrap();
        assert_eq!(probe_lock(&path).unwrap(), LockProbe::Unlocked);
    }

    #[test]
    fn vanished_file_is_missing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            probe_lock(&dir.path().join("gone.txt")).unwrap(),
            LockProbe::Missing
        );
    }
}
