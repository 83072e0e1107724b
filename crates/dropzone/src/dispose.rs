use std::{
    fs, io,
    path::{Path, PathBuf},
};

use ::time::OffsetDateTime;
use tracing::{debug, warn};

use crate::postprocess::{PostProcessOutcome, PostProcessor};
use crate::DisposeError;

/// What happens to a file once all of its records were consumed.
#[derive(Debug, Clone, Default)]
pub enum Disposition {
    /// Keep the file where it is.
    #[default]
    Leave,
    Delete,
    /// Move into `<directory>/<YYYYMMDD>/`, renaming on collision.
    Archive { directory: PathBuf },
    /// Hand the file to an external command; the command owns it afterwards.
    Command(PostProcessor),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispositionOutcome {
    Left,
    Deleted,
    Archived(PathBuf),
    PostProcessed(PostProcessOutcome),
}

impl Disposition {
    pub async fn dispose(&self, path: &Path) -> Result<DispositionOutcome, DisposeError> {
        match self {
            Self::Leave => Ok(DispositionOutcome::Left),
            Self::Delete => {
                fs::remove_file(path).map_err(|source| DisposeError::Delete {
                    path: path.to_path_buf(),
                    source,
                })?;
                debug!(path = ?path, "deleted consumed file");
                Ok(DispositionOutcome::Deleted)
            }
            Self::Archive { directory } => {
                let target = archive_file(path, directory, OffsetDateTime::now_utc())?;
                debug!(path = ?path, target = ?target, "archived consumed file");
                Ok(DispositionOutcome::Archived(target))
            }
            Self::Command(processor) => {
                Ok(DispositionOutcome::PostProcessed(processor.run(path).await))
            }
        }
    }
}

fn date_folder(now: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}",
        now.year(),
        u8::from(now.month()),
        now.day()
    )
}

fn archive_file(path: &Path, root: &Path, now: OffsetDateTime) -> Result<PathBuf, DisposeError> {
    let name = path.file_name().ok_or_else(|| DisposeError::NoFileName {
        path: path.to_path_buf(),
    })?;

    let folder = root.join(date_folder(now));
    fs::create_dir_all(&folder).map_err(|source| DisposeError::CreateArchive {
        path: folder.clone(),
        source,
    })?;

    let target = unique_target(&folder, Path::new(name));
    move_file(path, &target).map_err(|source| DisposeError::Archive {
        from: path.to_path_buf(),
        to: target.clone(),
        source,
    })?;
    Ok(target)
}

/// `name`, then `stem-1.ext`, `stem-2.ext`, ... until nothing exists at the path.
fn unique_target(folder: &Path, name: &Path) -> PathBuf {
    let first = folder.join(name);
    if !first.exists() {
        return first;
    }

    let stem = name
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = name
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 1u32;
    loop {
        let candidate = folder.join(format!("{stem}-{counter}{extension}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Rename, falling back to copy + remove when the archive is on another filesystem.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_error) => {
            debug!(error = ?rename_error, from = ?from, to = ?to, "rename failed; copying instead");
            fs::copy(from, to)?;
            if let Err(error) = fs::remove_file(from) {
                warn!(
                    ?error,
                    path = ?from,
                    "archived copy written but source could not be removed"
                );
                return Err(error);
            }
            Ok(())
        }
    }
}
