use std::{
    cmp::Ordering,
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use glob::{MatchOptions, Pattern};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::lock::{probe_lock, LockProbe};
use crate::ClaimError;

/// File-name selector; both forms must match the whole name.
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Glob(Pattern),
    Regex(Regex),
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl NamePattern {
    /// Shell-style glob: `*`, `?` and `[...]` classes (`[!...]` negates, a leading
    /// `]` is a class member).
    pub fn glob(pattern: &str) -> Result<Self, ClaimError> {
        let glob = Pattern::new(pattern).map_err(|err| invalid(pattern, err))?;
        Ok(Self {
            source: pattern.to_string(),
            matcher: Matcher::Glob(glob),
        })
    }

    pub fn regex(pattern: &str) -> Result<Self, ClaimError> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|err| invalid(pattern, err))?;
        Ok(Self {
            source: pattern.to_string(),
            matcher: Matcher::Regex(regex),
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        match &self.matcher {
            Matcher::Glob(glob) => glob.matches_with(name, GLOB_OPTIONS),
            Matcher::Regex(regex) => regex.is_match(name),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn invalid<E>(pattern: &str, err: E) -> ClaimError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ClaimError::InvalidPattern {
        pattern: pattern.to_string(),
        source: Box::new(err),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateMetadata {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// A matching, currently unlocked file found by [`list_candidates`].
///
/// Metadata is read on first use and cached for the lifetime of the candidate, which
/// only spans one scan.
#[derive(Debug, Clone)]
pub struct FileCandidate {
    path: PathBuf,
    metadata: OnceLock<Option<CandidateMetadata>>,
}

impl FileCandidate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            metadata: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }

    /// `None` when the file can no longer be stat'ed.
    pub fn metadata(&self) -> Option<&CandidateMetadata> {
        self.metadata
            .get_or_init(|| {
                fs::metadata(&self.path)
                    .map(|meta| CandidateMetadata {
                        size: meta.len(),
                        modified: meta.modified().ok(),
                    })
                    .ok()
            })
            .as_ref()
    }

    pub fn size(&self) -> Option<u64> {
        self.metadata().map(|meta| meta.size)
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.metadata().and_then(|meta| meta.modified)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Modified,
    Size,
    Name,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Which candidate wins when several are eligible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimOrder {
    pub key: SortKey,
    pub order: SortOrder,
}

impl ClaimOrder {
    pub fn new(key: SortKey, order: SortOrder) -> Self {
        Self { key, order }
    }

    pub fn compare(&self, a: &FileCandidate, b: &FileCandidate) -> Ordering {
        let ordering = match self.key {
            SortKey::Modified => a.modified().cmp(&b.modified()),
            SortKey::Size => a.size().cmp(&b.size()),
            SortKey::Name => a.path().file_name().cmp(&b.path().file_name()),
        };
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// Ensures the watched root exists and returns its absolute form.
pub fn prepare_directory(path: &Path) -> Result<PathBuf, ClaimError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(ClaimError::NotADirectory {
                path: path.to_path_buf(),
            });
        }
    } else {
        fs::create_dir_all(path).map_err(|source| ClaimError::CreateDirectory {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = ?path, "created watched directory");
    }

    fs::canonicalize(path).map_err(|source| ClaimError::ResolveDirectory {
        path: path.to_path_buf(),
        source,
    })
}

/// Lists files in `directory` whose names match `pattern` and that nobody holds an
/// exclusive lock on, ordered by path.
///
/// Returns `None` when the directory itself cannot be listed ("try again next
/// cycle"), as opposed to `Some(vec![])` when nothing is eligible right now.
pub fn list_candidates(directory: &Path, pattern: &NamePattern) -> Option<Vec<FileCandidate>> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(?error, directory = ?directory, "failed to list watched directory");
            return None;
        }
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(?error, directory = ?directory, "failed to read directory entry");
                continue;
            }
        };

        let name = entry.file_name();
        if !pattern.matches(&name.to_string_lossy()) {
            continue;
        }

        let path = entry.path();
        // Follows symlinks: a link to a regular file is eligible, a directory never is.
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => continue,
            Err(error) => {
                debug!(?error, path = ?path, "skipping entry that cannot be stat'ed");
                continue;
            }
        }

        match probe_lock(&path) {
            Ok(LockProbe::Unlocked) => candidates.push(FileCandidate::new(path)),
            Ok(LockProbe::Held) => debug!(path = ?path, "skipping file locked by another writer"),
            Ok(LockProbe::Missing) => debug!(path = ?path, "file vanished before lock probe"),
            Err(error) => warn!(?error, path = ?path, "lock probe failed; skipping file"),
        }
    }

    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    Some(candidates)
}

/// Picks the next file to process.
///
/// A single candidate is returned as-is without consulting `compare`; otherwise the
/// candidates are stably sorted and the first one wins, so equal keys keep their
/// input order.
pub fn claim<F>(mut candidates: Vec<FileCandidate>, compare: F) -> Option<FileCandidate>
where
    F: FnMut(&FileCandidate, &FileCandidate) -> Ordering,
{
    match candidates.len() {
        0 => None,
        1 => candidates.pop(),
        _ => {
            candidates.sort_by(compare);
            candidates.into_iter().next()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_whole_name() {
        let pattern = NamePattern::glob("*.csv").unwrap();
        assert!(pattern.matches("users.csv"));
        assert!(!pattern.matches("users.csv.part"));
        assert!(!pattern.matches("users.CSV"));

        let single = NamePattern::glob("in?.txt").unwrap();
        assert!(single.matches("in1.txt"));
        assert!(!single.matches("in12.txt"));
    }

    #[test]
    fn glob_classes_and_literal_regex_characters() {
        let class = NamePattern::glob("export-[0-9].dat").unwrap();
        assert!(class.matches("export-7.dat"));
        assert!(!class.matches("export-x.dat"));

        let negated = NamePattern::glob("[!.]*").unwrap();
        assert!(negated.matches("data"));
        assert!(!negated.matches(".hidden"));

        let literal = NamePattern::glob("a+b(1).txt").unwrap();
        assert!(literal.matches("a+b(1).txt"));
        assert!(!literal.matches("aab1.txt"));
    }

    #[test]
    fn glob_bracket_edge_cases() {
        let close = NamePattern::glob("[]]").unwrap();
        assert!(close.matches("]"));
        assert!(!close.matches("[]"));

        let not_close = NamePattern::glob("[!]]x").unwrap();
        assert!(not_close.matches("ax"));
        assert!(!not_close.matches("]x"));

        let escaped = NamePattern::glob("report[*].txt").unwrap();
        assert!(escaped.matches("report*.txt"));
        assert!(!escaped.matches("report1.txt"));
    }

    #[test]
    fn invalid_glob_is_reported() {
        let err = NamePattern::glob("[a").unwrap_err();
        assert!(matches!(err, ClaimError::InvalidPattern { .. }));
    }

    #[test]
    fn regex_is_anchored() {
        let pattern = NamePattern::regex(r"\d+\.xml").unwrap();
        assert!(pattern.matches("123.xml"));
        assert!(!pattern.matches("x123.xml"));
    }

    #[test]
    fn invalid_regex_is_reported() {
        let err = NamePattern::regex("(").unwrap_err();
        assert!(matches!(err, ClaimError::InvalidPattern { .. }));
    }

    #[test]
    fn claim_of_nothing_is_none() {
        assert!(claim(Vec::new(), |_, _| Ordering::Equal).is_none());
    }

    #[test]
    fn equal_keys_keep_input_order() {
        let candidates = vec![
            FileCandidate::new("/x/b"),
            FileCandidate::new("/x/a"),
            FileCandidate::new("/x/c"),
        ];
        let chosen = claim(candidates, |_, _| Ordering::Equal).unwrap();
        assert_eq!(chosen.path(), Path::new("/x/b"));
    }

    #[test]
    fn name_order_descending() {
        let order = ClaimOrder::new(SortKey::Name, SortOrder::Descending);
        let candidates = vec![
            FileCandidate::new("/x/a.txt"),
            FileCandidate::new("/x/c.txt"),
            FileCandidate::new("/x/b.txt"),
        ];
        let chosen = claim(candidates, |a, b| order.compare(a, b)).unwrap();
        assert_eq!(chosen.file_name(), Some("c.txt"));
    }
}
