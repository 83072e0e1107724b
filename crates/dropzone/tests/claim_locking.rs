use std::{
    cmp::Ordering,
    fs::{self, File},
    path::Path,
    time::{Duration, SystemTime},
};

use dropzone::{claim, list_candidates, ClaimOrder, NamePattern, SortKey, SortOrder};
use fs2::FileExt;
use tempfile::TempDir;

fn write_aged(dir: &Path, name: &str, age: Duration) {
    let path = dir.join(name);
    fs::write(&path, name).expect("write file");
    let file = File::options().write(true).open(&path).expect("open file");
    file.set_modified(SystemTime::now() - age).expect("set mtime");
}

fn names(candidates: &[dropzone::FileCandidate]) -> Vec<&str> {
    candidates
        .iter()
        .map(|candidate| candidate.file_name().expect("utf-8 name"))
        .collect()
}

#[test]
fn locked_file_is_not_a_candidate() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("a.txt"), "a").expect("write a");
    fs::write(dir.path().join("b.txt"), "b").expect("write b");

    let writer = File::options()
        .append(true)
        .open(dir.path().join("b.txt"))
        .expect("open b");
    FileExt::lock_exclusive(&writer).expect("lock b");

    let pattern = NamePattern::glob("*.txt").expect("glob");
    let candidates = list_candidates(dir.path(), &pattern).expect("listing");
    assert_eq!(names(&candidates), vec!["a.txt"]);

    FileExt::unlock(&writer).expect("unlock b");
    let candidates = list_candidates(dir.path(), &pattern).expect("listing");
    assert_eq!(names(&candidates), vec!["a.txt", "b.txt"]);
}

#[test]
fn directories_and_non_matching_names_are_skipped() {
    let dir = TempDir::new().expect("temp dir");
    fs::create_dir(dir.path().join("nested.csv")).expect("mkdir");
    fs::write(dir.path().join("users.csv"), "id\n").expect("write csv");
    fs::write(dir.path().join("users.csv.part"), "id\n").expect("write part");

    let pattern = NamePattern::glob("*.csv").expect("glob");
    let candidates = list_candidates(dir.path(), &pattern).expect("listing");
    assert_eq!(names(&candidates), vec!["users.csv"]);
    assert!(candidates[0].path().is_absolute());
}

#[test]
fn unreadable_directory_is_none_not_empty() {
    let dir = TempDir::new().expect("temp dir");
    let pattern = NamePattern::glob("*").expect("glob");

    assert!(list_candidates(&dir.path().join("missing"), &pattern).is_none());
    assert_eq!(list_candidates(dir.path(), &pattern).map(|c| c.len()), Some(0));
}

#[test]
fn oldest_file_is_claimed_first() {
    let dir = TempDir::new().expect("temp dir");
    write_aged(dir.path(), "middle.txt", Duration::from_secs(60));
    write_aged(dir.path(), "oldest.txt", Duration::from_secs(3_600));
    write_aged(dir.path(), "newest.txt", Duration::from_secs(1));

    let pattern = NamePattern::glob("*.txt").expect("glob");
    let order = ClaimOrder::new(SortKey::Modified, SortOrder::Ascending);

    let candidates = list_candidates(dir.path(), &pattern).expect("listing");
    let chosen = claim(candidates, |a, b| order.compare(a, b)).expect("a candidate");
    assert_eq!(chosen.file_name(), Some("oldest.txt"));

    let newest_first = ClaimOrder::new(SortKey::Modified, SortOrder::Descending);
    let candidates = list_candidates(dir.path(), &pattern).expect("listing");
    let chosen = claim(candidates, |a, b| newest_first.compare(a, b)).expect("a candidate");
    assert_eq!(chosen.file_name(), Some("newest.txt"));
}

#[test]
fn single_candidate_skips_the_comparator() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("only.txt"), "x").expect("write");

    let pattern = NamePattern::glob("*").expect("glob");
    let candidates = list_candidates(dir.path(), &pattern).expect("listing");
    let chosen = claim(candidates, |_, _| -> Ordering {
        panic!("comparator must not run for a single candidate")
    })
    .expect("a candidate");
    assert_eq!(chosen.file_name(), Some("only.txt"));
}
