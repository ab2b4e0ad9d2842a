//! Polling file-change watcher.
//!
//! Each check runs in up to two phases:
//!
//! 1. **Incremental scan** over the tracked files. A file that disappeared (or
//!    turned into a directory) is a change. A file whose mtime moved is
//!    re-hashed and counts only if its content hash differs.
//! 2. **Full rebuild**, only when the scan found nothing. The tracked set is
//!    discarded and re-registered from the path specs, then compared path by
//!    path with the previous set. This catches new files, and content edits
//!    that kept the old mtime.
//!
//! Registration errors are swallowed; an unreadable tree just tracks fewer files.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

/// Which phase decided the outcome of the most recent check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    IncrementalScan,
    FullRebuild,
}

/// What is known about one tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWatchEntry {
    pub modified: Option<SystemTime>,
    pub hash: blake3::Hash,
}

impl FileWatchEntry {
    fn capture(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok(),
            hash: hash_file(path)?,
        })
    }
}

/// One configured path: a file, a directory, or a glob, with an optional
/// `*.ext` filter taken from the last segment.
#[derive(Debug, Clone)]
struct WatchSpec {
    root: PathBuf,
    name_pattern: Option<String>,
}

impl WatchSpec {
    fn parse(path: &Path) -> Self {
        if path.components().count() > 1 {
            if let (Some(last), Some(parent)) =
                (path.file_name().and_then(|n| n.to_str()), path.parent())
            {
                if last.contains("*.") {
                    return Self {
                        root: parent.to_path_buf(),
                        name_pattern: Some(last.to_string()),
                    };
                }
            }
        }
        Self {
            root: path.to_path_buf(),
            name_pattern: None,
        }
    }

    fn register(&self, entries: &mut BTreeMap<PathBuf, FileWatchEntry>) {
        if has_wildcard(&self.root) {
            for dir in expand_dir_glob(&self.root) {
                self.register_dir(&dir, entries);
            }
        } else if self.root.is_dir() {
            self.register_dir(&self.root, entries);
        } else if self.root.is_file() {
            if let Some(entry) = FileWatchEntry::capture(&self.root) {
                entries.insert(self.root.clone(), entry);
            }
        }
    }

    fn register_dir(&self, dir: &Path, entries: &mut BTreeMap<PathBuf, FileWatchEntry>) {
        let files = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| match &self.name_pattern {
                Some(pattern) => e
                    .file_name()
                    .to_str()
                    .is_some_and(|name| wildcard_match(pattern, name)),
                None => true,
            });

        for file in files {
            if let Some(entry) = FileWatchEntry::capture(file.path()) {
                entries.insert(file.into_path(), entry);
            }
        }
    }
}

/// Tracks a set of paths and reports whether anything under them changed.
#[derive(Debug)]
pub struct FileWatcher {
    specs: Vec<WatchSpec>,
    entries: BTreeMap<PathBuf, FileWatchEntry>,
    phase: WatchPhase,
}

impl FileWatcher {
    /// Start watching `paths`, registering every file they currently cover.
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let specs: Vec<WatchSpec> = paths
            .into_iter()
            .map(|p| WatchSpec::parse(p.as_ref()))
            .collect();
        let entries = register_all(&specs);
        tracing::debug!(tracked = entries.len(), "File watcher initialised");

        Self {
            specs,
            entries,
            phase: WatchPhase::IncrementalScan,
        }
    }

    /// Whether any tracked file was added, removed or changed since the last check.
    pub fn check_changed(&mut self) -> bool {
        self.phase = WatchPhase::IncrementalScan;
        if self.incremental_scan() > 0 {
            return true;
        }

        self.phase = WatchPhase::FullRebuild;
        let previous = std::mem::replace(&mut self.entries, register_all(&self.specs));
        !same_files(&previous, &self.entries)
    }

    pub fn tracked_count(&self) -> usize {
        self.entries.len()
    }

    /// Phase that produced the result of the most recent check.
    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    pub fn tracked_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    fn incremental_scan(&mut self) -> usize {
        let mut changed = 0;
        let mut gone = Vec::new();

        for (path, entry) in self.entries.iter_mut() {
            let meta = match fs::metadata(path) {
                Ok(meta) if meta.is_file() => meta,
                _ => {
                    gone.push(path.clone());
                    changed += 1;
                    continue;
                }
            };

            let modified = meta.modified().ok();
            if modified == entry.modified {
                continue;
            }
            entry.modified = modified;

            match hash_file(path) {
                Some(hash) if hash != entry.hash => {
                    entry.hash = hash;
                    changed += 1;
                }
                Some(_) => {}
                None => {
                    gone.push(path.clone());
                    changed += 1;
                }
            }
        }

        for path in gone {
            self.entries.remove(&path);
        }
        changed
    }
}

fn register_all(specs: &[WatchSpec]) -> BTreeMap<PathBuf, FileWatchEntry> {
    let mut entries = BTreeMap::new();
    for spec in specs {
        spec.register(&mut entries);
    }
    entries
}

// Same paths with the same content; mtime differences alone do not count.
fn same_files(
    a: &BTreeMap<PathBuf, FileWatchEntry>,
    b: &BTreeMap<PathBuf, FileWatchEntry>,
) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|((pa, ea), (pb, eb))| pa == pb && ea.hash == eb.hash)
}

fn hash_file(path: &Path) -> Option<blake3::Hash> {
    let mut file = File::open(path).ok()?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher).ok()?;
    Some(hasher.finalize())
}

fn has_wildcard(path: &Path) -> bool {
    path.to_string_lossy().contains('*')
}

/// Directories matching a path whose components may contain `*`, `?` or `**`.
fn expand_dir_glob(pattern: &Path) -> Vec<PathBuf> {
    let mut base = PathBuf::new();
    let mut rest: Vec<String> = Vec::new();
    for component in pattern.components() {
        let text = component.as_os_str().to_string_lossy();
        if rest.is_empty() && !text.contains('*') && !text.contains('?') {
            base.push(component);
        } else if matches!(component, Component::Normal(_)) {
            rest.push(text.into_owned());
        }
    }
    if base.as_os_str().is_empty() {
        base.push(".");
    }

    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
    WalkDir::new(&base)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir())
        .filter(|e| {
            let Ok(relative) = e.path().strip_prefix(&base) else {
                return false;
            };
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
            match_components(&rest, &parts)
        })
        .map(walkdir::DirEntry::into_path)
        .collect()
}

// `**` matches zero or more whole components.
fn match_components(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => {
            (0..=path.len()).any(|skip| match_components(rest, &path[skip..]))
        }
        Some((head, rest)) => match path.split_first() {
            Some((name, tail)) => wildcard_match(head, name) && match_components(rest, tail),
            None => false,
        },
    }
}

/// Shell-style match of a single name against `*` and `?` wildcards.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, n));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            n = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    fn mtime(path: &Path) -> SystemTime {
        fs::metadata(path).unwrap().modified().unwrap()
    }

    #[test]
    fn wildcards() {
        assert!(wildcard_match("*.php", "index.php"));
        assert!(!wildcard_match("*.php", "index.phtml"));
        assert!(wildcard_match("a?c", "abc"));
        assert!(wildcard_match("*", ""));
        assert!(wildcard_match("*a*b", "xxaybzb"));
        assert!(!wildcard_match("a*", "ba"));
    }

    #[test]
    fn globstar_components() {
        assert!(match_components(&["**"], &[]));
        assert!(match_components(&["**", "views"], &["a", "b", "views"]));
        assert!(match_components(&["*", "views"], &["a", "views"]));
        assert!(!match_components(&["*", "views"], &["a", "b", "views"]));
    }

    #[test]
    fn unchanged_tree_reports_nothing_twice() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        let mut watcher = FileWatcher::new([dir.path()]);

        assert_eq!(watcher.tracked_count(), 1);
        assert!(!watcher.check_changed());
        assert_eq!(watcher.phase(), WatchPhase::FullRebuild);
        assert!(!watcher.check_changed());
        assert_eq!(watcher.tracked_count(), 1);
    }

    #[test]
    fn content_edit_with_identical_mtime_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        fs::write(&file, "port = 1").unwrap();
        let mut watcher = FileWatcher::new([&file]);
        let before = mtime(&file);

        fs::write(&file, "port = 2").unwrap();
        set_mtime(&file, before);

        assert!(watcher.check_changed());
        assert_eq!(watcher.phase(), WatchPhase::FullRebuild);
        assert!(!watcher.check_changed());
    }

    #[test]
    fn edit_with_new_mtime_is_found_by_incremental_scan() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("main.rs");
        fs::write(&file, "fn main() {}").unwrap();
        let mut watcher = FileWatcher::new([dir.path()]);
        let before = mtime(&file);

        fs::write(&file, "fn main() { loop {} }").unwrap();
        set_mtime(&file, before + Duration::from_secs(5));

        assert!(watcher.check_changed());
        assert_eq!(watcher.phase(), WatchPhase::IncrementalScan);
        assert!(!watcher.check_changed());
    }

    #[test]
    fn touch_without_modification_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib.rs");
        fs::write(&file, "pub fn f() {}").unwrap();
        let mut watcher = FileWatcher::new([dir.path()]);

        set_mtime(&file, mtime(&file) + Duration::from_secs(5));
        assert!(!watcher.check_changed());
    }

    #[test]
    fn deletion_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".env");
        fs::write(&file, "APP_ENV=local").unwrap();
        let mut watcher = FileWatcher::new([&file]);

        fs::remove_file(&file).unwrap();
        assert!(watcher.check_changed());
        assert_eq!(watcher.tracked_count(), 0);
        assert!(!watcher.check_changed());
    }

    #[test]
    fn new_file_is_detected_on_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "a").unwrap();
        let mut watcher = FileWatcher::new([dir.path()]);

        fs::write(dir.path().join("b.rs"), "b").unwrap();
        assert!(watcher.check_changed());
        assert_eq!(watcher.phase(), WatchPhase::FullRebuild);
        assert_eq!(watcher.tracked_count(), 2);
    }

    #[test]
    fn swap_of_one_file_for_another_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("old.rs"), "same").unwrap();
        let mut watcher = FileWatcher::new([dir.path().join("*.rs")]);

        // Deleted files are caught by the scan; the rebuild then sees new.rs.
        fs::remove_file(dir.path().join("old.rs")).unwrap();
        fs::write(dir.path().join("new.rs"), "same").unwrap();
        assert!(watcher.check_changed());
        assert!(watcher.check_changed());
        assert!(!watcher.check_changed());
    }

    #[test]
    fn extension_filter_on_last_segment() {
        let dir = tempfile::tempdir().unwrap();
        let views = dir.path().join("views");
        fs::create_dir_all(views.join("nested")).unwrap();
        fs::write(views.join("home.html"), "h").unwrap();
        fs::write(views.join("nested").join("card.html"), "c").unwrap();
        fs::write(views.join("notes.txt"), "n").unwrap();

        let watcher = FileWatcher::new([views.join("*.html")]);
        assert_eq!(watcher.tracked_count(), 2);
        assert!(watcher
            .tracked_paths()
            .all(|p| p.extension().is_some_and(|e| e == "html")));
    }

    #[test]
    fn glob_directories_are_expanded() {
        let dir = tempfile::tempdir().unwrap();
        for module in ["users", "orders"] {
            let templates = dir.path().join(module).join("templates");
            fs::create_dir_all(&templates).unwrap();
            fs::write(templates.join("index.html"), module).unwrap();
            fs::write(dir.path().join(module).join("mod.rs"), module).unwrap();
        }

        let watcher = FileWatcher::new([dir.path().join("*").join("templates").join("*.html")]);
        assert_eq!(watcher.tracked_count(), 2);
    }

    #[test]
    fn missing_paths_track_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = FileWatcher::new([dir.path().join("nope"), dir.path().join("gone.lock")]);
        assert_eq!(watcher.tracked_count(), 0);
        assert!(!watcher.check_changed());
    }
}
