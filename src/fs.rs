//! Read-only file access used by the sprite cache.
//!
//! Opening is infallible in the `Result` sense: a missing file is `None`, so
//! the cache can record it and carry on with the rest of the load.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

// ── FileSystem ────────────────────────────────────────────────────────────────

pub trait FileSystem {
    /// Open `filename` for reading, or `None` if it does not exist or cannot
    /// be opened.
    fn try_open(&self, filename: &str) -> Option<Box<dyn Read + '_>>;

    fn exists(&self, filename: &str) -> bool {
        self.try_open(filename).is_some()
    }
}

/// Lookup key: lowercase with `/` separators.  Legacy asset references are
/// case-insensitive.
fn normalise(name: &str) -> String {
    name.replace('\\', "/").to_ascii_lowercase()
}

// ── MemoryFileSystem ──────────────────────────────────────────────────────────

/// In-memory file table.  Handy for tests and for assets embedded with
/// `include_bytes!`.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filename: &str, data: impl Into<Vec<u8>>) {
        self.files.insert(normalise(filename), data.into());
    }

    pub fn with_file(mut self, filename: &str, data: impl Into<Vec<u8>>) -> Self {
        self.insert(filename, data);
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FileSystem for MemoryFileSystem {
    fn try_open(&self, filename: &str) -> Option<Box<dyn Read + '_>> {
        let data = self.files.get(&normalise(filename))?;
        Some(Box::new(Cursor::new(data.as_slice())))
    }

    fn exists(&self, filename: &str) -> bool {
        self.files.contains_key(&normalise(filename))
    }
}

// ── DirectoryFileSystem ───────────────────────────────────────────────────────

/// A directory tree indexed once at construction.
///
/// Files resolve by their path relative to the root (`"units/tank.png"`) or,
/// failing that, by bare file name (`"tank.png"`).  When two files share a
/// bare name the first one found by the directory walk wins.
pub struct DirectoryFileSystem {
    root: PathBuf,
    by_path: HashMap<String, PathBuf>,
    by_name: HashMap<String, PathBuf>,
}

impl DirectoryFileSystem {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let mut by_path = HashMap::new();
        let mut by_name = HashMap::new();

        for entry in walkdir::WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(&root) else { continue };
            let Some(relative) = relative.to_str() else { continue };

            by_path.insert(normalise(relative), path.to_path_buf());
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                by_name.entry(normalise(name)).or_insert_with(|| path.to_path_buf());
            }
        }

        Self { root, by_path, by_name }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every indexed file, as normalised root-relative paths in sorted order.
    pub fn files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = self.by_path.keys().map(String::as_str).collect();
        files.sort_unstable();
        files
    }

    fn resolve(&self, filename: &str) -> Option<&PathBuf> {
        let key = normalise(filename);
        self.by_path.get(&key).or_else(|| self.by_name.get(&key))
    }
}

impl FileSystem for DirectoryFileSystem {
    fn try_open(&self, filename: &str) -> Option<Box<dyn Read + '_>> {
        let path = self.resolve(filename)?;
        let file = File::open(path).ok()?;
        Some(Box::new(BufReader::new(file)))
    }

    fn exists(&self, filename: &str) -> bool {
        self.resolve(filename).is_some()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(fs: &dyn FileSystem, name: &str) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        fs.try_open(name)?.read_to_end(&mut out).ok()?;
        Some(out)
    }

    #[test]
    fn memory_lookup_is_case_insensitive() {
        let fs = MemoryFileSystem::new().with_file("Units/Tank.SHP", [1u8, 2, 3]);
        assert_eq!(read_all(&fs, "units/tank.shp"), Some(vec![1, 2, 3]));
        assert_eq!(read_all(&fs, "UNITS\\TANK.SHP"), Some(vec![1, 2, 3]));
        assert!(fs.try_open("tank.shp").is_none());
    }

    #[test]
    fn directory_resolves_relative_path_and_bare_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("Mouse.PNG"), b"cursor").unwrap();

        let fs = DirectoryFileSystem::new(dir.path());
        assert_eq!(read_all(&fs, "sub/mouse.png").as_deref(), Some(&b"cursor"[..]));
        assert_eq!(read_all(&fs, "mouse.png").as_deref(), Some(&b"cursor"[..]));
        assert!(!fs.exists("missing.png"));
        assert_eq!(fs.files(), vec!["sub/mouse.png"]);
    }
}
