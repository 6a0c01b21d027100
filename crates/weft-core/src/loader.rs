/*
 * loader.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! File loading for includes.
//!
//! The engine resolves `include` targets through the [`FileLoader`]
//! trait, so transforms can run against the real filesystem or an
//! in-memory corpus. Loaders return matches in no particular order;
//! the engine applies [`natural_cmp`] ordering itself.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Source access for `include` directives.
pub trait FileLoader {
    /// Read one file as text.
    fn read(&self, path: &Path) -> io::Result<String>;

    /// Expand a wildcard pattern relative to `base_dir`.
    ///
    /// Returned order is unspecified.
    fn glob(&self, pattern: &str, base_dir: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Whether a pattern needs glob expansion rather than a direct read.
pub fn has_wildcards(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Loader backed by the real filesystem.
#[derive(Debug, Clone, Default)]
pub struct FsLoader;

impl FileLoader for FsLoader {
    fn read(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn glob(&self, pattern: &str, base_dir: &Path) -> io::Result<Vec<PathBuf>> {
        let full = base_dir.join(pattern);
        let paths = glob::glob(&full.to_string_lossy())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        Ok(paths
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect())
    }
}

/// Loader over an in-memory corpus, for tests and embedded use.
///
/// Paths are stored with forward slashes; `glob` supports `*` and `?`
/// wildcards matched against the joined pattern.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    files: BTreeMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> MemoryLoader {
        MemoryLoader::default()
    }

    /// Add a file to the corpus.
    pub fn add(&mut self, path: impl Into<String>, content: impl Into<String>) -> &mut Self {
        self.files.insert(normalize(&path.into()), content.into());
        self
    }

    /// Create a loader with the given files.
    pub fn with_files(
        files: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> MemoryLoader {
        let mut loader = MemoryLoader::new();
        for (path, content) in files {
            loader.add(path, content);
        }
        loader
    }
}

impl FileLoader for MemoryLoader {
    fn read(&self, path: &Path) -> io::Result<String> {
        let key = normalize(&path.to_string_lossy());
        self.files.get(&key).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file: {key}"))
        })
    }

    fn glob(&self, pattern: &str, base_dir: &Path) -> io::Result<Vec<PathBuf>> {
        let full = normalize(&base_dir.join(pattern).to_string_lossy());
        Ok(self
            .files
            .keys()
            .filter(|path| wildcard_match(&full, path))
            .map(PathBuf::from)
            .collect())
    }
}

/// Normalize a path string to forward slashes, dropping a leading `./`.
fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

/// Match `text` against a pattern of literals, `*` and `?`.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    // Iterative star backtracking
    let (mut p, mut t) = (0, 0);
    let (mut star, mut star_t) = (None, 0);
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// Compare two path strings naturally: runs of ASCII digits compare by
/// numeric value, so `file9` sorts before `file10`.
pub fn natural_cmp(a: &str, b: &str) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    let (mut i, mut j) = (0, 0);
    while i < a_bytes.len() && j < b_bytes.len() {
        let (ca, cb) = (a_bytes[i], b_bytes[j]);
        if ca.is_ascii_digit() && cb.is_ascii_digit() {
            let a_run = digit_run(a_bytes, i);
            let b_run = digit_run(b_bytes, j);
            let a_num = trim_leading_zeros(&a[i..a_run]);
            let b_num = trim_leading_zeros(&b[j..b_run]);
            let ordering = a_num
                .len()
                .cmp(&b_num.len())
                .then_with(|| a_num.cmp(b_num));
            if ordering != Ordering::Equal {
                return ordering;
            }
            i = a_run;
            j = b_run;
        } else {
            if ca != cb {
                return ca.cmp(&cb);
            }
            i += 1;
            j += 1;
        }
    }
    (a_bytes.len() - i).cmp(&(b_bytes.len() - j)).then_with(|| a.cmp(b))
}

fn digit_run(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    end
}

fn trim_leading_zeros(digits: &str) -> &str {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() { "0" } else { trimmed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_has_wildcards() {
        assert!(has_wildcards("src/*.js"));
        assert!(has_wildcards("file?.x"));
        assert!(!has_wildcards("plain/path.txt"));
    }

    #[test]
    fn test_natural_ordering() {
        let mut files = vec!["int8.x", "int16.x", "int2.x"];
        files.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(files, vec!["int2.x", "int8.x", "int16.x"]);
    }

    #[test]
    fn test_natural_ordering_mixed() {
        let mut files = vec!["b1", "a10", "a2", "a", "b"];
        files.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(files, vec!["a", "a2", "a10", "b", "b1"]);
    }

    #[test]
    fn test_natural_ordering_leading_zeros() {
        // Numerically equal runs fall back to byte order
        assert_eq!(natural_cmp("file007", "file7"), Ordering::Less);
        assert_eq!(natural_cmp("file07", "file8"), Ordering::Less);
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("src/*.js", "src/a.js"));
        assert!(wildcard_match("int?.x", "int8.x"));
        assert!(!wildcard_match("int?.x", "int16.x"));
        assert!(wildcard_match("*", "anything"));
        assert!(!wildcard_match("a*c", "abd"));
    }

    #[test]
    fn test_memory_loader_read() {
        let loader = MemoryLoader::with_files([("dir/a.txt", "contents")]);
        assert_eq!(loader.read(Path::new("dir/a.txt")).unwrap(), "contents");
        assert_eq!(loader.read(Path::new("./dir/a.txt")).unwrap(), "contents");
        assert!(loader.read(Path::new("missing")).is_err());
    }

    #[test]
    fn test_memory_loader_glob() {
        let loader = MemoryLoader::with_files([
            ("inc/int8.x", "8"),
            ("inc/int16.x", "16"),
            ("inc/other.y", "no"),
        ]);
        let mut matches = loader.glob("int*.x", Path::new("inc")).unwrap();
        matches.sort();
        assert_eq!(
            matches,
            vec![PathBuf::from("inc/int16.x"), PathBuf::from("inc/int8.x")]
        );
    }
}
