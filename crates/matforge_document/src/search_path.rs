// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ordered search paths for include and texture resolution.

use std::path::{Path, PathBuf};

/// Platform path-list separator
#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: char = ';';
/// Platform path-list separator
#[cfg(not(windows))]
pub const PATH_LIST_SEPARATOR: char = ':';

/// An ordered list of directories consulted first-match-wins when
/// resolving relative file references.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    paths: Vec<PathBuf>,
}

impl SearchPath {
    /// Create an empty search path
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `PATH`-style separated list of directories
    pub fn from_list(list: &str) -> Self {
        let paths = list
            .split(PATH_LIST_SEPARATOR)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect();
        Self { paths }
    }

    /// Append a directory to the end of the search order
    pub fn append(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    /// Prepend a directory, giving it highest priority
    pub fn prepend(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(0, path.into());
    }

    /// Directories in search order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Whether no directories are registered
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve a file reference against the search order.
    ///
    /// Absolute paths resolve to themselves when they exist. Relative paths
    /// return the first existing join with a registered directory.
    pub fn find(&self, file: impl AsRef<Path>) -> Option<PathBuf> {
        let file = file.as_ref();
        if file.is_absolute() {
            return file.exists().then(|| file.to_path_buf());
        }
        self.paths
            .iter()
            .map(|dir| dir.join(file))
            .find(|candidate| candidate.exists())
    }
}

impl std::fmt::Display for SearchPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(&PATH_LIST_SEPARATOR.to_string());
        write!(f, "{joined}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let first = std::env::temp_dir().join("matforge_sp_first");
        let second = std::env::temp_dir().join("matforge_sp_second");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();
        std::fs::write(first.join("tex.png"), b"a").unwrap();
        std::fs::write(second.join("tex.png"), b"b").unwrap();

        let mut sp = SearchPath::new();
        sp.append(&first);
        sp.append(&second);
        assert_eq!(sp.find("tex.png"), Some(first.join("tex.png")));

        let mut reordered = SearchPath::new();
        reordered.append(&second);
        reordered.prepend(&first);
        assert_eq!(reordered.find("tex.png"), Some(first.join("tex.png")));
    }

    #[test]
    fn test_missing_file_is_none() {
        let sp = SearchPath::from_list("/nonexistent_a:/nonexistent_b");
        assert_eq!(sp.find("anything.png"), None);
    }

    #[test]
    fn test_from_list_skips_empty_segments() {
        let sp = SearchPath::from_list("/a::/b");
        assert_eq!(sp.paths().len(), 2);
    }
}
