//! In-memory storage tree backing the simulated device.

use std::collections::BTreeMap;

use flipstore_protocol::path::{file_name, normalize, parent};

/// Storage roots that always exist and cannot be removed.
pub const STORAGE_ROOTS: &[&str] = &["/ext", "/int"];

/// Capacity reported for each storage root, in KiB.
const ROOT_CAPACITY_KIB: u64 = 7_812;

/// The implicit `/` directory.
static ROOT_NODE: Node = Node::Dir;

/// A node in the simulated tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A directory.
    Dir,
    /// A file and its contents.
    File(Vec<u8>),
}

/// Failures the simulated storage can report, with firmware wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    NotExist,
    AlreadyExist,
    InvalidName,
    Denied,
    NotEmpty,
}

impl FsError {
    /// The text the firmware prints after `Storage error: `.
    pub fn message(&self) -> &'static str {
        match self {
            FsError::NotExist => "file/dir not exist",
            FsError::AlreadyExist => "file/dir already exist",
            FsError::InvalidName => "invalid name/path",
            FsError::Denied => "access denied",
            FsError::NotEmpty => "directory not empty",
        }
    }
}

/// Flat map of normalized paths to nodes; `/` is implicit.
#[derive(Debug, Clone)]
pub struct SimFs {
    nodes: BTreeMap<String, Node>,
}

impl Default for SimFs {
    fn default() -> Self {
        Self::new()
    }
}

impl SimFs {
    /// Create a tree containing only the storage roots.
    pub fn new() -> Self {
        let nodes = STORAGE_ROOTS
            .iter()
            .map(|root| (root.to_string(), Node::Dir))
            .collect();
        SimFs { nodes }
    }

    /// Look up a node.
    pub fn get(&self, path: &str) -> Option<&Node> {
        let path = normalize(path);
        if path == "/" {
            return Some(&ROOT_NODE);
        }
        self.nodes.get(&path)
    }

    /// Check if a path is a directory.
    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.get(path), Some(Node::Dir))
    }

    /// Get a file's contents.
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        match self.get(path) {
            Some(Node::File(data)) => Some(data),
            _ => None,
        }
    }

    /// Direct children of a directory, in name order.
    pub fn children(&self, dir: &str) -> Vec<(String, &Node)> {
        let dir = normalize(dir);
        self.nodes
            .iter()
            .filter(|(path, _)| parent(path).as_deref() == Some(dir.as_str()))
            .map(|(path, node)| (file_name(path).to_string(), node))
            .collect()
    }

    fn is_root(path: &str) -> bool {
        path == "/" || STORAGE_ROOTS.contains(&path)
    }

    fn require_parent_dir(&self, path: &str) -> Result<(), FsError> {
        let parent = parent(path).ok_or(FsError::InvalidName)?;
        if parent == "/" {
            // Only the storage roots live directly under `/`.
            return Err(FsError::Denied);
        }
        match self.get(&parent) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File(_)) => Err(FsError::InvalidName),
            None => Err(FsError::NotExist),
        }
    }

    /// Create a directory whose parent exists.
    pub fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        let path = normalize(path);
        if self.get(&path).is_some() {
            return Err(FsError::AlreadyExist);
        }
        self.require_parent_dir(&path)?;
        self.nodes.insert(path, Node::Dir);
        Ok(())
    }

    /// Create a directory and any missing parents.
    pub fn mkdir_all(&mut self, path: &str) {
        let path = normalize(path);
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            self.nodes.entry(current.clone()).or_insert(Node::Dir);
        }
    }

    /// Remove a file or empty directory.
    pub fn remove(&mut self, path: &str) -> Result<(), FsError> {
        let path = normalize(path);
        if Self::is_root(&path) {
            return Err(FsError::Denied);
        }
        match self.nodes.get(&path) {
            None => Err(FsError::NotExist),
            Some(Node::Dir) if !self.children(&path).is_empty() => Err(FsError::NotEmpty),
            Some(_) => {
                self.nodes.remove(&path);
                Ok(())
            }
        }
    }

    /// Append bytes to a file, creating it if needed.
    pub fn append(&mut self, path: &str, data: &[u8]) -> Result<(), FsError> {
        let path = normalize(path);
        match self.nodes.get_mut(&path) {
            Some(Node::File(contents)) => {
                contents.extend_from_slice(data);
                Ok(())
            }
            Some(Node::Dir) => Err(FsError::InvalidName),
            None => {
                self.require_parent_dir(&path)?;
                self.nodes.insert(path, Node::File(data.to_vec()));
                Ok(())
            }
        }
    }

    /// Check that a chunk could be appended to `path`.
    pub fn check_writable(&self, path: &str) -> Result<(), FsError> {
        match self.get(path) {
            Some(Node::File(_)) => Ok(()),
            Some(Node::Dir) => Err(FsError::InvalidName),
            None => self.require_parent_dir(&normalize(path)),
        }
    }

    /// Write a whole file, creating parents as needed.
    pub fn insert_file(&mut self, path: &str, data: &[u8]) {
        let path = normalize(path);
        if let Some(parent) = parent(&path) {
            self.mkdir_all(&parent);
        }
        self.nodes.insert(path, Node::File(data.to_vec()));
    }

    /// Move a file or directory (with its subtree).
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), FsError> {
        let from = normalize(from);
        let to = normalize(to);
        if Self::is_root(&from) {
            return Err(FsError::Denied);
        }
        if self.get(&from).is_none() {
            return Err(FsError::NotExist);
        }
        if self.get(&to).is_some() {
            return Err(FsError::AlreadyExist);
        }
        if to.starts_with(&format!("{}/", from)) {
            return Err(FsError::InvalidName);
        }
        self.require_parent_dir(&to)?;

        let prefix = format!("{}/", from);
        let moved: Vec<String> = self
            .nodes
            .keys()
            .filter(|path| **path == from || path.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = self.nodes.remove(&old) {
                let new = format!("{}{}", to, &old[from.len()..]);
                self.nodes.insert(new, node);
            }
        }
        Ok(())
    }

    /// Describe a path the way `storage stat` does.
    pub fn stat(&self, path: &str) -> Result<String, FsError> {
        let path = normalize(path);
        if STORAGE_ROOTS.contains(&path.as_str()) {
            let used: u64 = self
                .nodes
                .iter()
                .filter(|(p, _)| p.starts_with(&format!("{}/", path)))
                .map(|(_, node)| match node {
                    Node::File(data) => data.len() as u64,
                    Node::Dir => 0,
                })
                .sum();
            let free = ROOT_CAPACITY_KIB.saturating_sub(used.div_ceil(1024));
            return Ok(format!(
                "Storage, {}KiB total, {}KiB free",
                ROOT_CAPACITY_KIB, free
            ));
        }
        match self.get(&path) {
            Some(Node::Dir) => Ok("Directory".to_string()),
            Some(Node::File(data)) => Ok(format!("File, size: {}b", data.len())),
            None => Err(FsError::NotExist),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots_exist() {
        let fs = SimFs::new();
        assert!(fs.is_dir("/"));
        assert!(fs.is_dir("/ext"));
        assert!(fs.is_dir("/int"));
        let names: Vec<String> = fs.children("/").into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["ext", "int"]);
    }

    #[test]
    fn test_mkdir_requires_parent() {
        let mut fs = SimFs::new();
        assert_eq!(fs.mkdir("/ext/a/b"), Err(FsError::NotExist));
        fs.mkdir("/ext/a").unwrap();
        fs.mkdir("/ext/a/b").unwrap();
        assert_eq!(fs.mkdir("/ext/a"), Err(FsError::AlreadyExist));
        assert_eq!(fs.mkdir("/usb"), Err(FsError::Denied));
    }

    #[test]
    fn test_remove_rules() {
        let mut fs = SimFs::new();
        fs.insert_file("/ext/d/f.txt", b"x");
        assert_eq!(fs.remove("/ext/d"), Err(FsError::NotEmpty));
        fs.remove("/ext/d/f.txt").unwrap();
        fs.remove("/ext/d").unwrap();
        assert_eq!(fs.remove("/ext/d"), Err(FsError::NotExist));
        assert_eq!(fs.remove("/ext"), Err(FsError::Denied));
    }

    #[test]
    fn test_rename_moves_subtree() {
        let mut fs = SimFs::new();
        fs.insert_file("/ext/a/b/c.txt", b"abc");
        fs.rename("/ext/a", "/ext/z").unwrap();
        assert_eq!(fs.file("/ext/z/b/c.txt"), Some(&b"abc"[..]));
        assert!(fs.get("/ext/a").is_none());
        assert_eq!(fs.rename("/ext/z", "/ext/z/inner"), Err(FsError::InvalidName));
    }

    #[test]
    fn test_stat() {
        let mut fs = SimFs::new();
        fs.insert_file("/ext/f.bin", &[0u8; 10]);
        assert_eq!(fs.stat("/ext/f.bin").unwrap(), "File, size: 10b");
        assert!(fs.stat("/ext").unwrap().starts_with("Storage, "));
        assert_eq!(fs.stat("/ext/none"), Err(FsError::NotExist));
    }
}
