// src/source/tree.rs

//! In-memory file tree with arena allocation and O(1) path lookup
//!
//! Every source indexes its contents into a [`FileTree`]: nodes live in a
//! contiguous arena referenced by [`NodeId`] indices, and a path map gives
//! constant-time lookup without tree traversal. Symlink resolution happens
//! against the tree, so resolvers never touch the underlying medium to
//! answer path queries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Index into the arena for referencing nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Maximum symlink hops before a path is considered a cycle
const MAX_LINK_DEPTH: usize = 40;

/// Where a file node's bytes live
#[derive(Debug, Clone)]
pub enum ContentRef {
    /// No content backing (synthetic or description-only entries)
    None,
    /// A file on the local disk
    Disk(PathBuf),
    /// A byte range within an uncompressed tar archive on disk
    TarSegment {
        archive: Arc<PathBuf>,
        offset: u64,
        size: u64,
    },
    /// Bytes held in memory
    Inline(Arc<Vec<u8>>),
}

/// Type of tree node
#[derive(Debug, Clone)]
pub enum NodeKind {
    Directory,
    File { size: u64, content: ContentRef },
    Symlink { target: String },
}

/// A node in the file tree
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    mode: u32,
    /// Layer digest for layered sources, empty otherwise
    file_system_id: String,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn file_system_id(&self) -> &str {
        &self.file_system_id
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File { .. })
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, NodeKind::Symlink { .. })
    }

    pub fn size(&self) -> u64 {
        match &self.kind {
            NodeKind::File { size, .. } => *size,
            _ => 0,
        }
    }

    pub fn link_target(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Symlink { target } => Some(target),
            _ => None,
        }
    }

    pub fn content(&self) -> Option<&ContentRef> {
        match &self.kind {
            NodeKind::File { content, .. } => Some(content),
            _ => None,
        }
    }
}

/// Normalize a path to an absolute, slash-separated, dot-free form.
///
/// `..` components are resolved lexically; escaping above the root clamps
/// at the root.
pub fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Join a possibly relative target onto the directory holding `base`.
fn join_relative(base: &str, target: &str) -> String {
    if target.starts_with('/') {
        normalize_path(target)
    } else {
        let parent = match base.rfind('/') {
            Some(0) | None => "/",
            Some(idx) => &base[..idx],
        };
        normalize_path(&format!("{}/{}", parent, target))
    }
}

/// An in-memory filesystem tree
#[derive(Debug, Default, Clone)]
pub struct FileTree {
    nodes: Vec<Node>,
    by_path: HashMap<String, NodeId>,
}

impl FileTree {
    pub fn new() -> Self {
        let mut tree = FileTree {
            nodes: Vec::new(),
            by_path: HashMap::new(),
        };
        let root = tree.push_node(Node {
            name: String::new(),
            kind: NodeKind::Directory,
            parent: None,
            children: Vec::new(),
            mode: 0o755,
            file_system_id: String::new(),
        });
        tree.by_path.insert("/".to_string(), root);
        tree
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.len() <= 1
    }

    /// Look up a node by exact path, no symlink resolution.
    pub fn get(&self, path: &str) -> Option<NodeId> {
        self.by_path.get(&normalize_path(path)).copied()
    }

    /// Ensure a directory exists at the given path, creating ancestors.
    fn ensure_dir(&mut self, path: &str) -> NodeId {
        let path = normalize_path(path);
        if let Some(id) = self.by_path.get(&path) {
            return *id;
        }
        let parent_path = match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
        };
        let parent = self.ensure_dir(&parent_path);
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        let id = self.push_node(Node {
            name,
            kind: NodeKind::Directory,
            parent: Some(parent),
            children: Vec::new(),
            mode: 0o755,
            file_system_id: String::new(),
        });
        self.nodes[parent.0].children.push(id);
        self.by_path.insert(path, id);
        id
    }

    /// Insert (or replace) a node at the given path.
    pub fn insert(
        &mut self,
        path: &str,
        kind: NodeKind,
        mode: u32,
        file_system_id: &str,
    ) -> NodeId {
        let path = normalize_path(path);
        if path == "/" {
            return self.by_path["/"];
        }

        if let Some(existing) = self.by_path.get(&path).copied() {
            // replacing a directory with a file drops its subtree
            if self.nodes[existing.0].is_dir() && !matches!(kind, NodeKind::Directory) {
                self.remove(&path);
            } else {
                self.nodes[existing.0].kind = kind;
                self.nodes[existing.0].mode = mode;
                self.nodes[existing.0].file_system_id = file_system_id.to_string();
                return existing;
            }
        }

        let parent_path = match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
        };
        let parent = self.ensure_dir(&parent_path);
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        let id = self.push_node(Node {
            name,
            kind,
            parent: Some(parent),
            children: Vec::new(),
            mode,
            file_system_id: file_system_id.to_string(),
        });
        self.nodes[parent.0].children.push(id);
        self.by_path.insert(path, id);
        id
    }

    /// Remove the node at `path` and its entire subtree.
    pub fn remove(&mut self, path: &str) {
        let path = normalize_path(path);
        if path == "/" {
            return;
        }
        let Some(id) = self.by_path.remove(&path) else {
            return;
        };
        if let Some(parent) = self.nodes[id.0].parent {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
        let prefix = format!("{}/", path);
        self.by_path.retain(|p, _| !p.starts_with(&prefix));
    }

    /// Remove all children of the directory at `path` (opaque whiteout).
    pub fn clear_children(&mut self, path: &str) {
        let path = normalize_path(path);
        let children: Vec<String> = match self.by_path.get(&path) {
            Some(id) => self.nodes[id.0]
                .children
                .iter()
                .map(|c| self.path_of(*c))
                .collect(),
            None => return,
        };
        for child in children {
            self.remove(&child);
        }
    }

    /// The absolute path of a node.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &self.nodes[node_id.0];
            if node.parent.is_some() {
                parts.push(node.name.clone());
            }
            current = node.parent;
        }
        parts.reverse();
        if parts.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", parts.join("/"))
        }
    }

    /// Resolve a path with full symlink resolution.
    ///
    /// Returns the symlink-free real path and its node. `None` when the path
    /// does not exist or symlink depth exceeds the cycle cap.
    pub fn resolve(&self, path: &str) -> Option<(String, NodeId)> {
        self.resolve_depth(path, 0)
    }

    fn resolve_depth(&self, path: &str, depth: usize) -> Option<(String, NodeId)> {
        if depth > MAX_LINK_DEPTH {
            return None;
        }
        let path = normalize_path(path);
        let mut resolved = String::new();

        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        for (i, component) in components.iter().enumerate() {
            resolved.push('/');
            resolved.push_str(component);
            let id = *self.by_path.get(resolved.as_str())?;
            if let NodeKind::Symlink { target } = &self.nodes[id.0].kind {
                let mut spliced = join_relative(&resolved, target);
                for rest in &components[i + 1..] {
                    spliced.push('/');
                    spliced.push_str(rest);
                }
                return self.resolve_depth(&spliced, depth + 1);
            }
        }

        let final_path = if resolved.is_empty() {
            "/".to_string()
        } else {
            resolved
        };
        let id = *self.by_path.get(&final_path)?;
        Some((final_path, id))
    }

    /// All indexed paths in sorted order.
    pub fn all_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.by_path.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_node() -> NodeKind {
        NodeKind::File {
            size: 0,
            content: ContentRef::None,
        }
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/a/b/../c"), "/a/c");
        assert_eq!(normalize_path("a//b/./c/"), "/a/b/c");
        assert_eq!(normalize_path("/../.."), "/");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn test_insert_creates_ancestors() {
        let mut tree = FileTree::new();
        tree.insert("/usr/bin/bash", file_node(), 0o755, "");

        assert!(tree.get("/usr").is_some());
        assert!(tree.get("/usr/bin").is_some());
        let id = tree.get("/usr/bin/bash").unwrap();
        assert!(tree.node(id).is_file());
        assert_eq!(tree.path_of(id), "/usr/bin/bash");
    }

    #[test]
    fn test_symlink_resolution() {
        let mut tree = FileTree::new();
        tree.insert("/usr/bin/python3.11", file_node(), 0o755, "");
        tree.insert(
            "/usr/bin/python3",
            NodeKind::Symlink {
                target: "python3.11".to_string(),
            },
            0o777,
            "",
        );

        let (real, id) = tree.resolve("/usr/bin/python3").unwrap();
        assert_eq!(real, "/usr/bin/python3.11");
        assert!(tree.node(id).is_file());
    }

    #[test]
    fn test_symlink_in_ancestor_directory() {
        let mut tree = FileTree::new();
        tree.insert("/data/v2/config.json", file_node(), 0o644, "");
        tree.insert(
            "/current",
            NodeKind::Symlink {
                target: "/data/v2".to_string(),
            },
            0o777,
            "",
        );

        let (real, _) = tree.resolve("/current/config.json").unwrap();
        assert_eq!(real, "/data/v2/config.json");
    }

    #[test]
    fn test_symlink_cycle_detected() {
        let mut tree = FileTree::new();
        tree.insert(
            "/a",
            NodeKind::Symlink {
                target: "/b".to_string(),
            },
            0o777,
            "",
        );
        tree.insert(
            "/b",
            NodeKind::Symlink {
                target: "/a".to_string(),
            },
            0o777,
            "",
        );
        assert!(tree.resolve("/a").is_none());
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut tree = FileTree::new();
        tree.insert("/etc/app/a.conf", file_node(), 0o644, "");
        tree.insert("/etc/app/b.conf", file_node(), 0o644, "");
        tree.remove("/etc/app");

        assert!(tree.get("/etc/app").is_none());
        assert!(tree.get("/etc/app/a.conf").is_none());
        assert!(tree.get("/etc").is_some());
    }

    #[test]
    fn test_replace_keeps_single_path_entry() {
        let mut tree = FileTree::new();
        tree.insert("/bin/sh", file_node(), 0o755, "layer-1");
        tree.insert("/bin/sh", file_node(), 0o755, "layer-2");

        let id = tree.get("/bin/sh").unwrap();
        assert_eq!(tree.node(id).file_system_id(), "layer-2");
    }

    #[test]
    fn test_clear_children() {
        let mut tree = FileTree::new();
        tree.insert("/opt/app/one", file_node(), 0o644, "");
        tree.insert("/opt/app/two", file_node(), 0o644, "");
        tree.clear_children("/opt/app");

        assert!(tree.get("/opt/app").is_some());
        assert!(tree.get("/opt/app/one").is_none());
        assert!(tree.get("/opt/app/two").is_none());
    }
}
