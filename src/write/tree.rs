//! Source hierarchy for image authoring
//!
//! Callers build a [`SourceTree`] of directories and files, then hand
//! it to the layout planner. File content stays behind an
//! [`ExtentSource`] so large inputs are streamed, never buffered whole.

use crate::error::{LayoutError, Result};
use crate::source::{ExtentSource, MemorySource};
use crate::types::EntryKind;
use crate::utils::datetime::DateTime7;

/// Index of a node in its [`SourceTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u32);

impl SourceId {
    /// Arena index
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One node of the source hierarchy
pub struct SourceNode {
    /// Name as the caller supplied it; identifier mapping happens in
    /// the layout planner
    pub name: String,

    /// File or directory
    pub kind: EntryKind,

    /// Modification timestamp recorded on the directory record
    pub modified: DateTime7,

    /// Hidden flag on the directory record
    pub hidden: bool,

    /// Content size in bytes (0 for directories)
    pub size: u64,

    pub(crate) content: Option<Box<dyn ExtentSource>>,
    pub(crate) parent: SourceId,
    pub(crate) children: Vec<SourceId>,
}

/// Hierarchy to be serialized into an image
pub struct SourceTree {
    nodes: Vec<SourceNode>,
}

impl SourceTree {
    /// Create a tree holding only the root directory
    pub fn new() -> Self {
        Self {
            nodes: vec![SourceNode {
                name: String::new(),
                kind: EntryKind::Directory,
                modified: DateTime7::default(),
                hidden: false,
                size: 0,
                content: None,
                parent: SourceId(0),
                children: Vec::new(),
            }],
        }
    }

    /// Root directory index
    pub fn root(&self) -> SourceId {
        SourceId(0)
    }

    /// Add a directory under `parent`
    pub fn add_dir(&mut self, parent: SourceId, name: &str) -> Result<SourceId> {
        self.add_node(
            parent,
            SourceNode {
                name: name.to_string(),
                kind: EntryKind::Directory,
                modified: DateTime7::default(),
                hidden: false,
                size: 0,
                content: None,
                parent,
                children: Vec::new(),
            },
        )
    }

    /// Add a file under `parent` with streamed content
    pub fn add_file(
        &mut self,
        parent: SourceId,
        name: &str,
        content: Box<dyn ExtentSource>,
    ) -> Result<SourceId> {
        let size = content.len();
        self.add_node(
            parent,
            SourceNode {
                name: name.to_string(),
                kind: EntryKind::File,
                modified: DateTime7::default(),
                hidden: false,
                size,
                content: Some(content),
                parent,
                children: Vec::new(),
            },
        )
    }

    /// Add a file under `parent` with in-memory content
    pub fn add_file_bytes(&mut self, parent: SourceId, name: &str, bytes: Vec<u8>) -> Result<SourceId> {
        self.add_file(parent, name, Box::new(MemorySource::new(bytes)))
    }

    fn add_node(&mut self, parent: SourceId, node: SourceNode) -> Result<SourceId> {
        if self.nodes[parent.index()].kind != EntryKind::Directory {
            return Err(LayoutError::NotADirectory(self.nodes[parent.index()].name.clone()).into());
        }
        if node.name.is_empty() || node.name.len() > crate::types::MAX_PATH_LENGTH {
            return Err(LayoutError::NameTooLong(node.name).into());
        }
        if self
            .children(parent)
            .iter()
            .any(|&c| self.node(c).name.eq_ignore_ascii_case(&node.name))
        {
            return Err(LayoutError::DuplicateName(node.name).into());
        }
        let id = SourceId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.nodes[parent.index()].children.push(id);
        Ok(id)
    }

    /// Node by index
    pub fn node(&self, id: SourceId) -> &SourceNode {
        &self.nodes[id.index()]
    }

    /// Mutable node access for metadata adjustments
    pub fn node_mut(&mut self, id: SourceId) -> &mut SourceNode {
        &mut self.nodes[id.index()]
    }

    /// Children of a directory
    pub fn children(&self, id: SourceId) -> &[SourceId] {
        &self.nodes[id.index()].children
    }

    /// Total node count, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when only the root exists
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub(crate) fn content(&self, id: SourceId) -> Option<&dyn ExtentSource> {
        self.nodes[id.index()].content.as_deref()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = SourceId> + '_ {
        (0..self.nodes.len() as u32).map(SourceId)
    }
}

impl Default for SourceTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_hierarchy() {
        let mut tree = SourceTree::new();
        let sub = tree.add_dir(tree.root(), "sub").unwrap();
        tree.add_file_bytes(sub, "a.txt", b"hello".to_vec()).unwrap();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.children(tree.root()).len(), 1);
        assert_eq!(tree.node(sub).name, "sub");
    }

    #[test]
    fn duplicate_sibling_names_rejected() {
        let mut tree = SourceTree::new();
        tree.add_file_bytes(tree.root(), "A.TXT", Vec::new()).unwrap();
        assert!(tree.add_file_bytes(tree.root(), "a.txt", Vec::new()).is_err());
    }

    #[test]
    fn files_cannot_have_children() {
        let mut tree = SourceTree::new();
        let f = tree.add_file_bytes(tree.root(), "f", Vec::new()).unwrap();
        assert!(tree.add_dir(f, "sub").is_err());
    }
}
