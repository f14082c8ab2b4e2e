// ABOUTME: Overlay merge of two project file trees
// ABOUTME: Directories combine key-wise; on any other conflict the overlay node replaces the base

use crate::tree::{FileNode, FileTree};

/// Merge `overlay` on top of `base`, returning a new tree.
///
/// Neither input is modified. Two directories under the same name are merged
/// recursively; every other collision (file vs file, file vs directory) takes
/// the overlay's node whole. There is no line-level merging of contents.
///
/// The operation is not commutative: `merge(a, b)` keeps `b`'s version of any
/// conflicting file while `merge(b, a)` keeps `a`'s.
pub fn merge(base: &FileTree, overlay: &FileTree) -> FileTree {
    let mut merged = base.clone();
    for (name, overlay_node) in overlay.entries() {
        let node = match (base.child(name), overlay_node) {
            (Some(FileNode::Directory(base_children)), FileNode::Directory(overlay_children)) => {
                FileNode::Directory(merge(base_children, overlay_children))
            }
            _ => overlay_node.clone(),
        };
        merged.insert_node(name.clone(), node);
    }
    merged
}
