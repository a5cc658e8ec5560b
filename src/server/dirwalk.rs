//! Local directory-tree enumeration for the getdirtree handler.
//!
//! Children appear in the order the directory stream yields them. Symbolic
//! links are not followed, so a link cycle cannot loop the walk and linked
//! directories stay leaves. Any error below the root (unreadable
//! subdirectory, racing unlink) fails the whole walk and surfaces as that
//! error's errno.

use std::io;
use std::path::Path;

use walkdir::WalkDir;

use crate::protocol::dirtree::DirTreeNode;

/// Enumerate the subtree rooted at `path`. The root node is named after
/// the final path component.
pub fn local_dirtree(path: &Path) -> io::Result<DirTreeNode> {
    // Depth-first entries, parents before children. A stack of open
    // subtrees turns the flat stream back into the rose tree: an entry at
    // depth `d` closes every subtree at depth >= `d` before opening its own.
    let mut stack: Vec<(usize, DirTreeNode)> = Vec::new();
    for entry in WalkDir::new(path).follow_links(false).min_depth(0) {
        let entry = entry?;
        let depth = entry.depth();
        let name = if depth == 0 {
            path.file_name()
                .unwrap_or(path.as_os_str())
                .to_string_lossy()
                .into_owned()
        } else {
            entry.file_name().to_string_lossy().into_owned()
        };

        while stack.last().map_or(false, |(d, _)| *d >= depth) {
            if let Some((_, done)) = stack.pop() {
                if let Some((_, parent)) = stack.last_mut() {
                    parent.children.push(done);
                }
            }
        }
        stack.push((depth, DirTreeNode::new(name)));
    }

    let (_, mut node) = stack
        .pop()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "empty directory walk"))?;
    while let Some((_, mut parent)) = stack.pop() {
        parent.children.push(node);
        node = parent;
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_walk_matches_layout() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub").join("x"), b"").unwrap();

        let tree = local_dirtree(dir.path()).unwrap();
        assert_eq!(
            tree.name,
            dir.path().file_name().unwrap().to_string_lossy()
        );
        assert_eq!(tree.children.len(), 2);

        let a = tree.children.iter().find(|c| c.name == "a.txt").unwrap();
        assert!(a.children.is_empty());

        let sub = tree.children.iter().find(|c| c.name == "sub").unwrap();
        assert_eq!(sub.children.len(), 1);
        assert_eq!(sub.children[0].name, "x");
    }

    #[test]
    fn test_nested_subtrees_close_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("one").join("two")).unwrap();
        fs::write(dir.path().join("one").join("two").join("deep"), b"").unwrap();
        fs::write(dir.path().join("after"), b"").unwrap();

        let tree = local_dirtree(dir.path()).unwrap();
        assert_eq!(tree.children.len(), 2);
        let one = tree.children.iter().find(|c| c.name == "one").unwrap();
        assert_eq!(one.children.len(), 1);
        assert_eq!(one.children[0].name, "two");
        assert_eq!(one.children[0].children[0].name, "deep");
        let after = tree.children.iter().find(|c| c.name == "after").unwrap();
        assert!(after.children.is_empty());
    }

    #[test]
    fn test_file_root_is_a_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("solo");
        fs::write(&file, b"data").unwrap();
        let tree = local_dirtree(&file).unwrap();
        assert_eq!(tree.name, "solo");
        assert!(tree.children.is_empty());
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = local_dirtree(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }
}
