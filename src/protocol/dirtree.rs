//! Directory-tree codec.
//!
//! A directory listing is a rose tree: every node has a UTF-8 name and an
//! ordered list of children. The tree is flattened depth-first with one
//! line pair per node and nothing else between a parent and its children:
//!
//! ```text
//! NodeName:<name>\r\n
//! ChildNum:<k>\r\n
//! <k serialized child nodes back-to-back>
//! ```
//!
//! The codec is line-oriented, so a name containing `\r`, `\n`, or NUL can
//! never round-trip; the encoder rejects such names up front instead of
//! emitting bytes the decoder would misparse.

use super::marshal::Cursor;
use super::ProtocolError;

/// Header carrying a node's name.
pub const HEADER_NODE_NAME: &str = "NodeName";
/// Header carrying a node's child count.
pub const HEADER_CHILD_NUM: &str = "ChildNum";

/// One node of a directory tree. Children own their subtrees outright, so
/// dropping the root releases the whole structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirTreeNode {
    pub name: String,
    pub children: Vec<DirTreeNode>,
}

impl DirTreeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(name: impl Into<String>, children: Vec<DirTreeNode>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }

    /// Total node count, root included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(DirTreeNode::node_count).sum::<usize>()
    }
}

/// Serialize a tree depth-first.
///
/// Fails with [`ProtocolError::MalformedArgument`] if any node name contains
/// a byte the line-oriented format cannot carry.
pub fn encode_tree(root: &DirTreeNode) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::new();
    encode_node(root, &mut out)?;
    Ok(out)
}

fn encode_node(node: &DirTreeNode, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    if node.name.contains(['\r', '\n', '\0']) {
        return Err(ProtocolError::MalformedArgument(format!(
            "node name {:?} contains a line terminator or NUL",
            node.name
        )));
    }
    out.extend_from_slice(HEADER_NODE_NAME.as_bytes());
    out.push(b':');
    out.extend_from_slice(node.name.as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(HEADER_CHILD_NUM.as_bytes());
    out.push(b':');
    out.extend_from_slice(node.children.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for child in &node.children {
        encode_node(child, out)?;
    }
    Ok(())
}

/// Rebuild a tree from its depth-first serialization. The whole buffer must
/// be consumed; trailing bytes mean the stream is corrupt.
pub fn decode_tree(buf: &[u8]) -> Result<DirTreeNode, ProtocolError> {
    let mut cur = Cursor::new(buf);
    let root = decode_node(&mut cur)?;
    if !cur.is_exhausted() {
        return Err(ProtocolError::MalformedMessage(
            "trailing bytes after directory tree".into(),
        ));
    }
    Ok(root)
}

fn decode_node(cur: &mut Cursor<'_>) -> Result<DirTreeNode, ProtocolError> {
    let name_bytes = cur.header(HEADER_NODE_NAME)?;
    let name = std::str::from_utf8(name_bytes)
        .map_err(|_| {
            ProtocolError::MalformedMessage(format!(
                "node name is not UTF-8: {:?}",
                String::from_utf8_lossy(name_bytes)
            ))
        })?
        .to_string();
    let child_num = cur.header_int(HEADER_CHILD_NUM)?;
    if child_num < 0 {
        return Err(ProtocolError::MalformedMessage(format!(
            "negative child count {} for node {:?}",
            child_num, name
        )));
    }
    let mut children = Vec::new();
    for _ in 0..child_num {
        children.push(decode_node(cur)?);
    }
    Ok(DirTreeNode { name, children })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> DirTreeNode {
        DirTreeNode::with_children(
            "tmp",
            vec![
                DirTreeNode::new("a.txt"),
                DirTreeNode::with_children("sub", vec![DirTreeNode::new("x")]),
            ],
        )
    }

    #[test]
    fn test_wire_image() {
        let bytes = encode_tree(&sample_tree()).unwrap();
        assert_eq!(
            bytes,
            b"NodeName:tmp\r\nChildNum:2\r\n\
              NodeName:a.txt\r\nChildNum:0\r\n\
              NodeName:sub\r\nChildNum:1\r\n\
              NodeName:x\r\nChildNum:0\r\n"
                .as_slice()
        );
    }

    #[test]
    fn test_round_trip_preserves_structure_and_order() {
        let tree = sample_tree();
        let decoded = decode_tree(&encode_tree(&tree).unwrap()).unwrap();
        assert_eq!(decoded, tree);
        assert_eq!(decoded.children[0].name, "a.txt");
        assert_eq!(decoded.children[1].name, "sub");
        assert_eq!(decoded.children[1].children[0].name, "x");
        assert_eq!(decoded.node_count(), 4);
    }

    #[test]
    fn test_leaf_round_trip() {
        let leaf = DirTreeNode::new("lonely");
        assert_eq!(decode_tree(&encode_tree(&leaf).unwrap()).unwrap(), leaf);
    }

    #[test]
    fn test_deep_chain_round_trip() {
        let mut node = DirTreeNode::new("leaf");
        for i in 0..100 {
            node = DirTreeNode::with_children(format!("d{}", i), vec![node]);
        }
        let decoded = decode_tree(&encode_tree(&node).unwrap()).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(decoded.node_count(), 101);
    }

    #[test]
    fn test_name_with_line_terminator_is_rejected() {
        for bad in ["a\r\nb", "a\rb", "a\nb", "a\0b"] {
            let tree = DirTreeNode::new(bad);
            assert!(matches!(
                encode_tree(&tree),
                Err(ProtocolError::MalformedArgument(_))
            ));
        }
    }

    #[test]
    fn test_truncated_stream_is_malformed() {
        let bytes = encode_tree(&sample_tree()).unwrap();
        let truncated = &bytes[..bytes.len() - 10];
        assert!(matches!(
            decode_tree(truncated),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_trailing_bytes_are_malformed() {
        let mut bytes = encode_tree(&sample_tree()).unwrap();
        bytes.extend_from_slice(b"NodeName:extra\r\nChildNum:0\r\n");
        assert!(matches!(
            decode_tree(&bytes),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_child_count_deficit_is_malformed() {
        let bytes = b"NodeName:root\r\nChildNum:3\r\nNodeName:only\r\nChildNum:0\r\n";
        assert!(matches!(
            decode_tree(bytes),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }
}
