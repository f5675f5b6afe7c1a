use super::*;

/// One node of the tree
///
/// `props` holds the unescaped property bytes. Their meaning depends on
/// `kind` and is interpreted by [`projection`] or the item catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub kind: u8,
    pub props: Vec<u8>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: u8) -> Self {
        Self {
            kind,
            props: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_props(kind: u8, props: Vec<u8>) -> Self {
        Self {
            kind,
            props,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            count += 1;
            pending.extend(&node.children);
        }
        count
    }
}

/// Parse a complete file: identifier followed by the root node
pub fn decode(bytes: &[u8]) -> Result<Node> {
    let identifier = bytes.get(..4).ok_or(Error::TruncatedInput {
        offset: bytes.len(),
        context: "file identifier",
    })?;
    if identifier != MAP_IDENTIFIER && identifier != CATALOG_IDENTIFIER {
        return Err(Error::format(0, "unknown file identifier"));
    }

    match bytes.get(4) {
        Some(&NODE_START) => {}
        Some(_) => return Err(Error::format(4, "missing root node start marker")),
        None => {
            return Err(Error::TruncatedInput {
                offset: 4,
                context: "root node",
            });
        }
    }

    let mut stack: Vec<Node> = Vec::new();
    let mut offset = 4;
    loop {
        let byte = *bytes.get(offset).ok_or(Error::TruncatedInput {
            offset,
            context: "node end marker",
        })?;

        match byte {
            NODE_START => {
                if stack.len() == MAX_NODE_DEPTH {
                    return Err(Error::LimitExceeded {
                        what: "node nesting",
                        limit: MAX_NODE_DEPTH,
                        actual: stack.len() + 1,
                    });
                }
                let (kind, next) = escaped_byte(bytes, offset + 1, "node kind")?;
                stack.push(Node::new(kind));
                offset = next;
            }
            NODE_END => {
                offset += 1;
                // A start marker was consumed for every node on the stack
                let Some(node) = stack.pop() else {
                    return Err(Error::format(offset - 1, "unbalanced node end marker"));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => {
                        if offset != bytes.len() {
                            return Err(Error::format(offset, "trailing bytes after root node"));
                        }
                        return Ok(node);
                    }
                }
            }
            _ => {
                let (value, next) = escaped_byte(bytes, offset, "node property")?;
                let Some(node) = stack.last_mut() else {
                    return Err(Error::format(offset, "property byte outside of a node"));
                };
                if !node.children.is_empty() {
                    return Err(Error::format(offset, "property byte after child node"));
                }
                node.props.push(value);
                offset = next;
            }
        }
    }
}

/// Read one possibly escaped byte, returning it and the offset following it
fn escaped_byte(bytes: &[u8], offset: usize, context: &'static str) -> Result<(u8, usize)> {
    match bytes.get(offset) {
        Some(&ESCAPE) => match bytes.get(offset + 1) {
            Some(&value) => Ok((value, offset + 2)),
            None => Err(Error::TruncatedInput {
                offset: offset + 1,
                context,
            }),
        },
        Some(&value) if is_marker(value) => Err(Error::format(offset, "unescaped node marker")),
        Some(&value) => Ok((value, offset + 1)),
        None => Err(Error::TruncatedInput { offset, context }),
    }
}

/// Serialize `root` behind `identifier`
///
/// Child order and property bytes are preserved exactly.
pub fn encode(root: &Node, identifier: [u8; 4]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(4 + root.props.len() + 2);
    out.extend_from_slice(&identifier);

    write_start(&mut out, root);
    let mut stack: Vec<(&Node, usize)> = vec![(root, 0)];
    while let Some(top) = stack.last_mut() {
        let node = top.0;
        match node.children.get(top.1) {
            Some(child) => {
                top.1 += 1;
                if stack.len() == MAX_NODE_DEPTH {
                    return Err(Error::LimitExceeded {
                        what: "node nesting",
                        limit: MAX_NODE_DEPTH,
                        actual: stack.len() + 1,
                    });
                }
                write_start(&mut out, child);
                stack.push((child, 0));
            }
            None => {
                out.push(NODE_END);
                stack.pop();
            }
        }
    }

    Ok(out)
}

fn write_start(out: &mut Vec<u8>, node: &Node) {
    out.push(NODE_START);
    escape_into(out, &[node.kind]);
    escape_into(out, &node.props);
}
