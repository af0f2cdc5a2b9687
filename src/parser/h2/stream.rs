//! HTTP/2 stream bookkeeping: a self-balancing binary search tree keyed by
//! stream id, grounded on `original_source/src/http/avl.c`
//! (`rotate_left`/`rotate_right`/`avl_insert`/`avl_find`).

use crate::hpack::HeaderField;

/// Per-stream state. `request` accumulates the HPACK-decoded header
/// fields once HEADERS (+ CONTINUATION) reassembly finishes.
#[derive(Debug, Default)]
pub struct H2Stream {
    /// Stream id, odd and non-zero.
    pub id: u32,
    /// Decoded request header fields.
    pub request: Vec<HeaderField>,
    /// Set once the client sent `END_STREAM`.
    pub end_stream: bool,
    /// Set once a response has been emitted for this stream.
    pub response_sent: bool,
}

impl H2Stream {
    fn new(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

struct Node {
    stream: H2Stream,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
    height: i32,
}

impl Node {
    fn new(id: u32) -> Box<Self> {
        Box::new(Node {
            stream: H2Stream::new(id),
            left: None,
            right: None,
            height: 1,
        })
    }
}

fn height(node: &Option<Box<Node>>) -> i32 {
    node.as_ref().map_or(0, |n| n.height)
}

fn balance_factor(node: &Node) -> i32 {
    height(&node.left) - height(&node.right)
}

fn update_height(node: &mut Node) {
    node.height = 1 + height(&node.left).max(height(&node.right));
}

fn rotate_right(mut y: Box<Node>) -> Box<Node> {
    let mut x = y.left.take().expect("rotate_right requires a left child");
    y.left = x.right.take();
    update_height(&mut y);
    x.right = Some(y);
    update_height(&mut x);
    x
}

fn rotate_left(mut x: Box<Node>) -> Box<Node> {
    let mut y = x.right.take().expect("rotate_left requires a right child");
    x.right = y.left.take();
    update_height(&mut x);
    y.left = Some(x);
    update_height(&mut y);
    y
}

fn rebalance(mut node: Box<Node>) -> Box<Node> {
    update_height(&mut node);
    let balance = balance_factor(&node);

    if balance > 1 {
        if node.left.as_ref().map_or(0, |l| balance_factor(l)) < 0 {
            node.left = Some(rotate_left(node.left.take().unwrap()));
        }
        return rotate_right(node);
    }
    if balance < -1 {
        if node.right.as_ref().map_or(0, |r| balance_factor(r)) > 0 {
            node.right = Some(rotate_right(node.right.take().unwrap()));
        }
        return rotate_left(node);
    }
    node
}

fn insert(node: Option<Box<Node>>, id: u32) -> Box<Node> {
    let mut node = match node {
        None => return Node::new(id),
        Some(n) => n,
    };

    match id.cmp(&node.stream.id) {
        std::cmp::Ordering::Less => node.left = Some(insert(node.left.take(), id)),
        std::cmp::Ordering::Greater => node.right = Some(insert(node.right.take(), id)),
        // Idempotent: an existing id is left untouched.
        std::cmp::Ordering::Equal => return node,
    }

    rebalance(node)
}

fn find<'a>(node: &'a Option<Box<Node>>, id: u32) -> Option<&'a H2Stream> {
    let n = node.as_ref()?;
    match id.cmp(&n.stream.id) {
        std::cmp::Ordering::Less => find(&n.left, id),
        std::cmp::Ordering::Greater => find(&n.right, id),
        std::cmp::Ordering::Equal => Some(&n.stream),
    }
}

fn find_mut<'a>(node: &'a mut Option<Box<Node>>, id: u32) -> Option<&'a mut H2Stream> {
    let n = node.as_mut()?;
    match id.cmp(&n.stream.id) {
        std::cmp::Ordering::Less => find_mut(&mut n.left, id),
        std::cmp::Ordering::Greater => find_mut(&mut n.right, id),
        std::cmp::Ordering::Equal => Some(&mut n.stream),
    }
}

/// An AVL tree of `H2Stream`s, one per HTTP/2 connection.
#[derive(Debug, Default)]
pub struct StreamTree {
    root: Option<Box<Node>>,
}

impl StreamTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `id` if absent (idempotent) and returns a mutable
    /// reference to its stream.
    pub fn insert_or_get(&mut self, id: u32) -> &mut H2Stream {
        self.root = Some(insert(self.root.take(), id));
        find_mut(&mut self.root, id).expect("just inserted")
    }

    /// Looks up a stream by id without inserting.
    pub fn get(&self, id: u32) -> Option<&H2Stream> {
        find(&self.root, id)
    }

    /// Looks up a stream by id, mutably, without inserting.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut H2Stream> {
        find_mut(&mut self.root, id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insert_is_idempotent_for_existing_id() {
        let mut tree = StreamTree::new();
        tree.insert_or_get(1).request.push(HeaderField {
            name: ":method".into(),
            value: "GET".into(),
        });
        tree.insert_or_get(1);
        assert_eq!(1, tree.get(1).unwrap().request.len());
    }

    #[test]
    fn tree_stays_balanced_across_many_inserts() {
        let mut tree = StreamTree::new();
        for id in (1..=201).step_by(2) {
            tree.insert_or_get(id);
        }
        let h = height(&tree.root);
        // balanced for 101 nodes should be well under a linear 101.
        assert!(h < 20, "tree height {h} looks unbalanced");
    }

    #[test]
    fn find_returns_none_for_missing_stream() {
        let tree = StreamTree::new();
        assert!(tree.get(3).is_none());
    }
}
