use smallvec::SmallVec;

type Prefix = SmallVec<[u8; 16]>;

struct Node<V> {
    // bytes consumed on the edge into this node; empty only for the root
    prefix: Prefix,
    value: Option<V>,
    // sorted by first prefix byte
    children: SmallVec<[Box<Node<V>>; 4]>,
    // keys stored in this subtree
    count: usize,
}

impl<V> Node<V> {
    fn root() -> Self {
        Node {
            prefix: Prefix::new(),
            value: None,
            children: SmallVec::new(),
            count: 0,
        }
    }

    fn leaf(prefix: &[u8], value: V) -> Self {
        Node {
            prefix: Prefix::from_slice(prefix),
            value: Some(value),
            children: SmallVec::new(),
            count: 1,
        }
    }

    #[inline]
    fn find_child(&self, byte: u8) -> Result<usize, usize> {
        self.children
            .binary_search_by(|child| child.prefix[0].cmp(&byte))
    }

    /// Splits this node's edge after `at` bytes, pushing the remainder down.
    fn split(self: &mut Box<Self>, at: usize) {
        let head = Prefix::from_slice(&self.prefix[..at]);
        let count = self.count;
        let intermediate = Box::new(Node {
            prefix: head,
            value: None,
            children: SmallVec::new(),
            count,
        });
        let mut lower = std::mem::replace(self, intermediate);
        lower.prefix = Prefix::from_slice(&lower.prefix[at..]);
        self.children.push(lower);
    }
}

#[inline]
fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// A path-compressed radix tree keyed on raw bytes.
///
/// Keys are ordered lexicographically byte by byte, so `"10"` sorts before
/// `"9"`. Every node keeps the number of keys below it, which makes
/// [`count`](RadixTree::count) a pair of root-to-leaf walks instead of a scan.
pub struct RadixTree<V> {
    root: Node<V>,
}

impl<V> Default for RadixTree<V> {
    fn default() -> Self {
        RadixTree::new()
    }
}

impl<V> RadixTree<V> {
    pub fn new() -> Self {
        RadixTree { root: Node::root() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.root.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.count == 0
    }

    pub fn clear(&mut self) {
        self.root = Node::root();
    }

    /// Inserts a key, returning the value it replaced.
    pub fn insert(&mut self, key: &[u8], value: V) -> Option<V> {
        insert_at(&mut self.root, key, value)
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let mut node = &self.root;
        let mut rest = key;
        loop {
            if rest.is_empty() {
                return node.value.as_ref();
            }
            let child: &Node<V> = &node.children[node.find_child(rest[0]).ok()?];
            rest = rest.strip_prefix(child.prefix.as_slice())?;
            node = child;
        }
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let mut node = &mut self.root;
        let mut rest = key;
        loop {
            if rest.is_empty() {
                return node.value.as_mut();
            }
            let index = node.find_child(rest[0]).ok()?;
            let child: &mut Node<V> = &mut node.children[index];
            rest = rest.strip_prefix(child.prefix.as_slice())?;
            node = child;
        }
    }

    #[inline]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        remove_at(&mut self.root, key)
    }

    /// Smallest key and its value.
    pub fn min(&self) -> Option<(Vec<u8>, &V)> {
        if self.is_empty() {
            return None;
        }
        let mut key = Vec::new();
        let mut node = &self.root;
        loop {
            if let Some(value) = &node.value {
                return Some((key, value));
            }
            node = &**node.children.first()?;
            key.extend_from_slice(&node.prefix);
        }
    }

    /// Largest key and its value.
    pub fn max(&self) -> Option<(Vec<u8>, &V)> {
        if self.is_empty() {
            return None;
        }
        let mut key = Vec::new();
        let mut node = &self.root;
        while let Some(last) = node.children.last() {
            node = &**last;
            key.extend_from_slice(&node.prefix);
        }
        node.value.as_ref().map(|value| (key, value))
    }

    /// Number of keys below `key`, or at most `key` when `inclusive`.
    pub fn rank(&self, key: &[u8], inclusive: bool) -> usize {
        let mut total = 0;
        let mut node = &self.root;
        let mut rest = key;
        loop {
            if rest.is_empty() {
                if inclusive && node.value.is_some() {
                    total += 1;
                }
                return total;
            }
            // this node's key is a proper prefix of `key`
            if node.value.is_some() {
                total += 1;
            }

            let mut next = None;
            for child in &node.children {
                match child.prefix[0].cmp(&rest[0]) {
                    std::cmp::Ordering::Less => total += child.count,
                    std::cmp::Ordering::Equal => {
                        next = Some(&**child);
                        break;
                    }
                    std::cmp::Ordering::Greater => break,
                }
            }
            let Some(child) = next else {
                return total;
            };

            let common = common_prefix_len(&child.prefix, rest);
            if common == child.prefix.len() {
                rest = &rest[common..];
                node = child;
                continue;
            }
            // the edge diverges from `key`: the whole subtree is on one side
            if common < rest.len() && child.prefix[common] < rest[common] {
                total += child.count;
            }
            return total;
        }
    }

    /// Number of keys `k` with `low <= k <= high`; zero when `low > high`.
    pub fn count(&self, low: &[u8], high: &[u8]) -> usize {
        if low > high {
            return 0;
        }
        self.rank(high, true) - self.rank(low, false)
    }

    /// Ascending iterator over all entries.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter::new(&self.root)
    }

    /// Ascending iterator starting at the first key `>= key`.
    pub fn iter_from(&self, key: &[u8]) -> Iter<'_, V> {
        Iter::seek(&self.root, key)
    }

    /// First entry whose key is `>= key`.
    pub fn lower_bound(&self, key: &[u8]) -> Option<(Vec<u8>, &V)> {
        self.iter_from(key).next()
    }

    /// Entries with `low <= key <= high`, ascending.
    pub fn range<'a>(
        &'a self,
        low: &[u8],
        high: &'a [u8],
    ) -> impl Iterator<Item = (Vec<u8>, &'a V)> + 'a {
        self.iter_from(low)
            .take_while(move |(key, _)| key.as_slice() <= high)
    }

    /// Visits every value mutably, in no particular order.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut V)) {
        let mut stack: Vec<&mut Node<V>> = vec![&mut self.root];
        while let Some(node) = stack.pop() {
            let Node {
                value, children, ..
            } = node;
            if let Some(value) = value.as_mut() {
                f(value);
            }
            for child in children.iter_mut() {
                stack.push(&mut **child);
            }
        }
    }
}

fn insert_at<V>(node: &mut Node<V>, key: &[u8], value: V) -> Option<V> {
    if key.is_empty() {
        let old = node.value.replace(value);
        if old.is_none() {
            node.count += 1;
        }
        return old;
    }

    let old = match node.find_child(key[0]) {
        Ok(index) => {
            let child = &mut node.children[index];
            let common = common_prefix_len(&child.prefix, key);
            if common < child.prefix.len() {
                child.split(common);
            }
            insert_at(child, &key[common..], value)
        }
        Err(index) => {
            node.children.insert(index, Box::new(Node::leaf(key, value)));
            None
        }
    };
    if old.is_none() {
        node.count += 1;
    }
    old
}

fn remove_at<V>(node: &mut Node<V>, key: &[u8]) -> Option<V> {
    if key.is_empty() {
        let old = node.value.take();
        if old.is_some() {
            node.count -= 1;
        }
        return old;
    }

    let index = node.find_child(key[0]).ok()?;
    let child = &mut node.children[index];
    let rest = key.strip_prefix(child.prefix.as_slice())?;
    let old = remove_at(child, rest)?;

    if child.count == 0 {
        node.children.remove(index);
    } else if child.value.is_none() && child.children.len() == 1 {
        // fold a pass-through node into its only child
        if let Some(mut grandchild) = child.children.pop() {
            let mut prefix = std::mem::take(&mut child.prefix);
            prefix.extend_from_slice(&grandchild.prefix);
            grandchild.prefix = prefix;
            *child = grandchild;
        }
    }
    node.count -= 1;
    Some(old)
}

struct Frame<'a, V> {
    node: &'a Node<V>,
    next_child: usize,
    // key length before this node's prefix
    key_start: usize,
    visited: bool,
}

/// Lazy ascending iterator over a [`RadixTree`].
///
/// Keeps an explicit stack of the path to the current node, so it borrows
/// the tree but allocates only for the yielded keys.
pub struct Iter<'a, V> {
    stack: Vec<Frame<'a, V>>,
    key: Vec<u8>,
}

impl<'a, V> Iter<'a, V> {
    fn new(root: &'a Node<V>) -> Self {
        Iter {
            stack: vec![Frame {
                node: root,
                next_child: 0,
                key_start: 0,
                visited: false,
            }],
            key: Vec::new(),
        }
    }

    fn seek(root: &'a Node<V>, target: &[u8]) -> Self {
        let mut iter = Iter::new(root);
        let mut rest = target;
        while let Some(frame) = iter.stack.last_mut() {
            if rest.is_empty() {
                // the current node's key equals the target
                break;
            }
            frame.visited = true;

            let node = frame.node;
            let index = node.children.partition_point(|child| child.prefix[0] < rest[0]);
            frame.next_child = index;
            let Some(child) = node.children.get(index).map(|child| &**child) else {
                break;
            };
            if child.prefix[0] != rest[0] {
                break;
            }

            let common = common_prefix_len(&child.prefix, rest);
            if common == child.prefix.len() {
                frame.next_child = index + 1;
                let key_start = iter.key.len();
                iter.key.extend_from_slice(&child.prefix);
                iter.stack.push(Frame {
                    node: child,
                    next_child: 0,
                    key_start,
                    visited: false,
                });
                rest = &rest[common..];
                continue;
            }
            if common < rest.len() && child.prefix[common] < rest[common] {
                // the whole subtree sorts before the target
                frame.next_child = index + 1;
            }
            break;
        }
        iter
    }
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (Vec<u8>, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.last_mut() {
            let node = frame.node;
            if !frame.visited {
                frame.visited = true;
                if let Some(value) = &node.value {
                    return Some((self.key.clone(), value));
                }
            }

            if let Some(child) = node.children.get(frame.next_child).map(|child| &**child) {
                frame.next_child += 1;
                let key_start = self.key.len();
                self.key.extend_from_slice(&child.prefix);
                self.stack.push(Frame {
                    node: child,
                    next_child: 0,
                    key_start,
                    visited: false,
                });
            } else {
                let key_start = frame.key_start;
                self.stack.pop();
                self.key.truncate(key_start);
            }
        }
        None
    }
}
