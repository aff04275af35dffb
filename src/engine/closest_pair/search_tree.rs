//! Search structure combining a binary tree with a circular
//! doubly-linked order, so that ordered predecessor/successor walks are
//! O(1) per step while insertion and removal stay O(log n) expected.
//!
//! Nodes live in a fixed-capacity arena addressed by `u32`; the maximum
//! size must be known up front. Built from a sorted slice by recursive
//! scale-halving, which yields a well-balanced initial tree; subsequent
//! inserts and removes do not rebalance (removal alternates predecessor
//! and successor replacement to avoid systematic skew).

pub(crate) const NONE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct Node<T> {
    value: T,
    left: u32,
    right: u32,
    parent: u32,
    succ: u32,
    pred: u32,
}

pub(crate) struct SearchTree<T> {
    nodes: Vec<Node<T>>,
    free: Vec<u32>,
    top: u32,
    n_removes: usize,
}

impl<T: Copy + Default + Ord> SearchTree<T> {
    /// Build from an ordered slice, with arena head-room up to
    /// `max_size` nodes.
    pub fn new(init: &[T], max_size: usize) -> Self {
        let n = init.len();
        assert!(n >= 1, "search tree cannot start empty");
        assert!(max_size >= n);
        debug_assert!(init.windows(2).all(|w| w[0] <= w[1]), "input not sorted");

        let mut nodes: Vec<Node<T>> = Vec::with_capacity(max_size);
        for (i, &v) in init.iter().enumerate() {
            nodes.push(Node {
                value: v,
                left: NONE,
                right: NONE,
                parent: NONE,
                pred: if i == 0 { (n - 1) as u32 } else { (i - 1) as u32 },
                succ: if i + 1 == n { 0 } else { (i + 1) as u32 },
            });
        }
        for _ in n..max_size {
            nodes.push(Node {
                value: T::default(),
                left: NONE,
                right: NONE,
                parent: NONE,
                pred: NONE,
                succ: NONE,
            });
        }
        let free: Vec<u32> = (n as u32..max_size as u32).collect();

        let scale = (n + 1) / 2;
        let top = (n - 1).min(scale);
        let mut tree = SearchTree {
            nodes,
            free,
            top: top as u32,
            n_removes: 0,
        };
        tree.do_initial_connections(top, scale, 0, n);
        tree
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Any live node, usable as the start of a circular walk.
    #[inline]
    pub fn somewhere(&self) -> u32 {
        self.top
    }

    #[inline]
    pub fn value(&self, node: u32) -> &T {
        &self.nodes[node as usize].value
    }

    #[inline]
    pub fn succ(&self, node: u32) -> u32 {
        self.nodes[node as usize].succ
    }

    #[inline]
    pub fn pred(&self, node: u32) -> u32 {
        self.nodes[node as usize].pred
    }

    #[inline]
    fn treelinks_null(&self, i: usize) -> bool {
        let n = &self.nodes[i];
        n.parent == NONE && n.left == NONE && n.right == NONE
    }

    /// Recursive initial wiring over `[left_edge, right_edge)`, assuming
    /// `this_one`'s parent link is already set. Children are picked at
    /// halving scales so the depth stays logarithmic.
    fn do_initial_connections(
        &mut self,
        this_one: usize,
        scale: usize,
        left_edge: usize,
        right_edge: usize,
    ) {
        let ref_new_scale = (scale + 1) / 2;

        let mut new_scale = ref_new_scale;
        let mut did_child = false;
        loop {
            let left = this_one as isize - new_scale as isize;
            if left >= left_edge as isize && self.treelinks_null(left as usize) {
                let left = left as usize;
                self.nodes[left].parent = this_one as u32;
                self.nodes[this_one].left = left as u32;
                self.do_initial_connections(left, new_scale, left_edge, this_one);
                did_child = true;
                break;
            }
            let old = new_scale;
            new_scale = (old + 1) / 2;
            if new_scale == old {
                break;
            }
        }
        if !did_child {
            self.nodes[this_one].left = NONE;
        }

        let mut new_scale = ref_new_scale;
        let mut did_child = false;
        loop {
            let right = this_one + new_scale;
            if right < right_edge && self.treelinks_null(right) {
                self.nodes[right].parent = this_one as u32;
                self.nodes[this_one].right = right as u32;
                self.do_initial_connections(right, new_scale, this_one + 1, right_edge);
                did_child = true;
                break;
            }
            let old = new_scale;
            new_scale = (old + 1) / 2;
            if new_scale == old {
                break;
            }
        }
        if !did_child {
            self.nodes[this_one].right = NONE;
        }
    }

    /// If `node`'s parent exists, replace its link to `node` with `xx`.
    fn reset_parents_link(&mut self, node: usize, xx: u32) {
        let parent = self.nodes[node].parent;
        if parent == NONE {
            return;
        }
        if self.nodes[parent as usize].right == node as u32 {
            self.nodes[parent as usize].right = xx;
        } else {
            self.nodes[parent as usize].left = xx;
        }
    }

    fn find_predecessor(&self, node: usize) -> u32 {
        let left = self.nodes[node].left;
        if left != NONE {
            let mut d = left;
            while self.nodes[d as usize].right != NONE {
                d = self.nodes[d as usize].right;
            }
            d
        } else {
            let mut here = node as u32;
            let mut parent = self.nodes[node].parent;
            while parent != NONE && self.nodes[parent as usize].left == here {
                here = parent;
                parent = self.nodes[here as usize].parent;
            }
            parent
        }
    }

    fn find_successor(&self, node: usize) -> u32 {
        let right = self.nodes[node].right;
        if right != NONE {
            let mut d = right;
            while self.nodes[d as usize].left != NONE {
                d = self.nodes[d as usize].left;
            }
            d
        } else {
            let mut here = node as u32;
            let mut parent = self.nodes[node].parent;
            while parent != NONE && self.nodes[parent as usize].right == here {
                here = parent;
                parent = self.nodes[here as usize].parent;
            }
            parent
        }
    }

    /// Insert a value, returning its node id.
    pub fn insert(&mut self, value: T) -> u32 {
        let node = self
            .free
            .pop()
            .expect("search tree capacity exceeded") as usize;
        self.nodes[node].value = value;

        // walk down to a leaf slot
        let mut loc = self.top;
        let mut old_loc = NONE;
        let mut on_left = true;
        while loc != NONE {
            old_loc = loc;
            on_left = value < self.nodes[loc as usize].value;
            loc = if on_left {
                self.nodes[loc as usize].left
            } else {
                self.nodes[loc as usize].right
            };
        }
        self.nodes[node].parent = old_loc;
        if on_left {
            self.nodes[old_loc as usize].left = node as u32;
        } else {
            self.nodes[old_loc as usize].right = node as u32;
        }
        self.nodes[node].left = NONE;
        self.nodes[node].right = NONE;

        // splice into the circular order next to the tree neighbour
        let pred = self.find_predecessor(node);
        if pred != NONE {
            self.nodes[node].pred = pred;
            let succ = self.nodes[pred as usize].succ;
            self.nodes[node].succ = succ;
            self.nodes[pred as usize].succ = node as u32;
            self.nodes[succ as usize].pred = node as u32;
        } else {
            // left-most element of the tree; a successor must exist
            let succ = self.find_successor(node);
            debug_assert_ne!(succ, NONE, "insert into single-element ring");
            self.nodes[node].succ = succ;
            let pred = self.nodes[succ as usize].pred;
            self.nodes[node].pred = pred;
            self.nodes[succ as usize].pred = node as u32;
            self.nodes[pred as usize].succ = node as u32;
        }

        node as u32
    }

    /// Remove a node; its id goes back to the free list. The final
    /// element can never be removed.
    pub fn remove(&mut self, node_id: u32) {
        assert!(self.size() > 1, "cannot remove the last tree element");
        let node = node_id as usize;
        debug_assert!(!self.treelinks_null(node) || self.top == node_id);

        // unsplice from the circular order
        let pred = self.nodes[node].pred;
        let succ = self.nodes[node].succ;
        self.nodes[pred as usize].succ = succ;
        self.nodes[succ as usize].pred = pred;

        let left = self.nodes[node].left;
        let right = self.nodes[node].right;

        if left == NONE && right == NONE {
            self.reset_parents_link(node, NONE);
        } else if left != NONE && right == NONE {
            self.reset_parents_link(node, left);
            self.nodes[left as usize].parent = self.nodes[node].parent;
            if self.top == node_id {
                self.top = left;
            }
        } else if left == NONE && right != NONE {
            self.reset_parents_link(node, right);
            self.nodes[right as usize].parent = self.nodes[node].parent;
            if self.top == node_id {
                self.top = right;
            }
        } else {
            // two children: splice the predecessor or successor into our
            // place, alternating to avoid skewing the tree
            let use_predecessor = self.n_removes % 2 == 1;
            let replacement = if use_predecessor { pred } else { succ } as usize;

            if use_predecessor {
                // as our predecessor it has no right child
                debug_assert_eq!(self.nodes[replacement].right, NONE);
                if replacement as u32 != left {
                    let rl = self.nodes[replacement].left;
                    if rl != NONE {
                        self.nodes[rl as usize].parent = self.nodes[replacement].parent;
                    }
                    self.reset_parents_link(replacement, rl);
                    self.nodes[replacement].left = left;
                }
                self.nodes[replacement].parent = self.nodes[node].parent;
                self.nodes[replacement].right = right;
            } else {
                debug_assert_eq!(self.nodes[replacement].left, NONE);
                if replacement as u32 != right {
                    let rr = self.nodes[replacement].right;
                    if rr != NONE {
                        self.nodes[rr as usize].parent = self.nodes[replacement].parent;
                    }
                    self.reset_parents_link(replacement, rr);
                    self.nodes[replacement].right = right;
                }
                self.nodes[replacement].parent = self.nodes[node].parent;
                self.nodes[replacement].left = left;
            }
            self.reset_parents_link(node, replacement as u32);

            if left != replacement as u32 {
                self.nodes[left as usize].parent = replacement as u32;
            }
            if right != replacement as u32 {
                self.nodes[right as usize].parent = replacement as u32;
            }
            if self.top == node_id {
                self.top = replacement as u32;
            }
        }

        self.nodes[node].parent = NONE;
        self.nodes[node].left = NONE;
        self.nodes[node].right = NONE;
        self.nodes[node].pred = NONE;
        self.nodes[node].succ = NONE;

        self.n_removes += 1;
        self.free.push(node_id);
    }

    /// Consistency check over the whole structure; test-only.
    #[cfg(test)]
    pub fn verify_structure(&self) {
        let size = self.size();
        let mut n_top = 0usize;
        let mut n_null = 0usize;
        for i in 0..self.nodes.len() {
            if self.treelinks_null(i) && self.top != i as u32 {
                n_null += 1;
                continue;
            }
            let node = &self.nodes[i];
            if node.parent == NONE {
                n_top += 1;
            } else {
                let p = &self.nodes[node.parent as usize];
                assert!(
                    (p.left == i as u32) ^ (p.right == i as u32),
                    "node {} is not a child of its parent",
                    i
                );
            }
            if node.left != NONE {
                assert!(
                    !(node.value < self.nodes[node.left as usize].value),
                    "left child of {} out of order",
                    i
                );
            }
            if node.right != NONE {
                assert!(
                    !(self.nodes[node.right as usize].value < node.value),
                    "right child of {} out of order",
                    i
                );
            }
        }
        assert!(n_top == 1 || (n_top == 0 && size <= 1));
        assert!(n_null == self.free.len() || (n_null + 1 == self.free.len() && size == 1));

        // the circular order visits every live node exactly once, sorted
        // except for the single wrap from largest back to smallest
        let start = self.somewhere();
        let mut seen = 0usize;
        let mut wraps = 0usize;
        let mut circ = start;
        loop {
            let next = self.succ(circ);
            assert_eq!(self.pred(next), circ, "ring links inconsistent at {}", circ);
            if self.nodes[next as usize].value < self.nodes[circ as usize].value {
                wraps += 1;
            }
            seen += 1;
            circ = next;
            if circ == start {
                break;
            }
        }
        assert_eq!(seen, size, "ring does not cover the tree");
        assert!(wraps <= 1, "ring order violated: {} descents", wraps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_build_and_walk() {
        let values: Vec<u64> = (0..17).map(|i| i * 10).collect();
        let tree = SearchTree::new(&values, 32);
        tree.verify_structure();
        assert_eq!(tree.size(), 17);

        // one full circuit visits everything in order
        let start = tree.somewhere();
        let mut circ = tree.succ(start);
        let mut count = 1;
        while circ != start {
            circ = tree.succ(circ);
            count += 1;
        }
        assert_eq!(count, 17);
    }

    #[test]
    fn test_single_element() {
        let tree = SearchTree::new(&[7u64], 4);
        tree.verify_structure();
        let n = tree.somewhere();
        assert_eq!(tree.succ(n), n);
        assert_eq!(tree.pred(n), n);
    }

    #[test]
    fn test_insert_links_ring() {
        let mut tree = SearchTree::new(&[10u64, 20, 30, 40], 8);
        let n = tree.insert(25);
        tree.verify_structure();
        assert_eq!(*tree.value(tree.pred(n)), 20);
        assert_eq!(*tree.value(tree.succ(n)), 30);

        // smaller than everything: wraps to the largest via pred
        let lo = tree.insert(1);
        tree.verify_structure();
        assert_eq!(*tree.value(tree.succ(lo)), 10);
        assert_eq!(*tree.value(tree.pred(lo)), 40);
    }

    #[test]
    fn test_randomized_insert_remove() {
        let mut rng = ChaCha8Rng::seed_from_u64(31415);
        for n0 in [2usize, 5, 30, 200] {
            let max_size = 2 * n0 + 8;
            let mut values: Vec<u64> = (0..n0 as u64).map(|i| i * 1000).collect();
            values.sort_unstable();
            let mut tree = SearchTree::new(&values, max_size);
            let mut live: Vec<u32> = (0..n0 as u32).collect();

            for step in 0..400 {
                if tree.size() > 1 && (rng.gen_bool(0.5) || tree.free_is_empty()) {
                    let k = rng.gen_range(0..live.len());
                    let node = live.swap_remove(k);
                    tree.remove(node);
                } else {
                    let v: u64 = rng.gen_range(0..1_000_000);
                    live.push(tree.insert(v));
                }
                if step % 16 == 0 {
                    tree.verify_structure();
                }
            }
            tree.verify_structure();
        }
    }

    impl<T> SearchTree<T> {
        fn free_is_empty(&self) -> bool {
            self.free.is_empty()
        }
    }
}
