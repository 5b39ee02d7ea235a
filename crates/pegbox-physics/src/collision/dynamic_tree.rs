//! Dynamic AABB tree
//!
//! Leaves hold fattened boxes so that small motions do not touch the tree.
//! Inserts pick a sibling greedily by perimeter increase, and every update
//! walks back to the root applying AVL-style rotations.

use pegbox_core::math::{Aabb, Vec2, cross_sv};
use pegbox_core::pool::{Handle, Pool};
use smallvec::SmallVec;

use super::RayCastInput;

/// Leaf handle returned by [`DynamicTree::create_proxy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(Handle);

#[derive(Debug, Clone)]
struct TreeNode<T> {
    aabb: Aabb,
    data: Option<T>,
    parent: Option<Handle>,
    child1: Option<Handle>,
    child2: Option<Handle>,
    /// Leaf = 0
    height: i32,
}

impl<T> TreeNode<T> {
    fn is_leaf(&self) -> bool {
        self.child1.is_none()
    }
}

type Stack = SmallVec<[Handle; 64]>;

/// Bounding volume hierarchy over fattened proxy boxes
#[derive(Debug, Clone)]
pub struct DynamicTree<T> {
    nodes: Pool<TreeNode<T>>,
    root: Option<Handle>,
    aabb_extension: f32,
    aabb_multiplier: f32,
    proxy_count: usize,
}

impl<T: Copy> DynamicTree<T> {
    /// Empty tree fattening leaves by `aabb_extension` and predicting
    /// motion by `aabb_multiplier` times the displacement
    pub fn new(aabb_extension: f32, aabb_multiplier: f32) -> Self {
        Self {
            nodes: Pool::new(),
            root: None,
            aabb_extension,
            aabb_multiplier,
            proxy_count: 0,
        }
    }

    pub fn create_proxy(&mut self, aabb: &Aabb, data: T) -> ProxyId {
        let node = self.nodes.insert(TreeNode {
            aabb: aabb.inflate(self.aabb_extension),
            data: Some(data),
            parent: None,
            child1: None,
            child2: None,
            height: 0,
        });
        self.insert_leaf(node);
        self.proxy_count += 1;
        ProxyId(node)
    }

    /// Remove a leaf and return its data, or `None` for a stale id
    pub fn destroy_proxy(&mut self, proxy: ProxyId) -> Option<T> {
        if !self.nodes.get(proxy.0).is_some_and(TreeNode::is_leaf) {
            return None;
        }
        self.remove_leaf(proxy.0);
        self.proxy_count -= 1;
        self.nodes.remove(proxy.0).and_then(|node| node.data)
    }

    /// Refit a leaf after its object moved.
    ///
    /// Returns false, leaving the tree untouched, while the stored fat box
    /// still contains `aabb`. Otherwise the leaf is re-fattened, stretched
    /// along the predicted displacement and reinserted.
    pub fn move_proxy(&mut self, proxy: ProxyId, aabb: &Aabb, displacement: Vec2) -> bool {
        match self.nodes.get(proxy.0) {
            Some(node) if node.is_leaf() => {
                if node.aabb.contains(aabb) {
                    return false;
                }
            }
            _ => return false,
        }

        self.remove_leaf(proxy.0);

        let mut fat = aabb.inflate(self.aabb_extension);
        let d = self.aabb_multiplier * displacement;
        if d.x < 0.0 {
            fat.min.x += d.x;
        } else {
            fat.max.x += d.x;
        }
        if d.y < 0.0 {
            fat.min.y += d.y;
        } else {
            fat.max.y += d.y;
        }

        self.nodes[proxy.0].aabb = fat;
        self.insert_leaf(proxy.0);
        true
    }

    pub fn user_data(&self, proxy: ProxyId) -> Option<T> {
        self.nodes.get(proxy.0).and_then(|node| node.data)
    }

    pub fn fat_aabb(&self, proxy: ProxyId) -> Option<Aabb> {
        self.nodes.get(proxy.0).map(|node| node.aabb)
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Visit every leaf whose fat box overlaps `aabb`. The callback returns
    /// false to stop early.
    pub fn query<F>(&self, aabb: &Aabb, mut callback: F)
    where
        F: FnMut(ProxyId) -> bool,
    {
        let mut stack = Stack::new();
        stack.extend(self.root);

        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(ProxyId(id)) {
                    return;
                }
            } else {
                stack.extend(node.child1);
                stack.extend(node.child2);
            }
        }
    }

    /// Visit leaves the segment may cross, nearest boxes not guaranteed first.
    ///
    /// The callback returns the new clip fraction: 0 ends the cast, a
    /// negative value ignores the leaf, and a positive value shortens the ray.
    pub fn raycast<F>(&self, input: &RayCastInput, mut callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId) -> f32,
    {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalize_or_zero();
        if r == Vec2::ZERO {
            return;
        }

        // v is perpendicular to the segment.
        let v = cross_sv(1.0, r);
        let abs_v = v.abs();

        let mut max_fraction = input.max_fraction;
        let mut segment_aabb = Aabb::from_points(p1, p1 + max_fraction * (p2 - p1));

        let mut stack = Stack::new();
        stack.extend(self.root);

        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if !node.aabb.overlaps(&segment_aabb) {
                continue;
            }

            // Separating axis for segment: |dot(v, p1 - c)| > dot(|v|, h)
            let c = node.aabb.center();
            let h = node.aabb.half_extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };
                let value = callback(&sub_input, ProxyId(id));
                if value == 0.0 {
                    return;
                }
                if value > 0.0 {
                    max_fraction = value;
                    segment_aabb = Aabb::from_points(p1, p1 + max_fraction * (p2 - p1));
                }
            } else {
                stack.extend(node.child1);
                stack.extend(node.child2);
            }
        }
    }

    /// Height of the root, 0 for a single leaf or an empty tree
    pub fn height(&self) -> i32 {
        self.root.map_or(0, |root| self.nodes[root].height)
    }

    /// Largest height difference between the two children of any node
    pub fn max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter_map(|(_, node)| {
                let (c1, c2) = (node.child1?, node.child2?);
                Some((self.nodes[c2].height - self.nodes[c1].height).abs())
            })
            .max()
            .unwrap_or(0)
    }

    /// Sum of all node perimeters over the root perimeter
    pub fn area_ratio(&self) -> f32 {
        let Some(root) = self.root else {
            return 0.0;
        };
        let root_area = self.nodes[root].aabb.perimeter();
        if root_area <= 0.0 {
            return 0.0;
        }
        let total: f32 = self.nodes.iter().map(|(_, node)| node.aabb.perimeter()).sum();
        total / root_area
    }

    /// Check parent links, heights and bounds of the whole tree
    pub fn validate(&self) -> bool {
        let Some(root) = self.root else {
            return self.proxy_count == 0;
        };
        if self.nodes[root].parent.is_some() {
            return false;
        }

        let mut leaves = 0;
        let mut stack = Stack::new();
        stack.push(root);
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            match (node.child1, node.child2) {
                (None, None) => {
                    if node.height != 0 || node.data.is_none() {
                        return false;
                    }
                    leaves += 1;
                }
                (Some(c1), Some(c2)) => {
                    let (n1, n2) = (&self.nodes[c1], &self.nodes[c2]);
                    if n1.parent != Some(id) || n2.parent != Some(id) {
                        return false;
                    }
                    if node.height != 1 + n1.height.max(n2.height) {
                        return false;
                    }
                    if node.aabb != n1.aabb.combine(&n2.aabb) {
                        return false;
                    }
                    stack.push(c1);
                    stack.push(c2);
                }
                _ => return false,
            }
        }
        leaves == self.proxy_count
    }

    /// Translate every box by `-new_origin`
    pub fn shift_origin(&mut self, new_origin: Vec2) {
        for (_, node) in self.nodes.iter_mut() {
            node.aabb.min -= new_origin;
            node.aabb.max -= new_origin;
        }
    }

    fn insert_leaf(&mut self, leaf: Handle) {
        let Some(root) = self.root else {
            self.root = Some(leaf);
            self.nodes[leaf].parent = None;
            return;
        };

        // Find the best sibling for this node.
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = root;
        while let (Some(child1), Some(child2)) = (self.nodes[index].child1, self.nodes[index].child2) {
            let area = self.nodes[index].aabb.perimeter();
            let combined_area = self.nodes[index].aabb.combine(&leaf_aabb).perimeter();

            // Cost of creating a new parent for this node and the new leaf.
            let cost = 2.0 * combined_area;

            // Minimum cost of pushing the leaf further down the tree.
            let inheritance_cost = 2.0 * (combined_area - area);

            let cost1 = self.descend_cost(child1, &leaf_aabb) + inheritance_cost;
            let cost2 = self.descend_cost(child2, &leaf_aabb) + inheritance_cost;

            if cost < cost1 && cost < cost2 {
                break;
            }
            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.nodes.insert(TreeNode {
            aabb: leaf_aabb.combine(&self.nodes[sibling].aabb),
            data: None,
            parent: old_parent,
            child1: Some(sibling),
            child2: Some(leaf),
            height: self.nodes[sibling].height + 1,
        });
        self.nodes[sibling].parent = Some(new_parent);
        self.nodes[leaf].parent = Some(new_parent);

        match old_parent {
            Some(parent) => self.replace_child(parent, sibling, new_parent),
            None => self.root = Some(new_parent),
        }

        self.refit_ancestors(Some(new_parent));
    }

    fn descend_cost(&self, child: Handle, leaf_aabb: &Aabb) -> f32 {
        let node = &self.nodes[child];
        let combined = leaf_aabb.combine(&node.aabb).perimeter();
        if node.is_leaf() {
            combined
        } else {
            combined - node.aabb.perimeter()
        }
    }

    fn remove_leaf(&mut self, leaf: Handle) {
        if self.root == Some(leaf) {
            self.root = None;
            return;
        }

        let Some(parent) = self.nodes[leaf].parent else {
            return;
        };
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == Some(leaf) {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };
        let Some(sibling) = sibling else {
            return;
        };

        // The parent goes away and the sibling takes its place.
        match grand_parent {
            Some(grand_parent) => {
                self.replace_child(grand_parent, parent, sibling);
                self.nodes[sibling].parent = Some(grand_parent);
                self.nodes.remove(parent);
                self.refit_ancestors(Some(grand_parent));
            }
            None => {
                self.root = Some(sibling);
                self.nodes[sibling].parent = None;
                self.nodes.remove(parent);
            }
        }
        self.nodes[leaf].parent = None;
    }

    fn replace_child(&mut self, parent: Handle, old_child: Handle, new_child: Handle) {
        let node = &mut self.nodes[parent];
        if node.child1 == Some(old_child) {
            node.child1 = Some(new_child);
        } else {
            node.child2 = Some(new_child);
        }
    }

    /// Walk to the root rebalancing and refitting bounds.
    fn refit_ancestors(&mut self, start: Option<Handle>) {
        let mut index = start;
        while let Some(id) = index {
            let id = self.balance(id);
            if let (Some(c1), Some(c2)) = (self.nodes[id].child1, self.nodes[id].child2) {
                self.refit(id, c1, c2);
            }
            index = self.nodes[id].parent;
        }
    }

    fn refit(&mut self, node: Handle, left: Handle, right: Handle) {
        let aabb = self.nodes[left].aabb.combine(&self.nodes[right].aabb);
        let height = 1 + self.nodes[left].height.max(self.nodes[right].height);
        let node = &mut self.nodes[node];
        node.aabb = aabb;
        node.height = height;
    }

    /// Rotate the taller grandchild up if `i_a` is imbalanced; returns the new subtree root.
    fn balance(&mut self, i_a: Handle) -> Handle {
        let a = &self.nodes[i_a];
        if a.is_leaf() || a.height < 2 {
            return i_a;
        }
        let (Some(i_b), Some(i_c)) = (a.child1, a.child2) else {
            return i_a;
        };

        let balance = self.nodes[i_c].height - self.nodes[i_b].height;

        // Rotate C up
        if balance > 1 {
            let (Some(i_f), Some(i_g)) = (self.nodes[i_c].child1, self.nodes[i_c].child2) else {
                return i_a;
            };

            // Swap A and C
            let a_parent = self.nodes[i_a].parent;
            self.nodes[i_c].child1 = Some(i_a);
            self.nodes[i_c].parent = a_parent;
            self.nodes[i_a].parent = Some(i_c);
            match a_parent {
                Some(parent) => self.replace_child(parent, i_a, i_c),
                None => self.root = Some(i_c),
            }

            if self.nodes[i_f].height > self.nodes[i_g].height {
                self.nodes[i_c].child2 = Some(i_f);
                self.nodes[i_a].child2 = Some(i_g);
                self.nodes[i_g].parent = Some(i_a);
                self.refit(i_a, i_b, i_g);
                self.refit(i_c, i_a, i_f);
            } else {
                self.nodes[i_c].child2 = Some(i_g);
                self.nodes[i_a].child2 = Some(i_f);
                self.nodes[i_f].parent = Some(i_a);
                self.refit(i_a, i_b, i_f);
                self.refit(i_c, i_a, i_g);
            }
            return i_c;
        }

        // Rotate B up
        if balance < -1 {
            let (Some(i_d), Some(i_e)) = (self.nodes[i_b].child1, self.nodes[i_b].child2) else {
                return i_a;
            };

            // Swap A and B
            let a_parent = self.nodes[i_a].parent;
            self.nodes[i_b].child1 = Some(i_a);
            self.nodes[i_b].parent = a_parent;
            self.nodes[i_a].parent = Some(i_b);
            match a_parent {
                Some(parent) => self.replace_child(parent, i_a, i_b),
                None => self.root = Some(i_b),
            }

            if self.nodes[i_d].height > self.nodes[i_e].height {
                self.nodes[i_b].child2 = Some(i_d);
                self.nodes[i_a].child1 = Some(i_e);
                self.nodes[i_e].parent = Some(i_a);
                self.refit(i_a, i_c, i_e);
                self.refit(i_b, i_a, i_d);
            } else {
                self.nodes[i_b].child2 = Some(i_e);
                self.nodes[i_a].child1 = Some(i_d);
                self.nodes[i_d].parent = Some(i_a);
                self.refit(i_a, i_c, i_d);
                self.refit(i_b, i_a, i_e);
            }
            return i_b;
        }

        i_a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic generator so tree tests are repeatable.
    struct Lcg(u64);

    impl Lcg {
        fn next_f32(&mut self) -> f32 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((self.0 >> 40) as f32) / ((1u64 << 24) as f32)
        }

        fn range(&mut self, lo: f32, hi: f32) -> f32 {
            lo + (hi - lo) * self.next_f32()
        }
    }

    fn random_box(rng: &mut Lcg) -> Aabb {
        let center = Vec2::new(rng.range(-50.0, 50.0), rng.range(-50.0, 50.0));
        let half = Vec2::new(rng.range(0.1, 2.0), rng.range(0.1, 2.0));
        Aabb::from_center_half_extents(center, half)
    }

    #[test]
    fn test_create_and_query() {
        let mut tree = DynamicTree::new(0.1, 2.0);
        let a = tree.create_proxy(&Aabb::new(Vec2::ZERO, Vec2::ONE), 1u32);
        let _b = tree.create_proxy(&Aabb::new(Vec2::splat(5.0), Vec2::splat(6.0)), 2u32);

        let mut found = Vec::new();
        tree.query(&Aabb::new(Vec2::splat(0.5), Vec2::splat(0.6)), |id| {
            found.push(tree.user_data(id).unwrap());
            true
        });
        assert_eq!(found, vec![1]);
        assert_eq!(tree.fat_aabb(a).unwrap(), Aabb::new(Vec2::splat(-0.1), Vec2::splat(1.1)));
        assert!(tree.validate());
    }

    #[test]
    fn test_small_move_keeps_tree() {
        let mut tree = DynamicTree::new(0.1, 2.0);
        let aabb = Aabb::new(Vec2::ZERO, Vec2::ONE);
        let id = tree.create_proxy(&aabb, ());

        let nudged = Aabb::new(Vec2::splat(0.05), Vec2::splat(1.05));
        assert!(!tree.move_proxy(id, &nudged, Vec2::splat(0.05)));

        let far = Aabb::new(Vec2::splat(3.0), Vec2::splat(4.0));
        assert!(tree.move_proxy(id, &far, Vec2::new(3.0, -1.0)));
        let fat = tree.fat_aabb(id).unwrap();
        assert!(fat.contains(&far));
        // Stretched along the displacement.
        assert!((fat.max.x - (4.0 + 0.1 + 6.0)).abs() < 1e-5);
        assert!((fat.min.y - (3.0 - 0.1 - 2.0)).abs() < 1e-5);
    }

    #[test]
    fn test_random_operations_keep_invariants() {
        let mut rng = Lcg(7);
        let mut tree = DynamicTree::new(0.1, 2.0);
        let mut live: Vec<(ProxyId, Aabb)> = Vec::new();

        for round in 0..600 {
            let roll = rng.next_f32();
            if roll < 0.5 || live.len() < 4 {
                let aabb = random_box(&mut rng);
                let id = tree.create_proxy(&aabb, round);
                live.push((id, aabb));
            } else if roll < 0.85 {
                let pick = (rng.next_f32() * live.len() as f32) as usize % live.len();
                let (id, old) = live[pick];
                let d = Vec2::new(rng.range(-3.0, 3.0), rng.range(-3.0, 3.0));
                let moved = Aabb::new(old.min + d, old.max + d);
                tree.move_proxy(id, &moved, d);
                live[pick].1 = moved;
            } else {
                let pick = (rng.next_f32() * live.len() as f32) as usize % live.len();
                let (id, _) = live.swap_remove(pick);
                assert!(tree.destroy_proxy(id).is_some());
                assert!(tree.destroy_proxy(id).is_none());
            }

            for (id, aabb) in &live {
                assert!(tree.fat_aabb(*id).unwrap().contains(aabb));
            }
            assert!(tree.validate(), "invalid tree after round {round}");
        }
        assert_eq!(tree.proxy_count(), live.len());
        assert!(tree.height() >= 1);
        assert!(tree.max_balance() <= tree.height());
    }

    #[test]
    fn test_query_matches_brute_force() {
        let mut rng = Lcg(99);
        let mut tree = DynamicTree::new(0.0, 2.0);
        let boxes: Vec<Aabb> = (0..200).map(|_| random_box(&mut rng)).collect();
        for (i, aabb) in boxes.iter().enumerate() {
            tree.create_proxy(aabb, i);
        }

        let probe = Aabb::new(Vec2::new(-10.0, -5.0), Vec2::new(12.0, 8.0));
        let mut found = Vec::new();
        tree.query(&probe, |id| {
            found.push(tree.user_data(id).unwrap());
            true
        });
        found.sort_unstable();

        let expected: Vec<usize> = (0..boxes.len()).filter(|&i| boxes[i].overlaps(&probe)).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_raycast_clips_and_terminates() {
        let mut tree = DynamicTree::new(0.0, 2.0);
        for i in 0..5 {
            let x = 2.0 * i as f32;
            tree.create_proxy(&Aabb::new(Vec2::new(x, -0.5), Vec2::new(x + 1.0, 0.5)), i);
        }

        let input = RayCastInput::new(Vec2::new(-1.0, 0.0), Vec2::new(11.0, 0.0));
        let mut visited = 0;
        tree.raycast(&input, |_, _| {
            visited += 1;
            -1.0
        });
        assert_eq!(visited, 5);

        let mut visited = 0;
        tree.raycast(&input, |_, _| {
            visited += 1;
            0.0
        });
        assert_eq!(visited, 1);

        let above = RayCastInput::new(Vec2::new(-1.0, 2.0), Vec2::new(11.0, 2.0));
        tree.raycast(&above, |_, _| panic!("ray above every box"));
    }

    #[test]
    fn test_shift_origin() {
        let mut tree = DynamicTree::new(0.0, 2.0);
        let id = tree.create_proxy(&Aabb::new(Vec2::ZERO, Vec2::ONE), ());
        tree.shift_origin(Vec2::new(1.0, 1.0));
        assert_eq!(tree.fat_aabb(id).unwrap(), Aabb::new(Vec2::splat(-1.0), Vec2::ZERO));
        assert!(tree.area_ratio() > 0.0);
    }
}
