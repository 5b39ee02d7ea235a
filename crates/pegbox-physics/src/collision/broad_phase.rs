//! Broad phase pair generation
//!
//! Proxies that moved since the last update are buffered; `update_pairs`
//! queries the tree with each moved proxy and reports every overlapping
//! pair exactly once.

use pegbox_core::math::{Aabb, Vec2};

use super::dynamic_tree::{DynamicTree, ProxyId};
use super::RayCastInput;
use crate::settings::Settings;

/// Dynamic tree plus the move and pair buffers
#[derive(Debug, Clone)]
pub struct BroadPhase<T> {
    tree: DynamicTree<T>,
    move_buffer: Vec<ProxyId>,
    pair_buffer: Vec<(ProxyId, ProxyId)>,
}

impl<T: Copy> BroadPhase<T> {
    pub fn new(settings: &Settings) -> Self {
        Self {
            tree: DynamicTree::new(settings.aabb_extension, settings.aabb_multiplier),
            move_buffer: Vec::new(),
            pair_buffer: Vec::new(),
        }
    }

    /// Insert a proxy; it takes part in the next `update_pairs`
    pub fn create_proxy(&mut self, aabb: &Aabb, data: T) -> ProxyId {
        let proxy = self.tree.create_proxy(aabb, data);
        self.move_buffer.push(proxy);
        proxy
    }

    pub fn destroy_proxy(&mut self, proxy: ProxyId) -> Option<T> {
        self.move_buffer.retain(|&moved| moved != proxy);
        self.tree.destroy_proxy(proxy)
    }

    /// Refit a proxy; it is buffered only if the tree actually changed
    pub fn move_proxy(&mut self, proxy: ProxyId, aabb: &Aabb, displacement: Vec2) {
        if self.tree.move_proxy(proxy, aabb, displacement) {
            self.move_buffer.push(proxy);
        }
    }

    /// Force pair generation for a proxy without moving it
    pub fn touch_proxy(&mut self, proxy: ProxyId) {
        self.move_buffer.push(proxy);
    }

    pub fn fat_aabb(&self, proxy: ProxyId) -> Option<Aabb> {
        self.tree.fat_aabb(proxy)
    }

    pub fn user_data(&self, proxy: ProxyId) -> Option<T> {
        self.tree.user_data(proxy)
    }

    /// Whether the fat boxes of two proxies overlap
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        match (self.tree.fat_aabb(a), self.tree.fat_aabb(b)) {
            (Some(a), Some(b)) => a.overlaps(&b),
            _ => false,
        }
    }

    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.tree.max_balance()
    }

    pub fn tree_quality(&self) -> f32 {
        self.tree.area_ratio()
    }

    pub fn tree(&self) -> &DynamicTree<T> {
        &self.tree
    }

    pub fn query<F>(&self, aabb: &Aabb, callback: F)
    where
        F: FnMut(ProxyId) -> bool,
    {
        self.tree.query(aabb, callback);
    }

    pub fn raycast<F>(&self, input: &RayCastInput, callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId) -> f32,
    {
        self.tree.raycast(input, callback);
    }

    pub fn shift_origin(&mut self, new_origin: Vec2) {
        self.tree.shift_origin(new_origin);
    }

    /// Report each new overlapping pair once, as `(data_a, data_b)`.
    pub fn update_pairs<F>(&mut self, mut callback: F)
    where
        F: FnMut(T, T),
    {
        self.pair_buffer.clear();
        let capacity = self.pair_buffer.capacity();

        let mut moved = std::mem::take(&mut self.move_buffer);
        for &query_proxy in &moved {
            let Some(fat) = self.tree.fat_aabb(query_proxy) else {
                continue;
            };
            let pairs = &mut self.pair_buffer;
            self.tree.query(&fat, |proxy| {
                if proxy != query_proxy {
                    pairs.push((proxy.min(query_proxy), proxy.max(query_proxy)));
                }
                true
            });
        }
        moved.clear();
        self.move_buffer = moved;

        if self.pair_buffer.capacity() > capacity {
            log::trace!("pair buffer grew to {}", self.pair_buffer.capacity());
        }

        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        for &(a, b) in &self.pair_buffer {
            if let (Some(data_a), Some(data_b)) = (self.tree.user_data(a), self.tree.user_data(b)) {
                callback(data_a, data_b);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(x: f32, y: f32) -> Aabb {
        Aabb::new(Vec2::new(x, y), Vec2::new(x + 1.0, y + 1.0))
    }

    fn collect_pairs(bp: &mut BroadPhase<u32>) -> Vec<(u32, u32)> {
        let mut pairs = Vec::new();
        bp.update_pairs(|a, b| pairs.push((a.min(b), a.max(b))));
        pairs.sort_unstable();
        pairs
    }

    #[test]
    fn test_update_pairs_reports_each_pair_once() {
        let mut bp = BroadPhase::new(&Settings::default());
        bp.create_proxy(&unit_box(0.0, 0.0), 0);
        bp.create_proxy(&unit_box(0.5, 0.0), 1);
        bp.create_proxy(&unit_box(0.5, 0.5), 2);
        bp.create_proxy(&unit_box(10.0, 0.0), 3);

        assert_eq!(collect_pairs(&mut bp), vec![(0, 1), (0, 2), (1, 2)]);
        // Nothing moved since.
        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn test_move_into_overlap() {
        let mut bp = BroadPhase::new(&Settings::default());
        let a = bp.create_proxy(&unit_box(0.0, 0.0), 0);
        let b = bp.create_proxy(&unit_box(5.0, 0.0), 1);
        assert!(collect_pairs(&mut bp).is_empty());
        assert!(!bp.test_overlap(a, b));

        bp.move_proxy(b, &unit_box(0.8, 0.0), Vec2::new(-4.2, 0.0));
        assert_eq!(collect_pairs(&mut bp), vec![(0, 1)]);
        assert!(bp.test_overlap(a, b));
    }

    #[test]
    fn test_touch_and_destroy() {
        let mut bp = BroadPhase::new(&Settings::default());
        let a = bp.create_proxy(&unit_box(0.0, 0.0), 0);
        let b = bp.create_proxy(&unit_box(0.5, 0.0), 1);
        collect_pairs(&mut bp);

        bp.touch_proxy(a);
        assert_eq!(collect_pairs(&mut bp), vec![(0, 1)]);

        bp.touch_proxy(b);
        assert_eq!(bp.destroy_proxy(b), Some(1));
        assert!(collect_pairs(&mut bp).is_empty());
        assert_eq!(bp.proxy_count(), 1);
    }

    #[test]
    fn test_pair_buffer_grows_for_dense_clusters() {
        let mut bp = BroadPhase::new(&Settings::default());
        for i in 0..40 {
            bp.create_proxy(&unit_box(0.01 * i as f32, 0.0), i);
        }
        let pairs = collect_pairs(&mut bp);
        assert_eq!(pairs.len(), 40 * 39 / 2);
    }
}
