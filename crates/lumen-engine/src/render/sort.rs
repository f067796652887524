//! Draw ordering for the two render buckets.

use core::cmp::Ordering;

use super::key::RenderStateKey;

/// One collected node, annotated for sorting.
#[derive(Debug, Clone)]
pub struct DrawEntry<N> {
    pub node: N,
    pub key: RenderStateKey,
    /// `render_order_z` at collection time.
    pub z: f32,
    /// Index of the node's mask in this frame's mask list.
    pub mask: Option<usize>,
}

/// Opaque ordering:
/// 1) `key`: ascending (groups state)
/// 2) `z`: ascending
#[inline]
pub fn opaque_order<N>(a: &DrawEntry<N>, b: &DrawEntry<N>) -> Ordering {
    match a.key.cmp(&b.key) {
        Ordering::Equal => a.z.total_cmp(&b.z),
        o => o,
    }
}

/// Transparent ordering:
/// 1) `z`: descending
/// 2) `key`: ascending
#[inline]
pub fn transparent_order<N>(a: &DrawEntry<N>, b: &DrawEntry<N>) -> Ordering {
    match b.z.total_cmp(&a.z) {
        Ordering::Equal => a.key.cmp(&b.key),
        o => o,
    }
}

/// Stable; fully tied entries keep collection (tree) order.
pub fn sort_opaque<N>(entries: &mut [DrawEntry<N>]) {
    entries.sort_by(opaque_order);
}

/// Stable; fully tied entries keep collection (tree) order.
pub fn sort_transparent<N>(entries: &mut [DrawEntry<N>]) {
    entries.sort_by(transparent_order);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(node: u32, program: u64, z: f32) -> DrawEntry<u32> {
        DrawEntry { node, key: RenderStateKey::encode(program, 0, 0), z, mask: None }
    }

    fn order(entries: &[DrawEntry<u32>]) -> Vec<u32> {
        entries.iter().map(|e| e.node).collect()
    }

    #[test]
    fn opaque_groups_by_key_then_z_ascending() {
        let mut e = vec![entry(0, 2, 0.0), entry(1, 1, 5.0), entry(2, 1, -1.0), entry(3, 2, -3.0)];
        sort_opaque(&mut e);
        assert_eq!(order(&e), [2, 1, 3, 0]);
    }

    #[test]
    fn transparent_is_z_descending_then_key() {
        let mut e = vec![entry(0, 2, 1.0), entry(1, 1, 1.0), entry(2, 0, 3.0), entry(3, 0, -2.0)];
        sort_transparent(&mut e);
        assert_eq!(order(&e), [2, 1, 0, 3]);
    }

    #[test]
    fn same_entries_sort_differently_per_bucket() {
        let keys = [3, 1, 2, 1];
        let zs = [5.0, 1.0, 2.0, 9.0];
        let entries: Vec<_> = (0..4).map(|i| entry(i, keys[i as usize], zs[i as usize])).collect();

        let mut opaque = entries.clone();
        sort_opaque(&mut opaque);
        assert_eq!(order(&opaque), [1, 3, 2, 0]);

        let mut transparent = entries;
        sort_transparent(&mut transparent);
        assert_eq!(order(&transparent), [3, 0, 2, 1]);
    }

    #[test]
    fn full_ties_keep_collection_order() {
        let mut e = vec![entry(0, 1, 0.0), entry(1, 1, 0.0), entry(2, 1, 0.0)];
        sort_opaque(&mut e);
        assert_eq!(order(&e), [0, 1, 2]);
        sort_transparent(&mut e);
        assert_eq!(order(&e), [0, 1, 2]);
    }
}
