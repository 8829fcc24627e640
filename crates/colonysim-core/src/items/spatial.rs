//! Tile index over ground items.
//!
//! Two parallel columns sorted by cell index. Cell indices are z-major, so
//! one row of one z-level is a contiguous key range and a radius query is
//! one binary search per row.

use slotmap::SlotMap;

use super::{slot_index, Item, ItemId, ItemPool, ItemState};
use crate::common::CellPos;
use colonysim_logic::constants::jobs::ITEM_SEARCH_START_RADIUS;

#[derive(Debug, Clone, Default)]
pub struct ItemSpatialIndex {
    width: i32,
    height: i32,
    depth: i32,
    keys: Vec<u32>,
    ids: Vec<ItemId>,
}

impl ItemSpatialIndex {
    fn key(&self, p: CellPos) -> Option<u32> {
        if p.x < 0 || p.y < 0 || p.z < 0 || p.x >= self.width || p.y >= self.height || p.z >= self.depth {
            return None;
        }
        Some(((p.z * self.height + p.y) * self.width + p.x) as u32)
    }

    pub fn rebuild(&mut self, items: &SlotMap<ItemId, Item>, width: i32, height: i32, depth: i32) {
        self.width = width;
        self.height = height;
        self.depth = depth;
        let mut entries: Vec<(u32, ItemId)> = Vec::with_capacity(self.ids.len());
        for (id, item) in items.iter() {
            if item.state != ItemState::OnGround {
                continue;
            }
            if let Some(k) = self.key(item.cell()) {
                entries.push((k, id));
            }
        }
        // Stable sort keeps arena order within a tile.
        entries.sort_by_key(|(k, _)| *k);
        self.keys = entries.iter().map(|(k, _)| *k).collect();
        self.ids = entries.into_iter().map(|(_, id)| id).collect();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Grid size the index was last built for.
    pub fn dims(&self) -> (i32, i32, i32) {
        (self.width, self.height, self.depth)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn range(&self, lo: u32, hi: u32) -> &[ItemId] {
        let start = self.keys.partition_point(|k| *k < lo);
        let end = self.keys.partition_point(|k| *k <= hi);
        &self.ids[start..end]
    }

    /// Items at one tile. Empty when out of bounds.
    pub fn at_tile(&self, p: CellPos) -> &[ItemId] {
        match self.key(p) {
            Some(k) => self.range(k, k),
            None => &[],
        }
    }

    /// Visit items within a square of `radius` tiles on `center.z`.
    pub fn in_radius(&self, center: CellPos, radius: i32, mut cb: impl FnMut(ItemId)) {
        if center.z < 0 || center.z >= self.depth {
            return;
        }
        let x0 = (center.x - radius).max(0);
        let x1 = (center.x + radius).min(self.width - 1);
        let y0 = (center.y - radius).max(0);
        let y1 = (center.y + radius).min(self.height - 1);
        if x0 > x1 || y0 > y1 {
            return;
        }
        for y in y0..=y1 {
            let (Some(lo), Some(hi)) = (
                self.key(CellPos::new(x0, y, center.z)),
                self.key(CellPos::new(x1, y, center.z)),
            ) else {
                continue;
            };
            for id in self.range(lo, hi) {
                cb(*id);
            }
        }
    }
}

/// Indexed ground items in order of weighted distance from a point, ties
/// broken by arena slot.
///
/// Each ring visits the square of `radius` tiles on every z-level. Anything
/// outside that square is farther than `radius`, so matches within `radius`
/// are final once the ring is scanned and are yielded before widening.
pub struct NearestGround<'a, F> {
    pool: &'a ItemPool,
    from: CellPos,
    keep: F,
    radius: i32,
    emitted: usize,
    ready: Vec<ItemId>,
    exhausted: bool,
}

impl<'a, F> NearestGround<'a, F>
where
    F: FnMut(ItemId, &Item) -> bool,
{
    pub(super) fn new(pool: &'a ItemPool, from: CellPos, keep: F) -> Self {
        Self {
            pool,
            from,
            keep,
            radius: ITEM_SEARCH_START_RADIUS.max(1),
            emitted: 0,
            ready: Vec::new(),
            exhausted: false,
        }
    }

    fn covers_grid(&self) -> bool {
        let (w, h, _) = self.pool.spatial.dims();
        let r = self.radius;
        self.from.x - r <= 0 && self.from.y - r <= 0 && self.from.x + r >= w - 1 && self.from.y + r >= h - 1
    }

    fn scan_ring(&mut self) {
        let (_, _, depth) = self.pool.spatial.dims();
        let mut found: Vec<(i64, u32, ItemId)> = Vec::new();
        for z in 0..depth {
            let center = CellPos::new(self.from.x, self.from.y, z);
            let (pool, keep, from) = (self.pool, &mut self.keep, self.from);
            pool.spatial.in_radius(center, self.radius, |id| {
                if let Some(it) = pool.items.get(id) {
                    if keep(id, it) {
                        found.push((it.cell().dist_sq_weighted(&from), slot_index(id), id));
                    }
                }
            });
        }
        found.sort_by_key(|(d, slot, _)| (*d, *slot));

        let covered = self.covers_grid();
        let bound = i64::from(self.radius) * i64::from(self.radius);
        let settled: Vec<ItemId> = found
            .into_iter()
            .take_while(|(d, _, _)| covered || *d <= bound)
            .map(|(_, _, id)| id)
            .collect();
        if settled.len() > self.emitted {
            self.ready = settled[self.emitted..].iter().rev().copied().collect();
            self.emitted = settled.len();
        }
        if covered {
            self.exhausted = true;
        } else {
            self.radius = self.radius.saturating_mul(2);
        }
    }
}

impl<F> Iterator for NearestGround<'_, F>
where
    F: FnMut(ItemId, &Item) -> bool,
{
    type Item = ItemId;

    fn next(&mut self) -> Option<ItemId> {
        loop {
            if let Some(id) = self.ready.pop() {
                return Some(id);
            }
            if self.exhausted {
                return None;
            }
            self.scan_ring();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::ItemPool;
    use crate::common::CellPos;
    use colonysim_logic::items::ItemType;

    #[test]
    fn test_query_tile_and_radius() {
        let mut pool = ItemPool::new();
        let a = pool.spawn_default(ItemType::Red, CellPos::new(2, 2, 0), 1).unwrap();
        let b = pool.spawn_default(ItemType::Red, CellPos::new(4, 3, 0), 1).unwrap();
        let _c = pool.spawn_default(ItemType::Red, CellPos::new(2, 2, 1), 1).unwrap();
        pool.rebuild_spatial(8, 8, 2);

        assert_eq!(pool.query_item_at_tile(CellPos::new(2, 2, 0)), &[a]);
        let mut found = Vec::new();
        pool.query_items_in_radius(CellPos::new(3, 3, 0), 1, |id| found.push(id));
        assert_eq!(found.len(), 2);
        assert!(found.contains(&a) && found.contains(&b));
    }

    #[test]
    fn test_nearest_ground_orders_by_distance_across_rings() {
        let mut pool = ItemPool::new();
        let far = pool.spawn_default(ItemType::Red, CellPos::new(60, 60, 0), 1).unwrap();
        let near = pool.spawn_default(ItemType::Red, CellPos::new(3, 2, 0), 1).unwrap();
        let mid = pool.spawn_default(ItemType::Red, CellPos::new(20, 2, 0), 1).unwrap();
        let above = pool.spawn_default(ItemType::Red, CellPos::new(2, 2, 1), 1).unwrap();
        let blue = pool.spawn_default(ItemType::Blue, CellPos::new(2, 3, 0), 1).unwrap();
        pool.rebuild_spatial(64, 64, 2);

        let from = CellPos::new(2, 2, 0);
        let reds: Vec<_> = pool.nearest_ground(from, |_, it| it.item_type == ItemType::Red).collect();
        assert_eq!(reds, vec![near, above, mid, far]);

        let closest: Vec<_> = pool.nearest_ground(from, |_, _| true).take(2).collect();
        assert_eq!(closest, vec![near, blue], "equal distance falls back to arena slot");
    }

    #[test]
    fn test_only_ground_items_indexed() {
        let mut pool = ItemPool::new();
        let a = pool.spawn_default(ItemType::Red, CellPos::new(1, 1, 0), 1).unwrap();
        pool.get_mut(a).unwrap().state = super::ItemState::Carried;
        pool.rebuild_spatial(4, 4, 1);
        assert!(pool.spatial().is_empty());
    }
}
