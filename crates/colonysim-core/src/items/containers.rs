//! Nested containers.
//!
//! Membership is a parent index on the child. Children are found by a pass
//! over the arena filtered on `contained_in`, so there are no back-links to
//! keep consistent beyond the parent's direct-child count.

use colonysim_logic::items::{container_accepts, container_def, item_max_stack, ItemType};
use thiserror::Error;

use super::{ItemId, ItemPool, ItemState};
use crate::common::CellPos;
use crate::world::{find_safe_drop_cell, Grid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("item does not exist")]
    Missing,
    #[error("target is not a container")]
    NotAContainer,
    #[error("container does not accept this item type")]
    Rejected,
    #[error("container is full")]
    Full,
    #[error("placing the item would create a containment cycle")]
    Cycle,
}

/// Where a put landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stowed {
    /// Fully merged into an existing child stack; the source is gone.
    Merged(ItemId),
    /// Added as a new direct child (possibly after a partial merge).
    Added(ItemId),
}

/// Direct children of `container`, in arena order.
pub fn children_of(pool: &ItemPool, container: ItemId) -> Vec<ItemId> {
    pool.items
        .iter()
        .filter(|(_, it)| it.contained_in == Some(container))
        .map(|(id, _)| id)
        .collect()
}

/// Whether `ancestor` appears on the parent chain of `id` (or is `id`).
fn is_self_or_ancestor(pool: &ItemPool, ancestor: ItemId, id: ItemId) -> bool {
    let mut cur = Some(id);
    let mut guard = 0;
    while let Some(c) = cur {
        if c == ancestor {
            return true;
        }
        cur = pool.get(c).and_then(|it| it.contained_in);
        guard += 1;
        if guard > 64 {
            return true;
        }
    }
    false
}

/// Outermost container holding `id` (or `id` itself when loose).
pub fn outermost_container(pool: &ItemPool, id: ItemId) -> ItemId {
    let mut cur = id;
    let mut guard = 0;
    while let Some(p) = pool.get(cur).and_then(|it| it.contained_in) {
        cur = p;
        guard += 1;
        if guard > 64 {
            break;
        }
    }
    cur
}

/// Put `child` into `parent`, merging into a matching child stack first.
/// All capacity checks run before anything is mutated.
pub fn put_item_in_container(pool: &mut ItemPool, child: ItemId, parent: ItemId) -> Result<Stowed, ContainerError> {
    let (Some(c), Some(p)) = (pool.get(child), pool.get(parent)) else {
        return Err(ContainerError::Missing);
    };
    let Some(def) = container_def(p.item_type) else {
        return Err(ContainerError::NotAContainer);
    };
    if !container_accepts(p.item_type, c.item_type) {
        return Err(ContainerError::Rejected);
    }
    if is_self_or_ancestor(pool, child, parent) {
        return Err(ContainerError::Cycle);
    }
    let (child_type, child_mat, child_count, child_mask) = (c.item_type, c.material, c.stack_count, c.content_type_mask);
    let parent_count = p.content_count;

    let targets: Vec<ItemId> = children_of(pool, parent)
        .into_iter()
        .filter(|id| {
            pool.get(*id)
                .map(|it| it.item_type == child_type && it.material == child_mat && it.content_count == 0)
                .unwrap_or(false)
        })
        .collect();
    let room: u32 = targets
        .iter()
        .filter_map(|id| pool.get(*id))
        .map(|it| item_max_stack(child_type).saturating_sub(it.stack_count))
        .sum();
    let fits_by_merge = room >= child_count;
    if !fits_by_merge && parent_count >= def.max_contents {
        return Err(ContainerError::Full);
    }

    detach(pool, child);
    for t in &targets {
        if !pool.contains(child) {
            break;
        }
        pool.merge_item_into_stack(*t, child);
        if !pool.contains(child) {
            return Ok(Stowed::Merged(*t));
        }
    }

    let pos = pool.get(parent).map(|it| it.pos).unwrap_or_default();
    if let Some(c) = pool.get_mut(child) {
        c.contained_in = Some(parent);
        c.state = ItemState::InContainer;
        c.pos = pos;
        c.reserved_by = None;
    }
    if let Some(p) = pool.get_mut(parent) {
        p.content_count += 1;
    }
    propagate_mask(pool, parent, child_type.mask_bit() | child_mask);
    Ok(Stowed::Added(child))
}

fn detach(pool: &mut ItemPool, child: ItemId) {
    let Some(old) = pool.get(child).and_then(|it| it.contained_in) else {
        return;
    };
    if let Some(p) = pool.get_mut(old) {
        p.content_count = p.content_count.saturating_sub(1);
    }
    if let Some(c) = pool.get_mut(child) {
        c.contained_in = None;
    }
}

/// OR bits into `container` and every ancestor. Masks only grow.
fn propagate_mask(pool: &mut ItemPool, container: ItemId, bits: u64) {
    let mut cur = Some(container);
    let mut guard = 0;
    while let Some(c) = cur {
        let Some(it) = pool.get_mut(c) else {
            break;
        };
        it.content_type_mask |= bits;
        cur = it.contained_in;
        guard += 1;
        if guard > 64 {
            break;
        }
    }
}

/// Take `child` out of its container and drop it near the outermost
/// container's position.
pub fn remove_item_from_container(pool: &mut ItemPool, grid: &Grid, child: ItemId) -> bool {
    if pool.get(child).and_then(|it| it.contained_in).is_none() {
        return false;
    }
    let outer = outermost_container(pool, child);
    let at = pool.get(outer).map(|it| it.cell()).unwrap_or_default();
    detach(pool, child);
    let drop = find_safe_drop_cell(grid, at);
    if let Some(c) = pool.get_mut(child) {
        c.state = ItemState::OnGround;
        c.pos = drop.center();
        c.reserved_by = None;
    }
    sync_contents_position(pool, child);
    true
}

/// No ancestor is reserved or carried.
pub fn is_item_accessible(pool: &ItemPool, id: ItemId) -> bool {
    let mut cur = pool.get(id).and_then(|it| it.contained_in);
    let mut guard = 0;
    while let Some(c) = cur {
        let Some(it) = pool.get(c) else {
            return false;
        };
        if it.reserved_by.is_some() || it.state == ItemState::Carried {
            return false;
        }
        cur = it.contained_in;
        guard += 1;
        if guard > 64 {
            return false;
        }
    }
    true
}

/// Search loose containers within `radius` tiles of `center` for an
/// unreserved, accessible item of `item_type`. The bloom mask prunes
/// subtrees that cannot hold the type.
pub fn find_item_in_containers(pool: &ItemPool, center: CellPos, radius: i32, item_type: ItemType) -> Option<ItemId> {
    let bit = item_type.mask_bit();
    let mut roots: Vec<(i64, ItemId)> = pool
        .items
        .iter()
        .filter(|(_, it)| {
            it.contained_in.is_none()
                && it.is_container()
                && matches!(it.state, ItemState::OnGround | ItemState::InStockpile)
                && it.reserved_by.is_none()
                && it.cell().z == center.z
                && it.cell().chebyshev(&center) <= radius
        })
        .map(|(id, it)| (it.cell().dist_sq_weighted(&center), id))
        .collect();
    roots.sort_by_key(|(d, _)| *d);
    roots.into_iter().find_map(|(_, root)| search_subtree(pool, root, item_type, bit, 0))
}

fn search_subtree(pool: &ItemPool, container: ItemId, item_type: ItemType, bit: u64, depth: u32) -> Option<ItemId> {
    let c = pool.get(container)?;
    if c.content_type_mask & bit == 0 || depth > 16 {
        return None;
    }
    let children = children_of(pool, container);
    for id in &children {
        let Some(it) = pool.get(*id) else {
            continue;
        };
        if it.item_type == item_type && it.reserved_by.is_none() {
            return Some(*id);
        }
    }
    children.into_iter().find_map(|id| {
        pool.get(id)
            .filter(|it| it.is_container() && it.reserved_by.is_none())
            .and_then(|_| search_subtree(pool, id, item_type, bit, depth + 1))
    })
}

/// Move every descendant of `container` to the container's position.
pub fn sync_contents_position(pool: &mut ItemPool, container: ItemId) {
    let Some(root) = pool.get(container) else {
        return;
    };
    if root.content_count == 0 {
        return;
    }
    let pos = root.pos;
    let mut stack = vec![container];
    let mut guard = 0;
    while let Some(c) = stack.pop() {
        for child in children_of(pool, c) {
            if let Some(it) = pool.get_mut(child) {
                it.pos = pos;
                if it.content_count > 0 {
                    stack.push(child);
                }
            }
        }
        guard += 1;
        if guard > 256 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: i32, y: i32) -> CellPos {
        CellPos::new(x, y, 0)
    }

    #[test]
    fn test_put_merges_before_adding() {
        let mut pool = ItemPool::new();
        let basket = pool.spawn_default(ItemType::Basket, at(1, 1), 1).unwrap();
        let a = pool.spawn_default(ItemType::Berries, at(1, 1), 5).unwrap();
        let b = pool.spawn_default(ItemType::Berries, at(1, 1), 3).unwrap();
        assert_eq!(put_item_in_container(&mut pool, a, basket), Ok(Stowed::Added(a)));
        assert_eq!(put_item_in_container(&mut pool, b, basket), Ok(Stowed::Merged(a)));
        assert_eq!(pool.get(basket).unwrap().content_count, 1);
        assert_eq!(pool.get(a).unwrap().stack_count, 8);
    }

    #[test]
    fn test_full_container_rejects_without_mutation() {
        let mut pool = ItemPool::new();
        let pot = pool.spawn_default(ItemType::ClayPot, at(1, 1), 1).unwrap();
        for t in [ItemType::Red, ItemType::Green, ItemType::Blue] {
            let id = pool.spawn_default(t, at(1, 1), 1).unwrap();
            put_item_in_container(&mut pool, id, pot).unwrap();
        }
        let extra = pool.spawn_default(ItemType::Rock, at(1, 1), 1).unwrap();
        assert_eq!(put_item_in_container(&mut pool, extra, pot), Err(ContainerError::Full));
        assert_eq!(pool.get(extra).unwrap().state, ItemState::OnGround);
        assert_eq!(pool.get(pot).unwrap().content_count, 3);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut pool = ItemPool::new();
        let crate_id = pool.spawn_default(ItemType::Crate, at(1, 1), 1).unwrap();
        let basket = pool.spawn_default(ItemType::Basket, at(1, 1), 1).unwrap();
        put_item_in_container(&mut pool, basket, crate_id).unwrap();
        assert_eq!(put_item_in_container(&mut pool, basket, basket), Err(ContainerError::Cycle));
    }

    #[test]
    fn test_mask_propagates_and_finds_nested() {
        let mut pool = ItemPool::new();
        let crate_id = pool.spawn_default(ItemType::Crate, at(2, 2), 1).unwrap();
        let basket = pool.spawn_default(ItemType::Basket, at(2, 2), 1).unwrap();
        let meat = pool.spawn_default(ItemType::RawMeat, at(2, 2), 1).unwrap();
        put_item_in_container(&mut pool, basket, crate_id).unwrap();
        put_item_in_container(&mut pool, meat, basket).unwrap();
        assert_ne!(pool.get(crate_id).unwrap().content_type_mask & ItemType::RawMeat.mask_bit(), 0);
        assert_eq!(find_item_in_containers(&pool, at(3, 3), 2, ItemType::RawMeat), Some(meat));
        assert_eq!(find_item_in_containers(&pool, at(3, 3), 2, ItemType::Hide), None);
    }

    #[test]
    fn test_reserved_ancestor_blocks_access() {
        let mut pool = ItemPool::new();
        let basket = pool.spawn_default(ItemType::Basket, at(1, 1), 1).unwrap();
        let red = pool.spawn_default(ItemType::Red, at(1, 1), 1).unwrap();
        put_item_in_container(&mut pool, red, basket).unwrap();
        assert!(is_item_accessible(&pool, red));
        pool.get_mut(basket).unwrap().state = ItemState::Carried;
        assert!(!is_item_accessible(&pool, red));
    }

    #[test]
    fn test_remove_drops_near_outermost() {
        let grid = Grid::new(6, 6, 1);
        let mut pool = ItemPool::new();
        let basket = pool.spawn_default(ItemType::Basket, at(3, 3), 1).unwrap();
        let red = pool.spawn_default(ItemType::Red, at(3, 3), 1).unwrap();
        put_item_in_container(&mut pool, red, basket).unwrap();
        assert!(remove_item_from_container(&mut pool, &grid, red));
        let it = pool.get(red).unwrap();
        assert_eq!(it.state, ItemState::OnGround);
        assert!(it.cell().chebyshev(&at(3, 3)) <= 1);
        assert_eq!(pool.get(basket).unwrap().content_count, 0);
    }

    #[test]
    fn test_delete_container_orphans_children() {
        let mut pool = ItemPool::new();
        let basket = pool.spawn_default(ItemType::Basket, at(1, 1), 1).unwrap();
        let red = pool.spawn_default(ItemType::Red, at(1, 1), 1).unwrap();
        put_item_in_container(&mut pool, red, basket).unwrap();
        pool.delete_item(basket);
        let it = pool.get(red).unwrap();
        assert_eq!(it.state, ItemState::OnGround);
        assert!(it.contained_in.is_none());
    }
}
