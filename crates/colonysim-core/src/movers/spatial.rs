//! Uniform bucket grid over mover positions, rebuilt once per tick.

use std::collections::HashMap;

use colonysim_logic::constants::mover::MOVER_AVOID_RADIUS;

use super::{MoverId, MoverPool};
use crate::common::Vec3;

#[derive(Debug, Clone)]
pub struct MoverGrid {
    cell_size: f32,
    buckets: HashMap<(i32, i32, i32), Vec<(MoverId, Vec3)>>,
}

impl Default for MoverGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl MoverGrid {
    pub fn new() -> Self {
        Self {
            cell_size: 2.0 * MOVER_AVOID_RADIUS,
            buckets: HashMap::new(),
        }
    }

    fn key(&self, p: Vec3) -> (i32, i32, i32) {
        (
            p.z.round() as i32,
            (p.y / self.cell_size).floor() as i32,
            (p.x / self.cell_size).floor() as i32,
        )
    }

    pub fn rebuild(&mut self, movers: &MoverPool) {
        for bucket in self.buckets.values_mut() {
            bucket.clear();
        }
        for (id, m) in movers.iter() {
            let key = self.key(m.pos);
            self.buckets.entry(key).or_default().push((id, m.pos));
        }
    }

    /// Visit movers on the same level within `radius` of `pos`, skipping
    /// `exclude`. Buckets hold insertion order, so visits are deterministic.
    pub fn query_mover_neighbors(&self, pos: Vec3, radius: f32, exclude: Option<MoverId>, mut cb: impl FnMut(MoverId, Vec3)) {
        let (z, by, bx) = self.key(pos);
        let r2 = radius * radius;
        for dy in -1..=1 {
            for dx in -1..=1 {
                let Some(bucket) = self.buckets.get(&(z, by + dy, bx + dx)) else {
                    continue;
                };
                for (id, p) in bucket {
                    if Some(*id) == exclude {
                        continue;
                    }
                    let ddx = p.x - pos.x;
                    let ddy = p.y - pos.y;
                    if ddx * ddx + ddy * ddy <= r2 {
                        cb(*id, *p);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CellPos;
    use crate::movers::Mover;
    use colonysim_logic::names::{Gender, Name};

    #[test]
    fn test_neighbors_same_level_only() {
        let mut pool = MoverPool::new();
        let name = || Name::new("Kol", "Redfern");
        let a = pool.insert(Mover::new(CellPos::new(2, 2, 0), name(), Gender::Male)).unwrap();
        let b = pool.insert(Mover::new(CellPos::new(2, 2, 0), name(), Gender::Male)).unwrap();
        let _c = pool.insert(Mover::new(CellPos::new(2, 2, 1), name(), Gender::Male)).unwrap();
        let _far = pool.insert(Mover::new(CellPos::new(9, 9, 0), name(), Gender::Male)).unwrap();

        let mut grid = MoverGrid::new();
        grid.rebuild(&pool);
        let mut seen = Vec::new();
        grid.query_mover_neighbors(pool.get(a).unwrap().pos, MOVER_AVOID_RADIUS, Some(a), |id, _| seen.push(id));
        assert_eq!(seen, vec![b]);
    }
}
