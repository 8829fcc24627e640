//! Gather zones: rectangles that restrict which ground items get hauled.

use colonysim_logic::constants::limits::MAX_GATHER_ZONES;
use serde::{Deserialize, Serialize};

use crate::common::CellPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatherZone {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub width: i32,
    pub height: i32,
}

impl GatherZone {
    pub fn contains(&self, p: CellPos) -> bool {
        p.z == self.z && p.x >= self.x && p.y >= self.y && p.x < self.x + self.width && p.y < self.y + self.height
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatherZones {
    zones: Vec<GatherZone>,
}

impl GatherZones {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GatherZone> {
        self.zones.iter()
    }

    /// Add a zone. Returns its index, or `None` when the table is full or
    /// the rectangle is empty.
    pub fn add(&mut self, x: i32, y: i32, z: i32, width: i32, height: i32) -> Option<usize> {
        if width <= 0 || height <= 0 {
            return None;
        }
        if self.zones.len() >= MAX_GATHER_ZONES {
            log::warn!("gather zone limit ({}) reached", MAX_GATHER_ZONES);
            return None;
        }
        self.zones.push(GatherZone { x, y, z, width, height });
        Some(self.zones.len() - 1)
    }

    pub fn remove(&mut self, index: usize) -> Option<GatherZone> {
        (index < self.zones.len()).then(|| self.zones.remove(index))
    }

    pub fn clear(&mut self) {
        self.zones.clear();
    }

    /// With no zones every cell is gatherable.
    pub fn allows(&self, p: CellPos) -> bool {
        self.zones.is_empty() || self.zones.iter().any(|z| z.contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allows_everything() {
        let zones = GatherZones::new();
        assert!(zones.allows(CellPos::new(40, 2, 3)));
    }

    #[test]
    fn test_zone_restricts() {
        let mut zones = GatherZones::new();
        zones.add(2, 2, 0, 3, 3).unwrap();
        assert!(zones.allows(CellPos::new(4, 4, 0)));
        assert!(!zones.allows(CellPos::new(5, 4, 0)));
        assert!(!zones.allows(CellPos::new(3, 3, 1)));
    }

    #[test]
    fn test_limit() {
        let mut zones = GatherZones::new();
        for i in 0..MAX_GATHER_ZONES {
            assert!(zones.add(i as i32, 0, 0, 1, 1).is_some());
        }
        assert!(zones.add(0, 0, 0, 1, 1).is_none());
    }
}
