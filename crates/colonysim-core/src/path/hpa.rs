//! Hierarchical A* over chunk entrances.
//!
//! Each maximal run of walkable cell pairs across a chunk boundary becomes
//! one entrance, represented by the pair at the middle of the run. Every
//! ladder or ramp step that leaves a chunk is an entrance of its own. The
//! abstract graph links entrance endpoints inside a chunk (cost of the
//! best path that stays in the chunk) and across each entrance (cost of the
//! step). Searches insert start and goal, run A* on the abstract graph and
//! refine each abstract edge back into cells.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

use super::astar::{astar, astar_filtered, Found};
use super::{heuristic, neighbors};
use crate::common::CellPos;
use crate::world::{ChunkKey, Grid};

type ChunkPair = (ChunkKey, ChunkKey);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AbstractEdge {
    to: CellPos,
    cost: u32,
    /// Crosses an entrance rather than running inside one chunk.
    inter: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HpaGraph {
    built: bool,
    /// Entrance cell pairs per chunk pair; the first cell lies in the first chunk.
    entrances: BTreeMap<ChunkPair, BTreeSet<(CellPos, CellPos)>>,
    chunk_nodes: BTreeMap<ChunkKey, BTreeSet<CellPos>>,
    edges: HashMap<CellPos, Vec<AbstractEdge>>,
}

fn ordered(a: ChunkKey, b: ChunkKey) -> ChunkPair {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn in_chunk(grid: &Grid, chunk: ChunkKey) -> impl Fn(CellPos) -> bool + '_ {
    move |p| grid.in_bounds(p) && grid.chunk_of(p) == chunk
}

/// Costs from `src` to every cell reachable without leaving `chunk`.
fn dijkstra_within(grid: &Grid, src: CellPos, chunk: ChunkKey) -> HashMap<CellPos, u32> {
    let mut dist: HashMap<CellPos, u32> = HashMap::new();
    if !grid.is_walkable(src) || grid.chunk_of(src) != chunk {
        return dist;
    }
    let mut heap = BinaryHeap::new();
    let mut edges = Vec::with_capacity(12);
    dist.insert(src, 0);
    heap.push(Reverse((0u32, src)));
    while let Some(Reverse((d, p))) = heap.pop() {
        if dist.get(&p).is_some_and(|best| *best < d) {
            continue;
        }
        edges.clear();
        neighbors(grid, p, &mut edges);
        for (q, c) in edges.iter().copied() {
            if !grid.in_bounds(q) || grid.chunk_of(q) != chunk {
                continue;
            }
            let nd = d + c;
            if dist.get(&q).is_some_and(|best| *best <= nd) {
                continue;
            }
            dist.insert(q, nd);
            heap.push(Reverse((nd, q)));
        }
    }
    dist
}

fn edge_cost(grid: &Grid, a: CellPos, b: CellPos) -> Option<u32> {
    let mut out = Vec::new();
    neighbors(grid, a, &mut out);
    out.iter().find(|(q, _)| *q == b).map(|(_, c)| *c)
}

impl HpaGraph {
    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    pub fn entrance_count(&self) -> usize {
        self.entrances.values().map(|s| s.len()).sum()
    }

    fn all_chunks(grid: &Grid) -> BTreeSet<ChunkKey> {
        let mut all = BTreeSet::new();
        for z in 0..grid.depth {
            for cy in 0..grid.chunks_y() {
                for cx in 0..grid.chunks_x() {
                    all.insert(ChunkKey { z, cy, cx });
                }
            }
        }
        all
    }

    /// Recompute entrances and edges for `dirty` chunks and their
    /// neighbours. The first call builds everything.
    pub fn rebuild(&mut self, grid: &Grid, dirty: &BTreeSet<ChunkKey>) {
        let dirty = if self.built {
            dirty.clone()
        } else {
            self.entrances.clear();
            self.chunk_nodes.clear();
            self.edges.clear();
            self.built = true;
            Self::all_chunks(grid)
        };
        if dirty.is_empty() {
            return;
        }

        let mut affected: BTreeSet<ChunkKey> = dirty.clone();
        let stale: Vec<ChunkPair> = self
            .entrances
            .keys()
            .filter(|(a, b)| dirty.contains(a) || dirty.contains(b))
            .copied()
            .collect();
        for key in stale {
            affected.insert(key.0);
            affected.insert(key.1);
            self.entrances.remove(&key);
        }

        let mut fresh: BTreeMap<ChunkPair, BTreeSet<(CellPos, CellPos)>> = BTreeMap::new();
        for k in &dirty {
            self.horizontal_entrances(grid, *k, &mut fresh);
            Self::vertical_entrances(grid, *k, &mut fresh);
        }
        for (key, pairs) in fresh {
            if pairs.is_empty() {
                continue;
            }
            affected.insert(key.0);
            affected.insert(key.1);
            self.entrances.entry(key).or_default().extend(pairs);
        }

        for c in &affected {
            if let Some(old) = self.chunk_nodes.remove(c) {
                for n in old {
                    self.edges.remove(&n);
                }
            }
        }
        for c in &affected {
            self.rebuild_chunk_nodes(grid, *c);
        }
    }

    fn horizontal_entrances(&self, grid: &Grid, k: ChunkKey, out: &mut BTreeMap<ChunkPair, BTreeSet<(CellPos, CellPos)>>) {
        let cw = grid.chunk_w;
        let ch = grid.chunk_h;
        // Boundaries to the east and south of `k`, and of its west and north neighbours.
        let mut boundaries = Vec::new();
        if (k.cx + 1) * cw < grid.width {
            boundaries.push((k, ChunkKey { cx: k.cx + 1, ..k }, true));
        }
        if (k.cy + 1) * ch < grid.height {
            boundaries.push((k, ChunkKey { cy: k.cy + 1, ..k }, false));
        }
        if k.cx > 0 {
            boundaries.push((ChunkKey { cx: k.cx - 1, ..k }, k, true));
        }
        if k.cy > 0 {
            boundaries.push((ChunkKey { cy: k.cy - 1, ..k }, k, false));
        }

        for (a, b, east) in boundaries {
            let key = ordered(a, b);
            if out.contains_key(&key) {
                continue;
            }
            let mut pairs = BTreeSet::new();
            let z = a.z;
            let (len, make): (i32, Box<dyn Fn(i32) -> (CellPos, CellPos)>) = if east {
                let x = b.cx * cw - 1;
                let y0 = a.cy * ch;
                let y1 = ((a.cy + 1) * ch).min(grid.height);
                (y1 - y0, Box::new(move |i| (CellPos::new(x, y0 + i, z), CellPos::new(x + 1, y0 + i, z))))
            } else {
                let y = b.cy * ch - 1;
                let x0 = a.cx * cw;
                let x1 = ((a.cx + 1) * cw).min(grid.width);
                (x1 - x0, Box::new(move |i| (CellPos::new(x0 + i, y, z), CellPos::new(x0 + i, y + 1, z))))
            };
            let mut run_start: Option<i32> = None;
            for i in 0..=len {
                let open = i < len && {
                    let (p, q) = make(i);
                    grid.is_walkable(p) && grid.is_walkable(q)
                };
                match (open, run_start) {
                    (true, None) => run_start = Some(i),
                    (false, Some(s)) => {
                        pairs.insert(make((s + i - 1) / 2));
                        run_start = None;
                    }
                    _ => {}
                }
            }
            // `make` yields (cell in a, cell in b); orient to the key order.
            let oriented = if key.0 == a {
                pairs
            } else {
                pairs.into_iter().map(|(p, q)| (q, p)).collect()
            };
            out.insert(key, oriented);
        }
    }

    fn vertical_entrances(grid: &Grid, k: ChunkKey, out: &mut BTreeMap<ChunkPair, BTreeSet<(CellPos, CellPos)>>) {
        let x0 = k.cx * grid.chunk_w;
        let y0 = k.cy * grid.chunk_h;
        let x1 = (x0 + grid.chunk_w).min(grid.width);
        let y1 = (y0 + grid.chunk_h).min(grid.height);
        let mut edges = Vec::new();
        for y in y0..y1 {
            for x in x0..x1 {
                let p = CellPos::new(x, y, k.z);
                edges.clear();
                neighbors(grid, p, &mut edges);
                for (q, _) in edges.iter() {
                    if q.z == p.z {
                        continue;
                    }
                    let other = grid.chunk_of(*q);
                    let key = ordered(k, other);
                    let pair = if key.0 == k { (p, *q) } else { (*q, p) };
                    out.entry(key).or_default().insert(pair);
                }
            }
        }
    }

    fn rebuild_chunk_nodes(&mut self, grid: &Grid, c: ChunkKey) {
        let mut nodes = BTreeSet::new();
        let mut inter: BTreeMap<CellPos, Vec<CellPos>> = BTreeMap::new();
        for ((a, b), pairs) in &self.entrances {
            if *a != c && *b != c {
                continue;
            }
            for (p, q) in pairs {
                let (mine, theirs) = if *a == c { (*p, *q) } else { (*q, *p) };
                nodes.insert(mine);
                inter.entry(mine).or_default().push(theirs);
            }
        }

        for n in &nodes {
            let mut out = Vec::new();
            for t in inter.get(n).into_iter().flatten() {
                if let Some(cost) = edge_cost(grid, *n, *t) {
                    out.push(AbstractEdge {
                        to: *t,
                        cost,
                        inter: true,
                    });
                }
            }
            let dist = dijkstra_within(grid, *n, c);
            for m in &nodes {
                if m == n {
                    continue;
                }
                if let Some(cost) = dist.get(m) {
                    out.push(AbstractEdge {
                        to: *m,
                        cost: *cost,
                        inter: false,
                    });
                }
            }
            self.edges.insert(*n, out);
        }
        self.chunk_nodes.insert(c, nodes);
    }

    /// Reversed path from `start` to `goal`. Falls back to plain A* when
    /// refinement fails, which only happens against a stale graph.
    pub fn find_path(&self, grid: &Grid, start: CellPos, goal: CellPos) -> Option<Found> {
        if !grid.is_walkable(start) || !grid.is_walkable(goal) {
            return None;
        }
        if start == goal {
            return Some(Found { path: vec![start], cost: 0 });
        }
        if !self.built {
            return astar(grid, start, goal);
        }

        let sc = grid.chunk_of(start);
        let gc = grid.chunk_of(goal);
        let empty = BTreeSet::new();
        let start_links: Vec<(CellPos, u32)> = {
            let dist = dijkstra_within(grid, start, sc);
            let mut v: Vec<(CellPos, u32)> = self
                .chunk_nodes
                .get(&sc)
                .unwrap_or(&empty)
                .iter()
                .filter_map(|n| dist.get(n).map(|c| (*n, *c)))
                .collect();
            if sc == gc {
                if let Some(c) = dist.get(&goal) {
                    v.push((goal, *c));
                }
            }
            v
        };
        let goal_links: HashMap<CellPos, u32> = {
            let dist = dijkstra_within(grid, goal, gc);
            self.chunk_nodes
                .get(&gc)
                .unwrap_or(&empty)
                .iter()
                .filter_map(|n| dist.get(n).map(|c| (*n, *c)))
                .collect()
        };

        let abstract_path = self.abstract_search(start, goal, &start_links, &goal_links)?;
        self.refine(grid, &abstract_path).or_else(|| astar(grid, start, goal))
    }

    fn abstract_search(
        &self,
        start: CellPos,
        goal: CellPos,
        start_links: &[(CellPos, u32)],
        goal_links: &HashMap<CellPos, u32>,
    ) -> Option<Vec<CellPos>> {
        let mut open = BinaryHeap::new();
        let mut g_score: HashMap<CellPos, u32> = HashMap::new();
        let mut came_from: HashMap<CellPos, CellPos> = HashMap::new();
        let h0 = heuristic(start, goal);
        g_score.insert(start, 0);
        open.push(Reverse((h0, h0, start)));

        while let Some(Reverse((f, h, cur))) = open.pop() {
            let g = f - h;
            if g_score.get(&cur).is_some_and(|best| *best < g) {
                continue;
            }
            if cur == goal {
                let mut path = vec![cur];
                let mut at = cur;
                while let Some(prev) = came_from.get(&at) {
                    path.push(*prev);
                    at = *prev;
                }
                path.reverse();
                return Some(path);
            }
            let mut succ: Vec<(CellPos, u32)> = self
                .edges
                .get(&cur)
                .map(|es| es.iter().map(|e| (e.to, e.cost)).collect())
                .unwrap_or_default();
            if cur == start {
                succ.extend_from_slice(start_links);
            }
            if cur != start {
                if let Some(c) = goal_links.get(&cur) {
                    succ.push((goal, *c));
                }
            }
            for (next, cost) in succ {
                let tentative = g + cost;
                if g_score.get(&next).is_some_and(|best| *best <= tentative) {
                    continue;
                }
                g_score.insert(next, tentative);
                came_from.insert(next, cur);
                let nh = heuristic(next, goal);
                open.push(Reverse((tentative + nh, nh, next)));
            }
        }
        None
    }

    /// Expand an abstract node sequence into a reversed cell path.
    fn refine(&self, grid: &Grid, nodes: &[CellPos]) -> Option<Found> {
        let mut forward: Vec<CellPos> = vec![*nodes.first()?];
        let mut cost = 0;
        for pair in nodes.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a == b {
                continue;
            }
            let crossing = self
                .edges
                .get(&a)
                .is_some_and(|es| es.iter().any(|e| e.inter && e.to == b));
            if crossing {
                cost += edge_cost(grid, a, b)?;
                forward.push(b);
                continue;
            }
            let chunk = grid.chunk_of(a);
            let seg = if grid.chunk_of(b) == chunk {
                astar_filtered(grid, a, b, in_chunk(grid, chunk))
            } else {
                None
            };
            let seg = seg.or_else(|| astar(grid, a, b))?;
            cost += seg.cost;
            // Segment is reversed and starts with `b`; skip its copy of `a`.
            forward.extend(seg.path.iter().rev().skip(1));
        }
        forward.reverse();
        Some(Found { path: forward, cost })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::CellKind;

    fn built(grid: &mut Grid) -> HpaGraph {
        let mut g = HpaGraph::default();
        let dirty = grid.take_dirty_chunks();
        g.rebuild(grid, &dirty);
        g
    }

    #[test]
    fn test_open_grid_has_entrances() {
        let mut grid = Grid::with_chunks(16, 16, 1, 8, 8);
        let g = built(&mut grid);
        // Four chunks, four shared boundaries, one run each.
        assert_eq!(g.entrance_count(), 4);
    }

    #[test]
    fn test_wall_splits_entrance_run() {
        let mut grid = Grid::with_chunks(16, 8, 1, 8, 8);
        grid.set_kind(CellPos::new(7, 4, 0), CellKind::Wall);
        let g = built(&mut grid);
        assert_eq!(g.entrance_count(), 2);
    }

    #[test]
    fn test_cross_chunk_path_matches_astar_cost() {
        let mut grid = Grid::with_chunks(24, 24, 1, 8, 8);
        for y in 0..20 {
            grid.set_kind(CellPos::new(12, y, 0), CellKind::Wall);
        }
        let g = built(&mut grid);
        let s = CellPos::new(2, 2, 0);
        let t = CellPos::new(20, 3, 0);
        let h = g.find_path(&grid, s, t).unwrap();
        let a = astar(&grid, s, t).unwrap();
        assert_eq!(h.path[0], t);
        assert_eq!(*h.path.last().unwrap(), s);
        assert!(h.cost >= a.cost);
        assert_eq!(crate::path::path_cost(&grid, &h.path), Some(h.cost));
    }

    #[test]
    fn test_incremental_rebuild_sees_new_wall() {
        let mut grid = Grid::with_chunks(16, 8, 1, 8, 8);
        let mut g = built(&mut grid);
        for y in 0..8 {
            grid.set_kind(CellPos::new(8, y, 0), CellKind::Wall);
        }
        let dirty = grid.take_dirty_chunks();
        g.rebuild(&grid, &dirty);
        assert!(g.find_path(&grid, CellPos::new(1, 1, 0), CellPos::new(14, 1, 0)).is_none());
    }

    #[test]
    fn test_ladder_between_levels() {
        let mut grid = Grid::with_chunks(8, 8, 2, 8, 8);
        grid.set_kind(CellPos::new(4, 4, 0), CellKind::LadderUp);
        grid.set_kind(CellPos::new(4, 4, 1), CellKind::LadderDown);
        grid.set_kind(CellPos::new(5, 4, 0), CellKind::Wall);
        let g = built(&mut grid);
        let p = g.find_path(&grid, CellPos::new(0, 0, 0), CellPos::new(5, 4, 1)).unwrap();
        assert!(p.path.contains(&CellPos::new(4, 4, 1)));
    }
}
