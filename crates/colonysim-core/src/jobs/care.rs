//! Freetime jobs: eating, drinking and sleeping.
//!
//! The needs tick decides when a mover goes looking; these work-givers pick
//! what to use and the step functions move the freetime state from seeking
//! to the matching active state on arrival.

use colonysim_logic::constants::jobs::{DRINK_THIRST_RESTORE, MAX_CANDIDATES_PER_WORKGIVER, WATER_SEARCH_RADIUS};
use colonysim_logic::items::ItemType;

use super::common::{
    adjacent_spots, clear_carrying, consume_claim, consume_units, item_site, mark_unreachable, nearest_item, pick_up,
    reachable_spot, settle, walk,
};
use super::{start_job, Claim, DrinkSource, JobId, JobKind, JobRun, Step};
use crate::common::CellPos;
use crate::engine::Sim;
use crate::fixtures::FixtureKey;
use crate::items::{outermost_container, Item, ItemId, ItemState};
use crate::movers::{FreetimeState, MoverId};
use crate::path;

fn set_freetime(sim: &mut Sim, mover: MoverId, state: FreetimeState) {
    if let Some(m) = sim.movers.get_mut(mover) {
        if m.freetime != state {
            m.freetime = state;
            m.freetime_timer = 0.0;
        }
    }
}

/// Advance the job's progress by `dt` over `duration`; `true` once full.
fn advance(sim: &mut Sim, id: JobId, duration: f32, dt: f32) -> bool {
    let Some(job) = sim.jobs.get_mut(id) else {
        return false;
    };
    job.step = Step::Working;
    job.progress += dt / duration.max(f32::EPSILON);
    job.progress >= 1.0
}

pub(super) fn run_eat(sim: &mut Sim, id: JobId, mover: MoverId, item: ItemId, dt: f32) -> JobRun {
    let Some(step) = sim.jobs.get(id).map(|j| j.step) else {
        return JobRun::Cancel;
    };
    if step == Step::ToItem {
        let Some(site) = item_site(sim, item) else {
            return JobRun::Cancel;
        };
        match walk(sim, mover, site) {
            None => {}
            Some(JobRun::Cancel) => {
                mark_unreachable(sim, item);
                return JobRun::Cancel;
            }
            Some(r) => return r,
        }
        if pick_up(sim, id, mover, item, Some(1)).is_none() {
            return JobRun::Cancel;
        }
        settle(sim, mover);
        set_freetime(sim, mover, FreetimeState::Eating);
        if let Some(job) = sim.jobs.get_mut(id) {
            job.step = Step::Working;
        }
        return JobRun::Running;
    }

    let duration = sim.balance.eating_duration_seconds();
    if !advance(sim, id, duration, dt) {
        return JobRun::Running;
    }
    let Some(food) = sim.jobs.get(id).and_then(|j| j.carrying) else {
        return JobRun::Cancel;
    };
    let nutrition = sim.items.get(food).map_or(0.0, |it| it.item_type.def().nutrition);
    clear_carrying(sim, id);
    sim.items.delete_item(food);
    if let Some(m) = sim.movers.get_mut(mover) {
        m.needs.hunger = (m.needs.hunger + nutrition).min(1.0);
    }
    JobRun::Done
}

pub(super) fn run_drink(
    sim: &mut Sim,
    id: JobId,
    mover: MoverId,
    source: DrinkSource,
    spot: CellPos,
    dt: f32,
) -> JobRun {
    match source {
        DrinkSource::Item(item) if !sim.items.contains(item) => return JobRun::Cancel,
        DrinkSource::Water(cell) if sim.grid.water(cell) == 0 => return JobRun::Cancel,
        _ => {}
    }
    if sim.jobs.get(id).map(|j| j.step) != Some(Step::Working) {
        match walk(sim, mover, spot) {
            None => {}
            Some(JobRun::Cancel) => {
                if let DrinkSource::Item(item) = source {
                    mark_unreachable(sim, item);
                }
                return JobRun::Cancel;
            }
            Some(r) => return r,
        }
        settle(sim, mover);
        set_freetime(sim, mover, FreetimeState::Drinking);
    }
    let duration = sim.balance.drinking_duration_seconds();
    if !advance(sim, id, duration, dt) {
        return JobRun::Running;
    }
    if let DrinkSource::Item(item) = source {
        consume_claim(sim, id, Claim::Item(item));
        if let Some(it) = sim.items.get_mut(item) {
            it.reserved_by = None;
        }
        consume_units(sim, item, 1);
    }
    if let Some(m) = sim.movers.get_mut(mover) {
        m.needs.thirst = (m.needs.thirst + DRINK_THIRST_RESTORE).min(1.0);
    }
    JobRun::Done
}

/// Energy regained per game-second at a rest rate between bare ground (0)
/// and a bed (1).
fn recovery_per_second(sim: &Sim, rest_rate: f32) -> f32 {
    let b = &sim.balance;
    let ground = b.ground_recovery_per_gh();
    let per_gh = ground + (b.bed_recovery_per_gh() - ground) * rest_rate.clamp(0.0, 1.0);
    b.rate_per_game_second(per_gh)
}

pub(super) fn run_sleep(
    sim: &mut Sim,
    id: JobId,
    mover: MoverId,
    bed: Option<FixtureKey>,
    spot: CellPos,
    dt: f32,
) -> JobRun {
    let rest_rate = match bed {
        Some(key) => match sim.fixtures.furniture(key) {
            Some(f) if f.occupant == Some(mover) => f.kind.def().rest_rate,
            _ => return JobRun::Cancel,
        },
        None => 0.0,
    };
    if sim.jobs.get(id).map(|j| j.step) != Some(Step::Working) {
        if let Some(r) = walk(sim, mover, spot) {
            return r;
        }
        settle(sim, mover);
        set_freetime(sim, mover, FreetimeState::Resting);
        if let Some(job) = sim.jobs.get_mut(id) {
            job.step = Step::Working;
        }
    }
    let gain = recovery_per_second(sim, rest_rate) * dt;
    let wake = sim.balance.energy_wake_threshold;
    let Some(m) = sim.movers.get_mut(mover) else {
        return JobRun::Cancel;
    };
    m.needs.energy = (m.needs.energy + gain).min(1.0);
    if m.needs.energy >= wake {
        JobRun::Done
    } else {
        JobRun::Running
    }
}

fn in_stockpile(sim: &Sim, id: ItemId, it: &Item) -> bool {
    match it.state {
        ItemState::InStockpile => true,
        ItemState::InContainer => sim
            .items
            .get(outermost_container(&sim.items, id))
            .is_some_and(|outer| outer.state == ItemState::InStockpile),
        _ => false,
    }
}

fn start_freetime(sim: &mut Sim, mover: MoverId, seeking: FreetimeState, kind: JobKind, claims: Vec<Claim>) -> bool {
    set_freetime(sim, mover, seeking);
    start_job(sim, mover, kind, claims).is_some()
}

/// Find food and start eating. Stockpiled food comes first; loose food on
/// the ground is only taken when hunger is critical.
pub fn give_eat(sim: &mut Sim, mover: MoverId) -> bool {
    let Some((at, hunger)) = sim.movers.get(mover).map(|m| (m.cell(), m.needs.hunger)) else {
        return false;
    };
    let starving = hunger < sim.balance.hunger_critical_threshold;
    let mut food = nearest_item(sim, at, |id, it| it.is_edible() && in_stockpile(sim, id, it));
    if food.is_none() && starving {
        food = nearest_item(sim, at, |_, it| it.is_edible() && it.state != ItemState::Carried);
    }
    let Some(item) = food else {
        return false;
    };
    let Some(site) = item_site(sim, item) else {
        return false;
    };
    if !path::is_reachable(sim, at, site) {
        mark_unreachable(sim, item);
        return false;
    }
    if let Some(it) = sim.items.get_mut(item) {
        it.reserved_by = Some(mover);
    }
    start_freetime(sim, mover, FreetimeState::SeekingFood, JobKind::Eat { item }, vec![Claim::Item(item)])
}

fn nearest_water_cells(sim: &Sim, at: CellPos) -> Vec<CellPos> {
    let r = WATER_SEARCH_RADIUS;
    let mut cells = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            let p = at.offset(dx, dy, 0);
            if sim.grid.in_bounds(p) && sim.grid.water(p) > 0 {
                cells.push(p);
            }
        }
    }
    cells.sort_by_key(|p| (p.dist_sq_weighted(&at), p.y, p.x));
    cells
}

/// Find something to drink: a water item, else standing water nearby.
pub fn give_drink(sim: &mut Sim, mover: MoverId) -> bool {
    let Some(at) = sim.movers.get(mover).map(|m| m.cell()) else {
        return false;
    };
    if let Some(item) = nearest_item(sim, at, |_, it| it.item_type == ItemType::Water && it.state != ItemState::Carried) {
        if let Some(site) = item_site(sim, item) {
            if path::is_reachable(sim, at, site) {
                if let Some(it) = sim.items.get_mut(item) {
                    it.reserved_by = Some(mover);
                }
                let kind = JobKind::Drink {
                    source: DrinkSource::Item(item),
                    spot: site,
                };
                return start_freetime(sim, mover, FreetimeState::SeekingDrink, kind, vec![Claim::Item(item)]);
            }
            mark_unreachable(sim, item);
        }
    }
    for cell in nearest_water_cells(sim, at).into_iter().take(MAX_CANDIDATES_PER_WORKGIVER) {
        let mut spots = adjacent_spots(sim, cell);
        if sim.grid.is_walkable(cell) {
            spots.push(cell);
        }
        let Some(spot) = reachable_spot(sim, at, spots) else {
            continue;
        };
        let kind = JobKind::Drink {
            source: DrinkSource::Water(cell),
            spot,
        };
        return start_freetime(sim, mover, FreetimeState::SeekingDrink, kind, Vec::new());
    }
    false
}

/// Pick the furniture with the best rest rate for its distance, or lie
/// down where the mover stands.
pub fn give_sleep(sim: &mut Sim, mover: MoverId) -> bool {
    let Some(at) = sim.movers.get(mover).map(|m| m.cell()) else {
        return false;
    };
    let mut beds: Vec<(f32, FixtureKey, CellPos)> = sim
        .fixtures
        .furniture_list()
        .into_iter()
        .filter(|(_, f)| f.occupant.is_none() && f.kind.def().rest_rate > 0.0)
        .map(|(k, f)| {
            let dist = (f.pos.dist_sq_weighted(&at) as f32).sqrt();
            (f.kind.def().rest_rate / (1.0 + dist), k, f.pos)
        })
        .collect();
    beds.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1 .0.cmp(&b.1 .0)));
    for (_, key, pos) in beds.into_iter().take(MAX_CANDIDATES_PER_WORKGIVER) {
        if pos != at && !path::is_reachable(sim, at, pos) {
            continue;
        }
        sim.fixtures.with_furniture(key, |f| f.occupant = Some(mover));
        let kind = JobKind::Sleep { bed: Some(key), spot: pos };
        if start_freetime(sim, mover, FreetimeState::SeekingRest, kind, vec![Claim::Furniture(key)]) {
            return true;
        }
    }
    start_freetime(
        sim,
        mover,
        FreetimeState::SeekingRest,
        JobKind::Sleep { bed: None, spot: at },
        Vec::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movers::spawn_mover;
    use colonysim_logic::config::SimFlags;
    use colonysim_logic::fixtures::FurnitureType;
    use colonysim_logic::items::MaterialType;

    fn sim() -> Sim {
        Sim::new(12, 12, 1, 6, SimFlags::deterministic_test())
    }

    fn run(sim: &mut Sim, ticks: usize) {
        for _ in 0..ticks {
            sim.tick();
        }
    }

    #[test]
    fn test_eat_prefers_stockpiled_food() {
        let mut sim = sim();
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let near = sim.items.spawn_default(ItemType::Berries, CellPos::new(2, 1, 0), 1).unwrap();
        let sp = sim.stockpiles.create(8, 8, 0, 1, 1).unwrap();
        let stored = sim.items.spawn_default(ItemType::Berries, CellPos::new(8, 8, 0), 1).unwrap();
        let placed = sim.stockpiles.get_mut(sp).unwrap().place_item(CellPos::new(8, 8, 0), stored, &mut sim.items);
        assert!(matches!(placed, crate::stockpile::Placed::Stored(_)));

        sim.movers.get_mut(m).unwrap().needs.hunger = 0.2;
        sim.rebuild_spatial();
        assert!(give_eat(&mut sim, m));
        let job = sim.movers.get(m).unwrap().current_job.unwrap();
        assert_eq!(sim.jobs.get(job).unwrap().kind, JobKind::Eat { item: stored });
        assert_eq!(sim.items.get(near).unwrap().reserved_by, None);
        assert_eq!(sim.movers.get(m).unwrap().freetime, FreetimeState::SeekingFood);
    }

    #[test]
    fn test_ground_food_only_when_starving() {
        let mut sim = sim();
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        sim.items.spawn_default(ItemType::Berries, CellPos::new(3, 1, 0), 1).unwrap();
        sim.rebuild_spatial();
        sim.movers.get_mut(m).unwrap().needs.hunger = 0.25;
        assert!(!give_eat(&mut sim, m));
        sim.movers.get_mut(m).unwrap().needs.hunger = 0.05;
        assert!(give_eat(&mut sim, m));
    }

    #[test]
    fn test_eating_restores_hunger() {
        let mut sim = sim();
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let food = sim.items.spawn_default(ItemType::CookedMeat, CellPos::new(3, 1, 0), 2).unwrap();
        sim.movers.get_mut(m).unwrap().needs.hunger = 0.05;
        sim.rebuild_spatial();
        assert!(give_eat(&mut sim, m));
        run(&mut sim, 60 * 40);
        let mv = sim.movers.get(m).unwrap();
        assert!(mv.is_idle());
        assert_eq!(mv.freetime, FreetimeState::None);
        assert!((mv.needs.hunger - 0.65).abs() < 1e-4);
        assert_eq!(sim.items.get(food).unwrap().stack_count, 1);
    }

    #[test]
    fn test_drink_from_standing_water() {
        let mut sim = sim();
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        sim.grid.set_water(CellPos::new(6, 6, 0), 3);
        sim.movers.get_mut(m).unwrap().needs.thirst = 0.2;
        assert!(give_drink(&mut sim, m));
        run(&mut sim, 60 * 30);
        let mv = sim.movers.get(m).unwrap();
        assert!(mv.is_idle());
        assert!((mv.needs.thirst - 0.8).abs() < 1e-4);
        assert!(mv.cell().chebyshev(&CellPos::new(6, 6, 0)) <= 1);
    }

    #[test]
    fn test_sleep_picks_bed_over_closer_chair() {
        let mut sim = sim();
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        sim.fixtures
            .spawn_furniture(&mut sim.grid, FurnitureType::Chair, MaterialType::Oak, CellPos::new(2, 1, 0));
        let bed = sim
            .fixtures
            .spawn_furniture(&mut sim.grid, FurnitureType::Bed, MaterialType::Oak, CellPos::new(3, 1, 0));
        sim.movers.get_mut(m).unwrap().needs.energy = 0.1;
        assert!(give_sleep(&mut sim, m));
        assert_eq!(sim.fixtures.furniture(bed).unwrap().occupant, Some(m));
    }

    #[test]
    fn test_sleep_on_ground_without_furniture() {
        let mut sim = sim();
        let m = spawn_mover(&mut sim, CellPos::new(4, 4, 0)).unwrap();
        sim.movers.get_mut(m).unwrap().needs.energy = 0.795;
        assert!(give_sleep(&mut sim, m));
        run(&mut sim, 600);
        let mv = sim.movers.get(m).unwrap();
        assert!(mv.needs.energy >= sim.balance.energy_wake_threshold);
        assert!(mv.is_idle());
        assert_eq!(mv.freetime, FreetimeState::None);
    }
}
