//! Job pool, claims and the per-tick job step.
//!
//! A job is a tagged variant plus the claims it owns: item reservations,
//! counted stockpile-slot reservations, blueprint slots, furniture and
//! workshop seats, designations and hunted animals. Every way a job ends
//! goes through `end_job`, which drops whatever is carried and releases
//! every claim, so a finished or cancelled job never leaks a reservation.

mod build;
mod care;
mod common;
mod craft;
mod dig;
mod dispatch;
mod equip;
mod farm;
mod haul;
mod hunt;

pub use care::{give_drink, give_eat, give_sleep};
pub use common::{mark_unreachable, safe_drop};
pub use dispatch::dispatch;

use colonysim_logic::constants::limits::MAX_JOBS;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::blueprint::BlueprintId;
use crate::common::CellPos;
use crate::engine::Sim;
use crate::fixtures::FixtureKey;
use crate::items::{ItemId, ItemState};
use crate::movers::{FreetimeState, MoverId};
use crate::stockpile::StockpileId;

new_key_type! {
    /// Generational handle for a job.
    pub struct JobId;
}

/// Something a job holds exclusively (or, for stockpile slots, holds a
/// counted share of the room).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Claim {
    Item(ItemId),
    /// A delivery promising `units` to a stockpile slot.
    StockpileSlot { sp: StockpileId, cell: CellPos, units: u32 },
    BlueprintSlot { bp: BlueprintId, slot: usize },
    /// Builder seat on a blueprint.
    Blueprint(BlueprintId),
    Furniture(FixtureKey),
    Workshop(FixtureKey),
    Designation(CellPos),
    Animal(FixtureKey),
}

/// Where a clear job takes an item that may not stay on a stockpile tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearDest {
    Stockpile { sp: StockpileId, slot: CellPos },
    Drop(CellPos),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrinkSource {
    Item(ItemId),
    /// Standing water next to (or under) the drinking spot.
    Water(CellPos),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobKind {
    Haul { item: ItemId, sp: StockpileId, slot: CellPos },
    Clear { item: ItemId, dest: ClearDest },
    Absorb { item: ItemId, sp: StockpileId, slot: CellPos },
    Mine { cell: CellPos, spot: CellPos },
    Channel { cell: CellPos, spot: CellPos },
    DigRamp { cell: CellPos, spot: CellPos },
    Chop { cell: CellPos, spot: CellPos },
    Build { bp: BlueprintId, spot: CellPos },
    HaulToBlueprint { item: ItemId, bp: BlueprintId, slot: usize, spot: CellPos },
    Craft { workshop: FixtureKey, bill: usize, inputs: Vec<ItemId>, fetched: usize },
    EquipClothing { item: ItemId },
    EquipTool { item: ItemId },
    Hunt { animal: FixtureKey },
    Butcher { carcass: ItemId },
    Eat { item: ItemId },
    Drink { source: DrinkSource, spot: CellPos },
    Sleep { bed: Option<FixtureKey>, spot: CellPos },
    Plant { cell: CellPos, spot: CellPos, seed: ItemId },
    Harvest { cell: CellPos, spot: CellPos },
    Deconstruct { cell: CellPos, spot: CellPos },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Haul { .. } => "haul",
            JobKind::Clear { .. } => "clear",
            JobKind::Absorb { .. } => "absorb",
            JobKind::Mine { .. } => "mine",
            JobKind::Channel { .. } => "channel",
            JobKind::DigRamp { .. } => "dig ramp",
            JobKind::Chop { .. } => "chop",
            JobKind::Build { .. } => "build",
            JobKind::HaulToBlueprint { .. } => "haul to blueprint",
            JobKind::Craft { .. } => "craft",
            JobKind::EquipClothing { .. } => "equip clothing",
            JobKind::EquipTool { .. } => "equip tool",
            JobKind::Hunt { .. } => "hunt",
            JobKind::Butcher { .. } => "butcher",
            JobKind::Eat { .. } => "eat",
            JobKind::Drink { .. } => "drink",
            JobKind::Sleep { .. } => "sleep",
            JobKind::Plant { .. } => "plant",
            JobKind::Harvest { .. } => "harvest",
            JobKind::Deconstruct { .. } => "deconstruct",
        }
    }

    /// Freetime jobs are driven by needs rather than the dispatcher.
    pub fn is_freetime(&self) -> bool {
        matches!(self, JobKind::Eat { .. } | JobKind::Drink { .. } | JobKind::Sleep { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Step {
    /// Walking to the item (or animal) to pick up.
    #[default]
    ToItem,
    /// Walking to where the work or delivery happens.
    ToTarget,
    Working,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub kind: JobKind,
    pub assigned_mover: MoverId,
    pub step: Step,
    pub progress: f32,
    pub carrying: Option<ItemId>,
    pub claims: Vec<Claim>,
}

impl Job {
    /// Whether the job refers to `item` through a claim or its hands.
    pub fn references_item(&self, item: ItemId) -> bool {
        self.carrying == Some(item) || self.claims.contains(&Claim::Item(item))
    }

    pub fn item_refs(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.claims
            .iter()
            .filter_map(|c| match c {
                Claim::Item(id) => Some(*id),
                _ => None,
            })
            .chain(self.carrying)
    }
}

/// What a step function reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRun {
    Running,
    Done,
    Cancel,
}

/// Every live job plus the active list in creation order.
#[derive(Debug, Clone, Default)]
pub struct JobPool {
    pub(crate) jobs: SlotMap<JobId, Job>,
    pub(crate) active: Vec<JobId>,
}

impl JobPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(id)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(id)
    }

    /// Active jobs in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (JobId, &Job)> {
        self.active.iter().filter_map(move |id| self.jobs.get(*id).map(|j| (*id, j)))
    }

    pub fn active_ids(&self) -> Vec<JobId> {
        self.active.clone()
    }

    fn insert(&mut self, job: Job) -> Option<JobId> {
        if self.jobs.len() >= MAX_JOBS {
            log::warn!("job pool exhausted ({}), {} not created", MAX_JOBS, job.kind.name());
            return None;
        }
        let id = self.jobs.insert(job);
        self.active.push(id);
        Some(id)
    }

    fn remove(&mut self, id: JobId) -> Option<Job> {
        let job = self.jobs.remove(id)?;
        self.active.retain(|a| *a != id);
        Some(job)
    }
}

/// Create a job owning `claims` and hand it to `mover`. On failure the
/// claims are released and `None` is returned.
pub(crate) fn start_job(sim: &mut Sim, mover: MoverId, kind: JobKind, claims: Vec<Claim>) -> Option<JobId> {
    let name = kind.name();
    let job = Job {
        kind,
        assigned_mover: mover,
        step: Step::ToItem,
        progress: 0.0,
        carrying: None,
        claims,
    };
    let claims = job.claims.clone();
    let Some(id) = sim.jobs.insert(job) else {
        release_claims(sim, mover, &claims);
        return None;
    };
    if let Some(m) = sim.movers.get_mut(mover) {
        m.current_job = Some(id);
    }
    sim.stats.jobs_created += 1;
    log::debug!("job {} assigned", name);
    Some(id)
}

/// Release one claim held on behalf of `mover`.
pub(crate) fn release_claim(sim: &mut Sim, mover: MoverId, claim: &Claim) {
    match *claim {
        Claim::Item(id) => {
            if let Some(it) = sim.items.get_mut(id) {
                if it.reserved_by == Some(mover) {
                    it.reserved_by = None;
                }
            }
        }
        Claim::StockpileSlot { sp, cell, units } => {
            if let Some(pile) = sim.stockpiles.get_mut(sp) {
                pile.release_slot(cell, units, &sim.items);
            }
        }
        Claim::BlueprintSlot { bp, slot } => {
            if let Some(b) = sim.blueprints.get_mut(bp) {
                b.release(slot);
            }
        }
        Claim::Blueprint(bp) => {
            if let Some(b) = sim.blueprints.get_mut(bp) {
                if b.assigned_builder == Some(mover) {
                    b.assigned_builder = None;
                }
            }
        }
        Claim::Furniture(key) => {
            sim.fixtures.with_furniture(key, |f| {
                if f.occupant == Some(mover) {
                    f.occupant = None;
                }
            });
        }
        Claim::Workshop(key) => {
            sim.fixtures.with_workshop(key, |w| {
                if w.assigned_crafter == Some(mover) {
                    w.assigned_crafter = None;
                }
            });
        }
        Claim::Designation(p) => sim.grid.set_designation_claimed(p, false),
        Claim::Animal(key) => {
            sim.fixtures.with_animal(key, |a| {
                if a.hunted_by == Some(mover) {
                    a.hunted_by = None;
                }
            });
        }
    }
}

pub(crate) fn release_claims(sim: &mut Sim, mover: MoverId, claims: &[Claim]) {
    for c in claims {
        release_claim(sim, mover, c);
    }
}

/// Finish or abandon a job: drop anything still carried, release every
/// claim and return the mover to idle.
fn end_job(sim: &mut Sim, id: JobId, done: bool) {
    let Some(job) = sim.jobs.remove(id) else {
        return;
    };
    let mover = job.assigned_mover;
    if let Some(item) = job.carrying {
        if sim.items.get(item).is_some_and(|it| it.state == ItemState::Carried) {
            safe_drop(sim, mover, item);
        }
    }
    release_claims(sim, mover, &job.claims);

    let freetime_cooldown = sim.balance.game_hours_to_game_seconds(sim.balance.freetime_cooldown_gh);
    if let Some(m) = sim.movers.get_mut(mover) {
        if m.current_job == Some(id) {
            m.current_job = None;
        }
        if job.kind.is_freetime() && m.freetime != FreetimeState::None {
            m.freetime = FreetimeState::None;
            m.freetime_timer = 0.0;
            if !done {
                m.freetime_cooldown = freetime_cooldown;
            }
        }
        if !done {
            m.goal = m.cell();
            m.clear_path();
            m.needs_repath = false;
            m.path_failed = false;
        }
    }
    if done {
        sim.stats.jobs_completed += 1;
        log::debug!("job {} done", job.kind.name());
    } else {
        sim.stats.jobs_cancelled += 1;
        log::debug!("job {} cancelled", job.kind.name());
    }
}

/// End `mover`'s job as completed, e.g. a sleeper woken by hunger.
pub(crate) fn finish_job(sim: &mut Sim, mover: MoverId) {
    let Some(id) = sim.movers.get(mover).and_then(|m| m.current_job) else {
        return;
    };
    end_job(sim, id, true);
}

/// Cancel whatever job `mover` holds. The single cancellation path.
pub fn cancel_job(sim: &mut Sim, mover: MoverId) {
    let Some(id) = sim.movers.get(mover).and_then(|m| m.current_job) else {
        return;
    };
    end_job(sim, id, false);
}

/// Cancel every job holding a claim that matches `pred`.
pub fn cancel_jobs_with_claim(sim: &mut Sim, pred: impl Fn(&Claim) -> bool) -> usize {
    let doomed: Vec<JobId> = sim
        .jobs
        .iter()
        .filter(|(_, j)| j.claims.iter().any(&pred))
        .map(|(id, _)| id)
        .collect();
    let n = doomed.len();
    for id in doomed {
        end_job(sim, id, false);
    }
    n
}

/// Cancel every job that refers to `item`.
pub fn cancel_jobs_for_item(sim: &mut Sim, item: ItemId) -> usize {
    let doomed: Vec<JobId> = sim
        .jobs
        .iter()
        .filter(|(_, j)| j.references_item(item))
        .map(|(id, _)| id)
        .collect();
    let n = doomed.len();
    for id in doomed {
        end_job(sim, id, false);
    }
    n
}

fn run_job(sim: &mut Sim, id: JobId, mover: MoverId, dt: f32) -> JobRun {
    let Some(job) = sim.jobs.get(id) else {
        return JobRun::Cancel;
    };
    if job.assigned_mover != mover {
        return JobRun::Cancel;
    }
    match job.kind.clone() {
        JobKind::Haul { item, sp, slot } => haul::run_haul(sim, id, mover, item, sp, slot),
        JobKind::Clear { item, dest } => haul::run_clear(sim, id, mover, item, dest),
        JobKind::Absorb { item, sp, slot } => haul::run_haul(sim, id, mover, item, sp, slot),
        JobKind::Mine { cell, spot } => dig::run_dig(sim, id, mover, cell, spot, dt),
        JobKind::Channel { cell, spot } => dig::run_dig(sim, id, mover, cell, spot, dt),
        JobKind::DigRamp { cell, spot } => dig::run_dig(sim, id, mover, cell, spot, dt),
        JobKind::Chop { cell, spot } => dig::run_dig(sim, id, mover, cell, spot, dt),
        JobKind::Build { bp, spot } => build::run_build(sim, id, mover, bp, spot, dt),
        JobKind::HaulToBlueprint { item, bp, slot, spot } => {
            build::run_haul_to_blueprint(sim, id, mover, item, bp, slot, spot)
        }
        JobKind::Deconstruct { cell, spot } => build::run_deconstruct(sim, id, mover, cell, spot, dt),
        JobKind::Craft { workshop, bill, inputs, fetched } => {
            craft::run_craft(sim, id, mover, workshop, bill, &inputs, fetched, dt)
        }
        JobKind::EquipClothing { item } | JobKind::EquipTool { item } => equip::run_equip(sim, id, mover, item),
        JobKind::Hunt { animal } => hunt::run_hunt(sim, id, mover, animal),
        JobKind::Butcher { carcass } => hunt::run_butcher(sim, id, mover, carcass, dt),
        JobKind::Eat { item } => care::run_eat(sim, id, mover, item, dt),
        JobKind::Drink { source, spot } => care::run_drink(sim, id, mover, source, spot, dt),
        JobKind::Sleep { bed, spot } => care::run_sleep(sim, id, mover, bed, spot, dt),
        JobKind::Plant { cell, spot, seed } => farm::run_plant(sim, id, mover, cell, spot, seed, dt),
        JobKind::Harvest { cell, spot } => farm::run_harvest(sim, id, mover, cell, spot, dt),
    }
}

/// Advance every assigned job by one tick, movers in insertion order.
pub fn step_jobs(sim: &mut Sim, dt: f32) {
    for mover in sim.movers.ids() {
        let Some(id) = sim.movers.get(mover).and_then(|m| m.current_job) else {
            continue;
        };
        if !sim.jobs.contains(id) {
            if let Some(m) = sim.movers.get_mut(mover) {
                m.current_job = None;
            }
            continue;
        }
        match run_job(sim, id, mover, dt) {
            JobRun::Running => {}
            JobRun::Done => end_job(sim, id, true),
            JobRun::Cancel => end_job(sim, id, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movers::spawn_mover;
    use colonysim_logic::config::SimFlags;
    use colonysim_logic::items::ItemType;

    fn sim() -> Sim {
        Sim::new(10, 10, 1, 7, SimFlags::deterministic_test())
    }

    #[test]
    fn test_cancel_releases_every_claim() {
        let mut sim = sim();
        let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let item = sim.items.spawn_default(ItemType::Red, CellPos::new(8, 8, 0), 1).unwrap();
        let sp = sim.stockpiles.create(2, 2, 0, 1, 1).unwrap();
        sim.items.get_mut(item).unwrap().reserved_by = Some(m);
        let slot = CellPos::new(2, 2, 0);
        let units = sim.stockpiles.get_mut(sp).unwrap().reserve_slot(slot, ItemType::Red, Default::default(), 1, &sim.items);
        assert_eq!(units, Some(1));
        let claims = vec![Claim::Item(item), Claim::StockpileSlot { sp, cell: slot, units: 1 }];
        let id = start_job(&mut sim, m, JobKind::Haul { item, sp, slot }, claims).unwrap();
        assert_eq!(sim.movers.get(m).unwrap().current_job, Some(id));

        cancel_job(&mut sim, m);
        assert!(sim.jobs.is_empty());
        assert!(sim.movers.get(m).unwrap().is_idle());
        assert_eq!(sim.items.get(item).unwrap().reserved_by, None);
        assert_eq!(sim.stockpiles.get(sp).unwrap().reserved_by[0], 0);
        assert_eq!(sim.stockpiles.get(sp).unwrap().reserved_units[0], 0);
    }

    #[test]
    fn test_cancel_drops_carried_item() {
        let mut sim = sim();
        let m = spawn_mover(&mut sim, CellPos::new(4, 4, 0)).unwrap();
        let item = sim.items.spawn_default(ItemType::Rock, CellPos::new(4, 4, 0), 3).unwrap();
        sim.items.get_mut(item).unwrap().reserved_by = Some(m);
        let id = start_job(
            &mut sim,
            m,
            JobKind::Clear {
                item,
                dest: ClearDest::Drop(CellPos::new(6, 6, 0)),
            },
            vec![Claim::Item(item)],
        )
        .unwrap();
        {
            let it = sim.items.get_mut(item).unwrap();
            it.state = ItemState::Carried;
        }
        sim.jobs.get_mut(id).unwrap().carrying = Some(item);
        cancel_job(&mut sim, m);
        let it = sim.items.get(item).unwrap();
        assert_eq!(it.state, ItemState::OnGround);
        assert_eq!(it.reserved_by, None);
        assert_eq!(it.cell(), CellPos::new(4, 4, 0));
    }

    #[test]
    fn test_cancel_by_claim() {
        let mut sim = sim();
        let a = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
        let b = spawn_mover(&mut sim, CellPos::new(2, 1, 0)).unwrap();
        let cell = CellPos::new(5, 5, 0);
        start_job(&mut sim, a, JobKind::Harvest { cell, spot: cell }, vec![Claim::Designation(cell)]).unwrap();
        let other = CellPos::new(6, 5, 0);
        start_job(&mut sim, b, JobKind::Harvest { cell: other, spot: other }, vec![Claim::Designation(other)]).unwrap();
        let n = cancel_jobs_with_claim(&mut sim, |c| *c == Claim::Designation(cell));
        assert_eq!(n, 1);
        assert!(sim.movers.get(a).unwrap().is_idle());
        assert!(!sim.movers.get(b).unwrap().is_idle());
    }
}
