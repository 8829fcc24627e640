//! Hands work to idle movers.
//!
//! Idle movers are visited in insertion order and each asks the
//! work-givers in a fixed priority order; the first that creates a job
//! wins. Eating, drinking and sleeping are started by the needs tick, so
//! a mover already in freetime is skipped here.

use colonysim_logic::constants::jobs::IDLE_WANDER_CHANCE;

use super::{build, craft, dig, equip, farm, haul, hunt};
use crate::common::CellPos;
use crate::engine::Sim;
use crate::movers::{random_walkable_near, Capabilities, FreetimeState, MoverId, WANDER_RADIUS};

type WorkGiver = fn(&mut Sim, MoverId, CellPos) -> bool;

/// Work-givers in priority order, each with the capability it needs.
const WORK_GIVERS: &[(fn(&Capabilities) -> bool, WorkGiver)] = &[
    (|_| true, equip::give_equip_clothing),
    (|_| true, equip::give_equip_tool),
    (|c| c.can_build, build::give_deconstruct),
    (|c| c.can_haul, haul::give_clear),
    (|c| c.can_build, build::give_build),
    (|c| c.can_mine, dig::give_dig),
    (|c| c.can_haul, craft::give_craft),
    (|c| c.can_hunt, hunt::give_hunt),
    (|c| c.can_hunt, hunt::give_butcher),
    (|c| c.can_plant, farm::give_harvest),
    (|c| c.can_plant, farm::give_plant),
    (|c| c.can_haul, haul::give_haul),
    (|c| c.can_haul, haul::give_rehaul),
];

/// Give every idle mover its highest-priority job, or let it wander.
pub fn dispatch(sim: &mut Sim) {
    let tick = sim.clock.tick;
    for (index, mover) in sim.movers.ids().into_iter().enumerate() {
        if sim.flags.use_staggered_updates && (index as u64 + tick) % 4 != 0 {
            continue;
        }
        let Some(m) = sim.movers.get(mover) else {
            continue;
        };
        if !m.is_idle() || m.freetime != FreetimeState::None {
            continue;
        }
        let caps = m.capabilities;
        let at = m.cell();
        let assigned = WORK_GIVERS
            .iter()
            .filter(|(allowed, _)| allowed(&caps))
            .any(|(_, give)| give(sim, mover, at));
        if !assigned {
            idle_wander(sim, mover, at);
        }
    }
}

fn idle_wander(sim: &mut Sim, mover: MoverId, at: CellPos) {
    if sim.flags.endless_mover_mode {
        return;
    }
    let busy = sim
        .movers
        .get(mover)
        .map_or(true, |m| m.has_path() || m.needs_repath || m.goal != at);
    if busy || !sim.rng.chance(IDLE_WANDER_CHANCE) {
        return;
    }
    if let Some(goal) = random_walkable_near(sim, at, WANDER_RADIUS / 2) {
        if let Some(m) = sim.movers.get_mut(mover) {
            m.goal = goal;
            m.path_failed = false;
            m.needs_repath = true;
        }
    }
}
