//! Needs and freetime.
//!
//! Hunger, thirst and energy drain at rates the balance table derives from
//! game-hour budgets, so how long a need lasts in game-hours never depends
//! on the day length. Body temperature drifts toward the ambient
//! temperature of the mover's cell. The freetime state machine then sends
//! hungry, thirsty or tired movers off to eat, drink or sleep.

use colonysim_logic::items::clothing_cooling_reduction;

use crate::engine::Sim;
use crate::jobs::{cancel_job, finish_job, give_drink, give_eat, give_sleep};
use crate::movers::{is_carrying, remove_mover, FreetimeState, MoverId};

/// Drain needs and advance every mover's freetime state by `dt` game-seconds.
pub fn needs_tick(sim: &mut Sim, dt: f32) {
    let mut dead = Vec::new();
    for id in sim.movers.ids() {
        if drain(sim, id, dt) {
            dead.push(id);
        }
    }
    for id in dead {
        let name = sim.movers.get(id).map(|m| m.name.full()).unwrap_or_default();
        log::info!("{} died of deprivation", name);
        remove_mover(sim, id);
        sim.stats.deaths += 1;
    }
    for id in sim.movers.ids() {
        freetime_step(sim, id, dt);
    }
}

/// Apply one tick of drain to a mover. Returns `true` when it has gone
/// without food or water past the grace period.
fn drain(sim: &mut Sim, id: MoverId, dt: f32) -> bool {
    let b = &sim.balance;
    let flags = &sim.flags;
    let night = b.is_night(sim.clock.game_seconds);
    let Some(m) = sim.movers.get(id) else {
        return false;
    };
    let carrying = is_carrying(sim, m);
    let ambient = sim.grid.temperature(m.cell()) as f32;
    let insulation = m
        .equipped_clothing
        .and_then(|c| sim.items.get(c))
        .and_then(|c| clothing_cooling_reduction(c.item_type))
        .unwrap_or(0.0);
    let working = !m.is_idle() && m.freetime == FreetimeState::None;
    let resting = m.freetime == FreetimeState::Resting;

    let hunger_rate = b.rate_per_game_second(b.hunger_drain_per_gh());
    let thirst_rate = b.rate_per_game_second(b.thirst_drain_per_gh());
    let mut energy_rate = b.rate_per_game_second(if working {
        b.energy_drain_working_per_gh()
    } else {
        b.energy_drain_idle_per_gh()
    });
    if carrying {
        energy_rate *= b.carrying_energy_mult;
    }
    if night {
        energy_rate *= b.night_energy_mult;
    }
    let cooling = b.rate_per_game_second(b.body_temp_cooling_rate_per_gh) * (1.0 - insulation);
    let warming = b.rate_per_game_second(b.body_temp_warming_rate_per_gh);
    let metabolic = b.metabolic_heat_bonus;
    let grace = b.game_hours_to_game_seconds(b.starvation_grace_hours);
    let (hunger_on, thirst_on, energy_on, temp_on) =
        (flags.hunger_enabled, flags.thirst_enabled, flags.energy_enabled, flags.body_temp_enabled);

    let Some(m) = sim.movers.get_mut(id) else {
        return false;
    };
    let n = &mut m.needs;
    if hunger_on {
        n.hunger = (n.hunger - hunger_rate * dt).max(0.0);
    }
    if thirst_on {
        n.thirst = (n.thirst - thirst_rate * dt).max(0.0);
    }
    if energy_on && !resting {
        n.energy = (n.energy - energy_rate * dt).max(0.0);
    }
    if temp_on {
        let target = ambient + metabolic * n.hunger;
        if n.body_temp > target {
            n.body_temp = (n.body_temp - cooling * dt).max(target);
        } else {
            n.body_temp = (n.body_temp + warming * dt).min(target);
        }
    }
    m.freetime_cooldown = (m.freetime_cooldown - dt).max(0.0);

    let deprived = (hunger_on && m.needs.hunger <= 0.0) || (thirst_on && m.needs.thirst <= 0.0);
    if deprived {
        m.needs.deprivation_time += dt;
    } else {
        m.needs.deprivation_time = 0.0;
    }
    deprived && m.needs.deprivation_time >= grace
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Want {
    Drink,
    Eat,
    Rest,
}

fn freetime_step(sim: &mut Sim, id: MoverId, dt: f32) {
    let b = &sim.balance;
    let flags = &sim.flags;
    let Some(m) = sim.movers.get(id) else {
        return;
    };
    let hunger_critical = flags.hunger_enabled && m.needs.hunger < b.hunger_critical_threshold;
    let thirst_critical = flags.thirst_enabled && m.needs.thirst < b.thirst_critical_threshold;
    let exhausted = flags.energy_enabled && m.needs.energy < b.energy_exhausted_threshold;

    match m.freetime {
        FreetimeState::None => {
            if m.freetime_cooldown > 0.0 {
                return;
            }
            let want = if thirst_critical {
                Some((Want::Drink, true))
            } else if hunger_critical {
                Some((Want::Eat, true))
            } else if exhausted {
                Some((Want::Rest, true))
            } else if !m.is_idle() {
                None
            } else if flags.thirst_enabled && m.needs.thirst < b.thirst_seek_threshold {
                Some((Want::Drink, false))
            } else if flags.hunger_enabled && m.needs.hunger < b.hunger_seek_threshold {
                Some((Want::Eat, false))
            } else if flags.energy_enabled && m.needs.energy < b.energy_tired_threshold {
                Some((Want::Rest, false))
            } else {
                None
            };
            let Some((want, urgent)) = want else {
                return;
            };
            if urgent && !m.is_idle() {
                log::debug!("{} drops work to {:?}", m.name.full(), want);
                cancel_job(sim, id);
            }
            let started = match want {
                Want::Drink => give_drink(sim, id),
                Want::Eat => give_eat(sim, id),
                Want::Rest => give_sleep(sim, id),
            };
            if !started {
                let cooldown = sim.balance.game_hours_to_game_seconds(sim.balance.freetime_cooldown_gh);
                if let Some(m) = sim.movers.get_mut(id) {
                    m.freetime = FreetimeState::None;
                    m.freetime_cooldown = cooldown;
                }
            }
        }
        FreetimeState::SeekingFood | FreetimeState::SeekingDrink | FreetimeState::SeekingRest => {
            let timeout_gh = match m.freetime {
                FreetimeState::SeekingFood => b.food_seek_timeout_gh,
                FreetimeState::SeekingDrink => b.drink_seek_timeout_gh,
                _ => b.rest_seek_timeout_gh,
            };
            let timeout = b.game_hours_to_game_seconds(timeout_gh);
            let idle = m.is_idle();
            let Some(m) = sim.movers.get_mut(id) else {
                return;
            };
            m.freetime_timer += dt;
            if idle {
                m.freetime = FreetimeState::None;
                m.freetime_timer = 0.0;
            } else if m.freetime_timer >= timeout {
                log::debug!("{} gave up {:?}", m.name.full(), m.freetime);
                cancel_job(sim, id);
            }
        }
        FreetimeState::Resting => {
            if hunger_critical || thirst_critical {
                finish_job(sim, id);
            }
        }
        FreetimeState::Eating | FreetimeState::Drinking => {}
    }
}
