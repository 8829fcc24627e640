//! Animal wandering. Animals walk straight lines to random nearby goals on
//! their own level and give up on a goal when the way is blocked.

use rand::Rng;

use crate::common::CellPos;
use crate::engine::Sim;
use crate::fixtures::Animal;

pub fn animals_tick(sim: &mut Sim, dt: f32) {
    for (key, mut a) in sim.fixtures.animal_list() {
        let def = a.kind.def();
        a.wander_timer -= dt;
        if a.goal.is_none() && a.wander_timer <= 0.0 {
            a.goal = pick_goal(sim, a.cell(), def.wander_radius);
            a.wander_timer = def.wander_interval;
        }
        step(sim, &mut a, def.speed * dt);
        sim.fixtures.with_animal(key, |slot| *slot = a);
    }
}

fn pick_goal(sim: &mut Sim, from: CellPos, radius: i32) -> Option<CellPos> {
    for _ in 0..4 {
        let dx = sim.rng.gen_range(-radius..=radius);
        let dy = sim.rng.gen_range(-radius..=radius);
        let q = from.offset(dx, dy, 0);
        if q != from && sim.grid.is_walkable(q) {
            return Some(q);
        }
    }
    None
}

fn step(sim: &Sim, a: &mut Animal, max_dist: f32) {
    let Some(goal) = a.goal else {
        return;
    };
    let target = goal.center();
    let dist = a.pos.distance_xy(&target);
    if dist <= max_dist {
        a.pos = target;
        a.goal = None;
        return;
    }
    let next = a.pos + (target - a.pos).normalize() * max_dist;
    if sim.grid.is_walkable(next.cell()) {
        a.pos = next;
    } else {
        a.goal = None;
    }
}
