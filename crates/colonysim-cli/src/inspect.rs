//! Save-file inspection: a summary, or the subset the flags ask for.

use std::io::{self, Write};

use colonysim_core::common::CellPos;
use colonysim_core::engine::Sim;
use colonysim_core::items::{slot_index, ItemState};
use colonysim_core::movers::Mover;
use colonysim_logic::constants::mover::STUCK_REPATH_TIME;

/// What to print. With nothing selected, the summary is printed.
#[derive(Debug, Default)]
pub struct Query {
    pub mover: Option<u32>,
    pub item: Option<u32>,
    pub job: Option<u32>,
    pub stockpile: Option<u32>,
    pub cell: Option<CellPos>,
    pub stuck: bool,
    pub reserved: bool,
    pub jobs_active: bool,
}

impl Query {
    fn is_empty(&self) -> bool {
        self.mover.is_none()
            && self.item.is_none()
            && self.job.is_none()
            && self.stockpile.is_none()
            && self.cell.is_none()
            && !self.stuck
            && !self.reserved
            && !self.jobs_active
    }
}

pub fn report(sim: &Sim, q: &Query, out: &mut impl Write) -> io::Result<()> {
    if q.is_empty() {
        return summary(sim, out);
    }
    if let Some(n) = q.mover {
        mover(sim, n, out)?;
    }
    if let Some(n) = q.item {
        item(sim, n, out)?;
    }
    if let Some(n) = q.job {
        job(sim, n, out)?;
    }
    if let Some(n) = q.stockpile {
        stockpile(sim, n, out)?;
    }
    if let Some(p) = q.cell {
        cell(sim, p, out)?;
    }
    if q.stuck {
        stuck(sim, out)?;
    }
    if q.reserved {
        reserved(sim, out)?;
    }
    if q.jobs_active {
        jobs_active(sim, out)?;
    }
    Ok(())
}

fn summary(sim: &Sim, out: &mut impl Write) -> io::Result<()> {
    let g = &sim.grid;
    writeln!(out, "=== Save Summary ===")?;
    writeln!(out, "world      {}x{}x{}", g.width, g.height, g.depth)?;
    writeln!(
        out,
        "time       tick {}, day {} {:05.2}h{}",
        sim.clock.tick,
        sim.clock.day(&sim.balance),
        sim.clock.hour_of_day(&sim.balance),
        if sim.clock.is_night(&sim.balance) { " (night)" } else { "" }
    )?;
    writeln!(out, "weather    {:?}, ambient {}°C", sim.layers.weather.kind, sim.layers.weather.ambient)?;
    writeln!(out, "movers     {}", sim.movers.len())?;
    writeln!(out, "items      {} (high-water {})", sim.items.len(), sim.items.high_water_mark())?;
    writeln!(out, "jobs       {}", sim.jobs.len())?;
    writeln!(out, "stockpiles {}", sim.stockpiles.len())?;
    writeln!(out, "blueprints {}", sim.blueprints.len())?;
    writeln!(out, "zones      {}", sim.zones.len())?;
    writeln!(
        out,
        "fixtures   {} furniture, {} workshops, {} animals",
        sim.fixtures.furniture_list().len(),
        sim.fixtures.workshop_list().len(),
        sim.fixtures.animal_list().len()
    )?;
    let s = &sim.stats;
    writeln!(
        out,
        "stats      jobs {}/{}/{} (created/done/cancelled), repaths {}, path failures {}, unreachable {}, deaths {}",
        s.jobs_created, s.jobs_completed, s.jobs_cancelled, s.repaths, s.path_failures, s.unreachable_marks, s.deaths
    )?;
    writeln!(out, "flags      {:?}", sim.flags)
}

fn mover_line(sim: &Sim, n: u32, m: &Mover) -> String {
    let job = m
        .current_job
        .and_then(|j| sim.jobs.get(j))
        .map(|j| j.kind.name())
        .unwrap_or("idle");
    format!("mover {} {} at {} ({})", n, m.name.full(), m.cell(), job)
}

fn mover(sim: &Sim, n: u32, out: &mut impl Write) -> io::Result<()> {
    let Some((_, m)) = sim.movers.iter().find(|(id, _)| slot_index(*id) == n) else {
        return writeln!(out, "no mover {}", n);
    };
    writeln!(out, "{}", mover_line(sim, n, m))?;
    writeln!(out, "  pos {:.2},{:.2},{:.2} goal {}", m.pos.x, m.pos.y, m.pos.z, m.goal)?;
    writeln!(
        out,
        "  path {} waypoints, index {}, needs_repath {}, failed {}",
        m.path.len(),
        m.path_index,
        m.needs_repath,
        m.path_failed
    )?;
    writeln!(
        out,
        "  needs hunger {:.3} thirst {:.3} energy {:.3} body {:.1}°C deprived {:.1}s",
        m.needs.hunger, m.needs.thirst, m.needs.energy, m.needs.body_temp, m.needs.deprivation_time
    )?;
    writeln!(out, "  freetime {:?} (timer {:.1}, cooldown {:.1})", m.freetime, m.freetime_timer, m.freetime_cooldown)?;
    writeln!(out, "  tool {:?} clothing {:?}", m.equipped_tool, m.equipped_clothing)?;
    writeln!(out, "  no progress for {:.1}s", m.time_without_progress)
}

fn item(sim: &Sim, n: u32, out: &mut impl Write) -> io::Result<()> {
    let Some((id, it)) = sim.items.iter().find(|(id, _)| slot_index(*id) == n) else {
        return writeln!(out, "no item {}", n);
    };
    writeln!(
        out,
        "item {} {:?}: {} x{} ({}) {:?} at {}",
        n,
        id,
        it.item_type.name(),
        it.stack_count,
        it.material.name(),
        it.state,
        it.cell()
    )?;
    writeln!(
        out,
        "  reserved by {:?}, unreachable {:.1}s, condition {:?}",
        it.reserved_by, it.unreachable_cooldown, it.condition
    )?;
    if let Some(parent) = it.contained_in {
        writeln!(out, "  inside {:?}", parent)?;
    }
    if it.is_container() {
        writeln!(out, "  holds {} records", it.content_count)?;
    }
    Ok(())
}

fn job(sim: &Sim, n: u32, out: &mut impl Write) -> io::Result<()> {
    let Some((id, j)) = sim.jobs.iter().find(|(id, _)| slot_index(*id) == n) else {
        return writeln!(out, "no job {}", n);
    };
    writeln!(out, "job {} {:?}: {}", n, id, j.kind.name())?;
    writeln!(out, "  {:?}", j.kind)?;
    writeln!(
        out,
        "  mover {:?} step {:?} progress {:.2} carrying {:?}",
        j.assigned_mover, j.step, j.progress, j.carrying
    )?;
    for c in &j.claims {
        writeln!(out, "  claim {:?}", c)?;
    }
    Ok(())
}

fn stockpile(sim: &Sim, n: u32, out: &mut impl Write) -> io::Result<()> {
    let Some((_, sp)) = sim.stockpiles.iter().find(|(id, _)| slot_index(*id) == n) else {
        return writeln!(out, "no stockpile {}", n);
    };
    writeln!(
        out,
        "stockpile {} at {},{},{} size {}x{} priority {} max stack {} free {}",
        n, sp.x, sp.y, sp.z, sp.width, sp.height, sp.priority, sp.max_stack_size, sp.free_slot_count
    )?;
    for i in 0..sp.slot_count() {
        if !sp.active_cells[i] {
            writeln!(out, "  {} inactive", sp.slot_cell(i))?;
            continue;
        }
        let kind = sp.slot_types[i].map(|t| t.name()).unwrap_or("-");
        writeln!(
            out,
            "  {} {} x{} reserved {} ({} units){}",
            sp.slot_cell(i),
            kind,
            sp.slot_counts[i],
            sp.reserved_by[i],
            sp.reserved_units[i],
            if sp.slot_is_container[i] { " (container)" } else { "" }
        )?;
    }
    Ok(())
}

fn cell(sim: &Sim, p: CellPos, out: &mut impl Write) -> io::Result<()> {
    let g = &sim.grid;
    if !g.in_bounds(p) {
        return writeln!(out, "cell {} is out of bounds", p);
    }
    writeln!(
        out,
        "cell {}: {:?} ({}){}",
        p,
        g.kind(p),
        g.material(p).name(),
        if g.has_floor(p) { " with floor" } else { "" }
    )?;
    writeln!(
        out,
        "  water {} fire {} smoke {} temp {}°C wetness {}",
        g.water(p),
        g.fire(p),
        g.smoke(p),
        g.temperature(p),
        g.wetness(p)
    )?;
    writeln!(
        out,
        "  vegetation {:?}{} designation {:?}{}",
        g.vegetation(p),
        if g.is_burned(p) { " (burned)" } else { "" },
        g.designation(p),
        if g.designation_claimed(p) { " (claimed)" } else { "" }
    )?;
    writeln!(out, "  walkable {} penalty {}", g.is_walkable(p), g.move_penalty(p))?;
    for (id, it) in sim.items.iter().filter(|(_, it)| it.cell() == p && it.contained_in.is_none()) {
        writeln!(out, "  item {}: {} x{} {:?}", slot_index(id), it.item_type.name(), it.stack_count, it.state)?;
    }
    for (id, m) in sim.movers.iter().filter(|(_, m)| m.cell() == p) {
        writeln!(out, "  {}", mover_line(sim, slot_index(id), m))?;
    }
    if let Some(f) = sim.fixtures.furniture_at(p).and_then(|k| sim.fixtures.furniture(k)) {
        writeln!(out, "  furniture {:?} occupant {:?}", f.kind, f.occupant)?;
    }
    if let Some(w) = sim.fixtures.workshop_at(p).and_then(|k| sim.fixtures.workshop(k)) {
        writeln!(out, "  workshop {:?} with {} bills", w.kind, w.bills.len())?;
    }
    if let Some(bp) = sim.blueprints.at(p).and_then(|id| sim.blueprints.get(id)) {
        writeln!(out, "  blueprint {:?} stage {}", bp.recipe, bp.stage)?;
    }
    Ok(())
}

fn stuck(sim: &Sim, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "=== Stuck movers ===")?;
    let mut found = 0;
    for (id, m) in sim.movers.iter() {
        if m.time_without_progress >= STUCK_REPATH_TIME || m.path_failed {
            found += 1;
            writeln!(
                out,
                "  {} ({:.1}s without progress{})",
                mover_line(sim, slot_index(id), m),
                m.time_without_progress,
                if m.path_failed { ", path failed" } else { "" }
            )?;
        }
    }
    writeln!(out, "  {} stuck", found)
}

fn reserved(sim: &Sim, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "=== Reserved items ===")?;
    let mut found = 0;
    for (id, it) in sim.items.iter() {
        let Some(holder) = it.reserved_by else {
            continue;
        };
        found += 1;
        let carried = if it.state == ItemState::Carried { " carried" } else { "" };
        writeln!(
            out,
            "  item {} {} at {} held by mover {}{}",
            slot_index(id),
            it.item_type.name(),
            it.cell(),
            slot_index(holder),
            carried
        )?;
    }
    writeln!(out, "  {} reserved", found)
}

fn jobs_active(sim: &Sim, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "=== Active jobs ===")?;
    for (id, j) in sim.jobs.iter() {
        writeln!(
            out,
            "  job {} {} mover {} step {:?} progress {:.2}",
            slot_index(id),
            j.kind.name(),
            slot_index(j.assigned_mover),
            j.step,
            j.progress
        )?;
    }
    writeln!(out, "  {} active", sim.jobs.len())
}
