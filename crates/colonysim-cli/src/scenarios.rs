//! Headless scenario harness.
//!
//! Each scenario builds a small world, runs it through the full tick and
//! reports a pass/fail line. The same scenarios are covered by the core
//! crate's integration tests; this runs them against a release build.

use colonysim_core::audit::audit;
use colonysim_core::blueprint::place_blueprint;
use colonysim_core::common::CellPos;
use colonysim_core::engine::Sim;
use colonysim_core::items::ItemState;
use colonysim_core::movers::spawn_mover;
use colonysim_core::world::{designate, CellKind, Designation};
use colonysim_logic::balance::BalanceTable;
use colonysim_logic::config::SimFlags;
use colonysim_logic::fixtures::{AnimalKind, FurnitureType};
use colonysim_logic::items::{ItemType, MaterialType};
use colonysim_logic::recipes::ConstructionId;
use colonysim_logic::signals::{latch, nor_latch};

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

impl TestResult {
    fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            detail: detail.into(),
        }
    }
}

/// A small colony with hauling, mining, building and needs to look after.
pub fn demo_colony(seed: u64) -> Sim {
    let mut sim = Sim::new(32, 32, 2, seed, SimFlags::default());
    for i in 0..6 {
        let _ = spawn_mover(&mut sim, CellPos::new(2 + i, 2, 0));
    }
    let _ = sim.stockpiles.create(20, 20, 0, 4, 4);
    for (i, t) in [ItemType::Red, ItemType::Green, ItemType::Blue, ItemType::Rock, ItemType::Log]
        .into_iter()
        .enumerate()
    {
        let _ = sim.items.spawn_default(t, CellPos::new(4 + i as i32 * 4, 12, 0), 4);
    }
    let _ = sim.items.spawn_default(ItemType::Berries, CellPos::new(26, 6, 0), 8);
    for y in 8..12 {
        sim.grid.set_kind(CellPos::new(28, y, 0), CellKind::Wall);
    }
    if let Err(e) = designate(&mut sim, CellPos::new(28, 9, 0), Designation::Mine) {
        log::warn!("demo designation failed: {}", e);
    }
    if let Err(e) = place_blueprint(&mut sim, CellPos::new(14, 6, 0), ConstructionId::Wall) {
        log::warn!("demo blueprint failed: {}", e);
    }
    sim.grid.set_water(CellPos::new(2, 28, 0), 5);
    sim.fixtures
        .spawn_furniture(&mut sim.grid, FurnitureType::Bed, MaterialType::Oak, CellPos::new(30, 30, 0));
    sim.fixtures.spawn_animal(AnimalKind::Deer, CellPos::new(16, 24, 0));
    sim
}

fn run_until(sim: &mut Sim, max_ticks: u64, done: impl Fn(&Sim) -> bool) -> Option<u64> {
    for t in 1..=max_ticks {
        sim.tick();
        if done(sim) {
            return Some(t);
        }
    }
    None
}

pub fn run_all(verbose: bool) -> bool {
    println!("=== ColonySim Scenario Harness ===\n");

    let mut results = Vec::new();

    // A. Signal latch
    results.extend(validate_latch());

    // B-E. Hauling
    results.extend(validate_hauling());

    // F. Balance
    results.extend(validate_balance());

    // Whole-sim consistency
    results.extend(validate_consistency());

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!("\n=== RESULT: {}/{} passed, {} failed ===", passed, results.len(), failed);
    failed == 0
}

// ── A. NOR latch ────────────────────────────────────────────────────────

fn validate_latch() -> Vec<TestResult> {
    println!("--- Signal latch ---");
    let mut g = nor_latch();
    let light = |g: &colonysim_logic::signals::SignalGrid| g.light_on(latch::LIGHT.0, latch::LIGHT.1);
    let step = |g: &mut colonysim_logic::signals::SignalGrid, n: usize| {
        for _ in 0..n {
            g.tick();
        }
    };
    step(&mut g, 2);
    let mut results = Vec::new();

    g.press(latch::SET_BUTTON.0, latch::SET_BUTTON.1);
    step(&mut g, 3);
    let set = light(&g);
    results.push(TestResult::new("latch_set", set, format!("light {} after set", on_off(set))));

    g.press(latch::SET_BUTTON.0, latch::SET_BUTTON.1);
    step(&mut g, 3);
    let again = light(&g);
    results.push(TestResult::new("latch_set_twice", again, format!("light {} after second set", on_off(again))));

    g.press(latch::RESET_BUTTON.0, latch::RESET_BUTTON.1);
    step(&mut g, 3);
    let reset = !light(&g);
    results.push(TestResult::new("latch_reset", reset, format!("light {} after reset", on_off(!reset))));
    results
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

// ── B-E. Hauling ────────────────────────────────────────────────────────

fn validate_hauling() -> Vec<TestResult> {
    println!("--- Hauling ---");
    vec![haul_happy_path(), stockpile_full(), filter_flip(), unreachable_cooldown()]
}

fn haul_happy_path() -> TestResult {
    let mut sim = Sim::new(10, 10, 1, 1, SimFlags::deterministic_test());
    let Some(m) = spawn_mover(&mut sim, CellPos::new(1, 1, 0)) else {
        return TestResult::new("haul_happy_path", false, "mover pool full");
    };
    let red = sim.items.spawn_default(ItemType::Red, CellPos::new(8, 8, 0), 1);
    let _ = sim.stockpiles.create(2, 2, 0, 1, 1);
    let Some(red) = red else {
        return TestResult::new("haul_happy_path", false, "item pool full");
    };
    let done = run_until(&mut sim, 1000, |sim| {
        sim.items
            .get(red)
            .is_some_and(|it| it.state == ItemState::InStockpile && it.cell() == CellPos::new(2, 2, 0))
            && sim.movers.get(m).is_some_and(|m| m.is_idle())
    });
    match done {
        Some(t) => TestResult::new("haul_happy_path", true, format!("stored and idle after {} ticks", t)),
        None => TestResult::new("haul_happy_path", false, "not stored within 1000 ticks"),
    }
}

fn stockpile_full() -> TestResult {
    let mut sim = Sim::new(10, 10, 1, 1, SimFlags::deterministic_test());
    let _ = spawn_mover(&mut sim, CellPos::new(1, 1, 0));
    let slot = CellPos::new(5, 5, 0);
    let Some(sp) = sim.stockpiles.create(5, 5, 0, 1, 1) else {
        return TestResult::new("stockpile_full", false, "stockpile not created");
    };
    let Some(pile) = sim.stockpiles.get_mut(sp) else {
        return TestResult::new("stockpile_full", false, "stockpile missing");
    };
    pile.max_stack_size = 5;
    let max = pile.cap_for(ItemType::Red);
    if let Some(base) = sim.items.spawn_default(ItemType::Red, slot, max - 1) {
        pile.place_item(slot, base, &mut sim.items);
    }
    let ground: Vec<_> = [CellPos::new(8, 2, 0), CellPos::new(8, 8, 0)]
        .into_iter()
        .filter_map(|p| sim.items.spawn_default(ItemType::Red, p, 1))
        .collect();
    sim.run_ticks(1500);

    let count = sim.stockpiles.get(sp).map(|p| p.slot_counts[0]).unwrap_or(0);
    let left = ground.iter().filter(|id| sim.items.contains(**id)).count();
    TestResult::new(
        "stockpile_full",
        count == max && left == 1,
        format!("slot {}/{}, {} left on the ground", count, max, left),
    )
}

fn filter_flip() -> TestResult {
    let mut sim = Sim::new(10, 10, 1, 1, SimFlags::deterministic_test());
    let _ = spawn_mover(&mut sim, CellPos::new(1, 1, 0));
    let (Some(rgb), Some(green_only)) = (sim.stockpiles.create(5, 5, 0, 1, 1), sim.stockpiles.create(8, 8, 0, 1, 1)) else {
        return TestResult::new("filter_flip", false, "stockpiles not created");
    };
    if let Some(p) = sim.stockpiles.get_mut(rgb) {
        p.set_only_types(&[ItemType::Red, ItemType::Green, ItemType::Blue]);
    }
    if let Some(p) = sim.stockpiles.get_mut(green_only) {
        p.set_only_types(&[ItemType::Green]);
    }
    let Some(green) = sim.items.spawn_default(ItemType::Green, CellPos::new(4, 4, 0), 1) else {
        return TestResult::new("filter_flip", false, "item pool full");
    };
    let at = |target: CellPos| {
        move |sim: &Sim| {
            sim.items
                .get(green)
                .is_some_and(|it| it.state == ItemState::InStockpile && it.cell() == target)
        }
    };
    if run_until(&mut sim, 1000, at(CellPos::new(5, 5, 0))).is_none() {
        return TestResult::new("filter_flip", false, "never stored on the RGB pile");
    }
    if let Some(p) = sim.stockpiles.get_mut(rgb) {
        p.set_type_allowed(ItemType::Green, false);
    }
    match run_until(&mut sim, 1000, at(CellPos::new(8, 8, 0))) {
        Some(t) => TestResult::new("filter_flip", true, format!("re-hauled {} ticks after the flip", t)),
        None => TestResult::new("filter_flip", false, "not re-hauled within 1000 ticks"),
    }
}

fn unreachable_cooldown() -> TestResult {
    let mut sim = Sim::new(12, 12, 1, 1, SimFlags::deterministic_test());
    let _ = spawn_mover(&mut sim, CellPos::new(1, 1, 0));
    let _ = sim.stockpiles.create(1, 8, 0, 2, 2);
    for x in 5..=9 {
        for y in 5..=9 {
            if x == 5 || x == 9 || y == 5 || y == 9 {
                sim.grid.set_kind(CellPos::new(x, y, 0), CellKind::Wall);
            }
        }
    }
    let _ = sim.items.spawn_default(ItemType::Red, CellPos::new(7, 7, 0), 1);
    sim.run_ticks(300);
    let attempts = sim.stats.jobs_created + sim.stats.unreachable_marks;
    TestResult::new(
        "unreachable_cooldown",
        (1..=10).contains(&attempts),
        format!("{} attempts in 300 ticks", attempts),
    )
}

// ── F. Balance ──────────────────────────────────────────────────────────

fn validate_balance() -> Vec<TestResult> {
    println!("--- Balance ---");
    let mut results = Vec::new();

    for day in [24.0, 60.0, 720.0] {
        let b = BalanceTable::default().with_day_length(day);
        let product = b.rate_per_game_second(b.hunger_drain_per_gh()) * b.game_hours_to_game_seconds(b.hours_to_starve);
        results.push(TestResult::new(
            &format!("starve_budget_day_{}", day),
            (product - 1.0).abs() < 1e-4,
            format!("rate x budget = {:.6}", product),
        ));
    }

    let mut flags = SimFlags::deterministic_test();
    flags.hunger_enabled = true;
    let mut sim = Sim::new(8, 8, 1, 1, flags);
    let mut balance = BalanceTable::default().with_day_length(60.0);
    balance.hours_to_starve = 8.0;
    sim.balance = balance;
    let Some(m) = spawn_mover(&mut sim, CellPos::new(1, 1, 0)) else {
        results.push(TestResult::new("hunger_empties_at_20s", false, "mover pool full"));
        return results;
    };
    let emptied = run_until(&mut sim, 2000, |sim| sim.movers.get(m).is_some_and(|m| m.needs.hunger <= 0.0));
    let detail = match emptied {
        Some(_) => format!("hunger hit zero at {:.3}s", sim.clock.game_seconds),
        None => "hunger never hit zero".to_string(),
    };
    let ok = emptied.is_some() && (sim.clock.game_seconds - 20.0).abs() <= 1.0 / 60.0 + 1e-3;
    results.push(TestResult::new("hunger_empties_at_20s", ok, detail));
    results
}

// ── Consistency ─────────────────────────────────────────────────────────

fn validate_consistency() -> Vec<TestResult> {
    println!("--- Consistency ---");
    let mut results = Vec::new();

    let mut sim = demo_colony(5);
    let mut first_bad = None;
    for t in 0..3000u64 {
        sim.tick();
        if t % 10 == 0 {
            let v = audit(&sim);
            if !v.is_empty() && first_bad.is_none() {
                first_bad = Some((t, v));
            }
        }
    }
    results.push(match first_bad {
        None => TestResult::new("audit_long_run", true, "3000 ticks without violations"),
        Some((t, v)) => TestResult::new("audit_long_run", false, format!("tick {}: {}", t, v[0])),
    });

    let mut a = demo_colony(77);
    let mut b = demo_colony(77);
    a.run_ticks(600);
    b.run_ticks(600);
    let same = a.rng == b.rng
        && a.movers.iter().map(|(_, m)| m.pos).eq(b.movers.iter().map(|(_, m)| m.pos))
        && a.items.iter().map(|(_, it)| it.pos).eq(b.items.iter().map(|(_, it)| it.pos));
    results.push(TestResult::new("determinism", same, "two runs from seed 77"));

    let mut buffer = Vec::new();
    let roundtrip = sim
        .save(&mut buffer)
        .and_then(|_| Sim::load(&buffer[..]))
        .map(|loaded| loaded.clock == sim.clock && loaded.items.len() == sim.items.len() && audit(&loaded).is_empty());
    results.push(match roundtrip {
        Ok(true) => TestResult::new("save_roundtrip", true, format!("{} bytes", buffer.len())),
        Ok(false) => TestResult::new("save_roundtrip", false, "loaded state differs"),
        Err(e) => TestResult::new("save_roundtrip", false, e.to_string()),
    });
    results
}
