//! End-to-end colony scenarios run through the full tick.

use colonysim_core::audit::audit;
use colonysim_core::blueprint::place_blueprint;
use colonysim_core::common::CellPos;
use colonysim_core::engine::Sim;
use colonysim_core::items::ItemState;
use colonysim_core::jobs::Claim;
use colonysim_core::movers::spawn_mover;
use colonysim_core::world::CellKind;
use colonysim_logic::balance::BalanceTable;
use colonysim_logic::config::SimFlags;
use colonysim_logic::items::ItemType;
use colonysim_logic::recipes::ConstructionId;

fn run_until(sim: &mut Sim, max_ticks: usize, done: impl Fn(&Sim) -> bool) -> bool {
    for _ in 0..max_ticks {
        sim.tick();
        if done(sim) {
            return true;
        }
    }
    false
}

#[test]
fn test_haul_happy_path() {
    let mut sim = Sim::new(10, 10, 1, 1, SimFlags::deterministic_test());
    let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
    let red = sim.items.spawn_default(ItemType::Red, CellPos::new(8, 8, 0), 1).unwrap();
    let sp = sim.stockpiles.create(2, 2, 0, 1, 1).unwrap();
    sim.stockpiles.get_mut(sp).unwrap().set_only_types(&[ItemType::Red]);

    let stored = run_until(&mut sim, 1000, |sim| {
        sim.items.get(red).is_some_and(|it| it.state == ItemState::InStockpile)
            && sim.movers.get(m).is_some_and(|m| m.is_idle())
    });
    assert!(stored, "red item never reached the stockpile");
    assert_eq!(sim.items.get(red).unwrap().cell(), CellPos::new(2, 2, 0));
}

#[test]
fn test_full_stockpile_takes_one_more() {
    let mut sim = Sim::new(10, 10, 1, 1, SimFlags::deterministic_test());
    spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
    let slot = CellPos::new(5, 5, 0);
    let sp = sim.stockpiles.create(5, 5, 0, 1, 1).unwrap();
    let max = {
        let pile = sim.stockpiles.get_mut(sp).unwrap();
        pile.max_stack_size = 5;
        pile.cap_for(ItemType::Red)
    };
    let base = sim.items.spawn_default(ItemType::Red, slot, max - 1).unwrap();
    {
        let pile = sim.stockpiles.get_mut(sp).unwrap();
        pile.place_item(slot, base, &mut sim.items);
    }
    let a = sim.items.spawn_default(ItemType::Red, CellPos::new(8, 2, 0), 1).unwrap();
    let b = sim.items.spawn_default(ItemType::Red, CellPos::new(8, 8, 0), 1).unwrap();

    for _ in 0..1500 {
        sim.tick();
    }

    let pile = sim.stockpiles.get(sp).unwrap();
    assert_eq!(pile.slot_counts[0], max);
    let survivors: Vec<_> = [a, b].into_iter().filter(|id| sim.items.contains(*id)).collect();
    assert_eq!(survivors.len(), 1, "exactly one delivery merges into the slot");
    let left = sim.items.get(survivors[0]).unwrap();
    assert_eq!(left.state, ItemState::OnGround);
    assert_eq!(left.reserved_by, None);
    assert!(sim.stockpiles.owner_of(left.cell()).is_none());
}

#[test]
fn test_filter_flip_rehauls() {
    let mut sim = Sim::new(10, 10, 1, 1, SimFlags::deterministic_test());
    spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
    let rgb = sim.stockpiles.create(5, 5, 0, 1, 1).unwrap();
    sim.stockpiles
        .get_mut(rgb)
        .unwrap()
        .set_only_types(&[ItemType::Red, ItemType::Green, ItemType::Blue]);
    let green_only = sim.stockpiles.create(8, 8, 0, 1, 1).unwrap();
    sim.stockpiles.get_mut(green_only).unwrap().set_only_types(&[ItemType::Green]);
    // Equal priority: the first haul lands on the nearer pile.
    let green = sim.items.spawn_default(ItemType::Green, CellPos::new(4, 4, 0), 1).unwrap();

    let first = run_until(&mut sim, 1000, |sim| {
        sim.items
            .get(green)
            .is_some_and(|it| it.state == ItemState::InStockpile && it.cell() == CellPos::new(5, 5, 0))
    });
    assert!(first, "green item never stored on the RGB stockpile");

    sim.stockpiles.get_mut(rgb).unwrap().set_type_allowed(ItemType::Green, false);
    let moved = run_until(&mut sim, 1000, |sim| {
        sim.items
            .get(green)
            .is_some_and(|it| it.state == ItemState::InStockpile && it.cell() == CellPos::new(8, 8, 0))
    });
    assert!(moved, "green item stayed on a stockpile that no longer accepts it");
}

#[test]
fn test_sealed_item_is_not_retried_every_tick() {
    let mut sim = Sim::new(12, 12, 1, 1, SimFlags::deterministic_test());
    spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
    sim.stockpiles.create(1, 8, 0, 2, 2).unwrap();
    for x in 5..=9 {
        for y in 5..=9 {
            if x == 5 || x == 9 || y == 5 || y == 9 {
                sim.grid.set_kind(CellPos::new(x, y, 0), CellKind::Wall);
            }
        }
    }
    let sealed = sim.items.spawn_default(ItemType::Red, CellPos::new(7, 7, 0), 1).unwrap();

    let before = sim.stats.jobs_created + sim.stats.unreachable_marks;
    for _ in 0..300 {
        sim.tick();
    }
    let attempts = sim.stats.jobs_created + sim.stats.unreachable_marks - before;
    assert!(attempts >= 1, "the item was never considered");
    assert!(attempts <= 10, "{} assignment attempts in 300 ticks", attempts);
    assert_eq!(sim.items.get(sealed).unwrap().state, ItemState::OnGround);
}

#[test]
fn test_hunger_empties_at_budget() {
    let mut flags = SimFlags::deterministic_test();
    flags.hunger_enabled = true;
    let mut sim = Sim::new(8, 8, 1, 1, flags);
    let mut balance = BalanceTable::default().with_day_length(60.0);
    balance.hours_to_starve = 8.0;
    sim.balance = balance;
    let m = spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();

    // 60 * 8 / 24 = 20 game-seconds.
    let expected = 20.0;
    let mut emptied_at = None;
    for _ in 0..2000 {
        sim.tick();
        if emptied_at.is_none() && sim.movers.get(m).unwrap().needs.hunger <= 0.0 {
            emptied_at = Some(sim.clock.game_seconds);
            break;
        }
    }
    let t = emptied_at.expect("hunger never reached zero");
    assert!((t - expected).abs() <= 1.0 / 60.0 + 1e-3, "hunger emptied at {}", t);
}

/// Tick `sim`, failing on the first audit violation.
fn run_audited(sim: &mut Sim, ticks: usize, mut each: impl FnMut(&Sim)) {
    for step in 0..ticks {
        sim.tick();
        let violations = audit(sim);
        assert!(violations.is_empty(), "tick {}: {:?}", step, violations);
        each(sim);
    }
}

fn ground_rock_units(sim: &Sim) -> u32 {
    sim.items
        .iter()
        .filter(|(_, it)| it.item_type == ItemType::Rock && it.state == ItemState::OnGround)
        .map(|(_, it)| it.stack_count)
        .sum()
}

#[test]
fn test_two_haulers_share_one_slot_without_overfilling() {
    let mut sim = Sim::new(12, 12, 1, 1, SimFlags::deterministic_test());
    spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
    spawn_mover(&mut sim, CellPos::new(10, 10, 0)).unwrap();
    let sp = sim.stockpiles.create(6, 6, 0, 1, 1).unwrap();
    sim.stockpiles.get_mut(sp).unwrap().max_stack_size = 5;
    let cap = sim.stockpiles.get(sp).unwrap().cap_for(ItemType::Rock);
    assert_eq!(cap, 5);
    sim.items.spawn_default(ItemType::Rock, CellPos::new(2, 9, 0), 4).unwrap();
    sim.items.spawn_default(ItemType::Rock, CellPos::new(9, 2, 0), 4).unwrap();

    let mut peak = 0;
    run_audited(&mut sim, 1500, |sim| {
        let pile = sim.stockpiles.get(sp).unwrap();
        peak = peak.max(pile.slot_counts[0]);
        assert!(pile.slot_counts[0] + pile.reserved_units[0] <= cap);
    });

    assert_eq!(peak, cap);
    assert_eq!(sim.stockpiles.get(sp).unwrap().slot_counts[0], cap);
    assert_eq!(ground_rock_units(&sim), 8 - cap, "no rock is lost or duplicated");
    assert!(sim.movers.iter().all(|(_, m)| m.is_idle()));
}

#[test]
fn test_two_movers_race_for_one_item() {
    let mut sim = Sim::new(12, 12, 1, 1, SimFlags::deterministic_test());
    spawn_mover(&mut sim, CellPos::new(5, 1, 0)).unwrap();
    spawn_mover(&mut sim, CellPos::new(5, 9, 0)).unwrap();
    let red = sim.items.spawn_default(ItemType::Red, CellPos::new(5, 5, 0), 1).unwrap();
    let sp = sim.stockpiles.create(10, 5, 0, 1, 1).unwrap();

    run_audited(&mut sim, 1000, |sim| {
        let holders = sim.jobs.iter().filter(|(_, job)| job.references_item(red)).count();
        assert!(holders <= 1, "{} jobs hold the same item", holders);
    });

    let it = sim.items.get(red).unwrap();
    assert_eq!(it.state, ItemState::InStockpile);
    assert_eq!(it.cell(), CellPos::new(10, 5, 0));
    assert_eq!(sim.stockpiles.get(sp).unwrap().slot_counts[0], 1);
    assert!(sim.movers.iter().all(|(_, m)| m.is_idle()));
}

#[test]
fn test_two_movers_race_for_one_blueprint() {
    let mut sim = Sim::new(12, 12, 1, 1, SimFlags::deterministic_test());
    spawn_mover(&mut sim, CellPos::new(1, 1, 0)).unwrap();
    spawn_mover(&mut sim, CellPos::new(10, 10, 0)).unwrap();
    sim.items.spawn_default(ItemType::Rock, CellPos::new(2, 9, 0), 1).unwrap();
    sim.items.spawn_default(ItemType::Rock, CellPos::new(9, 2, 0), 1).unwrap();
    let target = CellPos::new(6, 6, 0);
    let bp = place_blueprint(&mut sim, target, ConstructionId::Wall).unwrap();

    run_audited(&mut sim, 3000, |sim| {
        if let Some(b) = sim.blueprints.get(bp) {
            let d = &b.deliveries[0];
            assert!(d.delivered_count + d.reserved_count <= 1, "more material promised than the wall needs");
        }
        let builders = sim
            .jobs
            .iter()
            .filter(|(_, job)| job.claims.contains(&Claim::Blueprint(bp)))
            .count();
        assert!(builders <= 1);
    });

    assert_eq!(sim.grid.kind(target), CellKind::Wall);
    assert!(sim.blueprints.is_empty());
    assert_eq!(ground_rock_units(&sim), 1, "only one rock was used");
}
