use std::{cell::RefCell, rc::Rc};

use combat_engine::services::{HalfVitalsRespawn, Services, Tally};
use combat_engine::{
    AdversaryRecord, Catalog, CombatEvent, Dice, EncounterConfig, EncounterScheduler,
    EncounterState, EngineError, ItemStack, ProtagonistStats, Side, Stance,
};
use combat_engine::encounter::MAX_SWINGS_PER_TICK;
use proptest::prelude::*;

const ARENA: &str = r#"{
  "adversaries": [
    { "id": "wolf", "display_name": "Wolf", "loot_table": "wolf_loot",
      "max_hp": 10, "damage": 3, "attack_speed": 5.0, "hit_chance": 0.0 },
    { "id": "old_wolf", "loot_table": "wolf_loot",
      "max_hp": 40, "damage": 3, "attack_speed": 5.0, "hit_chance": 0.0 },
    { "id": "brute", "max_hp": 500, "damage": 100, "attack_speed": 1.0, "hit_chance": 1.0 },
    { "id": "shadow", "max_hp": 10, "damage": 1, "attack_speed": 1.0, "hit_chance": 0.0,
      "evasion": 2.0 },
    { "id": "stray", "loot_table": "missing",
      "max_hp": 10, "damage": 1, "attack_speed": 5.0, "hit_chance": 0.0 },
    { "id": "hermit", "max_hp": 10, "damage": 1, "attack_speed": 1.0, "hit_chance": 0.0 }
  ],
  "reward_tables": [
    { "id": "wolf_loot", "xp_on_kill": 7,
      "drops": [ { "item_id": "fang", "min_qty": 3, "max_qty": 3, "drop_chance": 1.0 } ] }
  ]
}"#;

/// Hits for 10 on a (0.0, 0.4, 0.99) draw: hit, variance → 10, no crit.
const TEN_DAMAGE: [f64; 3] = [0.0, 0.4, 0.99];

fn tester() -> ProtagonistStats {
    ProtagonistStats {
        name: "Tester".to_string(),
        strength: 10,
        precision: 10,
        attack_speed: 1.0,
        ..ProtagonistStats::default()
    }
}

fn no_default_stance() -> EncounterConfig {
    EncounterConfig {
        default_stance: Stance::None,
        ..EncounterConfig::default()
    }
}

fn arena(services: Services, dice: Dice) -> EncounterScheduler {
    let catalog = Catalog::from_json_str(ARENA).expect("arena parses");
    EncounterScheduler::new(catalog, services, dice).with_config(no_default_stance())
}

fn full_services(tally: &Rc<RefCell<Tally>>) -> Services {
    Services::new()
        .with_sheet(tester())
        .with_inventory(tally.clone())
        .with_ledger(tally.clone())
        .with_quests(tally.clone())
}

fn record(scheduler: &mut EncounterScheduler) -> Rc<RefCell<Vec<CombatEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    scheduler.subscribe(move |e| sink.borrow_mut().push(e.clone()));
    events
}

fn victories(events: &[CombatEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, CombatEvent::Victory { .. }))
        .count()
}

#[test]
fn start_publishes_initial_state() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_seed(1));
    let events = record(&mut s);

    s.start("wolf").expect("wolf exists");
    assert_eq!(s.state(), EncounterState::Active);
    assert_eq!(s.stance(), Stance::None);
    assert_eq!(s.adversary_health().map(|h| h.hp), Some(10));
    assert_eq!(s.protagonist_health().map(|h| h.hp), Some(30));

    let events = events.borrow();
    assert!(matches!(
        &events[0],
        CombatEvent::Started { adversary_id, adversary_name }
            if adversary_id == "wolf" && adversary_name == "Wolf"
    ));
    assert!(events.iter().any(|e| matches!(e, CombatEvent::Previews(_))));
    assert!(events.iter().any(|e| matches!(e, CombatEvent::Timers { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, CombatEvent::AdversaryHealth { current: 10, max: 10 })));
}

#[test]
fn scripted_kill_pays_out_exactly_once() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_scripted(TEN_DAMAGE));
    let events = record(&mut s);

    s.start("wolf").expect("wolf exists");
    s.tick(1.0);

    assert_eq!(s.state(), EncounterState::Won);
    assert_eq!(s.adversary_health().map(|h| h.hp), Some(0));

    let snapshot: Vec<CombatEvent> = events.borrow().clone();
    assert_eq!(victories(&snapshot), 1);
    let rewards = snapshot.iter().find_map(|e| match e {
        CombatEvent::Victory { rewards, .. } => rewards.clone(),
        _ => None,
    });
    let rewards = rewards.expect("wolf drops loot");
    assert_eq!(rewards.items, vec![ItemStack::new("fang", 3)]);
    assert_eq!(rewards.xp, 7);

    {
        let t = tally.borrow();
        assert_eq!(t.items.get("fang"), Some(&3));
        assert_eq!(t.xp.get("combat"), Some(&7));
        assert_eq!(t.actions.get("Action_Kill_wolf"), Some(&1));
        assert_eq!(t.xp.len(), 1, "stance None trains nothing");
    }

    // Terminal: further ticks and end() change nothing.
    let seen = events.borrow().len();
    s.tick(10.0);
    s.end();
    assert_eq!(events.borrow().len(), seen);
    assert_eq!(tally.borrow().actions.get("Action_Kill_wolf"), Some(&1));
}

#[test]
fn kill_credit_is_per_encounter() {
    let tally = Tally::shared();
    // second kill, with the first victory's loot draw in between
    let draws = [0.0, 0.4, 0.99, 0.0, 0.0, 0.4, 0.99];
    let mut s = arena(full_services(&tally), Dice::from_scripted(draws));

    s.start("wolf").expect("wolf exists");
    s.tick(1.0);
    assert_eq!(s.state(), EncounterState::Won);

    s.restart().expect("restart the wolf");
    assert_eq!(s.state(), EncounterState::Active);
    assert_eq!(s.adversary_health().map(|h| h.hp), Some(10));
    s.tick(1.0);
    assert_eq!(s.state(), EncounterState::Won);
    assert_eq!(tally.borrow().actions.get("Action_Kill_wolf"), Some(&2));
}

#[test]
fn restart_needs_a_previous_encounter() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_seed(1));
    assert!(matches!(s.restart(), Err(EngineError::NoPreviousEncounter)));
}

#[test]
fn unknown_adversary_changes_nothing() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_seed(1));
    let events = record(&mut s);

    let err = s.start("dragon").expect_err("no dragons here");
    assert!(matches!(err, EngineError::UnknownAdversary(ref id) if id == "dragon"));
    assert_eq!(s.state(), EncounterState::Idle);
    assert!(events.borrow().is_empty());

    s.start("wolf").expect("wolf exists");
    let seen = events.borrow().len();
    assert!(s.start("dragon").is_err());
    assert_eq!(s.state(), EncounterState::Active);
    assert_eq!(s.adversary().map(|a| a.id.as_str()), Some("wolf"));
    assert_eq!(events.borrow().len(), seen);
}

#[test]
fn missing_character_sheet_refuses_to_start() {
    let mut s = arena(Services::new(), Dice::from_seed(1));
    let err = s.start("wolf").expect_err("no sheet");
    assert!(matches!(err, EngineError::CollaboratorUnavailable(_)));
    assert_eq!(s.state(), EncounterState::Idle);
}

#[test]
fn defeat_hands_the_protagonist_to_respawn() {
    let tally = Tally::shared();
    let respawn = Rc::new(RefCell::new(HalfVitalsRespawn::default()));
    let services = Services::new()
        .with_sheet(ProtagonistStats {
            attack_speed: 5.0,
            ..tester()
        })
        .with_quests(tally.clone())
        .with_respawn(respawn.clone());
    // hit, variance → 100, no crit
    let mut s = arena(services, Dice::from_scripted(vec![0.0, 0.5, 0.99]));
    let events = record(&mut s);

    s.start("brute").expect("brute exists");
    s.tick(1.0);

    assert_eq!(s.state(), EncounterState::Lost);
    assert_eq!(s.protagonist_health().map(|h| h.hp), Some(0));
    let events = events.borrow();
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, CombatEvent::Defeat { .. }))
            .count(),
        1
    );
    assert_eq!(victories(&events), 0);
    assert!(tally.borrow().actions.is_empty());

    let respawn = respawn.borrow();
    let respawns = &respawn.respawns;
    assert_eq!(respawns.len(), 1);
    assert_eq!(respawns[0].0, "brute");
    assert_eq!(respawns[0].1.hp, 15);
}

#[test]
fn defeat_without_respawn_still_ends_the_encounter() {
    let services = Services::new().with_sheet(ProtagonistStats {
        attack_speed: 5.0,
        ..tester()
    });
    let mut s = arena(services, Dice::from_scripted(vec![0.0, 0.5, 0.99]));
    s.start("brute").expect("brute exists");
    s.tick(1.0);
    assert_eq!(s.state(), EncounterState::Lost);
}

#[test]
fn cancel_takes_effect_at_the_next_tick_silently() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_scripted(TEN_DAMAGE));
    let events = record(&mut s);

    s.start("wolf").expect("wolf exists");
    s.cancel();
    assert!(s.is_cancel_pending());
    assert_eq!(s.state(), EncounterState::Active);

    let seen = events.borrow().len();
    s.tick(1.0);
    assert_eq!(s.state(), EncounterState::Idle);
    assert_eq!(events.borrow().len(), seen);
    assert!(tally.borrow().items.is_empty());
    assert!(tally.borrow().actions.is_empty());

    s.tick(1.0);
    assert_eq!(s.state(), EncounterState::Idle);
}

#[test]
fn cancel_when_idle_is_ignored() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_seed(1));
    s.cancel();
    assert!(!s.is_cancel_pending());
    s.start("wolf").expect("wolf exists");
    s.tick(0.5);
    assert_eq!(s.state(), EncounterState::Active);
}

#[test]
fn default_stance_applies_when_none_selected() {
    let tally = Tally::shared();
    let catalog = Catalog::from_json_str(ARENA).expect("arena parses");
    let mut s = EncounterScheduler::new(catalog, full_services(&tally), Dice::from_seed(1));
    let events = record(&mut s);

    s.start("wolf").expect("wolf exists");
    assert_eq!(s.stance(), Stance::Defensive);
    assert!(events
        .borrow()
        .iter()
        .any(|e| matches!(e, CombatEvent::StanceChanged { stance: Stance::Defensive })));

    s.set_stance(Stance::Berserker);
    s.restart().expect("restart");
    assert_eq!(s.stance(), Stance::Berserker);
}

#[test]
fn stance_change_mid_fight_refreshes_odds_but_not_timers() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_seed(1));
    let events = record(&mut s);

    s.set_stance(Stance::Defensive);
    s.start("shadow").expect("shadow exists");
    s.tick(0.4);
    let before = s.timer(Side::Protagonist).expect("timer");
    assert_eq!(s.previews().protagonist.hit, 0.0);

    s.set_stance(Stance::Precision);
    assert_eq!(s.timer(Side::Protagonist), Some(before));
    // 0.02 from precision 10, plus the stance's 0.05
    assert!((s.previews().protagonist.crit - 0.07).abs() < 1e-9);
    assert!(matches!(
        events.borrow().last(),
        Some(CombatEvent::Previews(p)) if (p.protagonist.crit - 0.07).abs() < 1e-9
    ));
}

#[test]
fn damaging_hits_train_the_stance_track() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_scripted(TEN_DAMAGE));
    let events = record(&mut s);

    s.set_stance(Stance::Defensive);
    s.start("old_wolf").expect("old wolf exists");
    s.tick(1.0);

    // 10 × 0.9 = 9 damage, 4 xp per point
    assert_eq!(s.adversary_health().map(|h| h.hp), Some(31));
    assert_eq!(tally.borrow().xp.get("defence"), Some(&36));
    assert!(events.borrow().iter().any(|e| matches!(
        e,
        CombatEvent::XpAwarded { track, amount: 36 } if track == "defence"
    )));
}

#[test]
fn missing_ledger_skips_xp_but_delivers_loot() {
    let tally = Tally::shared();
    let services = Services::new()
        .with_sheet(tester())
        .with_inventory(tally.clone())
        .with_quests(tally.clone());
    let mut s = arena(services, Dice::from_scripted(TEN_DAMAGE));
    let events = record(&mut s);

    s.set_stance(Stance::Berserker);
    s.start("wolf").expect("wolf exists");
    s.tick(1.0);

    assert_eq!(s.state(), EncounterState::Won);
    let t = tally.borrow();
    assert!(t.xp.is_empty());
    assert_eq!(t.items.get("fang"), Some(&3));
    assert!(!events
        .borrow()
        .iter()
        .any(|e| matches!(e, CombatEvent::XpAwarded { .. })));
}

#[test]
fn unknown_loot_table_still_wins_without_rewards() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_scripted(TEN_DAMAGE));
    let events = record(&mut s);

    s.start("stray").expect("stray exists");
    s.tick(1.0);

    assert_eq!(s.state(), EncounterState::Won);
    assert!(events
        .borrow()
        .iter()
        .any(|e| matches!(e, CombatEvent::Victory { rewards: None, .. })));
    assert_eq!(tally.borrow().actions.get("Action_Kill_stray"), Some(&1));
    assert!(tally.borrow().items.is_empty());
}

#[test]
fn killing_swing_stops_the_tick() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_scripted(TEN_DAMAGE));
    s.start("hermit").expect("hermit exists");
    s.tick(1.0);

    assert_eq!(s.state(), EncounterState::Won);
    let stats = s.stats().expect("stats");
    assert_eq!(stats.protagonist_swings, 1);
    assert_eq!(stats.adversary_swings, 0);
}

#[test]
fn long_frames_resolve_every_elapsed_swing() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_seed(9));
    s.start("shadow").expect("shadow exists");
    s.tick(3.5);

    assert_eq!(s.state(), EncounterState::Active);
    let stats = s.stats().expect("stats");
    assert_eq!(stats.protagonist_swings, 3);
    assert_eq!(stats.adversary_swings, 3);
    assert_eq!(stats.protagonist_hits, 0);
    assert_eq!(s.timer(Side::Protagonist).map(|t| t.remaining()), Some(0.5));
}

#[test]
fn bad_frame_deltas_do_not_advance_time() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_seed(9));
    s.start("shadow").expect("shadow exists");
    s.tick(f64::NAN);
    s.tick(-4.0);
    s.tick(f64::INFINITY);
    assert_eq!(s.stats().map(|st| st.elapsed), Some(0.0));
    assert_eq!(s.timer(Side::Adversary).map(|t| t.remaining()), Some(1.0));
}

#[test]
fn unsubscribed_listeners_hear_nothing() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_seed(1));
    let heard = Rc::new(RefCell::new(0));
    let counter = heard.clone();
    let id = s.subscribe(move |_| *counter.borrow_mut() += 1);
    assert!(s.unsubscribe(id));
    assert!(!s.unsubscribe(id));
    s.start("wolf").expect("wolf exists");
    assert_eq!(*heard.borrow(), 0);
}

#[test]
fn enormous_frame_is_capped_per_side() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_seed(9));
    s.start("shadow").expect("shadow exists");
    s.tick(1e20);

    assert_eq!(s.state(), EncounterState::Active);
    let stats = s.stats().expect("stats");
    assert_eq!(stats.protagonist_swings, MAX_SWINGS_PER_TICK);
    assert_eq!(stats.adversary_swings, MAX_SWINGS_PER_TICK);
    for side in [Side::Protagonist, Side::Adversary] {
        let timer = s.timer(side).expect("timer");
        assert!(!timer.is_due());
        assert!(timer.remaining() <= timer.cooldown());
    }

    // Back to one swing per cooldown afterwards.
    s.tick(1.0);
    let stats = s.stats().expect("stats");
    assert_eq!(stats.protagonist_swings, MAX_SWINGS_PER_TICK + 1);
    assert_eq!(stats.adversary_swings, MAX_SWINGS_PER_TICK + 1);
}

#[test]
fn long_backlog_under_the_cap_is_replayed_in_full() {
    let tally = Tally::shared();
    let mut s = arena(full_services(&tally), Dice::from_seed(4));
    s.start("shadow").expect("shadow exists");
    s.tick(500.5);

    let stats = s.stats().expect("stats");
    assert_eq!(stats.protagonist_swings, 500);
    assert_eq!(stats.adversary_swings, 500);
    assert_eq!(s.timer(Side::Protagonist).map(|t| t.remaining()), Some(0.5));
}

#[test]
fn oversized_hit_saturates_training_xp() {
    let catalog = Catalog::from_json_str(
        r#"{ "adversaries": [
            { "id": "colossus", "max_hp": 1000000000, "damage": 1,
              "attack_speed": 5.0, "hit_chance": 0.0 }
        ] }"#,
    )
    .expect("catalog parses");
    let tally = Tally::shared();
    let services = Services::new()
        .with_sheet(ProtagonistStats {
            weapon_damage: 900_000_000,
            attack_speed: 1.0,
            ..ProtagonistStats::default()
        })
        .with_ledger(tally.clone());
    let mut s = EncounterScheduler::new(catalog, services, Dice::from_scripted([0.0, 0.5, 0.99]));
    s.set_stance(Stance::Defensive);
    s.start("colossus").expect("colossus exists");
    s.tick(1.0);

    assert_eq!(s.state(), EncounterState::Active);
    let stats = s.stats().expect("stats");
    assert_eq!(stats.protagonist_hits, 1);
    assert!(stats.damage_dealt > 700_000_000);
    assert_eq!(tally.borrow().xp.get("defence"), Some(&i32::MAX));
}

fn phantom(attack_speed: f64) -> AdversaryRecord {
    AdversaryRecord {
        id: "phantom".to_string(),
        display_name: String::new(),
        description: String::new(),
        loot_table: String::new(),
        level: 1,
        max_hp: 10,
        damage: 1,
        attack_speed,
        block: 0,
        hit_chance: 0.0,
        evasion: 2.0,
        crit_chance: 0.0,
        crit_multiplier: 1.5,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn swing_rate_converges_to_cooldown(
        protagonist_speed in 0.2f64..3.0,
        adversary_speed in 0.2f64..3.0,
        frames in prop::collection::vec(0.001f64..2.0, 50..400),
        seed in any::<u64>(),
    ) {
        let mut catalog = Catalog::new();
        catalog.insert_adversary(phantom(adversary_speed));
        let services = Services::new().with_sheet(ProtagonistStats {
            attack_speed: protagonist_speed,
            ..ProtagonistStats::default()
        });
        let mut s = EncounterScheduler::new(catalog, services, Dice::from_seed(seed));
        s.start("phantom").expect("phantom exists");

        for dt in &frames {
            s.tick(*dt);
        }

        let stats = s.stats().expect("stats");
        prop_assert_eq!(s.state(), EncounterState::Active);
        let expected_p = stats.elapsed / protagonist_speed;
        let expected_a = stats.elapsed / adversary_speed;
        prop_assert!((stats.protagonist_swings as f64 - expected_p).abs() <= 1.0);
        prop_assert!((stats.adversary_swings as f64 - expected_a).abs() <= 1.0);
    }
}
