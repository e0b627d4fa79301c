use combat_engine::services::{ExperienceLedger, Inventory, QuestLog, Tally};

#[test]
fn tally_accumulates_per_key() {
    let mut t = Tally::default();
    t.add_item("fang", 2);
    t.add_item("pelt", 1);
    t.add_item("fang", 3);
    t.add_gold(4);
    t.add_xp("combat", 7);
    t.report_action("Action_Kill_wolf", 1);
    t.report_action("Action_Kill_wolf", 1);

    assert_eq!(t.items.get("fang"), Some(&5));
    assert_eq!(t.items.keys().collect::<Vec<_>>(), ["fang", "pelt"]);
    assert_eq!(t.gold, 4);
    assert_eq!(t.xp.get("combat"), Some(&7));
    assert_eq!(t.actions.get("Action_Kill_wolf"), Some(&2));
}

#[test]
fn tally_saturates_instead_of_overflowing() {
    let mut t = Tally::default();
    t.add_gold(i32::MAX);
    t.add_gold(10);
    t.add_xp("strength", i32::MAX);
    t.add_xp("strength", i32::MAX);
    t.add_item("coin", i32::MAX);
    t.add_item("coin", 1);
    t.report_action("Action_Kill_troll", i32::MAX);
    t.report_action("Action_Kill_troll", 1);

    assert_eq!(t.gold, i32::MAX);
    assert_eq!(t.xp.get("strength"), Some(&i32::MAX));
    assert_eq!(t.items.get("coin"), Some(&i32::MAX));
    assert_eq!(t.actions.get("Action_Kill_troll"), Some(&i32::MAX));
}
