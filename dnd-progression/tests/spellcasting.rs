//! Spell slot, rest, concentration and preparation scenarios driven through
//! `RulesEngine::apply`, plus event delivery over a channel.

use dnd_progression::events::EventPayload;
use dnd_progression::testing;
use dnd_progression::world::SlotPool;
use dnd_progression::{
    Character, ChannelPublisher, Dispatcher, EngineError, Intent, RestKind, RulesEngine,
};
use std::sync::Arc;

fn apply(engine: &RulesEngine, character: &Character, intent: Intent) -> Character {
    engine
        .apply(character, intent)
        .unwrap_or_else(|e| panic!("intent failed: {e}"))
        .character
}

fn use_slot(level: u8) -> Intent {
    Intent::UseSlot {
        level,
        pool: SlotPool::Standard,
    }
}

fn spells(slugs: &[&str]) -> Vec<String> {
    slugs.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// SLOTS AND RESTS
// =============================================================================

#[test]
fn test_wizard_spends_and_recovers_slots() {
    let engine = RulesEngine::srd();
    let wizard = testing::sample_wizard(5);

    let tired = apply(&engine, &wizard, use_slot(3));
    let tired = apply(&engine, &tired, use_slot(3));
    assert_eq!(tired.spell_slots.standard[&3].remaining, 0);
    assert!(matches!(
        engine.apply(&tired, use_slot(3)),
        Err(EngineError::State(_))
    ));
    // The input snapshot is untouched.
    assert_eq!(wizard.spell_slots.standard[&3].remaining, 2);

    let short = apply(&engine, &tired, Intent::Rest { kind: RestKind::Short });
    assert_eq!(short.spell_slots.standard[&3].remaining, 0);

    let long = apply(&engine, &tired, Intent::Rest { kind: RestKind::Long });
    assert_eq!(long.spell_slots, wizard.spell_slots);
}

#[test]
fn test_slot_level_bounds() {
    let engine = RulesEngine::srd();
    let wizard = testing::sample_wizard(5);
    assert!(matches!(engine.apply(&wizard, use_slot(0)), Err(EngineError::Validation(_))));
    assert!(matches!(engine.apply(&wizard, use_slot(10)), Err(EngineError::Validation(_))));
    // Level 4 exists in the table but a 5th-level wizard has none.
    assert!(matches!(engine.apply(&wizard, use_slot(4)), Err(EngineError::State(_))));
}

#[test]
fn test_restore_slot_clamps_to_max() {
    let engine = RulesEngine::srd();
    let wizard = testing::sample_wizard(5);
    let spent = apply(&engine, &wizard, use_slot(1));

    let resolution = engine
        .apply(
            &spent,
            Intent::RestoreSlot {
                level: 1,
                count: 3,
                pool: SlotPool::Standard,
            },
        )
        .unwrap();
    assert_eq!(resolution.character.spell_slots.standard[&1].remaining, 4);
    match &resolution.events[0].payload {
        EventPayload::SpellSlotRestored { restored, .. } => assert_eq!(*restored, 1),
        other => panic!("unexpected payload {other:?}"),
    }

    let full = engine.apply(
        &wizard,
        Intent::RestoreSlot {
            level: 1,
            count: 1,
            pool: SlotPool::Standard,
        },
    );
    assert!(matches!(full, Err(EngineError::State(_))));
}

#[test]
fn test_warlock_pact_slots_recharge_on_short_rest() {
    let engine = RulesEngine::srd();
    let warlock = testing::sample_character("warlock", 5);
    let pact = |level| Intent::UseSlot {
        level,
        pool: SlotPool::Pact,
    };

    assert!(matches!(engine.apply(&warlock, pact(1)), Err(EngineError::Validation(_))));
    assert!(matches!(engine.apply(&warlock, use_slot(1)), Err(EngineError::State(_))));

    let spent = apply(&engine, &warlock, pact(3));
    let spent = apply(&engine, &spent, pact(3));
    assert!(matches!(engine.apply(&spent, pact(3)), Err(EngineError::State(_))));

    let rested = apply(&engine, &spent, Intent::Rest { kind: RestKind::Short });
    assert_eq!(rested.spell_slots.pact.unwrap().remaining, 2);
}

// =============================================================================
// ARCANE RECOVERY
// =============================================================================

#[test]
fn test_arcane_recovery_budget_and_once_per_long_rest() {
    let engine = RulesEngine::srd();
    let wizard = testing::sample_wizard(5);
    let recover = |levels: &[u8]| Intent::RecoverSlots {
        feature: "arcane-recovery".to_string(),
        levels: levels.to_vec(),
    };

    let spent = apply(&engine, &wizard, use_slot(1));
    let spent = apply(&engine, &spent, use_slot(1));
    let spent = apply(&engine, &spent, use_slot(2));

    // ceil(5/2) = 3 slot levels.
    assert!(matches!(
        engine.apply(&spent, recover(&[1, 1, 2])),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        engine.apply(&spent, recover(&[3])),
        Err(EngineError::State(_))
    ));

    let recovered = apply(&engine, &spent, recover(&[1, 2]));
    assert_eq!(recovered.spell_slots.standard[&1].remaining, 3);
    assert_eq!(recovered.spell_slots.standard[&2].remaining, 3);

    assert!(matches!(
        engine.apply(&recovered, recover(&[1])),
        Err(EngineError::State(_))
    ));
    let rested = apply(&engine, &recovered, Intent::Rest { kind: RestKind::Long });
    assert!(rested.short_rest_recovery_used.is_empty());
}

#[test]
fn test_recovery_needs_the_feature() {
    let engine = RulesEngine::srd();
    let sorcerer = testing::sample_character("sorcerer", 5);
    let result = engine.apply(
        &sorcerer,
        Intent::RecoverSlots {
            feature: "arcane-recovery".to_string(),
            levels: vec![1],
        },
    );
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

// =============================================================================
// CONCENTRATION
// =============================================================================

#[test]
fn test_concentration_replaces_and_ends_on_long_rest() {
    let engine = RulesEngine::srd();
    let wizard = testing::sample_wizard(5);
    let start = |spell: &str| Intent::StartConcentration {
        spell: spell.to_string(),
    };

    let hasted = apply(&engine, &wizard, start("haste"));
    let resolution = engine.apply(&hasted, start("hold-person")).unwrap();
    match &resolution.events[0].payload {
        EventPayload::ConcentrationStarted { spell, replaced } => {
            assert_eq!(spell, "hold-person");
            assert_eq!(replaced.as_deref(), Some("haste"));
        }
        other => panic!("unexpected payload {other:?}"),
    }
    let holding = resolution.character;

    assert!(matches!(
        engine.apply(&holding, start("magic-missile")),
        Err(EngineError::State(_))
    ));
    assert!(matches!(
        engine.apply(&holding, start("not-a-spell")),
        Err(EngineError::Validation(_))
    ));

    let short = apply(&engine, &holding, Intent::Rest { kind: RestKind::Short });
    assert!(short.concentration.is_some());

    let resolution = engine
        .apply(&holding, Intent::Rest { kind: RestKind::Long })
        .unwrap();
    assert!(resolution.character.concentration.is_none());
    match &resolution.events[0].payload {
        EventPayload::RestCompleted {
            concentration_ended, ..
        } => assert_eq!(concentration_ended.as_deref(), Some("hold-person")),
        other => panic!("unexpected payload {other:?}"),
    }
}

// =============================================================================
// PREPARATION
// =============================================================================

#[test]
fn test_wizard_preparation_limit() {
    let engine = RulesEngine::srd();
    let wizard = testing::sample_wizard(5);
    let prepare = |list: &[&str]| Intent::UpdatePreparedSpells {
        class: None,
        spells: spells(list),
    };

    // INT 16 (+3) plus wizard level 5; cantrips are free.
    let eight = [
        "fire-bolt",
        "magic-missile",
        "shield",
        "sleep",
        "burning-hands",
        "thunderwave",
        "misty-step",
        "haste",
        "fireball",
    ];
    let prepared = apply(&engine, &wizard, prepare(&eight));
    assert_eq!(prepared.prepared_spells.len(), 9);

    let mut nine = eight.to_vec();
    nine.push("counterspell");
    assert!(matches!(engine.apply(&wizard, prepare(&nine)), Err(EngineError::State(_))));

    assert!(matches!(
        engine.apply(&wizard, prepare(&["cure-wounds"])),
        Err(EngineError::Validation(_))
    ));

    let replaced = apply(&engine, &prepared, prepare(&["shield"]));
    assert_eq!(replaced.prepared_spells.len(), 1);
}

#[test]
fn test_only_prepared_casters_prepare() {
    let engine = RulesEngine::srd();
    let intent = || Intent::UpdatePreparedSpells {
        class: None,
        spells: spells(&["magic-missile"]),
    };
    assert!(matches!(
        engine.apply(&testing::sample_fighter(), intent()),
        Err(EngineError::State(_))
    ));
    assert!(matches!(
        engine.apply(&testing::sample_character("sorcerer", 3), intent()),
        Err(EngineError::State(_))
    ));
}

#[test]
fn test_spellbook_view() {
    let engine = RulesEngine::srd();
    let wizard = testing::sample_wizard(5);
    let book = engine.spellbook().spellbook(&wizard).unwrap();
    assert!(book.is_spellcaster);
    assert_eq!(book.spell_save_dc, Some(14));
    assert_eq!(book.spell_attack_bonus, Some(6));
    assert_eq!(book.cantrips.len(), 3);
    assert_eq!(book.known_spells.len(), 7);
    assert_eq!(book.casting[0].max_prepared, Some(8));

    let fighter = engine.spellbook().spellbook(&testing::sample_fighter()).unwrap();
    assert!(!fighter.is_spellcaster);
}

// =============================================================================
// EVENT DELIVERY
// =============================================================================

#[tokio::test]
async fn test_dispatcher_streams_events_in_order() {
    let engine = Arc::new(RulesEngine::srd());
    let (publisher, mut receiver) = ChannelPublisher::new();
    let dispatcher = Dispatcher::new(engine, publisher);
    let wizard = testing::sample_wizard(5);

    let mut current = wizard.clone();
    for intent in [
        use_slot(1),
        Intent::StartConcentration {
            spell: "haste".to_string(),
        },
        Intent::Rest { kind: RestKind::Long },
    ] {
        current = dispatcher.dispatch(&current, intent).unwrap().character;
    }

    let mut kinds = Vec::new();
    for _ in 0..3 {
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.character_id, wizard.id);
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec!["spell_slot_used", "concentration_started", "rest_completed"]
    );
    assert!(receiver.try_recv().is_err());
}

#[tokio::test]
async fn test_closed_channel_does_not_fail_dispatch() {
    let (publisher, receiver) = ChannelPublisher::new();
    drop(receiver);
    let dispatcher = Dispatcher::new(Arc::new(RulesEngine::srd()), publisher);
    let wizard = testing::sample_wizard(3);
    let resolution = dispatcher.dispatch(&wizard, use_slot(2)).unwrap();
    assert_eq!(resolution.character.spell_slots.standard[&2].remaining, 1);
}
