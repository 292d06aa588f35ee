//! Testing utilities for the progression engine.
//!
//! This module provides:
//! - Sample characters with consistent HP and spell slots
//! - `RecordingPublisher` for asserting on published events
//! - `FailingPublisher` for checking that publish failures are swallowed

use crate::catalog::RuleCatalog;
use crate::error::PublishError;
use crate::events::{ChangeEvent, EventPublisher};
use crate::multiclass::MulticlassCalculator;
use crate::tables::RuleTables;
use crate::world::{AbilityScores, Character, FeatureSource, GrantedFeature};
use std::sync::Mutex;

/// Level 1 fighter with a typical standard array.
pub fn sample_fighter() -> Character {
    let mut character = Character::new("Thorin", "fighter", 12);
    character.abilities = AbilityScores::new(16, 14, 14, 10, 12, 8);
    character
}

/// A character of `class` at `level` with average HP, all ability scores
/// 10 and full spell slots. No features are granted.
pub fn sample_character(class: &str, level: u8) -> Character {
    let catalog = RuleCatalog::srd();
    let hit_die = catalog.get_class(class).map(|c| c.hit_die as i32).unwrap_or(8);
    let max_hp = hit_die + (level as i32 - 1) * (hit_die / 2 + 1);

    let mut character = Character::new(format!("Sample {class}"), class, max_hp);
    character.level = level;
    MulticlassCalculator::new(&catalog, &RuleTables::standard()).refresh_slots(&mut character);
    character
}

/// Wizard with INT 16, Arcane Recovery and a small spellbook.
pub fn sample_wizard(level: u8) -> Character {
    let catalog = RuleCatalog::srd();
    let mut wizard = sample_character("wizard", level);
    wizard.name = "Elminster".to_string();
    wizard.abilities.intelligence = 16;

    let recovery = catalog
        .get_class("wizard")
        .ok()
        .and_then(|c| c.features_at(1).iter().find(|f| f.slug == "arcane-recovery"))
        .and_then(|f| f.short_rest_recovery.clone());
    wizard.features.push(GrantedFeature {
        slug: "arcane-recovery".to_string(),
        name: "Arcane Recovery".to_string(),
        source: FeatureSource::Class {
            class: "wizard".to_string(),
        },
        level: 1,
        choice: None,
        short_rest_recovery: recovery,
    });

    for spell in [
        "fire-bolt",
        "light",
        "mage-hand",
        "magic-missile",
        "shield",
        "sleep",
        "burning-hands",
        "thunderwave",
    ] {
        wizard.known_spells.insert(spell.to_string());
    }
    if level >= 5 {
        wizard.known_spells.insert("haste".to_string());
        wizard.known_spells.insert("fireball".to_string());
    }
    wizard
}

/// Publisher that keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Event kinds in publication order.
    pub fn kinds(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: &ChangeEvent) -> Result<(), PublishError> {
        self.events
            .lock()
            .map_err(|_| PublishError::Rejected("recorder poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}

/// Publisher that rejects everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingPublisher;

impl EventPublisher for FailingPublisher {
    fn publish(&self, _event: &ChangeEvent) -> Result<(), PublishError> {
        Err(PublishError::Rejected("transport unavailable".to_string()))
    }
}
