//! D&D 5e character progression and spellcasting rules engine.
//!
//! This crate provides:
//! - Level-up eligibility, options and application, including multiclassing
//! - Multiclass and Pact Magic spell slot math
//! - Spellbook views, slot use, concentration and rests
//! - Single-purpose character edits (HP, conditions, inventory, currency)
//! - An Intent/Resolution pipeline with change events for other participants
//!
//! Every operation takes a character snapshot and returns a new one; the
//! input is never modified.
//!
//! # Quick Start
//!
//! ```ignore
//! use dnd_progression::{ChannelPublisher, Dispatcher, Intent, RulesEngine};
//! use std::sync::Arc;
//!
//! let engine = Arc::new(RulesEngine::srd());
//! let (publisher, mut events) = ChannelPublisher::new();
//! let dispatcher = Dispatcher::new(engine.clone(), publisher);
//!
//! let wizard = engine.new_character("Elminster", "wizard", 8)?;
//! let resolution = dispatcher.dispatch(&wizard, Intent::UseSlot { level: 1, pool: Default::default() })?;
//! println!("{}", resolution.summary);
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod formula;
pub mod multiclass;
pub mod mutator;
pub mod progression;
pub mod rules;
pub mod spellbook;
pub mod tables;
pub mod testing;
pub mod world;

// Primary public API
pub use catalog::RuleCatalog;
pub use config::EngineConfig;
pub use error::{CatalogError, EngineError, FormulaError, PublishError};
pub use events::{Change, ChangeEvent, ChannelPublisher, Dispatcher, EventPayload, EventPublisher};
pub use formula::{FormulaEvaluator, FormulaVars};
pub use multiclass::{MulticlassCalculator, SlotCapacity};
pub use progression::{
    AsiChoice, Eligibility, FeatChoices, LevelUpChoices, LevelUpOptions, ProgressionEngine,
};
pub use rules::{Intent, Resolution, RulesEngine};
pub use spellbook::{RestKind, Spellbook, SpellbookManager};
pub use tables::RuleTables;
pub use world::{Ability, AbilityScores, Character, CharacterId};
