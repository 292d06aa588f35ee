//! Rules engine with the Intent/Resolution pipeline.
//!
//! 1. A caller describes what should happen as an [`Intent`]
//! 2. [`RulesEngine::apply`] routes it to the component that owns the rule
//! 3. The [`Resolution`] carries the new snapshot and the change events
//! 4. The caller persists the snapshot and hands the events to a publisher
//!
//! Nothing here touches storage or transport, so every rule can be tested
//! with plain snapshots.

use crate::catalog::RuleCatalog;
use crate::config::EngineConfig;
use crate::error::{CatalogError, EngineError};
use crate::events::{Change, ChangeEvent};
use crate::multiclass::MulticlassCalculator;
use crate::mutator::{self, ConditionInput, CustomRuleInput, HpChangeKind, ItemInput};
use crate::progression::{LevelUpChoices, LevelUpSummary, ProgressionEngine, ProgressionSettings};
use crate::spellbook::{RestKind, SpellbookManager};
use crate::tables::RuleTables;
use crate::world::{Character, Denomination, SlotPool};
use serde::{Deserialize, Serialize};

fn one() -> u8 {
    1
}

fn one_item() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionAction {
    Add,
    Remove,
}

/// A requested change to one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    /// Advance one level with the given answers
    LevelUp {
        #[serde(default)]
        choices: LevelUpChoices,
    },

    /// Damage, heal, grant temporary HP or set HP directly
    ModifyHp { amount: u32, kind: HpChangeKind },

    /// Add (or merge) or remove a condition by key
    Condition {
        action: ConditionAction,
        key: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        source: Option<String>,
        #[serde(default)]
        duration: Option<String>,
    },

    ModifyCurrency { denomination: Denomination, amount: i64 },

    ToggleInspiration,

    AddCustomRule { rule: CustomRuleInput },

    UpdateCustomRule { id: String, rule: CustomRuleInput },

    RemoveCustomRule { id: String },

    GiveItem { item: ItemInput },

    RemoveItem {
        #[serde(default)]
        slug: Option<String>,
        name: String,
        #[serde(default = "one_item")]
        quantity: u32,
    },

    /// Spend one slot
    UseSlot {
        level: u8,
        #[serde(default)]
        pool: SlotPool,
    },

    RestoreSlot {
        level: u8,
        #[serde(default = "one")]
        count: u8,
        #[serde(default)]
        pool: SlotPool,
    },

    Rest { kind: RestKind },

    /// Spend a short-rest recovery feature (Arcane Recovery, Natural Recovery)
    RecoverSlots { feature: String, levels: Vec<u8> },

    StartConcentration { spell: String },

    EndConcentration,

    /// Replace the prepared list for `class` (the primary class when absent)
    UpdatePreparedSpells {
        #[serde(default)]
        class: Option<String>,
        spells: Vec<String>,
    },
}

/// Outcome of an intent: the new snapshot plus its events.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub character: Character,
    pub events: Vec<ChangeEvent>,
    pub summary: String,
    /// Set for level-ups.
    pub level_up: Option<LevelUpSummary>,
}

impl Resolution {
    fn from_change(change: Change, summary: impl Into<String>) -> Self {
        Self {
            character: change.character,
            events: vec![change.event],
            summary: summary.into(),
            level_up: None,
        }
    }
}

/// Owns the catalog and tables and resolves intents against them.
#[derive(Debug, Clone)]
pub struct RulesEngine {
    catalog: RuleCatalog,
    tables: RuleTables,
    config: EngineConfig,
}

impl RulesEngine {
    pub fn new(catalog: RuleCatalog, tables: RuleTables, config: EngineConfig) -> Self {
        Self {
            catalog,
            tables,
            config,
        }
    }

    /// Built-in SRD catalog with standard tables and default settings.
    pub fn srd() -> Self {
        Self::new(RuleCatalog::srd(), RuleTables::standard(), EngineConfig::default())
    }

    /// Load the configured catalog. A catalog that fails to load or does not
    /// define the default setting stops the engine from being built at all.
    pub async fn from_config(config: EngineConfig) -> Result<Self, CatalogError> {
        let catalog = match &config.catalog_path {
            Some(path) => RuleCatalog::load(path).await?,
            None => RuleCatalog::srd(),
        };
        if catalog.get_rule_system(&config.default_setting).is_err() {
            return Err(CatalogError::Incomplete(format!(
                "default setting {} is not in the catalog",
                config.default_setting
            )));
        }
        tracing::info!(
            setting = %config.default_setting,
            multiclassing = config.allow_multiclassing,
            "Rules engine ready"
        );
        Ok(Self::new(catalog, RuleTables::standard(), config))
    }

    /// Substitute alternate tables.
    pub fn with_tables(mut self, tables: RuleTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn tables(&self) -> &RuleTables {
        &self.tables
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn progression(&self) -> ProgressionEngine<'_> {
        ProgressionEngine::new(&self.catalog, &self.tables).with_settings(ProgressionSettings {
            allow_multiclassing: self.config.allow_multiclassing,
            ignore_xp: self.config.ignore_xp,
        })
    }

    pub fn spellbook(&self) -> SpellbookManager<'_> {
        SpellbookManager::new(&self.catalog, &self.tables)
    }

    pub fn multiclass(&self) -> MulticlassCalculator<'_> {
        MulticlassCalculator::new(&self.catalog, &self.tables)
    }

    /// A fresh level 1 character under the default setting, with slots filled.
    pub fn new_character(
        &self,
        name: impl Into<String>,
        class: &str,
        max_hp: i32,
    ) -> Result<Character, EngineError> {
        let class_def = self.catalog.get_class(class)?;
        if class_def.is_subclass() {
            return Err(EngineError::validation(format!(
                "{class} is a subclass, not a class"
            )));
        }
        let mut character = Character::new(name, class, max_hp);
        character.setting_id = self.config.default_setting.clone();
        character.proficiencies.saving_throws = class_def.saving_throws.iter().copied().collect();
        self.multiclass().refresh_slots(&mut character);
        Ok(character)
    }

    /// Resolve an intent. `character` is never modified.
    pub fn apply(&self, character: &Character, intent: Intent) -> Result<Resolution, EngineError> {
        let spellbook = self.spellbook();
        let resolution = match intent {
            Intent::LevelUp { choices } => {
                let outcome = self.progression().process_level_up(character, &choices)?;
                let summary = format!(
                    "{} reached level {} ({} {})",
                    character.name,
                    outcome.summary.new_level,
                    outcome.summary.class,
                    outcome.summary.class_level
                );
                let mut resolution = Resolution::from_change(outcome.change, summary);
                resolution.level_up = Some(outcome.summary);
                resolution
            }
            Intent::ModifyHp { amount, kind } => {
                let change = mutator::modify_hp(character, amount, kind);
                let summary = format!(
                    "{} HP {} -> {}",
                    character.name, character.current_hp, change.character.current_hp
                );
                Resolution::from_change(change, summary)
            }
            Intent::Condition {
                action: ConditionAction::Add,
                key,
                name,
                source,
                duration,
            } => {
                let change = mutator::add_condition(
                    character,
                    ConditionInput {
                        key: key.clone(),
                        name,
                        source,
                        duration,
                    },
                )?;
                Resolution::from_change(change, format!("{} is now {key}", character.name))
            }
            Intent::Condition {
                action: ConditionAction::Remove,
                key,
                ..
            } => {
                let change = mutator::remove_condition(character, &key);
                Resolution::from_change(change, format!("{} is no longer {key}", character.name))
            }
            Intent::ModifyCurrency {
                denomination,
                amount,
            } => {
                let change = mutator::modify_currency(character, denomination, amount);
                let summary = format!(
                    "{} now has {} {}",
                    character.name,
                    change.character.currency.get(denomination),
                    denomination.abbreviation()
                );
                Resolution::from_change(change, summary)
            }
            Intent::ToggleInspiration => {
                let change = mutator::toggle_inspiration(character);
                let summary = if change.character.inspiration {
                    format!("{} gains inspiration", character.name)
                } else {
                    format!("{} spends inspiration", character.name)
                };
                Resolution::from_change(change, summary)
            }
            Intent::AddCustomRule { rule } => {
                let change = mutator::add_custom_rule(character, rule)?;
                Resolution::from_change(change, "Custom rule saved")
            }
            Intent::UpdateCustomRule { id, rule } => {
                let change = mutator::update_custom_rule(character, &id, rule)?;
                Resolution::from_change(change, format!("Custom rule {id} updated"))
            }
            Intent::RemoveCustomRule { id } => {
                let change = mutator::remove_custom_rule(character, &id);
                Resolution::from_change(change, format!("Custom rule {id} removed"))
            }
            Intent::GiveItem { item } => {
                let summary = format!("{} receives {} x{}", character.name, item.name, item.quantity);
                Resolution::from_change(mutator::give_item(character, item)?, summary)
            }
            Intent::RemoveItem {
                slug,
                name,
                quantity,
            } => {
                let change = mutator::remove_item(character, slug.as_deref(), &name, quantity)?;
                Resolution::from_change(change, format!("{} loses {name} x{quantity}", character.name))
            }
            Intent::UseSlot { level, pool } => {
                let change = spellbook.use_slot(character, level, pool)?;
                Resolution::from_change(change, format!("Level {level} slot used"))
            }
            Intent::RestoreSlot { level, count, pool } => {
                let change = spellbook.restore_slot(character, level, count, pool)?;
                Resolution::from_change(change, format!("Level {level} slots restored"))
            }
            Intent::Rest { kind } => {
                let change = spellbook.take_rest(character, kind)?;
                let summary = match kind {
                    RestKind::Short => format!("{} takes a short rest", character.name),
                    RestKind::Long => format!("{} takes a long rest", character.name),
                };
                Resolution::from_change(change, summary)
            }
            Intent::RecoverSlots { feature, levels } => {
                let change = spellbook.recover_slots(character, &feature, &levels)?;
                Resolution::from_change(change, format!("{} recovers spell slots", character.name))
            }
            Intent::StartConcentration { spell } => {
                let change = spellbook.start_concentration(character, &spell)?;
                Resolution::from_change(change, format!("{} concentrates on {spell}", character.name))
            }
            Intent::EndConcentration => {
                let change = spellbook.end_concentration(character);
                Resolution::from_change(change, format!("{} stops concentrating", character.name))
            }
            Intent::UpdatePreparedSpells { class, spells } => {
                let change = spellbook.update_prepared_spells(character, class.as_deref(), &spells)?;
                Resolution::from_change(change, format!("{} prepared {} spells", character.name, spells.len()))
            }
        };
        Ok(resolution)
    }
}
