//! Level-up eligibility, options and application.
//!
//! [`ProgressionEngine`] answers three questions about a character snapshot:
//! may it level up ([`ProgressionEngine::can_level_up`]), what could it pick
//! ([`ProgressionEngine::level_up_options`]) and what does it look like after
//! a given set of picks ([`ProgressionEngine::process_level_up`]). The last
//! one either returns a complete new snapshot or an error; the input snapshot
//! is never touched.

mod apply;
mod feats;
mod options;
pub mod steps;

pub use apply::{AsiChoice, LevelUpChoices, LevelUpOutcome, LevelUpSummary};
pub use feats::FeatChoices;
pub use options::{
    ClassOption, FeatOption, FeatureOption, HpOptions, LevelUpOptions, SubclassOption,
};

use crate::catalog::{RuleCatalog, RuleSystem};
use crate::error::EngineError;
use crate::tables::RuleTables;
use crate::world::Character;
use serde::{Deserialize, Serialize};

/// Whether a character may level up, and why not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: String,
}

impl Eligibility {
    fn yes(reason: impl Into<String>) -> Self {
        Self {
            eligible: true,
            reason: reason.into(),
        }
    }

    fn no(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            reason: reason.into(),
        }
    }
}

/// Switches the host can flip without touching the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressionSettings {
    /// Combined with the rule system's own flag; both must allow it.
    pub allow_multiclassing: bool,
    /// Treat every active character as having enough XP (milestone play).
    pub ignore_xp: bool,
}

impl Default for ProgressionSettings {
    fn default() -> Self {
        Self {
            allow_multiclassing: true,
            ignore_xp: false,
        }
    }
}

pub struct ProgressionEngine<'a> {
    catalog: &'a RuleCatalog,
    tables: &'a RuleTables,
    settings: ProgressionSettings,
}

impl<'a> ProgressionEngine<'a> {
    pub fn new(catalog: &'a RuleCatalog, tables: &'a RuleTables) -> Self {
        Self {
            catalog,
            tables,
            settings: ProgressionSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ProgressionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> ProgressionSettings {
        self.settings
    }

    /// Rule system the character is played under.
    pub fn rule_system(&self, character: &Character) -> Result<&'a RuleSystem, EngineError> {
        self.catalog.get_rule_system(&character.setting_id)
    }

    /// Inactive characters may always level up; active ones need the XP
    /// threshold for the next level. Nobody goes past the maximum level.
    pub fn can_level_up(&self, character: &Character, rule_system: &RuleSystem) -> Eligibility {
        if character.level >= rule_system.max_level {
            return Eligibility::no(format!(
                "Already at maximum level {}",
                rule_system.max_level
            ));
        }
        if !character.is_active {
            return Eligibility::yes("Experimentation mode: XP is not required");
        }
        if self.settings.ignore_xp {
            return Eligibility::yes("XP requirements are disabled");
        }

        let next = character.level + 1;
        match rule_system.xp_for_level(next) {
            Some(needed) if character.experience >= needed => {
                Eligibility::yes(format!("Has {} of {needed} XP", character.experience))
            }
            Some(needed) => Eligibility::no(format!(
                "Needs {needed} XP for level {next}, has {}",
                character.experience
            )),
            None => Eligibility::no(format!("No XP threshold for level {next}")),
        }
    }

    fn multiclassing_allowed(&self, rule_system: &RuleSystem) -> bool {
        self.settings.allow_multiclassing && rule_system.allow_multiclassing
    }
}

/// Key a resource pool is stored under: "Luck Points" -> "luck-points".
pub(crate) fn resource_key(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
