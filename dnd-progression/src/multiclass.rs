//! Multiclass eligibility and combined spell slot capacity.

use crate::catalog::{RuleCatalog, RuleSystem};
use crate::error::EngineError;
use crate::tables::{CasterProgression, RuleTables};
use crate::world::{Character, PactSlots, SlotState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of a multiclass prerequisite check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulticlassCheck {
    pub allowed: bool,
    pub failed_prerequisites: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PactCapacity {
    pub slot_level: u8,
    pub slots: u8,
}

/// Slot maxima a character should have.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCapacity {
    /// Slot level -> number of slots. Levels without slots are absent.
    pub standard: BTreeMap<u8, u8>,
    pub pact: Option<PactCapacity>,
}

pub struct MulticlassCalculator<'a> {
    catalog: &'a RuleCatalog,
    tables: &'a RuleTables,
}

impl<'a> MulticlassCalculator<'a> {
    pub fn new(catalog: &'a RuleCatalog, tables: &'a RuleTables) -> Self {
        Self { catalog, tables }
    }

    /// Check ability prerequisites for `target` and for every class already
    /// held. A class the character already has is always allowed.
    pub fn can_multiclass_into(
        &self,
        character: &Character,
        target: &str,
        rule_system: &RuleSystem,
    ) -> Result<MulticlassCheck, EngineError> {
        let target_class = self
            .catalog
            .get_class(target)
            .map_err(|_| EngineError::validation(format!("Unknown class: {target}")))?;
        if target_class.is_subclass() {
            return Err(EngineError::validation(format!(
                "{target} is a subclass, not a class"
            )));
        }

        if character.has_class(target) {
            return Ok(MulticlassCheck {
                allowed: true,
                failed_prerequisites: Vec::new(),
            });
        }

        let mut classes: Vec<String> = vec![target.to_string()];
        classes.extend(character.held_classes().into_keys());

        let mut failed = Vec::new();
        for class in &classes {
            let Some(requirements) = rule_system.multiclass_prerequisites.get(class) else {
                continue;
            };
            let name = self
                .catalog
                .get_class(class)
                .map(|c| c.name.clone())
                .unwrap_or_else(|_| class.clone());
            for requirement in requirements {
                if !requirement.is_met(&character.abilities) {
                    failed.push(format!("{}: {}", name, requirement.describe()));
                }
            }
        }

        Ok(MulticlassCheck {
            allowed: failed.is_empty(),
            failed_prerequisites: failed,
        })
    }

    /// Contribution of one class to the shared slot table.
    fn contribution(&self, character: &Character, class: &str, class_level: u8) -> u8 {
        match self.tables.progression(class) {
            CasterProgression::Third => {
                let casts = character
                    .subclasses
                    .get(class)
                    .is_some_and(|s| self.tables.spellcasting_subclasses.contains(&s.subclass));
                if casts {
                    CasterProgression::Third.effective_levels(class_level)
                } else {
                    0
                }
            }
            progression => progression.effective_levels(class_level),
        }
    }

    /// Combined caster level for the shared slot table. Pact Magic classes
    /// are excluded.
    pub fn caster_level(&self, character: &Character) -> u8 {
        character
            .held_classes()
            .iter()
            .map(|(class, &level)| self.contribution(character, class, level))
            .fold(0u8, |acc, l| acc.saturating_add(l))
    }

    /// Slot capacity. A character holding one class uses that class's own
    /// table; any multiclass character uses the shared table at the
    /// combined caster level, even when only one of the classes casts.
    pub fn spell_slots(&self, character: &Character) -> SlotCapacity {
        let held = character.held_classes();

        let mut standard = BTreeMap::new();
        let single = match held.first_key_value() {
            Some((class, level)) if held.len() == 1 => self
                .single_class_table(character, class)
                .map(|table| table.get(level).cloned().unwrap_or_default()),
            _ => None,
        };
        let row: Vec<u8> = match single {
            Some(row) => row,
            None => self.tables.slot_row(self.caster_level(character)).to_vec(),
        };
        for (index, &count) in row.iter().enumerate() {
            if count > 0 {
                standard.insert(index as u8 + 1, count);
            }
        }

        let pact_level: u8 = held
            .iter()
            .filter(|(class, _)| self.tables.progression(class) == CasterProgression::Pact)
            .map(|(_, &level)| level)
            .fold(0u8, |acc, l| acc.saturating_add(l));
        let pact = (pact_level > 0)
            .then(|| PactCapacity {
                slot_level: self.tables.pact_slot_level(pact_level),
                slots: self.tables.pact_slot_count(pact_level),
            })
            .filter(|p| p.slots > 0);

        SlotCapacity { standard, pact }
    }

    /// Single-class slot table from the recorded subclass, else the class.
    fn single_class_table(
        &self,
        character: &Character,
        class: &str,
    ) -> Option<&'a BTreeMap<u8, Vec<u8>>> {
        let from_subclass = character
            .subclasses
            .get(class)
            .and_then(|s| self.catalog.get_class(&s.subclass).ok())
            .map(|s| &s.spell_slots)
            .filter(|t| !t.is_empty());
        from_subclass.or_else(|| {
            self.catalog
                .get_class(class)
                .ok()
                .map(|c| &c.spell_slots)
                .filter(|t| !t.is_empty())
        })
    }

    /// Recompute slot maxima on `character`. Spent slots stay spent; new
    /// capacity arrives available.
    pub fn refresh_slots(&self, character: &mut Character) {
        let capacity = self.spell_slots(character);
        let old = std::mem::take(&mut character.spell_slots.standard);
        let old_pact = character.spell_slots.pact;

        for (&level, &max) in &capacity.standard {
            let used = old.get(&level).map(SlotState::used).unwrap_or(0);
            character.spell_slots.standard.insert(
                level,
                SlotState {
                    max,
                    remaining: max.saturating_sub(used),
                },
            );
        }

        character.spell_slots.pact = capacity.pact.map(|pact| {
            let used = old_pact
                .map(|p| p.max.saturating_sub(p.remaining))
                .unwrap_or(0);
            PactSlots {
                slot_level: pact.slot_level,
                max: pact.slots,
                remaining: pact.slots.saturating_sub(used),
            }
        });
    }
}
