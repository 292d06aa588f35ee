//! Spellbook view and live spellcasting state.
//!
//! Every mutating operation takes a snapshot and returns a [`Change`]: the
//! new snapshot and exactly one event. The input is never modified.

use crate::catalog::{ClassDefinition, RuleCatalog, SpellDefinition};
use crate::error::EngineError;
use crate::events::{Change, EventPayload};
use crate::formula::{FormulaEvaluator, FormulaVars};
use crate::tables::{CasterType, RuleTables};
use crate::world::{Ability, Character, Concentration, RechargePolicy, SlotPool, SpellSlots};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Kind of rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestKind {
    Short,
    Long,
}

/// Spellcasting numbers for one class the character casts with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCasting {
    pub class: String,
    /// Subclass providing the spellcasting feature, when the base class has none.
    pub via_subclass: Option<String>,
    pub class_level: u8,
    pub ability: Ability,
    pub ability_modifier: i8,
    pub spell_save_dc: i32,
    pub spell_attack_bonus: i32,
    pub caster_type: CasterType,
    pub max_prepared: Option<i32>,
    pub cantrips_known: Option<u8>,
    pub spells_known: Option<u8>,
}

/// Resolved view of everything a character can cast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spellbook {
    pub is_spellcaster: bool,
    /// Numbers for the primary casting class.
    pub spell_save_dc: Option<i32>,
    pub spell_attack_bonus: Option<i32>,
    pub casting: Vec<ClassCasting>,
    pub cantrips: Vec<SpellDefinition>,
    pub known_spells: Vec<SpellDefinition>,
    pub prepared_spells: Vec<SpellDefinition>,
    pub always_prepared: Vec<SpellDefinition>,
    /// Subclass bonus spells unlocked at the current class level.
    pub circle_spells: Vec<SpellDefinition>,
    pub slots: SpellSlots,
    pub concentration: Option<String>,
}

impl Spellbook {
    fn inert() -> Self {
        Self {
            is_spellcaster: false,
            spell_save_dc: None,
            spell_attack_bonus: None,
            casting: Vec::new(),
            cantrips: Vec::new(),
            known_spells: Vec::new(),
            prepared_spells: Vec::new(),
            always_prepared: Vec::new(),
            circle_spells: Vec::new(),
            slots: SpellSlots::default(),
            concentration: None,
        }
    }
}

/// Formula variables for a pool or feature tied to `class`, or to the
/// character as a whole when `class` is `None`.
pub(crate) fn formula_vars(character: &Character, class: Option<&str>) -> FormulaVars {
    let level = class
        .map(|c| character.class_level(c))
        .unwrap_or(character.level);
    FormulaVars::new(level as i32, character.proficiency_bonus() as i32)
}

/// Re-evaluate every resource pool's maximum. Current values move by the
/// same amount as the maximum and stay within `0..=max`.
pub(crate) fn recompute_pool_maxima(character: &mut Character) -> Result<(), EngineError> {
    let evaluator = FormulaEvaluator::new();
    let vars: BTreeMap<String, FormulaVars> = character
        .class_resources
        .iter()
        .map(|(key, pool)| (key.clone(), formula_vars(character, pool.class.as_deref())))
        .collect();

    for (key, pool) in character.class_resources.iter_mut() {
        let Some(formula) = &pool.max_formula else {
            continue;
        };
        let new_max = evaluator.evaluate(formula, vars[key])?.max(0);
        let delta = new_max - pool.max;
        pool.max = new_max;
        pool.current = (pool.current + delta).clamp(0, new_max);
    }
    Ok(())
}

pub struct SpellbookManager<'a> {
    catalog: &'a RuleCatalog,
    tables: &'a RuleTables,
    evaluator: FormulaEvaluator,
}

impl<'a> SpellbookManager<'a> {
    pub fn new(catalog: &'a RuleCatalog, tables: &'a RuleTables) -> Self {
        Self {
            catalog,
            tables,
            evaluator: FormulaEvaluator::new(),
        }
    }

    /// Class (or subclass) definition that gives `class` its spellcasting.
    fn casting_source(
        &self,
        character: &Character,
        class: &str,
    ) -> Option<(&'a ClassDefinition, Option<&'a ClassDefinition>)> {
        let base = self.catalog.get_class(class).ok()?;
        if base.is_spellcaster {
            return Some((base, None));
        }
        let subclass = character
            .subclasses
            .get(class)
            .and_then(|s| self.catalog.get_class(&s.subclass).ok())
            .filter(|s| s.is_spellcaster)?;
        Some((base, Some(subclass)))
    }

    fn class_casting(
        &self,
        character: &Character,
        class: &str,
        class_level: u8,
        proficiency: i32,
    ) -> Option<ClassCasting> {
        let (base, subclass) = self.casting_source(character, class)?;
        let source = subclass.unwrap_or(base);
        let ability = source.spellcasting_ability?;
        let modifier = character.abilities.modifier(ability);
        let caster_type = self.tables.caster_type(class);

        let max_prepared = (caster_type == CasterType::Prepared).then(|| {
            let level = if self.tables.half_level_preparers.contains(class) {
                class_level as i32 / 2
            } else {
                class_level as i32
            };
            (modifier as i32 + level).max(1)
        });

        Some(ClassCasting {
            class: class.to_string(),
            via_subclass: subclass.map(|s| s.slug.clone()),
            class_level,
            ability,
            ability_modifier: modifier,
            spell_save_dc: 8 + proficiency + modifier as i32,
            spell_attack_bonus: proficiency + modifier as i32,
            caster_type,
            max_prepared,
            cantrips_known: source.cantrips_known_at(class_level),
            spells_known: match caster_type {
                CasterType::Known => source.spells_known_at(class_level),
                CasterType::Prepared => None,
            },
        })
    }

    fn resolve(&self, character: &Character, slugs: &BTreeSet<String>) -> Vec<SpellDefinition> {
        slugs
            .iter()
            .filter_map(|slug| match self.catalog.get_spell(slug) {
                Ok(spell) => Some(spell.clone()),
                Err(_) => {
                    tracing::warn!(
                        character_id = %character.id,
                        spell = %slug,
                        "Skipping unknown spell in spellbook"
                    );
                    None
                }
            })
            .collect()
    }

    /// Circle/domain spells unlocked for every recorded subclass.
    pub fn circle_spells(&self, character: &Character) -> BTreeSet<String> {
        let mut spells = BTreeSet::new();
        for (class, choice) in &character.subclasses {
            let Ok(subclass) = self.catalog.get_class(&choice.subclass) else {
                continue;
            };
            if let Some(circle) = &subclass.circle_spells {
                spells.extend(circle.unlocked(character.class_level(class), choice.terrain.as_deref()));
            }
        }
        spells
    }

    pub fn spellbook(&self, character: &Character) -> Result<Spellbook, EngineError> {
        let proficiency = self
            .catalog
            .get_rule_system(&character.setting_id)?
            .proficiency_bonus(character.level)?;

        let held = character.held_classes();
        let mut classes: Vec<(&String, &u8)> = held.iter().collect();
        // Primary class first.
        classes.sort_by_key(|(class, _)| **class != character.class_slug);

        let casting: Vec<ClassCasting> = classes
            .into_iter()
            .filter_map(|(class, &level)| self.class_casting(character, class, level, proficiency))
            .collect();

        let has_pact = character.spell_slots.pact.is_some();
        if casting.is_empty() && !has_pact {
            return Ok(Spellbook::inert());
        }

        let (cantrips, known): (Vec<_>, Vec<_>) = self
            .resolve(character, &character.known_spells)
            .into_iter()
            .partition(SpellDefinition::is_cantrip);

        Ok(Spellbook {
            is_spellcaster: true,
            spell_save_dc: casting.first().map(|c| c.spell_save_dc),
            spell_attack_bonus: casting.first().map(|c| c.spell_attack_bonus),
            cantrips,
            known_spells: known,
            prepared_spells: self.resolve(character, &character.prepared_spells),
            always_prepared: self.resolve(character, &character.always_prepared_spells),
            circle_spells: self.resolve(character, &self.circle_spells(character)),
            casting,
            slots: character.spell_slots.clone(),
            concentration: character.concentration.as_ref().map(|c| c.spell.clone()),
        })
    }

    pub fn use_slot(&self, character: &Character, level: u8, pool: SlotPool) -> Result<Change, EngineError> {
        let mut next = character.clone();
        let (remaining, max) = match pool {
            SlotPool::Standard => {
                check_slot_level(level)?;
                let slot = next
                    .spell_slots
                    .standard
                    .get_mut(&level)
                    .filter(|s| s.max > 0)
                    .ok_or_else(|| EngineError::state(format!("No level {level} spell slots")))?;
                if slot.remaining == 0 {
                    return Err(EngineError::state(format!(
                        "No level {level} spell slots remaining"
                    )));
                }
                slot.remaining -= 1;
                (slot.remaining, slot.max)
            }
            SlotPool::Pact => {
                let pact = next
                    .spell_slots
                    .pact
                    .as_mut()
                    .ok_or_else(|| EngineError::state("No pact magic slots"))?;
                if level != pact.slot_level {
                    return Err(EngineError::validation(format!(
                        "Pact slots are level {}, not {level}",
                        pact.slot_level
                    )));
                }
                if pact.remaining == 0 {
                    return Err(EngineError::state("No pact magic slots remaining"));
                }
                pact.remaining -= 1;
                (pact.remaining, pact.max)
            }
        };

        Ok(Change::new(
            next,
            EventPayload::SpellSlotUsed {
                pool,
                level,
                remaining,
                max,
            },
        ))
    }

    pub fn restore_slot(
        &self,
        character: &Character,
        level: u8,
        count: u8,
        pool: SlotPool,
    ) -> Result<Change, EngineError> {
        if count == 0 {
            return Err(EngineError::validation("Restore count must be at least 1"));
        }
        let mut next = character.clone();
        let (before, remaining, max) = match pool {
            SlotPool::Standard => {
                check_slot_level(level)?;
                let slot = next
                    .spell_slots
                    .standard
                    .get_mut(&level)
                    .filter(|s| s.max > 0)
                    .ok_or_else(|| EngineError::state(format!("No level {level} spell slots")))?;
                let before = slot.remaining;
                slot.remaining = slot.remaining.saturating_add(count).min(slot.max);
                (before, slot.remaining, slot.max)
            }
            SlotPool::Pact => {
                let pact = next
                    .spell_slots
                    .pact
                    .as_mut()
                    .ok_or_else(|| EngineError::state("No pact magic slots"))?;
                if level != pact.slot_level {
                    return Err(EngineError::validation(format!(
                        "Pact slots are level {}, not {level}",
                        pact.slot_level
                    )));
                }
                let before = pact.remaining;
                pact.remaining = pact.remaining.saturating_add(count).min(pact.max);
                (before, pact.remaining, pact.max)
            }
        };
        if before == max {
            return Err(EngineError::state(format!(
                "Level {level} spell slots are already full"
            )));
        }

        Ok(Change::new(
            next,
            EventPayload::SpellSlotRestored {
                pool,
                level,
                restored: remaining - before,
                remaining,
                max,
            },
        ))
    }

    pub fn take_rest(&self, character: &Character, kind: RestKind) -> Result<Change, EngineError> {
        let mut next = character.clone();
        let mut restored = Vec::new();
        let mut concentration_ended = None;

        match kind {
            RestKind::Long => {
                next.spell_slots.restore_all();
                concentration_ended = next.concentration.take().map(|c| c.spell);
                next.short_rest_recovery_used.clear();
                recompute_pool_maxima(&mut next)?;
                for pool in next.class_resources.values_mut() {
                    pool.current = pool.max;
                    restored.push(pool.name.clone());
                }
            }
            RestKind::Short => {
                if let Some(pact) = next.spell_slots.pact.as_mut() {
                    pact.remaining = pact.max;
                }
                for pool in next.class_resources.values_mut() {
                    if pool.recharge == RechargePolicy::ShortRest {
                        pool.current = pool.max;
                        restored.push(pool.name.clone());
                    }
                }
            }
        }

        tracing::info!(
            character_id = %next.id,
            rest = ?kind,
            resources = restored.len(),
            "Rest completed"
        );
        Ok(Change::new(
            next,
            EventPayload::RestCompleted {
                kind,
                resources_restored: restored,
                concentration_ended,
            },
        ))
    }

    /// Spend a feature's once-per-long-rest budget to regain slots. `levels`
    /// lists one entry per slot regained.
    pub fn recover_slots(
        &self,
        character: &Character,
        feature: &str,
        levels: &[u8],
    ) -> Result<Change, EngineError> {
        let granted = character
            .features
            .iter()
            .find(|f| f.slug == feature)
            .ok_or_else(|| EngineError::validation(format!("Character does not have {feature}")))?;
        let recovery = granted
            .short_rest_recovery
            .as_ref()
            .ok_or_else(|| EngineError::validation(format!("{} does not recover spell slots", granted.name)))?;
        if character.short_rest_recovery_used.iter().any(|f| f == feature) {
            return Err(EngineError::state(format!(
                "{} already used since the last long rest",
                granted.name
            )));
        }
        if levels.is_empty() {
            return Err(EngineError::validation("No slot levels to recover"));
        }

        let budget = self
            .evaluator
            .evaluate(&recovery.budget_formula, formula_vars(character, granted.class()))?;
        if let Some(&level) = levels
            .iter()
            .find(|&&level| level == 0 || level > recovery.max_slot_level)
        {
            return Err(EngineError::validation(format!(
                "{} cannot recover level {level} slots",
                granted.name
            )));
        }
        let total: i64 = levels.iter().map(|&l| i64::from(l)).sum();
        if total > i64::from(budget) {
            return Err(EngineError::validation(format!(
                "Recovering {total} slot levels exceeds the budget of {budget}"
            )));
        }
        let mut counts: BTreeMap<u8, u32> = BTreeMap::new();
        for &level in levels {
            *counts.entry(level).or_default() += 1;
        }

        let mut next = character.clone();
        for (&level, &count) in &counts {
            let slot = next
                .spell_slots
                .standard
                .get_mut(&level)
                .ok_or_else(|| EngineError::state(format!("No level {level} spell slots")))?;
            let regained = u8::try_from(count)
                .ok()
                .filter(|&n| u32::from(slot.remaining) + u32::from(n) <= u32::from(slot.max))
                .ok_or_else(|| {
                    EngineError::state(format!(
                        "Only {} level {level} slots are expended",
                        slot.used()
                    ))
                })?;
            slot.remaining += regained;
        }
        next.short_rest_recovery_used.push(feature.to_string());

        Ok(Change::new(
            next,
            EventPayload::SlotsRecovered {
                feature: feature.to_string(),
                levels: levels.to_vec(),
                budget,
            },
        ))
    }

    /// Begin concentrating on `spell`, replacing any earlier concentration.
    pub fn start_concentration(&self, character: &Character, spell: &str) -> Result<Change, EngineError> {
        let definition = self
            .catalog
            .get_spell(spell)
            .map_err(|_| EngineError::validation(format!("Unknown spell: {spell}")))?;
        if !definition.concentration {
            return Err(EngineError::state(format!(
                "{} does not require concentration",
                definition.name
            )));
        }

        let mut next = character.clone();
        let replaced = next
            .concentration
            .replace(Concentration {
                spell: spell.to_string(),
                started_at: Utc::now(),
            })
            .map(|c| c.spell);

        Ok(Change::new(
            next,
            EventPayload::ConcentrationStarted {
                spell: spell.to_string(),
                replaced,
            },
        ))
    }

    pub fn end_concentration(&self, character: &Character) -> Change {
        let mut next = character.clone();
        let spell = next.concentration.take().map(|c| c.spell);
        Change::new(next, EventPayload::ConcentrationEnded { spell })
    }

    /// Replace the prepared list. `class` defaults to the primary class.
    pub fn update_prepared_spells(
        &self,
        character: &Character,
        class: Option<&str>,
        spells: &[String],
    ) -> Result<Change, EngineError> {
        let class = class.unwrap_or(character.class_slug.as_str());
        let class_level = character.class_level(class);
        if class_level == 0 {
            return Err(EngineError::validation(format!("Character has no levels in {class}")));
        }
        let proficiency = character.proficiency_bonus() as i32;
        let casting = self
            .class_casting(character, class, class_level, proficiency)
            .ok_or_else(|| EngineError::state(format!("{class} is not a spellcasting class")))?;
        let max_prepared = match (casting.caster_type, casting.max_prepared) {
            (CasterType::Prepared, Some(max)) => max,
            _ => {
                return Err(EngineError::state(format!("{class} does not prepare spells")));
            }
        };
        let list = match self.casting_source(character, class) {
            Some((base, subclass)) => subclass.unwrap_or(base).spell_list_slug().to_string(),
            None => class.to_string(),
        };

        let prepared: BTreeSet<String> = spells.iter().cloned().collect();
        let mut leveled = 0;
        for slug in &prepared {
            let spell = self
                .catalog
                .get_spell(slug)
                .map_err(|_| EngineError::validation(format!("Unknown spell: {slug}")))?;
            if !spell.on_list(&list) {
                return Err(EngineError::validation(format!(
                    "{} is not on the {list} spell list",
                    spell.name
                )));
            }
            if !spell.is_cantrip() {
                leveled += 1;
            }
        }
        if leveled > max_prepared {
            return Err(EngineError::state(format!(
                "{leveled} spells prepared, limit is {max_prepared}"
            )));
        }

        let mut next = character.clone();
        let listed: Vec<String> = prepared.iter().cloned().collect();
        next.prepared_spells = prepared;
        Ok(Change::new(
            next,
            EventPayload::PreparedSpellsUpdated {
                class: class.to_string(),
                prepared: listed,
                max_prepared,
            },
        ))
    }
}

fn check_slot_level(level: u8) -> Result<(), EngineError> {
    if (1..=9).contains(&level) {
        Ok(())
    } else {
        Err(EngineError::validation(format!(
            "Spell slot level must be 1-9, got {level}"
        )))
    }
}
