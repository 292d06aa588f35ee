//! Lookup tables the engine reads instead of hard-coding.
//!
//! [`RuleTables::standard`] carries the 5e values. Tests and alternate rule
//! sets build their own and hand them to the engine.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Multiclass spellcaster table: slots per spell level (1st..9th) for
/// effective caster levels 1 through 20.
pub const STANDARD_SLOT_ROWS: [[u8; 9]; 20] = [
    [2, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 1, 0, 0, 0, 0, 0],
    [4, 3, 3, 2, 0, 0, 0, 0, 0],
    [4, 3, 3, 3, 1, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 2, 1, 1],
];

/// How a class contributes to the combined caster level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasterProgression {
    Full,
    Half,
    /// Counts only with a spellcasting subclass.
    Third,
    /// Pact Magic, tracked in its own pool.
    Pact,
    None,
}

impl CasterProgression {
    /// Contribution of `class_level` levels to the combined caster level.
    pub fn effective_levels(&self, class_level: u8) -> u8 {
        match self {
            CasterProgression::Full => class_level,
            CasterProgression::Half => class_level / 2,
            CasterProgression::Third => class_level / 3,
            CasterProgression::Pact | CasterProgression::None => 0,
        }
    }
}

/// Whether a class picks its spells daily or learns a fixed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasterType {
    Known,
    Prepared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTables {
    pub caster_progression: BTreeMap<String, CasterProgression>,
    /// Slot rows indexed by effective caster level minus one.
    pub multiclass_slots: Vec<[u8; 9]>,
    /// Warlock level -> number of pact slots; the highest threshold met applies.
    pub pact_slot_thresholds: BTreeMap<u8, u8>,
    pub pact_max_slot_level: u8,
    pub prepared_casters: BTreeSet<String>,
    /// Classes whose preparation limit uses half their class level.
    pub half_level_preparers: BTreeSet<String>,
    /// Subclasses that make a third-caster class count toward slots.
    pub spellcasting_subclasses: BTreeSet<String>,
    pub default_asi_levels: BTreeSet<u8>,
    pub class_asi_levels: BTreeMap<String, BTreeSet<u8>>,
}

fn slugs(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl RuleTables {
    pub fn standard() -> Self {
        let caster_progression = [
            ("bard", CasterProgression::Full),
            ("cleric", CasterProgression::Full),
            ("druid", CasterProgression::Full),
            ("sorcerer", CasterProgression::Full),
            ("wizard", CasterProgression::Full),
            ("paladin", CasterProgression::Half),
            ("ranger", CasterProgression::Half),
            ("fighter", CasterProgression::Third),
            ("rogue", CasterProgression::Third),
            ("warlock", CasterProgression::Pact),
            ("barbarian", CasterProgression::None),
            ("monk", CasterProgression::None),
        ]
        .into_iter()
        .map(|(slug, progression)| (slug.to_string(), progression))
        .collect();

        Self {
            caster_progression,
            multiclass_slots: STANDARD_SLOT_ROWS.to_vec(),
            pact_slot_thresholds: BTreeMap::from([(1, 1), (2, 2), (11, 3), (17, 4)]),
            pact_max_slot_level: 5,
            prepared_casters: slugs(&["cleric", "druid", "paladin", "wizard"]),
            half_level_preparers: slugs(&["paladin", "ranger"]),
            spellcasting_subclasses: slugs(&["eldritch-knight", "arcane-trickster"]),
            default_asi_levels: BTreeSet::from([4, 8, 12, 16, 19]),
            class_asi_levels: BTreeMap::from([
                ("fighter".to_string(), BTreeSet::from([4, 6, 8, 12, 14, 16, 19])),
                ("rogue".to_string(), BTreeSet::from([4, 8, 10, 12, 16, 19])),
            ]),
        }
    }

    pub fn progression(&self, class: &str) -> CasterProgression {
        self.caster_progression
            .get(class)
            .copied()
            .unwrap_or(CasterProgression::None)
    }

    pub fn caster_type(&self, class: &str) -> CasterType {
        if self.prepared_casters.contains(class) {
            CasterType::Prepared
        } else {
            CasterType::Known
        }
    }

    /// Slots for an effective caster level; all zero outside the table.
    pub fn slot_row(&self, effective_level: u8) -> [u8; 9] {
        if effective_level == 0 {
            return [0; 9];
        }
        let index = (effective_level as usize - 1).min(self.multiclass_slots.len().saturating_sub(1));
        self.multiclass_slots.get(index).copied().unwrap_or([0; 9])
    }

    pub fn pact_slot_count(&self, warlock_level: u8) -> u8 {
        self.pact_slot_thresholds
            .range(..=warlock_level)
            .next_back()
            .map(|(_, &count)| count)
            .unwrap_or(0)
    }

    pub fn pact_slot_level(&self, warlock_level: u8) -> u8 {
        warlock_level.div_ceil(2).min(self.pact_max_slot_level)
    }

    /// Whether reaching `class_level` in `class` grants an ASI.
    pub fn is_asi_level(&self, class: &str, class_level: u8) -> bool {
        self.class_asi_levels
            .get(class)
            .unwrap_or(&self.default_asi_levels)
            .contains(&class_level)
    }
}

impl Default for RuleTables {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asi_levels_by_class() {
        let tables = RuleTables::standard();
        assert!(tables.is_asi_level("wizard", 4));
        assert!(!tables.is_asi_level("wizard", 6));
        assert!(tables.is_asi_level("fighter", 6));
        assert!(tables.is_asi_level("fighter", 14));
        assert!(tables.is_asi_level("rogue", 10));
        assert!(!tables.is_asi_level("rogue", 14));
    }

    #[test]
    fn test_pact_thresholds() {
        let tables = RuleTables::standard();
        assert_eq!(tables.pact_slot_count(0), 0);
        assert_eq!(tables.pact_slot_count(1), 1);
        assert_eq!(tables.pact_slot_count(10), 2);
        assert_eq!(tables.pact_slot_count(11), 3);
        assert_eq!(tables.pact_slot_count(20), 4);
        assert_eq!(tables.pact_slot_level(1), 1);
        assert_eq!(tables.pact_slot_level(5), 3);
        assert_eq!(tables.pact_slot_level(9), 5);
        assert_eq!(tables.pact_slot_level(20), 5);
    }

    #[test]
    fn test_slot_rows() {
        let tables = RuleTables::standard();
        assert_eq!(tables.slot_row(0), [0; 9]);
        assert_eq!(tables.slot_row(4)[..2], [4, 3]);
        assert_eq!(tables.slot_row(20)[8], 1);
    }

    #[test]
    fn test_progression_contributions() {
        assert_eq!(CasterProgression::Half.effective_levels(5), 2);
        assert_eq!(CasterProgression::Third.effective_levels(8), 2);
        assert_eq!(CasterProgression::Pact.effective_levels(8), 0);
    }
}
