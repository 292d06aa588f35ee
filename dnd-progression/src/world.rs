//! Character snapshot types.
//!
//! A [`Character`] is a plain serializable record. Engine operations take a
//! `&Character` and return a new one; nothing in this module enforces the
//! rules, it only stores their results. Ordered collections are used
//! throughout so a snapshot serializes identically every time.

use crate::catalog::{ResourceTemplate, SlotRecovery};
use crate::formula;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Ability scores container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: u8) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    /// Raise an ability by `amount`, never past `cap`. Returns the new score.
    pub fn increase_capped(&mut self, ability: Ability, amount: u8, cap: u8) -> u8 {
        let current = self.get(ability);
        let raised = current.saturating_add(amount).min(cap.max(current));
        self.set(ability, raised);
        raised
    }

    pub fn modifier(&self, ability: Ability) -> i8 {
        let score = i16::from(self.get(ability));
        // Floor division so 9 -> -1, 7 -> -2. Any u8 score lands in -5..=122.
        (score - 10).div_euclid(2) as i8
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Spellcasting State
// ============================================================================

/// Capacity and remaining uses for one spell slot level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotState {
    pub max: u8,
    pub remaining: u8,
}

impl SlotState {
    pub fn full(max: u8) -> Self {
        Self {
            max,
            remaining: max,
        }
    }

    pub fn used(&self) -> u8 {
        self.max.saturating_sub(self.remaining)
    }
}

/// Warlock Pact Magic slots: all of one level, recovered on a short rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PactSlots {
    pub slot_level: u8,
    pub max: u8,
    pub remaining: u8,
}

/// Which slot pool an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPool {
    #[default]
    Standard,
    Pact,
}

/// All spell slots held by a character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellSlots {
    /// Standard slots keyed by slot level (1-9).
    pub standard: BTreeMap<u8, SlotState>,
    pub pact: Option<PactSlots>,
}

impl SpellSlots {
    pub fn is_empty(&self) -> bool {
        self.standard.values().all(|s| s.max == 0) && self.pact.map_or(true, |p| p.max == 0)
    }

    pub fn restore_all(&mut self) {
        for slot in self.standard.values_mut() {
            slot.remaining = slot.max;
        }
        if let Some(pact) = self.pact.as_mut() {
            pact.remaining = pact.max;
        }
    }
}

/// The spell currently being concentrated on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concentration {
    pub spell: String,
    pub started_at: DateTime<Utc>,
}

// ============================================================================
// Classes, Features and Resources
// ============================================================================

/// Subclass picked for one class, with any choice the subclass required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubclassChoice {
    pub subclass: String,
    #[serde(default)]
    pub terrain: Option<String>,
    #[serde(default)]
    pub bonus_cantrip: Option<String>,
}

/// Where a granted feature came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureSource {
    Class { class: String },
    Subclass { class: String, subclass: String },
    Feat { feat: String },
}

/// A feature recorded on the character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedFeature {
    pub slug: String,
    pub name: String,
    pub source: FeatureSource,
    /// Character level at which the feature was granted.
    pub level: u8,
    /// Option picked for the feature (e.g. a fighting style).
    #[serde(default)]
    pub choice: Option<String>,
    #[serde(default)]
    pub short_rest_recovery: Option<SlotRecovery>,
}

impl GrantedFeature {
    /// Class whose level drives this feature's formulas, if any.
    pub fn class(&self) -> Option<&str> {
        match &self.source {
            FeatureSource::Class { class } | FeatureSource::Subclass { class, .. } => Some(class),
            FeatureSource::Feat { .. } => None,
        }
    }
}

/// When a resource pool refills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RechargePolicy {
    ShortRest,
    LongRest,
    /// Only refilled by a long rest's full restore.
    Never,
}

/// A named, limited-use class resource (rage, ki, channel divinity...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    pub name: String,
    pub current: i32,
    pub max: i32,
    /// Formula recomputed when the level that drives it changes.
    #[serde(default)]
    pub max_formula: Option<String>,
    pub recharge: RechargePolicy,
    /// Class whose level feeds the formula; total level when absent.
    #[serde(default)]
    pub class: Option<String>,
}

impl ResourcePool {
    pub fn from_template(template: &ResourceTemplate, class: Option<String>, max: i32) -> Self {
        Self {
            name: template.name.clone(),
            current: max,
            max,
            max_formula: Some(template.max.clone()),
            recharge: template.recharge,
            class,
        }
    }
}

/// What was chosen for one ability-score-improvement opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AsiRecordChoice {
    Asi { increases: BTreeMap<Ability, u8> },
    Feat { feat: String },
}

/// History entry for an ASI/feat pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsiRecord {
    pub level: u8,
    pub class: String,
    pub choice: AsiRecordChoice,
}

/// Proficiencies gained through progression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proficiencies {
    pub skills: BTreeSet<String>,
    pub expertise: BTreeSet<String>,
    pub languages: BTreeSet<String>,
    pub saving_throws: BTreeSet<Ability>,
    /// Armor categories beyond those granted by held classes.
    #[serde(default)]
    pub armor: BTreeSet<String>,
}

/// Flat numeric bonuses granted by feats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatBonuses {
    pub initiative: i32,
    pub armor_class: i32,
    pub speed: i32,
    /// Extra max HP per character level, applied retroactively when gained.
    pub hp_per_level: i32,
}

// ============================================================================
// Conditions, Custom Rules, Inventory, Currency
// ============================================================================

/// A condition applied to the character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionEntry {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    pub applied_at: DateTime<Utc>,
}

/// A table-specific rule attached to one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRuleEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub value: Option<i32>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// One line of inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLine {
    #[serde(default)]
    pub slug: Option<String>,
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

impl InventoryLine {
    /// Items match by slug when both sides have one, otherwise by name.
    pub fn matches(&self, slug: Option<&str>, name: &str) -> bool {
        match (self.slug.as_deref(), slug) {
            (Some(mine), Some(theirs)) => mine == theirs,
            (_, Some(theirs)) => self.name == name || self.name == theirs,
            _ => self.name == name,
        }
    }
}

/// Coin denominations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Denomination {
    Cp,
    Sp,
    Ep,
    Gp,
    Pp,
}

impl Denomination {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Denomination::Cp => "cp",
            Denomination::Sp => "sp",
            Denomination::Ep => "ep",
            Denomination::Gp => "gp",
            Denomination::Pp => "pp",
        }
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Coins by denomination. Every amount is non-negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub cp: u64,
    pub sp: u64,
    pub ep: u64,
    pub gp: u64,
    pub pp: u64,
}

impl Currency {
    pub fn get(&self, denomination: Denomination) -> u64 {
        match denomination {
            Denomination::Cp => self.cp,
            Denomination::Sp => self.sp,
            Denomination::Ep => self.ep,
            Denomination::Gp => self.gp,
            Denomination::Pp => self.pp,
        }
    }

    pub fn get_mut(&mut self, denomination: Denomination) -> &mut u64 {
        match denomination {
            Denomination::Cp => &mut self.cp,
            Denomination::Sp => &mut self.sp,
            Denomination::Ep => &mut self.ep,
            Denomination::Gp => &mut self.gp,
            Denomination::Pp => &mut self.pp,
        }
    }
}

// ============================================================================
// Character
// ============================================================================

/// Complete character snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    /// Rule system this character is played under.
    pub setting_id: String,
    #[serde(default)]
    pub race: Option<String>,

    // Progression
    pub level: u8,
    pub experience: u32,
    pub class_slug: String,
    /// Levels per class. Empty for a character that never multiclassed.
    #[serde(default)]
    pub class_levels: BTreeMap<String, u8>,
    #[serde(default)]
    pub subclasses: BTreeMap<String, SubclassChoice>,
    #[serde(default)]
    pub features: Vec<GrantedFeature>,
    #[serde(default)]
    pub asi_choices: Vec<AsiRecord>,
    pub abilities: AbilityScores,
    #[serde(default)]
    pub proficiencies: Proficiencies,
    #[serde(default)]
    pub bonuses: FlatBonuses,

    // Health
    pub current_hp: i32,
    pub max_hp: i32,
    pub temp_hp: i32,

    // Spellcasting
    #[serde(default)]
    pub spell_slots: SpellSlots,
    #[serde(default)]
    pub known_spells: BTreeSet<String>,
    #[serde(default)]
    pub prepared_spells: BTreeSet<String>,
    #[serde(default)]
    pub always_prepared_spells: BTreeSet<String>,
    #[serde(default)]
    pub concentration: Option<Concentration>,
    /// Features whose short-rest slot recovery was used since the last long rest.
    #[serde(default)]
    pub short_rest_recovery_used: Vec<String>,

    // Resources
    #[serde(default)]
    pub class_resources: BTreeMap<String, ResourcePool>,

    // Table state
    #[serde(default)]
    pub conditions: Vec<ConditionEntry>,
    #[serde(default)]
    pub custom_rules: Vec<CustomRuleEntry>,
    #[serde(default)]
    pub inventory: Vec<InventoryLine>,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub inspiration: bool,
    pub is_active: bool,
    pub is_alive: bool,
}

impl Character {
    /// A fresh level 1 character of the given class.
    pub fn new(name: impl Into<String>, class_slug: impl Into<String>, max_hp: i32) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            setting_id: "dnd5e".to_string(),
            race: None,
            level: 1,
            experience: 0,
            class_slug: class_slug.into(),
            class_levels: BTreeMap::new(),
            subclasses: BTreeMap::new(),
            features: Vec::new(),
            asi_choices: Vec::new(),
            abilities: AbilityScores::default(),
            proficiencies: Proficiencies::default(),
            bonuses: FlatBonuses::default(),
            current_hp: max_hp,
            max_hp,
            temp_hp: 0,
            spell_slots: SpellSlots::default(),
            known_spells: BTreeSet::new(),
            prepared_spells: BTreeSet::new(),
            always_prepared_spells: BTreeSet::new(),
            concentration: None,
            short_rest_recovery_used: Vec::new(),
            class_resources: BTreeMap::new(),
            conditions: Vec::new(),
            custom_rules: Vec::new(),
            inventory: Vec::new(),
            currency: Currency::default(),
            inspiration: false,
            is_active: true,
            is_alive: true,
        }
    }

    /// Derived, never stored.
    pub fn proficiency_bonus(&self) -> i8 {
        formula::proficiency_bonus(self.level)
    }

    /// Levels held in each class, treating an empty `class_levels` as all
    /// levels in the primary class.
    pub fn held_classes(&self) -> BTreeMap<String, u8> {
        if self.class_levels.is_empty() {
            BTreeMap::from([(self.class_slug.clone(), self.level)])
        } else {
            self.class_levels
                .iter()
                .filter(|(_, &lvl)| lvl > 0)
                .map(|(class, &lvl)| (class.clone(), lvl))
                .collect()
        }
    }

    pub fn class_level(&self, class: &str) -> u8 {
        self.held_classes().get(class).copied().unwrap_or(0)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_level(class) > 0
    }

    pub fn has_feature(&self, slug: &str) -> bool {
        self.features.iter().any(|f| f.slug == slug)
    }

    /// Every broken snapshot invariant, described. Empty when the snapshot is sound.
    pub fn invariant_violations(&self, max_level: u8) -> Vec<String> {
        let mut problems = Vec::new();

        if self.current_hp < 0 || self.current_hp > self.max_hp {
            problems.push(format!(
                "current HP {} outside 0..={}",
                self.current_hp, self.max_hp
            ));
        }
        if self.temp_hp < 0 {
            problems.push(format!("temporary HP {} is negative", self.temp_hp));
        }
        for (level, slot) in &self.spell_slots.standard {
            if slot.remaining > slot.max {
                problems.push(format!(
                    "level {level} slots: {} remaining of {}",
                    slot.remaining, slot.max
                ));
            }
        }
        if let Some(pact) = self.spell_slots.pact {
            if pact.remaining > pact.max {
                problems.push(format!(
                    "pact slots: {} remaining of {}",
                    pact.remaining, pact.max
                ));
            }
        }
        if self.level < 1 || self.level > max_level {
            problems.push(format!("level {} outside 1..={max_level}", self.level));
        }
        if !self.class_levels.is_empty() {
            let total: u32 = self.class_levels.values().map(|&l| l as u32).sum();
            if total != self.level as u32 {
                problems.push(format!(
                    "class levels sum to {total}, character level is {}",
                    self.level
                ));
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ability_modifier() {
        let scores = AbilityScores::new(16, 14, 12, 10, 8, 6);
        assert_eq!(scores.modifier(Ability::Strength), 3);
        assert_eq!(scores.modifier(Ability::Dexterity), 2);
        assert_eq!(scores.modifier(Ability::Constitution), 1);
        assert_eq!(scores.modifier(Ability::Intelligence), 0);
        assert_eq!(scores.modifier(Ability::Wisdom), -1);
        assert_eq!(scores.modifier(Ability::Charisma), -2);

        let odd_scores = AbilityScores::new(9, 7, 5, 11, 13, 15);
        assert_eq!(odd_scores.modifier(Ability::Strength), -1);
        assert_eq!(odd_scores.modifier(Ability::Dexterity), -2);
        assert_eq!(odd_scores.modifier(Ability::Constitution), -3);
        assert_eq!(odd_scores.modifier(Ability::Charisma), 2);
    }

    #[test]
    fn test_ability_modifier_above_127() {
        let scores = AbilityScores::new(128, 200, 255, 0, 1, 130);
        assert_eq!(scores.modifier(Ability::Strength), 59);
        assert_eq!(scores.modifier(Ability::Dexterity), 95);
        assert_eq!(scores.modifier(Ability::Constitution), 122);
        assert_eq!(scores.modifier(Ability::Intelligence), -5);
        assert_eq!(scores.modifier(Ability::Wisdom), -5);
        assert_eq!(scores.modifier(Ability::Charisma), 60);
    }

    #[test]
    fn test_increase_capped() {
        let mut scores = AbilityScores::new(19, 10, 10, 10, 10, 10);
        assert_eq!(scores.increase_capped(Ability::Strength, 2, 20), 20);
        assert_eq!(scores.increase_capped(Ability::Dexterity, 1, 20), 11);
    }

    #[test]
    fn test_held_classes_defaults_to_primary() {
        let mut character = Character::new("Test", "wizard", 8);
        character.level = 4;
        assert_eq!(character.class_level("wizard"), 4);
        assert_eq!(character.class_level("cleric"), 0);

        character.level = 5;
        character.class_levels = BTreeMap::from([("wizard".to_string(), 4), ("cleric".to_string(), 1)]);
        assert_eq!(character.class_level("cleric"), 1);
        assert!(character.invariant_violations(20).is_empty());
    }

    #[test]
    fn test_invariant_violations() {
        let mut character = Character::new("Test", "fighter", 10);
        character.current_hp = 12;
        character.spell_slots.standard.insert(1, SlotState { max: 2, remaining: 3 });
        character.class_levels.insert("fighter".to_string(), 2);
        let problems = character.invariant_violations(20);
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn test_inventory_matching() {
        let line = InventoryLine {
            slug: Some("rope-hempen".to_string()),
            name: "Hempen Rope".to_string(),
            quantity: 1,
            notes: None,
        };
        assert!(line.matches(Some("rope-hempen"), "Rope"));
        assert!(!line.matches(Some("rope-silk"), "Hempen Rope"));
        assert!(line.matches(None, "Hempen Rope"));
    }

    #[test]
    fn test_snapshot_round_trip_is_stable() {
        let mut character = Character::new("Round Trip", "cleric", 9);
        character.known_spells.insert("sacred-flame".to_string());
        character.conditions.push(ConditionEntry {
            key: "poisoned".to_string(),
            name: "Poisoned".to_string(),
            source: Some("Spider".to_string()),
            duration: None,
            applied_at: Utc::now(),
        });

        let first = serde_json::to_string(&character).unwrap();
        let back: Character = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&back).unwrap();
        assert_eq!(first, second);
        assert_eq!(back, character);
    }
}
