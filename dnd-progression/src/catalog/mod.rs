//! Read-only rule catalog: classes, subclasses, feats, spells and rule systems.
//!
//! A catalog is built once, either from the built-in SRD data set
//! ([`RuleCatalog::srd`]) or from a JSON document, validated, and then only
//! read. Lookups are by slug and never mutate anything.

mod spells;
mod srd;

use crate::error::{CatalogError, EngineError};
use crate::formula::{FormulaEvaluator, FormulaVars};
use crate::world::{Ability, RechargePolicy};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ============================================================================
// Class Definitions
// ============================================================================

/// A limited-use resource granted by a feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    pub name: String,
    /// Formula for the pool's maximum.
    pub max: String,
    pub recharge: RechargePolicy,
}

/// Marks a feature that trades a slot-level budget for recovered slots once
/// per long rest (Arcane Recovery, Natural Recovery).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecovery {
    pub budget_formula: String,
    /// Highest slot level that may be recovered.
    pub max_slot_level: u8,
}

/// A class or subclass feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDefinition {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resource: Option<ResourceTemplate>,
    #[serde(default)]
    pub short_rest_recovery: Option<SlotRecovery>,
    /// Options the player must pick from when the feature is granted.
    #[serde(default)]
    pub options: Vec<String>,
}

impl FeatureDefinition {
    pub fn new(slug: &str, name: &str, description: &str) -> Self {
        Self {
            slug: slug.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            resource: None,
            short_rest_recovery: None,
            options: Vec::new(),
        }
    }

    pub fn with_resource(mut self, name: &str, max: &str, recharge: RechargePolicy) -> Self {
        self.resource = Some(ResourceTemplate {
            name: name.to_string(),
            max: max.to_string(),
            recharge,
        });
        self
    }

    pub fn with_slot_recovery(mut self, budget_formula: &str, max_slot_level: u8) -> Self {
        self.short_rest_recovery = Some(SlotRecovery {
            budget_formula: budget_formula.to_string(),
            max_slot_level,
        });
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }
}

/// Bonus spells a subclass always has prepared, unlocked by class level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CircleSpells {
    /// Same list for everyone with the subclass.
    Fixed { tiers: BTreeMap<u8, Vec<String>> },
    /// List depends on a terrain picked with the subclass.
    ByTerrain {
        terrains: BTreeMap<String, BTreeMap<u8, Vec<String>>>,
    },
}

impl CircleSpells {
    /// Every spell unlocked at or below `class_level`.
    pub fn unlocked(&self, class_level: u8, terrain: Option<&str>) -> Vec<String> {
        let tiers = match self {
            CircleSpells::Fixed { tiers } => Some(tiers),
            CircleSpells::ByTerrain { terrains } => terrain.and_then(|t| terrains.get(t)),
        };
        tiers
            .map(|tiers| {
                tiers
                    .range(..=class_level)
                    .flat_map(|(_, spells)| spells.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn terrains(&self) -> Vec<String> {
        match self {
            CircleSpells::Fixed { .. } => Vec::new(),
            CircleSpells::ByTerrain { terrains } => terrains.keys().cloned().collect(),
        }
    }

    fn all_spells(&self) -> Vec<&String> {
        match self {
            CircleSpells::Fixed { tiers } => tiers.values().flatten().collect(),
            CircleSpells::ByTerrain { terrains } => {
                terrains.values().flat_map(|t| t.values().flatten()).collect()
            }
        }
    }
}

/// A base class or, when `parent_slug` is set, a subclass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDefinition {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub hit_die: u8,
    #[serde(default)]
    pub spellcasting_ability: Option<Ability>,
    #[serde(default)]
    pub is_spellcaster: bool,
    #[serde(default)]
    pub parent_slug: Option<String>,
    #[serde(default)]
    pub subclass_level: Option<u8>,
    /// Features by level in this class.
    #[serde(default)]
    pub level_features: BTreeMap<u8, Vec<FeatureDefinition>>,
    /// Single-class slot table: class level -> slots for spell levels 1..=9.
    /// Empty means the shared multiclass table applies.
    #[serde(default)]
    pub spell_slots: BTreeMap<u8, Vec<u8>>,
    /// Cantrips known by class level (index 0 is level 1).
    #[serde(default)]
    pub cantrips_known: Vec<u8>,
    /// Spells known by class level, for known casters.
    #[serde(default)]
    pub spells_known: Vec<u8>,
    /// Class whose spell list this class casts from; defaults to itself.
    #[serde(default)]
    pub spell_list: Option<String>,
    #[serde(default)]
    pub circle_spells: Option<CircleSpells>,
    /// Subclass asks for one cantrip from the parent's list.
    #[serde(default)]
    pub bonus_cantrip: bool,
    #[serde(default)]
    pub saving_throws: Vec<Ability>,
    #[serde(default)]
    pub armor_proficiencies: Vec<String>,
}

impl ClassDefinition {
    pub fn is_subclass(&self) -> bool {
        self.parent_slug.is_some()
    }

    pub fn features_at(&self, class_level: u8) -> &[FeatureDefinition] {
        self.level_features
            .get(&class_level)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn spell_list_slug(&self) -> &str {
        self.spell_list.as_deref().unwrap_or(self.slug.as_str())
    }

    pub fn requires_terrain(&self) -> bool {
        matches!(self.circle_spells, Some(CircleSpells::ByTerrain { .. }))
    }

    pub fn cantrips_known_at(&self, class_level: u8) -> Option<u8> {
        table_at(&self.cantrips_known, class_level)
    }

    pub fn spells_known_at(&self, class_level: u8) -> Option<u8> {
        table_at(&self.spells_known, class_level)
    }
}

fn table_at(table: &[u8], class_level: u8) -> Option<u8> {
    if table.is_empty() || class_level == 0 {
        return None;
    }
    let index = (class_level as usize - 1).min(table.len() - 1);
    Some(table[index])
}

// ============================================================================
// Feats
// ============================================================================

/// A single prerequisite. `AnyOf` is satisfied when any alternative is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Prerequisite {
    Ability { ability: Ability, minimum: u8 },
    Proficiency { proficiency: String },
    Spellcasting,
    Race { races: Vec<String> },
    AnyOf { options: Vec<Prerequisite> },
}

impl Prerequisite {
    pub fn describe(&self) -> String {
        match self {
            Prerequisite::Ability { ability, minimum } => {
                format!("{} {}", ability.abbreviation(), minimum)
            }
            Prerequisite::Proficiency { proficiency } => format!("proficiency with {proficiency}"),
            Prerequisite::Spellcasting => "ability to cast at least one spell".to_string(),
            Prerequisite::Race { races } => format!("race: {}", races.join(" or ")),
            Prerequisite::AnyOf { options } => options
                .iter()
                .map(Prerequisite::describe)
                .collect::<Vec<_>>()
                .join(" or "),
        }
    }
}

/// A typed benefit granted by a feat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatBenefit {
    Initiative { bonus: i32 },
    ArmorClass { bonus: i32 },
    Speed { bonus: i32 },
    /// Extra max HP per character level, counted for past levels too.
    HpPerLevel { bonus: i32 },
    Resource { resource: ResourceTemplate },
    /// Raise one ability the player picks. Empty `options` means any.
    AbilityIncrease {
        #[serde(default)]
        options: Vec<Ability>,
        amount: u8,
    },
    /// Saving throw proficiency in the ability picked for `AbilityIncrease`.
    SavingThrowProficiency,
    Cantrips { count: u8 },
    Spells { count: u8, max_level: u8 },
    Skills { count: u8 },
    Languages { count: u8 },
    Expertise { count: u8 },
    ArmorProficiency { armor: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatDefinition {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    #[serde(default)]
    pub benefits: Vec<FeatBenefit>,
    #[serde(default)]
    pub repeatable: bool,
}

// ============================================================================
// Spells
// ============================================================================

/// Schools of magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpellSchool {
    Abjuration,
    Conjuration,
    Divination,
    Enchantment,
    Evocation,
    Illusion,
    Necromancy,
    Transmutation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellDefinition {
    pub slug: String,
    pub name: String,
    /// 0 for cantrips.
    pub level: u8,
    pub school: SpellSchool,
    #[serde(default)]
    pub concentration: bool,
    #[serde(default)]
    pub ritual: bool,
    /// Class spell lists this spell appears on.
    #[serde(default)]
    pub classes: BTreeSet<String>,
}

impl SpellDefinition {
    pub fn is_cantrip(&self) -> bool {
        self.level == 0
    }

    pub fn on_list(&self, list: &str) -> bool {
        self.classes.contains(list)
    }
}

// ============================================================================
// Rule Systems
// ============================================================================

/// A minimum score in one ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityMinimum {
    pub ability: Ability,
    pub minimum: u8,
}

/// Multiclass prerequisite: a flat minimum or an OR-group of minimums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbilityRequirement {
    Minimum { ability: Ability, minimum: u8 },
    AnyOf { options: Vec<AbilityMinimum> },
}

impl AbilityRequirement {
    pub fn is_met(&self, scores: &crate::world::AbilityScores) -> bool {
        match self {
            AbilityRequirement::Minimum { ability, minimum } => scores.get(*ability) >= *minimum,
            AbilityRequirement::AnyOf { options } => {
                options.iter().any(|o| scores.get(o.ability) >= o.minimum)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            AbilityRequirement::Minimum { ability, minimum } => {
                format!("{} {}", ability.abbreviation(), minimum)
            }
            AbilityRequirement::AnyOf { options } => options
                .iter()
                .map(|o| format!("{} {}", o.ability.abbreviation(), o.minimum))
                .collect::<Vec<_>>()
                .join(" or "),
        }
    }
}

/// Level range, XP table and multiclass rules for one setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSystem {
    pub id: String,
    pub name: String,
    pub min_level: u8,
    pub max_level: u8,
    /// XP needed to reach each level; index 0 is level 1.
    pub xp_thresholds: Vec<u32>,
    #[serde(default)]
    pub allow_multiclassing: bool,
    #[serde(default)]
    pub multiclass_prerequisites: BTreeMap<String, Vec<AbilityRequirement>>,
    /// Named formulas for derived values (`proficiency_bonus`).
    #[serde(default)]
    pub formulas: BTreeMap<String, String>,
    #[serde(default = "default_ability_cap")]
    pub ability_cap: u8,
    #[serde(default = "default_asi_points")]
    pub asi_points: u8,
}

fn default_ability_cap() -> u8 {
    20
}

fn default_asi_points() -> u8 {
    2
}

impl RuleSystem {
    /// XP required to reach `level`, if the table covers it.
    pub fn xp_for_level(&self, level: u8) -> Option<u32> {
        if level == 0 {
            return None;
        }
        self.xp_thresholds.get(level as usize - 1).copied()
    }

    pub fn proficiency_bonus(&self, level: u8) -> Result<i32, EngineError> {
        match self.formulas.get("proficiency_bonus") {
            Some(formula) => {
                let vars = FormulaVars::new(level as i32, crate::formula::proficiency_bonus(level) as i32);
                Ok(FormulaEvaluator::new().evaluate(formula, vars)?)
            }
            None => Ok(crate::formula::proficiency_bonus(level) as i32),
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Serialized shape of a catalog document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogData {
    #[serde(default)]
    pub classes: Vec<ClassDefinition>,
    #[serde(default)]
    pub feats: Vec<FeatDefinition>,
    #[serde(default)]
    pub spells: Vec<SpellDefinition>,
    #[serde(default)]
    pub rule_systems: Vec<RuleSystem>,
}

/// Immutable lookup of rule definitions by slug.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    classes: BTreeMap<String, ClassDefinition>,
    feats: BTreeMap<String, FeatDefinition>,
    spells: BTreeMap<String, SpellDefinition>,
    rule_systems: BTreeMap<String, RuleSystem>,
}

impl RuleCatalog {
    /// Build and validate a catalog.
    pub fn from_data(data: CatalogData) -> Result<Self, CatalogError> {
        let classes = index(data.classes, "class", |c| &c.slug)?;
        let feats = index(data.feats, "feat", |f| &f.slug)?;
        let spells = index(data.spells, "spell", |s| &s.slug)?;
        let rule_systems = index(data.rule_systems, "rule system", |r| &r.id)?;

        let catalog = Self {
            classes,
            feats,
            spells,
            rule_systems,
        };
        catalog.validate()?;
        tracing::debug!(
            classes = catalog.classes.len(),
            feats = catalog.feats.len(),
            spells = catalog.spells.len(),
            "Rule catalog ready"
        );
        Ok(catalog)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let data: CatalogData = serde_json::from_str(json)?;
        Self::from_data(data)
    }

    /// Load a catalog from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        tracing::info!(path = %path.as_ref().display(), "Loading rule catalog");
        Self::from_json_str(&json)
    }

    /// The built-in SRD data set.
    pub fn srd() -> Self {
        Self {
            classes: srd::classes()
                .into_iter()
                .map(|c| (c.slug.clone(), c))
                .collect(),
            feats: srd::feats().into_iter().map(|f| (f.slug.clone(), f)).collect(),
            spells: spells::spells()
                .into_iter()
                .map(|s| (s.slug.clone(), s))
                .collect(),
            rule_systems: srd::rule_systems()
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect(),
        }
    }

    /// Everything in the catalog, in document form.
    pub fn to_data(&self) -> CatalogData {
        CatalogData {
            classes: self.classes.values().cloned().collect(),
            feats: self.feats.values().cloned().collect(),
            spells: self.spells.values().cloned().collect(),
            rule_systems: self.rule_systems.values().cloned().collect(),
        }
    }

    pub fn get_class(&self, slug: &str) -> Result<&ClassDefinition, EngineError> {
        self.classes
            .get(slug)
            .ok_or_else(|| EngineError::not_found("Class", slug))
    }

    pub fn get_feat(&self, slug: &str) -> Result<&FeatDefinition, EngineError> {
        self.feats
            .get(slug)
            .ok_or_else(|| EngineError::not_found("Feat", slug))
    }

    pub fn get_spell(&self, slug: &str) -> Result<&SpellDefinition, EngineError> {
        self.spells
            .get(slug)
            .ok_or_else(|| EngineError::not_found("Spell", slug))
    }

    pub fn get_rule_system(&self, setting_id: &str) -> Result<&RuleSystem, EngineError> {
        self.rule_systems
            .get(setting_id)
            .ok_or_else(|| EngineError::not_found("Rule system", setting_id))
    }

    pub fn base_classes(&self) -> impl Iterator<Item = &ClassDefinition> {
        self.classes.values().filter(|c| !c.is_subclass())
    }

    pub fn subclasses_of<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a ClassDefinition> {
        self.classes
            .values()
            .filter(move |c| c.parent_slug.as_deref() == Some(class))
    }

    pub fn feats(&self) -> impl Iterator<Item = &FeatDefinition> {
        self.feats.values()
    }

    pub fn spells(&self) -> impl Iterator<Item = &SpellDefinition> {
        self.spells.values()
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.base_classes().next().is_none() {
            return Err(CatalogError::Incomplete("no base classes".to_string()));
        }
        if self.rule_systems.is_empty() {
            return Err(CatalogError::Incomplete("no rule systems".to_string()));
        }

        let evaluator = FormulaEvaluator::new();
        for class in self.classes.values() {
            if let Some(parent) = &class.parent_slug {
                match self.classes.get(parent) {
                    Some(p) if !p.is_subclass() => {}
                    _ => {
                        return Err(CatalogError::Incomplete(format!(
                            "subclass {} has unknown parent {}",
                            class.slug, parent
                        )))
                    }
                }
            } else if class.hit_die == 0 {
                return Err(CatalogError::Incomplete(format!(
                    "class {} has no hit die",
                    class.slug
                )));
            }

            if let Some(circle) = &class.circle_spells {
                for spell in circle.all_spells() {
                    if !self.spells.contains_key(spell) {
                        return Err(CatalogError::Incomplete(format!(
                            "{} grants unknown spell {}",
                            class.slug, spell
                        )));
                    }
                }
            }

            for feature in class.level_features.values().flatten() {
                let formulas = feature
                    .resource
                    .iter()
                    .map(|r| &r.max)
                    .chain(feature.short_rest_recovery.iter().map(|s| &s.budget_formula));
                for formula in formulas {
                    evaluator.validate(formula).map_err(|e| {
                        CatalogError::Incomplete(format!("feature {}: {}", feature.slug, e))
                    })?;
                }
            }
        }

        for feat in self.feats.values() {
            for benefit in &feat.benefits {
                if let FeatBenefit::Resource { resource } = benefit {
                    evaluator.validate(&resource.max).map_err(|e| {
                        CatalogError::Incomplete(format!("feat {}: {}", feat.slug, e))
                    })?;
                }
            }
        }

        for system in self.rule_systems.values() {
            if system.min_level < 1 || system.min_level > system.max_level {
                return Err(CatalogError::Incomplete(format!(
                    "rule system {} has level range {}..={}",
                    system.id, system.min_level, system.max_level
                )));
            }
            if system.xp_thresholds.len() < system.max_level as usize {
                return Err(CatalogError::Incomplete(format!(
                    "rule system {} XP table stops before level {}",
                    system.id, system.max_level
                )));
            }
        }
        Ok(())
    }
}

/// Whether `slug` names one of the standard skills.
pub fn is_skill(slug: &str) -> bool {
    srd::skills().contains(slug)
}

fn index<T>(
    items: Vec<T>,
    kind: &'static str,
    key: impl Fn(&T) -> &String,
) -> Result<BTreeMap<String, T>, CatalogError> {
    let mut map = BTreeMap::new();
    for item in items {
        let slug = key(&item).clone();
        if map.contains_key(&slug) {
            return Err(CatalogError::DuplicateSlug { kind, slug });
        }
        map.insert(slug, item);
    }
    Ok(map)
}
