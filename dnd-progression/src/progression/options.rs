use super::feats::unmet_prerequisites;
use super::{Eligibility, ProgressionEngine};
use crate::catalog::{ClassDefinition, FeatureDefinition};
use crate::error::EngineError;
use crate::multiclass::MulticlassCalculator;
use crate::world::{Ability, Character, FeatureSource};
use serde::{Deserialize, Serialize};

/// Hit point choices for the next level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpOptions {
    pub hit_die: u8,
    pub con_modifier: i8,
    /// `floor(die/2) + 1 + CON`, at least 1.
    pub average: i32,
    pub roll_min: i32,
    pub roll_max: i32,
}

impl HpOptions {
    pub fn new(hit_die: u8, con_modifier: i8) -> Self {
        let con = con_modifier as i32;
        let die = hit_die as i32;
        Self {
            hit_die,
            con_modifier,
            average: (die / 2 + 1 + con).max(1),
            roll_min: (1 + con).max(1),
            roll_max: (die + con).max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassOption {
    pub slug: String,
    pub name: String,
    pub hit_die: u8,
    pub already_held: bool,
    pub available: bool,
    /// Failed prerequisites, formatted "Wizard: INT 13".
    pub unmet: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubclassOption {
    pub slug: String,
    pub name: String,
    pub requires_terrain: bool,
    pub terrains: Vec<String>,
    pub requires_bonus_cantrip: bool,
    /// Cantrips on the parent class's list, offered when a bonus cantrip is required.
    pub bonus_cantrips: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureOption {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub source: FeatureSource,
    /// Non-empty when the player must pick one.
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatOption {
    pub slug: String,
    pub name: String,
    pub eligible: bool,
    pub unmet: Vec<String>,
}

/// Everything a player could pick for the next level in one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpOptions {
    pub eligibility: Eligibility,
    pub new_level: u8,
    pub class: String,
    pub new_class_level: u8,
    pub hp: HpOptions,
    pub multiclass_allowed: bool,
    pub classes: Vec<ClassOption>,
    pub asi_available: bool,
    pub asi_points: u8,
    pub ability_cap: u8,
    pub feats: Vec<FeatOption>,
    pub subclass_required: bool,
    pub subclass_options: Vec<SubclassOption>,
    pub features: Vec<FeatureOption>,
}

impl<'a> ProgressionEngine<'a> {
    /// Options for leveling in the character's primary class.
    pub fn level_up_options(&self, character: &Character) -> Result<LevelUpOptions, EngineError> {
        self.level_up_options_for(character, &character.class_slug)
    }

    /// Options for leveling in `class`, which may be a class not yet held.
    pub fn level_up_options_for(
        &self,
        character: &Character,
        class: &str,
    ) -> Result<LevelUpOptions, EngineError> {
        let rule_system = self.rule_system(character)?;
        let class_def = self.base_class(class)?;
        let new_class_level = character.class_level(class) + 1;
        let multiclass_allowed = self.multiclassing_allowed(rule_system);

        let calculator = MulticlassCalculator::new(self.catalog, self.tables);
        let mut classes = Vec::new();
        for candidate in self.catalog.base_classes() {
            let already_held = character.has_class(&candidate.slug);
            if !already_held && !multiclass_allowed {
                continue;
            }
            let check = calculator.can_multiclass_into(character, &candidate.slug, rule_system)?;
            classes.push(ClassOption {
                slug: candidate.slug.clone(),
                name: candidate.name.clone(),
                hit_die: candidate.hit_die,
                already_held,
                available: check.allowed,
                unmet: check.failed_prerequisites,
            });
        }

        let subclass_required = subclass_due(character, class_def, new_class_level);
        let subclass_options = if subclass_required {
            self.subclass_options(class_def)
        } else {
            Vec::new()
        };

        let feats = self
            .catalog
            .feats()
            .map(|feat| {
                let unmet = unmet_prerequisites(self.catalog, character, feat);
                FeatOption {
                    slug: feat.slug.clone(),
                    name: feat.name.clone(),
                    eligible: unmet.is_empty() && (feat.repeatable || !has_feat(character, &feat.slug)),
                    unmet,
                }
            })
            .collect();

        Ok(LevelUpOptions {
            eligibility: self.can_level_up(character, rule_system),
            new_level: character.level + 1,
            class: class_def.slug.clone(),
            new_class_level,
            hp: HpOptions::new(
                class_def.hit_die,
                character.abilities.modifier(Ability::Constitution),
            ),
            multiclass_allowed,
            classes,
            asi_available: self.tables.is_asi_level(class, new_class_level),
            asi_points: rule_system.asi_points,
            ability_cap: rule_system.ability_cap,
            feats,
            subclass_required,
            subclass_options,
            features: self.features_at(character, class_def, new_class_level),
        })
    }

    pub(super) fn base_class(&self, class: &str) -> Result<&'a ClassDefinition, EngineError> {
        let class_def = self
            .catalog
            .get_class(class)
            .map_err(|_| EngineError::validation(format!("Unknown class: {class}")))?;
        if class_def.is_subclass() {
            return Err(EngineError::validation(format!(
                "{class} is a subclass, not a class"
            )));
        }
        Ok(class_def)
    }

    fn subclass_options(&self, class_def: &ClassDefinition) -> Vec<SubclassOption> {
        let list = class_def.spell_list_slug();
        self.catalog
            .subclasses_of(&class_def.slug)
            .map(|subclass| SubclassOption {
                slug: subclass.slug.clone(),
                name: subclass.name.clone(),
                requires_terrain: subclass.requires_terrain(),
                terrains: subclass
                    .circle_spells
                    .as_ref()
                    .map(|c| c.terrains())
                    .unwrap_or_default(),
                requires_bonus_cantrip: subclass.bonus_cantrip,
                bonus_cantrips: if subclass.bonus_cantrip {
                    self.catalog
                        .spells()
                        .filter(|s| s.is_cantrip() && s.on_list(list))
                        .map(|s| s.slug.clone())
                        .collect()
                } else {
                    Vec::new()
                },
            })
            .collect()
    }

    /// Class features at `class_level`, plus those of an already chosen subclass.
    fn features_at(
        &self,
        character: &Character,
        class_def: &ClassDefinition,
        class_level: u8,
    ) -> Vec<FeatureOption> {
        let class_source = FeatureSource::Class {
            class: class_def.slug.clone(),
        };
        let mut features: Vec<FeatureOption> = class_def
            .features_at(class_level)
            .iter()
            .map(|f| feature_option(f, class_source.clone()))
            .collect();

        let chosen = character
            .subclasses
            .get(&class_def.slug)
            .and_then(|choice| self.catalog.get_class(&choice.subclass).ok());
        if let Some(subclass) = chosen {
            let source = FeatureSource::Subclass {
                class: class_def.slug.clone(),
                subclass: subclass.slug.clone(),
            };
            features.extend(
                subclass
                    .features_at(class_level)
                    .iter()
                    .map(|f| feature_option(f, source.clone())),
            );
        }
        features
    }
}

fn feature_option(feature: &FeatureDefinition, source: FeatureSource) -> FeatureOption {
    FeatureOption {
        slug: feature.slug.clone(),
        name: feature.name.clone(),
        description: feature.description.clone(),
        source,
        options: feature.options.clone(),
    }
}

/// The subclass must be picked at exactly this level-in-class.
pub(super) fn subclass_due(character: &Character, class_def: &ClassDefinition, new_class_level: u8) -> bool {
    class_def.subclass_level == Some(new_class_level) && !character.subclasses.contains_key(&class_def.slug)
}

pub(super) fn has_feat(character: &Character, feat: &str) -> bool {
    character
        .features
        .iter()
        .any(|f| matches!(&f.source, FeatureSource::Feat { feat: slug } if slug == feat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RuleCatalog;
    use crate::tables::RuleTables;
    use crate::testing;
    use crate::world::AbilityScores;

    #[test]
    fn test_hp_options_average_and_bounds() {
        let hp = HpOptions::new(8, 2);
        assert_eq!(hp.average, 7);
        assert_eq!(hp.roll_min, 3);
        assert_eq!(hp.roll_max, 10);

        let frail = HpOptions::new(6, -3);
        assert_eq!(frail.average, 1);
        assert_eq!(frail.roll_min, 1);
        assert_eq!(frail.roll_max, 3);
    }

    #[test]
    fn test_fighter_level_three_needs_subclass() {
        let catalog = RuleCatalog::srd();
        let tables = RuleTables::standard();
        let engine = ProgressionEngine::new(&catalog, &tables);

        let mut fighter = testing::sample_fighter();
        fighter.level = 2;
        let options = engine.level_up_options(&fighter).unwrap();
        assert_eq!(options.new_level, 3);
        assert!(options.subclass_required);
        let slugs: Vec<&str> = options.subclass_options.iter().map(|s| s.slug.as_str()).collect();
        assert!(slugs.contains(&"champion"));
        assert!(slugs.contains(&"eldritch-knight"));
        assert!(!options.asi_available);
        assert_eq!(options.hp.hit_die, 10);
    }

    #[test]
    fn test_fighter_extra_asi_levels() {
        let catalog = RuleCatalog::srd();
        let tables = RuleTables::standard();
        let engine = ProgressionEngine::new(&catalog, &tables);

        let mut fighter = testing::sample_character("fighter", 5);
        fighter.experience = 14_000;
        let options = engine.level_up_options(&fighter).unwrap();
        assert!(options.asi_available);

        let mut wizard = testing::sample_wizard(5);
        wizard.experience = 14_000;
        assert!(!engine.level_up_options(&wizard).unwrap().asi_available);
    }

    #[test]
    fn test_land_druid_subclass_annotations() {
        let catalog = RuleCatalog::srd();
        let tables = RuleTables::standard();
        let engine = ProgressionEngine::new(&catalog, &tables);

        let druid = testing::sample_character("druid", 1);
        let options = engine.level_up_options(&druid).unwrap();
        let land = options
            .subclass_options
            .iter()
            .find(|s| s.slug == "circle-of-the-land")
            .unwrap();
        assert!(land.requires_terrain);
        assert!(land.requires_bonus_cantrip);
        assert!(land.terrains.contains(&"forest".to_string()));
        assert!(land.bonus_cantrips.contains(&"druidcraft".to_string()));
    }

    #[test]
    fn test_multiclass_options_gated_by_prerequisites() {
        let catalog = RuleCatalog::srd();
        let tables = RuleTables::standard();
        let engine = ProgressionEngine::new(&catalog, &tables);

        let mut fighter = testing::sample_fighter();
        fighter.abilities = AbilityScores::new(15, 12, 14, 8, 10, 10);
        let options = engine.level_up_options(&fighter).unwrap();
        assert_eq!(options.classes.len(), 12);

        let own = options.classes.iter().find(|c| c.slug == "fighter").unwrap();
        assert!(own.already_held && own.available);
        let wizard = options.classes.iter().find(|c| c.slug == "wizard").unwrap();
        assert!(!wizard.available);
        assert_eq!(wizard.unmet, vec!["Wizard: INT 13".to_string()]);
        let barbarian = options.classes.iter().find(|c| c.slug == "barbarian").unwrap();
        assert!(barbarian.available);
    }

    #[test]
    fn test_subclass_features_listed_once_chosen() {
        let catalog = RuleCatalog::srd();
        let tables = RuleTables::standard();
        let engine = ProgressionEngine::new(&catalog, &tables);

        let mut fighter = testing::sample_character("fighter", 6);
        fighter.subclasses.insert(
            "fighter".to_string(),
            crate::world::SubclassChoice {
                subclass: "champion".to_string(),
                terrain: None,
                bonus_cantrip: None,
            },
        );
        let options = engine.level_up_options(&fighter).unwrap();
        let slugs: Vec<&str> = options.features.iter().map(|f| f.slug.as_str()).collect();
        assert_eq!(slugs, vec!["remarkable-athlete"]);
    }

    #[test]
    fn test_feat_eligibility() {
        let catalog = RuleCatalog::srd();
        let tables = RuleTables::standard();
        let engine = ProgressionEngine::new(&catalog, &tables);

        let fighter = testing::sample_character("fighter", 3);
        let options = engine.level_up_options(&fighter).unwrap();
        let find = |slug: &str| options.feats.iter().find(|f| f.slug == slug).unwrap().clone();
        assert!(find("alert").eligible);
        assert!(find("heavily-armored").eligible, "fighters know medium armor");
        assert!(!find("war-caster").eligible);
        assert!(!find("elven-accuracy").eligible);
    }
}
