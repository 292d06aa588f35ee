use super::feats::{apply_feat, FeatChoices};
use super::options::subclass_due;
use super::{resource_key, ProgressionEngine};
use crate::catalog::{ClassDefinition, FeatureDefinition, RuleSystem};
use crate::error::EngineError;
use crate::events::{Change, EventPayload};
use crate::formula::FormulaEvaluator;
use crate::multiclass::MulticlassCalculator;
use crate::spellbook::{formula_vars, recompute_pool_maxima, SpellbookManager};
use crate::world::{
    Ability, AsiRecord, AsiRecordChoice, Character, FeatureSource, GrantedFeature, ResourcePool,
    SubclassChoice,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Answers for one level-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpChoices {
    /// Class to take the level in. Defaults to the primary class.
    #[serde(default)]
    pub class: Option<String>,
    /// Hit die result; the average is used when absent.
    #[serde(default)]
    pub hp_roll: Option<u8>,
    #[serde(default)]
    pub subclass: Option<String>,
    #[serde(default)]
    pub subclass_terrain: Option<String>,
    #[serde(default)]
    pub subclass_bonus_cantrip: Option<String>,
    #[serde(default)]
    pub asi: Option<AsiChoice>,
    /// Feature slug -> picked option, for features that offer options.
    #[serde(default)]
    pub features: BTreeMap<String, String>,
}

impl LevelUpChoices {
    pub fn in_class(class: impl Into<String>) -> Self {
        Self {
            class: Some(class.into()),
            ..Default::default()
        }
    }

    pub fn with_hp_roll(mut self, roll: u8) -> Self {
        self.hp_roll = Some(roll);
        self
    }

    pub fn with_subclass(mut self, subclass: impl Into<String>) -> Self {
        self.subclass = Some(subclass.into());
        self
    }

    pub fn with_asi(mut self, asi: AsiChoice) -> Self {
        self.asi = Some(asi);
        self
    }

    pub fn with_feature_choice(mut self, feature: impl Into<String>, option: impl Into<String>) -> Self {
        self.features.insert(feature.into(), option.into());
        self
    }
}

/// Ability score improvement or a feat in its place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AsiChoice {
    Asi {
        increases: BTreeMap<Ability, u8>,
    },
    Feat {
        feat: String,
        #[serde(default)]
        choices: FeatChoices,
    },
}

impl AsiChoice {
    pub fn increase(ability: Ability, points: u8) -> Self {
        AsiChoice::Asi {
            increases: BTreeMap::from([(ability, points)]),
        }
    }

    pub fn feat(feat: impl Into<String>) -> Self {
        AsiChoice::Feat {
            feat: feat.into(),
            choices: FeatChoices::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpSummary {
    pub old_level: u8,
    pub new_level: u8,
    pub class: String,
    pub class_level: u8,
    pub hp_gained: i32,
    /// Slugs of features granted this level.
    pub features: Vec<String>,
    /// Subclass picked this level.
    pub subclass: Option<String>,
    pub always_prepared_added: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LevelUpOutcome {
    pub change: Change,
    pub summary: LevelUpSummary,
}

impl<'a> ProgressionEngine<'a> {
    /// Apply a level-up. Works on a copy of `character`; any failure leaves
    /// nothing behind.
    pub fn process_level_up(
        &self,
        character: &Character,
        choices: &LevelUpChoices,
    ) -> Result<LevelUpOutcome, EngineError> {
        let rule_system = self.rule_system(character)?;
        let eligibility = self.can_level_up(character, rule_system);
        if !eligibility.eligible {
            return Err(EngineError::state(eligibility.reason));
        }

        let class = choices.class.as_deref().unwrap_or(character.class_slug.as_str());
        let class_def = self.base_class(class)?;
        if !character.has_class(class) {
            self.check_multiclass(character, class, rule_system)?;
        }

        let old_level = character.level;
        let new_level = old_level + 1;
        let new_class_level = character.class_level(class) + 1;
        let mut next = character.clone();

        // Hit points use CON as it was before this level's ASI.
        let hp_gained = hp_gain(class_def, &next, choices.hp_roll);
        next.max_hp += hp_gained;
        next.current_hp += hp_gained;

        if next.class_levels.is_empty() {
            next.class_levels.insert(next.class_slug.clone(), old_level);
        }
        *next.class_levels.entry(class.to_string()).or_insert(0) += 1;
        next.level = new_level;

        self.apply_asi(&mut next, class, new_class_level, rule_system, choices.asi.as_ref())?;

        let subclass = self.apply_subclass(&mut next, class_def, new_class_level, choices)?;
        let granted = self.grant_features(&mut next, class_def, new_class_level, subclass.is_some(), choices)?;

        let spellbook = SpellbookManager::new(self.catalog, self.tables);
        let always_prepared_added: Vec<String> = spellbook
            .circle_spells(&next)
            .into_iter()
            .filter(|spell| next.always_prepared_spells.insert(spell.clone()))
            .collect();

        recompute_pool_maxima(&mut next)?;
        MulticlassCalculator::new(self.catalog, self.tables).refresh_slots(&mut next);

        let problems = next.invariant_violations(rule_system.max_level);
        if !problems.is_empty() {
            return Err(EngineError::state(problems.join("; ")));
        }

        tracing::info!(
            character_id = %next.id,
            class = %class,
            level = new_level,
            class_level = new_class_level,
            hp_gained,
            "Level up applied"
        );

        let summary = LevelUpSummary {
            old_level,
            new_level,
            class: class.to_string(),
            class_level: new_class_level,
            hp_gained,
            features: granted,
            subclass,
            always_prepared_added,
        };
        let change = Change::new(
            next,
            EventPayload::LeveledUp {
                old_level,
                new_level,
                class: summary.class.clone(),
                class_level: new_class_level,
                hp_gained,
                features: summary.features.clone(),
                subclass: summary.subclass.clone(),
            },
        );
        Ok(LevelUpOutcome { change, summary })
    }

    fn check_multiclass(
        &self,
        character: &Character,
        class: &str,
        rule_system: &RuleSystem,
    ) -> Result<(), EngineError> {
        if !self.multiclassing_allowed(rule_system) {
            return Err(EngineError::validation(format!(
                "Multiclassing is disabled; cannot take a level in {class}"
            )));
        }
        let check = MulticlassCalculator::new(self.catalog, self.tables)
            .can_multiclass_into(character, class, rule_system)?;
        if !check.allowed {
            return Err(EngineError::prerequisites(check.failed_prerequisites));
        }
        Ok(())
    }

    fn apply_asi(
        &self,
        next: &mut Character,
        class: &str,
        class_level: u8,
        rule_system: &RuleSystem,
        choice: Option<&AsiChoice>,
    ) -> Result<(), EngineError> {
        let available = self.tables.is_asi_level(class, class_level);
        let choice = match (available, choice) {
            (false, None) => return Ok(()),
            (false, Some(_)) => {
                return Err(EngineError::validation(format!(
                    "No ability score improvement at {class} level {class_level}"
                )))
            }
            (true, None) => {
                return Err(EngineError::validation(
                    "An ability score improvement or feat must be chosen",
                ))
            }
            (true, Some(choice)) => choice,
        };

        let con_before = next.abilities.modifier(Ability::Constitution);
        let record = match choice {
            AsiChoice::Asi { increases } => {
                let total: u32 = increases.values().map(|&p| p as u32).sum();
                if total != rule_system.asi_points as u32 {
                    return Err(EngineError::validation(format!(
                        "Ability score improvement must allocate exactly {} points, got {total}",
                        rule_system.asi_points
                    )));
                }
                if increases.values().any(|&p| p == 0) {
                    return Err(EngineError::validation("Ability increases must be positive"));
                }
                for (&ability, &points) in increases {
                    next.abilities.increase_capped(ability, points, rule_system.ability_cap);
                }
                AsiRecordChoice::Asi {
                    increases: increases.clone(),
                }
            }
            AsiChoice::Feat { feat, choices } => {
                let feat_def = self
                    .catalog
                    .get_feat(feat)
                    .map_err(|_| EngineError::validation(format!("Unknown feat: {feat}")))?;
                apply_feat(self.catalog, next, feat_def, choices, rule_system.ability_cap)?;
                next.features.push(GrantedFeature {
                    slug: feat_def.slug.clone(),
                    name: feat_def.name.clone(),
                    source: FeatureSource::Feat {
                        feat: feat_def.slug.clone(),
                    },
                    level: next.level,
                    choice: None,
                    short_rest_recovery: None,
                });
                AsiRecordChoice::Feat { feat: feat.clone() }
            }
        };
        next.asi_choices.push(AsiRecord {
            level: next.level,
            class: class.to_string(),
            choice: record,
        });

        // A higher CON modifier counts for every level already taken.
        let con_delta = next.abilities.modifier(Ability::Constitution) - con_before;
        if con_delta != 0 {
            let change = con_delta as i32 * next.level as i32;
            next.max_hp += change;
            next.current_hp = (next.current_hp + change).clamp(0, next.max_hp);
        }
        Ok(())
    }

    /// Record a subclass pick. Returns the subclass slug when one was picked
    /// this level.
    fn apply_subclass(
        &self,
        next: &mut Character,
        class_def: &ClassDefinition,
        class_level: u8,
        choices: &LevelUpChoices,
    ) -> Result<Option<String>, EngineError> {
        let required = subclass_due(next, class_def, class_level);
        let Some(slug) = choices.subclass.as_deref() else {
            if required {
                return Err(EngineError::validation(format!(
                    "{} requires a subclass at level {class_level}",
                    class_def.name
                )));
            }
            if choices.subclass_terrain.is_some() || choices.subclass_bonus_cantrip.is_some() {
                return Err(EngineError::validation("Subclass choices given without a subclass"));
            }
            return Ok(None);
        };

        if next.subclasses.contains_key(&class_def.slug) {
            return Err(EngineError::validation(format!(
                "{} already has a subclass",
                class_def.name
            )));
        }
        if !class_def.subclass_level.is_some_and(|level| class_level >= level) {
            return Err(EngineError::validation(format!(
                "{} cannot choose a subclass before level {}",
                class_def.name,
                class_def.subclass_level.unwrap_or(0)
            )));
        }
        let subclass = self
            .catalog
            .get_class(slug)
            .ok()
            .filter(|s| s.parent_slug.as_deref() == Some(class_def.slug.as_str()))
            .ok_or_else(|| {
                EngineError::validation(format!("{slug} is not a {} subclass", class_def.name))
            })?;

        let terrain = match (&subclass.circle_spells, choices.subclass_terrain.as_deref()) {
            (Some(circle), Some(terrain)) if subclass.requires_terrain() => {
                if !circle.terrains().iter().any(|t| t == terrain) {
                    return Err(EngineError::validation(format!(
                        "Unknown terrain for {}: {terrain}",
                        subclass.name
                    )));
                }
                Some(terrain.to_string())
            }
            (_, None) if subclass.requires_terrain() => {
                return Err(EngineError::validation(format!(
                    "{} requires a terrain",
                    subclass.name
                )))
            }
            (_, Some(_)) => {
                return Err(EngineError::validation(format!(
                    "{} does not take a terrain",
                    subclass.name
                )))
            }
            (_, None) => None,
        };

        let bonus_cantrip = match choices.subclass_bonus_cantrip.as_deref() {
            Some(cantrip) if subclass.bonus_cantrip => {
                let spell = self
                    .catalog
                    .get_spell(cantrip)
                    .map_err(|_| EngineError::validation(format!("Unknown spell: {cantrip}")))?;
                if !spell.is_cantrip() || !spell.on_list(class_def.spell_list_slug()) {
                    return Err(EngineError::validation(format!(
                        "{cantrip} is not a {} cantrip",
                        class_def.name
                    )));
                }
                if !next.known_spells.insert(cantrip.to_string()) {
                    return Err(EngineError::validation(format!("{cantrip} is already known")));
                }
                Some(cantrip.to_string())
            }
            None if subclass.bonus_cantrip => {
                return Err(EngineError::validation(format!(
                    "{} requires a bonus cantrip",
                    subclass.name
                )))
            }
            Some(_) => {
                return Err(EngineError::validation(format!(
                    "{} does not grant a bonus cantrip",
                    subclass.name
                )))
            }
            None => None,
        };

        next.subclasses.insert(
            class_def.slug.clone(),
            SubclassChoice {
                subclass: subclass.slug.clone(),
                terrain,
                bonus_cantrip,
            },
        );
        Ok(Some(subclass.slug.clone()))
    }

    /// Grant class and subclass features for `class_level`. A subclass picked
    /// this level also grants any of its features from earlier levels.
    fn grant_features(
        &self,
        next: &mut Character,
        class_def: &ClassDefinition,
        class_level: u8,
        subclass_picked: bool,
        choices: &LevelUpChoices,
    ) -> Result<Vec<String>, EngineError> {
        let mut pending: Vec<(&FeatureDefinition, FeatureSource)> = class_def
            .features_at(class_level)
            .iter()
            .map(|f| {
                let source = FeatureSource::Class {
                    class: class_def.slug.clone(),
                };
                (f, source)
            })
            .collect();

        if let Some(choice) = next.subclasses.get(&class_def.slug) {
            let subclass = self.catalog.get_class(&choice.subclass)?;
            let source = FeatureSource::Subclass {
                class: class_def.slug.clone(),
                subclass: subclass.slug.clone(),
            };
            for (&level, features) in &subclass.level_features {
                let due = if subclass_picked {
                    level <= class_level
                } else {
                    level == class_level
                };
                if due {
                    pending.extend(features.iter().map(|f| (f, source.clone())));
                }
            }
        }

        for slug in choices.features.keys() {
            if !pending.iter().any(|(f, _)| &f.slug == slug && !f.options.is_empty()) {
                return Err(EngineError::validation(format!(
                    "No choice to make for feature {slug} at this level"
                )));
            }
        }

        let mut granted = Vec::new();
        for (feature, source) in pending {
            if next.has_feature(&feature.slug) {
                continue;
            }
            let choice = if feature.options.is_empty() {
                None
            } else {
                let picked = choices.features.get(&feature.slug).ok_or_else(|| {
                    EngineError::validation(format!("{} requires a choice", feature.name))
                })?;
                if !feature.options.contains(picked) {
                    return Err(EngineError::validation(format!(
                        "{picked} is not an option for {}",
                        feature.name
                    )));
                }
                Some(picked.clone())
            };

            if let Some(template) = &feature.resource {
                let key = resource_key(&template.name);
                let vars = formula_vars(next, Some(&class_def.slug));
                let max = FormulaEvaluator::new().evaluate(&template.max, vars)?.max(0);
                match next.class_resources.get_mut(&key) {
                    Some(pool) => pool.max_formula = Some(template.max.clone()),
                    None => {
                        next.class_resources.insert(
                            key,
                            ResourcePool::from_template(template, Some(class_def.slug.clone()), max),
                        );
                    }
                }
            }

            granted.push(feature.slug.clone());
            next.features.push(GrantedFeature {
                slug: feature.slug.clone(),
                name: feature.name.clone(),
                source,
                level: next.level,
                choice,
                short_rest_recovery: feature.short_rest_recovery.clone(),
            });
        }
        Ok(granted)
    }
}

/// Average or clamped roll, plus CON and any per-level bonus, at least 1.
fn hp_gain(class_def: &ClassDefinition, character: &Character, roll: Option<u8>) -> i32 {
    let die = class_def.hit_die.max(1);
    let con = character.abilities.modifier(Ability::Constitution) as i32;
    let base = match roll {
        Some(roll) => roll.clamp(1, die) as i32,
        None => die as i32 / 2 + 1,
    };
    (base + con).max(1) + character.bonuses.hp_per_level
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RuleCatalog;
    use crate::progression::ProgressionSettings;
    use crate::tables::RuleTables;
    use crate::testing;
    use crate::world::AbilityScores;

    fn parts() -> (RuleCatalog, RuleTables) {
        (RuleCatalog::srd(), RuleTables::standard())
    }

    fn inactive(mut character: Character) -> Character {
        character.is_active = false;
        character
    }

    #[test]
    fn test_average_hp_gain() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let mut cleric = inactive(testing::sample_character("cleric", 1));
        cleric.abilities.constitution = 14;
        let outcome = engine.process_level_up(&cleric, &LevelUpChoices::default()).unwrap();
        assert_eq!(outcome.summary.hp_gained, 7);
        assert_eq!(outcome.change.character.max_hp, cleric.max_hp + 7);
        assert_eq!(outcome.change.character.level, 2);
        assert_eq!(cleric.level, 1, "input snapshot untouched");
    }

    #[test]
    fn test_roll_is_clamped_to_die() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let sorcerer = inactive(testing::sample_character("sorcerer", 1));

        let high = engine
            .process_level_up(&sorcerer, &LevelUpChoices::default().with_hp_roll(20))
            .unwrap();
        assert_eq!(high.summary.hp_gained, 6);

        let mut weak = sorcerer.clone();
        weak.abilities.constitution = 6;
        let low = engine
            .process_level_up(&weak, &LevelUpChoices::default().with_hp_roll(0))
            .unwrap();
        assert_eq!(low.summary.hp_gained, 1);
    }

    #[test]
    fn test_insufficient_xp_is_state_error() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let fighter = testing::sample_fighter();
        assert!(matches!(
            engine.process_level_up(&fighter, &LevelUpChoices::default()),
            Err(EngineError::State(_))
        ));
    }

    #[test]
    fn test_asi_points_must_be_exact() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let wizard = inactive(testing::sample_wizard(3));

        let three = AsiChoice::Asi {
            increases: BTreeMap::from([(Ability::Intelligence, 2), (Ability::Dexterity, 1)]),
        };
        assert!(matches!(
            engine.process_level_up(&wizard, &LevelUpChoices::default().with_asi(three)),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.process_level_up(&wizard, &LevelUpChoices::default()),
            Err(EngineError::Validation(_))
        ));

        let two = AsiChoice::increase(Ability::Intelligence, 2);
        let outcome = engine
            .process_level_up(&wizard, &LevelUpChoices::default().with_asi(two))
            .unwrap();
        assert_eq!(outcome.change.character.abilities.intelligence, 18);
        assert_eq!(outcome.change.character.asi_choices.len(), 1);
    }

    #[test]
    fn test_asi_capped_at_twenty() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let mut wizard = inactive(testing::sample_wizard(3));
        wizard.abilities.intelligence = 19;
        let outcome = engine
            .process_level_up(
                &wizard,
                &LevelUpChoices::default().with_asi(AsiChoice::increase(Ability::Intelligence, 2)),
            )
            .unwrap();
        assert_eq!(outcome.change.character.abilities.intelligence, 20);
    }

    #[test]
    fn test_asi_rejected_off_level() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let sorcerer = inactive(testing::sample_character("sorcerer", 1));
        let choices = LevelUpChoices::default().with_asi(AsiChoice::increase(Ability::Charisma, 2));
        assert!(matches!(
            engine.process_level_up(&sorcerer, &choices),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_con_increase_is_retroactive() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let mut wizard = inactive(testing::sample_wizard(3));
        wizard.abilities.constitution = 13;
        let outcome = engine
            .process_level_up(
                &wizard,
                &LevelUpChoices::default().with_asi(AsiChoice::increase(Ability::Constitution, 2)),
            )
            .unwrap();
        // d6 average 4 + CON 1, then +1 for each of 4 levels.
        assert_eq!(outcome.change.character.max_hp, wizard.max_hp + 5 + 4);
    }

    #[test]
    fn test_feat_recorded_as_feature() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let wizard = inactive(testing::sample_wizard(3));
        let outcome = engine
            .process_level_up(&wizard, &LevelUpChoices::default().with_asi(AsiChoice::feat("alert")))
            .unwrap();
        let next = &outcome.change.character;
        assert!(next.has_feature("alert"));
        assert_eq!(next.bonuses.initiative, 5);

        assert!(matches!(
            engine.process_level_up(&wizard, &LevelUpChoices::default().with_asi(AsiChoice::feat("nope"))),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_tough_applies_to_later_levels() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let wizard = inactive(testing::sample_wizard(3));
        let tough = engine
            .process_level_up(&wizard, &LevelUpChoices::default().with_asi(AsiChoice::feat("tough")))
            .unwrap()
            .change
            .character;
        // Average 4 at level 4, then +8 retroactive.
        assert_eq!(tough.max_hp, wizard.max_hp + 4 + 8);

        let next = engine.process_level_up(&tough, &LevelUpChoices::default()).unwrap();
        assert_eq!(next.summary.hp_gained, 4 + 2);
    }

    #[test]
    fn test_subclass_required_and_granted() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let fighter = inactive(testing::sample_character("fighter", 2));

        assert!(matches!(
            engine.process_level_up(&fighter, &LevelUpChoices::default()),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.process_level_up(&fighter, &LevelUpChoices::default().with_subclass("thief")),
            Err(EngineError::Validation(_))
        ));

        let outcome = engine
            .process_level_up(&fighter, &LevelUpChoices::default().with_subclass("eldritch-knight"))
            .unwrap();
        let knight = &outcome.change.character;
        assert_eq!(knight.subclasses["fighter"].subclass, "eldritch-knight");
        assert!(knight.has_feature("spellcasting-eldritch-knight"));
        assert!(knight.has_feature("weapon-bond"));
        assert_eq!(knight.spell_slots.standard[&1].max, 2);
        assert_eq!(outcome.summary.subclass.as_deref(), Some("eldritch-knight"));
    }

    #[test]
    fn test_land_druid_terrain_and_cantrip() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let druid = inactive(testing::sample_character("druid", 1));

        let missing_terrain = LevelUpChoices {
            subclass: Some("circle-of-the-land".to_string()),
            subclass_bonus_cantrip: Some("druidcraft".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            engine.process_level_up(&druid, &missing_terrain),
            Err(EngineError::Validation(_))
        ));

        let choices = LevelUpChoices {
            subclass_terrain: Some("forest".to_string()),
            ..missing_terrain
        };
        let level2 = engine.process_level_up(&druid, &choices).unwrap().change.character;
        let pick = &level2.subclasses["druid"];
        assert_eq!(pick.terrain.as_deref(), Some("forest"));
        assert!(level2.known_spells.contains("druidcraft"));
        assert!(level2.has_feature("natural-recovery"));
        assert!(level2.always_prepared_spells.is_empty());

        let level3 = engine.process_level_up(&level2, &LevelUpChoices::default()).unwrap();
        assert!(level3.change.character.always_prepared_spells.contains("barkskin"));
        assert_eq!(
            level3.summary.always_prepared_added,
            vec!["barkskin".to_string(), "spider-climb".to_string()]
        );
    }

    #[test]
    fn test_feature_choice_required() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let paladin = inactive(testing::sample_character("paladin", 1));

        assert!(matches!(
            engine.process_level_up(&paladin, &LevelUpChoices::default()),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.process_level_up(
                &paladin,
                &LevelUpChoices::default().with_feature_choice("fighting-style-paladin", "archery")
            ),
            Err(EngineError::Validation(_))
        ));

        let outcome = engine
            .process_level_up(
                &paladin,
                &LevelUpChoices::default().with_feature_choice("fighting-style-paladin", "defense"),
            )
            .unwrap();
        let style = outcome
            .change
            .character
            .features
            .iter()
            .find(|f| f.slug == "fighting-style-paladin")
            .unwrap();
        assert_eq!(style.choice.as_deref(), Some("defense"));
        assert_eq!(outcome.change.character.spell_slots.standard[&1].max, 2);
    }

    #[test]
    fn test_resource_pools_granted_and_grow() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let monk = inactive(testing::sample_character("monk", 1));

        let level2 = engine.process_level_up(&monk, &LevelUpChoices::default()).unwrap().change.character;
        let ki = &level2.class_resources["ki"];
        assert_eq!((ki.current, ki.max), (2, 2));

        let level3 = engine
            .process_level_up(&level2, &LevelUpChoices::default().with_subclass("way-of-the-open-hand"))
            .unwrap()
            .change
            .character;
        assert_eq!(level3.class_resources["ki"].max, 3);
    }

    #[test]
    fn test_multiclass_level() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let mut cleric = inactive(testing::sample_character("cleric", 3));
        cleric.abilities = AbilityScores::new(14, 10, 12, 10, 15, 13);

        let outcome = engine
            .process_level_up(&cleric, &LevelUpChoices::in_class("paladin"))
            .unwrap();
        let next = &outcome.change.character;
        assert_eq!(next.class_levels, BTreeMap::from([
            ("cleric".to_string(), 3),
            ("paladin".to_string(), 1),
        ]));
        assert_eq!(next.level, 4);
        assert!(next.has_feature("lay-on-hands"));
        assert_eq!(next.class_resources["lay-on-hands"].max, 5);

        let mut weak = cleric.clone();
        weak.abilities.strength = 8;
        assert_eq!(
            engine
                .process_level_up(&weak, &LevelUpChoices::in_class("paladin"))
                .unwrap_err(),
            EngineError::prerequisites(vec!["Paladin: STR 13".to_string()])
        );
    }

    #[test]
    fn test_multiclassing_disabled() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables).with_settings(ProgressionSettings {
            allow_multiclassing: false,
            ignore_xp: false,
        });
        let mut cleric = inactive(testing::sample_character("cleric", 3));
        cleric.abilities = AbilityScores::new(14, 10, 12, 10, 15, 13);
        assert!(matches!(
            engine.process_level_up(&cleric, &LevelUpChoices::in_class("paladin")),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_life_domain_spells_follow_class_level() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let mut cleric = inactive(testing::sample_character("cleric", 2));
        cleric.subclasses.insert(
            "cleric".to_string(),
            SubclassChoice {
                subclass: "life-domain".to_string(),
                terrain: None,
                bonus_cantrip: None,
            },
        );
        let outcome = engine.process_level_up(&cleric, &LevelUpChoices::default()).unwrap();
        let prepared = &outcome.change.character.always_prepared_spells;
        assert!(prepared.contains("bless"));
        assert!(prepared.contains("spiritual-weapon"));
        assert!(!prepared.contains("revivify"));
    }

    #[test]
    fn test_spent_slots_carry_over() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let mut wizard = inactive(testing::sample_wizard(2));
        wizard.spell_slots.standard.get_mut(&1).unwrap().remaining = 0;
        let next = engine.process_level_up(&wizard, &LevelUpChoices::default()).unwrap().change.character;
        assert_eq!(next.spell_slots.standard[&1].max, 4);
        assert_eq!(next.spell_slots.standard[&1].remaining, 1);
        assert_eq!(next.spell_slots.standard[&2].remaining, 2);
    }

    #[test]
    fn test_cannot_pass_max_level() {
        let (catalog, tables) = parts();
        let engine = ProgressionEngine::new(&catalog, &tables);
        let wizard = inactive(testing::sample_wizard(20));
        assert!(matches!(
            engine.process_level_up(&wizard, &LevelUpChoices::default()),
            Err(EngineError::State(_))
        ));
    }
}
