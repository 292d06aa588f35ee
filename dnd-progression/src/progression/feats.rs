//! Feat prerequisites and benefits.

use super::resource_key;
use crate::catalog::{is_skill, FeatBenefit, FeatDefinition, Prerequisite, RuleCatalog};
use crate::error::EngineError;
use crate::formula::FormulaEvaluator;
use crate::spellbook::formula_vars;
use crate::world::{Ability, Character, ResourcePool};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Player picks a feat's benefits need. Only the lists a feat grants may be filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatChoices {
    /// Ability raised by an `AbilityIncrease` benefit; also the saving throw
    /// for `SavingThrowProficiency`.
    #[serde(default)]
    pub ability: Option<Ability>,
    #[serde(default)]
    pub cantrips: Vec<String>,
    #[serde(default)]
    pub spells: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub expertise: Vec<String>,
}

/// Descriptions of every prerequisite `character` fails for `feat`.
pub(crate) fn unmet_prerequisites(
    catalog: &RuleCatalog,
    character: &Character,
    feat: &FeatDefinition,
) -> Vec<String> {
    feat.prerequisites
        .iter()
        .filter(|p| !prerequisite_met(catalog, character, p))
        .map(Prerequisite::describe)
        .collect()
}

fn prerequisite_met(catalog: &RuleCatalog, character: &Character, prerequisite: &Prerequisite) -> bool {
    match prerequisite {
        Prerequisite::Ability { ability, minimum } => character.abilities.get(*ability) >= *minimum,
        Prerequisite::Proficiency { proficiency } => {
            character.proficiencies.armor.contains(proficiency)
                || character.proficiencies.skills.contains(proficiency)
                || character.held_classes().keys().any(|class| {
                    catalog
                        .get_class(class)
                        .is_ok_and(|c| c.armor_proficiencies.contains(proficiency))
                })
        }
        Prerequisite::Spellcasting => can_cast(catalog, character),
        Prerequisite::Race { races } => character
            .race
            .as_ref()
            .is_some_and(|race| races.iter().any(|r| r.eq_ignore_ascii_case(race))),
        Prerequisite::AnyOf { options } => options
            .iter()
            .any(|p| prerequisite_met(catalog, character, p)),
    }
}

fn can_cast(catalog: &RuleCatalog, character: &Character) -> bool {
    let class_casts = character.held_classes().keys().any(|class| {
        catalog.get_class(class).is_ok_and(|c| c.is_spellcaster)
            || character
                .subclasses
                .get(class)
                .and_then(|s| catalog.get_class(&s.subclass).ok())
                .is_some_and(|s| s.is_spellcaster)
    });
    class_casts || !character.known_spells.is_empty() || character.spell_slots.pact.is_some()
}

/// Apply every benefit of `feat` to `character`. Prerequisites and
/// repeatability are checked first; any bad pick fails the whole feat.
pub(crate) fn apply_feat(
    catalog: &RuleCatalog,
    character: &mut Character,
    feat: &FeatDefinition,
    choices: &FeatChoices,
    ability_cap: u8,
) -> Result<(), EngineError> {
    if !feat.repeatable && super::options::has_feat(character, &feat.slug) {
        return Err(EngineError::validation(format!(
            "{} has already been taken",
            feat.name
        )));
    }
    let unmet = unmet_prerequisites(catalog, character, feat);
    if !unmet.is_empty() {
        return Err(EngineError::prerequisites(unmet));
    }
    check_unrequested_picks(feat, choices)?;

    for benefit in &feat.benefits {
        match benefit {
            FeatBenefit::Initiative { bonus } => character.bonuses.initiative += bonus,
            FeatBenefit::ArmorClass { bonus } => character.bonuses.armor_class += bonus,
            FeatBenefit::Speed { bonus } => character.bonuses.speed += bonus,
            FeatBenefit::HpPerLevel { bonus } => {
                let gained = bonus * character.level as i32;
                character.bonuses.hp_per_level += bonus;
                character.max_hp += gained;
                character.current_hp += gained;
            }
            FeatBenefit::Resource { resource } => {
                let max = FormulaEvaluator::new()
                    .evaluate(&resource.max, formula_vars(character, None))?
                    .max(0);
                character
                    .class_resources
                    .entry(resource_key(&resource.name))
                    .or_insert_with(|| ResourcePool::from_template(resource, None, max));
            }
            FeatBenefit::AbilityIncrease { options, amount } => {
                let ability = picked_ability(feat, choices)?;
                if !options.is_empty() && !options.contains(&ability) {
                    return Err(EngineError::validation(format!(
                        "{} cannot raise {}",
                        feat.name,
                        ability.name()
                    )));
                }
                character.abilities.increase_capped(ability, *amount, ability_cap);
            }
            FeatBenefit::SavingThrowProficiency => {
                let ability = picked_ability(feat, choices)?;
                character.proficiencies.saving_throws.insert(ability);
            }
            FeatBenefit::Cantrips { count } => {
                expect_count(feat, "cantrips", &choices.cantrips, *count)?;
                for slug in &choices.cantrips {
                    let spell = known_spell(catalog, slug)?;
                    if !spell.is_cantrip() {
                        return Err(EngineError::validation(format!("{slug} is not a cantrip")));
                    }
                    learn(character, slug)?;
                }
            }
            FeatBenefit::Spells { count, max_level } => {
                expect_count(feat, "spells", &choices.spells, *count)?;
                for slug in &choices.spells {
                    let spell = known_spell(catalog, slug)?;
                    if spell.is_cantrip() || spell.level > *max_level {
                        return Err(EngineError::validation(format!(
                            "{slug} must be a spell of level 1 to {max_level}"
                        )));
                    }
                    learn(character, slug)?;
                }
            }
            FeatBenefit::Skills { count } => {
                expect_count(feat, "skills", &choices.skills, *count)?;
                for skill in &choices.skills {
                    if !is_skill(skill) {
                        return Err(EngineError::validation(format!("Unknown skill: {skill}")));
                    }
                    if !character.proficiencies.skills.insert(skill.clone()) {
                        return Err(EngineError::validation(format!(
                            "Already proficient in {skill}"
                        )));
                    }
                }
            }
            FeatBenefit::Languages { count } => {
                expect_count(feat, "languages", &choices.languages, *count)?;
                for language in &choices.languages {
                    let language = language.trim();
                    if language.is_empty() {
                        return Err(EngineError::validation("Language name is empty"));
                    }
                    character.proficiencies.languages.insert(language.to_string());
                }
            }
            // Skills granted by this same feat are already recorded: benefits
            // apply in catalog order and Skills precedes Expertise.
            FeatBenefit::Expertise { count } => {
                expect_count(feat, "expertise", &choices.expertise, *count)?;
                for skill in &choices.expertise {
                    if !character.proficiencies.skills.contains(skill) {
                        return Err(EngineError::validation(format!(
                            "Expertise requires proficiency in {skill}"
                        )));
                    }
                    if !character.proficiencies.expertise.insert(skill.clone()) {
                        return Err(EngineError::validation(format!(
                            "Already has expertise in {skill}"
                        )));
                    }
                }
            }
            FeatBenefit::ArmorProficiency { armor } => {
                character.proficiencies.armor.insert(armor.clone());
            }
        }
    }
    Ok(())
}

/// Reject picks for lists the feat never grants.
fn check_unrequested_picks(feat: &FeatDefinition, choices: &FeatChoices) -> Result<(), EngineError> {
    let granted: BTreeSet<&'static str> = feat
        .benefits
        .iter()
        .filter_map(|b| match b {
            FeatBenefit::AbilityIncrease { .. } | FeatBenefit::SavingThrowProficiency => Some("ability"),
            FeatBenefit::Cantrips { .. } => Some("cantrips"),
            FeatBenefit::Spells { .. } => Some("spells"),
            FeatBenefit::Skills { .. } => Some("skills"),
            FeatBenefit::Languages { .. } => Some("languages"),
            FeatBenefit::Expertise { .. } => Some("expertise"),
            _ => None,
        })
        .collect();

    let supplied = [
        ("ability", choices.ability.is_some()),
        ("cantrips", !choices.cantrips.is_empty()),
        ("spells", !choices.spells.is_empty()),
        ("skills", !choices.skills.is_empty()),
        ("languages", !choices.languages.is_empty()),
        ("expertise", !choices.expertise.is_empty()),
    ];
    for (list, present) in supplied {
        if present && !granted.contains(list) {
            return Err(EngineError::validation(format!(
                "{} does not grant {list}",
                feat.name
            )));
        }
    }
    Ok(())
}

/// Whether picking `feat` needs any player input beyond the feat itself.
pub(crate) fn needs_choices(feat: &FeatDefinition) -> bool {
    feat.benefits.iter().any(|b| {
        matches!(
            b,
            FeatBenefit::AbilityIncrease { .. }
                | FeatBenefit::SavingThrowProficiency
                | FeatBenefit::Cantrips { .. }
                | FeatBenefit::Spells { .. }
                | FeatBenefit::Skills { .. }
                | FeatBenefit::Languages { .. }
                | FeatBenefit::Expertise { .. }
        )
    })
}

fn picked_ability(feat: &FeatDefinition, choices: &FeatChoices) -> Result<Ability, EngineError> {
    choices
        .ability
        .ok_or_else(|| EngineError::validation(format!("{} requires an ability choice", feat.name)))
}

fn expect_count(feat: &FeatDefinition, list: &str, picks: &[String], count: u8) -> Result<(), EngineError> {
    let unique: BTreeSet<&String> = picks.iter().collect();
    if picks.len() != count as usize || unique.len() != picks.len() {
        return Err(EngineError::validation(format!(
            "{} requires {count} distinct {list}, got {}",
            feat.name,
            picks.len()
        )));
    }
    Ok(())
}

fn known_spell<'c>(
    catalog: &'c RuleCatalog,
    slug: &str,
) -> Result<&'c crate::catalog::SpellDefinition, EngineError> {
    catalog
        .get_spell(slug)
        .map_err(|_| EngineError::validation(format!("Unknown spell: {slug}")))
}

fn learn(character: &mut Character, slug: &str) -> Result<(), EngineError> {
    if !character.known_spells.insert(slug.to_string()) {
        return Err(EngineError::validation(format!("{slug} is already known")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn feat(catalog: &RuleCatalog, slug: &str) -> FeatDefinition {
        catalog.get_feat(slug).unwrap().clone()
    }

    #[test]
    fn test_alert_adds_initiative() {
        let catalog = RuleCatalog::srd();
        let mut fighter = testing::sample_fighter();
        apply_feat(&catalog, &mut fighter, &feat(&catalog, "alert"), &FeatChoices::default(), 20).unwrap();
        assert_eq!(fighter.bonuses.initiative, 5);
    }

    #[test]
    fn test_tough_is_retroactive() {
        let catalog = RuleCatalog::srd();
        let mut fighter = testing::sample_character("fighter", 4);
        let (max, current) = (fighter.max_hp, fighter.current_hp);
        apply_feat(&catalog, &mut fighter, &feat(&catalog, "tough"), &FeatChoices::default(), 20).unwrap();
        assert_eq!(fighter.max_hp, max + 8);
        assert_eq!(fighter.current_hp, current + 8);
        assert_eq!(fighter.bonuses.hp_per_level, 2);
    }

    #[test]
    fn test_resilient_needs_ability() {
        let catalog = RuleCatalog::srd();
        let resilient = feat(&catalog, "resilient");
        let mut fighter = testing::sample_fighter();
        assert!(matches!(
            apply_feat(&catalog, &mut fighter, &resilient, &FeatChoices::default(), 20),
            Err(EngineError::Validation(_))
        ));

        let choices = FeatChoices {
            ability: Some(Ability::Wisdom),
            ..Default::default()
        };
        let before = fighter.abilities.wisdom;
        apply_feat(&catalog, &mut fighter, &resilient, &choices, 20).unwrap();
        assert_eq!(fighter.abilities.wisdom, before + 1);
        assert!(fighter.proficiencies.saving_throws.contains(&Ability::Wisdom));
    }

    #[test]
    fn test_magic_initiate_picks() {
        let catalog = RuleCatalog::srd();
        let initiate = feat(&catalog, "magic-initiate");
        let mut fighter = testing::sample_fighter();

        let wrong_count = FeatChoices {
            cantrips: vec!["fire-bolt".to_string()],
            spells: vec!["magic-missile".to_string()],
            ..Default::default()
        };
        assert!(apply_feat(&catalog, &mut fighter.clone(), &initiate, &wrong_count, 20).is_err());

        let too_high = FeatChoices {
            cantrips: vec!["fire-bolt".to_string(), "light".to_string()],
            spells: vec!["fireball".to_string()],
            ..Default::default()
        };
        assert!(apply_feat(&catalog, &mut fighter.clone(), &initiate, &too_high, 20).is_err());

        let good = FeatChoices {
            cantrips: vec!["fire-bolt".to_string(), "light".to_string()],
            spells: vec!["magic-missile".to_string()],
            ..Default::default()
        };
        apply_feat(&catalog, &mut fighter, &initiate, &good, 20).unwrap();
        assert!(fighter.known_spells.contains("fire-bolt"));
        assert!(fighter.known_spells.contains("magic-missile"));
    }

    #[test]
    fn test_skill_expert_expertise_follows_new_skill() {
        let catalog = RuleCatalog::srd();
        let expert = feat(&catalog, "skill-expert");
        let mut rogue = testing::sample_character("rogue", 4);
        let choices = FeatChoices {
            ability: Some(Ability::Dexterity),
            skills: vec!["stealth".to_string()],
            expertise: vec!["stealth".to_string()],
            ..Default::default()
        };
        apply_feat(&catalog, &mut rogue, &expert, &choices, 20).unwrap();
        assert!(rogue.proficiencies.expertise.contains("stealth"));
    }

    #[test]
    fn test_unrequested_picks_rejected() {
        let catalog = RuleCatalog::srd();
        let mut fighter = testing::sample_fighter();
        let choices = FeatChoices {
            skills: vec!["athletics".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            apply_feat(&catalog, &mut fighter, &feat(&catalog, "alert"), &choices, 20),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_prerequisites() {
        let catalog = RuleCatalog::srd();
        let mut wizard = testing::sample_wizard(4);
        let grappler = feat(&catalog, "grappler");
        wizard.abilities.strength = 8;
        assert_eq!(
            apply_feat(&catalog, &mut wizard, &grappler, &FeatChoices::default(), 20),
            Err(EngineError::prerequisites(vec!["STR 13".to_string()]))
        );

        let elven = feat(&catalog, "elven-accuracy");
        assert!(!unmet_prerequisites(&catalog, &wizard, &elven).is_empty());
        wizard.race = Some("Half-Elf".to_string());
        assert!(unmet_prerequisites(&catalog, &wizard, &elven).is_empty());

        assert!(unmet_prerequisites(&catalog, &wizard, &feat(&catalog, "war-caster")).is_empty());
        assert!(unmet_prerequisites(&catalog, &wizard, &feat(&catalog, "ritual-caster")).is_empty());
        assert!(!unmet_prerequisites(&catalog, &wizard, &feat(&catalog, "heavily-armored")).is_empty());
    }

    #[test]
    fn test_lucky_grants_pool() {
        let catalog = RuleCatalog::srd();
        let mut fighter = testing::sample_fighter();
        apply_feat(&catalog, &mut fighter, &feat(&catalog, "lucky"), &FeatChoices::default(), 20).unwrap();
        let pool = &fighter.class_resources["luck-points"];
        assert_eq!((pool.current, pool.max), (3, 3));
        assert_eq!(pool.max_formula.as_deref(), Some("3"));
    }
}
