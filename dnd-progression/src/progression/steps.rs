//! Ordered level-up steps, each shown only when its predicate holds.
//!
//! A front end walks [`level_up_steps`] in order and skips any step whose
//! `visible` predicate is false for the current [`StepState`]. The state is
//! recomputed from the choices made so far, so picking a subclass that needs
//! a terrain makes the subclass-choices step appear.

use super::apply::{AsiChoice, LevelUpChoices};
use super::feats::needs_choices;
use super::ProgressionEngine;
use crate::error::EngineError;
use crate::world::Character;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    HitPoints,
    Class,
    Subclass,
    SubclassChoices,
    AsiOrFeat,
    FeatChoices,
    Features,
    Confirm,
}

/// What is known about the level-up in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
    /// More than one class could take this level.
    pub can_change_class: bool,
    pub subclass_required: bool,
    /// The picked subclass needs a terrain or bonus cantrip.
    pub subclass_needs_choices: bool,
    pub asi_available: bool,
    /// The picked feat needs abilities, spells, skills or languages chosen.
    pub feat_needs_choices: bool,
    pub has_features: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct StepDescriptor {
    pub kind: StepKind,
    pub title: &'static str,
    pub visible: fn(&StepState) -> bool,
}

impl StepDescriptor {
    pub fn is_visible(&self, state: &StepState) -> bool {
        (self.visible)(state)
    }
}

fn always(_: &StepState) -> bool {
    true
}

/// Every step in wizard order.
pub fn level_up_steps() -> Vec<StepDescriptor> {
    vec![
        StepDescriptor {
            kind: StepKind::HitPoints,
            title: "Hit Points",
            visible: always,
        },
        StepDescriptor {
            kind: StepKind::Class,
            title: "Class",
            visible: |s| s.can_change_class,
        },
        StepDescriptor {
            kind: StepKind::Subclass,
            title: "Subclass",
            visible: |s| s.subclass_required,
        },
        StepDescriptor {
            kind: StepKind::SubclassChoices,
            title: "Subclass Choices",
            visible: |s| s.subclass_required && s.subclass_needs_choices,
        },
        StepDescriptor {
            kind: StepKind::AsiOrFeat,
            title: "Ability Score Improvement",
            visible: |s| s.asi_available,
        },
        StepDescriptor {
            kind: StepKind::FeatChoices,
            title: "Feat Choices",
            visible: |s| s.asi_available && s.feat_needs_choices,
        },
        StepDescriptor {
            kind: StepKind::Features,
            title: "Features",
            visible: |s| s.has_features,
        },
        StepDescriptor {
            kind: StepKind::Confirm,
            title: "Confirm",
            visible: always,
        },
    ]
}

pub fn visible_steps(state: &StepState) -> Vec<StepKind> {
    level_up_steps()
        .into_iter()
        .filter(|step| step.is_visible(state))
        .map(|step| step.kind)
        .collect()
}

impl<'a> ProgressionEngine<'a> {
    /// Step state for `character` given the choices made so far.
    pub fn step_state(&self, character: &Character, choices: &LevelUpChoices) -> Result<StepState, EngineError> {
        let class = choices.class.as_deref().unwrap_or(character.class_slug.as_str());
        let options = self.level_up_options_for(character, class)?;

        let subclass_needs_choices = choices
            .subclass
            .as_deref()
            .and_then(|slug| options.subclass_options.iter().find(|s| s.slug == slug))
            .is_some_and(|s| s.requires_terrain || s.requires_bonus_cantrip);

        let feat_needs_choices = match &choices.asi {
            Some(AsiChoice::Feat { feat, .. }) => self.catalog.get_feat(feat).is_ok_and(needs_choices),
            _ => false,
        };

        let subclass_has_features = choices
            .subclass
            .as_deref()
            .and_then(|slug| self.catalog.get_class(slug).ok())
            .is_some_and(|s| {
                s.level_features
                    .range(..=options.new_class_level)
                    .any(|(_, features)| !features.is_empty())
            });

        Ok(StepState {
            can_change_class: options.classes.iter().filter(|c| c.available).count() > 1,
            subclass_required: options.subclass_required,
            subclass_needs_choices,
            asi_available: options.asi_available,
            feat_needs_choices,
            has_features: !options.features.is_empty() || subclass_has_features,
        })
    }

    /// Steps to show for `character` given the choices made so far.
    pub fn level_up_steps(&self, character: &Character, choices: &LevelUpChoices) -> Result<Vec<StepKind>, EngineError> {
        Ok(visible_steps(&self.step_state(character, choices)?))
    }
}
