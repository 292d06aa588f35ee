//! Single-purpose edits to a character: HP, currency, inspiration,
//! conditions, custom rules and inventory.
//!
//! Each function takes a snapshot and returns a [`Change`] with the edited
//! copy and one event. None of them touch the input.

use crate::error::EngineError;
use crate::events::{Change, EventPayload};
use crate::world::{Character, ConditionEntry, CustomRuleEntry, Denomination, InventoryLine};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Hit Points
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HpChangeKind {
    /// Drains temporary HP first, then current HP.
    Damage,
    /// Raises current HP up to the maximum.
    Healing,
    /// Temporary HP do not stack; the larger value is kept.
    TempHp,
    /// Assign current HP directly, clamped to `0..=max`.
    Set,
}

pub fn modify_hp(character: &Character, amount: u32, kind: HpChangeKind) -> Change {
    let mut next = character.clone();
    let amount_i = i32::try_from(amount).unwrap_or(i32::MAX);

    match kind {
        HpChangeKind::Damage => {
            let absorbed = amount_i.min(next.temp_hp.max(0));
            next.temp_hp -= absorbed;
            next.current_hp = (next.current_hp - (amount_i - absorbed)).max(0);
        }
        HpChangeKind::Healing => {
            next.current_hp = next.current_hp.saturating_add(amount_i).min(next.max_hp);
        }
        HpChangeKind::TempHp => {
            next.temp_hp = next.temp_hp.max(amount_i);
        }
        HpChangeKind::Set => {
            next.current_hp = amount_i.clamp(0, next.max_hp.max(0));
        }
    }

    let payload = EventPayload::HpChanged {
        kind,
        amount,
        old_hp: character.current_hp,
        new_hp: next.current_hp,
        old_temp_hp: character.temp_hp,
        new_temp_hp: next.temp_hp,
        max_hp: next.max_hp,
    };
    Change::new(next, payload)
}

// ============================================================================
// Currency and Inspiration
// ============================================================================

/// Add `delta` coins; the result never goes below zero.
pub fn modify_currency(character: &Character, denomination: Denomination, delta: i64) -> Change {
    let mut next = character.clone();
    let old_amount = character.currency.get(denomination);
    let new_amount = if delta >= 0 {
        old_amount.saturating_add(delta.unsigned_abs())
    } else {
        old_amount.saturating_sub(delta.unsigned_abs())
    };
    *next.currency.get_mut(denomination) = new_amount;

    Change::new(
        next,
        EventPayload::CurrencyChanged {
            denomination,
            delta,
            old_amount,
            new_amount,
        },
    )
}

pub fn toggle_inspiration(character: &Character) -> Change {
    let mut next = character.clone();
    next.inspiration = !next.inspiration;
    let inspiration = next.inspiration;
    Change::new(next, EventPayload::InspirationToggled { inspiration })
}

// ============================================================================
// Conditions
// ============================================================================

/// Fields for adding or updating a condition. Absent fields keep their
/// existing value when the condition is already present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionInput {
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
}

pub fn add_condition(character: &Character, input: ConditionInput) -> Result<Change, EngineError> {
    let key = input.key.trim();
    if key.is_empty() {
        return Err(EngineError::validation("Condition key must not be empty"));
    }

    let mut next = character.clone();
    let (condition, merged) = match next.conditions.iter_mut().find(|c| c.key == key) {
        Some(existing) => {
            if let Some(name) = input.name {
                existing.name = name;
            }
            if input.source.is_some() {
                existing.source = input.source;
            }
            if input.duration.is_some() {
                existing.duration = input.duration;
            }
            (existing.clone(), true)
        }
        None => {
            let entry = ConditionEntry {
                key: key.to_string(),
                name: input.name.unwrap_or_else(|| key.to_string()),
                source: input.source,
                duration: input.duration,
                applied_at: Utc::now(),
            };
            next.conditions.push(entry.clone());
            (entry, false)
        }
    };

    Ok(Change::new(next, EventPayload::ConditionAdded { condition, merged }))
}

pub fn remove_condition(character: &Character, key: &str) -> Change {
    let mut next = character.clone();
    let before = next.conditions.len();
    next.conditions.retain(|c| c.key != key);
    let removed = next.conditions.len() != before;
    Change::new(
        next,
        EventPayload::ConditionRemoved {
            key: key.to_string(),
            removed,
        },
    )
}

// ============================================================================
// Custom Rules
// ============================================================================

/// Fields for a custom rule. On update, absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRuleInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub value: Option<i32>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn merge_rule(rule: &mut CustomRuleEntry, input: CustomRuleInput) {
    if let Some(name) = input.name {
        rule.name = name;
    }
    if input.description.is_some() {
        rule.description = input.description;
    }
    if input.value.is_some() {
        rule.value = input.value;
    }
    if let Some(enabled) = input.enabled {
        rule.enabled = enabled;
    }
}

/// Add a rule, or merge into the rule with the same id. A missing id is generated.
pub fn add_custom_rule(character: &Character, input: CustomRuleInput) -> Result<Change, EngineError> {
    let id = input
        .id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if character.custom_rules.iter().any(|r| r.id == id) {
        return update_custom_rule(character, &id, input);
    }

    let name = input
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| EngineError::validation("Custom rule needs a name"))?;

    let mut rule = CustomRuleEntry {
        id,
        name,
        description: None,
        value: None,
        enabled: true,
    };
    merge_rule(&mut rule, input);

    let mut next = character.clone();
    next.custom_rules.push(rule.clone());
    Ok(Change::new(next, EventPayload::CustomRuleAdded { rule }))
}

pub fn update_custom_rule(
    character: &Character,
    id: &str,
    input: CustomRuleInput,
) -> Result<Change, EngineError> {
    let mut next = character.clone();
    let rule = next
        .custom_rules
        .iter_mut()
        .find(|r| r.id == id)
        .ok_or_else(|| EngineError::not_found("Custom rule", id))?;
    let old = rule.clone();
    merge_rule(rule, input);
    let new = rule.clone();
    Ok(Change::new(next, EventPayload::CustomRuleUpdated { old, new }))
}

pub fn remove_custom_rule(character: &Character, id: &str) -> Change {
    let mut next = character.clone();
    let before = next.custom_rules.len();
    next.custom_rules.retain(|r| r.id != id);
    let removed = next.custom_rules.len() != before;
    Change::new(
        next,
        EventPayload::CustomRuleRemoved {
            id: id.to_string(),
            removed,
        },
    )
}

// ============================================================================
// Inventory
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInput {
    #[serde(default)]
    pub slug: Option<String>,
    pub name: String,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

fn one() -> u32 {
    1
}

impl ItemInput {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            slug: None,
            name: name.into(),
            quantity,
            notes: None,
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }
}

/// Give an item; an item already held has its quantity raised.
pub fn give_item(character: &Character, input: ItemInput) -> Result<Change, EngineError> {
    if input.quantity == 0 {
        return Err(EngineError::validation("Item quantity must be at least 1"));
    }
    if input.name.trim().is_empty() && input.slug.is_none() {
        return Err(EngineError::validation("Item needs a name or slug"));
    }

    let mut next = character.clone();
    let item = match next
        .inventory
        .iter_mut()
        .find(|line| line.matches(input.slug.as_deref(), &input.name))
    {
        Some(line) => {
            line.quantity = line.quantity.saturating_add(input.quantity);
            if input.notes.is_some() {
                line.notes = input.notes;
            }
            line.clone()
        }
        None => {
            let line = InventoryLine {
                name: if input.name.trim().is_empty() {
                    input.slug.clone().unwrap_or_default()
                } else {
                    input.name
                },
                slug: input.slug,
                quantity: input.quantity,
                notes: input.notes,
            };
            next.inventory.push(line.clone());
            line
        }
    };

    Ok(Change::new(
        next,
        EventPayload::ItemGiven {
            item,
            quantity_added: input.quantity,
        },
    ))
}

/// Remove `quantity` of an item, dropping the line when none are left.
pub fn remove_item(
    character: &Character,
    slug: Option<&str>,
    name: &str,
    quantity: u32,
) -> Result<Change, EngineError> {
    if quantity == 0 {
        return Err(EngineError::validation("Item quantity must be at least 1"));
    }

    let mut next = character.clone();
    let index = next
        .inventory
        .iter()
        .position(|line| line.matches(slug, name))
        .ok_or_else(|| EngineError::not_found("Item", slug.unwrap_or(name)))?;

    let line = &mut next.inventory[index];
    let removed = quantity.min(line.quantity);
    line.quantity -= removed;
    let remaining = line.quantity;
    let (item_name, item_slug) = (line.name.clone(), line.slug.clone());
    if remaining == 0 {
        next.inventory.remove(index);
    }

    Ok(Change::new(
        next,
        EventPayload::ItemRemoved {
            name: item_name,
            slug: item_slug,
            quantity_removed: removed,
            remaining,
        },
    ))
}
