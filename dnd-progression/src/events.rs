//! Change events and their publication.
//!
//! Engine operations are pure: they return a new snapshot plus events. The
//! [`Dispatcher`] is the only place that talks to an [`EventPublisher`], and
//! a publish failure never undoes or fails the change it describes.

use crate::error::{EngineError, PublishError};
use crate::mutator::HpChangeKind;
use crate::rules::{Intent, Resolution, RulesEngine};
use crate::spellbook::RestKind;
use crate::world::{
    Character, CharacterId, ConditionEntry, CustomRuleEntry, Denomination, InventoryLine,
    SlotPool,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// What changed, with old and new values where they matter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    HpChanged {
        kind: HpChangeKind,
        amount: u32,
        old_hp: i32,
        new_hp: i32,
        old_temp_hp: i32,
        new_temp_hp: i32,
        max_hp: i32,
    },
    CurrencyChanged {
        denomination: Denomination,
        delta: i64,
        old_amount: u64,
        new_amount: u64,
    },
    InspirationToggled {
        inspiration: bool,
    },
    ConditionAdded {
        condition: ConditionEntry,
        /// An existing condition with the same key was merged.
        merged: bool,
    },
    ConditionRemoved {
        key: String,
        removed: bool,
    },
    CustomRuleAdded {
        rule: CustomRuleEntry,
    },
    CustomRuleUpdated {
        old: CustomRuleEntry,
        new: CustomRuleEntry,
    },
    CustomRuleRemoved {
        id: String,
        removed: bool,
    },
    ItemGiven {
        item: InventoryLine,
        quantity_added: u32,
    },
    ItemRemoved {
        name: String,
        slug: Option<String>,
        quantity_removed: u32,
        remaining: u32,
    },
    SpellSlotUsed {
        pool: SlotPool,
        level: u8,
        remaining: u8,
        max: u8,
    },
    SpellSlotRestored {
        pool: SlotPool,
        level: u8,
        restored: u8,
        remaining: u8,
        max: u8,
    },
    RestCompleted {
        kind: RestKind,
        resources_restored: Vec<String>,
        concentration_ended: Option<String>,
    },
    SlotsRecovered {
        feature: String,
        levels: Vec<u8>,
        budget: i32,
    },
    ConcentrationStarted {
        spell: String,
        replaced: Option<String>,
    },
    ConcentrationEnded {
        spell: Option<String>,
    },
    PreparedSpellsUpdated {
        class: String,
        prepared: Vec<String>,
        max_prepared: i32,
    },
    LeveledUp {
        old_level: u8,
        new_level: u8,
        class: String,
        class_level: u8,
        hp_gained: i32,
        features: Vec<String>,
        subclass: Option<String>,
    },
}

impl EventPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::HpChanged { .. } => "hp_changed",
            EventPayload::CurrencyChanged { .. } => "currency_changed",
            EventPayload::InspirationToggled { .. } => "inspiration_toggled",
            EventPayload::ConditionAdded { .. } => "condition_added",
            EventPayload::ConditionRemoved { .. } => "condition_removed",
            EventPayload::CustomRuleAdded { .. } => "custom_rule_added",
            EventPayload::CustomRuleUpdated { .. } => "custom_rule_updated",
            EventPayload::CustomRuleRemoved { .. } => "custom_rule_removed",
            EventPayload::ItemGiven { .. } => "item_given",
            EventPayload::ItemRemoved { .. } => "item_removed",
            EventPayload::SpellSlotUsed { .. } => "spell_slot_used",
            EventPayload::SpellSlotRestored { .. } => "spell_slot_restored",
            EventPayload::RestCompleted { .. } => "rest_completed",
            EventPayload::SlotsRecovered { .. } => "slots_recovered",
            EventPayload::ConcentrationStarted { .. } => "concentration_started",
            EventPayload::ConcentrationEnded { .. } => "concentration_ended",
            EventPayload::PreparedSpellsUpdated { .. } => "prepared_spells_updated",
            EventPayload::LeveledUp { .. } => "leveled_up",
        }
    }
}

/// A change notification for other participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: String,
    pub character_id: CharacterId,
    pub payload: EventPayload,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(character_id: CharacterId, payload: EventPayload) -> Self {
        Self {
            kind: payload.kind().to_string(),
            character_id,
            payload,
            occurred_at: Utc::now(),
        }
    }
}

/// A committed change: the new snapshot and the single event describing it.
#[derive(Debug, Clone)]
pub struct Change {
    pub character: Character,
    pub event: ChangeEvent,
}

impl Change {
    pub(crate) fn new(character: Character, payload: EventPayload) -> Self {
        let event = ChangeEvent::new(character.id, payload);
        tracing::debug!(
            character_id = %character.id,
            kind = %event.kind,
            "Committed change"
        );
        Self { character, event }
    }
}

// ============================================================================
// Publishing
// ============================================================================

/// Receives change events. Implementations must not block.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &ChangeEvent) -> Result<(), PublishError>;
}

impl<P: EventPublisher + ?Sized> EventPublisher for Arc<P> {
    fn publish(&self, event: &ChangeEvent) -> Result<(), PublishError> {
        (**self).publish(event)
    }
}

/// Publisher backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&self, event: &ChangeEvent) -> Result<(), PublishError> {
        self.sender
            .send(event.clone())
            .map_err(|_| PublishError::Closed)
    }
}

/// Runs intents through the engine and forwards the resulting events.
pub struct Dispatcher<P: EventPublisher> {
    engine: Arc<RulesEngine>,
    publisher: P,
}

impl<P: EventPublisher> Dispatcher<P> {
    pub fn new(engine: Arc<RulesEngine>, publisher: P) -> Self {
        Self { engine, publisher }
    }

    pub fn engine(&self) -> &RulesEngine {
        &self.engine
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Apply `intent` and publish its events. Publish failures are logged
    /// and otherwise ignored; the resolution is returned either way.
    pub fn dispatch(&self, character: &Character, intent: Intent) -> Result<Resolution, EngineError> {
        let resolution = self.engine.apply(character, intent)?;
        for event in &resolution.events {
            if let Err(e) = self.publisher.publish(event) {
                tracing::warn!(
                    character_id = %event.character_id,
                    kind = %event.kind,
                    error = %e,
                    "Dropped change event"
                );
            }
        }
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_matches_payload() {
        let event = ChangeEvent::new(
            CharacterId::new(),
            EventPayload::InspirationToggled { inspiration: true },
        );
        assert_eq!(event.kind, "inspiration_toggled");
    }

    #[test]
    fn test_payload_serializes_tagged() {
        let payload = EventPayload::ConcentrationEnded {
            spell: Some("bless".to_string()),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "concentration_ended");
        assert_eq!(json["spell"], "bless");
    }

    #[tokio::test]
    async fn test_channel_publisher_delivers() {
        let (publisher, mut receiver) = ChannelPublisher::new();
        let event = ChangeEvent::new(
            CharacterId::new(),
            EventPayload::InspirationToggled { inspiration: false },
        );
        publisher.publish(&event).unwrap();
        assert_eq!(receiver.recv().await, Some(event));
    }

    #[test]
    fn test_dispatcher_publishes_events() {
        use crate::testing::{self, RecordingPublisher};

        let recorder = Arc::new(RecordingPublisher::new());
        let dispatcher = Dispatcher::new(Arc::new(RulesEngine::srd()), recorder.clone());
        let fighter = testing::sample_fighter();

        let resolution = dispatcher.dispatch(&fighter, Intent::ToggleInspiration).unwrap();
        assert!(resolution.character.inspiration);
        assert_eq!(recorder.kinds(), vec!["inspiration_toggled".to_string()]);
    }

    #[test]
    fn test_dispatcher_swallows_publish_failures() {
        use crate::testing::{self, FailingPublisher};

        let dispatcher = Dispatcher::new(Arc::new(RulesEngine::srd()), FailingPublisher);
        let fighter = testing::sample_fighter();
        let resolution = dispatcher
            .dispatch(
                &fighter,
                Intent::ModifyHp {
                    amount: 3,
                    kind: HpChangeKind::Damage,
                },
            )
            .unwrap();
        assert_eq!(resolution.character.current_hp, fighter.current_hp - 3);
    }

    #[test]
    fn test_dispatcher_publishes_nothing_on_error() {
        use crate::testing::{self, RecordingPublisher};

        let recorder = Arc::new(RecordingPublisher::new());
        let dispatcher = Dispatcher::new(Arc::new(RulesEngine::srd()), recorder.clone());
        let fighter = testing::sample_fighter();
        let result = dispatcher.dispatch(
            &fighter,
            Intent::UseSlot {
                level: 1,
                pool: SlotPool::Standard,
            },
        );
        assert!(result.is_err());
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn test_channel_publisher_closed() {
        let (publisher, receiver) = ChannelPublisher::new();
        drop(receiver);
        let event = ChangeEvent::new(
            CharacterId::new(),
            EventPayload::InspirationToggled { inspiration: true },
        );
        assert_eq!(publisher.publish(&event), Err(PublishError::Closed));
    }
}
