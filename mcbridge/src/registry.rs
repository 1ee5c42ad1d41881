//! Event registry.
//!
//! The registry maps event type names to [`EventMetadata`]: priority,
//! batching, sampling, the payload schema and the template that turns a
//! payload into a state delta. It is filled once during startup and shared
//! read-only afterwards.

use crate::error::{RegistryError, RegistryResult};
use crate::payload::{EventPayload, PayloadSchema};
use crate::priority::Priority;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Computes a state value from a payload.
pub type ComputedValue = fn(&Map<String, Value>) -> Option<Value>;

/// Where the value of a state mapping entry comes from.
#[derive(Debug, Clone)]
pub enum MappingSource {
    /// Copy the named payload field, if present.
    Field(String),
    /// Derive the value from the whole payload.
    Computed(ComputedValue),
}

/// Registry entry describing one event type.
///
/// # Examples
///
/// ```rust
/// use mcbridge::{EventMetadata, PayloadSchema, Priority};
///
/// let metadata = EventMetadata::new("Bot position updated", PayloadSchema::BotPosition)
///     .with_priority(Priority::new(5))
///     .with_batching(true)
///     .with_sampling_rate(0.1)
///     .map_field("minecraft.bot.position.x", "x");
///
/// assert!(metadata.batch_enabled());
/// assert_eq!(metadata.sampling_rate(), 0.1);
/// ```
#[derive(Debug, Clone)]
pub struct EventMetadata {
    description: String,
    payload_schema: PayloadSchema,
    state_mapping: Vec<(String, MappingSource)>,
    priority: Priority,
    batch_enabled: bool,
    sampling_rate: f64,
}

impl EventMetadata {
    /// Creates metadata with neutral defaults: priority 0, no batching,
    /// full sampling and an empty state mapping.
    pub fn new<S: Into<String>>(description: S, payload_schema: PayloadSchema) -> Self {
        Self {
            description: description.into(),
            payload_schema,
            state_mapping: Vec::new(),
            priority: Priority::NONE,
            batch_enabled: false,
            sampling_rate: 1.0,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Enables or disables batching.
    pub fn with_batching(mut self, enabled: bool) -> Self {
        self.batch_enabled = enabled;
        self
    }

    /// Sets the sampling rate, clamped into `(0, 1]`.
    ///
    /// Non-finite or non-positive rates fall back to full sampling.
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = if rate.is_finite() && rate > 0.0 {
            rate.min(1.0)
        } else {
            1.0
        };
        self
    }

    /// Appends a mapping from a state key template to a payload field.
    pub fn map_field<K: Into<String>, F: Into<String>>(mut self, key: K, field: F) -> Self {
        self.state_mapping
            .push((key.into(), MappingSource::Field(field.into())));
        self
    }

    /// Appends a mapping from a state key template to a computed value.
    pub fn map_computed<K: Into<String>>(mut self, key: K, compute: ComputedValue) -> Self {
        self.state_mapping
            .push((key.into(), MappingSource::Computed(compute)));
        self
    }

    /// Returns the human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the payload schema.
    pub fn payload_schema(&self) -> PayloadSchema {
        self.payload_schema
    }

    /// Returns the state mapping in declaration order.
    pub fn state_mapping(&self) -> &[(String, MappingSource)] {
        &self.state_mapping
    }

    /// Returns the priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns whether events of this type are batched.
    pub fn batch_enabled(&self) -> bool {
        self.batch_enabled
    }

    /// Returns the sampling rate.
    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }
}

/// Lookup table from event type to [`EventMetadata`].
///
/// Lookups for unknown types return neutral defaults rather than errors:
/// priority 0, batching off and a sampling rate of 1.0.
///
/// # Examples
///
/// ```rust
/// use mcbridge::{EventRegistry, Priority};
/// use serde_json::json;
///
/// let registry = EventRegistry::with_defaults();
/// assert_eq!(registry.priority("minecraft:spawn"), Priority::new(100));
/// assert_eq!(registry.priority("minecraft:unknown"), Priority::NONE);
///
/// let payload = json!({"username": "alex", "uuid": "u-1", "time": 1});
/// let delta = registry.resolve_state_mapping("minecraft:player_joined", payload.as_object().unwrap());
/// assert_eq!(delta["minecraft.players.alex.uuid"], "u-1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    events: HashMap<String, EventMetadata>,
}

impl EventRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the canonical `minecraft:*` event types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (event_type, metadata) in default_events() {
            registry.register(event_type, metadata);
        }
        registry
    }

    /// Registers an event type, replacing any previous entry.
    pub fn register<S: Into<String>>(&mut self, event_type: S, metadata: EventMetadata) {
        let event_type = event_type.into();
        debug!(
            event_type = %event_type,
            description = %metadata.description,
            "Registered event type"
        );
        self.events.insert(event_type, metadata);
    }

    /// Returns the metadata of an event type.
    pub fn metadata(&self, event_type: &str) -> Option<&EventMetadata> {
        self.events.get(event_type)
    }

    /// Returns whether an event type is registered.
    pub fn contains(&self, event_type: &str) -> bool {
        self.events.contains_key(event_type)
    }

    /// Returns the priority of an event type, or 0 when unknown.
    pub fn priority(&self, event_type: &str) -> Priority {
        self.metadata(event_type)
            .map(EventMetadata::priority)
            .unwrap_or(Priority::NONE)
    }

    /// Returns whether an event type is batched, false when unknown.
    pub fn is_batch_enabled(&self, event_type: &str) -> bool {
        self.metadata(event_type)
            .map(EventMetadata::batch_enabled)
            .unwrap_or(false)
    }

    /// Returns the sampling rate of an event type, 1.0 when unknown.
    pub fn sampling_rate(&self, event_type: &str) -> f64 {
        self.metadata(event_type)
            .map(EventMetadata::sampling_rate)
            .unwrap_or(1.0)
    }

    /// Resolves the state mapping of an event type against a payload.
    ///
    /// `{field}` placeholders in key templates are replaced by the
    /// stringified payload value. Entries whose source is absent from the
    /// payload are omitted. Unknown types resolve to an empty delta.
    pub fn resolve_state_mapping(
        &self,
        event_type: &str,
        payload: &Map<String, Value>,
    ) -> Map<String, Value> {
        let mut delta = Map::new();
        let Some(metadata) = self.metadata(event_type) else {
            return delta;
        };

        for (template, source) in &metadata.state_mapping {
            let value = match source {
                MappingSource::Field(field) => payload.get(field).cloned(),
                MappingSource::Computed(compute) => compute(payload),
            };
            if let Some(value) = value {
                delta.insert(resolve_placeholders(template, payload), value);
            }
        }

        delta
    }

    /// Decodes a payload into the typed form registered for its type.
    ///
    /// Unlike the lookup methods, this rejects unknown types.
    pub fn validate_payload(
        &self,
        event_type: &str,
        payload: &Map<String, Value>,
    ) -> RegistryResult<EventPayload> {
        let metadata = self
            .metadata(event_type)
            .ok_or_else(|| RegistryError::unknown_event_type(event_type))?;
        metadata
            .payload_schema
            .decode(payload)
            .map_err(|reason| RegistryError::invalid_payload(event_type, reason))
    }

    /// Lists registered types with their descriptions, sorted by type.
    pub fn list_events(&self) -> BTreeMap<String, String> {
        self.events
            .iter()
            .map(|(event_type, metadata)| (event_type.clone(), metadata.description.clone()))
            .collect()
    }

    /// Returns an iterator over registered type names.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns whether no types are registered.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitutes `{field}` tokens with payload values, leaving unknown tokens intact.
fn resolve_placeholders(template: &str, payload: &Map<String, Value>) -> String {
    if !template.contains('{') {
        return template.to_string();
    }

    let mut resolved = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + len];
        resolved.push_str(&rest[..start]);
        match payload.get(name) {
            Some(value) => resolved.push_str(&stringify(value)),
            None => resolved.push_str(&rest[start..=start + len]),
        }
        rest = &rest[start + len + 1..];
    }
    resolved.push_str(rest);
    resolved
}

fn default_events() -> Vec<(&'static str, EventMetadata)> {
    use PayloadSchema as S;

    vec![
        (
            "minecraft:spawn",
            EventMetadata::new("Bot successfully spawned in world", S::Spawn)
                .with_priority(Priority::new(100))
                .map_field("minecraft.spawned", "spawned")
                .map_field("minecraft.position", "position")
                .map_field("minecraft.spawn_time", "time"),
        ),
        (
            "minecraft:chat",
            EventMetadata::new("Chat message received", S::Chat)
                .with_priority(Priority::new(50))
                .map_field("minecraft.last_chat.username", "username")
                .map_field("minecraft.last_chat.message", "message")
                .map_field("minecraft.last_chat.time", "time"),
        ),
        (
            "minecraft:player_joined",
            EventMetadata::new("Player joined the server", S::PlayerPresence)
                .with_priority(Priority::new(30))
                .map_field("minecraft.players.{username}.joined", "time")
                .map_field("minecraft.players.{username}.uuid", "uuid"),
        ),
        (
            "minecraft:player_left",
            EventMetadata::new("Player left the server", S::PlayerPresence)
                .with_priority(Priority::new(30))
                .map_field("minecraft.players.{username}.left", "time"),
        ),
        (
            "minecraft:player_updated",
            EventMetadata::new("Player list entry updated", S::PlayerUpdated)
                .with_priority(Priority::new(15))
                .with_batching(true)
                .map_field("minecraft.players.{username}.ping", "ping")
                .map_field("minecraft.players.{username}.gamemode", "gamemode")
                .map_field("minecraft.players.{username}.last_update", "time"),
        ),
        (
            "minecraft:position",
            EventMetadata::new("Bot position updated", S::BotPosition)
                .with_priority(Priority::new(5))
                .with_batching(true)
                .with_sampling_rate(0.1)
                .map_field("minecraft.bot.position.x", "x")
                .map_field("minecraft.bot.position.y", "y")
                .map_field("minecraft.bot.position.z", "z")
                .map_field("minecraft.bot.position.yaw", "yaw")
                .map_field("minecraft.bot.position.pitch", "pitch")
                .map_field("minecraft.bot.position.last_update", "time"),
        ),
        (
            "minecraft:health",
            EventMetadata::new("Bot health/hunger updated", S::Health)
                .with_priority(Priority::new(75))
                .map_field("minecraft.bot.health", "health")
                .map_field("minecraft.bot.food", "food")
                .map_field("minecraft.bot.saturation", "saturation")
                .map_field("minecraft.bot.health_last_update", "time"),
        ),
        (
            "minecraft:block_update",
            EventMetadata::new("Block changed in loaded chunks", S::BlockUpdate)
                .with_priority(Priority::new(10))
                .with_batching(true)
                .map_field("minecraft.world.block_updates.last.position", "position")
                .map_field("minecraft.world.block_updates.last.new_block", "new_block")
                .map_field("minecraft.world.block_updates.last.time", "time"),
        ),
        (
            "minecraft:block_break",
            EventMetadata::new("Bot broke a block", S::BlockAction)
                .with_priority(Priority::new(15))
                .map_field("minecraft.world.block_breaks.last.position", "position")
                .map_field("minecraft.world.block_breaks.last.block", "block")
                .map_field("minecraft.world.block_breaks.last.time", "time"),
        ),
        (
            "minecraft:block_place",
            EventMetadata::new("Bot placed a block", S::BlockAction)
                .with_priority(Priority::new(15))
                .map_field("minecraft.world.block_places.last.position", "position")
                .map_field("minecraft.world.block_places.last.block", "block")
                .map_field("minecraft.world.block_places.last.time", "time"),
        ),
        (
            "minecraft:entity_spawn",
            EventMetadata::new("New entity spawned", S::Entity)
                .with_priority(Priority::new(20))
                .map_field("minecraft.entities.{entity_id}.type", "entity_type")
                .map_field("minecraft.entities.{entity_id}.position", "position")
                .map_field("minecraft.entities.{entity_id}.spawn_time", "time"),
        ),
        (
            "minecraft:entity_death",
            EventMetadata::new("Entity died", S::Entity)
                .with_priority(Priority::new(25))
                .map_field("minecraft.entities.{entity_id}.death_time", "time")
                .map_field("minecraft.entities.{entity_id}.death_position", "position"),
        ),
        (
            "minecraft:entity_move",
            EventMetadata::new("Entity moved", S::EntityMove)
                .with_priority(Priority::new(3))
                .with_batching(true)
                .with_sampling_rate(0.1)
                .map_field("minecraft.entities.{entity_id}.position", "position")
                .map_field("minecraft.entities.{entity_id}.last_update", "time"),
        ),
        (
            "minecraft:entity_damage",
            EventMetadata::new("Entity took damage", S::EntityDamage)
                .with_priority(Priority::new(35))
                .map_field("minecraft.entities.{entity_id}.health", "health")
                .map_field("minecraft.entities.{entity_id}.last_damage", "damage")
                .map_field("minecraft.entities.{entity_id}.last_damage_time", "time"),
        ),
        (
            "minecraft:bot_death",
            EventMetadata::new("Bot died", S::BotDeath)
                .with_priority(Priority::new(100))
                .map_computed("minecraft.bot.dead", |_| Some(json!(true)))
                .map_field("minecraft.bot.death_time", "time")
                .map_field("minecraft.bot.death_position", "position")
                .map_field("minecraft.bot.death_reason", "reason"),
        ),
        (
            "minecraft:bot_respawn",
            EventMetadata::new("Bot respawned", S::BotRespawn)
                .with_priority(Priority::new(90))
                .map_computed("minecraft.bot.dead", |_| Some(json!(false)))
                .map_field("minecraft.bot.respawn_time", "time")
                .map_field("minecraft.bot.health", "health"),
        ),
        (
            "minecraft:inventory_change",
            EventMetadata::new("Inventory slot changed", S::InventoryChange)
                .with_priority(Priority::new(40))
                .map_field("minecraft.bot.inventory.slots.{slot}.item", "item_name")
                .map_field("minecraft.bot.inventory.slots.{slot}.count", "count")
                .map_field("minecraft.bot.inventory.last_change", "time"),
        ),
        (
            "minecraft:container_open",
            EventMetadata::new("Container window opened", S::Container)
                .with_priority(Priority::new(45))
                .map_computed("minecraft.bot.container.open", |_| Some(json!(true)))
                .map_field("minecraft.bot.container.type", "container_type")
                .map_field("minecraft.bot.container.size", "container_size")
                .map_field("minecraft.bot.container.position", "container_position")
                .map_field("minecraft.bot.container.opened_at", "time"),
        ),
        (
            "minecraft:container_close",
            EventMetadata::new("Container window closed", S::Container)
                .with_priority(Priority::new(45))
                .map_computed("minecraft.bot.container.open", |_| Some(json!(false)))
                .map_field("minecraft.bot.container.closed_at", "time"),
        ),
        (
            "minecraft:explosion",
            EventMetadata::new("Explosion nearby", S::Explosion)
                .with_priority(Priority::new(60))
                .map_field("minecraft.world.last_explosion.position", "position")
                .map_field("minecraft.world.last_explosion.power", "power")
                .map_field("minecraft.world.last_explosion.time", "time"),
        ),
        (
            "minecraft:weather_change",
            EventMetadata::new("Weather changed", S::WeatherChange)
                .with_priority(Priority::new(20))
                .map_field("minecraft.world.weather", "weather")
                .map_field("minecraft.world.raining", "raining")
                .map_field("minecraft.world.thundering", "thundering")
                .map_field("minecraft.world.weather_last_update", "time"),
        ),
        (
            "minecraft:time_change",
            EventMetadata::new("World time advanced", S::TimeChange)
                .with_priority(Priority::new(1))
                .with_batching(true)
                .with_sampling_rate(0.1)
                .map_field("minecraft.world.time", "world_time")
                .map_field("minecraft.world.day_time", "day_time"),
        ),
        (
            "minecraft:chunk_load",
            EventMetadata::new("Chunk loaded", S::Chunk)
                .with_priority(Priority::new(2))
                .with_batching(true)
                .map_computed("minecraft.world.chunks.{chunk_x}_{chunk_z}.loaded", |_| {
                    Some(json!(true))
                })
                .map_field("minecraft.world.chunks.{chunk_x}_{chunk_z}.loaded_at", "time"),
        ),
        (
            "minecraft:chunk_unload",
            EventMetadata::new("Chunk unloaded", S::Chunk)
                .with_priority(Priority::new(2))
                .with_batching(true)
                .map_computed("minecraft.world.chunks.{chunk_x}_{chunk_z}.loaded", |_| {
                    Some(json!(false))
                })
                .map_field("minecraft.world.chunks.{chunk_x}_{chunk_z}.unloaded_at", "time"),
        ),
        (
            "minecraft:item_drop",
            EventMetadata::new("Bot dropped an item", S::ItemAction)
                .with_priority(Priority::new(30))
                .map_field("minecraft.bot.items.last_drop", "item")
                .map_field("minecraft.bot.items.last_drop_time", "time"),
        ),
        (
            "minecraft:item_pickup",
            EventMetadata::new("Bot picked up an item", S::ItemAction)
                .with_priority(Priority::new(30))
                .map_field("minecraft.bot.items.last_pickup", "item")
                .map_field("minecraft.bot.items.last_pickup_time", "time"),
        ),
        (
            "minecraft:item_craft",
            EventMetadata::new("Bot crafted an item", S::ItemCraft)
                .with_priority(Priority::new(35))
                .map_field("minecraft.bot.crafting.last_result", "result_item")
                .map_computed("minecraft.bot.crafting.last_ingredient_count", |payload| {
                    payload
                        .get("ingredients")
                        .and_then(Value::as_array)
                        .map(|items| json!(items.len()))
                })
                .map_field("minecraft.bot.crafting.last_craft_time", "time"),
        ),
        (
            "minecraft:item_consume",
            EventMetadata::new("Bot consumed an item", S::ItemAction)
                .with_priority(Priority::new(35))
                .map_field("minecraft.bot.items.last_consumed", "item")
                .map_field("minecraft.bot.items.last_consume_time", "time"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_defaults_for_unknown_types() {
        let registry = EventRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.priority("x:y"), Priority::NONE);
        assert!(!registry.is_batch_enabled("x:y"));
        assert_eq!(registry.sampling_rate("x:y"), 1.0);
        assert!(registry
            .resolve_state_mapping("x:y", &object(json!({"time": 1})))
            .is_empty());
    }

    #[test]
    fn test_canonical_registry_contents() {
        let registry = EventRegistry::with_defaults();
        assert_eq!(registry.len(), 28);

        assert_eq!(registry.priority("minecraft:spawn"), Priority::new(100));
        assert_eq!(registry.priority("minecraft:bot_death"), Priority::new(100));
        assert_eq!(registry.priority("minecraft:health"), Priority::new(75));
        assert_eq!(registry.priority("minecraft:chat"), Priority::new(50));

        assert!(registry.is_batch_enabled("minecraft:position"));
        assert_eq!(registry.sampling_rate("minecraft:position"), 0.1);
        assert!(registry.is_batch_enabled("minecraft:time_change"));
        assert_eq!(registry.sampling_rate("minecraft:time_change"), 0.1);
        assert!(registry.is_batch_enabled("minecraft:block_update"));
        assert_eq!(registry.sampling_rate("minecraft:block_update"), 1.0);

        assert!(!registry.is_batch_enabled("minecraft:spawn"));
        assert_eq!(registry.sampling_rate("minecraft:spawn"), 1.0);

        let events = registry.list_events();
        assert_eq!(events["minecraft:chat"], "Chat message received");
    }

    #[test]
    fn test_resolve_spawn_mapping() {
        let registry = EventRegistry::with_defaults();
        let payload = object(json!({
            "spawned": true,
            "position": {"x": 1.0, "y": 64.0, "z": 2.0},
            "time": 1000
        }));

        let delta = registry.resolve_state_mapping("minecraft:spawn", &payload);
        assert_eq!(delta["minecraft.spawned"], json!(true));
        assert_eq!(delta["minecraft.position"]["y"], json!(64.0));
        assert_eq!(delta["minecraft.spawn_time"], json!(1000));
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let registry = EventRegistry::with_defaults();
        let payload = object(json!({"x": 1.0, "y": 2.0, "z": 3.0, "time": 9}));

        let delta = registry.resolve_state_mapping("minecraft:position", &payload);
        assert_eq!(delta.len(), 4);
        assert!(!delta.contains_key("minecraft.bot.position.yaw"));
        assert!(!delta.contains_key("minecraft.bot.position.pitch"));
    }

    #[test]
    fn test_numeric_placeholders() {
        let registry = EventRegistry::with_defaults();
        let payload = object(json!({"slot": 36, "item_name": "torch", "count": 12, "time": 5}));

        let delta = registry.resolve_state_mapping("minecraft:inventory_change", &payload);
        assert_eq!(delta["minecraft.bot.inventory.slots.36.item"], "torch");
        assert_eq!(delta["minecraft.bot.inventory.slots.36.count"], 12);
        assert_eq!(delta["minecraft.bot.inventory.last_change"], 5);
    }

    #[test]
    fn test_multiple_placeholders_and_computed_values() {
        let registry = EventRegistry::with_defaults();
        let payload = object(json!({"chunk_x": -3, "chunk_z": 7, "time": 11}));

        let delta = registry.resolve_state_mapping("minecraft:chunk_load", &payload);
        assert_eq!(delta["minecraft.world.chunks.-3_7.loaded"], json!(true));
        assert_eq!(delta["minecraft.world.chunks.-3_7.loaded_at"], json!(11));
    }

    #[test]
    fn test_unresolved_placeholder_is_kept() {
        let payload = object(json!({"time": 1}));
        assert_eq!(
            resolve_placeholders("a.{missing}.b", &payload),
            "a.{missing}.b"
        );
        assert_eq!(resolve_placeholders("a.{open", &payload), "a.{open");
    }

    #[test]
    fn test_register_overwrites() {
        let mut registry = EventRegistry::with_defaults();
        registry.register(
            "minecraft:chat",
            EventMetadata::new("Muted chat", PayloadSchema::Chat).with_priority(Priority::new(1)),
        );
        assert_eq!(registry.priority("minecraft:chat"), Priority::new(1));
        assert_eq!(registry.len(), 28);
    }

    #[test]
    fn test_sampling_rate_is_clamped() {
        let metadata = EventMetadata::new("x", PayloadSchema::Generic).with_sampling_rate(4.0);
        assert_eq!(metadata.sampling_rate(), 1.0);
        let metadata = EventMetadata::new("x", PayloadSchema::Generic).with_sampling_rate(0.0);
        assert_eq!(metadata.sampling_rate(), 1.0);
        let metadata = EventMetadata::new("x", PayloadSchema::Generic).with_sampling_rate(f64::NAN);
        assert_eq!(metadata.sampling_rate(), 1.0);
    }

    #[test]
    fn test_validate_payload() {
        let registry = EventRegistry::with_defaults();
        let payload = object(json!({"username": "a", "message": "b", "time": 1}));
        assert!(registry.validate_payload("minecraft:chat", &payload).is_ok());

        match registry.validate_payload("minecraft:nope", &payload) {
            Err(RegistryError::UnknownEventType { event_type }) => {
                assert_eq!(event_type, "minecraft:nope")
            }
            other => panic!("Expected unknown type error, got {:?}", other),
        }

        let bad = object(json!({"username": "a", "time": 1}));
        assert!(matches!(
            registry.validate_payload("minecraft:chat", &bad),
            Err(RegistryError::InvalidPayload { .. })
        ));
    }
}
