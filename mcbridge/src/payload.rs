//! Typed payloads for every registered event kind.
//!
//! Raw payloads arrive as JSON objects. After normalization the validator
//! decodes them into an [`EventPayload`] according to the [`PayloadSchema`]
//! recorded in the registry, which is where missing or mistyped fields are
//! reported.

#![allow(missing_docs)]

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An entity position in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

/// A block position in integer world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPosition {
    /// Block X coordinate.
    pub x: i64,
    /// Block Y coordinate.
    pub y: i64,
    /// Block Z coordinate.
    pub z: i64,
}

fn default_item_count() -> u32 {
    1
}

/// An item stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Lowercased item name.
    pub name: String,
    /// Stack size in `0..=64`.
    #[serde(default = "default_item_count")]
    pub count: u32,
    /// Inventory slot in `0..=255`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u32>,
    /// Additional item data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// `spawn`: the bot entered the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPayload {
    pub spawned: bool,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub health: Option<f64>,
    #[serde(default)]
    pub food: Option<f64>,
    pub time: i64,
}

/// `chat`: a chat message was received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatPayload {
    pub username: String,
    pub message: String,
    pub time: i64,
}

/// `player_joined` and `player_left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPresencePayload {
    pub username: String,
    pub uuid: String,
    pub time: i64,
}

/// `player_updated`: a tab-list entry changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdatedPayload {
    pub username: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub ping: Option<u32>,
    #[serde(default)]
    pub gamemode: Option<String>,
    pub time: i64,
}

/// `position`: the bot moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotPositionPayload {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: Option<f64>,
    #[serde(default)]
    pub pitch: Option<f64>,
    pub time: i64,
}

/// `health`: health, food or saturation changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPayload {
    pub health: f64,
    pub food: f64,
    pub saturation: f64,
    pub time: i64,
}

/// `block_update`: a block changed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockUpdatePayload {
    pub position: BlockPosition,
    #[serde(default)]
    pub old_block: Option<String>,
    pub new_block: String,
    pub time: i64,
}

/// `block_break` and `block_place`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockActionPayload {
    pub position: BlockPosition,
    pub block: String,
    #[serde(default)]
    pub tool: Option<String>,
    pub time: i64,
}

/// `entity_spawn` and `entity_death`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPayload {
    pub entity_id: u64,
    pub entity_type: String,
    pub position: Position,
    pub time: i64,
}

/// `entity_move`: an entity moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMovePayload {
    pub entity_id: u64,
    pub position: Position,
    #[serde(default)]
    pub velocity: Option<Position>,
    pub time: i64,
}

/// `entity_damage`: an entity took damage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDamagePayload {
    pub entity_id: u64,
    pub damage: f64,
    #[serde(default)]
    pub health: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
    pub time: i64,
}

/// `bot_death`: the bot died.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotDeathPayload {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    pub time: i64,
}

/// `bot_respawn`: the bot respawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotRespawnPayload {
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub health: Option<f64>,
    pub time: i64,
}

/// `inventory_change`: a slot changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryChangePayload {
    pub slot: u32,
    #[serde(default)]
    pub item_name: Option<String>,
    pub count: u32,
    pub time: i64,
}

/// `container_open` and `container_close`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerPayload {
    pub container_type: String,
    #[serde(default)]
    pub container_size: Option<u32>,
    #[serde(default)]
    pub container_position: Option<BlockPosition>,
    pub time: i64,
}

/// `explosion`: something exploded nearby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplosionPayload {
    pub position: Position,
    pub power: f64,
    #[serde(default)]
    pub affected_blocks: Option<u32>,
    pub time: i64,
}

/// `weather_change`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherChangePayload {
    pub weather: String,
    #[serde(default)]
    pub raining: Option<bool>,
    #[serde(default)]
    pub thundering: Option<bool>,
    pub time: i64,
}

/// `time_change`: the world clock advanced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeChangePayload {
    pub world_time: i64,
    #[serde(default)]
    pub day_time: Option<i64>,
    pub time: i64,
}

/// `chunk_load` and `chunk_unload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub chunk_x: i64,
    pub chunk_z: i64,
    pub time: i64,
}

/// `item_drop`, `item_pickup` and `item_consume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemActionPayload {
    pub item: Item,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub collector: Option<String>,
    pub time: i64,
}

/// `item_craft`: the bot crafted something.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCraftPayload {
    pub result_item: Item,
    #[serde(default)]
    pub ingredients: Vec<Item>,
    pub time: i64,
}

/// Any payload carrying at least a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericPayload {
    pub time: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Identifies which typed payload a registered event decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadSchema {
    Spawn,
    Chat,
    PlayerPresence,
    PlayerUpdated,
    BotPosition,
    Health,
    BlockUpdate,
    BlockAction,
    Entity,
    EntityMove,
    EntityDamage,
    BotDeath,
    BotRespawn,
    InventoryChange,
    Container,
    Explosion,
    WeatherChange,
    TimeChange,
    Chunk,
    ItemAction,
    ItemCraft,
    /// Accepts any object with a `time` field.
    Generic,
}

/// A decoded, strongly typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Spawn(SpawnPayload),
    Chat(ChatPayload),
    PlayerPresence(PlayerPresencePayload),
    PlayerUpdated(PlayerUpdatedPayload),
    BotPosition(BotPositionPayload),
    Health(HealthPayload),
    BlockUpdate(BlockUpdatePayload),
    BlockAction(BlockActionPayload),
    Entity(EntityPayload),
    EntityMove(EntityMovePayload),
    EntityDamage(EntityDamagePayload),
    BotDeath(BotDeathPayload),
    BotRespawn(BotRespawnPayload),
    InventoryChange(InventoryChangePayload),
    Container(ContainerPayload),
    Explosion(ExplosionPayload),
    WeatherChange(WeatherChangePayload),
    TimeChange(TimeChangePayload),
    Chunk(ChunkPayload),
    ItemAction(ItemActionPayload),
    ItemCraft(ItemCraftPayload),
    Generic(GenericPayload),
}

fn decode_as<T: DeserializeOwned>(payload: &Map<String, Value>) -> Result<T, String> {
    serde_json::from_value(Value::Object(payload.clone())).map_err(|e| e.to_string())
}

impl PayloadSchema {
    /// Decodes a normalized payload into its typed form.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use mcbridge::{EventPayload, PayloadSchema};
    /// use serde_json::json;
    ///
    /// let raw = json!({"username": "alex", "message": "hi", "time": 1});
    /// let decoded = PayloadSchema::Chat.decode(raw.as_object().unwrap()).unwrap();
    /// assert!(matches!(decoded, EventPayload::Chat(ref chat) if chat.username == "alex"));
    ///
    /// let missing = json!({"username": "alex", "time": 1});
    /// assert!(PayloadSchema::Chat.decode(missing.as_object().unwrap()).is_err());
    /// ```
    pub fn decode(self, payload: &Map<String, Value>) -> Result<EventPayload, String> {
        Ok(match self {
            PayloadSchema::Spawn => EventPayload::Spawn(decode_as(payload)?),
            PayloadSchema::Chat => EventPayload::Chat(decode_as(payload)?),
            PayloadSchema::PlayerPresence => EventPayload::PlayerPresence(decode_as(payload)?),
            PayloadSchema::PlayerUpdated => EventPayload::PlayerUpdated(decode_as(payload)?),
            PayloadSchema::BotPosition => EventPayload::BotPosition(decode_as(payload)?),
            PayloadSchema::Health => EventPayload::Health(decode_as(payload)?),
            PayloadSchema::BlockUpdate => EventPayload::BlockUpdate(decode_as(payload)?),
            PayloadSchema::BlockAction => EventPayload::BlockAction(decode_as(payload)?),
            PayloadSchema::Entity => EventPayload::Entity(decode_as(payload)?),
            PayloadSchema::EntityMove => EventPayload::EntityMove(decode_as(payload)?),
            PayloadSchema::EntityDamage => EventPayload::EntityDamage(decode_as(payload)?),
            PayloadSchema::BotDeath => EventPayload::BotDeath(decode_as(payload)?),
            PayloadSchema::BotRespawn => EventPayload::BotRespawn(decode_as(payload)?),
            PayloadSchema::InventoryChange => EventPayload::InventoryChange(decode_as(payload)?),
            PayloadSchema::Container => EventPayload::Container(decode_as(payload)?),
            PayloadSchema::Explosion => EventPayload::Explosion(decode_as(payload)?),
            PayloadSchema::WeatherChange => EventPayload::WeatherChange(decode_as(payload)?),
            PayloadSchema::TimeChange => EventPayload::TimeChange(decode_as(payload)?),
            PayloadSchema::Chunk => EventPayload::Chunk(decode_as(payload)?),
            PayloadSchema::ItemAction => EventPayload::ItemAction(decode_as(payload)?),
            PayloadSchema::ItemCraft => EventPayload::ItemCraft(decode_as(payload)?),
            PayloadSchema::Generic => EventPayload::Generic(decode_as(payload)?),
        })
    }

    /// Returns whether the `position` field of this schema is a block position.
    pub fn uses_block_position(self) -> bool {
        matches!(self, PayloadSchema::BlockUpdate | PayloadSchema::BlockAction)
    }
}

impl EventPayload {
    /// Returns the event time in milliseconds.
    pub fn time(&self) -> i64 {
        match self {
            EventPayload::Spawn(p) => p.time,
            EventPayload::Chat(p) => p.time,
            EventPayload::PlayerPresence(p) => p.time,
            EventPayload::PlayerUpdated(p) => p.time,
            EventPayload::BotPosition(p) => p.time,
            EventPayload::Health(p) => p.time,
            EventPayload::BlockUpdate(p) => p.time,
            EventPayload::BlockAction(p) => p.time,
            EventPayload::Entity(p) => p.time,
            EventPayload::EntityMove(p) => p.time,
            EventPayload::EntityDamage(p) => p.time,
            EventPayload::BotDeath(p) => p.time,
            EventPayload::BotRespawn(p) => p.time,
            EventPayload::InventoryChange(p) => p.time,
            EventPayload::Container(p) => p.time,
            EventPayload::Explosion(p) => p.time,
            EventPayload::WeatherChange(p) => p.time,
            EventPayload::TimeChange(p) => p.time,
            EventPayload::Chunk(p) => p.time,
            EventPayload::ItemAction(p) => p.time,
            EventPayload::ItemCraft(p) => p.time,
            EventPayload::Generic(p) => p.time,
        }
    }
}
