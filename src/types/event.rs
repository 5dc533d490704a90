//! Journal events and the auxiliary state that travels with them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field every journal entry carries with its type name.
pub const EVENT_FIELD: &str = "event";

/// Enrichment field holding the commander's current ship id.
pub const SHIP_ID_FIELD: &str = "_shipId";

/// Enrichment field holding the current star system address.
pub const SYSTEM_ADDRESS_FIELD: &str = "_systemAddress";

/// Errors raised when a raw JSON value is not a usable journal event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("journal entry is not a JSON object")]
    NotAnObject,
    #[error("journal entry has no string `event` field")]
    MissingEventName,
    #[error("malformed journal line: {0}")]
    Json(String),
}

/// One journal entry: an opaque JSON object with a string `event` field.
///
/// Serializes exactly as the underlying object, so the submitted body is the
/// entry the game wrote plus any enrichment fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct JournalEvent {
    fields: Map<String, Value>,
}

impl JournalEvent {
    /// Build an event from a JSON value, checking the `event` field.
    pub fn from_value(value: Value) -> Result<Self, EventError> {
        match value {
            Value::Object(fields) => Self::try_from(fields),
            _ => Err(EventError::NotAnObject),
        }
    }

    /// Parse one journal line.
    pub fn from_json_str(line: &str) -> Result<Self, EventError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| EventError::Json(e.to_string()))?;
        Self::from_value(value)
    }

    /// Event type name (`Docked`, `CarrierJump`, ...).
    pub fn name(&self) -> &str {
        self.fields
            .get(EVENT_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// JSON body as submitted.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Merge `_shipId` / `_systemAddress` from the auxiliary state.
    ///
    /// Additive only: a field already present on the event is never replaced,
    /// and null or absent state values add nothing.
    pub fn enrich(&mut self, aux: &AuxState) {
        if let Some(ship_id) = aux.ship_id() {
            self.insert_absent(SHIP_ID_FIELD, ship_id.clone());
        }
        if let Some(address) = aux.system_address() {
            self.insert_absent(SYSTEM_ADDRESS_FIELD, address.clone());
        }
    }

    fn insert_absent(&mut self, key: &str, value: Value) {
        self.fields.entry(key.to_string()).or_insert(value);
    }
}

impl TryFrom<Map<String, Value>> for JournalEvent {
    type Error = EventError;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        match fields.get(EVENT_FIELD) {
            Some(Value::String(_)) => Ok(Self { fields }),
            _ => Err(EventError::MissingEventName),
        }
    }
}

impl From<JournalEvent> for Map<String, Value> {
    fn from(event: JournalEvent) -> Self {
        event.fields
    }
}

/// Session state supplied next to each raw event (the host's `state` dict).
///
/// Only `ShipID` and `SystemAddress` are read by the relay; everything else is
/// carried along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuxState {
    fields: Map<String, Value>,
}

impl AuxState {
    pub const SHIP_ID: &'static str = "ShipID";
    pub const SYSTEM_ADDRESS: &'static str = "SystemAddress";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    pub fn ship_id(&self) -> Option<&Value> {
        self.get(Self::SHIP_ID)
    }

    pub fn system_address(&self) -> Option<&Value> {
        self.get(Self::SYSTEM_ADDRESS)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
