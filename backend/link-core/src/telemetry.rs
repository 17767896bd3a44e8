use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

pub const FIELD_FIRMWARE: &str = "m_firmware";
pub const FIELD_VIN: &str = "car_vin";
pub const FIELD_GSM_SIGNAL: &str = "car_gsm_signal";
pub const FIELD_CAN_WRITE: &str = "canwrite";
pub const FIELD_CAR_TYPE: &str = "car_type";
pub const FIELD_NETWORK: &str = "m_mdm_network";
pub const FIELD_SERVICE_RANGE: &str = "servicerange";
pub const FIELD_SERVICE_TIME: &str = "servicetime";
pub const FIELD_HARDWARE: &str = "m_hardware";
pub const FIELD_MODEM_MODE: &str = "m_mdm_mode";
pub const FIELD_HVAC: &str = "hvac";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    Text(String),
    Integer(i64),
    Flag(bool),
}

impl TelemetryValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TelemetryValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TelemetryValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            TelemetryValue::Flag(flag) => Some(*flag),
            _ => None,
        }
    }
}

/// Shared field map written by the inbound dispatcher.
///
/// Clones share the same map. Updates from one message are applied under a
/// single write lock, but readers get no ordering guarantee across messages.
#[derive(Debug, Clone, Default)]
pub struct TelemetrySink {
    fields: Arc<RwLock<HashMap<String, TelemetryValue>>>,
}

impl TelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, key: &str, value: TelemetryValue) {
        self.fields.write().await.insert(key.to_string(), value);
    }

    pub async fn merge<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (&'static str, TelemetryValue)>,
    {
        let mut fields = self.fields.write().await;
        for (key, value) in entries {
            fields.insert(key.to_string(), value);
        }
    }

    pub async fn get(&self, key: &str) -> Option<TelemetryValue> {
        self.fields.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.fields.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.fields.read().await.is_empty()
    }

    /// Sorted copy of every field.
    pub async fn snapshot(&self) -> BTreeMap<String, TelemetryValue> {
        self.fields
            .read()
            .await
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub async fn snapshot_json(&self) -> serde_json::Value {
        let snapshot = self.snapshot().await;
        serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null)
    }
}
