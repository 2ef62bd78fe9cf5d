//! Decoding of `kubectl get -o json` list documents into [`ResourceState`]s.
//!
//! Custom resources carry arbitrary `spec`/`status` shapes, so those are read
//! leniently from `serde_json::Value`. Items without a name are skipped.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{ClientError, Condition, ResourceState};
use crate::model::ResourceKind;

#[derive(Debug, Deserialize)]
struct ListDoc {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Item {
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    spec: Value,
    #[serde(default)]
    status: Value,
    // Event fields live at the top level.
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    involved_object: Option<ObjectRef>,
    #[serde(default)]
    first_timestamp: Option<String>,
    #[serde(default)]
    event_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    creation_timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectRef {
    #[serde(default)]
    name: Option<String>,
}

/// Decode a list document for resources of `kind`.
pub fn decode_list(kind: ResourceKind, raw: &[u8]) -> Result<Vec<ResourceState>, ClientError> {
    let doc: ListDoc = serde_json::from_slice(raw).map_err(|e| ClientError::Decode {
        what: format!("{kind} list"),
        message: e.to_string(),
    })?;

    let mut states = Vec::with_capacity(doc.items.len());
    for item in doc.items {
        match decode_item(kind, item) {
            Some(state) => states.push(state),
            None => debug!(resource = %kind, "skipping item without metadata.name"),
        }
    }
    Ok(states)
}

fn decode_item(kind: ResourceKind, item: Item) -> Option<ResourceState> {
    let name = item.metadata.name?;
    let mut state = ResourceState::new(kind, name);
    state.namespace = item.metadata.namespace.unwrap_or_default();
    state.labels = item.metadata.labels.unwrap_or_default();
    state.created_at = item
        .metadata
        .creation_timestamp
        .as_deref()
        .and_then(parse_timestamp);

    if kind == ResourceKind::Workload {
        // Older CLIs suffix the object name; the short name lives in spec.name.value.
        state.workload_name = item
            .spec
            .pointer("/name/value")
            .and_then(Value::as_str)
            .map(String::from);
    }

    state.conditions = item
        .status
        .get("conditions")
        .and_then(Value::as_array)
        .map(|conditions| conditions.iter().filter_map(decode_condition).collect())
        .unwrap_or_default();

    if kind == ResourceKind::Event {
        state.reason = item.reason;
        state.message = item.message;
        state.involved_object = item.involved_object.and_then(|o| o.name);
        state.first_timestamp = item
            .first_timestamp
            .as_deref()
            .or(item.event_time.as_deref())
            .and_then(parse_timestamp);
    }

    Some(state)
}

fn decode_condition(value: &Value) -> Option<Condition> {
    let type_ = value.get("type")?.as_str()?;
    let status = value.get("status").and_then(Value::as_str).unwrap_or("Unknown");
    Some(Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: value
            .get("reason")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .map(String::from),
        last_transition_time: value
            .get("lastTransitionTime")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
