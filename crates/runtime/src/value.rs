//! Local representation of resolved remote values.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::remote::RemoteObject;

/// Placeholder emitted where a container refers back to one of its ancestors.
pub const CYCLIC_SENTINEL: &str = "(cyclic structure)";

/// Index of a container in a [`Resolved`] graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub(crate) usize);

/// Handle returned in place of the global object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle {
    pub object_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocalValue {
    Undefined,
    Literal(Value),
    /// `NaN`, `Infinity`, `-0` and bigint literals, which JSON cannot carry.
    Unserializable(String),
    Array(Vec<LocalValue>),
    Object(ObjectId),
    Date(DateTime<Utc>),
    /// DOM node left unresolved; the descriptor is the handle.
    Node(RemoteObject),
    Window(WindowHandle),
    Cyclic,
}

impl LocalValue {
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Self::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[LocalValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_cyclic(&self) -> bool {
        matches!(self, Self::Cyclic)
    }
}

/// Ordered property map of one resolved container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap {
    entries: Vec<(String, LocalValue)>,
}

impl PropertyMap {
    pub fn get(&self, name: &str) -> Option<&LocalValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub(crate) fn insert(&mut self, name: String, value: LocalValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LocalValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The output of one resolution: a root value plus the containers it references.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    root: LocalValue,
    objects: Vec<PropertyMap>,
}

impl Resolved {
    pub(crate) fn new(root: LocalValue, objects: Vec<PropertyMap>) -> Self {
        Self { root, objects }
    }

    pub fn root(&self) -> &LocalValue {
        &self.root
    }

    pub fn into_root(self) -> LocalValue {
        self.root
    }

    pub fn object(&self, id: ObjectId) -> &PropertyMap {
        &self.objects[id.0]
    }

    /// Look up a property of the container `value` refers to.
    pub fn property<'a>(&'a self, value: &LocalValue, name: &str) -> Option<&'a LocalValue> {
        let id = value.as_object()?;
        self.objects.get(id.0)?.get(name)
    }

    /// Number of distinct containers in the graph.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn to_json(&self) -> Value {
        self.render(&self.root)
    }

    /// Render `value` as JSON. Shared containers are expanded at each use.
    pub fn render(&self, value: &LocalValue) -> Value {
        match value {
            LocalValue::Undefined => Value::Null,
            LocalValue::Literal(v) => v.clone(),
            LocalValue::Unserializable(s) => Value::String(s.clone()),
            LocalValue::Array(items) => {
                Value::Array(items.iter().map(|item| self.render(item)).collect())
            }
            LocalValue::Object(id) => {
                let map: Map<String, Value> = self.objects[id.0]
                    .iter()
                    .map(|(k, v)| (k.to_string(), self.render(v)))
                    .collect();
                Value::Object(map)
            }
            LocalValue::Date(dt) => {
                Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            LocalValue::Node(descriptor) => {
                serde_json::to_value(descriptor).unwrap_or(Value::Null)
            }
            LocalValue::Window(handle) => {
                serde_json::json!({ "objectId": handle.object_id })
            }
            LocalValue::Cyclic => Value::String(CYCLIC_SENTINEL.to_string()),
        }
    }
}
