//! Protocol-side value descriptors (`Runtime.RemoteObject`, `Runtime.PropertyDescriptor`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the pseudo-property remote instrumentation attaches for cycle detection.
pub const CYCLE_ID_PROPERTY: &str = "apparitionId";

/// Coarse classification of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Primitive,
    Object,
}

/// A value as described by the remote runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unserializable_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RemoteObject {
    pub fn primitive(value: Value) -> Self {
        let type_name = match &value {
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) => "object",
        };
        Self {
            type_name: type_name.to_string(),
            subtype: value.is_null().then(|| "null".to_string()),
            class_name: None,
            object_id: None,
            value: Some(value),
            unserializable_value: None,
            description: None,
        }
    }

    pub fn undefined() -> Self {
        Self {
            type_name: "undefined".to_string(),
            subtype: None,
            class_name: None,
            object_id: None,
            value: None,
            unserializable_value: None,
            description: None,
        }
    }

    /// An object-kind descriptor carrying a remote handle.
    pub fn object(object_id: impl Into<String>) -> Self {
        Self {
            type_name: "object".to_string(),
            subtype: None,
            class_name: None,
            object_id: Some(object_id.into()),
            value: None,
            unserializable_value: None,
            description: None,
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// `object`, `function` and `symbol` values live remotely; everything else is inlined.
    pub fn kind(&self) -> ValueKind {
        match self.type_name.as_str() {
            "object" | "function" | "symbol" => ValueKind::Object,
            _ => ValueKind::Primitive,
        }
    }

    pub fn is_node(&self) -> bool {
        self.subtype.as_deref() == Some("node")
    }

    /// Classify the descriptor into the closed set of resolution strategies.
    pub fn shape(&self) -> Shape<'_> {
        if self.kind() == ValueKind::Primitive {
            return Shape::Primitive;
        }
        // Functions and symbols are never walked.
        if self.type_name != "object" {
            return Shape::Opaque;
        }
        if self.is_node() {
            return Shape::Node;
        }
        let id = self.object_id.as_deref();
        match (self.subtype.as_deref(), id) {
            (Some("array"), Some(id)) => return Shape::Array(id),
            (Some("date"), Some(id)) => return Shape::Date(id),
            _ => {}
        }
        if self.class_name.as_deref() == Some("Window") {
            return Shape::Window(id);
        }
        // Everything below is only walkable through a handle.
        let Some(id) = id else {
            return Shape::Opaque;
        };
        match self.class_name.as_deref() {
            Some("ValidityState") => Shape::Inherited(id),
            Some(_) => Shape::Object(id),
            None => Shape::Opaque,
        }
    }
}

/// Resolution strategy for a descriptor, in dispatch priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape<'a> {
    Array(&'a str),
    Node,
    Date(&'a str),
    /// The global object; the handle is passed through even when absent.
    Window(Option<&'a str>),
    /// Object whose data lives on its prototype chain.
    Inherited(&'a str),
    Object(&'a str),
    /// Object kind with nothing to walk; resolves to its inlined value.
    Opaque,
    Primitive,
}

/// One entry of a `Runtime.getProperties` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    /// Absent for accessor properties.
    #[serde(default)]
    pub value: Option<RemoteObject>,
    #[serde(default)]
    pub enumerable: bool,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, value: RemoteObject) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
            enumerable: true,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.enumerable = false;
        self
    }

    pub fn is_cycle_marker(&self) -> bool {
        self.name == CYCLE_ID_PROPERTY
    }

    /// Whether the property belongs in resolved output.
    pub fn is_visible(&self) -> bool {
        self.enumerable && !self.is_cycle_marker()
    }
}

/// Identifier the instrumentation layer tags each container with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CycleId(String);

impl CycleId {
    /// Extract the identifier from a property list, if the marker carries a literal.
    pub fn find(properties: &[PropertyDescriptor]) -> Option<Self> {
        let literal = properties
            .iter()
            .find(|p| p.is_cycle_marker())?
            .value
            .as_ref()?
            .value
            .as_ref()?;
        match literal {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) => Some(Self(s.clone())),
            other => Some(Self(other.to_string())),
        }
    }
}
