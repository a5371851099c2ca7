//! Recursive conversion of remote value descriptors into local values.
//!
//! Each call to [`Resolver::resolve`] walks the remote graph depth-first, one
//! RPC at a time. Containers are allocated in an arena owned by the call;
//! containers tagged with a cycle identifier are registered before their
//! properties are resolved, so a back-reference to an ancestor becomes
//! [`LocalValue::Cyclic`] and a second reference to a finished container
//! shares its [`ObjectId`].
//!
//! Arrays are never registered. A remote array that reaches itself through its
//! elements is walked until the remote graph or the stack runs out.

use apparition_core::{Error, Result};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::protocol::{RemoteRuntime, DATE_TO_UTC_STRING};
use crate::remote::{CycleId, PropertyDescriptor, RemoteObject, Shape};
use crate::value::{LocalValue, ObjectId, PropertyMap, Resolved, WindowHandle};

/// Resolves descriptors against one session's remote runtime.
pub struct Resolver<'r, R: ?Sized> {
    runtime: &'r R,
}

impl<'r, R: RemoteRuntime + ?Sized> Resolver<'r, R> {
    pub fn new(runtime: &'r R) -> Self {
        Self { runtime }
    }

    /// Resolve `descriptor` into a fully local value graph.
    pub async fn resolve(&self, descriptor: &RemoteObject) -> Result<Resolved> {
        let mut resolution = Resolution {
            runtime: self.runtime,
            cache: HashMap::new(),
            slots: Vec::new(),
        };
        let root = resolution.resolve_value(descriptor).await?;
        debug!(containers = resolution.slots.len(), "Resolved remote value");
        Ok(Resolved::new(
            root,
            resolution.slots.into_iter().map(|s| s.properties).collect(),
        ))
    }
}

struct Slot {
    properties: PropertyMap,
    complete: bool,
}

/// State scoped to one top-level resolve.
struct Resolution<'r, R: ?Sized> {
    runtime: &'r R,
    cache: HashMap<CycleId, ObjectId>,
    slots: Vec<Slot>,
}

impl<'r, R: RemoteRuntime + ?Sized> Resolution<'r, R> {
    fn resolve_value<'a>(
        &'a mut self,
        descriptor: &'a RemoteObject,
    ) -> BoxFuture<'a, Result<LocalValue>> {
        async move {
            match descriptor.shape() {
                Shape::Array(id) => self.resolve_array(id).await,
                Shape::Node => Ok(LocalValue::Node(descriptor.clone())),
                Shape::Date(id) => self.resolve_date(id).await,
                Shape::Window(id) => Ok(LocalValue::Window(WindowHandle {
                    object_id: id.map(str::to_string),
                })),
                Shape::Inherited(id) => self.resolve_object(id, false).await,
                Shape::Object(id) => self.resolve_object(id, true).await,
                Shape::Opaque | Shape::Primitive => Ok(literal(descriptor)),
            }
        }
        .boxed()
    }

    async fn resolve_array(&mut self, object_id: &str) -> Result<LocalValue> {
        let properties = self.runtime.get_properties(object_id, true).await?;
        let mut items = Vec::with_capacity(properties.len());
        for property in properties.iter().filter(|p| p.is_visible()) {
            let item = match &property.value {
                // DOM subtrees are not walked from inside arrays.
                Some(value) if value.is_node() => LocalValue::Node(value.clone()),
                Some(value) => self.resolve_value(value).await?,
                None => LocalValue::Undefined,
            };
            items.push(item);
        }
        Ok(LocalValue::Array(items))
    }

    async fn resolve_date(&mut self, object_id: &str) -> Result<LocalValue> {
        let result = self
            .runtime
            .evaluate_on_object(object_id, DATE_TO_UTC_STRING, true)
            .await?;
        let text = result
            .value
            .as_ref()
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Protocol(format!(
                    "Date stringification of {} returned no string",
                    object_id
                ))
            })?;
        parse_utc_string(text).map(LocalValue::Date)
    }

    async fn resolve_object(
        &mut self,
        object_id: &str,
        own_properties: bool,
    ) -> Result<LocalValue> {
        let properties = self.runtime.get_properties(object_id, own_properties).await?;

        let id = match CycleId::find(&properties) {
            Some(cycle_id) => match self.cache.get(&cycle_id).copied() {
                Some(id) if !self.slots[id.0].complete => {
                    trace!(object_id, "Cycle detected");
                    return Ok(LocalValue::Cyclic);
                }
                Some(id) => return Ok(LocalValue::Object(id)),
                None => {
                    let id = self.allocate();
                    self.cache.insert(cycle_id, id);
                    id
                }
            },
            None => self.allocate(),
        };

        self.populate(id, &properties).await?;
        self.slots[id.0].complete = true;
        Ok(LocalValue::Object(id))
    }

    async fn populate(
        &mut self,
        id: ObjectId,
        properties: &[PropertyDescriptor],
    ) -> Result<()> {
        for property in properties.iter().filter(|p| p.is_visible()) {
            let value = match &property.value {
                Some(value) => self.resolve_value(value).await?,
                None => LocalValue::Undefined,
            };
            self.slots[id.0].properties.insert(property.name.clone(), value);
        }
        Ok(())
    }

    fn allocate(&mut self) -> ObjectId {
        self.slots.push(Slot {
            properties: PropertyMap::default(),
            complete: false,
        });
        ObjectId(self.slots.len() - 1)
    }
}

fn literal(descriptor: &RemoteObject) -> LocalValue {
    match (&descriptor.value, &descriptor.unserializable_value) {
        (Some(value), _) => LocalValue::Literal(value.clone()),
        (None, Some(raw)) => LocalValue::Unserializable(raw.clone()),
        (None, None) => LocalValue::Undefined,
    }
}

/// Parse the output of `Date.prototype.toUTCString`, e.g. `Tue, 15 Nov 1994 08:12:31 GMT`.
pub fn parse_utc_string(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| Error::DateParse {
            input: text.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CdpRuntime;
    use crate::remote::CYCLE_ID_PROPERTY;
    use crate::replay::ReplayChannel;
    use crate::value::CYCLIC_SENTINEL;
    use chrono::TimeZone;
    use serde_json::json;

    fn prop(name: &str, value: Value) -> Value {
        json!({ "name": name, "enumerable": true, "value": value })
    }

    fn hidden(name: &str, value: Value) -> Value {
        json!({ "name": name, "enumerable": false, "value": value })
    }

    fn cycle_marker(id: i64) -> Value {
        hidden(CYCLE_ID_PROPERTY, json!({ "type": "number", "value": id }))
    }

    fn object_ref(id: &str) -> Value {
        json!({ "type": "object", "className": "Object", "objectId": id })
    }

    async fn with_properties(channel: &ReplayChannel, object_id: &str, props: Vec<Value>) {
        channel
            .record(
                "Runtime.getProperties",
                json!({ "objectId": object_id }),
                json!({ "result": props }),
            )
            .await;
    }

    fn runtime(channel: ReplayChannel) -> CdpRuntime<ReplayChannel> {
        CdpRuntime::new(channel, Some("session-1".to_string()))
    }

    fn descriptor(raw: Value) -> RemoteObject {
        serde_json::from_value(raw).unwrap()
    }

    #[tokio::test]
    async fn test_primitives_issue_no_rpc() {
        let runtime = runtime(ReplayChannel::new());
        let resolver = Resolver::new(&runtime);

        for value in [json!(1.5), json!("text"), json!(true)] {
            let resolved = resolver.resolve(&RemoteObject::primitive(value.clone())).await.unwrap();
            assert_eq!(resolved.root(), &LocalValue::Literal(value));
        }
        let null = resolver.resolve(&RemoteObject::primitive(Value::Null)).await.unwrap();
        assert_eq!(null.root(), &LocalValue::Literal(Value::Null));
        let undefined = resolver.resolve(&RemoteObject::undefined()).await.unwrap();
        assert_eq!(undefined.root(), &LocalValue::Undefined);

        assert!(runtime.channel().commands().await.is_empty());
    }

    #[tokio::test]
    async fn test_unserializable_primitive() {
        let runtime = runtime(ReplayChannel::new());
        let nan = descriptor(json!({
            "type": "number",
            "unserializableValue": "NaN",
            "description": "NaN"
        }));
        let resolved = Resolver::new(&runtime).resolve(&nan).await.unwrap();
        assert_eq!(resolved.root(), &LocalValue::Unserializable("NaN".to_string()));
    }

    #[tokio::test]
    async fn test_array_keeps_order_and_drops_hidden() {
        let channel = ReplayChannel::new();
        with_properties(
            &channel,
            "arr",
            vec![
                prop("0", json!({ "type": "number", "value": 3 })),
                prop("1", json!({ "type": "string", "value": "b" })),
                cycle_marker(9),
                prop("2", json!({ "type": "boolean", "value": false })),
                hidden("length", json!({ "type": "number", "value": 3 })),
            ],
        )
        .await;
        let runtime = runtime(channel);

        let array = descriptor(json!({
            "type": "object",
            "subtype": "array",
            "className": "Array",
            "objectId": "arr"
        }));
        let resolved = Resolver::new(&runtime).resolve(&array).await.unwrap();
        assert_eq!(resolved.to_json(), json!([3, "b", false]));

        let sent = runtime.channel().commands().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].params["ownProperties"], json!(true));
        assert_eq!(sent[0].session_id.as_deref(), Some("session-1"));
    }

    #[tokio::test]
    async fn test_nodes_stay_raw_in_arrays_and_at_top() {
        let node = json!({
            "type": "object",
            "subtype": "node",
            "className": "HTMLDivElement",
            "objectId": "div-1",
            "description": "div#main"
        });
        let channel = ReplayChannel::new();
        with_properties(&channel, "arr", vec![prop("0", node.clone())]).await;
        let runtime = runtime(channel);
        let resolver = Resolver::new(&runtime);

        let array = descriptor(json!({ "type": "object", "subtype": "array", "objectId": "arr" }));
        let resolved = resolver.resolve(&array).await.unwrap();
        assert_eq!(
            resolved.root(),
            &LocalValue::Array(vec![LocalValue::Node(descriptor(node.clone()))])
        );

        let top = resolver.resolve(&descriptor(node.clone())).await.unwrap();
        assert_eq!(top.root(), &LocalValue::Node(descriptor(node.clone())));
        assert_eq!(top.to_json(), node);

        // Only the array was enumerated.
        assert_eq!(runtime.channel().count("Runtime.getProperties").await, 1);
    }

    #[tokio::test]
    async fn test_self_reference_yields_sentinel() {
        let channel = ReplayChannel::new();
        with_properties(
            &channel,
            "a",
            vec![
                cycle_marker(1),
                prop("name", json!({ "type": "string", "value": "loop" })),
                prop("me", object_ref("a")),
            ],
        )
        .await;
        let runtime = runtime(channel);

        let resolved = Resolver::new(&runtime)
            .resolve(&descriptor(object_ref("a")))
            .await
            .unwrap();
        let root = resolved.root();
        assert_eq!(resolved.property(root, "me"), Some(&LocalValue::Cyclic));
        assert_eq!(
            resolved.to_json(),
            json!({ "name": "loop", "me": CYCLIC_SENTINEL })
        );
        assert!(resolved.property(root, CYCLE_ID_PROPERTY).is_none());
        assert_eq!(runtime.channel().count("Runtime.getProperties").await, 2);
    }

    #[tokio::test]
    async fn test_indirect_cycle_terminates() {
        let channel = ReplayChannel::new();
        with_properties(
            &channel,
            "parent",
            vec![cycle_marker(1), prop("child", object_ref("child"))],
        )
        .await;
        with_properties(
            &channel,
            "child",
            vec![cycle_marker(2), prop("parent", object_ref("parent"))],
        )
        .await;
        let runtime = runtime(channel);

        let resolved = Resolver::new(&runtime)
            .resolve(&descriptor(object_ref("parent")))
            .await
            .unwrap();
        assert_eq!(
            resolved.to_json(),
            json!({ "child": { "parent": "(cyclic structure)" } })
        );
    }

    #[tokio::test]
    async fn test_aliased_objects_share_one_container() {
        let channel = ReplayChannel::new();
        with_properties(
            &channel,
            "root",
            vec![
                cycle_marker(1),
                prop("left", object_ref("shared")),
                prop("right", object_ref("shared")),
            ],
        )
        .await;
        with_properties(
            &channel,
            "shared",
            vec![cycle_marker(2), prop("v", json!({ "type": "number", "value": 7 }))],
        )
        .await;
        let runtime = runtime(channel);

        let resolved = Resolver::new(&runtime)
            .resolve(&descriptor(object_ref("root")))
            .await
            .unwrap();
        let root = resolved.root();
        let left = resolved.property(root, "left").and_then(LocalValue::as_object).unwrap();
        let right = resolved.property(root, "right").and_then(LocalValue::as_object).unwrap();
        assert_eq!(left, right);
        assert_eq!(resolved.object_count(), 2);
        assert_eq!(resolved.object(left).get("v"), Some(&LocalValue::Literal(json!(7))));
    }

    #[tokio::test]
    async fn test_objects_without_marker_are_not_shared() {
        let channel = ReplayChannel::new();
        with_properties(
            &channel,
            "root",
            vec![prop("left", object_ref("plain")), prop("right", object_ref("plain"))],
        )
        .await;
        with_properties(
            &channel,
            "plain",
            vec![prop("v", json!({ "type": "number", "value": 1 }))],
        )
        .await;
        let runtime = runtime(channel);

        let resolved = Resolver::new(&runtime)
            .resolve(&descriptor(object_ref("root")))
            .await
            .unwrap();
        let root = resolved.root();
        let left = resolved.property(root, "left").and_then(LocalValue::as_object).unwrap();
        let right = resolved.property(root, "right").and_then(LocalValue::as_object).unwrap();
        assert_ne!(left, right);
        assert_eq!(resolved.object(left), resolved.object(right));
    }

    #[tokio::test]
    async fn test_cache_is_scoped_to_one_resolve() {
        let channel = ReplayChannel::new();
        with_properties(
            &channel,
            "obj",
            vec![cycle_marker(5), prop("k", json!({ "type": "string", "value": "v" }))],
        )
        .await;
        let runtime = runtime(channel);
        let resolver = Resolver::new(&runtime);

        let first = resolver.resolve(&descriptor(object_ref("obj"))).await.unwrap();
        let second = resolver.resolve(&descriptor(object_ref("obj"))).await.unwrap();
        assert_eq!(first.to_json(), json!({ "k": "v" }));
        assert_eq!(first.to_json(), second.to_json());
        assert!(!second.root().is_cyclic());
    }

    #[tokio::test]
    async fn test_date_resolves_via_utc_string() {
        let channel = ReplayChannel::new();
        channel
            .record(
                "Runtime.callFunctionOn",
                json!({ "objectId": "d1", "returnByValue": true }),
                json!({ "result": { "type": "string", "value": "Tue, 15 Nov 1994 08:12:31 GMT" } }),
            )
            .await;
        let runtime = runtime(channel);

        let date = descriptor(json!({
            "type": "object",
            "subtype": "date",
            "className": "Date",
            "objectId": "d1"
        }));
        let resolved = Resolver::new(&runtime).resolve(&date).await.unwrap();
        assert_eq!(
            resolved.root(),
            &LocalValue::Date(Utc.with_ymd_and_hms(1994, 11, 15, 8, 12, 31).unwrap())
        );

        let sent = runtime.channel().commands().await;
        assert_eq!(sent[0].params["functionDeclaration"], json!(DATE_TO_UTC_STRING));
    }

    #[tokio::test]
    async fn test_malformed_date_is_date_parse_error() {
        let channel = ReplayChannel::new();
        channel
            .record(
                "Runtime.callFunctionOn",
                json!({ "objectId": "d1" }),
                json!({ "result": { "type": "string", "value": "Invalid Date" } }),
            )
            .await;
        let runtime = runtime(channel);

        let date = descriptor(json!({ "type": "object", "subtype": "date", "objectId": "d1" }));
        let err = Resolver::new(&runtime).resolve(&date).await.unwrap_err();
        assert!(matches!(err, Error::DateParse { ref input, .. } if input == "Invalid Date"));
    }

    #[tokio::test]
    async fn test_window_is_a_handle_without_enumeration() {
        let runtime = runtime(ReplayChannel::new());
        let window =
            descriptor(json!({ "type": "object", "className": "Window", "objectId": "win" }));

        let resolved = Resolver::new(&runtime).resolve(&window).await.unwrap();
        assert_eq!(resolved.to_json(), json!({ "objectId": "win" }));
        assert!(runtime.channel().commands().await.is_empty());
    }

    #[tokio::test]
    async fn test_validity_state_reads_prototype_chain() {
        let channel = ReplayChannel::new();
        channel
            .record(
                "Runtime.getProperties",
                json!({ "objectId": "vs", "ownProperties": false }),
                json!({ "result": [
                    prop("valid", json!({ "type": "boolean", "value": true })),
                    prop("valueMissing", json!({ "type": "boolean", "value": false })),
                    hidden(
                        "constructor",
                        json!({ "type": "function", "className": "Function", "objectId": "f" })
                    )
                ] }),
            )
            .await;
        let runtime = runtime(channel);

        let state = descriptor(json!({
            "type": "object",
            "className": "ValidityState",
            "objectId": "vs"
        }));
        let resolved = Resolver::new(&runtime).resolve(&state).await.unwrap();
        assert_eq!(resolved.to_json(), json!({ "valid": true, "valueMissing": false }));
    }

    #[tokio::test]
    async fn test_unclassified_object_returns_literal() {
        let runtime = runtime(ReplayChannel::new());
        let symbol =
            descriptor(json!({ "type": "symbol", "objectId": "s", "description": "Symbol(x)" }));
        let resolved = Resolver::new(&runtime).resolve(&symbol).await.unwrap();
        assert_eq!(resolved.root(), &LocalValue::Undefined);

        let by_value =
            descriptor(json!({ "type": "object", "className": "Object", "value": { "a": 1 } }));
        let resolved = Resolver::new(&runtime).resolve(&by_value).await.unwrap();
        assert_eq!(resolved.to_json(), json!({ "a": 1 }));
        assert!(runtime.channel().commands().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_rpc_fails_the_whole_resolution() {
        let channel = ReplayChannel::new();
        with_properties(&channel, "root", vec![prop("gone", object_ref("missing"))]).await;
        let runtime = runtime(channel);

        let err = Resolver::new(&runtime)
            .resolve(&descriptor(object_ref("root")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_methods_resolve_to_undefined_without_rpc() {
        let channel = ReplayChannel::new();
        with_properties(
            &channel,
            "o",
            vec![
                prop("a", json!({ "type": "number", "value": 1 })),
                prop(
                    "m",
                    json!({ "type": "function", "className": "Function", "objectId": "fn" }),
                ),
            ],
        )
        .await;
        let runtime = runtime(channel);

        let resolved = Resolver::new(&runtime)
            .resolve(&descriptor(object_ref("o")))
            .await
            .unwrap();
        let root = resolved.root();
        assert_eq!(resolved.property(root, "m"), Some(&LocalValue::Undefined));
        assert_eq!(resolved.to_json(), json!({ "a": 1, "m": null }));
        assert_eq!(runtime.channel().count("Runtime.getProperties").await, 1);
    }

    #[tokio::test]
    async fn test_handleless_node_and_window() {
        let runtime = runtime(ReplayChannel::new());
        let resolver = Resolver::new(&runtime);

        let node = json!({ "type": "object", "subtype": "node", "className": "HTMLDivElement" });
        let resolved = resolver.resolve(&descriptor(node.clone())).await.unwrap();
        assert_eq!(resolved.root(), &LocalValue::Node(descriptor(node)));

        let window = descriptor(json!({ "type": "object", "className": "Window" }));
        let resolved = resolver.resolve(&window).await.unwrap();
        assert_eq!(
            resolved.root(),
            &LocalValue::Window(WindowHandle { object_id: None })
        );
        assert_eq!(resolved.to_json(), json!({ "objectId": null }));

        assert!(runtime.channel().commands().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_share_a_channel() {
        let channel = std::sync::Arc::new(ReplayChannel::new());
        with_properties(
            &channel,
            "obj",
            vec![cycle_marker(1), prop("me", object_ref("obj"))],
        )
        .await;
        let first = CdpRuntime::new(channel.clone(), None);
        let second = CdpRuntime::new(channel.clone(), Some("other".to_string()));
        let root = descriptor(object_ref("obj"));
        let (left, right) = (Resolver::new(&first), Resolver::new(&second));

        let (a, b) = tokio::join!(left.resolve(&root), right.resolve(&root));
        let expected = json!({ "me": CYCLIC_SENTINEL });
        assert_eq!(a.unwrap().to_json(), expected);
        assert_eq!(b.unwrap().to_json(), expected);
        assert_eq!(channel.count("Runtime.getProperties").await, 4);
    }

    #[test]
    fn test_parse_utc_string() {
        let dt = parse_utc_string("Thu, 01 Jan 1970 00:00:00 GMT").unwrap();
        assert_eq!(dt.timestamp(), 0);
        assert!(parse_utc_string("yesterday").is_err());
    }
}
