//! The two remote operations the resolver depends on, and their CDP binding.

use apparition_core::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::remote::{PropertyDescriptor, RemoteObject};

/// Function declaration used to stringify remote dates.
pub const DATE_TO_UTC_STRING: &str = "function(){ return this.toUTCString() }";

/// A connection able to send one protocol command and await its `result` payload.
///
/// Implementations own framing and request/response correlation and must be
/// safe to share between concurrent callers.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    async fn send_command(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value>;
}

#[async_trait]
impl<C: CommandChannel + ?Sized> CommandChannel for Arc<C> {
    async fn send_command(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        (**self).send_command(session_id, method, params).await
    }
}

/// Remote operations scoped to one session.
#[async_trait]
pub trait RemoteRuntime: Send + Sync {
    /// Enumerate a remote object's properties, optionally walking its prototype chain.
    async fn get_properties(
        &self,
        object_id: &str,
        own_properties: bool,
    ) -> Result<Vec<PropertyDescriptor>>;

    /// Call `function_declaration` with `this` bound to the remote object.
    async fn evaluate_on_object(
        &self,
        object_id: &str,
        function_declaration: &str,
        return_by_value: bool,
    ) -> Result<RemoteObject>;
}

/// [`RemoteRuntime`] over the `Runtime` domain of a CDP session.
pub struct CdpRuntime<C> {
    channel: C,
    session_id: Option<String>,
}

impl<C: CommandChannel> CdpRuntime<C> {
    pub fn new(channel: C, session_id: Option<String>) -> Self {
        Self {
            channel,
            session_id,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.channel
            .send_command(self.session_id.as_deref(), method, params)
            .await
    }
}

#[async_trait]
impl<C: CommandChannel> RemoteRuntime for CdpRuntime<C> {
    async fn get_properties(
        &self,
        object_id: &str,
        own_properties: bool,
    ) -> Result<Vec<PropertyDescriptor>> {
        debug!(object_id, own_properties, "Runtime.getProperties");
        let response = self
            .call(
                "Runtime.getProperties",
                json!({
                    "objectId": object_id,
                    "ownProperties": own_properties,
                }),
            )
            .await?;
        let result = response.get("result").cloned().ok_or_else(|| {
            Error::Protocol(format!(
                "Runtime.getProperties response for {} has no result",
                object_id
            ))
        })?;
        serde_json::from_value(result).map_err(|e| {
            Error::Protocol(format!("Malformed property list for {}: {}", object_id, e))
        })
    }

    async fn evaluate_on_object(
        &self,
        object_id: &str,
        function_declaration: &str,
        return_by_value: bool,
    ) -> Result<RemoteObject> {
        debug!(object_id, "Runtime.callFunctionOn");
        let response = self
            .call(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": function_declaration,
                    "returnByValue": return_by_value,
                }),
            )
            .await?;
        decode_evaluation(&response, "Runtime.callFunctionOn")
    }
}

/// Decode the `{ result, exceptionDetails? }` payload of an evaluation command.
pub(crate) fn decode_evaluation(response: &Value, method: &str) -> Result<RemoteObject> {
    if let Some(details) = response.get("exceptionDetails") {
        return Err(Error::JavaScript(describe_exception(details)));
    }
    let result = response
        .get("result")
        .cloned()
        .ok_or_else(|| Error::Protocol(format!("{} response has no result", method)))?;
    serde_json::from_value(result)
        .map_err(|e| Error::Protocol(format!("Malformed {} result: {}", method, e)))
}

fn describe_exception(details: &Value) -> String {
    details
        .get("exception")
        .and_then(|e| e.get("description"))
        .and_then(|v| v.as_str())
        .or_else(|| details.get("text").and_then(|v| v.as_str()))
        .unwrap_or("Uncaught exception")
        .to_string()
}
