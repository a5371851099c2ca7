//! A [`CommandChannel`] that answers from a recorded protocol transcript.
//!
//! Transcripts are JSON documents of the form
//!
//! ```json
//! {
//!   "sessionId": "optional",
//!   "root": { "type": "object", "className": "Object", "objectId": "1" },
//!   "exchanges": [
//!     {
//!       "method": "Runtime.getProperties",
//!       "params": { "objectId": "1" },
//!       "result": { "result": [] }
//!     }
//!   ]
//! }
//! ```
//!
//! An exchange answers any command with the same method whose params contain
//! every recorded param. Exchanges are not consumed, so repeated requests get
//! the same answer.

use apparition_core::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::protocol::CommandChannel;
use crate::remote::RemoteObject;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Exchange {
    fn matches(&self, method: &str, params: &Value) -> bool {
        self.method == method && contains(params, &self.params)
    }
}

/// `recorded` is satisfied when every key it names has the same value in `sent`.
fn contains(sent: &Value, recorded: &Value) -> bool {
    match recorded {
        Value::Null => true,
        Value::Object(expected) => expected
            .iter()
            .all(|(k, v)| sent.get(k).map_or(false, |actual| actual == v)),
        other => sent == other,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcript {
    #[serde(default)]
    pub session_id: Option<String>,
    /// Descriptor to resolve directly.
    #[serde(default)]
    pub root: Option<RemoteObject>,
    /// Expression to evaluate when no root descriptor is recorded.
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub exchanges: Vec<Exchange>,
}

impl Transcript {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let transcript: Transcript = serde_json::from_str(&content)?;
        Ok(transcript)
    }
}

/// A command the channel received.
#[derive(Debug, Clone, PartialEq)]
pub struct SentCommand {
    pub session_id: Option<String>,
    pub method: String,
    pub params: Value,
}

#[derive(Default)]
pub struct ReplayChannel {
    exchanges: Mutex<Vec<Exchange>>,
    sent: Mutex<Vec<SentCommand>>,
}

impl ReplayChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_exchanges(exchanges: Vec<Exchange>) -> Self {
        Self {
            exchanges: Mutex::new(exchanges),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Register a successful response.
    pub async fn record(&self, method: &str, params: Value, result: Value) {
        self.exchanges.lock().await.push(Exchange {
            method: method.to_string(),
            params,
            result: Some(result),
            error: None,
        });
    }

    /// Register an error response.
    pub async fn record_error(&self, method: &str, params: Value, error: Value) {
        self.exchanges.lock().await.push(Exchange {
            method: method.to_string(),
            params,
            result: None,
            error: Some(error),
        });
    }

    pub async fn commands(&self) -> Vec<SentCommand> {
        self.sent.lock().await.clone()
    }

    /// Number of received commands with the given method.
    pub async fn count(&self, method: &str) -> usize {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|c| c.method == method)
            .count()
    }
}

#[async_trait]
impl CommandChannel for ReplayChannel {
    async fn send_command(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        self.sent.lock().await.push(SentCommand {
            session_id: session_id.map(str::to_string),
            method: method.to_string(),
            params: params.clone(),
        });

        let exchanges = self.exchanges.lock().await;
        let Some(exchange) = exchanges.iter().find(|e| e.matches(method, &params)) else {
            warn!(method, params = %params, "No recorded response");
            return Err(Error::Protocol(format!(
                "No recorded response for {} {}",
                method, params
            )));
        };
        debug!(method, "Replaying recorded response");

        if let Some(error) = &exchange.error {
            return Err(Error::Protocol(format!("CDP error: {}", error)));
        }
        Ok(exchange.result.clone().unwrap_or(Value::Null))
    }
}
