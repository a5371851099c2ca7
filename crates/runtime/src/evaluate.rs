//! Evaluate script in the remote context and resolve the result locally.

use apparition_core::{EvaluateConfig, Result};
use serde_json::{json, Value};
use tracing::debug;

use crate::protocol::{decode_evaluation, CdpRuntime, CommandChannel};
use crate::remote::RemoteObject;
use crate::resolver::Resolver;
use crate::value::Resolved;

/// Driver-side entry point: turns expressions into descriptors, then local values.
pub struct Evaluator<C> {
    runtime: CdpRuntime<C>,
    options: EvaluateConfig,
}

impl<C: CommandChannel> Evaluator<C> {
    pub fn new(channel: C, session_id: Option<String>, options: EvaluateConfig) -> Self {
        Self {
            runtime: CdpRuntime::new(channel, session_id),
            options,
        }
    }

    pub fn runtime(&self) -> &CdpRuntime<C> {
        &self.runtime
    }

    /// Evaluate `expression` and return its descriptor without resolving it.
    pub async fn evaluate_remote(&self, expression: &str) -> Result<RemoteObject> {
        let mut params = json!({
            "expression": expression,
            "returnByValue": false,
            "awaitPromise": self.options.await_promise,
            "userGesture": self.options.user_gesture,
            "includeCommandLineAPI": self.options.include_command_line_api,
        });
        self.apply_object_group(&mut params);

        debug!(expression, "Runtime.evaluate");
        let response = self
            .runtime
            .channel()
            .send_command(self.runtime.session_id(), "Runtime.evaluate", params)
            .await?;
        decode_evaluation(&response, "Runtime.evaluate")
    }

    /// Evaluate `expression` and resolve the result.
    pub async fn evaluate(&self, expression: &str) -> Result<Resolved> {
        let descriptor = self.evaluate_remote(expression).await?;
        self.resolve(&descriptor).await
    }

    /// Call `function_declaration` on a remote object with literal arguments and
    /// resolve the result.
    pub async fn call_function_on(
        &self,
        object_id: &str,
        function_declaration: &str,
        args: &[Value],
    ) -> Result<Resolved> {
        let arguments: Vec<Value> = args.iter().map(|a| json!({ "value": a })).collect();
        let mut params = json!({
            "objectId": object_id,
            "functionDeclaration": function_declaration,
            "arguments": arguments,
            "returnByValue": false,
            "awaitPromise": self.options.await_promise,
            "userGesture": self.options.user_gesture,
        });
        self.apply_object_group(&mut params);

        debug!(object_id, "Runtime.callFunctionOn");
        let response = self
            .runtime
            .channel()
            .send_command(self.runtime.session_id(), "Runtime.callFunctionOn", params)
            .await?;
        let descriptor = decode_evaluation(&response, "Runtime.callFunctionOn")?;
        self.resolve(&descriptor).await
    }

    pub async fn resolve(&self, descriptor: &RemoteObject) -> Result<Resolved> {
        Resolver::new(&self.runtime).resolve(descriptor).await
    }

    fn apply_object_group(&self, params: &mut Value) {
        if let Some(group) = self.options.object_group() {
            params["objectGroup"] = json!(group);
        }
    }
}
