//! In-memory substrate and prober used by the unit tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::Duration;

use crate::core::dispatch::ActionItem;
use crate::core::dispatch::types::Priority;
use crate::core::health::probe::Prober;
use crate::core::substrate::{
    CONFLICT_CODE, OperationDefinition, RemoteOperation, Substrate, SubstrateError,
};

pub fn definition(name: &str) -> OperationDefinition {
    OperationDefinition {
        name: name.to_string(),
        description: format!("{} test operation", name),
        input_schema: json!({ "type": "object" }),
        source: json!({ "handler": name }),
    }
}

pub fn item(target: &str, description: &str) -> ActionItem {
    ActionItem {
        target: target.to_string(),
        description: description.to_string(),
        priority: Priority::Medium,
        metadata: Default::default(),
    }
}

fn content_id(definition: &OperationDefinition) -> String {
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(definition)
        .unwrap_or_default()
        .hash(&mut hasher);
    format!("op-{:016x}", hasher.finish())
}

#[derive(Default)]
struct SubstrateState {
    inventory: Vec<RemoteOperation>,
    deploy_failures: HashMap<String, String>,
    invoke_failures: HashMap<String, String>,
    list_failure: Option<String>,
    deploy_calls: usize,
    list_calls: usize,
    invocations: Vec<(String, Value)>,
}

/// Content-addressed fake: ids derive from the definition body, so an
/// identical redeploy reports a conflict.
#[derive(Default)]
pub struct MockSubstrate {
    state: Mutex<SubstrateState>,
}

impl MockSubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts an operation in the inventory without going through deploy.
    pub fn preload(&self, name: &str) {
        self.state.lock().unwrap().inventory.push(RemoteOperation {
            id: format!("legacy-{}", name),
            name: name.to_string(),
        });
    }

    pub fn fail_deploy(&self, name: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .deploy_failures
            .insert(name.to_string(), message.to_string());
    }

    pub fn fail_invoke(&self, name: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .invoke_failures
            .insert(name.to_string(), message.to_string());
    }

    pub fn fail_listing(&self, message: &str) {
        self.state.lock().unwrap().list_failure = Some(message.to_string());
    }

    pub fn inventory(&self) -> Vec<RemoteOperation> {
        self.state.lock().unwrap().inventory.clone()
    }

    pub fn deploy_calls(&self) -> usize {
        self.state.lock().unwrap().deploy_calls
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    /// Operation names invoked, in call order, with their inputs.
    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().invocations.clone()
    }
}

#[async_trait]
impl Substrate for MockSubstrate {
    async fn deploy(&self, definition: &OperationDefinition) -> Result<(), SubstrateError> {
        let mut state = self.state.lock().unwrap();
        state.deploy_calls += 1;
        if let Some(message) = state.deploy_failures.get(&definition.name) {
            return Err(SubstrateError::from_rpc(-32000, message.clone()));
        }
        let id = content_id(definition);
        if state.inventory.iter().any(|op| op.id == id) {
            return Err(SubstrateError::from_rpc(
                CONFLICT_CODE,
                format!("{} already exists", definition.name),
            ));
        }
        state.inventory.push(RemoteOperation {
            id,
            name: definition.name.clone(),
        });
        Ok(())
    }

    async fn list_operations(&self) -> Result<Vec<RemoteOperation>, SubstrateError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if let Some(message) = &state.list_failure {
            return Err(SubstrateError::from_rpc(-32000, message.clone()));
        }
        Ok(state.inventory.clone())
    }

    async fn invoke(&self, id: &str, input: Value) -> Result<Value, SubstrateError> {
        let mut state = self.state.lock().unwrap();
        let name = state
            .inventory
            .iter()
            .find(|op| op.id == id)
            .map(|op| op.name.clone())
            .ok_or_else(|| SubstrateError::from_rpc(-32601, format!("unknown operation {}", id)))?;
        state.invocations.push((name.clone(), input.clone()));
        if let Some(message) = state.invoke_failures.get(&name) {
            return Err(SubstrateError::from_rpc(-32000, message.clone()));
        }
        let count = input
            .get("actions")
            .and_then(Value::as_array)
            .map(|a| a.len())
            .unwrap_or(0);
        Ok(json!({ "operation": name, "processed": count }))
    }
}

#[derive(Default)]
struct ProberState {
    answers: HashMap<String, bool>,
    latency: HashMap<String, Duration>,
    calls: Vec<String>,
}

/// Answers per URL (unknown URLs are unreachable), with optional latency on
/// the tokio clock.
#[derive(Default)]
pub struct MockProber {
    state: Mutex<ProberState>,
}

impl MockProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(&self, url: &str, reachable: bool) {
        self.state
            .lock()
            .unwrap()
            .answers
            .insert(url.to_string(), reachable);
    }

    pub fn delay(&self, url: &str, latency: Duration) {
        self.state
            .lock()
            .unwrap()
            .latency
            .insert(url.to_string(), latency);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn ping(&self, url: &str, _timeout: Duration) -> bool {
        let (answer, latency) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(url.to_string());
            (
                state.answers.get(url).copied().unwrap_or(false),
                state.latency.get(url).copied(),
            )
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        answer
    }
}
