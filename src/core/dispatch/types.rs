use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::integrations::IntegrationRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// One unit of delegated work routed to an integration by `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub target: String,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Items sharing one target, in batch order.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionGroup<'a> {
    pub target: &'a str,
    pub items: Vec<&'a ActionItem>,
}

/// Groups a batch by target. Groups appear in first-seen order and every
/// item lands in exactly one group.
pub fn group_by_target(batch: &[ActionItem]) -> Vec<ActionGroup<'_>> {
    let mut groups: Vec<ActionGroup<'_>> = Vec::new();
    for item in batch {
        match groups.iter_mut().find(|g| g.target == item.target) {
            Some(group) => group.items.push(item),
            None => groups.push(ActionGroup {
                target: &item.target,
                items: vec![item],
            }),
        }
    }
    groups
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Error,
    Skipped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Error => "error",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Success | StepStatus::Error | StepStatus::Skipped
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepTransition {
    Running,
    Success(Value),
    Error(String),
    Skipped,
}

impl StepTransition {
    pub fn status(&self) -> StepStatus {
        match self {
            StepTransition::Running => StepStatus::Running,
            StepTransition::Success(_) => StepStatus::Success,
            StepTransition::Error(_) => StepStatus::Error,
            StepTransition::Skipped => StepStatus::Skipped,
        }
    }
}

/// Status change for one integration within a dispatch batch.
#[derive(Debug, Clone, PartialEq)]
pub struct StepUpdate {
    pub id: String,
    pub transition: StepTransition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionStep {
    pub id: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Running,
    Success,
    Error,
}

/// Caller-side view of a batch: one row per registry descriptor, fed by
/// [`StepUpdate`]s. Build a fresh one per batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSteps {
    steps: Vec<ExecutionStep>,
}

impl ExecutionSteps {
    pub fn new(registry: &IntegrationRegistry) -> Self {
        let steps = registry
            .iter()
            .map(|d| ExecutionStep {
                id: d.id.clone(),
                status: StepStatus::Pending,
                result: None,
                error: None,
            })
            .collect();
        Self { steps }
    }

    /// Returns false when the update names an unknown step.
    pub fn apply(&mut self, update: &StepUpdate) -> bool {
        let Some(step) = self.steps.iter_mut().find(|s| s.id == update.id) else {
            return false;
        };
        step.status = update.transition.status();
        match &update.transition {
            StepTransition::Success(result) => {
                step.result = Some(result.clone());
                step.error = None;
            }
            StepTransition::Error(message) => {
                step.result = None;
                step.error = Some(message.clone());
            }
            StepTransition::Running | StepTransition::Skipped => {}
        }
        true
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionStep> {
        self.steps.iter()
    }

    pub fn overall(&self) -> OverallStatus {
        if self.steps.iter().any(|s| !s.status.is_terminal()) {
            OverallStatus::Running
        } else if self.steps.iter().any(|s| s.status == StepStatus::Error) {
            OverallStatus::Error
        } else {
            OverallStatus::Success
        }
    }
}
