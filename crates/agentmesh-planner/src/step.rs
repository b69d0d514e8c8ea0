use agentmesh_core::{MeshError, MeshResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retries allowed per step unless overridden.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Lifecycle of an [`ExecutionStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Assigned,
    Executing,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Completed, Failed, and Skipped accept no further transitions
    /// (a Failed step can only be reset through [`ExecutionStep::retry`]).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Assigned => write!(f, "assigned"),
            StepStatus::Executing => write!(f, "executing"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// One unit of work within an execution plan, carried out by one agent.
///
/// `plan_id` and `step_number` are set when the step is added to a plan.
/// Status only changes through the transition methods; an illegal transition
/// returns [`MeshError::State`] and leaves the step untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    id: String,
    plan_id: String,
    step_number: u32,
    name: String,
    description: String,
    assigned_agent: String,
    status: StepStatus,
    retry_count: u32,
    max_retries: u32,
    #[serde(default)]
    inputs: serde_json::Value,
    #[serde(default)]
    outputs: serde_json::Value,
    error_message: Option<String>,
    is_critical: bool,
    can_modify: bool,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    dependencies: Vec<String>,
}

impl ExecutionStep {
    /// Creates a Pending step. `name` and `assigned_agent` must not be blank.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        assigned_agent: impl Into<String>,
    ) -> MeshResult<Self> {
        let name = name.into();
        let assigned_agent = assigned_agent.into();
        if name.trim().is_empty() {
            return Err(MeshError::Validation("step name is empty".to_string()));
        }
        if assigned_agent.trim().is_empty() {
            return Err(MeshError::Validation(format!(
                "step '{name}' has no assigned agent"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            plan_id: String::new(),
            step_number: 0,
            name,
            description: description.into(),
            assigned_agent,
            status: StepStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            inputs: serde_json::Value::Null,
            outputs: serde_json::Value::Null,
            error_message: None,
            is_critical: false,
            can_modify: true,
            started_at: None,
            completed_at: None,
            dependencies: Vec::new(),
        })
    }

    /// Declares the ids of steps that must complete before this one runs.
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_inputs(mut self, inputs: serde_json::Value) -> Self {
        self.inputs = inputs;
        self
    }

    /// Marks the step as critical: its failure should fail the plan.
    pub fn critical(mut self, is_critical: bool) -> Self {
        self.is_critical = is_critical;
        self
    }

    /// Locks or unlocks the step against edits.
    pub fn with_can_modify(mut self, can_modify: bool) -> Self {
        self.can_modify = can_modify;
        self
    }

    pub(crate) fn attach(&mut self, plan_id: &str, step_number: u32) {
        self.plan_id = plan_id.to_string();
        self.step_number = step_number;
    }

    // --- accessors ---

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }

    pub fn step_number(&self) -> u32 {
        self.step_number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn assigned_agent(&self) -> &str {
        &self.assigned_agent
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn inputs(&self) -> &serde_json::Value {
        &self.inputs
    }

    pub fn outputs(&self) -> &serde_json::Value {
        &self.outputs
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn is_critical(&self) -> bool {
        self.is_critical
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Runnable once every dependency id is in `completed_ids`.
    pub fn is_ready(&self, completed_ids: &[&str]) -> bool {
        self.status == StepStatus::Pending
            && self
                .dependencies
                .iter()
                .all(|dep| completed_ids.contains(&dep.as_str()))
    }

    /// Edits are allowed only on an unlocked Pending step.
    pub fn can_be_modified(&self) -> bool {
        self.can_modify && self.status == StepStatus::Pending
    }

    // --- edits ---

    pub fn rename(&mut self, name: impl Into<String>) -> MeshResult<()> {
        self.ensure_modifiable()?;
        let name = name.into();
        if name.trim().is_empty() {
            return Err(MeshError::Validation("step name is empty".to_string()));
        }
        self.name = name;
        Ok(())
    }

    pub fn set_description(&mut self, description: impl Into<String>) -> MeshResult<()> {
        self.ensure_modifiable()?;
        self.description = description.into();
        Ok(())
    }

    pub fn set_inputs(&mut self, inputs: serde_json::Value) -> MeshResult<()> {
        self.ensure_modifiable()?;
        self.inputs = inputs;
        Ok(())
    }

    fn ensure_modifiable(&self) -> MeshResult<()> {
        if self.can_be_modified() {
            Ok(())
        } else {
            Err(MeshError::State(format!(
                "step {} cannot be modified in status {}",
                self.step_number, self.status
            )))
        }
    }

    // --- transitions ---

    /// Pending → Assigned, (re)binding the step to `agent`.
    pub fn assign(&mut self, agent: impl Into<String>) -> MeshResult<()> {
        self.expect_status(&[StepStatus::Pending], "assign")?;
        let agent = agent.into();
        if agent.trim().is_empty() {
            return Err(MeshError::Validation(format!(
                "step {} cannot be assigned to an empty agent",
                self.step_number
            )));
        }
        self.assigned_agent = agent;
        self.status = StepStatus::Assigned;
        Ok(())
    }

    /// Assigned → Executing.
    pub fn start(&mut self) -> MeshResult<()> {
        self.expect_status(&[StepStatus::Assigned], "start")?;
        self.status = StepStatus::Executing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Executing → Completed, recording the agent's outputs.
    pub fn complete(&mut self, outputs: serde_json::Value) -> MeshResult<()> {
        self.expect_status(&[StepStatus::Executing], "complete")?;
        self.status = StepStatus::Completed;
        self.outputs = outputs;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Any non-terminal status → Failed.
    pub fn fail(&mut self, error_message: impl Into<String>) -> MeshResult<()> {
        if self.status.is_terminal() {
            return Err(self.illegal("fail"));
        }
        self.status = StepStatus::Failed;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Pending or Assigned → Skipped.
    pub fn skip(&mut self) -> MeshResult<()> {
        self.expect_status(&[StepStatus::Pending, StepStatus::Assigned], "skip")?;
        self.status = StepStatus::Skipped;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Failed → Pending, consuming one retry.
    pub fn retry(&mut self) -> MeshResult<()> {
        self.expect_status(&[StepStatus::Failed], "retry")?;
        if self.retry_count >= self.max_retries {
            return Err(MeshError::State(format!(
                "maximum retries exceeded ({})",
                self.max_retries
            )));
        }
        self.retry_count += 1;
        self.status = StepStatus::Pending;
        self.error_message = None;
        self.started_at = None;
        self.completed_at = None;
        Ok(())
    }

    fn expect_status(&self, allowed: &[StepStatus], action: &str) -> MeshResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(self.illegal(action))
        }
    }

    fn illegal(&self, action: &str) -> MeshError {
        MeshError::State(format!(
            "cannot {action} step {} ('{}') in status {}",
            self.step_number, self.name, self.status
        ))
    }
}
