use crate::step::{ExecutionStep, StepStatus};
use agentmesh_core::{MeshError, MeshResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an [`ExecutionPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Approved,
    Executing,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Failed)
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Draft => write!(f, "draft"),
            PlanStatus::Approved => write!(f, "approved"),
            PlanStatus::Executing => write!(f, "executing"),
            PlanStatus::Completed => write!(f, "completed"),
            PlanStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Scheduling priority of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// An ordered set of steps fulfilling one decision.
///
/// Steps are numbered 1, 2, 3... in the order they are added and keep their
/// number for the life of the plan. The plan is the only owner of its steps.
///
/// Mutation is not synchronized; callers updating one plan from several tasks
/// must serialize access themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    id: String,
    name: String,
    description: String,
    status: PlanStatus,
    priority: Priority,
    steps: Vec<ExecutionStep>,
    created_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    estimated_duration_ms: Option<u64>,
    actual_duration_ms: Option<u64>,
    can_modify: bool,
}

impl ExecutionPlan {
    /// Creates an empty Draft plan with a fresh id.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        priority: Priority,
    ) -> MeshResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(MeshError::Validation("plan name is empty".to_string()));
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name,
            description: description.into(),
            status: PlanStatus::Draft,
            priority,
            steps: Vec::new(),
            created_at: Utc::now(),
            approved_at: None,
            started_at: None,
            completed_at: None,
            estimated_duration_ms: None,
            actual_duration_ms: None,
            can_modify: true,
        })
    }

    pub fn with_estimated_duration_ms(mut self, ms: u64) -> Self {
        self.estimated_duration_ms = Some(ms);
        self
    }

    pub fn with_can_modify(mut self, can_modify: bool) -> Self {
        self.can_modify = can_modify;
        self
    }

    // --- accessors ---

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Steps in step-number order.
    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn estimated_duration_ms(&self) -> Option<u64> {
        self.estimated_duration_ms
    }

    pub fn actual_duration_ms(&self) -> Option<u64> {
        self.actual_duration_ms
    }

    pub fn step(&self, id: &str) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.id() == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut ExecutionStep> {
        self.steps.iter_mut().find(|s| s.id() == id)
    }

    pub fn step_by_number(&self, step_number: u32) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| s.step_number() == step_number)
    }

    // --- structure ---

    /// Steps may be added or replaced only while the plan is unlocked and in
    /// Draft or Executing.
    pub fn can_be_modified(&self) -> bool {
        self.can_modify && matches!(self.status, PlanStatus::Draft | PlanStatus::Executing)
    }

    /// Approved with at least one step.
    pub fn is_executable(&self) -> bool {
        self.status == PlanStatus::Approved && !self.steps.is_empty()
    }

    /// Appends `step`, numbering it after the current last step.
    ///
    /// Every dependency must name a step already in this plan, so the
    /// dependency graph can never contain a cycle.
    pub fn add_step(&mut self, mut step: ExecutionStep) -> MeshResult<&ExecutionStep> {
        if !self.can_be_modified() {
            return Err(MeshError::State(format!(
                "plan {} cannot be modified in status {}",
                self.id, self.status
            )));
        }
        if self.step(step.id()).is_some() {
            return Err(MeshError::Validation(format!(
                "duplicate step id {}",
                step.id()
            )));
        }
        if let Some(unknown) = step
            .dependencies()
            .iter()
            .find(|dep| self.step(dep).is_none())
        {
            return Err(MeshError::Validation(format!(
                "step '{}' depends on unknown step {unknown}",
                step.name()
            )));
        }

        let number = self.steps.len() as u32 + 1;
        step.attach(&self.id, number);
        self.steps.push(step);
        Ok(&self.steps[self.steps.len() - 1])
    }

    /// Replaces the stored step that has the same id, plan id, and number.
    ///
    /// This is a persistence write: the step's status is taken as given, so
    /// callers move it through the [`ExecutionStep`] transition methods first.
    /// Completed and Failed plans refuse it.
    pub fn replace_step(&mut self, step: ExecutionStep) -> MeshResult<()> {
        if self.status.is_terminal() {
            return Err(self.illegal("update a step of"));
        }
        let plan_id = self.id.clone();
        let slot = self.step_mut(step.id()).ok_or_else(|| {
            MeshError::Validation(format!("step {} is not part of plan {plan_id}", step.id()))
        })?;
        if step.plan_id() != plan_id || step.step_number() != slot.step_number() {
            return Err(MeshError::Validation(format!(
                "step {} does not match its slot in plan {plan_id}",
                step.id()
            )));
        }
        *slot = step;
        Ok(())
    }

    // --- transitions ---

    /// Draft → Approved.
    pub fn approve(&mut self) -> MeshResult<()> {
        self.expect_status(PlanStatus::Draft, "approve")?;
        self.status = PlanStatus::Approved;
        self.approved_at = Some(Utc::now());
        Ok(())
    }

    /// Approved → Executing.
    pub fn start(&mut self) -> MeshResult<()> {
        self.expect_status(PlanStatus::Approved, "start")?;
        self.status = PlanStatus::Executing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Executing → Completed, recording the actual duration.
    pub fn complete(&mut self) -> MeshResult<()> {
        self.expect_status(PlanStatus::Executing, "complete")?;
        self.finish(PlanStatus::Completed);
        Ok(())
    }

    /// Any non-terminal status → Failed.
    pub fn fail(&mut self) -> MeshResult<()> {
        if self.status.is_terminal() {
            return Err(self.illegal("fail"));
        }
        self.finish(PlanStatus::Failed);
        Ok(())
    }

    fn finish(&mut self, status: PlanStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.actual_duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64);
    }

    fn expect_status(&self, expected: PlanStatus, action: &str) -> MeshResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(self.illegal(action))
        }
    }

    fn illegal(&self, action: &str) -> MeshError {
        MeshError::State(format!(
            "cannot {action} plan {} in status {}",
            self.id, self.status
        ))
    }

    // --- scheduling ---

    /// The first Pending or Assigned step in step-number order.
    ///
    /// Sequential view: ignores declared dependencies.
    pub fn next_step(&self) -> Option<&ExecutionStep> {
        self.steps
            .iter()
            .find(|s| matches!(s.status(), StepStatus::Pending | StepStatus::Assigned))
    }

    /// Every Pending step whose dependencies have all completed.
    ///
    /// Dependency view: several steps can be runnable at once.
    pub fn runnable_steps(&self) -> Vec<&ExecutionStep> {
        let completed: Vec<&str> = self
            .steps
            .iter()
            .filter(|s| s.status() == StepStatus::Completed)
            .map(ExecutionStep::id)
            .collect();
        self.steps
            .iter()
            .filter(|s| s.is_ready(&completed))
            .collect()
    }

    /// At least one step, and every step Completed.
    pub fn is_completed(&self) -> bool {
        !self.steps.is_empty()
            && self
                .steps
                .iter()
                .all(|s| s.status() == StepStatus::Completed)
    }

    /// Whether any step failed. Does not change the plan's own status.
    pub fn has_failed(&self) -> bool {
        self.steps.iter().any(|s| s.status() == StepStatus::Failed)
    }

    /// Percentage of completed steps, 0 for an empty plan.
    pub fn progress(&self) -> u8 {
        if self.steps.is_empty() {
            return 0;
        }
        let done = self
            .steps
            .iter()
            .filter(|s| s.status() == StepStatus::Completed)
            .count();
        (done * 100 / self.steps.len()) as u8
    }
}
