use crate::plan::ExecutionPlan;
use crate::step::ExecutionStep;
use agentmesh_core::{MeshError, MeshResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Persistence contract for execution plans and their steps.
///
/// All lookups are keyed by opaque string ids. Implementations own
/// durability; validity is enforced by the domain types, so stores should
/// route step changes through [`ExecutionPlan`] methods rather than editing
/// fields directly.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn create(&self, plan: &ExecutionPlan) -> MeshResult<()>;
    async fn get_by_id(&self, id: &str) -> MeshResult<Option<ExecutionPlan>>;
    async fn get_by_analysis_id(&self, analysis_id: &str) -> MeshResult<Option<ExecutionPlan>>;
    async fn update(&self, plan: &ExecutionPlan) -> MeshResult<()>;
    /// Removes a plan and any analysis link pointing at it.
    async fn delete(&self, id: &str) -> MeshResult<()>;
    async fn link_to_analysis(&self, analysis_id: &str, plan_id: &str) -> MeshResult<()>;
    async fn add_step(&self, plan_id: &str, step: ExecutionStep) -> MeshResult<ExecutionStep>;
    async fn update_step(&self, step: &ExecutionStep) -> MeshResult<()>;
    async fn get_steps_by_plan_id(&self, plan_id: &str) -> MeshResult<Vec<ExecutionStep>>;
    async fn assign_step_to_agent(&self, step_id: &str, agent_name: &str) -> MeshResult<()>;
}

#[derive(Default)]
struct Tables {
    plans: HashMap<String, ExecutionPlan>,
    /// analysis id → plan id
    links: HashMap<String, String>,
    /// step id → plan id
    step_index: HashMap<String, String>,
}

impl Tables {
    fn plan_mut(&mut self, plan_id: &str) -> MeshResult<&mut ExecutionPlan> {
        self.plans
            .get_mut(plan_id)
            .ok_or_else(|| MeshError::Store(format!("plan {plan_id} not found")))
    }

    fn index_steps(&mut self, plan: &ExecutionPlan) {
        self.step_index.retain(|_, owner| owner.as_str() != plan.id());
        for step in plan.steps() {
            self.step_index
                .insert(step.id().to_string(), plan.id().to_string());
        }
    }
}

/// Process-local plan store. Suitable for tests and single-node deployments.
#[derive(Default)]
pub struct InMemoryPlanRepository {
    tables: RwLock<Tables>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored plans.
    pub async fn plan_count(&self) -> usize {
        self.tables.read().await.plans.len()
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    async fn create(&self, plan: &ExecutionPlan) -> MeshResult<()> {
        let mut tables = self.tables.write().await;
        if tables.plans.contains_key(plan.id()) {
            return Err(MeshError::Store(format!(
                "plan {} already exists",
                plan.id()
            )));
        }
        tables.index_steps(plan);
        tables.plans.insert(plan.id().to_string(), plan.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> MeshResult<Option<ExecutionPlan>> {
        Ok(self.tables.read().await.plans.get(id).cloned())
    }

    async fn get_by_analysis_id(&self, analysis_id: &str) -> MeshResult<Option<ExecutionPlan>> {
        let tables = self.tables.read().await;
        Ok(tables
            .links
            .get(analysis_id)
            .and_then(|plan_id| tables.plans.get(plan_id))
            .cloned())
    }

    async fn update(&self, plan: &ExecutionPlan) -> MeshResult<()> {
        let mut tables = self.tables.write().await;
        *tables.plan_mut(plan.id())? = plan.clone();
        tables.index_steps(plan);
        Ok(())
    }

    async fn delete(&self, id: &str) -> MeshResult<()> {
        let mut tables = self.tables.write().await;
        tables.plans.remove(id);
        tables.links.retain(|_, plan_id| plan_id.as_str() != id);
        tables.step_index.retain(|_, plan_id| plan_id.as_str() != id);
        Ok(())
    }

    async fn link_to_analysis(&self, analysis_id: &str, plan_id: &str) -> MeshResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.plans.contains_key(plan_id) {
            return Err(MeshError::Store(format!(
                "cannot link analysis {analysis_id}: plan {plan_id} not found"
            )));
        }
        tables
            .links
            .insert(analysis_id.to_string(), plan_id.to_string());
        Ok(())
    }

    async fn add_step(&self, plan_id: &str, step: ExecutionStep) -> MeshResult<ExecutionStep> {
        let mut tables = self.tables.write().await;
        let added = tables.plan_mut(plan_id)?.add_step(step)?.clone();
        tables
            .step_index
            .insert(added.id().to_string(), plan_id.to_string());
        Ok(added)
    }

    async fn update_step(&self, step: &ExecutionStep) -> MeshResult<()> {
        let mut tables = self.tables.write().await;
        tables.plan_mut(step.plan_id())?.replace_step(step.clone())
    }

    async fn get_steps_by_plan_id(&self, plan_id: &str) -> MeshResult<Vec<ExecutionStep>> {
        let tables = self.tables.read().await;
        tables
            .plans
            .get(plan_id)
            .map(|plan| plan.steps().to_vec())
            .ok_or_else(|| MeshError::Store(format!("plan {plan_id} not found")))
    }

    async fn assign_step_to_agent(&self, step_id: &str, agent_name: &str) -> MeshResult<()> {
        let mut tables = self.tables.write().await;
        let plan_id = tables
            .step_index
            .get(step_id)
            .cloned()
            .ok_or_else(|| MeshError::Store(format!("step {step_id} not found")))?;
        let step = tables
            .plan_mut(&plan_id)?
            .step_mut(step_id)
            .ok_or_else(|| MeshError::Store(format!("step {step_id} not found")))?;
        step.assign(agent_name)
    }
}
