use crate::ai::AiClient;
use crate::analysis::Analysis;
use crate::decision::Decision;
use crate::parser::{first_words, ResponseParser};
use crate::plan::{ExecutionPlan, Priority};
use crate::prompts;
use crate::repository::PlanRepository;
use crate::step::ExecutionStep;
use agentmesh_core::{MeshError, MeshResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const GENERATED_PLAN_NAME: &str = "AI Generated Plan";
const DEFAULT_CLARIFICATION: &str = "Could you describe in more detail what you need?";

/// Plan document the model emits under `EXECUTION_PLAN:`.
#[derive(Debug, Deserialize)]
struct PlanDocument {
    #[serde(default)]
    steps: Vec<PlanStepDocument>,
}

#[derive(Debug, Deserialize)]
struct PlanStepDocument {
    step_number: Option<u32>,
    #[serde(default)]
    agent_name: String,
    #[serde(default)]
    action_description: String,
    step_name: Option<String>,
    #[serde(default)]
    depends_on: Vec<u32>,
}

/// Turns a user request into an [`Analysis`] and then a [`Decision`].
///
/// Execute decisions come with a persisted [`ExecutionPlan`] linked to the
/// analysis; the decision only carries the plan's id.
pub struct DecisionEngine {
    ai: Arc<dyn AiClient>,
    plans: Arc<dyn PlanRepository>,
    parser: ResponseParser,
}

impl DecisionEngine {
    pub fn new(ai: Arc<dyn AiClient>, plans: Arc<dyn PlanRepository>) -> Self {
        Self {
            ai,
            plans,
            parser: ResponseParser::new(),
        }
    }

    /// Asks the model to classify the request.
    ///
    /// Only a failing completion call is an error. Missing sections fall back
    /// to defaults so one malformed response cannot abort the pipeline.
    pub async fn explore_and_analyze(
        &self,
        user_input: &str,
        user_id: &str,
        agent_context: &str,
        request_id: &str,
    ) -> MeshResult<Analysis> {
        info!(request_id = %request_id, user_id = %user_id, "Analyzing request");

        let user_prompt = prompts::analysis_user_prompt(user_input, user_id, agent_context);
        let response = self
            .ai
            .call_ai(prompts::ANALYSIS_SYSTEM_PROMPT, &user_prompt)
            .await
            .map_err(|e| MeshError::Ai(format!("analysis call failed: {e}")))?;
        debug!(request_id = %request_id, len = response.len(), "Analysis response received");

        let section = |label: &str| self.parser.extract_section(&response, label);
        let intent = section("intent").unwrap_or_default();
        let category = section("category").unwrap_or_default();
        let confidence = section("confidence")
            .map(|c| self.parser.extract_confidence(&c))
            .unwrap_or(0);
        let required_agents = section("required_agents")
            .map(|a| self.parser.parse_agent_list(&a))
            .unwrap_or_default();
        let reasoning = section("reasoning").unwrap_or_default();

        if intent.is_empty() {
            warn!(request_id = %request_id, "Analysis response had no intent section");
        }

        let analysis = Analysis::new(
            request_id,
            &intent,
            &category,
            confidence,
            required_agents,
            reasoning,
        );
        info!(
            request_id = %request_id,
            analysis_id = %analysis.id(),
            intent = %analysis.intent(),
            category = %analysis.category(),
            confidence = analysis.confidence(),
            "Analysis complete"
        );
        Ok(analysis)
    }

    /// Asks the model to clarify or execute. An execute answer is parsed into a
    /// plan, persisted, and linked to `analysis` before the decision is returned.
    pub async fn make_decision(
        &self,
        user_input: &str,
        user_id: &str,
        analysis: &Analysis,
        request_id: &str,
    ) -> MeshResult<Decision> {
        info!(request_id = %request_id, analysis_id = %analysis.id(), "Making decision");

        let user_prompt = prompts::decision_user_prompt(user_input, user_id, analysis);
        let response = self
            .ai
            .call_ai(prompts::DECISION_SYSTEM_PROMPT, &user_prompt)
            .await
            .map_err(|e| MeshError::Ai(format!("decision call failed: {e}")))?;

        let reasoning = self
            .parser
            .extract_section(&response, "reasoning")
            .unwrap_or_default();

        if self.wants_clarification(&response) {
            let question = self
                .parser
                .extract_section(&response, "clarification")
                .unwrap_or_else(|| DEFAULT_CLARIFICATION.to_string());
            info!(request_id = %request_id, decision = "clarify", "Decision made");
            return Ok(Decision::clarify(
                request_id,
                analysis.id(),
                question,
                reasoning,
            ));
        }

        let plan = self.build_plan(&response)?;
        self.persist_linked(&plan, analysis.id()).await?;

        let coordination = self
            .parser
            .extract_section(&response, "agent_coordination")
            .unwrap_or_default();
        info!(
            request_id = %request_id,
            decision = "execute",
            plan_id = %plan.id(),
            steps = plan.steps().len(),
            "Decision made"
        );
        Ok(Decision::execute(
            request_id,
            analysis.id(),
            plan.id(),
            coordination,
            reasoning,
        ))
    }

    fn wants_clarification(&self, response: &str) -> bool {
        self.parser
            .section_starts_with(response, "decision", "CLARIFY")
            || response.to_uppercase().contains("DECISION: CLARIFY")
    }

    /// Returns the plan JSON: the object under `EXECUTION_PLAN:`, or the
    /// outermost object of the whole response when that label is missing.
    /// A present but blank section yields `None`.
    fn plan_json(&self, response: &str) -> Option<String> {
        if !self.parser.has_section(response, "execution_plan") {
            return self.parser.extract_json_object(response).map(str::to_string);
        }
        let section = self.parser.extract_section(response, "execution_plan")?;
        self.parser.extract_json_object(&section).map(str::to_string)
    }

    fn build_plan(&self, response: &str) -> MeshResult<ExecutionPlan> {
        let json = self
            .plan_json(response)
            .filter(|j| !j.trim().is_empty())
            .ok_or_else(|| MeshError::Validation("execution plan JSON is empty".into()))?;

        let document: PlanDocument = serde_json::from_str(&json)
            .map_err(|e| MeshError::Validation(format!("invalid execution plan JSON: {e}")))?;
        if document.steps.is_empty() {
            return Err(MeshError::Validation(
                "execution plan has no steps".into(),
            ));
        }

        let mut plan = ExecutionPlan::new(
            GENERATED_PLAN_NAME,
            "Plan generated from the model's execution decision",
            Priority::Medium,
        )?;
        // declared step number → generated step id
        let mut ids: HashMap<u32, String> = HashMap::new();

        for (index, raw) in document.steps.into_iter().enumerate() {
            let number = raw.step_number.unwrap_or(index as u32 + 1);
            if ids.contains_key(&number) {
                return Err(MeshError::Validation(format!(
                    "step number {number} appears more than once"
                )));
            }
            let agent = raw.agent_name.trim();
            let action = raw.action_description.trim();
            if agent.is_empty() {
                return Err(MeshError::Validation(format!(
                    "step {number} is missing agent_name"
                )));
            }
            if action.is_empty() {
                return Err(MeshError::Validation(format!(
                    "step {number} is missing action_description"
                )));
            }
            let name = raw
                .step_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map_or_else(|| first_words(action, 3), str::to_string);

            let dependencies = raw
                .depends_on
                .iter()
                .map(|dep| {
                    ids.get(dep).cloned().ok_or_else(|| {
                        MeshError::Validation(format!(
                            "step {number} depends on unknown step {dep}"
                        ))
                    })
                })
                .collect::<MeshResult<Vec<_>>>()?;

            let step = ExecutionStep::new(name, action, agent)?
                .with_dependencies(dependencies)
                .with_inputs(serde_json::json!({ "instruction": action }));
            let id = plan.add_step(step)?.id().to_string();
            ids.insert(number, id);
        }

        Ok(plan)
    }

    /// Creates the plan and links it to the analysis. A failed link deletes
    /// the plan again so no unlinked plan is left behind.
    async fn persist_linked(&self, plan: &ExecutionPlan, analysis_id: &str) -> MeshResult<()> {
        self.plans
            .create(plan)
            .await
            .map_err(|e| MeshError::Store(format!("failed to create plan {}: {e}", plan.id())))?;

        if let Err(link_err) = self.plans.link_to_analysis(analysis_id, plan.id()).await {
            warn!(plan_id = %plan.id(), analysis_id = %analysis_id, error = %link_err, "Link failed, deleting plan");
            if let Err(delete_err) = self.plans.delete(plan.id()).await {
                warn!(plan_id = %plan.id(), error = %delete_err, "Failed to delete unlinked plan");
            }
            return Err(MeshError::Store(format!(
                "failed to link plan {} to analysis {analysis_id}: {link_err}",
                plan.id()
            )));
        }
        Ok(())
    }
}
