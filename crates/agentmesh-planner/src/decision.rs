use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the engine decided to do with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecisionKind {
    /// Ask the user a question before doing anything.
    Clarify {
        clarification_question: String,
        reasoning: String,
    },
    /// Run the persisted execution plan.
    Execute {
        /// Opaque id of the persisted plan, never the plan text.
        execution_plan_id: String,
        agent_coordination: String,
        reasoning: String,
    },
}

/// The clarify-or-execute outcome derived from exactly one analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub request_id: String,
    pub analysis_id: String,
    #[serde(flatten)]
    pub kind: DecisionKind,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    /// A decision to ask the user for more information.
    pub fn clarify(
        request_id: impl Into<String>,
        analysis_id: impl Into<String>,
        question: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            analysis_id: analysis_id.into(),
            kind: DecisionKind::Clarify {
                clarification_question: question.into(),
                reasoning: reasoning.into(),
            },
            created_at: Utc::now(),
        }
    }

    /// A decision to execute the plan with id `execution_plan_id`.
    pub fn execute(
        request_id: impl Into<String>,
        analysis_id: impl Into<String>,
        execution_plan_id: impl Into<String>,
        agent_coordination: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            analysis_id: analysis_id.into(),
            kind: DecisionKind::Execute {
                execution_plan_id: execution_plan_id.into(),
                agent_coordination: agent_coordination.into(),
                reasoning: reasoning.into(),
            },
            created_at: Utc::now(),
        }
    }

    pub fn is_clarify(&self) -> bool {
        matches!(self.kind, DecisionKind::Clarify { .. })
    }

    pub fn is_execute(&self) -> bool {
        matches!(self.kind, DecisionKind::Execute { .. })
    }

    /// The plan id of an execute decision.
    pub fn execution_plan_id(&self) -> Option<&str> {
        match &self.kind {
            DecisionKind::Execute {
                execution_plan_id, ..
            } => Some(execution_plan_id),
            DecisionKind::Clarify { .. } => None,
        }
    }

    /// The question of a clarify decision.
    pub fn clarification_question(&self) -> Option<&str> {
        match &self.kind {
            DecisionKind::Clarify {
                clarification_question,
                ..
            } => Some(clarification_question),
            DecisionKind::Execute { .. } => None,
        }
    }

    pub fn reasoning(&self) -> &str {
        match &self.kind {
            DecisionKind::Clarify { reasoning, .. } | DecisionKind::Execute { reasoning, .. } => {
                reasoning
            }
        }
    }
}
