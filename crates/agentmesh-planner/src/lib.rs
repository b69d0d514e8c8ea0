//! Planning side of AgentMesh: from a free-text request to a persisted,
//! validated execution plan.
//!
//! # Main types
//!
//! - [`DecisionEngine`]: analyzes a request and decides to clarify or execute.
//! - [`ResponseParser`]: pulls labeled sections out of model output.
//! - [`ExecutionPlan`] / [`ExecutionStep`]: the plan and step state machines.
//! - [`PlanRepository`]: storage contract, with [`InMemoryPlanRepository`].
//! - [`AiClient`]: text-completion contract, with [`OpenAiClient`].

/// Text-completion clients.
pub mod ai;
/// Structured request analysis.
pub mod analysis;
/// Model endpoint configuration.
pub mod config;
/// Clarify-or-execute decisions.
pub mod decision;
/// The decision engine.
pub mod engine;
/// Labeled-section parsing of model output.
pub mod parser;
/// Execution plans and their lifecycle.
pub mod plan;
/// Prompt construction.
pub mod prompts;
/// Plan storage.
pub mod repository;
/// Execution steps and their lifecycle.
pub mod step;

pub use ai::{AiClient, OpenAiClient};
pub use analysis::Analysis;
pub use config::{AiProvider, ModelConfig};
pub use decision::{Decision, DecisionKind};
pub use engine::DecisionEngine;
pub use parser::ResponseParser;
pub use plan::{ExecutionPlan, PlanStatus, Priority};
pub use repository::{InMemoryPlanRepository, PlanRepository};
pub use step::{ExecutionStep, StepStatus};
