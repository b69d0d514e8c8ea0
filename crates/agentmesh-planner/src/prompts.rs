//! Prompt text sent to the completion model.
//!
//! The engine depends only on the section labels below, not on the wording.

use crate::analysis::Analysis;

pub const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are the request analyst of a multi-agent system. Read the user's request \
and the list of available agents, then answer using exactly these labels, one \
per line:

INTENT: <short intent, a few words>
CATEGORY: <short category, a few words>
CONFIDENCE: <integer from 0 to 100>
REQUIRED_AGENTS: <comma-separated agent names, or none>
REASONING: <one or two sentences>";

pub const DECISION_SYSTEM_PROMPT: &str = "\
You are the planner of a multi-agent system. Decide whether the request can be \
executed with the available agents or whether the user must clarify it.

If clarification is needed, answer:
DECISION: CLARIFY
CLARIFICATION: <the question to ask the user>
REASONING: <why>

Otherwise answer:
DECISION: EXECUTE
AGENT_COORDINATION: <how the agents work together>
REASONING: <why>
EXECUTION_PLAN:
{\"steps\": [{\"step_number\": 1, \"agent_name\": \"<agent>\", \
\"action_description\": \"<instruction for the agent>\", \"step_name\": \"<short name>\", \
\"depends_on\": []}]}

Use only agent names from the available agents. depends_on lists earlier step numbers.";

pub fn analysis_user_prompt(user_input: &str, user_id: &str, agent_context: &str) -> String {
    format!(
        "User ({user_id}) request:\n{user_input}\n\nAvailable agents:\n{}",
        non_empty(agent_context)
    )
}

pub fn decision_user_prompt(user_input: &str, user_id: &str, analysis: &Analysis) -> String {
    let agents = if analysis.required_agents().is_empty() {
        "none".to_string()
    } else {
        analysis.required_agents().join(", ")
    };
    format!(
        "User ({user_id}) request:\n{user_input}\n\n\
         Analysis:\nINTENT: {}\nCATEGORY: {}\nCONFIDENCE: {}\nREQUIRED_AGENTS: {agents}\nREASONING: {}",
        analysis.intent(),
        analysis.category(),
        analysis.confidence(),
        non_empty(analysis.reasoning()),
    )
}

fn non_empty(text: &str) -> &str {
    if text.trim().is_empty() {
        "(none)"
    } else {
        text
    }
}
