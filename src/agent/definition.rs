//! Agent definition deployed to the hosting platform

use serde::{Deserialize, Serialize};

pub const AGENT_NAME: &str = "Reporter";
pub const MODEL_NAME: &str = "gemini-2.5-flash";

const INSTRUCTION: &str = r#"You are a live chat agent. When an end user requests to be transferred to a live agent
use the `live_agent_transfer` tool to transfer the user to a live agent. Otherwise allow them to also
call a date time tool to see the current date and time.
If the user asks about an artwork, call `fetch_artwork_title`. It answers right away and the title
is posted to the conversation once the lookup completes."#;

/// Description of a tool exposed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// The tool acknowledges immediately and reports its result later
    #[serde(default)]
    pub long_running: bool,
}

impl ToolSpec {
    fn new(name: &str, description: &str, long_running: bool) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            long_running,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub model: String,
    pub description: String,
    pub instruction: String,
    pub tools: Vec<ToolSpec>,
}

impl AgentDefinition {
    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// The live agent transfer bot
pub fn live_agent() -> AgentDefinition {
    AgentDefinition {
        name: AGENT_NAME.to_string(),
        model: MODEL_NAME.to_string(),
        description: "A cx agent that transfer to a live chat.".to_string(),
        instruction: INSTRUCTION.to_string(),
        tools: tool_specs(),
    }
}

pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "live_agent_transfer",
            "Transfers the user to a live agent.",
            false,
        ),
        ToolSpec::new(
            "date_time_tool",
            "Returns the current date and time in YYYY-MM-DD HH:MM:SS format.",
            false,
        ),
        ToolSpec::new(
            "fetch_artwork_title",
            "Looks up an artwork title in the background and posts it to the conversation.",
            true,
        ),
    ]
}
