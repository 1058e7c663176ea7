//! Specialist personas available for delegation.

use serde::{Deserialize, Serialize};

/// A named specialist: role instructions plus an optional tool allow-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPersona {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub system_prompt: String,
    /// `None` grants every shared tool; `Some` restricts to the listed names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

impl AgentPersona {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            tools: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<impl Into<String>>) -> Self {
        self.tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }
}

/// Listing entry without the long-form prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub name: String,
    pub display_name: String,
    pub description: String,
}

/// Immutable catalog of personas, in registration order.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<AgentPersona>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<AgentPersona>) -> Self {
        Self { agents }
    }

    /// The four general-purpose specialists shipped by default.
    pub fn builtin() -> Self {
        Self::new(vec![
            AgentPersona::new(
                "researcher",
                "Research Specialist",
                "Gathers facts, reads files and documents, and reports findings with sources.",
                "You are a research specialist. Investigate the task using the tools \
                 available, read primary material rather than guessing, and report \
                 concise findings. Cite the files or documents you relied on.",
            ),
            AgentPersona::new(
                "coder",
                "Code Specialist",
                "Writes, reviews and explains code; proposes concrete patches.",
                "You are a senior software engineer. Produce working, idiomatic code \
                 for the task. When changing existing code, show the exact change and \
                 explain any behavioural impact in one or two sentences.",
            ),
            AgentPersona::new(
                "analyst",
                "Data Analyst",
                "Breaks problems down, compares options and quantifies trade-offs.",
                "You are an analyst. Decompose the task, state assumptions, compare \
                 alternatives and give a clear recommendation backed by the numbers \
                 or evidence you have.",
            ),
            AgentPersona::new(
                "writer",
                "Technical Writer",
                "Turns material into clear documentation, summaries and announcements.",
                "You are a technical writer. Rewrite the material for the intended \
                 audience: short sentences, concrete examples, no filler. Keep the \
                 facts exactly as given.",
            )
            .with_tools(Vec::<String>::new()),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&AgentPersona> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn list(&self) -> &[AgentPersona] {
        &self.agents
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    pub fn summaries(&self) -> Vec<AgentSummary> {
        self.agents
            .iter()
            .map(|a| AgentSummary {
                name: a.name.clone(),
                display_name: a.display_name.clone(),
                description: a.description.clone(),
            })
            .collect()
    }

    /// Display name for `name`, falling back to the raw name.
    pub fn display_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.get(name).map(|a| a.display_name.as_str()).unwrap_or(name)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
