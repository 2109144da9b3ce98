//! Schema types for gem (workflow) definitions.
//!
//! A gem is an ordered list of stages; each stage holds agent assignments
//! that run in parallel and publish one artifact each:
//!
//! ```yaml
//! id: "gem-flash"
//! name: "Flash Gem"
//! description: "Brainstormer + Summarizer for quick answers."
//! stages:
//!   - stage_id: "s-flash-brain"
//!     name: "Brainstorm"
//!     parallel_agents:
//!       - assignment_id: "a-flash-brain"
//!         persona_ref: "p-brainstormer"
//!         model: "gemini-2.5-flash"
//!         prompt_template: "Brainstorm ideas for: {INITIAL_PROMPT}"
//!         output_artifact_name: "Ideas"
//!   - stage_id: "s-flash-sum"
//!     name: "Summarize"
//!     parallel_agents:
//!       - persona_ref: "p-summarizer"
//!         model: "gemini-2.5-flash"
//!         prompt_template: "Summarize these ideas into a concise answer: {Ideas}"
//!         output_artifact_name: "Final_Answer"
//! ```
//!
//! Missing ids are generated on load.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::workflow::persona::PersonaLibrary;
use crate::workflow::template;
use crate::workflow::{FINAL_OUTPUT_ARTIFACT_NAME, INITIAL_PROMPT_ARTIFACT_NAME};

/// Top-level gem definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gem {
    #[serde(default = "new_id", alias = "gem_id")]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Ordered list of stages; stage N may read anything produced before it.
    #[serde(default)]
    pub stages: Vec<Stage>,
}

/// A set of agent assignments executed concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    #[serde(default = "new_id")]
    pub stage_id: String,

    pub name: String,

    #[serde(default)]
    pub parallel_agents: Vec<AgentAssignment>,
}

/// One persona + model + prompt template + output name unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAssignment {
    #[serde(default = "new_id")]
    pub assignment_id: String,

    /// Persona id in the persona library
    pub persona_ref: String,

    /// Model identifier passed to the agent executor
    pub model: String,

    /// Prompt with `{ArtifactName}` placeholders
    pub prompt_template: String,

    /// Key this agent's output is published under
    pub output_artifact_name: String,

    /// Replaces the persona's system prompt for this assignment only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

const BUILTIN_GEMS: &[(&str, &str)] = &[
    ("coder", include_str!("../../resources/gems/coder.yaml")),
    ("image-generator", include_str!("../../resources/gems/image-generator.yaml")),
    ("teacher", include_str!("../../resources/gems/teacher.yaml")),
    ("research", include_str!("../../resources/gems/research.yaml")),
    ("flash", include_str!("../../resources/gems/flash.yaml")),
    ("brainstorm", include_str!("../../resources/gems/brainstorm.yaml")),
    ("reviewer", include_str!("../../resources/gems/reviewer.yaml")),
    ("mixed-mode", include_str!("../../resources/gems/mixed-mode.yaml")),
];

/// The gems bundled with the crate.
pub fn builtin_gems() -> Vec<Gem> {
    BUILTIN_GEMS
        .iter()
        .filter_map(|(name, yaml)| match Gem::from_yaml(yaml) {
            Ok(gem) => Some(gem),
            Err(e) => {
                tracing::error!("[Gem] Built-in gem '{}' is invalid: {}", name, e);
                None
            }
        })
        .collect()
}

/// Find a bundled gem by id (`gem-flash`) or short name (`flash`).
pub fn builtin_gem(key: &str) -> Option<Gem> {
    let key = key.trim();
    builtin_gems()
        .into_iter()
        .find(|g| g.id == key || g.id.strip_prefix("gem-") == Some(key))
}

impl AgentAssignment {
    /// Whether this assignment consumes the seeded initial prompt, i.e. its
    /// template contains the exact `{INITIAL_PROMPT}` placeholder.
    pub fn uses_initial_prompt(&self) -> bool {
        self.prompt_template
            .contains(&format!("{{{}}}", INITIAL_PROMPT_ARTIFACT_NAME))
    }
}

impl Gem {
    /// Parse a gem from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, WorkflowError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| WorkflowError::Definition(format!("Failed to parse gem YAML: {}", e)))
    }

    /// Parse a gem from JSON.
    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        serde_json::from_str(json)
            .map_err(|e| WorkflowError::Definition(format!("Failed to parse gem JSON: {}", e)))
    }

    /// Load a gem from a `.yaml`/`.yml`/`.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WorkflowError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WorkflowError::Definition(format!(
                "Failed to read gem file '{}': {}",
                path.display(),
                e
            ))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    pub fn agent_count(&self) -> usize {
        self.stages.iter().map(|s| s.parallel_agents.len()).sum()
    }

    /// Authoring-time checks. Returns human-readable problems; an empty list
    /// means the gem should run without `UnknownPersona`/`MissingArtifact`
    /// failures.
    pub fn lint(&self, personas: &PersonaLibrary) -> Vec<String> {
        let mut problems = Vec::new();
        let mut available: HashSet<String> = HashSet::new();
        available.insert(INITIAL_PROMPT_ARTIFACT_NAME.to_string());

        for stage in &self.stages {
            if stage.parallel_agents.is_empty() {
                problems.push(format!("Stage '{}' has no agents", stage.name));
            }

            let mut produced: Vec<&str> = Vec::new();
            for agent in &stage.parallel_agents {
                if personas.get(&agent.persona_ref).is_none() {
                    problems.push(format!(
                        "Stage '{}': unknown persona '{}'",
                        stage.name, agent.persona_ref
                    ));
                }
                if agent.output_artifact_name.trim().is_empty() {
                    problems.push(format!(
                        "Stage '{}': assignment '{}' has an empty output artifact name",
                        stage.name, agent.assignment_id
                    ));
                }
                for name in template::placeholders(&agent.prompt_template) {
                    if !available.contains(&name) {
                        problems.push(format!(
                            "Stage '{}': '{}' is not produced by an earlier stage",
                            stage.name, name
                        ));
                    }
                }
                if produced.contains(&agent.output_artifact_name.as_str()) {
                    problems.push(format!(
                        "Stage '{}': artifact '{}' is written by more than one agent",
                        stage.name, agent.output_artifact_name
                    ));
                }
                produced.push(&agent.output_artifact_name);
            }
            available.extend(produced.into_iter().map(str::to_string));
        }

        if !self.stages.is_empty() && !available.contains(FINAL_OUTPUT_ARTIFACT_NAME) {
            problems.push(format!(
                "No stage writes '{}'; the run will complete with a placeholder output",
                FINAL_OUTPUT_ARTIFACT_NAME
            ));
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::persona::Persona;

    const FLASH: &str = r#"
id: "gem-flash"
name: "Flash Gem"
description: "Brainstormer + Summarizer"
stages:
  - stage_id: "s-brain"
    name: "Brainstorm"
    parallel_agents:
      - assignment_id: "a-brain"
        persona_ref: "p-brainstormer"
        model: "gemini-2.5-flash"
        prompt_template: "Brainstorm ideas for: {INITIAL_PROMPT}"
        output_artifact_name: "Ideas"
  - name: "Summarize"
    parallel_agents:
      - persona_ref: "p-summarizer"
        model: "gemini-2.5-flash"
        prompt_template: "Summarize: {Ideas}"
        output_artifact_name: "Final_Answer"
        system_prompt_override: "Be terse."
"#;

    fn library() -> PersonaLibrary {
        let mut lib = PersonaLibrary::new();
        lib.insert(Persona::new("p-brainstormer", "Brainstormer", "Brainstorm."));
        lib.insert(Persona::new("p-summarizer", "Summarizer", "Summarize."));
        lib
    }

    #[test]
    fn test_parse_gem_yaml() {
        let gem = Gem::from_yaml(FLASH).unwrap();
        assert_eq!(gem.id, "gem-flash");
        assert_eq!(gem.stages.len(), 2);
        assert_eq!(gem.agent_count(), 2);
        assert!(!gem.stages[1].stage_id.is_empty());
        assert!(!gem.stages[1].parallel_agents[0].assignment_id.is_empty());
        assert_eq!(
            gem.stages[1].parallel_agents[0].system_prompt_override.as_deref(),
            Some("Be terse.")
        );
        assert!(gem.stages[0].parallel_agents[0].uses_initial_prompt());
        assert!(!gem.stages[1].parallel_agents[0].uses_initial_prompt());

        // Padded placeholders still resolve, but do not receive the attachment
        let mut padded = gem.stages[0].parallel_agents[0].clone();
        padded.prompt_template = "Look at { INITIAL_PROMPT }".to_string();
        assert!(!padded.uses_initial_prompt());
    }

    #[test]
    fn test_parse_gem_json_with_legacy_id_field() {
        let json = r#"{
            "gem_id": "gem-x",
            "name": "X",
            "description": "",
            "stages": []
        }"#;
        let gem = Gem::from_json(json).unwrap();
        assert_eq!(gem.id, "gem-x");
        assert!(gem.stages.is_empty());
    }

    #[test]
    fn test_lint_clean_gem() {
        let gem = Gem::from_yaml(FLASH).unwrap();
        assert!(gem.lint(&library()).is_empty());
    }

    #[test]
    fn test_lint_reports_problems() {
        let yaml = r#"
name: "Broken"
stages:
  - name: "One"
    parallel_agents:
      - persona_ref: "p-ghost"
        model: "m"
        prompt_template: "{Missing_Artifact} and {INITIAL_PROMPT}"
        output_artifact_name: "A"
      - persona_ref: "p-summarizer"
        model: "m"
        prompt_template: "{A}"
        output_artifact_name: "A"
"#;
        let gem = Gem::from_yaml(yaml).unwrap();
        let problems = gem.lint(&library());
        assert!(problems.iter().any(|p| p.contains("unknown persona 'p-ghost'")));
        assert!(problems.iter().any(|p| p.contains("'Missing_Artifact'")));
        // Same-stage siblings cannot read each other's output
        assert!(problems.iter().any(|p| p.contains("'A' is not produced")));
        assert!(problems.iter().any(|p| p.contains("more than one agent")));
        assert!(problems.iter().any(|p| p.contains("Final_Answer")));
    }

    #[test]
    fn test_builtin_gems_lint_clean() {
        let personas = PersonaLibrary::with_builtins();
        let gems = builtin_gems();
        assert_eq!(gems.len(), BUILTIN_GEMS.len());
        for gem in &gems {
            assert!(gem.lint(&personas).is_empty(), "{}: {:?}", gem.id, gem.lint(&personas));
        }
        assert_eq!(builtin_gem("flash").unwrap().id, "gem-flash");
        assert_eq!(builtin_gem("gem-coder").unwrap().stages.len(), 7);
        assert!(builtin_gem("img").is_none());
    }

    #[test]
    fn test_from_file_missing() {
        let err = Gem::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, WorkflowError::Definition(_)));
    }
}
