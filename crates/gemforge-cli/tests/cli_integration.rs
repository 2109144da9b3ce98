//! Integration tests for the gemforge-cli commands.
//!
//! These exercise the same code paths as the binary, using temporary gem
//! and persona files. Nothing here talks to the model API.

use gemforge_cli::commands::{self, workflow};

const GEM_YAML: &str = r#"
id: "gem-cli-test"
name: "CLI Test Gem"
stages:
  - name: "Answer"
    parallel_agents:
      - persona_ref: "p-cli-tester"
        model: "gemini-2.5-flash"
        prompt_template: "Answer: {INITIAL_PROMPT}"
        output_artifact_name: "Final_Answer"
"#;

const PERSONA_YAML: &str = r#"
id: "p-cli-tester"
name: "CLI Tester"
system_prompt: "You answer test questions."
"#;

#[test]
fn test_resolve_gem_prefers_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gem.yaml");
    std::fs::write(&path, GEM_YAML).unwrap();

    let gem = commands::resolve_gem(path.to_str().unwrap()).unwrap();
    assert_eq!(gem.id, "gem-cli-test");
    assert_eq!(gem.agent_count(), 1);

    let builtin = commands::resolve_gem("gem-research").unwrap();
    assert_eq!(builtin.id, "gem-research");
}

#[test]
fn test_validate_with_custom_persona_dir() {
    let dir = tempfile::tempdir().unwrap();
    let gem_path = dir.path().join("gem.yaml");
    std::fs::write(&gem_path, GEM_YAML).unwrap();

    let persona_dir = dir.path().join("personas");
    std::fs::create_dir(&persona_dir).unwrap();
    std::fs::write(persona_dir.join("tester.yaml"), PERSONA_YAML).unwrap();

    // Without the persona directory the persona is unknown
    let err = workflow::validate(gem_path.to_str().unwrap(), None).unwrap_err();
    assert!(err.contains("1 problem"), "unexpected error: {}", err);

    workflow::validate(
        gem_path.to_str().unwrap(),
        Some(persona_dir.to_str().unwrap()),
    )
    .unwrap();
}

#[test]
fn test_validate_rejects_unparseable_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = workflow::validate(path.to_str().unwrap(), None).unwrap_err();
    assert!(err.contains("Failed to parse gem JSON"));
}

#[test]
fn test_load_personas_missing_dir_is_an_error() {
    assert!(commands::load_personas(Some("/no/such/persona/dir")).is_err());
    let personas = commands::load_personas(None).unwrap();
    assert!(personas.get("p-summarizer").is_some());
}

#[test]
fn test_listing_commands_succeed() {
    workflow::list_gems().unwrap();
    workflow::list_personas(None).unwrap();
}
