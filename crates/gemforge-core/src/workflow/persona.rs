//! Personas — reusable system instructions for agents.
//!
//! Personas are defined in YAML, either one per file or as a list:
//!
//! ```yaml
//! - id: "p-summarizer"
//!   name: "Summarizer"
//!   system_prompt: |
//!     You are a skilled summarizer. Condense all provided information
//!     into a concise summary.
//! ```
//!
//! The built-in library ships with the crate; directories can add to it or
//! shadow built-ins by id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

const BUILTIN_PERSONAS: &str = include_str!("../../resources/personas.yaml");

/// A named system instruction profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    #[serde(alias = "persona_id")]
    pub id: String,
    pub name: String,
    pub system_prompt: String,
}

impl Persona {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            system_prompt: system_prompt.into(),
        }
    }

    /// The persona as seen by one assignment: the override replaces the
    /// system prompt when present, everything else is kept.
    pub fn effective(&self, system_prompt_override: Option<&str>) -> Persona {
        match system_prompt_override {
            Some(prompt) => Persona {
                system_prompt: prompt.to_string(),
                ..self.clone()
            },
            None => self.clone(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PersonaFile {
    Many(Vec<Persona>),
    One(Persona),
}

fn parse_personas(yaml: &str, origin: &str) -> Result<Vec<Persona>, WorkflowError> {
    let file: PersonaFile = serde_yaml::from_str(yaml).map_err(|e| {
        WorkflowError::Definition(format!("Failed to parse personas in '{}': {}", origin, e))
    })?;
    Ok(match file {
        PersonaFile::Many(list) => list,
        PersonaFile::One(p) => vec![p],
    })
}

/// Persona table indexed by id.
#[derive(Debug, Clone, Default)]
pub struct PersonaLibrary {
    personas: BTreeMap<String, Persona>,
}

impl PersonaLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library pre-filled with the bundled personas.
    pub fn with_builtins() -> Self {
        let mut lib = Self::new();
        for persona in Self::builtin_personas() {
            lib.insert(persona);
        }
        lib
    }

    /// The bundled personas.
    pub fn builtin_personas() -> Vec<Persona> {
        match parse_personas(BUILTIN_PERSONAS, "builtin") {
            Ok(list) => list,
            Err(e) => {
                tracing::error!("[PersonaLibrary] Built-in personas are invalid: {}", e);
                Vec::new()
            }
        }
    }

    pub fn insert(&mut self, persona: Persona) {
        self.personas.insert(persona.id.clone(), persona);
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.personas.get(id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Persona> {
        self.personas.values()
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Load every `.yaml`/`.yml` file in `dir`. Returns how many personas
    /// were added or replaced.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, WorkflowError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(WorkflowError::Definition(format!(
                "Persona directory '{}' does not exist",
                dir.display()
            )));
        }

        let entries = std::fs::read_dir(dir).map_err(|e| {
            WorkflowError::Definition(format!(
                "Failed to read directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        let mut count = 0;
        for path in paths {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                WorkflowError::Definition(format!(
                    "Failed to read persona file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            for persona in parse_personas(&content, &path.display().to_string())? {
                tracing::info!("[PersonaLibrary] Loaded persona: {} ({})", persona.id, persona.name);
                self.insert(persona);
                count += 1;
            }
        }

        Ok(count)
    }

    /// Search the default persona directories: `./personas` and the user's
    /// config dir (`<config>/gemforge/personas`). Missing directories are
    /// skipped.
    pub fn load_default_dirs(&mut self) -> usize {
        let mut search_paths = vec![PathBuf::from("personas")];
        if let Some(config) = dirs::config_dir() {
            search_paths.push(config.join("gemforge").join("personas"));
        }

        let mut total = 0;
        for dir in &search_paths {
            if !dir.is_dir() {
                continue;
            }
            match self.load_dir(dir) {
                Ok(n) => {
                    tracing::info!("[PersonaLibrary] Loaded {} personas from '{}'", n, dir.display());
                    total += n;
                }
                Err(e) => {
                    tracing::warn!("[PersonaLibrary] Failed to load from '{}': {}", dir.display(), e);
                }
            }
        }
        total
    }
}

impl FromIterator<Persona> for PersonaLibrary {
    fn from_iter<I: IntoIterator<Item = Persona>>(iter: I) -> Self {
        let mut lib = Self::new();
        for persona in iter {
            lib.insert(persona);
        }
        lib
    }
}
