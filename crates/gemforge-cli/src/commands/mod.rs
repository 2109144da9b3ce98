//! CLI command implementations.
//!
//! `workflow` holds the gem commands; `env` loads `.env` files before a
//! run so the Gemini key can live next to the project.

pub mod env;
pub mod workflow;

use gemforge_core::workflow::{builtin_gem, builtin_gems, Gem, PersonaLibrary};

/// Resolve a gem reference: an existing file path wins, then a built-in
/// gem id (`gem-flash`) or short name (`flash`).
pub fn resolve_gem(reference: &str) -> Result<Gem, String> {
    let path = std::path::Path::new(reference);
    if path.is_file() {
        return Gem::from_file(path).map_err(|e| e.to_string());
    }

    builtin_gem(reference).ok_or_else(|| {
        let known: Vec<String> = builtin_gems().into_iter().map(|g| g.id).collect();
        format!(
            "Gem '{}' is neither a file nor a built-in gem. Built-in gems: {}",
            reference,
            known.join(", ")
        )
    })
}

/// Built-in personas plus the default persona directories, plus
/// `persona_dir` when given (which must exist).
pub fn load_personas(persona_dir: Option<&str>) -> Result<PersonaLibrary, String> {
    let mut personas = PersonaLibrary::with_builtins();
    personas.load_default_dirs();
    if let Some(dir) = persona_dir {
        let count = personas.load_dir(dir).map_err(|e| e.to_string())?;
        tracing::info!("[Personas] Loaded {} persona(s) from '{}'", count, dir);
    }
    Ok(personas)
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}
