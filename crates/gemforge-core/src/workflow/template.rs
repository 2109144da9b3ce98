//! Prompt template resolution.
//!
//! A template references artifacts with `{Name}` placeholders. Names are
//! trimmed before lookup, resolution is a single left-to-right pass, and
//! substituted values are inserted verbatim (never re-scanned).

use std::sync::OnceLock;

use regex::Regex;

use crate::workflow::artifacts::ArtifactStore;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(.+?)\}").expect("placeholder pattern is valid"))
}

/// Resolve every placeholder in `template` against `store`.
///
/// Stops at the first name the store does not contain and returns it as
/// the error; no partially resolved text is produced.
pub fn resolve(template: &str, store: &ArtifactStore) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in placeholder_re().captures_iter(template) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = key.as_str().trim();
        let value = store.get(name).ok_or_else(|| name.to_string())?;

        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}

/// Names referenced by `template`, trimmed, in order of first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder_re().captures_iter(template) {
        if let Some(key) = caps.get(1) {
            let name = key.as_str().trim().to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}
