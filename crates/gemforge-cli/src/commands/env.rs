//! `.env` loading for API keys.

use std::path::Path;

/// Load `.env.local` then `.env` from the current directory.
/// Variables already present in the environment are never overwritten.
pub fn load_dotenv() {
    for filename in &[".env.local", ".env"] {
        if let Some(count) = load_env_file(filename) {
            tracing::info!("[Env] Loaded {} variable(s) from '{}'", count, filename);
        }
    }
}

/// Apply one env file. Returns `None` if it could not be read, otherwise
/// the number of variables set.
pub fn load_env_file(path: impl AsRef<Path>) -> Option<usize> {
    let content = std::fs::read_to_string(path).ok()?;
    let mut count = 0;
    for (key, value) in content.lines().filter_map(parse_env_line) {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(&key, value);
            count += 1;
        }
    }
    Some(count)
}

/// Parse a `KEY=VALUE` line. Comments, blank lines and lines without `=`
/// yield `None`; a leading `export ` and matching surrounding quotes are
/// stripped.
pub fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let unquoted = [('"', '"'), ('\'', '\'')]
        .iter()
        .find_map(|(open, close)| {
            value
                .strip_prefix(*open)
                .and_then(|v| v.strip_suffix(*close))
        })
        .unwrap_or(value);

    Some((key.to_string(), unquoted.to_string()))
}
