//! Session-key normalisation.
//!
//! A session key is always of the form `agent:<agent_id>:<rest>`. Callers
//! may hand us an already-canonical key, a bare `session_id`, a bare
//! `agent_id`, or nothing at all; `resolve` turns any of those into the
//! canonical form.

const DEFAULT_AGENT_ID: &str = "main";
const DEFAULT_REST: &str = "main";
const MAX_AGENT_ID_LEN: usize = 64;

/// Normalise a session key from the available pieces of information.
///
/// `session_key` wins over `session_id`, which wins over `agent_id` alone.
/// With none supplied, the key for the default agent's main thread is
/// returned.
pub fn resolve(agent_id: Option<&str>, session_id: Option<&str>, session_key: Option<&str>) -> String {
    if let Some(key) = session_key {
        return canonicalize(key);
    }
    if let Some(id) = session_id {
        return canonicalize(id);
    }
    let agent = sanitize_agent_id(agent_id.unwrap_or(DEFAULT_AGENT_ID));
    format!("agent:{}:{}", agent, DEFAULT_REST)
}

/// Idempotent canonicalisation of a raw key string. Already-prefixed keys
/// pass through (lowercased); anything else is treated as a bare
/// `agent_id` and given the default `rest`.
fn canonicalize(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if let Some(rest_of_prefix) = lower.strip_prefix("agent:") {
        let mut parts = rest_of_prefix.splitn(2, ':');
        let agent = sanitize_agent_id(parts.next().unwrap_or(""));
        let rest = parts.next().filter(|s| !s.is_empty()).unwrap_or(DEFAULT_REST);
        return format!("agent:{}:{}", agent, rest);
    }
    let agent = sanitize_agent_id(&lower);
    format!("agent:{}:{}", agent, DEFAULT_REST)
}

fn sanitize_agent_id(raw: &str) -> String {
    let collapsed: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else if c.is_ascii_uppercase() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = collapsed.trim_matches('-');
    let truncated: String = trimmed.chars().take(MAX_AGENT_ID_LEN).collect();
    if truncated.is_empty() {
        DEFAULT_AGENT_ID.to_string()
    } else {
        truncated
    }
}

/// Returns `true` when `rest` marks a subagent sub-thread of the owning
/// agent (`subagent:<name>`). The normaliser itself does not interpret
/// this further; it exists purely so callers can partition subagent
/// scratch conversations from the primary thread.
pub fn is_subagent_rest(rest: &str) -> bool {
    rest.starts_with("subagent:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_with_no_input() {
        assert_eq!(resolve(None, None, None), "agent:main:main");
    }

    #[test]
    fn resolves_from_agent_id() {
        assert_eq!(resolve(Some("research"), None, None), "agent:research:main");
    }

    #[test]
    fn session_key_wins_over_session_id() {
        assert_eq!(
            resolve(Some("x"), Some("y"), Some("agent:z:thread1")),
            "agent:z:thread1"
        );
    }

    #[test]
    fn sanitizes_invalid_characters() {
        assert_eq!(resolve(Some("My Agent!!"), None, None), "agent:my-agent:main");
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let once = resolve(None, None, Some("Weird Key"));
        let twice = resolve(None, None, Some(&once));
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_agent_id_falls_back_to_main() {
        assert_eq!(resolve(Some("---"), None, None), "agent:main:main");
    }

    #[test]
    fn detects_subagent_rest() {
        assert!(is_subagent_rest("subagent:researcher"));
        assert!(!is_subagent_rest("main"));
    }
}
