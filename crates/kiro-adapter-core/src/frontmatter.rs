//! Front-matter extraction for agent definition files.
//!
//! Two layouts are recognised:
//!
//! * YAML between `---` fences at the very top of the file, followed by the
//!   Markdown body.
//! * BMAD style: the whole agent config lives in the first fenced
//!   ```` ```yaml ```` block of an otherwise free-form Markdown file. The
//!   body is then the full file, since the block is part of the persona.
//!
//! A file with neither has an empty front-matter mapping.

use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontMatterFormat {
    Fenced,
    EmbeddedYaml,
    None,
}

#[derive(Debug, Clone)]
pub struct AgentDocument {
    pub front_matter: Mapping,
    pub body: String,
    pub format: FrontMatterFormat,
}

static YAML_BLOCK_RE: OnceLock<Regex> = OnceLock::new();

fn yaml_block_re() -> &'static Regex {
    YAML_BLOCK_RE
        .get_or_init(|| Regex::new(r"(?s)```ya?ml[ \t]*\r?\n(.*?)\r?\n```").expect("static regex"))
}

/// Split `---` front-matter off `raw`. Returns `(yaml, body)`.
pub fn split_fenced(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix("---\n")?;
    if let Some(pos) = rest.find("\n---\n") {
        Some((&rest[..pos], rest[pos + "\n---\n".len()..].trim_start()))
    } else if let Some(stripped) = rest.strip_suffix("\n---") {
        Some((stripped, ""))
    } else {
        None
    }
}

/// First fenced YAML code block in `raw`, if any.
pub fn embedded_yaml_block(raw: &str) -> Option<&str> {
    yaml_block_re()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Parse an agent file into front-matter and body.
///
/// Errors are plain strings; callers attach the path.
pub fn parse_document(raw: &str) -> Result<AgentDocument, String> {
    if let Some((yaml, body)) = split_fenced(raw) {
        return Ok(AgentDocument {
            front_matter: parse_mapping(yaml)?,
            body: body.to_string(),
            format: FrontMatterFormat::Fenced,
        });
    }
    if let Some(yaml) = embedded_yaml_block(raw) {
        return Ok(AgentDocument {
            front_matter: parse_mapping(yaml)?,
            body: raw.to_string(),
            format: FrontMatterFormat::EmbeddedYaml,
        });
    }
    Ok(AgentDocument {
        front_matter: Mapping::new(),
        body: raw.to_string(),
        format: FrontMatterFormat::None,
    })
}

pub fn parse_mapping(yaml: &str) -> Result<Mapping, String> {
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(m)) => Ok(m),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err("front-matter is not a mapping".to_string()),
        Err(e) => Err(format!("invalid YAML front-matter: {e}")),
    }
}

// ---------------------------------------------------------------------------
// Field accessors
// ---------------------------------------------------------------------------

/// The nested `agent:` mapping when present, otherwise the top level.
pub fn agent_section(front_matter: &Mapping) -> &Mapping {
    match front_matter.get("agent") {
        Some(Value::Mapping(m)) => m,
        _ => front_matter,
    }
}

/// Non-empty string value for `key`. Numbers and booleans are stringified.
pub fn str_field(map: &Mapping, key: &str) -> Option<String> {
    let s = match map.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// List of strings under `key`. A single string is a one-element list; an
/// absent or null key is empty.
pub fn string_list(map: &Mapping, key: &str) -> Result<Vec<String>, String> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(vec![s.trim().to_string()]),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                _ => Err(format!("'{key}' must be a list of strings")),
            })
            .collect(),
        Some(_) => Err(format!("'{key}' must be a list of strings")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_front_matter() {
        let raw = "---\nid: dev\nname: James\n---\n\n# Dev\n\nBody.";
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc.format, FrontMatterFormat::Fenced);
        assert_eq!(str_field(&doc.front_matter, "id").as_deref(), Some("dev"));
        assert!(doc.body.starts_with("# Dev"));
    }

    #[test]
    fn parses_embedded_yaml_block() {
        let raw = "# dev\n\nACTIVATION-NOTICE: read on.\n\n```yaml\nagent:\n  name: James\n  id: dev\ndependencies:\n  tasks:\n    - develop-story.md\n```\n";
        let doc = parse_document(raw).unwrap();
        assert_eq!(doc.format, FrontMatterFormat::EmbeddedYaml);
        let agent = agent_section(&doc.front_matter);
        assert_eq!(str_field(agent, "name").as_deref(), Some("James"));
        assert_eq!(doc.body, raw);
    }

    #[test]
    fn no_front_matter_is_empty_mapping() {
        let doc = parse_document("# Just content").unwrap();
        assert_eq!(doc.format, FrontMatterFormat::None);
        assert!(doc.front_matter.is_empty());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let raw = "---\nid: [unclosed\n---\nbody";
        assert!(parse_document(raw).is_err());
        let raw = "---\n- just\n- a list\n---\nbody";
        assert_eq!(
            parse_document(raw).unwrap_err(),
            "front-matter is not a mapping"
        );
    }

    #[test]
    fn string_list_shapes() {
        let map = parse_mapping("a: [x, y]\nb: single\nc: 3\nd: [1]").unwrap();
        assert_eq!(string_list(&map, "a").unwrap(), vec!["x", "y"]);
        assert_eq!(string_list(&map, "b").unwrap(), vec!["single"]);
        assert!(string_list(&map, "missing").unwrap().is_empty());
        assert!(string_list(&map, "c").is_err());
        assert!(string_list(&map, "d").is_err());
    }
}
