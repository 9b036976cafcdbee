//! Type definitions and loading for the ChatGPT data export.
//!
//! An export ships either as `chat.html`, which embeds the conversations as a
//! JavaScript assignment, or as a bare `conversations.json`:
//!
//! ```text
//! <script>
//!   var jsonData = [{"title": "...", "mapping": {...}, "current_node": "..."}, ...];
//! </script>
//! ```
//!
//! Each conversation stores its messages as a tree keyed by node id (edits and
//! regenerations create sibling branches). Decoding is deliberately lenient:
//! fields are optional, and a malformed `message`, `author` or `content`
//! object, or a malformed mapping entry, is read as absent instead of failing
//! the whole document. Only JSON syntax errors abort a load.
use std::path::Path;
use std::sync::LazyLock;

use eyre::{Context, Result, eyre};
use indexmap::IndexMap;
use regex::Regex;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Variable name the HTML export assigns the conversation array to.
pub const DEFAULT_JSON_VARIABLE: &str = "jsonData";

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Author role of a message.
///
/// The export uses a small open set of tags. Anything unrecognized is kept
/// verbatim in `Other`, and a message without an author reads as `unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    Other(String),
}

impl Role {
    pub fn unknown() -> Self {
        Self::Other("unknown".into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            "tool" => Self::Tool,
            _ => Self::Other(value),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// `message.author`. Only the role matters for transcripts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Author {
    #[serde(default = "Role::unknown")]
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
}

/// `message.content`.
///
/// `parts` mixes plain strings with structured fragments (image pointers,
/// code-interpreter payloads, ...). Only the strings are text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub parts: Option<Vec<Value>>,
}

impl Content {
    /// String parts with non-whitespace content, in order.
    pub fn text_parts(&self) -> impl Iterator<Item = &str> {
        self.parts
            .iter()
            .flatten()
            .filter_map(Value::as_str)
            .filter(|part| !part.trim().is_empty())
    }
}

/// A single message attached to a tree node.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Message {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub author: Option<Author>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<Content>,
    /// Seconds since the Unix epoch, fractional.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub create_time: Option<f64>,
}

impl Message {
    pub fn role(&self) -> Role {
        self.author
            .as_ref()
            .map(|a| a.role.clone())
            .unwrap_or_else(Role::unknown)
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// One entry of `conversation.mapping`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Node {
    /// Filled from the mapping key when the node body omits it.
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub parent: Option<String>,
    #[serde(default, deserialize_with = "lenient_ids")]
    pub children: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<Message>,
}

/// One conversation of the export.
///
/// `mapping` keeps the export's key order, which the linearizer relies on for
/// root order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Conversation {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub create_time: Option<f64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub update_time: Option<f64>,
    #[serde(default, deserialize_with = "lenient_mapping")]
    pub mapping: IndexMap<String, Node>,
    #[serde(default, deserialize_with = "lenient")]
    pub current_node: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub conversation_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<String>,
}

impl Conversation {
    /// Stable identifier. Newer exports carry `conversation_id`, older ones `id`.
    pub fn id(&self) -> Option<&str> {
        self.conversation_id
            .as_deref()
            .or(self.id.as_deref())
            .filter(|id| !id.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient::<D, String>(deserializer)?.unwrap_or_default())
}

/// Numbers are taken as-is, numeric strings are parsed, everything else is absent.
fn lenient_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|t| t.is_finite()))
}

fn lenient_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect())
}

/// Reads the mapping entry by entry so one bad node only drops that node.
/// Deserializing straight into `IndexMap` preserves the key order of the
/// source text.
fn lenient_mapping<'de, D>(deserializer: D) -> Result<IndexMap<String, Node>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<IndexMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| {
            let mut node = serde_json::from_value::<Node>(value).ok()?;
            if node.id.is_empty() {
                node.id = key.clone();
            }
            Some((key, node))
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Result of parsing an export document.
#[derive(Debug)]
pub struct ParsedExport {
    pub conversations: Vec<Conversation>,
    /// Set when the first parse failed and the control-character repair succeeded.
    pub repaired: bool,
}

/// Read an export file from disk and parse the conversations it carries.
pub fn read_export(path: &Path, variable: &str) -> Result<ParsedExport> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read export: {}", path.display()))?;
    parse_export(&text, variable)
        .wrap_err_with(|| format!("Failed to load conversations from {}", path.display()))
}

/// Parse an export document (HTML with an embedded array, or bare JSON).
///
/// A syntax error triggers exactly one retry after escaping raw control
/// characters inside string literals. If that retry fails too, the original
/// error is reported.
pub fn parse_export(text: &str, variable: &str) -> Result<ParsedExport> {
    let json = locate_json_array(text, variable)?;

    let first_error = match parse_conversations(json) {
        Ok(conversations) => {
            return Ok(ParsedExport {
                conversations,
                repaired: false,
            });
        }
        Err(e) => e,
    };

    let Some(repaired) = escape_control_chars(json) else {
        return Err(first_error).wrap_err("Failed to parse conversation array");
    };

    match parse_conversations(&repaired) {
        Ok(conversations) => Ok(ParsedExport {
            conversations,
            repaired: true,
        }),
        Err(_) => Err(first_error)
            .wrap_err("Failed to parse conversation array (control-character repair did not help)"),
    }
}

/// Return the text starting at the `[` of the conversation array.
///
/// The slice runs to the end of the input; the parser stops at the end of the
/// first JSON value, so trailing markup never needs to be located.
pub fn locate_json_array<'a>(text: &'a str, variable: &str) -> Result<&'a str> {
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    let pattern = format!(r"\b{}\s*=\s*\[", regex::escape(variable));
    let re = Regex::new(&pattern).wrap_err("Invalid JSON variable name")?;
    let m = re
        .find(text)
        .ok_or_else(|| eyre!("No embedded conversation array found (expected `{variable} = [...]`)"))?;
    // The match ends just past the opening bracket.
    Ok(&text[m.end() - 1..])
}

/// Deserialize the first JSON value of `json` as the conversation array.
pub fn parse_conversations(json: &str) -> Result<Vec<Conversation>, serde_json::Error> {
    let mut stream = serde_json::Deserializer::from_str(json).into_iter::<Vec<Conversation>>();
    match stream.next() {
        Some(result) => result,
        None => Err(serde::de::Error::custom("empty conversation array input")),
    }
}

static NEEDS_REPAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x1f]").expect("static pattern"));

/// Escape raw control characters that appear inside JSON string literals.
///
/// Returns `None` when nothing needed escaping, so callers can skip a retry
/// that cannot change the outcome.
pub fn escape_control_chars(json: &str) -> Option<String> {
    if !NEEDS_REPAIR.is_match(json) {
        return None;
    }

    let mut out = String::with_capacity(json.len() + 64);
    let mut in_string = false;
    let mut escaped = false;
    let mut changed = false;

    for c in json.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            } else if (c as u32) < 0x20 {
                changed = true;
                match c {
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    other => out.push_str(&format!("\\u{:04x}", other as u32)),
                }
                continue;
            }
        } else if c == '"' {
            in_string = true;
        }
        out.push(c);
    }

    changed.then_some(out)
}
