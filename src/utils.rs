use crate::importer::DEFAULT_JSON_VARIABLE;
use crate::linearize::BranchPolicy;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT: &str = "chat_content.json";
pub const DEFAULT_KEY_DOCS_OUTPUT: &str = "key_documents.json";

/// Configuration required to run an extraction.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone, Debug)]
pub struct ExtractConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub key_docs_output: PathBuf,
    pub keywords: Vec<String>,
    pub key_documents: Vec<String>,
    pub json_variable: String,
    pub match_content: bool,
    pub branch: BranchPolicy,
    pub markdown_dir: Option<PathBuf>,
    pub tags: Option<Vec<String>>,
    pub force: bool,
    pub list_titles: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            key_docs_output: PathBuf::from(DEFAULT_KEY_DOCS_OUTPUT),
            keywords: Vec::new(),
            key_documents: Vec::new(),
            json_variable: DEFAULT_JSON_VARIABLE.to_owned(),
            match_content: false,
            branch: BranchPolicy::All,
            markdown_dir: None,
            tags: None,
            force: false,
            list_titles: false,
            verbose: false,
            quiet: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    Created,
    Updated,
    Skipped,
}

#[derive(Clone, Debug)]
pub struct FileFrontmatter {
    pub id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub branch: Option<String>,
}

/// Export timestamps are fractional seconds since the epoch.
pub fn timestamp_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

/// First 8 characters of an id, for diagnostics.
pub fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(i, _)| &id[..i])
}

/// Read the YAML frontmatter from an existing .md file and extract relevant fields.
/// Returns `None` when the file does not open with a `---` fence.
pub fn parse_existing_frontmatter(path: &Path) -> Option<FileFrontmatter> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let first = lines.next()?.ok()?;
    if first.trim() != "---" {
        return None;
    }

    let mut id: Option<String> = None;
    let mut updated_at: Option<DateTime<Utc>> = None;
    let mut branch: Option<String> = None;
    let mut bytes_read = 0usize;

    for line in lines {
        let line = line.ok()?;
        bytes_read += line.len() + 1;
        if bytes_read > 4096 || line.trim() == "---" {
            break;
        }
        if let Some(rest) = line.strip_prefix("id:") {
            id = Some(unquote(rest).to_string());
        } else if let Some(rest) = line.strip_prefix("updated_at:") {
            updated_at = DateTime::parse_from_rfc3339(unquote(rest))
                .ok()
                .map(|dt| dt.with_timezone(&Utc));
        } else if let Some(rest) = line.strip_prefix("branch:") {
            branch = Some(unquote(rest).to_string());
        }
    }
    Some(FileFrontmatter {
        id,
        updated_at,
        branch,
    })
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches('\'').trim_matches('"')
}
