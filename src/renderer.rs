use crate::importer::{Conversation, Role};
use crate::linearize::{BranchPolicy, TranscriptMessage};
use crate::utils::timestamp_to_datetime;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct Frontmatter<'a> {
    id: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    branch: &'static str,
    message_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a [String]>,
}

fn heading(role: &Role) -> &str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System => "System",
        Role::Tool => "Tool",
        Role::Other(tag) => tag,
    }
}

/// Render one linearized conversation as Markdown with YAML frontmatter.
///
/// `id` is written to the frontmatter and identifies the file on later runs.
pub fn render_transcript<W: Write>(
    writer: &mut W,
    conversation: &Conversation,
    id: &str,
    title: &str,
    branch: BranchPolicy,
    messages: &[TranscriptMessage],
    tags: Option<&[String]>,
) -> std::io::Result<()> {
    let fm = Frontmatter {
        id,
        title,
        created_at: conversation.create_time.and_then(timestamp_to_datetime),
        updated_at: conversation.update_time.and_then(timestamp_to_datetime),
        branch: branch.as_str(),
        message_count: messages.len(),
        tags,
    };

    writeln!(writer, "---")?;
    let yaml = serde_yaml::to_string(&fm).map_err(std::io::Error::other)?;
    write!(writer, "{}", yaml)?;
    writeln!(writer, "---")?;
    writeln!(writer)?;

    for msg in messages {
        writeln!(writer, "## {}", heading(&msg.author))?;
        writeln!(writer)?;
        if let Some(ts) = msg.create_time.and_then(timestamp_to_datetime) {
            writeln!(writer, "_{}_", ts.format("%Y-%m-%d %H:%M:%S UTC"))?;
            writeln!(writer)?;
        }
        writeln!(writer, "{}", msg.content)?;
        writeln!(writer)?;
    }

    Ok(())
}
