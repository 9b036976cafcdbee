//! Conversation tree linearization.
//!
//! A conversation is stored as a tree of nodes so that edited and regenerated
//! turns can live side by side. This module flattens that tree into a single
//! transcript:
//!
//! 1. Walk depth-first from every root (a node without a parent), roots and
//!    children in export order. Each node is visited at most once, so cyclic
//!    or otherwise malformed links cannot loop.
//! 2. Keep nodes whose author is not `system` and whose string parts contain
//!    non-whitespace text. Kept parts are joined with a newline and run
//!    through [`decode_or_raw`].
//! 3. Stable-sort by `create_time` ascending, missing timestamps as `0`.
//!    Walk order only breaks ties.
//!
//! Nodes are addressed by id through the mapping and walked with an explicit
//! stack, so long conversations cannot overflow the call stack.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::importer::{Conversation, Node, Role};
use crate::unescape::decode_or_raw;

/// Which branches of the tree contribute to the transcript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BranchPolicy {
    /// Every reachable node, including abandoned edits and regenerations.
    #[default]
    All,
    /// Only the path from a root to `current_node`, i.e. what the UI showed last.
    /// Falls back to `All` when `current_node` is missing or dangling.
    Current,
}

impl BranchPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Current => "current",
        }
    }
}

/// One visible message of a linearized conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptMessage {
    pub node_id: String,
    pub author: Role,
    pub content: String,
    pub create_time: Option<f64>,
}

impl TranscriptMessage {
    fn sort_key(&self) -> f64 {
        self.create_time.unwrap_or(0.0)
    }
}

/// Caller-owned output container.
///
/// Each `linearize_*` call appends one conversation's messages and sorts only
/// what it appended, so a single `Transcript` can collect several
/// conversations back to back.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<TranscriptMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[TranscriptMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<TranscriptMessage> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Linearize every branch of `conversation` into a fresh list.
pub fn linearize(conversation: &Conversation) -> Vec<TranscriptMessage> {
    let mut transcript = Transcript::new();
    linearize_into(conversation, &mut transcript);
    transcript.into_messages()
}

/// Append every branch of `conversation` to `out`.
pub fn linearize_into(conversation: &Conversation, out: &mut Transcript) {
    linearize_with(conversation, BranchPolicy::All, out);
}

/// Append `conversation` to `out` following `policy`.
pub fn linearize_with(conversation: &Conversation, policy: BranchPolicy, out: &mut Transcript) {
    let start = out.messages.len();
    let mut emit = |id: &str, node: &Node| {
        if let Some(message) = visible_message(id, node) {
            out.messages.push(message);
        }
    };

    let walked_current = policy == BranchPolicy::Current && walk_current_branch(conversation, &mut emit);
    if !walked_current {
        walk_all(conversation, &mut emit);
    }

    out.messages[start..].sort_by(|a, b| {
        a.sort_key()
            .partial_cmp(&b.sort_key())
            .unwrap_or(Ordering::Equal)
    });
}

/// Depth-first pre-order walk from every root.
fn walk_all<'a>(conversation: &'a Conversation, emit: &mut impl FnMut(&'a str, &'a Node)) {
    let mapping = &conversation.mapping;
    let mut visited: HashSet<&str> = HashSet::with_capacity(mapping.len());
    let mut stack: Vec<&str> = Vec::new();

    let roots = mapping
        .iter()
        .filter(|(_, node)| node.parent.is_none())
        .map(|(id, _)| id.as_str());

    for root in roots {
        stack.push(root);
        while let Some(id) = stack.pop() {
            if id.is_empty() || !visited.insert(id) {
                continue;
            }
            let Some(node) = mapping.get(id) else {
                continue;
            };
            emit(id, node);
            // Reversed so the first child is popped first.
            stack.extend(node.children.iter().rev().map(String::as_str));
        }
    }
}

/// Walk from `current_node` up through its ancestors and emit them root first.
/// Returns `false` without emitting anything if there is no usable current node.
fn walk_current_branch<'a>(
    conversation: &'a Conversation,
    emit: &mut impl FnMut(&'a str, &'a Node),
) -> bool {
    let mapping = &conversation.mapping;
    let Some((mut id, mut node)) = conversation
        .current_node
        .as_deref()
        .and_then(|id| mapping.get_key_value(id))
        .map(|(id, node)| (id.as_str(), node))
    else {
        return false;
    };

    let mut visited: HashSet<&str> = HashSet::new();
    let mut path: Vec<(&str, &Node)> = Vec::new();
    while visited.insert(id) {
        path.push((id, node));
        match node
            .parent
            .as_deref()
            .and_then(|parent| mapping.get_key_value(parent))
        {
            Some((parent_id, parent)) => {
                id = parent_id.as_str();
                node = parent;
            }
            None => break,
        }
    }

    for (id, node) in path.into_iter().rev() {
        emit(id, node);
    }
    true
}

fn visible_message(id: &str, node: &Node) -> Option<TranscriptMessage> {
    let message = node.message.as_ref()?;
    let author = message.role();
    if author == Role::System {
        return None;
    }

    let parts: Vec<&str> = message.content.as_ref()?.text_parts().collect();
    if parts.is_empty() {
        return None;
    }

    Some(TranscriptMessage {
        node_id: id.to_owned(),
        author,
        content: decode_or_raw(&parts.join("\n")),
        create_time: message.create_time,
    })
}
