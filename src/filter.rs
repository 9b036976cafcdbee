//! Relevance filtering.
//!
//! A conversation is relevant when its title mentions one of the configured
//! keywords, or, when content matching is enabled, one of its messages does.
//! Matched messages can then be grouped by "key document": named reference
//! texts (policies, statements, ...) searched for inside the message bodies.

use crate::exporter::TranscriptRecord;
use crate::linearize::TranscriptMessage;
use eyre::{Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;

/// Case-insensitive substring match against titles and, optionally, content.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    keywords: Vec<String>,
    match_content: bool,
}

impl KeywordFilter {
    /// Blank keywords are dropped. With no keywords left, everything matches.
    pub fn new<I, S>(keywords: I, match_content: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            keywords,
            match_content,
        }
    }

    pub fn matches_everything(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Whether the body must be linearized before a decision can be made.
    pub fn needs_content(&self) -> bool {
        self.match_content && !self.matches_everything()
    }

    pub fn matches_title(&self, title: &str) -> bool {
        self.matches_text(title)
    }

    pub fn matches(&self, title: &str, messages: &[TranscriptMessage]) -> bool {
        self.matches_title(title)
            || (self.match_content && messages.iter().any(|m| self.matches_text(&m.content)))
    }

    fn matches_text(&self, text: &str) -> bool {
        if self.matches_everything() {
            return true;
        }
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// A matched record that mentions a key document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyDocumentHit {
    #[serde(flatten)]
    pub record: TranscriptRecord,
    /// From the document name up to the next blank line.
    pub snippet: String,
}

#[derive(Debug)]
struct KeyDocument {
    name: String,
    snippet: Regex,
}

/// Groups records by the key documents they mention, in configured order.
#[derive(Debug, Default)]
pub struct KeyDocumentIndex {
    documents: Vec<KeyDocument>,
    hits: IndexMap<String, Vec<KeyDocumentHit>>,
}

impl KeyDocumentIndex {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::default();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || index.hits.contains_key(name) {
                continue;
            }
            let snippet = Regex::new(&format!(r"(?s){}.*?(?:\n\s*\n|$)", regex::escape(name)))
                .wrap_err_with(|| format!("Invalid key document name: {name:?}"))?;
            index.documents.push(KeyDocument {
                name: name.to_owned(),
                snippet,
            });
            index.hits.insert(name.to_owned(), Vec::new());
        }
        Ok(index)
    }

    /// True when no key documents are configured.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Record every key document that `record` mentions (case-sensitive).
    pub fn observe(&mut self, record: &TranscriptRecord) -> usize {
        let mut found = 0;
        for doc in &self.documents {
            let Some(m) = doc.snippet.find(&record.content) else {
                continue;
            };
            found += 1;
            if let Some(hits) = self.hits.get_mut(&doc.name) {
                hits.push(KeyDocumentHit {
                    record: record.clone(),
                    snippet: m.as_str().trim_end().to_owned(),
                });
            }
        }
        found
    }

    pub fn hit_count(&self) -> usize {
        self.hits.values().map(Vec::len).sum()
    }

    /// Per-document mention counts, in configured order, including zeros.
    pub fn counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.hits.iter().map(|(name, hits)| (name.as_str(), hits.len()))
    }

    /// Documents that were mentioned at least once.
    pub fn into_found(self) -> IndexMap<String, Vec<KeyDocumentHit>> {
        self.hits
            .into_iter()
            .filter(|(_, hits)| !hits.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::Role;

    fn message(content: &str) -> TranscriptMessage {
        TranscriptMessage {
            node_id: "n".into(),
            author: Role::User,
            content: content.into(),
            create_time: None,
        }
    }

    fn record(content: &str) -> TranscriptRecord {
        TranscriptRecord::new("conv", &message(content))
    }

    #[test]
    fn title_match_is_case_insensitive() {
        let filter = KeywordFilter::new(["TapLive", "直播"], false);
        assert!(filter.matches_title("Notes on taplive pricing"));
        assert!(filter.matches_title("直播合规"));
        assert!(!filter.matches_title("Grocery list"));
    }

    #[test]
    fn content_match_is_opt_in() {
        let body = [message("we discussed TAPLIVE at length")];
        let titles_only = KeywordFilter::new(["taplive"], false);
        assert!(!titles_only.matches("Untitled", &body));
        assert!(!titles_only.needs_content());

        let with_content = KeywordFilter::new(["taplive"], true);
        assert!(with_content.matches("Untitled", &body));
        assert!(with_content.needs_content());
    }

    #[test]
    fn no_keywords_matches_everything() {
        let filter = KeywordFilter::new(["", "  "], true);
        assert!(filter.matches_everything());
        assert!(filter.matches_title("anything"));
        assert!(!filter.needs_content());
    }

    #[test]
    fn key_documents_capture_snippet_to_blank_line() {
        let mut index = KeyDocumentIndex::new(["创始人声明", "Phase"]).unwrap();
        let found = index.observe(&record(
            "intro\n创始人声明：第一条\n第二条\n\n后续内容 Phase 2 rollout",
        ));
        assert_eq!(found, 2);

        let docs = index.into_found();
        assert_eq!(docs.keys().collect::<Vec<_>>(), ["创始人声明", "Phase"]);
        assert_eq!(docs["创始人声明"][0].snippet, "创始人声明：第一条\n第二条");
        assert_eq!(docs["Phase"][0].snippet, "Phase 2 rollout");
        assert_eq!(docs["Phase"][0].record.conversation, "conv");
    }

    #[test]
    fn unmentioned_documents_are_omitted() {
        let mut index = KeyDocumentIndex::new(["Alpha", "Beta", "Alpha"]).unwrap();
        index.observe(&record("only beta? no: Beta."));
        index.observe(&record("alpha in lowercase does not count"));
        assert_eq!(index.hit_count(), 1);
        assert_eq!(
            index.counts().collect::<Vec<_>>(),
            [("Alpha", 0), ("Beta", 1)]
        );
        let docs = index.into_found();
        assert_eq!(docs.len(), 1);
        assert!(docs.contains_key("Beta"));
    }

    #[test]
    fn names_are_matched_literally() {
        let mut index = KeyDocumentIndex::new(["v1.0 (draft)"]).unwrap();
        assert_eq!(index.observe(&record("see v1x0 (draft)")), 0);
        assert_eq!(index.observe(&record("see v1.0 (draft) here")), 1);
    }
}
