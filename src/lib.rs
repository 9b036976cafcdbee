//! # chatgpt-export-filter
//!
//! A CLI tool that pulls project-relevant transcripts out of a ChatGPT data export.
//!
//! ## What it does
//!
//! The ChatGPT export ships a `chat.html` page that embeds every conversation as a
//! JSON array (`var jsonData = [...]`). Each conversation stores its messages as a
//! tree, so that edited and regenerated turns can coexist. This tool reads that
//! page (or a bare `conversations.json`), flattens each conversation tree into a
//! time-ordered transcript, keeps the conversations whose title (or, optionally,
//! content) mentions one of the configured keywords, and writes the matching
//! messages to a JSON file.
//!
//! Optionally, matched messages are grouped by "key document" (named reference
//! texts searched for inside message bodies), and each matched conversation can be
//! rendered as a Markdown transcript with YAML frontmatter.
//!
//! The export is opened **read-only**.
//!
//! ## Usage
//!
//! ```sh
//! # Keep conversations whose titles mention either keyword
//! chatgpt-export-filter chat.html --keywords taplive,直播 -o taplive.json
//!
//! # Also search message bodies, group by key documents, render Markdown
//! chatgpt-export-filter chat.html -k taplive --match-content \
//!     --key-docs "创始人声明,Phase" --markdown-dir transcripts/
//! ```
//!
//! Preferences can be persisted in `~/.config/chatgpt-export-filter/config.toml`.
pub mod exporter;
pub mod filter;
pub mod importer;
pub mod linearize;
pub mod process;
pub mod renderer;
pub mod unescape;
pub mod utils;
