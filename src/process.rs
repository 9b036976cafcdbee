use crate::exporter::{self, TranscriptRecord};
use crate::filter::{KeyDocumentIndex, KeywordFilter};
use crate::importer::{self, Conversation};
use crate::linearize::{self, Transcript, TranscriptMessage};
use crate::renderer;
use crate::unescape::decode_or_raw;
use crate::utils::{
    ExtractConfig, ProcessResult, parse_existing_frontmatter, short_id, timestamp_to_datetime,
};
use eyre::{Context, Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub conversations: usize,
    pub matched: usize,
    pub messages: usize,
    pub key_document_hits: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// The main entry point for the extraction logic.
/// Loads the export, selects relevant conversations, linearizes them and
/// writes the result files.
pub fn execute(config: &ExtractConfig) -> Result<RunSummary> {
    let parsed = importer::read_export(&config.input, &config.json_variable)?;
    if parsed.repaired && !config.quiet {
        eprintln!("Note: escaped stray control characters in the embedded JSON.");
    }
    let conversations = parsed.conversations;

    let filter = KeywordFilter::new(&config.keywords, config.match_content);
    let mut key_docs = KeyDocumentIndex::new(&config.key_documents)?;
    let mut markdown = match &config.markdown_dir {
        Some(dir) => Some(MarkdownExport::open(dir)?),
        None => None,
    };

    let pb = make_bar(conversations.len() as u64, config.quiet);
    pb.println(format!("Found {} conversations.", conversations.len()));

    let mut summary = RunSummary {
        conversations: conversations.len(),
        ..RunSummary::default()
    };
    let mut records: Vec<TranscriptRecord> = Vec::new();

    for (index, conversation) in conversations.iter().enumerate() {
        let title = decode_or_raw(&conversation.title);

        // Only walk the tree when the title alone cannot decide.
        let title_match = filter.matches_title(&title);
        let mut transcript = Transcript::new();
        if title_match || filter.needs_content() {
            linearize::linearize_with(conversation, config.branch, &mut transcript);
        }
        let matched = title_match || filter.matches(&title, transcript.messages());

        if config.list_titles {
            print_title(&pb, index, conversation, &title, matched);
        }
        if !matched {
            pb.inc(1);
            continue;
        }

        summary.matched += 1;
        if config.verbose {
            pb.println(format!(
                "Matched:  {} ({} messages)",
                title,
                transcript.len()
            ));
        }

        for message in transcript.messages() {
            let record = TranscriptRecord::new(&title, message);
            key_docs.observe(&record);
            records.push(record);
        }

        if let Some(md) = markdown.as_mut() {
            match md.export(index, conversation, &title, transcript.messages(), config, &pb) {
                Ok(ProcessResult::Created) => summary.created += 1,
                Ok(ProcessResult::Updated) => summary.updated += 1,
                Ok(ProcessResult::Skipped) => summary.skipped += 1,
                Err(e) => {
                    summary.errors += 1;
                    let label = conversation.id().map(short_id).unwrap_or(title.as_str());
                    pb.println(format!("Error [{}]: {:#}", label, e));
                }
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();

    summary.messages = records.len();
    exporter::write_records(&config.output, &records)
        .wrap_err("Failed to write extracted messages")?;

    if !key_docs.is_empty() {
        if !config.quiet {
            eprintln!("Key documents:");
            for (name, count) in key_docs.counts() {
                eprintln!("  {}: {} mention(s)", name, count);
            }
        }
        summary.key_document_hits = key_docs.hit_count();
        exporter::write_key_documents(&config.key_docs_output, &key_docs.into_found())
            .wrap_err("Failed to write key documents")?;
    }

    if !config.quiet {
        let mut line = format!(
            "Done. {} of {} conversations matched, {} messages written to {}.",
            summary.matched,
            summary.conversations,
            summary.messages,
            config.output.display()
        );
        if config.markdown_dir.is_some() {
            line.push_str(&format!(
                " Markdown: {} created, {} updated, {} skipped.",
                summary.created, summary.updated, summary.skipped
            ));
        }
        if summary.errors > 0 {
            line.push_str(&format!(" Completed with {} error(s).", summary.errors));
        }
        eprintln!("{}", line);
    }

    Ok(summary)
}

fn make_bar(total: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)",
        )
        .unwrap()
        .progress_chars("=>-"),
    );
    bar
}

fn print_title(pb: &ProgressBar, index: usize, conversation: &Conversation, title: &str, matched: bool) {
    let date = conversation
        .create_time
        .and_then(timestamp_to_datetime)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".into());
    let marker = if matched { "  [match]" } else { "" };
    pb.suspend(|| println!("{:>4}. {} {}{}", index + 1, date, title, marker));
}

// ── Markdown transcripts ──────────────────────────────────────────────────────

struct MarkdownExport {
    dir: PathBuf,
    /// Filename prefix → conversation id that owns it.
    registry: HashMap<String, String>,
    /// Conversation id → its transcript on disk.
    file_index: HashMap<String, PathBuf>,
}

impl MarkdownExport {
    fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).wrap_err_with(|| {
            format!("Failed to create markdown directory: {}", dir.display())
        })?;
        let mut registry = HashMap::new();
        let file_index = build_file_index(dir, &mut registry);
        Ok(Self {
            dir: dir.to_path_buf(),
            registry,
            file_index,
        })
    }

    fn export(
        &mut self,
        index: usize,
        conversation: &Conversation,
        title: &str,
        messages: &[TranscriptMessage],
        config: &ExtractConfig,
        pb: &ProgressBar,
    ) -> Result<ProcessResult> {
        // Conversations without an id fall back to their position in the export.
        // Those ids share leading zeros, so they are never shortened.
        let (id, shorten) = match conversation.id() {
            Some(id) => (id.to_owned(), true),
            None => (format!("{:012}", index + 1), false),
        };
        let stem = allocate_filename(&id, title, shorten, &mut self.registry);

        let desired_path = self.dir.join(format!("{}.md", stem));
        let existing_path = self.file_index.get(&id).cloned();

        if !config.force
            && let Some(existing) = &existing_path
            && existing == &desired_path
            && let Some(fm) = parse_existing_frontmatter(existing)
            && let Some(file_updated_at) = fm.updated_at
            && let Some(updated_at) = conversation.update_time.and_then(timestamp_to_datetime)
            && file_updated_at >= updated_at
            && fm.id.as_deref() == Some(id.as_str())
            && fm.branch.as_deref() == Some(config.branch.as_str())
        {
            if config.verbose {
                pb.println(format!("Skipped:  {}.md", stem));
            }
            return Ok(ProcessResult::Skipped);
        }

        let result_variant = if existing_path.is_none() {
            ProcessResult::Created
        } else {
            ProcessResult::Updated
        };

        // Rename if the title (and so the slug) changed
        if let Some(existing) = &existing_path
            && existing != &desired_path
            && let Err(e) = fs::rename(existing, &desired_path)
        {
            pb.println(format!(
                "Warning: could not rename {} → {}: {}",
                existing.display(),
                desired_path.display(),
                e
            ));
        }

        // Update the index so subsequent lookups reflect the rename
        self.file_index.insert(id.clone(), desired_path.clone());

        let md_file = File::create(&desired_path)
            .wrap_err_with(|| format!("Failed to create: {}", desired_path.display()))?;
        let mut writer = BufWriter::new(md_file);

        if let Err(e) = renderer::render_transcript(
            &mut writer,
            conversation,
            &id,
            title,
            config.branch,
            messages,
            config.tags.as_deref(),
        ) {
            drop(writer);
            let _ = fs::remove_file(&desired_path);
            return Err(eyre!("Failed to write transcript markdown: {}", e));
        }

        writer.flush().wrap_err("Failed to flush markdown file")?;

        if config.verbose {
            match result_variant {
                ProcessResult::Created => pb.println(format!("Created:  {}.md", stem)),
                ProcessResult::Updated => pb.println(format!("Updated:  {}.md", stem)),
                ProcessResult::Skipped => unreachable!(),
            }
        }

        Ok(result_variant)
    }
}

fn allocate_filename(
    id: &str,
    title: &str,
    shorten: bool,
    registry: &mut HashMap<String, String>,
) -> String {
    let raw_slug = slug::slugify(title);
    // Truncate slug to 60 chars (slug output is ASCII-only, so byte == char)
    let slug = raw_slug[..raw_slug.len().min(60)]
        .trim_end_matches('-')
        .to_string();
    let with_slug = |candidate: &str| {
        if slug.is_empty() {
            candidate.to_string()
        } else {
            format!("{}_{}", candidate, slug)
        }
    };

    let lengths: &[usize] = if shorten { &[8, 12] } else { &[] };
    for &len in lengths.iter().chain([id.len()].iter()) {
        let candidate = id.get(..len).unwrap_or(id);
        match registry.get(candidate) {
            None => {
                registry.insert(candidate.to_string(), id.to_string());
                return with_slug(candidate);
            }
            Some(existing) if existing == id => return with_slug(candidate),
            Some(_) => continue,
        }
    }
    // Only reachable when the full id is already owned by something else.
    with_slug(id)
}

/// Build an in-memory index of existing .md files: conversation id → full path.
///
/// Each file's prefix (the portion of the filename before the first '_', or
/// before '.md' if no '_') is reserved in `registry` for the id in its
/// frontmatter. Files without a readable id reserve their prefix under their
/// own path, so no conversation is ever written over them.
fn build_file_index(dir: &Path, registry: &mut HashMap<String, String>) -> HashMap<String, PathBuf> {
    let mut map = HashMap::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return map;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        let Some(stem) = name_str.strip_suffix(".md") else {
            continue;
        };
        let prefix = stem.split('_').next().unwrap_or(stem);
        if prefix.is_empty() {
            continue;
        }
        let owner = parse_existing_frontmatter(&path)
            .and_then(|fm| fm.id)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| path.display().to_string());
        registry
            .entry(prefix.to_string())
            .or_insert_with(|| owner.clone());
        map.insert(owner, path);
    }
    map
}
