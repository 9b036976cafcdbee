use chatgpt_export_filter::importer::DEFAULT_JSON_VARIABLE;
use chatgpt_export_filter::linearize::BranchPolicy;
use chatgpt_export_filter::process;
use chatgpt_export_filter::utils::{self, DEFAULT_KEY_DOCS_OUTPUT, DEFAULT_OUTPUT};
use clap::Parser;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Extract project-relevant transcripts from a ChatGPT data export.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Export file: chat.html with an embedded array, or conversations.json.
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Where to write the matched messages (JSON).
    /// Defaults to ./chat_content.json if not set in config.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Where to write key-document hits (JSON).
    /// Defaults to ./key_documents.json if not set in config.
    #[arg(long, value_name = "PATH")]
    key_docs_output: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/chatgpt-export-filter/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Comma-separated keywords matched against conversation titles (case-insensitive).
    /// Without keywords every conversation matches.
    #[arg(short, long, value_name = "KEYWORDS", value_delimiter = ',')]
    keywords: Option<Vec<String>>,

    /// Comma-separated key document names to look for in matched messages.
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    key_docs: Option<Vec<String>>,

    /// Also match keywords against message content, not just titles.
    #[arg(long, overrides_with = "no_match_content")]
    match_content: bool,

    /// Match titles only, even if the config file enables content matching.
    #[arg(long, overrides_with = "match_content")]
    no_match_content: bool,

    /// Which branches of each conversation tree to include.
    #[arg(long, value_enum, value_name = "POLICY")]
    branch: Option<BranchPolicy>,

    /// JavaScript variable holding the conversation array in chat.html.
    #[arg(long = "var", value_name = "NAME")]
    json_variable: Option<String>,

    /// Also render each matched conversation as Markdown into this directory.
    #[arg(long, value_name = "DIR")]
    markdown_dir: Option<PathBuf>,

    /// Comma-separated tags to add to Markdown frontmatter (e.g. "chatgpt,notes").
    #[arg(long, value_name = "TAGS", value_delimiter = ',')]
    tags: Option<Vec<String>>,

    /// Re-render Markdown files even if they are up to date.
    #[arg(short, long)]
    force: bool,

    /// Print every conversation title, marking the matches.
    #[arg(long)]
    list_titles: bool,

    /// Print each matched conversation and file written or skipped.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress progress and summary output.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    key_docs_output: Option<PathBuf>,
    keywords: Option<Vec<String>>,
    key_documents: Option<Vec<String>>,
    json_variable: Option<String>,
    match_content: Option<bool>,
    branch: Option<BranchPolicy>,
    markdown_dir: Option<PathBuf>,
    tags: Option<Vec<String>>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        // Search: XDG/OS config dir, then nothing
        dirs::config_dir()
            .map(|d| d.join("chatgpt-export-filter/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

/// An explicit `--flag` / `--no-flag` wins over the config value.
fn resolve_flag(on: bool, off: bool, config: Option<bool>) -> bool {
    if off {
        false
    } else {
        on || config.unwrap_or(false)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve input (CLI > Config)
    let input = cli.input.or(file_cfg.input).ok_or_else(|| {
        eyre!("No export file given.\nPass INPUT (chat.html or conversations.json), or set input in config.toml.")
    })?;
    if !input.exists() {
        return Err(eyre!("Export file not found at: {}", input.display()));
    }

    // 3. Resolve the rest (CLI > Config > Default)
    let config = utils::ExtractConfig {
        input,
        output: cli
            .output
            .or(file_cfg.output)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
        key_docs_output: cli
            .key_docs_output
            .or(file_cfg.key_docs_output)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_DOCS_OUTPUT)),
        keywords: cli.keywords.or(file_cfg.keywords).unwrap_or_default(),
        key_documents: cli.key_docs.or(file_cfg.key_documents).unwrap_or_default(),
        json_variable: cli
            .json_variable
            .or(file_cfg.json_variable)
            .unwrap_or_else(|| DEFAULT_JSON_VARIABLE.to_string()),
        match_content: resolve_flag(
            cli.match_content,
            cli.no_match_content,
            file_cfg.match_content,
        ),
        branch: cli.branch.or(file_cfg.branch).unwrap_or_default(),
        markdown_dir: cli.markdown_dir.or(file_cfg.markdown_dir),
        tags: cli.tags.or(file_cfg.tags),
        force: cli.force,
        list_titles: cli.list_titles,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    // 4. Run the Business Logic
    process::execute(&config).map(|_| ())
}
