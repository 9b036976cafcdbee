use chatgpt_export_filter::linearize::BranchPolicy;
use chatgpt_export_filter::process;
use chatgpt_export_filter::utils::ExtractConfig;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn export_html(conversations: &Value) -> String {
    format!(
        "<!DOCTYPE html><html><head><script>\nvar jsonData = {};\n</script></head>\
         <body><div id=\"root\"></div><script>buildConversations(jsonData);</script></body></html>",
        conversations
    )
}

fn sample_export() -> Value {
    json!([
        {
            "title": "TapLive \\u5408\\u89c4",
            "create_time": 1700000000.0,
            "update_time": 1700000500.0,
            "conversation_id": "c0ffee00-0000-4000-8000-000000000001",
            "current_node": "a2",
            "mapping": {
                "root": {"id": "root", "parent": null, "children": ["sys"], "message": null},
                "sys": {"id": "sys", "parent": "root", "children": ["q"], "message": {
                    "author": {"role": "system"},
                    "content": {"content_type": "text", "parts": ["You are ChatGPT"]},
                    "create_time": null}},
                "q": {"id": "q", "parent": "sys", "children": ["a1", "a2"], "message": {
                    "author": {"role": "user"},
                    "content": {"content_type": "text", "parts": ["Draft the 创始人声明 please"]},
                    "create_time": 1700000010.0}},
                "a1": {"id": "a1", "parent": "q", "children": [], "message": {
                    "author": {"role": "assistant"},
                    "content": {"content_type": "text", "parts": ["first attempt"]},
                    "create_time": 1700000020.0}},
                "a2": {"id": "a2", "parent": "q", "children": [], "message": {
                    "author": {"role": "assistant"},
                    "content": {"content_type": "text", "parts": ["", "创始人声明\n我们不发代币。\n\nPhase 1 starts soon"]},
                    "create_time": 1700000030.0}}
            }
        },
        {
            "title": "Dinner recipes",
            "conversation_id": "c0ffee00-0000-4000-8000-000000000002",
            "mapping": {
                "r": {"parent": null, "children": ["m"], "message": null},
                "m": {"parent": "r", "children": [], "message": {
                    "author": {"role": "user"},
                    "content": {"parts": ["Is taplive a pasta?"]},
                    "create_time": 1700001000.0}}
            }
        }
    ])
}

fn write_input(dir: &Path) -> std::path::PathBuf {
    let input = dir.join("chat.html");
    fs::write(&input, export_html(&sample_export())).unwrap();
    input
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn base_config(dir: &Path) -> ExtractConfig {
    ExtractConfig {
        input: write_input(dir),
        output: dir.join("out/chat_content.json"),
        key_docs_output: dir.join("out/key_documents.json"),
        keywords: vec!["taplive".into()],
        quiet: true,
        ..ExtractConfig::default()
    }
}

#[test]
fn extracts_matching_conversations_in_time_order() {
    let td = TempDir::new().unwrap();
    let config = base_config(td.path());

    let summary = process::execute(&config).unwrap();
    assert_eq!(summary.conversations, 2);
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.messages, 3);

    let records = read_json(&config.output);
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r["conversation"] == "TapLive 合规"));
    assert!(records.iter().all(|r| r["author"] != "system"));

    let contents: Vec<&str> = records.iter().map(|r| r["content"].as_str().unwrap()).collect();
    assert_eq!(
        contents,
        [
            "Draft the 创始人声明 please",
            "first attempt",
            "创始人声明\n我们不发代币。\n\nPhase 1 starts soon"
        ]
    );
    assert_eq!(records[0]["author"], "user");
    assert_eq!(records[0]["create_time"], 1700000010.0);

    // No key documents configured, no key documents file.
    assert!(!config.key_docs_output.exists());
}

#[test]
fn content_matching_and_current_branch() {
    let td = TempDir::new().unwrap();
    let config = ExtractConfig {
        match_content: true,
        branch: BranchPolicy::Current,
        ..base_config(td.path())
    };

    let summary = process::execute(&config).unwrap();
    assert_eq!(summary.matched, 2);

    let records = read_json(&config.output);
    let contents: Vec<&str> = records
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["content"].as_str().unwrap())
        .collect();
    // The abandoned "first attempt" branch is not on the current path.
    assert!(!contents.contains(&"first attempt"));
    assert!(contents.contains(&"Is taplive a pasta?"));
}

#[test]
fn groups_key_documents() {
    let td = TempDir::new().unwrap();
    let config = ExtractConfig {
        key_documents: vec!["创始人声明".into(), "Phase".into(), "开发者许可协议".into()],
        ..base_config(td.path())
    };

    let summary = process::execute(&config).unwrap();
    assert_eq!(summary.key_document_hits, 3);

    let docs = read_json(&config.key_docs_output);
    let names: Vec<&String> = docs.as_object().unwrap().keys().collect();
    assert_eq!(names.len(), 2);
    assert!(docs.get("开发者许可协议").is_none());

    let founder = docs["创始人声明"].as_array().unwrap();
    assert_eq!(founder.len(), 2);
    assert_eq!(founder[0]["snippet"], "创始人声明 please");
    assert_eq!(founder[1]["snippet"], "创始人声明\n我们不发代币。");
    assert_eq!(docs["Phase"][0]["snippet"], "Phase 1 starts soon");
    assert_eq!(docs["Phase"][0]["conversation"], "TapLive 合规");
}

#[test]
fn zero_matches_is_not_an_error() {
    let td = TempDir::new().unwrap();
    let config = ExtractConfig {
        keywords: vec!["nothing-like-this".into()],
        ..base_config(td.path())
    };

    let summary = process::execute(&config).unwrap();
    assert_eq!(summary.matched, 0);
    assert_eq!(read_json(&config.output), json!([]));
}

#[test]
fn missing_input_is_fatal() {
    let td = TempDir::new().unwrap();
    let config = ExtractConfig {
        input: td.path().join("nope.html"),
        ..base_config(td.path())
    };
    let err = process::execute(&config).unwrap_err();
    assert!(format!("{err:#}").contains("nope.html"));
    assert!(!config.output.exists());
}

#[test]
fn markdown_export_is_incremental() {
    let td = TempDir::new().unwrap();
    let md_dir = td.path().join("md");
    let config = ExtractConfig {
        markdown_dir: Some(md_dir.clone()),
        tags: Some(vec!["chatgpt".into()]),
        ..base_config(td.path())
    };

    let first = process::execute(&config).unwrap();
    assert_eq!((first.created, first.updated, first.skipped), (1, 0, 0));

    let files: Vec<String> = fs::read_dir(&md_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("c0ffee00_taplive"));
    assert!(files[0].ends_with(".md"));

    let md = fs::read_to_string(md_dir.join(&files[0])).unwrap();
    assert!(md.starts_with("---\n"));
    assert!(md.contains("c0ffee00-0000-4000-8000-000000000001"));
    assert!(md.contains("## User"));
    assert!(md.contains("我们不发代币。"));
    assert!(!md.contains("You are ChatGPT"));

    let second = process::execute(&config).unwrap();
    assert_eq!((second.created, second.updated, second.skipped), (0, 0, 1));

    let forced = ExtractConfig {
        force: true,
        ..config.clone()
    };
    let third = process::execute(&forced).unwrap();
    assert_eq!((third.created, third.updated, third.skipped), (0, 1, 0));
}

fn notes_export(ids: [Option<&str>; 2]) -> Value {
    let conversation = |id: Option<&str>, title: &str, text: &str| {
        let mut conv = json!({
            "title": title,
            "update_time": 1700000100.0,
            "mapping": {
                "r": {"parent": null, "children": ["m"], "message": null},
                "m": {"parent": "r", "children": [], "message": {
                    "author": {"role": "user"},
                    "content": {"parts": [text]},
                    "create_time": 1700000050.0}}
            }
        });
        if let Some(id) = id {
            conv["conversation_id"] = json!(id);
        }
        conv
    };
    json!([
        conversation(ids[0], "Alpha notes", "alpha body"),
        conversation(ids[1], "Beta notes", "beta body"),
    ])
}

fn markdown_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    files
}

fn run_with_keywords(td: &TempDir, keyword: &str) -> process::RunSummary {
    let config = ExtractConfig {
        input: td.path().join("notes.html"),
        output: td.path().join("out/chat_content.json"),
        keywords: vec![keyword.into()],
        markdown_dir: Some(td.path().join("md")),
        quiet: true,
        ..ExtractConfig::default()
    };
    process::execute(&config).unwrap()
}

fn assert_transcripts_survive(td: &TempDir) {
    let md_dir = td.path().join("md");
    let files = markdown_files(&md_dir);
    assert_eq!(files.len(), 2, "{files:?}");
    let bodies: Vec<String> = files
        .iter()
        .map(|f| fs::read_to_string(md_dir.join(f)).unwrap())
        .collect();
    assert!(bodies.iter().any(|b| b.contains("alpha body")));
    assert!(bodies.iter().any(|b| b.contains("beta body")));
}

#[test]
fn changing_keywords_keeps_transcripts_without_ids() {
    let td = TempDir::new().unwrap();
    fs::write(
        td.path().join("notes.html"),
        export_html(&notes_export([None, None])),
    )
    .unwrap();

    let first = run_with_keywords(&td, "notes");
    assert_eq!(first.created, 2);
    assert_eq!(
        markdown_files(&td.path().join("md")),
        ["000000000001_alpha-notes.md", "000000000002_beta-notes.md"]
    );

    // Only the second conversation matches now; it finds its own file.
    let second = run_with_keywords(&td, "beta");
    assert_eq!((second.created, second.updated, second.skipped), (0, 0, 1));
    assert_transcripts_survive(&td);
}

#[test]
fn shared_id_prefix_never_reuses_another_transcript() {
    let td = TempDir::new().unwrap();
    fs::write(
        td.path().join("notes.html"),
        export_html(&notes_export([
            Some("abcdef12-0000-4000-8000-00000000000a"),
            Some("abcdef12-1111-4000-8000-00000000000b"),
        ])),
    )
    .unwrap();

    let first = run_with_keywords(&td, "alpha");
    assert_eq!(first.created, 1);
    assert_eq!(markdown_files(&td.path().join("md")), ["abcdef12_alpha-notes.md"]);

    let second = run_with_keywords(&td, "beta");
    assert_eq!((second.created, second.updated, second.skipped), (1, 0, 0));
    assert_eq!(
        markdown_files(&td.path().join("md")),
        ["abcdef12-111_beta-notes.md", "abcdef12_alpha-notes.md"]
    );
    assert_transcripts_survive(&td);
}
