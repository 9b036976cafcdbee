use crate::filter::KeyDocumentHit;
use crate::importer::Role;
use crate::linearize::TranscriptMessage;
use eyre::{Context, Result};
use indexmap::IndexMap;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

/// One line of the results file: a message attributed to its conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptRecord {
    pub conversation: String,
    pub author: Role,
    pub content: String,
    pub create_time: Option<f64>,
}

impl TranscriptRecord {
    pub fn new(conversation: &str, message: &TranscriptMessage) -> Self {
        Self {
            conversation: conversation.to_owned(),
            author: message.author.clone(),
            content: message.content.clone(),
            create_time: message.create_time,
        }
    }
}

/// Write the matched messages as a pretty-printed JSON array.
pub fn write_records(path: &Path, records: &[TranscriptRecord]) -> Result<()> {
    write_json(path, records)
}

/// Write key-document hits as a JSON object keyed by document name.
pub fn write_key_documents(
    path: &Path,
    documents: &IndexMap<String, Vec<KeyDocumentHit>>,
) -> Result<()> {
    write_json(path, documents)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .wrap_err_with(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let file =
        File::create(path).wrap_err_with(|| format!("Failed to create: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .wrap_err_with(|| format!("Failed to serialize: {}", path.display()))?;
    writeln!(writer)?;
    writer
        .flush()
        .wrap_err_with(|| format!("Failed to flush: {}", path.display()))
}
