use crate::chat::{ChatSource, Message, TextChannel};
use crate::vault::ingest::sanitize_filename;
use anyhow::{Context, Result};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SavedTranscript {
    pub channel: String,
    pub path: PathBuf,
    pub messages: usize,
}

pub fn format_line(message: &Message) -> String {
    format!(
        "[{}] {}: {}",
        message.created_at, message.author, message.content
    )
}

/// Falls back to the channel id when the name sanitizes to nothing.
pub fn transcript_path(dir: &Path, channel: &TextChannel) -> PathBuf {
    let stem = sanitize_filename(&channel.name);
    let stem = if stem.is_empty() {
        channel.id.as_str()
    } else {
        stem.as_str()
    };
    dir.join(format!("{stem}.txt"))
}

/// Write the full history of `channel` in source order (newest first),
/// replacing any earlier transcript only once the whole history was read.
pub fn save_transcript(
    source: &dyn ChatSource,
    channel: &TextChannel,
    dir: &Path,
) -> Result<SavedTranscript> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let target = transcript_path(dir, channel);

    let tmp = tempfile::Builder::new()
        .prefix(".transcript-")
        .tempfile_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    let mut writer = BufWriter::new(tmp);
    let mut messages = 0;
    for message in source.history(&channel.id) {
        let message = message.with_context(|| format!("history of #{} failed", channel.name))?;
        writeln!(writer, "{}", format_line(&message))?;
        messages += 1;
    }
    let tmp = writer
        .into_inner()
        .map_err(|err| err.into_error())
        .context("failed to flush transcript")?;
    tmp.persist(&target)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to persist {}", target.display()))?;

    tracing::info!(channel = %channel.name, messages, path = %target.display(), "saved transcript");
    Ok(SavedTranscript {
        channel: channel.name.clone(),
        path: target,
        messages,
    })
}
