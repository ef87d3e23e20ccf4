use crate::chat::{Attachment, ChatSource};
use crate::vault::store::LocalStore;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

const MAX_FILENAME_CHARS: usize = 255;
const FORBIDDEN_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub scanned: usize,
    pub attachments: usize,
    pub downloaded: Vec<String>,
    pub skipped_existing: usize,
    pub skipped_extension: usize,
    pub failed: Vec<(String, String)>,
    pub history_error: Option<String>,
}

pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c) && !c.is_control())
        .collect();
    let trimmed = cleaned.trim();
    // Leading dots would hide the file from the store listing.
    let visible = trimmed.trim_start_matches('.');
    visible.chars().take(MAX_FILENAME_CHARS).collect()
}

pub fn has_media_extension(name: &str, extensions: &[String]) -> bool {
    let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(&ext))
}

enum SaveResult {
    Saved,
    AlreadyExists,
}

fn save_new(store: &LocalStore, filename: &str, content: &[u8]) -> Result<SaveResult> {
    let target = store.path_for(filename);
    if target.exists() {
        return Ok(SaveResult::AlreadyExists);
    }
    let mut tmp = tempfile::Builder::new()
        .prefix(".ingest-")
        .tempfile_in(store.root())
        .with_context(|| format!("failed to create temp file in {}", store.root().display()))?;
    tmp.write_all(content)?;
    tmp.flush()?;
    match tmp.persist_noclobber(&target) {
        Ok(_) => Ok(SaveResult::Saved),
        Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
            Ok(SaveResult::AlreadyExists)
        }
        Err(err) => {
            Err(err.error).with_context(|| format!("failed to persist {}", target.display()))
        }
    }
}

fn ingest_attachment(
    source: &dyn ChatSource,
    store: &LocalStore,
    attachment: &Attachment,
    filename: &str,
) -> Result<SaveResult> {
    if store.path_for(filename).exists() {
        return Ok(SaveResult::AlreadyExists);
    }
    let content = source.download(attachment)?;
    save_new(store, filename, &content)
}

/// Pull every media attachment in `channel` into the store, never
/// overwriting an existing file.
pub fn ingest(
    source: &dyn ChatSource,
    channel: &str,
    store: &LocalStore,
    extensions: &[String],
) -> Result<IngestOutcome> {
    store.ensure_exists()?;
    let mut out = IngestOutcome::default();
    let mut seen = BTreeSet::new();

    for message in source.history(channel) {
        let message = match message {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(channel, "history read stopped: {err:#}");
                out.history_error = Some(format!("{err:#}"));
                break;
            }
        };
        out.scanned += 1;

        for attachment in &message.attachments {
            out.attachments += 1;
            if !has_media_extension(&attachment.filename, extensions) {
                out.skipped_extension += 1;
                continue;
            }
            let filename = sanitize_filename(&attachment.filename);
            if filename.is_empty() || !seen.insert(filename.clone()) {
                out.skipped_existing += 1;
                continue;
            }

            match ingest_attachment(source, store, attachment, &filename) {
                Ok(SaveResult::Saved) => {
                    tracing::info!(file = %filename, "downloaded attachment");
                    out.downloaded.push(filename);
                }
                Ok(SaveResult::AlreadyExists) => {
                    tracing::debug!(file = %filename, "skipped, already archived");
                    out.skipped_existing += 1;
                }
                Err(err) => {
                    tracing::warn!(file = %filename, "failed to save attachment: {err:#}");
                    out.failed.push((filename, format!("{err:#}")));
                }
            }
        }
    }

    Ok(out)
}
