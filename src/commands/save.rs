use anyhow::Result;

use crate::chat::discord::DiscordSource;
use crate::chat::{ChatSource, TextChannel};
use crate::commands::{CommandReport, load_config};
use crate::error::ErrorCode;
use crate::vault::audit;
use crate::vault::paths::{VaultPaths, resolve_paths};
use crate::vault::transcript::save_transcript;

/// Channels that cannot be read are reported and skipped.
fn save_channels(
    source: &dyn ChatSource,
    channels: &[TextChannel],
    paths: &VaultPaths,
    report: &mut CommandReport,
) -> usize {
    let mut saved = 0;
    for channel in channels {
        match save_transcript(source, channel, &paths.saved_dir) {
            Ok(done) => {
                saved += 1;
                report.detail(format!(
                    "saved #{} ({} messages) to {}",
                    done.channel,
                    done.messages,
                    done.path.display()
                ));
            }
            Err(err) => {
                tracing::warn!(channel = %channel.name, "skipping channel: {err:#}");
                report.issue(format!("skipped #{}: {err:#}", channel.name));
            }
        }
    }
    saved
}

pub fn run(guild: Option<&str>, channel: Option<&str>) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("save");

    let channel = channel.map(str::trim).filter(|c| !c.is_empty());
    let guild = guild.unwrap_or(cfg.ingest.guild_id.as_str()).trim().to_string();
    if channel.is_none() && guild.is_empty() {
        report.coded_issue(
            ErrorCode::E004SourceUnconfigured,
            "pass --channel or --guild, or set CHATVAULT_GUILD_ID",
        );
        return Ok(report);
    }
    report.detail(format!("saved_dir={}", paths.saved_dir.display()));

    let source = DiscordSource::from_config(&cfg)?;
    let channels = match channel {
        Some(id) => vec![TextChannel {
            id: id.to_string(),
            name: id.to_string(),
        }],
        None => {
            report.detail(format!("guild={guild}"));
            source.text_channels(&guild)?
        }
    };

    let saved = save_channels(&source, &channels, &paths, &mut report);
    report.detail(format!("channels_saved={saved}/{}", channels.len()));
    audit::record(
        &paths,
        "save",
        if saved == channels.len() { "ok" } else { "degraded" },
        &format!("saved={saved} channels={}", channels.len()),
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::save_channels;
    use crate::chat::{Attachment, ChatSource, Message, TextChannel};
    use crate::commands::CommandReport;
    use crate::vault::paths::VaultPaths;
    use anyhow::Result;
    use tempfile::tempdir;

    struct TwoChannels;

    impl ChatSource for TwoChannels {
        fn history<'a>(&'a self, channel: &str) -> Box<dyn Iterator<Item = Result<Message>> + 'a> {
            if channel == "locked" {
                return Box::new(std::iter::once(Err::<Message, _>(anyhow::anyhow!(
                    "403 Missing Access"
                ))));
            }
            Box::new(std::iter::once(Ok(Message {
                id: "1".to_string(),
                created_at: "2024-03-01 09:00:00+00:00".to_string(),
                author: "ada".to_string(),
                content: "hi".to_string(),
                ..Message::default()
            })))
        }

        fn download(&self, attachment: &Attachment) -> Result<Vec<u8>> {
            anyhow::bail!("no blob for {}", attachment.id)
        }

        fn text_channels(&self, _guild: &str) -> Result<Vec<TextChannel>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn forbidden_channel_is_skipped_and_the_rest_saved() {
        let tmp = tempdir().expect("tempdir");
        let paths = VaultPaths::under(tmp.path());
        let channels = vec![
            TextChannel {
                id: "locked".to_string(),
                name: "staff".to_string(),
            },
            TextChannel {
                id: "open".to_string(),
                name: "general".to_string(),
            },
        ];
        let mut report = CommandReport::new("save");

        let saved = save_channels(&TwoChannels, &channels, &paths, &mut report);

        assert_eq!(saved, 1);
        assert!(!report.ok);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].starts_with("skipped #staff"));
        assert!(paths.saved_dir.join("general.txt").exists());
        assert!(!paths.saved_dir.join("staff.txt").exists());
    }
}
