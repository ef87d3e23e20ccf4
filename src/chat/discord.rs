use crate::chat::{Attachment, ChatSource, Message, TextChannel};
use crate::vault::config::VaultConfig;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::env;
use std::time::Duration;

const PAGE_LIMIT: usize = 100;
const USER_AGENT: &str = concat!("DiscordBot (chatvault, ", env!("CARGO_PKG_VERSION"), ")");

#[derive(Debug, Deserialize)]
struct RawAttachment {
    id: String,
    filename: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    username: String,
    #[serde(default)]
    discriminator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    #[serde(default)]
    timestamp: String,
    author: Option<RawAuthor>,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: u8,
}

const GUILD_TEXT: u8 = 0;

/// Legacy accounts keep their `#1234` tag; migrated ones report `0`.
fn author_label(author: Option<RawAuthor>) -> String {
    match author {
        Some(RawAuthor {
            username,
            discriminator: Some(tag),
        }) if !tag.is_empty() && tag != "0" => format!("{username}#{tag}"),
        Some(author) => author.username,
        None => "unknown".to_string(),
    }
}

fn display_timestamp(raw: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S%:z").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

impl From<RawMessage> for Message {
    fn from(raw: RawMessage) -> Self {
        Message {
            id: raw.id,
            created_at: display_timestamp(&raw.timestamp),
            author: author_label(raw.author),
            content: raw.content,
            attachments: raw
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    id: a.id,
                    filename: a.filename,
                    url: a.url,
                })
                .collect(),
        }
    }
}

/// Discord REST client authenticated as a bot.
pub struct DiscordSource {
    client: Client,
    api_base: String,
    token: String,
}

fn parse_text_channels(body: &str) -> Result<Vec<TextChannel>> {
    let raw: Vec<RawChannel> =
        serde_json::from_str(body).context("invalid guild channels response")?;
    Ok(raw
        .into_iter()
        .filter(|c| c.kind == GUILD_TEXT)
        .map(|c| TextChannel {
            name: c.name.unwrap_or_else(|| c.id.clone()),
            id: c.id,
        })
        .collect())
}

fn parse_page(body: &str) -> Result<Vec<Message>> {
    let raw: Vec<RawMessage> =
        serde_json::from_str(body).context("invalid channel messages response")?;
    Ok(raw.into_iter().map(Message::from).collect())
}

impl DiscordSource {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build Discord HTTP client")?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn from_config(cfg: &VaultConfig) -> Result<Self> {
        let token = env::var("CHATVAULT_DISCORD_TOKEN")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .context("CHATVAULT_DISCORD_TOKEN is required to read channel history")?;
        Self::new(
            &cfg.ingest.api_base,
            &token,
            Duration::from_secs(cfg.sync.request_timeout_secs),
        )
    }

    fn get_authorized(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bot {}", self.token))
            .query(query)
            .send()
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("{url} returned {}: {}", status.as_u16(), body.trim());
        }
        Ok(body)
    }

    fn fetch_page(&self, channel: &str, before: Option<&str>) -> Result<Vec<Message>> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel);
        let mut query = vec![("limit", PAGE_LIMIT.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }
        let body = self
            .get_authorized(&url, &query)
            .with_context(|| format!("failed to fetch history for channel {channel}"))?;
        parse_page(&body)
    }
}

/// Newest-first pages fetched on demand, stopping at the first empty page.
struct HistoryPages<'a> {
    source: &'a DiscordSource,
    channel: String,
    buffered: VecDeque<Message>,
    before: Option<String>,
    done: bool,
}

impl Iterator for HistoryPages<'_> {
    type Item = Result<Message>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() && !self.done {
            match self.source.fetch_page(&self.channel, self.before.as_deref()) {
                Ok(page) => {
                    if page.len() < PAGE_LIMIT {
                        self.done = true;
                    }
                    self.before = page.last().map(|m| m.id.clone());
                    self.buffered.extend(page);
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        self.buffered.pop_front().map(Ok)
    }
}

impl ChatSource for DiscordSource {
    fn history<'a>(&'a self, channel: &str) -> Box<dyn Iterator<Item = Result<Message>> + 'a> {
        Box::new(HistoryPages {
            source: self,
            channel: channel.to_string(),
            buffered: VecDeque::new(),
            before: None,
            done: false,
        })
    }

    fn download(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(&attachment.url)
            .send()
            .with_context(|| format!("failed to download {}", attachment.filename))?;
        if !response.status().is_success() {
            anyhow::bail!(
                "download of {} returned {}",
                attachment.filename,
                response.status().as_u16()
            );
        }
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read body of {}", attachment.filename))?;
        Ok(bytes.to_vec())
    }

    fn text_channels(&self, guild: &str) -> Result<Vec<TextChannel>> {
        let url = format!("{}/guilds/{}/channels", self.api_base, guild);
        let body = self
            .get_authorized(&url, &[])
            .with_context(|| format!("failed to list channels of guild {guild}"))?;
        parse_text_channels(&body)
    }
}
