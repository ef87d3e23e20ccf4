pub mod discord;

use anyhow::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    pub id: String,
    /// Display form of the send time, e.g. `2024-03-01 18:22:05+00:00`.
    pub created_at: String,
    pub author: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChannel {
    pub id: String,
    pub name: String,
}

/// Read-only view of a chat server.
///
/// `history` re-reads from the newest message on every call; no cursor is
/// kept between calls.
pub trait ChatSource {
    fn history<'a>(&'a self, channel: &str) -> Box<dyn Iterator<Item = Result<Message>> + 'a>;

    fn download(&self, attachment: &Attachment) -> Result<Vec<u8>>;

    fn text_channels(&self, guild: &str) -> Result<Vec<TextChannel>>;
}
