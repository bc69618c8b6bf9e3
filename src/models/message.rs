use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::message::EncryptedPayload;
use crate::error::AppError;

/// The common envelope shared by plaintext and sealed chat messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<C> {
    /// The message ID.
    pub id: Uuid,
    /// The ID of the user that sent the message.
    pub sender_id: Uuid,
    /// When the message was sent.
    pub sent_at: DateTime<Utc>,
    /// The message body.
    pub content: C,
}

/// The readable body of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageContent {
    /// A text message.
    Text { text: String },
    /// A binary attachment.
    Attachment {
        file_name: String,
        mime_type: String,
        #[serde(with = "crate::encoding::b64")]
        data: Vec<u8>,
    },
}

/// The end-to-end encrypted body of a chat message.
///
/// Attachment metadata stays readable so the server can route it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SealedContent {
    /// An encrypted text message.
    Text { payload: EncryptedPayload },
    /// An encrypted binary attachment.
    Attachment {
        file_name: String,
        mime_type: String,
        payload: EncryptedPayload,
    },
}

/// A decrypted (or never-encrypted) chat message.
pub type OpenMessage = Envelope<MessageContent>;
/// An encrypted chat message.
pub type SealedMessage = Envelope<SealedContent>;

/// A chat message as stored and returned by the server.
///
/// On the wire a sealed message carries `"e2e": true` next to its envelope
/// fields. The marker decides the variant: a marked message must have a
/// sealed body and an unmarked one a readable body, otherwise parsing fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    /// Marked `e2e`; the body must be decrypted before use.
    Sealed(SealedMessage),
    /// No marker; passed through untouched.
    Plain(OpenMessage),
}

#[derive(Serialize)]
struct MarkedRef<'a> {
    e2e: bool,
    #[serde(flatten)]
    message: &'a SealedMessage,
}

impl Serialize for ChatMessage {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ChatMessage::Sealed(message) => MarkedRef { e2e: true, message }.serialize(serializer),
            ChatMessage::Plain(message) => message.serialize(serializer),
        }
    }
}

/// A chat message as it arrives, before the marker is checked against
/// the body.
#[derive(Deserialize)]
struct RawChatMessage {
    #[serde(default)]
    e2e: bool,
    id: Uuid,
    sender_id: Uuid,
    sent_at: DateTime<Utc>,
    content: RawContent,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum RawContent {
    Text {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        payload: Option<EncryptedPayload>,
    },
    Attachment {
        file_name: String,
        mime_type: String,
        #[serde(default, with = "crate::encoding::b64_option")]
        data: Option<Vec<u8>>,
        #[serde(default)]
        payload: Option<EncryptedPayload>,
    },
}

impl RawChatMessage {
    fn resolve(self) -> std::result::Result<ChatMessage, &'static str> {
        let RawChatMessage {
            e2e,
            id,
            sender_id,
            sent_at,
            content,
        } = self;

        if e2e {
            let content = match content {
                RawContent::Text {
                    text: None,
                    payload: Some(payload),
                } => SealedContent::Text { payload },
                RawContent::Attachment {
                    file_name,
                    mime_type,
                    data: None,
                    payload: Some(payload),
                } => SealedContent::Attachment {
                    file_name,
                    mime_type,
                    payload,
                },
                _ => return Err("e2e message must carry only an encrypted payload"),
            };
            return Ok(ChatMessage::Sealed(Envelope {
                id,
                sender_id,
                sent_at,
                content,
            }));
        }

        let content = match content {
            RawContent::Text {
                text: Some(text),
                payload: None,
            } => MessageContent::Text { text },
            RawContent::Attachment {
                file_name,
                mime_type,
                data: Some(data),
                payload: None,
            } => MessageContent::Attachment {
                file_name,
                mime_type,
                data,
            },
            _ => return Err("message without e2e marker must carry a readable body"),
        };
        Ok(ChatMessage::Plain(Envelope {
            id,
            sender_id,
            sent_at,
            content,
        }))
    }
}

impl<'de> Deserialize<'de> for ChatMessage {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawChatMessage::deserialize(deserializer)?
            .resolve()
            .map_err(serde::de::Error::custom)
    }
}

/// Parses a JSON array of chat messages.
///
/// Only a malformed array or envelope fails the whole call. A message whose
/// body contradicts its `e2e` marker fails its own slot.
pub fn parse_chat_messages(json: &str) -> crate::error::Result<Vec<crate::error::Result<ChatMessage>>> {
    let raw: Vec<RawChatMessage> = sonic_rs::from_str(json)?;
    Ok(raw
        .into_iter()
        .map(|message| {
            message
                .resolve()
                .map_err(|e| AppError::Validation(e.to_string()))
        })
        .collect())
}
