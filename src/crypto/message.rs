use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::crypto::aes::{self, KeyUsage, SymmetricKey};
use crate::error::{AppError, Result};
use crate::models::message::{
    parse_chat_messages, ChatMessage, Envelope, MessageContent, OpenMessage, SealedContent,
    SealedMessage,
};

/// A ciphertext and the nonce it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    #[serde(with = "crate::encoding::b64")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "crate::encoding::b64")]
    pub iv: Vec<u8>,
}

/// Encrypts a payload under a conversation key with a fresh random iv.
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey) -> Result<EncryptedPayload> {
    key.require(KeyUsage::Encrypt)?;
    let (ciphertext, iv) = aes::encrypt(key.as_bytes(), plaintext)?;
    Ok(EncryptedPayload {
        ciphertext,
        iv: iv.to_vec(),
    })
}

/// Decrypts a payload. Fails closed: no plaintext is returned unless the
/// authentication tag verifies.
pub fn decrypt(ciphertext: &[u8], iv: &[u8], key: &SymmetricKey) -> Result<Vec<u8>> {
    key.require(KeyUsage::Decrypt)?;
    let nonce = aes::nonce_from_slice(iv).ok_or(AppError::TamperedCiphertext)?;
    aes::decrypt(key.as_bytes(), ciphertext, &nonce)
}

/// Seals the body of a chat message, keeping its envelope.
pub fn encrypt_chat_message(message: &OpenMessage, key: &SymmetricKey) -> Result<SealedMessage> {
    let content = match &message.content {
        MessageContent::Text { text } => SealedContent::Text {
            payload: encrypt(text.as_bytes(), key)?,
        },
        MessageContent::Attachment {
            file_name,
            mime_type,
            data,
        } => SealedContent::Attachment {
            file_name: file_name.clone(),
            mime_type: mime_type.clone(),
            payload: encrypt(data, key)?,
        },
    };

    Ok(Envelope {
        id: message.id,
        sender_id: message.sender_id,
        sent_at: message.sent_at,
        content,
    })
}

/// Opens a single sealed chat message.
pub fn decrypt_chat_message(message: &SealedMessage, key: &SymmetricKey) -> Result<OpenMessage> {
    let content = match &message.content {
        SealedContent::Text { payload } => {
            let bytes = decrypt(&payload.ciphertext, &payload.iv, key)?;
            let text = String::from_utf8(bytes).map_err(|_| AppError::TamperedCiphertext)?;
            MessageContent::Text { text }
        }
        SealedContent::Attachment {
            file_name,
            mime_type,
            payload,
        } => MessageContent::Attachment {
            file_name: file_name.clone(),
            mime_type: mime_type.clone(),
            data: decrypt(&payload.ciphertext, &payload.iv, key)?,
        },
    };

    Ok(Envelope {
        id: message.id,
        sender_id: message.sender_id,
        sent_at: message.sent_at,
        content,
    })
}

/// Decrypts a conversation thread.
///
/// Each sealed message is opened on its own blocking task. Results land in
/// the slot matching the message's input position, so output order equals
/// input order. Plain messages pass through unchanged, and a message that
/// fails to decrypt only fails its own slot.
pub async fn decrypt_chat_messages(
    messages: Vec<ChatMessage>,
    key: &SymmetricKey,
) -> Vec<Result<OpenMessage>> {
    decrypt_slots(messages.into_iter().map(Ok).collect(), key).await
}

/// Parses and decrypts a JSON thread as received from the server.
///
/// A message whose body contradicts its `e2e` marker is never returned as
/// plaintext; it fails its slot like a message that fails authentication.
pub async fn decrypt_chat_thread(json: &str, key: &SymmetricKey) -> Result<Vec<Result<OpenMessage>>> {
    let messages = parse_chat_messages(json)?;
    Ok(decrypt_slots(messages, key).await)
}

async fn decrypt_slots(
    messages: Vec<Result<ChatMessage>>,
    key: &SymmetricKey,
) -> Vec<Result<OpenMessage>> {
    let mut slots: Vec<Option<Result<OpenMessage>>> = Vec::with_capacity(messages.len());
    slots.resize_with(messages.len(), || None);

    let key = Arc::new(key.clone());
    let mut tasks = JoinSet::new();

    for (index, message) in messages.into_iter().enumerate() {
        match message {
            Err(e) => {
                tracing::debug!("Message {} rejected before decryption: {}", index, e);
                slots[index] = Some(Err(e));
            }
            Ok(ChatMessage::Plain(open)) => slots[index] = Some(Ok(open)),
            Ok(ChatMessage::Sealed(sealed)) => {
                let key = Arc::clone(&key);
                tasks.spawn_blocking(move || (index, sealed.id, decrypt_chat_message(&sealed, &key)));
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, id, result)) => {
                if let Err(ref e) = result {
                    tracing::debug!("Message {} failed to decrypt: {}", id, e);
                }
                slots[index] = Some(result);
            }
            Err(e) => tracing::error!("Decryption task failed: {}", e),
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| Err(AppError::Internal("decryption task aborted".to_string())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn message_key() -> SymmetricKey {
        SymmetricKey::new([42u8; 32], &[KeyUsage::Encrypt, KeyUsage::Decrypt])
    }

    fn text(body: &str) -> OpenMessage {
        Envelope {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sent_at: Utc::now(),
            content: MessageContent::Text {
                text: body.to_string(),
            },
        }
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = message_key();
        let payload = encrypt(b"Hello, Bob!", &key).unwrap();
        let plaintext = decrypt(&payload.ciphertext, &payload.iv, &key).unwrap();
        assert_eq!(plaintext, b"Hello, Bob!");
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let key = message_key();
        let payload = encrypt(b"", &key).unwrap();
        assert!(decrypt(&payload.ciphertext, &payload.iv, &key).unwrap().is_empty());
    }

    #[test]
    fn test_every_ciphertext_bit_is_authenticated() {
        let key = message_key();
        let payload = encrypt(b"attack at dawn", &key).unwrap();

        for byte in 0..payload.ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = payload.ciphertext.clone();
                tampered[byte] ^= 1 << bit;
                let result = decrypt(&tampered, &payload.iv, &key);
                assert!(matches!(result, Err(AppError::TamperedCiphertext)));
            }
        }
    }

    #[test]
    fn test_tampered_iv_fails() {
        let key = message_key();
        let payload = encrypt(b"attack at dawn", &key).unwrap();
        let mut iv = payload.iv.clone();
        iv[0] ^= 0x01;
        assert!(decrypt(&payload.ciphertext, &iv, &key).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let payload = encrypt(b"secret", &message_key()).unwrap();
        let other = SymmetricKey::new([7u8; 32], &[KeyUsage::Encrypt, KeyUsage::Decrypt]);
        assert!(matches!(
            decrypt(&payload.ciphertext, &payload.iv, &other),
            Err(AppError::TamperedCiphertext)
        ));
    }

    #[test]
    fn test_iv_is_fresh_on_every_call() {
        let key = message_key();
        let mut ivs = HashSet::new();
        let mut ciphertexts = HashSet::new();

        for _ in 0..1000 {
            let payload = encrypt(b"same message", &key).unwrap();
            assert_eq!(payload.iv.len(), aes::NONCE_SIZE);
            ivs.insert(payload.iv);
            ciphertexts.insert(payload.ciphertext);
        }

        assert_eq!(ivs.len(), 1000);
        assert_eq!(ciphertexts.len(), 1000);
    }

    #[test]
    fn test_attachment_round_trip() {
        let key = message_key();
        let message = Envelope {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sent_at: Utc::now(),
            content: MessageContent::Attachment {
                file_name: "photo.png".to_string(),
                mime_type: "image/png".to_string(),
                data: vec![0x89, 0x50, 0x4e, 0x47, 0x00, 0xff],
            },
        };

        let sealed = encrypt_chat_message(&message, &key).unwrap();
        assert!(matches!(sealed.content, SealedContent::Attachment { .. }));
        assert_eq!(decrypt_chat_message(&sealed, &key).unwrap(), message);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures_and_keeps_order() {
        let key = message_key();
        let originals = vec![text("first"), text("second"), text("third")];

        let mut batch: Vec<ChatMessage> = originals
            .iter()
            .map(|m| ChatMessage::Sealed(encrypt_chat_message(m, &key).unwrap()))
            .collect();

        if let ChatMessage::Sealed(sealed) = &mut batch[1] {
            if let SealedContent::Text { payload } = &mut sealed.content {
                payload.iv[5] ^= 0xff;
            }
        }

        let results = decrypt_chat_messages(batch, &key).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap(), &originals[0]);
        assert!(matches!(results[1], Err(AppError::TamperedCiphertext)));
        assert_eq!(results[2].as_ref().unwrap(), &originals[2]);
    }

    #[tokio::test]
    async fn test_batch_passes_plain_messages_through() {
        let key = message_key();
        let plain = text("not encrypted");
        let secret = text("encrypted");

        let batch = vec![
            ChatMessage::Plain(plain.clone()),
            ChatMessage::Sealed(encrypt_chat_message(&secret, &key).unwrap()),
        ];

        let results = decrypt_chat_messages(batch, &key).await;
        assert_eq!(results[0].as_ref().unwrap(), &plain);
        assert_eq!(results[1].as_ref().unwrap(), &secret);
    }

    #[tokio::test]
    async fn test_large_batch_preserves_order() {
        let key = message_key();
        let originals: Vec<OpenMessage> = (0..64).map(|i| text(&format!("message {}", i))).collect();
        let batch = originals
            .iter()
            .map(|m| ChatMessage::Sealed(encrypt_chat_message(m, &key).unwrap()))
            .collect();

        let results = decrypt_chat_messages(batch, &key).await;
        for (result, original) in results.iter().zip(&originals) {
            assert_eq!(result.as_ref().unwrap(), original);
        }
    }

    #[tokio::test]
    async fn test_thread_never_returns_forged_plaintext() {
        let key = message_key();
        let original = text("genuine");
        let sealed = ChatMessage::Sealed(encrypt_chat_message(&original, &key).unwrap());
        let forged = serde_json::json!({
            "e2e": true,
            "id": Uuid::new_v4(),
            "sender_id": Uuid::new_v4(),
            "sent_at": Utc::now(),
            "content": { "type": "text", "text": "injected" }
        });
        let thread = serde_json::json!([sealed, forged]).to_string();

        let results = decrypt_chat_thread(&thread, &key).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &original);
        assert!(results[1].is_err());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        assert!(decrypt_chat_messages(Vec::new(), &message_key()).await.is_empty());
    }
}
