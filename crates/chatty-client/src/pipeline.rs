//! Per-message decryption for display.
//!
//! Each message moves `Idle -> Decrypting -> Decrypted | Failed`. Failures are
//! recorded against the message that caused them and never touch siblings.
//! Changing the viewer bumps a generation counter; a render that started
//! under an older generation is discarded instead of committed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use chatty_crypto::envelope::{open, open_file};
use chatty_crypto::{CryptoError, EncryptedPayload, FileMetadata, ViewerRole, codec};
use chatty_types::api::MessageResponse;

use crate::directory::FileTransfer;
use crate::error::Result;

/// Prefix that marks decrypted plaintext as an inline image.
pub const IMAGE_PREFIX: &str = "data:image";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedContent {
    Text(String),
    /// A `data:image/...` URI.
    Image(String),
    /// Attachment pointer. The body is only fetched by `open_attachment`.
    File {
        pointer: String,
        metadata: FileMetadata,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DecryptionState {
    #[default]
    Idle,
    Decrypting,
    Decrypted(RenderedContent),
    Failed(CryptoError),
}

#[derive(Clone)]
struct Viewer {
    user_id: Uuid,
    private_key_pem: Arc<str>,
}

#[derive(Default)]
struct Inner {
    generation: u64,
    viewer: Option<Viewer>,
    states: HashMap<Uuid, DecryptionState>,
}

#[derive(Default)]
pub struct DecryptionPipeline {
    inner: Mutex<Inner>,
}

impl DecryptionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the identity messages are decrypted as. Any in-flight renders
    /// become stale.
    pub fn set_viewer(&self, user_id: Uuid, private_key_pem: &str) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.viewer = Some(Viewer {
            user_id,
            private_key_pem: Arc::from(private_key_pem),
        });
        inner.states.clear();
        debug!("Viewer set to {} (generation {})", user_id, inner.generation);
    }

    pub fn clear_viewer(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.viewer = None;
        inner.states.clear();
        debug!("Viewer cleared (generation {})", inner.generation);
    }

    pub fn viewer_id(&self) -> Option<Uuid> {
        self.lock().viewer.as_ref().map(|v| v.user_id)
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Last committed state for `message_id`.
    pub fn state(&self, message_id: Uuid) -> DecryptionState {
        self.lock()
            .states
            .get(&message_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Decrypt one message for display and record the outcome.
    ///
    /// Returns the committed state. If the viewer changed while this render
    /// was running, nothing is committed and `Idle` is returned.
    pub async fn render(&self, message: &MessageResponse) -> DecryptionState {
        let Some((generation, viewer)) = self.begin(message.id) else {
            debug!("No private key for message {}", message.id);
            return DecryptionState::Failed(CryptoError::MissingKey);
        };

        let outcome = decrypt_for_display(message, &viewer).await;
        let state = match outcome {
            Ok(content) => DecryptionState::Decrypted(content),
            Err(e) => {
                warn!("Message {} failed to decrypt: {}", message.id, e);
                DecryptionState::Failed(e)
            }
        };

        self.commit(message.id, generation, state)
    }

    /// Render a batch concurrently. Results are keyed by message id.
    pub async fn render_all(&self, messages: &[MessageResponse]) -> HashMap<Uuid, DecryptionState> {
        let renders = messages
            .iter()
            .map(|message| async move { (message.id, self.render(message).await) });
        join_all(renders).await.into_iter().collect()
    }

    /// Download and decrypt the body of a file message as the current viewer.
    ///
    /// If the viewer changes before the body is decrypted, the plaintext is
    /// dropped and `MissingKey` is returned.
    pub async fn open_attachment(
        &self,
        message: &MessageResponse,
        transfer: &dyn FileTransfer,
    ) -> Result<Vec<u8>> {
        let (generation, viewer) = {
            let inner = self.lock();
            let viewer = inner.viewer.clone().ok_or(CryptoError::MissingKey)?;
            (inner.generation, viewer)
        };

        let EncryptedPayload::FileAttachment { envelope, metadata } =
            codec::decode(&message.bundle)?
        else {
            return Err(CryptoError::Schema("message carries no attachment".into()).into());
        };

        let ciphertext = transfer.download(&envelope.pointer).await?;
        let role = role_for(&viewer, message);
        let body = tokio::task::spawn_blocking(move || {
            open_file(&envelope, &ciphertext, &viewer.private_key_pem, role)
        })
        .await??;

        let current = self.generation();
        if current != generation {
            warn!(
                "Discarding attachment {} opened under stale generation {} != {}",
                message.id, generation, current
            );
            return Err(CryptoError::MissingKey.into());
        }

        debug!("Opened attachment {} ({} bytes)", metadata.original_name, body.len());
        Ok(body)
    }

    /// Mark `message_id` as decrypting and snapshot the viewer. With no
    /// viewer the message fails immediately.
    fn begin(&self, message_id: Uuid) -> Option<(u64, Viewer)> {
        let mut inner = self.lock();
        let Some(viewer) = inner.viewer.clone() else {
            inner
                .states
                .insert(message_id, DecryptionState::Failed(CryptoError::MissingKey));
            return None;
        };
        inner.states.insert(message_id, DecryptionState::Decrypting);
        Some((inner.generation, viewer))
    }

    fn commit(&self, message_id: Uuid, generation: u64, state: DecryptionState) -> DecryptionState {
        let mut inner = self.lock();
        if inner.generation != generation {
            warn!(
                "Discarding stale result for message {} (generation {} != {})",
                message_id, generation, inner.generation
            );
            return DecryptionState::Idle;
        }
        inner.states.insert(message_id, state.clone());
        state
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn role_for(viewer: &Viewer, message: &MessageResponse) -> ViewerRole {
    if viewer.user_id == message.sender_id {
        ViewerRole::Sender
    } else {
        ViewerRole::Receiver
    }
}

async fn decrypt_for_display(
    message: &MessageResponse,
    viewer: &Viewer,
) -> std::result::Result<RenderedContent, CryptoError> {
    let envelope = match codec::decode(&message.bundle)? {
        EncryptedPayload::FileAttachment { envelope, metadata } => {
            return Ok(RenderedContent::File {
                pointer: envelope.pointer,
                metadata,
            });
        }
        EncryptedPayload::TextOrImage(envelope) => envelope,
    };

    let role = role_for(viewer, message);
    let private_key_pem = viewer.private_key_pem.clone();
    let plaintext = tokio::task::spawn_blocking(move || open(&envelope, &private_key_pem, role))
        .await
        .map_err(|e| CryptoError::MalformedInput(format!("decryption task aborted: {}", e)))??;

    let text = String::from_utf8_lossy(&plaintext).into_owned();
    if text.starts_with(IMAGE_PREFIX) {
        Ok(RenderedContent::Image(text))
    } else {
        Ok(RenderedContent::Text(text))
    }
}
