use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tracing::{debug, info};
use uuid::Uuid;

use chatty_crypto::envelope::{EncryptedEnvelope, FileEnvelope, seal};
use chatty_crypto::{CryptoError, FileMetadata, KeyPair, codec};
use chatty_types::api::WireBundle;

use crate::directory::{FileTransfer, PublicKeyDirectory};
use crate::error::Result;
use crate::key_manager::KeyManager;
use crate::pipeline::DecryptionPipeline;

/// A logged-in user on this device: their key pair, the directory used to
/// reach other users' keys, and the pipeline that renders their inbox.
pub struct Session {
    user_id: Uuid,
    key_pair: KeyPair,
    keys: Arc<KeyManager>,
    directory: Arc<dyn PublicKeyDirectory>,
    pipeline: DecryptionPipeline,
}

impl Session {
    /// Bring up the session for `user_id`.
    ///
    /// Loads (or regenerates) the device key pair, publishes its public half
    /// and installs it as the pipeline's viewer. Any failure aborts the
    /// login; there is no half-established session.
    pub async fn establish(
        user_id: Uuid,
        keys: Arc<KeyManager>,
        directory: Arc<dyn PublicKeyDirectory>,
    ) -> Result<Self> {
        let key_pair = keys.load_or_generate(&user_id.to_string()).await?;
        directory.publish_public_key(&key_pair.public_key_pem).await?;

        let pipeline = DecryptionPipeline::new();
        pipeline.set_viewer(user_id, &key_pair.private_key_pem);

        info!("Session established for {}", user_id);
        Ok(Self {
            user_id,
            key_pair,
            keys,
            directory,
            pipeline,
        })
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn public_key_pem(&self) -> &str {
        &self.key_pair.public_key_pem
    }

    pub fn pipeline(&self) -> &DecryptionPipeline {
        &self.pipeline
    }

    pub async fn compose_text(&self, receiver_id: Uuid, text: &str) -> Result<WireBundle> {
        let envelope = self.seal_for(receiver_id, text.as_bytes().to_vec()).await?;
        Ok(codec::encode_text(&envelope))
    }

    /// Images travel inline as a `data:` URI so the receiving pipeline can
    /// tell them apart from text.
    pub async fn compose_image(
        &self,
        receiver_id: Uuid,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<WireBundle> {
        if !mime_type.starts_with("image/") {
            return Err(CryptoError::MalformedInput(format!("not an image type: {}", mime_type)).into());
        }
        let uri = format!("data:{};base64,{}", mime_type, BASE64.encode(bytes));
        let envelope = self.seal_for(receiver_id, uri.into_bytes()).await?;
        Ok(codec::encode_text(&envelope))
    }

    /// Seal an attachment, upload its ciphertext and encode the pointer.
    pub async fn compose_file(
        &self,
        receiver_id: Uuid,
        metadata: FileMetadata,
        bytes: Vec<u8>,
        transfer: &dyn FileTransfer,
    ) -> Result<WireBundle> {
        let sealed = self.seal_for(receiver_id, bytes).await?;
        let pointer = transfer.upload(sealed.encrypted_content.clone()).await?;
        let envelope = FileEnvelope::from_sealed(pointer, sealed);

        debug!("Attachment {} stored as {}", metadata.original_name, envelope.pointer);
        Ok(codec::encode_file(&envelope, &metadata))
    }

    /// Stop rendering as this user and forget the device key pair.
    pub async fn logout(&self) -> Result<()> {
        self.pipeline.clear_viewer();
        self.keys.clear(&self.user_id.to_string()).await?;
        info!("Logged out {}", self.user_id);
        Ok(())
    }

    async fn seal_for(&self, receiver_id: Uuid, plaintext: Vec<u8>) -> Result<EncryptedEnvelope> {
        let receiver_pem = self.directory.fetch_public_key(receiver_id).await?;
        let sender_pem = self.key_pair.public_key_pem.clone();

        let envelope =
            tokio::task::spawn_blocking(move || seal(&plaintext, &receiver_pem, &sender_pem))
                .await??;
        Ok(envelope)
    }
}
