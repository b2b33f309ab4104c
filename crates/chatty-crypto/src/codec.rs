use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tracing::warn;

use chatty_types::api::WireBundle;

use crate::envelope::{
    ENVELOPE_IV_LEN, EncryptedEnvelope, EncryptedPayload, FileEnvelope, FileMetadata,
};
use crate::error::{CryptoError, Result};

/// Encode a text/image envelope. File fields are explicit nulls.
pub fn encode_text(envelope: &EncryptedEnvelope) -> WireBundle {
    WireBundle {
        is_file: false,
        encrypted_content: Some(BASE64.encode(&envelope.encrypted_content)),
        encrypted_key: Some(BASE64.encode(&envelope.encrypted_key_for_receiver)),
        encrypted_key_sender: Some(BASE64.encode(&envelope.encrypted_key_for_sender)),
        iv: Some(BASE64.encode(envelope.iv)),
        ..WireBundle::default()
    }
}

/// Encode an attachment pointer. Text fields are explicit nulls.
pub fn encode_file(envelope: &FileEnvelope, metadata: &FileMetadata) -> WireBundle {
    WireBundle {
        is_file: true,
        original_file_name: Some(metadata.original_name.clone()),
        file_type: Some(metadata.mime_type.clone()),
        file_size: Some(metadata.byte_size),
        file_path: Some(envelope.pointer.clone()),
        file_iv: Some(BASE64.encode(envelope.iv)),
        file_encrypted_key: Some(BASE64.encode(&envelope.encrypted_key_for_receiver)),
        file_encrypted_key_sender: Some(BASE64.encode(&envelope.encrypted_key_for_sender)),
        ..WireBundle::default()
    }
}

pub fn encode(payload: &EncryptedPayload) -> WireBundle {
    match payload {
        EncryptedPayload::TextOrImage(envelope) => encode_text(envelope),
        EncryptedPayload::FileAttachment { envelope, metadata } => encode_file(envelope, metadata),
    }
}

/// Validate and decode a bundle. Every field the discriminator requires must
/// be present and well formed; this runs before any decryption is attempted.
pub fn decode(bundle: &WireBundle) -> Result<EncryptedPayload> {
    let payload = if bundle.is_file {
        decode_file(bundle)
    } else {
        decode_text(bundle)
    };

    if let Err(e) = &payload {
        warn!("Rejected wire bundle: {}", e);
    }
    payload
}

/// Parse JSON then decode. Parse failures are schema errors too.
pub fn decode_json(json: &str) -> Result<EncryptedPayload> {
    let bundle: WireBundle = serde_json::from_str(json)
        .map_err(|e| CryptoError::Schema(format!("unparseable bundle: {}", e)))?;
    decode(&bundle)
}

fn decode_text(bundle: &WireBundle) -> Result<EncryptedPayload> {
    let encrypted_content = required_bytes(&bundle.encrypted_content, "encryptedContent")?;
    let encrypted_key_for_receiver = required_bytes(&bundle.encrypted_key, "encryptedKey")?;
    let encrypted_key_for_sender =
        required_bytes(&bundle.encrypted_key_sender, "encryptedKeySender")?;
    let iv = required_iv(&bundle.iv, "iv")?;

    Ok(EncryptedPayload::TextOrImage(EncryptedEnvelope {
        encrypted_content,
        encrypted_key_for_receiver,
        encrypted_key_for_sender,
        iv,
    }))
}

fn decode_file(bundle: &WireBundle) -> Result<EncryptedPayload> {
    let pointer = required_str(&bundle.file_path, "file_path")?;
    let iv = required_iv(&bundle.file_iv, "file_iv")?;
    let encrypted_key_for_receiver =
        required_bytes(&bundle.file_encrypted_key, "file_encrypted_key")?;
    let encrypted_key_for_sender =
        required_bytes(&bundle.file_encrypted_key_sender, "file_encrypted_key_sender")?;

    let original_name = required_str(&bundle.original_file_name, "original_file_name")?;
    let mime_type = required_str(&bundle.file_type, "file_type")?;
    let byte_size = bundle
        .file_size
        .ok_or_else(|| CryptoError::Schema("missing field `file_size`".into()))?;

    Ok(EncryptedPayload::FileAttachment {
        envelope: FileEnvelope {
            pointer,
            iv,
            encrypted_key_for_receiver,
            encrypted_key_for_sender,
        },
        metadata: FileMetadata {
            original_name,
            mime_type,
            byte_size,
        },
    })
}

fn required_str(value: &Option<String>, field: &str) -> Result<String> {
    match value.as_deref() {
        Some(s) if !s.is_empty() => Ok(s.to_owned()),
        _ => Err(CryptoError::Schema(format!("missing field `{}`", field))),
    }
}

fn required_bytes(value: &Option<String>, field: &str) -> Result<Vec<u8>> {
    let encoded = required_str(value, field)?;
    BASE64
        .decode(encoded.as_bytes())
        .map_err(|e| CryptoError::Schema(format!("field `{}` is not base64: {}", field, e)))
}

fn required_iv(value: &Option<String>, field: &str) -> Result<[u8; ENVELOPE_IV_LEN]> {
    let bytes = required_bytes(value, field)?;
    bytes.as_slice().try_into().map_err(|_| {
        CryptoError::Schema(format!(
            "field `{}` must decode to {} bytes, got {}",
            field,
            ENVELOPE_IV_LEN,
            bytes.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_envelope() -> EncryptedEnvelope {
        EncryptedEnvelope {
            encrypted_content: vec![1, 2, 3, 4],
            encrypted_key_for_receiver: vec![5; 256],
            encrypted_key_for_sender: vec![6; 256],
            iv: [9; ENVELOPE_IV_LEN],
        }
    }

    fn file_bundle() -> WireBundle {
        let envelope = FileEnvelope {
            pointer: "3f1c".into(),
            iv: [2; ENVELOPE_IV_LEN],
            encrypted_key_for_receiver: vec![3; 256],
            encrypted_key_for_sender: vec![4; 256],
        };
        let metadata = FileMetadata {
            original_name: "report.pdf".into(),
            mime_type: "application/pdf".into(),
            byte_size: 1234,
        };
        encode_file(&envelope, &metadata)
    }

    #[test]
    fn text_bundle_decodes_to_same_envelope() {
        let envelope = text_envelope();
        let bundle = encode_text(&envelope);

        assert!(!bundle.is_file);
        assert!(bundle.file_iv.is_none());
        assert!(bundle.file_path.is_none());

        let decoded = decode(&bundle).unwrap();
        assert_eq!(decoded, EncryptedPayload::TextOrImage(envelope));
    }

    #[test]
    fn file_bundle_nulls_text_fields() {
        let bundle = file_bundle();
        assert!(bundle.is_file);
        assert!(bundle.encrypted_content.is_none());
        assert!(bundle.iv.is_none());

        let json = serde_json::to_value(&bundle).unwrap();
        assert!(json["encryptedContent"].is_null());
        assert!(json["encryptedKey"].is_null());
        assert_eq!(json["file_size"], 1234);

        match decode(&bundle).unwrap() {
            EncryptedPayload::FileAttachment { envelope, metadata } => {
                assert_eq!(envelope.pointer, "3f1c");
                assert_eq!(metadata.original_name, "report.pdf");
                assert_eq!(metadata.byte_size, 1234);
            }
            other => panic!("expected file attachment, got {:?}", other),
        }
    }

    #[test]
    fn file_bundle_without_file_iv_is_schema_error() {
        let mut bundle = file_bundle();
        bundle.file_iv = None;

        let err = decode(&bundle).unwrap_err();
        assert!(matches!(err, CryptoError::Schema(ref m) if m.contains("file_iv")));
    }

    #[test]
    fn file_bundle_without_pointer_is_schema_error() {
        let mut bundle = file_bundle();
        bundle.file_path = Some(String::new());

        let err = decode(&bundle).unwrap_err();
        assert!(matches!(err, CryptoError::Schema(ref m) if m.contains("file_path")));
    }

    #[test]
    fn file_bundle_without_sender_key_is_schema_error() {
        let mut bundle = file_bundle();
        bundle.file_encrypted_key_sender = None;
        assert!(matches!(decode(&bundle), Err(CryptoError::Schema(_))));
    }

    #[test]
    fn text_bundle_with_only_file_fields_is_schema_error() {
        let mut bundle = file_bundle();
        bundle.is_file = false;
        assert!(matches!(decode(&bundle), Err(CryptoError::Schema(_))));
    }

    #[test]
    fn short_iv_is_schema_error() {
        let mut bundle = encode_text(&text_envelope());
        bundle.iv = Some(BASE64.encode([0u8; 8]));

        let err = decode(&bundle).unwrap_err();
        assert!(matches!(err, CryptoError::Schema(ref m) if m.contains("12 bytes")));
    }

    #[test]
    fn non_base64_field_is_schema_error() {
        let mut bundle = encode_text(&text_envelope());
        bundle.encrypted_key = Some("***".into());
        assert!(matches!(decode(&bundle), Err(CryptoError::Schema(_))));
    }

    #[test]
    fn json_without_discriminator_is_schema_error() {
        let err = decode_json(r#"{"encryptedContent":"AAAA"}"#).unwrap_err();
        assert!(matches!(err, CryptoError::Schema(_)));
    }

    #[test]
    fn encode_dispatches_on_payload_kind() {
        let payload = EncryptedPayload::TextOrImage(text_envelope());
        assert_eq!(encode(&payload), encode_text(&text_envelope()));
        assert!(!payload.is_file());
    }
}
