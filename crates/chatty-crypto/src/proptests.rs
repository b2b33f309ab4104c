//! Property-based tests for the hybrid scheme.
//!
//! RSA operations dominate the cost, so case counts are kept small.

use proptest::prelude::*;

use crate::encrypt::{ContentKey, IV_LEN, decrypt_content, encrypt_content, unwrap_key, wrap_key};
use crate::envelope::{ViewerRole, open, seal};
use crate::error::CryptoError;
use crate::keys::fixtures::{ALICE, BOB, EVE};
use crate::{codec, envelope::EncryptedPayload};

// ==================== Envelope Property Tests ====================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Both ends recover the plaintext from the same envelope.
    #[test]
    fn seal_open_roundtrip_for_both_roles(plaintext in prop::collection::vec(any::<u8>(), 0..2048)) {
        let envelope = seal(&plaintext, &BOB.public_key_pem, &ALICE.public_key_pem).unwrap();

        let as_receiver = open(&envelope, &BOB.private_key_pem, ViewerRole::Receiver).unwrap();
        let as_sender = open(&envelope, &ALICE.private_key_pem, ViewerRole::Sender).unwrap();

        prop_assert_eq!(&as_receiver, &plaintext);
        prop_assert_eq!(&as_sender, &plaintext);
    }

    /// Passing through the wire codec does not change what opens.
    #[test]
    fn sealed_envelope_survives_codec(text in "\\PC{0,200}") {
        let envelope = seal(text.as_bytes(), &BOB.public_key_pem, &ALICE.public_key_pem).unwrap();
        let json = serde_json::to_string(&codec::encode_text(&envelope)).unwrap();

        let decoded = match codec::decode_json(&json).unwrap() {
            EncryptedPayload::TextOrImage(env) => env,
            other => return Err(TestCaseError::fail(format!("unexpected payload {:?}", other))),
        };

        let opened = open(&decoded, &BOB.private_key_pem, ViewerRole::Receiver).unwrap();
        prop_assert_eq!(opened, text.into_bytes());
    }

    /// Wrapped keys only unwrap under the matching private key.
    #[test]
    fn unwrap_requires_matching_private_key(_seed in any::<u64>()) {
        let key = ContentKey::generate();
        let wrapped = wrap_key(&key, &BOB.public_key_pem).unwrap();

        prop_assert_eq!(unwrap_key(&wrapped, &BOB.private_key_pem).unwrap(), key);
        prop_assert_eq!(unwrap_key(&wrapped, &EVE.private_key_pem), Err(CryptoError::UnwrapFailed));
    }
}

// ==================== Tamper Detection Property Tests ====================

proptest! {
    /// Flipping any single ciphertext bit is caught by the tag.
    #[test]
    fn ciphertext_bit_flip_is_detected(
        plaintext in prop::collection::vec(any::<u8>(), 1..512),
        bit in any::<usize>(),
    ) {
        let sealed = encrypt_content(&plaintext).unwrap();
        let mut tampered = sealed.ciphertext.clone();
        let bit = bit % (tampered.len() * 8);
        tampered[bit / 8] ^= 1 << (bit % 8);

        prop_assert_eq!(
            decrypt_content(&tampered, &sealed.key, &sealed.iv),
            Err(CryptoError::AuthTagMismatch)
        );
    }

    /// Flipping any single IV bit is caught by the tag.
    #[test]
    fn iv_bit_flip_is_detected(
        plaintext in prop::collection::vec(any::<u8>(), 0..512),
        bit in 0..(IV_LEN * 8),
    ) {
        let sealed = encrypt_content(&plaintext).unwrap();
        let mut iv = sealed.iv;
        iv[bit / 8] ^= 1 << (bit % 8);

        prop_assert_eq!(
            decrypt_content(&sealed.ciphertext, &sealed.key, &iv),
            Err(CryptoError::AuthTagMismatch)
        );
    }
}
