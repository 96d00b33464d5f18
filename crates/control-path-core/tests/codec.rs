// crates/control-path-core/tests/codec.rs
// ============================================================================
// Module: Codec Tests
// Description: Decode, size-gate, and signature acceptance behavior.
// Purpose: Ensure hostile artifact bytes fail closed with precise errors.
// Dependencies: control-path-core, rmpv, ed25519-dalek
// ============================================================================

//! Artifact codec acceptance and rejection tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Test-only panic-based assertions are permitted."
)]

mod helpers;

use control_path_core::ArtifactError;
use control_path_core::DecodeOptions;
use control_path_core::FlagDirectory;
use control_path_core::KeyMaterial;
use control_path_core::MAX_ARTIFACT_BYTES;
use control_path_core::SignatureError;
use control_path_core::decode_artifact;
use helpers::artifact_map;
use helpers::encode_artifact;
use helpers::encode_map;
use helpers::serve;
use helpers::sign_map;
use helpers::test_signing_key;
use rmpv::Value as Mp;

fn decode_plain(bytes: &[u8]) -> Result<control_path_core::Artifact, ArtifactError> {
    decode_artifact(bytes, &DecodeOptions::default())
}

#[test]
fn minimal_artifact_decodes_with_name_directory() {
    let bytes = encode_artifact(
        &["new_dashboard", "ON"],
        vec![Mp::Array(vec![serve(Mp::from(1_u64))])],
        &[0],
    );
    let artifact = decode_plain(&bytes).unwrap();
    assert_eq!(artifact.version, "1.0");
    assert_eq!(artifact.environment, "test");
    assert_eq!(artifact.flags.len(), 1);
    let directory = FlagDirectory::from_artifact(&artifact);
    assert_eq!(directory.index_of("new_dashboard"), Some(0));
    assert_eq!(directory.index_of("missing"), None);
}

#[test]
fn oversized_buffer_is_rejected_before_decoding() {
    let bytes = vec![0_u8; MAX_ARTIFACT_BYTES + 1];
    let err = decode_plain(&bytes).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("10 MiB")));
}

#[test]
fn non_map_top_level_is_rejected() {
    let mut bytes = Vec::new();
    rmpv::encode::write_value(&mut bytes, &Mp::Array(vec![Mp::from(1_u64)])).unwrap();
    let err = decode_plain(&bytes).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("map")));
}

#[test]
fn trailing_bytes_are_rejected() {
    let mut bytes = encode_artifact(&["f"], vec![Mp::Array(vec![])], &[0]);
    bytes.push(0xc0);
    let err = decode_plain(&bytes).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("trailing")));
}

#[test]
fn missing_fields_report_the_first_failure() {
    let pairs = vec![(Mp::from("env"), Mp::from("test"))];
    let err = decode_plain(&encode_map(pairs)).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("`v`")));
}

#[test]
fn wrongly_typed_version_is_rejected() {
    let pairs = vec![
        (Mp::from("v"), Mp::from(7_u64)),
        (Mp::from("env"), Mp::from("test")),
        (Mp::from("strs"), Mp::Array(vec![])),
        (Mp::from("flags"), Mp::Array(vec![])),
        (Mp::from("flagNames"), Mp::Array(vec![])),
    ];
    let err = decode_plain(&encode_map(pairs)).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("`v`")));
}

#[test]
fn overlong_string_table_entry_is_rejected() {
    let long = "x".repeat(10_001);
    let bytes = encode_artifact(&[long.as_str()], vec![Mp::Array(vec![])], &[0]);
    let err = decode_plain(&bytes).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("characters")));
}

#[test]
fn flag_name_count_mismatch_is_rejected() {
    let bytes = encode_artifact(&["a", "b"], vec![Mp::Array(vec![])], &[0, 1]);
    let err = decode_plain(&bytes).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("flagNames")));
}

#[test]
fn out_of_bounds_flag_name_index_is_rejected() {
    let bytes = encode_artifact(&["only"], vec![Mp::Array(vec![])], &[3]);
    let err = decode_plain(&bytes).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("flagNames[0]")));
}

#[test]
fn out_of_bounds_property_index_is_rejected() {
    let guard = helpers::binary(0, helpers::prop(9), helpers::lit(Mp::from("x")));
    let bytes = encode_artifact(
        &["flag"],
        vec![Mp::Array(vec![helpers::serve_when(guard, Mp::from("on"))])],
        &[0],
    );
    let err = decode_plain(&bytes).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("property")));
}

#[test]
fn unknown_rule_kind_is_rejected() {
    let rule = Mp::Array(vec![Mp::from(9_u64), Mp::from("x")]);
    let bytes = encode_artifact(&["flag"], vec![Mp::Array(vec![rule])], &[0]);
    let err = decode_plain(&bytes).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("rule kind")));
}

#[test]
fn rollout_percent_above_hundred_is_rejected() {
    let bytes =
        encode_artifact(&["flag", "ON"], vec![Mp::Array(vec![helpers::rollout(1, 101)])], &[0]);
    let err = decode_plain(&bytes).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("percent")));
}

#[test]
fn segments_decode_and_bad_segment_indices_fail() {
    let good = helpers::with_segments(
        artifact_map(&["flag", "seg"], vec![Mp::Array(vec![])], &[0]),
        vec![helpers::segment(1, helpers::lit(Mp::from(true)))],
    );
    let artifact = decode_plain(&encode_map(good)).unwrap();
    assert_eq!(artifact.segments.len(), 1);

    let bad = helpers::with_segments(
        artifact_map(&["flag"], vec![Mp::Array(vec![])], &[0]),
        vec![helpers::segment(5, helpers::lit(Mp::from(true)))],
    );
    let err = decode_plain(&encode_map(bad)).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("segment")));
}

// ----------------------------------------------------------------------
// Signature policy
// ----------------------------------------------------------------------

#[test]
fn signed_artifact_verifies_with_the_signing_key() {
    let key = test_signing_key(7);
    let pairs = sign_map(artifact_map(&["flag"], vec![Mp::Array(vec![])], &[0]), &key);
    let options = DecodeOptions {
        public_key: Some(KeyMaterial::Raw(key.verifying_key().to_bytes().to_vec())),
        require_signature: true,
    };
    let artifact = decode_artifact(&encode_map(pairs), &options).unwrap();
    assert!(artifact.signature.is_some());
}

#[test]
fn signature_required_without_sig_field_fails() {
    let bytes = encode_artifact(&["flag"], vec![Mp::Array(vec![])], &[0]);
    let options = DecodeOptions {
        public_key: None,
        require_signature: true,
    };
    let err = decode_artifact(&bytes, &options).unwrap_err();
    assert!(matches!(err, ArtifactError::Signature(SignatureError::Required)));
}

#[test]
fn wrong_verification_key_fails_closed() {
    let signer = test_signing_key(7);
    let other = test_signing_key(9);
    let pairs = sign_map(artifact_map(&["flag"], vec![Mp::Array(vec![])], &[0]), &signer);
    let options = DecodeOptions {
        public_key: Some(KeyMaterial::Raw(other.verifying_key().to_bytes().to_vec())),
        require_signature: true,
    };
    let err = decode_artifact(&encode_map(pairs), &options).unwrap_err();
    assert!(matches!(err, ArtifactError::Signature(SignatureError::Invalid)));
}

#[test]
fn single_bit_flip_in_signed_region_fails_verification() {
    let key = test_signing_key(7);
    let pairs = sign_map(artifact_map(&["flag"], vec![Mp::Array(vec![])], &[0]), &key);
    let mut bytes = encode_map(pairs);
    // Flip one bit inside the environment string, well before the signature.
    let target = bytes.iter().position(|b| *b == b't').unwrap();
    bytes[target] ^= 0x01;
    let options = DecodeOptions {
        public_key: Some(KeyMaterial::Raw(key.verifying_key().to_bytes().to_vec())),
        require_signature: true,
    };
    let err = decode_artifact(&bytes, &options).unwrap_err();
    assert!(matches!(err, ArtifactError::Signature(SignatureError::Invalid)));
}

#[test]
fn wrong_length_signature_is_a_shape_violation() {
    let mut pairs = artifact_map(&["flag"], vec![Mp::Array(vec![])], &[0]);
    pairs.push((Mp::from("sig"), Mp::Binary(vec![0_u8; 63])));
    let err = decode_plain(&encode_map(pairs)).unwrap_err();
    assert!(matches!(err, ArtifactError::Invalid(message) if message.contains("64")));
}

#[test]
fn key_material_accepts_base64_and_hex_text() {
    use base64::Engine;

    let key = test_signing_key(3);
    let pairs = sign_map(artifact_map(&["flag"], vec![Mp::Array(vec![])], &[0]), &key);
    let bytes = encode_map(pairs);

    let raw = key.verifying_key().to_bytes();
    let as_base64 = base64::engine::general_purpose::STANDARD.encode(raw);
    let as_hex: String = raw.iter().map(|b| format!("{b:02x}")).collect();

    for text in [as_base64, as_hex] {
        let options = DecodeOptions {
            public_key: Some(KeyMaterial::Text(text)),
            require_signature: true,
        };
        assert!(decode_artifact(&bytes, &options).is_ok());
    }
}

#[test]
fn undecodable_key_material_is_invalid_key() {
    let bytes = encode_artifact(&["flag"], vec![Mp::Array(vec![])], &[0]);
    let options = DecodeOptions {
        public_key: Some(KeyMaterial::Text("definitely-not-a-key".to_string())),
        require_signature: false,
    };
    let err = decode_artifact(&bytes, &options).unwrap_err();
    assert!(matches!(err, ArtifactError::Signature(SignatureError::InvalidKey(_))));
}
