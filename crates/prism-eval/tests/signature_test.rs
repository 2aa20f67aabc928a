//! Signature behaviour across rewrites of a result file

use prism_eval::signing::{signature_path, verify_signed_json, write_signed_json, SignatureStatus};
use prism_eval::EvalError;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_reformatting_keeps_signature_valid() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("metrics.json");
    let data = json!({"accuracy": 0.1 + 0.2, "count": 3, "label": "naïve"});
    write_signed_json(&path, &data, true).unwrap();

    // Compact, reordered rewrite of the same document
    let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

    assert!(matches!(
        verify_signed_json(&path).unwrap(),
        SignatureStatus::Verified { .. }
    ));
}

#[test]
fn test_edit_detected_as_mismatch() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("fps.json");
    write_signed_json(&path, &json!({"meanFPS": 59.5, "iterations": 10}), true).unwrap();

    fs::write(&path, r#"{"meanFPS": 60.0, "iterations": 10}"#).unwrap();
    let status = verify_signed_json(&path).unwrap();
    assert_eq!(status.label(), "mismatch");

    match status.into_result(&path) {
        Err(EvalError::SignatureMismatch { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected mismatch error, got {:?}", other),
    }
}

#[test]
fn test_signature_file_is_bare_hex() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("emobench.json");
    let digest = write_signed_json(&path, &json!({"overall_safety_score": 0.75}), true)
        .unwrap()
        .unwrap();

    let sig = fs::read_to_string(signature_path(&path)).unwrap();
    assert_eq!(sig, digest);
    assert_eq!(sig.len(), 64);
    assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn test_unsigned_when_signing_disabled() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("metrics.json");
    assert!(write_signed_json(&path, &json!({"accuracy": 1.0}), false)
        .unwrap()
        .is_none());
    assert!(!signature_path(&path).exists());
    assert_eq!(verify_signed_json(&path).unwrap(), SignatureStatus::Unsigned);
}

#[test]
fn test_unsigned_rewrite_drops_old_signature() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("latency_metrics.json");
    write_signed_json(&path, &json!({"p50": 190.0}), true).unwrap();
    assert!(signature_path(&path).exists());

    write_signed_json(&path, &json!({"p50": 210.0}), false).unwrap();
    assert!(!signature_path(&path).exists());
    assert_eq!(verify_signed_json(&path).unwrap(), SignatureStatus::Unsigned);
}
