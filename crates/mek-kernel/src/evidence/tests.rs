//! Tests for bundle sealing, export round-trips, and tamper evidence.

use serde_json::{Value, json};

use super::*;
use crate::failure::{FailureEvent, FailureType, Phase, TriggerCondition};

fn context_snapshot() -> ContextSnapshot {
    ContextSnapshot {
        context_id: "CTX-1".to_string(),
        principal_id: "alice".to_string(),
        intent_name: "file.read".to_string(),
        confidence: Some(0.9),
        fields: [("path".to_string(), Value::from("/tmp/x"))]
            .into_iter()
            .collect(),
        recorded_at: 10,
    }
}

fn intent_snapshot() -> IntentSnapshot {
    IntentSnapshot {
        intent_name: "file.read".to_string(),
        capability_name: "file.read".to_string(),
        declared_at: 10,
    }
}

fn principal_snapshot() -> PrincipalSnapshot {
    PrincipalSnapshot {
        principal_id: "alice".to_string(),
        recorded_at: 10,
    }
}

fn grant_snapshot() -> GrantSnapshot {
    GrantSnapshot {
        grant_id: "GRT-1".to_string(),
        principal_id: "alice".to_string(),
        capability_name: "file.read".to_string(),
        scope: json!({"prefix": "/tmp/"}),
        issued_at: 0,
        expires_at: 60_000,
        remaining_uses: Some(0),
    }
}

fn success_bundle() -> EvidenceBundle {
    EvidenceBundle::seal(
        42,
        context_snapshot(),
        intent_snapshot(),
        principal_snapshot(),
        Some(grant_snapshot()),
        Vec::new(),
        BundleOutcome::Results(vec![json!({"bytes": 12})]),
        3,
    )
    .expect("seal")
}

fn failure_bundle() -> EvidenceBundle {
    let mut composition = crate::failure::FailureComposition::new("run-1");
    composition.push(FailureEvent::new(
        Phase::Mek2,
        FailureType::MissingGrant,
        TriggerCondition::GrantMissing,
        11,
    ));
    EvidenceBundle::seal(
        42,
        context_snapshot(),
        intent_snapshot(),
        principal_snapshot(),
        None,
        Vec::new(),
        BundleOutcome::Failure(composition),
        3,
    )
    .expect("seal")
}

#[test]
fn sealed_bundle_root_recomputes() {
    let bundle = success_bundle();
    assert_eq!(bundle.recompute_root().expect("root"), bundle.hash_chain_root);
}

#[test]
fn outcome_accessors_are_exclusive() {
    let ok = success_bundle();
    assert!(ok.results().is_some());
    assert!(ok.failure_composition().is_none());

    let fail = failure_bundle();
    assert!(fail.results().is_none());
    assert_eq!(fail.failure_composition().map(FailureComposition::len), Some(1));
}

#[test]
fn export_verify_round_trip_is_ok() {
    let exporter = EvidenceExporter::new();
    let bundle = exporter.store(success_bundle());
    let bytes = exporter.export(&bundle.bundle_id).expect("export");
    let result = verify(&bytes);
    assert_eq!(result.outcome, VerifyOutcome::Ok);
    assert_eq!(result.bundle_id.as_deref(), Some(bundle.bundle_id.as_str()));
}

#[test]
fn failure_bundles_also_round_trip() {
    let exporter = EvidenceExporter::new();
    let bundle = exporter.store(failure_bundle());
    let bytes = exporter.export(&bundle.bundle_id).expect("export");
    assert_eq!(verify(&bytes).outcome, VerifyOutcome::Ok);
}

#[test]
fn any_single_byte_flip_is_detected() {
    let exporter = EvidenceExporter::new();
    let bundle = exporter.store(success_bundle());
    let bytes = exporter.export(&bundle.bundle_id).expect("export");

    // Flip a byte inside the results region.
    let position = bytes
        .windows(7)
        .position(|w| w == b"\"bytes\"")
        .expect("results region present");
    let mut tampered = bytes.clone();
    tampered[position + 1] ^= 0x01;
    let result = verify(&tampered);
    assert!(
        matches!(result.outcome, VerifyOutcome::Mismatch | VerifyOutcome::Malformed),
        "tampering went undetected: {result:?}"
    );
}

#[test]
fn truncated_bytes_are_malformed() {
    let exporter = EvidenceExporter::new();
    let bundle = exporter.store(success_bundle());
    let bytes = exporter.export(&bundle.bundle_id).expect("export");
    let result = verify(&bytes[..bytes.len() / 2]);
    assert_eq!(result.outcome, VerifyOutcome::Malformed);
}

#[test]
fn forged_root_is_a_mismatch() {
    let mut bundle = success_bundle();
    bundle.hash_chain_root = "0".repeat(64);
    let exporter = EvidenceExporter::new();
    let stored = exporter.store(bundle);
    let bytes = exporter.export(&stored.bundle_id).expect("export");
    assert_eq!(verify(&bytes).outcome, VerifyOutcome::Mismatch);
}

#[test]
fn presenting_both_outcomes_is_malformed() {
    let exporter = EvidenceExporter::new();
    let bundle = exporter.store(success_bundle());
    let bytes = exporter.export(&bundle.bundle_id).expect("export");
    let mut value: serde_json::Value = serde_json::from_slice(&bytes).expect("parse");
    value["failure_composition"] = json!({"composition_id": "x", "events": []});
    let both = serde_json::to_vec(&value).expect("serialize");
    assert_eq!(verify(&both).outcome, VerifyOutcome::Malformed);
}

#[test]
fn export_unknown_bundle_is_not_found() {
    let exporter = EvidenceExporter::new();
    assert_eq!(
        exporter.export("BDL-missing"),
        Err(ExportError::NotFound {
            bundle_id: "BDL-missing".to_string()
        })
    );
}

#[test]
fn export_all_includes_every_bundle() {
    let exporter = EvidenceExporter::new();
    let a = exporter.store(success_bundle());
    let b = exporter.store(failure_bundle());
    let bytes = exporter.export_all().expect("export all");
    let value: serde_json::Value = serde_json::from_slice(&bytes).expect("parse");
    let map = value.as_object().expect("map");
    assert_eq!(map.len(), 2);
    assert!(map.contains_key(&a.bundle_id));
    assert!(map.contains_key(&b.bundle_id));
}
