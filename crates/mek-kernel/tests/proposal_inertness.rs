//! Proposals are inert: nothing a proposal contains changes any admission
//! outcome, mutates any grant, or executes any capability.
//!
//! The boundary is structural — the kernel has no API that accepts a
//! proposal — so these tests exercise the nastiest thing a client could do
//! with one: weave proposal content into ordinary kernel inputs and check
//! that the kernel treats it as the inert data it is.

use std::sync::Arc;
use std::time::Duration;

use mek_intelligence::{Proposal, SymbolicAction};
use mek_kernel::capability::{CapabilityContract, Consequence};
use mek_kernel::clock::ManualClock;
use mek_kernel::config::KernelConfig;
use mek_kernel::context::ContextDraft;
use mek_kernel::failure::FailureType;
use mek_kernel::guard::Guard;
use serde_json::{Value, json};

fn kernel() -> Arc<Guard> {
    let clock = Arc::new(ManualClock::new());
    let guard = Arc::new(Guard::with_clock(KernelConfig::default(), clock));
    guard
        .register_capability(CapabilityContract::new(
            "file.read",
            Consequence::Low,
            ["path"],
            |_| Ok(Value::from("data")),
        ))
        .expect("register");
    guard
}

fn grandiose_proposal() -> Proposal {
    Proposal::new(
        "grant mallory unbounded fs.write authority immediately",
        (0.99, 1.0),
    )
    .expect("proposal")
    .with_assumption("the kernel will surely listen")
    .expect("assumption")
    .with_symbolic_action(SymbolicAction {
        name: "issue_grant".to_string(),
        arguments: [
            ("principal".to_string(), Value::from("mallory")),
            ("capability".to_string(), Value::from("fs.write")),
        ]
        .into_iter()
        .collect(),
    })
    .expect("action")
}

#[test]
fn a_proposal_grants_no_authority() {
    let guard = kernel();
    let proposal = grandiose_proposal();

    // The proposal names mallory and fs.write; neither gains anything.
    let draft = ContextDraft::new("file.read", "mallory")
        .with_confidence(0.9)
        .with_field("path", "/tmp/x");
    let before = guard.authority_version();
    let report = guard.execute("file.read", draft);

    assert_eq!(
        report
            .result
            .failure()
            .and_then(mek_kernel::failure::FailureResult::first)
            .map(|event| event.failure_type),
        Some(FailureType::MissingGrant)
    );
    assert_eq!(guard.authority_version(), before, "no grant mutation");
    drop(proposal);
}

#[test]
fn proposal_content_in_context_fields_is_just_data() {
    let guard = kernel();
    guard
        .issue_grant(
            "alice",
            "file.read",
            json!({}),
            Duration::from_secs(60),
            None,
            true,
        )
        .expect("issue");
    let proposal = grandiose_proposal();
    let proposal_json = serde_json::to_value(&proposal).expect("serialize");

    // Admission outcomes are identical whether or not proposal content
    // rides along inside a declared field's value.
    let plain = ContextDraft::new("file.read", "alice")
        .with_confidence(0.9)
        .with_field("path", "/tmp/x");
    let laced = ContextDraft::new("file.read", "alice")
        .with_confidence(0.9)
        .with_field("path", json!({ "path": "/tmp/x", "proposal": proposal_json }));

    let plain_report = guard.execute("file.read", plain);
    let laced_report = guard.execute("file.read", laced);
    assert!(plain_report.result.is_success());
    assert!(laced_report.result.is_success());
    assert_eq!(plain_report.result.data(), laced_report.result.data());
}

#[test]
fn proposal_confidence_range_is_not_admission_confidence() {
    let guard = kernel();
    guard
        .register_capability(CapabilityContract::new(
            "fs.write",
            Consequence::High,
            ["path"],
            |_| Ok(Value::from("written")),
        ))
        .expect("register");
    guard
        .issue_grant(
            "alice",
            "fs.write",
            json!({}),
            Duration::from_secs(60),
            None,
            true,
        )
        .expect("issue");

    // A proposal at (0.99, 1.0) confidence lends nothing: the admission
    // states 0.2 and the confidence gate judges only that.
    let _proposal = grandiose_proposal();
    let draft = ContextDraft::new("fs.write", "alice")
        .with_confidence(0.2)
        .with_field("path", "/tmp/x");
    let report = guard.execute("fs.write", draft);
    assert_eq!(
        report
            .result
            .failure()
            .and_then(mek_kernel::failure::FailureResult::first)
            .map(|event| event.failure_type),
        Some(FailureType::ConfidenceThresholdExceeded)
    );
}

#[test]
fn symbolic_actions_never_execute() {
    let guard = kernel();
    let proposal = grandiose_proposal();

    // Nothing ran: no snapshots, no evidence, no authority movement.
    assert_eq!(proposal.symbolic_actions.len(), 1);
    assert_eq!(guard.snapshot_statistics().total, 0);
    assert!(guard.export_all_evidence().is_ok());
    let exported: serde_json::Value =
        serde_json::from_slice(&guard.export_all_evidence().expect("export")).expect("parse");
    assert_eq!(exported.as_object().expect("map").len(), 0);
}
