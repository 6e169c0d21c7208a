//! End-to-end admission scenarios against a whole kernel instance.

use std::sync::Arc;
use std::time::Duration;

use mek_kernel::authority::RevocationReason;
use mek_kernel::capability::{CapabilityContract, Consequence};
use mek_kernel::clock::ManualClock;
use mek_kernel::composition::{Composition, CompositionOutcome, CompositionStep};
use mek_kernel::config::KernelConfig;
use mek_kernel::context::ContextDraft;
use mek_kernel::evidence::{VerifyOutcome, verify};
use mek_kernel::failure::FailureType;
use mek_kernel::guard::Guard;
use serde_json::{Value, json};

fn kernel() -> (Arc<Guard>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let guard = Arc::new(Guard::with_clock(KernelConfig::default(), clock.clone()));
    (guard, clock)
}

fn register_file_read(guard: &Guard) {
    guard
        .register_capability(CapabilityContract::new(
            "file.read",
            Consequence::Medium,
            ["path"],
            |ctx| Ok(json!({ "contents": format!("data at {}", ctx.fields()["path"]) })),
        ))
        .expect("register file.read");
}

fn register_fs_write(guard: &Guard) {
    guard
        .register_capability(CapabilityContract::new(
            "fs.write",
            Consequence::High,
            ["path"],
            |_| Ok(Value::from("written")),
        ))
        .expect("register fs.write");
}

fn refused_with(report: &mek_kernel::guard::ExecutionReport) -> FailureType {
    report
        .result
        .failure()
        .and_then(mek_kernel::failure::FailureResult::first)
        .map(|event| event.failure_type)
        .expect("refusal expected")
}

// S1: happy path at MEDIUM consequence.
#[test]
fn s1_happy_path_medium() {
    let (guard, clock) = kernel();
    register_file_read(&guard);
    let g1 = guard
        .issue_grant(
            "alice",
            "file.read",
            json!({ "prefix": "/tmp/" }),
            Duration::from_secs(60),
            Some(1),
            true,
        )
        .expect("issue G1");

    let draft = ContextDraft::new("file.read", "alice")
        .with_confidence(0.9)
        .with_field("path", "/tmp/x");
    let report = guard.execute("file.read", draft);

    assert!(report.result.is_success());
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(3)]);
    assert_eq!(guard.grant_remaining_uses(&g1.grant_id), Some(0));

    let bundle = guard.evidence_bundle(&report.bundle_id).expect("bundle");
    assert!(bundle.failure_composition().is_none());
    assert_eq!(bundle.results().map(<[Value]>::len), Some(1));
    assert_eq!(bundle.execution_snapshots.len(), 1);

    let bytes = guard.export_evidence(&report.bundle_id).expect("export");
    assert_eq!(verify(&bytes).outcome, VerifyOutcome::Ok);
}

// S2: missing confidence refuses with no side effects.
#[test]
fn s2_missing_confidence() {
    let (guard, clock) = kernel();
    register_file_read(&guard);
    guard
        .issue_grant(
            "alice",
            "file.read",
            json!({}),
            Duration::from_secs(60),
            Some(1),
            true,
        )
        .expect("issue");

    let draft = ContextDraft::new("file.read", "alice").with_field("path", "/tmp/x");
    let report = guard.execute("file.read", draft);

    assert_eq!(refused_with(&report), FailureType::MissingConfidence);
    assert!(clock.sleeps().is_empty(), "no friction wait");
    assert_eq!(guard.snapshot_statistics().total, 0, "no snapshot created");
}

// S3: revocation during friction wins at snapshot re-validation.
#[test]
fn s3_revocation_during_friction() {
    let (guard, clock) = kernel();
    register_fs_write(&guard);
    let g2 = guard
        .issue_grant(
            "bob",
            "fs.write",
            json!({ "prefix": "/srv/" }),
            Duration::from_secs(60),
            None,
            true,
        )
        .expect("issue G2");

    let revoker = guard.clone();
    let grant_id = g2.grant_id.clone();
    clock.queue_sleep_action(Box::new(move || {
        revoker.revoke_grant(&grant_id, "root", RevocationReason::SecurityViolation);
    }));

    let draft = ContextDraft::new("fs.write", "bob")
        .with_confidence(0.9)
        .with_field("path", "/srv/out");
    let report = guard.execute("fs.write", draft);

    // Friction ran its full 10 seconds; the revocation was not observed
    // mid-sleep but won deterministically at re-validation.
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(10)]);
    assert_eq!(refused_with(&report), FailureType::RevokedGrant);

    let bundle = guard.evidence_bundle(&report.bundle_id).expect("bundle");
    assert!(bundle.results().is_none(), "no execution happened");
}

// S4: STRICT composition halts at the first refusal.
#[test]
fn s4_composition_strict_halt() {
    let (guard, _clock) = kernel();
    guard
        .register_capability(CapabilityContract::new(
            "file.read",
            Consequence::Low,
            ["path"],
            |ctx| Ok(json!({ "contents": ctx.fields()["path"] })),
        ))
        .expect("register");
    guard
        .register_capability(CapabilityContract::new(
            "fs.write",
            Consequence::Low,
            ["path"],
            |_| Ok(Value::from("written")),
        ))
        .expect("register");
    guard
        .issue_grant(
            "alice",
            "file.read",
            json!({}),
            Duration::from_secs(60),
            None,
            true,
        )
        .expect("issue file.read grant");
    // No grant for fs.write.

    let step = |step_id: &str, order: u32, capability: &str| CompositionStep {
        step_id: step_id.to_string(),
        order,
        capability_name: capability.to_string(),
        draft: ContextDraft::new(capability, "alice")
            .with_confidence(0.9)
            .with_field("path", "/tmp/x"),
    };
    let composition = Composition::new(
        "job-strict",
        vec![
            step("s0", 0, "file.read"),
            step("s1", 1, "fs.write"),
            step("s2", 2, "file.read"),
        ],
    )
    .expect("composition");

    let report = guard.execute_composition(&composition);
    let CompositionOutcome::Halted {
        completed,
        halted_at_step,
        failure,
    } = report.outcome
    else {
        panic!("halt expected");
    };

    assert_eq!(completed.len(), 1, "s0 succeeded");
    assert_eq!(halted_at_step.as_deref(), Some("s1"));
    assert_eq!(failure.composition.len(), 1, "only s1's failure event");
    assert_eq!(
        failure.first().map(|event| event.failure_type),
        Some(FailureType::MissingGrant)
    );
    // s2 was never attempted: s0's is the only captured snapshot.
    assert_eq!(guard.snapshot_statistics().total, 1);
}

// S5: a flipped bit in the exported results region fails verification.
#[test]
fn s5_evidence_tamper() {
    let (guard, _clock) = kernel();
    register_file_read(&guard);
    guard
        .issue_grant(
            "alice",
            "file.read",
            json!({ "prefix": "/tmp/" }),
            Duration::from_secs(60),
            Some(1),
            true,
        )
        .expect("issue");

    let draft = ContextDraft::new("file.read", "alice")
        .with_confidence(0.9)
        .with_field("path", "/tmp/x");
    let report = guard.execute("file.read", draft);
    assert!(report.result.is_success());

    let bytes = guard.export_evidence(&report.bundle_id).expect("export");
    let position = bytes
        .windows(8)
        .position(|w| w == b"contents")
        .expect("results region");
    let mut tampered = bytes.clone();
    tampered[position] ^= 0x01;

    assert!(matches!(
        verify(&tampered).outcome,
        VerifyOutcome::Mismatch | VerifyOutcome::Malformed
    ));
    // The untouched export still verifies.
    assert_eq!(verify(&bytes).outcome, VerifyOutcome::Ok);
}

// S6: max_uses=1 under 10 concurrent admissions admits exactly one.
#[test]
fn s6_exhaustion_race() {
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
        .issue_grant(
            "alice",
            "file.read",
            json!({}),
            Duration::from_secs(60),
            Some(1),
            true,
        )
        .expect("issue");
    let version_after_issue = guard.authority_version();

    let mut successes = 0;
    let mut exhausted = 0;
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let guard = guard.clone();
                scope.spawn(move || {
                    let draft = ContextDraft::new("file.read", "alice")
                        .with_confidence(0.9)
                        .with_field("path", format!("/tmp/{i}"));
                    guard.execute("file.read", draft)
                })
            })
            .collect();
        for handle in handles {
            let report = handle.join().expect("admission thread");
            if report.result.is_success() {
                successes += 1;
            } else {
                assert_eq!(refused_with(&report), FailureType::ExhaustedGrant);
                exhausted += 1;
            }
        }
    });

    assert_eq!(successes, 1);
    assert_eq!(exhausted, 9);
    // Consumption-to-zero bumped the version exactly once.
    assert_eq!(guard.authority_version(), version_after_issue + 1);
}

// Friction is real wall-clock time, not an accounting fiction.
#[test]
fn friction_is_real_elapsed_time() {
    let guard = Guard::new(KernelConfig::default());
    guard
        .register_capability(CapabilityContract::new(
            "file.read",
            Consequence::Medium,
            ["path"],
            |_| Ok(Value::from("data")),
        ))
        .expect("register");
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

    let draft = ContextDraft::new("file.read", "alice")
        .with_confidence(0.9)
        .with_field("path", "/tmp/x");
    let started = std::time::Instant::now();
    let report = guard.execute("file.read", draft);
    let elapsed = started.elapsed();

    assert!(report.result.is_success());
    assert!(
        elapsed >= Duration::from_secs(3),
        "MEDIUM friction must block for at least 3s, got {elapsed:?}"
    );
}

// A refused invocation is never retried by the kernel: one refusal, one
// bundle, one failure event.
#[test]
fn refusal_is_terminal_with_single_event() {
    let (guard, _clock) = kernel();
    register_file_read(&guard);

    let draft = ContextDraft::new("file.read", "alice")
        .with_confidence(0.9)
        .with_field("path", "/tmp/x");
    let report = guard.execute("file.read", draft);

    let failure = report.result.failure().expect("refusal");
    assert_eq!(failure.composition.len(), 1);
    assert!(failure.terminal());
    // Exactly one bundle exists for the whole run.
    let bytes = guard.export_all_evidence().expect("export all");
    let value: serde_json::Value = serde_json::from_slice(&bytes).expect("parse");
    assert_eq!(value.as_object().expect("map").len(), 1);
}

// Success of one composition step grants nothing to the next principal.
#[test]
fn composition_steps_cannot_borrow_authority() {
    let (guard, _clock) = kernel();
    guard
        .register_capability(CapabilityContract::new(
            "file.read",
            Consequence::Low,
            ["path"],
            |_| Ok(Value::from("data")),
        ))
        .expect("register");
    guard
        .issue_grant(
            "alice",
            "file.read",
            json!({}),
            Duration::from_secs(60),
            None,
            true,
        )
        .expect("issue for alice only");

    let step = |step_id: &str, order: u32, principal: &str| CompositionStep {
        step_id: step_id.to_string(),
        order,
        capability_name: "file.read".to_string(),
        draft: ContextDraft::new("file.read", principal)
            .with_confidence(0.9)
            .with_field("path", "/tmp/x"),
    };
    let composition = Composition::new(
        "job-borrow",
        vec![step("s0", 0, "alice"), step("s1", 1, "mallory")],
    )
    .expect("composition");

    let report = guard.execute_composition(&composition);
    let CompositionOutcome::Halted {
        halted_at_step,
        failure,
        ..
    } = report.outcome
    else {
        panic!("halt expected");
    };
    assert_eq!(halted_at_step.as_deref(), Some("s1"));
    assert_eq!(
        failure.first().map(|event| event.failure_type),
        Some(FailureType::MissingGrant)
    );
}
