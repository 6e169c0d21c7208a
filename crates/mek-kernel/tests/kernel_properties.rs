//! Property tests over randomly generated principals, grants, contexts,
//! and capability registrations.

use std::sync::Arc;
use std::time::Duration;

use mek_kernel::capability::{CapabilityContract, Consequence};
use mek_kernel::clock::ManualClock;
use mek_kernel::config::KernelConfig;
use mek_kernel::context::ContextDraft;
use mek_kernel::evidence::{VerifyOutcome, verify};
use mek_kernel::failure::{
    FailureComposition, FailureEvent, FailureType, Phase, TriggerCondition,
};
use mek_kernel::guard::Guard;
use proptest::prelude::*;
use serde_json::{Value, json};

fn kernel_with_grant(principal: &str) -> Arc<Guard> {
    let clock = Arc::new(ManualClock::new());
    let guard = Arc::new(Guard::with_clock(KernelConfig::default(), clock));
    guard
        .register_capability(CapabilityContract::new(
            "file.read",
            Consequence::Low,
            ["path"],
            |ctx| Ok(json!({ "read": ctx.fields()["path"] })),
        ))
        .expect("register");
    guard
        .issue_grant(
            principal,
            "file.read",
            json!({}),
            Duration::from_secs(60),
            None,
            true,
        )
        .expect("issue");
    guard
}

fn principal_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,24}"
}

proptest! {
    // Confidence outside [0,1] always refuses with a confidence-class
    // failure and captures no state.
    #[test]
    fn out_of_range_confidence_always_refuses(
        principal in principal_strategy(),
        confidence in prop_oneof![
            -1000.0..-0.0001f64,
            1.0001..1000.0f64,
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
        ],
    ) {
        let guard = kernel_with_grant(&principal);
        let draft = ContextDraft::new("file.read", principal.as_str())
            .with_confidence(confidence)
            .with_field("path", "/tmp/x");
        let report = guard.execute("file.read", draft);

        let failure_type = report
            .result
            .failure()
            .and_then(mek_kernel::failure::FailureResult::first)
            .map(|event| event.failure_type);
        prop_assert_eq!(failure_type, Some(FailureType::InvalidConfidence));
        prop_assert_eq!(guard.snapshot_statistics().total, 0);
    }

    // Any in-range confidence admits a LOW capability under a live grant.
    #[test]
    fn in_range_confidence_admits_low_consequence(
        principal in principal_strategy(),
        confidence in 0.0..=1.0f64,
        path in "/[a-z]{1,12}/[a-z]{1,12}",
    ) {
        let guard = kernel_with_grant(&principal);
        let draft = ContextDraft::new("file.read", principal.as_str())
            .with_confidence(confidence)
            .with_field("path", path.as_str());
        let report = guard.execute("file.read", draft);
        prop_assert!(report.result.is_success());
    }

    // Every successful run's export verifies, and any single-byte
    // corruption of the export is detected.
    #[test]
    fn export_verifies_and_corruption_is_detected(
        principal in principal_strategy(),
        path in "/[a-z]{1,12}",
        flip_offset in any::<usize>(),
        flip_mask in 1..=255u8,
    ) {
        let guard = kernel_with_grant(&principal);
        let draft = ContextDraft::new("file.read", principal.as_str())
            .with_confidence(0.9)
            .with_field("path", path.as_str());
        let report = guard.execute("file.read", draft);
        prop_assert!(report.result.is_success());

        let bytes = guard.export_evidence(&report.bundle_id).expect("export");
        prop_assert_eq!(verify(&bytes).outcome, VerifyOutcome::Ok);

        let mut tampered = bytes.clone();
        let index = flip_offset % tampered.len();
        tampered[index] ^= flip_mask;
        let outcome = verify(&tampered).outcome;
        prop_assert!(
            matches!(outcome, VerifyOutcome::Mismatch | VerifyOutcome::Malformed),
            "byte {} xor {:#04x} went undetected", index, flip_mask
        );
    }

    // Appending failure events preserves every prior event verbatim.
    #[test]
    fn failure_composition_preserves_prior_events(
        timestamps in proptest::collection::vec(0u64..1_000_000, 1..16),
    ) {
        let mut composition = FailureComposition::new("prop-run");
        let mut recorded: Vec<String> = Vec::new();
        for timestamp in timestamps {
            let event = FailureEvent::new(
                Phase::Mek0,
                FailureType::GuardRefusal,
                TriggerCondition::CapabilityError,
                timestamp,
            );
            recorded.push(event.failure_id.clone());
            composition.push(event);

            for (index, id) in recorded.iter().enumerate() {
                prop_assert_eq!(&composition.events()[index].failure_id, id);
            }
        }
        prop_assert_eq!(composition.len(), recorded.len());
    }

    // The strongest-grant tie-break is deterministic: repeated lookups of
    // the same store pick the same grant.
    #[test]
    fn grant_lookup_is_deterministic(ttls in proptest::collection::vec(1u64..600, 2..8)) {
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
        for ttl in &ttls {
            guard
                .issue_grant(
                    "alice",
                    "file.read",
                    json!({}),
                    Duration::from_secs(*ttl),
                    None,
                    true,
                )
                .expect("issue");
        }

        let draft = || {
            ContextDraft::new("file.read", "alice")
                .with_confidence(0.9)
                .with_field("path", "/tmp/x")
        };
        let first = guard.execute("file.read", draft());
        let second = guard.execute("file.read", draft());
        prop_assert!(first.result.is_success());
        prop_assert!(second.result.is_success());

        let snapshots = guard.list_snapshots(Some("alice"), Some("file.read"));
        prop_assert_eq!(snapshots.len(), 2);
        // Both admissions ran under the same (soonest-dying) grant.
        prop_assert_eq!(&snapshots[0].grant_id, &snapshots[1].grant_id);
    }
}
