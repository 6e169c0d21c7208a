//! # mek-kernel
//!
//! The Minimal Execution Kernel: an authority-enforcement substrate that
//! sits beneath any application performing consequential operations and
//! makes misuse mechanically impossible rather than policy-discouraged.
//!
//! Every sensitive action answers one question through one door — may this
//! principal, with this grant, on this world-state, execute this capability
//! now? — and produces either a result wrapped in verifiable evidence or a
//! structured, terminal refusal.
//!
//! ## Shape
//!
//! - **Primitives** ([`context`], [`capability`]): frozen value types,
//!   constructed only if valid.
//! - **Authority** ([`authority`]): principals, time- and use-bounded
//!   grants, irreversible revocation, a monotonic authority version.
//! - **Snapshots** ([`snapshot`]): the world-slice an execution was
//!   admitted against, captured before friction and re-validated after.
//! - **The Guard** ([`guard`]): the single admission pipeline.
//! - **Composition** ([`composition`]): ordered independent admissions,
//!   STRICT halt.
//! - **Failure** ([`failure`]): refusals as closed, structured data.
//! - **Evidence** ([`evidence`]): hash-chained post-halt bundles with pure
//!   export and verification.
//! - **Negative capability** ([`negative`]): prohibited behaviors that
//!   refuse by construction.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use mek_kernel::prelude::*;
//! use serde_json::json;
//!
//! let guard = Guard::new(KernelConfig::default());
//! guard
//!     .register_capability(CapabilityContract::new(
//!         "file.read",
//!         Consequence::Low,
//!         ["path"],
//!         |ctx| Ok(json!({ "read": ctx.fields()["path"] })),
//!     ))
//!     .expect("register");
//! guard
//!     .issue_grant(
//!         "alice",
//!         "file.read",
//!         json!({ "prefix": "/tmp/" }),
//!         Duration::from_secs(60),
//!         Some(1),
//!         true,
//!     )
//!     .expect("issue");
//!
//! let draft = ContextDraft::new("file.read", "alice")
//!     .with_confidence(0.9)
//!     .with_field("path", "/tmp/x");
//! let report = guard.execute("file.read", draft);
//! assert!(report.result.is_success());
//! ```
//!
//! The kernel never: learns, retries, softens refusals, infers intent,
//! grants authority transitively, re-executes from evidence, or mutates a
//! recorded fact. Those absences are structural.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod authority;
pub mod canonical;
pub mod capability;
pub mod clock;
pub mod composition;
pub mod config;
pub mod context;
pub mod evidence;
pub mod failure;
pub mod friction;
pub mod guard;
pub mod negative;
pub mod observer;
pub mod snapshot;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::authority::{Grant, Principal, RevocationReason};
    pub use crate::capability::{CapabilityContract, CapabilityError, Consequence};
    pub use crate::clock::{Clock, ManualClock, MonotonicClock};
    pub use crate::composition::{Composition, CompositionStep};
    pub use crate::config::KernelConfig;
    pub use crate::context::{Context, ContextDraft};
    pub use crate::evidence::{VerifyOutcome, verify};
    pub use crate::failure::{FailureResult, FailureType};
    pub use crate::guard::{ExecutionReport, ExecutionResult, Guard};
    pub use crate::observer::{Observer, ObserverEvent};
}

/// Re-export commonly used types at the crate root.
pub use capability::{CapabilityContract, Consequence};
pub use config::KernelConfig;
pub use context::ContextDraft;
pub use evidence::verify;
pub use failure::{FailureType, Phase};
pub use guard::Guard;
