//! # mek-intelligence
//!
//! The sandboxed side of the intelligence boundary. Reasoning code (LLM
//! pipelines, planners, heuristics) lives behind this crate and can emit
//! exactly one thing: an opaque [`Proposal`].
//!
//! A proposal carries no authority, no admission credit, and no execution
//! privilege. The kernel has no API that accepts one; anything consuming
//! proposals must re-state its request as an ordinary admission through the
//! guard, under a real principal and a real grant.
//!
//! The boundary is enforced at the build graph: this crate declares no
//! dependency on `mek-kernel`, and `cargo xtask boundary` fails the build
//! if that edge ever appears.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod proposal;

pub use proposal::{Proposal, ProposalError, SymbolicAction};
