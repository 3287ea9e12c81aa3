//! # scrutin core
//!
//! Orchestration layer that schedules, runs, tracks, and reports static
//! analysis runs against a mutable set of source files inside an interactive
//! host.
//!
//! - Only one user visible run is active per project at a time
//!   ([`orchestration::RunStatus`]).
//! - Deferred runs queue up and merge per scope unit
//!   ([`orchestration::JobQueue`]).
//! - Partial results reach observers while a run is still going
//!   ([`orchestration::FindingStreamer`]).
//! - Findings keep their identity across re-analysis
//!   ([`orchestration::FindingReconciler`]).
//! - Any run can be cancelled promptly ([`orchestration::CancellationBridge`]).
//!
//! The rule engine, exclusion policy, document access and the live finding
//! store are collaborators described in `scrutin-contracts`.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scrutin_contracts::{NeverCancelled, NoopAnalysisCallback};
//! use scrutin_core::{
//!     config::OrchestratorConfig,
//!     orchestration::{AnalysisManager, Collaborators},
//! };
//! use scrutin_model::{FileRef, ProjectId, TriggerType};
//!
//! async fn analyze(collaborators: Collaborators) {
//!     let manager = AnalysisManager::new(
//!         ProjectId::new(),
//!         collaborators,
//!         &OrchestratorConfig::default(),
//!     )
//!     .expect("default config is valid");
//!     if let Some(handle) = manager.submit_foreground(
//!         vec![FileRef::from("src/lib.rs")],
//!         TriggerType::Action,
//!         false,
//!         Arc::new(NoopAnalysisCallback),
//!         Arc::new(NeverCancelled),
//!     ) {
//!         let outcome = handle.outcome().await;
//!         println!("{:?}", outcome.end_kind());
//!     }
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Orchestrator tuning loaded from TOML
pub mod config;
pub mod error;
/// Run status, queue, dispatch, tracking and streaming
pub mod orchestration;
/// In-memory live finding store
pub mod store;

pub use error::{AnalysisError, Result};
