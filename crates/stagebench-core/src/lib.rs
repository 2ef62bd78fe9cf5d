//! Measurement pipeline for control-plane load tests.
//!
//! - [`submit::Scheduler`] creates N workloads in rate-controlled batches and
//!   appends every attempt to the submission log.
//! - [`sample::Sampler`] polls cluster state and merges observed lifecycle
//!   stages into the sample log. Re-running it only ever adds data.
//! - [`analyze::aggregate`] turns both logs into per-workload stage deltas.
//!
//! The cluster is reached only through [`client::ResourceClient`].

pub mod analyze;
pub mod client;
pub mod config;
pub mod error;
pub mod journal;
pub mod model;
pub mod sample;
pub mod submit;
pub mod templates;

pub use analyze::{aggregate, AggregateOptions, AnalysisDataset, DeltaRow, RowStatus, Summary};
pub use client::{ClientError, FakeClient, KubectlClient, ResourceClient, ResourceState};
pub use config::BenchConfig;
pub use error::{BenchError, BenchResult, LogError};
pub use journal::{SampleLog, SampleStore, SubmissionLog};
pub use model::{EventTimeline, ResourceKind, Stage, StageSet, WorkloadKind, WorkloadRecord};
pub use sample::{SampleReport, Sampler};
pub use submit::{Scheduler, SubmitPlan, SubmitSummary};
