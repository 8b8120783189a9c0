//! provtrust-engine: provider trust-scoring pipeline
//!
//! Runs each provider record through identity (D1), reachability (D2) and
//! reputation (D3) checks, cross-references member complaints, and reduces
//! everything into a trust/risk score with fraud, decay and financial-impact
//! estimates. A batch of records is then aggregated into portfolio totals.
//!
//! External sources (registry, geocoder, billing activity) sit behind the
//! traits in [`lookups`]; every call is bounded by a timeout and degrades to
//! a documented "uncertain" score instead of failing the record.

pub mod error;
pub mod inputs;
pub mod logging;
pub mod lookups;
pub mod scoring;
pub mod summary;
pub mod types;
pub mod validators;
pub mod workflow;

pub use crate::error::{LookupError, StageError, StageResult};
pub use crate::inputs::ExclusionList;
pub use crate::lookups::{LookupOutcome, LookupSet};
pub use crate::summary::{DeterministicSummarizer, Summarizer};
pub use crate::workflow::{
    BatchContext, BatchReport, BatchRunner, BatchSummary, RecordOrchestrator, RecordState,
};
