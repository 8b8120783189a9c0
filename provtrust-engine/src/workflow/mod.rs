//! Record and batch workflow
//!
//! One [`RecordState`] per provider record is threaded through a fixed,
//! linear sequence of stages:
//!
//! ```text
//! Created → Parsed → Validated → Reachability → Reputation → ComplaintChecked
//!         → FraudAssessed → DecayEstimated → ImpactComputed → Terminal
//! ```
//!
//! Each stage reads the state produced so far and returns a [`StageOutput`];
//! the orchestrator merges that output into the next state value. Stages
//! never mutate the state they are given.

pub mod aggregator;
pub mod batch;
pub mod intake;
pub mod orchestrator;
pub mod stages;

use crate::inputs::ExclusionList;
use crate::lookups::LookupSet;
use crate::types::{
    BusinessImpact, CommunicationRequest, ComplaintOutcome, DegradationPrediction, FraudAnalysis,
    FraudRiskLevel, IdentityOutcome, IntakeReport, LookupStatus, ParsedData, ProviderRecord,
    ReachabilityOutcome, ReputationOutcome, TrustAssessment, TrustStatus, ValidationResult,
    Verdict,
};
use crate::validators::ComplaintDirectory;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

pub use aggregator::{BatchAggregator, BatchRoi, BatchSummary};
pub use batch::{BatchReport, BatchRunner};
pub use orchestrator::RecordOrchestrator;
pub use stages::Stage;

/// Risk reported for a record that never got a trust assessment
pub const DEFAULT_RISK_SCORE: f64 = 50.0;

/// Position of a record in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineStage {
    Created,
    Parsed,
    Validated,
    Reachability,
    Reputation,
    ComplaintChecked,
    FraudAssessed,
    DecayEstimated,
    ImpactComputed,
    Terminal,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Created => "Created",
            PipelineStage::Parsed => "Parsed",
            PipelineStage::Validated => "Validated",
            PipelineStage::Reachability => "Reachability",
            PipelineStage::Reputation => "Reputation",
            PipelineStage::ComplaintChecked => "ComplaintChecked",
            PipelineStage::FraudAssessed => "FraudAssessed",
            PipelineStage::DecayEstimated => "DecayEstimated",
            PipelineStage::ImpactComputed => "ImpactComputed",
            PipelineStage::Terminal => "Terminal",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage produced; merged into the state by [`RecordState::apply`]
#[derive(Debug, Clone)]
pub enum StageOutput {
    Parsed {
        record: ProviderRecord,
        parsed: Option<ParsedData>,
        intake: IntakeReport,
    },
    Validated {
        identity: IdentityOutcome,
        validation: ValidationResult,
    },
    Reachability(ReachabilityOutcome),
    Reputation(ReputationOutcome),
    ComplaintChecked {
        complaints: ComplaintOutcome,
        trust: TrustAssessment,
    },
    FraudAssessed(FraudAnalysis),
    DecayEstimated(DegradationPrediction),
    ImpactComputed(BusinessImpact),
    Communication(Option<CommunicationRequest>),
}

impl StageOutput {
    /// Stage the record is in once this output is merged
    pub fn stage(&self) -> PipelineStage {
        match self {
            StageOutput::Parsed { .. } => PipelineStage::Parsed,
            StageOutput::Validated { .. } => PipelineStage::Validated,
            StageOutput::Reachability(_) => PipelineStage::Reachability,
            StageOutput::Reputation(_) => PipelineStage::Reputation,
            StageOutput::ComplaintChecked { .. } => PipelineStage::ComplaintChecked,
            StageOutput::FraudAssessed(_) => PipelineStage::FraudAssessed,
            StageOutput::DecayEstimated(_) => PipelineStage::DecayEstimated,
            StageOutput::ImpactComputed(_) => PipelineStage::ImpactComputed,
            StageOutput::Communication(_) => PipelineStage::Terminal,
        }
    }
}

/// Working state of one provider record
///
/// Created with only `record` populated; each stage fills one output.
#[derive(Debug, Clone, Serialize)]
pub struct RecordState {
    pub record: ProviderRecord,
    pub stage: PipelineStage,
    pub intake: Option<IntakeReport>,
    pub parsed: Option<ParsedData>,
    pub identity: Option<IdentityOutcome>,
    pub validation: Option<ValidationResult>,
    pub reachability: Option<ReachabilityOutcome>,
    pub reputation: Option<ReputationOutcome>,
    pub complaints: Option<ComplaintOutcome>,
    pub trust: Option<TrustAssessment>,
    pub fraud: Option<FraudAnalysis>,
    pub degradation: Option<DegradationPrediction>,
    pub impact: Option<BusinessImpact>,
    pub communication: Option<CommunicationRequest>,
    pub communication_required: bool,
    pub errors: Vec<String>,
}

impl RecordState {
    pub fn new(record: ProviderRecord) -> Self {
        Self {
            record,
            stage: PipelineStage::Created,
            intake: None,
            parsed: None,
            identity: None,
            validation: None,
            reachability: None,
            reputation: None,
            complaints: None,
            trust: None,
            fraud: None,
            degradation: None,
            impact: None,
            communication: None,
            communication_required: false,
            errors: Vec::new(),
        }
    }

    /// Record that never entered the pipeline because the batch was cancelled
    pub fn cancelled(record: ProviderRecord) -> Self {
        let mut state = Self::new(record);
        state.errors.push("batch cancelled".to_string());
        state.stage = PipelineStage::Terminal;
        state
    }

    /// Merge a stage output, producing the next state
    pub fn apply(mut self, output: StageOutput) -> Self {
        self.stage = output.stage();
        match output {
            StageOutput::Parsed {
                record,
                parsed,
                intake,
            } => {
                self.record = record;
                self.parsed = parsed;
                self.intake = Some(intake);
            }
            StageOutput::Validated {
                identity,
                validation,
            } => {
                if identity.registry_status == LookupStatus::NotFound {
                    self.communication_required = true;
                }
                self.identity = Some(identity);
                self.validation = Some(validation);
            }
            StageOutput::Reachability(outcome) => self.reachability = Some(outcome),
            StageOutput::Reputation(outcome) => self.reputation = Some(outcome),
            StageOutput::ComplaintChecked { complaints, trust } => {
                self.complaints = Some(complaints);
                self.trust = Some(trust);
            }
            StageOutput::FraudAssessed(analysis) => {
                if analysis.risk_level == FraudRiskLevel::High {
                    self.communication_required = true;
                }
                self.fraud = Some(analysis);
            }
            StageOutput::DecayEstimated(prediction) => self.degradation = Some(prediction),
            StageOutput::ImpactComputed(impact) => self.impact = Some(impact),
            StageOutput::Communication(request) => self.communication = request,
        }
        self
    }

    /// Status bucket; a record with errors is never reported as Verified
    pub fn status(&self) -> TrustStatus {
        match (&self.trust, self.errors.is_empty()) {
            (Some(trust), true) => trust.status,
            (Some(trust), false) if trust.status == TrustStatus::Flagged => TrustStatus::Flagged,
            _ => TrustStatus::Review,
        }
    }

    pub fn risk_score(&self) -> f64 {
        self.trust
            .as_ref()
            .map(|t| t.risk_score)
            .unwrap_or(DEFAULT_RISK_SCORE)
    }

    pub fn trust_score(&self) -> f64 {
        100.0 - self.risk_score()
    }

    /// Record-level discrepancy strings
    ///
    /// Document/registry conflicts, failed identity and reachability
    /// findings, and confirmed member complaints, in that order.
    pub fn discrepancies(&self) -> Vec<String> {
        let mut out = Vec::new();

        if let Some(validation) = &self.validation {
            out.extend(validation.conflicts.iter().map(|c| c.description.clone()));
        }
        if let Some(identity) = &self.identity {
            out.extend(identity.s1.with_verdict(Verdict::Fail).map(|f| f.text.clone()));
        }
        if let Some(reachability) = &self.reachability {
            out.extend(
                reachability
                    .s2
                    .with_verdict(Verdict::Fail)
                    .map(|f| f.text.clone()),
            );
        }
        if let Some(complaints) = &self.complaints {
            out.extend(complaints.confirmed.iter().map(|c| {
                format!("Confirmed Complaint: {} - {}", c.field.as_str(), c.value)
            }));
        }

        out
    }
}

/// Read-only inputs shared by every record of one batch run
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub batch_id: Uuid,
    /// Assessment date used for recency and degradation dates
    pub as_of: NaiveDate,
    pub lookups: LookupSet,
    pub lookup_timeout: Duration,
    pub complaints: ComplaintDirectory,
    pub exclusions: ExclusionList,
    /// Document-extracted fields keyed by NPI
    pub documents: HashMap<String, ParsedData>,
}

impl BatchContext {
    pub fn new(lookups: LookupSet, lookup_timeout: Duration, as_of: NaiveDate) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            as_of,
            lookups,
            lookup_timeout,
            complaints: ComplaintDirectory::default(),
            exclusions: ExclusionList::default(),
            documents: HashMap::new(),
        }
    }

    pub fn with_complaints(mut self, complaints: ComplaintDirectory) -> Self {
        self.complaints = complaints;
        self
    }

    pub fn with_exclusions(mut self, exclusions: ExclusionList) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_documents(mut self, documents: HashMap<String, ParsedData>) -> Self {
        self.documents = documents;
        self
    }
}
