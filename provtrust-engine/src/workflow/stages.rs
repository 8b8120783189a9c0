//! Pipeline stages
//!
//! Each stage reads the state produced by earlier stages and returns its
//! own output. `fallback` is the conservative output used when `run` fails
//! or panics; it must never fail itself.

use super::{intake, BatchContext, PipelineStage, RecordState, StageOutput};
use crate::error::{StageError, StageResult};
use crate::lookups::{bounded, LookupOutcome};
use crate::scoring::{BusinessImpactCalculator, DecayEstimator, FraudAssessor, TrustScorer};
use crate::types::{
    BusinessImpact, CommunicationRequest, ComplaintOutcome, Finding, FindingSet, FraudAnalysis,
    FraudRiskLevel, IdentityOutcome, LookupStatus, ReachabilityOutcome, ReputationOutcome,
    TrustAssessment, TrustStatus,
};
use crate::validators::identity::UNCERTAIN_S1;
use crate::validators::reachability::NEUTRAL;
use crate::validators::reputation::NO_DATA_S3;
use crate::validators::{reachability, reputation, ComplaintCrossReferencer, DocumentJudge, IdentityCheck};
use crate::workflow::DEFAULT_RISK_SCORE;
use async_trait::async_trait;
use std::sync::Arc;

/// Decay probability assumed when the estimator fails
const FALLBACK_DECAY: f64 = 0.5;
/// Channel recorded on communication requests
pub const PROVIDER_CHANNEL: &str = "provider_email";

/// One step of the record pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name used in error strings and events
    fn name(&self) -> &'static str;

    /// Pipeline position this stage's output moves the record to
    fn target(&self) -> PipelineStage;

    async fn run(&self, state: &RecordState, ctx: &BatchContext) -> StageResult<StageOutput>;

    /// Conservative output used when `run` fails
    fn fallback(&self, state: &RecordState, ctx: &BatchContext) -> StageOutput;
}

/// Stages in pipeline order
pub fn default_stages() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(ParserStage),
        Arc::new(IdentityStage::default()),
        Arc::new(ReachabilityStage),
        Arc::new(ReputationStage),
        Arc::new(ComplaintStage::default()),
        Arc::new(FraudStage),
        Arc::new(DecayStage),
        Arc::new(ImpactStage),
        Arc::new(CommunicationStage),
    ]
}

fn require<'a, T>(value: Option<&'a T>, what: &str) -> StageResult<&'a T> {
    value.ok_or_else(|| StageError::MissingInput(what.to_string()))
}

// ============================================================================
// Parser
// ============================================================================

pub struct ParserStage;

#[async_trait]
impl Stage for ParserStage {
    fn name(&self) -> &'static str {
        "Parser"
    }

    fn target(&self) -> PipelineStage {
        PipelineStage::Parsed
    }

    async fn run(&self, state: &RecordState, ctx: &BatchContext) -> StageResult<StageOutput> {
        let supplied = ctx.documents.get(state.record.npi.trim());
        let (record, parsed, intake) = intake::parse(state.record.clone(), supplied);
        Ok(StageOutput::Parsed {
            record,
            parsed,
            intake,
        })
    }

    fn fallback(&self, state: &RecordState, _ctx: &BatchContext) -> StageOutput {
        StageOutput::Parsed {
            record: state.record.clone(),
            parsed: None,
            intake: Default::default(),
        }
    }
}

// ============================================================================
// D1: Identity (+ document judge)
// ============================================================================

#[derive(Default)]
pub struct IdentityStage {
    check: IdentityCheck,
    judge: DocumentJudge,
}

#[async_trait]
impl Stage for IdentityStage {
    fn name(&self) -> &'static str {
        "IdentityCheck"
    }

    fn target(&self) -> PipelineStage {
        PipelineStage::Validated
    }

    async fn run(&self, state: &RecordState, ctx: &BatchContext) -> StageResult<StageOutput> {
        let record = &state.record;
        let npi = record.npi.trim();

        let lookup = if npi.is_empty() {
            LookupOutcome::NotFound
        } else {
            bounded(ctx.lookup_timeout, ctx.lookups.registry.lookup(npi)).await
        };
        if let LookupOutcome::Uncertain(reason) = &lookup {
            tracing::warn!(npi = %npi, reason = %reason, "Registry lookup uncertain");
        }

        let identity = self.check.assess(record, lookup);
        let validation = self.judge.evaluate(
            record,
            state.parsed.as_ref(),
            &identity,
            ctx.exclusions.contains(npi),
        );

        tracing::debug!(
            npi = %npi,
            s1 = identity.s1.score,
            registry = ?identity.registry_status,
            conflicts = validation.conflicts.len(),
            "Identity validated"
        );

        Ok(StageOutput::Validated {
            identity,
            validation,
        })
    }

    fn fallback(&self, state: &RecordState, ctx: &BatchContext) -> StageOutput {
        let identity = IdentityOutcome {
            s1: FindingSet::new(
                UNCERTAIN_S1,
                vec![Finding::warn("Identity check unavailable")],
            ),
            registry_status: LookupStatus::Uncertain,
            snapshot: None,
            penalties: Vec::new(),
        };
        let validation = self.judge.evaluate(
            &state.record,
            state.parsed.as_ref(),
            &identity,
            ctx.exclusions.contains(state.record.npi.trim()),
        );
        StageOutput::Validated {
            identity,
            validation,
        }
    }
}

// ============================================================================
// D2: Reachability
// ============================================================================

pub struct ReachabilityStage;

#[async_trait]
impl Stage for ReachabilityStage {
    fn name(&self) -> &'static str {
        "ReachabilityCheck"
    }

    fn target(&self) -> PipelineStage {
        PipelineStage::Reachability
    }

    async fn run(&self, state: &RecordState, ctx: &BatchContext) -> StageResult<StageOutput> {
        let record = &state.record;
        let npi = record.npi.trim();
        let snapshot = state.identity.as_ref().and_then(|i| i.snapshot.as_ref());
        let one_line = record.one_line_address();

        let geocode = bounded(ctx.lookup_timeout, ctx.lookups.geocoder.match_address(&one_line));
        let billing = async {
            if npi.is_empty() {
                LookupOutcome::NotFound
            } else {
                bounded(ctx.lookup_timeout, ctx.lookups.billing.lookup(npi)).await
            }
        };
        let (geocode, billing) = tokio::join!(geocode, billing);

        let outcome = reachability::assess(record, snapshot, geocode, billing);
        tracing::debug!(npi = %npi, s2 = outcome.s2.score, "Reachability checked");
        Ok(StageOutput::Reachability(outcome))
    }

    fn fallback(&self, _state: &RecordState, _ctx: &BatchContext) -> StageOutput {
        StageOutput::Reachability(ReachabilityOutcome {
            s2: FindingSet::new(NEUTRAL, vec![Finding::warn("Reachability check unavailable")]),
            address_matched: None,
            billing: None,
        })
    }
}

// ============================================================================
// D3: Reputation
// ============================================================================

pub struct ReputationStage;

#[async_trait]
impl Stage for ReputationStage {
    fn name(&self) -> &'static str {
        "ReputationCheck"
    }

    fn target(&self) -> PipelineStage {
        PipelineStage::Reputation
    }

    async fn run(&self, state: &RecordState, _ctx: &BatchContext) -> StageResult<StageOutput> {
        let snapshot = state.identity.as_ref().and_then(|i| i.snapshot.as_ref());
        let outcome = reputation::assess(&state.record, snapshot);
        tracing::debug!(npi = %state.record.npi, s3 = outcome.s3.score, "Reputation checked");
        Ok(StageOutput::Reputation(outcome))
    }

    fn fallback(&self, _state: &RecordState, _ctx: &BatchContext) -> StageOutput {
        StageOutput::Reputation(ReputationOutcome {
            s3: FindingSet::new(NO_DATA_S3, vec![Finding::warn("Reputation check unavailable")]),
            license_state_matches: None,
        })
    }
}

// ============================================================================
// Complaints + trust score
// ============================================================================

#[derive(Default)]
pub struct ComplaintStage {
    referencer: ComplaintCrossReferencer,
    scorer: TrustScorer,
}

impl ComplaintStage {
    /// Every D1-D3 finding text, pass verdicts included, one per line
    fn findings_text(
        identity: &IdentityOutcome,
        reachability: &ReachabilityOutcome,
        reputation: &ReputationOutcome,
    ) -> String {
        [&identity.s1, &reachability.s2, &reputation.s3]
            .iter()
            .flat_map(|set| set.findings.iter())
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Stage for ComplaintStage {
    fn name(&self) -> &'static str {
        "ComplaintCrossReferencer"
    }

    fn target(&self) -> PipelineStage {
        PipelineStage::ComplaintChecked
    }

    async fn run(&self, state: &RecordState, ctx: &BatchContext) -> StageResult<StageOutput> {
        let identity = require(state.identity.as_ref(), "identity outcome")?;
        let reachability = require(state.reachability.as_ref(), "reachability outcome")?;
        let reputation = require(state.reputation.as_ref(), "reputation outcome")?;

        let on_file = ctx.complaints.for_npi(state.record.npi.trim());
        let text = Self::findings_text(identity, reachability, reputation);
        let complaints = self.referencer.cross_reference(on_file, &text);

        if !complaints.confirmed.is_empty() {
            tracing::info!(
                npi = %state.record.npi,
                confirmed = complaints.confirmed.len(),
                boost = complaints.lambda_boost,
                "Member complaints corroborated"
            );
        }

        let trust = self
            .scorer
            .assess(identity, reachability, reputation, &complaints);

        Ok(StageOutput::ComplaintChecked { complaints, trust })
    }

    fn fallback(&self, state: &RecordState, _ctx: &BatchContext) -> StageOutput {
        let s1 = state.identity.as_ref().map(|i| i.s1.score).unwrap_or(0.0);
        let s2 = state.reachability.as_ref().map(|r| r.s2.score).unwrap_or(0.0);
        let s3 = state.reputation.as_ref().map(|r| r.s3.score).unwrap_or(0.0);
        StageOutput::ComplaintChecked {
            complaints: ComplaintOutcome::default(),
            trust: TrustAssessment {
                s1,
                s2,
                s3,
                lambda: 0.0,
                penalties: Vec::new(),
                trust_score: 100.0 - DEFAULT_RISK_SCORE,
                risk_score: DEFAULT_RISK_SCORE,
                status: TrustStatus::Review,
            },
        }
    }
}

// ============================================================================
// Fraud
// ============================================================================

pub struct FraudStage;

#[async_trait]
impl Stage for FraudStage {
    fn name(&self) -> &'static str {
        "FraudAssessor"
    }

    fn target(&self) -> PipelineStage {
        PipelineStage::FraudAssessed
    }

    async fn run(&self, state: &RecordState, _ctx: &BatchContext) -> StageResult<StageOutput> {
        let validation = require(state.validation.as_ref(), "validation result")?;
        Ok(StageOutput::FraudAssessed(FraudAssessor.assess(validation)))
    }

    fn fallback(&self, _state: &RecordState, _ctx: &BatchContext) -> StageOutput {
        StageOutput::FraudAssessed(FraudAnalysis {
            risk_score: DEFAULT_RISK_SCORE,
            risk_level: FraudRiskLevel::Medium,
            flagged_patterns: Vec::new(),
        })
    }
}

// ============================================================================
// Decay
// ============================================================================

pub struct DecayStage;

#[async_trait]
impl Stage for DecayStage {
    fn name(&self) -> &'static str {
        "DecayEstimator"
    }

    fn target(&self) -> PipelineStage {
        PipelineStage::DecayEstimated
    }

    async fn run(&self, state: &RecordState, ctx: &BatchContext) -> StageResult<StageOutput> {
        let record = &state.record;
        let prediction = DecayEstimator::new(ctx.as_of).estimate(
            &record.specialty,
            record.last_verified.as_deref(),
            &record.state,
        );
        Ok(StageOutput::DecayEstimated(prediction))
    }

    fn fallback(&self, _state: &RecordState, ctx: &BatchContext) -> StageOutput {
        StageOutput::DecayEstimated(DecayEstimator::new(ctx.as_of).prediction_for(FALLBACK_DECAY))
    }
}

// ============================================================================
// Business impact
// ============================================================================

pub struct ImpactStage;

#[async_trait]
impl Stage for ImpactStage {
    fn name(&self) -> &'static str {
        "BusinessImpactCalculator"
    }

    fn target(&self) -> PipelineStage {
        PipelineStage::ImpactComputed
    }

    async fn run(&self, state: &RecordState, _ctx: &BatchContext) -> StageResult<StageOutput> {
        let impact = BusinessImpactCalculator.calculate(
            state.risk_score(),
            state.status(),
            state.discrepancies().len(),
        );
        Ok(StageOutput::ImpactComputed(impact))
    }

    fn fallback(&self, _state: &RecordState, _ctx: &BatchContext) -> StageOutput {
        StageOutput::ImpactComputed(BusinessImpact::default())
    }
}

// ============================================================================
// Communication trigger
// ============================================================================

/// Records a request for the external communicator; never sends anything
pub struct CommunicationStage;

#[async_trait]
impl Stage for CommunicationStage {
    fn name(&self) -> &'static str {
        "Communicator"
    }

    fn target(&self) -> PipelineStage {
        PipelineStage::Terminal
    }

    async fn run(&self, state: &RecordState, _ctx: &BatchContext) -> StageResult<StageOutput> {
        if !state.communication_required {
            return Ok(StageOutput::Communication(None));
        }

        let not_found = state
            .identity
            .as_ref()
            .is_some_and(|i| i.registry_status == LookupStatus::NotFound);
        let reason = match &state.fraud {
            Some(fraud) if fraud.risk_level == FraudRiskLevel::High => format!(
                "High fraud risk ({}): {}",
                fraud.risk_score,
                fraud.flagged_patterns.join(", ")
            ),
            _ if not_found => "NPI not found in registry".to_string(),
            _ => "Validation requires provider follow-up".to_string(),
        };

        tracing::info!(npi = %state.record.npi, reason = %reason, "Provider communication requested");
        Ok(StageOutput::Communication(Some(CommunicationRequest {
            reason,
            channel: PROVIDER_CHANNEL.to_string(),
        })))
    }

    fn fallback(&self, _state: &RecordState, _ctx: &BatchContext) -> StageOutput {
        StageOutput::Communication(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookups::{LookupSet, StaticBilling, StaticGeocoder, StaticRegistry};
    use crate::types::{ProviderRecord, RegistrySnapshot};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn snapshot() -> RegistrySnapshot {
        RegistrySnapshot {
            npi: "9912345678".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            credential: "MD".to_string(),
            specialty: "Cardiology".to_string(),
            license_state: "CA".to_string(),
            state: "CA".to_string(),
            status: "A".to_string(),
            ..Default::default()
        }
    }

    fn record() -> ProviderRecord {
        ProviderRecord {
            npi: "9912345678".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            credential: "MD".to_string(),
            specialty: "Cardiology".to_string(),
            address: "1 Main St".to_string(),
            city: "Fresno".to_string(),
            state: "CA".to_string(),
            zip: "93721".to_string(),
            ..Default::default()
        }
    }

    fn context(registry: StaticRegistry) -> BatchContext {
        let lookups = LookupSet::new(
            Arc::new(registry),
            Arc::new(StaticGeocoder::new()),
            Arc::new(StaticBilling::new().with_entry("9912345678", "Fresno", "CA")),
        );
        BatchContext::new(
            lookups,
            Duration::from_secs(1),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_identity_stage_found() {
        let ctx = context(StaticRegistry::new().with_entry(snapshot()));
        let state = RecordState::new(record());

        match IdentityStage::default().run(&state, &ctx).await.unwrap() {
            StageOutput::Validated { identity, validation } => {
                assert_eq!(identity.registry_status, LookupStatus::Found);
                assert!(validation.npi_valid);
                assert!(validation.is_consistent);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_npi_is_not_found_without_lookup() {
        let ctx = context(StaticRegistry::unavailable());
        let state = RecordState::new(ProviderRecord::default());

        match IdentityStage::default().run(&state, &ctx).await.unwrap() {
            StageOutput::Validated { identity, .. } => {
                assert_eq!(identity.registry_status, LookupStatus::NotFound);
                assert_eq!(identity.s1.score, 0.0);
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complaint_stage_requires_dimensions() {
        let ctx = context(StaticRegistry::new());
        let state = RecordState::new(record());
        let err = ComplaintStage::default().run(&state, &ctx).await.unwrap_err();
        assert!(matches!(err, StageError::MissingInput(_)));
    }

    #[test]
    fn test_findings_text_includes_every_verdict() {
        let identity = IdentityOutcome {
            s1: FindingSet::new(1.0, vec![Finding::pass("Name match")]),
            registry_status: LookupStatus::Found,
            snapshot: None,
            penalties: vec![],
        };
        let reach = ReachabilityOutcome {
            s2: FindingSet::new(
                0.3,
                vec![
                    Finding::pass("Address geocoded successfully"),
                    Finding::warn("Phone mismatch"),
                ],
            ),
            address_matched: Some(true),
            billing: None,
        };
        let rep = ReputationOutcome {
            s3: FindingSet::new(1.0, vec![Finding::fail("License state differs")]),
            license_state_matches: Some(false),
        };

        assert_eq!(
            ComplaintStage::findings_text(&identity, &reach, &rep),
            "Name match\nAddress geocoded successfully\nPhone mismatch\nLicense state differs"
        );
    }

    #[test]
    fn test_pass_findings_confirm_complaints() {
        use crate::types::{Complaint, ComplaintField};

        let identity = IdentityOutcome {
            s1: FindingSet::new(1.0, vec![Finding::pass("Name match")]),
            registry_status: LookupStatus::Found,
            snapshot: None,
            penalties: vec![],
        };
        let reach = ReachabilityOutcome {
            s2: FindingSet::new(
                1.0,
                vec![
                    Finding::pass("Address geocoded successfully: 1 MAIN ST, FRESNO, CA, 93721"),
                    Finding::pass("Phone number matches NPPES record"),
                ],
            ),
            address_matched: Some(true),
            billing: None,
        };
        let rep = ReputationOutcome {
            s3: FindingSet::new(1.0, vec![]),
            license_state_matches: Some(true),
        };
        let complaints = [
            Complaint {
                field: ComplaintField::Address,
                value: "Office closed".to_string(),
                date: None,
                notes: None,
            },
            Complaint {
                field: ComplaintField::Phone,
                value: "Disconnected".to_string(),
                date: None,
                notes: None,
            },
        ];

        let text = ComplaintStage::findings_text(&identity, &reach, &rep);
        let outcome = ComplaintCrossReferencer::default().cross_reference(&complaints, &text);

        assert_eq!(outcome.confirmed.len(), 2);
        assert!(outcome.unconfirmed.is_empty());
        assert_eq!(outcome.lambda_boost, 0.3);
    }

    #[tokio::test]
    async fn test_communication_only_when_required() {
        let ctx = context(StaticRegistry::new());
        let state = RecordState::new(record());
        match CommunicationStage.run(&state, &ctx).await.unwrap() {
            StageOutput::Communication(request) => assert!(request.is_none()),
            other => panic!("unexpected output: {:?}", other),
        }

        let state = state.apply(StageOutput::FraudAssessed(FraudAnalysis {
            risk_score: 90.0,
            risk_level: FraudRiskLevel::High,
            flagged_patterns: vec!["OIG Exclusion Match".to_string()],
        }));
        match CommunicationStage.run(&state, &ctx).await.unwrap() {
            StageOutput::Communication(Some(request)) => {
                assert_eq!(request.channel, PROVIDER_CHANNEL);
                assert!(request.reason.contains("OIG Exclusion Match"));
            }
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn test_default_stage_order() {
        let targets: Vec<PipelineStage> = default_stages().iter().map(|s| s.target()).collect();
        assert_eq!(
            targets,
            vec![
                PipelineStage::Parsed,
                PipelineStage::Validated,
                PipelineStage::Reachability,
                PipelineStage::Reputation,
                PipelineStage::ComplaintChecked,
                PipelineStage::FraudAssessed,
                PipelineStage::DecayEstimated,
                PipelineStage::ImpactComputed,
                PipelineStage::Terminal,
            ]
        );
    }
}
