//! Batch runner
//!
//! Feeds records through the orchestrator with bounded concurrency and a
//! paced start rate, then runs the aggregator once every record is
//! Terminal. Output order matches input order.

use super::aggregator::{BatchAggregator, BatchRoi, BatchSummary};
use super::{BatchContext, RecordOrchestrator, RecordState};
use crate::lookups::DirectLimiter;
use crate::scoring::trust::round1;
use crate::summary::{DeterministicSummarizer, Summarizer};
use crate::types::{
    BusinessImpact, CommunicationRequest, DegradationPrediction, Finding, FraudAnalysis,
    ProviderRecord, TrustAssessment, TrustStatus, ValidationResult,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use governor::{Quota, RateLimiter};
use provtrust_common::config::{ImpactConfig, PipelineConfig};
use provtrust_common::events::{EventBus, PipelineEvent};
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Per-record output row
#[derive(Debug, Clone, Serialize)]
pub struct RecordReport {
    pub record_id: Uuid,
    pub npi: String,
    pub name: String,
    pub specialty: String,
    pub state: String,
    pub status: TrustStatus,
    pub trust_score: f64,
    pub risk_score: f64,
    pub trust: Option<TrustAssessment>,
    pub validation: Option<ValidationResult>,
    pub fraud: Option<FraudAnalysis>,
    pub degradation: Option<DegradationPrediction>,
    pub impact: BusinessImpact,
    /// Intake, D1-D3 and complaint findings in pipeline order
    pub findings: Vec<Finding>,
    /// Discrepancies followed by processing errors
    pub conflicts: Vec<String>,
    pub errors: Vec<String>,
    pub communication_required: bool,
    pub communication: Option<CommunicationRequest>,
}

impl From<&RecordState> for RecordReport {
    fn from(state: &RecordState) -> Self {
        let record = &state.record;
        let name = match record.full_name() {
            n if n.is_empty() => record.organization_name.trim().to_string(),
            n => n,
        };

        let mut findings = Vec::new();
        if let Some(intake) = &state.intake {
            findings.extend(intake.findings.iter().cloned());
        }
        if let Some(identity) = &state.identity {
            findings.extend(identity.s1.findings.iter().cloned());
        }
        if let Some(reachability) = &state.reachability {
            findings.extend(reachability.s2.findings.iter().cloned());
        }
        if let Some(reputation) = &state.reputation {
            findings.extend(reputation.s3.findings.iter().cloned());
        }
        if let Some(complaints) = &state.complaints {
            findings.extend(complaints.findings.iter().cloned());
        }

        let mut conflicts = state.discrepancies();
        conflicts.extend(
            state
                .errors
                .iter()
                .map(|e| format!("Processing error: {}", e)),
        );

        let risk_score = state.risk_score();
        Self {
            record_id: record.id,
            npi: record.npi.clone(),
            name,
            specialty: record.specialty.clone(),
            state: record.state.clone(),
            status: state.status(),
            trust_score: round1(100.0 - risk_score),
            risk_score,
            trust: state.trust.clone(),
            validation: state.validation.clone(),
            fraud: state.fraud.clone(),
            degradation: state.degradation.clone(),
            impact: state.impact.unwrap_or_default(),
            findings,
            conflicts,
            errors: state.errors.clone(),
            communication_required: state.communication_required,
            communication: state.communication.clone(),
        }
    }
}

/// Everything produced by one batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub summary: BatchSummary,
    pub roi: BatchRoi,
    pub records: Vec<RecordReport>,
    /// Plain-text brief from the configured summarizer
    pub brief: String,
}

pub struct BatchRunner {
    orchestrator: RecordOrchestrator,
    aggregator: BatchAggregator,
    summarizer: Box<dyn Summarizer>,
    max_concurrent: usize,
    pacing: Duration,
    impact: ImpactConfig,
    events: Option<EventBus>,
}

impl BatchRunner {
    pub fn new(pipeline: &PipelineConfig, impact: ImpactConfig) -> Self {
        Self {
            orchestrator: RecordOrchestrator::new(),
            aggregator: BatchAggregator,
            summarizer: Box::new(DeterministicSummarizer),
            max_concurrent: pipeline.max_concurrent_records.max(1),
            pacing: pipeline.record_pacing(),
            impact,
            events: None,
        }
    }

    /// Use a custom orchestrator (events already set on the runner carry over)
    pub fn with_orchestrator(mut self, orchestrator: RecordOrchestrator) -> Self {
        self.orchestrator = match &self.events {
            Some(bus) => orchestrator.with_events(bus.clone()),
            None => orchestrator,
        };
        self
    }

    pub fn with_summarizer(mut self, summarizer: Box<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Emit record, stage and batch events on `bus`
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.orchestrator = self.orchestrator.with_events(bus.clone());
        self.events = Some(bus);
        self
    }

    /// Minimum interval between record starts (zero disables pacing)
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Process a batch of records
    ///
    /// # Arguments
    /// * `records` - Submitted provider records
    /// * `ctx` - Lookups and read-only snapshots shared by every record
    /// * `cancel` - Records not yet started when this fires are reported
    ///   with a "batch cancelled" error instead of being processed
    ///
    /// # Returns
    /// One report row per input record, in input order, plus the batch summary
    pub async fn run(
        &self,
        records: Vec<ProviderRecord>,
        ctx: &BatchContext,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let total = records.len();
        let limiter: Option<DirectLimiter> =
            Quota::with_period(self.pacing).map(RateLimiter::direct);

        tracing::info!(
            batch_id = %ctx.batch_id,
            records = total,
            max_concurrent = self.max_concurrent,
            pacing_ms = self.pacing.as_millis() as u64,
            "Batch started"
        );

        let states: Vec<RecordState> = stream::iter(records.into_iter().enumerate())
            .map(|(index, record)| {
                let limiter = limiter.as_ref();
                async move {
                    if cancel.is_cancelled() {
                        return RecordState::cancelled(record);
                    }
                    if let Some(limiter) = limiter {
                        let cancelled = tokio::select! {
                            _ = cancel.cancelled() => true,
                            _ = limiter.until_ready() => false,
                        };
                        if cancelled {
                            return RecordState::cancelled(record);
                        }
                    }
                    self.process_one(record, index, total, ctx).await
                }
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let summary = self.aggregator.aggregate(&states);
        let roi = self.aggregator.roi(&states, &self.impact);
        let records: Vec<RecordReport> = states.iter().map(RecordReport::from).collect();
        let brief = self.summarizer.summarize(&records, &roi);

        let cancelled = states
            .iter()
            .filter(|s| s.errors.iter().any(|e| e == "batch cancelled"))
            .count();
        tracing::info!(
            batch_id = %ctx.batch_id,
            records = total,
            cancelled,
            portfolio_risk_score = summary.portfolio_risk_score,
            total_estimated_savings = summary.total_estimated_savings,
            "Batch completed"
        );
        self.emit(PipelineEvent::BatchCompleted {
            batch_id: ctx.batch_id,
            records: total,
            portfolio_risk_score: summary.portfolio_risk_score,
            total_estimated_savings: summary.total_estimated_savings,
            timestamp: Utc::now(),
        });

        BatchReport {
            batch_id: ctx.batch_id,
            summary,
            roi,
            records,
            brief,
        }
    }

    async fn process_one(
        &self,
        record: ProviderRecord,
        index: usize,
        total: usize,
        ctx: &BatchContext,
    ) -> RecordState {
        let record_id = record.id;
        self.emit(PipelineEvent::RecordStarted {
            batch_id: ctx.batch_id,
            record_id,
            npi: record.npi.clone(),
            index,
            total,
            timestamp: Utc::now(),
        });

        let state = self.orchestrator.process(record, ctx).await;

        tracing::info!(
            npi = %state.record.npi,
            status = %state.status(),
            risk_score = state.risk_score(),
            errors = state.errors.len(),
            "Record {}/{} completed",
            index + 1,
            total
        );
        self.emit(PipelineEvent::RecordCompleted {
            batch_id: ctx.batch_id,
            record_id,
            status: state.status().to_string(),
            risk_score: state.risk_score(),
            error_count: state.errors.len(),
            timestamp: Utc::now(),
        });

        state
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookups::{LookupSet, StaticBilling, StaticGeocoder, StaticRegistry};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn context() -> BatchContext {
        let lookups = LookupSet::new(
            Arc::new(StaticRegistry::unavailable()),
            Arc::new(StaticGeocoder::new()),
            Arc::new(StaticBilling::unavailable()),
        );
        BatchContext::new(
            lookups,
            Duration::from_millis(200),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        )
    }

    fn records(n: usize) -> Vec<ProviderRecord> {
        (0..n)
            .map(|i| ProviderRecord {
                npi: format!("99123456{:02}", i),
                first_name: "Jane".to_string(),
                last_name: format!("Doe{}", i),
                state: "OH".to_string(),
                ..Default::default()
            })
            .collect()
    }

    fn runner() -> BatchRunner {
        BatchRunner::new(&PipelineConfig::default(), ImpactConfig::default())
            .with_pacing(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_output_preserves_input_order() {
        let input = records(5);
        let expected: Vec<String> = input.iter().map(|r| r.npi.clone()).collect();

        let report = runner()
            .with_max_concurrent(3)
            .run(input, &context(), &CancellationToken::new())
            .await;

        let npis: Vec<String> = report.records.iter().map(|r| r.npi.clone()).collect();
        assert_eq!(npis, expected);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_reports_every_record() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = runner().run(records(3), &context(), &cancel).await;

        assert_eq!(report.records.len(), 3);
        for row in &report.records {
            assert_eq!(row.status, TrustStatus::Review);
            assert_eq!(row.errors, vec!["batch cancelled".to_string()]);
            assert!(row
                .conflicts
                .contains(&"Processing error: batch cancelled".to_string()));
        }
    }

    #[tokio::test]
    async fn test_events_emitted_per_record_and_batch() {
        let bus = EventBus::new(256);
        let mut rx = bus.subscribe();

        runner()
            .with_events(bus)
            .run(records(2), &context(), &CancellationToken::new())
            .await;

        let mut started = 0;
        let mut completed = 0;
        let mut batch = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                PipelineEvent::RecordStarted { .. } => started += 1,
                PipelineEvent::RecordCompleted { .. } => completed += 1,
                PipelineEvent::BatchCompleted { records, .. } => {
                    assert_eq!(records, 2);
                    batch += 1;
                }
                _ => {}
            }
        }
        assert_eq!((started, completed, batch), (2, 2, 1));
    }

    #[tokio::test]
    async fn test_pacing_spaces_record_starts() {
        let started = std::time::Instant::now();
        runner()
            .with_pacing(Duration::from_millis(50))
            .with_max_concurrent(4)
            .run(records(3), &context(), &CancellationToken::new())
            .await;
        // First record starts immediately, the next two wait one period each
        assert!(started.elapsed() >= Duration::from_millis(90));
    }
}
