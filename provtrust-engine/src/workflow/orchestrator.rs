//! Record orchestrator
//!
//! Threads one record through the stage sequence. A stage that returns an
//! error or panics is contained here: the message goes on the record's
//! error list, the stage's fallback output is merged instead, and the next
//! stage runs as usual.

use super::stages::{default_stages, Stage};
use super::{BatchContext, PipelineStage, RecordState};
use crate::error::StageError;
use crate::types::ProviderRecord;
use chrono::Utc;
use futures::FutureExt;
use provtrust_common::events::{EventBus, PipelineEvent};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub struct RecordOrchestrator {
    stages: Vec<Arc<dyn Stage>>,
    events: Option<EventBus>,
}

impl Default for RecordOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordOrchestrator {
    pub fn new() -> Self {
        Self {
            stages: default_stages(),
            events: None,
        }
    }

    /// Emit stage events on `bus`
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Swap in a replacement for the stage with the same target
    ///
    /// A stage whose target is not in the sequence is ignored.
    pub fn replace_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        match self.stages.iter_mut().find(|s| s.target() == stage.target()) {
            Some(slot) => *slot = stage,
            None => tracing::warn!(
                stage = stage.name(),
                target = %stage.target(),
                "No stage with this target to replace"
            ),
        }
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage for one record
    ///
    /// Never fails: the returned state is always Terminal, with any stage
    /// failures listed in `errors`.
    pub async fn process(&self, record: ProviderRecord, ctx: &BatchContext) -> RecordState {
        let mut state = RecordState::new(record);
        let record_id = state.record.id;

        for stage in &self.stages {
            let result = AssertUnwindSafe(stage.run(&state, ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(StageError::Panicked(panic_message(payload))));

            let output = match result {
                Ok(output) => {
                    tracing::debug!(
                        npi = %state.record.npi,
                        stage = stage.name(),
                        "Stage completed"
                    );
                    self.emit(PipelineEvent::StageCompleted {
                        record_id,
                        stage: stage.target().to_string(),
                        timestamp: Utc::now(),
                    });
                    output
                }
                Err(err) => {
                    tracing::warn!(
                        npi = %state.record.npi,
                        stage = stage.name(),
                        error = %err,
                        "Stage failed, continuing with default output"
                    );
                    self.emit(PipelineEvent::StageFailed {
                        record_id,
                        stage: stage.target().to_string(),
                        error: err.to_string(),
                        timestamp: Utc::now(),
                    });
                    state.errors.push(format!("{}: {}", stage.name(), err));
                    stage.fallback(&state, ctx)
                }
            };

            state = state.apply(output);
        }

        state.stage = PipelineStage::Terminal;
        state
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(bus) = &self.events {
            bus.emit(event);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageResult;
    use crate::lookups::{LookupSet, StaticBilling, StaticGeocoder, StaticRegistry};
    use crate::types::{FraudRiskLevel, TrustStatus};
    use crate::workflow::StageOutput;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::time::Duration;

    struct FailingFraud;

    #[async_trait]
    impl Stage for FailingFraud {
        fn name(&self) -> &'static str {
            "FraudAssessor"
        }

        fn target(&self) -> PipelineStage {
            PipelineStage::FraudAssessed
        }

        async fn run(&self, _state: &RecordState, _ctx: &BatchContext) -> StageResult<StageOutput> {
            Err(StageError::Internal("rules table missing".to_string()))
        }

        fn fallback(&self, state: &RecordState, ctx: &BatchContext) -> StageOutput {
            crate::workflow::stages::FraudStage.fallback(state, ctx)
        }
    }

    struct PanickingDecay;

    #[async_trait]
    impl Stage for PanickingDecay {
        fn name(&self) -> &'static str {
            "DecayEstimator"
        }

        fn target(&self) -> PipelineStage {
            PipelineStage::DecayEstimated
        }

        async fn run(&self, _state: &RecordState, _ctx: &BatchContext) -> StageResult<StageOutput> {
            panic!("curve overflow");
        }

        fn fallback(&self, state: &RecordState, ctx: &BatchContext) -> StageOutput {
            crate::workflow::stages::DecayStage.fallback(state, ctx)
        }
    }

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

    fn record() -> ProviderRecord {
        ProviderRecord {
            npi: "9912345678".to_string(),
            first_name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            state: "CA".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_every_stage_runs_to_terminal() {
        let state = RecordOrchestrator::new().process(record(), &context()).await;

        assert_eq!(state.stage, PipelineStage::Terminal);
        assert!(state.intake.is_some());
        assert!(state.validation.is_some());
        assert!(state.trust.is_some());
        assert!(state.fraud.is_some());
        assert!(state.degradation.is_some());
        assert!(state.impact.is_some());
        assert!(state.errors.is_empty());
    }

    #[tokio::test]
    async fn test_failed_stage_uses_fallback_and_continues() {
        let orchestrator = RecordOrchestrator::new().replace_stage(Arc::new(FailingFraud));
        let state = orchestrator.process(record(), &context()).await;

        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].starts_with("FraudAssessor:"));
        let fraud = state.fraud.as_ref().unwrap();
        assert_eq!(fraud.risk_score, 50.0);
        assert_eq!(fraud.risk_level, FraudRiskLevel::Medium);
        // Later stages still ran
        assert!(state.degradation.is_some());
        assert!(state.impact.is_some());
        assert_ne!(state.status(), TrustStatus::Verified);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let bus = EventBus::new(64);
        let mut rx = bus.subscribe();
        let orchestrator = RecordOrchestrator::new()
            .with_events(bus)
            .replace_stage(Arc::new(PanickingDecay));

        let state = orchestrator.process(record(), &context()).await;

        assert_eq!(state.errors.len(), 1);
        assert!(state.errors[0].contains("curve overflow"));
        assert_eq!(state.degradation.as_ref().unwrap().decay_probability, 0.5);

        let mut failed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PipelineEvent::StageFailed { stage, .. } = event {
                failed.push(stage);
            }
        }
        assert_eq!(failed, vec!["DecayEstimated".to_string()]);
    }

    #[test]
    fn test_replace_keeps_order() {
        let orchestrator = RecordOrchestrator::new().replace_stage(Arc::new(FailingFraud));
        assert_eq!(orchestrator.stage_names().len(), 9);
        assert_eq!(orchestrator.stage_names()[5], "FraudAssessor");
    }
}
