//! Batch-level reduction over terminal record states
//!
//! Runs once, after every record in the batch is Terminal. Read-only over
//! the record states; never fails, even when every record hit errors.

use super::RecordState;
use crate::scoring::business_impact::{is_auto_approved, round2, MANUAL_MINUTES_PER_PROVIDER};
use crate::scoring::trust::{round1, FLAGGED_ABOVE};
use crate::types::{FraudRiskLevel, TrustStatus};
use chrono::{DateTime, Utc};
use provtrust_common::config::ImpactConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// High-risk share above which the cluster multiplier applies
pub const CLUSTER_THRESHOLD: f64 = 0.30;
pub const CLUSTER_MULTIPLIER: f64 = 1.5;
/// Number of discrepancy patterns reported
pub const TOP_PATTERNS: usize = 3;
/// Share of records expected to be auto-approved when estimating hours saved
pub const AUTO_APPROVE_FRACTION: f64 = 0.60;

/// Portfolio statistics for one batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_estimated_savings: f64,
    pub portfolio_risk_score: f64,
    pub high_risk_percentage: f64,
    /// Up to three conflict descriptions, most frequent first
    pub top_discrepancy_patterns: Vec<String>,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Return-on-investment view of the same batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRoi {
    pub batch_savings: f64,
    pub operational_savings: f64,
    pub denial_prevention: f64,
    pub fraud_prevention: f64,
    /// Batch savings scaled to the configured network size
    pub annualized_benefit: f64,
    /// Floored at 0
    pub roi_percentage: f64,
    pub hours_saved: f64,
    pub auto_approved_count: usize,
    pub flagged_count: usize,
    pub high_risk_count: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchAggregator;

impl BatchAggregator {
    /// Reduce record states into portfolio totals
    ///
    /// Risk is averaged over records that reached fraud assessment; the
    /// high-risk share is taken over every record in the batch.
    pub fn aggregate(&self, states: &[RecordState]) -> BatchSummary {
        // Step 1: Savings
        let total_savings: f64 = states
            .iter()
            .filter_map(|s| s.impact.as_ref())
            .map(|i| i.total_impact)
            .sum();

        // Step 2: Risk
        let risk_scores: Vec<f64> = states
            .iter()
            .filter_map(|s| s.fraud.as_ref())
            .map(|f| f.risk_score)
            .collect();
        let high_risk = states
            .iter()
            .filter(|s| {
                s.fraud
                    .as_ref()
                    .is_some_and(|f| f.risk_level == FraudRiskLevel::High)
            })
            .count();

        let avg_risk = if risk_scores.is_empty() {
            0.0
        } else {
            risk_scores.iter().sum::<f64>() / risk_scores.len() as f64
        };
        let high_fraction = if states.is_empty() {
            0.0
        } else {
            high_risk as f64 / states.len() as f64
        };
        let modifier = if high_fraction > CLUSTER_THRESHOLD {
            CLUSTER_MULTIPLIER
        } else {
            1.0
        };
        let portfolio_risk_score = round1((avg_risk * modifier).min(100.0));

        // Step 3: Discrepancy patterns
        let top_discrepancy_patterns = top_patterns(states);

        tracing::info!(
            records = states.len(),
            portfolio_risk_score,
            high_risk,
            total_savings,
            "Batch aggregated"
        );

        BatchSummary {
            total_estimated_savings: round2(total_savings),
            portfolio_risk_score,
            high_risk_percentage: round1(high_fraction * 100.0),
            top_discrepancy_patterns,
            analysis_timestamp: Utc::now(),
        }
    }

    /// ROI report for the batch
    pub fn roi(&self, states: &[RecordState], config: &ImpactConfig) -> BatchRoi {
        let mut roi = BatchRoi::default();

        for state in states {
            if let Some(impact) = &state.impact {
                roi.operational_savings += impact.operational_saving;
                roi.denial_prevention += impact.denial_prevention;
                roi.fraud_prevention += impact.fraud_prevention;
            }

            let status = state.status();
            let risk = state.risk_score();
            if is_auto_approved(status, risk) {
                roi.auto_approved_count += 1;
            }
            if status == TrustStatus::Flagged {
                roi.flagged_count += 1;
            }
            if risk > FLAGGED_ABOVE {
                roi.high_risk_count += 1;
            }
        }

        let batch_size = states.len().max(1) as f64;
        let batch_total = roi.operational_savings + roi.denial_prevention + roi.fraud_prevention;
        let annualized = batch_total * (config.network_size as f64 / batch_size);
        let roi_percentage = if config.annual_platform_cost > 0.0 {
            (annualized - config.annual_platform_cost) / config.annual_platform_cost * 100.0
        } else {
            0.0
        };
        let hours_saved =
            states.len() as f64 * (MANUAL_MINUTES_PER_PROVIDER / 60.0) * AUTO_APPROVE_FRACTION;

        BatchRoi {
            batch_savings: round2(batch_total),
            operational_savings: round2(roi.operational_savings),
            denial_prevention: round2(roi.denial_prevention),
            fraud_prevention: round2(roi.fraud_prevention),
            annualized_benefit: round2(annualized),
            roi_percentage: round1(roi_percentage.max(0.0)),
            hours_saved: round1(hours_saved),
            ..roi
        }
    }
}

/// Most frequent conflict descriptions; ties keep first-seen order
fn top_patterns(states: &[RecordState]) -> Vec<String> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for validation in states.iter().filter_map(|s| s.validation.as_ref()) {
        for conflict in &validation.conflicts {
            let description = conflict.description.as_str();
            let count = counts.entry(description).or_insert(0);
            if *count == 0 {
                order.push(description);
            }
            *count += 1;
        }
    }

    // Stable sort preserves first-seen order among equal counts
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order
        .into_iter()
        .take(TOP_PATTERNS)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BusinessImpact, ConflictDetail, FraudAnalysis, ProviderRecord, ValidationResult,
    };
    use crate::workflow::StageOutput;

    fn state_with_fraud(score: f64, level: FraudRiskLevel) -> RecordState {
        RecordState::new(ProviderRecord::default()).apply(StageOutput::FraudAssessed(
            FraudAnalysis {
                risk_score: score,
                risk_level: level,
                flagged_patterns: vec![],
            },
        ))
    }

    fn state_with_conflicts(descriptions: &[&str]) -> RecordState {
        let conflicts = descriptions
            .iter()
            .map(|d| ConflictDetail {
                field: "Name".to_string(),
                entry_value: "a".to_string(),
                reference_value: "b".to_string(),
                description: d.to_string(),
            })
            .collect();
        let mut state = RecordState::new(ProviderRecord::default());
        state.validation = Some(ValidationResult::new(true, true, false, conflicts, vec![], ""));
        state
    }

    #[test]
    fn test_cluster_multiplier_applies_above_threshold() {
        // 4 of 10 HIGH at 90, 6 LOW at 0 → avg 36, ×1.5 = 54
        let mut states: Vec<RecordState> = (0..4)
            .map(|_| state_with_fraud(90.0, FraudRiskLevel::High))
            .collect();
        states.extend((0..6).map(|_| state_with_fraud(0.0, FraudRiskLevel::Low)));

        let summary = BatchAggregator.aggregate(&states);
        assert_eq!(summary.portfolio_risk_score, 54.0);
        assert_eq!(summary.high_risk_percentage, 40.0);
    }

    #[test]
    fn test_no_multiplier_at_exactly_thirty_percent() {
        let mut states: Vec<RecordState> = (0..3)
            .map(|_| state_with_fraud(90.0, FraudRiskLevel::High))
            .collect();
        states.extend((0..7).map(|_| state_with_fraud(0.0, FraudRiskLevel::Low)));

        let summary = BatchAggregator.aggregate(&states);
        assert_eq!(summary.portfolio_risk_score, 27.0);
    }

    #[test]
    fn test_portfolio_risk_capped_at_100() {
        let states: Vec<RecordState> = (0..3)
            .map(|_| state_with_fraud(175.0, FraudRiskLevel::High))
            .collect();
        assert_eq!(BatchAggregator.aggregate(&states).portfolio_risk_score, 100.0);
    }

    #[test]
    fn test_empty_batch_is_computable() {
        let summary = BatchAggregator.aggregate(&[]);
        assert_eq!(summary.portfolio_risk_score, 0.0);
        assert_eq!(summary.high_risk_percentage, 0.0);
        assert_eq!(summary.total_estimated_savings, 0.0);
        assert!(summary.top_discrepancy_patterns.is_empty());
    }

    #[test]
    fn test_top_patterns_by_frequency_then_first_seen() {
        let states = vec![
            state_with_conflicts(&["D", "A"]),
            state_with_conflicts(&["B", "A"]),
            state_with_conflicts(&["C", "B"]),
            state_with_conflicts(&["A"]),
        ];
        let summary = BatchAggregator.aggregate(&states);
        // A×3, B×2, then D and C tie at 1; D was seen first
        assert_eq!(summary.top_discrepancy_patterns, vec!["A", "B", "D"]);
    }

    #[test]
    fn test_savings_sum_impacts() {
        let states = vec![
            RecordState::new(ProviderRecord::default())
                .apply(StageOutput::ImpactComputed(BusinessImpact::from_layers(15.0, 0.0, 0.0))),
            RecordState::new(ProviderRecord::default())
                .apply(StageOutput::ImpactComputed(BusinessImpact::from_layers(7.5, 300.0, 500.0))),
        ];
        assert_eq!(BatchAggregator.aggregate(&states).total_estimated_savings, 822.5);
    }

    #[test]
    fn test_roi_scales_to_network() {
        let states = vec![
            RecordState::new(ProviderRecord::default())
                .apply(StageOutput::ImpactComputed(BusinessImpact::from_layers(7.5, 300.0, 500.0))),
            RecordState::new(ProviderRecord::default())
                .apply(StageOutput::ImpactComputed(BusinessImpact::from_layers(7.5, 0.0, 100.0))),
        ];
        let config = ImpactConfig {
            network_size: 10_000,
            annual_platform_cost: 250_000.0,
        };
        let roi = BatchAggregator.roi(&states, &config);

        assert_eq!(roi.batch_savings, 915.0);
        assert_eq!(roi.annualized_benefit, 4_575_000.0);
        assert_eq!(roi.roi_percentage, 1730.0);
        assert_eq!(roi.hours_saved, 0.6);
        // No trust assessment: default risk 50, status Review
        assert_eq!(roi.auto_approved_count, 0);
        assert_eq!(roi.high_risk_count, 0);
    }

    #[test]
    fn test_roi_floor_at_zero() {
        let states = vec![RecordState::new(ProviderRecord::default())];
        let config = ImpactConfig {
            network_size: 10,
            annual_platform_cost: 250_000.0,
        };
        assert_eq!(BatchAggregator.roi(&states, &config).roi_percentage, 0.0);
    }
}
