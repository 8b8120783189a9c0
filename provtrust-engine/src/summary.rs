//! Batch brief generation
//!
//! Consumes the finished report rows; nothing in the scoring path depends
//! on a summarizer being present.

use crate::scoring::trust::FLAGGED_ABOVE;
use crate::workflow::aggregator::BatchRoi;
use crate::workflow::batch::RecordReport;
use chrono::Local;
use std::collections::HashMap;

/// Turns a finished batch into prose
pub trait Summarizer: Send + Sync {
    fn summarize(&self, records: &[RecordReport], roi: &BatchRoi) -> String;
}

/// Plain-text brief built from counts only
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicSummarizer;

impl Summarizer for DeterministicSummarizer {
    fn summarize(&self, records: &[RecordReport], roi: &BatchRoi) -> String {
        let mut lines = vec![
            format!(
                "Validation cycle: {}",
                Local::now().format("%b %d, %Y %I:%M %p")
            ),
            format!(
                "Processed {} providers | Auto-approved: {} | Flagged: {} | High-risk: {}",
                records.len(),
                roi.auto_approved_count,
                roi.flagged_count,
                roi.high_risk_count
            ),
            String::new(),
        ];

        // Highest-risk first; ties keep input order
        let mut by_risk: Vec<&RecordReport> = records.iter().collect();
        by_risk.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
        let high_risk: Vec<String> = by_risk
            .iter()
            .take(3)
            .filter(|r| r.risk_score > FLAGGED_ABOVE)
            .map(|r| format!("{} (NPI: {}, risk: {})", r.name, r.npi, r.risk_score))
            .collect();
        if !high_risk.is_empty() {
            lines.push(format!("HIGH-RISK PROVIDERS: {}", high_risk.join(", ")));
        }

        lines.push("FINANCIAL IMPACT".to_string());
        lines.push(format!("  Batch savings: ${}", dollars(roi.batch_savings)));
        lines.push(format!(
            "  Operational: ${} | Denial prevention: ${} | Fraud mitigation: ${}",
            dollars(roi.operational_savings),
            dollars(roi.denial_prevention),
            dollars(roi.fraud_prevention)
        ));
        lines.push(format!(
            "  Annualized: ${}/yr | ROI: {:.0}%",
            dollars(roi.annualized_benefit),
            roi.roi_percentage
        ));

        let regions = top_states(records, 3);
        if !regions.is_empty() {
            let regions: Vec<String> = regions
                .iter()
                .map(|(state, count)| format!("{}: {}", state, count))
                .collect();
            lines.push(String::new());
            lines.push(format!("TOP REGIONS: {}", regions.join(", ")));
        }

        let discrepancies: usize = records.iter().map(|r| r.conflicts.len()).sum();
        if discrepancies > 0 {
            lines.push(format!(
                "DISCREPANCIES: {} total across {} flagged providers",
                discrepancies, roi.flagged_count
            ));
        }

        lines.join("\n")
    }
}

/// States by record count, most common first; ties keep first-seen order
fn top_states(records: &[RecordReport], n: usize) -> Vec<(&str, usize)> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        let state = record.state.as_str();
        if state.is_empty() {
            continue;
        }
        let count = counts.entry(state).or_insert(0);
        if *count == 0 {
            order.push(state);
        }
        *count += 1;
    }
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.into_iter().take(n).map(|s| (s, counts[s])).collect()
}

/// Whole dollars with thousands separators
fn dollars(amount: f64) -> String {
    let whole = amount.round().abs() as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if amount < 0.0 && whole > 0 {
        format!("-{}", out)
    } else {
        out
    }
}
