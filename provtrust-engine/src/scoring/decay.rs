//! Predictive degradation
//!
//! `decay = base_rate(specialty) × recency_factor(months) × mobility(state)`,
//! capped at 0.99. The monthly freshness curve and revalidation dates are
//! derived from that single probability.

use crate::types::{DecayPoint, DegradationPrediction};
use chrono::{DateTime, Duration, NaiveDate};

/// Annual turnover base rate for unlisted specialties
pub const DEFAULT_BASE_RATE: f64 = 0.15;
/// Recency factor when the last-verified date is missing or unparseable
pub const UNKNOWN_RECENCY: f64 = 1.5;
pub const HIGH_MOBILITY_FACTOR: f64 = 1.3;
pub const MAX_DECAY: f64 = 0.99;

/// Freshness below this marks the predicted degradation month
const DEGRADED_FRESHNESS: f64 = 0.7;
const FRESHNESS_FLOOR: f64 = 0.05;
const CURVE_MONTHS: u32 = 12;

const SPECIALTY_BASE_RATES: &[(&str, f64)] = &[
    ("Internal Medicine", 0.15),
    ("Family Medicine", 0.12),
    ("Family Practice", 0.12),
    ("Cardiology", 0.10),
    ("Orthopedic Surgery", 0.10),
    ("Dermatology", 0.08),
    ("Psychiatry", 0.18),
    ("Emergency Medicine", 0.25),
    ("Urgent Care", 0.30),
    ("Physician Assistant", 0.22),
    ("Nurse Practitioner", 0.20),
    ("Physical Therapist", 0.18),
    ("Optometry", 0.10),
    ("Podiatry", 0.12),
    ("Chiropractic", 0.14),
    ("General Surgery", 0.13),
];

/// States with high provider churn
const HIGH_MOBILITY_STATES: &[&str] = &["FL", "AZ", "NV", "TX", "CA", "CO", "GA"];

pub fn base_rate(specialty: &str) -> f64 {
    let specialty = specialty.trim();
    SPECIALTY_BASE_RATES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(specialty))
        .map(|(_, rate)| *rate)
        .unwrap_or(DEFAULT_BASE_RATE)
}

/// Step function over months since the last verification
///
/// `None` (no usable date) is treated as moderate risk, never as fresh.
pub fn recency_factor(months_since_update: Option<f64>) -> f64 {
    match months_since_update {
        None => UNKNOWN_RECENCY,
        Some(m) if m > 24.0 => 2.5,
        Some(m) if m > 12.0 => 1.8,
        Some(m) if m > 6.0 => 1.3,
        Some(_) => 1.0,
    }
}

pub fn mobility_factor(state: &str) -> f64 {
    let state = state.trim().to_uppercase();
    if HIGH_MOBILITY_STATES.contains(&state.as_str()) {
        HIGH_MOBILITY_FACTOR
    } else {
        1.0
    }
}

/// Parse a last-verified value: `YYYY-MM-DD`, `MM/DD/YYYY` or RFC 3339
pub fn parse_verified_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    let head: String = raw.chars().take(10).collect();
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&head, fmt).ok())
}

/// Decay estimator anchored at an assessment date
#[derive(Debug, Clone, Copy)]
pub struct DecayEstimator {
    as_of: NaiveDate,
}

impl DecayEstimator {
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of }
    }

    /// Months (30-day) between `last_verified` and the assessment date
    pub fn months_since(&self, last_verified: Option<&str>) -> Option<f64> {
        let verified = parse_verified_date(last_verified?)?;
        Some((self.as_of - verified).num_days() as f64 / 30.0)
    }

    /// Decay probability in [0, 0.99], rounded to two decimals
    pub fn decay_probability(&self, specialty: &str, last_verified: Option<&str>, state: &str) -> f64 {
        let decay = base_rate(specialty)
            * recency_factor(self.months_since(last_verified))
            * mobility_factor(state);
        ((decay.min(MAX_DECAY)) * 100.0).round() / 100.0
    }

    pub fn estimate(&self, specialty: &str, last_verified: Option<&str>, state: &str) -> DegradationPrediction {
        let decay_probability = self.decay_probability(specialty, last_verified, state);
        self.prediction_for(decay_probability)
    }

    /// Curve and dates for a given decay probability
    pub fn prediction_for(&self, decay_probability: f64) -> DegradationPrediction {
        let decay_probability = decay_probability.clamp(0.0, MAX_DECAY);

        let curve: Vec<DecayPoint> = (1..=CURVE_MONTHS)
            .map(|month| {
                let freshness = (1.0 - decay_probability * month as f64 / CURVE_MONTHS as f64)
                    .max(FRESHNESS_FLOOR);
                DecayPoint {
                    month,
                    freshness: (freshness * 100.0).round() / 100.0,
                }
            })
            .collect();

        let predicted_degradation_date = curve
            .iter()
            .find(|p| p.freshness < DEGRADED_FRESHNESS)
            .map(|p| self.as_of + Duration::days(30 * p.month as i64))
            .unwrap_or_else(|| self.as_of + Duration::days(365));

        DegradationPrediction {
            decay_probability,
            predicted_degradation_date,
            recommended_revalidation_date: predicted_degradation_date - Duration::days(30),
            curve,
        }
    }
}
