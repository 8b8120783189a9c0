//! Shared value types for the scoring pipeline
//!
//! Everything here is plain data. Scorers produce these values; the
//! orchestrator threads them through [`RecordState`](crate::workflow::RecordState).

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ============================================================================
// Provider input
// ============================================================================

/// Provider record as submitted for validation
///
/// Field aliases accept the column names used by directory spreadsheet
/// exports (`NPI`, `First_Name`, ...). Anything unmapped lands in
/// `raw_payload`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderRecord {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default, alias = "NPI", deserialize_with = "string_or_number")]
    pub npi: String,
    #[serde(default, alias = "First_Name")]
    pub first_name: String,
    #[serde(default, alias = "Last_Name")]
    pub last_name: String,
    #[serde(default, alias = "Organization_Name")]
    pub organization_name: String,
    #[serde(default, alias = "Credential")]
    pub credential: String,
    #[serde(default, alias = "License_Number")]
    pub license_number: String,
    #[serde(default, alias = "License_State")]
    pub license_state: String,
    #[serde(default, alias = "Specialty")]
    pub specialty: String,
    #[serde(default, alias = "Address")]
    pub address: String,
    #[serde(default, alias = "City")]
    pub city: String,
    #[serde(default, alias = "State")]
    pub state: String,
    #[serde(default, alias = "ZIP", deserialize_with = "string_or_number")]
    pub zip: String,
    #[serde(default, alias = "Phone", deserialize_with = "string_or_number")]
    pub phone: String,
    /// Date the record was last verified, as submitted (parsed leniently by the decay estimator)
    #[serde(default, alias = "Last_Updated", alias = "last_updated")]
    pub last_verified: Option<String>,
    /// Set by review actions after scoring; never read by the pipeline
    #[serde(default)]
    pub review_status: Option<String>,
    #[serde(flatten)]
    pub raw_payload: Map<String, Value>,
}

impl ProviderRecord {
    /// "First Last", or empty when either part is missing
    pub fn full_name(&self) -> String {
        let first = self.first_name.trim();
        let last = self.last_name.trim();
        if first.is_empty() || last.is_empty() {
            String::new()
        } else {
            format!("{} {}", first, last)
        }
    }

    /// Raw document text attached to the submission, if any
    pub fn document_text(&self) -> Option<&str> {
        self.raw_payload
            .get("document_text")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
    }

    /// Single-line address used for geocoding
    pub fn one_line_address(&self) -> String {
        format!(
            "{}, {}, {} {}",
            self.address.trim(),
            self.city.trim(),
            self.state.trim(),
            self.zip.trim()
        )
    }
}

/// Accept `"1234567890"` and `1234567890` alike
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Fields extracted from a supporting document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsedData {
    #[serde(default)]
    pub extracted_npi: Option<String>,
    #[serde(default)]
    pub extracted_name: Option<String>,
    #[serde(default)]
    pub extracted_address: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

// ============================================================================
// Findings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Warn,
}

/// One human-readable observation from a check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub text: String,
    pub verdict: Verdict,
}

impl Finding {
    pub fn pass(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            verdict: Verdict::Pass,
        }
    }

    pub fn fail(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            verdict: Verdict::Fail,
        }
    }

    pub fn warn(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            verdict: Verdict::Warn,
        }
    }
}

/// Score in [0, 1] plus the findings that justify it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingSet {
    pub score: f64,
    pub findings: Vec<Finding>,
}

impl FindingSet {
    pub fn new(score: f64, findings: Vec<Finding>) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            findings,
        }
    }

    /// Mean of the component checks, or `empty_default` when no check ran
    pub fn from_checks(checks: &[f64], empty_default: f64, findings: Vec<Finding>) -> Self {
        let score = if checks.is_empty() {
            empty_default
        } else {
            checks.iter().sum::<f64>() / checks.len() as f64
        };
        Self::new(score, findings)
    }

    pub fn has_fail(&self) -> bool {
        self.findings.iter().any(|f| f.verdict == Verdict::Fail)
    }

    pub fn with_verdict(&self, verdict: Verdict) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.verdict == verdict)
    }
}

// ============================================================================
// Registry snapshot
// ============================================================================

/// Authoritative identity record as returned by the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySnapshot {
    pub npi: String,
    pub first_name: String,
    pub last_name: String,
    pub organization_name: String,
    pub credential: String,
    /// Primary taxonomy description
    pub specialty: String,
    pub license_number: String,
    pub license_state: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub phone: String,
    /// Enumeration status: "A" active, "D" deactivated
    pub status: String,
}

impl RegistrySnapshot {
    pub fn is_active(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("A")
    }

    pub fn is_deactivated(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case("D")
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

/// Billing activity location for an NPI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingLocation {
    pub city: String,
    pub state: String,
}

// ============================================================================
// Validation
// ============================================================================

/// Disagreement between two authoritative values for the same field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictDetail {
    pub field: String,
    pub entry_value: String,
    /// Value from the document or registry the entry was compared against
    pub reference_value: String,
    pub description: String,
}

/// Outcome of identity validation plus document/registry cross-checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub npi_valid: bool,
    pub license_valid: bool,
    pub oig_excluded: bool,
    /// Always `conflicts.is_empty()`
    pub is_consistent: bool,
    pub conflicts: Vec<ConflictDetail>,
    pub sources_checked: Vec<String>,
    pub details: String,
}

impl ValidationResult {
    pub fn new(
        npi_valid: bool,
        license_valid: bool,
        oig_excluded: bool,
        conflicts: Vec<ConflictDetail>,
        sources_checked: Vec<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            npi_valid,
            license_valid,
            oig_excluded,
            is_consistent: conflicts.is_empty(),
            conflicts,
            sources_checked,
            details: details.into(),
        }
    }
}

// ============================================================================
// Fraud, decay, impact
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FraudRiskLevel {
    Low,
    Medium,
    High,
}

impl FraudRiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudRiskLevel::Low => "LOW",
            FraudRiskLevel::Medium => "MEDIUM",
            FraudRiskLevel::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAnalysis {
    /// Unclamped sum of rule contributions
    pub risk_score: f64,
    pub risk_level: FraudRiskLevel,
    pub flagged_patterns: Vec<String>,
}

/// Point on the monthly freshness curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayPoint {
    /// 1-based months from the assessment date
    pub month: u32,
    /// Probability the record is still accurate
    pub freshness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradationPrediction {
    /// In [0, 0.99]
    pub decay_probability: f64,
    pub predicted_degradation_date: NaiveDate,
    pub recommended_revalidation_date: NaiveDate,
    pub curve: Vec<DecayPoint>,
}

/// Three-layer dollar estimate; `total_impact` is always the layer sum
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessImpact {
    pub operational_saving: f64,
    pub denial_prevention: f64,
    pub fraud_prevention: f64,
    pub total_impact: f64,
}

impl BusinessImpact {
    pub fn from_layers(operational_saving: f64, denial_prevention: f64, fraud_prevention: f64) -> Self {
        let operational_saving = operational_saving.max(0.0);
        let denial_prevention = denial_prevention.max(0.0);
        let fraud_prevention = fraud_prevention.max(0.0);
        Self {
            operational_saving,
            denial_prevention,
            fraud_prevention,
            total_impact: operational_saving + denial_prevention + fraud_prevention,
        }
    }
}

// ============================================================================
// Trust scoring
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrustStatus {
    Verified,
    Review,
    Flagged,
}

impl TrustStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustStatus::Verified => "Verified",
            TrustStatus::Review => "Review",
            TrustStatus::Flagged => "Flagged",
        }
    }
}

impl std::fmt::Display for TrustStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason a λ contribution was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltySource {
    NotFound,
    Deactivated,
    JointReachabilityReputation,
    Complaints,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyContribution {
    pub source: PenaltySource,
    pub amount: f64,
}

impl PenaltyContribution {
    pub fn new(source: PenaltySource, amount: f64) -> Self {
        Self { source, amount }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustAssessment {
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
    /// Effective λ after capping
    pub lambda: f64,
    pub penalties: Vec<PenaltyContribution>,
    pub trust_score: f64,
    pub risk_score: f64,
    pub status: TrustStatus,
}

// ============================================================================
// Complaints
// ============================================================================

/// Field a member complaint is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplaintField {
    #[serde(alias = "Phone")]
    Phone,
    #[serde(alias = "Address")]
    Address,
    #[serde(alias = "Specialty")]
    Specialty,
    #[serde(alias = "Name")]
    Name,
    #[serde(other)]
    General,
}

impl ComplaintField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintField::Phone => "phone",
            ComplaintField::Address => "address",
            ComplaintField::Specialty => "specialty",
            ComplaintField::Name => "name",
            ComplaintField::General => "general",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    #[serde(alias = "field_reported")]
    pub field: ComplaintField,
    #[serde(default, alias = "reported_value")]
    pub value: String,
    #[serde(default, alias = "complaint_date")]
    pub date: Option<String>,
    #[serde(default, alias = "member_notes")]
    pub notes: Option<String>,
}

/// Result of matching on-file complaints against validation findings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplaintOutcome {
    pub confirmed: Vec<Complaint>,
    pub unconfirmed: Vec<Complaint>,
    /// Capped contribution to λ
    pub lambda_boost: f64,
    pub findings: Vec<Finding>,
}

// ============================================================================
// Stage outputs
// ============================================================================

/// How an external lookup resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    Found,
    NotFound,
    /// Timed out or errored
    Uncertain,
}

/// Parser stage report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntakeReport {
    /// Ten digits with a valid check digit
    pub npi_format_valid: bool,
    pub findings: Vec<Finding>,
}

/// D1 output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityOutcome {
    pub s1: FindingSet,
    pub registry_status: LookupStatus,
    /// Registry record, reused by D2/D3
    pub snapshot: Option<RegistrySnapshot>,
    pub penalties: Vec<PenaltyContribution>,
}

/// D2 output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachabilityOutcome {
    pub s2: FindingSet,
    /// `None` when the geocoder could not answer
    pub address_matched: Option<bool>,
    pub billing: Option<BillingLocation>,
}

/// D3 output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationOutcome {
    pub s3: FindingSet,
    /// `None` when there was no registry data to compare
    pub license_state_matches: Option<bool>,
}

/// Request for the external communicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationRequest {
    pub reason: String,
    pub channel: String,
}
