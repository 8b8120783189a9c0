//! End-to-end pipeline tests
//!
//! Drive the batch runner through the public API with in-memory lookups.

use chrono::NaiveDate;
use provtrust_common::config::{ImpactConfig, PipelineConfig};
use provtrust_engine::lookups::{LookupSet, StaticBilling, StaticGeocoder, StaticRegistry};
use provtrust_engine::types::{
    Complaint, ComplaintField, FraudRiskLevel, LookupStatus, ProviderRecord, RegistrySnapshot,
    TrustStatus, Verdict,
};
use provtrust_engine::validators::ComplaintDirectory;
use provtrust_engine::workflow::{BatchContext, BatchRunner, RecordOrchestrator};
use provtrust_engine::ExclusionList;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Test helper: registry snapshot that agrees with `provider(npi)`
fn snapshot(npi: &str) -> RegistrySnapshot {
    RegistrySnapshot {
        npi: npi.to_string(),
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        credential: "MD".to_string(),
        specialty: "Cardiology".to_string(),
        license_number: "A12345".to_string(),
        license_state: "CA".to_string(),
        address: "1 Main St".to_string(),
        city: "Fresno".to_string(),
        state: "CA".to_string(),
        zip: "93721".to_string(),
        phone: "5551234567".to_string(),
        status: "A".to_string(),
        ..Default::default()
    }
}

/// Test helper: clean submitted record
fn provider(npi: &str) -> ProviderRecord {
    ProviderRecord {
        npi: npi.to_string(),
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        credential: "MD".to_string(),
        specialty: "Cardiology".to_string(),
        license_number: "A12345".to_string(),
        license_state: "CA".to_string(),
        address: "1 Main St".to_string(),
        city: "Fresno".to_string(),
        state: "CA".to_string(),
        zip: "93721".to_string(),
        phone: "(555) 123-4567".to_string(),
        last_verified: Some("2025-05-01".to_string()),
        ..Default::default()
    }
}

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

fn lookups(registry: StaticRegistry, billing: StaticBilling) -> LookupSet {
    LookupSet::new(
        Arc::new(registry),
        Arc::new(StaticGeocoder::new()),
        Arc::new(billing),
    )
}

fn runner() -> BatchRunner {
    BatchRunner::new(&PipelineConfig::default(), ImpactConfig::default())
        .with_pacing(Duration::ZERO)
}

#[tokio::test]
async fn test_clean_record_is_verified() {
    // Given: registry, geocoder and billing all agree with the submission
    let ctx = BatchContext::new(
        lookups(
            StaticRegistry::new().with_entry(snapshot("9912345678")),
            StaticBilling::new().with_entry("9912345678", "Fresno", "CA"),
        ),
        Duration::from_secs(1),
        as_of(),
    );

    // When
    let report = runner()
        .run(vec![provider("9912345678")], &ctx, &CancellationToken::new())
        .await;

    // Then
    let row = &report.records[0];
    assert_eq!(row.status, TrustStatus::Verified);
    assert!(row.risk_score <= 35.0);
    assert_eq!(row.trust_score, 100.0);
    assert!(row.conflicts.is_empty());
    let validation = row.validation.as_ref().unwrap();
    assert!(validation.conflicts.is_empty());
    assert!(validation.is_consistent);
    assert_eq!(row.fraud.as_ref().unwrap().risk_level, FraudRiskLevel::Low);
    assert_eq!(row.impact.operational_saving, 15.0);
    assert!(!row.communication_required);
}

#[tokio::test]
async fn test_luhn_valid_clean_record_has_no_warnings() {
    // Given: a check-digit-valid NPI that every source agrees with
    let ctx = BatchContext::new(
        lookups(
            StaticRegistry::new().with_entry(snapshot("1234567893")),
            StaticBilling::new().with_entry("1234567893", "Fresno", "CA"),
        ),
        Duration::from_secs(1),
        as_of(),
    );

    // When
    let report = runner()
        .run(vec![provider("1234567893")], &ctx, &CancellationToken::new())
        .await;

    // Then: every finding passes, starting with the format check
    let row = &report.records[0];
    assert_eq!(row.status, TrustStatus::Verified);
    assert_eq!(row.trust_score, 100.0);
    assert!(row.conflicts.is_empty());
    assert!(row.errors.is_empty());
    assert_eq!(row.findings[0].text, "NPI format valid");
    assert!(row.findings.iter().all(|f| f.verdict == Verdict::Pass));
}

#[tokio::test]
async fn test_npi_not_found_is_flagged() {
    // Given: the registry has never heard of this NPI
    let ctx = BatchContext::new(
        lookups(StaticRegistry::new(), StaticBilling::new()),
        Duration::from_secs(1),
        as_of(),
    );

    // When
    let report = runner()
        .run(vec![provider("9900000000")], &ctx, &CancellationToken::new())
        .await;

    // Then
    let row = &report.records[0];
    let trust = row.trust.as_ref().unwrap();
    assert_eq!(trust.s1, 0.0);
    assert_eq!(row.status, TrustStatus::Flagged);
    assert!(row
        .findings
        .iter()
        .any(|f| f.verdict == Verdict::Fail && f.text.contains("NOT FOUND")));
    assert!(!row.validation.as_ref().unwrap().npi_valid);
    assert!(row.communication_required);
    assert!(row.communication.is_some());
}

#[tokio::test]
async fn test_cluster_risk_multiplier_over_batch() {
    // Given: 10 clean records, 4 of them on the exclusion list
    let npis: Vec<String> = (0..10).map(|i| format!("99000000{:02}", i)).collect();
    let registry = StaticRegistry::from_snapshots(npis.iter().map(|n| snapshot(n)));
    let exclusions: ExclusionList = npis.iter().take(4).collect();
    let ctx = BatchContext::new(
        lookups(registry, StaticBilling::new()),
        Duration::from_secs(1),
        as_of(),
    )
    .with_exclusions(exclusions);

    // When
    let records = npis.iter().map(|n| provider(n)).collect();
    let report = runner()
        .with_max_concurrent(4)
        .run(records, &ctx, &CancellationToken::new())
        .await;

    // Then: avg fraud risk (4 × 90) / 10 = 36, 40% HIGH > 30% → 36 × 1.5 = 54
    let high = report
        .records
        .iter()
        .filter(|r| r.fraud.as_ref().unwrap().risk_level == FraudRiskLevel::High)
        .count();
    assert_eq!(high, 4);
    assert_eq!(report.summary.high_risk_percentage, 40.0);
    assert_eq!(report.summary.portfolio_risk_score, 54.0);
}

#[tokio::test]
async fn test_registry_timeout_degrades_to_uncertain() {
    // Given: a registry slower than the lookup timeout
    let registry = StaticRegistry::new()
        .with_entry(snapshot("9912345678"))
        .with_delay(Duration::from_millis(500));
    let ctx = BatchContext::new(
        lookups(registry, StaticBilling::new()),
        Duration::from_millis(50),
        as_of(),
    );

    // When
    let started = std::time::Instant::now();
    let report = runner()
        .run(vec![provider("9912345678")], &ctx, &CancellationToken::new())
        .await;

    // Then: the record finishes without waiting for the registry
    assert!(started.elapsed() < Duration::from_millis(450));
    let row = &report.records[0];
    let trust = row.trust.as_ref().unwrap();
    assert_eq!(trust.s1, 0.3);
    assert_eq!(trust.s3, 0.3);
    assert!(row.errors.is_empty());
    assert!(row.validation.as_ref().unwrap().npi_valid);
    assert!(row
        .findings
        .iter()
        .any(|f| f.verdict == Verdict::Warn && f.text.contains("timed out")));
}

#[tokio::test]
async fn test_confirmed_complaint_raises_lambda() {
    // Given: an address complaint and an address that does not geocode
    let record = provider("9912345678");
    let geocoder = StaticGeocoder::new().with_unmatched(&record.one_line_address());
    let complaints = ComplaintDirectory::new().with_complaint(
        "9912345678",
        Complaint {
            field: ComplaintField::Address,
            value: "Office closed".to_string(),
            date: None,
            notes: None,
        },
    );
    let ctx = BatchContext::new(
        LookupSet::new(
            Arc::new(StaticRegistry::new().with_entry(snapshot("9912345678"))),
            Arc::new(geocoder),
            Arc::new(StaticBilling::new()),
        ),
        Duration::from_secs(1),
        as_of(),
    )
    .with_complaints(complaints);

    // When
    let report = runner()
        .run(vec![record], &ctx, &CancellationToken::new())
        .await;

    // Then
    let row = &report.records[0];
    let trust = row.trust.as_ref().unwrap();
    assert_eq!(trust.lambda, 0.15);
    assert!(row
        .conflicts
        .contains(&"Confirmed Complaint: address - Office closed".to_string()));
    assert!(row
        .conflicts
        .iter()
        .any(|c| c.starts_with("Address could not be geocoded")));
}

#[tokio::test]
async fn test_passing_findings_confirm_complaints() {
    // Given: a clean record whose address and phone checks both pass,
    // with member complaints on file about exactly those fields
    let complaint = |field, value: &str| Complaint {
        field,
        value: value.to_string(),
        date: None,
        notes: None,
    };
    let complaints = ComplaintDirectory::new()
        .with_complaint("1234567893", complaint(ComplaintField::Address, "Office closed"))
        .with_complaint("1234567893", complaint(ComplaintField::Phone, "Disconnected"));
    let ctx = BatchContext::new(
        lookups(
            StaticRegistry::new().with_entry(snapshot("1234567893")),
            StaticBilling::new().with_entry("1234567893", "Fresno", "CA"),
        ),
        Duration::from_secs(1),
        as_of(),
    )
    .with_complaints(complaints);

    // When
    let report = runner()
        .run(vec![provider("1234567893")], &ctx, &CancellationToken::new())
        .await;

    // Then: both complaints are corroborated by the pass findings
    let row = &report.records[0];
    assert!(row
        .findings
        .iter()
        .any(|f| f.text.starts_with("Address geocoded successfully")));
    let trust = row.trust.as_ref().unwrap();
    assert_eq!(trust.lambda, 0.3);
    assert_eq!(row.trust_score, 70.0);
    assert!(row
        .conflicts
        .contains(&"Confirmed Complaint: address - Office closed".to_string()));
    assert!(row
        .conflicts
        .contains(&"Confirmed Complaint: phone - Disconnected".to_string()));
}

#[tokio::test]
async fn test_record_failures_never_abort_batch() {
    // Given: every external source is down
    let ctx = BatchContext::new(
        LookupSet::new(
            Arc::new(StaticRegistry::unavailable()),
            Arc::new(StaticGeocoder::unavailable()),
            Arc::new(StaticBilling::unavailable()),
        ),
        Duration::from_millis(200),
        as_of(),
    );

    // When
    let report = runner()
        .run(
            vec![provider("9912345678"), ProviderRecord::default()],
            &ctx,
            &CancellationToken::new(),
        )
        .await;

    // Then: both records are reported and the summary is computed
    assert_eq!(report.records.len(), 2);
    assert!(report.summary.portfolio_risk_score >= 0.0);
    assert!(!report.brief.is_empty());
    for row in &report.records {
        assert!(row.trust.is_some());
        assert!(row.impact.total_impact >= 0.0);
    }
    // Uncertain identity is not NotFound
    let first = report.records[0].trust.as_ref().unwrap();
    assert_eq!(first.s1, 0.3);
}

#[tokio::test]
async fn test_cancellation_mid_batch_keeps_every_record() {
    // Given: a slow registry and a token cancelled shortly after start
    let registry = StaticRegistry::from_snapshots(
        (0..6).map(|i| snapshot(&format!("99000000{:02}", i))),
    )
    .with_delay(Duration::from_millis(100));
    let ctx = BatchContext::new(
        lookups(registry, StaticBilling::new()),
        Duration::from_secs(1),
        as_of(),
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    // When
    let records = (0..6).map(|i| provider(&format!("99000000{:02}", i))).collect();
    let report = runner()
        .with_max_concurrent(1)
        .run(records, &ctx, &cancel)
        .await;

    // Then: the in-flight record finished, the rest were reported as cancelled
    assert_eq!(report.records.len(), 6);
    assert!(report.records[0].errors.is_empty());
    let cancelled: Vec<_> = report
        .records
        .iter()
        .filter(|r| r.errors == vec!["batch cancelled".to_string()])
        .collect();
    assert!(!cancelled.is_empty());
    assert!(cancelled.iter().all(|r| r.status == TrustStatus::Review));
}

#[tokio::test]
async fn test_orchestrator_single_record() {
    let ctx = BatchContext::new(
        lookups(
            StaticRegistry::new().with_entry(snapshot("9912345678")),
            StaticBilling::new(),
        ),
        Duration::from_secs(1),
        as_of(),
    );

    let state = RecordOrchestrator::new()
        .process(provider("9912345678"), &ctx)
        .await;

    assert_eq!(
        state.identity.as_ref().unwrap().registry_status,
        LookupStatus::Found
    );
    // Phone normalized to digits by the parser
    assert_eq!(state.record.phone, "5551234567");
    let degradation = state.degradation.as_ref().unwrap();
    // Cardiology 0.10 × fresh 1.0 × CA 1.3
    assert_eq!(degradation.decay_probability, 0.13);
}
