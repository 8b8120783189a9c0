//! Parser stage: field normalization, NPI format check, document heuristics

use crate::types::{Finding, IntakeReport, ParsedData, ProviderRecord};

/// Prefix prepended to a 10-digit NPI before the Luhn check (ISO 7812 issuer)
const NPI_LUHN_PREFIX: &str = "80840";
/// Confidence assigned to fields pulled from raw document text
const HEURISTIC_CONFIDENCE: f64 = 0.8;

/// Normalize submitted fields in place
///
/// Trims every identity field, uppercases the state codes and reduces the
/// phone number to digits.
pub fn normalize(mut record: ProviderRecord) -> ProviderRecord {
    for field in [
        &mut record.npi,
        &mut record.first_name,
        &mut record.last_name,
        &mut record.organization_name,
        &mut record.credential,
        &mut record.license_number,
        &mut record.specialty,
        &mut record.address,
        &mut record.city,
        &mut record.zip,
    ] {
        let trimmed = field.trim();
        if trimmed.len() != field.len() {
            *field = trimmed.to_string();
        }
    }
    record.state = record.state.trim().to_uppercase();
    record.license_state = record.license_state.trim().to_uppercase();
    record.phone = record.phone.chars().filter(char::is_ascii_digit).collect();
    record
}

/// Ten digits whose Luhn check over `80840` + NPI passes
pub fn npi_format_valid(npi: &str) -> bool {
    if npi.len() != 10 || !npi.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let digits: Vec<u32> = NPI_LUHN_PREFIX
        .chars()
        .chain(npi.chars())
        .filter_map(|c| c.to_digit(10))
        .collect();

    // Double every second digit from the right, excluding the check digit
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}

/// Pull NPI and name out of raw document text
///
/// The first standalone run of exactly ten digits is taken as the NPI and
/// the first non-empty line as the name.
pub fn extract_from_text(text: &str) -> Option<ParsedData> {
    if text.trim().is_empty() {
        return None;
    }

    let extracted_npi = text
        .split(|c: char| !c.is_ascii_digit())
        .find(|run| run.len() == 10)
        .map(str::to_string);

    let extracted_name = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string);

    Some(ParsedData {
        extracted_npi,
        extracted_name,
        extracted_address: None,
        confidence: HEURISTIC_CONFIDENCE,
    })
}

/// Run intake for one record
///
/// # Arguments
/// * `record` - Record as submitted
/// * `supplied` - Extraction result from the document collaborator, if any.
///   Takes precedence over the raw-text heuristics.
///
/// # Returns
/// Normalized record, document data (if any) and the intake report
pub fn parse(
    record: ProviderRecord,
    supplied: Option<&ParsedData>,
) -> (ProviderRecord, Option<ParsedData>, IntakeReport) {
    let record = normalize(record);
    let mut findings = Vec::new();

    let npi_format_valid = npi_format_valid(&record.npi);
    if record.npi.is_empty() {
        findings.push(Finding::warn("No NPI submitted"));
    } else if !npi_format_valid {
        findings.push(Finding::warn(format!(
            "NPI '{}' fails format check (10 digits with valid check digit)",
            record.npi
        )));
    } else {
        findings.push(Finding::pass("NPI format valid"));
    }

    let parsed = match supplied {
        Some(parsed) => Some(parsed.clone()),
        None => record.document_text().and_then(extract_from_text),
    };
    if let Some(parsed) = &parsed {
        tracing::debug!(
            npi = %record.npi,
            confidence = parsed.confidence,
            "Document data attached"
        );
    }

    (
        record,
        parsed,
        IntakeReport {
            npi_format_valid,
            findings,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Verdict;
    use serde_json::Value;

    #[test]
    fn test_npi_luhn_check() {
        assert!(npi_format_valid("1234567893"));
        assert!(!npi_format_valid("1234567890"));
        assert!(!npi_format_valid("123456789"));
        assert!(!npi_format_valid("12345678AB"));
    }

    #[test]
    fn test_normalize_fields() {
        let record = ProviderRecord {
            npi: " 1234567893 ".to_string(),
            state: " ca".to_string(),
            phone: "(555) 123-4567".to_string(),
            last_name: "Doe  ".to_string(),
            ..Default::default()
        };
        let record = normalize(record);
        assert_eq!(record.npi, "1234567893");
        assert_eq!(record.state, "CA");
        assert_eq!(record.phone, "5551234567");
        assert_eq!(record.last_name, "Doe");
    }

    #[test]
    fn test_malformed_npi_only_warns() {
        let record = ProviderRecord {
            npi: "42".to_string(),
            ..Default::default()
        };
        let (record, _, report) = parse(record, None);
        assert_eq!(record.npi, "42");
        assert!(!report.npi_format_valid);
        assert_eq!(report.findings[0].verdict, Verdict::Warn);
    }

    #[test]
    fn test_extract_from_document_text() {
        let parsed =
            extract_from_text("\n  Dr. Jane Doe\nNPI: 9912345678\nPhone 555123456789").unwrap();
        assert_eq!(parsed.extracted_npi.as_deref(), Some("9912345678"));
        assert_eq!(parsed.extracted_name.as_deref(), Some("Dr. Jane Doe"));
        assert_eq!(parsed.confidence, 0.8);
    }

    #[test]
    fn test_supplied_document_wins_over_text() {
        let mut record = ProviderRecord {
            npi: "9912345678".to_string(),
            ..Default::default()
        };
        record
            .raw_payload
            .insert("document_text".to_string(), Value::from("Someone Else\n1111111111"));
        let supplied = ParsedData {
            extracted_npi: Some("9912345678".to_string()),
            extracted_name: Some("Jane Doe".to_string()),
            extracted_address: None,
            confidence: 0.95,
        };

        let (_, parsed, _) = parse(record, Some(&supplied));
        assert_eq!(parsed, Some(supplied));
    }

    #[test]
    fn test_no_document_no_parsed_data() {
        let (_, parsed, _) = parse(ProviderRecord::default(), None);
        assert!(parsed.is_none());
    }
}
