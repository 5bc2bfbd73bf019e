//! Integrity checks over the canonical wallet file
//!
//! Runs on raw JSON so that absent fields can be told apart from zeroes.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use super::summary::FleetSummary;

/// Fields every record must carry
pub const REQUIRED_FIELDS: &[&str] = &[
    "leoName",
    "address",
    "score",
    "totalTrades",
    "profitableTrades",
    "profitRate",
    "totalPnl",
    "highestTrade",
    "avgHoldTime",
    "tokenDiversity",
    "lastActivity",
    "daysSinceActive",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub severity: Severity,
    /// Display id, or `Wallet {index}` when the record has none
    pub subject: String,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN ",
        };
        write!(f, "{} {}: {}", marker, self.subject, self.message)
    }
}

/// Outcome of a validation run
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
    pub summary: FleetSummary,
}

impl ValidationReport {
    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    pub fn is_ok(&self) -> bool {
        self.errors() == 0
    }

    /// Findings about one subject
    pub fn for_subject(&self, subject: &str) -> Vec<&Finding> {
        self.findings.iter().filter(|f| f.subject == subject).collect()
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

/// Validate every record of a wallet file
pub fn validate_records(records: &[Value], id_prefix: &str) -> ValidationReport {
    let id_pattern = Regex::new(&format!(r"^{}-\d{{3,}}$", regex::escape(id_prefix))).ok();

    let mut report = ValidationReport::default();
    let mut addresses: HashMap<&str, usize> = HashMap::new();
    let mut display_ids: HashMap<&str, usize> = HashMap::new();

    for (idx, record) in records.iter().enumerate() {
        let subject = subject_of(record, idx);
        let mut push = |severity, message: String| {
            report.findings.push(Finding {
                severity,
                subject: subject.clone(),
                message,
            })
        };

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| record.get(*field).is_none())
            .collect();
        if !missing.is_empty() {
            push(Severity::Error, format!("Missing fields: {}", missing.join(", ")));
        }

        let total = number(record, "totalTrades");
        let profitable = number(record, "profitableTrades");
        let rate = number(record, "profitRate");
        let last_activity = number(record, "lastActivity");

        if total == Some(0.0) && last_activity.map(|t| t != 0.0).unwrap_or(false) {
            push(Severity::Warning, "Has lastActivity but 0 trades".to_string());
        }

        if let (Some(profitable), Some(total)) = (profitable, total) {
            if profitable > total {
                push(
                    Severity::Error,
                    format!(
                        "Profitable trades ({}) > Total trades ({})",
                        profitable, total
                    ),
                );
            }
        }

        if let Some(rate) = rate {
            if !(0.0..=100.0).contains(&rate) {
                push(Severity::Error, format!("Invalid win rate: {}%", rate));
            }
        }

        if let Some(address) = record.get("address").and_then(Value::as_str) {
            if bs58::decode(address).into_vec().is_err() {
                push(Severity::Warning, format!("Address is not base58: {}", address));
            }
            *addresses.entry(address).or_default() += 1;
        }

        if let Some(id) = record.get("leoName").and_then(Value::as_str) {
            if id_pattern.as_ref().map(|p| !p.is_match(id)).unwrap_or(false) {
                push(Severity::Warning, format!("Unexpected display id format: {}", id));
            }
            *display_ids.entry(id).or_default() += 1;
        }
    }

    for (address, seen) in addresses.iter().filter(|(_, n)| **n > 1) {
        report.findings.push(Finding {
            severity: Severity::Error,
            subject: address.to_string(),
            message: format!("Address appears {} times", seen),
        });
    }

    for (id, seen) in display_ids.iter().filter(|(_, n)| **n > 1) {
        report.findings.push(Finding {
            severity: Severity::Error,
            subject: id.to_string(),
            message: format!("Display id used by {} records", seen),
        });
    }

    report.summary = FleetSummary::from_stats(records.iter().map(|r| {
        (
            number(r, "totalTrades").unwrap_or(0.0).max(0.0) as u64,
            number(r, "profitRate").unwrap_or(0.0),
            number(r, "totalPnl").unwrap_or(0.0),
        )
    }));

    report
}

fn subject_of(record: &Value, idx: usize) -> String {
    record
        .get("leoName")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Wallet {}", idx))
}

fn number(record: &Value, field: &str) -> Option<f64> {
    record.get(field).and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete(id: &str, address: &str) -> Value {
        json!({
            "leoName": id,
            "address": address,
            "score": 50,
            "totalTrades": 10,
            "profitableTrades": 4,
            "profitRate": 40.0,
            "totalPnl": 1.5,
            "highestTrade": 0.8,
            "avgHoldTime": 45,
            "tokenDiversity": 6,
            "lastActivity": 1_700_000_000_000i64,
            "daysSinceActive": 1.2
        })
    }

    #[test]
    fn test_clean_file_passes() {
        let records = vec![
            complete("LEO-001", "JESUSL2s5BsffGNNn6wQtHART2iXVGjtGhKAwGw44bL"),
            complete("LEO-002", "7zujqoQsFic14ncDYhBSVGvDnqc94rE49c1ZJCHvAtiW"),
        ];
        let report = validate_records(&records, "LEO");
        assert!(report.is_ok(), "{:?}", report.findings);
        assert_eq!(report.warnings(), 0);
        assert_eq!(report.summary.wallets, 2);
        assert!((report.summary.avg_win_rate - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_profitable_exceeding_total_is_one_error() {
        let mut record = complete("LEO-001", "JESUSL2s5BsffGNNn6wQtHART2iXVGjtGhKAwGw44bL");
        record["profitableTrades"] = json!(5);
        record["totalTrades"] = json!(3);

        let report = validate_records(&[record], "LEO");
        assert_eq!(report.errors(), 1);
        assert_eq!(report.for_subject("LEO-001").len(), 1);
        assert!(!report.is_ok());
    }

    #[test]
    fn test_out_of_range_profit_rate_is_one_error() {
        let mut record = complete("LEO-001", "JESUSL2s5BsffGNNn6wQtHART2iXVGjtGhKAwGw44bL");
        record["profitRate"] = json!(150);

        let report = validate_records(&[record], "LEO");
        assert_eq!(report.errors(), 1);
        assert!(report.findings[0].message.contains("150"));
    }

    #[test]
    fn test_missing_fields_reported_once() {
        let record = json!({ "address": "JESUSL2s5BsffGNNn6wQtHART2iXVGjtGhKAwGw44bL" });
        let report = validate_records(&[record], "LEO");
        assert_eq!(report.errors(), 1);
        assert_eq!(report.findings[0].subject, "Wallet 0");
        assert!(report.findings[0].message.contains("leoName"));
    }

    #[test]
    fn test_idle_wallet_with_activity_warns() {
        let mut record = complete("LEO-001", "JESUSL2s5BsffGNNn6wQtHART2iXVGjtGhKAwGw44bL");
        record["totalTrades"] = json!(0);
        record["profitableTrades"] = json!(0);

        let report = validate_records(&[record], "LEO");
        assert!(report.is_ok());
        assert_eq!(report.warnings(), 1);
    }

    #[test]
    fn test_duplicates_are_errors() {
        let records = vec![
            complete("LEO-001", "JESUSL2s5BsffGNNn6wQtHART2iXVGjtGhKAwGw44bL"),
            complete("LEO-001", "JESUSL2s5BsffGNNn6wQtHART2iXVGjtGhKAwGw44bL"),
        ];
        let report = validate_records(&records, "LEO");
        assert_eq!(report.errors(), 2);
    }

    #[test]
    fn test_format_warnings() {
        let record = complete("leo_1", "not-base58-0OIl");
        let report = validate_records(&[record], "LEO");
        assert!(report.is_ok());
        assert_eq!(report.warnings(), 2);
    }
}
