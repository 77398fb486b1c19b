//! Terminal output formatting

use crate::client::ModelStatusRow;
use chrono::Utc;
use colored::Colorize;
use std::collections::BTreeMap;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "MODEL")]
    model: String,
    #[tabled(rename = "LOADED")]
    loaded: String,
    #[tabled(rename = "LAST TRAINED")]
    last_trained: String,
    #[tabled(rename = "STALENESS")]
    staleness: String,
}

/// Render the model status map as a table.
pub fn status_table(status: &BTreeMap<String, ModelStatusRow>) -> String {
    let rows: Vec<StatusRow> = status
        .iter()
        .map(|(model, row)| StatusRow {
            model: model.clone(),
            loaded: if row.is_loaded {
                "yes".green().to_string()
            } else {
                "no".red().to_string()
            },
            last_trained: row
                .last_trained
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".dimmed().to_string()),
            staleness: row
                .last_trained
                .map(|t| humanize_secs((Utc::now() - t).num_seconds().max(0)))
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Compact duration rendering for staleness columns.
pub fn humanize_secs(secs: i64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else if secs < 86_400 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d{}h", secs / 86_400, (secs % 86_400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_humanize_secs() {
        assert_eq!(humanize_secs(42), "42s");
        assert_eq!(humanize_secs(125), "2m5s");
        assert_eq!(humanize_secs(7260), "2h1m");
        assert_eq!(humanize_secs(90_000), "1d1h");
    }

    #[test]
    fn test_status_table_contains_models() {
        let mut status = BTreeMap::new();
        status.insert(
            "price_prediction".to_string(),
            ModelStatusRow {
                is_loaded: true,
                last_trained: Some(Utc::now() - Duration::minutes(5)),
            },
        );
        status.insert(
            "credit_risk".to_string(),
            ModelStatusRow {
                is_loaded: false,
                last_trained: None,
            },
        );

        let table = status_table(&status);
        assert!(table.contains("price_prediction"));
        assert!(table.contains("credit_risk"));
        assert!(table.contains("never"));
    }
}
