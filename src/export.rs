//! Read-only renderings of a [`Dataset`].

use crate::error::{ReconcileError, Result};
use crate::schema::Dataset;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const LABEL_HEADER: &str = "Particulars";

#[derive(Serialize)]
struct DatasetView<'a> {
    currency: &'a str,
    unit: &'a str,
    years: Vec<String>,
    rows: Vec<RowView<'a>>,
}

#[derive(Serialize)]
struct RowView<'a> {
    key: &'a str,
    name: &'a str,
    values: BTreeMap<String, &'a str>,
}

impl Dataset {
    fn header(&self) -> Vec<String> {
        std::iter::once(LABEL_HEADER.to_string())
            .chain(self.periods().iter().map(|p| p.to_string()))
            .collect()
    }

    /// `{currency, unit, years, rows: [{key, name, values: {year: value}}]}`
    pub fn to_json(&self) -> Result<String> {
        let years: Vec<String> = self.periods().iter().map(|p| p.to_string()).collect();
        let rows = self
            .rows()
            .iter()
            .map(|row| RowView {
                key: row.key(),
                name: row.label(),
                values: years
                    .iter()
                    .cloned()
                    .zip(row.cells().iter().map(String::as_str))
                    .collect(),
            })
            .collect();

        let view = DatasetView {
            currency: self.currency(),
            unit: self.unit(),
            years,
            rows,
        };
        Ok(serde_json::to_string_pretty(&view)?)
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        self.write_records(&mut writer)?;
        let bytes = writer
            .into_inner()
            .map_err(|e| ReconcileError::Export(e.to_string()))?;
        String::from_utf8(bytes)
            .map_err(|e| ReconcileError::Export(e.to_string()))
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        self.write_records(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn write_records<W: std::io::Write>(&self, writer: &mut csv::Writer<W>) -> Result<()> {
        writer.write_record(self.header())?;
        for row in self.rows() {
            writer.write_record(
                std::iter::once(row.label()).chain(row.cells().iter().map(String::as_str)),
            )?;
        }
        Ok(())
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str("# Income Statement\n\n");
        output.push_str(&format!(
            "**Currency:** {} | **Unit:** {}\n\n",
            self.currency(),
            self.unit()
        ));

        let header = self.header();
        output.push_str(&format!("| {} |\n", header.join(" | ")));
        output.push_str(&format!("|{}\n", "---|".repeat(header.len())));

        for row in self.rows() {
            output.push_str(&format!("| {} | {} |\n", row.label(), row.cells().join(" | ")));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CanonicalPeriod, DatasetRow, SENTINEL};

    fn dataset() -> Dataset {
        Dataset::from_parts(
            "INR".to_string(),
            "crore".to_string(),
            vec![CanonicalPeriod::new(2023), CanonicalPeriod::new(2024)],
            vec![
                DatasetRow::new(
                    "revenue".to_string(),
                    "Revenue from operations".to_string(),
                    vec!["1000".to_string(), "1250".to_string()],
                ),
                DatasetRow::new(
                    "finance costs, net".to_string(),
                    "Finance costs, net".to_string(),
                    vec![SENTINEL.to_string(), "-12".to_string()],
                ),
            ],
        )
    }

    #[test]
    fn test_to_csv() {
        let csv = dataset().to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Particulars,2023,2024");
        assert_eq!(lines[1], "Revenue from operations,1000,1250");
        assert_eq!(lines[2], "\"Finance costs, net\",MISSING,-12");
    }

    #[test]
    fn test_to_markdown() {
        let md = dataset().to_markdown();
        assert!(md.contains("**Currency:** INR | **Unit:** crore"));
        assert!(md.contains("| Particulars | 2023 | 2024 |"));
        assert!(md.contains("|---|---|---|"));
        assert!(md.contains("| Revenue from operations | 1000 | 1250 |"));
    }

    #[test]
    fn test_to_json() {
        let json: serde_json::Value = serde_json::from_str(&dataset().to_json().unwrap()).unwrap();
        assert_eq!(json["currency"], "INR");
        assert_eq!(json["years"], serde_json::json!(["2023", "2024"]));
        assert_eq!(json["rows"][0]["key"], "revenue");
        assert_eq!(json["rows"][0]["name"], "Revenue from operations");
        assert_eq!(json["rows"][0]["values"]["2024"], "1250");
        assert_eq!(json["rows"][1]["values"]["2023"], SENTINEL);
    }
}
