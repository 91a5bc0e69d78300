//! Report output produced when a walkthrough ends.
//!
//! Verticals render an ended session either as CSV or as JSON; callers only
//! need the bytes and a suggested filename.

use serde::Serialize;

/// A report rendered from an ended walkthrough session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutput {
    Csv { bytes: Vec<u8>, filename: String },
    Json { bytes: Vec<u8>, filename: String },
}

impl ReportOutput {
    /// Serializes `value` as pretty JSON. Returns `None` if serialization fails.
    pub fn json<T: Serialize>(value: &T, filename: impl Into<String>) -> Option<Self> {
        match serde_json::to_vec_pretty(value) {
            Ok(bytes) => Some(ReportOutput::Json {
                bytes,
                filename: filename.into(),
            }),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize JSON report");
                None
            }
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            ReportOutput::Csv { filename, .. } | ReportOutput::Json { filename, .. } => filename,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            ReportOutput::Csv { bytes, .. } | ReportOutput::Json { bytes, .. } => bytes,
        }
    }
}

/// Minimal CSV writer: quotes every field that needs it, CRLF-free.
#[derive(Debug, Default)]
pub struct CsvWriter {
    out: String,
}

impl CsvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row<I, S>(&mut self, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let line: Vec<String> = fields
            .into_iter()
            .map(|field| escape_field(field.as_ref()))
            .collect();
        self.out.push_str(&line.join(","));
        self.out.push('\n');
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out.into_bytes()
    }
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_escapes_commas_quotes_and_newlines() {
        let mut csv = CsvWriter::new();
        csv.row(["plain", "a,b", "say \"hi\"", "two\nlines"]);
        let text = String::from_utf8(csv.into_bytes()).unwrap();
        assert_eq!(text, "plain,\"a,b\",\"say \"\"hi\"\"\",\"two\nlines\"\n");
    }

    #[test]
    fn test_report_accessors() {
        let report = ReportOutput::json(&serde_json::json!({"k": 1}), "r.json").unwrap();
        assert_eq!(report.filename(), "r.json");
        let parsed: serde_json::Value = serde_json::from_slice(report.bytes()).unwrap();
        assert_eq!(parsed["k"], 1);
    }
}
