//! Structural validation of uploaded dataset content.
//!
//! Validation never fails: malformed input is reported through
//! [`ValidationResult::errors`] so callers can show every problem at once.
//! Warnings are advisory and capped at [`ValidationConfig::warning_limit`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{DetectedFormat, RawRecord};

/// Field names accepted as the example input.
pub const INPUT_ALIASES: &[&str] = &["input", "prompt", "question", "text"];
/// Field names accepted as the example output.
pub const OUTPUT_ALIASES: &[&str] = &["output", "completion", "answer", "response"];

#[derive(Clone, Debug)]
pub struct ValidationConfig {
    pub warning_limit: usize,
    pub preview_rows: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            warning_limit: 5,
            preview_rows: 5,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub total_examples: u64,
    pub average_record_length_chars: f64,
    pub detected_fields: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub format: DetectedFormat,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Warnings dropped after `warning_limit` was reached.
    #[serde(default)]
    pub suppressed_warnings: usize,
    pub stats: ValidationStats,
    pub preview: Vec<Value>,
}

pub fn validate(format: DetectedFormat, content: &str, cfg: &ValidationConfig) -> ValidationResult {
    match format {
        DetectedFormat::Jsonl => validate_jsonl(content, cfg),
        DetectedFormat::Json => validate_json(content, cfg),
        DetectedFormat::Csv => validate_csv(content, cfg),
        DetectedFormat::Unknown => {
            let mut c = Collector::new(cfg);
            c.error("Unrecognized file format: expected JSONL, JSON or CSV".to_string());
            c.finish(format, ValidationStats::default(), vec![])
        }
    }
}

/// Parses every record of already-validated content into its raw form.
/// Unparseable lines and non-object items are skipped.
pub fn parse_records(format: DetectedFormat, content: &str) -> Vec<RawRecord> {
    match format {
        DetectedFormat::Jsonl => content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter_map(|l| match serde_json::from_str::<Value>(l) {
                Ok(Value::Object(obj)) => Some(flatten(&obj)),
                _ => None,
            })
            .collect(),
        DetectedFormat::Json => match serde_json::from_str::<Value>(content) {
            Ok(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_object().map(flatten))
                .collect(),
            _ => vec![],
        },
        DetectedFormat::Csv => {
            let mut lines = content.lines().filter(|l| !l.trim().is_empty());
            let Some(header) = lines.next() else {
                return vec![];
            };
            let header = split_csv_line(header);
            lines
                .map(|l| {
                    let cols = split_csv_line(l);
                    header
                        .iter()
                        .enumerate()
                        .map(|(i, h)| (h.clone(), cols.get(i).cloned().unwrap_or_default()))
                        .collect::<RawRecord>()
                })
                .collect()
        }
        DetectedFormat::Unknown => vec![],
    }
}

/// Flattens a JSON object so every value is a string; nested values keep their JSON text.
pub fn flatten(obj: &Map<String, Value>) -> RawRecord {
    obj.iter()
        .map(|(k, v)| (k.clone(), value_to_string(v)))
        .collect()
}

pub fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Quote-aware comma split; `""` inside quotes is an escaped quote.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if !in_quotes => in_quotes = true,
            '"' => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    fields.push(current.trim().to_string());
    fields
}

struct Collector {
    errors: Vec<String>,
    warnings: Vec<String>,
    suppressed: usize,
    limit: usize,
}

impl Collector {
    fn new(cfg: &ValidationConfig) -> Self {
        Self {
            errors: vec![],
            warnings: vec![],
            suppressed: 0,
            limit: cfg.warning_limit,
        }
    }

    fn error(&mut self, msg: String) {
        self.errors.push(msg);
    }

    fn warn(&mut self, msg: String) {
        if self.warnings.len() < self.limit {
            self.warnings.push(msg);
        } else {
            self.suppressed += 1;
        }
    }

    fn finish(self, format: DetectedFormat, stats: ValidationStats, preview: Vec<Value>) -> ValidationResult {
        ValidationResult {
            is_valid: self.errors.is_empty(),
            format,
            errors: self.errors,
            warnings: self.warnings,
            suppressed_warnings: self.suppressed,
            stats,
            preview,
        }
    }
}

/// Per-record checks shared by the JSONL and JSON validators.
struct RecordChecker<'a> {
    label: &'static str,
    preview_rows: usize,
    first_fields: Option<BTreeSet<String>>,
    fields: BTreeSet<String>,
    length_sum: usize,
    parsed: usize,
    preview: Vec<Value>,
    collector: &'a mut Collector,
}

impl<'a> RecordChecker<'a> {
    fn new(label: &'static str, cfg: &ValidationConfig, collector: &'a mut Collector) -> Self {
        Self {
            label,
            preview_rows: cfg.preview_rows,
            first_fields: None,
            fields: BTreeSet::new(),
            length_sum: 0,
            parsed: 0,
            preview: vec![],
            collector,
        }
    }

    fn check(&mut self, n: usize, value: Value) {
        let Value::Object(obj) = value else {
            self.collector
                .error(format!("{} {n}: expected a JSON object", self.label));
            return;
        };

        let keys: BTreeSet<String> = obj.keys().cloned().collect();
        if self.first_fields.is_none() {
            self.first_fields = Some(keys.clone());
        } else if let Some(first) = self.first_fields.as_ref().filter(|f| **f != keys) {
            self.collector.warn(format!(
                "{} {n}: fields {} differ from the first record's {}",
                self.label,
                fmt_fields(&keys),
                fmt_fields(first)
            ));
        }

        if !has_alias(&keys, INPUT_ALIASES) {
            self.collector.warn(format!(
                "{} {n}: no input field (expected one of {})",
                self.label,
                INPUT_ALIASES.join(", ")
            ));
        }
        if !has_alias(&keys, OUTPUT_ALIASES) {
            self.collector.warn(format!(
                "{} {n}: no output field (expected one of {})",
                self.label,
                OUTPUT_ALIASES.join(", ")
            ));
        }

        self.fields.extend(keys);
        let value = Value::Object(obj);
        self.length_sum += value.to_string().chars().count();
        self.parsed += 1;
        if self.preview.len() < self.preview_rows {
            self.preview.push(value);
        }
    }

    fn into_parts(self, total: u64) -> (ValidationStats, Vec<Value>) {
        let stats = ValidationStats {
            total_examples: total,
            average_record_length_chars: mean(self.length_sum, self.parsed),
            detected_fields: self.fields,
        };
        (stats, self.preview)
    }
}

fn validate_jsonl(content: &str, cfg: &ValidationConfig) -> ValidationResult {
    let mut c = Collector::new(cfg);
    let mut total: u64 = 0;

    let (stats, preview) = {
        let mut checker = RecordChecker::new("Line", cfg, &mut c);
        for (i, line) in content.lines().enumerate() {
            let line_no = i + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            total += 1;

            match serde_json::from_str::<Value>(line) {
                Ok(v) => checker.check(line_no, v),
                Err(e) => checker
                    .collector
                    .error(format!("Line {line_no}: invalid JSON ({e})")),
            }
        }
        checker.into_parts(total)
    };

    if total == 0 {
        c.error("No records found".to_string());
    }
    c.finish(DetectedFormat::Jsonl, stats, preview)
}

fn validate_json(content: &str, cfg: &ValidationConfig) -> ValidationResult {
    let mut c = Collector::new(cfg);

    let items = match serde_json::from_str::<Value>(content) {
        Ok(Value::Array(items)) => items,
        Ok(_) => {
            c.error("Top-level JSON value must be an array of records".to_string());
            return c.finish(DetectedFormat::Json, ValidationStats::default(), vec![]);
        }
        Err(e) => {
            c.error(format!("Invalid JSON document ({e})"));
            return c.finish(DetectedFormat::Json, ValidationStats::default(), vec![]);
        }
    };

    let total = items.len() as u64;
    let (stats, preview) = {
        let mut checker = RecordChecker::new("Item", cfg, &mut c);
        for (i, item) in items.into_iter().enumerate() {
            checker.check(i + 1, item);
        }
        checker.into_parts(total)
    };

    if total == 0 {
        c.error("No records found".to_string());
    }
    c.finish(DetectedFormat::Json, stats, preview)
}

fn validate_csv(content: &str, cfg: &ValidationConfig) -> ValidationResult {
    let mut c = Collector::new(cfg);
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();

    if lines.len() < 2 {
        c.error("CSV needs a header row and at least one data row".to_string());
        return c.finish(DetectedFormat::Csv, ValidationStats::default(), vec![]);
    }

    let header = split_csv_line(lines[0]);
    let header_set: BTreeSet<String> = header.iter().filter(|h| !h.is_empty()).cloned().collect();

    if !has_alias(&header_set, INPUT_ALIASES) {
        c.warn(format!(
            "Header: no input column (expected one of {})",
            INPUT_ALIASES.join(", ")
        ));
    }
    if !has_alias(&header_set, OUTPUT_ALIASES) {
        c.warn(format!(
            "Header: no output column (expected one of {})",
            OUTPUT_ALIASES.join(", ")
        ));
    }

    let rows = &lines[1..];
    let mut preview = Vec::new();
    for (i, row) in rows.iter().take(cfg.preview_rows).enumerate() {
        let cols = split_csv_line(row);
        if cols.len() != header.len() {
            c.warn(format!(
                "Row {}: expected {} columns, found {}",
                i + 1,
                header.len(),
                cols.len()
            ));
        }

        // pad / truncate to the header for display only
        let obj: Map<String, Value> = header
            .iter()
            .enumerate()
            .map(|(j, h)| (h.clone(), Value::String(cols.get(j).cloned().unwrap_or_default())))
            .collect();
        preview.push(Value::Object(obj));
    }

    let length_sum: usize = rows.iter().map(|r| r.chars().count()).sum();
    let stats = ValidationStats {
        total_examples: rows.len() as u64,
        average_record_length_chars: mean(length_sum, rows.len()),
        detected_fields: header_set,
    };
    c.finish(DetectedFormat::Csv, stats, preview)
}

fn has_alias(fields: &BTreeSet<String>, aliases: &[&str]) -> bool {
    fields
        .iter()
        .any(|f| aliases.iter().any(|a| f.eq_ignore_ascii_case(a)))
}

fn fmt_fields(fields: &BTreeSet<String>) -> String {
    format!("[{}]", fields.iter().cloned().collect::<Vec<_>>().join(", "))
}

fn mean(sum: usize, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(format: DetectedFormat, content: &str) -> ValidationResult {
        validate(format, content, &ValidationConfig::default())
    }

    #[test]
    fn valid_jsonl_has_no_findings() {
        let content = "{\"prompt\":\"Review: def f(): pass\",\"completion\":\"Add a docstring.\"}\n{\"prompt\":\"x=1\",\"completion\":\"Rename x.\"}";
        let r = run(DetectedFormat::Jsonl, content);
        assert!(r.is_valid);
        assert_eq!(r.stats.total_examples, 2);
        assert!(r.errors.is_empty());
        assert!(r.warnings.is_empty());
        assert_eq!(r.preview.len(), 2);
        assert_eq!(
            r.stats.detected_fields,
            ["completion", "prompt"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn truncated_line_is_an_error_and_rest_still_counted() {
        let content = "{\"input\":\"a\",\"output\":\"b\"}\n{\"input\":\"c\",\"out\n{\"input\":\"e\",\"output\":\"f\",\"extra\":1}";
        let r = run(DetectedFormat::Jsonl, content);
        assert!(!r.is_valid);
        assert_eq!(r.errors.len(), 1);
        assert!(r.errors[0].starts_with("Line 2: invalid JSON"));
        assert_eq!(r.stats.total_examples, 3);
        assert!(r.stats.detected_fields.contains("extra"));
        assert_eq!(r.preview.len(), 2);
        // line 3 drifted from line 1
        assert_eq!(r.warnings.len(), 1);
        assert!(r.warnings[0].starts_with("Line 3:"));
    }

    #[test]
    fn jsonl_non_object_line() {
        let r = run(DetectedFormat::Jsonl, "[1,2]\n");
        assert_eq!(r.errors, vec!["Line 1: expected a JSON object".to_string()]);
    }

    #[test]
    fn warnings_are_capped_and_counted() {
        let content: String = (0..10).map(|i| format!("{{\"id\":{i}}}\n")).collect();
        let r = run(DetectedFormat::Jsonl, &content);
        assert!(r.is_valid);
        assert_eq!(r.warnings.len(), 5);
        // two alias warnings per record
        assert_eq!(r.suppressed_warnings, 15);

        let cfg = ValidationConfig {
            warning_limit: 50,
            ..ValidationConfig::default()
        };
        let r = validate(DetectedFormat::Jsonl, &content, &cfg);
        assert_eq!(r.warnings.len(), 20);
        assert_eq!(r.suppressed_warnings, 0);
    }

    #[test]
    fn preview_is_bounded() {
        let content: String = (0..8)
            .map(|i| format!("{{\"prompt\":\"p{i}\",\"completion\":\"c{i}\"}}\n"))
            .collect();
        let r = run(DetectedFormat::Jsonl, &content);
        assert_eq!(r.stats.total_examples, 8);
        assert_eq!(r.preview.len(), 5);
        assert_eq!(r.preview[4]["prompt"], "p4");
    }

    #[test]
    fn empty_jsonl_is_rejected() {
        let r = run(DetectedFormat::Jsonl, "\n\n");
        assert!(!r.is_valid);
        assert_eq!(r.errors, vec!["No records found".to_string()]);
    }

    #[test]
    fn json_requires_array() {
        let r = run(DetectedFormat::Json, r#"{"prompt":"a"}"#);
        assert!(!r.is_valid);
        assert_eq!(r.errors.len(), 1);

        let r = run(DetectedFormat::Json, "[{\"question\":\"q\",\"answer\":\"a\"}, 3]");
        assert!(!r.is_valid);
        assert_eq!(r.errors, vec!["Item 2: expected a JSON object".to_string()]);
        assert_eq!(r.stats.total_examples, 2);

        let r = run(DetectedFormat::Json, "[{\"question\":\"q\",\"answer\":\"a\"}");
        assert!(r.errors[0].starts_with("Invalid JSON document"));
    }

    #[test]
    fn csv_column_mismatch_is_a_warning() {
        let r = run(DetectedFormat::Csv, "prompt,completion\n\"ok\"");
        assert!(r.is_valid);
        assert_eq!(r.warnings.len(), 1);
        assert!(r.warnings[0].contains("expected 2 columns, found 1"));
        assert_eq!(r.stats.total_examples, 1);
        assert_eq!(r.preview[0]["completion"], "");
    }

    #[test]
    fn csv_mismatch_only_checked_on_leading_rows() {
        let content = format!("prompt,completion\n{}", "a,b,c\n".repeat(7));
        let cfg = ValidationConfig {
            warning_limit: 20,
            ..Default::default()
        };

        let r = validate(DetectedFormat::Csv, &content, &cfg);
        assert!(r.is_valid);
        assert_eq!(r.suppressed_warnings, 0);
        assert_eq!(r.warnings.len(), 5);
        assert!(r.warnings[4].starts_with("Row 5:"));
        assert!(!r.warnings.iter().any(|w| w.starts_with("Row 6") || w.starts_with("Row 7")));
        assert_eq!(r.stats.total_examples, 7);

        let narrow = ValidationConfig {
            warning_limit: 20,
            preview_rows: 2,
        };
        let r = validate(DetectedFormat::Csv, &content, &narrow);
        assert_eq!(r.warnings.len(), 2);
        assert_eq!(r.preview.len(), 2);
    }

    #[test]
    fn csv_needs_two_lines() {
        let r = run(DetectedFormat::Csv, "prompt,completion\n");
        assert!(!r.is_valid);
        assert_eq!(r.errors.len(), 1);
    }

    #[test]
    fn csv_quoted_commas_and_alias_check() {
        let r = run(DetectedFormat::Csv, "body,label\n\"a, b\",x\n");
        assert!(r.is_valid);
        assert_eq!(r.warnings.len(), 2);
        assert_eq!(r.preview[0]["body"], "a, b");
    }

    #[test]
    fn unknown_format_is_single_error() {
        let r = run(DetectedFormat::Unknown, "whatever");
        assert!(!r.is_valid);
        assert_eq!(r.errors.len(), 1);
        assert!(r.preview.is_empty());
        assert_eq!(r.stats, ValidationStats::default());
    }

    #[test]
    fn parse_records_pads_csv_and_flattens_json() {
        let recs = parse_records(DetectedFormat::Csv, "prompt,completion\nhi\n");
        assert_eq!(recs[0]["completion"], "");

        let recs = parse_records(DetectedFormat::Json, r#"[{"prompt":"p","n":3,"tags":["a"]}]"#);
        assert_eq!(recs[0]["n"], "3");
        assert_eq!(recs[0]["tags"], r#"["a"]"#);
    }

    #[test]
    fn split_handles_escaped_quotes() {
        assert_eq!(
            split_csv_line(r#"a,"say ""hi""",c"#),
            vec!["a".to_string(), "say \"hi\"".to_string(), "c".to_string()]
        );
    }
}
