//! Serialization format detection.

use std::path::Path;

use crate::schema::DetectedFormat;

/// Infers the format of an uploaded file. First matching rule wins:
/// known extension, whole-document JSON, comma+newline CSV, JSON object on
/// the first non-empty line. Anything else is `Unknown`.
pub fn detect_format(file_name: &str, content: &str) -> DetectedFormat {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        Some("jsonl") => return DetectedFormat::Jsonl,
        Some("json") => return DetectedFormat::Json,
        Some("csv") => return DetectedFormat::Csv,
        _ => {}
    }

    if serde_json::from_str::<serde_json::Value>(content).is_ok() {
        return DetectedFormat::Json;
    }

    if content.contains(',') && content.contains('\n') {
        return DetectedFormat::Csv;
    }

    let first = content.lines().map(str::trim).find(|l| !l.is_empty());
    if let Some(line) = first {
        if matches!(
            serde_json::from_str::<serde_json::Value>(line),
            Ok(serde_json::Value::Object(_))
        ) {
            return DetectedFormat::Jsonl;
        }
    }

    DetectedFormat::Unknown
}
