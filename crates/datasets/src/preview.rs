use serde_json::{Map, Value};

use crate::schema::{FieldMapping, RawRecord};

pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// Projects the first `n` records onto their mapped target fields, cutting
/// long strings to `max_chars`. Source fields absent from a record are skipped.
pub fn sample(
    records: &[RawRecord],
    mapping: &[FieldMapping],
    n: usize,
    max_chars: usize,
) -> Vec<Map<String, Value>> {
    records
        .iter()
        .take(n)
        .map(|raw| {
            mapping
                .iter()
                .filter_map(|m| {
                    raw.get(&m.source_field).map(|v| {
                        (
                            m.target_field.as_str().to_string(),
                            Value::String(truncate(v, max_chars)),
                        )
                    })
                })
                .collect()
        })
        .collect()
}

/// Cuts `text` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TargetField;

    fn raw(pairs: &[(&str, &str)]) -> RawRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn projects_only_mapped_fields() {
        let records = vec![raw(&[("question", "why?"), ("answer", "because"), ("id", "7")])];
        let mapping = vec![
            FieldMapping::new("question", TargetField::Prompt),
            FieldMapping::new("answer", TargetField::Completion),
        ];

        let out = sample(&records, &mapping, 5, DEFAULT_PREVIEW_CHARS);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 2);
        assert_eq!(out[0]["prompt"], "why?");
        assert!(!out[0].contains_key("id"));
        // source untouched
        assert_eq!(records[0]["id"], "7");
    }

    #[test]
    fn bounds_count_and_length() {
        let long = "é".repeat(500);
        let records: Vec<RawRecord> = (0..10).map(|_| raw(&[("text", long.as_str())])).collect();
        let mapping = vec![FieldMapping::new("text", TargetField::Prompt)];

        let out = sample(&records, &mapping, 3, 200);
        assert_eq!(out.len(), 3);
        let s = out[0]["prompt"].as_str().unwrap();
        assert_eq!(s.chars().count(), 200);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn short_text_untouched() {
        assert_eq!(truncate("abc", 200), "abc");
    }
}
