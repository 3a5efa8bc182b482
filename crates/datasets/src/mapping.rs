//! Source field → canonical field mapping.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};
use crate::schema::{FieldMapping, RawRecord, Record, TargetField, TrainingObjective};

/// Ranked aliases per canonical target. Earlier entries win ties.
pub fn aliases(target: TargetField) -> &'static [&'static str] {
    match target {
        TargetField::Prompt => &["prompt", "input", "question", "text", "instruction"],
        TargetField::Completion => &["completion", "output", "answer", "response"],
        TargetField::Chosen => &["chosen", "preferred", "response_a"],
        TargetField::Rejected => &["rejected", "dispreferred", "response_b"],
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSuggestion {
    pub mappings: Vec<FieldMapping>,
    /// Targets the objective needs but no source field matched.
    pub missing: Vec<TargetField>,
}

impl MappingSuggestion {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Proposes a mapping from the given source field names. Matching ignores
/// ASCII case; the returned `source_field` keeps the source spelling.
pub fn suggest_mapping<'a, I>(fields: I, objective: TrainingObjective) -> MappingSuggestion
where
    I: IntoIterator<Item = &'a str>,
{
    let fields: Vec<&str> = fields.into_iter().collect();
    let mut out = MappingSuggestion::default();

    for &target in objective.required_targets() {
        let found = aliases(target)
            .iter()
            .find_map(|alias| fields.iter().find(|f| f.eq_ignore_ascii_case(alias)));

        match found {
            Some(field) => out.mappings.push(FieldMapping::new(*field, target)),
            None => out.missing.push(target),
        }
    }
    out
}

/// Ensures targets are unique and cover everything the objective requires.
pub fn check_mapping(mapping: &[FieldMapping], objective: TrainingObjective) -> Result<()> {
    let mut seen = BTreeSet::new();
    for m in mapping {
        if !seen.insert(m.target_field) {
            return Err(DatasetError::DuplicateTarget(m.target_field));
        }
    }

    let missing: Vec<TargetField> = objective
        .required_targets()
        .iter()
        .copied()
        .filter(|t| !seen.contains(t))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(DatasetError::IncompleteMapping { missing })
    }
}

/// Builds the canonical record for `raw`. `index` is 1-based and only used in errors.
pub fn apply_mapping(
    raw: &RawRecord,
    mapping: &[FieldMapping],
    objective: TrainingObjective,
    index: usize,
) -> Result<Record> {
    let get = |target: TargetField| -> Result<String> {
        let m = mapping
            .iter()
            .find(|m| m.target_field == target)
            .ok_or(DatasetError::IncompleteMapping { missing: vec![target] })?;
        raw.get(&m.source_field)
            .cloned()
            .ok_or_else(|| DatasetError::MissingSourceField {
                record: index,
                field: m.source_field.clone(),
            })
    };

    match objective.shape() {
        crate::schema::RecordShape::Supervised => Ok(Record::Supervised {
            prompt: get(TargetField::Prompt)?,
            completion: get(TargetField::Completion)?,
        }),
        crate::schema::RecordShape::Preference => Ok(Record::Preference {
            prompt: get(TargetField::Prompt)?,
            chosen: get(TargetField::Chosen)?,
            rejected: get(TargetField::Rejected)?,
        }),
    }
}

/// Maps every record, collecting all failures instead of stopping at the first.
pub fn convert_all(
    records: &[RawRecord],
    mapping: &[FieldMapping],
    objective: TrainingObjective,
) -> std::result::Result<Vec<Record>, Vec<String>> {
    let mut out = Vec::with_capacity(records.len());
    let mut errors = Vec::new();

    for (i, raw) in records.iter().enumerate() {
        match apply_mapping(raw, mapping, objective, i + 1) {
            Ok(rec) => out.push(rec),
            Err(e) => errors.push(e.to_string()),
        }
    }

    if errors.is_empty() {
        Ok(out)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supervised_from_question_answer() {
        let s = suggest_mapping(["question", "answer"], TrainingObjective::Supervised);
        assert!(s.is_complete());
        assert_eq!(
            s.mappings,
            vec![
                FieldMapping::new("question", TargetField::Prompt),
                FieldMapping::new("answer", TargetField::Completion),
            ]
        );
    }

    #[test]
    fn ties_resolve_to_alias_rank() {
        let s = suggest_mapping(["text", "input", "output"], TrainingObjective::Supervised);
        assert_eq!(s.mappings[0], FieldMapping::new("input", TargetField::Prompt));
    }

    #[test]
    fn preference_reports_missing_targets() {
        let s = suggest_mapping(["Prompt", "response_a"], TrainingObjective::Preference);
        assert_eq!(s.mappings.len(), 2);
        assert_eq!(s.mappings[0].source_field, "Prompt");
        assert_eq!(s.missing, vec![TargetField::Rejected]);
    }

    #[test]
    fn supervised_ignores_preference_aliases() {
        let s = suggest_mapping(["prompt", "chosen", "rejected"], TrainingObjective::Supervised);
        assert_eq!(s.missing, vec![TargetField::Completion]);
        assert!(s.mappings.iter().all(|m| m.target_field == TargetField::Prompt));
    }

    #[test]
    fn check_rejects_duplicates_and_gaps() {
        let dup = vec![
            FieldMapping::new("a", TargetField::Prompt),
            FieldMapping::new("b", TargetField::Prompt),
        ];
        assert!(matches!(
            check_mapping(&dup, TrainingObjective::Supervised),
            Err(DatasetError::DuplicateTarget(TargetField::Prompt))
        ));

        let partial = vec![FieldMapping::new("a", TargetField::Prompt)];
        assert!(matches!(
            check_mapping(&partial, TrainingObjective::Preference),
            Err(DatasetError::IncompleteMapping { missing }) if missing.len() == 2
        ));
    }

    #[test]
    fn convert_collects_every_missing_field() {
        let mapping = vec![
            FieldMapping::new("q", TargetField::Prompt),
            FieldMapping::new("a", TargetField::Completion),
        ];
        let good: RawRecord = [("q", "1+1"), ("a", "2")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let bad: RawRecord = [("q".to_string(), "x".to_string())].into_iter().collect();

        let errs = convert_all(&[good.clone(), bad.clone(), bad], &mapping, TrainingObjective::Qa)
            .unwrap_err();
        assert_eq!(errs.len(), 2);
        assert!(errs[0].starts_with("Record 2:"));

        let recs = convert_all(&[good], &mapping, TrainingObjective::Qa).unwrap();
        assert_eq!(
            recs[0],
            Record::Supervised {
                prompt: "1+1".into(),
                completion: "2".into()
            }
        );
    }
}
