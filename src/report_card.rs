use std::collections::BTreeMap;

use crate::error::{PortalError, PortalResult};
use crate::model::{FieldType, GradeEntry, TemplateField};

/// Checks submitted values against the school's template and returns them
/// trimmed, with blank values dropped. Fields may be left out.
pub fn validate_fields(
    template: &[TemplateField],
    submitted: &BTreeMap<String, String>,
) -> PortalResult<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for (key, raw) in submitted {
        let Some(field) = template.iter().find(|f| &f.id == key) else {
            return Err(PortalError::InvalidInput(format!(
                "field {} is not part of this school's report card",
                key
            )));
        };
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        match field.field_type {
            FieldType::Number => {
                if value.parse::<f64>().is_err() {
                    return Err(PortalError::InvalidInput(format!(
                        "{} must be a number",
                        field.label
                    )));
                }
            }
            FieldType::GradeSelect => {
                let options = field.options.as_deref().unwrap_or(&[]);
                if !options.iter().any(|o| o == value) {
                    return Err(PortalError::InvalidInput(format!(
                        "{} must be one of: {}",
                        field.label,
                        options.join(", ")
                    )));
                }
            }
            FieldType::Text | FieldType::Textarea => {}
        }
        out.insert(key.clone(), value.to_string());
    }
    Ok(out)
}

pub fn validate_grades(grades: &[GradeEntry]) -> PortalResult<Vec<GradeEntry>> {
    let mut out: Vec<GradeEntry> = Vec::with_capacity(grades.len());
    for g in grades {
        let subject = g.subject.trim();
        let score = g.score.trim();
        if subject.is_empty() || score.is_empty() {
            return Err(PortalError::InvalidInput(
                "grades need both subject and score".to_string(),
            ));
        }
        if out.iter().any(|e| e.subject.eq_ignore_ascii_case(subject)) {
            return Err(PortalError::InvalidInput(format!(
                "subject {} listed twice",
                subject
            )));
        }
        out.push(GradeEntry {
            subject: subject.to_string(),
            score: score.to_string(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::default_report_card_template;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn accepts_known_fields_and_drops_blanks() {
        let t = default_report_card_template();
        let out = validate_fields(
            &t,
            &fields(&[
                ("behavior_grade", "Exemplary"),
                ("teacher_comment", "  Works hard.  "),
                ("attendance_comment", "   "),
            ]),
        )
        .expect("valid");
        assert_eq!(out.len(), 2);
        assert_eq!(out["teacher_comment"], "Works hard.");
    }

    #[test]
    fn rejects_option_outside_grade_select() {
        let t = default_report_card_template();
        let e = validate_fields(&t, &fields(&[("behavior_grade", "Excellent")]))
            .expect_err("not an option");
        assert_eq!(e.code(), "bad_params");
        assert!(e.to_string().contains("Needs Improvement"));
    }

    #[test]
    fn rejects_unknown_field_and_bad_number() {
        let mut t = default_report_card_template();
        t.push(TemplateField {
            id: "days_absent".to_string(),
            label: "Days Absent".to_string(),
            field_type: FieldType::Number,
            options: None,
        });
        assert!(validate_fields(&t, &fields(&[("conduct", "Good")])).is_err());
        assert!(validate_fields(&t, &fields(&[("days_absent", "three")])).is_err());
        assert!(validate_fields(&t, &fields(&[("days_absent", "3")])).is_ok());
    }

    #[test]
    fn grades_need_unique_subjects() {
        let g = |s: &str, v: &str| GradeEntry {
            subject: s.to_string(),
            score: v.to_string(),
        };
        assert!(validate_grades(&[g("Math", "A"), g("math", "B")]).is_err());
        assert!(validate_grades(&[g("Math", "")]).is_err());
        assert_eq!(validate_grades(&[g(" Math ", "A")]).expect("ok")[0].subject, "Math");
    }
}
