use std::collections::BTreeMap;

use crate::model::{FieldType, SchoolConfig, TemplateField};

/// Used by schools that do not configure their own report card layout.
pub fn default_report_card_template() -> Vec<TemplateField> {
    vec![
        TemplateField {
            id: "attendance_comment".to_string(),
            label: "Attendance Comment".to_string(),
            field_type: FieldType::Textarea,
            options: None,
        },
        TemplateField {
            id: "behavior_grade".to_string(),
            label: "Behavior Grade".to_string(),
            field_type: FieldType::GradeSelect,
            options: Some(vec![
                "Exemplary".to_string(),
                "Satisfactory".to_string(),
                "Needs Improvement".to_string(),
            ]),
        },
        TemplateField {
            id: "teacher_comment".to_string(),
            label: "Teacher's Overall Comment".to_string(),
            field_type: FieldType::Textarea,
            options: None,
        },
    ]
}

#[derive(Debug, Default, Clone)]
pub struct SchoolRegistry {
    schools: BTreeMap<String, SchoolConfig>,
}

impl SchoolRegistry {
    /// Fails on a repeated school id.
    pub fn new(schools: impl IntoIterator<Item = SchoolConfig>) -> anyhow::Result<Self> {
        let mut map = BTreeMap::new();
        for s in schools {
            let id = s.id.clone();
            if map.insert(id.clone(), s).is_some() {
                anyhow::bail!("duplicate school id: {}", id);
            }
        }
        Ok(Self { schools: map })
    }

    pub fn get(&self, school_id: &str) -> Option<&SchoolConfig> {
        self.schools.get(school_id)
    }

    pub fn template(&self, school_id: &str) -> Vec<TemplateField> {
        match self.schools.get(school_id) {
            Some(s) if !s.report_card_template.is_empty() => s.report_card_template.clone(),
            _ => default_report_card_template(),
        }
    }

    pub fn len(&self) -> usize {
        self.schools.len()
    }
}
