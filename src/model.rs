use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::PortalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Student,
    Parent,
    Teacher,
    Administrator,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Student,
        Role::Parent,
        Role::Teacher,
        Role::Administrator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Parent => "Parent",
            Role::Teacher => "Teacher",
            Role::Administrator => "Administrator",
        }
    }

    /// Wire strings are matched case-insensitively; `Admin` is accepted as a
    /// short form of `Administrator`.
    pub fn parse(raw: &str) -> Result<Role, PortalError> {
        let t = raw.trim();
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(t))
            .or_else(|| t.eq_ignore_ascii_case("admin").then_some(Role::Administrator))
            .ok_or_else(|| PortalError::UnknownRole(t.to_string()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Role {
    type Error = PortalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Role::parse(&value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affiliation {
    pub user_id: u64,
    pub role: Role,
    pub school_id: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchoolType {
    Elementary,
    Secondary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolFeatures {
    #[serde(default)]
    pub school_bus_tracking: bool,
    #[serde(default)]
    pub college_counseling_portal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Textarea,
    GradeSelect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateField {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolConfig {
    pub id: String,
    pub name: String,
    pub primary_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    pub school_type: SchoolType,
    #[serde(default)]
    pub features: SchoolFeatures,
    #[serde(default)]
    pub report_card_template: Vec<TemplateField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub subject: String,
    pub score: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub present: u32,
    pub tardy: u32,
    pub absent: u32,
}

impl Attendance {
    /// Share of recorded days marked present (tardy counts as present).
    pub fn present_rate(&self) -> Option<f64> {
        let total = self.present + self.tardy + self.absent;
        if total == 0 {
            return None;
        }
        Some(100.0 * f64::from(self.present + self.tardy) / f64::from(total))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableSlot {
    pub day: String,
    pub time: String,
    pub subject: String,
    pub teacher: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub grades: Vec<GradeEntry>,
    #[serde(default)]
    pub attendance: Attendance,
    #[serde(default)]
    pub timetable: Vec<TimetableSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teaches_grades: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Administrator {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum User {
    Student(Student),
    Parent(Parent),
    Teacher(Teacher),
    Administrator(Administrator),
}

impl User {
    pub fn id(&self) -> u64 {
        match self {
            User::Student(u) => u.id,
            User::Parent(u) => u.id,
            User::Teacher(u) => u.id,
            User::Administrator(u) => u.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            User::Student(u) => &u.name,
            User::Parent(u) => &u.name,
            User::Teacher(u) => &u.name,
            User::Administrator(u) => &u.name,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            User::Student(_) => Role::Student,
            User::Parent(_) => Role::Parent,
            User::Teacher(_) => Role::Teacher,
            User::Administrator(_) => Role::Administrator,
        }
    }

    pub fn as_student(&self) -> Option<&Student> {
        match self {
            User::Student(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_parent(&self) -> Option<&Parent> {
        match self {
            User::Parent(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_teacher(&self) -> Option<&Teacher> {
        match self {
            User::Teacher(t) => Some(t),
            _ => None,
        }
    }
}

/// Compact reference used in lists (children, rosters, contacts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: u64,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
}

impl From<&User> for UserRef {
    fn from(u: &User) -> Self {
        UserRef {
            id: u.id(),
            name: u.name().to_string(),
            role: u.role(),
            grade_level: u.as_student().and_then(|s| s.grade_level.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    #[serde(default)]
    pub id: u64,
    pub student_id: u64,
    pub school_id: String,
    pub term: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub grades: Vec<GradeEntry>,
    #[serde(default)]
    pub issued: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuitionInvoice {
    #[serde(default)]
    pub id: u64,
    pub student_id: u64,
    pub school_id: String,
    pub description: String,
    pub amount: f64,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub paid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    #[serde(default)]
    pub id: u64,
    pub school_id: String,
    pub title: String,
    pub content: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(default)]
    pub id: u64,
    pub school_id: String,
    pub date: NaiveDate,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    #[serde(default)]
    pub id: u64,
    pub school_id: String,
    /// Targets a single student when set; otherwise every student in `grade_level`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    pub subject: String,
    pub title: String,
    pub due_date: NaiveDate,
}

impl Assignment {
    pub fn applies_to(&self, student: &Student) -> bool {
        match (self.student_id, &self.grade_level) {
            (Some(id), _) => id == student.id,
            (None, Some(level)) => student.grade_level.as_deref() == Some(level.as_str()),
            (None, None) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Recipient {
    All,
    Role(Role),
}

impl Recipient {
    pub fn includes(&self, role: Role) -> bool {
        match self {
            Recipient::All => true,
            Recipient::Role(r) => *r == role,
        }
    }
}

impl TryFrom<String> for Recipient {
    type Error = PortalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().eq_ignore_ascii_case("all") {
            return Ok(Recipient::All);
        }
        Role::parse(&value).map(Recipient::Role)
    }
}

impl From<Recipient> for String {
    fn from(value: Recipient) -> Self {
        match value {
            Recipient::All => "All".to_string(),
            Recipient::Role(r) => r.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub id: u64,
    /// `None` broadcasts to every school.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
    pub recipient_role: Recipient,
    /// Narrows the notice to one user within `recipient_role`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_user_id: Option<u64>,
    pub title: String,
    pub message: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: u64,
    pub sender_id: u64,
    pub receiver_id: u64,
    pub sender_name: String,
    pub content: String,
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub read: bool,
}
