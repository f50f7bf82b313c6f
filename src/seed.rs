use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::directory::{normalize_email, IdentityDirectory};
use crate::model::{
    Affiliation, Announcement, Assignment, CalendarEvent, Message, Notification, ReportCard, Role,
    SchoolConfig, TuitionInvoice, User,
};
use crate::registry::SchoolRegistry;
use crate::store::{EntityStore, StoreSeed};

const DEMO_SEED: &str = include_str!("../fixtures/seed/demo.json");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    pub schools: Vec<SchoolConfig>,
    pub users: Vec<User>,
    pub affiliations: Vec<Affiliation>,
    #[serde(default)]
    pub report_cards: Vec<ReportCard>,
    #[serde(default)]
    pub invoices: Vec<TuitionInvoice>,
    #[serde(default)]
    pub announcements: Vec<Announcement>,
    #[serde(default)]
    pub events: Vec<CalendarEvent>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Seed {
    pub fn demo() -> anyhow::Result<Self> {
        Self::parse(DEMO_SEED).context("built-in demo seed is invalid")
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed {}", path.to_string_lossy()))?;
        Self::parse(&raw)
            .with_context(|| format!("failed to parse seed {}", path.to_string_lossy()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedIssue {
    pub code: &'static str,
    pub message: String,
}

impl SeedIssue {
    fn new(code: &'static str, message: String) -> Self {
        Self { code, message }
    }
}

/// Relationship checks over raw seed data. Nothing here rejects the seed;
/// the resolver refuses to bind sessions that hit a broken record.
pub fn check_integrity(seed: &Seed) -> Vec<SeedIssue> {
    let mut issues = Vec::new();
    let users: HashMap<u64, &User> = seed.users.iter().map(|u| (u.id(), u)).collect();
    let schools: HashSet<&str> = seed.schools.iter().map(|s| s.id.as_str()).collect();

    let mut seen: HashSet<(String, u64, &str, Role)> = HashSet::new();
    let mut affiliated: HashSet<u64> = HashSet::new();
    for a in &seed.affiliations {
        let email = normalize_email(&a.email);
        if email.is_empty() {
            issues.push(SeedIssue::new(
                "affiliation_missing_email",
                format!("affiliation for user {} has no email", a.user_id),
            ));
        }
        if !seen.insert((email.clone(), a.user_id, a.school_id.as_str(), a.role)) {
            issues.push(SeedIssue::new(
                "duplicate_affiliation",
                format!(
                    "{} lists user {} at {} as {} more than once",
                    email, a.user_id, a.school_id, a.role
                ),
            ));
        }
        match users.get(&a.user_id) {
            None => issues.push(SeedIssue::new(
                "affiliation_unknown_user",
                format!("{} references missing user {}", email, a.user_id),
            )),
            Some(u) if u.role() != a.role => issues.push(SeedIssue::new(
                "affiliation_role_mismatch",
                format!(
                    "{} claims role {} but user {} is a {}",
                    email,
                    a.role,
                    a.user_id,
                    u.role()
                ),
            )),
            Some(_) => {}
        }
        if !schools.contains(a.school_id.as_str()) {
            issues.push(SeedIssue::new(
                "affiliation_unknown_school",
                format!("{} references missing school {}", email, a.school_id),
            ));
        }
        affiliated.insert(a.user_id);
    }

    for u in &seed.users {
        match u {
            User::Student(s) => {
                if !affiliated.contains(&s.id) {
                    issues.push(SeedIssue::new(
                        "student_without_school",
                        format!("student {} has no school affiliation", s.id),
                    ));
                }
                if let Some(pid) = s.parent_id {
                    match users.get(&pid).and_then(|p| p.as_parent()) {
                        None => issues.push(SeedIssue::new(
                            "student_unknown_parent",
                            format!("student {} points at {} which is not a parent", s.id, pid),
                        )),
                        Some(p) if !p.children_ids.contains(&s.id) => {
                            issues.push(SeedIssue::new(
                                "parent_link_one_sided",
                                format!(
                                    "student {} names parent {} but is not in their children",
                                    s.id, pid
                                ),
                            ))
                        }
                        Some(_) => {}
                    }
                }
            }
            User::Parent(p) => {
                for cid in &p.children_ids {
                    match users.get(cid).and_then(|c| c.as_student()) {
                        None => issues.push(SeedIssue::new(
                            "parent_unknown_child",
                            format!("parent {} lists {} which is not a student", p.id, cid),
                        )),
                        Some(c) if c.parent_id != Some(p.id) => {
                            issues.push(SeedIssue::new(
                                "child_link_one_sided",
                                format!(
                                    "parent {} lists student {} whose parent is {:?}",
                                    p.id, cid, c.parent_id
                                ),
                            ))
                        }
                        Some(_) => {}
                    }
                }
            }
            User::Teacher(_) | User::Administrator(_) => {}
        }
    }

    issues
}

/// The read-only lookup structures plus the mutable store, built from one seed.
#[derive(Debug)]
pub struct Dataset {
    pub directory: IdentityDirectory,
    pub registry: SchoolRegistry,
    pub store: EntityStore,
    pub issues: Vec<SeedIssue>,
}

impl Dataset {
    pub fn build(seed: Seed) -> anyhow::Result<Self> {
        let issues = check_integrity(&seed);
        for issue in &issues {
            tracing::warn!(code = issue.code, "seed integrity: {}", issue.message);
        }

        let registry = SchoolRegistry::new(seed.schools)?;
        let directory = IdentityDirectory::new(seed.affiliations);
        let store = EntityStore::new(StoreSeed {
            users: seed.users,
            report_cards: seed.report_cards,
            invoices: seed.invoices,
            announcements: seed.announcements,
            events: seed.events,
            assignments: seed.assignments,
            notifications: seed.notifications,
            messages: seed.messages,
        })?;

        tracing::info!(
            schools = registry.len(),
            emails = directory.email_count(),
            issues = issues.len(),
            "seed loaded"
        );

        Ok(Self {
            directory,
            registry,
            store,
            issues,
        })
    }
}
