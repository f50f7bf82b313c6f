use serde::Serialize;
use uuid::Uuid;

use crate::directory::{normalize_email, IdentityDirectory};
use crate::error::{PortalError, PortalResult};
use crate::model::{Affiliation, Role, SchoolConfig, User};
use crate::registry::SchoolRegistry;
use crate::store::EntityStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: User,
    pub school: SchoolConfig,
    pub role: Role,
    pub affiliations: Vec<Affiliation>,
}

impl Session {
    pub fn user_id(&self) -> u64 {
        self.user.id()
    }

    pub fn school_id(&self) -> &str {
        &self.school.id
    }

    /// Distinct schools this identity can switch between, in affiliation order.
    pub fn school_ids(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for a in &self.affiliations {
            if !out.contains(&a.school_id.as_str()) {
                out.push(&a.school_id);
            }
        }
        out
    }
}

/// Where an email leads once looked up.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Session),
    SchoolSelection {
        email: String,
        candidates: Vec<Affiliation>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum LoginFlow {
    #[serde(rename_all = "camelCase")]
    Identifying { error: Option<String> },
    #[serde(rename_all = "camelCase")]
    LinkSent { email: String, link_id: Uuid },
    #[serde(rename_all = "camelCase")]
    SchoolSelection {
        email: String,
        candidates: Vec<Affiliation>,
    },
    Resolved { session: Box<Session> },
}

impl Default for LoginFlow {
    fn default() -> Self {
        LoginFlow::Identifying { error: None }
    }
}

impl LoginFlow {
    pub fn session(&self) -> Option<&Session> {
        match self {
            LoginFlow::Resolved { session } => Some(session.as_ref()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LoginFlow::Identifying { .. } => "identifying",
            LoginFlow::LinkSent { .. } => "linkSent",
            LoginFlow::SchoolSelection { .. } => "schoolSelection",
            LoginFlow::Resolved { .. } => "resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchoolChoice {
    Index(usize),
    School { school_id: String, role: Option<Role> },
}

/// Read-only view over the seeded data the resolver needs.
#[derive(Clone, Copy)]
pub struct Resolver<'a> {
    pub directory: &'a IdentityDirectory,
    pub registry: &'a SchoolRegistry,
    pub store: &'a EntityStore,
}

impl<'a> Resolver<'a> {
    pub fn new(
        directory: &'a IdentityDirectory,
        registry: &'a SchoolRegistry,
        store: &'a EntityStore,
    ) -> Self {
        Self {
            directory,
            registry,
            store,
        }
    }

    pub fn resolve(&self, email: &str) -> PortalResult<Resolution> {
        let email = normalize_email(email);
        let candidates = self.directory.lookup(&email);
        match candidates.len() {
            0 => Err(PortalError::UserNotFound { email }),
            1 => {
                let session = self.bind(&candidates[0], &candidates)?;
                Ok(Resolution::Resolved(session))
            }
            _ => Ok(Resolution::SchoolSelection { email, candidates }),
        }
    }

    pub fn select(&self, candidates: &[Affiliation], choice: &SchoolChoice) -> PortalResult<Session> {
        let picked = pick(candidates, choice)?;
        self.bind(picked, candidates)
    }

    /// Rebinds an existing session to another of its schools. Switching to
    /// the current school returns the session unchanged.
    pub fn switch_school(
        &self,
        session: &Session,
        target_school_id: &str,
        role: Option<Role>,
    ) -> PortalResult<Session> {
        let matching: Vec<&Affiliation> = session
            .affiliations
            .iter()
            .filter(|a| a.school_id == target_school_id)
            .collect();
        if matching.is_empty() {
            return Err(PortalError::SchoolNotAffiliated {
                school_id: target_school_id.to_string(),
            });
        }

        let wanted = role.unwrap_or(session.role);
        if target_school_id == session.school_id() && wanted == session.role {
            return Ok(session.clone());
        }

        let picked = match role {
            Some(r) => matching
                .iter()
                .find(|a| a.role == r)
                .copied()
                .ok_or_else(|| {
                    PortalError::InvalidSelection(format!(
                        "no {} affiliation at {}",
                        r, target_school_id
                    ))
                })?,
            None => matching
                .iter()
                .find(|a| a.role == session.role)
                .copied()
                .unwrap_or(matching[0]),
        };
        self.bind(picked, &session.affiliations)
    }

    fn bind(&self, aff: &Affiliation, all: &[Affiliation]) -> PortalResult<Session> {
        let user = self.store.get(aff.user_id).ok_or_else(|| {
            PortalError::configuration(format!(
                "{} references missing user {}",
                aff.email, aff.user_id
            ))
        })?;
        let school = self.registry.get(&aff.school_id).ok_or_else(|| {
            PortalError::configuration(format!(
                "{} references missing school {}",
                aff.email, aff.school_id
            ))
        })?;
        if user.role() != aff.role {
            return Err(PortalError::configuration(format!(
                "{} is registered as {} but user {} is a {}",
                aff.email,
                aff.role,
                aff.user_id,
                user.role()
            )));
        }
        if let Some(parent) = user.as_parent() {
            self.check_children(parent.id, &parent.children_ids, &school.id)?;
        }

        Ok(Session {
            user: user.clone(),
            school: school.clone(),
            role: aff.role,
            affiliations: all.to_vec(),
        })
    }

    /// Every listed child must be a student pointing back at this parent.
    /// Children of other schools are tolerated; the dashboard scopes them out.
    fn check_children(&self, parent_id: u64, children: &[u64], school_id: &str) -> PortalResult<()> {
        for cid in children {
            let Some(child) = self.store.get(*cid).and_then(|u| u.as_student()) else {
                return Err(PortalError::configuration(format!(
                    "parent {} lists {} which is not a student",
                    parent_id, cid
                )));
            };
            if self.directory.is_member(child.id, school_id) && child.parent_id != Some(parent_id) {
                return Err(PortalError::configuration(format!(
                    "student {} at {} does not name parent {}",
                    child.id, school_id, parent_id
                )));
            }
        }
        Ok(())
    }
}

fn pick<'c>(candidates: &'c [Affiliation], choice: &SchoolChoice) -> PortalResult<&'c Affiliation> {
    match choice {
        SchoolChoice::Index(i) => candidates.get(*i).ok_or_else(|| {
            PortalError::InvalidSelection(format!(
                "option {} is out of range (0..{})",
                i,
                candidates.len()
            ))
        }),
        SchoolChoice::School { school_id, role } => {
            let matching: Vec<&Affiliation> = candidates
                .iter()
                .filter(|a| &a.school_id == school_id)
                .filter(|a| role.map(|r| r == a.role).unwrap_or(true))
                .collect();
            match matching.len() {
                0 => Err(PortalError::InvalidSelection(format!(
                    "{} is not among the offered schools",
                    school_id
                ))),
                1 => Ok(matching[0]),
                n => Err(PortalError::SelectionRequired { candidates: n }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attendance, Parent, SchoolType, Student, Teacher};
    use crate::store::StoreSeed;

    fn school(id: &str, color: &str) -> SchoolConfig {
        SchoolConfig {
            id: id.to_string(),
            name: id.to_uppercase(),
            primary_color: color.to_string(),
            logo_url: None,
            school_type: SchoolType::Secondary,
            features: Default::default(),
            report_card_template: vec![],
        }
    }

    fn student(id: u64, parent_id: Option<u64>) -> User {
        User::Student(Student {
            id,
            name: format!("Student {}", id),
            email: None,
            grade_level: None,
            grades: vec![],
            attendance: Attendance::default(),
            timetable: vec![],
            parent_id,
        })
    }

    fn aff(user_id: u64, role: Role, school: &str, email: &str) -> Affiliation {
        Affiliation {
            user_id,
            role,
            school_id: school.to_string(),
            email: email.to_string(),
        }
    }

    struct Fixture {
        directory: IdentityDirectory,
        registry: SchoolRegistry,
        store: EntityStore,
    }

    impl Fixture {
        fn new(users: Vec<User>, affs: Vec<Affiliation>) -> Self {
            Self {
                directory: IdentityDirectory::new(affs),
                registry: SchoolRegistry::new(vec![
                    school("s1", "#111111"),
                    school("s2", "#222222"),
                ])
                .expect("registry"),
                store: EntityStore::new(StoreSeed {
                    users,
                    ..Default::default()
                })
                .expect("store"),
            }
        }

        fn resolver(&self) -> Resolver<'_> {
            Resolver::new(&self.directory, &self.registry, &self.store)
        }
    }

    fn teacher(id: u64) -> User {
        User::Teacher(Teacher {
            id,
            name: "T".to_string(),
            email: None,
            teaches_grades: None,
        })
    }

    #[test]
    fn unknown_email_is_user_not_found() {
        let f = Fixture::new(vec![student(1, None)], vec![aff(1, Role::Student, "s1", "a@x.com")]);
        let e = f.resolver().resolve("nobody@x.com").expect_err("missing");
        assert_eq!(e.code(), "user_not_found");
    }

    #[test]
    fn single_affiliation_resolves_case_insensitively() {
        let f = Fixture::new(vec![student(1, None)], vec![aff(1, Role::Student, "s1", "a@x.com")]);
        match f.resolver().resolve("A@X.com").expect("resolve") {
            Resolution::Resolved(s) => {
                assert_eq!(s.school.id, "s1");
                assert_eq!(s.user.id(), 1);
                assert_eq!(s.role, Role::Student);
                assert_eq!(s.affiliations.len(), 1);
            }
            other => panic!("expected resolved, got {:?}", other),
        }
    }

    #[test]
    fn multiple_affiliations_require_selection() {
        let f = Fixture::new(
            vec![teacher(5)],
            vec![
                aff(5, Role::Teacher, "s1", "multi@x.com"),
                aff(5, Role::Teacher, "s2", "multi@x.com"),
            ],
        );
        let r = f.resolver();
        let Resolution::SchoolSelection { candidates, .. } = r.resolve("multi@x.com").expect("resolve")
        else {
            panic!("expected selection");
        };
        assert_eq!(candidates.len(), 2);

        let by_school = r
            .select(
                &candidates,
                &SchoolChoice::School {
                    school_id: "s2".to_string(),
                    role: None,
                },
            )
            .expect("select");
        assert_eq!(by_school.school.id, "s2");

        for (i, a) in candidates.iter().enumerate() {
            let s = r.select(&candidates, &SchoolChoice::Index(i)).expect("select");
            assert_eq!(s.school.id, a.school_id);
            assert_eq!(s.user.id(), a.user_id);
        }
        assert!(r.select(&candidates, &SchoolChoice::Index(2)).is_err());
    }

    #[test]
    fn missing_records_are_configuration_errors() {
        let f = Fixture::new(
            vec![student(1, None)],
            vec![
                aff(2, Role::Student, "s1", "ghost@x.com"),
                aff(1, Role::Student, "s9", "lost@x.com"),
                aff(1, Role::Teacher, "s1", "wrong@x.com"),
            ],
        );
        let r = f.resolver();
        for email in ["ghost@x.com", "lost@x.com", "wrong@x.com"] {
            let e = r.resolve(email).expect_err(email);
            assert_eq!(e.code(), "configuration_error", "{}", email);
        }
    }

    #[test]
    fn parent_with_one_sided_child_link_is_rejected() {
        let parent = User::Parent(Parent {
            id: 200,
            name: "P".to_string(),
            email: None,
            children_ids: vec![1],
        });
        let f = Fixture::new(
            vec![parent, student(1, Some(999))],
            vec![
                aff(200, Role::Parent, "s1", "p@x.com"),
                aff(1, Role::Student, "s1", "kid@x.com"),
            ],
        );
        let e = f.resolver().resolve("p@x.com").expect_err("broken link");
        assert_eq!(e.code(), "configuration_error");
    }

    #[test]
    fn switch_school_rebinds_and_rejects_strangers() {
        let f = Fixture::new(
            vec![teacher(5)],
            vec![
                aff(5, Role::Teacher, "s1", "multi@x.com"),
                aff(5, Role::Teacher, "s2", "multi@x.com"),
            ],
        );
        let r = f.resolver();
        let Resolution::SchoolSelection { candidates, .. } = r.resolve("multi@x.com").expect("resolve")
        else {
            panic!("expected selection");
        };
        let s1 = r.select(&candidates, &SchoolChoice::Index(0)).expect("s1");

        let same = r.switch_school(&s1, "s1", None).expect("same");
        assert_eq!(same, s1);

        let s2 = r.switch_school(&s1, "s2", None).expect("s2");
        assert_eq!(s2.school.id, "s2");
        assert_eq!(s2.school.primary_color, "#222222");
        assert_eq!(s2.affiliations, s1.affiliations);

        let e = r.switch_school(&s1, "s3", None).expect_err("not affiliated");
        assert_eq!(e.code(), "school_not_affiliated");
    }

    #[test]
    fn school_ids_are_distinct_in_order() {
        let f = Fixture::new(
            vec![teacher(5)],
            vec![
                aff(5, Role::Teacher, "s2", "t@x.com"),
                aff(5, Role::Teacher, "s1", "t@x.com"),
            ],
        );
        let r = f.resolver();
        let Resolution::SchoolSelection { candidates, .. } = r.resolve("t@x.com").expect("resolve")
        else {
            panic!("expected selection");
        };
        let s = r.select(&candidates, &SchoolChoice::Index(1)).expect("select");
        assert_eq!(s.school_ids(), vec!["s2", "s1"]);
    }
}
