use std::collections::{BTreeSet, HashMap};

use crate::model::Affiliation;

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Email → affiliations lookup. Read-only after construction.
#[derive(Debug, Default, Clone)]
pub struct IdentityDirectory {
    by_email: HashMap<String, Vec<Affiliation>>,
    schools_by_user: HashMap<u64, BTreeSet<String>>,
}

impl IdentityDirectory {
    pub fn new(affiliations: impl IntoIterator<Item = Affiliation>) -> Self {
        let mut dir = IdentityDirectory::default();
        for mut a in affiliations {
            a.email = normalize_email(&a.email);
            let entry = dir.by_email.entry(a.email.clone()).or_default();
            // Exact repeats collapse; integrity checks report them separately.
            if entry.iter().any(|e| e == &a) {
                continue;
            }
            dir.schools_by_user
                .entry(a.user_id)
                .or_default()
                .insert(a.school_id.clone());
            entry.push(a);
        }
        dir
    }

    /// Empty when the email is unknown.
    pub fn lookup(&self, email: &str) -> Vec<Affiliation> {
        self.by_email
            .get(&normalize_email(email))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_member(&self, user_id: u64, school_id: &str) -> bool {
        self.schools_by_user
            .get(&user_id)
            .map(|s| s.contains(school_id))
            .unwrap_or(false)
    }

    pub fn email_count(&self) -> usize {
        self.by_email.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn aff(user_id: u64, role: Role, school: &str, email: &str) -> Affiliation {
        Affiliation {
            user_id,
            role,
            school_id: school.to_string(),
            email: email.to_string(),
        }
    }

    #[test]
    fn lookup_ignores_case_and_whitespace() {
        let dir = IdentityDirectory::new(vec![aff(1, Role::Student, "s1", "A@X.com")]);
        let found = dir.lookup("  a@x.COM ");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].school_id, "s1");
        assert_eq!(found[0].email, "a@x.com");
    }

    #[test]
    fn unknown_email_is_empty() {
        let dir = IdentityDirectory::new(vec![aff(1, Role::Student, "s1", "a@x.com")]);
        assert!(dir.lookup("b@x.com").is_empty());
    }

    #[test]
    fn multi_school_email_keeps_every_affiliation() {
        let dir = IdentityDirectory::new(vec![
            aff(5, Role::Teacher, "s1", "multi@x.com"),
            aff(5, Role::Teacher, "s2", "multi@x.com"),
            aff(5, Role::Teacher, "s2", "multi@x.com"),
        ]);
        let found = dir.lookup("multi@x.com");
        assert_eq!(found.len(), 2);
        assert!(dir.is_member(5, "s2"));
        assert!(!dir.is_member(5, "s3"));
        assert!(dir.is_member(5, "s1"));
    }
}
