use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};

use crate::error::{PortalError, PortalResult};
use crate::model::{
    Announcement, Assignment, CalendarEvent, GradeEntry, Message, Notification, Recipient,
    ReportCard, TuitionInvoice, User,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceMark {
    Present,
    Tardy,
    Absent,
}

impl AttendanceMark {
    pub fn parse(raw: &str) -> PortalResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceMark::Present),
            "tardy" | "late" => Ok(AttendanceMark::Tardy),
            "absent" => Ok(AttendanceMark::Absent),
            other => Err(PortalError::InvalidInput(format!(
                "attendance status must be present, tardy or absent (got {:?})",
                other
            ))),
        }
    }
}

/// Seed-time contents of the store.
#[derive(Debug, Default)]
pub struct StoreSeed {
    pub users: Vec<User>,
    pub report_cards: Vec<ReportCard>,
    pub invoices: Vec<TuitionInvoice>,
    pub announcements: Vec<Announcement>,
    pub events: Vec<CalendarEvent>,
    pub assignments: Vec<Assignment>,
    pub notifications: Vec<Notification>,
    pub messages: Vec<Message>,
}

/// All in-memory records. The only way to change them is through the
/// command methods below; callers never get mutable access to a collection.
#[derive(Debug, Default)]
pub struct EntityStore {
    users: BTreeMap<u64, User>,
    report_cards: Vec<ReportCard>,
    invoices: Vec<TuitionInvoice>,
    announcements: Vec<Announcement>,
    events: Vec<CalendarEvent>,
    assignments: Vec<Assignment>,
    notifications: Vec<Notification>,
    messages: Vec<Message>,
    next_id: u64,
}

/// Largest record id a JSON client can read back exactly (2^53 - 1).
const MAX_RECORD_ID: u64 = (1 << 53) - 1;

macro_rules! assign_ids {
    ($next:ident, $list:expr) => {
        for r in $list.iter_mut() {
            if r.id == 0 {
                if $next > MAX_RECORD_ID {
                    anyhow::bail!("seed leaves no room for new record ids");
                }
                r.id = $next;
                $next += 1;
            }
        }
    };
}

impl EntityStore {
    pub fn new(seed: StoreSeed) -> anyhow::Result<Self> {
        let mut users = BTreeMap::new();
        for u in seed.users {
            let id = u.id();
            if users.insert(id, u).is_some() {
                anyhow::bail!("duplicate user id: {}", id);
            }
        }

        let mut store = EntityStore {
            users,
            report_cards: seed.report_cards,
            invoices: seed.invoices,
            announcements: seed.announcements,
            events: seed.events,
            assignments: seed.assignments,
            notifications: seed.notifications,
            messages: seed.messages,
            next_id: 0,
        };

        let max_seeded = [
            store.report_cards.iter().map(|r| r.id).max(),
            store.invoices.iter().map(|r| r.id).max(),
            store.announcements.iter().map(|r| r.id).max(),
            store.events.iter().map(|r| r.id).max(),
            store.assignments.iter().map(|r| r.id).max(),
            store.notifications.iter().map(|r| r.id).max(),
            store.messages.iter().map(|r| r.id).max(),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0);
        let mut next = match max_seeded.checked_add(1) {
            Some(n) if max_seeded < MAX_RECORD_ID => n,
            _ => anyhow::bail!(
                "record id {} leaves no room below the largest supported id {}",
                max_seeded,
                MAX_RECORD_ID
            ),
        };
        assign_ids!(next, store.report_cards);
        assign_ids!(next, store.invoices);
        assign_ids!(next, store.announcements);
        assign_ids!(next, store.events);
        assign_ids!(next, store.assignments);
        assign_ids!(next, store.notifications);
        assign_ids!(next, store.messages);
        store.next_id = next;

        Ok(store)
    }

    // Load caps next_id at MAX_RECORD_ID + 1, far below u64::MAX.
    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    pub fn get(&self, id: u64) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn report_cards(&self) -> &[ReportCard] {
        &self.report_cards
    }

    pub fn report_cards_for(&self, student_id: u64) -> Vec<&ReportCard> {
        self.report_cards
            .iter()
            .filter(|r| r.student_id == student_id)
            .collect()
    }

    pub fn invoices_for(&self, student_id: u64) -> Vec<&TuitionInvoice> {
        self.invoices
            .iter()
            .filter(|i| i.student_id == student_id)
            .collect()
    }

    pub fn invoice(&self, id: u64) -> Option<&TuitionInvoice> {
        self.invoices.iter().find(|i| i.id == id)
    }

    pub fn announcements_for(&self, school_id: &str) -> Vec<&Announcement> {
        let mut out: Vec<&Announcement> = self
            .announcements
            .iter()
            .filter(|a| a.school_id == school_id)
            .collect();
        out.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        out
    }

    pub fn events_for(&self, school_id: &str) -> Vec<&CalendarEvent> {
        let mut out: Vec<&CalendarEvent> = self
            .events
            .iter()
            .filter(|e| e.school_id == school_id)
            .collect();
        out.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        out
    }

    pub fn assignments_for(&self, school_id: &str) -> Vec<&Assignment> {
        let mut out: Vec<&Assignment> = self
            .assignments
            .iter()
            .filter(|a| a.school_id == school_id)
            .collect();
        out.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        out
    }

    /// Notifications for one school, including cross-school broadcasts.
    pub fn notifications_for(&self, school_id: &str) -> Vec<Notification> {
        self.notifications
            .iter()
            .filter(|n| n.school_id.as_deref().map(|s| s == school_id).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Replaces stored notifications whose id appears in `updated`.
    pub fn merge_notifications(&mut self, updated: Vec<Notification>) {
        let by_id: HashMap<u64, Notification> = updated.into_iter().map(|n| (n.id, n)).collect();
        for n in self.notifications.iter_mut() {
            if let Some(u) = by_id.get(&n.id) {
                *n = u.clone();
            }
        }
    }

    pub fn add_notification(
        &mut self,
        school_id: Option<&str>,
        recipient: Recipient,
        recipient_user_id: Option<u64>,
        title: &str,
        message: &str,
        date: NaiveDate,
    ) -> &Notification {
        let id = self.take_id();
        self.notifications.push(Notification {
            id,
            school_id: school_id.map(str::to_string),
            recipient_role: recipient,
            recipient_user_id,
            title: title.to_string(),
            message: message.to_string(),
            date,
            read: false,
        });
        &self.notifications[self.notifications.len() - 1]
    }

    /// Upserts by (student, term). Republishing keeps the existing id.
    pub fn publish_report_card(
        &mut self,
        student_id: u64,
        school_id: &str,
        term: &str,
        fields: BTreeMap<String, String>,
        grades: Vec<GradeEntry>,
        today: NaiveDate,
    ) -> ReportCard {
        if let Some(existing) = self
            .report_cards
            .iter_mut()
            .find(|r| r.student_id == student_id && r.term == term)
        {
            existing.school_id = school_id.to_string();
            existing.fields = fields;
            existing.grades = grades;
            existing.issued = true;
            existing.issued_on = Some(today);
            return existing.clone();
        }
        let id = self.take_id();
        let card = ReportCard {
            id,
            student_id,
            school_id: school_id.to_string(),
            term: term.to_string(),
            fields,
            grades,
            issued: true,
            issued_on: Some(today),
        };
        self.report_cards.push(card.clone());
        card
    }

    pub fn pay_invoice(&mut self, invoice_id: u64, today: NaiveDate) -> PortalResult<TuitionInvoice> {
        let inv = self
            .invoices
            .iter_mut()
            .find(|i| i.id == invoice_id)
            .ok_or_else(|| PortalError::not_found("invoice", invoice_id))?;
        if inv.paid {
            return Err(PortalError::Conflict(format!(
                "invoice {} is already paid",
                invoice_id
            )));
        }
        inv.paid = true;
        inv.paid_on = Some(today);
        Ok(inv.clone())
    }

    pub fn post_announcement(
        &mut self,
        school_id: &str,
        title: &str,
        content: &str,
        date: NaiveDate,
    ) -> Announcement {
        let id = self.take_id();
        let a = Announcement {
            id,
            school_id: school_id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            date,
        };
        self.announcements.push(a.clone());
        a
    }

    pub fn add_calendar_event(
        &mut self,
        school_id: &str,
        date: NaiveDate,
        title: &str,
        description: &str,
    ) -> CalendarEvent {
        let id = self.take_id();
        let e = CalendarEvent {
            id,
            school_id: school_id.to_string(),
            date,
            title: title.to_string(),
            description: description.to_string(),
        };
        self.events.push(e.clone());
        e
    }

    pub fn add_assignment(&mut self, mut assignment: Assignment) -> Assignment {
        assignment.id = self.take_id();
        self.assignments.push(assignment.clone());
        assignment
    }

    pub fn send_message(
        &mut self,
        sender_id: u64,
        receiver_id: u64,
        sender_name: &str,
        content: &str,
        timestamp: NaiveDateTime,
    ) -> Message {
        let id = self.take_id();
        let m = Message {
            id,
            sender_id,
            receiver_id,
            sender_name: sender_name.to_string(),
            content: content.to_string(),
            timestamp,
            read: false,
        };
        self.messages.push(m.clone());
        m
    }

    /// Messages to or from `user_id`; narrowed to one conversation when
    /// `contact_id` is given. Oldest first.
    pub fn messages_for(&self, user_id: u64, contact_id: Option<u64>) -> Vec<&Message> {
        let mut out: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.sender_id == user_id || m.receiver_id == user_id)
            .filter(|m| match contact_id {
                Some(c) => m.sender_id == c || m.receiver_id == c,
                None => true,
            })
            .collect();
        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        out
    }

    /// Marks everything `sender_id` sent to `receiver_id` as read; returns how many changed.
    pub fn mark_messages_read(&mut self, receiver_id: u64, sender_id: u64) -> usize {
        let mut changed = 0;
        for m in self
            .messages
            .iter_mut()
            .filter(|m| m.receiver_id == receiver_id && m.sender_id == sender_id && !m.read)
        {
            m.read = true;
            changed += 1;
        }
        changed
    }

    pub fn mark_attendance(&mut self, student_id: u64, mark: AttendanceMark) -> PortalResult<User> {
        let student = match self.users.get_mut(&student_id) {
            Some(User::Student(s)) => s,
            _ => return Err(PortalError::not_found("student", student_id)),
        };
        match mark {
            AttendanceMark::Present => student.attendance.present += 1,
            AttendanceMark::Tardy => student.attendance.tardy += 1,
            AttendanceMark::Absent => student.attendance.absent += 1,
        }
        Ok(User::Student(student.clone()))
    }

    /// Upserts the subject's score on the student record.
    pub fn record_grade(&mut self, student_id: u64, subject: &str, score: &str) -> PortalResult<User> {
        let student = match self.users.get_mut(&student_id) {
            Some(User::Student(s)) => s,
            _ => return Err(PortalError::not_found("student", student_id)),
        };
        match student
            .grades
            .iter_mut()
            .find(|g| g.subject.eq_ignore_ascii_case(subject))
        {
            Some(g) => g.score = score.to_string(),
            None => student.grades.push(GradeEntry {
                subject: subject.to_string(),
                score: score.to_string(),
            }),
        }
        Ok(User::Student(student.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attendance, Student};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, d).expect("date")
    }

    fn student(id: u64) -> User {
        User::Student(Student {
            id,
            name: format!("Student {}", id),
            email: None,
            grade_level: Some("Grade 3".to_string()),
            grades: vec![],
            attendance: Attendance::default(),
            timetable: vec![],
            parent_id: None,
        })
    }

    fn invoice(id: u64) -> TuitionInvoice {
        TuitionInvoice {
            id,
            student_id: 1,
            school_id: "ea".to_string(),
            description: "Term fee".to_string(),
            amount: 1200.0,
            due_date: day(30),
            paid: false,
            paid_on: None,
        }
    }

    #[test]
    fn duplicate_user_ids_are_rejected() {
        let seed = StoreSeed {
            users: vec![student(1), student(1)],
            ..Default::default()
        };
        assert!(EntityStore::new(seed).is_err());
    }

    #[test]
    fn new_records_get_ids_after_seeded_ones() {
        let seed = StoreSeed {
            users: vec![student(1)],
            invoices: vec![invoice(40), invoice(0)],
            ..Default::default()
        };
        let mut store = EntityStore::new(seed).expect("store");
        assert_eq!(store.invoice(41).map(|i| i.id), Some(41));
        let a = store.post_announcement("ea", "Bus", "Route change", day(2));
        assert_eq!(a.id, 42);
    }

    #[test]
    fn seeded_ids_without_headroom_fail_to_load() {
        for top in [u64::MAX, MAX_RECORD_ID] {
            let seed = StoreSeed {
                users: vec![student(1)],
                invoices: vec![invoice(top)],
                ..Default::default()
            };
            let err = EntityStore::new(seed).expect_err("no room for new ids");
            assert!(err.to_string().contains("largest supported id"));
        }

        let seed = StoreSeed {
            users: vec![student(1)],
            invoices: vec![invoice(MAX_RECORD_ID - 1), invoice(0), invoice(0)],
            ..Default::default()
        };
        assert!(EntityStore::new(seed).is_err());
    }

    #[test]
    fn paying_twice_conflicts() {
        let seed = StoreSeed {
            users: vec![student(1)],
            invoices: vec![invoice(7)],
            ..Default::default()
        };
        let mut store = EntityStore::new(seed).expect("store");
        let paid = store.pay_invoice(7, day(3)).expect("pay");
        assert!(paid.paid);
        assert_eq!(paid.paid_on, Some(day(3)));
        let again = store.pay_invoice(7, day(4)).expect_err("second pay");
        assert_eq!(again.code(), "conflict");
        assert_eq!(store.pay_invoice(99, day(4)).expect_err("missing").code(), "not_found");
    }

    #[test]
    fn republishing_a_term_keeps_one_card() {
        let mut store = EntityStore::new(StoreSeed {
            users: vec![student(1)],
            ..Default::default()
        })
        .expect("store");
        let first = store.publish_report_card(1, "ea", "Fall 2024", BTreeMap::new(), vec![], day(1));
        let mut fields = BTreeMap::new();
        fields.insert("teacher_comment".to_string(), "Great term".to_string());
        let second = store.publish_report_card(1, "ea", "Fall 2024", fields, vec![], day(2));
        assert_eq!(first.id, second.id);
        assert_eq!(store.report_cards_for(1).len(), 1);
        assert_eq!(store.report_cards_for(1)[0].issued_on, Some(day(2)));
    }

    #[test]
    fn attendance_and_grades_update_the_student() {
        let mut store = EntityStore::new(StoreSeed {
            users: vec![student(1)],
            ..Default::default()
        })
        .expect("store");
        store.mark_attendance(1, AttendanceMark::Present).expect("present");
        store.mark_attendance(1, AttendanceMark::Absent).expect("absent");
        store.record_grade(1, "Math", "B").expect("grade");
        let updated = store.record_grade(1, "math", "A").expect("grade");
        let s = updated.as_student().expect("student");
        assert_eq!(s.attendance.present, 1);
        assert_eq!(s.attendance.absent, 1);
        assert_eq!(s.grades.len(), 1);
        assert_eq!(s.grades[0].score, "A");
        assert!(store.mark_attendance(2, AttendanceMark::Tardy).is_err());
    }

    #[test]
    fn conversation_filter_and_read_marks() {
        let mut store = EntityStore::new(StoreSeed::default()).expect("store");
        let t = day(5).and_hms_opt(14, 30, 0).expect("time");
        store.send_message(106, 211, "Dr. Wallace", "Hello", t);
        store.send_message(211, 106, "Susan Carter", "Hi", t);
        store.send_message(106, 212, "Dr. Wallace", "Other", t);
        assert_eq!(store.messages_for(211, Some(106)).len(), 2);
        assert_eq!(store.messages_for(106, None).len(), 3);
        assert_eq!(store.mark_messages_read(211, 106), 1);
        assert_eq!(store.mark_messages_read(211, 106), 0);
    }
}
