use chrono::{Local, NaiveDate};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::config::Config;
use crate::dashboard::{Compose, DashboardState, DashboardViewModel, Pane, Scope, Tab};
use crate::error::{PortalError, PortalResult};
use crate::model::{
    Announcement, Assignment, CalendarEvent, GradeEntry, Message, Notification, Recipient,
    ReportCard, Role, Student, TuitionInvoice, User,
};
use crate::notifications;
use crate::report_card::{validate_fields, validate_grades};
use crate::resolver::{LoginFlow, Resolution, Resolver, SchoolChoice, Session};
use crate::seed::{Dataset, SeedIssue};
use crate::store::AttendanceMark;

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAssignment {
    pub student_id: Option<u64>,
    pub grade_level: Option<String>,
    pub subject: String,
    pub title: String,
    pub due_date: NaiveDate,
}

/// The single owner of all mutable state: seeded data, the login flow, the
/// active dashboard and the theme. Views only read; every change is a
/// method here.
#[derive(Debug)]
pub struct Portal {
    data: Dataset,
    flow: LoginFlow,
    dashboard: Option<DashboardState>,
    theme: String,
    default_theme: String,
    term: String,
}

impl Portal {
    pub fn new(data: Dataset, config: &Config) -> Self {
        Self {
            data,
            flow: LoginFlow::default(),
            dashboard: None,
            theme: config.default_theme.clone(),
            default_theme: config.default_theme.clone(),
            term: config.term.clone(),
        }
    }

    /// Swaps the seed; any session is dropped.
    pub fn replace_data(&mut self, data: Dataset) {
        self.data = data;
        self.reset();
    }

    pub fn issues(&self) -> &[SeedIssue] {
        &self.data.issues
    }

    pub fn school_count(&self) -> usize {
        self.data.registry.len()
    }

    pub fn flow(&self) -> &LoginFlow {
        &self.flow
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn dashboard(&self) -> Option<&DashboardState> {
        self.dashboard.as_ref()
    }

    pub fn session(&self) -> PortalResult<&Session> {
        self.flow.session().ok_or(PortalError::NoSession)
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(&self.data.directory, &self.data.registry, &self.data.store)
    }

    fn scope(&self) -> Scope<'_> {
        Scope {
            directory: &self.data.directory,
            registry: &self.data.registry,
            store: &self.data.store,
        }
    }

    fn establish(&mut self, session: Session) {
        tracing::info!(
            user = session.user_id(),
            school = %session.school.id,
            role = %session.role,
            "session resolved"
        );
        self.theme = session.school.primary_color.clone();
        self.dashboard = Some(DashboardState::for_session(&session));
        self.flow = LoginFlow::Resolved {
            session: Box::new(session),
        };
    }

    fn fail_identification(&mut self, e: &PortalError) {
        if let PortalError::Configuration { defect } = e {
            tracing::error!(defect = %defect, "login aborted by seed defect");
        } else {
            tracing::info!(code = e.code(), "identification failed");
        }
        self.flow = LoginFlow::Identifying {
            error: Some(e.to_string()),
        };
    }

    // ---- login flow ----

    /// Simulated magic link: checks the email is registered and hands back
    /// the id the user "clicks" to finish signing in.
    pub fn request_link(&mut self, email: &str) -> PortalResult<Uuid> {
        if self.flow.session().is_some() {
            return Err(PortalError::InvalidState(
                "already signed in; log out first".to_string(),
            ));
        }
        let email = crate::directory::normalize_email(email);
        if email.is_empty() {
            return Err(PortalError::InvalidInput("email is required".to_string()));
        }
        if self.data.directory.lookup(&email).is_empty() {
            let e = PortalError::UserNotFound { email };
            self.fail_identification(&e);
            return Err(e);
        }
        let link_id = Uuid::new_v4();
        tracing::info!(%email, %link_id, "magic link issued");
        self.flow = LoginFlow::LinkSent { email, link_id };
        Ok(link_id)
    }

    pub fn confirm_link(&mut self, link_id: Uuid) -> PortalResult<&LoginFlow> {
        let email = match &self.flow {
            LoginFlow::LinkSent { email, link_id: sent } if *sent == link_id => email.clone(),
            LoginFlow::LinkSent { .. } => {
                return Err(PortalError::InvalidInput(
                    "link does not match the one sent".to_string(),
                ))
            }
            other => {
                return Err(PortalError::InvalidState(format!(
                    "no sign-in link pending (state: {})",
                    other.name()
                )))
            }
        };
        self.resolve_email(&email)?;
        Ok(&self.flow)
    }

    fn resolve_email(&mut self, email: &str) -> PortalResult<()> {
        let outcome = self.resolver().resolve(email);
        match outcome {
            Ok(Resolution::Resolved(session)) => {
                self.establish(session);
                Ok(())
            }
            Ok(Resolution::SchoolSelection { email, candidates }) => {
                tracing::info!(%email, options = candidates.len(), "school selection required");
                self.flow = LoginFlow::SchoolSelection { email, candidates };
                Ok(())
            }
            Err(e) => {
                self.fail_identification(&e);
                Err(e)
            }
        }
    }

    pub fn select_school(&mut self, choice: &SchoolChoice) -> PortalResult<&Session> {
        let LoginFlow::SchoolSelection { candidates, .. } = &self.flow else {
            return Err(PortalError::InvalidState(format!(
                "no school selection pending (state: {})",
                self.flow.name()
            )));
        };
        let outcome = self.resolver().select(candidates, choice);
        match outcome {
            Ok(session) => self.establish(session),
            Err(e @ PortalError::Configuration { .. }) => {
                self.fail_identification(&e);
                return Err(e);
            }
            Err(e) => return Err(e),
        }
        self.session()
    }

    /// Abandons a pending link or school choice ("use a different email").
    pub fn cancel(&mut self) -> PortalResult<()> {
        match self.flow {
            LoginFlow::LinkSent { .. } | LoginFlow::SchoolSelection { .. } => {
                self.flow = LoginFlow::default();
                Ok(())
            }
            _ => Err(PortalError::InvalidState(format!(
                "nothing to cancel (state: {})",
                self.flow.name()
            ))),
        }
    }

    pub fn switch_school(&mut self, school_id: &str, role: Option<Role>) -> PortalResult<&Session> {
        let current = self.session()?;
        let next = self.resolver().switch_school(current, school_id, role)?;
        if &next == current {
            return self.session();
        }
        tracing::info!(from = %current.school.id, to = %next.school.id, "switching school");
        self.establish(next);
        self.session()
    }

    pub fn logout(&mut self) -> PortalResult<()> {
        let user = self.session()?.user_id();
        tracing::info!(user, "logged out");
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.flow = LoginFlow::default();
        self.dashboard = None;
        self.theme = self.default_theme.clone();
    }

    // ---- dashboard navigation ----

    fn dashboard_mut(&mut self) -> PortalResult<&mut DashboardState> {
        self.dashboard.as_mut().ok_or(PortalError::NoSession)
    }

    pub fn view(&self) -> PortalResult<DashboardViewModel> {
        let session = self.session()?;
        let state = self.dashboard.as_ref().ok_or(PortalError::NoSession)?;
        self.scope().view(session, state, &self.term)
    }

    pub fn select_tab(&mut self, tab: Tab) -> PortalResult<()> {
        self.dashboard_mut()?.select_tab(tab)
    }

    pub fn open(&mut self, entity_id: u64) -> PortalResult<()> {
        let allowed: Vec<u64> = {
            let session = self.session()?;
            self.scope()
                .visible_students(session)
                .iter()
                .map(|s| s.id)
                .collect()
        };
        self.dashboard_mut()?.open(entity_id, &allowed)
    }

    pub fn back(&mut self) -> PortalResult<()> {
        self.dashboard_mut()?.back()
    }

    pub fn set_pane(&mut self, pane: Pane) -> PortalResult<()> {
        self.dashboard_mut()?.set_pane(pane)
    }

    pub fn compose(&mut self, mode: Compose) -> PortalResult<()> {
        self.dashboard_mut()?.compose(mode)
    }

    // ---- notifications ----

    pub fn notifications(&self) -> PortalResult<Vec<Notification>> {
        let session = self.session()?;
        Ok(self.scope().notifications(session))
    }

    pub fn mark_notification_read(&mut self, id: u64) -> PortalResult<Vec<Notification>> {
        let visible = self.notifications()?;
        if !visible.iter().any(|n| n.id == id) {
            return Err(PortalError::not_found("notification", id));
        }
        let updated = notifications::mark_read(&visible, id);
        self.data.store.merge_notifications(updated.clone());
        Ok(updated)
    }

    pub fn mark_all_notifications_read(&mut self) -> PortalResult<Vec<Notification>> {
        let visible = self.notifications()?;
        let updated = notifications::mark_all_read(&visible);
        self.data.store.merge_notifications(updated.clone());
        Ok(updated)
    }

    // ---- content commands ----

    fn require(&self, roles: &[Role], action: &'static str) -> PortalResult<&Session> {
        let session = self.session()?;
        if !roles.contains(&session.role) {
            return Err(PortalError::Forbidden {
                role: session.role,
                action,
            });
        }
        Ok(session)
    }

    fn visible_student(&self, student_id: u64) -> PortalResult<Student> {
        let session = self.session()?;
        self.scope()
            .visible_students(session)
            .into_iter()
            .find(|s| s.id == student_id)
            .cloned()
            .ok_or_else(|| PortalError::not_found("student", student_id))
    }

    pub fn publish_report_card(
        &mut self,
        student_id: u64,
        term: Option<&str>,
        fields: &BTreeMap<String, String>,
        grades: &[GradeEntry],
    ) -> PortalResult<ReportCard> {
        let school_id = self
            .require(&[Role::Teacher], "publish report cards")?
            .school_id()
            .to_string();
        let student = self.visible_student(student_id)?;
        let template = self.data.registry.template(&school_id);
        let fields = validate_fields(&template, fields)?;
        let grades = validate_grades(grades)?;
        let term = term
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(self.term.as_str())
            .to_string();

        let day = today();
        let card = self
            .data
            .store
            .publish_report_card(student.id, &school_id, &term, fields, grades, day);
        if let Some(parent_id) = student.parent_id {
            self.data.store.add_notification(
                Some(&school_id),
                Recipient::Role(Role::Parent),
                Some(parent_id),
                "Report card issued",
                &format!("{}'s {} report card is available.", student.name, term),
                day,
            );
        }
        tracing::info!(student = student.id, %term, card = card.id, "report card published");
        Ok(card)
    }

    pub fn report_cards(&self, student_id: u64) -> PortalResult<Vec<ReportCard>> {
        let session = self.session()?;
        let student = self.visible_student(student_id)?;
        let teacher = session.role == Role::Teacher;
        Ok(self
            .data
            .store
            .report_cards_for(student.id)
            .into_iter()
            .filter(|r| teacher || r.issued)
            .cloned()
            .collect())
    }

    pub fn mark_attendance(&mut self, student_id: u64, mark: AttendanceMark) -> PortalResult<User> {
        self.require(&[Role::Teacher], "mark attendance")?;
        let student = self.visible_student(student_id)?;
        let updated = self.data.store.mark_attendance(student.id, mark)?;
        tracing::info!(student = student.id, ?mark, "attendance marked");
        Ok(updated)
    }

    pub fn record_grade(&mut self, student_id: u64, subject: &str, score: &str) -> PortalResult<User> {
        self.require(&[Role::Teacher], "record grades")?;
        let (subject, score) = (subject.trim(), score.trim());
        if subject.is_empty() || score.is_empty() {
            return Err(PortalError::InvalidInput(
                "subject and score are required".to_string(),
            ));
        }
        let student = self.visible_student(student_id)?;
        let updated = self.data.store.record_grade(student.id, subject, score)?;
        tracing::info!(student = student.id, %subject, "grade recorded");
        Ok(updated)
    }

    pub fn add_assignment(&mut self, new: NewAssignment) -> PortalResult<Assignment> {
        let session = self.require(&[Role::Teacher], "add assignments")?;
        let school_id = session.school_id().to_string();
        let teaches = session
            .user
            .as_teacher()
            .and_then(|t| t.teaches_grades.clone());
        if new.title.trim().is_empty() || new.subject.trim().is_empty() {
            return Err(PortalError::InvalidInput(
                "assignment needs a subject and a title".to_string(),
            ));
        }
        match (new.student_id, &new.grade_level) {
            (Some(id), None) => {
                self.visible_student(id)?;
            }
            (None, Some(level)) => {
                if let Some(grades) = &teaches {
                    if !grades.contains(level) {
                        return Err(PortalError::Forbidden {
                            role: Role::Teacher,
                            action: "assign work outside taught grades",
                        });
                    }
                }
            }
            _ => {
                return Err(PortalError::InvalidInput(
                    "give exactly one of studentId or gradeLevel".to_string(),
                ))
            }
        }
        let a = self.data.store.add_assignment(Assignment {
            id: 0,
            school_id,
            student_id: new.student_id,
            grade_level: new.grade_level,
            subject: new.subject.trim().to_string(),
            title: new.title.trim().to_string(),
            due_date: new.due_date,
        });
        tracing::info!(assignment = a.id, "assignment added");
        Ok(a)
    }

    fn finish_compose(&mut self) {
        if let Some(d) = self.dashboard.as_mut() {
            d.compose = None;
        }
    }

    pub fn post_announcement(
        &mut self,
        title: &str,
        content: &str,
        date: Option<NaiveDate>,
    ) -> PortalResult<Announcement> {
        let school_id = self
            .require(&[Role::Administrator], "post announcements")?
            .school_id()
            .to_string();
        let title = title.trim();
        if title.is_empty() {
            return Err(PortalError::InvalidInput("title is required".to_string()));
        }
        let date = date.unwrap_or_else(today);
        let a = self
            .data
            .store
            .post_announcement(&school_id, title, content.trim(), date);
        self.data.store.add_notification(
            Some(&school_id),
            Recipient::All,
            None,
            "New announcement",
            title,
            date,
        );
        self.finish_compose();
        tracing::info!(announcement = a.id, school = %school_id, "announcement posted");
        Ok(a)
    }

    pub fn add_event(&mut self, date: NaiveDate, title: &str, description: &str) -> PortalResult<CalendarEvent> {
        let school_id = self
            .require(&[Role::Administrator], "add calendar events")?
            .school_id()
            .to_string();
        let title = title.trim();
        if title.is_empty() {
            return Err(PortalError::InvalidInput("title is required".to_string()));
        }
        let e = self
            .data
            .store
            .add_calendar_event(&school_id, date, title, description.trim());
        self.finish_compose();
        tracing::info!(event = e.id, school = %school_id, "calendar event added");
        Ok(e)
    }

    pub fn invoices(&self, student_id: Option<u64>) -> PortalResult<Vec<TuitionInvoice>> {
        let session = self.require(&[Role::Parent, Role::Administrator], "view invoices")?;
        let school_id = session.school_id();
        let students: Vec<u64> = match student_id {
            Some(id) => vec![self.visible_student(id)?.id],
            None => self
                .scope()
                .visible_students(session)
                .iter()
                .map(|s| s.id)
                .collect(),
        };
        Ok(students
            .into_iter()
            .flat_map(|id| self.data.store.invoices_for(id))
            .filter(|i| i.school_id == school_id)
            .cloned()
            .collect())
    }

    pub fn pay_invoice(&mut self, invoice_id: u64) -> PortalResult<TuitionInvoice> {
        let school_id = self
            .require(&[Role::Parent], "pay invoices")?
            .school_id()
            .to_string();
        let invoice = self
            .data
            .store
            .invoice(invoice_id)
            .filter(|i| i.school_id == school_id)
            .cloned()
            .ok_or_else(|| PortalError::not_found("invoice", invoice_id))?;
        self.visible_student(invoice.student_id)
            .map_err(|_| PortalError::not_found("invoice", invoice_id))?;
        let paid = self.data.store.pay_invoice(invoice_id, today())?;
        tracing::info!(invoice = paid.id, amount = paid.amount, "invoice paid");
        Ok(paid)
    }

    pub fn send_message(&mut self, receiver_id: u64, content: &str) -> PortalResult<Message> {
        let session = self.session()?;
        let content = content.trim();
        if content.is_empty() {
            return Err(PortalError::InvalidInput("message is empty".to_string()));
        }
        let contacts = self.scope().contacts(session);
        if contacts.is_empty() {
            return Err(PortalError::Forbidden {
                role: session.role,
                action: "send messages",
            });
        }
        if !contacts.iter().any(|u| u.id() == receiver_id) {
            return Err(PortalError::not_found("contact", receiver_id));
        }
        let (sender_id, sender_name) = (session.user_id(), session.user.name().to_string());
        let m = self.data.store.send_message(
            sender_id,
            receiver_id,
            &sender_name,
            content,
            Local::now().naive_local(),
        );
        tracing::info!(message = m.id, from = sender_id, to = receiver_id, "message sent");
        Ok(m)
    }

    pub fn messages(&self, contact_id: Option<u64>) -> PortalResult<Vec<Message>> {
        let session = self.session()?;
        Ok(self
            .scope()
            .conversation(session, contact_id)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn mark_messages_read(&mut self, contact_id: u64) -> PortalResult<usize> {
        let session = self.session()?;
        let me = session.user_id();
        if !self.scope().contacts(session).iter().any(|u| u.id() == contact_id) {
            return Err(PortalError::not_found("contact", contact_id));
        }
        Ok(self.data.store.mark_messages_read(me, contact_id))
    }
}
