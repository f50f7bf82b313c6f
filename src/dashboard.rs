use serde::Serialize;
use std::collections::HashSet;

use crate::directory::IdentityDirectory;
use crate::error::{PortalError, PortalResult};
use crate::model::{
    Announcement, Assignment, Attendance, CalendarEvent, GradeEntry, Message, Notification, Parent,
    ReportCard, Role,
    SchoolConfig, SchoolFeatures, SchoolType, Student, TemplateField, TimetableSlot, TuitionInvoice,
    User, UserRef,
};
use crate::notifications::{unread_count, visible_to};
use crate::registry::SchoolRegistry;
use crate::resolver::Session;
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DashboardKind {
    Student,
    Parent,
    Teacher,
    Administrator,
}

pub fn route(session: &Session) -> DashboardKind {
    route_role(session.role)
}

pub fn route_role(role: Role) -> DashboardKind {
    match role {
        Role::Student => DashboardKind::Student,
        Role::Parent => DashboardKind::Parent,
        Role::Teacher => DashboardKind::Teacher,
        Role::Administrator => DashboardKind::Administrator,
    }
}

/// Routes a role name coming off the wire.
pub fn route_name(raw: &str) -> PortalResult<DashboardKind> {
    Role::parse(raw).map(route_role)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tab {
    Home,
    Children,
    Students,
    Messages,
    Notices,
    Calendar,
    Counseling,
    Bus,
    Dashboard,
    Content,
    Reports,
}

impl Tab {
    const ALL: [Tab; 11] = [
        Tab::Home,
        Tab::Children,
        Tab::Students,
        Tab::Messages,
        Tab::Notices,
        Tab::Calendar,
        Tab::Counseling,
        Tab::Bus,
        Tab::Dashboard,
        Tab::Content,
        Tab::Reports,
    ];

    pub fn parse(raw: &str) -> PortalResult<Tab> {
        let t = raw.trim();
        Tab::ALL
            .into_iter()
            .find(|tab| format!("{:?}", tab).eq_ignore_ascii_case(t))
            .ok_or_else(|| PortalError::InvalidInput(format!("unknown tab: {}", t)))
    }
}

/// Navigation items for a dashboard; the first entry is the default tab.
pub fn tabs_for(kind: DashboardKind, features: &SchoolFeatures) -> Vec<Tab> {
    let mut tabs = match kind {
        DashboardKind::Student => vec![Tab::Home, Tab::Notices, Tab::Calendar],
        DashboardKind::Parent => vec![Tab::Children, Tab::Messages, Tab::Notices, Tab::Calendar],
        DashboardKind::Teacher => vec![Tab::Students, Tab::Messages, Tab::Notices, Tab::Calendar],
        DashboardKind::Administrator => vec![Tab::Dashboard, Tab::Content, Tab::Reports],
    };
    match kind {
        DashboardKind::Student if features.college_counseling_portal => tabs.push(Tab::Counseling),
        DashboardKind::Parent if features.school_bus_tracking => tabs.push(Tab::Bus),
        _ => {}
    }
    tabs
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Pane {
    Overview,
    ReportCard,
}

impl Pane {
    pub fn parse(raw: &str) -> PortalResult<Pane> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "overview" => Ok(Pane::Overview),
            "reportcard" | "report_card" => Ok(Pane::ReportCard),
            other => Err(PortalError::InvalidInput(format!("unknown pane: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Compose {
    News,
    Calendar,
}

impl Compose {
    pub fn parse(raw: &str) -> PortalResult<Compose> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "news" => Ok(Compose::News),
            "calendar" => Ok(Compose::Calendar),
            other => Err(PortalError::InvalidInput(format!("unknown compose mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum Drill {
    List,
    #[serde(rename_all = "camelCase")]
    Detail { entity_id: u64, pane: Pane },
}

/// Per-dashboard navigation. Rebuilt from scratch on every resolve, switch
/// and logout, so nothing carries over between sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub kind: DashboardKind,
    pub tabs: Vec<Tab>,
    pub active_tab: Tab,
    pub drill: Drill,
    pub compose: Option<Compose>,
}

impl DashboardState {
    pub fn for_session(session: &Session) -> Self {
        let kind = route(session);
        let tabs = tabs_for(kind, &session.school.features);
        let active_tab = tabs[0];
        Self {
            kind,
            tabs,
            active_tab,
            drill: Drill::List,
            compose: None,
        }
    }

    pub fn select_tab(&mut self, tab: Tab) -> PortalResult<()> {
        if !self.tabs.contains(&tab) {
            return Err(PortalError::InvalidInput(format!(
                "{:?} is not available on this dashboard",
                tab
            )));
        }
        self.active_tab = tab;
        self.drill = Drill::List;
        self.compose = None;
        Ok(())
    }

    /// Tab whose list supports drilling into one entity, if any.
    pub fn drill_tab(&self) -> Option<Tab> {
        match self.kind {
            DashboardKind::Parent => Some(Tab::Children),
            DashboardKind::Teacher => Some(Tab::Students),
            _ => None,
        }
    }

    /// `allowed` is the id list currently shown on the tab.
    pub fn open(&mut self, entity_id: u64, allowed: &[u64]) -> PortalResult<()> {
        if self.drill_tab() != Some(self.active_tab) {
            return Err(PortalError::InvalidState(format!(
                "nothing to open on the {:?} tab",
                self.active_tab
            )));
        }
        if !allowed.contains(&entity_id) {
            return Err(PortalError::not_found("student", entity_id));
        }
        self.drill = Drill::Detail {
            entity_id,
            pane: Pane::Overview,
        };
        Ok(())
    }

    pub fn back(&mut self) -> PortalResult<()> {
        if let Drill::Detail { .. } = self.drill {
            self.drill = Drill::List;
            return Ok(());
        }
        if self.compose.take().is_some() {
            return Ok(());
        }
        if self.kind == DashboardKind::Administrator && self.active_tab != self.tabs[0] {
            self.active_tab = self.tabs[0];
            return Ok(());
        }
        Err(PortalError::InvalidState("already at the top level".to_string()))
    }

    pub fn set_pane(&mut self, pane: Pane) -> PortalResult<()> {
        match (&self.kind, &mut self.drill) {
            (DashboardKind::Teacher, Drill::Detail { pane: current, .. }) => {
                *current = pane;
                Ok(())
            }
            (DashboardKind::Parent, Drill::Detail { .. }) if pane == Pane::Overview => Ok(()),
            _ => Err(PortalError::InvalidState(
                "panes exist only on a teacher's student detail".to_string(),
            )),
        }
    }

    pub fn compose(&mut self, mode: Compose) -> PortalResult<()> {
        if self.kind != DashboardKind::Administrator || self.active_tab != Tab::Content {
            return Err(PortalError::InvalidState(
                "compose is only available on the administrator Content tab".to_string(),
            ));
        }
        self.compose = Some(mode);
        Ok(())
    }
}

/// School-scoped queries over the seeded data.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub directory: &'a IdentityDirectory,
    pub registry: &'a SchoolRegistry,
    pub store: &'a EntityStore,
}

impl<'a> Scope<'a> {
    pub fn students(&self, school_id: &str) -> Vec<&'a Student> {
        let directory = self.directory;
        self.store
            .users()
            .filter_map(|u| u.as_student())
            .filter(|s| directory.is_member(s.id, school_id))
            .collect()
    }

    pub fn members(&self, school_id: &str, role: Role) -> Vec<&'a User> {
        let directory = self.directory;
        self.store
            .users()
            .filter(|u| u.role() == role && directory.is_member(u.id(), school_id))
            .collect()
    }

    /// Children of `parent` enrolled at `school_id`.
    pub fn children(&self, parent: &Parent, school_id: &str) -> Vec<&'a Student> {
        parent
            .children_ids
            .iter()
            .filter_map(|id| self.store.get(*id))
            .filter_map(|u| u.as_student())
            .filter(|s| self.directory.is_member(s.id, school_id))
            .collect()
    }

    /// Students a teacher sees: the school's students in the grades they
    /// teach, or every student when no grades are configured.
    pub fn roster(&self, teacher_id: u64, school_id: &str) -> Vec<&'a Student> {
        let grades = self
            .store
            .get(teacher_id)
            .and_then(|u| u.as_teacher())
            .and_then(|t| t.teaches_grades.clone());
        self.students(school_id)
            .into_iter()
            .filter(|s| match &grades {
                Some(g) => s
                    .grade_level
                    .as_ref()
                    .map(|lvl| g.contains(lvl))
                    .unwrap_or(false),
                None => true,
            })
            .collect()
    }

    /// Students visible to the session in its current school.
    pub fn visible_students(&self, session: &Session) -> Vec<&'a Student> {
        let school = session.school_id();
        match &session.user {
            User::Student(_) => self
                .students(school)
                .into_iter()
                .filter(|s| s.id == session.user_id())
                .collect(),
            User::Parent(p) => self.children(p, school),
            User::Teacher(_) => self.roster(session.user_id(), school),
            User::Administrator(_) => self.students(school),
        }
    }

    /// Who the session user may message.
    pub fn contacts(&self, session: &Session) -> Vec<&'a User> {
        let school = session.school_id();
        match session.role {
            Role::Student => vec![],
            Role::Parent => {
                let mut out = self.members(school, Role::Teacher);
                out.extend(self.members(school, Role::Administrator));
                out
            }
            Role::Teacher => self.members(school, Role::Parent),
            Role::Administrator => {
                let mut out = self.members(school, Role::Teacher);
                out.extend(self.members(school, Role::Parent));
                out
            }
        }
    }

    /// Notifications for the session user in its current school.
    pub fn notifications(&self, session: &Session) -> Vec<Notification> {
        visible_to(
            session.role,
            session.user_id(),
            &self.store.notifications_for(session.school_id()),
        )
    }

    /// Messages exchanged with the session's contacts, oldest first; only
    /// one conversation when `contact_id` is given.
    pub fn conversation(&self, session: &Session, contact_id: Option<u64>) -> Vec<&'a Message> {
        let me = session.user_id();
        let contacts: HashSet<u64> = self.contacts(session).iter().map(|u| u.id()).collect();
        self.store
            .messages_for(me, contact_id)
            .into_iter()
            .filter(|m| {
                let other = if m.sender_id == me { m.receiver_id } else { m.sender_id };
                contacts.contains(&other)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolBadge {
    pub id: String,
    pub name: String,
    pub primary_color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    /// First letter of the name, shown when there is no logo.
    pub initial: String,
    pub school_type: SchoolType,
}

impl From<&SchoolConfig> for SchoolBadge {
    fn from(s: &SchoolConfig) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            primary_color: s.primary_color.clone(),
            logo_url: s.logo_url.clone().filter(|u| !u.trim().is_empty()),
            initial: s.name.chars().next().map(String::from).unwrap_or_default(),
            school_type: s.school_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub school: SchoolBadge,
    pub user: UserRef,
    pub tabs: Vec<Tab>,
    pub active_tab: Tab,
    pub unread_notifications: usize,
    pub switchable_schools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticesPanel {
    pub announcements: Vec<Announcement>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarPanel {
    pub events: Vec<CalendarEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesPanel {
    pub contacts: Vec<UserRef>,
    pub unread: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub student: UserRef,
    pub grades: Vec<GradeEntry>,
    pub attendance: Attendance,
    pub attendance_rate: Option<f64>,
    pub report_cards: Vec<ReportCard>,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "panel", rename_all = "camelCase")]
pub enum StudentPanel {
    #[serde(rename_all = "camelCase")]
    Home {
        record: StudentRecord,
        timetable: Vec<TimetableSlot>,
    },
    Notices(NoticesPanel),
    Calendar(CalendarPanel),
    #[serde(rename_all = "camelCase")]
    Counseling {
        grade_level: Option<String>,
        transcript: Vec<GradeEntry>,
        report_cards: Vec<ReportCard>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "panel", rename_all = "camelCase")]
pub enum ParentPanel {
    Children { children: Vec<UserRef> },
    #[serde(rename_all = "camelCase")]
    ChildDetail {
        record: StudentRecord,
        invoices: Vec<TuitionInvoice>,
    },
    Messages(MessagesPanel),
    Notices(NoticesPanel),
    Calendar(CalendarPanel),
    Bus { riders: Vec<UserRef> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "panel", rename_all = "camelCase")]
pub enum TeacherPanel {
    Students { students: Vec<UserRef> },
    #[serde(rename_all = "camelCase")]
    StudentDetail {
        record: StudentRecord,
        pane: Pane,
        term: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        template: Option<Vec<TemplateField>>,
    },
    Messages(MessagesPanel),
    Notices(NoticesPanel),
    Calendar(CalendarPanel),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "panel", rename_all = "camelCase")]
pub enum AdminPanel {
    #[serde(rename_all = "camelCase")]
    Dashboard {
        students: usize,
        teachers: usize,
        parents: usize,
        announcements: usize,
        events: usize,
    },
    #[serde(rename_all = "camelCase")]
    Content {
        compose: Option<Compose>,
        recent_posts: Vec<Announcement>,
        upcoming: Vec<CalendarEvent>,
    },
    #[serde(rename_all = "camelCase")]
    Reports {
        term: String,
        template: Vec<TemplateField>,
        issued: usize,
        total: usize,
        completion_percent: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "dashboard")]
pub enum DashboardViewModel {
    Student {
        #[serde(flatten)]
        header: Header,
        view: StudentPanel,
    },
    Parent {
        #[serde(flatten)]
        header: Header,
        view: ParentPanel,
    },
    Teacher {
        #[serde(flatten)]
        header: Header,
        view: TeacherPanel,
    },
    Administrator {
        #[serde(flatten)]
        header: Header,
        view: AdminPanel,
    },
}

const RECENT_POSTS: usize = 2;

impl<'a> Scope<'a> {
    pub fn view(&self, session: &Session, state: &DashboardState, term: &str) -> PortalResult<DashboardViewModel> {
        let school_id = session.school_id();
        let notes = self.notifications(session);
        let header = Header {
            school: SchoolBadge::from(&session.school),
            user: UserRef::from(&session.user),
            tabs: state.tabs.clone(),
            active_tab: state.active_tab,
            unread_notifications: unread_count(&notes),
            switchable_schools: session.school_ids().into_iter().map(String::from).collect(),
        };

        let vm = match state.kind {
            DashboardKind::Student => DashboardViewModel::Student {
                header,
                view: self.student_panel(session, state)?,
            },
            DashboardKind::Parent => DashboardViewModel::Parent {
                header,
                view: self.parent_panel(session, state)?,
            },
            DashboardKind::Teacher => DashboardViewModel::Teacher {
                header,
                view: self.teacher_panel(session, state, term)?,
            },
            DashboardKind::Administrator => DashboardViewModel::Administrator {
                header,
                view: self.admin_panel(session, state, term),
            },
        };
        Ok(vm)
    }

    fn record(&self, student: &Student, school_id: &str) -> StudentRecord {
        StudentRecord {
            student: UserRef::from(&User::Student(student.clone())),
            grades: student.grades.clone(),
            attendance: student.attendance,
            attendance_rate: student.attendance.present_rate(),
            report_cards: self
                .store
                .report_cards_for(student.id)
                .into_iter()
                .filter(|r| r.issued)
                .cloned()
                .collect(),
            assignments: self
                .store
                .assignments_for(school_id)
                .into_iter()
                .filter(|a| a.applies_to(student))
                .cloned()
                .collect(),
        }
    }

    fn notices(&self, school_id: &str) -> NoticesPanel {
        NoticesPanel {
            announcements: self
                .store
                .announcements_for(school_id)
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    fn calendar(&self, school_id: &str) -> CalendarPanel {
        CalendarPanel {
            events: self.store.events_for(school_id).into_iter().cloned().collect(),
        }
    }

    fn messages(&self, session: &Session) -> MessagesPanel {
        let me = session.user_id();
        MessagesPanel {
            contacts: self.contacts(session).into_iter().map(UserRef::from).collect(),
            unread: self
                .conversation(session, None)
                .into_iter()
                .filter(|m| m.receiver_id == me && !m.read)
                .count(),
        }
    }

    fn current_student(&self, session: &Session) -> PortalResult<&'a Student> {
        self.store
            .get(session.user_id())
            .and_then(|u| u.as_student())
            .ok_or_else(|| PortalError::configuration(format!("user {} is not a student", session.user_id())))
    }

    fn detail_student(&self, session: &Session, id: u64) -> PortalResult<&'a Student> {
        self.visible_students(session)
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| PortalError::not_found("student", id))
    }

    fn student_panel(&self, session: &Session, state: &DashboardState) -> PortalResult<StudentPanel> {
        let school_id = session.school_id();
        Ok(match state.active_tab {
            Tab::Notices => StudentPanel::Notices(self.notices(school_id)),
            Tab::Calendar => StudentPanel::Calendar(self.calendar(school_id)),
            Tab::Counseling => {
                let me = self.current_student(session)?;
                StudentPanel::Counseling {
                    grade_level: me.grade_level.clone(),
                    transcript: me.grades.clone(),
                    report_cards: self.record(me, school_id).report_cards,
                }
            }
            _ => {
                let me = self.current_student(session)?;
                StudentPanel::Home {
                    record: self.record(me, school_id),
                    timetable: me.timetable.clone(),
                }
            }
        })
    }

    fn parent_panel(&self, session: &Session, state: &DashboardState) -> PortalResult<ParentPanel> {
        let school_id = session.school_id();
        let children = || -> Vec<UserRef> {
            self.visible_students(session)
                .into_iter()
                .map(|s| UserRef::from(&User::Student(s.clone())))
                .collect()
        };
        Ok(match (state.active_tab, state.drill) {
            (Tab::Children, Drill::Detail { entity_id, .. }) => {
                let child = self.detail_student(session, entity_id)?;
                ParentPanel::ChildDetail {
                    record: self.record(child, school_id),
                    invoices: self
                        .store
                        .invoices_for(child.id)
                        .into_iter()
                        .filter(|i| i.school_id == school_id)
                        .cloned()
                        .collect(),
                }
            }
            (Tab::Messages, _) => ParentPanel::Messages(self.messages(session)),
            (Tab::Notices, _) => ParentPanel::Notices(self.notices(school_id)),
            (Tab::Calendar, _) => ParentPanel::Calendar(self.calendar(school_id)),
            (Tab::Bus, _) => ParentPanel::Bus { riders: children() },
            _ => ParentPanel::Children { children: children() },
        })
    }

    fn teacher_panel(&self, session: &Session, state: &DashboardState, term: &str) -> PortalResult<TeacherPanel> {
        let school_id = session.school_id();
        Ok(match (state.active_tab, state.drill) {
            (Tab::Students, Drill::Detail { entity_id, pane }) => {
                let student = self.detail_student(session, entity_id)?;
                TeacherPanel::StudentDetail {
                    record: self.record(student, school_id),
                    pane,
                    term: term.to_string(),
                    template: (pane == Pane::ReportCard).then(|| self.registry.template(school_id)),
                }
            }
            (Tab::Messages, _) => TeacherPanel::Messages(self.messages(session)),
            (Tab::Notices, _) => TeacherPanel::Notices(self.notices(school_id)),
            (Tab::Calendar, _) => TeacherPanel::Calendar(self.calendar(school_id)),
            _ => TeacherPanel::Students {
                students: self
                    .visible_students(session)
                    .into_iter()
                    .map(|s| UserRef::from(&User::Student(s.clone())))
                    .collect(),
            },
        })
    }

    fn admin_panel(&self, session: &Session, state: &DashboardState, term: &str) -> AdminPanel {
        let school_id = session.school_id();
        match state.active_tab {
            Tab::Content => AdminPanel::Content {
                compose: state.compose,
                recent_posts: self
                    .store
                    .announcements_for(school_id)
                    .into_iter()
                    .take(RECENT_POSTS)
                    .cloned()
                    .collect(),
                upcoming: self.calendar(school_id).events,
            },
            Tab::Reports => {
                let (issued, total) = self.report_progress(school_id, term);
                AdminPanel::Reports {
                    term: term.to_string(),
                    template: self.registry.template(school_id),
                    issued,
                    total,
                    completion_percent: if total == 0 {
                        0.0
                    } else {
                        100.0 * issued as f64 / total as f64
                    },
                }
            }
            _ => AdminPanel::Dashboard {
                students: self.students(school_id).len(),
                teachers: self.members(school_id, Role::Teacher).len(),
                parents: self.members(school_id, Role::Parent).len(),
                announcements: self.store.announcements_for(school_id).len(),
                events: self.store.events_for(school_id).len(),
            },
        }
    }

    /// (students with an issued card for `term`, students at the school)
    pub fn report_progress(&self, school_id: &str, term: &str) -> (usize, usize) {
        let students = self.students(school_id);
        let issued = students
            .iter()
            .filter(|s| {
                self.store
                    .report_cards()
                    .iter()
                    .any(|r| r.student_id == s.id && r.term == term && r.issued)
            })
            .count();
        (issued, students.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{Resolution, Resolver, SchoolChoice};
    use crate::seed::{Dataset, Seed};

    fn demo() -> Dataset {
        Dataset::build(Seed::demo().expect("seed")).expect("dataset")
    }

    fn login(ds: &Dataset, email: &str, school: Option<&str>) -> Session {
        let r = Resolver::new(&ds.directory, &ds.registry, &ds.store);
        match r.resolve(email).expect("resolve") {
            Resolution::Resolved(s) => s,
            Resolution::SchoolSelection { candidates, .. } => r
                .select(
                    &candidates,
                    &SchoolChoice::School {
                        school_id: school.expect("school needed").to_string(),
                        role: None,
                    },
                )
                .expect("select"),
        }
    }

    fn scope(ds: &Dataset) -> Scope<'_> {
        Scope {
            directory: &ds.directory,
            registry: &ds.registry,
            store: &ds.store,
        }
    }

    #[test]
    fn every_role_routes_to_its_dashboard() {
        assert_eq!(route_role(Role::Student), DashboardKind::Student);
        assert_eq!(route_role(Role::Parent), DashboardKind::Parent);
        assert_eq!(route_role(Role::Teacher), DashboardKind::Teacher);
        assert_eq!(route_role(Role::Administrator), DashboardKind::Administrator);
        assert_eq!(route_name("admin").expect("admin"), DashboardKind::Administrator);
        assert_eq!(route_name("Janitor").expect_err("unknown").code(), "unknown_role");
    }

    #[test]
    fn feature_flags_add_tabs() {
        let none = SchoolFeatures::default();
        let all = SchoolFeatures {
            school_bus_tracking: true,
            college_counseling_portal: true,
        };
        assert_eq!(tabs_for(DashboardKind::Parent, &none).len(), 4);
        assert!(tabs_for(DashboardKind::Parent, &all).contains(&Tab::Bus));
        assert!(tabs_for(DashboardKind::Student, &all).contains(&Tab::Counseling));
        assert!(!tabs_for(DashboardKind::Teacher, &all).contains(&Tab::Bus));
        assert_eq!(tabs_for(DashboardKind::Administrator, &all)[0], Tab::Dashboard);
    }

    #[test]
    fn parent_children_follow_active_school() {
        let ds = demo();
        let ea = login(&ds, "priya.sharma@gmail.com", Some("ea"));
        let ids: Vec<u64> = scope(&ds).visible_students(&ea).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1]);

        let r = Resolver::new(&ds.directory, &ds.registry, &ds.store);
        let his = r.switch_school(&ea, "his", None).expect("switch");
        let ids: Vec<u64> = scope(&ds).visible_students(&his).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![13]);
    }

    #[test]
    fn drill_down_goes_list_detail_list() {
        let ds = demo();
        let session = login(&ds, "priya.sharma@gmail.com", Some("ea"));
        let mut state = DashboardState::for_session(&session);
        assert_eq!(state.active_tab, Tab::Children);

        let err = state.open(13, &[1]).expect_err("other school");
        assert_eq!(err.code(), "not_found");

        state.open(1, &[1]).expect("open");
        let vm = scope(&ds).view(&session, &state, "Fall 2024").expect("view");
        match vm {
            DashboardViewModel::Parent {
                view: ParentPanel::ChildDetail { record, invoices },
                ..
            } => {
                assert_eq!(record.student.id, 1);
                assert_eq!(invoices.len(), 1);
            }
            other => panic!("unexpected view {:?}", other),
        }

        state.back().expect("back");
        assert_eq!(state.drill, Drill::List);
        assert!(state.back().is_err());
    }

    #[test]
    fn tab_change_clears_drill_down() {
        let ds = demo();
        let session = login(&ds, "dr.wallace@lpa.edu", None);
        let mut state = DashboardState::for_session(&session);
        state.open(11, &[11]).expect("open");
        state.set_pane(Pane::ReportCard).expect("pane");
        state.select_tab(Tab::Notices).expect("tab");
        assert_eq!(state.drill, Drill::List);
        assert!(state.select_tab(Tab::Bus).is_err());
        assert!(state.open(11, &[11]).is_err());
    }

    #[test]
    fn teacher_roster_respects_taught_grades() {
        let ds = demo();
        let wallace = login(&ds, "dr.wallace@lpa.edu", None);
        let ids: Vec<u64> = scope(&ds).visible_students(&wallace).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![11]);

        let thapa = login(&ds, "mr.thapa@classbridge.edu", Some("lpa"));
        let ids: Vec<u64> = scope(&ds).visible_students(&thapa).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![11, 12]);
    }

    #[test]
    fn report_card_pane_carries_school_template() {
        let ds = demo();
        let session = login(&ds, "dr.wallace@lpa.edu", None);
        let mut state = DashboardState::for_session(&session);
        state.open(11, &[11]).expect("open");
        state.set_pane(Pane::ReportCard).expect("pane");
        let vm = scope(&ds).view(&session, &state, "Fall 2024").expect("view");
        let DashboardViewModel::Teacher {
            view: TeacherPanel::StudentDetail { template, .. },
            ..
        } = vm
        else {
            panic!("expected student detail");
        };
        let ids: Vec<String> = template.expect("template").into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["academic_progress", "conduct", "next_term_goals"]);
    }

    #[test]
    fn admin_reports_progress_and_compose() {
        let ds = demo();
        let session = login(&ds, "principal.lpa@lpa.edu", None);
        assert_eq!(scope(&ds).report_progress("lpa", "Fall 2024"), (1, 2));

        let mut state = DashboardState::for_session(&session);
        assert!(state.compose(Compose::News).is_err());
        state.select_tab(Tab::Content).expect("content");
        state.compose(Compose::Calendar).expect("compose");
        state.back().expect("leave compose");
        assert_eq!(state.compose, None);
        state.back().expect("back to dashboard");
        assert_eq!(state.active_tab, Tab::Dashboard);
    }

    #[test]
    fn header_counts_unread_relevant_notifications() {
        let ds = demo();
        let session = login(&ds, "susan.carter@gmail.com", None);
        let state = DashboardState::for_session(&session);
        let vm = scope(&ds).view(&session, &state, "Fall 2024").expect("view");
        // Welcome (All) + Fee Reminder (Parent); the read broadcast does not count.
        let json = serde_json::to_value(&vm).expect("json");
        assert_eq!(json["unreadNotifications"], 2);
        assert_eq!(json["school"]["primaryColor"], "#002D62");
    }
}
