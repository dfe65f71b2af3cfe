use serde::Serialize;
use serde_with::skip_serializing_none;

/// Enrolment instance / user enrolment status meaning "active".
pub const ENROL_ACTIVE: i64 = 0;

/// Feedback item types a mobile client knows how to render.
pub const ANSWERABLE_ITEM_TYPES: [&str; 3] = ["textfield", "textarea", "multichoice"];

/// The authenticated user behind a web service token.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: i64,
    pub username: String,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Course {
    pub id: i64,
    pub idnumber: String, // external course identifier
    pub shortname: String,
    pub fullname: String,
    pub visible: i16,
    pub cacherev: i64,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Role {
    pub id: i64,
    pub shortname: String,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct EnrolInstance {
    pub id: i64,
    pub enrol: String, // plugin name, e.g. "manual"
    pub courseid: i64,
    pub status: i64,
    pub enrolperiod: i64,
    pub roleid: i64,
}

#[derive(Debug, Clone)]
pub struct NewEnrolment {
    pub instance_id: i64,
    pub courseid: i64,
    pub userid: i64,
    pub roleid: i64,
    pub timestart: i64,
    pub timeend: i64,
    pub now: i64,
}

#[skip_serializing_none]
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct CalendarEvent {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub format: i16,
    pub courseid: i64,
    pub groupid: i64,
    pub userid: i64,
    pub repeatid: i64,
    pub modulename: Option<String>,
    pub instance: i64,
    pub eventtype: String,
    pub timestart: i64,
    pub timeduration: i64,
    pub visible: i16,
    pub uuid: String,
    pub sequence: i64,
    pub timemodified: i64,
    pub subscriptionid: Option<i64>,
}

/// Window query over course events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub timestart: i64,
    pub timeend: i64,
    pub courseids: Vec<i64>,
    pub ignorehidden: bool,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Feedback {
    pub id: i64,
    pub course: i64,
    pub name: String,
    pub page_after_submit: Option<String>,
    pub timeopen: i64,
    pub timeclose: i64,
}

impl Feedback {
    /// Open means not scheduled for later and not already closed; zero disables a bound.
    pub fn is_open(&self, now: i64) -> bool {
        let not_yet = self.timeopen != 0 && self.timeopen >= now;
        let closed = self.timeclose != 0 && now >= self.timeclose;
        !not_yet && !closed
    }
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct FeedbackItem {
    pub id: i64,
    pub feedback: i64,
    pub name: String,
    pub typ: String,
    pub presentation: String,
    pub dependitem: i64,
    pub dependvalue: String,
    pub position: i16,
}

#[derive(Debug, Clone)]
pub struct NewFeedbackCompletion {
    pub feedback: i64,
    pub userid: i64,
    pub timemodified: i64,
    pub anonymous_response: i16,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct FeedbackValue {
    pub id: i64,
    pub course_id: i64,
    pub item: i64,
    pub completed: i64,
    pub tmp_completed: i64,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct NewFeedbackValue {
    pub course_id: i64,
    pub item: i64,
    pub completed: i64,
    pub tmp_completed: i64,
    pub value: String,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Forum {
    pub id: i64,
    pub course: i64,
    pub name: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub intro: String,
}

#[derive(Debug, Clone)]
pub struct NewForum {
    pub course: i64,
    pub name: String,
    pub kind: String,
    pub intro: String,
    pub introformat: i16,
    pub now: i64,
}

#[derive(Debug, Clone)]
pub struct NewDiscussion {
    pub course: i64,
    pub forum: i64,
    pub userid: i64,
    pub subject: String,
    pub message: String,
    pub messageformat: i16,
    pub messagetrust: i16,
    pub mailnow: bool,
    pub now: i64,
}

/// Row of the push notification companion table.
#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct PushMessage {
    pub id: i64,
    #[serde(skip)]
    pub courseid: String,
    pub timestamp: i64,
    pub title: String,
    pub message: String,
}
