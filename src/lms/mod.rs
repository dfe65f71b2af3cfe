//! Access to the learning management system's records.
//!
//! The web service functions never talk to the database directly; they go
//! through [`Lms`], which answers the questions the host subsystems would
//! (who can access which course, which feedback a user completed, ...) and
//! performs the writes the host would perform.

use async_trait::async_trait;

use crate::{error::Result, models::*};

mod postgres;

pub use postgres::PgLms;

/// Plugin that owns the allow-list setting.
pub const PLUGIN: &str = "local_reflect";

/// Companion table written by the push notification block.
pub const PUSH_MESSAGE_TABLE: &str = "block_pushnotification";

#[async_trait]
pub trait Lms: Send + Sync {
    /// Resolves a token issued for the enabled web service `service` that is
    /// still valid at `now`.
    async fn user_by_token(&self, token: &str, service: &str, now: i64) -> Result<Option<Caller>>;

    async fn is_site_admin(&self, userid: i64) -> Result<bool>;

    async fn site_config(&self, name: &str) -> Result<Option<String>>;

    async fn plugin_config(&self, plugin: &str, name: &str) -> Result<Option<String>>;

    async fn set_plugin_config(&self, plugin: &str, name: &str, value: &str) -> Result<()>;

    /// Looks a course up by its external identifier.
    async fn course_by_idnumber(&self, idnumber: &str) -> Result<Option<Course>>;

    /// Internal ids of the visible courses in which the user has an active
    /// enrolment at `now`.
    async fn accessible_course_ids(&self, userid: i64, now: i64) -> Result<Vec<i64>>;

    async fn user_group_ids(&self, userid: i64) -> Result<Vec<i64>>;

    async fn role_by_shortname(&self, shortname: &str) -> Result<Option<Role>>;

    async fn enrol_instances(&self, courseid: i64) -> Result<Vec<EnrolInstance>>;

    /// Creates the user enrolment and its role assignment atomically.
    /// Enrolling an already enrolled user changes nothing.
    async fn enrol_user(&self, enrolment: &NewEnrolment) -> Result<()>;

    /// Course events inside the query window, ordered by start time.
    async fn calendar_events(&self, query: &EventQuery) -> Result<Vec<CalendarEvent>>;

    async fn calendar_events_by_id(&self, ids: &[i64]) -> Result<Vec<CalendarEvent>>;

    /// Visible feedback activities of a course.
    async fn feedback_instances(&self, courseid: i64) -> Result<Vec<Feedback>>;

    async fn feedback_submitted(&self, feedbackid: i64, userid: i64) -> Result<bool>;

    /// Items of a feedback ordered by their display position.
    async fn feedback_items(&self, feedbackid: i64) -> Result<Vec<FeedbackItem>>;

    /// Records the user's completion of a feedback and returns its id, or
    /// `None` when the user already completed it. The check and the insert
    /// are atomic.
    async fn complete_feedback(&self, completion: &NewFeedbackCompletion) -> Result<Option<i64>>;

    async fn insert_feedback_value(&self, value: &NewFeedbackValue) -> Result<i64>;

    /// Answers recorded for a feedback, looked up by the feedback id stored
    /// on each answer row.
    async fn feedback_values_for(&self, feedbackid: i64) -> Result<Vec<FeedbackValue>>;

    /// Returns the forum with the given name in the course, creating it and
    /// attaching it to the course's first section when it does not exist.
    async fn ensure_forum(&self, forum: &NewForum) -> Result<Forum>;

    /// Starts a discussion with its first post and returns the discussion id.
    async fn add_discussion(&self, discussion: &NewDiscussion) -> Result<i64>;

    async fn rebuild_course_cache(&self, courseid: i64) -> Result<()>;

    async fn table_exists(&self, table: &str) -> Result<bool>;

    async fn push_messages(&self, idnumber: &str) -> Result<Vec<PushMessage>>;
}
