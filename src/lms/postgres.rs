use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar};

use super::Lms;
use crate::{
    db::Db,
    error::{Error, Result},
    models::*,
};

/// Course context level as stored in the context table.
const CONTEXT_COURSE: i64 = 50;

const EVENT_COLUMNS: &str = "id, name, description, format, courseid, groupid, userid, repeatid, \
     modulename, instance, eventtype, timestart, timeduration, visible, uuid, sequence, \
     timemodified, subscriptionid";

/// [`Lms`] backed by the LMS database itself.
#[derive(Clone)]
pub struct PgLms {
    db: Db,
    prefix: String,
}

impl PgLms {
    pub fn new(db: Db, prefix: impl Into<String>) -> Self {
        Self {
            db,
            prefix: prefix.into(),
        }
    }

    /// Quoted, prefixed table name.
    fn t(&self, name: &str) -> String {
        format!("\"{}{}\"", self.prefix, name)
    }
}

#[async_trait]
impl Lms for PgLms {
    async fn user_by_token(&self, token: &str, service: &str, now: i64) -> Result<Option<Caller>> {
        let sql = format!(
            r#"
            SELECT u.id, u.username
            FROM {tokens} t
            JOIN {services} s ON s.id = t.externalserviceid AND s.shortname = $2 AND s.enabled = 1
            JOIN {user} u ON u.id = t.userid
            WHERE t.token = $1
              AND (t.validuntil = 0 OR t.validuntil > $3)
              AND u.deleted = 0 AND u.suspended = 0
            "#,
            tokens = self.t("external_tokens"),
            services = self.t("external_services"),
            user = self.t("user"),
        );
        Ok(query_as::<_, Caller>(&sql)
            .bind(token)
            .bind(service)
            .bind(now)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn is_site_admin(&self, userid: i64) -> Result<bool> {
        let admins = self.site_config("siteadmins").await?.unwrap_or_default();
        Ok(admins
            .split(',')
            .filter_map(|id| id.trim().parse::<i64>().ok())
            .any(|id| id == userid))
    }

    async fn site_config(&self, name: &str) -> Result<Option<String>> {
        let sql = format!("SELECT value FROM {} WHERE name = $1", self.t("config"));
        Ok(query_scalar::<_, String>(&sql)
            .bind(name)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn plugin_config(&self, plugin: &str, name: &str) -> Result<Option<String>> {
        let sql = format!(
            "SELECT value FROM {} WHERE plugin = $1 AND name = $2",
            self.t("config_plugins")
        );
        Ok(query_scalar::<_, String>(&sql)
            .bind(plugin)
            .bind(name)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn set_plugin_config(&self, plugin: &str, name: &str, value: &str) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (plugin, name, value) VALUES ($1, $2, $3)
            ON CONFLICT (plugin, name) DO UPDATE SET value = EXCLUDED.value
            "#,
            self.t("config_plugins")
        );
        query(&sql)
            .bind(plugin)
            .bind(name)
            .bind(value)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn course_by_idnumber(&self, idnumber: &str) -> Result<Option<Course>> {
        let sql = format!(
            "SELECT id, idnumber, shortname, fullname, visible, cacherev FROM {} \
             WHERE idnumber = $1 ORDER BY id LIMIT 1",
            self.t("course")
        );
        Ok(query_as::<_, Course>(&sql)
            .bind(idnumber)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn accessible_course_ids(&self, userid: i64, now: i64) -> Result<Vec<i64>> {
        let sql = format!(
            r#"
            SELECT DISTINCT c.id
            FROM {course} c
            JOIN {enrol} e ON e.courseid = c.id AND e.status = {active}
            JOIN {ue} ue ON ue.enrolid = e.id AND ue.userid = $1 AND ue.status = {active}
            WHERE c.visible = 1
              AND ue.timestart <= $2
              AND (ue.timeend = 0 OR ue.timeend > $2)
            ORDER BY c.id
            "#,
            course = self.t("course"),
            enrol = self.t("enrol"),
            ue = self.t("user_enrolments"),
            active = ENROL_ACTIVE,
        );
        Ok(query_scalar::<_, i64>(&sql)
            .bind(userid)
            .bind(now)
            .fetch_all(&self.db)
            .await?)
    }

    async fn user_group_ids(&self, userid: i64) -> Result<Vec<i64>> {
        let sql = format!("SELECT groupid FROM {} WHERE userid = $1", self.t("groups_members"));
        Ok(query_scalar::<_, i64>(&sql)
            .bind(userid)
            .fetch_all(&self.db)
            .await?)
    }

    async fn role_by_shortname(&self, shortname: &str) -> Result<Option<Role>> {
        let sql = format!("SELECT id, shortname FROM {} WHERE shortname = $1", self.t("role"));
        Ok(query_as::<_, Role>(&sql)
            .bind(shortname)
            .fetch_optional(&self.db)
            .await?)
    }

    async fn enrol_instances(&self, courseid: i64) -> Result<Vec<EnrolInstance>> {
        let sql = format!(
            "SELECT id, enrol, courseid, status, enrolperiod, roleid FROM {} \
             WHERE courseid = $1 ORDER BY sortorder, id",
            self.t("enrol")
        );
        Ok(query_as::<_, EnrolInstance>(&sql)
            .bind(courseid)
            .fetch_all(&self.db)
            .await?)
    }

    async fn enrol_user(&self, e: &NewEnrolment) -> Result<()> {
        let mut tx = self.db.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO {} (status, enrolid, userid, timestart, timeend,
                            modifierid, timecreated, timemodified)
            VALUES ($1, $2, $3, $4, $5, $3, $6, $6)
            ON CONFLICT (enrolid, userid) DO NOTHING
            "#,
            self.t("user_enrolments")
        );
        query(&sql)
            .bind(ENROL_ACTIVE)
            .bind(e.instance_id)
            .bind(e.userid)
            .bind(e.timestart)
            .bind(e.timeend)
            .bind(e.now)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "SELECT id FROM {} WHERE contextlevel = $1 AND instanceid = $2",
            self.t("context")
        );
        let contextid = query_scalar::<_, i64>(&sql)
            .bind(CONTEXT_COURSE)
            .bind(e.courseid)
            .fetch_one(&mut *tx)
            .await?;

        let sql = format!(
            r#"
            INSERT INTO {ra} (roleid, contextid, userid, component, itemid,
                              timemodified, modifierid, sortorder)
            SELECT $1, $2, $3, '', 0, $4, $3, 0
            WHERE NOT EXISTS (
                SELECT 1 FROM {ra}
                WHERE roleid = $1 AND contextid = $2 AND userid = $3
                  AND component = '' AND itemid = 0
            )
            "#,
            ra = self.t("role_assignments")
        );
        query(&sql)
            .bind(e.roleid)
            .bind(contextid)
            .bind(e.userid)
            .bind(e.now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn calendar_events(&self, q: &EventQuery) -> Result<Vec<CalendarEvent>> {
        let sql = format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM {}
            WHERE groupid = 0
              AND courseid = ANY($1)
              AND timestart <= $3
              AND (timestart >= $2 OR timestart + timeduration > $2)
              AND ($4 = FALSE OR visible = 1)
            ORDER BY timestart, id
            "#,
            self.t("event")
        );
        Ok(query_as::<_, CalendarEvent>(&sql)
            .bind(&q.courseids)
            .bind(q.timestart)
            .bind(q.timeend)
            .bind(q.ignorehidden)
            .fetch_all(&self.db)
            .await?)
    }

    async fn calendar_events_by_id(&self, ids: &[i64]) -> Result<Vec<CalendarEvent>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM {} WHERE id = ANY($1) ORDER BY id",
            self.t("event")
        );
        Ok(query_as::<_, CalendarEvent>(&sql)
            .bind(ids)
            .fetch_all(&self.db)
            .await?)
    }

    async fn feedback_instances(&self, courseid: i64) -> Result<Vec<Feedback>> {
        let sql = format!(
            r#"
            SELECT f.id, f.course, f.name, f.page_after_submit, f.timeopen, f.timeclose
            FROM {feedback} f
            JOIN {cm} cm ON cm.instance = f.id AND cm.course = f.course
            JOIN {modules} m ON m.id = cm.module AND m.name = 'feedback'
            WHERE f.course = $1 AND cm.visible = 1 AND cm.deletioninprogress = 0
            ORDER BY cm.id
            "#,
            feedback = self.t("feedback"),
            cm = self.t("course_modules"),
            modules = self.t("modules"),
        );
        Ok(query_as::<_, Feedback>(&sql)
            .bind(courseid)
            .fetch_all(&self.db)
            .await?)
    }

    async fn feedback_submitted(&self, feedbackid: i64, userid: i64) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE feedback = $1 AND userid = $2)",
            self.t("feedback_completed")
        );
        Ok(query_scalar::<_, bool>(&sql)
            .bind(feedbackid)
            .bind(userid)
            .fetch_one(&self.db)
            .await?)
    }

    async fn feedback_items(&self, feedbackid: i64) -> Result<Vec<FeedbackItem>> {
        let sql = format!(
            "SELECT id, feedback, name, typ, presentation, dependitem, dependvalue, position \
             FROM {} WHERE feedback = $1 ORDER BY position, id",
            self.t("feedback_item")
        );
        Ok(query_as::<_, FeedbackItem>(&sql)
            .bind(feedbackid)
            .fetch_all(&self.db)
            .await?)
    }

    async fn complete_feedback(&self, c: &NewFeedbackCompletion) -> Result<Option<i64>> {
        let mut tx = self.db.begin().await?;

        // serializes submissions of the same feedback
        let sql = format!("SELECT id FROM {} WHERE id = $1 FOR UPDATE", self.t("feedback"));
        query(&sql).bind(c.feedback).execute(&mut *tx).await?;

        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE feedback = $1 AND userid = $2)",
            self.t("feedback_completed")
        );
        let done = query_scalar::<_, bool>(&sql)
            .bind(c.feedback)
            .bind(c.userid)
            .fetch_one(&mut *tx)
            .await?;
        if done {
            tx.commit().await?;
            return Ok(None);
        }

        let sql = format!(
            r#"
            INSERT INTO {} (feedback, userid, timemodified, random_response,
                            anonymous_response, courseid)
            VALUES ($1, $2, $3, 0, $4, 0)
            RETURNING id
            "#,
            self.t("feedback_completed")
        );
        let id = query_scalar::<_, i64>(&sql)
            .bind(c.feedback)
            .bind(c.userid)
            .bind(c.timemodified)
            .bind(c.anonymous_response)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(id))
    }

    async fn insert_feedback_value(&self, v: &NewFeedbackValue) -> Result<i64> {
        let sql = format!(
            r#"
            INSERT INTO {} (course_id, item, completed, tmp_completed, value)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
            self.t("feedback_value")
        );
        Ok(query_scalar::<_, i64>(&sql)
            .bind(v.course_id)
            .bind(v.item)
            .bind(v.completed)
            .bind(v.tmp_completed)
            .bind(&v.value)
            .fetch_one(&self.db)
            .await?)
    }

    async fn feedback_values_for(&self, feedbackid: i64) -> Result<Vec<FeedbackValue>> {
        let sql = format!(
            "SELECT id, course_id, item, completed, tmp_completed, value FROM {} \
             WHERE tmp_completed = $1 ORDER BY id",
            self.t("feedback_value")
        );
        Ok(query_as::<_, FeedbackValue>(&sql)
            .bind(feedbackid)
            .fetch_all(&self.db)
            .await?)
    }

    async fn ensure_forum(&self, f: &NewForum) -> Result<Forum> {
        let mut tx = self.db.begin().await?;

        // serializes concurrent first posts in the same course
        let sql = format!("SELECT id FROM {} WHERE id = $1 FOR UPDATE", self.t("course"));
        query(&sql).bind(f.course).execute(&mut *tx).await?;

        let sql = format!(
            "SELECT id, course, name, type, intro FROM {} \
             WHERE course = $1 AND name = $2 ORDER BY id LIMIT 1",
            self.t("forum")
        );
        if let Some(existing) = query_as::<_, Forum>(&sql)
            .bind(f.course)
            .bind(&f.name)
            .fetch_optional(&mut *tx)
            .await?
        {
            tx.commit().await?;
            return Ok(existing);
        }

        let sql = format!("SELECT id FROM {} WHERE name = 'forum'", self.t("modules"));
        let Some(module) = query_scalar::<_, i64>(&sql).fetch_optional(&mut *tx).await? else {
            tx.rollback().await?;
            return Err(Error::ForumModuleMissing);
        };

        let sql = format!(
            r#"
            INSERT INTO {} (course, type, name, intro, introformat, timemodified)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, course, name, type, intro
            "#,
            self.t("forum")
        );
        let forum = query_as::<_, Forum>(&sql)
            .bind(f.course)
            .bind(&f.kind)
            .bind(&f.name)
            .bind(&f.intro)
            .bind(f.introformat)
            .bind(f.now)
            .fetch_one(&mut *tx)
            .await?;

        let sql = format!(
            "SELECT id FROM {} WHERE course = $1 AND section = 0",
            self.t("course_sections")
        );
        let section = match query_scalar::<_, i64>(&sql)
            .bind(f.course)
            .fetch_optional(&mut *tx)
            .await?
        {
            Some(id) => id,
            None => {
                let sql = format!(
                    r#"
                    INSERT INTO {} (course, section, summary, summaryformat, sequence,
                                    visible, timemodified)
                    VALUES ($1, 0, '', 1, '', 1, $2)
                    RETURNING id
                    "#,
                    self.t("course_sections")
                );
                query_scalar::<_, i64>(&sql)
                    .bind(f.course)
                    .bind(f.now)
                    .fetch_one(&mut *tx)
                    .await?
            }
        };

        let sql = format!(
            r#"
            INSERT INTO {} (course, module, instance, section, added, visible, visibleold)
            VALUES ($1, $2, $3, $4, $5, 1, 1)
            RETURNING id
            "#,
            self.t("course_modules")
        );
        let cmid = query_scalar::<_, i64>(&sql)
            .bind(f.course)
            .bind(module)
            .bind(forum.id)
            .bind(section)
            .bind(f.now)
            .fetch_one(&mut *tx)
            .await?;

        let sql = format!(
            r#"
            UPDATE {} SET sequence = CASE
                WHEN COALESCE(sequence, '') = '' THEN $2
                ELSE sequence || ',' || $2
            END
            WHERE id = $1
            "#,
            self.t("course_sections")
        );
        query(&sql)
            .bind(section)
            .bind(cmid.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(course = f.course, forum = forum.id, cm = cmid, "created forum");
        Ok(forum)
    }

    async fn add_discussion(&self, d: &NewDiscussion) -> Result<i64> {
        let mut tx = self.db.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO {} (course, forum, name, firstpost, userid, groupid, assessed,
                            timemodified, usermodified, timestart, timeend)
            VALUES ($1, $2, $3, 0, $4, -1, 1, $5, $4, 0, 0)
            RETURNING id
            "#,
            self.t("forum_discussions")
        );
        let discussion = query_scalar::<_, i64>(&sql)
            .bind(d.course)
            .bind(d.forum)
            .bind(&d.subject)
            .bind(d.userid)
            .bind(d.now)
            .fetch_one(&mut *tx)
            .await?;

        let sql = format!(
            r#"
            INSERT INTO {} (discussion, parent, userid, created, modified, mailed, subject,
                            message, messageformat, messagetrust, mailnow)
            VALUES ($1, 0, $2, $3, $3, 0, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
            self.t("forum_posts")
        );
        let post = query_scalar::<_, i64>(&sql)
            .bind(discussion)
            .bind(d.userid)
            .bind(d.now)
            .bind(&d.subject)
            .bind(&d.message)
            .bind(d.messageformat)
            .bind(d.messagetrust)
            .bind(i64::from(d.mailnow))
            .fetch_one(&mut *tx)
            .await?;

        let sql = format!(
            "UPDATE {} SET firstpost = $2 WHERE id = $1",
            self.t("forum_discussions")
        );
        query(&sql).bind(discussion).bind(post).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(discussion)
    }

    async fn rebuild_course_cache(&self, courseid: i64) -> Result<()> {
        let sql = format!("UPDATE {} SET cacherev = cacherev + 1 WHERE id = $1", self.t("course"));
        query(&sql).bind(courseid).execute(&self.db).await?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1)",
        )
        .bind(format!("{}{}", self.prefix, table))
        .fetch_one(&self.db)
        .await?)
    }

    async fn push_messages(&self, idnumber: &str) -> Result<Vec<PushMessage>> {
        let sql = format!(
            "SELECT id, courseid, \"timestamp\", title, message FROM {} \
             WHERE courseid = $1 ORDER BY \"timestamp\", id",
            self.t(super::PUSH_MESSAGE_TABLE)
        );
        Ok(query_as::<_, PushMessage>(&sql)
            .bind(idnumber)
            .fetch_all(&self.db)
            .await?)
    }
}
