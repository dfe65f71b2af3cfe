#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use reflect_ws::{
    allowlist::CourseAllowList,
    error::{Error, Result},
    external::Context,
    lms::{Lms, PLUGIN, PUSH_MESSAGE_TABLE},
    models::*,
};

pub const NOW: i64 = 1_700_000_000;
pub const SITE_COURSE: i64 = 1;
pub const STUDENT_ROLE: i64 = 5;

#[derive(Debug, Clone)]
pub struct UserEnrolment {
    pub enrolid: i64,
    pub userid: i64,
    pub status: i64,
    pub timestart: i64,
    pub timeend: i64,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub userid: i64,
    pub service: String,
    pub validuntil: i64,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub id: i64,
    pub feedback: i64,
    pub userid: i64,
    pub anonymous_response: i16,
}

#[derive(Debug, Clone)]
pub struct Discussion {
    pub id: i64,
    pub forum: i64,
    pub userid: i64,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Store {
    next_id: i64,
    pub users: Vec<Caller>,
    pub tokens: HashMap<String, Token>,
    pub site_config: HashMap<String, String>,
    pub plugin_config: HashMap<(String, String), String>,
    pub courses: Vec<Course>,
    pub roles: Vec<Role>,
    pub enrol: Vec<EnrolInstance>,
    pub user_enrolments: Vec<UserEnrolment>,
    /// (roleid, courseid, userid)
    pub role_assignments: Vec<(i64, i64, i64)>,
    /// (groupid, userid)
    pub groups: Vec<(i64, i64)>,
    pub events: Vec<CalendarEvent>,
    pub feedbacks: Vec<Feedback>,
    pub items: Vec<FeedbackItem>,
    pub completions: Vec<Completion>,
    pub values: Vec<FeedbackValue>,
    pub forum_module: bool,
    pub forums: Vec<Forum>,
    /// course id -> comma separated course module ids of section 0
    pub sections: HashMap<i64, String>,
    pub discussions: Vec<Discussion>,
    pub tables: HashSet<String>,
    pub push: Vec<PushMessage>,
}

impl Store {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory LMS with the same observable behavior as the database backend.
#[derive(Default)]
pub struct MemoryLms {
    pub store: Mutex<Store>,
}

impl MemoryLms {
    pub fn new() -> Arc<Self> {
        let lms = Self::default();
        {
            let mut s = lms.store.lock().unwrap();
            s.next_id = 100;
            s.roles.push(Role {
                id: STUDENT_ROLE,
                shortname: "student".into(),
            });
            s.site_config
                .insert("enrol_plugins_enabled".into(), "manual,self".into());
            s.forum_module = true;
            s.tables.insert(PUSH_MESSAGE_TABLE.into());
            s.plugin_config
                .insert((PLUGIN.into(), "courseID".into()), "UPR1".into());
        }
        Arc::new(lms)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        f(&mut self.store.lock().unwrap())
    }

    /// Adds a user whose token is `token-<username>`.
    pub fn add_user(&self, username: &str) -> Caller {
        self.with(|s| {
            let caller = Caller {
                id: s.id(),
                username: username.into(),
            };
            s.users.push(caller.clone());
            let token = Token {
                userid: caller.id,
                service: "reflect".into(),
                validuntil: 0,
            };
            s.tokens.insert(format!("token-{username}"), token);
            caller
        })
    }

    /// Adds a visible course with an enabled manual enrolment instance.
    pub fn add_course(&self, idnumber: &str) -> Course {
        self.with(|s| {
            let course = Course {
                id: s.id(),
                idnumber: idnumber.into(),
                shortname: idnumber.into(),
                fullname: format!("Course {idnumber}"),
                visible: 1,
                cacherev: 0,
            };
            s.courses.push(course.clone());
            let instance = EnrolInstance {
                id: s.id(),
                enrol: "manual".into(),
                courseid: course.id,
                status: ENROL_ACTIVE,
                enrolperiod: 0,
                roleid: STUDENT_ROLE,
            };
            s.enrol.push(instance);
            course
        })
    }

    /// Active enrolment through the course's first instance.
    pub fn enrol(&self, userid: i64, courseid: i64) {
        self.with(|s| {
            let enrolid = s
                .enrol
                .iter()
                .find(|i| i.courseid == courseid)
                .map(|i| i.id)
                .unwrap();
            s.user_enrolments.push(UserEnrolment {
                enrolid,
                userid,
                status: ENROL_ACTIVE,
                timestart: 0,
                timeend: 0,
            });
        })
    }

    pub fn set_allowlist(&self, text: &str) {
        self.with(|s| {
            s.plugin_config
                .insert((PLUGIN.into(), "courseID".into()), text.into())
        });
    }

    pub fn add_event(
        &self,
        courseid: i64,
        timestart: i64,
        f: impl FnOnce(&mut CalendarEvent),
    ) -> i64 {
        self.with(|s| {
            let mut event = CalendarEvent {
                id: s.id(),
                name: "Session".into(),
                description: Some("<p>Room 1</p>".into()),
                format: 1,
                courseid,
                groupid: 0,
                userid: 0,
                repeatid: 0,
                modulename: None,
                instance: 0,
                eventtype: "course".into(),
                timestart,
                timeduration: 0,
                visible: 1,
                uuid: String::new(),
                sequence: 1,
                timemodified: 0,
                subscriptionid: None,
            };
            f(&mut event);
            let id = event.id;
            s.events.push(event);
            id
        })
    }

    pub fn add_feedback(&self, course: i64, name: &str, timeopen: i64, timeclose: i64) -> i64 {
        self.with(|s| {
            let id = s.id();
            s.feedbacks.push(Feedback {
                id,
                course,
                name: name.into(),
                page_after_submit: Some("Thanks".into()),
                timeopen,
                timeclose,
            });
            id
        })
    }

    pub fn add_item(&self, feedback: i64, typ: &str, position: i16) -> i64 {
        self.with(|s| {
            let id = s.id();
            s.items.push(FeedbackItem {
                id,
                feedback,
                name: format!("Question {position}"),
                typ: typ.into(),
                presentation: "r>>>>>yes|no".into(),
                dependitem: 0,
                dependvalue: String::new(),
                position,
            });
            id
        })
    }

    pub fn add_push_message(&self, courseid: &str, title: &str) -> i64 {
        self.with(|s| {
            let id = s.id();
            s.push.push(PushMessage {
                id,
                courseid: courseid.into(),
                timestamp: NOW - 60,
                title: title.into(),
                message: format!("{title} body"),
            });
            id
        })
    }

    pub fn completions_for(&self, feedback: i64, userid: i64) -> usize {
        self.with(|s| {
            s.completions
                .iter()
                .filter(|c| c.feedback == feedback && c.userid == userid)
                .count()
        })
    }
}

/// Request context for `caller` with the allow-list currently stored.
pub fn context(lms: &Arc<MemoryLms>, caller: &Caller) -> Context {
    let raw = lms.with(|s| s.plugin_config.get(&(PLUGIN.into(), "courseID".into())).cloned());
    Context {
        lms: lms.clone(),
        caller: caller.clone(),
        allowlist: CourseAllowList::parse(raw.as_deref()),
        site_course_id: SITE_COURSE,
        now: NOW,
    }
}

#[async_trait]
impl Lms for MemoryLms {
    async fn user_by_token(&self, token: &str, service: &str, now: i64) -> Result<Option<Caller>> {
        Ok(self.with(|s| {
            let token = s.tokens.get(token)?;
            if token.service != service || (token.validuntil != 0 && token.validuntil <= now) {
                return None;
            }
            s.users.iter().find(|u| u.id == token.userid).cloned()
        }))
    }

    async fn is_site_admin(&self, userid: i64) -> Result<bool> {
        Ok(self.with(|s| {
            s.site_config
                .get("siteadmins")
                .map(|v| v.split(',').any(|id| id.trim() == userid.to_string()))
                .unwrap_or(false)
        }))
    }

    async fn site_config(&self, name: &str) -> Result<Option<String>> {
        Ok(self.with(|s| s.site_config.get(name).cloned()))
    }

    async fn plugin_config(&self, plugin: &str, name: &str) -> Result<Option<String>> {
        Ok(self.with(|s| s.plugin_config.get(&(plugin.into(), name.into())).cloned()))
    }

    async fn set_plugin_config(&self, plugin: &str, name: &str, value: &str) -> Result<()> {
        self.with(|s| {
            s.plugin_config
                .insert((plugin.into(), name.into()), value.into())
        });
        Ok(())
    }

    async fn course_by_idnumber(&self, idnumber: &str) -> Result<Option<Course>> {
        Ok(self.with(|s| s.courses.iter().find(|c| c.idnumber == idnumber).cloned()))
    }

    async fn accessible_course_ids(&self, userid: i64, now: i64) -> Result<Vec<i64>> {
        Ok(self.with(|s| {
            let mut ids: Vec<i64> = s
                .user_enrolments
                .iter()
                .filter(|ue| {
                    ue.userid == userid
                        && ue.status == ENROL_ACTIVE
                        && ue.timestart <= now
                        && (ue.timeend == 0 || ue.timeend > now)
                })
                .filter_map(|ue| {
                    s.enrol
                        .iter()
                        .find(|i| i.id == ue.enrolid && i.status == ENROL_ACTIVE)
                })
                .filter(|i| s.courses.iter().any(|c| c.id == i.courseid && c.visible == 1))
                .map(|i| i.courseid)
                .collect();
            ids.sort_unstable();
            ids.dedup();
            ids
        }))
    }

    async fn user_group_ids(&self, userid: i64) -> Result<Vec<i64>> {
        Ok(self.with(|s| {
            s.groups
                .iter()
                .filter(|(_, u)| *u == userid)
                .map(|(g, _)| *g)
                .collect()
        }))
    }

    async fn role_by_shortname(&self, shortname: &str) -> Result<Option<Role>> {
        Ok(self.with(|s| s.roles.iter().find(|r| r.shortname == shortname).cloned()))
    }

    async fn enrol_instances(&self, courseid: i64) -> Result<Vec<EnrolInstance>> {
        Ok(self.with(|s| {
            s.enrol
                .iter()
                .filter(|i| i.courseid == courseid)
                .cloned()
                .collect()
        }))
    }

    async fn enrol_user(&self, e: &NewEnrolment) -> Result<()> {
        self.with(|s| {
            if !s
                .user_enrolments
                .iter()
                .any(|ue| ue.enrolid == e.instance_id && ue.userid == e.userid)
            {
                s.user_enrolments.push(UserEnrolment {
                    enrolid: e.instance_id,
                    userid: e.userid,
                    status: ENROL_ACTIVE,
                    timestart: e.timestart,
                    timeend: e.timeend,
                });
            }
            let ra = (e.roleid, e.courseid, e.userid);
            if !s.role_assignments.contains(&ra) {
                s.role_assignments.push(ra);
            }
        });
        Ok(())
    }

    async fn calendar_events(&self, q: &EventQuery) -> Result<Vec<CalendarEvent>> {
        Ok(self.with(|s| {
            let mut events: Vec<CalendarEvent> = s
                .events
                .iter()
                .filter(|e| {
                    e.groupid == 0
                        && q.courseids.contains(&e.courseid)
                        && e.timestart <= q.timeend
                        && (e.timestart >= q.timestart
                            || e.timestart + e.timeduration > q.timestart)
                        && (!q.ignorehidden || e.visible == 1)
                })
                .cloned()
                .collect();
            events.sort_by_key(|e| (e.timestart, e.id));
            events
        }))
    }

    async fn calendar_events_by_id(&self, ids: &[i64]) -> Result<Vec<CalendarEvent>> {
        Ok(self.with(|s| {
            s.events
                .iter()
                .filter(|e| ids.contains(&e.id))
                .cloned()
                .collect()
        }))
    }

    async fn feedback_instances(&self, courseid: i64) -> Result<Vec<Feedback>> {
        Ok(self.with(|s| {
            s.feedbacks
                .iter()
                .filter(|f| f.course == courseid)
                .cloned()
                .collect()
        }))
    }

    async fn feedback_submitted(&self, feedbackid: i64, userid: i64) -> Result<bool> {
        Ok(self.with(|s| {
            s.completions
                .iter()
                .any(|c| c.feedback == feedbackid && c.userid == userid)
        }))
    }

    async fn feedback_items(&self, feedbackid: i64) -> Result<Vec<FeedbackItem>> {
        Ok(self.with(|s| {
            let mut items: Vec<FeedbackItem> = s
                .items
                .iter()
                .filter(|i| i.feedback == feedbackid)
                .cloned()
                .collect();
            items.sort_by_key(|i| (i.position, i.id));
            items
        }))
    }

    async fn complete_feedback(&self, c: &NewFeedbackCompletion) -> Result<Option<i64>> {
        Ok(self.with(|s| {
            if s
                .completions
                .iter()
                .any(|x| x.feedback == c.feedback && x.userid == c.userid)
            {
                return None;
            }
            let id = s.id();
            s.completions.push(Completion {
                id,
                feedback: c.feedback,
                userid: c.userid,
                anonymous_response: c.anonymous_response,
            });
            Some(id)
        }))
    }

    async fn insert_feedback_value(&self, v: &NewFeedbackValue) -> Result<i64> {
        Ok(self.with(|s| {
            let id = s.id();
            s.values.push(FeedbackValue {
                id,
                course_id: v.course_id,
                item: v.item,
                completed: v.completed,
                tmp_completed: v.tmp_completed,
                value: v.value.clone(),
            });
            id
        }))
    }

    async fn feedback_values_for(&self, feedbackid: i64) -> Result<Vec<FeedbackValue>> {
        Ok(self.with(|s| {
            s.values
                .iter()
                .filter(|v| v.tmp_completed == feedbackid)
                .cloned()
                .collect()
        }))
    }

    async fn ensure_forum(&self, f: &NewForum) -> Result<Forum> {
        self.with(|s| {
            if let Some(existing) = s
                .forums
                .iter()
                .find(|x| x.course == f.course && x.name == f.name)
            {
                return Ok(existing.clone());
            }
            if !s.forum_module {
                return Err(Error::ForumModuleMissing);
            }
            let forum = Forum {
                id: s.id(),
                course: f.course,
                name: f.name.clone(),
                kind: f.kind.clone(),
                intro: f.intro.clone(),
            };
            s.forums.push(forum.clone());
            let cmid = s.id();
            let sequence = s.sections.entry(f.course).or_default();
            if !sequence.is_empty() {
                sequence.push(',');
            }
            sequence.push_str(&cmid.to_string());
            Ok(forum)
        })
    }

    async fn add_discussion(&self, d: &NewDiscussion) -> Result<i64> {
        Ok(self.with(|s| {
            let id = s.id();
            s.discussions.push(Discussion {
                id,
                forum: d.forum,
                userid: d.userid,
                subject: d.subject.clone(),
                message: d.message.clone(),
            });
            id
        }))
    }

    async fn rebuild_course_cache(&self, courseid: i64) -> Result<()> {
        self.with(|s| {
            if let Some(c) = s.courses.iter_mut().find(|c| c.id == courseid) {
                c.cacherev += 1;
            }
        });
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.with(|s| s.tables.contains(table)))
    }

    async fn push_messages(&self, idnumber: &str) -> Result<Vec<PushMessage>> {
        Ok(self.with(|s| {
            s.push
                .iter()
                .filter(|m| m.courseid == idnumber)
                .cloned()
                .collect()
        }))
    }
}

/// Runs a web service function the way the REST endpoint does.
pub async fn call(
    lms: &Arc<MemoryLms>,
    caller: &Caller,
    function: &str,
    args: serde_json::Value,
) -> Result<serde_json::Value> {
    reflect_ws::external::call(&context(lms, caller), function, args).await
}
