use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{warnings_schema, Context, Warning};
use crate::{
    error::Result,
    models::{CalendarEvent, EventQuery},
    schema::{Field, Schema},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    #[serde(default)]
    pub eventids: Option<Vec<i64>>,
    // accepted for compatibility, the course scope is always forced
    #[serde(default)]
    pub courseids: Option<Vec<i64>>,
    #[serde(default)]
    pub groupids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventOptions {
    #[serde(default)]
    pub userevents: Option<bool>,
    #[serde(default)]
    pub siteevents: Option<bool>,
    #[serde(default)]
    pub timestart: Option<i64>,
    #[serde(default)]
    pub timeend: Option<i64>,
    #[serde(default)]
    pub ignorehidden: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarParams {
    #[serde(default)]
    pub events: EventFilter,
    #[serde(default)]
    pub options: EventOptions,
    #[serde(rename = "courseID")]
    pub course_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarResult {
    pub events: Vec<CalendarEvent>,
    pub warnings: Vec<Warning>,
}

pub fn parameters(now: i64) -> Schema {
    let ids = |name: &'static str, desc: &'static str| {
        Field::default(name, desc, Schema::list(Schema::int()), json!([])).nullable()
    };
    Schema::object(vec![
        Field::default(
            "events",
            "Event details",
            Schema::object(vec![
                ids("eventids", "List of event ids"),
                ids("courseids", "List of course ids for which events will be returned"),
                ids("groupids", "List of group ids for which events should be returned"),
            ]),
            json!({}),
        ),
        Field::default(
            "options",
            "Options",
            Schema::object(vec![
                Field::default(
                    "userevents",
                    "Set to true to return current user's user events",
                    Schema::bool(),
                    json!(true),
                )
                .nullable(),
                Field::default(
                    "siteevents",
                    "Set to true to return global events",
                    Schema::bool(),
                    json!(true),
                )
                .nullable(),
                Field::default(
                    "timestart",
                    "Time from which events should be returned",
                    Schema::int(),
                    json!(0),
                )
                .nullable(),
                Field::default(
                    "timeend",
                    "Time to which the events should be returned",
                    Schema::int(),
                    json!(now),
                )
                .nullable(),
                Field::default(
                    "ignorehidden",
                    "Ignore hidden events or not",
                    Schema::bool(),
                    json!(true),
                )
                .nullable(),
            ]),
            json!({}),
        ),
        Field::required("courseID", "courseID", Schema::text()),
    ])
}

pub fn returns() -> Schema {
    let event = Schema::object(vec![
        Field::required("id", "event id", Schema::int()),
        Field::required("name", "event name", Schema::text()),
        Field::optional("description", "Description", Schema::raw()).nullable(),
        Field::required("format", "description format", Schema::int()),
        Field::required("courseid", "course id", Schema::int()),
        Field::required("groupid", "group id", Schema::int()),
        Field::required("userid", "user id", Schema::int()),
        Field::required("repeatid", "repeat id", Schema::int()),
        Field::optional("modulename", "module name", Schema::text()).nullable(),
        Field::required("instance", "instance id", Schema::int()),
        Field::required("eventtype", "Event type", Schema::text()),
        Field::required("timestart", "timestart", Schema::int()),
        Field::required("timeduration", "time duration", Schema::int()),
        Field::required("visible", "visible", Schema::int()),
        Field::optional("uuid", "unique id of ical events", Schema::text()),
        Field::required("sequence", "sequence", Schema::int()),
        Field::required("timemodified", "time modified", Schema::int()),
        Field::optional("subscriptionid", "Subscription id", Schema::int()).nullable(),
    ]);
    Schema::object(vec![
        Field::required("events", "events", Schema::list(event)),
        warnings_schema(),
        Field::optional("test", "test", Schema::raw()).nullable(),
    ])
}

/// Events of the allow-listed course plus any explicitly requested events the
/// caller may see.
pub async fn get_calendar_entries(ctx: &Context, params: CalendarParams) -> Result<CalendarResult> {
    let mut warnings = Vec::new();
    if let Some(w) = ctx.gate(&params.course_id) {
        return Ok(CalendarResult {
            events: Vec::new(),
            warnings: vec![w],
        });
    }

    let lms = ctx.lms();
    let Some(course) = lms.course_by_idnumber(&params.course_id).await? else {
        return Ok(CalendarResult {
            events: Vec::new(),
            warnings: vec![Warning::course_not_found(&params.course_id)],
        });
    };

    let accessible = lms.accessible_course_ids(ctx.caller.id, ctx.now).await?;
    let courseids: Vec<i64> = if accessible.contains(&course.id) {
        vec![course.id]
    } else {
        warnings.push(Warning::no_course_permission(course.id));
        Vec::new()
    };

    let options = &params.options;
    let mut candidates = if courseids.is_empty() {
        Vec::new()
    } else {
        lms.calendar_events(&EventQuery {
            timestart: options.timestart.unwrap_or(0),
            timeend: options.timeend.unwrap_or(ctx.now),
            courseids: courseids.clone(),
            ignorehidden: options.ignorehidden.unwrap_or(true),
        })
        .await?
    };

    let requested = params.events.eventids.unwrap_or_default();
    if !requested.is_empty() {
        let mut seen: HashSet<i64> = candidates.iter().map(|e| e.id).collect();
        for event in lms.calendar_events_by_id(&requested).await? {
            if seen.insert(event.id) {
                candidates.push(event);
            }
        }
    }

    let groups = lms.user_group_ids(ctx.caller.id).await?;
    // requested ids never reach beyond the checked course
    let viewer = Viewer {
        userid: ctx.caller.id,
        site_course_id: ctx.site_course_id,
        courses: &courseids,
        groups: &groups,
    };

    let mut events = Vec::with_capacity(candidates.len());
    for event in candidates {
        if viewer.can_view(&event) {
            events.push(event);
        } else {
            warnings.push(Warning::new(
                "nopermissions",
                Some(event.id.to_string()),
                "you do not have permissions to view this event",
            ));
        }
    }

    Ok(CalendarResult { events, warnings })
}

/// What the caller can see in the calendar.
struct Viewer<'a> {
    userid: i64,
    site_course_id: i64,
    /// Courses in scope for this request, already access checked.
    courses: &'a [i64],
    groups: &'a [i64],
}

impl Viewer<'_> {
    /// Site events are public. Course bound events must belong to one of
    /// `courses`, whatever group they belong to. Events outside any course are
    /// visible to their owner and to members of their group.
    fn can_view(&self, event: &CalendarEvent) -> bool {
        if event.courseid == self.site_course_id {
            return true;
        }
        if event.courseid != 0 {
            return self.courses.contains(&event.courseid);
        }
        event.userid == self.userid || (event.groupid != 0 && self.groups.contains(&event.groupid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(courseid: i64, groupid: i64, userid: i64) -> CalendarEvent {
        CalendarEvent {
            id: 1,
            name: "Lecture".into(),
            description: None,
            format: 1,
            courseid,
            groupid,
            userid,
            repeatid: 0,
            modulename: None,
            instance: 0,
            eventtype: "course".into(),
            timestart: 0,
            timeduration: 0,
            visible: 1,
            uuid: String::new(),
            sequence: 1,
            timemodified: 0,
            subscriptionid: None,
        }
    }

    fn viewer<'a>(courses: &'a [i64], groups: &'a [i64]) -> Viewer<'a> {
        Viewer {
            userid: 7,
            site_course_id: 1,
            courses,
            groups,
        }
    }

    #[test]
    fn site_events_are_public() {
        assert!(viewer(&[], &[]).can_view(&event(1, 0, 99)));
    }

    #[test]
    fn course_events_need_course_access() {
        let v = viewer(&[5], &[40]);
        assert!(v.can_view(&event(5, 0, 99)));
        assert!(!v.can_view(&event(6, 0, 99)));
        // group membership does not open up an inaccessible course
        assert!(!v.can_view(&event(6, 40, 99)));
        // nor does owning the event
        assert!(!v.can_view(&event(6, 0, 7)));
    }

    #[test]
    fn user_and_group_events() {
        let v = viewer(&[], &[40]);
        assert!(v.can_view(&event(0, 0, 7)));
        assert!(!v.can_view(&event(0, 0, 8)));
        assert!(v.can_view(&event(0, 40, 8)));
        assert!(!v.can_view(&event(0, 41, 8)));
    }

    #[test]
    fn defaults_use_request_time() {
        let schema = parameters(1_234);
        let v = schema
            .validate_parameters(json!({"courseID": "UPR1"}))
            .unwrap();
        assert_eq!(v["options"]["timeend"], json!(1_234));
        assert_eq!(v["options"]["userevents"], json!(true));
        assert_eq!(v["events"]["eventids"], json!([]));
        let params: CalendarParams = serde_json::from_value(v).unwrap();
        assert_eq!(params.options.timeend, Some(1_234));
        assert_eq!(params.course_id, "UPR1");
    }
}
