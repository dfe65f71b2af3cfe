use serde::{Deserialize, Serialize};

use super::{warnings_schema, Context, Warning};
use crate::{
    error::{Error, Result},
    models::{NewEnrolment, ENROL_ACTIVE},
    schema::{Field, Schema},
};

const STUDENT_ROLE: &str = "student";
const MANUAL_PLUGIN: &str = "manual";

#[derive(Debug, Clone, Deserialize)]
pub struct EnrolSelfParams {
    #[serde(rename = "courseID")]
    pub course_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrolSelfResult {
    pub enrolment: bool,
    pub userid: i64,
    pub warnings: Vec<Warning>,
}

pub fn parameters() -> Schema {
    Schema::object(vec![Field::required("courseID", "courseID", Schema::text())])
}

pub fn returns() -> Schema {
    Schema::object(vec![
        Field::required("enrolment", "result", Schema::bool()),
        Field::required("userid", "user id", Schema::int()),
        warnings_schema(),
    ])
}

/// Enrols the caller as a student through the course's manual enrolment
/// instance.
pub async fn enrol_self(ctx: &Context, params: EnrolSelfParams) -> Result<EnrolSelfResult> {
    let userid = ctx.caller.id;
    if let Some(w) = ctx.gate(&params.course_id) {
        return Ok(EnrolSelfResult {
            enrolment: false,
            userid,
            warnings: vec![w],
        });
    }

    let lms = ctx.lms();
    let course = lms
        .course_by_idnumber(&params.course_id)
        .await?
        .ok_or_else(|| Error::NoCourse(params.course_id.clone()))?;
    let role = lms
        .role_by_shortname(STUDENT_ROLE)
        .await?
        .ok_or(Error::NoStudentRole(course.id))?;

    let instance = lms
        .enrol_instances(course.id)
        .await?
        .into_iter()
        .find(|i| i.enrol == MANUAL_PLUGIN)
        .ok_or(Error::NoEnrolInstance(course.id))?;

    let timestart = ctx.now;
    let timeend = if instance.enrolperiod > 0 {
        timestart + instance.enrolperiod
    } else {
        0
    };

    if !manual_plugin_enabled(ctx).await? {
        return Err(Error::ManualPluginNotInstalled);
    }
    if instance.status != ENROL_ACTIVE {
        return Err(Error::CannotEnrol {
            courseid: course.id,
            roleid: role.id,
            userid,
        });
    }

    lms.enrol_user(&NewEnrolment {
        instance_id: instance.id,
        courseid: course.id,
        userid,
        roleid: role.id,
        timestart,
        timeend,
        now: ctx.now,
    })
    .await?;
    tracing::info!(user = userid, course = course.id, "self enrolment done");

    Ok(EnrolSelfResult {
        enrolment: true,
        userid,
        warnings: Vec::new(),
    })
}

async fn manual_plugin_enabled(ctx: &Context) -> Result<bool> {
    let enabled = ctx
        .lms()
        .site_config("enrol_plugins_enabled")
        .await?
        .unwrap_or_default();
    Ok(enabled.split(',').any(|p| p.trim() == MANUAL_PLUGIN))
}
