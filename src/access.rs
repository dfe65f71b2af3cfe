use crate::{
    error::Result,
    external::Warning,
    lms::Lms,
    models::{Caller, Course},
};

/// Outcome of checking whether the caller may use a course.
#[derive(Debug, Clone)]
pub enum Access {
    Granted(Course),
    Denied(Warning),
}

/// Resolves the course behind an external identifier and confirms the caller
/// currently has access to it through an active enrolment.
pub async fn check(lms: &dyn Lms, caller: &Caller, now: i64, courseid: &str) -> Result<Access> {
    let Some(course) = lms.course_by_idnumber(courseid).await? else {
        return Ok(Access::Denied(Warning::new(
            "notexistingcourse",
            Some(courseid.to_string()),
            "the course does not exist",
        )));
    };

    let accessible = lms.accessible_course_ids(caller.id, now).await?;
    if !accessible.contains(&course.id) {
        tracing::debug!(user = caller.id, course = course.id, "course not accessible");
        return Ok(Access::Denied(Warning::no_course_permission(course.id)));
    }
    Ok(Access::Granted(course))
}
