use serde::{Deserialize, Serialize};

use super::{warnings_schema, Context, Warning};
use crate::{
    access::Access,
    error::Result,
    models::{NewDiscussion, NewForum},
    schema::{Field, Schema},
};

pub const FORUM_NAME: &str = "Feedback Forum";
const FORUM_INTRO: &str = "Hier wird das Feedback aus der App gesammelt";
const DISCUSSION_PREFIX: &str = "Feedback von ";

#[derive(Debug, Clone, Deserialize)]
pub struct PostFeedbackParams {
    pub feedback: String,
    #[serde(rename = "courseID")]
    pub course_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostFeedbackResult {
    pub result: bool,
    pub warnings: Vec<Warning>,
}

pub fn parameters() -> Schema {
    Schema::object(vec![
        Field::required("feedback", "feedback", Schema::text()),
        Field::required("courseID", "courseID", Schema::text()),
    ])
}

pub fn returns() -> Schema {
    Schema::object(vec![
        Field::required("result", "Result flag", Schema::bool()),
        warnings_schema(),
    ])
}

/// Posts free text as a new discussion in the course's feedback forum.
///
/// The forum is created on first use. Creating it and posting are separate
/// steps: a failure in between leaves an empty forum behind, which the next
/// call simply reuses.
pub async fn post_feedback(
    ctx: &Context,
    params: PostFeedbackParams,
) -> Result<PostFeedbackResult> {
    let course = match ctx.authorize(&params.course_id).await? {
        Access::Granted(course) => course,
        Access::Denied(w) => {
            return Ok(PostFeedbackResult {
                result: false,
                warnings: vec![w],
            })
        }
    };

    let lms = ctx.lms();
    let forum = lms
        .ensure_forum(&NewForum {
            course: course.id,
            name: FORUM_NAME.to_string(),
            kind: "general".to_string(),
            intro: FORUM_INTRO.to_string(),
            introformat: 2,
            now: ctx.now,
        })
        .await?;

    let discussion = lms
        .add_discussion(&NewDiscussion {
            course: course.id,
            forum: forum.id,
            userid: ctx.caller.id,
            subject: format!("{DISCUSSION_PREFIX}{}", ctx.caller.username),
            message: params.feedback,
            messageformat: 1,
            messagetrust: 0,
            mailnow: false,
            now: ctx.now,
        })
        .await?;
    tracing::info!(user = ctx.caller.id, forum = forum.id, discussion, "feedback posted");

    lms.rebuild_course_cache(course.id).await?;

    Ok(PostFeedbackResult {
        result: true,
        warnings: Vec::new(),
    })
}
