use serde::{Deserialize, Serialize};

use super::{warnings_schema, Context, Warning};
use crate::{
    access::Access,
    error::{Error, Result},
    lms::PUSH_MESSAGE_TABLE,
    models::PushMessage,
    schema::{Field, Schema},
};

#[derive(Debug, Clone, Deserialize)]
pub struct GetMessagesParams {
    #[serde(rename = "courseID")]
    pub course_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetMessagesResult {
    pub messages: Vec<PushMessage>,
    pub warnings: Vec<Warning>,
}

pub fn parameters() -> Schema {
    Schema::object(vec![Field::required("courseID", "courseID", Schema::text())])
}

pub fn returns() -> Schema {
    Schema::object(vec![
        Field::required(
            "messages",
            "messages",
            Schema::list(Schema::object(vec![
                Field::required("id", "message id", Schema::int()),
                Field::required("timestamp", "time the message was sent", Schema::int()),
                Field::required("title", "message title", Schema::text()),
                Field::required("message", "message text", Schema::raw()),
            ])),
        ),
        warnings_schema(),
    ])
}

/// Push notifications stored for the course by the companion block.
pub async fn get_messages(ctx: &Context, params: GetMessagesParams) -> Result<GetMessagesResult> {
    if let Access::Denied(w) = ctx.authorize(&params.course_id).await? {
        return Ok(GetMessagesResult {
            messages: Vec::new(),
            warnings: vec![w],
        });
    }

    let lms = ctx.lms();
    if !lms.table_exists(PUSH_MESSAGE_TABLE).await? {
        return Err(Error::TableMissing(PUSH_MESSAGE_TABLE.to_string()));
    }

    let messages = lms.push_messages(&params.course_id).await?;
    let warnings = if messages.is_empty() {
        vec![Warning::new(
            "nomessages",
            Some(params.course_id.clone()),
            "there are no messages for this course",
        )]
    } else {
        Vec::new()
    };

    Ok(GetMessagesResult { messages, warnings })
}
