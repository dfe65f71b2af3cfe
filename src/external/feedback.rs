use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_with::{serde_as, skip_serializing_none, DisplayFromStr};

use super::{warnings_schema, Context, Warning};
use crate::{
    access::Access,
    error::Result,
    models::{
        Course, Feedback, FeedbackItem, FeedbackValue, NewFeedbackCompletion, NewFeedbackValue,
        ANSWERABLE_ITEM_TYPES,
    },
    schema::{Field, Schema},
};

pub const SUBMITTED: &str = "Success";
pub const ALREADY_SUBMITTED: &str = "Your answers have already been submitted";
pub const NOT_SUBMITTED: &str = "Your answers could not be submitted";

#[serde_as]
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Question {
    pub id: i64,
    #[serde(rename = "questionText")]
    pub question_text: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde_as(as = "DisplayFromStr")]
    pub dependitem: i64,
    pub dependvalue: String,
    /// Raw choice list, multiple choice items only.
    pub choices: Option<String>,
}

impl From<&FeedbackItem> for Question {
    fn from(item: &FeedbackItem) -> Self {
        Self {
            id: item.id,
            question_text: item.name.clone(),
            kind: item.typ.clone(),
            dependitem: item.dependitem,
            dependvalue: item.dependvalue.clone(),
            choices: (item.typ == "multichoice").then(|| item.presentation.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackSummary {
    pub name: String,
    #[serde(rename = "feedbackMessage")]
    pub feedback_message: String,
    pub id: i64,
    pub questions: Vec<Question>,
}

impl FeedbackSummary {
    fn new(feedback: &Feedback, questions: Vec<Question>) -> Self {
        Self {
            name: feedback.name.clone(),
            feedback_message: feedback.page_after_submit.clone().unwrap_or_default(),
            id: feedback.id,
            questions,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub item: i64,
    #[serde_as(as = "DisplayFromStr")]
    pub completed: i64,
    #[serde(rename = "courseID")]
    #[serde_as(as = "DisplayFromStr")]
    pub course_id: i64,
    pub value: String,
}

impl From<&FeedbackValue> for Answer {
    fn from(v: &FeedbackValue) -> Self {
        Self {
            item: v.item,
            completed: v.completed,
            course_id: v.course_id,
            value: v.value.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedFeedback {
    #[serde(flatten)]
    pub feedback: FeedbackSummary,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeWindow {
    #[serde(default)]
    pub timestart: Option<i64>,
    #[serde(default)]
    pub timeend: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetFeedbacksParams {
    // validated, not used for filtering
    pub options: Option<TimeWindow>,
    #[serde(rename = "courseID")]
    pub course_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetFeedbacksResult {
    pub feedbacks: Vec<FeedbackSummary>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerParam {
    pub id: i64,
    pub answer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitFeedbacksParams {
    pub id: i64,
    #[serde(default)]
    pub answers: Vec<AnswerParam>,
    #[serde(rename = "courseID")]
    pub course_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitFeedbacksResult {
    #[serde(rename = "resultText")]
    pub result_text: String,
    pub warnings: Vec<Warning>,
}

impl SubmitFeedbacksResult {
    fn new(text: &str, warnings: Vec<Warning>) -> Self {
        Self {
            result_text: text.to_string(),
            warnings,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetCompletedFeedbacksParams {
    #[serde(rename = "courseID")]
    pub course_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetCompletedFeedbacksResult {
    pub feedbacks: Vec<CompletedFeedback>,
    pub warnings: Vec<Warning>,
}

fn question_schema() -> Schema {
    Schema::object(vec![
        Field::required("id", "Question Id", Schema::int()),
        Field::required("questionText", "Question Text", Schema::text()),
        Field::required("type", "Question Type", Schema::text()),
        Field::required("dependitem", "Depend Item", Schema::text()),
        Field::required("dependvalue", "Depend Value", Schema::text()),
        Field::optional("choices", "Choices", Schema::text()),
    ])
}

fn feedback_fields() -> Vec<Field> {
    vec![
        Field::required("name", "feedback name", Schema::text()),
        Field::required("feedbackMessage", "feedback message", Schema::raw()),
        Field::required("id", "feedback id", Schema::int()),
        Field::default("questions", "questions", Schema::list(question_schema()), json!([])),
    ]
}

pub fn get_feedbacks_parameters(now: i64) -> Schema {
    Schema::object(vec![
        Field::default(
            "options",
            "Options",
            Schema::object(vec![
                Field::default(
                    "timestart",
                    "Time from which feedbacks should be returned",
                    Schema::int(),
                    json!(0),
                )
                .nullable(),
                Field::default(
                    "timeend",
                    "Time to which feedbacks should be returned",
                    Schema::int(),
                    json!(now),
                )
                .nullable(),
            ]),
            json!({}),
        ),
        Field::required("courseID", "courseID", Schema::text()),
    ])
}

pub fn get_feedbacks_returns() -> Schema {
    Schema::object(vec![
        Field::required("feedbacks", "feedbacks", Schema::list(Schema::object(feedback_fields()))),
        warnings_schema(),
    ])
}

pub fn submit_feedbacks_parameters() -> Schema {
    Schema::object(vec![
        Field::required("id", "feedback id", Schema::int()),
        Field::default(
            "answers",
            "Answers",
            Schema::list(Schema::object(vec![
                Field::required("id", "Question Id", Schema::int()),
                Field::required("answer", "Answer Text", Schema::text()),
            ])),
            json!([]),
        ),
        Field::required("courseID", "courseID", Schema::text()),
    ])
}

pub fn submit_feedbacks_returns() -> Schema {
    Schema::object(vec![
        Field::required("resultText", "Result Text", Schema::text()),
        warnings_schema(),
    ])
}

pub fn get_completed_feedbacks_parameters() -> Schema {
    Schema::object(vec![Field::required("courseID", "courseID", Schema::text())])
}

pub fn get_completed_feedbacks_returns() -> Schema {
    let mut fields = feedback_fields();
    fields.push(Field::default(
        "answers",
        "answers",
        Schema::list(Schema::object(vec![
            Field::required("item", "Question Id", Schema::int()),
            Field::required("completed", "Completed Id", Schema::text()),
            Field::required("courseID", "Course Id", Schema::text()),
            Field::required("value", "Feedback Value", Schema::text()),
        ])),
        json!([]),
    ));
    Schema::object(vec![
        Field::required("feedbacks", "feedbacks", Schema::list(Schema::object(fields))),
        warnings_schema(),
    ])
}

/// Open feedback activities of the course the caller has not answered yet.
pub async fn get_feedbacks(
    ctx: &Context,
    params: GetFeedbacksParams,
) -> Result<GetFeedbacksResult> {
    let course = match ctx.authorize(&params.course_id).await? {
        Access::Granted(course) => course,
        Access::Denied(w) => {
            return Ok(GetFeedbacksResult {
                feedbacks: Vec::new(),
                warnings: vec![w],
            })
        }
    };

    let lms = ctx.lms();
    let mut feedbacks = Vec::new();
    for feedback in lms.feedback_instances(course.id).await? {
        if lms.feedback_submitted(feedback.id, ctx.caller.id).await? || !feedback.is_open(ctx.now) {
            continue;
        }
        let questions = lms
            .feedback_items(feedback.id)
            .await?
            .iter()
            .filter(|item| ANSWERABLE_ITEM_TYPES.contains(&item.typ.as_str()))
            .map(Question::from)
            .collect();
        feedbacks.push(FeedbackSummary::new(&feedback, questions));
    }

    Ok(GetFeedbacksResult {
        feedbacks,
        warnings: Vec::new(),
    })
}

/// Stores one set of answers for a feedback. A second submission by the same
/// user is acknowledged without writing anything.
pub async fn submit_feedbacks(
    ctx: &Context,
    params: SubmitFeedbacksParams,
) -> Result<SubmitFeedbacksResult> {
    let course = match ctx.authorize(&params.course_id).await? {
        Access::Granted(course) => course,
        Access::Denied(w) => return Ok(SubmitFeedbacksResult::new(NOT_SUBMITTED, vec![w])),
    };

    let lms = ctx.lms();
    if !feedback_in_course(ctx, &course, params.id).await? {
        let w = Warning::new(
            "feedbacknotfound",
            None,
            "the feedback does not belong to this course",
        )
        .with_itemid(params.id);
        return Ok(SubmitFeedbacksResult::new(NOT_SUBMITTED, vec![w]));
    }

    let completion = NewFeedbackCompletion {
        feedback: params.id,
        userid: ctx.caller.id,
        timemodified: ctx.now,
        anonymous_response: 1,
    };
    let Some(completed) = lms.complete_feedback(&completion).await? else {
        return Ok(SubmitFeedbacksResult::new(ALREADY_SUBMITTED, Vec::new()));
    };
    tracing::info!(user = ctx.caller.id, feedback = params.id, completed, "feedback completed");

    if lms.feedback_items(params.id).await?.is_empty() {
        let w = Warning::new("noquestions", None, "the feedback has no questions")
            .with_itemid(params.id);
        return Ok(SubmitFeedbacksResult::new(NOT_SUBMITTED, vec![w]));
    }

    for answer in &params.answers {
        lms.insert_feedback_value(&NewFeedbackValue {
            course_id: course.id,
            item: answer.id,
            completed,
            tmp_completed: params.id,
            value: answer.answer.clone(),
        })
        .await?;
    }

    Ok(SubmitFeedbacksResult::new(SUBMITTED, Vec::new()))
}

/// Feedback activities the caller already answered, with the recorded answers.
///
/// Answers are matched to a feedback through the feedback id stored on each
/// answer row, not through the caller's completion.
pub async fn get_completed_feedbacks(
    ctx: &Context,
    params: GetCompletedFeedbacksParams,
) -> Result<GetCompletedFeedbacksResult> {
    let course = match ctx.authorize(&params.course_id).await? {
        Access::Granted(course) => course,
        Access::Denied(w) => {
            return Ok(GetCompletedFeedbacksResult {
                feedbacks: Vec::new(),
                warnings: vec![w],
            })
        }
    };

    let lms = ctx.lms();
    let mut feedbacks = Vec::new();
    for feedback in lms.feedback_instances(course.id).await? {
        if !lms.feedback_submitted(feedback.id, ctx.caller.id).await? {
            continue;
        }
        let items = lms.feedback_items(feedback.id).await?;
        if items.is_empty() {
            continue;
        }
        let values = lms.feedback_values_for(feedback.id).await?;
        if values.is_empty() {
            continue;
        }
        feedbacks.push(CompletedFeedback {
            feedback: FeedbackSummary::new(&feedback, items.iter().map(Question::from).collect()),
            answers: values.iter().map(Answer::from).collect(),
        });
    }

    Ok(GetCompletedFeedbacksResult {
        feedbacks,
        warnings: Vec::new(),
    })
}

async fn feedback_in_course(ctx: &Context, course: &Course, feedbackid: i64) -> Result<bool> {
    Ok(ctx
        .lms()
        .feedback_instances(course.id)
        .await?
        .iter()
        .any(|f| f.id == feedbackid))
}
