//! Functions exposed to the mobile app.
//!
//! Each submodule declares the parameter and return schemas of its functions
//! next to the implementation. [`call`] is the single entry point: it looks a
//! function up by name, validates the parameters, runs it with an explicit
//! [`Context`] and cleans the result for the wire.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;

use crate::{
    access::{self, Access},
    allowlist::CourseAllowList,
    error::{Error, Result},
    lms::Lms,
    models::Caller,
    schema::{Field, Schema},
};

pub mod calendar;
pub mod enrol;
pub mod feedback;
pub mod forum;
pub mod messages;

pub const SERVICE_NAME: &str = "Reflect Service";
pub const SERVICE_SHORTNAME: &str = "reflect";

/// Everything a function needs to know about the request it serves.
#[derive(Clone)]
pub struct Context {
    pub lms: Arc<dyn Lms>,
    pub caller: Caller,
    /// Snapshot of the allow-list setting taken when the request started.
    pub allowlist: CourseAllowList,
    pub site_course_id: i64,
    pub now: i64,
}

impl Context {
    pub fn lms(&self) -> &dyn Lms {
        self.lms.as_ref()
    }

    /// Warning to report when the course identifier is not allow-listed.
    pub fn gate(&self, courseid: &str) -> Option<Warning> {
        if self.allowlist.contains(courseid) {
            None
        } else {
            tracing::debug!(courseid, "course not in allow-list");
            Some(Warning::not_allow_listed(courseid))
        }
    }

    /// Allow-list gate followed by the caller's access check.
    pub async fn authorize(&self, courseid: &str) -> Result<Access> {
        if let Some(w) = self.gate(courseid) {
            return Ok(Access::Denied(w));
        }
        access::check(self.lms(), &self.caller, self.now, courseid).await
    }
}

/// Non-fatal problem reported next to a (possibly empty) result.
#[skip_serializing_none]
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub item: Option<String>,
    pub itemid: Option<i64>,
    pub warningcode: String,
    pub message: String,
}

impl Warning {
    pub fn new(code: &str, item: Option<String>, message: impl Into<String>) -> Self {
        Self {
            item,
            itemid: None,
            warningcode: code.to_string(),
            message: message.into(),
        }
    }

    pub fn with_itemid(mut self, itemid: i64) -> Self {
        self.itemid = Some(itemid);
        self
    }

    pub fn not_allow_listed(courseid: &str) -> Self {
        Self::new(
            "nopermissions",
            Some(courseid.to_string()),
            "this course is not enabled for the app",
        )
    }

    pub fn no_course_permission(courseid: i64) -> Self {
        Self::new(
            "nopermissions",
            Some(courseid.to_string()),
            "you do not have permissions to access this course",
        )
    }

    pub fn course_not_found(courseid: &str) -> Self {
        Self::new(
            "coursenotfound",
            Some(courseid.to_string()),
            "the course does not exist",
        )
    }
}

pub fn warnings_schema() -> Field {
    Field::default(
        "warnings",
        "list of warnings",
        Schema::list(Schema::object(vec![
            Field::optional("item", "item", Schema::text()),
            Field::optional("itemid", "item id", Schema::int()),
            Field::required(
                "warningcode",
                "the warning code can be used by the client app to implement specific behaviour",
                Schema::alphanum(),
            ),
            Field::required(
                "message",
                "untranslated english message to explain the warning",
                Schema::raw(),
            ),
        ])),
        Value::Array(Vec::new()),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionKind {
    Read,
    Write,
}

/// The functions of the Reflect service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    GetCalendarEntries,
    GetFeedbacks,
    SubmitFeedbacks,
    EnrolSelf,
    PostFeedback,
    GetCompletedFeedbacks,
    GetMessages,
}

impl Function {
    pub const ALL: [Function; 7] = [
        Function::GetCalendarEntries,
        Function::GetFeedbacks,
        Function::SubmitFeedbacks,
        Function::EnrolSelf,
        Function::PostFeedback,
        Function::GetCompletedFeedbacks,
        Function::GetMessages,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Function::GetCalendarEntries => "local_reflect_get_calendar_entries",
            Function::GetFeedbacks => "local_reflect_get_feedbacks",
            Function::SubmitFeedbacks => "local_reflect_submit_feedbacks",
            Function::EnrolSelf => "local_reflect_enrol_self",
            Function::PostFeedback => "local_reflect_post_feedback",
            Function::GetCompletedFeedbacks => "local_reflect_get_completed_feedbacks",
            Function::GetMessages => "local_reflect_get_messages",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Function::GetCalendarEntries => "Returns the calendar entries of the Reflection course",
            Function::GetFeedbacks => "Returns the feedback entries of the Reflection course",
            Function::SubmitFeedbacks => "Submits the feedback values for the Reflection course",
            Function::EnrolSelf => "Enrols user in reflection course",
            Function::PostFeedback => "post general feedback",
            Function::GetCompletedFeedbacks => {
                "Returns answered feedbacks for the Reflection course"
            }
            Function::GetMessages => "Returns messages sent by the reflect-block_pushnotification",
        }
    }

    pub fn kind(self) -> FunctionKind {
        match self {
            Function::SubmitFeedbacks | Function::EnrolSelf | Function::PostFeedback => {
                FunctionKind::Write
            }
            _ => FunctionKind::Read,
        }
    }

    /// Parameter schema; time dependent defaults are taken from `now`.
    pub fn parameters(self, now: i64) -> Schema {
        match self {
            Function::GetCalendarEntries => calendar::parameters(now),
            Function::GetFeedbacks => feedback::get_feedbacks_parameters(now),
            Function::SubmitFeedbacks => feedback::submit_feedbacks_parameters(),
            Function::EnrolSelf => enrol::parameters(),
            Function::PostFeedback => forum::parameters(),
            Function::GetCompletedFeedbacks => feedback::get_completed_feedbacks_parameters(),
            Function::GetMessages => messages::parameters(),
        }
    }

    pub fn returns(self) -> Schema {
        match self {
            Function::GetCalendarEntries => calendar::returns(),
            Function::GetFeedbacks => feedback::get_feedbacks_returns(),
            Function::SubmitFeedbacks => feedback::submit_feedbacks_returns(),
            Function::EnrolSelf => enrol::returns(),
            Function::PostFeedback => forum::returns(),
            Function::GetCompletedFeedbacks => feedback::get_completed_feedbacks_returns(),
            Function::GetMessages => messages::returns(),
        }
    }
}

/// Runs a web service function by name with raw JSON parameters.
pub async fn call(ctx: &Context, name: &str, args: Value) -> Result<Value> {
    let function =
        Function::from_name(name).ok_or_else(|| Error::UnknownFunction(name.to_string()))?;
    let params = function.parameters(ctx.now).validate_parameters(args)?;
    tracing::debug!(function = name, user = ctx.caller.id, "calling web service function");

    let result = match function {
        Function::GetCalendarEntries => {
            to_value(calendar::get_calendar_entries(ctx, from_params(params)?).await?)?
        }
        Function::GetFeedbacks => {
            to_value(feedback::get_feedbacks(ctx, from_params(params)?).await?)?
        }
        Function::SubmitFeedbacks => {
            to_value(feedback::submit_feedbacks(ctx, from_params(params)?).await?)?
        }
        Function::EnrolSelf => to_value(enrol::enrol_self(ctx, from_params(params)?).await?)?,
        Function::PostFeedback => to_value(forum::post_feedback(ctx, from_params(params)?).await?)?,
        Function::GetCompletedFeedbacks => {
            to_value(feedback::get_completed_feedbacks(ctx, from_params(params)?).await?)?
        }
        Function::GetMessages => {
            to_value(messages::get_messages(ctx, from_params(params)?).await?)?
        }
    };

    function.returns().clean_returnvalue(result)
}

fn from_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| Error::InvalidParameter(e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
