use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Fatal failures of a web service call. Recoverable authorization problems
/// are reported as [`crate::external::Warning`]s instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid token - token not found")]
    InvalidToken,

    #[error("Access control exception: site administrator required")]
    AdminRequired,

    #[error("Web service function {0} does not exist")]
    UnknownFunction(String),

    #[error("Invalid parameter value detected: {0}")]
    InvalidParameter(String),

    #[error("Invalid response value detected: {0}")]
    InvalidResponse(String),

    #[error("Course with ID number {0} does not exist")]
    NoCourse(String),

    #[error("Student role not found (course {0})")]
    NoStudentRole(i64),

    #[error("No manual enrolment instance in course {0}")]
    NoEnrolInstance(i64),

    #[error("Manual enrolment plugin is not installed or disabled")]
    ManualPluginNotInstalled,

    #[error("User {userid} cannot be enrolled with role {roleid} in course {courseid}")]
    CannotEnrol {
        courseid: i64,
        roleid: i64,
        userid: i64,
    },

    #[error("Table \"{0}\" does not exist")]
    TableMissing(String),

    #[error("Could not find forum module")]
    ForumModuleMissing,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Machine readable code sent to the client next to the message.
    pub fn errorcode(&self) -> &'static str {
        match self {
            Error::InvalidToken => "invalidtoken",
            Error::AdminRequired => "accessexception",
            Error::UnknownFunction(_) => "invalidrecord",
            Error::InvalidParameter(_) => "invalidparameter",
            Error::InvalidResponse(_) => "invalidresponse",
            Error::NoCourse(_) => "wsnocourse",
            Error::NoStudentRole(_) => "wsnostudentrole",
            Error::NoEnrolInstance(_) => "wsnoinstance",
            Error::ManualPluginNotInstalled => "manualpluginnotinstalled",
            Error::CannotEnrol { .. } => "wscannotenrol",
            Error::TableMissing(_) => "ddltablenotexist",
            Error::ForumModuleMissing => "forummodulemissing",
            Error::Database(_) => "dmlreadexception",
            Error::Serialization(_) => "invalidresponse",
        }
    }

    fn exception(&self) -> &'static str {
        match self {
            Error::InvalidToken | Error::AdminRequired => "webservice_access_exception",
            Error::InvalidParameter(_) | Error::InvalidResponse(_) => "invalid_parameter_exception",
            Error::TableMissing(_) => "ddl_table_missing_exception",
            Error::Database(_) => "dml_exception",
            _ => "moodle_exception",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidToken => StatusCode::UNAUTHORIZED,
            Error::AdminRequired => StatusCode::FORBIDDEN,
            Error::UnknownFunction(_) => StatusCode::NOT_FOUND,
            Error::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Error::NoCourse(_)
            | Error::NoStudentRole(_)
            | Error::NoEnrolInstance(_)
            | Error::CannotEnrol { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::ManualPluginNotInstalled
            | Error::TableMissing(_)
            | Error::ForumModuleMissing
            | Error::InvalidResponse(_)
            | Error::Database(_)
            | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.errorcode(), "web service failure");
        }
        let body = serde_json::json!({
            "exception": self.exception(),
            "errorcode": self.errorcode(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
