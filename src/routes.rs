use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    external::{self, Context, Function, FunctionKind, SERVICE_NAME, SERVICE_SHORTNAME},
    form::RestArgs,
    lms::Lms,
    models::Caller,
    settings::{self, SettingView},
};

#[derive(Clone)]
pub struct AppState {
    pub lms: Arc<dyn Lms>,
    pub site_course_id: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webservice/rest/server.php", post(rest_server))
        .route("/webservice/functions", get(list_functions))
        .route(
            "/admin/settings/local_reflect",
            get(get_settings).put(put_settings),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct RestQuery {
    wsfunction: Option<String>,
    wstoken: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    wstoken: Option<String>,
}

type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

async fn rest_server(
    State(state): State<AppState>,
    Query(q): Query<RestQuery>,
    bearer: BearerHeader,
    body: RestArgs,
) -> Result<Json<Value>> {
    let Some(function) = q.wsfunction.or(body.wsfunction) else {
        return Err(Error::InvalidParameter("missing wsfunction".into()));
    };
    let wstoken = q.wstoken.or(body.wstoken);

    let now = Utc::now().timestamp();
    let caller = authenticate(&state, bearer, wstoken.as_deref(), now).await?;
    let ctx = Context {
        allowlist: settings::load_allowlist(state.lms.as_ref()).await?,
        lms: state.lms.clone(),
        caller,
        site_course_id: state.site_course_id,
        now,
    };

    Ok(Json(
        external::call(&ctx, &function, Value::Object(body.args)).await?,
    ))
}

#[derive(Debug, Serialize)]
struct FunctionInfo {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "type")]
    kind: FunctionKind,
}

#[derive(Debug, Serialize)]
struct ServiceInfo {
    name: &'static str,
    shortname: &'static str,
    enabled: bool,
    restrictedusers: bool,
    functions: Vec<FunctionInfo>,
}

async fn list_functions() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: SERVICE_NAME,
        shortname: SERVICE_SHORTNAME,
        enabled: true,
        restrictedusers: false,
        functions: Function::ALL
            .into_iter()
            .map(|f| FunctionInfo {
                name: f.name(),
                description: f.description(),
                kind: f.kind(),
            })
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
struct SettingUpdate {
    #[serde(rename = "courseID")]
    course_id: String,
}

async fn get_settings(
    State(state): State<AppState>,
    Query(q): Query<TokenQuery>,
    bearer: BearerHeader,
) -> Result<Json<SettingView>> {
    require_admin(&state, bearer, q.wstoken.as_deref()).await?;
    Ok(Json(settings::view(state.lms.as_ref()).await?))
}

async fn put_settings(
    State(state): State<AppState>,
    Query(q): Query<TokenQuery>,
    bearer: BearerHeader,
    Json(update): Json<SettingUpdate>,
) -> Result<Json<SettingView>> {
    let admin = require_admin(&state, bearer, q.wstoken.as_deref()).await?;
    tracing::info!(user = admin.id, "updating allow-listed courses");
    Ok(Json(
        settings::update_course_ids(state.lms.as_ref(), &update.course_id).await?,
    ))
}

async fn require_admin(
    state: &AppState,
    bearer: BearerHeader,
    wstoken: Option<&str>,
) -> Result<Caller> {
    let caller = authenticate(state, bearer, wstoken, Utc::now().timestamp()).await?;
    if !state.lms.is_site_admin(caller.id).await? {
        return Err(Error::AdminRequired);
    }
    Ok(caller)
}

/// Resolves the caller from a bearer header, falling back to the `wstoken`
/// query parameter.
async fn authenticate(
    state: &AppState,
    bearer: BearerHeader,
    wstoken: Option<&str>,
    now: i64,
) -> Result<Caller> {
    let token = match &bearer {
        Some(TypedHeader(Authorization(b))) => Some(b.token()),
        None => wstoken,
    };
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return Err(Error::InvalidToken);
    };
    match state.lms.user_by_token(token, SERVICE_SHORTNAME, now).await? {
        Some(caller) => Ok(caller),
        None => {
            tracing::warn!("rejected unknown or expired token");
            Err(Error::InvalidToken)
        }
    }
}
