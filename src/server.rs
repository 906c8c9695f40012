use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::compression::CompressionLayer;
use tracing::{info, warn};

use crate::assign::{Assignment, assign, resolve_identity};
use crate::error::Error;
use crate::hasher::HashKind;
use crate::identity::CookieIdentity;
use crate::settings::SettingsPatch;
use crate::state::{ServiceState, SharedState, configure};

pub const IDENTITY_COOKIE: &str = "bucketeer_id";

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/experiments", get(experiments_handler))
        .route("/experiments/{name}/assignment", get(assignment_handler))
        .route(
            "/experiments/{name}/groups/{bucket}",
            get(membership_handler),
        )
        .route("/settings", get(settings_handler).put(configure_handler))
        .layer(CompressionLayer::new())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct IdentityQuery {
    identity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SettingsUpdate {
    groups: Option<u32>,
    hash: Option<HashKind>,
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn experiments_handler(State(state): State<SharedState>) -> Response {
    let guard = state.load();
    Json(json!({ "experiments": guard.experiments })).into_response()
}

async fn assignment_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(query): Query<IdentityQuery>,
    headers: HeaderMap,
) -> Response {
    let guard = state.load();
    let evaluated = match evaluate(&guard, &name, query.identity, &headers) {
        Ok(evaluated) => evaluated,
        Err(response) => return response,
    };

    let body = json!({
        "experiment": name,
        "identity": evaluated.identity,
        "assignment": evaluated.assignment.as_i64(),
        "bucket": evaluated.assignment.bucket(),
        "control": evaluated.assignment.is_control(),
    });
    with_identity_cookie(Json(body).into_response(), evaluated.issued.as_deref())
}

async fn membership_handler(
    State(state): State<SharedState>,
    Path((name, bucket)): Path<(String, u32)>,
    Query(query): Query<IdentityQuery>,
    headers: HeaderMap,
) -> Response {
    let guard = state.load();
    let evaluated = match evaluate(&guard, &name, query.identity, &headers) {
        Ok(evaluated) => evaluated,
        Err(response) => return response,
    };

    let body = json!({
        "experiment": name,
        "identity": evaluated.identity,
        "bucket": bucket,
        "member": evaluated.assignment == Assignment::Bucket(bucket),
    });
    with_identity_cookie(Json(body).into_response(), evaluated.issued.as_deref())
}

async fn settings_handler(State(state): State<SharedState>) -> Response {
    settings_body(&state.load())
}

async fn configure_handler(
    State(state): State<SharedState>,
    Json(update): Json<SettingsUpdate>,
) -> Response {
    let mut patch = SettingsPatch::default();
    if let Some(groups) = update.groups {
        if groups == 0 {
            return error_response(&Error::configuration("groups must be greater than 0"));
        }
        patch = patch.groups(groups);
    }
    if let Some(kind) = update.hash {
        patch = patch.hash_kind(kind);
    }
    let next = configure(&state, patch);
    info!(
        groups = ?next.settings.groups,
        hasher = next.settings.hasher.name(),
        "settings updated"
    );
    settings_body(&next)
}

struct Evaluated {
    identity: String,
    assignment: Assignment,
    /// Identity generated for this request, to be stored in the cookie.
    issued: Option<String>,
}

/// Resolves the caller's identity (query, then cookie, then a new one) and
/// assigns it within the named experiment.
fn evaluate(
    state: &ServiceState,
    name: &str,
    identity: Option<String>,
    headers: &HeaderMap,
) -> Result<Evaluated, Response> {
    let Some(experiment) = state.experiment(name) else {
        return Err((
            StatusCode::NOT_FOUND,
            format!("experiment {name:?} not found"),
        )
            .into_response());
    };

    let provider = CookieIdentity::new(identity_cookie(headers));
    let identity =
        resolve_identity(identity.as_deref(), &provider).map_err(|e| error_response(&e))?;
    let request = experiment
        .request(Some(identity.clone()))
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response())?;
    let assignment =
        assign(&request, &state.settings, &provider).map_err(|e| error_response(&e))?;

    Ok(Evaluated {
        identity,
        assignment,
        issued: provider.issued().map(str::to_owned),
    })
}

fn identity_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == IDENTITY_COOKIE)
        .map(|(_, value)| value.to_owned())
}

fn with_identity_cookie(mut response: Response, issued: Option<&str>) -> Response {
    let Some(id) = issued else {
        return response;
    };
    let cookie = format!("{IDENTITY_COOKIE}={id}; Path=/; Max-Age=31536000; SameSite=Lax");
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!(error = %e, "generated identity is not a valid cookie value"),
    }
    response
}

fn settings_body(state: &ServiceState) -> Response {
    Json(json!({
        "groups": state.settings.groups,
        "hash": state.settings.hasher.name(),
    }))
    .into_response()
}

fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::Configuration { .. } | Error::MissingCallback { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        Error::Identity { .. } => StatusCode::BAD_REQUEST,
        Error::HashFunction { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, "assignment failed");
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}
