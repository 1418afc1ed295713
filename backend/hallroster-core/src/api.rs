// src/api.rs
use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};
use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::audit::audit_store;
use crate::derivation::{
    daily_board, hall_summaries, hall_work_dates, total_working_days, working_days_in_range,
    BoardFilter,
};
use crate::directory::{Directory, DirectoryError, EmployeeDraft, HallDraft};
use crate::export::{render, ExportError, ExportKind, ExportParams};
use crate::model::{parse_day_key, Employee, Hall};
use crate::payroll::{payroll_rows, payroll_total};
use crate::reconcile::{CommandOutcome, EngineError, ReconciliationEngine};
use crate::roster::RosterSnapshot;
use crate::session::{Session, SessionError, SessionGate, SignupRequest, UserSummary};
use crate::store::{fetch_all, SharedStore, StoreError};

// --- Error Handling ---

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("missing or unknown session token")]
    Unauthorized,
}

fn store_failure(e: &StoreError) -> (StatusCode, String) {
    match e {
        StoreError::NotFound(doc) => (StatusCode::NOT_FOUND, format!("{} was not found.", doc)),
        StoreError::ConfigError(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Configuration error.".to_string(),
        ),
        _ => (
            StatusCode::BAD_GATEWAY,
            "The document store request failed. Details logged.".to_string(),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Error occurred: {}", self);

        let mut committed: Option<Vec<String>> = None;
        let (status, message) = match &self {
            AppError::Engine(e) => {
                let status = match e {
                    EngineError::EmployeeNotFound(_) | EngineError::HallNotFound(_) => {
                        StatusCode::NOT_FOUND
                    }
                    EngineError::NotAttending { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    EngineError::Read(_) | EngineError::Store { .. } => StatusCode::BAD_GATEWAY,
                };
                if let EngineError::Store { committed: done, .. } = e {
                    if e.has_partial_effect() {
                        warn!("Partial write left {} document(s) changed", done.len());
                        committed = Some(done.iter().map(ToString::to_string).collect());
                    }
                }
                (status, e.user_message())
            }
            AppError::Directory(e) => match e {
                DirectoryError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                DirectoryError::DuplicateName(_) => (StatusCode::CONFLICT, e.to_string()),
                DirectoryError::NotFound { .. } => (StatusCode::NOT_FOUND, e.to_string()),
                DirectoryError::Store(inner) => store_failure(inner),
            },
            AppError::Session(e) => match e {
                SessionError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                SessionError::EmailTaken(_) => (StatusCode::CONFLICT, e.to_string()),
                SessionError::InvalidCredentials => (StatusCode::UNAUTHORIZED, e.to_string()),
                SessionError::UserNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                SessionError::Store(inner) => store_failure(inner),
            },
            AppError::Store(e) => store_failure(e),
            AppError::Export(e) => match e {
                ExportError::UnknownKind(_) | ExportError::MissingParameter(..) => {
                    (StatusCode::BAD_REQUEST, e.to_string())
                }
                ExportError::UnknownEmployee(_) => (StatusCode::NOT_FOUND, e.to_string()),
                ExportError::Csv(_) | ExportError::Buffer(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error (CSV export). Check logs.".to_string(),
                ),
            },
            AppError::InvalidDate(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
        };

        let body = match committed {
            Some(committed) => json!({ "error": message, "committed": committed }),
            None => json!({ "error": message }),
        };
        (status, Json(body)).into_response()
    }
}

// --- State & Router ---

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub engine: ReconciliationEngine,
    pub directory: Directory,
    pub sessions: SessionGate,
}

impl AppState {
    pub fn new(store: SharedStore, session_ttl: Duration) -> Self {
        Self {
            engine: ReconciliationEngine::new(store.clone()),
            directory: Directory::new(store.clone()),
            sessions: SessionGate::new(store.clone(), session_ttl),
            store,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/employees", get(list_employees).post(create_employee))
        .route(
            "/api/employees/{id}",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
        .route("/api/employees/{id}/rate", put(set_daily_rate))
        .route("/api/employees/{id}/comment", put(set_comment))
        .route(
            "/api/employees/{id}/attendance/{date}/toggle",
            post(toggle_attendance),
        )
        .route("/api/employees/{id}/car/{date}/toggle", post(toggle_car))
        .route("/api/employees/{id}/halls/{date}", put(assign_hall))
        .route("/api/employees/{id}/reset", post(reset_employee))
        .route("/api/employees/{id}/days", get(employee_days))
        .route("/api/halls", get(list_halls).post(create_hall))
        .route("/api/halls/summary", get(halls_summary))
        .route(
            "/api/halls/{id}",
            get(get_hall).put(update_hall).delete(delete_hall),
        )
        .route("/api/halls/{id}/reset", post(reset_hall))
        .route("/api/halls/{id}/dates", get(hall_dates))
        .route("/api/board", get(board))
        .route("/api/payroll", get(payroll))
        .route("/api/audit", get(run_audit))
        .route("/api/export/{kind}", get(export))
        .route("/api/users", get(list_users))
        .route("/api/users/{id}", delete(delete_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/session/signup", post(signup))
        .route("/api/session/login", post(login))
        .route("/api/session/logout", post(logout))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;
    let session = state
        .sessions
        .validate(token)
        .await
        .ok_or(AppError::Unauthorized)?;
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    parse_day_key(raw).ok_or_else(|| AppError::InvalidDate(raw.to_string()))
}

// --- Public Handlers ---

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<UserSummary>), AppError> {
    let user = state.sessions.signup(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (token, user) = state.sessions.login(&request.email, &request.password).await?;
    Ok(Json(json!({
        "token": token,
        "tokenType": "Bearer",
        "user": user,
    })))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    let logged_out = state.sessions.logout(token).await;
    Ok(Json(json!({ "loggedOut": logged_out })))
}

// --- Directory Handlers ---

async fn list_employees(State(state): State<AppState>) -> Result<Json<Vec<Employee>>, AppError> {
    Ok(Json(state.directory.list_employees().await?))
}

async fn get_employee(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Employee>, AppError> {
    Ok(Json(state.directory.get_employee(&id).await?))
}

async fn create_employee(
    State(state): State<AppState>,
    Json(draft): Json<EmployeeDraft>,
) -> Result<(StatusCode, Json<Employee>), AppError> {
    let employee = state.directory.create_employee(draft).await?;
    Ok((StatusCode::CREATED, Json(employee)))
}

async fn update_employee(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<EmployeeDraft>,
) -> Result<Json<Employee>, AppError> {
    Ok(Json(state.directory.update_employee(&id, draft).await?))
}

async fn delete_employee(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.directory.delete_employee(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RateBody {
    #[serde(default)]
    daily_rate: String,
}

async fn set_daily_rate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RateBody>,
) -> Result<Json<Employee>, AppError> {
    Ok(Json(state.directory.set_daily_rate(&id, &body.daily_rate).await?))
}

#[derive(Debug, Deserialize)]
struct CommentBody {
    #[serde(default)]
    comment: String,
}

async fn set_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<Json<Employee>, AppError> {
    Ok(Json(state.directory.set_comment(&id, &body.comment).await?))
}

async fn list_halls(State(state): State<AppState>) -> Result<Json<Vec<Hall>>, AppError> {
    Ok(Json(state.directory.list_halls().await?))
}

async fn get_hall(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Hall>, AppError> {
    Ok(Json(state.directory.get_hall(&id).await?))
}

async fn create_hall(
    State(state): State<AppState>,
    Json(draft): Json<HallDraft>,
) -> Result<(StatusCode, Json<Hall>), AppError> {
    let hall = state.directory.create_hall(draft).await?;
    Ok((StatusCode::CREATED, Json(hall)))
}

async fn update_hall(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<HallDraft>,
) -> Result<Json<Hall>, AppError> {
    Ok(Json(state.directory.update_hall(&id, draft).await?))
}

async fn delete_hall(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.directory.delete_hall(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Reconciliation Handlers ---

async fn toggle_attendance(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path((id, date)): Path<(String, String)>,
) -> Result<Json<CommandOutcome>, AppError> {
    let date = parse_date(&date)?;
    info!("{} toggles attendance of {} on {}", session.email, id, date);
    Ok(Json(state.engine.toggle_attendance(&id, date).await?))
}

async fn toggle_car(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path((id, date)): Path<(String, String)>,
) -> Result<Json<CommandOutcome>, AppError> {
    let date = parse_date(&date)?;
    info!("{} toggles car availability of {} on {}", session.email, id, date);
    Ok(Json(state.engine.toggle_car(&id, date).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignBody {
    #[serde(default)]
    hall_id: Option<String>,
}

async fn assign_hall(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path((id, date)): Path<(String, String)>,
    Json(body): Json<AssignBody>,
) -> Result<Json<CommandOutcome>, AppError> {
    let date = parse_date(&date)?;
    let hall_id = body.hall_id.unwrap_or_default();
    info!(
        "{} assigns hall '{}' to {} on {}",
        session.email, hall_id, id, date
    );
    Ok(Json(state.engine.assign_hall(&id, date, &hall_id).await?))
}

async fn reset_employee(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<CommandOutcome>, AppError> {
    warn!("{} resets the history of employee {}", session.email, id);
    Ok(Json(state.engine.reset_employee(&id).await?))
}

async fn reset_hall(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<CommandOutcome>, AppError> {
    warn!("{} resets the aggregates of hall {}", session.email, id);
    Ok(Json(state.engine.reset_hall(&id).await?))
}

// --- Query Handlers ---

#[derive(Debug, Deserialize)]
struct RangeQuery {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

async fn employee_days(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(range): Query<RangeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let today = today();
    let start = range.start.unwrap_or_else(|| today.with_day(1).unwrap_or(today));
    let end = range.end.unwrap_or(today);
    if start > end {
        return Err(AppError::BadRequest(format!(
            "start {} is after end {}",
            start, end
        )));
    }
    let employee = state.directory.get_employee(&id).await?;
    let halls = fetch_all::<Hall>(state.store.as_ref()).await?;
    Ok(Json(working_days_in_range(&employee, &halls, start, end)))
}

async fn hall_dates(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let hall = state.directory.get_hall(&id).await?;
    let employees = fetch_all::<Employee>(state.store.as_ref()).await?;
    let dates = hall_work_dates(&hall, &employees);
    Ok(Json(json!({ "hallId": hall.id, "dates": dates })))
}

#[derive(Debug, Deserialize)]
struct BoardQuery {
    date: Option<NaiveDate>,
    hall: Option<String>,
    name: Option<String>,
}

async fn board(
    State(state): State<AppState>,
    Query(query): Query<BoardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let date = query.date.unwrap_or_else(today);
    let roster = RosterSnapshot::load(state.store.as_ref()).await?;
    let filter = BoardFilter {
        hall_id: query.hall,
        name: query.name,
    };
    let rows = daily_board(&roster.employees, &roster.halls, date, &filter);
    Ok(Json(json!({ "date": date, "rows": rows })))
}

#[derive(Debug, Deserialize)]
struct NameQuery {
    name: Option<String>,
}

async fn payroll(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> Result<impl IntoResponse, AppError> {
    let employees = fetch_all::<Employee>(state.store.as_ref()).await?;
    let name = query.name.as_deref();
    Ok(Json(json!({
        "rows": payroll_rows(&employees, name),
        "total": payroll_total(&employees, name),
    })))
}

async fn halls_summary(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let roster = RosterSnapshot::load(state.store.as_ref()).await?;
    Ok(Json(json!({
        "halls": hall_summaries(&roster.halls, &roster.employees),
        "totalWorkingDays": total_working_days(&roster.halls),
    })))
}

async fn run_audit(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let findings = audit_store(state.store.as_ref()).await?;
    Ok(Json(json!({
        "consistent": findings.is_empty(),
        "findings": findings,
    })))
}

async fn export(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<ExportParams>,
) -> Result<Response, AppError> {
    let kind: ExportKind = kind.parse()?;
    let roster = RosterSnapshot::load(state.store.as_ref()).await?;
    let rendered = render(kind, &params, &roster, today())?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", rendered.file_name),
            ),
        ],
        rendered.body,
    )
        .into_response())
}

// --- User Handlers ---

#[derive(Debug, Deserialize)]
struct UserQuery {
    search: Option<String>,
}

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<UserSummary>>, AppError> {
    Ok(Json(state.sessions.list_users(query.search.as_deref()).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    info!("{} deletes user {}", session.email, id);
    state.sessions.delete_user(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::store::{Collection, Record};
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn seeded() -> (MemoryStore, Router) {
        let store = MemoryStore::new();
        let employee = Employee {
            id: "e1".into(),
            name: "Dana".into(),
            ..Default::default()
        };
        for (id, name) in [("h1", "North"), ("h2", "South")] {
            let hall = Hall {
                id: id.into(),
                name: name.into(),
                location: "Haifa".into(),
                ..Default::default()
            };
            store
                .seed(Collection::Halls, id, hall.to_fields().unwrap())
                .await;
        }
        store
            .seed(Collection::Employees, "e1", employee.to_fields().unwrap())
            .await;
        let app = router(AppState::new(Arc::new(store.clone()), Duration::hours(12)));
        (store, app)
    }

    async fn send(app: &Router, request: HttpRequest<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    fn call(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn sign_in(app: &Router) -> String {
        let (status, _) = send(
            app,
            call(
                "POST",
                "/api/session/signup",
                None,
                Some(json!({
                    "fullName": "Office Admin",
                    "email": "admin@example.com",
                    "password": "secret1",
                    "confirmPassword": "secret1",
                    "phone": "0501234567",
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(
            app,
            call(
                "POST",
                "/api/session/login",
                None,
                Some(json!({ "email": "admin@example.com", "password": "secret1" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (_, app) = seeded().await;
        let (status, body) = send(&app, call("GET", "/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn api_routes_need_a_live_session() {
        let (_, app) = seeded().await;
        let (status, _) = send(&app, call("GET", "/api/employees", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, call("GET", "/api/employees", Some("bogus"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = sign_in(&app).await;
        let (status, body) = send(&app, call("GET", "/api/employees", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = send(&app, call("POST", "/api/session/logout", Some(&token), None)).await;
        assert_eq!(body["loggedOut"], true);
        let (status, _) = send(&app, call("GET", "/api/employees", Some(&token), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn toggle_and_assign_update_the_hall() {
        let (_, app) = seeded().await;
        let token = sign_in(&app).await;

        let (status, body) = send(
            &app,
            call(
                "POST",
                "/api/employees/e1/attendance/2024-05-01/toggle",
                Some(&token),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["employee"]["workingDays"], "1");

        let (status, body) = send(
            &app,
            call(
                "PUT",
                "/api/employees/e1/halls/2024-05-01",
                Some(&token),
                Some(json!({ "hallId": "h1" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["halls"][0]["id"], "h1");

        let (_, hall) = send(&app, call("GET", "/api/halls/h1", Some(&token), None)).await;
        assert_eq!(hall["workingDays"], "1");
        assert_eq!(hall["employeeDates"]["e1"][0], "2024-05-01");

        let (_, dates) = send(&app, call("GET", "/api/halls/h1/dates", Some(&token), None)).await;
        assert_eq!(dates["dates"], json!(["2024-05-01"]));

        let (_, report) = send(
            &app,
            call(
                "GET",
                "/api/employees/e1/days?start=2024-05-01&end=2024-05-31",
                Some(&token),
                None,
            ),
        )
        .await;
        assert_eq!(report["workingDays"], 1);

        let (_, audit) = send(&app, call("GET", "/api/audit", Some(&token), None)).await;
        assert_eq!(audit["consistent"], true);
    }

    #[tokio::test]
    async fn engine_failures_map_to_statuses() {
        let (store, app) = seeded().await;
        let token = sign_in(&app).await;

        let (status, _) = send(
            &app,
            call(
                "PUT",
                "/api/employees/e1/halls/2024-05-01",
                Some(&token),
                Some(json!({ "hallId": "h1" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(
            &app,
            call("POST", "/api/employees/e1/attendance/May-1/toggle", Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            call("POST", "/api/employees/nobody/car/2024-05-01/toggle", Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(
            &app,
            call("POST", "/api/employees/e1/attendance/2024-05-01/toggle", Some(&token), None),
        )
        .await;
        send(
            &app,
            call(
                "PUT",
                "/api/employees/e1/halls/2024-05-01",
                Some(&token),
                Some(json!({ "hallId": "h1" })),
            ),
        )
        .await;
        store.fail_writes_to(Collection::Halls, "h2").await;
        let (status, body) = send(
            &app,
            call(
                "PUT",
                "/api/employees/e1/halls/2024-05-01",
                Some(&token),
                Some(json!({ "hallId": "h2" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["committed"], json!(["employees/e1", "halls/h1"]));
    }

    #[tokio::test]
    async fn payroll_and_export_read_the_roster() {
        let (_, app) = seeded().await;
        let token = sign_in(&app).await;
        send(
            &app,
            call(
                "PUT",
                "/api/employees/e1/rate",
                Some(&token),
                Some(json!({ "dailyRate": "100" })),
            ),
        )
        .await;
        send(
            &app,
            call("POST", "/api/employees/e1/attendance/2024-05-01/toggle", Some(&token), None),
        )
        .await;

        let (status, body) = send(&app, call("GET", "/api/payroll", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rows"][0]["workingDays"], 1);

        let response = app
            .clone()
            .oneshot(call("GET", "/api/export/payroll", Some(&token), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("Dana"));

        let (status, _) = send(&app, call("GET", "/api/export/pdf", Some(&token), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn directory_conflicts_are_reported() {
        let (_, app) = seeded().await;
        let token = sign_in(&app).await;
        let (status, _) = send(
            &app,
            call(
                "POST",
                "/api/employees",
                Some(&token),
                Some(json!({ "name": " dana " })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            call(
                "POST",
                "/api/halls",
                Some(&token),
                Some(json!({ "name": "East", "location": "Akko" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["workingDays"], "0");
    }
}
