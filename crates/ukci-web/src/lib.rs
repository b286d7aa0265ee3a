//! JSON API over the monitor: watchlists, alerts, dashboards, and check triggers.
//!
//! Every tenant-scoped route reads the tenant from the `x-tenant-id` header.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info};
use ukci_core::{Alert, AlertType, Company, Filing, NewTenant, Officer, SubscriptionTier, Tenant};
use ukci_monitor::{Monitor, TaskRecord, WatchlistError};
use ukci_registry::RegistryError;
use ukci_store::{AlertQuery, StoreError};
use uuid::Uuid;

pub const CRATE_NAME: &str = "ukci-web";

pub const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
}

impl AppState {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self { monitor }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Conflict(m) => (StatusCode::CONFLICT, m),
            Self::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound(err.to_string()),
            StoreError::Conflict => Self::Conflict(err.to_string()),
            StoreError::InvalidReference => Self::BadRequest(err.to_string()),
            StoreError::Database(ref source) => {
                error!(error = %source, "store failure");
                Self::Internal("internal storage error".into())
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        error!(error = %err, "registry failure");
        Self::Unavailable(format!("company registry unavailable: {err}"))
    }
}

impl From<WatchlistError> for ApiError {
    fn from(err: WatchlistError) -> Self {
        match err {
            WatchlistError::InvalidNumber(_) | WatchlistError::BatchSize(_) => {
                Self::BadRequest(err.to_string())
            }
            WatchlistError::UnknownTenant(_)
            | WatchlistError::UnknownCompany(_)
            | WatchlistError::NotInRegistry(_) => Self::NotFound(err.to_string()),
            WatchlistError::AlreadyMonitored(_) => Self::Conflict(err.to_string()),
            WatchlistError::Registry(e) => e.into(),
            WatchlistError::Store(e) => e.into(),
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Active tenant named by the `x-tenant-id` header.
pub struct CurrentTenant(pub Tenant);

impl FromRequestParts<Arc<AppState>> for CurrentTenant {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest(format!("missing {TENANT_HEADER} header")))?;
        let tenant_id = Uuid::parse_str(raw.trim())
            .map_err(|_| ApiError::BadRequest(format!("invalid {TENANT_HEADER} header")))?;
        match state.monitor.store().get_tenant(tenant_id).await? {
            Some(tenant) if tenant.is_active => Ok(Self(tenant)),
            _ => Err(ApiError::NotFound(format!("tenant {tenant_id} not found"))),
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/tenants", post(create_tenant_handler))
        .route("/api/companies/search", get(search_handler))
        .route(
            "/api/companies",
            get(list_companies_handler).post(add_company_handler),
        )
        .route("/api/companies/bulk-import", post(bulk_import_handler))
        .route("/api/companies/{id}", get(company_detail_handler))
        .route("/api/companies/{id}/refresh", post(refresh_handler))
        .route(
            "/api/companies/{id}/monitor",
            post(monitor_on_handler).delete(monitor_off_handler),
        )
        .route("/api/monitor/trigger", post(trigger_handler))
        .route("/api/tasks/{id}", get(task_handler))
        .route("/api/alerts", get(list_alerts_handler))
        .route("/api/alerts/{id}/read", post(mark_read_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "web api listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "timestamp": Utc::now() }))
}

#[derive(Debug, Deserialize)]
struct CreateTenantRequest {
    name: String,
    #[serde(default)]
    subscription_tier: SubscriptionTier,
}

async fn create_tenant_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTenantRequest>,
) -> ApiResult<(StatusCode, Json<Tenant>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("tenant name is required".into()));
    }
    let tenant = state
        .monitor
        .store()
        .create_tenant(NewTenant {
            name: req.name,
            subscription_tier: req.subscription_tier,
        })
        .await?;
    info!(tenant_id = %tenant.id, slug = %tenant.slug, "tenant registered");
    Ok((StatusCode::CREATED, Json(tenant)))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    _tenant: CurrentTenant,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<ukci_core::SearchResults>> {
    let q = query.q.trim();
    if q.chars().count() < 2 {
        return Err(ApiError::BadRequest(
            "search query must be at least 2 characters".into(),
        ));
    }
    let limit = query.limit.unwrap_or(20);
    if !(1..=50).contains(&limit) {
        return Err(ApiError::BadRequest("limit must be between 1 and 50".into()));
    }
    let results = state.monitor.registry().search_companies(q, limit).await?;
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
struct AddCompanyRequest {
    company_number: String,
}

async fn add_company_handler(
    State(state): State<Arc<AppState>>,
    CurrentTenant(tenant): CurrentTenant,
    Json(req): Json<AddCompanyRequest>,
) -> ApiResult<(StatusCode, Json<Company>)> {
    let company = state
        .monitor
        .watchlist()
        .add_company(tenant.id, &req.company_number)
        .await?;
    Ok((StatusCode::CREATED, Json(company)))
}

#[derive(Debug, Deserialize)]
struct BulkImportRequest {
    company_numbers: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TaskHandle {
    task_id: Uuid,
    status: ukci_monitor::TaskState,
}

impl From<TaskRecord> for TaskHandle {
    fn from(record: TaskRecord) -> Self {
        Self {
            task_id: record.id,
            status: record.state,
        }
    }
}

async fn bulk_import_handler(
    State(state): State<Arc<AppState>>,
    CurrentTenant(tenant): CurrentTenant,
    Json(req): Json<BulkImportRequest>,
) -> ApiResult<(StatusCode, Json<TaskHandle>)> {
    let task = state
        .monitor
        .bulk_import(tenant.id, req.company_numbers)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(task.into())))
}

#[derive(Debug, Deserialize)]
struct ListCompaniesQuery {
    monitored: Option<bool>,
}

async fn list_companies_handler(
    State(state): State<Arc<AppState>>,
    CurrentTenant(tenant): CurrentTenant,
    Query(query): Query<ListCompaniesQuery>,
) -> ApiResult<Json<Vec<Company>>> {
    let companies = state
        .monitor
        .store()
        .list_companies(tenant.id, query.monitored)
        .await?;
    Ok(Json(companies))
}

#[derive(Debug, Serialize)]
struct CompanyDetail {
    company: Company,
    filings: Vec<Filing>,
    officers: Vec<Officer>,
    recent_alerts: Vec<Alert>,
}

async fn tenant_company(state: &AppState, tenant: &Tenant, id: Uuid) -> ApiResult<Company> {
    state
        .monitor
        .store()
        .get_company(tenant.id, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("company {id} not found")))
}

async fn company_detail_handler(
    State(state): State<Arc<AppState>>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CompanyDetail>> {
    let company = tenant_company(&state, &tenant, id).await?;
    let store = state.monitor.store();
    let filings = store.list_filings(company.id, 20).await?;
    let officers = store.list_officers(company.id).await?;
    let recent_alerts = store
        .list_alerts(
            tenant.id,
            &AlertQuery {
                company_id: Some(company.id),
                limit: 10,
                ..Default::default()
            },
        )
        .await?;
    Ok(Json(CompanyDetail {
        company,
        filings,
        officers,
        recent_alerts,
    }))
}

async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<TaskHandle>)> {
    let company = tenant_company(&state, &tenant, id).await?;
    let task = state.monitor.check_company(tenant.id, company.id).await;
    Ok((StatusCode::ACCEPTED, Json(task.into())))
}

async fn monitor_on_handler(
    State(state): State<Arc<AppState>>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Company>> {
    let company = state
        .monitor
        .watchlist()
        .set_monitoring(tenant.id, id, true)
        .await?;
    Ok(Json(company))
}

async fn monitor_off_handler(
    State(state): State<Arc<AppState>>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Company>> {
    let company = state
        .monitor
        .watchlist()
        .set_monitoring(tenant.id, id, false)
        .await?;
    Ok(Json(company))
}

async fn trigger_handler(
    State(state): State<Arc<AppState>>,
    CurrentTenant(tenant): CurrentTenant,
) -> (StatusCode, Json<TaskHandle>) {
    let task = state.monitor.check_all_due(Some(tenant.id)).await;
    (StatusCode::ACCEPTED, Json(task.into()))
}

async fn task_handler(
    State(state): State<Arc<AppState>>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TaskRecord>> {
    state
        .monitor
        .tenant_task_status(tenant.id, id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("task {id} not found")))
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    #[serde(default)]
    unread: bool,
    company_id: Option<Uuid>,
    alert_type: Option<AlertType>,
    limit: Option<i64>,
}

async fn list_alerts_handler(
    State(state): State<Arc<AppState>>,
    CurrentTenant(tenant): CurrentTenant,
    Query(query): Query<AlertsQuery>,
) -> ApiResult<Json<Vec<Alert>>> {
    let alerts = state
        .monitor
        .store()
        .list_alerts(
            tenant.id,
            &AlertQuery {
                unread_only: query.unread,
                company_id: query.company_id,
                alert_type: query.alert_type,
                limit: query.limit.unwrap_or(50).clamp(1, 200),
            },
        )
        .await?;
    Ok(Json(alerts))
}

async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    CurrentTenant(tenant): CurrentTenant,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if state.monitor.store().mark_alert_read(tenant.id, id).await? {
        Ok(Json(json!({ "id": id, "is_read": true })))
    } else {
        Err(ApiError::NotFound(format!("alert {id} not found")))
    }
}

#[derive(Debug, Serialize)]
struct Dashboard {
    tenant: Tenant,
    monitored_companies: usize,
    unread_alerts: i64,
    recent_alerts: Vec<Alert>,
    watched_companies: Vec<Company>,
}

async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    CurrentTenant(tenant): CurrentTenant,
) -> ApiResult<Json<Dashboard>> {
    let store = state.monitor.store();
    let mut watched = store.list_companies(tenant.id, Some(true)).await?;
    let unread_alerts = store.count_unread(tenant.id).await?;
    let recent_alerts = store
        .list_alerts(
            tenant.id,
            &AlertQuery {
                limit: 10,
                ..Default::default()
            },
        )
        .await?;
    watched.sort_by(|a, b| b.risk_score.cmp(&a.risk_score).then(a.name.cmp(&b.name)));
    let monitored_companies = watched.len();
    watched.truncate(10);
    Ok(Json(Dashboard {
        tenant,
        monitored_companies,
        unread_alerts,
        recent_alerts,
        watched_companies: watched,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;
    use ukci_monitor::{MonitorPolicy, RetryPolicy};
    use ukci_registry::FixtureRegistry;
    use ukci_store::{MemoryStore, MonitorStore};

    async fn state() -> (AppState, Uuid) {
        let root =
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/companies");
        let registry = Arc::new(FixtureRegistry::from_dir(root).await.unwrap());
        let store = Arc::new(MemoryStore::new());
        let tenant = store
            .create_tenant(NewTenant {
                name: "Acme Risk".into(),
                subscription_tier: SubscriptionTier::Professional,
            })
            .await
            .unwrap();
        let monitor = Monitor::new(
            store,
            registry,
            MonitorPolicy::default(),
            RetryPolicy::no_retry(),
            2,
        );
        (AppState::new(Arc::new(monitor)), tenant.id)
    }

    fn request(
        method: &str,
        uri: &str,
        tenant: Option<Uuid>,
        body: Option<serde_json::Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tenant) = tenant {
            builder = builder.header(TENANT_HEADER, tenant.to_string());
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let (state, _) = state().await;
        let resp = app(state)
            .oneshot(request("GET", "/api/health", None, None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "healthy");
    }

    #[tokio::test]
    async fn tenant_registration_dedupes_slugs() {
        let (state, _) = state().await;
        let app = app(state);
        let body = json!({ "name": "Acme Risk" });
        let resp = app
            .clone()
            .oneshot(request("POST", "/api/tenants", None, Some(body)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(json_body(resp).await["slug"], "acme-risk-1");

        let blank = app
            .oneshot(request("POST", "/api/tenants", None, Some(json!({ "name": "  " }))))
            .await
            .unwrap();
        assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tenant_header_is_required() {
        let (state, _) = state().await;
        let app = app(state);
        let missing = app
            .clone()
            .oneshot(request("GET", "/api/companies", None, None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(missing).await["error"]
            .as_str()
            .unwrap()
            .contains(TENANT_HEADER));

        let unknown = app
            .oneshot(request("GET", "/api/companies", Some(Uuid::new_v4()), None))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn add_company_then_view_detail() {
        let (state, tenant) = state().await;
        let app = app(state);
        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/companies",
                Some(tenant),
                Some(json!({ "company_number": "445790" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let company = json_body(resp).await;
        let id = company["id"].as_str().unwrap().to_string();

        let dup = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/companies",
                Some(tenant),
                Some(json!({ "company_number": "00445790" })),
            ))
            .await
            .unwrap();
        assert_eq!(dup.status(), StatusCode::CONFLICT);

        let detail = app
            .clone()
            .oneshot(request("GET", &format!("/api/companies/{id}"), Some(tenant), None))
            .await
            .unwrap();
        assert_eq!(detail.status(), StatusCode::OK);
        let detail = json_body(detail).await;
        assert_eq!(detail["filings"].as_array().unwrap().len(), 3);
        assert_eq!(detail["officers"].as_array().unwrap().len(), 2);
        assert_eq!(detail["recent_alerts"][0]["alert_type"], "monitoring_started");

        let dashboard = app
            .oneshot(request("GET", "/api/dashboard", Some(tenant), None))
            .await
            .unwrap();
        let dashboard = json_body(dashboard).await;
        assert_eq!(dashboard["monitored_companies"], 1);
        assert_eq!(dashboard["unread_alerts"], 1);
    }

    #[tokio::test]
    async fn unknown_registry_number_is_not_found() {
        let (state, tenant) = state().await;
        let resp = app(state)
            .oneshot(request(
                "POST",
                "/api/companies",
                Some(tenant),
                Some(json!({ "company_number": "99999999" })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn search_validates_query() {
        let (state, tenant) = state().await;
        let app = app(state);
        let short = app
            .clone()
            .oneshot(request("GET", "/api/companies/search?q=t", Some(tenant), None))
            .await
            .unwrap();
        assert_eq!(short.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(request("GET", "/api/companies/search?q=tesco&limit=5", Some(tenant), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["items"][0]["registration_number"], "00445790");
    }

    #[tokio::test]
    async fn refresh_returns_pollable_task() {
        let (state, tenant) = state().await;
        let company = state
            .monitor
            .watchlist()
            .add_company(tenant, "00445790")
            .await
            .unwrap();
        let app = app(state);

        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                &format!("/api/companies/{}/refresh", company.id),
                Some(tenant),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let task_id = json_body(resp).await["task_id"].as_str().unwrap().to_string();

        let mut state_label = String::new();
        for _ in 0..200 {
            let resp = app
                .clone()
                .oneshot(request("GET", &format!("/api/tasks/{task_id}"), Some(tenant), None))
                .await
                .unwrap();
            let task = json_body(resp).await;
            state_label = task["state"].as_str().unwrap().to_string();
            if state_label == "succeeded" || state_label == "failed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(state_label, "succeeded");

        let other_tenant = app
            .oneshot(request(
                "POST",
                &format!("/api/companies/{}/refresh", Uuid::new_v4()),
                Some(tenant),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(other_tenant.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tasks_are_only_visible_to_their_tenant() {
        let (state, tenant) = state().await;
        let other = state
            .monitor
            .store()
            .create_tenant(NewTenant {
                name: "Rival Ltd".into(),
                subscription_tier: SubscriptionTier::Free,
            })
            .await
            .unwrap();
        let app = app(state);

        let resp = app
            .clone()
            .oneshot(request(
                "POST",
                "/api/companies/bulk-import",
                Some(tenant),
                Some(json!({ "company_numbers": ["00445790"] })),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let task_id = json_body(resp).await["task_id"].as_str().unwrap().to_string();
        let uri = format!("/api/tasks/{task_id}");

        let own = app
            .clone()
            .oneshot(request("GET", &uri, Some(tenant), None))
            .await
            .unwrap();
        assert_eq!(own.status(), StatusCode::OK);

        let foreign = app
            .clone()
            .oneshot(request("GET", &uri, Some(other.id), None))
            .await
            .unwrap();
        assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

        let anonymous = app.oneshot(request("GET", &uri, None, None)).await.unwrap();
        assert_eq!(anonymous.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn alerts_can_be_listed_and_marked_read() {
        let (state, tenant) = state().await;
        state
            .monitor
            .watchlist()
            .add_company(tenant, "00445790")
            .await
            .unwrap();
        let app = app(state);

        let resp = app
            .clone()
            .oneshot(request("GET", "/api/alerts?unread=true", Some(tenant), None))
            .await
            .unwrap();
        let alerts = json_body(resp).await;
        let alert_id = alerts[0]["id"].as_str().unwrap().to_string();

        let read = app
            .clone()
            .oneshot(request("POST", &format!("/api/alerts/{alert_id}/read"), Some(tenant), None))
            .await
            .unwrap();
        assert_eq!(read.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(request("GET", "/api/alerts?unread=true", Some(tenant), None))
            .await
            .unwrap();
        assert!(json_body(resp).await.as_array().unwrap().is_empty());

        let missing = app
            .oneshot(request(
                "POST",
                &format!("/api/alerts/{}/read", Uuid::new_v4()),
                Some(tenant),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unmonitor_and_remonitor() {
        let (state, tenant) = state().await;
        let company = state
            .monitor
            .watchlist()
            .add_company(tenant, "00445790")
            .await
            .unwrap();
        let app = app(state);
        let uri = format!("/api/companies/{}/monitor", company.id);

        let off = app
            .clone()
            .oneshot(request("DELETE", &uri, Some(tenant), None))
            .await
            .unwrap();
        assert_eq!(json_body(off).await["is_monitored"], false);

        let listed = app
            .clone()
            .oneshot(request("GET", "/api/companies?monitored=true", Some(tenant), None))
            .await
            .unwrap();
        assert!(json_body(listed).await.as_array().unwrap().is_empty());

        let on = app
            .oneshot(request("POST", &uri, Some(tenant), None))
            .await
            .unwrap();
        assert_eq!(json_body(on).await["is_monitored"], true);
    }
}
