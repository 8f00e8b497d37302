// 🌐 HTTP API - REST surface over the registry (feature "server")
//
// The caller identity arrives already authenticated in the `x-caller` header.
// Registry failures keep their numeric code as the HTTP status.
// Writes run on the blocking pool, one at a time per database connection.

use crate::access::Principal;
use crate::db;
use crate::entities::{NewContainer, NewContainerType, NewContents, NewOwner, EntityKind};
use crate::error::{RegistryError, RegistryResult};
use crate::registry::RegistryService;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

pub const CALLER_HEADER: &str = "x-caller";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: RegistryService,
    /// When set, every successful write is stored before responding
    pub db: Option<Arc<Mutex<Connection>>>,
    /// Raised once memory and database may disagree; writes are refused until restart
    halted: Arc<AtomicBool>,
}

impl AppState {
    pub fn in_memory(registry: RegistryService) -> Self {
        AppState {
            registry,
            db: None,
            halted: Arc::default(),
        }
    }

    pub fn with_database(registry: RegistryService, conn: Connection) -> Self {
        AppState {
            registry,
            db: Some(Arc::new(Mutex::new(conn))),
            halted: Arc::default(),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}

// ============================================================================
// RESPONSE ENVELOPE
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Serialize)]
pub struct ApiError {
    pub code: u16,
    pub kind: &'static str,
    pub message: String,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn failed(error: ApiError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

fn respond<T: Serialize>(result: RegistryResult<T>) -> Response {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))).into_response(),
        Err(err) => {
            let status = StatusCode::from_u16(err.code()).unwrap_or(StatusCode::BAD_REQUEST);
            let body = ApiResponse::<()>::failed(ApiError {
                code: err.code(),
                kind: err.kind().as_str(),
                message: err.to_string(),
            });
            (status, Json(body)).into_response()
        }
    }
}

fn failure(status: StatusCode, kind: &'static str, message: &str) -> Response {
    let body = ApiResponse::<()>::failed(ApiError {
        code: status.as_u16(),
        kind,
        message: message.to_string(),
    });
    (status, Json(body)).into_response()
}

/// Apply one registry write off the async workers, then respond
async fn commit<T, F>(state: AppState, write: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&RegistryService) -> RegistryResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || commit_blocking(&state, write)).await {
        Ok(response) => response,
        Err(e) => {
            error!("Write task failed: {}", e);
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "write did not complete",
            )
        }
    }
}

/// With a database attached the write and its save happen under the
/// connection lock; a failed save leaves the registry as stored.
fn commit_blocking<T: Serialize>(
    state: &AppState,
    write: impl FnOnce(&RegistryService) -> RegistryResult<T>,
) -> Response {
    let Some(db) = &state.db else {
        return respond(write(&state.registry));
    };

    let conn = db.lock().unwrap_or_else(PoisonError::into_inner);
    if state.is_halted() {
        return failure(
            StatusCode::SERVICE_UNAVAILABLE,
            "unavailable",
            "registry is read-only until restarted",
        );
    }

    let result = write(&state.registry);
    if result.is_ok() {
        if let Err(err) = db::persist(&conn, &state.registry) {
            error!("Error persisting registry: {}", err);
            if matches!(err, db::PersistError::Diverged(_)) {
                state.halted.store(true, Ordering::SeqCst);
            }
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "registry state could not be stored; the write was not applied",
            );
        }
    }
    respond(result)
}

fn found<T>(value: Option<T>, kind: EntityKind, id: u64) -> RegistryResult<T> {
    value.ok_or_else(|| RegistryError::not_found(kind, id))
}

// ============================================================================
// CALLER EXTRACTOR
// ============================================================================

pub struct Caller(pub Principal);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Caller(Principal::new(value)))
            .ok_or_else(|| {
                respond::<()>(Err(RegistryError::Unauthorized(Principal::new("anonymous"))))
            })
    }
}

// ============================================================================
// REQUEST / RESPONSE BODIES
// ============================================================================

#[derive(Serialize, Deserialize)]
pub struct Created {
    pub id: u64,
}

#[derive(Deserialize)]
pub struct AddRegistrar {
    pub address: Principal,
}

#[derive(Serialize)]
pub struct RegistrarStatus {
    pub address: Principal,
    pub registrar: bool,
}

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: String,
}

#[derive(Deserialize)]
pub struct OwnershipTransfer {
    pub owner_id: u64,
}

#[derive(Serialize)]
pub struct Availability {
    pub active: bool,
    pub available: bool,
}

#[derive(Serialize)]
pub struct InspectionStamp {
    pub last_inspection_date: u64,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/stats
async fn stats(State(state): State<AppState>) -> Response {
    respond(Ok(state.registry.query().stats()))
}

/// POST /api/registrars/initialize
async fn initialize(State(state): State<AppState>, Caller(caller): Caller) -> Response {
    commit(state, move |registry| registry.initialize(&caller)).await
}

/// POST /api/registrars
async fn add_registrar(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(body): Json<AddRegistrar>,
) -> Response {
    commit(state, move |registry| registry.add_registrar(&caller, body.address)).await
}

/// GET /api/registrars/:address
async fn registrar_status(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Response {
    let address = Principal::new(address);
    let registrar = state.registry.query().is_registrar(&address);
    respond(Ok(RegistrarStatus { address, registrar }))
}

/// POST /api/container-types
async fn register_container_type(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(body): Json<NewContainerType>,
) -> Response {
    commit(state, move |registry| {
        registry
            .register_container_type(&caller, body)
            .map(|id| Created { id })
    })
    .await
}

/// GET /api/container-types/:id
async fn get_container_type(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let record = state.registry.query().get_container_type(id);
    respond(found(record, EntityKind::ContainerType, id))
}

/// POST /api/container-types/:id/deactivate
async fn deactivate_container_type(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
) -> Response {
    commit(state, move |registry| registry.deactivate_container_type(&caller, id)).await
}

/// POST /api/owners
async fn register_owner(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(body): Json<NewOwner>,
) -> Response {
    commit(state, move |registry| {
        registry.register_owner(&caller, body).map(|id| Created { id })
    })
    .await
}

/// GET /api/owners/:id
async fn get_owner(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let record = state.registry.query().get_owner(id);
    respond(found(record, EntityKind::Owner, id))
}

/// GET /api/owners/:id/containers
async fn owner_containers(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let query = state.registry.query();
    let result = found(query.get_owner(id), EntityKind::Owner, id)
        .map(|_| query.containers_by_owner(id));
    respond(result)
}

/// POST /api/owners/:id/deactivate
async fn deactivate_owner(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
) -> Response {
    commit(state, move |registry| registry.deactivate_owner(&caller, id)).await
}

/// POST /api/containers
async fn register_container(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(body): Json<NewContainer>,
) -> Response {
    commit(state, move |registry| {
        registry
            .register_container(&caller, body)
            .map(|id| Created { id })
    })
    .await
}

/// GET /api/containers/:id
async fn get_container(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let record = state.registry.query().get_container(id);
    respond(found(record, EntityKind::Container, id))
}

/// PUT /api/containers/:id/status
async fn update_status(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
    Json(body): Json<StatusUpdate>,
) -> Response {
    commit(state, move |registry| {
        registry.update_container_status(&caller, id, &body.status)
    })
    .await
}

/// PUT /api/containers/:id/owner
async fn transfer_ownership(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
    Json(body): Json<OwnershipTransfer>,
) -> Response {
    commit(state, move |registry| {
        registry.transfer_ownership(&caller, id, body.owner_id)
    })
    .await
}

/// PUT /api/containers/:id/contents
async fn record_contents(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
    Json(body): Json<NewContents>,
) -> Response {
    commit(state, move |registry| registry.record_contents(&caller, id, body)).await
}

/// GET /api/containers/:id/contents
async fn get_contents(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let record = state.registry.query().get_contents(id);
    respond(found(record, EntityKind::Contents, id))
}

/// POST /api/containers/:id/inspections
async fn record_inspection(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
) -> Response {
    commit(state, move |registry| {
        registry
            .record_inspection(&caller, id)
            .map(|stamp| InspectionStamp {
                last_inspection_date: stamp,
            })
    })
    .await
}

/// GET /api/containers/:id/inspections
async fn inspection_history(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let query = state.registry.query();
    let result = found(query.get_container(id), EntityKind::Container, id)
        .map(|_| query.inspection_history(id));
    respond(result)
}

/// GET /api/containers/:id/availability
async fn availability(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let query = state.registry.query();
    respond(Ok(Availability {
        active: query.is_active(id),
        available: query.is_available(id),
    }))
}

/// POST /api/containers/:id/deactivate
async fn deactivate_container(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<u64>,
) -> Response {
    commit(state, move |registry| registry.deactivate_container(&caller, id)).await
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/registrars", post(add_registrar))
        .route("/registrars/initialize", post(initialize))
        .route("/registrars/:address", get(registrar_status))
        .route("/container-types", post(register_container_type))
        .route("/container-types/:id", get(get_container_type))
        .route("/container-types/:id/deactivate", post(deactivate_container_type))
        .route("/owners", post(register_owner))
        .route("/owners/:id", get(get_owner))
        .route("/owners/:id/containers", get(owner_containers))
        .route("/owners/:id/deactivate", post(deactivate_owner))
        .route("/containers", post(register_container))
        .route("/containers/:id", get(get_container))
        .route("/containers/:id/status", put(update_status))
        .route("/containers/:id/owner", put(transfer_ownership))
        .route("/containers/:id/contents", put(record_contents).get(get_contents))
        .route(
            "/containers/:id/inspections",
            post(record_inspection).get(inspection_history),
        )
        .route("/containers/:id/availability", get(availability))
        .route("/containers/:id/deactivate", post(deactivate_container))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const REGISTRAR: &str = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM";
    const OUTSIDER: &str = "ST2CY5V39NHDPWSXMW9QDT3HC3GD6Q6XX4CFRK9AG";

    fn app() -> (Router, RegistryService) {
        let registry = RegistryService::with_clock(Arc::new(ManualClock::new(100100)));
        (router(AppState::in_memory(registry.clone())), registry)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        caller: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(caller) = caller {
            request = request.header(CALLER_HEADER, caller);
        }
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn seed(app: &Router) {
        call(app, "POST", "/api/registrars/initialize", Some(REGISTRAR), None).await;
        call(
            app,
            "POST",
            "/api/container-types",
            Some(REGISTRAR),
            Some(json!({
                "name": "Standard Dry Container",
                "size": "40ft",
                "type": "Dry",
                "description": "Standard 40ft dry shipping container for general cargo"
            })),
        )
        .await;
        call(
            app,
            "POST",
            "/api/owners",
            Some(REGISTRAR),
            Some(json!({
                "name": "Global Shipping Co.",
                "registration_number": "GSC-12345",
                "contact_info": "contact@globalshipping.com, +1-555-123-4567"
            })),
        )
        .await;
        call(
            app,
            "POST",
            "/api/containers",
            Some(REGISTRAR),
            Some(json!({
                "container_number": "MSCU1234567",
                "container_type_id": 1,
                "owner_id": 1,
                "manufactured_date": 100000,
                "capacity_weight": 30480,
                "capacity_volume": 67
            })),
        )
        .await;
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = call(&app, "GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_register_and_read_container() {
        let (app, _) = app();
        seed(&app).await;

        let (status, body) = call(&app, "GET", "/api/containers/1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["container_number"], "MSCU1234567");
        assert_eq!(body["data"]["status"], "available");
        assert_eq!(body["data"]["active"], true);

        let (status, body) = call(&app, "GET", "/api/container-types/1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["type"], "Dry");

        let (status, body) = call(&app, "GET", "/api/owners/1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["address"], REGISTRAR);
    }

    #[tokio::test]
    async fn test_error_codes_map_to_status() {
        let (app, _) = app();
        seed(&app).await;

        // 403: not a registrar
        let (status, body) = call(
            &app,
            "PUT",
            "/api/containers/1/status",
            Some(OUTSIDER),
            Some(json!({"status": "in-transit"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "unauthorized");

        // 403: no caller at all
        let (status, _) = call(&app, "POST", "/api/containers/1/inspections", None, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // 404: unknown owner
        let (status, body) = call(
            &app,
            "PUT",
            "/api/containers/1/owner",
            Some(REGISTRAR),
            Some(json!({"owner_id": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], 404);

        // 400: bad status value
        let (status, body) = call(
            &app,
            "PUT",
            "/api/containers/1/status",
            Some(REGISTRAR),
            Some(json!({"status": "sunk"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["kind"], "invalid_argument");

        // 404 on reads of unknown IDs
        let (status, _) = call(&app, "GET", "/api/containers/9", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_contents_and_inspection() {
        let (app, registry) = app();
        seed(&app).await;

        let manifest = json!({
            "description": "Electronics and computer parts",
            "hazardous": false,
            "weight": 15000,
            "value": 500000,
            "origin_country": "China",
            "destination_country": "United States",
            "shipping_date": 100200
        });
        let (status, _) = call(
            &app,
            "PUT",
            "/api/containers/1/contents",
            Some(REGISTRAR),
            Some(manifest),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&app, "GET", "/api/containers/1/contents", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["weight"], 15000);

        let (status, body) =
            call(&app, "POST", "/api/containers/1/inspections", Some(REGISTRAR), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["last_inspection_date"], 100101);
        assert_eq!(registry.query().inspection_history(1).len(), 1);

        let (_, body) = call(&app, "GET", "/api/containers/1/availability", None, None).await;
        assert_eq!(body["data"]["available"], true);
    }

    #[tokio::test]
    async fn test_registrar_endpoints() {
        let (app, _) = app();
        seed(&app).await;

        let (status, _) = call(
            &app,
            "POST",
            "/api/registrars",
            Some(OUTSIDER),
            Some(json!({"address": OUTSIDER})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(
            &app,
            "POST",
            "/api/registrars",
            Some(REGISTRAR),
            Some(json!({"address": OUTSIDER})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], true);

        let uri = format!("/api/registrars/{OUTSIDER}");
        let (_, body) = call(&app, "GET", &uri, None, None).await;
        assert_eq!(body["data"]["registrar"], true);
    }

    #[tokio::test]
    async fn test_writes_are_persisted() {
        let registry = RegistryService::with_clock(Arc::new(ManualClock::new(100100)));
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let state = AppState::with_database(registry, conn);
        let app = router(state.clone());

        seed(&app).await;

        let db = state.db.as_ref().unwrap();
        let conn = db.lock().unwrap();
        let snapshot = db::load_snapshot(&conn).unwrap();
        assert_eq!(snapshot.containers.len(), 1);
        assert_eq!(db::count_events(&conn).unwrap(), 4);
    }

    fn app_with_database() -> (Router, AppState) {
        let registry = RegistryService::with_clock(Arc::new(ManualClock::new(100100)));
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        let state = AppState::with_database(registry, conn);
        (router(state.clone()), state)
    }

    #[tokio::test]
    async fn test_failed_save_is_not_applied() {
        let (app, state) = app_with_database();
        seed(&app).await;

        state
            .db
            .as_ref()
            .unwrap()
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_status BEFORE INSERT ON containers
                 WHEN NEW.status = 'in-transit'
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let (status, body) = call(
            &app,
            "PUT",
            "/api/containers/1/status",
            Some(REGISTRAR),
            Some(json!({"status": "in-transit"})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["kind"], "internal");

        // Reads show what is stored, not the rejected write
        let (_, body) = call(&app, "GET", "/api/containers/1", None, None).await;
        assert_eq!(body["data"]["status"], "available");
        assert!(!state.is_halted());

        // Writes storage accepts still go through
        let (status, _) = call(
            &app,
            "PUT",
            "/api/containers/1/status",
            Some(REGISTRAR),
            Some(json!({"status": "in-use"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let conn = state.db.as_ref().unwrap().lock().unwrap();
        let stored = db::load_snapshot(&conn).unwrap();
        assert_eq!(stored.containers[0].status.as_str(), "in-use");
        assert_eq!(stored, state.registry.snapshot());
    }

    #[tokio::test]
    async fn test_halted_registry_refuses_writes() {
        let (app, state) = app_with_database();
        seed(&app).await;
        state.halted.store(true, Ordering::SeqCst);

        let (status, body) =
            call(&app, "POST", "/api/containers/1/inspections", Some(REGISTRAR), None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["kind"], "unavailable");

        let (status, body) = call(&app, "GET", "/api/containers/1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["last_inspection_date"], 100100);
    }
}
