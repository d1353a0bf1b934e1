// 🌐 REST API - axum router over the engine and the store
//
// Handlers lock the shared SQLite connection, call into db/service and wrap
// the result in ApiResponse. Storage misses become 404s.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
    Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::error;

use crate::category::{category_of, UnitCategory};
use crate::consolidation::ConsolidatedLine;
use crate::db::{self, ItemFilter, NewDish, ShoppingItemUpdate};
use crate::error::ShoppingError;
use crate::service::{ShoppingItem, ShoppingListReport, ShoppingListRequest, ShoppingListService};
use crate::units;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub service: ShoppingListService,
}

impl AppState {
    pub fn new(conn: Connection, service: ShoppingListService) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            service,
        }
    }
}

/// API Response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn err(message: String) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(ShoppingError),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err)
    }
}

impl From<ShoppingError> for ApiError {
    fn from(err: ShoppingError) -> Self {
        match err {
            ShoppingError::Config(_) | ShoppingError::MalformedRow { .. } => ApiError::BadRequest(err.to_string()),
            ShoppingError::NotFound { .. } => ApiError::NotFound(err),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(err) => {
                error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        (status, Json(ApiResponse::err(message))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn with_db<T>(state: &AppState, f: impl FnOnce(&Connection) -> anyhow::Result<T>) -> Result<T, ApiError> {
    let conn = state
        .db
        .lock()
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("database lock poisoned")))?;
    Ok(f(&conn)?)
}

fn found<T>(value: Option<T>, entity: &'static str, id: i64) -> Result<T, ApiError> {
    value.ok_or(ApiError::NotFound(ShoppingError::NotFound { entity, id }))
}

// ============================================================================
// Engine handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnitInfo {
    pub name: String,
    pub category: UnitCategory,
}

/// GET /api/units - Canonical units with their category
async fn list_units() -> Json<ApiResponse<Vec<UnitInfo>>> {
    let units = units::canonical_units()
        .into_iter()
        .map(|name| UnitInfo {
            name: name.to_string(),
            category: category_of(name),
        })
        .collect();
    Json(ApiResponse::ok(units))
}

/// POST /api/shopping/generate - Full report (lines, warnings, conversion log).
/// Unusable request defaults are a 400.
async fn generate_shopping_list(
    State(state): State<AppState>,
    Json(request): Json<ShoppingListRequest>,
) -> ApiResult<ShoppingListReport> {
    let report = request.run(&state.service)?;
    Ok(Json(ApiResponse::ok(report)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversionParams {
    pub enable_unit_conversion: Option<bool>,
}

impl ConversionParams {
    fn service(&self, base: &ShoppingListService) -> ShoppingListService {
        match self.enable_unit_conversion {
            Some(enabled) => base.clone().with_unit_conversion(enabled),
            None => base.clone(),
        }
    }
}

/// POST /api/shopping/consolidate - Lines only
async fn consolidate_items(
    State(state): State<AppState>,
    Query(params): Query<ConversionParams>,
    Json(items): Json<Vec<ShoppingItem>>,
) -> Json<ApiResponse<Vec<ConsolidatedLine>>> {
    let report = params.service(&state.service).generate(&items);
    Json(ApiResponse::ok(report.items))
}

/// GET /api/shopping/list - Consolidate everything stored
async fn stored_shopping_list(
    State(state): State<AppState>,
    Query(params): Query<ConversionParams>,
) -> ApiResult<ShoppingListReport> {
    let items = with_db(&state, |conn| db::list_shopping_items(conn, ItemFilter::default()))?;
    let report = params
        .service(&state.service)
        .generate_from_rows(&db::shopping_items_as_rows(&items));
    Ok(Json(ApiResponse::ok(report)))
}

// ============================================================================
// Shopping item handlers
// ============================================================================

async fn list_items(
    State(state): State<AppState>,
    Query(filter): Query<ItemFilter>,
) -> ApiResult<Vec<db::ShoppingListItem>> {
    let items = with_db(&state, |conn| db::list_shopping_items(conn, filter))?;
    Ok(Json(ApiResponse::ok(items)))
}

async fn create_item(
    State(state): State<AppState>,
    Json(item): Json<ShoppingItem>,
) -> Result<(StatusCode, Json<ApiResponse<db::ShoppingListItem>>), ApiError> {
    let created = with_db(&state, |conn| db::create_shopping_item(conn, &item))?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

async fn get_item(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<db::ShoppingListItem> {
    let item = with_db(&state, |conn| db::get_shopping_item(conn, id))?;
    Ok(Json(ApiResponse::ok(found(item, "Shopping item", id)?)))
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<ShoppingItemUpdate>,
) -> ApiResult<db::ShoppingListItem> {
    let item = with_db(&state, |conn| db::update_shopping_item(conn, id, &update))?;
    Ok(Json(ApiResponse::ok(found(item, "Shopping item", id)?)))
}

async fn toggle_item(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<db::ShoppingListItem> {
    let item = with_db(&state, |conn| db::toggle_shopping_item(conn, id))?;
    Ok(Json(ApiResponse::ok(found(item, "Shopping item", id)?)))
}

async fn delete_item(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    let removed = with_db(&state, |conn| db::delete_shopping_item(conn, id))?;
    found(removed.then_some(()), "Shopping item", id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Dish + ingredient handlers
// ============================================================================

async fn list_dishes(State(state): State<AppState>) -> ApiResult<Vec<db::Dish>> {
    let dishes = with_db(&state, db::list_dishes)?;
    Ok(Json(ApiResponse::ok(dishes)))
}

async fn create_dish(
    State(state): State<AppState>,
    Json(dish): Json<NewDish>,
) -> Result<(StatusCode, Json<ApiResponse<db::Dish>>), ApiError> {
    if dish.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Dish name must not be empty".to_string()));
    }
    let created = with_db(&state, |conn| db::create_dish(conn, &dish))?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

async fn get_dish(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<db::Dish> {
    let dish = with_db(&state, |conn| db::get_dish(conn, id))?;
    Ok(Json(ApiResponse::ok(found(dish, "Dish", id)?)))
}

async fn delete_dish(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    let removed = with_db(&state, |conn| db::delete_dish(conn, id))?;
    found(removed.then_some(()), "Dish", id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
}

async fn list_ingredients(State(state): State<AppState>) -> ApiResult<Vec<db::Ingredient>> {
    let ingredients = with_db(&state, db::list_ingredients)?;
    Ok(Json(ApiResponse::ok(ingredients)))
}

async fn create_ingredient(
    State(state): State<AppState>,
    Json(ingredient): Json<NewIngredient>,
) -> Result<(StatusCode, Json<ApiResponse<db::Ingredient>>), ApiError> {
    let unit = units::normalize(ingredient.unit.as_deref());
    let exists = with_db(&state, |conn| db::find_ingredient_by_name(conn, &ingredient.name))?;
    if exists.is_some() {
        return Err(ApiError::BadRequest(format!(
            "Ingredient '{}' already exists",
            ingredient.name.trim().to_lowercase()
        )));
    }
    let created = with_db(&state, |conn| db::create_ingredient(conn, &ingredient.name, &unit))?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/units", get(list_units))
        .route("/shopping/generate", post(generate_shopping_list))
        .route("/shopping/consolidate", post(consolidate_items))
        .route("/shopping/list", get(stored_shopping_list))
        .route("/shopping/items", get(list_items).post(create_item))
        .route(
            "/shopping/items/:id",
            get(get_item).put(update_item).delete(delete_item),
        )
        .route("/shopping/items/:id/toggle", patch(toggle_item))
        .route("/dishes", get(list_dishes).post(create_dish))
        .route("/dishes/:id", get(get_dish).delete(delete_dish))
        .route("/ingredients", get(list_ingredients).post(create_ingredient))
        .with_state(state);

    Router::new().nest("/api", api_routes)
}
