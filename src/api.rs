//! HTTP surface consumed by the external chat presentation layer.
//!
//! Handlers are thin: decode the request, call the engine, map the
//! result to JSON. The engine is dependency-injected through axum state,
//! never reached through a global.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::engine::{Engine, NewMarket, TradeAction};
use crate::error::EngineError;
use crate::lmsr::Side;
use crate::market::Resolution;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/users", post(create_user))
        .route("/users/:user_id", get(get_user))
        .route("/markets", post(create_market))
        .route("/markets/:market_id", get(get_market))
        .route("/markets/:market_id/positions", get(get_positions))
        .route("/markets/:market_id/balance-changes", get(balance_changes))
        .route("/markets/:market_id/quote", get(trade_quote))
        .route("/markets/:market_id/trades", post(create_trade))
        .route("/markets/:market_id/resolve", post(resolve_market))
        .route("/markets/:market_id/unresolve", post(unresolve_market))
        .route("/reminders/poll", post(poll_reminders))
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

/// Map an engine rejection to a status code plus a body with enough
/// context to re-render the offending input field.
fn reject(err: EngineError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EngineError::InvalidMarket(_) | EngineError::UnknownUser(_) => StatusCode::NOT_FOUND,
        EngineError::MarketResolved(_) => StatusCode::CONFLICT,
        EngineError::InsufficientFunds { .. } | EngineError::InsufficientShares { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EngineError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    let body = match &err {
        EngineError::InsufficientFunds { balance, required } => json!({
            "error": err.to_string(),
            "balance": balance,
            "required": required,
        }),
        EngineError::InsufficientShares { held, requested } => json!({
            "error": err.to_string(),
            "position": held,
            "requested": requested,
        }),
        // transient faults stay generic towards the end user
        EngineError::StorageUnavailable(_) => json!({
            "error": "temporarily unavailable, please try again",
        }),
        _ => json!({ "error": err.to_string() }),
    };
    (status, Json(body))
}

fn parse_timestamp(ts: i64, field: &str) -> Result<DateTime<Utc>, (StatusCode, Json<Value>)> {
    Utc.timestamp_opt(ts, 0).single().ok_or_else(|| {
        reject(EngineError::InvalidInput(format!(
            "{field} is not a valid unix timestamp"
        )))
    })
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "pmarket-engine"
    }))
}

#[derive(Deserialize)]
struct CreateUserRequest {
    user_id: String,
}

async fn create_user(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<CreateUserRequest>,
) -> ApiResult {
    let account = engine.create_user(&req.user_id).map_err(reject)?;
    Ok(Json(json!({ "id": account.id, "balance": account.balance })))
}

async fn get_user(
    State(engine): State<Arc<Engine>>,
    Path(user_id): Path<String>,
) -> ApiResult {
    let account = engine.get_user(&user_id).map_err(reject)?;
    Ok(Json(json!({ "id": account.id, "balance": account.balance })))
}

#[derive(Deserialize)]
struct CreateMarketRequest {
    title: String,
    #[serde(default)]
    description: String,
    owner_id: String,
    liquidity: f64,
    remind_at: Option<i64>,
}

async fn create_market(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<CreateMarketRequest>,
) -> ApiResult {
    let remind_at = match req.remind_at {
        Some(ts) => Some(parse_timestamp(ts, "remind_at")?),
        None => None,
    };
    let snapshot = engine
        .create_market(
            NewMarket {
                title: req.title,
                description: req.description,
                owner_id: req.owner_id,
                liquidity: req.liquidity,
                remind_at,
            },
            Utc::now(),
        )
        .map_err(reject)?;
    Ok(Json(json!({ "market": snapshot })))
}

async fn get_market(
    State(engine): State<Arc<Engine>>,
    Path(market_id): Path<i64>,
) -> ApiResult {
    let snapshot = engine.get_market(market_id).map_err(reject)?;
    Ok(Json(json!({ "market": snapshot })))
}

async fn get_positions(
    State(engine): State<Arc<Engine>>,
    Path(market_id): Path<i64>,
) -> ApiResult {
    let positions = engine.get_positions(market_id).map_err(reject)?;
    Ok(Json(json!({ "positions": positions })))
}

async fn balance_changes(
    State(engine): State<Arc<Engine>>,
    Path(market_id): Path<i64>,
) -> ApiResult {
    let changes = engine.balance_changes(market_id).map_err(reject)?;
    Ok(Json(json!({ "balance_changes": changes })))
}

#[derive(Deserialize)]
struct QuoteParams {
    shares: f64,
    side: Side,
    action: TradeAction,
}

async fn trade_quote(
    State(engine): State<Arc<Engine>>,
    Path(market_id): Path<i64>,
    Query(params): Query<QuoteParams>,
) -> ApiResult {
    let cash_amount = engine
        .trade_quote(market_id, params.shares, params.side, params.action)
        .map_err(reject)?;
    Ok(Json(json!({
        "shares": params.shares,
        "side": params.side,
        "cash_amount": cash_amount,
    })))
}

#[derive(Deserialize)]
struct CreateTradeRequest {
    user_id: String,
    /// Positive buys, negative sells.
    shares_amount: f64,
    side: Side,
}

async fn create_trade(
    State(engine): State<Arc<Engine>>,
    Path(market_id): Path<i64>,
    Json(req): Json<CreateTradeRequest>,
) -> ApiResult {
    let snapshot = engine
        .create_trade(market_id, &req.user_id, req.shares_amount, req.side)
        .map_err(reject)?;
    Ok(Json(json!({ "market": snapshot })))
}

#[derive(Deserialize)]
struct ResolveRequest {
    outcome: Resolution,
}

async fn resolve_market(
    State(engine): State<Arc<Engine>>,
    Path(market_id): Path<i64>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult {
    let snapshot = engine.resolve_market(market_id, req.outcome).map_err(reject)?;
    Ok(Json(json!({ "market": snapshot })))
}

async fn unresolve_market(
    State(engine): State<Arc<Engine>>,
    Path(market_id): Path<i64>,
) -> ApiResult {
    let snapshot = engine.unresolve_market(market_id).map_err(reject)?;
    Ok(Json(json!({ "market": snapshot })))
}

async fn poll_reminders(State(engine): State<Arc<Engine>>) -> Json<Value> {
    let market_ids = engine.due_reminders(Utc::now());
    Json(json!({ "market_ids": market_ids }))
}
