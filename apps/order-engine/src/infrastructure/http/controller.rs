//! HTTP Controller (Driver Adapter)
//!
//! Axum-based REST API that delegates to application services.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};

use crate::application::ports::StateStoreError;
use crate::application::{
    BotLifecycleService, ExecutionError, OrderExecutionEngine, PositionError, PositionService,
    RecoveryManager,
};
use crate::domain::order_execution::ExecutionStats;
use crate::domain::shared::{ExchangeOrderId, Symbol};

use super::request::{
    BotStartedRequest, CancelAllQuery, EnterPositionRequest, ExitPositionRequest,
};
use super::response::{
    BotStateResponse, CancelAllResponse, CancelOrderResponse, EnterPositionResponse,
    ErrorResponse, ExitLegResponse, ExitPositionResponse, HealthResponse, OrderResponse,
    OrdersResponse, RecoveryStatusResponse,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Order execution engine.
    pub engine: Arc<OrderExecutionEngine>,
    /// Position entry and exit.
    pub positions: Arc<PositionService>,
    /// Bot lifecycle transitions.
    pub lifecycle: Arc<BotLifecycleService>,
    /// Recovery manager, for status.
    pub recovery: Arc<RecoveryManager>,
    /// Application version.
    pub version: String,
}

/// Create the HTTP router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/stats", get(execution_stats))
        .route("/api/v1/orders", get(open_orders).delete(cancel_all_orders))
        .route("/api/v1/orders/{symbol}/{order_id}", delete(cancel_order))
        .route("/api/v1/positions/enter", post(enter_position))
        .route("/api/v1/positions/exit", post(exit_position))
        .route("/api/v1/bot/started", post(bot_started))
        .route("/api/v1/bot/stop", post(bot_stop))
        .route("/api/v1/recovery", get(recovery_status))
        .with_state(state)
}

// ============================================================================
// Errors
// ============================================================================

/// Error mapped to an HTTP status.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, error = %self.message, "Request failed");
        }
        (
            self.status,
            Json(ErrorResponse {
                code: self.code.to_string(),
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        let (status, code) = match &err {
            ExecutionError::OrderRejected { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "ORDER_REJECTED")
            }
            ExecutionError::PriceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "PRICE_UNAVAILABLE")
            }
            ExecutionError::AdapterTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "ADAPTER_TIMEOUT")
            }
            ExecutionError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            ExecutionError::OrderNotFound { .. } => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
            ExecutionError::InvalidOrder { .. } => (StatusCode::BAD_REQUEST, "INVALID_ORDER"),
            ExecutionError::Exchange(_) => (StatusCode::BAD_GATEWAY, "EXCHANGE_ERROR"),
        };
        Self::new(status, code, err.to_string())
    }
}

impl From<PositionError> for ApiError {
    fn from(err: PositionError) -> Self {
        match err {
            PositionError::Execution(e) => e.into(),
            PositionError::Invalid(e) => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", e.to_string())
            }
            PositionError::NoOpenPosition { .. } => {
                Self::new(StatusCode::NOT_FOUND, "NO_OPEN_POSITION", err.to_string())
            }
            PositionError::NotFilled { .. } => {
                Self::new(StatusCode::CONFLICT, "NOT_FILLED", err.to_string())
            }
            PositionError::Exchange(e) => {
                Self::new(StatusCode::BAD_GATEWAY, "EXCHANGE_ERROR", e.to_string())
            }
            PositionError::Stop(e) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "STOP_ERROR", e.to_string())
            }
            PositionError::Store(e) => e.into(),
        }
    }
}

impl From<StateStoreError> for ApiError {
    fn from(err: StateStoreError) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "STATE_STORE_ERROR",
            err.to_string(),
        )
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        recovery_state: state.recovery.state(),
    })
}

/// Execution statistics.
async fn execution_stats(State(state): State<AppState>) -> Json<ExecutionStats> {
    Json(state.engine.get_execution_stats())
}

/// Orders not yet terminal.
async fn open_orders(State(state): State<AppState>) -> Json<OrdersResponse> {
    let orders = state
        .engine
        .get_open_orders()
        .iter()
        .map(OrderResponse::from)
        .collect();
    Json(OrdersResponse { orders })
}

/// Cancel one order.
async fn cancel_order(
    State(state): State<AppState>,
    Path((symbol, order_id)): Path<(String, String)>,
) -> Result<Json<CancelOrderResponse>, ApiError> {
    let id = ExchangeOrderId::new(order_id.as_str());
    let cancelled = state
        .engine
        .cancel_order(&id, &Symbol::new(symbol))
        .await?;
    Ok(Json(CancelOrderResponse {
        order_id,
        cancelled,
    }))
}

/// Cancel all open orders, optionally for one symbol.
async fn cancel_all_orders(
    State(state): State<AppState>,
    Query(query): Query<CancelAllQuery>,
) -> Result<Json<CancelAllResponse>, ApiError> {
    let symbol = query.symbol.map(Symbol::new);
    let cancelled = state.engine.cancel_all_orders(symbol.as_ref()).await?;
    Ok(Json(CancelAllResponse { cancelled }))
}

/// Open a position.
async fn enter_position(
    State(state): State<AppState>,
    Json(request): Json<EnterPositionRequest>,
) -> Result<(StatusCode, Json<EnterPositionResponse>), ApiError> {
    let entry = state
        .positions
        .enter_position(
            Symbol::new(request.symbol),
            request.side,
            request.size,
            request.strategy,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(EnterPositionResponse::from(&entry))))
}

/// Reduce or close a position.
async fn exit_position(
    State(state): State<AppState>,
    Json(request): Json<ExitPositionRequest>,
) -> Result<Json<ExitPositionResponse>, ApiError> {
    let exits = state
        .positions
        .exit_position(&Symbol::new(request.symbol), request.size)
        .await?;
    Ok(Json(ExitPositionResponse {
        exits: exits.iter().map(ExitLegResponse::from).collect(),
    }))
}

/// Record a bot start.
async fn bot_started(
    State(state): State<AppState>,
    Json(request): Json<BotStartedRequest>,
) -> Result<Json<BotStateResponse>, ApiError> {
    let snapshot = state
        .lifecycle
        .record_started(request.config, request.manual)
        .await?;
    Ok(Json(BotStateResponse::from(&snapshot)))
}

/// Record a manual bot stop.
async fn bot_stop(State(state): State<AppState>) -> Result<Json<BotStateResponse>, ApiError> {
    let snapshot = state.lifecycle.stop_bot().await?;
    Ok(Json(BotStateResponse::from(&snapshot)))
}

/// Recovery manager status.
async fn recovery_status(State(state): State<AppState>) -> Json<RecoveryStatusResponse> {
    Json(RecoveryStatusResponse {
        state: state.recovery.state(),
        last_summary: state.recovery.last_summary(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::NoOpEventPublisher;
    use crate::application::{
        ExecutionSettings, PairLocks, RecoverySettings, TrailingStopController,
    };
    use crate::infrastructure::control::UnconfiguredBotControl;
    use crate::infrastructure::exchange::SimulatedExchange;
    use crate::infrastructure::persistence::InMemoryStateStore;
    use axum::body::Body;
    use axum::http::Request;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use tokio_util::task::TaskTracker;
    use tower::ServiceExt;

    fn create_test_state(exchange: &Arc<SimulatedExchange>) -> AppState {
        let store = Arc::new(InMemoryStateStore::new());
        let events = Arc::new(NoOpEventPublisher);
        let locks = Arc::new(PairLocks::new());
        let engine = Arc::new(OrderExecutionEngine::new(
            Arc::clone(exchange) as _,
            Arc::clone(&events) as _,
            ExecutionSettings {
                min_order_interval: Duration::ZERO,
                ..ExecutionSettings::default()
            },
        ));
        let controller = Arc::new(TrailingStopController::new(
            Arc::clone(&store) as _,
            Arc::clone(&engine),
            Arc::clone(&events) as _,
            Arc::clone(&locks),
        ));
        let positions = Arc::new(PositionService::new(
            Arc::clone(&engine),
            Arc::clone(&controller),
            Arc::clone(exchange) as _,
            Arc::clone(&store) as _,
            Arc::clone(&locks),
            RecoverySettings::default().position_sources,
            dec!(0.02),
        ));
        let recovery = Arc::new(RecoveryManager::new(
            Arc::clone(exchange) as _,
            Arc::clone(&store) as _,
            controller,
            Arc::new(UnconfiguredBotControl),
            events,
            locks,
            RecoverySettings::default(),
            TaskTracker::new(),
        ));
        AppState {
            engine,
            positions,
            lifecycle: Arc::new(BotLifecycleService::new(store)),
            recovery,
            version: "1.0.0-test".to_string(),
        }
    }

    async fn send(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_check_returns_ok() {
        let exchange = Arc::new(SimulatedExchange::new());
        let app = create_router(create_test_state(&exchange));

        let (status, body) = send(app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["recovery_state"], "idle");
    }

    #[tokio::test]
    async fn enter_then_exit_position() {
        let exchange = Arc::new(SimulatedExchange::new());
        exchange.set_price(&Symbol::new("BTCUSDT"), dec!(100));
        let app = create_router(create_test_state(&exchange));

        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/v1/positions/enter",
            Some(serde_json::json!({"symbol": "BTCUSDT", "side": "Buy", "size": "1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["strategy"], "trailing_stop");
        let stop: rust_decimal::Decimal = body["stop_price"].as_str().unwrap().parse().unwrap();
        assert_eq!(stop, dec!(98));

        let (status, body) = send(app.clone(), "GET", "/api/v1/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["filled_orders"], 1);

        let (status, body) = send(
            app,
            "POST",
            "/api/v1/positions/exit",
            Some(serde_json::json!({"symbol": "BTCUSDT"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["exits"][0]["fully_closed"], true);
    }

    #[tokio::test]
    async fn exit_without_position_is_not_found() {
        let exchange = Arc::new(SimulatedExchange::new());
        let app = create_router(create_test_state(&exchange));

        let (status, body) = send(
            app,
            "POST",
            "/api/v1/positions/exit",
            Some(serde_json::json!({"symbol": "ETHUSDT"})),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NO_OPEN_POSITION");
    }

    #[tokio::test]
    async fn entry_without_price_is_unavailable() {
        let exchange = Arc::new(SimulatedExchange::new());
        let app = create_router(create_test_state(&exchange));

        let (status, body) = send(
            app,
            "POST",
            "/api/v1/positions/enter",
            Some(serde_json::json!({"symbol": "BTCUSDT", "side": "Buy", "size": "1"})),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "PRICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn bot_lifecycle_round_trip() {
        let exchange = Arc::new(SimulatedExchange::new());
        let app = create_router(create_test_state(&exchange));

        let (status, body) = send(
            app.clone(),
            "POST",
            "/api/v1/bot/started",
            Some(serde_json::json!({
                "config": {"symbol": "BTCUSDT", "quantity": "0.01", "side": "Buy"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["was_running"], true);

        let (status, body) = send(app, "POST", "/api/v1/bot/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stopped_manually"], true);
        assert_eq!(body["was_running"], false);
    }

    #[tokio::test]
    async fn open_orders_and_cancel_all() {
        let exchange = Arc::new(SimulatedExchange::new());
        let state = create_test_state(&exchange);
        state
            .engine
            .place_limit_order(
                Symbol::new("BTCUSDT"),
                crate::domain::shared::Side::Buy,
                dec!(0.01),
                dec!(49000),
                false,
                crate::domain::order_execution::TimeInForce::GoodTillCancel,
            )
            .await
            .unwrap();
        let app = create_router(state);

        let (_, body) = send(app.clone(), "GET", "/api/v1/orders", None).await;
        assert_eq!(body["orders"].as_array().unwrap().len(), 1);

        let (status, body) =
            send(app.clone(), "DELETE", "/api/v1/orders?symbol=BTCUSDT", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cancelled"], 1);

        let (_, body) = send(app, "GET", "/api/v1/orders", None).await;
        assert!(body["orders"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn recovery_status_reports_state() {
        let exchange = Arc::new(SimulatedExchange::new());
        let state = create_test_state(&exchange);
        state.recovery.perform_initial_recovery().await.unwrap();
        let app = create_router(state);

        let (status, body) = send(app, "GET", "/api/v1/recovery", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "monitoring");
        assert_eq!(body["last_summary"]["open_positions"], 0);
    }
}
