//! Bybit Adapter Integration Tests
//!
//! Runs the adapter against a wiremock server speaking the v5 envelope:
//! signing headers, result-code mapping, retry policy and timeouts.

// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use order_engine::application::ports::{
    Category, ExchangeError, ExchangePort, NoOpEventPublisher, PlaceOrderRequest,
};
use order_engine::application::services::{ExecutionError, ExecutionSettings, OrderExecutionEngine};
use order_engine::domain::order_execution::{OrderStatus, OrderType, TimeInForce};
use order_engine::domain::shared::{ClientOrderId, ExchangeOrderId, Side, Symbol};
use order_engine::infrastructure::exchange::bybit::{BybitConfig, RetryConfig};
use order_engine::infrastructure::exchange::BybitExchangeAdapter;

// =============================================================================
// Helpers
// =============================================================================

fn adapter(server: &MockServer) -> BybitExchangeAdapter {
    let config = BybitConfig::new("test-key".to_string(), "test-secret".to_string(), server.uri())
        .with_timeout(Duration::from_millis(300))
        .with_retry(RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        });
    BybitExchangeAdapter::new(&config).unwrap()
}

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "retCode": 0,
        "retMsg": "OK",
        "result": result,
        "time": 1_700_000_000_000_i64
    }))
}

fn api_error(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "retCode": code,
        "retMsg": message,
        "result": {}
    }))
}

fn btc() -> Symbol {
    Symbol::new("BTCUSDT")
}

fn market_buy(link_id: &str) -> PlaceOrderRequest {
    PlaceOrderRequest {
        category: Category::Linear,
        symbol: btc(),
        side: Side::Buy,
        order_type: OrderType::Market,
        quantity: dec!(0.010),
        price: None,
        trigger_price: None,
        time_in_force: Some(TimeInForce::ImmediateOrCancel),
        reduce_only: false,
        client_order_id: ClientOrderId::new(link_id),
    }
}

fn filled_order(order_id: &str, link_id: &str) -> Value {
    json!({
        "list": [{
            "orderId": order_id,
            "orderLinkId": link_id,
            "symbol": "BTCUSDT",
            "side": "Buy",
            "orderStatus": "Filled",
            "qty": "0.01",
            "cumExecQty": "0.01",
            "avgPrice": "50010",
            "rejectReason": "EC_NoError"
        }]
    })
}

fn ticker() -> Value {
    json!({
        "category": "linear",
        "list": [{
            "symbol": "BTCUSDT",
            "bid1Price": "49999.5",
            "ask1Price": "50000",
            "lastPrice": "50000",
            "markPrice": "50000.2"
        }]
    })
}

// =============================================================================
// Orders
// =============================================================================

#[tokio::test]
async fn place_order_sends_signed_body_with_link_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v5/order/create"))
        .and(header("X-BAPI-API-KEY", "test-key"))
        .and(header_exists("X-BAPI-SIGN"))
        .and(header_exists("X-BAPI-TIMESTAMP"))
        .and(header("X-BAPI-RECV-WINDOW", "5000"))
        .and(body_partial_json(json!({
            "category": "linear",
            "symbol": "BTCUSDT",
            "side": "Buy",
            "orderType": "Market",
            "qty": "0.01",
            "reduceOnly": false,
            "orderLinkId": "link-1"
        })))
        .respond_with(ok(json!({"orderId": "ord-1", "orderLinkId": "link-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let ack = adapter(&server)
        .place_order(market_buy("link-1"))
        .await
        .unwrap();

    assert_eq!(ack.order_id, ExchangeOrderId::new("ord-1"));
    assert_eq!(ack.client_order_id, ClientOrderId::new("link-1"));
}

#[tokio::test]
async fn non_zero_ret_code_is_rejected_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v5/order/create"))
        .respond_with(api_error(110_007, "ab not enough for new order"))
        .expect(1)
        .mount(&server)
        .await;

    let err = adapter(&server)
        .place_order(market_buy("link-2"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ExchangeError::Rejected {
            code: 110_007,
            message: "ab not enough for new order".to_string(),
        }
    );
}

#[tokio::test]
async fn slow_order_placement_times_out_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v5/order/create"))
        .respond_with(
            ok(json!({"orderId": "ord-3"})).set_delay(Duration::from_secs(2)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = adapter(&server)
        .place_order(market_buy("link-3"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Timeout { .. }));
}

#[tokio::test]
async fn order_lookup_by_link_id_maps_fill() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/order/realtime"))
        .and(query_param("category", "linear"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("orderLinkId", "link-4"))
        .respond_with(ok(filled_order("ord-4", "link-4")))
        .expect(1)
        .mount(&server)
        .await;

    let state = adapter(&server)
        .get_order_by_client_id(Category::Linear, &btc(), &ClientOrderId::new("link-4"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(state.order_id, ExchangeOrderId::new("ord-4"));
    assert_eq!(state.status, OrderStatus::Filled);
    assert_eq!(state.filled_quantity, dec!(0.01));
    assert_eq!(state.avg_fill_price, Some(dec!(50010)));
    assert!(state.reason.is_none());
}

#[tokio::test]
async fn cancel_all_without_symbol_uses_settle_coin() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v5/order/cancel-all"))
        .and(body_partial_json(json!({"category": "linear", "settleCoin": "USDT"})))
        .respond_with(ok(json!({
            "list": [{"orderId": "a", "orderLinkId": ""}, {"orderId": "b", "orderLinkId": ""}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cancelled = adapter(&server)
        .cancel_all_orders(Category::Linear, None)
        .await
        .unwrap();

    assert_eq!(
        cancelled,
        vec![ExchangeOrderId::new("a"), ExchangeOrderId::new("b")]
    );
}

// =============================================================================
// Positions and market data
// =============================================================================

#[tokio::test]
async fn positions_skip_flat_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/position/list"))
        .and(query_param("category", "linear"))
        .and(query_param("settleCoin", "USDT"))
        .respond_with(ok(json!({
            "category": "linear",
            "list": [
                {
                    "symbol": "BTCUSDT", "side": "Buy", "size": "0.5",
                    "avgPrice": "50000", "markPrice": "51000", "unrealisedPnl": "500"
                },
                {
                    "symbol": "ETHUSDT", "side": "None", "size": "0",
                    "avgPrice": "0", "markPrice": "3000", "unrealisedPnl": "0"
                }
            ]
        })))
        .mount(&server)
        .await;

    let positions = adapter(&server)
        .get_positions(Category::Linear, Some("USDT"))
        .await
        .unwrap();

    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].symbol, btc());
    assert_eq!(positions[0].side, Side::Buy);
    assert_eq!(positions[0].size, dec!(0.5));
    assert_eq!(positions[0].mark_price, dec!(51000));
}

#[tokio::test]
async fn reads_retry_transient_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/market/tickers"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v5/market/tickers"))
        .respond_with(ok(ticker()))
        .expect(1)
        .mount(&server)
        .await;

    let ticker = adapter(&server)
        .get_ticker(Category::Linear, &btc())
        .await
        .unwrap();

    assert_eq!(ticker.bid, dec!(49999.5));
    assert_eq!(ticker.ask, dec!(50000));
    assert_eq!(ticker.mark, dec!(50000.2));
}

#[tokio::test]
async fn reads_give_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/position/list"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = adapter(&server)
        .get_positions(Category::Linear, Some("USDT"))
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Connection { .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn rate_limit_code_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v5/order/cancel"))
        .respond_with(api_error(10_006, "Too many visits!"))
        .expect(1)
        .mount(&server)
        .await;

    let err = adapter(&server)
        .cancel_order(Category::Linear, &btc(), &ExchangeOrderId::new("ord-9"))
        .await
        .unwrap_err();

    assert_eq!(err, ExchangeError::RateLimited);
}

#[tokio::test]
async fn unauthorized_maps_to_authentication() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/position/list"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = adapter(&server)
        .get_positions(Category::Linear, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Authentication { .. }));
}

// =============================================================================
// Execution engine over the adapter
// =============================================================================

fn engine(server: &MockServer) -> OrderExecutionEngine {
    OrderExecutionEngine::new(
        Arc::new(adapter(server)),
        Arc::new(NoOpEventPublisher),
        ExecutionSettings {
            min_order_interval: Duration::ZERO,
            ..ExecutionSettings::default()
        },
    )
}

#[tokio::test]
async fn market_order_fills_through_adapter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/market/tickers"))
        .respond_with(ok(ticker()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v5/order/create"))
        .respond_with(ok(json!({"orderId": "ord-10"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v5/order/realtime"))
        .and(query_param("orderId", "ord-10"))
        .respond_with(ok(filled_order("ord-10", "")))
        .mount(&server)
        .await;

    let order = engine(&server)
        .place_market_order(btc(), Side::Buy, dec!(0.01), false)
        .await
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Filled);
    assert_eq!(order.avg_fill_price(), Some(dec!(50010)));
    assert_eq!(order.exchange_order_id(), Some(&ExchangeOrderId::new("ord-10")));
}

#[tokio::test]
async fn timed_out_placement_is_resolved_by_link_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/market/tickers"))
        .respond_with(ok(ticker()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v5/order/create"))
        .respond_with(ok(json!({"orderId": "ord-11"})).set_delay(Duration::from_secs(2)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v5/order/realtime"))
        .respond_with(ok(filled_order("ord-11", "resolved")))
        .mount(&server)
        .await;

    let order = engine(&server)
        .place_market_order(btc(), Side::Buy, dec!(0.01), false)
        .await
        .unwrap();

    assert_eq!(order.exchange_order_id(), Some(&ExchangeOrderId::new("ord-11")));
    assert_eq!(order.status(), OrderStatus::Filled);
}

#[tokio::test]
async fn missing_ticker_aborts_before_submission() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v5/market/tickers"))
        .respond_with(ok(json!({"category": "linear", "list": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v5/order/create"))
        .respond_with(ok(json!({"orderId": "never"})))
        .expect(0)
        .mount(&server)
        .await;

    let err = engine(&server)
        .place_market_order(btc(), Side::Buy, dec!(0.01), false)
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutionError::PriceUnavailable { .. }));
}
