//! Bybit exchange adapter implementing `ExchangePort`.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::application::ports::{
    Category, ExchangeError, ExchangeOrderState, ExchangePort, PlaceOrderAck, PlaceOrderRequest,
    Ticker,
};
use crate::domain::order_execution::{OrderStatus, OrderType};
use crate::domain::recovery::ExchangePosition;
use crate::domain::shared::{ClientOrderId, ExchangeOrderId, Side, Symbol};

use super::api_types::{
    BybitCancelAllRequest, BybitCancelOrderRequest, BybitCreateOrderRequest, BybitList,
    BybitOrderIdResult, BybitOrderItem, BybitPositionItem, BybitTickerItem, parse_decimal,
};
use super::config::BybitConfig;
use super::error::BybitError;
use super::http_client::BybitHttpClient;

const TRIGGER_RISE: u8 = 1;
const TRIGGER_FALL: u8 = 2;

/// Bybit v5 exchange adapter.
#[derive(Debug, Clone)]
pub struct BybitExchangeAdapter {
    client: BybitHttpClient,
    testnet: bool,
}

impl BybitExchangeAdapter {
    /// Create a new adapter.
    pub fn new(config: &BybitConfig) -> Result<Self, BybitError> {
        let client = BybitHttpClient::new(config)?;
        Ok(Self {
            client,
            testnet: config.is_testnet(),
        })
    }

    /// Whether the adapter points at the testnet.
    #[must_use]
    pub const fn is_testnet(&self) -> bool {
        self.testnet
    }

    fn to_create_request(request: &PlaceOrderRequest) -> BybitCreateOrderRequest<'_> {
        let order_type = match request.order_type {
            OrderType::Limit => "Limit",
            OrderType::Market | OrderType::StopMarket | OrderType::TakeProfitMarket => "Market",
        };
        // A sell stop fires on a falling price, a sell take-profit on a rising one.
        let trigger_direction = match (request.order_type, request.side) {
            (OrderType::StopMarket, Side::Sell) | (OrderType::TakeProfitMarket, Side::Buy) => {
                Some(TRIGGER_FALL)
            }
            (OrderType::StopMarket, Side::Buy) | (OrderType::TakeProfitMarket, Side::Sell) => {
                Some(TRIGGER_RISE)
            }
            _ => None,
        };

        BybitCreateOrderRequest {
            category: request.category.as_str(),
            symbol: request.symbol.as_str(),
            side: request.side.as_str(),
            order_type,
            qty: request.quantity.normalize().to_string(),
            price: request.price.map(|p| p.normalize().to_string()),
            trigger_price: request.trigger_price.map(|p| p.normalize().to_string()),
            trigger_direction,
            time_in_force: request.time_in_force.map(|tif| tif.as_str()),
            reduce_only: request.reduce_only,
            order_link_id: request.client_order_id.as_str(),
        }
    }

    fn to_order_state(item: BybitOrderItem) -> Result<ExchangeOrderState, BybitError> {
        let avg_price = parse_decimal("avgPrice", &item.avg_price)?;
        Ok(ExchangeOrderState {
            order_id: ExchangeOrderId::new(item.order_id),
            client_order_id: (!item.order_link_id.is_empty())
                .then(|| ClientOrderId::new(item.order_link_id)),
            symbol: Symbol::new(&item.symbol),
            side: parse_side(&item.side)?,
            status: OrderStatus::from_exchange(&item.order_status),
            quantity: parse_decimal("qty", &item.qty)?,
            filled_quantity: parse_decimal("cumExecQty", &item.cum_exec_qty)?,
            avg_fill_price: (avg_price > Decimal::ZERO).then_some(avg_price),
            reason: (!item.reject_reason.is_empty() && item.reject_reason != "EC_NoError")
                .then_some(item.reject_reason),
        })
    }

    fn to_position(item: BybitPositionItem) -> Result<Option<ExchangePosition>, BybitError> {
        let size = parse_decimal("size", &item.size)?;
        if size.is_zero() || item.side.is_empty() || item.side == "None" {
            return Ok(None);
        }
        Ok(Some(ExchangePosition {
            symbol: Symbol::new(&item.symbol),
            side: parse_side(&item.side)?,
            size,
            avg_price: parse_decimal("avgPrice", &item.avg_price)?,
            mark_price: parse_decimal("markPrice", &item.mark_price)?,
            unrealized_pnl: parse_decimal("unrealisedPnl", &item.unrealised_pnl)?,
        }))
    }

    async fn query_orders(
        &self,
        category: Category,
        symbol: &Symbol,
        filter: Option<(&str, &str)>,
    ) -> Result<Vec<ExchangeOrderState>, BybitError> {
        let mut query = vec![
            ("category", category.as_str().to_string()),
            ("symbol", symbol.as_str().to_string()),
        ];
        if let Some((key, value)) = filter {
            query.push((key, value.to_string()));
        }
        let page: BybitList<BybitOrderItem> =
            self.client.get("/v5/order/realtime", &query).await?;
        page.list.into_iter().map(Self::to_order_state).collect()
    }
}

fn parse_side(value: &str) -> Result<Side, BybitError> {
    value.parse().map_err(|_| BybitError::InvalidField {
        field: "side".to_string(),
        value: value.to_string(),
    })
}

#[async_trait]
impl ExchangePort for BybitExchangeAdapter {
    async fn place_order(
        &self,
        request: PlaceOrderRequest,
    ) -> Result<PlaceOrderAck, ExchangeError> {
        let body = Self::to_create_request(&request);
        tracing::debug!(
            symbol = %request.symbol,
            side = %request.side,
            qty = %request.quantity,
            order_link_id = %request.client_order_id,
            "Submitting order"
        );
        let result: BybitOrderIdResult = self.client.post("/v5/order/create", &body).await?;
        Ok(PlaceOrderAck {
            order_id: ExchangeOrderId::new(result.order_id),
            client_order_id: request.client_order_id,
        })
    }

    async fn cancel_order(
        &self,
        category: Category,
        symbol: &Symbol,
        order_id: &ExchangeOrderId,
    ) -> Result<(), ExchangeError> {
        let body = BybitCancelOrderRequest {
            category: category.as_str(),
            symbol: symbol.as_str(),
            order_id: order_id.as_str(),
        };
        let _: serde_json::Value = self.client.post("/v5/order/cancel", &body).await?;
        Ok(())
    }

    async fn cancel_all_orders(
        &self,
        category: Category,
        symbol: Option<&Symbol>,
    ) -> Result<Vec<ExchangeOrderId>, ExchangeError> {
        let body = BybitCancelAllRequest {
            category: category.as_str(),
            symbol: symbol.map(Symbol::as_str),
            // Linear cancel-all requires a symbol or a settle coin.
            settle_coin: symbol.is_none().then_some("USDT"),
        };
        let result: BybitList<BybitOrderIdResult> =
            self.client.post("/v5/order/cancel-all", &body).await?;
        Ok(result
            .list
            .into_iter()
            .map(|item| ExchangeOrderId::new(item.order_id))
            .collect())
    }

    async fn get_open_orders(
        &self,
        category: Category,
        symbol: &Symbol,
        order_id: Option<&ExchangeOrderId>,
    ) -> Result<Vec<ExchangeOrderState>, ExchangeError> {
        let filter = order_id.map(|id| ("orderId", id.as_str()));
        Ok(self.query_orders(category, symbol, filter).await?)
    }

    async fn get_order_by_client_id(
        &self,
        category: Category,
        symbol: &Symbol,
        client_order_id: &ClientOrderId,
    ) -> Result<Option<ExchangeOrderState>, ExchangeError> {
        let orders = self
            .query_orders(
                category,
                symbol,
                Some(("orderLinkId", client_order_id.as_str())),
            )
            .await?;
        Ok(orders.into_iter().next())
    }

    async fn get_positions(
        &self,
        category: Category,
        settle_coin: Option<&str>,
    ) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let mut query = vec![("category", category.as_str().to_string())];
        if let Some(coin) = settle_coin {
            query.push(("settleCoin", coin.to_string()));
        }
        let page: BybitList<BybitPositionItem> =
            self.client.get("/v5/position/list", &query).await?;

        let mut positions = Vec::with_capacity(page.list.len());
        for item in page.list {
            if let Some(position) = Self::to_position(item)? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    async fn get_ticker(
        &self,
        category: Category,
        symbol: &Symbol,
    ) -> Result<Ticker, ExchangeError> {
        let query = [
            ("category", category.as_str().to_string()),
            ("symbol", symbol.as_str().to_string()),
        ];
        let page: BybitList<BybitTickerItem> =
            self.client.get("/v5/market/tickers", &query).await?;
        let item = page
            .list
            .into_iter()
            .find(|t| t.symbol == symbol.as_str())
            .ok_or_else(|| ExchangeError::InvalidResponse {
                message: format!("no ticker for {symbol}"),
            })?;

        let last = parse_decimal("lastPrice", &item.last_price)?;
        let mark = parse_decimal("markPrice", &item.mark_price)?;
        Ok(Ticker {
            bid: parse_decimal("bid1Price", &item.bid1_price)?,
            ask: parse_decimal("ask1Price", &item.ask1_price)?,
            last,
            mark: if mark.is_zero() { last } else { mark },
        })
    }
}
