//! In-process simulated exchange.
//!
//! Fills market orders immediately against configured tickers, keeps
//! positions per (symbol, side), and can inject failures. Used by tests and
//! by the `simulated` exchange mode.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::application::ports::{
    Category, ExchangeError, ExchangeOrderState, ExchangePort, PlaceOrderAck, PlaceOrderRequest,
    Ticker,
};
use crate::domain::order_execution::{OrderStatus, OrderType};
use crate::domain::recovery::ExchangePosition;
use crate::domain::shared::{ClientOrderId, ExchangeOrderId, PairKey, Side, Symbol};

const DUPLICATE_LINK_ID: i64 = 110_072;
const REDUCE_ONLY_REJECTED: i64 = 110_017;

#[derive(Debug, Default)]
struct SimState {
    tickers: HashMap<Symbol, Ticker>,
    fill_prices: HashMap<Symbol, Decimal>,
    positions: HashMap<PairKey, ExchangePosition>,
    orders: Vec<ExchangeOrderState>,
    next_order_id: u64,
    failure: Option<ExchangeError>,
    reject_next: Option<(i64, String)>,
    timeout_after_accept: bool,
    hold_market_orders: bool,
    reduce_only: HashSet<ExchangeOrderId>,
    settle_coins: HashMap<Symbol, String>,
    placed_orders: usize,
}

/// Simulated exchange implementing `ExchangePort`.
#[derive(Debug, Default)]
pub struct SimulatedExchange {
    state: Mutex<SimState>,
}

impl SimulatedExchange {
    /// Create an empty exchange.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ticker for a symbol. Bid, ask, last and mark are all `price`.
    pub fn set_price(&self, symbol: &Symbol, price: Decimal) {
        self.set_ticker(
            symbol,
            Ticker {
                bid: price,
                ask: price,
                last: price,
                mark: price,
            },
        );
    }

    /// Set the full ticker for a symbol and re-mark its positions.
    pub fn set_ticker(&self, symbol: &Symbol, ticker: Ticker) {
        let mut state = self.state.lock();
        state.tickers.insert(symbol.clone(), ticker);
        for position in state.positions.values_mut() {
            if &position.symbol == symbol {
                position.mark_price = ticker.mark;
                position.unrealized_pnl = unrealized_pnl(position);
            }
        }
    }

    /// Fill market orders for `symbol` at `price` instead of the ticker.
    pub fn set_fill_price(&self, symbol: &Symbol, price: Decimal) {
        self.state.lock().fill_prices.insert(symbol.clone(), price);
    }

    /// Seed an open position.
    pub fn open_position(&self, symbol: &Symbol, side: Side, size: Decimal, avg_price: Decimal) {
        let mut state = self.state.lock();
        let mark = state.tickers.get(symbol).map_or(avg_price, |t| t.mark);
        let mut position = ExchangePosition {
            symbol: symbol.clone(),
            side,
            size,
            avg_price,
            mark_price: mark,
            unrealized_pnl: Decimal::ZERO,
        };
        position.unrealized_pnl = unrealized_pnl(&position);
        state.positions.insert(position.key(), position);
    }

    /// Remove a position as if it was closed outside this service.
    pub fn close_position_externally(&self, symbol: &Symbol, side: Side) {
        self.state
            .lock()
            .positions
            .remove(&PairKey::new(symbol.clone(), side));
    }

    /// Fail every call with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<ExchangeError>) {
        self.state.lock().failure = error;
    }

    /// Reject the next order placement with an exchange result code.
    pub fn reject_next_order(&self, code: i64, message: impl Into<String>) {
        self.state.lock().reject_next = Some((code, message.into()));
    }

    /// Accept order placements but report a timeout to the caller.
    pub fn set_timeout_after_accept(&self, enabled: bool) {
        self.state.lock().timeout_after_accept = enabled;
    }

    /// Leave market orders resting instead of filling them on placement.
    pub fn set_hold_market_orders(&self, enabled: bool) {
        self.state.lock().hold_market_orders = enabled;
    }

    /// Settle positions in `symbol` in `coin` rather than USDT.
    pub fn set_settle_coin(&self, symbol: &Symbol, coin: impl Into<String>) {
        self.state.lock().settle_coins.insert(symbol.clone(), coin.into());
    }

    /// Fill the rest of a resting order at `price`.
    pub fn fill_resting_order(&self, order_id: &ExchangeOrderId, price: Decimal) -> bool {
        self.fill_resting(order_id, None, price)
    }

    /// Fill part of a resting order at `price`, leaving it open.
    pub fn partially_fill_resting_order(
        &self,
        order_id: &ExchangeOrderId,
        quantity: Decimal,
        price: Decimal,
    ) -> bool {
        self.fill_resting(order_id, Some(quantity), price)
    }

    fn fill_resting(&self, order_id: &ExchangeOrderId, quantity: Option<Decimal>, price: Decimal) -> bool {
        let mut state = self.state.lock();
        let Some(index) = state
            .orders
            .iter()
            .position(|o| &o.order_id == order_id && !o.status.is_terminal())
        else {
            return false;
        };
        let reduce_only = state.reduce_only.contains(order_id);
        let (symbol, side, fill) = {
            let order = &mut state.orders[index];
            let remaining = order.quantity - order.filled_quantity;
            let fill = quantity.map_or(remaining, |q| q.min(remaining));
            let filled = order.filled_quantity + fill;
            let previous = order.avg_fill_price.unwrap_or(price) * order.filled_quantity;
            order.avg_fill_price = Some((previous + price * fill) / filled);
            order.filled_quantity = filled;
            order.status = if filled < order.quantity {
                OrderStatus::PartiallyFilled
            } else {
                OrderStatus::Filled
            };
            (order.symbol.clone(), order.side, fill)
        };
        apply_fill(&mut state, &symbol, side, fill, price, reduce_only);
        true
    }

    /// Number of orders accepted so far.
    #[must_use]
    pub fn placed_orders(&self) -> usize {
        self.state.lock().placed_orders
    }

    /// Every order the exchange has seen.
    #[must_use]
    pub fn orders(&self) -> Vec<ExchangeOrderState> {
        self.state.lock().orders.clone()
    }

    fn check_failure(state: &SimState) -> Result<(), ExchangeError> {
        state.failure.clone().map_or(Ok(()), Err)
    }
}

fn unrealized_pnl(position: &ExchangePosition) -> Decimal {
    let diff = match position.side {
        Side::Buy => position.mark_price - position.avg_price,
        Side::Sell => position.avg_price - position.mark_price,
    };
    diff * position.size
}

fn apply_fill(
    state: &mut SimState,
    symbol: &Symbol,
    side: Side,
    quantity: Decimal,
    price: Decimal,
    reduce_only: bool,
) {
    let mark = state.tickers.get(symbol).map_or(price, |t| t.mark);
    if reduce_only {
        let key = PairKey::new(symbol.clone(), side.opposite());
        if let Some(position) = state.positions.get_mut(&key) {
            position.size -= quantity.min(position.size);
            if position.size.is_zero() {
                state.positions.remove(&key);
            }
        }
        return;
    }

    let key = PairKey::new(symbol.clone(), side);
    let position = state.positions.entry(key).or_insert_with(|| ExchangePosition {
        symbol: symbol.clone(),
        side,
        size: Decimal::ZERO,
        avg_price: price,
        mark_price: mark,
        unrealized_pnl: Decimal::ZERO,
    });
    let new_size = position.size + quantity;
    position.avg_price = (position.avg_price * position.size + price * quantity) / new_size;
    position.size = new_size;
    position.mark_price = mark;
    position.unrealized_pnl = unrealized_pnl(position);
}

#[async_trait]
impl ExchangePort for SimulatedExchange {
    async fn place_order(
        &self,
        request: PlaceOrderRequest,
    ) -> Result<PlaceOrderAck, ExchangeError> {
        let mut state = self.state.lock();
        Self::check_failure(&state)?;

        if let Some((code, message)) = state.reject_next.take() {
            return Err(ExchangeError::Rejected { code, message });
        }
        if state
            .orders
            .iter()
            .any(|o| o.client_order_id.as_ref() == Some(&request.client_order_id))
        {
            return Err(ExchangeError::Rejected {
                code: DUPLICATE_LINK_ID,
                message: "OrderLinkedID is duplicate".to_string(),
            });
        }
        if request.reduce_only {
            let key = PairKey::new(request.symbol.clone(), request.side.opposite());
            if !state.positions.contains_key(&key) {
                return Err(ExchangeError::Rejected {
                    code: REDUCE_ONLY_REJECTED,
                    message: "current position is zero, cannot fix reduce-only order qty"
                        .to_string(),
                });
            }
        }

        state.next_order_id += 1;
        state.placed_orders += 1;
        let order_id = ExchangeOrderId::new(format!("sim-{}", state.next_order_id));

        let mut order = ExchangeOrderState {
            order_id: order_id.clone(),
            client_order_id: Some(request.client_order_id.clone()),
            symbol: request.symbol.clone(),
            side: request.side,
            status: OrderStatus::Pending,
            quantity: request.quantity,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            reason: None,
        };

        if request.reduce_only {
            state.reduce_only.insert(order_id.clone());
        }
        if request.order_type == OrderType::Market && !state.hold_market_orders {
            let ticker_price = state
                .tickers
                .get(&request.symbol)
                .and_then(|t| t.reference_price(request.side));
            let price = state
                .fill_prices
                .get(&request.symbol)
                .copied()
                .or(ticker_price)
                .ok_or_else(|| ExchangeError::Rejected {
                    code: 10_001,
                    message: format!("no market for {}", request.symbol),
                })?;
            order.status = OrderStatus::Filled;
            order.filled_quantity = request.quantity;
            order.avg_fill_price = Some(price);
            apply_fill(
                &mut state,
                &request.symbol,
                request.side,
                request.quantity,
                price,
                request.reduce_only,
            );
        }

        state.orders.push(order);

        if state.timeout_after_accept {
            return Err(ExchangeError::Timeout {
                operation: "place_order".to_string(),
            });
        }
        Ok(PlaceOrderAck {
            order_id,
            client_order_id: request.client_order_id,
        })
    }

    async fn cancel_order(
        &self,
        _category: Category,
        symbol: &Symbol,
        order_id: &ExchangeOrderId,
    ) -> Result<(), ExchangeError> {
        let mut state = self.state.lock();
        Self::check_failure(&state)?;
        let order = state
            .orders
            .iter_mut()
            .find(|o| &o.order_id == order_id && &o.symbol == symbol)
            .ok_or_else(|| ExchangeError::Rejected {
                code: 110_001,
                message: "order not exists or too late to cancel".to_string(),
            })?;
        if order.status.is_terminal() {
            return Err(ExchangeError::Rejected {
                code: 110_001,
                message: "order not exists or too late to cancel".to_string(),
            });
        }
        order.status = OrderStatus::Cancelled;
        Ok(())
    }

    async fn cancel_all_orders(
        &self,
        _category: Category,
        symbol: Option<&Symbol>,
    ) -> Result<Vec<ExchangeOrderId>, ExchangeError> {
        let mut state = self.state.lock();
        Self::check_failure(&state)?;
        let mut cancelled = Vec::new();
        for order in &mut state.orders {
            if order.status.is_terminal() || symbol.is_some_and(|s| s != &order.symbol) {
                continue;
            }
            order.status = OrderStatus::Cancelled;
            cancelled.push(order.order_id.clone());
        }
        Ok(cancelled)
    }

    async fn get_open_orders(
        &self,
        _category: Category,
        symbol: &Symbol,
        order_id: Option<&ExchangeOrderId>,
    ) -> Result<Vec<ExchangeOrderState>, ExchangeError> {
        let state = self.state.lock();
        Self::check_failure(&state)?;
        Ok(state
            .orders
            .iter()
            .filter(|o| &o.symbol == symbol)
            .filter(|o| order_id.is_none_or(|id| &o.order_id == id))
            .cloned()
            .collect())
    }

    async fn get_order_by_client_id(
        &self,
        _category: Category,
        symbol: &Symbol,
        client_order_id: &ClientOrderId,
    ) -> Result<Option<ExchangeOrderState>, ExchangeError> {
        let state = self.state.lock();
        Self::check_failure(&state)?;
        Ok(state
            .orders
            .iter()
            .find(|o| &o.symbol == symbol && o.client_order_id.as_ref() == Some(client_order_id))
            .cloned())
    }

    async fn get_positions(
        &self,
        _category: Category,
        settle_coin: Option<&str>,
    ) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let state = self.state.lock();
        Self::check_failure(&state)?;
        let settles_in = |position: &ExchangePosition| {
            let coin = state
                .settle_coins
                .get(&position.symbol)
                .map_or("USDT", String::as_str);
            settle_coin.is_none_or(|wanted| wanted == coin)
        };
        let mut positions: Vec<_> = state
            .positions
            .values()
            .filter(|p| settles_in(p))
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(positions)
    }

    async fn get_ticker(
        &self,
        _category: Category,
        symbol: &Symbol,
    ) -> Result<Ticker, ExchangeError> {
        let state = self.state.lock();
        Self::check_failure(&state)?;
        state
            .tickers
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::Rejected {
                code: 10_001,
                message: format!("symbol {symbol} not found"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market(symbol: &str, side: Side, qty: Decimal, reduce_only: bool) -> PlaceOrderRequest {
        PlaceOrderRequest {
            category: Category::Linear,
            symbol: Symbol::new(symbol),
            side,
            order_type: OrderType::Market,
            quantity: qty,
            price: None,
            trigger_price: None,
            time_in_force: None,
            reduce_only,
            client_order_id: ClientOrderId::generate(),
        }
    }

    #[tokio::test]
    async fn market_order_opens_and_reduce_only_closes_position() {
        let exchange = SimulatedExchange::new();
        let btc = Symbol::new("BTCUSDT");
        exchange.set_price(&btc, dec!(50000));

        exchange
            .place_order(market("BTCUSDT", Side::Buy, dec!(0.02), false))
            .await
            .unwrap();
        let positions = exchange.get_positions(Category::Linear, None).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].size, dec!(0.02));

        exchange
            .place_order(market("BTCUSDT", Side::Sell, dec!(0.02), true))
            .await
            .unwrap();
        assert!(exchange
            .get_positions(Category::Linear, None)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(exchange.placed_orders(), 2);
    }

    #[tokio::test]
    async fn duplicate_client_id_is_rejected() {
        let exchange = SimulatedExchange::new();
        exchange.set_price(&Symbol::new("BTCUSDT"), dec!(50000));
        let request = market("BTCUSDT", Side::Buy, dec!(0.01), false);

        exchange.place_order(request.clone()).await.unwrap();
        let err = exchange.place_order(request).await.unwrap_err();

        assert!(matches!(err, ExchangeError::Rejected { code: DUPLICATE_LINK_ID, .. }));
        assert_eq!(exchange.placed_orders(), 1);
    }

    #[tokio::test]
    async fn reduce_only_without_position_is_rejected() {
        let exchange = SimulatedExchange::new();
        exchange.set_price(&Symbol::new("ETHUSDT"), dec!(3000));
        let err = exchange
            .place_order(market("ETHUSDT", Side::Sell, dec!(1), true))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Rejected { .. }));
    }

    #[tokio::test]
    async fn injected_failure_applies_to_every_call() {
        let exchange = SimulatedExchange::new();
        exchange.set_failure(Some(ExchangeError::Timeout {
            operation: "get_positions".to_string(),
        }));
        assert!(exchange.get_positions(Category::Linear, None).await.is_err());
        exchange.set_failure(None);
        assert!(exchange.get_positions(Category::Linear, None).await.is_ok());
    }

    #[tokio::test]
    async fn resting_limit_order_can_be_filled_and_cancelled() {
        let exchange = SimulatedExchange::new();
        let eth = Symbol::new("ETHUSDT");
        let mut request = market("ETHUSDT", Side::Buy, dec!(1), false);
        request.order_type = OrderType::Limit;
        request.price = Some(dec!(2900));

        let ack = exchange.place_order(request).await.unwrap();
        let open = exchange
            .get_open_orders(Category::Linear, &eth, Some(&ack.order_id))
            .await
            .unwrap();
        assert_eq!(open[0].status, OrderStatus::Pending);

        assert!(exchange.fill_resting_order(&ack.order_id, dec!(2900)));
        assert!(exchange
            .cancel_order(Category::Linear, &eth, &ack.order_id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn held_reduce_only_order_closes_when_filled() {
        let exchange = SimulatedExchange::new();
        let btc = Symbol::new("BTCUSDT");
        exchange.set_price(&btc, dec!(50000));
        exchange.open_position(&btc, Side::Buy, dec!(1), dec!(50000));
        exchange.set_hold_market_orders(true);

        let ack = exchange
            .place_order(market("BTCUSDT", Side::Sell, dec!(1), true))
            .await
            .unwrap();
        assert_eq!(exchange.get_positions(Category::Linear, None).await.unwrap().len(), 1);

        assert!(exchange.partially_fill_resting_order(&ack.order_id, dec!(0.4), dec!(50000)));
        let order = &exchange.orders()[0];
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_quantity, dec!(0.4));
        let positions = exchange.get_positions(Category::Linear, None).await.unwrap();
        assert_eq!(positions[0].size, dec!(0.6));

        assert!(exchange.fill_resting_order(&ack.order_id, dec!(50000)));
        assert!(exchange.get_positions(Category::Linear, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn positions_filter_by_settle_coin() {
        let exchange = SimulatedExchange::new();
        let perp = Symbol::new("BTCPERP");
        exchange.set_settle_coin(&perp, "USDC");
        exchange.open_position(&perp, Side::Buy, dec!(1), dec!(50000));
        exchange.open_position(&Symbol::new("ETHUSDT"), Side::Buy, dec!(1), dec!(3000));

        let usdt = exchange.get_positions(Category::Linear, Some("USDT")).await.unwrap();
        let usdc = exchange.get_positions(Category::Linear, Some("USDC")).await.unwrap();
        assert_eq!(usdt.len(), 1);
        assert_eq!(usdc[0].symbol, perp);
        assert_eq!(exchange.get_positions(Category::Linear, None).await.unwrap().len(), 2);
    }
}
