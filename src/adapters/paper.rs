//! In-memory paper trading gateway
//!
//! Keeps balances and resting limit orders in memory so the engine can run
//! end-to-end without venue credentials. Orders fill when `match_book` sees
//! the book trade through them, or explicitly through `fill_order`.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};
use uuid::Uuid;

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::traits::OrderGateway;
use crate::adapters::types::{
    BookTicker, LimitOrderRequest, OrderHandle, OrderReport, OrderSide, OrderStatus,
};

#[derive(Debug, Clone)]
struct PaperOrder {
    request: LimitOrderRequest,
    status: OrderStatus,
    filled: Decimal,
}

impl PaperOrder {
    fn remaining(&self) -> Decimal {
        self.request.quantity - self.filled
    }
}

#[derive(Debug, Default)]
struct PaperBook {
    balances: HashMap<String, Decimal>,
    /// symbol -> (base asset, quote asset)
    markets: HashMap<String, (String, String)>,
    orders: HashMap<String, PaperOrder>,
}

impl PaperBook {
    fn credit(&mut self, asset: &str, amount: Decimal) {
        *self.balances.entry(asset.to_string()).or_insert(Decimal::ZERO) += amount;
    }

    /// Apply `qty` of execution to an open order and settle balances
    fn execute(&mut self, order_id: &str, qty: Decimal) -> Option<Decimal> {
        let order = self.orders.get_mut(order_id)?;
        if order.status != OrderStatus::Open {
            return None;
        }
        let qty = qty.min(order.remaining());
        order.filled += qty;
        if order.remaining().is_zero() {
            order.status = OrderStatus::Filled;
        }
        let request = order.request.clone();

        if let Some((base, quote)) = self.markets.get(&request.symbol).cloned() {
            match request.side {
                // quote was reserved at placement
                OrderSide::Buy => self.credit(&base, qty),
                OrderSide::Sell => {
                    self.credit(&base, -qty);
                    self.credit(&quote, qty * request.price);
                }
            }
        }
        Some(qty)
    }

    fn release(&mut self, order_id: &str) -> ExchangeResult<()> {
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ExchangeError::OrderTerminated(order_id.to_string()))?;
        if order.status != OrderStatus::Open {
            return Err(ExchangeError::OrderTerminated(order_id.to_string()));
        }
        order.status = OrderStatus::Cancelled;
        let refund = order.remaining() * order.request.price;
        let request = order.request.clone();

        if request.side.is_buy() {
            if let Some((_, quote)) = self.markets.get(&request.symbol).cloned() {
                self.credit(&quote, refund);
            }
        }
        Ok(())
    }
}

/// Paper `OrderGateway` for one venue
pub struct PaperGateway {
    venue: String,
    min_notional: Decimal,
    book: Mutex<PaperBook>,
    placed: AtomicU64,
    reject_orders: AtomicBool,
}

impl PaperGateway {
    pub fn new(venue: impl Into<String>) -> Self {
        Self {
            venue: venue.into(),
            min_notional: Decimal::ZERO,
            book: Mutex::new(PaperBook::default()),
            placed: AtomicU64::new(0),
            reject_orders: AtomicBool::new(false),
        }
    }

    pub fn with_balance(self, asset: &str, amount: Decimal) -> Self {
        self.book.lock().balances.insert(asset.to_string(), amount);
        self
    }

    /// Register the base/quote assets of a symbol for balance bookkeeping
    pub fn with_market(self, symbol: &str, base: &str, quote: &str) -> Self {
        self.book
            .lock()
            .markets
            .insert(symbol.to_string(), (base.to_string(), quote.to_string()));
        self
    }

    pub fn with_min_notional(mut self, min_notional: Decimal) -> Self {
        self.min_notional = min_notional;
        self
    }

    /// Make every subsequent placement fail with `OrderRejected`
    pub fn set_reject_orders(&self, reject: bool) {
        self.reject_orders.store(reject, Ordering::SeqCst);
    }

    /// Number of orders accepted so far (replacements included)
    pub fn placed_count(&self) -> u64 {
        self.placed.load(Ordering::SeqCst)
    }

    pub fn balance(&self, asset: &str) -> Decimal {
        self.book.lock().balances.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Requests of all orders still resting on the book
    pub fn open_orders(&self) -> Vec<(String, LimitOrderRequest)> {
        self.book
            .lock()
            .orders
            .iter()
            .filter(|(_, o)| o.status == OrderStatus::Open)
            .map(|(id, o)| (id.clone(), o.request.clone()))
            .collect()
    }

    /// Execute `qty` of an open order; returns the quantity actually filled
    pub fn fill_order(&self, order_id: &str, qty: Decimal) -> Option<Decimal> {
        let filled = self.book.lock().execute(order_id, qty);
        if let Some(qty) = filled {
            debug!(venue = %self.venue, order_id = %order_id, qty = %qty, "[PAPER] Order executed");
        }
        filled
    }

    /// Fill every open order on `symbol` that the book has traded through
    ///
    /// Returns the ids of orders that became fully filled.
    pub fn match_book(&self, symbol: &str, ticker: &BookTicker) -> Vec<String> {
        if !ticker.is_valid() {
            return Vec::new();
        }
        let mut book = self.book.lock();
        let crossed: Vec<String> = book
            .orders
            .iter()
            .filter(|(_, o)| o.status == OrderStatus::Open && o.request.symbol == symbol)
            .filter(|(_, o)| ticker.crosses(o.request.side, o.request.price))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &crossed {
            book.execute(id, Decimal::MAX);
        }
        drop(book);

        for id in &crossed {
            info!(venue = %self.venue, symbol = %symbol, order_id = %id, "[PAPER] Order filled by book");
        }
        crossed
    }

    fn handle_for(&self, symbol: &str, order_id: String) -> OrderHandle {
        OrderHandle {
            venue: self.venue.clone(),
            symbol: symbol.to_string(),
            order_id,
        }
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    fn venue_id(&self) -> &str {
        &self.venue
    }

    async fn place_limit_order(&self, request: LimitOrderRequest) -> ExchangeResult<OrderHandle> {
        if self.reject_orders.load(Ordering::SeqCst) {
            return Err(ExchangeError::OrderRejected("paper venue rejecting orders".into()));
        }
        if request.quantity <= Decimal::ZERO || request.price <= Decimal::ZERO {
            return Err(ExchangeError::OrderRejected(format!(
                "invalid quantity {} or price {}",
                request.quantity, request.price
            )));
        }
        let notional = request.notional();
        if notional < self.min_notional {
            return Err(ExchangeError::OrderRejected(format!(
                "notional {} below minimum {}",
                notional, self.min_notional
            )));
        }

        let mut book = self.book.lock();
        if request.side.is_buy() {
            if let Some((_, quote)) = book.markets.get(&request.symbol).cloned() {
                let available = book.balances.get(&quote).copied().unwrap_or(Decimal::ZERO);
                if available < notional {
                    return Err(ExchangeError::InsufficientBalance {
                        asset: quote,
                        required: notional,
                        available,
                    });
                }
                book.credit(&quote, -notional);
            }
        }

        let order_id = Uuid::new_v4().to_string();
        book.orders.insert(
            order_id.clone(),
            PaperOrder {
                request: request.clone(),
                status: OrderStatus::Open,
                filled: Decimal::ZERO,
            },
        );
        drop(book);

        self.placed.fetch_add(1, Ordering::SeqCst);
        debug!(
            venue = %self.venue,
            symbol = %request.symbol,
            side = %request.side,
            qty = %request.quantity,
            price = %request.price,
            order_id = %order_id,
            "[PAPER] Order accepted"
        );
        Ok(self.handle_for(&request.symbol, order_id))
    }

    async fn replace_order(
        &self,
        handle: &OrderHandle,
        quantity: Decimal,
        price: Decimal,
    ) -> ExchangeResult<OrderHandle> {
        let side = {
            let mut book = self.book.lock();
            let side = book
                .orders
                .get(&handle.order_id)
                .map(|o| o.request.side)
                .ok_or_else(|| ExchangeError::OrderTerminated(handle.order_id.clone()))?;
            book.release(&handle.order_id)?;
            side
        };
        self.place_limit_order(LimitOrderRequest::new(handle.symbol.clone(), side, quantity, price))
            .await
    }

    async fn cancel_order(&self, handle: &OrderHandle) -> ExchangeResult<()> {
        self.book.lock().release(&handle.order_id)
    }

    async fn query_order(&self, handle: &OrderHandle) -> ExchangeResult<OrderReport> {
        self.book
            .lock()
            .orders
            .get(&handle.order_id)
            .map(|o| OrderReport {
                status: o.status,
                filled_quantity: o.filled,
            })
            .ok_or_else(|| ExchangeError::InvalidResponse(format!("unknown order {}", handle)))
    }

    async fn available_balance(&self, asset: &str) -> ExchangeResult<Decimal> {
        Ok(self.balance(asset))
    }
}
