//! Binance public WebSocket feed
//!
//! One raw-stream connection per subscription. Each connection runs in its
//! own task, decodes frames into typed messages and forwards them over an
//! mpsc channel. Dropped connections are re-established with backoff; once
//! reconnection is exhausted the sender is dropped so the consumer sees the
//! stream end.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::adapters::binance::types::{stream_url, AggTradeMsg, BinanceMarket, BookTickerMsg};
use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::reconnect::{reconnect_with_backoff, ReconnectConfig};
use crate::adapters::traits::MarketDataFeed;
use crate::adapters::types::{BookTicker, TradeStream, TradeTick};
use crate::adapters::websocket::{connect_tls, TlsWebSocketStream};
use crate::config::constants;

/// Why a reader loop returned
#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    Cancelled,
    ReceiverDropped,
    Disconnected,
}

/// Binance spot or USD-M futures public market data
pub struct BinanceFeed {
    venue: String,
    market: BinanceMarket,
    base_url: String,
    reconnect: ReconnectConfig,
}

impl BinanceFeed {
    pub fn new(venue: impl Into<String>, market: BinanceMarket) -> Self {
        Self {
            venue: venue.into(),
            market,
            base_url: market.ws_base_url().to_string(),
            reconnect: ReconnectConfig::from_env(),
        }
    }

    /// Override the WebSocket base URL (testnet or local relay)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn market(&self) -> BinanceMarket {
        self.market
    }

    /// Connect once, then hand the connection to a background reader task
    async fn spawn_stream<M, T>(
        &self,
        symbol: &str,
        stream: &str,
        tx: mpsc::Sender<T>,
        cancel: CancellationToken,
    ) -> ExchangeResult<()>
    where
        M: DeserializeOwned + Into<T> + Send + 'static,
        T: Send + 'static,
    {
        let url = stream_url(&self.base_url, symbol, stream);
        let ws = connect_tls(&url).await.map_err(|e| ExchangeError::SubscriptionFailed {
            symbol: symbol.to_string(),
            reason: e.to_string(),
        })?;
        info!(venue = %self.venue, symbol = %symbol, stream = %stream, "Binance stream connected");

        let name = format!("{}:{}@{}", self.venue, symbol.to_lowercase(), stream);
        let reconnect = self.reconnect.clone();
        tokio::spawn(run_stream::<M, T>(ws, url, name, reconnect, tx, cancel));
        Ok(())
    }
}

async fn run_stream<M, T>(
    mut ws: TlsWebSocketStream,
    url: String,
    name: String,
    reconnect: ReconnectConfig,
    tx: mpsc::Sender<T>,
    cancel: CancellationToken,
) where
    M: DeserializeOwned + Into<T>,
{
    loop {
        match read_until_end::<M, T>(&mut ws, &name, &tx, &cancel).await {
            StreamEnd::Cancelled | StreamEnd::ReceiverDropped => {
                let _ = ws.close(None).await;
                debug!(stream = %name, "Binance stream closed");
                return;
            }
            StreamEnd::Disconnected => {
                warn!(stream = %name, "Binance stream disconnected, reconnecting");
                let attempt = tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = reconnect_with_backoff(reconnect.clone(), &name, || connect_tls(&url)) => result,
                };
                match attempt {
                    Ok(new_ws) => {
                        info!(stream = %name, "Binance stream reconnected");
                        ws = new_ws;
                    }
                    Err(e) => {
                        error!(stream = %name, error = %e, "Binance stream gave up reconnecting");
                        return;
                    }
                }
            }
        }
    }
}

async fn read_until_end<M, T>(
    ws: &mut TlsWebSocketStream,
    name: &str,
    tx: &mpsc::Sender<T>,
    cancel: &CancellationToken,
) -> StreamEnd
where
    M: DeserializeOwned + Into<T>,
{
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return StreamEnd::Cancelled,
            _ = tx.closed() => return StreamEnd::ReceiverDropped,
            next = ws.next() => next,
        };

        let text = match next {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(e) => {
                    warn!(stream = %name, error = %e, "Non UTF-8 binary frame ignored");
                    continue;
                }
            },
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                continue
            }
            Some(Ok(Message::Close(frame))) => {
                info!(stream = %name, frame = ?frame, "WebSocket closed by server");
                return StreamEnd::Disconnected;
            }
            Some(Err(e)) => {
                warn!(stream = %name, error = %e, "WebSocket read error");
                return StreamEnd::Disconnected;
            }
            None => return StreamEnd::Disconnected,
        };

        trace!(stream = %name, message = %text, "Raw WS message");
        match serde_json::from_str::<M>(&text) {
            Ok(msg) => {
                if tx.send(msg.into()).await.is_err() {
                    return StreamEnd::ReceiverDropped;
                }
            }
            Err(e) => {
                warn!(stream = %name, error = %e, message = %text, "Failed to parse WS message");
            }
        }
    }
}

#[async_trait]
impl MarketDataFeed for BinanceFeed {
    fn venue_id(&self) -> &str {
        &self.venue
    }

    async fn subscribe_book_ticker(&self, symbol: &str) -> ExchangeResult<mpsc::Receiver<BookTicker>> {
        let (tx, rx) = mpsc::channel(constants::feed_channel_capacity());
        self.spawn_stream::<BookTickerMsg, BookTicker>(symbol, "bookTicker", tx, CancellationToken::new())
            .await?;
        Ok(rx)
    }

    async fn subscribe_trades(&self, symbol: &str) -> ExchangeResult<TradeStream> {
        let (tx, receiver) = mpsc::channel(constants::trade_channel_capacity());
        let cancel = CancellationToken::new();
        self.spawn_stream::<AggTradeMsg, TradeTick>(symbol, "aggTrade", tx, cancel.clone())
            .await?;
        Ok(TradeStream { receiver, cancel })
    }
}
