//! Binance REST adapter.
//!
//! Idiom grounded on `scrapers::binance_price_feed` (reqwest client reuse,
//! one `HashMap` of per-call state behind a lock) and
//! `scrapers::binance_session` (explicit symbol/interval normalization
//! tables).

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;

use super::{HealthTracker, Interval, Ticker, Trade, VenueAdapter};
use crate::errors::{ScanError, ScanResult};
use crate::handle::ScanHandle;
use crate::types::{Health, MarketBar, OrderBookSnapshot, Symbol};

pub struct BinanceAdapter {
    client: reqwest::Client,
    base_url: String,
    symbol_table: HashMap<String, String>,
    health: HealthTracker,
    timeout: std::time::Duration,
}

impl BinanceAdapter {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Self {
        let mut symbol_table = HashMap::new();
        // Explicit per-venue overrides; anything absent passes through the
        // generic BASEQUOTE concatenation in `normalize_symbol`.
        symbol_table.insert("BTC/USD".to_string(), "BTCUSDT".to_string());
        symbol_table.insert("ETH/USD".to_string(), "ETHUSDT".to_string());

        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client builds"),
            base_url: base_url.into(),
            symbol_table,
            health: HealthTracker::new(),
            timeout,
        }
    }

    fn record(&self, ok: bool) {
        if ok {
            self.health.record_success();
        } else {
            self.health.record_failure();
        }
    }
}

#[async_trait]
impl VenueAdapter for BinanceAdapter {
    fn name(&self) -> &str {
        "binance"
    }

    async fn get_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
        handle: &ScanHandle,
    ) -> ScanResult<OrderBookSnapshot> {
        let wire_symbol = self.normalize_symbol(symbol);
        let url = format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.base_url, wire_symbol, depth
        );
        let body = self.fetch(&url, handle).await?;
        let parsed: BinanceDepth = serde_json::from_str(&body)
            .map_err(|e| ScanError::Permanent(format!("bad depth schema: {e}")))?;

        let bids = parse_price_qty(&parsed.bids)?;
        let asks = parse_price_qty(&parsed.asks)?;
        self.record(true);
        Ok(OrderBookSnapshot {
            bids,
            asks,
            seq: parsed.last_update_id,
            timestamp: Utc::now(),
        })
    }

    async fn get_trades(
        &self,
        symbol: &Symbol,
        n: usize,
        handle: &ScanHandle,
    ) -> ScanResult<Vec<Trade>> {
        let wire_symbol = self.normalize_symbol(symbol);
        let url = format!(
            "{}/api/v3/trades?symbol={}&limit={}",
            self.base_url, wire_symbol, n
        );
        let body = self.fetch(&url, handle).await?;
        let parsed: Vec<BinanceTrade> = serde_json::from_str(&body)
            .map_err(|e| ScanError::Permanent(format!("bad trades schema: {e}")))?;

        let trades = parsed
            .into_iter()
            .map(|t| Trade {
                price: t.price.parse().unwrap_or(f64::NAN),
                quantity: t.qty.parse().unwrap_or(f64::NAN),
                timestamp: millis_to_utc(t.time),
                buyer_maker: t.is_buyer_maker,
            })
            .collect();
        self.record(true);
        Ok(trades)
    }

    async fn get_klines(
        &self,
        symbol: &Symbol,
        interval: Interval,
        n: usize,
        handle: &ScanHandle,
    ) -> ScanResult<Vec<MarketBar>> {
        let wire_symbol = self.normalize_symbol(symbol);
        let wire_interval = self.normalize_interval(interval);
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, wire_symbol, wire_interval, n
        );
        let body = self.fetch(&url, handle).await?;
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&body)
            .map_err(|e| ScanError::Permanent(format!("bad klines schema: {e}")))?;

        let mut bars = Vec::with_capacity(parsed.len());
        for row in parsed {
            let arr = row
                .as_array()
                .ok_or_else(|| ScanError::Permanent("kline row not an array".to_string()))?;
            let get_f64 = |i: usize| -> ScanResult<f64> {
                arr.get(i)
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<f64>().ok())
                    .ok_or_else(|| ScanError::Permanent(format!("kline field {i} unparsable")))
            };
            let open_time = arr
                .first()
                .and_then(|v| v.as_i64())
                .map(millis_to_utc)
                .ok_or_else(|| ScanError::Permanent("kline missing open_time".to_string()))?;
            let close_time = arr
                .get(6)
                .and_then(|v| v.as_i64())
                .map(millis_to_utc)
                .unwrap_or(open_time);

            bars.push(MarketBar {
                open_time,
                close_time,
                open: get_f64(1)?,
                high: get_f64(2)?,
                low: get_f64(3)?,
                close: get_f64(4)?,
                volume: get_f64(5)?,
            });
        }
        self.record(true);
        Ok(bars)
    }

    async fn get_ticker(&self, symbol: &Symbol, handle: &ScanHandle) -> ScanResult<Ticker> {
        let wire_symbol = self.normalize_symbol(symbol);
        let url = format!("{}/api/v3/ticker/bookTicker?symbol={}", self.base_url, wire_symbol);
        let body = self.fetch(&url, handle).await?;
        let parsed: BinanceBookTicker = serde_json::from_str(&body)
            .map_err(|e| ScanError::Permanent(format!("bad ticker schema: {e}")))?;

        self.record(true);
        Ok(Ticker {
            last: (parsed.bid_price.parse::<f64>().unwrap_or(f64::NAN)
                + parsed.ask_price.parse::<f64>().unwrap_or(f64::NAN))
                / 2.0,
            bid: parsed.bid_price.parse().unwrap_or(f64::NAN),
            ask: parsed.ask_price.parse().unwrap_or(f64::NAN),
            volume_24h: 0.0,
        })
    }

    fn health(&self) -> Health {
        self.health.health()
    }

    fn normalize_symbol(&self, symbol: &Symbol) -> String {
        let canonical = symbol.canonical();
        self.symbol_table
            .get(&canonical)
            .cloned()
            .unwrap_or_else(|| format!("{}{}", symbol.base, symbol.quote))
    }

    fn normalize_interval(&self, interval: Interval) -> String {
        match interval {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
        }
        .to_string()
    }
}

impl BinanceAdapter {
    async fn fetch(&self, url: &str, handle: &ScanHandle) -> ScanResult<String> {
        let request = self.client.get(url).send();
        tokio::select! {
            biased;
            _ = handle.cancelled() => Err(ScanError::Cancelled),
            result = request => {
                match result {
                    Ok(resp) => {
                        let status = resp.status();
                        let body = resp
                            .text()
                            .await
                            .map_err(|e| ScanError::Transient(e.to_string()))?;
                        if status.as_u16() == 429 || status.is_server_error() {
                            self.record(false);
                            Err(ScanError::Transient(format!("status {status}")))
                        } else if status.is_client_error() {
                            self.record(false);
                            Err(ScanError::Permanent(format!("status {status}")))
                        } else {
                            Ok(body)
                        }
                    }
                    Err(e) => {
                        self.record(false);
                        Err(ScanError::Transient(e.to_string()))
                    }
                }
            }
        }
    }
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

fn parse_price_qty(levels: &[[String; 2]]) -> ScanResult<Vec<(f64, f64)>> {
    levels
        .iter()
        .map(|[p, q]| {
            let price: f64 = p
                .parse()
                .map_err(|_| ScanError::Permanent("unparsable price".to_string()))?;
            let qty: f64 = q
                .parse()
                .map_err(|_| ScanError::Permanent("unparsable quantity".to_string()))?;
            Ok((price, qty))
        })
        .collect()
}

#[derive(serde::Deserialize)]
struct BinanceDepth {
    #[serde(rename = "lastUpdateId")]
    last_update_id: Option<u64>,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

#[derive(serde::Deserialize)]
struct BinanceTrade {
    price: String,
    qty: String,
    time: i64,
    #[serde(rename = "isBuyerMaker")]
    is_buyer_maker: bool,
}

#[derive(serde::Deserialize)]
struct BinanceBookTicker {
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_symbol_uses_table() {
        let adapter = BinanceAdapter::new("https://api.binance.com", std::time::Duration::from_secs(10));
        assert_eq!(adapter.normalize_symbol(&Symbol::usd("BTC")), "BTCUSDT");
    }

    #[test]
    fn normalize_symbol_passes_through_unknown() {
        let adapter = BinanceAdapter::new("https://api.binance.com", std::time::Duration::from_secs(10));
        assert_eq!(adapter.normalize_symbol(&Symbol::usd("XYZ")), "XYZUSD");
    }

    #[test]
    fn normalize_interval_maps_to_minute_units() {
        let adapter = BinanceAdapter::new("https://api.binance.com", std::time::Duration::from_secs(10));
        assert_eq!(adapter.normalize_interval(Interval::OneHour), "1h");
    }
}
