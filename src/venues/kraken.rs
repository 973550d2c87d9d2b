//! Kraken REST adapter.
//!
//! Second concrete `VenueAdapter` so `DataFacade` has a real fan-out/failover
//! path to exercise; same idiom as `BinanceAdapter`, different wire schema.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;

use super::{HealthTracker, Interval, Ticker, Trade, VenueAdapter};
use crate::errors::{ScanError, ScanResult};
use crate::handle::ScanHandle;
use crate::types::{Health, MarketBar, OrderBookSnapshot, Symbol};

pub struct KrakenAdapter {
    client: reqwest::Client,
    base_url: String,
    symbol_table: HashMap<String, String>,
    health: HealthTracker,
}

impl KrakenAdapter {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Self {
        let mut symbol_table = HashMap::new();
        symbol_table.insert("BTC/USD".to_string(), "XXBTZUSD".to_string());
        symbol_table.insert("ETH/USD".to_string(), "XETHZUSD".to_string());

        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client builds"),
            base_url: base_url.into(),
            symbol_table,
            health: HealthTracker::new(),
        }
    }

    fn record(&self, ok: bool) {
        if ok {
            self.health.record_success();
        } else {
            self.health.record_failure();
        }
    }

    async fn fetch(&self, url: &str, handle: &ScanHandle) -> ScanResult<String> {
        let request = self.client.get(url).send();
        tokio::select! {
            biased;
            _ = handle.cancelled() => Err(ScanError::Cancelled),
            result = request => {
                match result {
                    Ok(resp) => {
                        let status = resp.status();
                        let body = resp.text().await.map_err(|e| ScanError::Transient(e.to_string()))?;
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

#[async_trait]
impl VenueAdapter for KrakenAdapter {
    fn name(&self) -> &str {
        "kraken"
    }

    async fn get_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
        handle: &ScanHandle,
    ) -> ScanResult<OrderBookSnapshot> {
        let pair = self.normalize_symbol(symbol);
        let url = format!("{}/0/public/Depth?pair={}&count={}", self.base_url, pair, depth);
        let body = self.fetch(&url, handle).await?;
        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ScanError::Permanent(format!("bad depth schema: {e}")))?;

        let result = parsed
            .get("result")
            .and_then(|r| r.as_object())
            .and_then(|o| o.values().next())
            .ok_or_else(|| ScanError::Permanent("missing result object".to_string()))?;

        let parse_levels = |key: &str| -> ScanResult<Vec<(f64, f64)>> {
            result
                .get(key)
                .and_then(|v| v.as_array())
                .ok_or_else(|| ScanError::Permanent(format!("missing {key}")))?
                .iter()
                .map(|level| {
                    let level = level
                        .as_array()
                        .ok_or_else(|| ScanError::Permanent("level not array".to_string()))?;
                    let price: f64 = level
                        .first()
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| ScanError::Permanent("bad price".to_string()))?;
                    let qty: f64 = level
                        .get(1)
                        .and_then(|v| v.as_str())
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| ScanError::Permanent("bad quantity".to_string()))?;
                    Ok((price, qty))
                })
                .collect()
        };

        self.record(true);
        Ok(OrderBookSnapshot {
            bids: parse_levels("bids")?,
            asks: parse_levels("asks")?,
            seq: None,
            timestamp: Utc::now(),
        })
    }

    async fn get_trades(
        &self,
        symbol: &Symbol,
        n: usize,
        handle: &ScanHandle,
    ) -> ScanResult<Vec<Trade>> {
        let pair = self.normalize_symbol(symbol);
        let url = format!("{}/0/public/Trades?pair={}", self.base_url, pair);
        let body = self.fetch(&url, handle).await?;
        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ScanError::Permanent(format!("bad trades schema: {e}")))?;

        let rows = parsed
            .get("result")
            .and_then(|r| r.as_object())
            .and_then(|o| o.values().next())
            .and_then(|v| v.as_array())
            .ok_or_else(|| ScanError::Permanent("missing trade rows".to_string()))?;

        let mut trades = Vec::with_capacity(rows.len().min(n));
        for row in rows.iter().take(n) {
            let row = row
                .as_array()
                .ok_or_else(|| ScanError::Permanent("trade row not array".to_string()))?;
            let price: f64 = row
                .first()
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(f64::NAN);
            let qty: f64 = row
                .get(1)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(f64::NAN);
            let ts = row.get(2).and_then(|v| v.as_f64()).unwrap_or(0.0);
            let side = row.get(3).and_then(|v| v.as_str()).unwrap_or("b");

            trades.push(Trade {
                price,
                quantity: qty,
                timestamp: Utc
                    .timestamp_opt(ts as i64, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
                buyer_maker: side == "s",
            });
        }
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
        let pair = self.normalize_symbol(symbol);
        let wire_interval = self.normalize_interval(interval);
        let url = format!(
            "{}/0/public/OHLC?pair={}&interval={}",
            self.base_url, pair, wire_interval
        );
        let body = self.fetch(&url, handle).await?;
        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ScanError::Permanent(format!("bad ohlc schema: {e}")))?;

        let rows = parsed
            .get("result")
            .and_then(|r| r.as_object())
            .and_then(|o| o.values().next())
            .and_then(|v| v.as_array())
            .ok_or_else(|| ScanError::Permanent("missing ohlc rows".to_string()))?;

        let mut bars = Vec::with_capacity(rows.len());
        for row in rows.iter().rev().take(n).rev() {
            let row = row
                .as_array()
                .ok_or_else(|| ScanError::Permanent("ohlc row not array".to_string()))?;
            let time = row.first().and_then(|v| v.as_i64()).unwrap_or(0);
            let f = |i: usize| -> f64 {
                row.get(i)
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(f64::NAN)
            };
            let open_time = Utc.timestamp_opt(time, 0).single().unwrap_or_else(Utc::now);
            bars.push(MarketBar {
                open_time,
                close_time: open_time,
                open: f(1),
                high: f(2),
                low: f(3),
                close: f(4),
                volume: f(6),
            });
        }
        self.record(true);
        Ok(bars)
    }

    async fn get_ticker(&self, symbol: &Symbol, handle: &ScanHandle) -> ScanResult<Ticker> {
        let pair = self.normalize_symbol(symbol);
        let url = format!("{}/0/public/Ticker?pair={}", self.base_url, pair);
        let body = self.fetch(&url, handle).await?;
        let parsed: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ScanError::Permanent(format!("bad ticker schema: {e}")))?;

        let result = parsed
            .get("result")
            .and_then(|r| r.as_object())
            .and_then(|o| o.values().next())
            .ok_or_else(|| ScanError::Permanent("missing ticker result".to_string()))?;

        let get = |key: &str, idx: usize| -> f64 {
            result
                .get(key)
                .and_then(|v| v.as_array())
                .and_then(|a| a.get(idx))
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(f64::NAN)
        };

        self.record(true);
        Ok(Ticker {
            last: get("c", 0),
            bid: get("b", 0),
            ask: get("a", 0),
            volume_24h: get("v", 1),
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
            Interval::OneMinute => "1",
            Interval::FiveMinutes => "5",
            Interval::OneHour => "60",
            Interval::FourHours => "240",
            Interval::OneDay => "1440",
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_symbol_uses_table() {
        let adapter = KrakenAdapter::new("https://api.kraken.com", std::time::Duration::from_secs(10));
        assert_eq!(adapter.normalize_symbol(&Symbol::usd("BTC")), "XXBTZUSD");
    }

    #[test]
    fn normalize_interval_uses_minutes() {
        let adapter = KrakenAdapter::new("https://api.kraken.com", std::time::Duration::from_secs(10));
        assert_eq!(adapter.normalize_interval(Interval::OneHour), "60");
    }
}
