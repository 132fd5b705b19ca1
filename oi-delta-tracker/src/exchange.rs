//! REST ticker sources for exchanges exposing open interest: BitMEX and
//! Deribit. Selected by the `EXCHANGE` environment variable, with a
//! per-exchange default market overridable via `MARKET`.

use async_trait::async_trait;
use oi_delta::{MarketSource, OiDeltaError, SourceError, Tick};
use reqwest::Client;
use serde::Deserialize;

/// Build the configured market source from the environment.
pub fn from_env() -> Result<Box<dyn MarketSource>, OiDeltaError> {
    let exchange = std::env::var("EXCHANGE")
        .map_err(|_| OiDeltaError::Config("EXCHANGE must be set (bitmex | deribit)".to_string()))?;
    let market = std::env::var("MARKET").ok().filter(|m| !m.is_empty());

    match exchange.to_lowercase().as_str() {
        "bitmex" => Ok(Box::new(Bitmex::new(
            market.unwrap_or_else(|| "XBTUSD".to_string()),
        ))),
        "deribit" => Ok(Box::new(Deribit::new(
            market.unwrap_or_else(|| "BTC-PERPETUAL".to_string()),
        ))),
        other => Err(OiDeltaError::Config(format!(
            "unsupported exchange: {other} (expected bitmex | deribit)"
        ))),
    }
}

/// Subset of the BitMEX `/instrument` payload required to derive a tick.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitmexInstrument {
    open_interest: f64,
    mid_price: f64,
}

pub struct Bitmex {
    client: Client,
    market: String,
    label: String,
}

impl Bitmex {
    pub fn new(market: String) -> Self {
        Self {
            client: Client::new(),
            label: format!("bitmex:{market}"),
            market,
        }
    }
}

#[async_trait]
impl MarketSource for Bitmex {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_tick(&mut self) -> Result<Tick, SourceError> {
        let url = format!(
            "https://www.bitmex.com/api/v1/instrument?symbol={}&count=1",
            self.market
        );
        let response = self.client.get(&url).send().await.map_err(|err| {
            SourceError(format!("bitmex instrument request failed ({}): {err}", self.market))
        })?;
        if let Err(status_err) = response.error_for_status_ref() {
            return Err(SourceError(format!(
                "bitmex instrument poll failed ({}): {status_err}",
                self.market
            )));
        }
        let instruments: Vec<BitmexInstrument> = response.json().await.map_err(|err| {
            SourceError(format!("bitmex instrument parse failed ({}): {err}", self.market))
        })?;
        let instrument = instruments.into_iter().next().ok_or_else(|| {
            SourceError(format!("bitmex returned no instrument for {}", self.market))
        })?;

        Ok(Tick::new(instrument.open_interest, instrument.mid_price))
    }
}

/// Envelope of the Deribit `public/ticker` response.
#[derive(Debug, Deserialize)]
struct DeribitResponse {
    result: DeribitTicker,
}

#[derive(Debug, Deserialize)]
struct DeribitTicker {
    open_interest: f64,
    best_bid_price: f64,
    best_ask_price: f64,
}

pub struct Deribit {
    client: Client,
    market: String,
    label: String,
}

impl Deribit {
    pub fn new(market: String) -> Self {
        Self {
            client: Client::new(),
            label: format!("deribit:{market}"),
            market,
        }
    }
}

#[async_trait]
impl MarketSource for Deribit {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_tick(&mut self) -> Result<Tick, SourceError> {
        let url = format!(
            "https://www.deribit.com/api/v2/public/ticker?instrument_name={}",
            self.market
        );
        let response = self.client.get(&url).send().await.map_err(|err| {
            SourceError(format!("deribit ticker request failed ({}): {err}", self.market))
        })?;
        if let Err(status_err) = response.error_for_status_ref() {
            return Err(SourceError(format!(
                "deribit ticker poll failed ({}): {status_err}",
                self.market
            )));
        }
        let payload: DeribitResponse = response.json().await.map_err(|err| {
            SourceError(format!("deribit ticker parse failed ({}): {err}", self.market))
        })?;
        let ticker = payload.result;

        Ok(Tick::new(
            ticker.open_interest,
            (ticker.best_bid_price + ticker.best_ask_price) / 2.0,
        ))
    }
}
