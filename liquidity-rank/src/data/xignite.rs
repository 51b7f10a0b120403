//! Xignite REST client for option chains, earnings and fundamentals.
//!
//! Endpoints used:
//! - ListUnderlyingSymbols: option underlyings per exchange
//! - GetEquityOptionChain: chain for one underlying and expiry month
//! - GetAnnouncement: next earnings date with before/after market flag
//! - GetFundamentals (FactSet): sector, industry and market cap
//!
//! Every response carries an `Outcome` field; anything but `Success` on the
//! listing call is fatal to the caller, while per-symbol calls fail in isolation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::provider::{
    ChainProvider, EarningsProvider, FetchError, FundamentalsProvider, TickerUniverse,
};
use super::types::{EarningsRecord, FundamentalsRecord, MarketTiming, OptionQuote, OptionType};

const OPTIONS_URL: &str = "https://globalrealtimeoptions.xignite.com/xglobalrealtimeoptions.json";
const EARNINGS_URL: &str = "https://www.xignite.com/xEarningsCalendar.json/GetAnnouncement";
const FUNDAMENTALS_URL: &str =
    "https://factsetfundamentals.xignite.com/xFactSetFundamentals.json/GetFundamentals";

/// Date formats seen in Xignite payloads.
const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%Y-%m-%dT%H:%M:%S"];

/// Xignite API errors.
#[derive(Error, Debug)]
pub enum XigniteError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct XigniteSettings {
    /// Environment variable holding the API token.
    pub token_env: String,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    /// Minimum spacing between consecutive requests.
    pub min_request_interval_ms: u64,
    /// Option exchange passed to the chain endpoint.
    pub option_exchange: String,
}

impl Default for XigniteSettings {
    fn default() -> Self {
        Self {
            token_env: "XIGNITE_API_TOKEN".to_string(),
            request_timeout_secs: 5,
            min_request_interval_ms: 10,
            option_exchange: "OPRA".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SymbolListResponse {
    outcome: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    underlying_security_descriptions: Option<Vec<UnderlyingDescription>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UnderlyingDescription {
    symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChainResponse {
    outcome: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    quote: Option<ChainQuote>,
    #[serde(default)]
    expirations: Option<Vec<RawExpiration>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChainQuote {
    #[serde(default)]
    last: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawExpiration {
    #[serde(default)]
    calls: Option<Vec<RawContract>>,
    #[serde(default)]
    puts: Option<Vec<RawContract>>,
}

/// One contract as it appears under `Calls` or `Puts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawContract {
    pub base_symbol: String,
    pub strike_price: f64,
    #[serde(default)]
    pub bid: Option<f64>,
    #[serde(default)]
    pub ask: Option<f64>,
    #[serde(default)]
    pub open_interest: Option<f64>,
    pub expiration_date: String,
}

impl RawContract {
    /// Convert to an OptionQuote priced against `spot`.
    ///
    /// An unreadable expiration date fails the whole chain; a contract with
    /// non-finite prices is skipped.
    pub fn to_quote(
        &self,
        option_type: OptionType,
        spot: Decimal,
    ) -> Result<Option<OptionQuote>, XigniteError> {
        let expiration = parse_date(&self.expiration_date).ok_or_else(|| {
            XigniteError::InvalidResponse(format!(
                "bad ExpirationDate '{}' for {}",
                self.expiration_date, self.base_symbol
            ))
        })?;

        let (Ok(strike), Ok(bid), Ok(ask)) = (
            Decimal::try_from(self.strike_price),
            Decimal::try_from(self.bid.unwrap_or(0.0)),
            Decimal::try_from(self.ask.unwrap_or(0.0)),
        ) else {
            return Ok(None);
        };

        Ok(Some(OptionQuote {
            symbol: self.base_symbol.clone(),
            option_type,
            strike,
            spot,
            bid,
            ask,
            open_interest: self.open_interest.unwrap_or(0.0) as i64,
            expiration,
        }))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AnnouncementResponse {
    #[serde(default)]
    security: Option<SecurityRef>,
    #[serde(default)]
    earnings_date: Option<String>,
    #[serde(default)]
    time_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityRef {
    symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FundamentalsResponse {
    outcome: String,
    #[serde(default)]
    company: Option<Company>,
    #[serde(default)]
    fundamentals_sets: Option<Vec<FundamentalsSet>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Company {
    symbol: String,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    sector: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FundamentalsSet {
    #[serde(default)]
    fundamentals: Option<Vec<FundamentalValue>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FundamentalValue {
    #[serde(default)]
    value: serde_json::Value,
}

impl FundamentalsResponse {
    fn into_record(self) -> Option<FundamentalsRecord> {
        if self.outcome != "Success" {
            return None;
        }
        let company = self.company?;
        let market_cap = self
            .fundamentals_sets
            .as_ref()
            .and_then(|sets| sets.first())
            .and_then(|set| set.fundamentals.as_ref())
            .and_then(|values| values.first())
            .and_then(|v| json_number(&v.value));

        // Industry is the report's sector, FactSet's sector its subsector
        Some(FundamentalsRecord {
            symbol: company.symbol,
            sector: company.industry,
            subsector: company.sector,
            market_cap,
        })
    }
}

fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Flatten a chain payload; the side a contract is listed under sets its type.
fn chain_quotes(
    quote: Option<ChainQuote>,
    expirations: Vec<RawExpiration>,
    symbol: &str,
) -> Result<Vec<OptionQuote>, XigniteError> {
    let last = quote
        .and_then(|q| q.last)
        .ok_or_else(|| XigniteError::InvalidResponse(format!("no last price for {}", symbol)))?;
    let spot = Decimal::try_from(last)
        .map_err(|_| XigniteError::InvalidResponse(format!("bad last price {} for {}", last, symbol)))?;

    let mut quotes = Vec::new();
    for expiration in expirations {
        let sides = [
            (OptionType::Call, expiration.calls),
            (OptionType::Put, expiration.puts),
        ];
        for (option_type, contracts) in sides {
            for contract in contracts.unwrap_or_default() {
                if let Some(quote) = contract.to_quote(option_type, spot)? {
                    quotes.push(quote);
                }
            }
        }
    }

    Ok(quotes)
}

/// Parse a date in any of the formats Xignite emits.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            // "2/16/2024 12:00:00 AM"
            s.split_whitespace()
                .next()
                .and_then(|d| NaiveDate::parse_from_str(d, "%m/%d/%Y").ok())
        })
}

/// Xignite API client.
///
/// Shared across batch tasks behind an `Arc`; request pacing is the only
/// mutable state and lives behind a short lock.
pub struct XigniteClient {
    client: Client,
    token: String,
    option_exchange: String,
    min_interval: Duration,
    next_slot: Mutex<Instant>,
    request_count: AtomicU64,
}

impl XigniteClient {
    /// Create a new client.
    pub fn new(token: String, settings: &XigniteSettings) -> Result<Self, XigniteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            token,
            option_exchange: settings.option_exchange.clone(),
            min_interval: Duration::from_millis(settings.min_request_interval_ms),
            next_slot: Mutex::new(Instant::now()),
            request_count: AtomicU64::new(0),
        })
    }

    /// Get request count for monitoring.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Reserve the next request slot and wait for it.
    async fn pace(&self) {
        let wait = {
            let mut next = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let slot = (*next).max(now);
            *next = slot + self.min_interval;
            slot - now
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    /// Paced GET helper that appends the token and decodes JSON.
    async fn request<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<T, XigniteError> {
        self.pace().await;

        let mut all_params: Vec<(&str, &str)> = params.to_vec();
        all_params.push(("_token", self.token.as_str()));

        let response = self.client.get(url).query(&all_params).send().await?;
        self.request_count.fetch_add(1, Ordering::Relaxed);

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(XigniteError::RateLimitExceeded);
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(XigniteError::ApiError(format!("{}: {}", status, text)));
        }

        response.json().await.map_err(|e| {
            XigniteError::InvalidResponse(format!("Failed to parse response: {}", e))
        })
    }

    /// List option underlyings for an exchange.
    pub async fn list_underlying_symbols(&self, exchange: &str) -> Result<Vec<String>, XigniteError> {
        let url = format!("{}/ListUnderlyingSymbols", OPTIONS_URL);
        let response: SymbolListResponse = self.request(&url, &[("Exchange", exchange)]).await?;

        if response.outcome != "Success" {
            return Err(XigniteError::ApiError(format!(
                "listing {} returned {}: {}",
                exchange,
                response.outcome,
                response.message.unwrap_or_default()
            )));
        }

        Ok(response
            .underlying_security_descriptions
            .unwrap_or_default()
            .into_iter()
            .map(|d| d.symbol)
            .collect())
    }

    /// Get every contract of `symbol` expiring in `month`/`year`.
    pub async fn get_equity_option_chain(
        &self,
        symbol: &str,
        month: u32,
        year: i32,
    ) -> Result<Vec<OptionQuote>, XigniteError> {
        let url = format!("{}/GetEquityOptionChain", OPTIONS_URL);
        let month = month.to_string();
        let year = year.to_string();
        let params = [
            ("IdentifierType", "Symbol"),
            ("Identifier", symbol),
            ("Month", month.as_str()),
            ("Year", year.as_str()),
            ("SymbologyType", ""),
            ("OptionExchange", self.option_exchange.as_str()),
        ];

        let response: ChainResponse = self.request(&url, &params).await?;
        if response.outcome == "RequestError" {
            return Err(XigniteError::ApiError(format!(
                "chain request for {} rejected: {}",
                symbol,
                response.message.unwrap_or_default()
            )));
        }

        let expirations = response.expirations.unwrap_or_default();
        if expirations.is_empty() {
            debug!("No option chain data returned for {}", symbol);
            return Ok(Vec::new());
        }

        chain_quotes(response.quote, expirations, symbol)
    }

    /// Get the next earnings announcement, if any.
    pub async fn get_announcement(&self, symbol: &str) -> Result<Option<EarningsRecord>, XigniteError> {
        let params = [("IdentifierType", "Symbol"), ("Identifier", symbol)];
        let response: AnnouncementResponse = self.request(EARNINGS_URL, &params).await?;

        let Some(security) = response.security else {
            return Ok(None);
        };

        Ok(Some(EarningsRecord {
            symbol: security.symbol,
            earnings_date: response.earnings_date.as_deref().and_then(parse_date),
            timing: response
                .time_type
                .as_deref()
                .map(MarketTiming::from_time_type)
                .unwrap_or_default(),
        }))
    }

    /// Get FactSet fundamentals for one symbol.
    pub async fn get_fundamentals(&self, symbol: &str) -> Result<Option<FundamentalsRecord>, XigniteError> {
        let params = [
            ("IdentifierType", "Symbol"),
            ("Identifiers", symbol),
            ("FundamentalTypes", "MarketCapitalization"),
            ("AsOfDate", ""),
            ("ReportType", "Annual"),
            ("ExcludeRestated", "False"),
            ("UpdatedSince", ""),
        ];
        let response: Vec<FundamentalsResponse> = self.request(FUNDAMENTALS_URL, &params).await?;
        Ok(response.into_iter().next().and_then(FundamentalsResponse::into_record))
    }
}

#[async_trait]
impl TickerUniverse for XigniteClient {
    async fn fetch_tickers(&self, exchange: &str) -> Result<Vec<String>, FetchError> {
        Ok(self.list_underlying_symbols(exchange).await?)
    }
}

#[async_trait]
impl ChainProvider for XigniteClient {
    async fn fetch_chain(
        &self,
        symbol: &str,
        month: u32,
        year: i32,
    ) -> Result<Vec<OptionQuote>, FetchError> {
        Ok(self.get_equity_option_chain(symbol, month, year).await?)
    }
}

#[async_trait]
impl EarningsProvider for XigniteClient {
    async fn fetch_earnings(&self, symbol: &str) -> Result<Option<EarningsRecord>, FetchError> {
        Ok(self.get_announcement(symbol).await?)
    }
}

#[async_trait]
impl FundamentalsProvider for XigniteClient {
    async fn fetch_fundamentals(
        &self,
        symbols: &[String],
    ) -> Result<Vec<FundamentalsRecord>, FetchError> {
        let mut records = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.get_fundamentals(symbol).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!("No fundamentals for {}", symbol),
                Err(e) => warn!("Fundamentals retrieval failed for {}: {}", symbol, e),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 16);
        assert_eq!(parse_date("02/16/2024"), expected);
        assert_eq!(parse_date("2/16/2024"), expected);
        assert_eq!(parse_date("2024-02-16"), expected);
        assert_eq!(parse_date("2/16/2024 12:00:00 AM"), expected);
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_chain_response_decoding() {
        let body = r#"{
            "Outcome": "Success",
            "Quote": {"Last": 101.5},
            "Expirations": [
                {"Calls": [{"BaseSymbol": "XYZ", "StrikePrice": 100, "Bid": 2.1, "Ask": 2.3,
                            "OpenInterest": 420, "ExpirationDate": "2/16/2024"}],
                 "Puts": null}
            ]
        }"#;
        let response: ChainResponse = serde_json::from_str(body).unwrap();
        let spot = Decimal::try_from(response.quote.unwrap().last.unwrap()).unwrap();
        let expirations = response.expirations.unwrap();
        assert!(expirations[0].puts.is_none());

        let contract = &expirations[0].calls.as_ref().unwrap()[0];
        let quote = contract.to_quote(OptionType::Call, spot).unwrap().unwrap();
        assert_eq!(quote.symbol, "XYZ");
        assert_eq!(quote.open_interest, 420);
        assert_eq!(quote.strike, Decimal::from(100));
        assert_eq!(quote.expiration, NaiveDate::from_ymd_opt(2024, 2, 16).unwrap());
    }

    #[test]
    fn test_chain_sides_set_option_type() {
        let body = r#"{
            "Outcome": "Success",
            "Quote": {"Last": 100},
            "Expirations": [
                {"Calls": [{"BaseSymbol": "XYZ", "StrikePrice": 95, "Bid": 5.5, "Ask": 5.7,
                            "OpenInterest": 10, "ExpirationDate": "02/16/2024"}],
                 "Puts": [{"BaseSymbol": "XYZ", "StrikePrice": 105, "Bid": 5.4, "Ask": 5.6,
                           "OpenInterest": 20, "ExpirationDate": "02/16/2024"},
                          {"BaseSymbol": "XYZ", "StrikePrice": 110, "Bid": 10.1, "Ask": 10.4,
                           "ExpirationDate": "02/16/2024"}]},
                {"Calls": null, "Puts": null}
            ]
        }"#;
        let response: ChainResponse = serde_json::from_str(body).unwrap();
        let quotes = chain_quotes(response.quote, response.expirations.unwrap(), "XYZ").unwrap();

        let types: Vec<OptionType> = quotes.iter().map(|q| q.option_type).collect();
        assert_eq!(types, vec![OptionType::Call, OptionType::Put, OptionType::Put]);
        assert!(quotes.iter().all(|q| q.spot == Decimal::from(100)));
        assert_eq!(quotes[2].open_interest, 0);
    }

    #[test]
    fn test_chain_without_last_price_fails() {
        let body = r#"{"Outcome": "Success", "Expirations": [{"Calls": [], "Puts": []}]}"#;
        let response: ChainResponse = serde_json::from_str(body).unwrap();
        assert!(chain_quotes(response.quote, response.expirations.unwrap(), "XYZ").is_err());
    }

    #[test]
    fn test_contract_with_bad_expiration_fails() {
        let contract = RawContract {
            base_symbol: "XYZ".to_string(),
            strike_price: 100.0,
            bid: Some(1.0),
            ask: Some(1.1),
            open_interest: None,
            expiration_date: "someday".to_string(),
        };
        assert!(contract.to_quote(OptionType::Put, Decimal::from(100)).is_err());
    }

    #[test]
    fn test_fundamentals_mapping() {
        let body = r#"[{
            "Outcome": "Success",
            "Company": {"Symbol": "AAPL", "Industry": "Technology", "Sector": "Hardware"},
            "FundamentalsSets": [{"Fundamentals": [{"Value": "2900000"}]}]
        }]"#;
        let response: Vec<FundamentalsResponse> = serde_json::from_str(body).unwrap();
        let record = response.into_iter().next().unwrap().into_record().unwrap();
        assert_eq!(record.sector.as_deref(), Some("Technology"));
        assert_eq!(record.subsector.as_deref(), Some("Hardware"));
        assert_eq!(record.market_cap, Some(2_900_000.0));
    }

    #[test]
    fn test_unsuccessful_fundamentals_dropped() {
        let body = r#"[{"Outcome": "RequestError"}]"#;
        let response: Vec<FundamentalsResponse> = serde_json::from_str(body).unwrap();
        assert!(response.into_iter().next().unwrap().into_record().is_none());
    }
}
