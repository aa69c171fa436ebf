//! Yahoo Finance client
//!
//! Fundamentals come from `quoteSummary`, which wants a session cookie and
//! a crumb; both are fetched lazily and reused until Yahoo rejects the crumb.

use super::{universe::parse_universe, MarketData, USER_AGENT};
use crate::config::DataConfig;
use crate::error::{ConsultantError, Result};
use crate::types::{FundamentalMetrics, MarketContext, StockSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

const QUOTE_MODULES: &str =
    "price,summaryDetail,defaultKeyStatistics,financialData,assetProfile,balanceSheetHistory";

pub struct YahooClient {
    http: Client,
    base_url: String,
    cookie_url: String,
    /// Cleared when Yahoo rejects it, refetched on the next request
    crumb: RwLock<Option<String>>,
}

impl YahooClient {
    pub fn new(config: &DataConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            http,
            base_url: config.yahoo_url.trim_end_matches('/').to_string(),
            cookie_url: config.yahoo_cookie_url.clone(),
            crumb: RwLock::new(None),
        })
    }

    async fn crumb(&self) -> Result<String> {
        if let Some(crumb) = self.crumb.read().await.as_ref() {
            return Ok(crumb.clone());
        }

        let mut slot = self.crumb.write().await;
        if let Some(crumb) = slot.as_ref() {
            return Ok(crumb.clone());
        }
        let crumb = self.fetch_crumb().await?;
        *slot = Some(crumb.clone());
        Ok(crumb)
    }

    async fn fetch_crumb(&self) -> Result<String> {
        // Only sets the session cookie; the status is usually 404
        let _ = self.http.get(&self.cookie_url).send().await;

        let url = format!("{}/v1/test/getcrumb", self.base_url);
        let crumb = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let crumb = crumb.trim().to_string();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(ConsultantError::collaborator("Yahoo", "could not obtain crumb"));
        }
        debug!("Obtained Yahoo crumb");
        Ok(crumb)
    }

    /// Forget `stale` unless another task already replaced it
    async fn reset_crumb(&self, stale: &str) {
        let mut slot = self.crumb.write().await;
        if slot.as_deref() == Some(stale) {
            *slot = None;
        }
    }
}

#[async_trait]
impl MarketData for YahooClient {
    async fn universe(&self, source_url: &str) -> Result<Vec<String>> {
        let text = self
            .http
            .get(source_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(parse_universe(&text))
    }

    async fn fundamentals(&self, symbol: &str) -> Result<Option<StockSnapshot>> {
        let url = format!("{}/v10/finance/quoteSummary/{}", self.base_url, symbol);

        // A rejected crumb gets one refresh before giving up
        for _ in 0..2 {
            let crumb = self.crumb().await?;
            let resp = self
                .http
                .get(&url)
                .query(&[("modules", QUOTE_MODULES), ("crumb", crumb.as_str())])
                .send()
                .await?;

            match resp.status() {
                StatusCode::NOT_FOUND => {
                    debug!("No Yahoo data for {}", symbol);
                    return Ok(None);
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    debug!("Yahoo rejected the crumb ({}), refreshing", resp.status());
                    self.reset_crumb(&crumb).await;
                }
                _ => {
                    let body: Value = resp.error_for_status()?.json().await?;
                    return Ok(parse_quote_summary(symbol, &body));
                }
            }
        }

        Err(ConsultantError::collaborator(
            "Yahoo",
            format!("quoteSummary for {} still unauthorized after a crumb refresh", symbol),
        ))
    }

    async fn market_context(&self) -> Result<MarketContext> {
        let url = format!("{}/v8/finance/chart/%5EGSPC", self.base_url);
        let body: Value = self
            .http
            .get(&url)
            .query(&[("range", "5d"), ("interval", "1d")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(MarketContext {
            index: MarketContext::SP500.to_string(),
            change_pct_5d: parse_chart_change(&body),
            timestamp: Utc::now(),
        })
    }
}

/// `{"raw": 1.5, "fmt": "1.50"}` or a bare number; zero counts as missing
fn raw_number(value: &Value) -> Option<f64> {
    let n = value.get("raw").unwrap_or(value).as_f64()?;
    (n != 0.0 && n.is_finite()).then_some(n)
}

fn to_decimal(n: f64) -> Option<Decimal> {
    Decimal::try_from(n).ok().map(|d| d.round_dp(4).normalize())
}

fn field(section: &Value, name: &str) -> Option<f64> {
    section.get(name).and_then(raw_number)
}

/// Extract a fundamentals snapshot from a `quoteSummary` response
pub fn parse_quote_summary(symbol: &str, body: &Value) -> Option<StockSnapshot> {
    let result = body.pointer("/quoteSummary/result/0")?;
    let empty = Value::Null;
    let section = |name: &str| result.get(name).unwrap_or(&empty);

    let price_section = section("price");
    let summary = section("summaryDetail");
    let stats = section("defaultKeyStatistics");
    let financial = section("financialData");
    let sheet = result
        .pointer("/balanceSheetHistory/balanceSheetStatements/0")
        .unwrap_or(&empty);

    let price = field(financial, "currentPrice")
        .or_else(|| field(price_section, "regularMarketPrice"))
        .or_else(|| field(summary, "previousClose"));

    let current_ratio = field(financial, "currentRatio").or_else(|| {
        let assets = field(sheet, "totalCurrentAssets")?;
        let liabilities = field(sheet, "totalCurrentLiabilities")?;
        Some(assets / liabilities)
    });

    let total_debt = field(financial, "totalDebt").or_else(|| {
        let long = sheet.get("longTermDebt").and_then(raw_number);
        let short = sheet.get("shortLongTermDebt").and_then(raw_number);
        match (long, short) {
            (None, None) => None,
            (l, s) => Some(l.unwrap_or(0.0) + s.unwrap_or(0.0)),
        }
    });
    let debt_to_assets = match (total_debt, field(sheet, "totalAssets")) {
        (Some(debt), Some(assets)) => Some(debt / assets),
        _ => None,
    };

    let name = ["shortName", "longName"]
        .iter()
        .find_map(|k| price_section.get(*k).and_then(Value::as_str))
        .map(str::to_string);
    let sector = section("assetProfile")
        .get("sector")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(StockSnapshot {
        ticker: symbol.to_string(),
        name,
        sector,
        metrics: FundamentalMetrics {
            price: price.and_then(to_decimal),
            trailing_pe: field(summary, "trailingPE").and_then(to_decimal),
            price_to_book: field(stats, "priceToBook").and_then(to_decimal),
            current_ratio: current_ratio.and_then(to_decimal),
            debt_to_assets: debt_to_assets.and_then(to_decimal),
            market_cap: field(price_section, "marketCap").and_then(to_decimal),
            beta: field(summary, "beta").and_then(to_decimal),
        },
    })
}

/// Percent change between the first and last close in a chart response
pub fn parse_chart_change(body: &Value) -> Option<Decimal> {
    let closes: Vec<f64> = body
        .pointer("/chart/result/0/indicators/quote/0/close")?
        .as_array()?
        .iter()
        .filter_map(Value::as_f64)
        .collect();

    let first = *closes.first()?;
    let last = *closes.last()?;
    if first == 0.0 {
        return None;
    }
    Decimal::try_from((last - first) / first * 100.0)
        .ok()
        .map(|d| d.round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn summary_fixture() -> Value {
        json!({
            "quoteSummary": {
                "result": [{
                    "price": {
                        "regularMarketPrice": {"raw": 41.0, "fmt": "41.00"},
                        "shortName": "Acme Corp",
                        "marketCap": {"raw": 5000000000.0}
                    },
                    "summaryDetail": {
                        "trailingPE": {"raw": 12.5},
                        "previousClose": {"raw": 40.0},
                        "beta": {"raw": 0.75}
                    },
                    "defaultKeyStatistics": {"priceToBook": {"raw": 1.25}},
                    "financialData": {
                        "currentPrice": {"raw": 42.0},
                        "currentRatio": {"raw": 0},
                        "totalDebt": {"raw": 250.0}
                    },
                    "assetProfile": {"sector": "Industrials"},
                    "balanceSheetHistory": {
                        "balanceSheetStatements": [{
                            "totalAssets": {"raw": 1000.0},
                            "totalCurrentAssets": {"raw": 300.0},
                            "totalCurrentLiabilities": {"raw": 150.0}
                        }]
                    }
                }],
                "error": null
            }
        })
    }

    #[test]
    fn test_parse_quote_summary() {
        let snapshot = parse_quote_summary("ACME", &summary_fixture()).unwrap();
        assert_eq!(snapshot.ticker, "ACME");
        assert_eq!(snapshot.name.as_deref(), Some("Acme Corp"));
        assert_eq!(snapshot.sector.as_deref(), Some("Industrials"));

        let m = snapshot.metrics;
        // currentPrice wins over regularMarketPrice
        assert_eq!(m.price, Some(dec!(42)));
        assert_eq!(m.trailing_pe, Some(dec!(12.5)));
        assert_eq!(m.price_to_book, Some(dec!(1.25)));
        // zero currentRatio falls back to the balance sheet
        assert_eq!(m.current_ratio, Some(dec!(2)));
        assert_eq!(m.debt_to_assets, Some(dec!(0.25)));
        assert_eq!(m.beta, Some(dec!(0.75)));
    }

    #[test]
    fn test_parse_quote_summary_debt_from_balance_sheet() {
        let mut body = summary_fixture();
        body["quoteSummary"]["result"][0]["financialData"] = json!({});
        body["quoteSummary"]["result"][0]["balanceSheetHistory"]["balanceSheetStatements"][0]
            ["longTermDebt"] = json!({"raw": 400.0});
        body["quoteSummary"]["result"][0]["balanceSheetHistory"]["balanceSheetStatements"][0]
            ["shortLongTermDebt"] = json!({"raw": 100.0});

        let m = parse_quote_summary("ACME", &body).unwrap().metrics;
        assert_eq!(m.price, Some(dec!(41)));
        assert_eq!(m.debt_to_assets, Some(dec!(0.5)));
    }

    #[test]
    fn test_parse_quote_summary_missing_values() {
        let body = json!({"quoteSummary": {"result": [{"price": {"longName": "Sparse Inc"}}]}});
        let snapshot = parse_quote_summary("SPRS", &body).unwrap();
        assert_eq!(snapshot.name.as_deref(), Some("Sparse Inc"));
        assert_eq!(snapshot.metrics, FundamentalMetrics::default());
    }

    #[test]
    fn test_parse_quote_summary_error_body() {
        let body = json!({"quoteSummary": {"result": null, "error": {"code": "Not Found"}}});
        assert!(parse_quote_summary("NOPE", &body).is_none());
    }

    #[test]
    fn test_parse_chart_change() {
        let body = json!({
            "chart": {"result": [{"indicators": {"quote": [{"close": [100.0, null, 101.0, 102.5]}]}}]}
        });
        assert_eq!(parse_chart_change(&body), Some(dec!(2.5)));
        assert_eq!(parse_chart_change(&json!({"chart": {"result": []}})), None);
    }

    fn mock_config(server: &MockServer) -> DataConfig {
        DataConfig {
            yahoo_url: server.uri(),
            yahoo_cookie_url: format!("{}/cookie", server.uri()),
            ..DataConfig::default()
        }
    }

    async fn mount_crumbs(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/cookie"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(200).set_body_string("crumb-1"))
            .up_to_n_times(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/test/getcrumb"))
            .respond_with(ResponseTemplate::new(200).set_body_string("crumb-2"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_expired_crumb_is_refreshed() {
        let server = MockServer::start().await;
        mount_crumbs(&server).await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/ACME"))
            .and(query_param("crumb", "crumb-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/ACME"))
            .and(query_param("crumb", "crumb-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_fixture()))
            .expect(2)
            .mount(&server)
            .await;

        let client = YahooClient::new(&mock_config(&server)).unwrap();
        let snapshot = client.fundamentals("ACME").await.unwrap().unwrap();
        assert_eq!(snapshot.metrics.price, Some(dec!(42)));

        // the refreshed crumb is kept for later calls
        assert!(client.fundamentals("ACME").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_persistent_rejection_is_not_retryable() {
        let server = MockServer::start().await;
        mount_crumbs(&server).await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/ACME"))
            .respond_with(ResponseTemplate::new(403))
            .expect(2)
            .mount(&server)
            .await;

        let client = YahooClient::new(&mock_config(&server)).unwrap();
        let err = client.fundamentals("ACME").await.unwrap_err();
        assert!(err.is_collaborator());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_none() {
        let server = MockServer::start().await;
        mount_crumbs(&server).await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/NOPE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = YahooClient::new(&mock_config(&server)).unwrap();
        assert!(client.fundamentals("NOPE").await.unwrap().is_none());
    }
}
