use super::{Price, PriceSource, Quote};
use crate::error::{ConfigError, FetchError};
use log::debug;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com";
const USER_AGENT: &str = concat!("Mozilla/5.0 (compatible; drawdown-watch/", env!("CARGO_PKG_VERSION"), ")");

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>, // Last traded price
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    close: Vec<Option<f64>>, // Daily closes, null for bars without trades
}

/// Price source backed by the Yahoo Finance chart endpoint.
pub struct YahooClient {
    client: Client,
    base_url: Url,
}

impl YahooClient {
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        Self::with_base_url(YAHOO_CHART_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| ConfigError::InvalidBaseUrl(base_url.to_string()))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self { client, base_url })
    }

    fn chart_url(&self, ticker: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v8", "finance", "chart", ticker]);
        }
        url.query_pairs_mut()
            .append_pair("range", "5d")
            .append_pair("interval", "1d");
        url
    }
}

impl PriceSource for YahooClient {
    async fn fetch(&self, ticker: &str) -> Quote {
        let url = self.chart_url(ticker);
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Unknown symbols come back as 404 with a chart.error payload.
            if let Ok(parsed) = serde_json::from_str::<ChartResponse>(&body) {
                if let Some(err) = parsed.chart.error {
                    return Err(chart_error(ticker, err));
                }
            }
            return Err(FetchError::Status(status.as_u16()));
        }

        parse_chart(ticker, &body)
    }
}

fn chart_error(ticker: &str, err: ChartError) -> FetchError {
    match err.description {
        Some(description) => {
            FetchError::UnknownTicker(format!("{} ({}: {})", ticker, err.code, description))
        }
        None => FetchError::UnknownTicker(format!("{} ({})", ticker, err.code)),
    }
}

/// Extract the latest price from a chart response body.
///
/// Prefers the live market price and falls back to the most recent daily close.
fn parse_chart(ticker: &str, body: &str) -> Quote {
    let parsed: ChartResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    if let Some(err) = parsed.chart.error {
        return Err(chart_error(ticker, err));
    }

    let result = parsed
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| FetchError::UnknownTicker(ticker.to_string()))?;

    if let Some(price) = result.meta.regular_market_price.and_then(Price::new) {
        return Ok(price);
    }

    result
        .indicators
        .into_iter()
        .flat_map(|indicators| indicators.quote)
        .flat_map(|series| series.close)
        .flatten()
        .filter_map(Price::new)
        .last()
        .ok_or(FetchError::NoPrice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::stub_server::serve_once;

    #[test]
    fn test_parse_market_price() {
        let body = r#"{"chart":{"result":[{"meta":{"currency":"USD","symbol":"AAPL","regularMarketPrice":189.84},
            "timestamp":[1700000000],"indicators":{"quote":[{"close":[188.1]}]}}],"error":null}}"#;
        assert_eq!(parse_chart("AAPL", body).unwrap().value(), 189.84);
    }

    #[test]
    fn test_parse_falls_back_to_last_close() {
        let body = r#"{"chart":{"result":[{"meta":{"symbol":"AAPL"},
            "indicators":{"quote":[{"close":[180.0, 181.5, null]}]}}],"error":null}}"#;
        assert_eq!(parse_chart("AAPL", body).unwrap().value(), 181.5);
    }

    #[test]
    fn test_parse_zero_market_price_uses_close() {
        let body = r#"{"chart":{"result":[{"meta":{"regularMarketPrice":0},
            "indicators":{"quote":[{"close":[42.0]}]}}],"error":null}}"#;
        assert_eq!(parse_chart("X", body).unwrap().value(), 42.0);
    }

    #[test]
    fn test_parse_no_data() {
        let body = r#"{"chart":{"result":[{"meta":{},"indicators":{"quote":[{"close":[null]}]}}],"error":null}}"#;
        assert!(matches!(parse_chart("AAPL", body), Err(FetchError::NoPrice)));
    }

    #[test]
    fn test_parse_chart_error() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        match parse_chart("ZZZZ", body) {
            Err(FetchError::UnknownTicker(msg)) => {
                assert!(msg.contains("ZZZZ"));
                assert!(msg.contains("delisted"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_empty_result() {
        let body = r#"{"chart":{"result":[],"error":null}}"#;
        assert!(matches!(parse_chart("AAPL", body), Err(FetchError::UnknownTicker(_))));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(parse_chart("AAPL", "<html>"), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn test_chart_url() {
        let client = YahooClient::with_base_url("http://localhost:9999/", Duration::from_secs(1)).unwrap();
        let url = client.chart_url("^GSPC");
        assert!(url.as_str().starts_with("http://localhost:9999/v8/finance/chart/"));
        assert!(url.as_str().ends_with("?range=5d&interval=1d"));
        assert!(url.path().ends_with("GSPC"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            YahooClient::with_base_url("not a url", Duration::from_secs(1)),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let base = serve_once(
            "200 OK",
            r#"{"chart":{"result":[{"meta":{"regularMarketPrice":412.5}}],"error":null}}"#,
        )
        .await;
        let client = YahooClient::with_base_url(&base, Duration::from_secs(5)).unwrap();
        assert_eq!(client.fetch("MSFT").await.unwrap().value(), 412.5);
    }

    #[tokio::test]
    async fn test_fetch_not_found_reports_chart_error() {
        let base = serve_once(
            "404 Not Found",
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        )
        .await;
        let client = YahooClient::with_base_url(&base, Duration::from_secs(5)).unwrap();
        match client.fetch("ZZZZ").await {
            Err(FetchError::UnknownTicker(msg)) => assert!(msg.contains("ZZZZ")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_server_error_reports_status() {
        let base = serve_once("503 Service Unavailable", "upstream down").await;
        let client = YahooClient::with_base_url(&base, Duration::from_secs(5)).unwrap();
        assert!(matches!(client.fetch("AAPL").await, Err(FetchError::Status(503))));
    }
}
