use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::PriceSource;
use crate::types::{Interval, PricePoint};

const YAHOO_CHART_API: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) market-regime/0.1";

/// Closing prices from the public Yahoo Finance chart endpoint.
#[derive(Debug, Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
    interval: Interval,
}

impl YahooClient {
    pub fn new(interval: Interval) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: YAHOO_CHART_API.to_string(),
            interval,
        })
    }

    fn chart_url(&self, ticker: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            "{}/{}?period1={}&period2={}&interval={}&events=history&includeAdjustedClose=true",
            self.base_url,
            ticker.replace('^', "%5E"),
            start.timestamp(),
            end.timestamp(),
            self.interval.as_str()
        )
    }
}

#[async_trait]
impl PriceSource for YahooClient {
    async fn fetch_closes(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        info!(
            "Fetching {} closes for {} from {} to {}",
            self.interval,
            ticker,
            start.date_naive(),
            end.date_naive()
        );

        let url = self.chart_url(ticker, start, end);
        debug!("GET {}", url);

        let resp: ChartResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Chart request for {} failed", ticker))?
            .json()
            .await
            .with_context(|| format!("Malformed chart response for {}", ticker))?;

        let points = parse_chart(resp)?;
        info!("Fetched {} closes for {}", points.len(), ticker);
        Ok(points)
    }
}

/// Pairs each timestamp with its adjusted close, falling back to the raw close.
/// Bars without any close (holidays, the unfinished current bar) are skipped.
fn parse_chart(resp: ChartResponse) -> Result<Vec<PricePoint>> {
    if let Some(err) = resp.chart.error {
        return Err(anyhow!("Chart API error {}: {}", err.code, err.description));
    }

    let result = resp
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow!("Chart response has no result"))?;

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();
    let adjusted = result
        .indicators
        .adjclose
        .and_then(|a| a.into_iter().next())
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let mut points = Vec::with_capacity(result.timestamp.len());
    let mut skipped = 0usize;

    for (i, ts) in result.timestamp.iter().enumerate() {
        let close = adjusted
            .get(i)
            .copied()
            .flatten()
            .or_else(|| closes.get(i).copied().flatten());

        let Some(close) = close else {
            skipped += 1;
            continue;
        };

        let timestamp = Utc
            .timestamp_opt(*ts, 0)
            .single()
            .ok_or_else(|| anyhow!("Invalid timestamp {} in chart response", ts))?;
        let price = Decimal::from_f64(close)
            .ok_or_else(|| anyhow!("Invalid close {} at {}", close, timestamp))?
            .round_dp(6);

        points.push(PricePoint::new(timestamp, price));
    }

    if skipped > 0 {
        warn!("Skipped {} bars without a close", skipped);
    }

    Ok(points)
}

// API Response Types
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
    adjclose: Option<Vec<AdjCloseSeries>>,
}

#[derive(Debug, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseSeries {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parse(json: &str) -> Result<Vec<PricePoint>> {
        parse_chart(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_prefers_adjusted_close() {
        let points = parse(
            r#"{"chart":{"result":[{
                "timestamp":[1577059200,1577664000],
                "indicators":{
                    "quote":[{"close":[3221.5,3230.0]}],
                    "adjclose":[{"adjclose":[3221.25,3230.75]}]
                }}],"error":null}}"#,
        )
        .unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].price, dec!(3221.25));
        assert_eq!(points[1].price, dec!(3230.75));
        assert_eq!(points[0].timestamp, Utc.timestamp_opt(1577059200, 0).unwrap());
    }

    #[test]
    fn test_falls_back_to_close_and_skips_gaps() {
        let points = parse(
            r#"{"chart":{"result":[{
                "timestamp":[1577059200,1577664000,1578268800],
                "indicators":{"quote":[{"close":[13.5,null,14.25]}]}
            }],"error":null}}"#,
        )
        .unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].price, dec!(13.5));
        assert_eq!(points[1].price, dec!(14.25));
    }

    #[test]
    fn test_api_error_is_reported() {
        let err = parse(
            r#"{"chart":{"result":null,"error":{
                "code":"Not Found",
                "description":"No data found, symbol may be delisted"}}}"#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("Not Found"));
    }

    #[test]
    fn test_chart_url_encodes_index_symbols() {
        let client = YahooClient::new(Interval::Weekly).unwrap();
        let start = Utc.with_ymd_and_hms(1946, 5, 21, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let url = client.chart_url("^GSPC", start, end);

        assert!(url.contains("/%5EGSPC?"));
        assert!(url.contains("interval=1wk"));
        assert!(url.contains(&format!("period1={}", start.timestamp())));
    }
}
