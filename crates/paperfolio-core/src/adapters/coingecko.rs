use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::data_source::{
    GatewayFuture, HealthState, HealthStatus, MarketDataGateway, SeriesRequest, SourceError,
};
use crate::http_client::{
    ApiKey, HttpClient, HttpError, HttpRequest, OfflineHttpClient, ReqwestHttpClient,
};
use crate::throttling::RateBudget;
use crate::{CalendarDate, DateRange, PricePoint, PriceSeries, ProviderId, Symbol};

const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// Live tier: daily USD prices and volumes from CoinGecko's `market_chart/range`.
#[derive(Clone)]
pub struct CoinGeckoAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: Option<ApiKey>,
    base_url: String,
    request_timeout_ms: u64,
    circuit_breaker: Arc<CircuitBreaker>,
    budget: RateBudget,
}

impl Default for CoinGeckoAdapter {
    fn default() -> Self {
        Self {
            http_client: Arc::new(OfflineHttpClient),
            api_key: None,
            base_url: String::from(DEFAULT_BASE_URL),
            request_timeout_ms: 10_000,
            circuit_breaker: Arc::new(CircuitBreaker::default()),
            budget: RateBudget::coingecko_public(),
        }
    }
}

impl CoinGeckoAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: Option<ApiKey>) -> Self {
        Self {
            http_client,
            api_key,
            ..Self::default()
        }
    }

    /// Real HTTP client; the optional demo key comes from
    /// `PAPERFOLIO_COINGECKO_API_KEY` or `COINGECKO_API_KEY`, and
    /// `PAPERFOLIO_COINGECKO_BASE_URL` points at another deployment.
    pub fn from_env() -> Self {
        let api_key = ApiKey::from_env(
            API_KEY_HEADER,
            &["PAPERFOLIO_COINGECKO_API_KEY", "COINGECKO_API_KEY"],
        );
        let adapter = Self::with_http_client(Arc::new(ReqwestHttpClient::new()), api_key);
        match std::env::var("PAPERFOLIO_COINGECKO_BASE_URL") {
            Ok(base_url) if !base_url.trim().is_empty() => adapter.with_base_url(base_url.trim()),
            _ => adapter,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    async fn fetch_market_chart(&self, req: SeriesRequest) -> Result<PriceSeries, SourceError> {
        if let Err(wait) = self.circuit_breaker.admit() {
            return Err(SourceError::unavailable(format!(
                "coingecko circuit breaker is open; retry in {}ms",
                wait.as_millis()
            )));
        }

        if let Err(wait) = self.budget.try_acquire() {
            return Err(SourceError::rate_limited(format!(
                "coingecko request budget exhausted; retry in {}ms",
                wait.as_millis()
            )));
        }

        let body = self.request_chart(&req).await;
        self.circuit_breaker.record(&body);
        parse_market_chart(&req.symbol, req.range, &body?)
    }

    /// Raw `market_chart/range` body for the request's whole days.
    async fn request_chart(&self, req: &SeriesRequest) -> Result<String, SourceError> {
        let endpoint = format!(
            "{}/coins/{}/market_chart/range?vs_currency=usd&from={}&to={}",
            self.base_url,
            urlencoding::encode(coin_id(&req.symbol).as_str()),
            req.range.since().unix_start(),
            req.range.until().unix_start() + 86_399,
        );
        debug!(provider = "coingecko", symbol = %req.symbol, %endpoint, "fetching market chart");

        let request = HttpRequest::json(endpoint, Duration::from_millis(self.request_timeout_ms))
            .with_api_key(self.api_key.as_ref());

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| match error {
                HttpError::Timeout(_) => SourceError::timeout(self.request_timeout_ms),
                other => SourceError::unavailable(format!("coingecko transport error: {other}")),
            })?;

        match response.status {
            429 => {
                warn!(provider = "coingecko", "upstream rate limit hit");
                Err(SourceError::rate_limited(
                    "coingecko returned status 429 (too many requests)",
                ))
            }
            _ if response.is_success() => Ok(response.body),
            status => Err(SourceError::unavailable(format!(
                "coingecko returned status {status}"
            ))),
        }
    }
}

impl MarketDataGateway for CoinGeckoAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Coingecko
    }

    fn fetch_series<'a>(&'a self, req: SeriesRequest) -> GatewayFuture<'a, PriceSeries> {
        Box::pin(self.fetch_market_chart(req))
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move {
            let rate_available = self.budget.has_budget();
            match self.circuit_breaker.state() {
                CircuitState::Closed => HealthStatus::new(HealthState::Healthy, rate_available),
                CircuitState::HalfOpen => HealthStatus::new(HealthState::Degraded, rate_available),
                CircuitState::Open => HealthStatus::new(HealthState::Unhealthy, false),
            }
        })
    }

    fn circuit_state(&self) -> Option<CircuitState> {
        Some(self.circuit_breaker.state())
    }
}

#[derive(Debug, Deserialize)]
struct MarketChartResponse {
    #[serde(default)]
    prices: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    total_volumes: Vec<(f64, Option<f64>)>,
}

/// Collapses intraday samples to one point per UTC day (latest sample wins) and
/// drops anything non-finite, non-positive or outside the requested range.
fn parse_market_chart(
    symbol: &Symbol,
    range: DateRange,
    body: &str,
) -> Result<PriceSeries, SourceError> {
    let chart: MarketChartResponse = serde_json::from_str(body)
        .map_err(|error| SourceError::internal(format!("failed to parse coingecko chart: {error}")))?;

    let prices = daily_last_values(&chart.prices, range, |value| value > 0.0);
    let volumes = daily_last_values(&chart.total_volumes, range, |value| value >= 0.0);

    let mut dropped = 0_usize;
    let mut points = Vec::with_capacity(prices.len());
    for (date, price) in prices {
        let volume = volumes.get(&date).copied().unwrap_or(0.0);
        match PricePoint::new(date, price, volume) {
            Ok(point) => points.push(point),
            Err(_) => dropped += 1,
        }
    }

    if dropped > 0 {
        debug!(provider = "coingecko", %symbol, dropped, "dropped malformed samples");
    }

    if points.is_empty() {
        return Err(SourceError::insufficient_data(1, 0));
    }

    Ok(PriceSeries::new(symbol.clone(), points))
}

fn daily_last_values(
    samples: &[(f64, Option<f64>)],
    range: DateRange,
    accept: impl Fn(f64) -> bool,
) -> BTreeMap<CalendarDate, f64> {
    let mut daily = BTreeMap::new();
    let mut latest_ms: BTreeMap<CalendarDate, f64> = BTreeMap::new();

    for &(timestamp_ms, value) in samples {
        let Some(value) = value.filter(|value| value.is_finite() && accept(*value)) else {
            continue;
        };
        if !timestamp_ms.is_finite() {
            continue;
        }
        let Some(date) = CalendarDate::from_unix_seconds((timestamp_ms / 1_000.0).floor() as i64)
        else {
            continue;
        };
        if !range.contains(date) {
            continue;
        }

        let newer = latest_ms
            .get(&date)
            .map_or(true, |seen| timestamp_ms >= *seen);
        if newer {
            latest_ms.insert(date, timestamp_ms);
            daily.insert(date, value);
        }
    }

    daily
}

/// Maps a ticker to CoinGecko's coin id; unknown tickers fall back to lower case.
pub fn coin_id(symbol: &Symbol) -> String {
    let id = match symbol.as_str() {
        "BTC" | "XBT" => "bitcoin",
        "ETH" => "ethereum",
        "SOL" => "solana",
        "ADA" => "cardano",
        "XRP" => "ripple",
        "DOGE" => "dogecoin",
        "DOT" => "polkadot",
        "AVAX" => "avalanche-2",
        "MATIC" | "POL" => "matic-network",
        "LINK" => "chainlink",
        "LTC" => "litecoin",
        "BNB" => "binancecoin",
        "UNI" => "uniswap",
        "AAVE" => "aave",
        "USDT" => "tether",
        "USDC" => "usd-coin",
        "DAI" => "dai",
        other => return other.to_ascii_lowercase(),
    };
    String::from(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SourceErrorKind;
    use crate::http_client::{HttpFuture, HttpResponse};
    use std::sync::Mutex;
    use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

    #[derive(Debug)]
    struct RecordingHttpClient {
        response: Result<HttpResponse, HttpError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn replying(response: Result<HttpResponse, HttpError>) -> Self {
            Self {
                response,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn request(symbol: &str) -> SeriesRequest {
        SeriesRequest::new(
            Symbol::parse(symbol).expect("valid symbol"),
            DateRange::new(
                CalendarDate::parse("2024-01-01").expect("valid"),
                CalendarDate::parse("2024-01-03").expect("valid"),
            )
            .expect("valid range"),
        )
    }

    const CHART: &str = r#"{
        "prices": [
            [1704067200000, 42000.0],
            [1704110400000, 42500.0],
            [1704153600000, null],
            [1704160800000, 43000.0],
            [1704240000000, -1.0],
            [1704412800000, 44000.0]
        ],
        "market_caps": [],
        "total_volumes": [
            [1704067200000, 1.5e10],
            [1704160800000, 2.0e10]
        ]
    }"#;

    #[test]
    fn builds_range_url_and_parses_daily_points() {
        let client = Arc::new(RecordingHttpClient::replying(Ok(HttpResponse::ok(CHART))));
        let adapter = CoinGeckoAdapter::with_http_client(client.clone(), None);

        let series = block_on(adapter.fetch_series(request("btc"))).expect("series");

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0]
            .url
            .contains("/coins/bitcoin/market_chart/range?vs_currency=usd&from=1704067200&to=1704326399"));

        // Jan 1 keeps its later sample, Jan 2 skips the null, Jan 3 is negative, Jan 5 is out of range.
        assert_eq!(series.len(), 2);
        assert_eq!(series.points[0].price, 42_500.0);
        assert_eq!(series.points[0].volume, 1.5e10);
        assert_eq!(series.points[1].price, 43_000.0);
        assert_eq!(series.points[1].volume, 2.0e10);
    }

    #[test]
    fn demo_key_is_sent_as_header() {
        let client = Arc::new(RecordingHttpClient::replying(Ok(HttpResponse::ok(CHART))));
        let adapter = CoinGeckoAdapter::with_http_client(
            client.clone(),
            Some(ApiKey::new(API_KEY_HEADER, "demo-key")),
        );

        block_on(adapter.fetch_series(request("ETH"))).expect("series");

        let requests = client.recorded_requests();
        assert_eq!(
            requests[0].header(API_KEY_HEADER),
            Some("demo-key")
        );
        assert!(requests[0].url.contains("/coins/ethereum/"));
    }

    #[test]
    fn empty_payload_is_insufficient_data() {
        let client = Arc::new(RecordingHttpClient::replying(Ok(HttpResponse::ok(
            r#"{"prices":[],"total_volumes":[]}"#,
        ))));
        let adapter = CoinGeckoAdapter::with_http_client(client, None);

        let error = block_on(adapter.fetch_series(request("SOL"))).expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::InsufficientData);
    }

    #[test]
    fn status_429_is_rate_limited_without_tripping_breaker() {
        let client = Arc::new(RecordingHttpClient::replying(Ok(HttpResponse {
            status: 429,
            body: String::new(),
        })));
        let adapter = CoinGeckoAdapter::with_http_client(client, None);

        for _ in 0..3 {
            let error = block_on(adapter.fetch_series(request("SOL"))).expect_err("must fail");
            assert_eq!(error.kind(), SourceErrorKind::RateLimited);
        }
        assert_eq!(adapter.circuit_state(), Some(CircuitState::Closed));
    }

    #[test]
    fn transport_timeout_maps_to_timeout_kind() {
        let client = Arc::new(RecordingHttpClient::replying(Err(HttpError::Timeout(
            String::from("deadline elapsed"),
        ))));
        let adapter = CoinGeckoAdapter::with_http_client(client, None)
            .with_request_timeout_ms(750);

        let error = block_on(adapter.fetch_series(request("ADA"))).expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::Timeout);
        assert!(error.message().contains("750ms"));
    }

    #[test]
    fn circuit_breaker_opens_after_repeated_transport_failures() {
        let client = Arc::new(RecordingHttpClient::replying(Err(HttpError::Connect(
            String::from("connection refused"),
        ))));
        let adapter = CoinGeckoAdapter::with_http_client(client.clone(), None);

        for _ in 0..3 {
            let error = block_on(adapter.fetch_series(request("DOT"))).expect_err("must fail");
            assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        }

        let health = block_on(adapter.health());
        assert_eq!(health.state, HealthState::Unhealthy);
        assert!(!health.rate_available);

        let error = block_on(adapter.fetch_series(request("DOT"))).expect_err("breaker blocks");
        assert!(error.message().contains("circuit breaker is open"));
        assert_eq!(client.recorded_requests().len(), 3);
    }

    #[test]
    fn unknown_tickers_use_lowercase_id() {
        assert_eq!(coin_id(&Symbol::parse("PEPE").expect("valid")), "pepe");
        assert_eq!(coin_id(&Symbol::parse("avax").expect("valid")), "avalanche-2");
    }

    fn block_on<F>(future: F) -> F::Output
    where
        F: Future,
    {
        let waker = noop_waker();
        let mut context = Context::from_waker(&waker);
        let mut future = std::pin::pin!(future);

        loop {
            match future.as_mut().poll(&mut context) {
                Poll::Ready(output) => return output,
                Poll::Pending => std::thread::yield_now(),
            }
        }
    }

    fn noop_waker() -> Waker {
        // SAFETY: The vtable functions never dereference the data pointer and are no-op operations.
        unsafe { Waker::from_raw(noop_raw_waker()) }
    }

    fn noop_raw_waker() -> RawWaker {
        RawWaker::new(std::ptr::null(), &NOOP_RAW_WAKER_VTABLE)
    }

    unsafe fn noop_raw_waker_clone(_: *const ()) -> RawWaker {
        noop_raw_waker()
    }

    unsafe fn noop_raw_waker_wake(_: *const ()) {}

    unsafe fn noop_raw_waker_wake_by_ref(_: *const ()) {}

    unsafe fn noop_raw_waker_drop(_: *const ()) {}

    static NOOP_RAW_WAKER_VTABLE: RawWakerVTable = RawWakerVTable::new(
        noop_raw_waker_clone,
        noop_raw_waker_wake,
        noop_raw_waker_wake_by_ref,
        noop_raw_waker_drop,
    );
}
