use std::future::Future;
use std::pin::Pin;

use paperfolio_warehouse::{PriceRecord, Warehouse};
use tracing::debug;

use crate::data_source::{GatewayFuture, HealthStatus, MarketDataGateway, SeriesRequest, SourceError};
use crate::{CalendarDate, PricePoint, PriceSeries, ProviderId, Symbol};

/// Persisted tier: daily history previously stored in the DuckDB warehouse.
#[derive(Clone)]
pub struct WarehouseAdapter {
    warehouse: Warehouse,
}

impl WarehouseAdapter {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }

    async fn load(&self, req: SeriesRequest) -> Result<PriceSeries, SourceError> {
        let warehouse = self.warehouse.clone();
        let symbol = req.symbol.as_str().to_owned();
        let since = req.range.since().format_iso();
        let until = req.range.until().format_iso();

        let records = tokio::task::spawn_blocking(move || {
            warehouse.load_daily_prices(&symbol, &since, &until)
        })
        .await
        .map_err(|error| SourceError::internal(format!("warehouse read task failed: {error}")))?
        .map_err(|error| SourceError::unavailable(format!("warehouse read failed: {error}")))?;

        let total = records.len();
        let points = records_to_points(&records);
        if points.len() < total {
            debug!(
                provider = "warehouse",
                symbol = %req.symbol,
                skipped = total - points.len(),
                "skipped unreadable stored rows"
            );
        }

        if points.is_empty() {
            return Err(SourceError::insufficient_data(1, 0));
        }

        Ok(PriceSeries::new(req.symbol, points))
    }
}

fn records_to_points(records: &[PriceRecord]) -> Vec<PricePoint> {
    records
        .iter()
        .filter_map(|record| {
            let date = CalendarDate::parse(&record.date).ok()?;
            PricePoint::new(date, record.price, record.volume).ok()
        })
        .collect()
}

impl MarketDataGateway for WarehouseAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Warehouse
    }

    fn fetch_series<'a>(&'a self, req: SeriesRequest) -> GatewayFuture<'a, PriceSeries> {
        Box::pin(self.load(req))
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async { HealthStatus::healthy() })
    }
}

/// Rows ready for [`Warehouse::upsert_daily_prices`].
pub fn series_to_records(series: &PriceSeries) -> Vec<PriceRecord> {
    series
        .points
        .iter()
        .map(|point| PriceRecord {
            symbol: series.symbol.as_str().to_owned(),
            date: point.date.format_iso(),
            price: point.price,
            volume: point.volume,
        })
        .collect()
}

/// Builds a record for one stored day; the symbol is normalized first.
pub fn price_record(
    symbol: &Symbol,
    date: CalendarDate,
    price: f64,
    volume: f64,
) -> Result<PriceRecord, crate::ValidationError> {
    let point = PricePoint::new(date, price, volume)?;
    Ok(PriceRecord {
        symbol: symbol.as_str().to_owned(),
        date: point.date.format_iso(),
        price: point.price,
        volume: point.volume,
    })
}
