use serde::{Deserialize, Serialize};

use crate::{CalendarDate, Symbol, ValidationError};

/// One daily observation: positive price, non-negative volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: CalendarDate,
    pub price: f64,
    pub volume: f64,
}

impl PricePoint {
    pub fn new(date: CalendarDate, price: f64, volume: f64) -> Result<Self, ValidationError> {
        validate_positive("price", price)?;
        validate_non_negative("volume", volume)?;
        Ok(Self {
            date,
            price,
            volume,
        })
    }
}

/// Daily series for one symbol, ascending by date with at most one point per day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: Symbol,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Sorts the points and keeps the last point supplied for each date.
    pub fn new(symbol: Symbol, mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|point| point.date);

        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => deduped.push(point),
            }
        }

        Self {
            symbol,
            points: deduped,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

/// Trust level attached to every published metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Portfolio position supplied by the bookkeeping side.
///
/// `price` is the live price when known, otherwise the average purchase price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HoldingPayload")]
pub struct Holding {
    pub symbol: Symbol,
    pub amount: f64,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Holding {
    pub fn new(
        symbol: Symbol,
        amount: f64,
        price: f64,
        category: Option<String>,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("amount", amount)?;
        validate_non_negative("price", price)?;
        Ok(Self {
            symbol,
            amount,
            price,
            category,
        })
    }

    pub fn value(&self) -> f64 {
        self.amount * self.price
    }
}

#[derive(Deserialize)]
struct HoldingPayload {
    symbol: Symbol,
    amount: f64,
    #[serde(alias = "current_or_average_price", alias = "currentOrAveragePrice")]
    price: f64,
    #[serde(default)]
    category: Option<String>,
}

impl TryFrom<HoldingPayload> for Holding {
    type Error = ValidationError;

    fn try_from(payload: HoldingPayload) -> Result<Self, Self::Error> {
        Self::new(
            payload.symbol,
            payload.amount,
            payload.price,
            payload.category,
        )
    }
}

pub(crate) fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    Ok(())
}

pub fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    validate_finite(field, value)?;
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

pub fn validate_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    validate_finite(field, value)?;
    if value <= 0.0 {
        return Err(ValidationError::NonPositiveValue { field });
    }
    Ok(())
}
