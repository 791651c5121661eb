//! Domain types shared by the data tiers and the analytics.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated asset ticker |
//! | [`CalendarDate`] / [`DateRange`] | Whole UTC days and validated ranges |
//! | [`PricePoint`] / [`PriceSeries`] | Daily price and volume history |
//! | [`Holding`] | Portfolio position for allocation analysis |
//! | [`Confidence`] | Trust level attached to published metrics |
//!
//! Constructors validate their inputs, so a `NaN` or non-positive price never
//! makes it past the provider boundary.

mod date;
mod models;
mod symbol;

pub use date::{CalendarDate, DateRange};
pub use models::{
    validate_non_negative, validate_positive, Confidence, Holding, PricePoint, PriceSeries,
};
pub use symbol::Symbol;
