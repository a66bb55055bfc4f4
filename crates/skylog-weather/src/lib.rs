//! Weather data for skylog
//!
//! Fetches current conditions from an OpenWeatherMap-style endpoint, keeps the
//! readings in a flat JSON file and fits a linear trend to forecast tomorrow.

pub mod cities;
pub mod forecast;
pub mod history;
pub mod provider;
pub mod store;
pub mod types;
pub mod units;

pub use cities::CityList;
pub use forecast::{forecast_message, predict_next_day, LinearModel, Prediction};
pub use provider::{FetchOutcome, NoDataReason, WeatherProvider};
pub use store::ReadingStore;
pub use types::*;
pub use units::kelvin_to_fahrenheit;
