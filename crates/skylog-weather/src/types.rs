use chrono::NaiveDateTime;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::units::kelvin_to_fahrenheit;

/// Status code the API reports in `cod` for a successful lookup
pub const STATUS_OK: i64 = 200;

/// `main` block of the API payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainConditions {
    /// Kelvin as received, Fahrenheit once stored
    pub temp: f64,
    /// hPa
    pub pressure: i64,
    /// Percent
    pub humidity: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of the `weather` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Current-weather payload exactly as the API returns it.
///
/// Fields skylog does not interpret are kept in `extra` so a stored reading
/// carries the whole response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherPayload {
    #[serde(deserialize_with = "status_code")]
    pub cod: i64,
    pub name: String,
    pub main: MainConditions,
    #[serde(default)]
    pub weather: Vec<Condition>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WeatherPayload {
    pub fn is_success(&self) -> bool {
        self.cod == STATUS_OK
    }

    /// Convert the temperature to Fahrenheit and stamp the capture time.
    pub fn into_reading(mut self, captured_at: NaiveDateTime) -> Reading {
        self.main.temp = kelvin_to_fahrenheit(self.main.temp);
        Reading {
            payload: self,
            datetime: captured_at,
        }
    }
}

/// A stored observation: the payload (temperature in Fahrenheit) plus its
/// local capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(flatten)]
    pub payload: WeatherPayload,
    /// Local time, ISO-8601 without offset
    pub datetime: NaiveDateTime,
}

impl Reading {
    pub fn city(&self) -> &str {
        &self.payload.name
    }

    /// Temperature in Fahrenheit
    pub fn temperature(&self) -> f64 {
        self.payload.main.temp
    }

    pub fn pressure(&self) -> i64 {
        self.payload.main.pressure
    }

    pub fn humidity(&self) -> i64 {
        self.payload.main.humidity
    }

    pub fn description(&self) -> Option<&str> {
        self.payload.weather.first().map(|c| c.description.as_str())
    }

    pub fn is_success(&self) -> bool {
        self.payload.is_success()
    }
}

/// `cod` is a number on success but the API sends error codes as strings.
fn status_code<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Number(i64),
        Text(String),
    }

    match Code::deserialize(deserializer)? {
        Code::Number(code) => Ok(code),
        Code::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid status code: {text:?}"))),
    }
}


#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use serde_json::json;

    fn api_body() -> Value {
        json!({
            "coord": {"lon": 2.35, "lat": 48.85},
            "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
            "main": {"temp": 293.15, "feels_like": 292.8, "pressure": 1015, "humidity": 55},
            "name": "Paris",
            "cod": 200
        })
    }

    #[test]
    fn test_payload_decodes_api_body() {
        let payload: WeatherPayload = serde_json::from_value(api_body()).unwrap();
        assert!(payload.is_success());
        assert_eq!(payload.name, "Paris");
        assert_eq!(payload.main.pressure, 1015);
        assert_eq!(payload.main.humidity, 55);
        assert_eq!(payload.weather[0].description, "clear sky");
        assert!(payload.extra.contains_key("coord"));
        assert!(payload.main.extra.contains_key("feels_like"));
    }

    #[test]
    fn test_status_code_accepts_string() {
        let mut body = api_body();
        body["cod"] = json!("404");
        let payload: WeatherPayload = serde_json::from_value(body).unwrap();
        assert_eq!(payload.cod, 404);
        assert!(!payload.is_success());
    }

    #[test]
    fn test_status_code_rejects_garbage() {
        let mut body = api_body();
        body["cod"] = json!("ok");
        assert!(serde_json::from_value::<WeatherPayload>(body).is_err());
    }

    #[test]
    fn test_into_reading_converts_to_fahrenheit() {
        let payload: WeatherPayload = serde_json::from_value(api_body()).unwrap();
        let captured = fixtures::at("2024-05-01T12:00:00");
        let reading = payload.into_reading(captured);
        assert!((reading.temperature() - 68.0).abs() < 1e-9);
        assert_eq!(reading.datetime, captured);
        assert_eq!(reading.city(), "Paris");
        assert_eq!(reading.description(), Some("clear sky"));
    }

    #[test]
    fn test_reading_serializes_with_datetime_and_extras() {
        let payload: WeatherPayload = serde_json::from_value(api_body()).unwrap();
        let reading = payload.into_reading(fixtures::at("2024-05-01T12:00:00"));
        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(value["datetime"], "2024-05-01T12:00:00");
        assert_eq!(value["coord"]["lat"], 48.85);
        assert_eq!(value["name"], "Paris");

        let back: Reading = serde_json::from_value(value).unwrap();
        assert_eq!(back, reading);
        assert!(!back.payload.extra.contains_key("datetime"));
    }

    #[test]
    fn test_reading_accepts_fractional_seconds() {
        let mut body = api_body();
        body["datetime"] = json!("2024-05-01T12:34:56.123456");
        let reading: Reading = serde_json::from_value(body).unwrap();
        assert_eq!(
            reading.datetime.format("%H:%M:%S%.6f").to_string(),
            "12:34:56.123456"
        );
    }
}
