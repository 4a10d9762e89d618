//! Environmental-signal providers.

use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::dispatch::{DispatchError, MonitoredLocation};

/// Wind and rainfall readings for one location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherSample {
    /// Wind speed in m/s.
    pub wind_speed_ms: f64,
    /// Rainfall over the last hour in mm.
    pub rain_1h_mm: f64,
}

/// Source of environmental signals, keyed by coordinates.
#[async_trait::async_trait]
pub trait SignalProvider: Send + Sync {
    async fn sample(&self, location: &MonitoredLocation) -> Result<WeatherSample, DispatchError>;
}

/// OpenWeather "current weather" endpoint.
pub struct OpenWeatherProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherProvider {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait::async_trait]
impl SignalProvider for OpenWeatherProvider {
    async fn sample(&self, location: &MonitoredLocation) -> Result<WeatherSample, DispatchError> {
        let lat = location.lat.to_string();
        let lon = location.lon.to_string();
        let body: Value = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("appid", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DispatchError::ProviderUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| DispatchError::ProviderUnavailable(e.to_string()))?;

        parse_current_weather(&body)
    }
}

/// Extract a sample from an OpenWeather response body.
///
/// `cod` may arrive as a number or a string; anything but 200 is a failure.
/// Missing `wind`/`rain` blocks read as zero.
pub fn parse_current_weather(body: &Value) -> Result<WeatherSample, DispatchError> {
    let cod = match &body["cod"] {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    if cod != Some(200) {
        let message = body["message"].as_str().unwrap_or("unexpected response");
        return Err(DispatchError::ProviderUnavailable(format!(
            "status {}: {}",
            body["cod"], message
        )));
    }

    Ok(WeatherSample {
        wind_speed_ms: body["wind"]["speed"].as_f64().unwrap_or(0.0),
        rain_1h_mm: body["rain"]["1h"].as_f64().unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_response() {
        let body = json!({
            "cod": 200,
            "name": "Chennai",
            "wind": { "speed": 20.0, "deg": 90 },
            "rain": { "1h": 12.5 }
        });
        let s = parse_current_weather(&body).unwrap();
        assert_eq!(s.wind_speed_ms, 20.0);
        assert_eq!(s.rain_1h_mm, 12.5);
    }

    #[test]
    fn test_parse_missing_blocks_default_to_zero() {
        let s = parse_current_weather(&json!({ "cod": "200" })).unwrap();
        assert_eq!(s, WeatherSample { wind_speed_ms: 0.0, rain_1h_mm: 0.0 });
    }

    #[test]
    fn test_parse_error_status() {
        let body = json!({ "cod": 401, "message": "Invalid API key" });
        let err = parse_current_weather(&body).unwrap_err();
        match err {
            DispatchError::ProviderUnavailable(msg) => assert!(msg.contains("Invalid API key")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
