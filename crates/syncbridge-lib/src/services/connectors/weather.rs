// Weather Connector
// Current conditions from OpenWeatherMap (keyed) or Open-Meteo (keyless),
// normalized into one canonical shape

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{read_json, Connector, ConnectorContext, ConnectorError, ConnectorResult};
use crate::models::{Integration, IntegrationType};

const OPENWEATHERMAP_BASE: &str = "https://api.openweathermap.org";
const OPEN_METEO_BASE: &str = "https://api.open-meteo.com";
const OPEN_METEO_GEOCODING_BASE: &str = "https://geocoding-api.open-meteo.com";

const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Shared condition vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    Snow,
    Thunderstorm,
    Unknown,
}

impl Condition {
    pub fn code(&self) -> &'static str {
        match self {
            Condition::Clear => "clear",
            Condition::PartlyCloudy => "partly_cloudy",
            Condition::Cloudy => "cloudy",
            Condition::Fog => "fog",
            Condition::Drizzle => "drizzle",
            Condition::Rain => "rain",
            Condition::Snow => "snow",
            Condition::Thunderstorm => "thunderstorm",
            Condition::Unknown => "unknown",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Condition::Clear => "clear sky",
            Condition::PartlyCloudy => "partly cloudy",
            Condition::Cloudy => "overcast",
            Condition::Fog => "fog",
            Condition::Drizzle => "drizzle",
            Condition::Rain => "rain",
            Condition::Snow => "snow",
            Condition::Thunderstorm => "thunderstorm",
            Condition::Unknown => "unknown",
        }
    }
}

/// OpenWeatherMap condition ids
fn owm_condition(id: i64) -> Condition {
    match id {
        200..=299 => Condition::Thunderstorm,
        300..=399 => Condition::Drizzle,
        500..=599 => Condition::Rain,
        600..=699 => Condition::Snow,
        700..=799 => Condition::Fog,
        800 => Condition::Clear,
        801 | 802 => Condition::PartlyCloudy,
        803 | 804 => Condition::Cloudy,
        _ => Condition::Unknown,
    }
}

/// WMO weather interpretation codes
fn wmo_condition(code: i64) -> Condition {
    match code {
        0 => Condition::Clear,
        1 | 2 => Condition::PartlyCloudy,
        3 => Condition::Cloudy,
        45 | 48 => Condition::Fog,
        51..=57 => Condition::Drizzle,
        61..=67 | 80..=82 => Condition::Rain,
        71..=77 | 85 | 86 => Condition::Snow,
        95..=99 => Condition::Thunderstorm,
        _ => Condition::Unknown,
    }
}

/// 16-point compass direction for a bearing in degrees
pub fn compass_direction(degrees: f64) -> &'static str {
    let normalized = degrees.rem_euclid(360.0);
    let index = ((normalized / 22.5) + 0.5).floor() as usize % COMPASS_POINTS.len();
    COMPASS_POINTS[index]
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    OpenWeatherMap,
    OpenMeteo,
}

impl Provider {
    fn resolve(integration: &Integration) -> ConnectorResult<Self> {
        let raw = integration
            .config_str("provider")
            .or(integration.provider.as_deref())
            .unwrap_or("open-meteo");
        match raw.to_lowercase().replace('_', "-").as_str() {
            "openweathermap" | "owm" => Ok(Provider::OpenWeatherMap),
            "open-meteo" | "openmeteo" => Ok(Provider::OpenMeteo),
            other => Err(ConnectorError::config(format!(
                "Unsupported weather provider: {}",
                other
            ))),
        }
    }
}

/// Where to look up weather
#[derive(Debug, Clone, PartialEq)]
enum Place {
    Named(String),
    Coordinates { latitude: f64, longitude: f64, label: Option<String> },
}

impl Place {
    fn from_config(integration: &Integration) -> ConnectorResult<Self> {
        let coordinate = |key: &str| integration.config.get(key).and_then(number_like);
        if let (Some(latitude), Some(longitude)) = (coordinate("latitude"), coordinate("longitude")) {
            return Ok(Place::Coordinates {
                latitude,
                longitude,
                label: integration.config_str("location").map(String::from),
            });
        }
        integration
            .config_str("location")
            .map(|l| Place::Named(l.to_string()))
            .ok_or_else(|| ConnectorError::config("location or latitude/longitude is required"))
    }
}

fn number_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Default, Clone)]
pub struct WeatherConnector;

impl WeatherConnector {
    async fn fetch_openweathermap(
        &self,
        integration: &Integration,
        ctx: &ConnectorContext,
        place: &Place,
    ) -> ConnectorResult<Value> {
        let api_key = ctx
            .credential("api_key")
            .ok_or_else(|| ConnectorError::config("openweathermap requires credential 'api_key'"))?;
        let base = integration.config_str("base_url").unwrap_or(OPENWEATHERMAP_BASE);
        let url = format!("{}/data/2.5/weather", base.trim_end_matches('/'));

        let mut query: Vec<(&str, String)> = vec![
            ("appid", api_key.to_string()),
            ("units", "metric".to_string()),
        ];
        match place {
            Place::Named(name) => query.push(("q", name.clone())),
            Place::Coordinates { latitude, longitude, .. } => {
                query.push(("lat", latitude.to_string()));
                query.push(("lon", longitude.to_string()));
            }
        }

        let response = ctx.client.get(&url).query(&query).send().await?;
        let raw = read_json(response).await?;
        normalize_openweathermap(&raw, place)
    }

    async fn fetch_open_meteo(
        &self,
        integration: &Integration,
        ctx: &ConnectorContext,
        place: &Place,
    ) -> ConnectorResult<Value> {
        let (latitude, longitude, label) = match place {
            Place::Coordinates { latitude, longitude, label } => (
                *latitude,
                *longitude,
                label
                    .clone()
                    .unwrap_or_else(|| format!("{:.2}, {:.2}", latitude, longitude)),
            ),
            Place::Named(name) => self.geocode(integration, ctx, name).await?,
        };

        let base = integration.config_str("base_url").unwrap_or(OPEN_METEO_BASE);
        let url = format!("{}/v1/forecast", base.trim_end_matches('/'));
        let query = [
            ("latitude", latitude.to_string()),
            ("longitude", longitude.to_string()),
            (
                "current",
                "temperature_2m,relative_humidity_2m,apparent_temperature,weather_code,wind_speed_10m,wind_direction_10m"
                    .to_string(),
            ),
            ("wind_speed_unit", "kmh".to_string()),
        ];

        let response = ctx.client.get(&url).query(&query).send().await?;
        let raw = read_json(response).await?;
        normalize_open_meteo(&raw, &label)
    }

    async fn geocode(
        &self,
        integration: &Integration,
        ctx: &ConnectorContext,
        name: &str,
    ) -> ConnectorResult<(f64, f64, String)> {
        let base = integration
            .config_str("geocoding_url")
            .unwrap_or(OPEN_METEO_GEOCODING_BASE);
        let url = format!("{}/v1/search", base.trim_end_matches('/'));

        let response = ctx
            .client
            .get(&url)
            .query(&[("name", name), ("count", "1")])
            .send()
            .await?;
        let raw = read_json(response).await?;

        let first = raw
            .get("results")
            .and_then(Value::as_array)
            .and_then(|r| r.first())
            .ok_or_else(|| ConnectorError::config(format!("Unknown location: {}", name)))?;

        let latitude = first.get("latitude").and_then(Value::as_f64);
        let longitude = first.get("longitude").and_then(Value::as_f64);
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Ok((
                lat,
                lon,
                first
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(name)
                    .to_string(),
            )),
            _ => Err(ConnectorError::Parse(
                "Geocoding result has no coordinates".to_string(),
            )),
        }
    }
}

fn normalize_openweathermap(raw: &Value, place: &Place) -> ConnectorResult<Value> {
    let main = raw
        .get("main")
        .ok_or_else(|| ConnectorError::Parse("Missing 'main' in weather response".to_string()))?;
    let condition_id = raw.pointer("/weather/0/id").and_then(Value::as_i64).unwrap_or(-1);
    let condition = owm_condition(condition_id);

    let location = raw
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| match place {
            Place::Named(name) => name.clone(),
            Place::Coordinates { label: Some(label), .. } => label.clone(),
            Place::Coordinates { latitude, longitude, .. } => {
                format!("{:.2}, {:.2}", latitude, longitude)
            }
        });

    Ok(json!({
        "temperatureC": main.get("temp").and_then(Value::as_f64),
        "feelsLikeC": main.get("feels_like").and_then(Value::as_f64),
        "humidity": main.get("humidity").and_then(Value::as_f64),
        // m/s to km/h
        "windSpeedKmh": raw.pointer("/wind/speed").and_then(Value::as_f64).map(|s| round1(s * 3.6)),
        "windDirection": raw.pointer("/wind/deg").and_then(Value::as_f64).map(compass_direction),
        "description": raw
            .pointer("/weather/0/description")
            .and_then(Value::as_str)
            .unwrap_or(condition.description()),
        "conditionCode": condition.code(),
        "location": location,
    }))
}

fn normalize_open_meteo(raw: &Value, label: &str) -> ConnectorResult<Value> {
    let current = raw
        .get("current")
        .ok_or_else(|| ConnectorError::Parse("Missing 'current' in weather response".to_string()))?;
    let condition = current
        .get("weather_code")
        .and_then(Value::as_i64)
        .map(wmo_condition)
        .unwrap_or(Condition::Unknown);

    Ok(json!({
        "temperatureC": current.get("temperature_2m").and_then(Value::as_f64),
        "feelsLikeC": current.get("apparent_temperature").and_then(Value::as_f64),
        "humidity": current.get("relative_humidity_2m").and_then(Value::as_f64),
        "windSpeedKmh": current.get("wind_speed_10m").and_then(Value::as_f64).map(round1),
        "windDirection": current.get("wind_direction_10m").and_then(Value::as_f64).map(compass_direction),
        "description": condition.description(),
        "conditionCode": condition.code(),
        "location": label,
    }))
}

#[async_trait]
impl Connector for WeatherConnector {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Weather
    }

    async fn fetch(&self, integration: &Integration, ctx: &ConnectorContext) -> ConnectorResult<Value> {
        let provider = Provider::resolve(integration)?;
        let place = Place::from_config(integration)?;
        log::debug!(
            "[connector:weather] {:?} lookup for integration {}",
            provider,
            integration.id
        );

        match provider {
            Provider::OpenWeatherMap => self.fetch_openweathermap(integration, ctx, &place).await,
            Provider::OpenMeteo => self.fetch_open_meteo(integration, ctx, &place).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_integration, spawn_fixture, test_context};
    use axum::{extract::Query, routing::get, Json, Router};
    use std::collections::HashMap;

    fn weather_integration(config: Value) -> Integration {
        let mut integration = sample_integration("weather-1");
        integration.integration_type = IntegrationType::Weather;
        integration.config = config;
        integration
    }

    #[test]
    fn test_compass_direction() {
        assert_eq!(compass_direction(0.0), "N");
        assert_eq!(compass_direction(11.0), "N");
        assert_eq!(compass_direction(12.0), "NNE");
        assert_eq!(compass_direction(90.0), "E");
        assert_eq!(compass_direction(225.0), "SW");
        assert_eq!(compass_direction(350.0), "N");
        assert_eq!(compass_direction(-90.0), "W");
    }

    #[test]
    fn test_condition_tables() {
        assert_eq!(owm_condition(211), Condition::Thunderstorm);
        assert_eq!(owm_condition(301), Condition::Drizzle);
        assert_eq!(owm_condition(502), Condition::Rain);
        assert_eq!(owm_condition(601), Condition::Snow);
        assert_eq!(owm_condition(741), Condition::Fog);
        assert_eq!(owm_condition(800), Condition::Clear);
        assert_eq!(owm_condition(802), Condition::PartlyCloudy);
        assert_eq!(owm_condition(804), Condition::Cloudy);
        assert_eq!(owm_condition(42), Condition::Unknown);

        assert_eq!(wmo_condition(0), Condition::Clear);
        assert_eq!(wmo_condition(2), Condition::PartlyCloudy);
        assert_eq!(wmo_condition(48), Condition::Fog);
        assert_eq!(wmo_condition(55), Condition::Drizzle);
        assert_eq!(wmo_condition(81), Condition::Rain);
        assert_eq!(wmo_condition(86), Condition::Snow);
        assert_eq!(wmo_condition(96), Condition::Thunderstorm);
        assert_eq!(wmo_condition(100), Condition::Unknown);
    }

    #[test]
    fn test_place_resolution() {
        let place = Place::from_config(&weather_integration(json!({ "latitude": "52.5", "longitude": 13.4 })))
            .unwrap();
        assert_eq!(
            place,
            Place::Coordinates {
                latitude: 52.5,
                longitude: 13.4,
                label: None
            }
        );
        assert!(Place::from_config(&weather_integration(json!({}))).is_err());
    }

    #[tokio::test]
    async fn test_openweathermap_normalization() {
        let base = spawn_fixture(Router::new().route(
            "/data/2.5/weather",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("appid").map(String::as_str), Some("owm-key"));
                assert_eq!(q.get("units").map(String::as_str), Some("metric"));
                Json(json!({
                    "name": "Berlin",
                    "main": { "temp": 18.5, "feels_like": 17.9, "humidity": 55 },
                    "wind": { "speed": 5.0, "deg": 200 },
                    "weather": [{ "id": 501, "description": "moderate rain" }]
                }))
            }),
        ))
        .await;

        let integration = weather_integration(json!({
            "provider": "openweathermap",
            "location": "Berlin",
            "base_url": base
        }));
        let value = WeatherConnector
            .fetch(&integration, &test_context(Some(json!({ "api_key": "owm-key" }))))
            .await
            .unwrap();

        assert_eq!(value["temperatureC"], 18.5);
        assert_eq!(value["feelsLikeC"], 17.9);
        assert_eq!(value["humidity"], 55.0);
        assert_eq!(value["windSpeedKmh"], 18.0);
        assert_eq!(value["windDirection"], "SSW");
        assert_eq!(value["description"], "moderate rain");
        assert_eq!(value["conditionCode"], "rain");
        assert_eq!(value["location"], "Berlin");
    }

    #[tokio::test]
    async fn test_openweathermap_requires_key() {
        let integration = weather_integration(json!({
            "provider": "openweathermap",
            "location": "Berlin"
        }));
        let err = WeatherConnector
            .fetch(&integration, &test_context(None))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_open_meteo_with_geocoding() {
        let base = spawn_fixture(
            Router::new()
                .route(
                    "/v1/search",
                    get(|Query(q): Query<HashMap<String, String>>| async move {
                        assert_eq!(q.get("name").map(String::as_str), Some("Oslo"));
                        Json(json!({
                            "results": [{ "name": "Oslo", "latitude": 59.91, "longitude": 10.75 }]
                        }))
                    }),
                )
                .route(
                    "/v1/forecast",
                    get(|Query(q): Query<HashMap<String, String>>| async move {
                        assert_eq!(q.get("latitude").map(String::as_str), Some("59.91"));
                        Json(json!({
                            "current": {
                                "temperature_2m": -3.2,
                                "apparent_temperature": -7.0,
                                "relative_humidity_2m": 80,
                                "weather_code": 73,
                                "wind_speed_10m": 14.44,
                                "wind_direction_10m": 45
                            }
                        }))
                    }),
                ),
        )
        .await;

        let integration = weather_integration(json!({
            "location": "Oslo",
            "base_url": base,
            "geocoding_url": base
        }));
        let value = WeatherConnector
            .fetch(&integration, &test_context(None))
            .await
            .unwrap();

        assert_eq!(value["temperatureC"], -3.2);
        assert_eq!(value["windSpeedKmh"], 14.4);
        assert_eq!(value["windDirection"], "NE");
        assert_eq!(value["conditionCode"], "snow");
        assert_eq!(value["description"], "snow");
        assert_eq!(value["location"], "Oslo");
    }

    #[tokio::test]
    async fn test_unknown_location() {
        let base = spawn_fixture(Router::new().route(
            "/v1/search",
            get(|| async { Json(json!({ "generationtime_ms": 0.1 })) }),
        ))
        .await;
        let integration = weather_integration(json!({
            "location": "Atlantis",
            "geocoding_url": base
        }));
        let err = WeatherConnector
            .fetch(&integration, &test_context(None))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration(_)));
    }
}
