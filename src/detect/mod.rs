//! Threat detection from environmental signals.

pub mod engine;
pub mod provider;
pub mod rules;

pub use self::engine::{DetectionLoop, DetectionSettings};
pub use self::provider::{OpenWeatherProvider, SignalProvider, WeatherSample};
