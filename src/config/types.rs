use crate::engine::Completeness;
use crate::stream::{ProviderSettings, StreamRequest};
use crate::waveform::{ChannelSelector, Nsl, StationSelection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub provider: ProviderConfig,
    pub stream: StreamConfig,
    pub stations: Vec<Nsl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Catalog files describing the available traces
    pub catalogs: Vec<PathBuf>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub channel_selector: ChannelSelector,
    #[serde(default = "default_prefetch_batches")]
    pub prefetch_batches: usize,
    #[serde(default)]
    pub completeness: Completeness,
}

fn default_prefetch_batches() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(with = "humantime_serde")]
    pub window_increment: Duration,
    #[serde(with = "humantime_serde", default)]
    pub window_padding: Duration,
    #[serde(with = "humantime_serde", default)]
    pub min_length: Option<Duration>,
}

impl From<&ProviderConfig> for ProviderSettings {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            start_time: config.start_time,
            end_time: config.end_time,
            channel_selector: config.channel_selector.clone(),
            prefetch_batches: config.prefetch_batches,
            completeness: config.completeness,
        }
    }
}

impl From<&StreamConfig> for StreamRequest {
    fn from(config: &StreamConfig) -> Self {
        Self {
            window_increment: config.window_increment,
            window_padding: config.window_padding,
            start_time: None,
            end_time: None,
            min_length: config.min_length,
        }
    }
}

/// Station list taken from the config file.
#[derive(Debug, Clone)]
pub struct ConfiguredStations(pub Vec<Nsl>);

impl StationSelection for ConfiguredStations {
    fn nsls(&self) -> Vec<Nsl> {
        self.0.clone()
    }
}

impl Config {
    pub fn stations(&self) -> ConfiguredStations {
        ConfiguredStations(self.stations.clone())
    }
}
