use std::collections::BTreeMap;
use anyhow::Result;
use shared::types::Station;
use crate::store_manager::StoreHandle;

/// Stations known to the daemon, loaded once at startup and shared by `Arc`.
#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    stations: BTreeMap<String, Station>,
}

impl StationCatalog {
    pub fn new(stations: impl IntoIterator<Item = Station>) -> Self {
        Self {
            stations: stations.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    /// Seed `seeds` into the store where missing, then load every stored station.
    pub async fn load(store: &StoreHandle, seeds: &[Station]) -> Result<Self> {
        for station in seeds {
            if store.add_station(station.clone()).await? {
                tracing::info!("Added station {} to catalog", station.name);
            }
        }

        let catalog = Self::new(store.list_stations().await?);
        tracing::info!("Loaded {} stations", catalog.len());
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&Station> {
        self.stations.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
