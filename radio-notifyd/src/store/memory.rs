use std::collections::{BTreeMap, HashMap, HashSet};
use anyhow::{bail, Result};
use shared::types::{ActivityRecord, GuildId, SnapshotKind, Station};
use super::ActivityStore;

/// Ephemeral backend. State is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stations: BTreeMap<String, Station>,
    activity: BTreeMap<GuildId, ActivityRecord>,
    last: HashMap<String, String>,
    current: HashMap<String, String>,
    silenced: HashSet<GuildId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshots(&self, kind: SnapshotKind) -> &HashMap<String, String> {
        match kind {
            SnapshotKind::Last => &self.last,
            SnapshotKind::Current => &self.current,
        }
    }

    fn snapshots_mut(&mut self, kind: SnapshotKind) -> &mut HashMap<String, String> {
        match kind {
            SnapshotKind::Last => &mut self.last,
            SnapshotKind::Current => &mut self.current,
        }
    }
}

impl ActivityStore for MemoryStore {
    fn add_station(&mut self, station: &Station) -> Result<bool> {
        if self.stations.contains_key(&station.name) {
            return Ok(false);
        }
        self.stations.insert(station.name.clone(), station.clone());
        Ok(true)
    }

    fn get_station(&self, name: &str) -> Result<Option<Station>> {
        Ok(self.stations.get(name).cloned())
    }

    fn list_stations(&self) -> Result<Vec<Station>> {
        Ok(self.stations.values().cloned().collect())
    }

    fn record_activity(&mut self, record: &ActivityRecord) -> Result<()> {
        self.activity.insert(record.guild_id, record.clone());
        Ok(())
    }

    fn clear_activity(&mut self, guild_id: GuildId) -> Result<usize> {
        Ok(self.activity.remove(&guild_id).map_or(0, |_| 1))
    }

    fn list_activity(&self) -> Result<Vec<ActivityRecord>> {
        let mut records: Vec<_> = self.activity.values().cloned().collect();
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.guild_id.cmp(&b.guild_id)));
        Ok(records)
    }

    fn get_activity(&self, guild_id: GuildId) -> Result<Option<ActivityRecord>> {
        Ok(self.activity.get(&guild_id).cloned())
    }

    fn get_snapshot(&self, kind: SnapshotKind, station: &str) -> Result<Option<String>> {
        Ok(self.snapshots(kind).get(station).cloned())
    }

    fn set_snapshot(&mut self, kind: SnapshotKind, station: &str, data: &str) -> Result<()> {
        let snapshots = self.snapshots_mut(kind);
        if snapshots.contains_key(station) {
            bail!("{:?} snapshot for {} already set", kind, station);
        }
        snapshots.insert(station.to_string(), data.to_string());
        Ok(())
    }

    fn update_snapshot(&mut self, kind: SnapshotKind, station: &str, data: &str) -> Result<()> {
        if let Some(value) = self.snapshots_mut(kind).get_mut(station) {
            *value = data.to_string();
        }
        Ok(())
    }

    fn clear_snapshot(&mut self, kind: SnapshotKind, station: &str) -> Result<()> {
        self.snapshots_mut(kind).remove(station);
        Ok(())
    }

    fn is_silenced(&self, guild_id: GuildId) -> Result<bool> {
        Ok(self.silenced.contains(&guild_id))
    }

    fn set_silenced(&mut self, guild_id: GuildId) -> Result<()> {
        self.silenced.insert(guild_id);
        Ok(())
    }

    fn clear_silenced(&mut self, guild_id: GuildId) -> Result<()> {
        self.silenced.remove(&guild_id);
        Ok(())
    }
}
