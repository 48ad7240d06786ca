pub mod memory;
pub mod sqlite;

use anyhow::Result;
use shared::types::{ActivityRecord, GuildId, SnapshotKind, Station};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage capability consumed by the notifier, the playback lifecycle and
/// the control API. Backends are only reached through this trait.
///
/// Errors are reserved for real storage failures. Missing rows are `None`.
pub trait ActivityStore: Send {
    /// Insert a station unless one with the same name exists.
    /// Returns true if the station was added.
    fn add_station(&mut self, station: &Station) -> Result<bool>;

    fn get_station(&self, name: &str) -> Result<Option<Station>>;

    fn list_stations(&self) -> Result<Vec<Station>>;

    /// Upsert the binding of `record.guild_id`.
    fn record_activity(&mut self, record: &ActivityRecord) -> Result<()>;

    /// Remove every binding of a guild. Returns how many were removed.
    fn clear_activity(&mut self, guild_id: GuildId) -> Result<usize>;

    fn list_activity(&self) -> Result<Vec<ActivityRecord>>;

    fn get_activity(&self, guild_id: GuildId) -> Result<Option<ActivityRecord>>;

    /// Remove the guild's binding only while it still is `record`.
    /// Returns true if it was removed.
    fn clear_activity_if(&mut self, record: &ActivityRecord) -> Result<bool> {
        match self.get_activity(record.guild_id)? {
            Some(current) if current.same_binding(record) => {
                Ok(self.clear_activity(record.guild_id)? > 0)
            }
            _ => Ok(false),
        }
    }

    /// `record` is still the guild's binding and the guild is not silenced.
    fn is_notifiable(&self, record: &ActivityRecord) -> Result<bool> {
        let bound = self
            .get_activity(record.guild_id)?
            .is_some_and(|current| current.same_binding(record));
        Ok(bound && !self.is_silenced(record.guild_id)?)
    }

    fn get_snapshot(&self, kind: SnapshotKind, station: &str) -> Result<Option<String>>;

    /// Store the first value of a snapshot.
    fn set_snapshot(&mut self, kind: SnapshotKind, station: &str, data: &str) -> Result<()>;

    /// Overwrite an existing snapshot value.
    fn update_snapshot(&mut self, kind: SnapshotKind, station: &str, data: &str) -> Result<()>;

    fn clear_snapshot(&mut self, kind: SnapshotKind, station: &str) -> Result<()>;

    fn is_silenced(&self, guild_id: GuildId) -> Result<bool>;

    fn set_silenced(&mut self, guild_id: GuildId) -> Result<()>;

    fn clear_silenced(&mut self, guild_id: GuildId) -> Result<()>;

    /// Record a successful scoreboard fetch for `station`.
    ///
    /// `current` becomes `data`. If the last announced value differs from it,
    /// `last` is advanced too and the value to announce is returned.
    fn commit_fetch(&mut self, station: &str, data: &str) -> Result<Option<String>> {
        match self.get_snapshot(SnapshotKind::Current, station)? {
            None => self.set_snapshot(SnapshotKind::Current, station, data)?,
            Some(current) if current != data => {
                self.update_snapshot(SnapshotKind::Current, station, data)?
            }
            Some(_) => {}
        }

        match self.get_snapshot(SnapshotKind::Last, station)? {
            Some(last) if last == data => Ok(None),
            Some(_) => {
                self.update_snapshot(SnapshotKind::Last, station, data)?;
                Ok(Some(data.to_string()))
            }
            None => {
                self.set_snapshot(SnapshotKind::Last, station, data)?;
                Ok(Some(data.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backends() -> Vec<Box<dyn ActivityStore>> {
        vec![
            Box::new(MemoryStore::new()),
            Box::new(SqliteStore::open(":memory:").unwrap()),
        ]
    }

    #[test]
    fn test_commit_fetch_first_value_is_announced() {
        for mut store in backends() {
            let announce = store.commit_fetch("Japan Hits", "a").unwrap();
            assert_eq!(announce.as_deref(), Some("a"));
            assert_eq!(
                store.get_snapshot(SnapshotKind::Current, "Japan Hits").unwrap().as_deref(),
                Some("a")
            );
            assert_eq!(
                store.get_snapshot(SnapshotKind::Last, "Japan Hits").unwrap().as_deref(),
                Some("a")
            );
        }
    }

    #[test]
    fn test_commit_fetch_same_value_is_silent() {
        for mut store in backends() {
            store.commit_fetch("Japan Hits", "a").unwrap();
            let announce = store.commit_fetch("Japan Hits", "a").unwrap();
            assert!(announce.is_none(), "Identical fetch should not announce");
        }
    }

    #[test]
    fn test_commit_fetch_change_advances_last() {
        for mut store in backends() {
            store.commit_fetch("Japan Hits", "a").unwrap();
            let announce = store.commit_fetch("Japan Hits", "b").unwrap();
            assert_eq!(announce.as_deref(), Some("b"));
            assert_eq!(
                store.get_snapshot(SnapshotKind::Last, "Japan Hits").unwrap().as_deref(),
                Some("b")
            );
        }
    }

    #[test]
    fn test_commit_fetch_compares_against_last_announced() {
        for mut store in backends() {
            store.commit_fetch("Japan Hits", "a").unwrap();
            // current drifted without an announcement
            store.update_snapshot(SnapshotKind::Current, "Japan Hits", "b").unwrap();

            let announce = store.commit_fetch("Japan Hits", "a").unwrap();
            assert!(announce.is_none(), "Value equal to last announced should stay silent");
            assert_eq!(
                store.get_snapshot(SnapshotKind::Current, "Japan Hits").unwrap().as_deref(),
                Some("a")
            );
        }
    }

    #[test]
    fn test_clear_activity_if_spares_newer_binding() {
        for mut store in backends() {
            let stale = ActivityRecord::new(2, 20, "Japan Hits");
            store.record_activity(&stale).unwrap();
            store.record_activity(&ActivityRecord::new(2, 21, "J-Rock Powerplay")).unwrap();

            assert!(!store.clear_activity_if(&stale).unwrap());
            let current = store.get_activity(2).unwrap().unwrap();
            assert_eq!((current.channel_id, current.station.as_str()), (21, "J-Rock Powerplay"));

            assert!(store.clear_activity_if(&current).unwrap());
            assert!(store.get_activity(2).unwrap().is_none());
        }
    }

    #[test]
    fn test_is_notifiable() {
        for mut store in backends() {
            let record = ActivityRecord::new(1, 10, "Japan Hits");
            assert!(!store.is_notifiable(&record).unwrap(), "Unbound guild");

            store.record_activity(&record).unwrap();
            assert!(store.is_notifiable(&record).unwrap());

            store.set_silenced(1).unwrap();
            assert!(!store.is_notifiable(&record).unwrap(), "Silenced guild");

            store.clear_silenced(1).unwrap();
            store.record_activity(&ActivityRecord::new(1, 10, "J-Rock Powerplay")).unwrap();
            assert!(!store.is_notifiable(&record).unwrap(), "Guild switched station");
        }
    }

    #[test]
    fn test_stations_are_isolated() {
        for mut store in backends() {
            store.commit_fetch("Japan Hits", "a").unwrap();
            assert!(store.get_snapshot(SnapshotKind::Last, "J-Pop Powerplay").unwrap().is_none());
            assert_eq!(
                store.commit_fetch("J-Pop Powerplay", "a").unwrap().as_deref(),
                Some("a")
            );
        }
    }
}
