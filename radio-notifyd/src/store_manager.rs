use std::thread;
use tokio::sync::{mpsc, oneshot};
use anyhow::Result;
use shared::types::{ActivityRecord, GuildId, SnapshotKind, Station};
use crate::store::ActivityStore;

/// Commands sent to the store thread
pub enum StoreCommand {
    AddStation(Station, oneshot::Sender<Result<bool>>),
    ListStations(oneshot::Sender<Result<Vec<Station>>>),
    /// Clear the guild's binding, then record the new one, in one step
    ReplaceActivity(ActivityRecord, oneshot::Sender<Result<()>>),
    ClearActivity(GuildId, oneshot::Sender<Result<usize>>),
    /// Clear the guild's binding only if it still matches the record
    ClearActivityIf(ActivityRecord, oneshot::Sender<Result<bool>>),
    ListActivity(oneshot::Sender<Result<Vec<ActivityRecord>>>),
    GetSnapshot(SnapshotKind, String, oneshot::Sender<Result<Option<String>>>),
    ClearSnapshot(SnapshotKind, String, oneshot::Sender<Result<()>>),
    CommitFetch {
        station: String,
        data: String,
        reply: oneshot::Sender<Result<Option<String>>>,
    },
    IsSilenced(GuildId, oneshot::Sender<Result<bool>>),
    IsNotifiable(ActivityRecord, oneshot::Sender<Result<bool>>),
    SetSilenced(GuildId, oneshot::Sender<Result<()>>),
    ClearSilenced(GuildId, oneshot::Sender<Result<()>>),
    Shutdown,
}

/// Handle to the store thread.
///
/// The thread owns the backend and runs one command at a time, so every
/// method here is atomic with respect to every other caller.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    /// Spawn a new store thread owning the given backend
    pub fn spawn(mut store: Box<dyn ActivityStore>) -> Self {
        let (tx, mut rx) = mpsc::channel::<StoreCommand>(256);

        thread::spawn(move || {
            while let Some(cmd) = rx.blocking_recv() {
                match cmd {
                    StoreCommand::AddStation(station, reply) => {
                        let _ = reply.send(store.add_station(&station));
                    }
                    StoreCommand::ListStations(reply) => {
                        let _ = reply.send(store.list_stations());
                    }
                    StoreCommand::ReplaceActivity(record, reply) => {
                        let result = store
                            .clear_activity(record.guild_id)
                            .and_then(|_| store.record_activity(&record));
                        let _ = reply.send(result);
                    }
                    StoreCommand::ClearActivity(guild_id, reply) => {
                        let _ = reply.send(store.clear_activity(guild_id));
                    }
                    StoreCommand::ClearActivityIf(record, reply) => {
                        let _ = reply.send(store.clear_activity_if(&record));
                    }
                    StoreCommand::ListActivity(reply) => {
                        let _ = reply.send(store.list_activity());
                    }
                    StoreCommand::GetSnapshot(kind, station, reply) => {
                        let _ = reply.send(store.get_snapshot(kind, &station));
                    }
                    StoreCommand::ClearSnapshot(kind, station, reply) => {
                        let _ = reply.send(store.clear_snapshot(kind, &station));
                    }
                    StoreCommand::CommitFetch { station, data, reply } => {
                        let _ = reply.send(store.commit_fetch(&station, &data));
                    }
                    StoreCommand::IsSilenced(guild_id, reply) => {
                        let _ = reply.send(store.is_silenced(guild_id));
                    }
                    StoreCommand::IsNotifiable(record, reply) => {
                        let _ = reply.send(store.is_notifiable(&record));
                    }
                    StoreCommand::SetSilenced(guild_id, reply) => {
                        let _ = reply.send(store.set_silenced(guild_id));
                    }
                    StoreCommand::ClearSilenced(guild_id, reply) => {
                        let _ = reply.send(store.clear_silenced(guild_id));
                    }
                    StoreCommand::Shutdown => {
                        tracing::info!("Store thread shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx }
    }

    /// Add a station unless the name is taken. Returns true if added.
    pub async fn add_station(&self, station: Station) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::AddStation(station, reply)).await?;
        rx.await?
    }

    pub async fn list_stations(&self) -> Result<Vec<Station>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::ListStations(reply)).await?;
        rx.await?
    }

    /// Drop any prior binding of the guild and record the new one atomically
    pub async fn replace_activity(&self, record: ActivityRecord) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::ReplaceActivity(record, reply)).await?;
        rx.await?
    }

    /// Remove a guild's bindings. Returns how many were removed.
    pub async fn clear_activity(&self, guild_id: GuildId) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::ClearActivity(guild_id, reply)).await?;
        rx.await?
    }

    /// Remove `record`'s guild binding unless the guild has moved on since
    pub async fn clear_activity_if(&self, record: ActivityRecord) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::ClearActivityIf(record, reply)).await?;
        rx.await?
    }

    pub async fn list_activity(&self) -> Result<Vec<ActivityRecord>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::ListActivity(reply)).await?;
        rx.await?
    }

    pub async fn get_snapshot(&self, kind: SnapshotKind, station: String) -> Result<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::GetSnapshot(kind, station, reply)).await?;
        rx.await?
    }

    pub async fn clear_snapshot(&self, kind: SnapshotKind, station: String) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::ClearSnapshot(kind, station, reply)).await?;
        rx.await?
    }

    /// Store a fetched scoreboard value. Returns the text to announce, if any.
    pub async fn commit_fetch(&self, station: String, data: String) -> Result<Option<String>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::CommitFetch { station, data, reply }).await?;
        rx.await?
    }

    pub async fn is_silenced(&self, guild_id: GuildId) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::IsSilenced(guild_id, reply)).await?;
        rx.await?
    }

    /// Whether a message for `record` should still go out
    pub async fn is_notifiable(&self, record: ActivityRecord) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::IsNotifiable(record, reply)).await?;
        rx.await?
    }

    pub async fn set_silenced(&self, guild_id: GuildId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::SetSilenced(guild_id, reply)).await?;
        rx.await?
    }

    pub async fn clear_silenced(&self, guild_id: GuildId) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(StoreCommand::ClearSilenced(guild_id, reply)).await?;
        rx.await?
    }

    /// Shutdown the store thread
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(StoreCommand::Shutdown).await?;
        Ok(())
    }
}
