//! Scoreboard polling and now-playing fan-out.
//!
//! Each round reads the activity roster, fetches the scoreboard of every
//! station somebody is listening to, and announces tracks that differ from
//! the last announced one to every bound channel whose guild is not silenced.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Result;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use shared::protocol::notification_text;
use shared::types::{ActivityRecord, MusicInfo};
use crate::catalog::StationCatalog;
use crate::scoreboard::NowPlayingSource;
use crate::sink::{ChannelSink, Delivery};
use crate::store_manager::StoreHandle;

/// What one poll round did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoundReport {
    /// The previous round was still running, nothing was done
    pub skipped: bool,
    /// Stations with at least one listener
    pub stations: usize,
    /// Stations whose track changed
    pub announced: usize,
    /// Messages delivered
    pub delivered: usize,
    /// Guild bindings dropped because their channel is gone
    pub pruned: usize,
}

pub struct Notifier<F, S> {
    store: StoreHandle,
    catalog: Arc<StationCatalog>,
    source: F,
    sink: S,
    /// Held for the duration of a round
    round: Mutex<()>,
}

impl<F, S> Notifier<F, S>
where
    F: NowPlayingSource,
    S: ChannelSink,
{
    pub fn new(store: StoreHandle, catalog: Arc<StationCatalog>, source: F, sink: S) -> Self {
        Self {
            store,
            catalog,
            source,
            sink,
            round: Mutex::new(()),
        }
    }

    /// Run one poll round. Returns an error only when the store fails.
    pub async fn poll_round(&self) -> Result<RoundReport> {
        let Ok(_guard) = self.round.try_lock() else {
            tracing::debug!("Previous poll round still running, skipping");
            return Ok(RoundReport { skipped: true, ..Default::default() });
        };

        let mut report = RoundReport::default();
        let roster = self.store.list_activity().await?;
        if roster.is_empty() {
            return Ok(report);
        }

        let stations: BTreeSet<&str> = roster.iter().map(|r| r.station.as_str()).collect();
        report.stations = stations.len();

        // Fetches are independent; everything after them runs station by station
        let fetches = stations.iter().map(|&name| self.fetch(name));
        let results = join_all(fetches).await;

        for (station, info) in results {
            let Some(info) = info else {
                continue;
            };

            let announce = self
                .store
                .commit_fetch(station.to_string(), info.to_string())
                .await?;

            if let Some(data) = announce {
                tracing::info!("{} now playing {} - {}",
                    station,
                    info.artist.as_deref().unwrap_or("?"),
                    info.title.as_deref().unwrap_or("?"),
                );
                report.announced += 1;
                self.fan_out(station, &data, &roster, &mut report).await?;
            }
        }

        tracing::debug!(
            stations = report.stations,
            announced = report.announced,
            delivered = report.delivered,
            pruned = report.pruned,
            "Poll round finished"
        );
        Ok(report)
    }

    async fn fetch<'a>(&self, station: &'a str) -> (&'a str, Option<MusicInfo>) {
        let Some(entry) = self.catalog.get(station) else {
            tracing::warn!("Activity references unknown station {}", station);
            return (station, None);
        };
        (station, self.source.fetch(entry.scoreboard.as_ref()).await)
    }

    async fn fan_out(
        &self,
        station: &str,
        data: &str,
        roster: &[ActivityRecord],
        report: &mut RoundReport,
    ) -> Result<()> {
        let text = notification_text(station, data);

        for record in roster.iter().filter(|r| r.station == station) {
            // The roster predates the fetches; the guild may have moved on
            if !self.store.is_notifiable(record.clone()).await? {
                continue;
            }

            match self.sink.deliver(record.channel_id, &text).await {
                Delivery::Delivered => report.delivered += 1,
                Delivery::ChannelNotFound => {
                    tracing::info!(
                        "Channel {} of guild {} is gone, dropping its radio activity",
                        record.channel_id,
                        record.guild_id
                    );
                    if self.store.clear_activity_if(record.clone()).await? {
                        report.pruned += 1;
                    }
                }
                Delivery::Failed(reason) => {
                    tracing::warn!(
                        "Failed to notify channel {} of guild {}: {}",
                        record.channel_id,
                        record.guild_id,
                        reason
                    );
                }
            }
        }

        Ok(())
    }

    /// Poll every `interval` until cancelled. A round in flight when the
    /// token fires is allowed to finish.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_round().await?;
                }
                _ = cancel.cancelled() => {
                    tracing::info!("Notifier shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex as StdMutex;
    use async_trait::async_trait;
    use shared::types::{
        ChannelId, GuildId, QueryParams, ScoreboardAddress, SnapshotKind, Station, StationAddress,
    };
    use crate::store::MemoryStore;

    const JAPAN_HITS: &str = "Japan Hits";
    const JROCK: &str = "J-Rock Powerplay";

    fn scoreboard_url(station: &str) -> String {
        format!("https://scoreboard.test/{}", station)
    }

    fn station(name: &str) -> Station {
        Station {
            name: name.to_string(),
            stream: StationAddress {
                url: format!("https://stream.test/{}", name),
                params: QueryParams::new(),
            },
            scoreboard: Some(ScoreboardAddress {
                url: scoreboard_url(name),
                params: Some(QueryParams::from([("format".to_string(), "json".to_string())])),
            }),
        }
    }

    fn track(artist: &str, title: &str) -> MusicInfo {
        MusicInfo {
            artist: Some(artist.to_string()),
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    /// Replays scripted responses per scoreboard URL. The last entry repeats.
    #[derive(Clone, Default)]
    struct ScriptedSource {
        script: Arc<StdMutex<HashMap<String, VecDeque<Option<MusicInfo>>>>>,
        calls: Arc<StdMutex<Vec<String>>>,
        delay: Duration,
    }

    impl ScriptedSource {
        fn push(&self, station: &str, info: Option<MusicInfo>) {
            self.script
                .lock()
                .unwrap()
                .entry(scoreboard_url(station))
                .or_default()
                .push_back(info);
        }

        fn calls(&self, station: &str) -> usize {
            let url = scoreboard_url(station);
            self.calls.lock().unwrap().iter().filter(|u| **u == url).count()
        }
    }

    #[async_trait]
    impl NowPlayingSource for ScriptedSource {
        async fn fetch(&self, address: Option<&ScoreboardAddress>) -> Option<MusicInfo> {
            let address = address?;
            address.params.as_ref()?;
            self.calls.lock().unwrap().push(address.url.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let mut script = self.script.lock().unwrap();
            let queue = script.get_mut(&address.url)?;
            if queue.len() > 1 {
                queue.pop_front().flatten()
            } else {
                queue.front().cloned().flatten()
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<StdMutex<Vec<(ChannelId, String)>>>,
        dead: Arc<StdMutex<HashSet<ChannelId>>>,
        flaky: Arc<StdMutex<HashSet<ChannelId>>>,
    }

    impl RecordingSink {
        fn sent_to(&self, channel: ChannelId) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| *c == channel)
                .map(|(_, text)| text.clone())
                .collect()
        }

        fn total(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChannelSink for RecordingSink {
        async fn deliver(&self, channel_id: ChannelId, text: &str) -> Delivery {
            if self.dead.lock().unwrap().contains(&channel_id) {
                return Delivery::ChannelNotFound;
            }
            if self.flaky.lock().unwrap().contains(&channel_id) {
                return Delivery::Failed("rate limited".to_string());
            }
            self.sent.lock().unwrap().push((channel_id, text.to_string()));
            Delivery::Delivered
        }
    }

    struct Harness {
        store: StoreHandle,
        source: ScriptedSource,
        sink: RecordingSink,
        notifier: Arc<Notifier<ScriptedSource, RecordingSink>>,
    }

    fn harness_with(source: ScriptedSource) -> Harness {
        let store = StoreHandle::spawn(Box::new(MemoryStore::new()));
        let mut silent = station("Talk Only");
        silent.scoreboard = None;
        let catalog = Arc::new(StationCatalog::new([station(JAPAN_HITS), station(JROCK), silent]));
        let sink = RecordingSink::default();
        let notifier = Arc::new(Notifier::new(store.clone(), catalog, source.clone(), sink.clone()));
        Harness { store, source, sink, notifier }
    }

    fn harness() -> Harness {
        harness_with(ScriptedSource::default())
    }

    impl Harness {
        async fn listen(&self, guild: GuildId, channel: ChannelId, station: &str) {
            self.store
                .replace_activity(ActivityRecord::new(guild, channel, station))
                .await
                .unwrap();
        }

        async fn snapshot(&self, kind: SnapshotKind, station: &str) -> Option<String> {
            self.store.get_snapshot(kind, station.to_string()).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_first_fetch_is_announced_to_every_listener() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.listen(2, 20, JAPAN_HITS).await;
        h.source.push(JAPAN_HITS, Some(track("X", "Y")));

        let report = h.notifier.poll_round().await.unwrap();

        assert_eq!(report.stations, 1);
        assert_eq!(report.announced, 1);
        assert_eq!(report.delivered, 2);
        let expected = format!("Radio: Japan Hits\n{}", track("X", "Y"));
        assert_eq!(h.sink.sent_to(10), vec![expected.clone()]);
        assert_eq!(h.sink.sent_to(20), vec![expected]);
    }

    #[tokio::test]
    async fn test_unchanged_track_is_announced_once() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.source.push(JAPAN_HITS, Some(track("X", "Y")));

        h.notifier.poll_round().await.unwrap();
        let report = h.notifier.poll_round().await.unwrap();

        assert_eq!(report.announced, 0);
        assert_eq!(h.source.calls(JAPAN_HITS), 2);
        assert_eq!(h.sink.total(), 1, "Identical fetches must not re-announce");
    }

    #[tokio::test]
    async fn test_track_change_notifies_unsilenced_guilds_only() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.listen(2, 20, JAPAN_HITS).await;
        h.store.set_silenced(2).await.unwrap();

        let previous = track("X", "Z").to_string();
        h.store.commit_fetch(JAPAN_HITS.into(), previous).await.unwrap();
        h.source.push(JAPAN_HITS, Some(track("X", "Y")));

        h.notifier.poll_round().await.unwrap();

        let now = track("X", "Y").to_string();
        let sent = h.sink.sent_to(10);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("Radio: Japan Hits\nMusic: X - Y\n"));
        assert!(h.sink.sent_to(20).is_empty());
        assert_eq!(h.snapshot(SnapshotKind::Current, JAPAN_HITS).await, Some(now.clone()));
        assert_eq!(h.snapshot(SnapshotKind::Last, JAPAN_HITS).await, Some(now));
    }

    #[tokio::test]
    async fn test_silenced_guild_never_hears_changes() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.listen(2, 20, JAPAN_HITS).await;
        h.store.set_silenced(2).await.unwrap();
        h.source.push(JAPAN_HITS, Some(track("A", "1")));
        h.source.push(JAPAN_HITS, Some(track("B", "2")));
        h.source.push(JAPAN_HITS, Some(track("C", "3")));

        for _ in 0..3 {
            h.notifier.poll_round().await.unwrap();
        }

        assert_eq!(h.sink.sent_to(10).len(), 3);
        assert!(h.sink.sent_to(20).is_empty());
        // Silencing is not unbinding
        assert_eq!(h.store.list_activity().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_changes_nothing() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.source.push(JAPAN_HITS, Some(track("X", "Y")));
        h.source.push(JAPAN_HITS, None);

        h.notifier.poll_round().await.unwrap();
        let last = h.snapshot(SnapshotKind::Last, JAPAN_HITS).await;
        let current = h.snapshot(SnapshotKind::Current, JAPAN_HITS).await;

        let report = h.notifier.poll_round().await.unwrap();

        assert_eq!(report.announced, 0);
        assert_eq!(h.sink.total(), 1);
        assert_eq!(h.snapshot(SnapshotKind::Last, JAPAN_HITS).await, last);
        assert_eq!(h.snapshot(SnapshotKind::Current, JAPAN_HITS).await, current);
    }

    #[tokio::test]
    async fn test_failed_first_fetch_stores_nothing() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.source.push(JAPAN_HITS, None);

        h.notifier.poll_round().await.unwrap();

        assert!(h.snapshot(SnapshotKind::Last, JAPAN_HITS).await.is_none());
        assert!(h.snapshot(SnapshotKind::Current, JAPAN_HITS).await.is_none());
        assert_eq!(h.sink.total(), 0);
    }

    #[tokio::test]
    async fn test_recovery_only_announces_real_changes() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.source.push(JAPAN_HITS, Some(track("X", "Y")));
        h.source.push(JAPAN_HITS, None);
        h.source.push(JAPAN_HITS, Some(track("X", "Y")));
        h.source.push(JAPAN_HITS, None);
        h.source.push(JAPAN_HITS, Some(track("X", "W")));

        for _ in 0..5 {
            h.notifier.poll_round().await.unwrap();
        }

        let sent = h.sink.sent_to(10);
        assert_eq!(sent.len(), 2);
        assert!(sent[1].contains("Music: X - W"));
    }

    #[tokio::test]
    async fn test_dead_channel_drops_guild_binding() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.listen(2, 20, JAPAN_HITS).await;
        h.sink.dead.lock().unwrap().insert(20);
        h.source.push(JAPAN_HITS, Some(track("A", "1")));
        h.source.push(JAPAN_HITS, Some(track("B", "2")));

        let report = h.notifier.poll_round().await.unwrap();
        assert_eq!(report.pruned, 1);

        let roster = h.store.list_activity().await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].guild_id, 1);

        // Next change reaches the surviving guild without touching guild 2
        h.sink.dead.lock().unwrap().clear();
        let report = h.notifier.poll_round().await.unwrap();
        assert_eq!(report.pruned, 0);
        assert_eq!(report.delivered, 1);
        assert!(h.sink.sent_to(20).is_empty());
        assert_eq!(h.sink.sent_to(10).len(), 2);
    }

    #[tokio::test]
    async fn test_dead_channel_cleanup_spares_rebound_guild() {
        let h = harness_with(ScriptedSource {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        h.listen(2, 20, JAPAN_HITS).await;
        h.sink.dead.lock().unwrap().insert(20);
        h.source.push(JAPAN_HITS, Some(track("A", "1")));

        let (report, _) = tokio::join!(h.notifier.poll_round(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.listen(2, 21, JROCK).await;
        });

        assert_eq!(report.unwrap().pruned, 0);
        let roster = h.store.list_activity().await.unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!((roster[0].channel_id, roster[0].station.as_str()), (21, JROCK));
    }

    #[tokio::test]
    async fn test_guild_stopped_mid_round_is_not_notified() {
        let h = harness_with(ScriptedSource {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        h.listen(1, 10, JAPAN_HITS).await;
        h.listen(2, 20, JAPAN_HITS).await;
        h.source.push(JAPAN_HITS, Some(track("A", "1")));

        let (report, _) = tokio::join!(h.notifier.poll_round(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.store.clear_activity(2).await.unwrap();
        });

        assert_eq!(report.unwrap().delivered, 1);
        assert_eq!(h.sink.sent_to(10).len(), 1);
        assert!(h.sink.sent_to(20).is_empty());
    }

    #[tokio::test]
    async fn test_transient_delivery_failure_keeps_binding() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.sink.flaky.lock().unwrap().insert(10);
        h.source.push(JAPAN_HITS, Some(track("A", "1")));

        let report = h.notifier.poll_round().await.unwrap();

        assert_eq!(report.delivered, 0);
        assert_eq!(report.pruned, 0);
        assert_eq!(h.store.list_activity().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_only_listened_stations_are_fetched() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.listen(2, 20, "Talk Only").await;
        h.source.push(JAPAN_HITS, Some(track("A", "1")));
        h.source.push(JROCK, Some(track("B", "2")));

        let report = h.notifier.poll_round().await.unwrap();

        assert_eq!(report.stations, 2);
        assert_eq!(h.source.calls(JAPAN_HITS), 1);
        assert_eq!(h.source.calls(JROCK), 0);
        assert_eq!(h.source.calls("Talk Only"), 0);
        assert!(h.sink.sent_to(20).is_empty());
    }

    #[tokio::test]
    async fn test_stations_are_processed_independently() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.listen(2, 20, JROCK).await;
        h.listen(3, 30, "Gone Station").await;
        h.sink.dead.lock().unwrap().insert(10);
        h.source.push(JAPAN_HITS, Some(track("A", "1")));
        h.source.push(JROCK, Some(track("B", "2")));

        let report = h.notifier.poll_round().await.unwrap();

        assert_eq!(report.stations, 3);
        assert_eq!(report.announced, 2);
        assert_eq!(h.sink.sent_to(20).len(), 1);
    }

    #[tokio::test]
    async fn test_empty_roster_does_nothing() {
        let h = harness();
        h.source.push(JAPAN_HITS, Some(track("A", "1")));

        let report = h.notifier.poll_round().await.unwrap();

        assert_eq!(report, RoundReport::default());
        assert_eq!(h.source.calls(JAPAN_HITS), 0);
    }

    #[tokio::test]
    async fn test_overlapping_round_is_skipped() {
        let h = harness_with(ScriptedSource {
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        h.listen(1, 10, JAPAN_HITS).await;
        h.source.push(JAPAN_HITS, Some(track("A", "1")));

        let (first, second) = tokio::join!(h.notifier.poll_round(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            h.notifier.poll_round().await
        });

        assert!(!first.unwrap().skipped);
        assert!(second.unwrap().skipped);
        assert_eq!(h.sink.total(), 1);
    }

    #[tokio::test]
    async fn test_run_polls_until_cancelled() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.source.push(JAPAN_HITS, Some(track("A", "1")));

        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let notifier = h.notifier.clone();
            let cancel = cancel.clone();
            async move { notifier.run(Duration::from_millis(20), cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert!(h.source.calls(JAPAN_HITS) >= 2);
        assert_eq!(h.sink.total(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let h = harness();
        h.listen(1, 10, JAPAN_HITS).await;
        h.store.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(h.notifier.poll_round().await.is_err());
        let result = h.notifier.run(Duration::from_millis(10), CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
