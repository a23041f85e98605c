use {
    crate::{
        decoder::BeaconEvent,
        state::{IdentityTable, Snapshot, DEFAULT_IDLE_TIMEOUT},
    },
    std::time::Duration,
    tokio::{
        sync::{mpsc, watch},
        time::{interval_at, Instant, MissedTickBehavior},
    },
    tokio_util::sync::CancellationToken,
};

/// Periodic sweep + snapshot interval when no new identifier shows up
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct AggregatorConfig {
    pub refresh_interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Sole owner of the [`IdentityTable`].
///
/// Applies decoder events in arrival order, sweeps idle identifiers, and
/// publishes a fresh [`Snapshot`] on the watch channel after every sweep.
/// The watch change notification is the "table changed" signal for the UI.
pub struct Aggregator {
    table: IdentityTable,
    snapshots: watch::Sender<Snapshot>,
    refresh_interval: Duration,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig, snapshots: watch::Sender<Snapshot>) -> Self {
        Self {
            table: IdentityTable::new(config.idle_timeout),
            snapshots,
            refresh_interval: config.refresh_interval,
        }
    }

    /// Sweep then publish
    fn refresh(&mut self, now: Instant) {
        let removed = self.table.sweep(now);
        if removed > 0 {
            log::debug!("Expired {} proximity ids, {} active", removed, self.table.len());
        }
        self.snapshots.send_replace(self.table.snapshot(now));
    }

    /// Consume events until shutdown or until the decoder side goes away.
    ///
    /// Waits on whichever comes first: the refresh tick or the next event. A
    /// never-seen identifier triggers an immediate refresh and restarts the
    /// tick, so new devices show up without waiting out the interval. Expiry
    /// still follows the idle timeout either way.
    ///
    /// The (empty) table is published once on entry, so a restart replaces
    /// whatever the previous run left on the watch channel.
    pub async fn run(mut self, mut rx: mpsc::Receiver<BeaconEvent>, shutdown: CancellationToken) {
        log::info!("Aggregator task started");
        self.refresh(Instant::now());

        let mut ticker =
            interval_at(Instant::now() + self.refresh_interval, self.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    log::info!("Aggregator received shutdown signal");
                    break;
                }

                _ = ticker.tick() => self.refresh(Instant::now()),

                maybe_event = rx.recv() => match maybe_event {
                    Some(event) => {
                        let now = Instant::now();
                        if self.table.ingest(event, now).is_new() {
                            self.refresh(now);
                            ticker.reset();
                        }
                    }
                    None => {
                        log::info!("Event channel closed");
                        break;
                    }
                },
            }
        }

        log::info!("Aggregator task stopped ({} ids in table)", self.table.len());
    }
}
