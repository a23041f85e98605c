use {
    crate::{
        aggregator::Aggregator,
        config::Config,
        decoder::{BeaconEvent, Receiver},
        error::TrackerError,
        scanner::ScannerProcess,
        state::Snapshot,
    },
    tokio::{
        sync::{mpsc, watch},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
};

struct AggregatorHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Wires scanner, socket receiver and aggregator together.
///
/// `start` and `stop` are both idempotent. Snapshots are available through
/// [`Observer::snapshots`] before, during, and after a run.
pub struct Observer {
    config: Config,
    scanner: Option<ScannerProcess>,
    receiver: Option<Receiver>,
    aggregator: Option<AggregatorHandle>,
    snapshot_tx: watch::Sender<Snapshot>,
    snapshot_rx: watch::Receiver<Snapshot>,
}

impl Observer {
    pub fn new(config: Config) -> Self {
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
        Self {
            config,
            scanner: None,
            receiver: None,
            aggregator: None,
            snapshot_tx,
            snapshot_rx,
        }
    }

    /// Receiver for table snapshots; `changed()` fires after every refresh
    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.receiver.is_some()
    }

    /// Start the aggregator, bind the socket, then launch the scanner.
    ///
    /// Binding alone is enough; no scanner connection is awaited. Any failure
    /// tears down what was already started before the error is returned.
    pub async fn start(&mut self) -> Result<(), TrackerError> {
        if self.is_running() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel::<BeaconEvent>(self.config.channel_buffer);

        let shutdown = CancellationToken::new();
        let aggregator = Aggregator::new(self.config.aggregator(), self.snapshot_tx.clone());
        let task = tokio::spawn(aggregator.run(rx, shutdown.clone()));
        self.aggregator = Some(AggregatorHandle { shutdown, task });

        let mut receiver = Receiver::new(&self.config.socket_path, tx);
        if let Err(e) = receiver.listen().await {
            self.stop().await;
            return Err(e);
        }
        self.receiver = Some(receiver);

        if let Some(path) = &self.config.scanner_path {
            let mut scanner =
                ScannerProcess::new(path, &self.config.hci_device, &self.config.socket_path);
            if let Err(e) = scanner.start() {
                self.stop().await;
                return Err(e);
            }
            self.scanner = Some(scanner);
        } else {
            log::info!("Listen-only mode, waiting for an external scanner");
        }

        Ok(())
    }

    /// Graceful teardown: scanner, then socket, then aggregator.
    ///
    /// Each step is skipped if it already happened, so this can be called
    /// any number of times, including after a failed `start`.
    pub async fn stop(&mut self) {
        if let Some(mut scanner) = self.scanner.take() {
            log::info!("Stopping scanner");
            scanner.stop().await;
        }

        if let Some(mut receiver) = self.receiver.take() {
            log::info!("Stopping socket listener");
            receiver.close().await;
        }

        if let Some(aggregator) = self.aggregator.take() {
            log::info!("Cancelling aggregator");
            aggregator.shutdown.cancel();
            if let Err(e) = aggregator.task.await {
                log::warn!("Aggregator task ended abnormally: {}", e);
            }
        }
    }
}
