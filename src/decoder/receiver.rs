//! Unix socket listener feeding decoded beacon sightings into the aggregator

use {
    super::report::{decode_line, BeaconEvent, SkipReason},
    crate::error::TrackerError,
    std::{io::ErrorKind, path::PathBuf},
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        net::{UnixListener, UnixStream},
        sync::mpsc::{self, error::TrySendError},
        task::{JoinHandle, JoinSet},
    },
    tokio_util::sync::CancellationToken,
};

struct Server {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// Listens on a Unix socket for the scanner's JSON lines.
///
/// Each accepted connection gets its own read task; all of them push into the
/// same bounded channel without ever waiting on it. End-of-stream only ends
/// that connection, so a restarted scanner can connect again.
pub struct Receiver {
    socket_path: PathBuf,
    tx: mpsc::Sender<BeaconEvent>,
    server: Option<Server>,
}

impl Receiver {
    pub fn new(socket_path: impl Into<PathBuf>, tx: mpsc::Sender<BeaconEvent>) -> Self {
        Self {
            socket_path: socket_path.into(),
            tx,
            server: None,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.server.is_some()
    }

    /// Bind the socket and start accepting connections.
    ///
    /// A stale socket file left by a previous run is removed first. Calling
    /// this while already listening is a no-op.
    pub async fn listen(&mut self) -> Result<(), TrackerError> {
        if self.server.is_some() {
            return Ok(());
        }

        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => log::debug!("Removed stale socket {}", self.socket_path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Could not remove stale socket {}: {}",
                self.socket_path.display(),
                e
            ),
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|source| TrackerError::Bind {
            path: self.socket_path.clone(),
            source,
        })?;
        log::info!("Listening for scanner reports on {}", self.socket_path.display());

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, self.tx.clone(), shutdown.clone()));
        self.server = Some(Server { shutdown, task });
        Ok(())
    }

    /// Stop accepting, end all connection tasks, and remove the socket file.
    /// Safe to call when not listening.
    pub async fn close(&mut self) {
        let Some(server) = self.server.take() else {
            return;
        };

        server.shutdown.cancel();
        if let Err(e) = server.task.await {
            log::warn!("Socket listener task ended abnormally: {}", e);
        }

        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != ErrorKind::NotFound {
                log::warn!("Failed to remove socket {}: {}", self.socket_path.display(), e);
            }
        }
        log::info!("Socket listener closed");
    }
}

async fn accept_loop(
    listener: UnixListener,
    tx: mpsc::Sender<BeaconEvent>,
    shutdown: CancellationToken,
) {
    let mut connections = JoinSet::new();
    let mut next_conn_id = 0u64;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    next_conn_id += 1;
                    log::info!("Scanner connected (connection {})", next_conn_id);
                    connections.spawn(read_connection(
                        next_conn_id,
                        stream,
                        tx.clone(),
                        shutdown.child_token(),
                    ));
                }
                Err(e) => log::warn!("Failed to accept scanner connection: {}", e),
            }
        }
    }

    while connections.join_next().await.is_some() {}
}

async fn read_connection(
    conn_id: u64,
    stream: UnixStream,
    tx: mpsc::Sender<BeaconEvent>,
    shutdown: CancellationToken,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(1024);

    loop {
        buf.clear();
        let read = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => {
                log::info!("EOF from scanner connection {}, stopping reader", conn_id);
                break;
            }
            Ok(_) => match std::str::from_utf8(&buf) {
                Ok(line) => handle_line(line, &tx),
                Err(e) => log::warn!("Discarding non UTF-8 line on connection {}: {}", conn_id, e),
            },
            Err(e) => {
                log::warn!("Read error on scanner connection {}: {}", conn_id, e);
                break;
            }
        }
    }
}

/// Decode one line and hand any sighting to the aggregator.
fn handle_line(line: &str, tx: &mpsc::Sender<BeaconEvent>) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    log::trace!("received {}", line);

    let event = match decode_line(line) {
        Ok(event) => event,
        Err(SkipReason::NoBeacon) => {
            log::debug!("Skipping report without exposure notification data");
            return;
        }
        Err(e) => {
            log::warn!("Discarding scanner record: {}", e);
            return;
        }
    };

    log::debug!("Found EN data from {}: {}", event.address, event.proximity_id);

    match tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            log::warn!("Event channel full, dropping sighting of {}", event.proximity_id)
        }
        Err(TrySendError::Closed(_)) => log::debug!("Aggregator gone, dropping sighting"),
    }
}
