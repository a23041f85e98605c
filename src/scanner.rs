//! Supervision of the external `bluewalker` BLE scanner
//!
//! The scanner writes advertisement reports as JSON lines to our Unix socket.
//! Its own stdout/stderr carries nothing we parse, so both streams are drained
//! into the debug log.

use {
    crate::error::TrackerError,
    nix::{
        sys::signal::{kill, Signal},
        unistd::Pid,
    },
    std::{path::PathBuf, process::Stdio, time::Duration},
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, BufReader},
        process::{Child, Command},
        task::JoinHandle,
        time::timeout,
    },
};

/// Only forward reports carrying the 0xFD6F service UUID (complete UUID list
/// or service data)
pub const ADDATA_FILTER: &str = "0x03,0x6ffd;0x16,0x6ffd";

/// How long a SIGTERMed scanner gets to exit before it is killed
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

pub struct ScannerProcess {
    executable: PathBuf,
    hci_device: String,
    socket_path: PathBuf,
    stop_grace: Duration,
    child: Option<Child>,
    output_readers: Vec<JoinHandle<()>>,
}

impl ScannerProcess {
    pub fn new(
        executable: impl Into<PathBuf>,
        hci_device: impl Into<String>,
        socket_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executable: executable.into(),
            hci_device: hci_device.into(),
            socket_path: socket_path.into(),
            stop_grace: DEFAULT_STOP_GRACE,
            child: None,
            output_readers: Vec::new(),
        }
    }

    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    /// Command line passed to the scanner
    pub fn args(&self) -> Vec<String> {
        vec![
            "-duration".to_string(),
            "-1".to_string(),
            "-device".to_string(),
            self.hci_device.clone(),
            "-json".to_string(),
            "-unix".to_string(),
            self.socket_path.display().to_string(),
            "-observer".to_string(),
            "-filter-addata".to_string(),
            ADDATA_FILTER.to_string(),
        ]
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Spawn the scanner. No-op if it was already started.
    pub fn start(&mut self) -> Result<(), TrackerError> {
        if self.child.is_some() {
            return Ok(());
        }

        if !self.executable.exists() {
            return Err(TrackerError::ScannerNotFound(self.executable.clone()));
        }

        let mut child = Command::new(&self.executable)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TrackerError::ScannerSpawn {
                path: self.executable.clone(),
                source,
            })?;

        if let Some(stdout) = child.stdout.take() {
            self.output_readers.push(tokio::spawn(drain_output("stdout", stdout)));
        }
        if let Some(stderr) = child.stderr.take() {
            self.output_readers.push(tokio::spawn(drain_output("stderr", stderr)));
        }

        log::info!(
            "Started scanner {} (pid {:?}) on {}",
            self.executable.display(),
            child.id(),
            self.hci_device
        );
        self.child = Some(child);
        Ok(())
    }

    /// Terminate the scanner with SIGTERM and wait for it to exit, killing it
    /// if it is still around after the stop grace period.
    /// No-op if it was never started or was already stopped.
    pub async fn stop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                log::info!("Scanner had already exited with {}", status);
            }
            Ok(None) => {
                terminate(&mut child);
                match timeout(self.stop_grace, child.wait()).await {
                    Ok(Ok(status)) => log::info!("Terminated scanner ({})", status),
                    Ok(Err(e)) => log::warn!("Failed waiting for scanner exit: {}", e),
                    Err(_) => {
                        log::warn!(
                            "Scanner still running {:?} after SIGTERM, killing",
                            self.stop_grace
                        );
                        match child.kill().await {
                            Ok(()) => log::info!("Killed scanner"),
                            Err(e) => log::warn!("Failed to kill scanner: {}", e),
                        }
                    }
                }
            }
            Err(e) => log::warn!("Failed to query scanner status: {}", e),
        }

        for reader in self.output_readers.drain(..) {
            reader.abort();
        }
    }
}

fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };

    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        log::warn!("SIGTERM to scanner pid {} failed ({}), killing", pid, e);
        if let Err(e) = child.start_kill() {
            log::warn!("Failed to kill scanner: {}", e);
        }
    }
}

async fn drain_output<R: AsyncRead + Unpin>(stream: &'static str, output: R) {
    let mut reader = BufReader::new(output);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => log::debug!(
                "scanner {}: {}",
                stream,
                String::from_utf8_lossy(&buf).trim_end()
            ),
            Err(e) => {
                log::warn!("Failed reading scanner {}: {}", stream, e);
                break;
            }
        }
    }

    log::info!("Scanner {} reader stopped", stream);
}
