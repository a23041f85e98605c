use {
    crate::{
        aggregator::{AggregatorConfig, DEFAULT_REFRESH_INTERVAL},
        state::DEFAULT_IDLE_TIMEOUT,
    },
    std::{env, path::PathBuf, time::Duration},
    thiserror::Error,
};

/// Socket the scanner is told to write to
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/bluewalker.sock";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing value for {0}")]
    MissingValue(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Unknown argument: {0}")]
    UnknownArgument(String),
}

/// Runtime configuration
///
/// Loaded from environment variables (a `.env` file is honoured by the
/// binary), then overridden by command line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Scanner executable, `None` in listen-only mode
    pub scanner_path: Option<PathBuf>,
    pub hci_device: String,
    pub socket_path: PathBuf,
    pub refresh_interval: Duration,
    pub idle_timeout: Duration,
    /// Capacity of the decoder -> aggregator channel
    pub channel_buffer: usize,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scanner_path: Some(PathBuf::from("./bluewalker")),
            hci_device: "hci0".to_string(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            channel_buffer: 1024,
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// - `BLUEWALKER_PATH` (default: ./bluewalker)
    /// - `HCI_DEVICE` (default: hci0)
    /// - `PROXWATCH_SOCKET` (default: /tmp/bluewalker.sock)
    /// - `REFRESH_INTERVAL_SECS` (default: 10)
    /// - `IDLE_TIMEOUT_SECS` (default: 30)
    /// - `EVENT_CHANNEL_BUFFER` (default: 1024)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            scanner_path: env::var("BLUEWALKER_PATH")
                .ok()
                .map(PathBuf::from)
                .or(defaults.scanner_path),
            hci_device: env::var("HCI_DEVICE").unwrap_or(defaults.hci_device),
            socket_path: env::var("PROXWATCH_SOCKET")
                .map(PathBuf::from)
                .unwrap_or(defaults.socket_path),
            refresh_interval: env_parsed("REFRESH_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.refresh_interval),
            idle_timeout: env_parsed("IDLE_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            channel_buffer: env_parsed("EVENT_CHANNEL_BUFFER")?.unwrap_or(defaults.channel_buffer),
            debug: false,
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply command line flags on top of the current values.
    ///
    /// `args` excludes the program name. Supported: `--bluewalker <path>`,
    /// `--hcidev <name>`, `--socket <path>`, `--listen-only`, `--debug`.
    pub fn apply_args<I, S>(mut self, args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--bluewalker" => {
                    self.scanner_path = Some(PathBuf::from(next_value(&mut args, &arg)?));
                }
                "--hcidev" => self.hci_device = next_value(&mut args, &arg)?,
                "--socket" => self.socket_path = PathBuf::from(next_value(&mut args, &arg)?),
                "--listen-only" => self.scanner_path = None,
                "--debug" => self.debug = true,
                _ => return Err(ConfigError::UnknownArgument(arg)),
            }
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "refresh interval must be greater than zero".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "idle timeout must be greater than zero".to_string(),
            ));
        }
        if self.channel_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "event channel buffer must be greater than zero".to_string(),
            ));
        }
        if self.hci_device.is_empty() {
            return Err(ConfigError::InvalidValue("HCI device cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            refresh_interval: self.refresh_interval,
            idle_timeout: self.idle_timeout,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| {
                ConfigError::InvalidValue(format!("{} is not a valid number: {}", name, raw))
            }),
        Err(_) => Ok(None),
    }
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, ConfigError> {
    args.next()
        .filter(|v| !v.starts_with("--"))
        .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
}
