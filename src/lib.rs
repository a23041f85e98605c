//! Live table of Exposure Notification proximity identifiers seen over BLE.
//!
//! Data flow: `bluewalker` scanner → Unix socket → [`decoder`] → bounded
//! channel → [`aggregator`] (owns the [`state::IdentityTable`]) → watch
//! channel of [`state::Snapshot`]s → [`ui`].

pub mod aggregator;
pub mod config;
pub mod decoder;
pub mod error;
pub mod observer;
pub mod scanner;
pub mod state;
pub mod ui;

pub use {
    aggregator::{Aggregator, AggregatorConfig},
    config::{Config, ConfigError},
    decoder::{BeaconEvent, ProximityId, Receiver},
    error::TrackerError,
    observer::Observer,
    state::{IdentityTable, Snapshot, SnapshotEntry},
};
