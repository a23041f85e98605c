//! Advertisement report decoding
//!
//! The scanner writes one JSON record per line to a Unix socket. `report`
//! turns a single line into a [`BeaconEvent`] (or a typed [`SkipReason`]),
//! and `receiver` owns the socket, the connection tasks, and the hand-off to
//! the aggregator channel.

pub mod receiver;
pub mod report;

pub use receiver::Receiver;
pub use report::{
    decode_line, parse_service_data, BeaconEvent, EncryptedMetadata, ProximityId, SkipReason,
};
