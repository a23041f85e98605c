use {
    crate::decoder::{BeaconEvent, ProximityId},
    chrono::{DateTime, Utc},
    std::{collections::HashMap, time::Duration},
    tokio::time::Instant,
};

/// Identifiers idle for longer than this are dropped from the table
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// One live proximity identifier
#[derive(Debug, Clone)]
pub struct ProximityRecord {
    pub proximity_id: ProximityId,
    pub address: String,
    pub rssi: i32,
    pub first_seen: Instant,
    pub last_seen: Instant,
    /// Wall-clock time of the first sighting, for display
    pub first_seen_at: DateTime<Utc>,
}

/// What [`IdentityTable::ingest`] did with an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    Updated,
    /// Known id reported from a different address; the new address won
    AddressChanged { previous: String },
}

impl IngestOutcome {
    pub fn is_new(&self) -> bool {
        matches!(self, IngestOutcome::Inserted)
    }
}

/// Row of a [`Snapshot`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub proximity_id: String,
    pub address: String,
    pub rssi: i32,
    pub first_seen_at: DateTime<Utc>,
    /// Seconds between first and most recent sighting
    pub active_secs: u64,
    /// Seconds since the most recent sighting
    pub idle_secs: u64,
}

/// Point-in-time copy of the identity table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub entries: Vec<SnapshotEntry>,
    pub taken_at: DateTime<Utc>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            taken_at: Utc::now(),
        }
    }
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// In-memory table of currently observed proximity identifiers
///
/// Owned by the aggregator task alone. Everyone else gets a [`Snapshot`].
pub struct IdentityTable {
    records: HashMap<ProximityId, ProximityRecord>,
    idle_timeout: Duration,
}

impl IdentityTable {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            records: HashMap::new(),
            idle_timeout,
        }
    }

    /// Apply one sighting
    pub fn ingest(&mut self, event: BeaconEvent, now: Instant) -> IngestOutcome {
        let Some(record) = self.records.get_mut(&event.proximity_id) else {
            log::info!("from {}: Prox ID: {}", event.address, event.proximity_id);
            self.records.insert(
                event.proximity_id,
                ProximityRecord {
                    proximity_id: event.proximity_id,
                    address: event.address,
                    rssi: event.rssi,
                    first_seen: now,
                    last_seen: now,
                    first_seen_at: Utc::now(),
                },
            );
            return IngestOutcome::Inserted;
        };

        record.rssi = event.rssi;
        record.last_seen = record.last_seen.max(now);

        if record.address == event.address {
            return IngestOutcome::Updated;
        }

        // Last writer wins. Could be rotation overlap or a relayed beacon.
        log::warn!(
            "Same proximity id {} sent from two addresses {}, {}",
            event.proximity_id,
            record.address,
            event.address
        );
        let previous = std::mem::replace(&mut record.address, event.address);
        IngestOutcome::AddressChanged { previous }
    }

    /// Drop every record idle for strictly longer than the timeout.
    /// Returns how many were removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.records.len();
        let idle_timeout = self.idle_timeout;
        self.records.retain(|id, record| {
            let keep = now.saturating_duration_since(record.last_seen) <= idle_timeout;
            if !keep {
                log::debug!("Expiring proximity id {}", id);
            }
            keep
        });
        before - self.records.len()
    }

    /// Copy of the table ordered by first sighting
    pub fn snapshot(&self, now: Instant) -> Snapshot {
        let mut records: Vec<&ProximityRecord> = self.records.values().collect();
        records.sort_by(|a, b| {
            a.first_seen
                .cmp(&b.first_seen)
                .then_with(|| a.proximity_id.cmp(&b.proximity_id))
        });

        let entries = records
            .into_iter()
            .map(|r| SnapshotEntry {
                proximity_id: r.proximity_id.to_hex(),
                address: r.address.clone(),
                rssi: r.rssi,
                first_seen_at: r.first_seen_at,
                active_secs: r.last_seen.duration_since(r.first_seen).as_secs(),
                idle_secs: now.saturating_duration_since(r.last_seen).as_secs(),
            })
            .collect();

        Snapshot {
            entries,
            taken_at: Utc::now(),
        }
    }

    pub fn get(&self, id: &ProximityId) -> Option<&ProximityRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for IdentityTable {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::decoder::EncryptedMetadata,
    };

    fn event(address: &str, id: u8, rssi: i32) -> BeaconEvent {
        BeaconEvent {
            address: address.to_string(),
            proximity_id: ProximityId([id; 16]),
            metadata: EncryptedMetadata([0; 4]),
            rssi,
        }
    }

    #[test]
    fn test_first_sighting_inserts_record() {
        let mut table = IdentityTable::default();
        let now = Instant::now();

        let outcome = table.ingest(event("AA:BB:CC:DD:EE:FF", 0, -60), now);
        assert!(outcome.is_new());
        assert_eq!(table.len(), 1);

        let record = table.get(&ProximityId([0; 16])).unwrap();
        assert_eq!(record.address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(record.rssi, -60);
        assert_eq!(record.first_seen, now);
        assert_eq!(record.last_seen, now);

        let snapshot = table.snapshot(now);
        assert_eq!(snapshot.entries[0].proximity_id, "00".repeat(16));
    }

    #[test]
    fn test_address_change_overwrites() {
        let mut table = IdentityTable::default();
        let t0 = Instant::now();
        table.ingest(event("AA:BB:CC:DD:EE:FF", 0, -60), t0);

        let outcome = table.ingest(event("11:22:33:44:55:66", 0, -48), t0 + Duration::from_secs(2));
        assert_eq!(
            outcome,
            IngestOutcome::AddressChanged {
                previous: "AA:BB:CC:DD:EE:FF".to_string()
            }
        );
        assert_eq!(table.len(), 1);

        let record = table.get(&ProximityId([0; 16])).unwrap();
        assert_eq!(record.address, "11:22:33:44:55:66");
        assert_eq!(record.rssi, -48);
        assert_eq!(record.first_seen, t0);
    }

    #[test]
    fn test_last_seen_never_moves_backwards() {
        let mut table = IdentityTable::default();
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(5);

        table.ingest(event("AA:BB:CC:DD:EE:FF", 1, -60), t0);
        assert_eq!(table.ingest(event("AA:BB:CC:DD:EE:FF", 1, -61), later), IngestOutcome::Updated);
        table.ingest(event("AA:BB:CC:DD:EE:FF", 1, -62), t0 + Duration::from_secs(1));

        let record = table.get(&ProximityId([1; 16])).unwrap();
        assert_eq!(record.last_seen, later);
        assert_eq!(record.first_seen, t0);
        assert_eq!(record.rssi, -62);
    }

    #[test]
    fn test_sweep_boundary_is_strict() {
        let mut table = IdentityTable::default();
        let t0 = Instant::now();
        table.ingest(event("AA:BB:CC:DD:EE:FF", 1, -60), t0);

        assert_eq!(table.sweep(t0 + Duration::from_secs(30)), 0);
        assert_eq!(table.len(), 1);

        assert_eq!(table.sweep(t0 + Duration::from_millis(30_001)), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_sweep_after_31_seconds_empties_table() {
        let mut table = IdentityTable::default();
        let t0 = Instant::now();
        table.ingest(event("AA:BB:CC:DD:EE:FF", 0, -60), t0);

        table.sweep(t0 + Duration::from_secs(31));
        assert!(table.is_empty());
        assert!(table.snapshot(t0 + Duration::from_secs(31)).is_empty());
    }

    #[test]
    fn test_sweep_is_idempotent_and_keeps_recent_ids() {
        let mut table = IdentityTable::default();
        let t0 = Instant::now();

        // ids 0..5 seen at t0, ids 5..8 refreshed 20s later
        for id in 0..8u8 {
            table.ingest(event("AA:BB:CC:DD:EE:FF", id, -70), t0);
        }
        for id in 5..8u8 {
            table.ingest(event("AA:BB:CC:DD:EE:FF", id, -70), t0 + Duration::from_secs(20));
        }

        let now = t0 + Duration::from_secs(40);
        table.sweep(now);
        let once = table.snapshot(now);
        table.sweep(now);
        let twice = table.snapshot(now);

        assert_eq!(once.entries, twice.entries);
        assert_eq!(table.len(), 3);
        for id in 5..8u8 {
            assert!(table.get(&ProximityId([id; 16])).is_some());
        }
    }

    #[test]
    fn test_snapshot_is_ordered_copy() {
        let mut table = IdentityTable::default();
        let t0 = Instant::now();
        table.ingest(event("AA:AA:AA:AA:AA:AA", 9, -40), t0);
        table.ingest(event("BB:BB:BB:BB:BB:BB", 3, -50), t0 + Duration::from_secs(1));
        table.ingest(event("AA:AA:AA:AA:AA:AA", 9, -41), t0 + Duration::from_secs(7));

        let snapshot = table.snapshot(t0 + Duration::from_secs(10));
        let ids: Vec<_> = snapshot.entries.iter().map(|e| e.proximity_id.clone()).collect();
        assert_eq!(ids, vec!["09".repeat(16), "03".repeat(16)]);
        assert_eq!(snapshot.entries[0].active_secs, 7);
        assert_eq!(snapshot.entries[0].idle_secs, 3);
        assert_eq!(snapshot.entries[1].idle_secs, 9);

        // Later mutations do not leak into an earlier snapshot
        table.ingest(event("CC:CC:CC:CC:CC:CC", 9, -30), t0 + Duration::from_secs(11));
        assert_eq!(snapshot.entries[0].address, "AA:AA:AA:AA:AA:AA");
        assert_eq!(snapshot.entries[0].rssi, -41);
    }
}
