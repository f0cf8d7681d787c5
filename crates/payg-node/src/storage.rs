//! RocksDB-backed channel ledger.
//!
//! Implements [`ChannelStore`] using column families for channel records,
//! the append-only labor ledger, and metadata. Labor appends write the row
//! and the advanced sequence counter in one [`WriteBatch`].

use std::path::Path;

use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};

use payg_core::channel_store::ChannelStore;
use payg_core::error::PaygError;
use payg_core::types::{Channel, ChannelId, ChannelLabor};

// --- Column family names ---

const CF_CHANNELS: &str = "channels";
const CF_LABOR: &str = "labor";
const CF_METADATA: &str = "metadata";

/// All column family names.
const ALL_CFS: &[&str] = &[CF_CHANNELS, CF_LABOR, CF_METADATA];

// --- Metadata keys ---

/// Sequence number the next labor row will get.
const META_LABOR_SEQ: &[u8] = b"labor_seq";
/// Next block the event feed should be read from.
const META_EVENT_CURSOR: &[u8] = b"event_cursor";

/// RocksDB-backed persistent channel store.
pub struct RocksStore {
    db: DB,
    /// Serializes labor appends so sequence numbers are never reused.
    labor_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all column families if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PaygError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| PaygError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            labor_lock: Mutex::new(()),
        })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), PaygError> {
        self.db
            .flush()
            .map_err(|e| PaygError::Storage(e.to_string()))
    }

    /// Every channel record, in key order.
    pub fn all_channels(&self) -> Result<Vec<Channel>, PaygError> {
        let cf = self.cf_handle(CF_CHANNELS)?;
        self.db
            .iterator_cf(cf, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item.map_err(|e| PaygError::Storage(e.to_string()))?;
                decode(&value)
            })
            .collect()
    }

    fn get_meta_u64(&self, key: &[u8]) -> Result<Option<u64>, PaygError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self
            .db
            .get_cf(cf, key)
            .map_err(|e| PaygError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| PaygError::Storage("invalid metadata value length".into()))?;
                Ok(Some(u64::from_le_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, PaygError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaygError::Storage(format!("missing column family: {name}")))
    }

    /// Encode a labor sequence number as big-endian bytes for ordered iteration.
    fn labor_key(seq: u64) -> [u8; 8] {
        seq.to_be_bytes()
    }
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, PaygError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| PaygError::Storage(e.to_string()))
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, PaygError> {
    bincode::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| PaygError::Storage(e.to_string()))
}

impl ChannelStore for RocksStore {
    fn get_channel(&self, id: &ChannelId) -> Result<Option<Channel>, PaygError> {
        let cf = self.cf_handle(CF_CHANNELS)?;
        self.db
            .get_cf(cf, id.as_str().as_bytes())
            .map_err(|e| PaygError::Storage(e.to_string()))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn put_channel(&self, channel: &Channel) -> Result<(), PaygError> {
        let cf = self.cf_handle(CF_CHANNELS)?;
        self.db
            .put_cf(cf, channel.id.as_str().as_bytes(), encode(channel)?)
            .map_err(|e| PaygError::Storage(e.to_string()))
    }

    fn alive_channels(&self) -> Result<Vec<Channel>, PaygError> {
        Ok(self
            .all_channels()?
            .into_iter()
            .filter(|c| c.status.is_alive())
            .collect())
    }

    fn channel_count(&self) -> Result<usize, PaygError> {
        let cf = self.cf_handle(CF_CHANNELS)?;
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item.map_err(|e| PaygError::Storage(e.to_string()))?;
            count += 1;
        }
        Ok(count)
    }

    fn append_labor(&self, labor: &ChannelLabor) -> Result<u64, PaygError> {
        let _guard = self.labor_lock.lock();
        let seq = self.get_meta_u64(META_LABOR_SEQ)?.unwrap_or(0);

        let cf_labor = self.cf_handle(CF_LABOR)?;
        let cf_meta = self.cf_handle(CF_METADATA)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf_labor, Self::labor_key(seq), encode(labor)?);
        batch.put_cf(cf_meta, META_LABOR_SEQ, (seq + 1).to_le_bytes());
        self.db
            .write(batch)
            .map_err(|e| PaygError::Storage(e.to_string()))?;
        Ok(seq)
    }

    fn labor_for_deployment(&self, deployment_id: &str) -> Result<Vec<ChannelLabor>, PaygError> {
        let cf = self.cf_handle(CF_LABOR)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item.map_err(|e| PaygError::Storage(e.to_string()))?;
            let labor: ChannelLabor = decode(&value)?;
            if labor.deployment_id == deployment_id {
                rows.push(labor);
            }
        }
        Ok(rows)
    }

    fn labor_count(&self) -> Result<u64, PaygError> {
        Ok(self.get_meta_u64(META_LABOR_SEQ)?.unwrap_or(0))
    }

    fn event_cursor(&self) -> Result<Option<u64>, PaygError> {
        self.get_meta_u64(META_EVENT_CURSOR)
    }

    fn set_event_cursor(&self, next_block: u64) -> Result<(), PaygError> {
        let cf = self.cf_handle(CF_METADATA)?;
        self.db
            .put_cf(cf, META_EVENT_CURSOR, next_block.to_le_bytes())
            .map_err(|e| PaygError::Storage(e.to_string()))
    }
}
