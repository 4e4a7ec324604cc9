//! # Journaled Ledger
//!
//! **Crash-Safe Ledger Store**
//!
//! Every mutation is appended to a journal file before it touches the
//! in-memory ledger. On open, the journal is replayed to rebuild the ledger.
//!
//! ## Guarantees
//!
//! 1. **Write-ahead**: a mutation is visible only after its record is flushed
//! 2. **Atomic compaction**: delete + consolidated write is one record
//! 3. **Recovery**: a torn tail (crash mid-write) is cut off on open
//! 4. **No partial records**: a failed write is cut back before the next append
//! 5. **Bounded size**: every `checkpoint_every` records the journal is rewritten
//!    as one snapshot record per room and renamed over the old file
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "TWJL"]
//! [4 bytes: version]
//!
//! Record format:
//! [8 bytes: LSN (Log Sequence Number)]
//! [1 byte: record kind]
//! [4 bytes: payload length]
//! [N bytes: payload]
//! [4 bytes: CRC32 of above]
//! ```

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use num_bigint::BigInt;
use parking_lot::Mutex;

use crate::error::{EconomyError, EconomyResult};
use crate::formula::ItemId;
use crate::ledger::{Adding, Buying, LedgerStore, MemoryLedger};

/// Magic bytes identifying a journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"TWJL";

/// Current journal format version.
const JOURNAL_VERSION: u32 = 1;

/// Header length in bytes.
const HEADER_LEN: u64 = 8;

/// Records appended between automatic checkpoints.
pub const DEFAULT_CHECKPOINT_EVERY: u64 = 100_000;

/// Journal record kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum RecordKind {
    SetIncrement = 1,
    DeleteThrough = 2,
    Compact = 3,
    AppendPurchase = 4,
    RoomSnapshot = 5,
}

impl RecordKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::SetIncrement),
            2 => Some(Self::DeleteThrough),
            3 => Some(Self::Compact),
            4 => Some(Self::AppendPurchase),
            5 => Some(Self::RoomSnapshot),
            _ => None,
        }
    }
}

/// A ledger mutation as written to disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalEntry {
    /// `set_increment`.
    SetIncrement {
        /// Room name.
        room: String,
        /// Increment time.
        time: i64,
        /// New amount.
        amount: BigInt,
    },
    /// `delete_increments_through`.
    DeleteThrough {
        /// Room name.
        room: String,
        /// Inclusive upper bound.
        through: i64,
    },
    /// `compact_increments`.
    Compact {
        /// Room name.
        room: String,
        /// Inclusive upper bound, and time of the consolidated increment.
        through: i64,
        /// Consolidated amount.
        total: BigInt,
    },
    /// `append_purchase`.
    AppendPurchase {
        /// Room name.
        room: String,
        /// The purchase.
        buying: Buying,
    },
    /// Everything recorded for one room, written by a checkpoint.
    RoomSnapshot {
        /// Room name.
        room: String,
        /// Increments by time.
        increments: Vec<Adding>,
        /// Purchases by time.
        purchases: Vec<Buying>,
    },
}

impl JournalEntry {
    fn kind(&self) -> RecordKind {
        match self {
            Self::SetIncrement { .. } => RecordKind::SetIncrement,
            Self::DeleteThrough { .. } => RecordKind::DeleteThrough,
            Self::Compact { .. } => RecordKind::Compact,
            Self::AppendPurchase { .. } => RecordKind::AppendPurchase,
            Self::RoomSnapshot { .. } => RecordKind::RoomSnapshot,
        }
    }

    /// Serializes the entry payload.
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        match self {
            Self::SetIncrement { room, time, amount } => {
                put_str(&mut buf, room);
                buf.extend_from_slice(&time.to_le_bytes());
                put_bytes(&mut buf, &amount.to_signed_bytes_le());
            }
            Self::DeleteThrough { room, through } => {
                put_str(&mut buf, room);
                buf.extend_from_slice(&through.to_le_bytes());
            }
            Self::Compact { room, through, total } => {
                put_str(&mut buf, room);
                buf.extend_from_slice(&through.to_le_bytes());
                put_bytes(&mut buf, &total.to_signed_bytes_le());
            }
            Self::AppendPurchase { room, buying } => {
                put_str(&mut buf, room);
                put_buying(&mut buf, buying);
            }
            Self::RoomSnapshot { room, increments, purchases } => {
                put_str(&mut buf, room);
                put_len(&mut buf, increments.len());
                for adding in increments {
                    buf.extend_from_slice(&adding.time.to_le_bytes());
                    put_bytes(&mut buf, &adding.amount.to_signed_bytes_le());
                }
                put_len(&mut buf, purchases.len());
                for buying in purchases {
                    put_buying(&mut buf, buying);
                }
            }
        }

        buf
    }

    /// Deserializes an entry payload.
    fn deserialize(kind: RecordKind, data: &[u8]) -> Option<Self> {
        let mut cursor = Cursor { data, pos: 0 };
        let room = cursor.string()?;

        let entry = match kind {
            RecordKind::SetIncrement => {
                let time = cursor.i64()?;
                let amount = BigInt::from_signed_bytes_le(cursor.bytes()?);
                Self::SetIncrement { room, time, amount }
            }
            RecordKind::DeleteThrough => Self::DeleteThrough { room, through: cursor.i64()? },
            RecordKind::Compact => {
                let through = cursor.i64()?;
                let total = BigInt::from_signed_bytes_le(cursor.bytes()?);
                Self::Compact { room, through, total }
            }
            RecordKind::AppendPurchase => Self::AppendPurchase { room, buying: cursor.buying()? },
            RecordKind::RoomSnapshot => {
                let count = cursor.u32()?;
                let mut increments = Vec::new();
                for _ in 0..count {
                    let time = cursor.i64()?;
                    let amount = BigInt::from_signed_bytes_le(cursor.bytes()?);
                    increments.push(Adding { time, amount });
                }
                let count = cursor.u32()?;
                let mut purchases = Vec::new();
                for _ in 0..count {
                    purchases.push(cursor.buying()?);
                }
                Self::RoomSnapshot { room, increments, purchases }
            }
        };

        cursor.is_done().then_some(entry)
    }

    fn apply(self, ledger: &MemoryLedger) -> EconomyResult<()> {
        match self {
            Self::SetIncrement { room, time, amount } => ledger.set_increment(&room, time, &amount),
            Self::DeleteThrough { room, through } => ledger.delete_increments_through(&room, through),
            Self::Compact { room, through, total } => {
                ledger.compact_increments(&room, through, &total)
            }
            Self::AppendPurchase { room, buying } => ledger.append_purchase(&room, buying),
            Self::RoomSnapshot { room, increments, purchases } => {
                ledger.restore_room(&room, increments, purchases);
                Ok(())
            }
        }
    }

    /// Frames the entry as a full record: header, payload, CRC.
    fn encode(&self, lsn: u64) -> EconomyResult<Vec<u8>> {
        let payload = self.serialize();
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| EconomyError::Store("journal record too large".to_string()))?;

        let mut record = Vec::with_capacity(13 + payload.len() + 4);
        record.extend_from_slice(&lsn.to_le_bytes());
        record.push(self.kind() as u8);
        record.extend_from_slice(&payload_len.to_le_bytes());
        record.extend_from_slice(&payload);
        let crc = crc32fast::hash(&record);
        record.extend_from_slice(&crc.to_le_bytes());
        Ok(record)
    }
}

fn put_len(buf: &mut Vec<u8>, len: usize) {
    let len = u32::try_from(len).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_le_bytes());
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_len(buf, bytes.len());
    buf.extend_from_slice(bytes);
}

fn put_buying(buf: &mut Vec<u8>, buying: &Buying) {
    buf.extend_from_slice(&buying.item_id.to_le_bytes());
    buf.extend_from_slice(&buying.ordinal.to_le_bytes());
    buf.extend_from_slice(&buying.time.to_le_bytes());
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    put_bytes(buf, s.as_bytes());
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }

    fn i64(&mut self) -> Option<i64> {
        Some(i64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    fn bytes(&mut self) -> Option<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> Option<String> {
        String::from_utf8(self.bytes()?.to_vec()).ok()
    }

    fn buying(&mut self) -> Option<Buying> {
        let item_id: ItemId = self.u32()?;
        let ordinal = self.u32()?;
        let time = self.i64()?;
        Some(Buying { item_id, ordinal, time })
    }

    fn is_done(&self) -> bool {
        self.pos == self.data.len()
    }
}

/// Where records land. The journal [`File`] outside of tests.
trait JournalSink: Write + Send {
    /// Cuts the sink back to `len` bytes and moves the write position there.
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;

    fn sync(&mut self) -> io::Result<()>;
}

impl JournalSink for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len)).map(|_| ())
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

struct JournalWriter {
    sink: Box<dyn JournalSink>,
    /// Bytes of whole records (plus header) on disk.
    end: u64,
    next_lsn: u64,
    since_checkpoint: u64,
    /// Set when a partial record could not be cut back; appends are refused.
    poisoned: bool,
}

impl JournalWriter {
    /// Appends one framed record. On failure the sink is cut back to the last
    /// whole record, so nothing of the failed record survives.
    fn append(&mut self, record: &[u8], sync: bool) -> EconomyResult<()> {
        if self.poisoned {
            return Err(EconomyError::Store("journal holds a partial record".to_string()));
        }

        let written = self
            .sink
            .write_all(record)
            .and_then(|()| self.sink.flush())
            .and_then(|()| if sync { self.sink.sync() } else { Ok(()) });

        if let Err(err) = written {
            if let Err(cut) = self.sink.truncate_to(self.end) {
                tracing::error!(error = %cut, "failed to cut back partial journal record");
                self.poisoned = true;
            }
            return Err(EconomyError::Store(format!("journal write failed: {err}")));
        }

        self.end += record.len() as u64;
        self.next_lsn += 1;
        self.since_checkpoint += 1;
        Ok(())
    }
}

/// Ledger store backed by an append-only journal file.
pub struct JournalLedger {
    /// Path to the journal file.
    path: PathBuf,
    /// Replayed state.
    ledger: MemoryLedger,
    /// Append handle; also serializes journal order with memory order.
    writer: Mutex<JournalWriter>,
    /// Call `sync_all` after every record.
    sync: bool,
    /// Automatic checkpoint interval in records; 0 disables it.
    checkpoint_every: u64,
}

impl std::fmt::Debug for JournalLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalLedger")
            .field("path", &self.path)
            .field("sync", &self.sync)
            .field("checkpoint_every", &self.checkpoint_every)
            .finish_non_exhaustive()
    }
}

impl JournalLedger {
    /// Opens or creates a journal and replays it.
    ///
    /// A torn or corrupt tail is truncated away.
    ///
    /// # Errors
    ///
    /// [`EconomyError::Store`] if the file cannot be opened;
    /// [`EconomyError::Journal`] if the header is not a journal header.
    pub fn open(path: impl AsRef<Path>) -> EconomyResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| EconomyError::Store(format!("failed to create journal dir: {e}")))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| EconomyError::Store(format!("failed to open journal: {e}")))?;

        let len = file
            .metadata()
            .map_err(|e| EconomyError::Store(format!("failed to stat journal: {e}")))?
            .len();

        if len == 0 {
            file.write_all(JOURNAL_MAGIC)
                .and_then(|()| file.write_all(&JOURNAL_VERSION.to_le_bytes()))
                .and_then(|()| file.flush())
                .map_err(|e| EconomyError::Store(format!("failed to write header: {e}")))?;
        }

        let ledger = MemoryLedger::new();
        let (good_len, next_lsn, replayed) = Self::recover(&path, &ledger)?;

        if good_len < len.max(HEADER_LEN) {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = len - good_len,
                "journal tail was torn, truncating"
            );
            file.set_len(good_len)
                .map_err(|e| EconomyError::Store(format!("failed to truncate journal: {e}")))?;
        }
        file.seek(SeekFrom::End(0))
            .map_err(|e| EconomyError::Store(format!("failed to seek journal: {e}")))?;

        tracing::info!(path = %path.display(), records = replayed, "journal replayed");

        let writer = JournalWriter {
            sink: Box::new(file),
            end: good_len,
            next_lsn,
            since_checkpoint: replayed as u64,
            poisoned: false,
        };
        Ok(Self {
            path,
            ledger,
            writer: Mutex::new(writer),
            sync: false,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
        })
    }

    /// Forces `sync_all` after each record (slower, survives power loss).
    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Checkpoints automatically after this many appended records. 0 disables.
    ///
    /// Records replayed on open count toward the first checkpoint.
    #[must_use]
    pub fn with_checkpoint_every(mut self, records: u64) -> Self {
        self.checkpoint_every = records;
        self
    }

    /// Rewrites the journal as one snapshot record per room.
    ///
    /// The snapshot goes to a sibling `.tmp` file, is synced, then renamed
    /// over the journal. Returns the number of rooms written.
    ///
    /// # Errors
    ///
    /// [`EconomyError::Store`] on I/O failure. Before the rename the old
    /// journal stays in use; after it, a failure to reopen refuses appends.
    pub fn checkpoint(&self) -> EconomyResult<usize> {
        let mut writer = self.writer.lock();
        self.rewrite(&mut writer)
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replays the journal into `ledger`.
    ///
    /// Returns (length of the intact prefix, next LSN, records replayed).
    fn recover(path: &Path, ledger: &MemoryLedger) -> EconomyResult<(u64, u64, usize)> {
        let file = File::open(path)
            .map_err(|e| EconomyError::Store(format!("failed to open journal for replay: {e}")))?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        let mut version = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .and_then(|()| reader.read_exact(&mut version))
            .map_err(|e| EconomyError::Journal(format!("short header: {e}")))?;
        if &magic != JOURNAL_MAGIC {
            return Err(EconomyError::Journal("invalid magic".to_string()));
        }
        let version = u32::from_le_bytes(version);
        if version != JOURNAL_VERSION {
            return Err(EconomyError::Journal(format!("unsupported version: {version}")));
        }

        let mut good_len = HEADER_LEN;
        let mut next_lsn = 0;
        let mut replayed = 0;

        while let Some((lsn, entry, record_len)) = Self::read_record(&mut reader) {
            entry.apply(ledger)?;
            good_len += record_len;
            next_lsn = lsn + 1;
            replayed += 1;
        }

        Ok((good_len, next_lsn, replayed))
    }

    /// Reads one record. `None` at end of file or on the first damaged record.
    fn read_record(reader: &mut BufReader<File>) -> Option<(u64, JournalEntry, u64)> {
        let mut head = [0u8; 13];
        reader.read_exact(&mut head).ok()?;
        let lsn = u64::from_le_bytes(head[0..8].try_into().ok()?);
        let kind = RecordKind::from_u8(head[8])?;
        let payload_len = u32::from_le_bytes(head[9..13].try_into().ok()?) as usize;

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload).ok()?;

        let mut crc_bytes = [0u8; 4];
        reader.read_exact(&mut crc_bytes).ok()?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&head);
        hasher.update(&payload);
        if hasher.finalize() != u32::from_le_bytes(crc_bytes) {
            return None;
        }

        let entry = JournalEntry::deserialize(kind, &payload)?;
        Some((lsn, entry, (head.len() + payload_len + 4) as u64))
    }

    /// Writes `entry` to the journal, then applies it to memory.
    fn commit(&self, entry: JournalEntry) -> EconomyResult<()> {
        let mut writer = self.writer.lock();
        let record = entry.encode(writer.next_lsn)?;
        writer.append(&record, self.sync)?;
        entry.apply(&self.ledger)?;

        if self.checkpoint_every > 0 && writer.since_checkpoint >= self.checkpoint_every {
            // The record is already durable; a failed checkpoint only delays the next one.
            if let Err(err) = self.rewrite(&mut writer) {
                tracing::warn!(path = %self.path.display(), error = %err, "journal checkpoint failed");
                writer.since_checkpoint = 0;
            }
        }
        Ok(())
    }

    fn rewrite(&self, writer: &mut JournalWriter) -> EconomyResult<usize> {
        let io_err = |what: &'static str| move |e: io::Error| EconomyError::Store(format!("{what}: {e}"));

        let mut bytes = Vec::new();
        bytes.extend_from_slice(JOURNAL_MAGIC);
        bytes.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());

        let rooms = self.ledger.room_names();
        let mut lsn = writer.next_lsn;
        for room in &rooms {
            let entry = JournalEntry::RoomSnapshot {
                room: room.clone(),
                increments: self.ledger.all_increments(room)?,
                purchases: self.ledger.purchases_by_time(room)?,
            };
            bytes.extend_from_slice(&entry.encode(lsn)?);
            lsn += 1;
        }

        let tmp = self.snapshot_path();
        {
            let mut file = File::create(&tmp).map_err(io_err("failed to create snapshot"))?;
            file.write_all(&bytes)
                .and_then(|()| file.sync_all())
                .map_err(io_err("failed to write snapshot"))?;
        }
        fs::rename(&tmp, &self.path).map_err(io_err("failed to install snapshot"))?;

        // The old handle now points at the replaced file.
        writer.poisoned = true;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(io_err("failed to reopen journal"))?;
        file.seek(SeekFrom::End(0)).map_err(io_err("failed to seek journal"))?;

        writer.sink = Box::new(file);
        writer.end = bytes.len() as u64;
        writer.next_lsn = lsn;
        writer.since_checkpoint = 0;
        writer.poisoned = false;

        tracing::info!(path = %self.path.display(), rooms = rooms.len(), "journal checkpointed");
        Ok(rooms.len())
    }

    fn snapshot_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl LedgerStore for JournalLedger {
    fn get_increment(&self, room: &str, time: i64) -> EconomyResult<Option<BigInt>> {
        self.ledger.get_increment(room, time)
    }

    fn set_increment(&self, room: &str, time: i64, amount: &BigInt) -> EconomyResult<()> {
        self.commit(JournalEntry::SetIncrement {
            room: room.to_string(),
            time,
            amount: amount.clone(),
        })
    }

    fn increments_through(&self, room: &str, through: i64) -> EconomyResult<Vec<Adding>> {
        self.ledger.increments_through(room, through)
    }

    fn increments_after(&self, room: &str, after: i64) -> EconomyResult<Vec<Adding>> {
        self.ledger.increments_after(room, after)
    }

    fn delete_increments_through(&self, room: &str, through: i64) -> EconomyResult<()> {
        self.commit(JournalEntry::DeleteThrough { room: room.to_string(), through })
    }

    fn compact_increments(&self, room: &str, through: i64, total: &BigInt) -> EconomyResult<()> {
        self.commit(JournalEntry::Compact {
            room: room.to_string(),
            through,
            total: total.clone(),
        })
    }

    fn append_purchase(&self, room: &str, buying: Buying) -> EconomyResult<()> {
        self.commit(JournalEntry::AppendPurchase { room: room.to_string(), buying })
    }

    fn purchases_by_time(&self, room: &str) -> EconomyResult<Vec<Buying>> {
        self.ledger.purchases_by_time(room)
    }

    fn count_purchases(&self, room: &str, item_id: ItemId) -> EconomyResult<u32> {
        self.ledger.count_purchases(room, item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_journal_path() -> PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("test_journal_{id}_{}.jl", std::process::id()))
    }

    #[test]
    fn test_journal_create_and_open() {
        let path = temp_journal_path();
        {
            let _journal = JournalLedger::open(&path).unwrap();
        }
        assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_LEN);
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_journal_replay_restores_ledger() {
        let path = temp_journal_path();
        let big = BigInt::from(10).pow(40);
        {
            let journal = JournalLedger::open(&path).unwrap();
            journal.set_increment("room", 5, &BigInt::from(3)).unwrap();
            journal.set_increment("room", 9, &big).unwrap();
            journal.compact_increments("room", 6, &BigInt::from(3)).unwrap();
            journal.append_purchase("room", Buying { item_id: 2, ordinal: 1, time: 7 }).unwrap();
            journal.set_increment("other", 1, &BigInt::from(1)).unwrap();
            journal.delete_increments_through("other", 1).unwrap();
        }
        {
            let journal = JournalLedger::open(&path).unwrap();
            assert_eq!(
                journal.all_increments("room").unwrap(),
                vec![Adding::new(6, 3), Adding { time: 9, amount: big.clone() }]
            );
            assert_eq!(journal.count_purchases("room", 2).unwrap(), 1);
            assert!(journal.all_increments("other").unwrap().is_empty());

            // Appends after a reopen keep going.
            journal.set_increment("room", 10, &BigInt::from(1)).unwrap();
        }
        {
            let journal = JournalLedger::open(&path).unwrap();
            assert_eq!(journal.all_increments("room").unwrap().len(), 3);
        }
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_journal_torn_tail_is_truncated() {
        let path = temp_journal_path();
        {
            let journal = JournalLedger::open(&path).unwrap();
            journal.set_increment("room", 1, &BigInt::from(1)).unwrap();
            journal.set_increment("room", 2, &BigInt::from(2)).unwrap();
        }
        let full = fs::metadata(&path).unwrap().len();
        {
            let file = OpenOptions::new().write(true).open(&path).unwrap();
            file.set_len(full - 3).unwrap();
        }
        {
            let journal = JournalLedger::open(&path).unwrap();
            assert_eq!(journal.all_increments("room").unwrap(), vec![Adding::new(1, 1)]);
            journal.set_increment("room", 3, &BigInt::from(3)).unwrap();
        }
        {
            let journal = JournalLedger::open(&path).unwrap();
            assert_eq!(
                journal.all_increments("room").unwrap(),
                vec![Adding::new(1, 1), Adding::new(3, 3)]
            );
        }
        fs::remove_file(&path).ok();
    }

    /// Writes the first `budget` bytes of the next write, then fails it.
    struct TornSink {
        file: File,
        budget: Option<usize>,
    }

    impl Write for TornSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            match self.budget.take() {
                Some(n) => {
                    self.file.write_all(&buf[..n.min(buf.len())])?;
                    Err(io::Error::other("disk full"))
                }
                None => self.file.write(buf),
            }
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl JournalSink for TornSink {
        fn truncate_to(&mut self, len: u64) -> io::Result<()> {
            self.file.truncate_to(len)
        }

        fn sync(&mut self) -> io::Result<()> {
            self.file.sync_all()
        }
    }

    #[test]
    fn test_failed_write_is_cut_back() {
        let path = temp_journal_path();
        {
            let journal = JournalLedger::open(&path).unwrap();
            journal.set_increment("room", 1, &BigInt::from(1)).unwrap();

            let mut file = OpenOptions::new().write(true).open(&path).unwrap();
            file.seek(SeekFrom::End(0)).unwrap();
            journal.writer.lock().sink = Box::new(TornSink { file, budget: Some(7) });

            assert!(matches!(
                journal.set_increment("room", 2, &BigInt::from(2)),
                Err(EconomyError::Store(_))
            ));
            assert_eq!(journal.get_increment("room", 2).unwrap(), None);

            journal.set_increment("room", 3, &BigInt::from(3)).unwrap();
        }
        {
            let journal = JournalLedger::open(&path).unwrap();
            assert_eq!(
                journal.all_increments("room").unwrap(),
                vec![Adding::new(1, 1), Adding::new(3, 3)]
            );
        }
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_checkpoint_restores_same_ledger() {
        let path = temp_journal_path();
        let big = BigInt::from(7).pow(60);
        let purchases = vec![
            Buying { item_id: 1, ordinal: 1, time: 60 },
            Buying { item_id: 2, ordinal: 1, time: 60 },
        ];
        {
            let journal = JournalLedger::open(&path).unwrap();
            for t in 0..50 {
                journal.set_increment("room", t, &BigInt::from(1)).unwrap();
            }
            journal.compact_increments("room", 49, &BigInt::from(50)).unwrap();
            journal.set_increment("room", 80, &big).unwrap();
            for buying in &purchases {
                journal.append_purchase("room", *buying).unwrap();
            }
            journal.set_increment("other", 5, &BigInt::from(9)).unwrap();

            let before = fs::metadata(&path).unwrap().len();
            assert_eq!(journal.checkpoint().unwrap(), 2);
            assert!(fs::metadata(&path).unwrap().len() < before);
            assert!(!journal.snapshot_path().exists());

            // Appends land after the snapshot.
            journal.set_increment("other", 6, &BigInt::from(1)).unwrap();
        }
        {
            let journal = JournalLedger::open(&path).unwrap();
            assert_eq!(
                journal.all_increments("room").unwrap(),
                vec![Adding::new(49, 50), Adding { time: 80, amount: big.clone() }]
            );
            assert_eq!(journal.purchases_by_time("room").unwrap(), purchases);
            assert_eq!(
                journal.all_increments("other").unwrap(),
                vec![Adding::new(5, 9), Adding::new(6, 1)]
            );
        }
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_automatic_checkpoint_bounds_journal() {
        let path = temp_journal_path();
        {
            let journal = JournalLedger::open(&path).unwrap().with_checkpoint_every(10);
            for t in 0..25 {
                journal.set_increment("room", t, &BigInt::from(t)).unwrap();
                journal.compact_increments("room", t, &BigInt::from(t)).unwrap();
            }
            assert_eq!(journal.writer.lock().since_checkpoint, 0);
            journal.set_increment("room", 30, &BigInt::from(30)).unwrap();
            assert_eq!(journal.writer.lock().since_checkpoint, 1);
        }
        {
            let journal = JournalLedger::open(&path).unwrap();
            assert_eq!(
                journal.all_increments("room").unwrap(),
                vec![Adding::new(24, 24), Adding::new(30, 30)]
            );
        }
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_journal_rejects_foreign_file() {
        let path = temp_journal_path();
        fs::write(&path, b"NOPE\x01\x00\x00\x00").unwrap();
        assert!(matches!(JournalLedger::open(&path), Err(EconomyError::Journal(_))));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn test_entry_payload_round_trip() {
        let entry = JournalEntry::Compact {
            room: "r".to_string(),
            through: -4,
            total: BigInt::from(-77),
        };
        let back = JournalEntry::deserialize(entry.kind(), &entry.serialize());
        assert_eq!(back, Some(entry));
    }

    #[test]
    fn test_snapshot_payload_round_trip() {
        let entry = JournalEntry::RoomSnapshot {
            room: "r".to_string(),
            increments: vec![Adding::new(3, 30), Adding { time: 9, amount: BigInt::from(10).pow(30) }],
            purchases: vec![Buying { item_id: 4, ordinal: 2, time: 5 }],
        };
        let back = JournalEntry::deserialize(entry.kind(), &entry.serialize());
        assert_eq!(back, Some(entry));
    }
}
