//! Append-only logging transport
//!
//! The transport is the device service that queues records for the companion
//! receiver. It is modeled as a trait so the session discipline can run
//! against the real device service, a file, or an in-memory log.

use crate::error::{WriteFailure, WriteResult};
use crate::types::{Record, RECORD_SIZE};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{info, warn};

/// Parameters for creating a logging session.
///
/// Items are always raw byte arrays of `item_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParams {
    /// Session identifier (body-location code)
    pub id: u8,
    /// Size of one logged item in bytes
    pub item_size: usize,
    /// Continue an existing stream instead of starting a new one
    pub append: bool,
}

impl SessionParams {
    pub fn new(id: u8, append: bool) -> Self {
        Self {
            id,
            item_size: RECORD_SIZE,
            append,
        }
    }
}

/// Opaque transport resource for one open session.
///
/// Not `Clone`: `LogTransport::finish` consumes it, so a handle can be
/// released only once.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Device logging service
pub trait LogTransport {
    /// Create a session. Creation problems surface on the first `log` call.
    fn create(&mut self, params: &SessionParams) -> SessionHandle;

    /// Queue a batch of records
    fn log(&mut self, handle: &SessionHandle, records: &[Record]) -> WriteResult;

    /// Finalize the session and release its resource
    fn finish(&mut self, handle: SessionHandle);
}

// ============================================================================
// In-memory transport
// ============================================================================

/// Lifecycle call observed by a `MemoryTransport`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Created { id: u8, append: bool },
    Logged { id: u8, records: usize },
    Failed { id: u8, failure: WriteFailure },
    Finished { id: u8 },
}

#[derive(Debug, Default)]
struct MemoryLog {
    streams: BTreeMap<u8, Vec<Record>>,
    open: HashMap<u64, u8>,
    events: Vec<TransportEvent>,
    scripted: VecDeque<WriteFailure>,
    next_handle: u64,
}

/// In-memory transport. Clones share the same log, so a caller can keep a
/// clone to inspect what a controller wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Rc<RefCell<MemoryLog>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `log` call fail with `failure` (queued, first in first out)
    pub fn fail_next(&self, failure: WriteFailure) {
        self.inner.borrow_mut().scripted.push_back(failure);
    }

    /// Every record accepted for session `id`, in order
    pub fn records(&self, id: u8) -> Vec<Record> {
        self.inner
            .borrow()
            .streams
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn events(&self) -> Vec<TransportEvent> {
        self.inner.borrow().events.clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.inner.borrow().open.len()
    }
}

impl LogTransport for MemoryTransport {
    fn create(&mut self, params: &SessionParams) -> SessionHandle {
        let mut log = self.inner.borrow_mut();
        log.next_handle += 1;
        let raw = log.next_handle;
        log.open.insert(raw, params.id);
        let stream = log.streams.entry(params.id).or_default();
        if !params.append {
            stream.clear();
        }
        log.events.push(TransportEvent::Created {
            id: params.id,
            append: params.append,
        });
        SessionHandle::new(raw)
    }

    fn log(&mut self, handle: &SessionHandle, records: &[Record]) -> WriteResult {
        let mut log = self.inner.borrow_mut();
        let id = match log.open.get(&handle.raw()) {
            Some(id) => *id,
            None => return Err(WriteFailure::Closed),
        };
        if let Some(failure) = log.scripted.pop_front() {
            log.events.push(TransportEvent::Failed { id, failure });
            return Err(failure);
        }
        log.streams.entry(id).or_default().extend_from_slice(records);
        log.events.push(TransportEvent::Logged {
            id,
            records: records.len(),
        });
        Ok(())
    }

    fn finish(&mut self, handle: SessionHandle) {
        let mut log = self.inner.borrow_mut();
        if let Some(id) = log.open.remove(&handle.raw()) {
            log.events.push(TransportEvent::Finished { id });
        }
    }
}

// ============================================================================
// File-backed transport
// ============================================================================

struct FileSession {
    id: u8,
    path: PathBuf,
    file: Option<File>,
}

/// Writes each session's records to `<dir>/session-<id>.bin`
pub struct FileTransport {
    dir: PathBuf,
    capacity_bytes: Option<u64>,
    sessions: HashMap<u64, FileSession>,
    next_handle: u64,
}

impl FileTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            capacity_bytes: None,
            sessions: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Limit each session file to `bytes`; writes past it report `Full`
    pub fn with_capacity_bytes(mut self, bytes: u64) -> Self {
        self.capacity_bytes = Some(bytes);
        self
    }

    /// Path of the file backing session `id` under `dir`
    pub fn session_path(dir: &Path, id: u8) -> PathBuf {
        dir.join(format!("session-{id:03}.bin"))
    }

    fn open_file(&self, params: &SessionParams) -> io::Result<File> {
        std::fs::create_dir_all(&self.dir)?;
        let mut options = OpenOptions::new();
        options.create(true);
        if params.append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        options.open(Self::session_path(&self.dir, params.id))
    }
}

fn map_io_error(err: &io::Error) -> WriteFailure {
    match err.kind() {
        io::ErrorKind::NotFound => WriteFailure::NotFound,
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => WriteFailure::Busy,
        io::ErrorKind::InvalidInput => WriteFailure::InvalidParams,
        _ => WriteFailure::InternalError,
    }
}

impl LogTransport for FileTransport {
    fn create(&mut self, params: &SessionParams) -> SessionHandle {
        let file = match self.open_file(params) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(session_id = params.id, error = %e, "failed to open session file");
                None
            }
        };
        self.next_handle += 1;
        let path = Self::session_path(&self.dir, params.id);
        info!(session_id = params.id, append = params.append, path = %path.display(), "session file opened");
        self.sessions.insert(
            self.next_handle,
            FileSession {
                id: params.id,
                path,
                file,
            },
        );
        SessionHandle::new(self.next_handle)
    }

    fn log(&mut self, handle: &SessionHandle, records: &[Record]) -> WriteResult {
        let capacity = self.capacity_bytes;
        let session = self
            .sessions
            .get_mut(&handle.raw())
            .ok_or(WriteFailure::Closed)?;
        let id = session.id;
        let file = session.file.as_mut().ok_or(WriteFailure::NotFound)?;

        let incoming = (records.len() * RECORD_SIZE) as u64;
        if let Some(limit) = capacity {
            let used = file.metadata().map_err(|e| map_io_error(&e))?.len();
            if used + incoming > limit {
                return Err(WriteFailure::Full);
            }
        }

        let mut buf = Vec::with_capacity(incoming as usize);
        for record in records {
            buf.extend_from_slice(record.as_bytes());
        }
        file.write_all(&buf).map_err(|e| {
            warn!(session_id = id, error = %e, "session write failed");
            map_io_error(&e)
        })
    }

    fn finish(&mut self, handle: SessionHandle) {
        if let Some(mut session) = self.sessions.remove(&handle.raw()) {
            if let Some(file) = session.file.as_mut() {
                if let Err(e) = file.flush() {
                    warn!(session_id = session.id, error = %e, "failed to flush session file");
                }
            }
            info!(session_id = session.id, path = %session.path.display(), "session file finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{encode_anchor, encode_reading};
    use crate::types::Sample;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_memory_transport_records_and_events() {
        let mut transport = MemoryTransport::new();
        let observer = transport.clone();

        let handle = transport.create(&SessionParams::new(3, false));
        let records = [encode_anchor(10), encode_reading(&Sample::new(1, 2, 3, 10))];
        assert_eq!(transport.log(&handle, &records), Ok(()));
        transport.finish(handle);

        assert_eq!(observer.records(3), records.to_vec());
        assert_eq!(
            observer.events(),
            vec![
                TransportEvent::Created { id: 3, append: false },
                TransportEvent::Logged { id: 3, records: 2 },
                TransportEvent::Finished { id: 3 },
            ]
        );
        assert_eq!(observer.open_sessions(), 0);
    }

    #[test]
    fn test_memory_transport_scripted_failure() {
        let mut transport = MemoryTransport::new();
        let handle = transport.create(&SessionParams::new(0, false));
        transport.fail_next(WriteFailure::Busy);

        assert_eq!(transport.log(&handle, &[encode_anchor(1)]), Err(WriteFailure::Busy));
        assert_eq!(transport.log(&handle, &[encode_anchor(2)]), Ok(()));
        assert_eq!(transport.records(0), vec![encode_anchor(2)]);
    }

    #[test]
    fn test_memory_transport_append_keeps_stream() {
        let mut transport = MemoryTransport::new();
        let first = transport.create(&SessionParams::new(1, false));
        let first_raw = first.raw();
        transport.log(&first, &[encode_anchor(1)]).unwrap();
        transport.finish(first);

        let second = transport.create(&SessionParams::new(1, true));
        transport.log(&second, &[encode_anchor(2)]).unwrap();
        assert_eq!(transport.records(1), vec![encode_anchor(1), encode_anchor(2)]);

        let finished = SessionHandle::new(first_raw);
        assert_eq!(transport.log(&finished, &[]), Err(WriteFailure::Closed));
    }

    #[test]
    fn test_file_transport_append_and_truncate() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("logs");
        let mut transport = FileTransport::new(&dir);

        let handle = transport.create(&SessionParams::new(7, false));
        transport.log(&handle, &[encode_anchor(5)]).unwrap();
        transport.finish(handle);

        let handle = transport.create(&SessionParams::new(7, true));
        transport.log(&handle, &[encode_anchor(6)]).unwrap();
        transport.finish(handle);

        let path = FileTransport::session_path(&dir, 7);
        assert_eq!(std::fs::read(&path).unwrap().len(), 12);

        let handle = transport.create(&SessionParams::new(7, false));
        transport.finish(handle);
        assert_eq!(std::fs::read(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_file_transport_capacity_reports_full() {
        let tmp = TempDir::new().unwrap();
        let mut transport = FileTransport::new(tmp.path()).with_capacity_bytes(12);
        let handle = transport.create(&SessionParams::new(0, false));

        assert_eq!(transport.log(&handle, &[encode_anchor(1), encode_anchor(2)]), Ok(()));
        assert_eq!(transport.log(&handle, &[encode_anchor(3)]), Err(WriteFailure::Full));
        transport.finish(handle);
    }
}
