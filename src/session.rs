//! Logging session lifecycle
//!
//! `SessionManager` exclusively owns the one logging session of a recording
//! activity. The session is held as an `Option<Session>`: finalizing takes it
//! out and hands its handle to the transport by value, so the closing anchor
//! and the release happen at most once no matter how many teardown paths run.

use crate::encoder::encode_timestamp_anchor;
use crate::error::{DatalogError, WriteFailure, WriteResult};
use crate::transport::{LogTransport, SessionHandle, SessionParams};
use crate::types::Record;
use chrono::Utc;
use std::cell::Cell;
use std::rc::Rc;
use tracing::{info, warn};

/// Wall-clock source for closing anchors
pub trait Clock {
    /// Current time in ms since the UNIX epoch
    fn now_ms(&self) -> i64;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually driven clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<i64>>);

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self(Rc::new(Cell::new(start_ms)))
    }

    pub fn set(&self, ms: i64) {
        self.0.set(ms);
    }

    pub fn advance(&self, ms: i64) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.get()
    }
}

/// An open logging session
#[derive(Debug)]
pub struct Session {
    id: u8,
    handle: SessionHandle,
    append: bool,
}

impl Session {
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Whether this session continues a stream (reopened by a flush)
    pub fn is_append(&self) -> bool {
        self.append
    }
}

/// Owns the logging session and its transport
pub struct SessionManager {
    transport: Box<dyn LogTransport>,
    clock: Box<dyn Clock>,
    session: Option<Session>,
}

impl SessionManager {
    pub fn new(transport: Box<dyn LogTransport>, clock: Box<dyn Clock>) -> Self {
        Self {
            transport,
            clock,
            session: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Create a fresh (non-append) session for `id`
    pub fn open(&mut self, id: u8) -> Result<&Session, DatalogError> {
        if let Some(session) = &self.session {
            return Err(DatalogError::SessionAlreadyOpen(session.id));
        }
        let handle = self.transport.create(&SessionParams::new(id, false));
        info!(session_id = id, "logging session opened");
        Ok(self.session.insert(Session {
            id,
            handle,
            append: false,
        }))
    }

    /// Forward a batch of records to the transport.
    ///
    /// Without an open session this reports `Closed` and touches nothing.
    pub fn write(&mut self, records: &[Record]) -> WriteResult {
        match &self.session {
            Some(session) => self.transport.log(&session.handle, records),
            None => Err(WriteFailure::Closed),
        }
    }

    /// Finalize the current session and reopen it in append mode under the
    /// same identifier, so queued data is pushed out without breaking the
    /// logical stream.
    pub fn flush(&mut self) -> Result<(), DatalogError> {
        let session = self.session.take().ok_or(DatalogError::SessionClosed)?;
        let id = session.id;
        self.transport.finish(session.handle);
        let handle = self.transport.create(&SessionParams::new(id, true));
        self.session = Some(Session {
            id,
            handle,
            append: true,
        });
        info!(session_id = id, "logging session flushed");
        Ok(())
    }

    /// Write a closing anchor at the current time, then release the session.
    ///
    /// Returns the closing anchor's write result, or `None` if there was no
    /// session left to finalize.
    pub fn finalize(&mut self) -> Option<WriteResult> {
        let session = self.session.take()?;
        let now = self.clock.now_ms();
        let result = self
            .transport
            .log(&session.handle, &[encode_timestamp_anchor(now)]);
        if let Err(failure) = result {
            warn!(session_id = session.id, %failure, "closing anchor not written");
        }
        self.transport.finish(session.handle);
        info!(session_id = session.id, closed_at = now, "logging session finalized");
        Some(result)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.finalize();
    }
}
