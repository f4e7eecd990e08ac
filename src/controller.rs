//! Sampling controller
//!
//! The recording state machine. It gates the accelerometer subscription,
//! pushes every delivered batch through the timestamp synchronizer and the
//! encoder into the logging session, and drives the session lifecycle from
//! control events.
//!
//! Transition table:
//!
//! | state     | event  | effect                                            |
//! |-----------|--------|---------------------------------------------------|
//! | Idle      | Start  | open session, subscribe → Recording               |
//! | Recording | Pause  | unsubscribe → Paused                              |
//! | Paused    | Resume | subscribe → Recording                             |
//! | Recording | Stop   | unsubscribe, finalize → Stopped                   |
//! | Paused    | Stop   | finalize → Stopped                                |
//! | Recording | Flush  | flush session                                     |
//! | Paused    | Flush  | flush session                                     |
//! | Stopped   | any    | ask the owner to exit the application            |
//!
//! Every other pair is rejected and leaves the state unchanged.

use crate::config::RecorderConfig;
use crate::encoder::encode_batch;
use crate::error::{DatalogError, WriteFailure, WriteResult};
use crate::feed::{AccelFeed, Subscription};
use crate::session::{Clock, SessionManager};
use crate::sync::{SampleCounter, TimestampSynchronizer};
use crate::transport::LogTransport;
use crate::types::{Button, Click, ControlEvent, RecordingState, Sample, SamplingRate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const STATUS_WELCOME: &str = "Ready to go!\n\nPress any button to begin logging.";
pub const STATUS_LOGGING: &str = "Logging...\n\n(press any button to pause)";
pub const STATUS_PAUSED: &str = "Paused.\n\nPress any button to resume.";
pub const STATUS_STOPPED: &str = "Stopped.\n\nData will sync to your phone.";
pub const STATUS_FLUSHED: &str = "Flushed.\n\nBuffered data sent to your phone.";

/// Status text sink (the device's text layer)
pub trait StatusDisplay {
    fn show_status(&mut self, text: &str);
}

/// External collaborators owned by the controller
pub struct DeviceContext {
    pub transport: Box<dyn LogTransport>,
    pub feed: Box<dyn AccelFeed>,
    pub display: Box<dyn StatusDisplay>,
    pub clock: Box<dyn Clock>,
}

/// What the owner of the controller should do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Keep running
    Continue,
    /// The session was finalized; recording is over
    TeardownComplete,
    /// The user asked to leave the stopped screen
    ExitApplication,
}

/// Running totals for one recording activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingStats {
    /// Non-empty batches processed while recording
    pub batches: u64,
    /// Reading records accepted by the transport
    pub readings_written: u64,
    /// Anchor records accepted by the transport, closing anchor included
    pub anchors_written: u64,
    /// Writes the transport refused
    pub failed_writes: u64,
    /// Records lost to refused writes
    pub records_dropped: u64,
    /// Completed flushes
    pub flushes: u64,
}

/// Internal phase; the subscription lives only inside `Recording`
enum Phase {
    Idle,
    Recording(Subscription),
    Paused,
    Stopped,
}

impl Phase {
    fn state(&self) -> RecordingState {
        match self {
            Phase::Idle => RecordingState::Idle,
            Phase::Recording(_) => RecordingState::Recording,
            Phase::Paused => RecordingState::Paused,
            Phase::Stopped => RecordingState::Stopped,
        }
    }
}

/// Recording state machine
pub struct SamplingController {
    config: RecorderConfig,
    phase: Phase,
    session: SessionManager,
    sync: TimestampSynchronizer,
    feed: Box<dyn AccelFeed>,
    display: Box<dyn StatusDisplay>,
    effective_rate: Option<SamplingRate>,
    last_failure: Option<WriteFailure>,
    stats: RecordingStats,
    run_id: Uuid,
}

impl SamplingController {
    /// Create an idle controller and show the welcome text
    pub fn new(config: RecorderConfig, device: DeviceContext) -> Result<Self, DatalogError> {
        config.validate()?;
        let DeviceContext {
            transport,
            feed,
            mut display,
            clock,
        } = device;
        display.show_status(STATUS_WELCOME);
        Ok(Self {
            sync: TimestampSynchronizer::new(config.resync_period),
            config,
            phase: Phase::Idle,
            session: SessionManager::new(transport, clock),
            feed,
            display,
            effective_rate: None,
            last_failure: None,
            stats: RecordingStats::default(),
            run_id: Uuid::new_v4(),
        })
    }

    pub fn state(&self) -> RecordingState {
        self.phase.state()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn stats(&self) -> RecordingStats {
        self.stats
    }

    pub fn sample_count(&self) -> SampleCounter {
        self.sync.counter()
    }

    /// Rate the platform actually applied, known once recording has started
    pub fn effective_rate(&self) -> Option<SamplingRate> {
        self.effective_rate
    }

    /// Identifier correlating this activity's log lines
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn session_is_open(&self) -> bool {
        self.session.is_open()
    }

    /// Apply a control event
    pub fn handle(&mut self, event: ControlEvent) -> Result<Directive, DatalogError> {
        let state = self.state();
        if state == RecordingState::Stopped {
            info!(run_id = %self.run_id, ?event, "exit requested after stop");
            return Ok(Directive::ExitApplication);
        }
        let phase = std::mem::replace(&mut self.phase, Phase::Stopped);
        let (next, directive) = match (phase, event) {
            (Phase::Idle, ControlEvent::Start) => match self.start() {
                Ok(subscription) => (Phase::Recording(subscription), Directive::Continue),
                Err(e) => {
                    self.phase = Phase::Idle;
                    return Err(e);
                }
            },
            (Phase::Recording(subscription), ControlEvent::Pause) => {
                self.feed.unsubscribe(subscription);
                self.display.show_status(STATUS_PAUSED);
                (Phase::Paused, Directive::Continue)
            }
            (Phase::Paused, ControlEvent::Resume) => {
                let subscription = self.feed.subscribe(self.config.batch_size);
                self.display.show_status(STATUS_LOGGING);
                (Phase::Recording(subscription), Directive::Continue)
            }
            (Phase::Recording(subscription), ControlEvent::Stop) => {
                self.feed.unsubscribe(subscription);
                self.finish();
                (Phase::Stopped, Directive::TeardownComplete)
            }
            (Phase::Paused, ControlEvent::Stop) => {
                self.finish();
                (Phase::Stopped, Directive::TeardownComplete)
            }
            (phase @ (Phase::Recording(_) | Phase::Paused), ControlEvent::Flush) => {
                self.phase = phase;
                self.flush()?;
                return Ok(Directive::Continue);
            }
            (phase, event) => {
                self.phase = phase;
                warn!(run_id = %self.run_id, state = state.as_str(), ?event, "transition rejected");
                return Err(DatalogError::InvalidTransition { state, event });
            }
        };
        self.phase = next;
        info!(
            run_id = %self.run_id,
            from = state.as_str(),
            to = self.state().as_str(),
            ?event,
            "recording state changed"
        );
        Ok(directive)
    }

    /// Translate a button click into a control event and apply it
    pub fn handle_click(&mut self, click: Click) -> Result<Directive, DatalogError> {
        let event = match (click, self.state()) {
            (_, RecordingState::Stopped) => return Ok(Directive::ExitApplication),
            (Click::Short(Button::Back) | Click::Long(Button::Back), _) => ControlEvent::Stop,
            (Click::Long(Button::Select), _) => ControlEvent::Flush,
            (Click::Short(_) | Click::Long(_), RecordingState::Idle) => ControlEvent::Start,
            (Click::Short(_) | Click::Long(_), RecordingState::Recording) => ControlEvent::Pause,
            (Click::Short(_) | Click::Long(_), RecordingState::Paused) => ControlEvent::Resume,
        };
        self.handle(event)
    }

    /// Process one batch from the feed.
    ///
    /// Returns `None` when the batch was ignored (not recording, or empty),
    /// otherwise the transport's result for the batch write. A failed write is
    /// shown on the display and the samples still count.
    pub fn on_batch(&mut self, batch: &[Sample]) -> Option<WriteResult> {
        if !matches!(self.phase, Phase::Recording(_)) {
            debug!(state = self.state().as_str(), "batch ignored outside recording");
            return None;
        }
        if batch.is_empty() {
            return None;
        }

        let with_anchor = self.sync.anchor_due(batch.len());
        let records = encode_batch(batch, with_anchor);
        let result = self.session.write(&records);
        if self.sync.breaks_alignment(batch.len(), self.config.batch_size) {
            warn!(
                run_id = %self.run_id,
                sample_index = self.sync.counter().value(),
                batch_len = batch.len(),
                "short batch; next anchor waits for a period-aligned batch"
            );
        }
        self.sync.advance(batch.len());
        self.stats.batches += 1;

        match result {
            Ok(()) => {
                self.stats.readings_written += batch.len() as u64;
                if with_anchor {
                    self.stats.anchors_written += 1;
                }
                if self.last_failure.take().is_some() {
                    self.display.show_status(STATUS_LOGGING);
                }
            }
            Err(failure) => {
                self.stats.failed_writes += 1;
                self.stats.records_dropped += records.len() as u64;
                warn!(
                    run_id = %self.run_id,
                    sample_index = self.sync.counter().value(),
                    records = records.len(),
                    %failure,
                    "batch write failed"
                );
                self.display.show_status(&failure.to_string());
                self.last_failure = Some(failure);
            }
        }
        Some(result)
    }

    /// Pull the next batch from the feed and process it.
    ///
    /// Returns `None` when not recording or the feed has nothing pending.
    pub fn pump(&mut self) -> Option<WriteResult> {
        let batch = match &self.phase {
            Phase::Recording(subscription) => self.feed.next_batch(subscription)?,
            _ => return None,
        };
        self.on_batch(&batch)
    }

    /// Forced teardown from any state. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        match std::mem::replace(&mut self.phase, Phase::Stopped) {
            Phase::Recording(subscription) => {
                self.feed.unsubscribe(subscription);
                self.finish();
            }
            Phase::Paused => self.finish(),
            // no session is opened before the first Start
            Phase::Idle => info!(run_id = %self.run_id, "torn down before recording started"),
            Phase::Stopped => {}
        }
    }

    fn start(&mut self) -> Result<Subscription, DatalogError> {
        if !self.session.is_open() {
            self.session.open(self.config.effective_session_id())?;
            self.sync.reset();
        }
        let requested = self.config.sampling_rate;
        let applied = self.feed.set_sampling_rate(requested);
        if applied != requested {
            warn!(
                requested_hz = requested.hz(),
                applied_hz = applied.hz(),
                "platform overrode the sampling rate"
            );
        }
        self.effective_rate = Some(applied);
        let subscription = self.feed.subscribe(self.config.batch_size);
        self.display.show_status(STATUS_LOGGING);
        Ok(subscription)
    }

    fn flush(&mut self) -> Result<(), DatalogError> {
        self.session.flush()?;
        self.stats.flushes += 1;
        self.display.show_status(STATUS_FLUSHED);
        Ok(())
    }

    fn finish(&mut self) {
        if let Some(result) = self.session.finalize() {
            match result {
                Ok(()) => self.stats.anchors_written += 1,
                Err(_) => {
                    self.stats.failed_writes += 1;
                    self.stats.records_dropped += 1;
                }
            }
        }
        self.display.show_status(STATUS_STOPPED);
        info!(
            run_id = %self.run_id,
            samples = self.sync.counter().value(),
            readings = self.stats.readings_written,
            anchors = self.stats.anchors_written,
            "recording finished"
        );
    }
}

impl Drop for SamplingController {
    fn drop(&mut self) {
        self.teardown();
    }
}
