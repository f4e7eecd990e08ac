//! accel-datalog - accelerometer data logging for wrist-worn devices
//!
//! Samples from the device accelerometer are packed into fixed 6-byte
//! records and streamed over the platform logging channel to a companion
//! phone. Readings carry no time of their own; a timestamp anchor record is
//! inserted every [`sync::RESYNC_PERIOD`] samples so the receiver can
//! reconstruct capture times.
//!
//! ## Modules
//!
//! - **Codec**: record encoding ([`encoder`]) and decoding ([`decoder`])
//! - **Recording**: session lifecycle ([`session`]), anchor scheduling
//!   ([`sync`]) and the start/pause/stop state machine ([`controller`])
//! - **Platform seams**: logging transport ([`transport`]) and accelerometer
//!   feed ([`feed`])

pub mod config;
pub mod controller;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod feed;
pub mod session;
pub mod sync;
pub mod transport;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::RecorderConfig;
pub use controller::{DeviceContext, Directive, RecordingStats, SamplingController, StatusDisplay};
pub use decoder::{decode_record, DecodedRecord, StreamDecoder, TimedReading};
pub use encoder::{encode_anchor, encode_batch, encode_integer, encode_reading};
pub use error::{DatalogError, WriteFailure, WriteResult};
pub use feed::{AccelFeed, ReplayFeed, Subscription};
pub use session::{Clock, ManualClock, SessionManager, SystemClock};
pub use sync::{should_emit_anchor, TimestampSynchronizer, RESYNC_PERIOD};
pub use transport::{FileTransport, LogTransport, MemoryTransport};
pub use types::{
    BodyLocation, Button, Click, ControlEvent, Record, RecordingState, Sample, SamplingRate,
};

/// Library version recorded in run manifests
pub const DATALOG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name recorded in run manifests
pub const PRODUCER_NAME: &str = "accel-datalog";
