//! FFI bindings for accel-datalog
//!
//! C-compatible entry points so watch firmware or a phone-side receiver can
//! share the record codec and resync rule. Records are written into
//! caller-owned 6-byte buffers; nothing returned here needs to be freed.

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

use crate::encoder::{encode_anchor, encode_reading};
use crate::error::WriteFailure;
use crate::sync::should_emit_anchor;
use crate::types::{Record, Sample, RECORD_SIZE};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Copy a record into a caller buffer
unsafe fn write_record(record: &Record, out: *mut u8) -> i32 {
    if out.is_null() {
        set_last_error("Output buffer pointer is null");
        return -1;
    }
    ptr::copy_nonoverlapping(record.as_bytes().as_ptr(), out, RECORD_SIZE);
    0
}

// ============================================================================
// Record Codec
// ============================================================================

/// Encode one accelerometer reading into `out`.
///
/// # Safety
/// - `out` must point to at least 6 writable bytes.
/// - Returns 0 on success, -1 if `out` is NULL; call `datalog_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn datalog_encode_reading(x: i16, y: i16, z: i16, out: *mut u8) -> i32 {
    clear_last_error();
    write_record(&encode_reading(&Sample::new(x, y, z, 0)), out)
}

/// Encode a timestamp anchor into `out`. Only the low 44 bits of `value` are kept.
///
/// # Safety
/// - `out` must point to at least 6 writable bytes.
/// - Returns 0 on success, -1 if `out` is NULL; call `datalog_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn datalog_encode_anchor(value: u64, out: *mut u8) -> i32 {
    clear_last_error();
    write_record(&encode_anchor(value), out)
}

/// Whether an anchor precedes the sample at `sample_index`
#[no_mangle]
pub extern "C" fn datalog_should_emit_anchor(sample_index: u64) -> bool {
    should_emit_anchor(sample_index)
}

// ============================================================================
// Write Results
// ============================================================================

macro_rules! c_str {
    ($s:expr) => {
        concat!($s, "\0").as_bytes()
    };
}

/// Human-readable status text for a write result code (0 = success).
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
/// - Unknown codes map to the internal error text.
#[no_mangle]
pub unsafe extern "C" fn datalog_write_result_message(code: u8) -> *const c_char {
    static OK: &[u8] = c_str!("Logging OK.");
    static BUSY: &[u8] = c_str!("Logging busy. Samples dropped.");
    static FULL: &[u8] = c_str!("Logging storage full. Sync with phone.");
    static NOT_FOUND: &[u8] = c_str!("Logging session not found.");
    static CLOSED: &[u8] = c_str!("Logging session closed.");
    static INVALID_PARAMS: &[u8] = c_str!("Logging rejected invalid parameters.");
    static INTERNAL: &[u8] = c_str!("Logging internal error.");

    let text = match WriteFailure::from_code(code) {
        Ok(()) => OK,
        Err(WriteFailure::Busy) => BUSY,
        Err(WriteFailure::Full) => FULL,
        Err(WriteFailure::NotFound) => NOT_FOUND,
        Err(WriteFailure::Closed) => CLOSED,
        Err(WriteFailure::InvalidParams) => INVALID_PARAMS,
        Err(WriteFailure::InternalError) => INTERNAL,
    };
    text.as_ptr() as *const c_char
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next datalog function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn datalog_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn datalog_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
