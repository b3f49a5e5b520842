//! FFI bindings for MobiGait
//!
//! This module provides C-compatible functions for driving the motion pipeline
//! from a mobile host. Samples, commands, and results cross the boundary as
//! JSON in null-terminated C strings. Returned strings are allocated here and
//! must be freed by the caller using `mobigait_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use crate::config::MotionConfig;
use crate::error::MotionError;
use crate::pipeline::MotionProcessor;
use crate::profile::UserProfile;
use crate::store::{MemoryStore, PersistenceQueue, StepStore};
use crate::types::{MotionEvent, SensorEvent};

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

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Return `result` as a C string, or NULL with the error recorded
fn finish(result: Result<String, MotionError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

fn events_to_json(events: &[MotionEvent]) -> Result<String, MotionError> {
    Ok(serde_json::to_string(events)?)
}

/// Opaque handle to a MotionProcessor and its record store
pub struct MotionProcessorHandle {
    processor: MotionProcessor,
    queue: Arc<PersistenceQueue<MemoryStore>>,
}

unsafe fn build_handle(
    config_json: *const c_char,
    profile_json: *const c_char,
    store_json: *const c_char,
    hardware_counter: bool,
    now_ms: i64,
) -> Result<MotionProcessorHandle, MotionError> {
    let config = match cstr_to_string(config_json) {
        Some(json) => MotionConfig::from_json(&json)?,
        None => MotionConfig::default(),
    };
    let profile = match cstr_to_string(profile_json) {
        Some(json) => UserProfile::from_json(&json)?,
        None => UserProfile::default(),
    };
    let store = match cstr_to_string(store_json) {
        Some(json) => MemoryStore::from_json(&json)?,
        None => MemoryStore::new(),
    };

    let queue = Arc::new(PersistenceQueue::new(store)?);
    let mut processor = MotionProcessor::new(
        config,
        Arc::new(profile),
        Box::new(Arc::clone(&queue)),
        hardware_counter,
        now_ms,
    )?;
    let today = processor.session().current_day;
    let record = queue.read(|s| s.step_record_for_day(today))?;
    processor.restore_today(record, now_ms);

    Ok(MotionProcessorHandle { processor, queue })
}

// ============================================================================
// Processor API
// ============================================================================

/// Create a new motion processor.
///
/// # Safety
/// - `config_json`, `profile_json`, and `store_json` must be valid
///   null-terminated C strings or NULL (NULL selects defaults / an empty store).
/// - `hardware_counter` is non-zero when the device has a hardware step counter.
/// - Returns a pointer that must be freed with `mobigait_processor_free`.
/// - Returns NULL on error; call `mobigait_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mobigait_processor_new(
    config_json: *const c_char,
    profile_json: *const c_char,
    store_json: *const c_char,
    hardware_counter: i32,
    now_ms: i64,
) -> *mut MotionProcessorHandle {
    clear_last_error();

    match build_handle(config_json, profile_json, store_json, hardware_counter != 0, now_ms) {
        Ok(handle) => Box::into_raw(Box::new(handle)),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a motion processor, draining pending writes.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `mobigait_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn mobigait_processor_free(processor: *mut MotionProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Process one sensor sample and return the emitted events as a JSON array.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `mobigait_processor_new`.
/// - `sample_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `mobigait_free_string`.
/// - Returns NULL on error; call `mobigait_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mobigait_processor_process_sample(
    processor: *mut MotionProcessorHandle,
    sample_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &mut *processor;

    let json_str = match cstr_to_string(sample_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid sample string pointer");
            return ptr::null_mut();
        }
    };

    finish(
        serde_json::from_str::<SensorEvent>(&json_str)
            .map_err(MotionError::from)
            .and_then(|event| events_to_json(&handle.processor.process_sample(event))),
    )
}

/// Check for a day change and return the emitted events as a JSON array.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `mobigait_processor_new`.
/// - Returns a newly allocated string that must be freed with `mobigait_free_string`.
/// - Returns NULL on error; call `mobigait_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mobigait_processor_roll_day(
    processor: *mut MotionProcessorHandle,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &mut *processor;

    finish(events_to_json(&handle.processor.maybe_roll_day(now_ms)))
}

/// Run a lifecycle command (`start`, `pause`, `resume`, `reset`, `stop`,
/// `start_gait`, `stop_gait`, `roll_day`) and return the events as a JSON array.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `mobigait_processor_new`.
/// - `command` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `mobigait_free_string`.
/// - Returns NULL on error; call `mobigait_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mobigait_processor_command(
    processor: *mut MotionProcessorHandle,
    command: *const c_char,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &mut *processor;

    let name = match cstr_to_string(command) {
        Some(s) => s,
        None => {
            set_last_error("Invalid command string pointer");
            return ptr::null_mut();
        }
    };

    finish(
        handle
            .processor
            .command(&name, now_ms)
            .and_then(|events| events_to_json(&events)),
    )
}

/// Today's step metrics as JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `mobigait_processor_new`.
/// - Returns a newly allocated string that must be freed with `mobigait_free_string`.
/// - Returns NULL on error; call `mobigait_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mobigait_processor_metrics(
    processor: *mut MotionProcessorHandle,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    finish(serde_json::to_string(&handle.processor.metrics(now_ms)).map_err(MotionError::from))
}

/// Flush pending writes and return the record store as a JSON snapshot.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `mobigait_processor_new`.
/// - Returns a newly allocated string that must be freed with `mobigait_free_string`.
/// - Returns NULL on error; call `mobigait_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn mobigait_processor_save_store(
    processor: *mut MotionProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    finish(
        handle
            .queue
            .flush()
            .and_then(|()| handle.queue.read(|s| s.to_json())),
    )
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by MobiGait functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a MobiGait function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn mobigait_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next MobiGait function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn mobigait_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the MobiGait library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn mobigait_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
