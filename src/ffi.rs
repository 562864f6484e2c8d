//! FFI bindings for Folio Metrics
//!
//! This module provides C-compatible functions for calling the engine from the
//! persistence layer in other languages. All functions take and return JSON as
//! null-terminated C strings; returned strings must be freed by the caller
//! using `folio_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::error::ComputeError;
use crate::pipeline::{merge_heatmap_json, merge_session_json, zscores_json, EngagementProcessor};

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

/// Convert a C string argument, recording an error naming `what` on failure
unsafe fn read_arg(ptr: *const c_char, what: &str) -> Option<String> {
    if ptr.is_null() {
        set_last_error(&format!("Invalid {} string pointer", what));
        return None;
    }
    match CStr::from_ptr(ptr).to_str() {
        Ok(s) => Some(s.to_string()),
        Err(_) => {
            set_last_error(&format!("{} is not valid UTF-8", what));
            None
        }
    }
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn finish(result: Result<String, ComputeError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API (default configuration)
// ============================================================================

/// Merge a session into a daily aggregate.
///
/// # Safety
/// - All arguments must be valid null-terminated C strings. `previous_json`
///   may be the JSON literal `null` for the first session of a day.
/// - Returns a newly allocated string that must be freed with `folio_free_string`.
/// - Returns NULL on error; call `folio_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn folio_merge_session(
    previous_json: *const c_char,
    session_json: *const c_char,
    portfolio_id: *const c_char,
    date: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let (Some(previous), Some(session), Some(portfolio), Some(date)) = (
        read_arg(previous_json, "previous aggregate"),
        read_arg(session_json, "session"),
        read_arg(portfolio_id, "portfolio_id"),
        read_arg(date, "date"),
    ) else {
        return ptr::null_mut();
    };

    finish(merge_session_json(&previous, &session, &portfolio, &date))
}

/// Merge a visit's heatmap samples into a day's heatmap.
///
/// # Safety
/// - Both arguments must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `folio_free_string`.
/// - Returns NULL on error; call `folio_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn folio_merge_heatmap(
    existing_json: *const c_char,
    update_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let (Some(existing), Some(update)) = (
        read_arg(existing_json, "existing heatmap"),
        read_arg(update_json, "heatmap update"),
    ) else {
        return ptr::null_mut();
    };

    finish(merge_heatmap_json(&existing, &update))
}

/// Compute the z-score set for the current aggregate.
///
/// # Safety
/// - Both arguments must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `folio_free_string`.
/// - Returns NULL on error; call `folio_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn folio_zscores(
    current_json: *const c_char,
    history_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let (Some(current), Some(history)) = (
        read_arg(current_json, "current aggregate"),
        read_arg(history_json, "history"),
    ) else {
        return ptr::null_mut();
    };

    finish(zscores_json(&current, &history))
}

// ============================================================================
// Configured Processor API
// ============================================================================

/// Opaque handle to a configured EngagementProcessor
pub struct FolioProcessorHandle {
    processor: EngagementProcessor,
}

/// Create a processor from a JSON configuration (NULL for defaults).
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Must be freed with `folio_processor_free`.
/// - Returns NULL on error; call `folio_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn folio_processor_new(
    config_json: *const c_char,
) -> *mut FolioProcessorHandle {
    clear_last_error();

    let processor = if config_json.is_null() {
        EngagementProcessor::new()
    } else {
        let Some(json) = read_arg(config_json, "config") else {
            return ptr::null_mut();
        };
        match EngagementProcessor::from_config_json(&json) {
            Ok(p) => p,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    Box::into_raw(Box::new(FolioProcessorHandle { processor }))
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `folio_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn folio_processor_free(processor: *mut FolioProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Merge a session with a configured processor.
///
/// # Safety
/// Same contract as `folio_merge_session`; `processor` must come from
/// `folio_processor_new`.
#[no_mangle]
pub unsafe extern "C" fn folio_processor_merge_session(
    processor: *const FolioProcessorHandle,
    previous_json: *const c_char,
    session_json: *const c_char,
    portfolio_id: *const c_char,
    date: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    let (Some(previous), Some(session), Some(portfolio), Some(date)) = (
        read_arg(previous_json, "previous aggregate"),
        read_arg(session_json, "session"),
        read_arg(portfolio_id, "portfolio_id"),
        read_arg(date, "date"),
    ) else {
        return ptr::null_mut();
    };

    finish(
        handle
            .processor
            .merge_session_json(&previous, &session, &portfolio, &date),
    )
}

/// Merge heatmap samples with a configured processor.
///
/// # Safety
/// Same contract as `folio_merge_heatmap`; `processor` must come from
/// `folio_processor_new`.
#[no_mangle]
pub unsafe extern "C" fn folio_processor_merge_heatmap(
    processor: *const FolioProcessorHandle,
    existing_json: *const c_char,
    update_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    let (Some(existing), Some(update)) = (
        read_arg(existing_json, "existing heatmap"),
        read_arg(update_json, "heatmap update"),
    ) else {
        return ptr::null_mut();
    };

    finish(handle.processor.merge_heatmap_json(&existing, &update))
}

/// Compute z-scores with a configured processor.
///
/// # Safety
/// Same contract as `folio_zscores`; `processor` must come from
/// `folio_processor_new`.
#[no_mangle]
pub unsafe extern "C" fn folio_processor_zscores(
    processor: *const FolioProcessorHandle,
    current_json: *const c_char,
    history_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }
    let handle = &*processor;

    let (Some(current), Some(history)) = (
        read_arg(current_json, "current aggregate"),
        read_arg(history_json, "history"),
    ) else {
        return ptr::null_mut();
    };

    finish(handle.processor.zscores_json(&current, &history))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Folio functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Folio function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn folio_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Folio function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn folio_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn folio_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
