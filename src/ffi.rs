//! FFI bindings for haptic alerts
//!
//! C-compatible functions for driving a metric processor from the host app.
//! All functions take null-terminated C strings; returned strings are
//! allocated and must be freed by the caller using `hapt_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::adapters::ReadingSource;
use crate::codec::{decode_alert_config, VibrationWaveform};
use crate::processor::{fired_alerts, MetricProcessor};
use crate::types::{AlertFired, ConfigSnapshot, MetricEvaluationResult, MetricKind, SensorEvent};

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

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Opaque handle to a metric processor and the configurations pushed to it
pub struct HaptProcessorHandle {
    processor: MetricProcessor,
    configs: ConfigSnapshot,
}

impl HaptProcessorHandle {
    /// Serialize the alerts fired by one evaluation as a JSON array
    fn alerts_json(&self, results: &[MetricEvaluationResult]) -> *mut c_char {
        let at = self.processor.last_evaluated_at().unwrap_or_default();
        alerts_to_cstr(&fired_alerts(results, at))
    }
}

fn alerts_to_cstr(alerts: &[AlertFired]) -> *mut c_char {
    match serde_json::to_string(alerts) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Processor API
// ============================================================================

/// Create a processor for one metric (`heart_rate`, `activity`, `calories` or `stress`).
///
/// # Safety
/// - `metric` must be a valid null-terminated C string.
/// - Must be freed with `hapt_processor_free`.
/// - Returns NULL for an unknown metric; call `hapt_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn hapt_processor_new(metric: *const c_char) -> *mut HaptProcessorHandle {
    clear_last_error();

    let metric_str = match cstr_to_string(metric) {
        Some(s) => s,
        None => {
            set_last_error("Invalid metric string pointer");
            return ptr::null_mut();
        }
    };

    match metric_str.parse::<MetricKind>() {
        Ok(kind) => Box::into_raw(Box::new(HaptProcessorHandle {
            processor: MetricProcessor::new(kind),
            configs: ConfigSnapshot::new(),
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `hapt_processor_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn hapt_processor_free(processor: *mut HaptProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Apply an alert-configuration message (the `/alert_info` payload).
///
/// # Safety
/// - `processor` must be a valid pointer returned by `hapt_processor_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error; the previous configuration is kept on error.
#[no_mangle]
pub unsafe extern "C" fn hapt_processor_set_config(
    processor: *mut HaptProcessorHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match decode_alert_config(json_str.as_bytes()) {
        Ok(config) => {
            handle.configs.insert(config.id.clone(), config);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Feed one sensor event and return the alerts it fired as a JSON array.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `hapt_processor_new`.
/// - `json` must be a valid null-terminated C string holding one sensor event.
/// - Returns a newly allocated string that must be freed with `hapt_free_string`.
/// - Returns NULL on error; call `hapt_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hapt_processor_push_event(
    processor: *mut HaptProcessorHandle,
    json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let event: SensorEvent = match serde_json::from_str(&json_str) {
        Ok(event) => event,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let results = handle.processor.on_event(&event, &handle.configs);
    handle.alerts_json(&results)
}

/// Feed a raw platform payload and return the alerts it fired as a JSON array.
///
/// `source` names the payload shape: `health_services` for measure and
/// exercise callbacks, `hardware` for raw sensor callbacks. Readings without
/// their own timestamp are stamped with `received_at_ms`. Events for other
/// metrics are ignored.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `hapt_processor_new`.
/// - `source` and `raw_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `hapt_free_string`.
/// - Returns NULL on error; call `hapt_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hapt_processor_push_reading(
    processor: *mut HaptProcessorHandle,
    source: *const c_char,
    raw_json: *const c_char,
    received_at_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let source = match cstr_to_string(source) {
        Some(name) => match ReadingSource::from_name(&name) {
            Some(source) => source,
            None => {
                set_last_error(&format!("Unknown reading source: {name}"));
                return ptr::null_mut();
            }
        },
        None => {
            set_last_error("Invalid source string pointer");
            return ptr::null_mut();
        }
    };

    let json_str = match cstr_to_string(raw_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let events = match source.adapter().parse(&json_str, received_at_ms) {
        Ok(events) => events,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let mut alerts = Vec::new();
    for event in &events {
        let results = handle.processor.on_event(event, &handle.configs);
        let at = handle
            .processor
            .last_evaluated_at()
            .unwrap_or(event.timestamp_ms());
        alerts.extend(fired_alerts(&results, at));
    }
    alerts_to_cstr(&alerts)
}

/// Run the periodic evaluation at `now_ms` and return fired alerts as a JSON array.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `hapt_processor_new`.
/// - Returns a newly allocated string that must be freed with `hapt_free_string`.
/// - Returns NULL on error; call `hapt_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hapt_processor_tick(
    processor: *mut HaptProcessorHandle,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;
    let results = handle.processor.on_tick(now_ms, &handle.configs);
    handle.alerts_json(&results)
}

// ============================================================================
// Codec API
// ============================================================================

/// Validate a waveform message and return it in canonical wire form.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `hapt_free_string`.
/// - Returns NULL if the waveform is invalid; call `hapt_last_error` for the reason.
#[no_mangle]
pub unsafe extern "C" fn hapt_decode_waveform(json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let encoded = VibrationWaveform::from_json(&json_str)
        .map_err(|e| e.to_string())
        .and_then(|waveform| waveform.to_json().map_err(|e| e.to_string()));

    match encoded {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e);
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by haptic alert functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a `hapt_` function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn hapt_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next `hapt_` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn hapt_last_error() -> *const c_char {
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
pub unsafe extern "C" fn hapt_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
