//! FFI bindings for NeuroCalm Flux
//!
//! This module provides C-compatible functions for calling the autofill and
//! normalization stages from other languages. All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the
//! caller using `neurocalm_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::Path;
use std::ptr;

use crate::config::FluxConfig;
use crate::normalizer::BandNormalizer;
use crate::pipeline::autofill;
use crate::types::ChannelBandAverages;

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

/// Parse an optional TOML configuration; NULL means defaults
unsafe fn config_from_ptr(config_toml: *const c_char) -> Result<FluxConfig, String> {
    if config_toml.is_null() {
        return Ok(FluxConfig::default());
    }
    let text = cstr_to_string(config_toml).ok_or("Invalid config string pointer")?;
    FluxConfig::from_toml(&text).map_err(|e| e.to_string())
}

/// Read the snapshot at `snapshot_path` and return the autofill response JSON.
///
/// Data problems are reported inside the JSON (`source: "error"`), so NULL is
/// only returned for invalid arguments.
///
/// # Safety
/// - `snapshot_path` must be a valid null-terminated C string.
/// - `config_toml` must be NULL or a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `neurocalm_free_string`.
#[no_mangle]
pub unsafe extern "C" fn neurocalm_autofill(
    snapshot_path: *const c_char,
    config_toml: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let path = match cstr_to_string(snapshot_path) {
        Some(s) => s,
        None => {
            set_last_error("Invalid snapshot path pointer");
            return ptr::null_mut();
        }
    };

    let config = match config_from_ptr(config_toml) {
        Ok(config) => config,
        Err(e) => {
            set_last_error(&e);
            return ptr::null_mut();
        }
    };

    let response = autofill(Path::new(&path), &config);
    match serde_json::to_string(&response) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Normalize channel averages JSON (`{"TP9": {"Alpha": 40.0}, ...}`) into the
/// canonical band vector JSON.
///
/// # Safety
/// - `averages_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `neurocalm_free_string`.
/// - Returns NULL on error; call `neurocalm_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn neurocalm_normalize_json(averages_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json = match cstr_to_string(averages_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let averages: ChannelBandAverages = match serde_json::from_str(&json) {
        Ok(a) => a,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let powers = BandNormalizer::default().normalize(&averages);
    match serde_json::to_string(&powers) {
        Ok(out) => string_to_cstr(&out),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a string returned by this library.
///
/// # Safety
/// - `ptr` must be NULL or a pointer returned by a `neurocalm_*` function.
#[no_mangle]
pub unsafe extern "C" fn neurocalm_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Get the last error message for the calling thread.
///
/// # Safety
/// - The returned pointer is valid until the next `neurocalm_*` call on this thread.
/// - Do not free the returned pointer.
#[no_mangle]
pub unsafe extern "C" fn neurocalm_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(err) => err.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version string.
///
/// # Safety
/// - The returned pointer is static; do not free it.
#[no_mangle]
pub unsafe extern "C" fn neurocalm_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
