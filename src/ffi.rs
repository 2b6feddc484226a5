//! FFI interface for C/C++ callers
//!
//! Schemas go in and documents come out as JSON, so the ABI stays a pair of
//! functions.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use crate::config::SchemaConfig;

/// Result struct returned to C/C++
/// Both pointers are owned by Rust and must be freed via free_schema_result
#[repr(C)]
pub struct SchemaResultFFI {
    /// JSON object of parsed field values (null-terminated)
    pub json_ptr: *mut c_char,
    /// Error message if extraction failed (null-terminated), or null on success
    pub error_ptr: *mut c_char,
}

/// Parse HTML with a schema given as JSON.
///
/// # Arguments
/// * `html_ptr` - Pointer to HTML content (UTF-8, not necessarily null-terminated)
/// * `html_len` - Length of HTML content in bytes
/// * `schema_json` - JSON-serialized SchemaConfig (null-terminated)
///
/// # Returns
/// SchemaResultFFI with either json_ptr set (success) or error_ptr set (failure)
///
/// # Safety
/// - `html_ptr` must point to valid memory of at least `html_len` bytes
/// - `schema_json` must be a valid null-terminated C string
/// - Caller must free the result via `free_schema_result`
#[no_mangle]
pub unsafe extern "C" fn extract_schema_from_html(
    html_ptr: *const c_char,
    html_len: usize,
    schema_json: *const c_char,
) -> SchemaResultFFI {
    let html = if html_ptr.is_null() || html_len == 0 {
        ""
    } else {
        let slice = std::slice::from_raw_parts(html_ptr as *const u8, html_len);
        match std::str::from_utf8(slice) {
            Ok(s) => s,
            Err(_) => return make_error_result("Invalid UTF-8 in HTML content"),
        }
    };

    if schema_json.is_null() {
        return make_error_result("Schema JSON is null");
    }
    let schema_str = match CStr::from_ptr(schema_json).to_str() {
        Ok(s) => s,
        Err(_) => return make_error_result("Invalid UTF-8 in schema JSON"),
    };

    let config = match SchemaConfig::from_json(schema_str) {
        Ok(config) => config,
        Err(e) => return make_error_result(&format!("Failed to parse schema JSON: {}", e)),
    };

    let document = match config.extract(html) {
        Ok(document) => document,
        Err(e) => return make_error_result(&e.to_string()),
    };

    match CString::new(document.to_string()) {
        Ok(cstr) => SchemaResultFFI {
            json_ptr: cstr.into_raw(),
            error_ptr: ptr::null_mut(),
        },
        Err(_) => make_error_result("Result JSON contains null bytes"),
    }
}

/// Free a SchemaResultFFI returned by extract_schema_from_html
///
/// # Safety
/// - `result` must have been returned by `extract_schema_from_html`
/// - Must only be called once per result
#[no_mangle]
pub unsafe extern "C" fn free_schema_result(result: SchemaResultFFI) {
    if !result.json_ptr.is_null() {
        drop(CString::from_raw(result.json_ptr));
    }
    if !result.error_ptr.is_null() {
        drop(CString::from_raw(result.error_ptr));
    }
}

// Helper to create error result
fn make_error_result(msg: &str) -> SchemaResultFFI {
    let error_cstr = CString::new(msg.replace('\0', " ")).unwrap_or_default();
    SchemaResultFFI {
        json_ptr: ptr::null_mut(),
        error_ptr: error_cstr.into_raw(),
    }
}
