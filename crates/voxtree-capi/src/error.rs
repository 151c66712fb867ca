//! Error codes and the last-error message exposed across the C boundary

use std::cell::RefCell;
use std::ffi::{c_char, CStr, CString};
use std::panic::{self, AssertUnwindSafe};

use voxtree::core::Error;
use voxtree::core::Result;

pub const VT_OK: i32 = 0;
pub const VT_INVALID_ARGUMENT: i32 = 1;
pub const VT_DATABASE_ERROR: i32 = 2;
pub const VT_COMPRESSION_ERROR: i32 = 3;
pub const VT_RUNTIME_ERROR: i32 = 4;
pub const VT_UNKNOWN_ERROR: i32 = 5;

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

/// Status code for an error
pub fn error_code(error: &Error) -> i32 {
    match error {
        Error::InvalidArgument(_) => VT_INVALID_ARGUMENT,
        Error::Database(_) | Error::Io(_) => VT_DATABASE_ERROR,
        Error::Compression(_) => VT_COMPRESSION_ERROR,
        Error::Runtime(_) => VT_RUNTIME_ERROR,
    }
}

/// Name of a status code
pub fn error_code_name(code: i32) -> &'static CStr {
    match code {
        VT_OK => c"VT_OK",
        VT_INVALID_ARGUMENT => c"VT_INVALID_ARGUMENT",
        VT_DATABASE_ERROR => c"VT_DATABASE_ERROR",
        VT_COMPRESSION_ERROR => c"VT_COMPRESSION_ERROR",
        VT_RUNTIME_ERROR => c"VT_RUNTIME_ERROR",
        VT_UNKNOWN_ERROR => c"VT_UNKNOWN_ERROR",
        _ => c"Unrecognised error code",
    }
}

pub fn set_last_error(message: &str) {
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|last| *last.borrow_mut() = message);
}

/// Pointer to this thread's last error message. Valid until the next failing
/// call on the same thread.
pub fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|last| last.borrow().as_ptr())
}

/// Run the body of an exported function, turning errors and panics into codes
pub fn guard(function: &str, body: impl FnOnce() -> Result<()>) -> i32 {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => VT_OK,
        Ok(Err(e)) => {
            log::error!("{} failed: {}", function, e);
            set_last_error(&e.to_string());
            error_code(&e)
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("{} panicked: {}", function, message);
            set_last_error(&format!("Panic in {function}: {message}"));
            VT_UNKNOWN_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_error() -> String {
        unsafe { CStr::from_ptr(last_error_ptr()) }.to_string_lossy().into_owned()
    }

    #[test]
    fn test_codes_match_errors() {
        assert_eq!(error_code(&Error::invalid_argument("x")), VT_INVALID_ARGUMENT);
        assert_eq!(error_code(&Error::database("x")), VT_DATABASE_ERROR);
        assert_eq!(error_code(&Error::Compression("x".into())), VT_COMPRESSION_ERROR);
        assert_eq!(error_code(&Error::runtime("x")), VT_RUNTIME_ERROR);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(error_code(&Error::Io(io)), VT_DATABASE_ERROR);
    }

    #[test]
    fn test_code_names() {
        assert_eq!(error_code_name(VT_OK), c"VT_OK");
        assert_eq!(error_code_name(VT_RUNTIME_ERROR), c"VT_RUNTIME_ERROR");
        assert_eq!(error_code_name(42), c"Unrecognised error code");
    }

    #[test]
    fn test_guard_records_errors() {
        assert_eq!(guard("ok", || Ok(())), VT_OK);

        let code = guard("bad", || Err(Error::invalid_argument("lower corner above upper")));
        assert_eq!(code, VT_INVALID_ARGUMENT);
        assert!(last_error().contains("lower corner above upper"));
    }

    #[test]
    fn test_guard_catches_panics() {
        let code = guard("boom", || panic!("exploded"));
        assert_eq!(code, VT_UNKNOWN_ERROR);
        assert!(last_error().contains("exploded"));
    }
}
