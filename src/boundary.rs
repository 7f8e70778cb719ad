//! Failure boundaries between the engine and the host.
//!
//! Nothing raised inside the engine may unwind into host frames. The
//! lifecycle entry points and every installed wrapper run through
//! [`contain`], which turns panics into log lines.

use std::any::Any;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use crate::error::TranslationLookupFailure;

/// Runs `f`, swallowing any panic. Returns `None` if `f` panicked.
pub fn contain<T>(label: &str, f: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            let failure = TranslationLookupFailure::Panicked(panic_message(payload.as_ref()));
            warn!("{}: {}", label, failure);
            None
        }
    }
}

/// Runs a fallible `f`, logging both errors and panics.
pub fn contain_result<T, E: Display>(label: &str, f: impl FnOnce() -> Result<T, E>) -> Option<T> {
    match contain(label, f)? {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {}", label, e);
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contain_passes_value_through() {
        assert_eq!(contain("ok", || 7), Some(7));
    }

    #[test]
    fn test_contain_swallows_panic() {
        let result: Option<()> = contain("boom", || panic!("wrapper exploded"));
        assert_eq!(result, None);
    }

    #[test]
    fn test_contain_result_swallows_error() {
        let result: Option<u8> = contain_result("err", || Err::<u8, _>("bad input"));
        assert_eq!(result, None);
        assert_eq!(contain_result("ok", || Ok::<_, String>(1)), Some(1));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
