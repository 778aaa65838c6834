//! Non-local exit from a handler once its response has been written.
//!
//! Writing a response unwinds the stack with a [`Terminated`] payload. Only the
//! [`Dispatcher`](crate::Dispatcher) boundary catches it, and it tells it
//! apart from a genuine handler panic by the payload type.

use std::any::Any;
use std::panic;

/// Unwind payload marking a request whose response is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminated;

/// Unwinds to the dispatch boundary.
///
/// Uses [`panic::resume_unwind`], so the panic hook does not run and nothing
/// is printed.
pub(crate) fn terminate() -> ! {
    panic::resume_unwind(Box::new(Terminated))
}

pub(crate) fn is_termination(payload: &(dyn Any + Send)) -> bool {
    payload.is::<Terminated>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::catch_unwind;

    #[test]
    fn test_terminate_is_recognized() {
        let payload = catch_unwind(|| {
            terminate();
        })
        .unwrap_err();
        assert!(is_termination(payload.as_ref()));
    }

    #[test]
    fn test_panic_is_not_termination() {
        let payload = catch_unwind(|| {
            panic!("boom");
        })
        .unwrap_err();
        assert!(!is_termination(payload.as_ref()));
    }
}
