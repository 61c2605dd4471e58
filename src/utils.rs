//! Small helpers shared across modules.

/// Runs a closure when dropped, including during unwinding.
pub(crate) struct CallOnDrop {
    f: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl CallOnDrop {
    pub(crate) fn new<F: FnOnce() + Send + 'static>(f: F) -> CallOnDrop {
        CallOnDrop {
            f: Some(Box::new(f)),
        }
    }
}

impl Drop for CallOnDrop {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_runs_on_drop() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);

        let token = CallOnDrop::new(move || flag.store(true, Ordering::SeqCst));
        assert!(!called.load(Ordering::SeqCst));

        drop(token);
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_runs_during_unwind() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);

        let result = std::panic::catch_unwind(move || {
            let _token = CallOnDrop::new(move || flag.store(true, Ordering::SeqCst));
            panic!("unwind");
        });

        assert!(result.is_err());
        assert!(called.load(Ordering::SeqCst));
    }
}
