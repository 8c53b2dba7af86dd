use core::cell::OnceCell;

/// Can only be set once
#[derive(Debug)]
pub struct SetOnce<T> {
    inner: OnceCell<T>,
}

impl<T> SetOnce<T> {
    /// Creates an unset `SetOnce`
    pub const fn new() -> Self {
        Self {
            inner: OnceCell::new(),
        }
    }

    /// Sets the value
    ///
    /// Panics if the value is already set
    pub fn set(&self, value: T) {
        assert!(self.inner.set(value).is_ok(), "SetOnce set twice");
    }

    /// Gets the value
    ///
    /// Panics if the value is not yet set
    pub fn get(&self) -> &T {
        self.inner
            .get()
            .expect("Should not access before being set")
    }

    /// Gets the value, or `None` if it has not been set yet
    pub fn try_get(&self) -> Option<&T> {
        self.inner.get()
    }
}

// SAFETY: The single set happens on the boot core before any other core
// is powered on; afterwards access is read-only
unsafe impl<T> Sync for SetOnce<T> {}
unsafe impl<T> Send for SetOnce<T> {}

/// Ensures that the enclosing function is only called once.
/// Panics if run more than once
#[macro_export]
macro_rules! call_once {
    () => {{
        use core::sync::atomic::{AtomicBool, Ordering::AcqRel};
        static IS_FIRST_INVOCATION: AtomicBool = AtomicBool::new(false);
        assert!(!IS_FIRST_INVOCATION.swap(true, AcqRel));
    }};
}
