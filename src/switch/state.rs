use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub(crate) struct SwitchState {
    on: AtomicBool,
    optimistic: AtomicBool,
}

impl SwitchState {
    pub(crate) fn new(optimistic: bool) -> Self {
        Self {
            on: AtomicBool::new(false),
            optimistic: AtomicBool::new(optimistic),
        }
    }

    pub(crate) fn is_on(&self) -> bool {
        self.on.load(Ordering::Acquire)
    }

    /// Stores the new value and returns the previous one.
    pub(crate) fn set_on(&self, on: bool) -> bool {
        self.on.swap(on, Ordering::AcqRel)
    }

    pub(crate) fn is_optimistic(&self) -> bool {
        self.optimistic.load(Ordering::Acquire)
    }

    pub(crate) fn force_optimistic(&self) {
        self.optimistic.store(true, Ordering::Release);
    }
}
