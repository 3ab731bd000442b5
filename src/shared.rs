use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

/// An engine or SMBus instance shared between its interrupt vector and
/// mainline code.
///
/// ```ignore
/// static I2C0: Shared<Engine<Board, u8>> = Shared::new();
///
/// #[interrupt]
/// fn I2C0() {
///     I2C0.lock(|engine| engine.on_interrupt());
/// }
/// ```
pub struct Shared<T> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Option<T>>>,
}

impl<T> Shared<T> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Installs the instance, returning the previous one.
    pub fn install(&self, value: T) -> Option<T> {
        self.inner.lock(|cell| cell.borrow_mut().replace(value))
    }

    pub fn take(&self) -> Option<T> {
        self.inner.lock(|cell| cell.borrow_mut().take())
    }

    /// Runs `f` on the instance inside a critical section. Returns `None`
    /// if nothing is installed.
    pub fn lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.inner
            .lock(|cell| cell.borrow_mut().as_mut().map(f))
    }
}

impl<T> Default for Shared<T> {
    fn default() -> Self {
        Self::new()
    }
}
