use core::ops::{Deref, DerefMut};

use crate::hal::InterruptLine;

/// Masks a peripheral interrupt for as long as it lives.
///
/// The line is only unmasked on drop if it was enabled when the guard was
/// taken, so nesting and masking from an already-masked context are fine.
pub struct IrqMask<'a, L: InterruptLine> {
    line: &'a mut L,
    was_enabled: bool,
}

impl<'a, L: InterruptLine> IrqMask<'a, L> {
    pub fn new(line: &'a mut L) -> Self {
        let was_enabled = line.is_enabled();
        if was_enabled {
            line.disable();
        }

        Self { line, was_enabled }
    }
}

impl<L: InterruptLine> Deref for IrqMask<'_, L> {
    type Target = L;

    fn deref(&self) -> &L {
        self.line
    }
}

impl<L: InterruptLine> DerefMut for IrqMask<'_, L> {
    fn deref_mut(&mut self) -> &mut L {
        self.line
    }
}

impl<L: InterruptLine> Drop for IrqMask<'_, L> {
    fn drop(&mut self) {
        if self.was_enabled {
            self.line.enable();
        }
    }
}
