use core::cell::{Ref, RefCell};

use atomic::{Atomic, Ordering};
use bytemuck::NoUninit;
use critical_section::{CriticalSection, Mutex};
use heapless::Deque;

pub struct StateHolder<S: NoUninit, const HISTORY_SIZE: usize> {
    history: Mutex<RefCell<Deque<S, HISTORY_SIZE>>>,
    state: Atomic<S>,
}

impl<S: NoUninit + Copy, const HISTORY_SIZE: usize> StateHolder<S, HISTORY_SIZE> {
    pub const fn new(initial: S) -> Self {
        Self {
            history: Mutex::new(RefCell::new(Deque::new())),
            state: Atomic::new(initial),
        }
    }

    pub fn set_state(&self, state: S) {
        self.add_state_in_history(state);
        self.state.store(state, Ordering::SeqCst);
    }

    pub fn get_state(&self) -> S {
        self.state.load(Ordering::SeqCst)
    }

    #[allow(dead_code)]
    pub fn get_history<'cs>(
        &'cs self,
        cs: CriticalSection<'cs>,
    ) -> Ref<'cs, Deque<S, HISTORY_SIZE>> {
        self.history.borrow_ref(cs)
    }

    fn add_state_in_history(&self, state: S) {
        critical_section::with(|cs| {
            let mut h = self.history.borrow_ref_mut(cs);
            if h.is_full() {
                h.pop_front();
            }
            let _ = h.push_back(state);
        });
    }
}

#[cfg(feature = "dump")]
pub fn deque_into_array<T: Copy, const N: usize>(d: &Deque<T, N>, arr: &mut [T; N]) {
    let n = d.len();
    let (a, b) = d.as_slices();
    let s = N - n;

    arr[s..s + a.len()].copy_from_slice(a);
    arr[s + a.len()..].copy_from_slice(b);
}
