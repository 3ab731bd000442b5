#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

mod command;
mod composite;
mod config;
mod engine;
pub mod hal;
mod interrupts;
mod irq_mask;
mod pec;
mod receive_buffer;
mod send_buffer;
mod shared;
pub mod smbus;
mod state_holder;

#[cfg(test)]
mod mock;

pub use command::Transfer;
pub use config::*;
pub use engine::{Callback, Engine};
pub use pec::crc8;
pub use shared::Shared;

#[cfg(feature = "dump")]
pub use engine::StateDump;

#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum State {
    Idle,
    WriteNext,
    WriteFinal,
    WritePause,
    ReadOne,
    ReadFirst,
    ReadNext,
    ReadFinal,
    ReadPause,
    ReadWait,
    Callback,
}

/// Outcome handed to a command's callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Success,
    AddressNack,
    DataNack,
    ArbitrationLost,
    Error,
    /// A write batch went out; supply the next one with `resume`.
    BatchDone,
    /// A read batch arrived; call `resume` to receive the next one.
    BatchReady,
}

impl Status {
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }
}

impl From<hal::MasterStatus> for Status {
    fn from(status: hal::MasterStatus) -> Self {
        use hal::MasterStatus as S;

        if !status.failed() {
            Status::Success
        } else if status.contains(S::ARB_LOST) {
            Status::ArbitrationLost
        } else if status.contains(S::ADDR_NACK) {
            Status::AddressNack
        } else if status.contains(S::DATA_NACK) {
            Status::DataNack
        } else {
            Status::Error
        }
    }
}

/// An operation was not accepted. No callback fires for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Rejected {
    QueueFull,
    NotPaused,
    /// A register stream holds more data than one command can carry.
    TooLong,
}
