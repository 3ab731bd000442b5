//! Hardware seams.
//!
//! The engine and the SMBus layer never touch registers directly. A platform
//! crate implements these traits for its I2C peripheral and interrupt
//! controller, the test suite implements them with a simulated bus.

use bitflags::bitflags;

use crate::config::MasterConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Transmit,
    Receive,
}

/// Burst control vocabulary of the master controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MasterCommand {
    SingleSend,
    SingleReceive,
    BurstSendStart,
    BurstSendCont,
    BurstSendFinish,
    BurstSendErrorStop,
    BurstReceiveStart,
    BurstReceiveCont,
    BurstReceiveFinish,
    QuickCommand,
}

impl MasterCommand {
    /// Generates a (repeated) START and an address phase.
    pub fn starts(self) -> bool {
        matches!(
            self,
            Self::SingleSend
                | Self::SingleReceive
                | Self::BurstSendStart
                | Self::BurstReceiveStart
                | Self::QuickCommand
        )
    }

    /// Generates a STOP once the byte (if any) has been transferred.
    pub fn stops(self) -> bool {
        matches!(
            self,
            Self::SingleSend
                | Self::SingleReceive
                | Self::BurstSendFinish
                | Self::BurstSendErrorStop
                | Self::BurstReceiveFinish
                | Self::QuickCommand
        )
    }

    /// Moves a data byte.
    pub fn transfers(self) -> bool {
        !matches!(self, Self::BurstSendErrorStop | Self::QuickCommand)
    }

    /// Received byte is acknowledged so the target keeps sending.
    pub fn acks(self) -> bool {
        matches!(self, Self::BurstReceiveStart | Self::BurstReceiveCont)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MasterStatus: u8 {
        const BUSY = 1 << 0;
        const ERROR = 1 << 1;
        const ADDR_NACK = 1 << 2;
        const DATA_NACK = 1 << 3;
        const ARB_LOST = 1 << 4;
        const IDLE = 1 << 5;
        const BUS_BUSY = 1 << 6;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MasterInterrupt: u8 {
        const DATA = 1 << 0;
        const TIMEOUT = 1 << 1;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlaveInterrupt: u8 {
        const DATA = 1 << 0;
        const START = 1 << 1;
        const STOP = 1 << 2;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlaveStatus: u8 {
        const RREQ = 1 << 0;
        const TREQ = 1 << 1;
        const FBR = 1 << 2;
        const OAR2SEL = 1 << 3;
        const QCMD = 1 << 4;
        const QCMD_DATA = 1 << 5;
    }
}

impl MasterStatus {
    pub fn failed(self) -> bool {
        self.intersects(Self::ERROR | Self::ARB_LOST)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlaveAction {
    None,
    Receive,
    Transmit,
    FirstByte,
}

impl SlaveStatus {
    pub fn action(self) -> SlaveAction {
        if self.contains(Self::RREQ | Self::FBR) {
            SlaveAction::FirstByte
        } else if self.contains(Self::RREQ) {
            SlaveAction::Receive
        } else if self.contains(Self::TREQ) {
            SlaveAction::Transmit
        } else {
            SlaveAction::None
        }
    }

    pub fn slot(self) -> AddressSlot {
        if self.contains(Self::OAR2SEL) {
            AddressSlot::Secondary
        } else {
            AddressSlot::Primary
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressSlot {
    Primary,
    Secondary,
}

/// The peripheral's line in the interrupt controller.
pub trait InterruptLine {
    fn is_enabled(&self) -> bool;

    fn enable(&mut self);

    fn disable(&mut self);

    /// Pends the interrupt from software.
    fn trigger(&mut self);
}

pub trait I2cMaster {
    fn init_master(&mut self, config: &MasterConfig);

    fn set_target(&mut self, address: u8, direction: Direction);

    fn put_data(&mut self, byte: u8);

    fn get_data(&mut self) -> u8;

    fn control(&mut self, command: MasterCommand);

    /// The controller is mid-transfer.
    fn is_busy(&self) -> bool;

    /// The bus is held, by us or by another master.
    fn is_bus_busy(&self) -> bool;

    fn status(&self) -> MasterStatus;

    fn interrupt_status(&self) -> MasterInterrupt;

    fn clear_interrupts(&mut self, interrupts: MasterInterrupt);

    fn enable_interrupts(&mut self, interrupts: MasterInterrupt);
}

pub trait I2cSlave {
    fn init_slave(&mut self);

    fn set_own_address(&mut self, slot: AddressSlot, address: u8);

    fn own_address(&self, slot: AddressSlot) -> u8;

    fn read_data(&mut self) -> u8;

    fn write_data(&mut self, byte: u8);

    fn slave_status(&self) -> SlaveStatus;

    fn slave_interrupt_status(&self) -> SlaveInterrupt;

    fn clear_slave_interrupts(&mut self, interrupts: SlaveInterrupt);

    fn enable_slave_interrupts(&mut self, interrupts: SlaveInterrupt);

    fn set_ack_override(&mut self, enabled: bool);

    fn ack_override(&self) -> bool;

    fn set_ack_value(&mut self, ack: bool);
}
