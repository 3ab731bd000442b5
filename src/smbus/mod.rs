//! SMBus protocol layer.
//!
//! Drives the I2C peripheral directly, without going through [`Engine`]. The
//! master and slave halves keep separate state machines so a peripheral can
//! play both roles. Master initiators start a transaction and return; the
//! transaction is stepped by [`Smbus::master_int_process`] from the
//! peripheral interrupt. Slave traffic is handled by
//! [`Smbus::slave_int_process`].
//!
//! [`Engine`]: crate::Engine

use bitflags::bitflags;

use crate::{config::SMBUS_MAX_BLOCK, pec::crc8, state_holder::StateHolder};

mod master;
mod slave;
mod udid;

pub use udid::{Udid, UDID_PACKET_LEN};

pub const STATES_HISTORY_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SmbusError {
    /// The bus clock was held low past the configured timeout.
    Timeout,
    /// The controller is in the middle of a transfer.
    PeripheralBusy,
    /// Another master holds the bus.
    BusBusy,
    ArbitrationLost,
    AddressNack,
    DataNack,
    PecError,
    /// A size argument or a received block size is out of range.
    DataSize,
    Master,
    Slave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferStatus {
    InProgress,
    Complete,
}

/// What a slave interrupt amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlaveEvent {
    Progress,
    /// The command byte (or first raw byte) arrived. With manual ACK enabled
    /// the application decides here whether to acknowledge it.
    FirstByte,
    /// A quick command carrying the given data bit.
    QuickCommand(bool),
    TransferComplete,
    /// The master wants data but no transmit buffer is set. Set one and call
    /// [`Smbus::slave_data_send`].
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MasterState {
    Idle,
    WriteBlockSize,
    WriteNext,
    WriteFinal,
    ReadOne,
    ReadFirst,
    ReadBlockSize,
    ReadNext,
    ReadFinal,
    ReadWait,
    ReadErrorStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SlaveState {
    Idle,
    PostCommand,
    ReadNext,
    ReadPec,
    ReadDone,
    WriteNext,
    WriteFinal,
    WriteDone,
}

#[cfg(feature = "dump")]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SmbusStateDump {
    pub master_history: [MasterState; STATES_HISTORY_SIZE],
    pub master_state: MasterState,
    pub slave_history: [SlaveState; STATES_HISTORY_SIZE],
    pub slave_state: SlaveState,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u16 {
        const PEC = 1 << 0;
        const PROCESS_CALL = 1 << 1;
        const BLOCK_TRANSFER = 1 << 2;
        const TRANSFER_IN_PROGRESS = 1 << 3;
        const RAW_I2C = 1 << 4;
        const ADDRESS_RESOLVED = 1 << 5;
        const ADDRESS_VALID = 1 << 6;
        const ARP = 1 << 7;
    }
}

/// One SMBus instance bound to a peripheral.
pub struct Smbus<H> {
    pub(crate) hw: H,
    udid: Option<Udid>,
    pub(crate) flags: Flags,
    pub(crate) master: StateHolder<MasterState, STATES_HISTORY_SIZE>,
    pub(crate) slave: StateHolder<SlaveState, STATES_HISTORY_SIZE>,

    pub(crate) own_address: u8,
    pub(crate) target_address: u8,
    pub(crate) current_command: u8,
    pub(crate) calculated_crc: u8,
    pub(crate) received_crc: u8,

    pub(crate) tx: [u8; SMBUS_MAX_BLOCK],
    pub(crate) tx_size: usize,
    pub(crate) tx_index: usize,
    pub(crate) rx: [u8; SMBUS_MAX_BLOCK],
    pub(crate) rx_size: usize,
    pub(crate) rx_index: usize,
}

impl<H> Smbus<H> {
    pub const fn new(hw: H) -> Self {
        Self {
            hw,
            udid: None,
            flags: Flags::empty(),
            master: StateHolder::new(MasterState::Idle),
            slave: StateHolder::new(SlaveState::Idle),
            own_address: 0,
            target_address: 0,
            current_command: 0,
            calculated_crc: 0,
            received_crc: 0,
            tx: [0; SMBUS_MAX_BLOCK],
            tx_size: 0,
            tx_index: 0,
            rx: [0; SMBUS_MAX_BLOCK],
            rx_size: 0,
            rx_index: 0,
        }
    }

    /// Clears everything but the peripheral.
    pub(crate) fn reset(&mut self) {
        self.udid = None;
        self.flags = Flags::empty();
        self.set_master_state(MasterState::Idle);
        self.set_slave_state(SlaveState::Idle);
        self.own_address = 0;
        self.target_address = 0;
        self.current_command = 0;
        self.calculated_crc = 0;
        self.received_crc = 0;
        self.tx_size = 0;
        self.tx_index = 0;
        self.rx_size = 0;
        self.rx_index = 0;
    }

    /// Appends a PEC byte to every transfer from now on.
    pub fn pec_enable(&mut self) {
        self.flags.insert(Flags::PEC);
    }

    pub fn pec_disable(&mut self) {
        self.flags.remove(Flags::PEC);
    }

    pub fn arp_enable(&mut self) {
        self.flags.insert(Flags::ARP);
    }

    pub fn arp_disable(&mut self) {
        self.flags.remove(Flags::ARP);
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn status(&self) -> TransferStatus {
        if self.flags.contains(Flags::TRANSFER_IN_PROGRESS) {
            TransferStatus::InProgress
        } else {
            TransferStatus::Complete
        }
    }

    /// Bytes received by the last transfer.
    pub fn rx_packet_size(&self) -> usize {
        self.rx_index
    }

    pub fn rx_data(&self) -> &[u8] {
        &self.rx[..self.rx_index]
    }

    pub fn udid(&self) -> Option<&Udid> {
        self.udid.as_ref()
    }

    pub(crate) fn set_udid(&mut self, udid: Option<Udid>) {
        self.udid = udid;
    }

    pub fn master_state(&self) -> MasterState {
        self.master.get_state()
    }

    pub fn slave_state(&self) -> SlaveState {
        self.slave.get_state()
    }

    /// Recent states of both roles, oldest first.
    #[cfg(feature = "dump")]
    pub fn dump_state(&self) -> SmbusStateDump {
        use crate::state_holder::deque_into_array;

        let mut master_history = [MasterState::Idle; STATES_HISTORY_SIZE];
        let mut slave_history = [SlaveState::Idle; STATES_HISTORY_SIZE];

        critical_section::with(|cs| {
            deque_into_array(&self.master.get_history(cs), &mut master_history);
            deque_into_array(&self.slave.get_history(cs), &mut slave_history);
        });

        SmbusStateDump {
            master_history,
            master_state: self.master_state(),
            slave_history,
            slave_state: self.slave_state(),
        }
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub(crate) fn set_master_state(&self, state: MasterState) {
        trace!("smbus master state {}", state);
        self.master.set_state(state);
    }

    pub(crate) fn set_slave_state(&self, state: SlaveState) {
        trace!("smbus slave state {}", state);
        self.slave.set_state(state);
    }

    pub(crate) fn pec(&self) -> bool {
        self.flags.contains(Flags::PEC)
    }

    pub(crate) fn crc_update(&mut self, bytes: &[u8]) {
        self.calculated_crc = crc8(self.calculated_crc, bytes);
    }

    pub(crate) fn end_transfer(&mut self) {
        self.flags.remove(Flags::TRANSFER_IN_PROGRESS);
    }

    pub(crate) fn check_framing(&self) {
        debug_assert!(
            !self
                .flags
                .contains(Flags::RAW_I2C | Flags::BLOCK_TRANSFER),
            "Raw I2C and block framing are mutually exclusive"
        );
    }
}
