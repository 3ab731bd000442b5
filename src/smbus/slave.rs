use crate::{
    config::SMBUS_MAX_BLOCK,
    hal::{AddressSlot, I2cSlave, InterruptLine, SlaveAction, SlaveInterrupt, SlaveStatus},
    pec::crc8,
};

use super::{Flags, MasterState, SlaveEvent, SlaveState, Smbus, SmbusError, Udid};

impl<H: I2cSlave + InterruptLine> Smbus<H> {
    /// Resets the instance and enables the slave. Acknowledgement is
    /// automatic until [`Smbus::slave_manual_ack_enable`].
    pub fn slave_init(&mut self) {
        self.reset();
        self.hw.init_slave();
    }

    pub fn slave_int_enable(&mut self) {
        self.hw
            .enable_slave_interrupts(SlaveInterrupt::DATA | SlaveInterrupt::STOP);
        self.hw.enable();
    }

    pub fn slave_address_set(&mut self, slot: AddressSlot, address: u8) {
        self.hw.set_own_address(slot, address);
    }

    /// Identity reported when this device takes part in ARP.
    pub fn slave_udid_set(&mut self, udid: Udid) {
        self.set_udid(Some(udid));
    }

    /// Data to clock out on the next read request.
    pub fn slave_tx_buffer_set(&mut self, data: &[u8]) -> Result<(), SmbusError> {
        if data.len() > SMBUS_MAX_BLOCK {
            return Err(SmbusError::DataSize);
        }
        self.tx[..data.len()].copy_from_slice(data);
        self.tx_size = data.len();
        Ok(())
    }

    /// How many bytes the next write from the master may carry.
    pub fn slave_rx_buffer_set(&mut self, size: usize) -> Result<(), SmbusError> {
        if size > SMBUS_MAX_BLOCK {
            return Err(SmbusError::DataSize);
        }
        self.rx_size = size;
        Ok(())
    }

    pub fn slave_command_get(&self) -> u8 {
        self.current_command
    }

    pub fn slave_process_call_enable(&mut self) {
        self.flags.insert(Flags::PROCESS_CALL);
    }

    pub fn slave_process_call_disable(&mut self) {
        self.flags.remove(Flags::PROCESS_CALL);
    }

    pub fn slave_block_transfer_enable(&mut self) {
        self.flags.insert(Flags::BLOCK_TRANSFER);
    }

    pub fn slave_block_transfer_disable(&mut self) {
        self.flags.remove(Flags::BLOCK_TRANSFER);
    }

    /// Treats all traffic as raw I2C. Survives [`Smbus::slave_transfer_init`].
    pub fn slave_i2c_enable(&mut self) {
        self.flags.insert(Flags::RAW_I2C);
    }

    pub fn slave_i2c_disable(&mut self) {
        self.flags.remove(Flags::RAW_I2C);
    }

    /// Address Resolved flag.
    pub fn slave_arp_flag_ar_set(&mut self, value: bool) {
        self.flags.set(Flags::ADDRESS_RESOLVED, value);
    }

    pub fn slave_arp_flag_ar_get(&self) -> bool {
        self.flags.contains(Flags::ADDRESS_RESOLVED)
    }

    /// Address Valid flag.
    pub fn slave_arp_flag_av_set(&mut self, value: bool) {
        self.flags.set(Flags::ADDRESS_VALID, value);
    }

    pub fn slave_arp_flag_av_get(&self) -> bool {
        self.flags.contains(Flags::ADDRESS_VALID)
    }

    /// Readies the slave for the next transfer. PEC, raw mode and the ARP
    /// flags are kept.
    pub fn slave_transfer_init(&mut self) {
        self.flags.remove(
            Flags::BLOCK_TRANSFER | Flags::PROCESS_CALL | Flags::TRANSFER_IN_PROGRESS,
        );
        self.set_master_state(MasterState::Idle);
        self.set_slave_state(SlaveState::Idle);
        self.current_command = 0;
        self.calculated_crc = 0;
        self.tx_size = 0;
        self.tx_index = 0;
        self.rx_size = 0;
        self.rx_index = 0;
    }

    /// ACK (`true`) or NACK the current byte. Needs manual ACK enabled.
    pub fn slave_ack_send(&mut self, ack: bool) {
        self.hw.set_ack_value(ack);
    }

    pub fn slave_manual_ack_enable(&mut self) {
        self.hw.set_ack_override(true);
    }

    pub fn slave_manual_ack_disable(&mut self) {
        self.hw.set_ack_override(false);
    }

    pub fn slave_manual_ack_status(&self) -> bool {
        self.hw.ack_override()
    }

    /// Which of the two own addresses the master called.
    pub fn slave_int_address_get(&self) -> AddressSlot {
        self.hw.slave_status().slot()
    }

    /// Handles one slave interrupt.
    pub fn slave_int_process(&mut self) -> Result<SlaveEvent, SmbusError> {
        let interrupts = self.hw.slave_interrupt_status();
        let status = self.hw.slave_status();

        if interrupts.contains(SlaveInterrupt::START) {
            self.hw.clear_slave_interrupts(SlaveInterrupt::START);
            return Ok(SlaveEvent::Progress);
        }

        if interrupts.contains(SlaveInterrupt::STOP) {
            self.end_transfer();
            self.hw.clear_slave_interrupts(SlaveInterrupt::STOP);

            if status.contains(SlaveStatus::QCMD) {
                // Nothing moves through the buffers during a quick command.
                if self.rx_index != 0 || self.tx_index != 0 {
                    return Err(SmbusError::Slave);
                }
                let data = status.contains(SlaveStatus::QCMD_DATA);
                debug!("smbus quick command {=bool}", data);
                return Ok(SlaveEvent::QuickCommand(data));
            }

            self.set_slave_state(SlaveState::Idle);
            return Ok(SlaveEvent::TransferComplete);
        }

        if !interrupts.contains(SlaveInterrupt::DATA) {
            return Ok(SlaveEvent::Progress);
        }
        self.hw.clear_slave_interrupts(SlaveInterrupt::DATA);
        self.check_framing();

        match status.action() {
            SlaveAction::None => Err(SmbusError::Slave),
            SlaveAction::FirstByte => {
                self.flags.insert(Flags::TRANSFER_IN_PROGRESS);
                self.first_byte(status)
            }
            SlaveAction::Receive => {
                self.flags.insert(Flags::TRANSFER_IN_PROGRESS);
                self.receive()
            }
            SlaveAction::Transmit => {
                self.flags.insert(Flags::TRANSFER_IN_PROGRESS);
                self.transmit(status)
            }
        }
    }

    /// Starts clocking out the transmit buffer after
    /// [`SlaveEvent::NotReady`].
    pub fn slave_data_send(&mut self) -> Result<SlaveEvent, SmbusError> {
        self.begin_transmit()
    }

    fn first_byte(&mut self, status: SlaveStatus) -> Result<SlaveEvent, SmbusError> {
        self.own_address = self.hw.own_address(status.slot());
        let byte = self.hw.read_data();

        if self.flags.contains(Flags::RAW_I2C) {
            if self.rx_index >= self.rx_size {
                self.set_slave_state(SlaveState::ReadDone);
                return Err(SmbusError::Slave);
            }
            self.rx[self.rx_index] = byte;
            self.rx_index += 1;
        } else {
            self.current_command = byte;
        }

        if self.pec() {
            self.calculated_crc = crc8(crc8(0, &[self.own_address << 1]), &[byte]);
        }

        self.set_slave_state(SlaveState::PostCommand);
        Ok(SlaveEvent::FirstByte)
    }

    fn receive(&mut self) -> Result<SlaveEvent, SmbusError> {
        let byte = self.hw.read_data();

        match self.slave_state() {
            SlaveState::PostCommand if self.flags.contains(Flags::BLOCK_TRANSFER) => {
                if byte as usize > self.rx_size {
                    warn!("smbus slave block of {=u8} bytes does not fit", byte);
                    self.set_slave_state(SlaveState::ReadDone);
                    return Err(SmbusError::DataSize);
                }

                self.rx_size = byte as usize;
                if self.pec() {
                    self.crc_update(&[byte]);
                }
                self.set_slave_state(SlaveState::ReadNext);
                Ok(SlaveEvent::Progress)
            }
            SlaveState::PostCommand | SlaveState::ReadNext => self.store(byte),
            SlaveState::ReadPec => {
                self.received_crc = byte;
                if self.received_crc != self.calculated_crc {
                    warn!(
                        "smbus slave pec mismatch: got {=u8:#x}, expected {=u8:#x}",
                        self.received_crc,
                        self.calculated_crc
                    );
                    return Err(SmbusError::PecError);
                }
                self.set_slave_state(SlaveState::ReadDone);
                Ok(SlaveEvent::Progress)
            }
            _ => Err(SmbusError::Slave),
        }
    }

    fn store(&mut self, byte: u8) -> Result<SlaveEvent, SmbusError> {
        if self.rx_index >= self.rx_size {
            self.set_slave_state(SlaveState::ReadDone);
            return Err(SmbusError::Slave);
        }

        self.rx[self.rx_index] = byte;
        self.rx_index += 1;
        if self.pec() {
            self.crc_update(&[byte]);
        }

        let next = if self.rx_index < self.rx_size {
            SlaveState::ReadNext
        } else if self.expects_pec() {
            SlaveState::ReadPec
        } else {
            SlaveState::ReadDone
        };
        self.set_slave_state(next);
        Ok(SlaveEvent::Progress)
    }

    fn transmit(&mut self, status: SlaveStatus) -> Result<SlaveEvent, SmbusError> {
        match self.slave_state() {
            SlaveState::Idle
            | SlaveState::PostCommand
            | SlaveState::ReadNext
            | SlaveState::ReadPec
            | SlaveState::ReadDone => {
                self.own_address = self.hw.own_address(status.slot());
                self.begin_transmit()
            }
            SlaveState::WriteNext => {
                let byte = self.next_slave_tx();
                if self.pec() {
                    self.crc_update(&[byte]);
                    if self.tx_index == self.tx_size {
                        self.set_slave_state(SlaveState::WriteFinal);
                    }
                } else if self.tx_index + 1 >= self.tx_size {
                    self.set_slave_state(SlaveState::WriteFinal);
                }
                self.hw.write_data(byte);
                Ok(SlaveEvent::Progress)
            }
            SlaveState::WriteFinal => {
                let byte = if self.pec() {
                    self.calculated_crc
                } else {
                    self.next_slave_tx()
                };
                self.hw.write_data(byte);
                self.set_slave_state(SlaveState::WriteDone);
                Ok(SlaveEvent::Progress)
            }
            SlaveState::WriteDone => {
                self.hw.write_data(0xFF);
                Ok(SlaveEvent::Progress)
            }
        }
    }

    /// First byte of a read from this slave: the block size for block
    /// transfers, otherwise the first buffered byte.
    fn begin_transmit(&mut self) -> Result<SlaveEvent, SmbusError> {
        if self.tx_size == 0 {
            return Ok(SlaveEvent::NotReady);
        }

        let byte = if self.flags.contains(Flags::BLOCK_TRANSFER) {
            self.tx_size as u8
        } else {
            self.next_slave_tx()
        };

        let next = if self.pec() {
            self.crc_update(&[(self.own_address << 1) | 1, byte]);
            if self.tx_index == self.tx_size {
                SlaveState::WriteFinal
            } else {
                SlaveState::WriteNext
            }
        } else {
            match self.tx_size.saturating_sub(self.tx_index) {
                0 => SlaveState::WriteDone,
                1 => SlaveState::WriteFinal,
                _ => SlaveState::WriteNext,
            }
        };
        self.set_slave_state(next);

        self.hw.write_data(byte);
        Ok(SlaveEvent::Progress)
    }

    /// Next buffered byte, 0xFF once the buffer is exhausted.
    fn next_slave_tx(&mut self) -> u8 {
        if self.tx_index < self.tx_size {
            self.tx_index += 1;
            self.tx[self.tx_index - 1]
        } else {
            0xFF
        }
    }

    /// The master ends its write with a PEC byte. The write half of a
    /// process call carries none.
    fn expects_pec(&self) -> bool {
        self.pec() && !self.flags.contains(Flags::PROCESS_CALL)
    }
}
