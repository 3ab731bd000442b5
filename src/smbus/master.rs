use crate::{
    config::{
        MasterConfig, ADDR_DEFAULT_DEVICE, ADDR_HOST, ARP_ASSIGN_ADDRESS, ARP_GET_UDID,
        ARP_PREPARE_TO_ARP, ARP_RESET_DEVICE, SMBUS_MAX_BLOCK,
    },
    hal::{Direction, I2cMaster, InterruptLine, MasterCommand, MasterInterrupt, MasterStatus},
    pec::crc8,
};

use super::{Flags, MasterState, Smbus, SmbusError, UDID_PACKET_LEN};

impl<H: I2cMaster + InterruptLine> Smbus<H> {
    /// Resets the instance and sets the peripheral up as an SMBus master.
    pub fn master_init(&mut self, config: &MasterConfig) {
        config.validate();
        self.reset();
        self.hw.init_master(config);
    }

    pub fn master_int_enable(&mut self) {
        self.hw
            .enable_interrupts(MasterInterrupt::DATA | MasterInterrupt::TIMEOUT);
        self.hw.enable();
    }

    /// Sends `data` as the R/W bit of an address-only transfer.
    ///
    /// Quick commands carry no PEC, so PEC is switched off.
    pub fn master_quick_command(&mut self, target: u8, data: bool) -> Result<(), SmbusError> {
        self.begin(&[Flags::PEC])?;

        let direction = if data {
            Direction::Receive
        } else {
            Direction::Transmit
        };
        self.target_address = target;
        self.hw.set_target(target, direction);
        self.set_master_state(MasterState::Idle);

        self.start(MasterCommand::QuickCommand)
    }

    /// Sends a Host Notify to the host. `own_address` is the 7-bit address
    /// of this device.
    pub fn master_host_notify(
        &mut self,
        own_address: u8,
        data: [u8; 2],
    ) -> Result<(), SmbusError> {
        self.begin(&[Flags::PEC])?;

        self.target_address = ADDR_HOST;
        self.load_tx(&data);
        self.current_command = own_address << 1;

        self.hw.set_target(ADDR_HOST, Direction::Transmit);
        self.hw.put_data(self.current_command);
        self.set_master_state(MasterState::WriteNext);

        self.start(MasterCommand::BurstSendStart)
    }

    pub fn master_byte_send(&mut self, target: u8, data: u8) -> Result<(), SmbusError> {
        self.begin(&[])?;

        self.target_address = target;
        self.hw.set_target(target, Direction::Transmit);
        self.hw.put_data(data);

        if self.pec() {
            self.calculated_crc = crc8(0, &[target << 1, data]);
            self.set_master_state(MasterState::WriteFinal);
            self.start(MasterCommand::BurstSendStart)
        } else {
            self.set_master_state(MasterState::Idle);
            self.start(MasterCommand::SingleSend)
        }
    }

    /// Receives one byte without a command. Read it back with
    /// [`Smbus::rx_data`].
    pub fn master_byte_receive(&mut self, target: u8) -> Result<(), SmbusError> {
        self.begin(&[])?;

        self.target_address = target;
        self.rx_size = 1;
        self.hw.set_target(target, Direction::Receive);

        if self.pec() {
            self.calculated_crc = crc8(0, &[(target << 1) | 1]);
            self.set_master_state(MasterState::ReadFinal);
            self.start(MasterCommand::BurstReceiveStart)
        } else {
            self.set_master_state(MasterState::ReadWait);
            self.start(MasterCommand::SingleReceive)
        }
    }

    /// Write Byte (one data byte) or Write Word (two).
    pub fn master_byte_word_write(
        &mut self,
        target: u8,
        command: u8,
        data: &[u8],
    ) -> Result<(), SmbusError> {
        if !(1..=2).contains(&data.len()) {
            return Err(SmbusError::DataSize);
        }
        self.begin(&[])?;

        self.target_address = target;
        self.current_command = command;
        self.load_tx(data);

        let next = if self.pec() {
            self.calculated_crc = crc8(crc8(0, &[target << 1, command]), data);
            MasterState::WriteNext
        } else if data.len() == 1 {
            MasterState::WriteFinal
        } else {
            MasterState::WriteNext
        };

        self.send_command(next)
    }

    /// Read Byte (`size` 1) or Read Word (`size` 2).
    pub fn master_byte_word_read(
        &mut self,
        target: u8,
        command: u8,
        size: usize,
    ) -> Result<(), SmbusError> {
        if !(1..=2).contains(&size) {
            return Err(SmbusError::DataSize);
        }
        self.begin(&[])?;

        self.target_address = target;
        self.current_command = command;
        self.rx_size = size;

        let next = if self.pec() {
            self.calculated_crc = crc8(0, &[target << 1, command]);
            MasterState::ReadFirst
        } else if size == 2 {
            MasterState::ReadFirst
        } else {
            MasterState::ReadOne
        };

        self.send_command(next)
    }

    pub fn master_block_write(
        &mut self,
        target: u8,
        command: u8,
        data: &[u8],
    ) -> Result<(), SmbusError> {
        if !(1..=SMBUS_MAX_BLOCK).contains(&data.len()) {
            return Err(SmbusError::DataSize);
        }
        self.begin(&[])?;
        self.flags.insert(Flags::BLOCK_TRANSFER);

        self.target_address = target;
        self.current_command = command;
        self.load_tx(data);

        if self.pec() {
            self.calculated_crc = crc8(
                crc8(0, &[target << 1, command, data.len() as u8]),
                data,
            );
        }

        self.send_command(MasterState::WriteBlockSize)
    }

    /// Reads a block whose size the target reports in its first byte.
    pub fn master_block_read(&mut self, target: u8, command: u8) -> Result<(), SmbusError> {
        self.begin(&[])?;
        self.flags.insert(Flags::BLOCK_TRANSFER);

        self.target_address = target;
        self.current_command = command;
        // Anything above two routes the read through the size byte.
        self.rx_size = 3;

        if self.pec() {
            self.calculated_crc = crc8(0, &[target << 1, command]);
        }

        self.send_command(MasterState::ReadFirst)
    }

    /// Writes a word and reads a word back after a repeated start.
    pub fn master_process_call(
        &mut self,
        target: u8,
        command: u8,
        data: [u8; 2],
    ) -> Result<(), SmbusError> {
        self.begin(&[])?;
        self.flags.insert(Flags::PROCESS_CALL);

        self.target_address = target;
        self.current_command = command;
        self.load_tx(&data);
        self.rx_size = 2;

        if self.pec() {
            self.calculated_crc = crc8(crc8(0, &[target << 1, command]), &data);
        }

        self.send_command(MasterState::WriteNext)
    }

    pub fn master_block_process_call(
        &mut self,
        target: u8,
        command: u8,
        data: &[u8],
    ) -> Result<(), SmbusError> {
        if !(1..=SMBUS_MAX_BLOCK).contains(&data.len()) {
            return Err(SmbusError::DataSize);
        }
        self.begin(&[])?;
        self.flags
            .insert(Flags::PROCESS_CALL | Flags::BLOCK_TRANSFER);

        self.target_address = target;
        self.current_command = command;
        self.load_tx(data);
        self.rx_size = 3;

        if self.pec() {
            self.calculated_crc = crc8(
                crc8(0, &[target << 1, command, data.len() as u8]),
                data,
            );
        }

        self.send_command(MasterState::WriteBlockSize)
    }

    /// Plain I2C write with no SMBus framing. Switches PEC off.
    pub fn master_i2c_write(&mut self, target: u8, data: &[u8]) -> Result<(), SmbusError> {
        if !(1..=SMBUS_MAX_BLOCK).contains(&data.len()) {
            return Err(SmbusError::DataSize);
        }
        self.begin(&[Flags::PEC])?;
        self.flags.insert(Flags::RAW_I2C);

        self.target_address = target;
        self.load_tx(data);
        self.tx_index = 1;

        self.hw.set_target(target, Direction::Transmit);
        self.hw.put_data(data[0]);

        match data.len() {
            1 => {
                self.set_master_state(MasterState::Idle);
                self.start(MasterCommand::SingleSend)
            }
            2 => {
                self.set_master_state(MasterState::WriteFinal);
                self.start(MasterCommand::BurstSendStart)
            }
            _ => {
                self.set_master_state(MasterState::WriteNext);
                self.start(MasterCommand::BurstSendStart)
            }
        }
    }

    /// Plain I2C read of `size` bytes. Switches PEC off.
    pub fn master_i2c_read(&mut self, target: u8, size: usize) -> Result<(), SmbusError> {
        if !(1..=SMBUS_MAX_BLOCK).contains(&size) {
            return Err(SmbusError::DataSize);
        }
        self.begin(&[Flags::PEC])?;
        self.flags.insert(Flags::RAW_I2C);

        self.target_address = target;
        self.rx_size = size;
        self.hw.set_target(target, Direction::Receive);

        match size {
            1 => {
                self.set_master_state(MasterState::ReadWait);
                self.start(MasterCommand::SingleReceive)
            }
            2 => {
                self.set_master_state(MasterState::ReadFinal);
                self.start(MasterCommand::BurstReceiveStart)
            }
            _ => {
                self.set_master_state(MasterState::ReadNext);
                self.start(MasterCommand::BurstReceiveStart)
            }
        }
    }

    /// Plain I2C write then read after a repeated start. Switches PEC off.
    pub fn master_i2c_write_read(
        &mut self,
        target: u8,
        data: &[u8],
        size: usize,
    ) -> Result<(), SmbusError> {
        if !(1..=SMBUS_MAX_BLOCK).contains(&data.len())
            || !(1..=SMBUS_MAX_BLOCK).contains(&size)
        {
            return Err(SmbusError::DataSize);
        }
        self.begin(&[Flags::PEC])?;
        self.flags.insert(Flags::RAW_I2C | Flags::PROCESS_CALL);

        self.target_address = target;
        self.load_tx(data);
        self.tx_index = 1;
        self.rx_size = size;

        self.hw.set_target(target, Direction::Transmit);
        self.hw.put_data(data[0]);

        let next = match data.len() {
            1 => MasterState::ReadFirst,
            2 => MasterState::WriteFinal,
            _ => MasterState::WriteNext,
        };
        self.set_master_state(next);
        self.start(MasterCommand::BurstSendStart)
    }

    /// Get UDID (general). The response block lands in [`Smbus::rx_data`].
    pub fn master_arp_get_udid_general(&mut self) -> Result<(), SmbusError> {
        self.master_block_read(ADDR_DEFAULT_DEVICE, ARP_GET_UDID)
    }

    /// Get UDID addressed to the device currently at `target`.
    pub fn master_arp_get_udid_directed(&mut self, target: u8) -> Result<(), SmbusError> {
        self.master_block_read(ADDR_DEFAULT_DEVICE, (target << 1) | 1)
    }

    pub fn master_arp_reset_device_general(&mut self) -> Result<(), SmbusError> {
        self.master_byte_send(ADDR_DEFAULT_DEVICE, ARP_RESET_DEVICE)
    }

    pub fn master_arp_reset_device_directed(&mut self, target: u8) -> Result<(), SmbusError> {
        self.master_byte_send(ADDR_DEFAULT_DEVICE, target << 1)
    }

    /// Assigns the address carried in the last byte of a UDID packet.
    pub fn master_arp_assign_address(
        &mut self,
        packet: &[u8; UDID_PACKET_LEN],
    ) -> Result<(), SmbusError> {
        self.master_block_write(ADDR_DEFAULT_DEVICE, ARP_ASSIGN_ADDRESS, packet)
    }

    /// Tells the ARP master that this device needs an address.
    pub fn master_arp_notify_master(&mut self, data: [u8; 2]) -> Result<(), SmbusError> {
        self.master_host_notify(ADDR_DEFAULT_DEVICE, data)
    }

    pub fn master_arp_prepare_to_arp(&mut self) -> Result<(), SmbusError> {
        self.master_byte_send(ADDR_DEFAULT_DEVICE, ARP_PREPARE_TO_ARP)
    }

    /// Steps the master transaction on a peripheral interrupt.
    ///
    /// `Ok` means the step went through; the end of the transaction shows up
    /// in [`Smbus::status`]. Errors end the transaction.
    pub fn master_int_process(&mut self) -> Result<(), SmbusError> {
        if self.hw.interrupt_status().contains(MasterInterrupt::TIMEOUT) {
            self.hw
                .clear_interrupts(MasterInterrupt::TIMEOUT | MasterInterrupt::DATA);
            warn!("smbus clock low timeout");
            self.set_master_state(MasterState::Idle);
            self.end_transfer();
            return Err(SmbusError::Timeout);
        }
        self.hw.clear_interrupts(MasterInterrupt::DATA);

        let status = self.hw.status();
        if status.contains(MasterStatus::ARB_LOST) {
            warn!("smbus arbitration lost");
            self.set_master_state(MasterState::Idle);
            self.end_transfer();
            return Err(SmbusError::ArbitrationLost);
        }
        if status.contains(MasterStatus::ERROR) {
            warn!("smbus bus error, status {=u8:#x}", status.bits());
            self.set_master_state(MasterState::Idle);

            // The stop raises one more interrupt, which ends the transfer
            // from the idle state.
            if self.hw.is_bus_busy() {
                self.hw.control(MasterCommand::BurstSendErrorStop);
            } else {
                self.end_transfer();
            }

            return Err(if status.contains(MasterStatus::ADDR_NACK) {
                SmbusError::AddressNack
            } else if status.contains(MasterStatus::DATA_NACK) {
                SmbusError::DataNack
            } else {
                SmbusError::Master
            });
        }

        self.check_framing();

        match self.master_state() {
            MasterState::Idle => {
                if !self.hw.is_busy() {
                    self.end_transfer();
                }
                Ok(())
            }
            MasterState::WriteBlockSize => {
                self.hw.put_data(self.tx_size as u8);
                self.hw.control(MasterCommand::BurstSendCont);

                if self.tx_size == 1 && !self.appends_pec() {
                    self.set_master_state(MasterState::WriteFinal);
                } else {
                    self.set_master_state(MasterState::WriteNext);
                }
                Ok(())
            }
            MasterState::WriteNext => {
                let byte = self.next_tx();
                self.hw.put_data(byte);
                self.hw.control(MasterCommand::BurstSendCont);

                let last = if self.appends_pec() {
                    self.tx_index == self.tx_size
                } else {
                    self.tx_index + 1 == self.tx_size
                };
                if last {
                    self.set_master_state(MasterState::WriteFinal);
                }
                Ok(())
            }
            MasterState::WriteFinal => {
                let byte = if self.appends_pec() {
                    self.calculated_crc
                } else {
                    self.next_tx()
                };
                self.hw.put_data(byte);

                if self.flags.contains(Flags::PROCESS_CALL) {
                    self.set_master_state(MasterState::ReadFirst);
                    self.hw.control(MasterCommand::BurstSendCont);
                } else {
                    self.hw.control(MasterCommand::BurstSendFinish);
                    self.set_master_state(MasterState::Idle);
                }
                Ok(())
            }
            MasterState::ReadOne => {
                self.hw.set_target(self.target_address, Direction::Receive);
                self.hw.control(MasterCommand::SingleReceive);
                self.set_master_state(MasterState::ReadWait);
                Ok(())
            }
            MasterState::ReadFirst => {
                self.read_first();
                Ok(())
            }
            MasterState::ReadBlockSize => {
                self.read_block_size();
                Ok(())
            }
            MasterState::ReadNext => {
                if self.rx_index >= self.rx_size {
                    return self.overrun();
                }

                let byte = self.hw.get_data();
                self.store_rx(byte);
                self.hw.control(MasterCommand::BurstReceiveCont);

                let left = self.rx_size - self.rx_index;
                if (self.pec() && left == 1) || (!self.pec() && left == 2) {
                    self.set_master_state(MasterState::ReadFinal);
                }
                Ok(())
            }
            MasterState::ReadFinal => {
                if self.rx_index >= self.rx_size {
                    return self.overrun();
                }

                let byte = self.hw.get_data();
                self.set_master_state(MasterState::ReadWait);
                self.hw.control(MasterCommand::BurstReceiveFinish);
                self.store_rx(byte);
                Ok(())
            }
            MasterState::ReadWait => self.read_wait(),
            MasterState::ReadErrorStop => {
                let _ = self.hw.get_data();
                self.set_master_state(MasterState::Idle);
                self.end_transfer();
                Err(SmbusError::DataSize)
            }
        }
    }

    fn read_first(&mut self) {
        self.hw.set_target(self.target_address, Direction::Receive);

        let block = self.flags.contains(Flags::BLOCK_TRANSFER);
        let burst = if block {
            MasterState::ReadBlockSize
        } else {
            MasterState::ReadNext
        };

        if self.pec() {
            self.crc_update(&[(self.target_address << 1) | 1]);
            let next = if self.rx_size > 1 {
                burst
            } else {
                MasterState::ReadFinal
            };
            self.set_master_state(next);
        } else if self.rx_size > 2 {
            self.set_master_state(burst);
        } else if self.rx_size == 2 {
            self.set_master_state(MasterState::ReadFinal);
        } else {
            // A burst would clock in a byte nobody asked for.
            self.set_master_state(MasterState::ReadWait);
            return self.hw.control(MasterCommand::SingleReceive);
        }

        self.hw.control(MasterCommand::BurstReceiveStart);
    }

    fn read_block_size(&mut self) {
        let size = self.hw.get_data();

        if size == 0 || size as usize > SMBUS_MAX_BLOCK {
            warn!("smbus block size {=u8} out of range", size);
            self.set_master_state(MasterState::ReadErrorStop);
            return self.hw.control(MasterCommand::BurstReceiveFinish);
        }

        self.rx_size = size as usize;
        if self.pec() {
            self.crc_update(&[size]);
        }

        let next = match (size, self.pec()) {
            (1, true) => MasterState::ReadFinal,
            (1, false) => MasterState::ReadWait,
            (2, true) => MasterState::ReadNext,
            (2, false) => MasterState::ReadFinal,
            _ => MasterState::ReadNext,
        };
        self.set_master_state(next);

        if size == 1 && !self.pec() {
            self.hw.control(MasterCommand::BurstReceiveFinish);
        } else {
            self.hw.control(MasterCommand::BurstReceiveCont);
        }
    }

    fn read_wait(&mut self) -> Result<(), SmbusError> {
        let byte = self.hw.get_data();
        self.set_master_state(MasterState::Idle);
        self.end_transfer();

        if self.pec() {
            if self.rx_index > self.rx_size {
                return Err(SmbusError::DataSize);
            }
            self.received_crc = byte;
            if self.received_crc != self.calculated_crc {
                warn!(
                    "smbus pec mismatch: got {=u8:#x}, expected {=u8:#x}",
                    self.received_crc,
                    self.calculated_crc
                );
                return Err(SmbusError::PecError);
            }
        } else {
            if self.rx_index >= self.rx_size {
                return Err(SmbusError::DataSize);
            }
            self.rx[self.rx_index] = byte;
            self.rx_index += 1;
        }

        debug!(
            "smbus read from {=u8:#x} done, {=usize} bytes",
            self.target_address,
            self.rx_index
        );
        Ok(())
    }

    /// The target kept sending past the expected size.
    fn overrun(&mut self) -> Result<(), SmbusError> {
        let _ = self.hw.get_data();
        self.hw.control(MasterCommand::BurstReceiveFinish);
        self.set_master_state(MasterState::ReadErrorStop);
        Ok(())
    }

    /// Checks the controller is free and resets the per-transfer flags, plus
    /// any in `clear`.
    fn begin(&mut self, clear: &[Flags]) -> Result<(), SmbusError> {
        if self.hw.is_busy() {
            return Err(SmbusError::PeripheralBusy);
        }

        self.flags
            .remove(Flags::PROCESS_CALL | Flags::BLOCK_TRANSFER | Flags::RAW_I2C);
        for flag in clear {
            self.flags.remove(*flag);
        }
        self.tx_size = 0;
        self.tx_index = 0;
        self.rx_size = 0;
        self.rx_index = 0;
        Ok(())
    }

    /// Puts the command byte on the wire and enters `next`.
    fn send_command(&mut self, next: MasterState) -> Result<(), SmbusError> {
        self.hw.set_target(self.target_address, Direction::Transmit);
        self.hw.put_data(self.current_command);
        self.set_master_state(next);
        self.start(MasterCommand::BurstSendStart)
    }

    /// Issues the first control command unless another master holds the bus.
    fn start(&mut self, command: MasterCommand) -> Result<(), SmbusError> {
        if self.hw.is_bus_busy() {
            self.set_master_state(MasterState::Idle);
            return Err(SmbusError::BusBusy);
        }

        debug!("smbus transfer to {=u8:#x} started", self.target_address);
        self.flags.insert(Flags::TRANSFER_IN_PROGRESS);
        self.hw.control(command);
        Ok(())
    }

    fn load_tx(&mut self, data: &[u8]) {
        self.tx[..data.len()].copy_from_slice(data);
        self.tx_size = data.len();
        self.tx_index = 0;
    }

    fn next_tx(&mut self) -> u8 {
        let byte = if self.tx_index < self.tx_size {
            self.tx[self.tx_index]
        } else {
            0xFF
        };
        self.tx_index += 1;
        byte
    }

    fn store_rx(&mut self, byte: u8) {
        self.rx[self.rx_index] = byte;
        self.rx_index += 1;
        if self.pec() {
            self.crc_update(&[byte]);
        }
    }

    /// The write phase ends with a PEC byte. The write phase of a process
    /// call never does; its PEC comes at the end of the read phase.
    fn appends_pec(&self) -> bool {
        self.pec() && !self.flags.contains(Flags::PROCESS_CALL)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::MasterConfig,
        hal::{Direction, MasterCommand},
        mock::{MockBus, Target},
        pec::crc8,
        smbus::{Flags, MasterState, Smbus, SmbusError, TransferStatus, Udid},
    };

    fn smbus(bus: MockBus) -> Smbus<MockBus> {
        let mut smbus = Smbus::new(bus);
        smbus.master_init(&MasterConfig::smbus(16_000_000));
        smbus.master_int_enable();
        smbus
    }

    /// Services interrupts until the bus goes quiet, collecting the results.
    fn run(smbus: &mut Smbus<MockBus>) -> Vec<Result<(), SmbusError>> {
        let mut results = Vec::new();
        while smbus.hardware_mut().take_interrupt() {
            results.push(smbus.master_int_process());
            assert!(results.len() < 100, "smbus never settles");
        }
        results
    }

    fn errors(results: &[Result<(), SmbusError>]) -> Vec<SmbusError> {
        results.iter().filter_map(|r| r.err()).collect()
    }

    #[test]
    fn init_programs_timeout_and_interrupts() {
        let smbus = smbus(MockBus::new());
        let bus = smbus.hardware();

        assert_eq!(bus.config.and_then(|c| c.bus_timeout), Some(0x9C));
        assert!(bus.line_enabled);
        assert_eq!(smbus.status(), TransferStatus::Complete);
    }

    #[test]
    fn word_read_without_pec() {
        let bus = MockBus::new().with_target(0x48, Target::scripted(&[0x12, 0x34]));
        let mut smbus = smbus(bus);

        smbus.master_byte_word_read(0x48, 0x00, 2).unwrap();
        assert_eq!(smbus.status(), TransferStatus::InProgress);

        let results = run(&mut smbus);
        assert!(errors(&results).is_empty());
        assert_eq!(smbus.rx_data(), [0x12, 0x34]);
        assert_eq!(smbus.rx_packet_size(), 2);
        assert_eq!(smbus.status(), TransferStatus::Complete);

        let bus = smbus.hardware();
        assert_eq!(bus.written(0x48), [0x00]);
        assert_eq!(bus.segments[1].direction, Direction::Receive);
        assert!(bus.segments[1].stopped);
    }

    #[test]
    fn byte_read_uses_single_receive() {
        let bus = MockBus::new().with_target(0x48, Target::scripted(&[0x7E]));
        let mut smbus = smbus(bus);

        smbus.master_byte_word_read(0x48, 0x05, 1).unwrap();
        run(&mut smbus);

        assert_eq!(smbus.rx_data(), [0x7E]);
        assert!(smbus
            .hardware()
            .commands
            .contains(&MasterCommand::SingleReceive));
    }

    #[test]
    fn word_write_appends_pec() {
        let bus = MockBus::new().with_target(0x30, Target::scripted(&[]));
        let mut smbus = smbus(bus);
        smbus.pec_enable();

        smbus.master_byte_word_write(0x30, 0x10, &[0xAA, 0x55]).unwrap();
        let results = run(&mut smbus);

        assert!(errors(&results).is_empty());
        let pec = crc8(0, &[0x60, 0x10, 0xAA, 0x55]);
        assert_eq!(smbus.hardware().written(0x30), [0x10, 0xAA, 0x55, pec]);
        assert_eq!(smbus.status(), TransferStatus::Complete);
    }

    #[test]
    fn word_read_checks_pec() {
        let good = crc8(0, &[0x60, 0x01, 0x61, 0xBE, 0xEF]);
        let bus = MockBus::new().with_target(0x30, Target::scripted(&[0xBE, 0xEF, good]));
        let mut smbus = smbus(bus);
        smbus.pec_enable();

        smbus.master_byte_word_read(0x30, 0x01, 2).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());
        assert_eq!(smbus.rx_data(), [0xBE, 0xEF]);

        let bad = MockBus::new().with_target(0x30, Target::scripted(&[0xBE, 0xEF, !good]));
        let mut smbus = self::smbus(bad);
        smbus.pec_enable();

        smbus.master_byte_word_read(0x30, 0x01, 2).unwrap();
        assert_eq!(errors(&run(&mut smbus)), [SmbusError::PecError]);
        assert_eq!(smbus.status(), TransferStatus::Complete);
    }

    #[test]
    fn size_arguments_are_validated() {
        let mut smbus = smbus(MockBus::new());

        assert_eq!(
            smbus.master_byte_word_write(0x30, 0, &[]),
            Err(SmbusError::DataSize)
        );
        assert_eq!(
            smbus.master_byte_word_write(0x30, 0, &[1, 2, 3]),
            Err(SmbusError::DataSize)
        );
        assert_eq!(
            smbus.master_byte_word_read(0x30, 0, 3),
            Err(SmbusError::DataSize)
        );
        assert_eq!(
            smbus.master_block_write(0x30, 0, &[0; 33]),
            Err(SmbusError::DataSize)
        );
        assert_eq!(
            smbus.master_block_process_call(0x30, 0, &[]),
            Err(SmbusError::DataSize)
        );
        assert_eq!(smbus.master_i2c_read(0x30, 0), Err(SmbusError::DataSize));
        assert!(smbus.hardware().commands.is_empty());
    }

    #[test]
    fn busy_controller_and_busy_bus_are_rejected() {
        let mut smbus = smbus(MockBus::new());

        smbus.hardware_mut().controller_busy = true;
        assert_eq!(
            smbus.master_byte_send(0x30, 1),
            Err(SmbusError::PeripheralBusy)
        );

        smbus.hardware_mut().controller_busy = false;
        smbus.hardware_mut().external_busy = true;
        assert_eq!(smbus.master_byte_send(0x30, 1), Err(SmbusError::BusBusy));

        assert!(smbus.hardware().commands.is_empty());
        assert_eq!(smbus.status(), TransferStatus::Complete);
    }

    #[test]
    fn block_write_with_pec() {
        let bus = MockBus::new().with_target(0x30, Target::scripted(&[]));
        let mut smbus = smbus(bus);
        smbus.pec_enable();

        smbus.master_block_write(0x30, 0x22, &[1, 2, 3]).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());

        let pec = crc8(0, &[0x60, 0x22, 3, 1, 2, 3]);
        assert_eq!(smbus.hardware().written(0x30), [0x22, 3, 1, 2, 3, pec]);
    }

    #[test]
    fn one_byte_block_write_without_pec() {
        let bus = MockBus::new().with_target(0x30, Target::scripted(&[]));
        let mut smbus = smbus(bus);

        smbus.master_block_write(0x30, 0x22, &[9]).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());
        assert_eq!(smbus.hardware().written(0x30), [0x22, 1, 9]);
    }

    #[test]
    fn block_read_with_and_without_pec() {
        let bus = MockBus::new().with_target(0x30, Target::scripted(&[3, 7, 8, 9]));
        let mut smbus = smbus(bus);

        smbus.master_block_read(0x30, 0x40).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());
        assert_eq!(smbus.rx_data(), [7, 8, 9]);

        let pec = crc8(0, &[0x60, 0x40, 0x61, 2, 0xA0, 0xA1]);
        let bus = MockBus::new().with_target(0x30, Target::scripted(&[2, 0xA0, 0xA1, pec]));
        let mut smbus = self::smbus(bus);
        smbus.pec_enable();

        smbus.master_block_read(0x30, 0x40).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());
        assert_eq!(smbus.rx_data(), [0xA0, 0xA1]);
    }

    #[test]
    fn block_read_rejects_bad_size() {
        for size in [0u8, 33] {
            let bus = MockBus::new().with_target(0x30, Target::scripted(&[size, 1, 2]));
            let mut smbus = smbus(bus);

            smbus.master_block_read(0x30, 0x40).unwrap();
            assert_eq!(errors(&run(&mut smbus)), [SmbusError::DataSize]);
            assert_eq!(smbus.rx_packet_size(), 0);
            assert_eq!(smbus.status(), TransferStatus::Complete);
            assert_eq!(smbus.master_state(), MasterState::Idle);

            // Size byte plus the dummy byte, then the stop.
            let bus = smbus.hardware();
            assert_eq!(bus.segments[1].bytes, [size, 1]);
            assert!(bus.segments[1].stopped);
        }
    }

    #[test]
    fn quick_command_touches_no_buffers() {
        let bus = MockBus::new().with_target(0x30, Target::scripted(&[0x55]));
        let mut smbus = smbus(bus);
        smbus.pec_enable();

        smbus.master_quick_command(0x30, true).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());

        assert!(!smbus.flags().contains(Flags::PEC));
        assert_eq!(smbus.rx_packet_size(), 0);
        assert_eq!(smbus.status(), TransferStatus::Complete);

        let bus = smbus.hardware();
        assert_eq!(bus.commands, [MasterCommand::QuickCommand]);
        assert_eq!(bus.segments[0].direction, Direction::Receive);
        assert!(bus.segments[0].bytes.is_empty());
        assert!(bus.written(0x30).is_empty());
    }

    #[test]
    fn byte_send_and_receive() {
        let bus = MockBus::new().with_target(0x30, Target::scripted(&[0x42]));
        let mut smbus = smbus(bus);

        smbus.master_byte_send(0x30, 0x99).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());
        smbus.master_byte_receive(0x30).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());

        assert_eq!(smbus.rx_data(), [0x42]);
        assert_eq!(smbus.hardware().written(0x30), [0x99]);
    }

    #[test]
    fn byte_receive_with_pec() {
        let pec = crc8(0, &[0x61, 0x42]);
        let bus = MockBus::new().with_target(0x30, Target::scripted(&[0x42, pec]));
        let mut smbus = smbus(bus);
        smbus.pec_enable();

        smbus.master_byte_receive(0x30).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());
        assert_eq!(smbus.rx_data(), [0x42]);
    }

    #[test]
    fn process_call_pec_covers_both_phases() {
        let pec = crc8(0, &[0x60, 0x05, 0x01, 0x02, 0x61, 0x03, 0x04]);
        let bus = MockBus::new().with_target(0x30, Target::scripted(&[0x03, 0x04, pec]));
        let mut smbus = smbus(bus);
        smbus.pec_enable();

        smbus.master_process_call(0x30, 0x05, [0x01, 0x02]).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());

        assert_eq!(smbus.hardware().written(0x30), [0x05, 0x01, 0x02]);
        assert_eq!(smbus.rx_data(), [0x03, 0x04]);
    }

    #[test]
    fn one_byte_block_process_call_with_pec() {
        let pec = crc8(0, &[0x60, 0x06, 1, 0xAB, 0x61, 1, 0xCD]);
        let bus = MockBus::new().with_target(0x30, Target::scripted(&[1, 0xCD, pec]));
        let mut smbus = smbus(bus);
        smbus.pec_enable();

        smbus.master_block_process_call(0x30, 0x06, &[0xAB]).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());

        assert_eq!(smbus.hardware().written(0x30), [0x06, 1, 0xAB]);
        assert_eq!(smbus.rx_data(), [0xCD]);
    }

    #[test]
    fn raw_transfers() {
        let bus = MockBus::new().with_target(0x50, Target::registers());
        let mut smbus = smbus(bus);
        smbus.pec_enable();

        smbus.master_i2c_write(0x50, &[0x10, 1, 2, 3]).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());
        assert!(!smbus.flags().contains(Flags::PEC));

        smbus.master_i2c_write_read(0x50, &[0x10], 3).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());
        assert_eq!(smbus.rx_data(), [1, 2, 3]);

        smbus.master_i2c_write(0x50, &[0x11]).unwrap();
        run(&mut smbus);
        smbus.master_i2c_read(0x50, 2).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());
        assert_eq!(smbus.rx_data(), [2, 3]);
    }

    #[test]
    fn raw_write_read_of_one_byte_does_not_over_read() {
        let mut bus = MockBus::new().with_target(0x50, Target::registers());
        bus.set_register(0x50, 0x20, 0x77);
        let mut smbus = smbus(bus);

        smbus.master_i2c_write_read(0x50, &[0x20], 1).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());

        assert_eq!(smbus.rx_data(), [0x77]);
        let bus = smbus.hardware();
        assert_eq!(bus.segments[1].bytes, [0x77]);
        assert!(bus.commands.contains(&MasterCommand::SingleReceive));
    }

    #[test]
    fn address_nack_releases_the_bus() {
        let mut smbus = smbus(MockBus::new());

        smbus.master_byte_word_write(0x30, 0x01, &[1, 2]).unwrap();
        let results = run(&mut smbus);

        assert_eq!(errors(&results), [SmbusError::AddressNack]);
        assert!(smbus
            .hardware()
            .commands
            .contains(&MasterCommand::BurstSendErrorStop));
        assert!(!smbus.hardware().bus_held());
        assert_eq!(smbus.status(), TransferStatus::Complete);
    }

    #[test]
    fn timeout_and_arbitration_loss() {
        let bus = MockBus::new().with_target(0x30, Target::scripted(&[]));
        let mut smbus = smbus(bus);

        smbus.hardware_mut().time_out = true;
        smbus.master_byte_send(0x30, 1).unwrap();
        assert_eq!(errors(&run(&mut smbus)), [SmbusError::Timeout]);
        assert_eq!(smbus.status(), TransferStatus::Complete);

        smbus.hardware_mut().lose_arbitration = true;
        smbus.master_byte_send(0x30, 1).unwrap();
        assert_eq!(errors(&run(&mut smbus)), [SmbusError::ArbitrationLost]);
        assert_eq!(smbus.status(), TransferStatus::Complete);
    }

    #[test]
    fn host_notify_sends_shifted_own_address() {
        let bus = MockBus::new().with_target(0x08, Target::scripted(&[]));
        let mut smbus = smbus(bus);
        smbus.pec_enable();

        smbus.master_host_notify(0x2A, [0x34, 0x12]).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());

        assert_eq!(smbus.hardware().written(0x08), [0x54, 0x34, 0x12]);
        assert!(!smbus.flags().contains(Flags::PEC));
    }

    #[test]
    fn arp_helpers_target_the_default_address() {
        let udid = Udid {
            vendor_id: 0x1234,
            device_id: 0x0001,
            ..Udid::default()
        };
        let packet = udid.encode(0x2C);
        let mut reply = vec![packet.len() as u8];
        reply.extend_from_slice(&packet);

        let bus = MockBus::new().with_target(0x61, Target::scripted(&reply));
        let mut smbus = smbus(bus);

        smbus.master_arp_prepare_to_arp().unwrap();
        run(&mut smbus);
        smbus.master_arp_reset_device_directed(0x2C).unwrap();
        run(&mut smbus);
        smbus.master_arp_get_udid_general().unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());

        let mut received = [0u8; 17];
        received.copy_from_slice(smbus.rx_data());
        assert_eq!(Udid::decode(&received), (udid, 0x2C));

        smbus.master_arp_assign_address(&packet).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());

        let mut expected = vec![0x01, 0x58, 0x03, 0x04, 17];
        expected.extend_from_slice(&packet);
        assert_eq!(smbus.hardware().written(0x61), expected);
    }

    #[test]
    fn arp_directed_udid_general_reset_and_notify() {
        let udid = Udid {
            device_id: 0x0042,
            ..Udid::default()
        };
        let packet = udid.encode(0x2C);
        let mut reply = vec![packet.len() as u8];
        reply.extend_from_slice(&packet);

        let bus = MockBus::new()
            .with_target(0x61, Target::scripted(&reply))
            .with_target(0x08, Target::scripted(&[]));
        let mut smbus = smbus(bus);

        smbus.master_arp_get_udid_directed(0x2C).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());
        let mut received = [0u8; 17];
        received.copy_from_slice(smbus.rx_data());
        assert_eq!(Udid::decode(&received), (udid, 0x2C));

        smbus.master_arp_reset_device_general().unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());
        assert_eq!(smbus.hardware().written(0x61), [0x59, 0x02]);

        smbus.master_arp_notify_master([0x00, 0x00]).unwrap();
        assert!(errors(&run(&mut smbus)).is_empty());
        assert_eq!(smbus.hardware().written(0x08), [0xC2, 0x00, 0x00]);
    }
}
