use crate::{
    engine::Engine,
    hal::{Direction, I2cMaster, InterruptLine, MasterCommand, MasterInterrupt, MasterStatus},
    State, Status,
};

impl<H: I2cMaster + InterruptLine, C: Copy, const N: usize> Engine<H, C, N> {
    /// Services one peripheral interrupt.
    ///
    /// Must be called on every interrupt of the peripheral, including the
    /// software-triggered ones the engine raises itself.
    pub fn on_interrupt(&mut self) {
        self.hw.clear_interrupts(MasterInterrupt::DATA);
        let status = self.hw.status();

        if status.failed() && !matches!(self.state(), State::Idle) {
            warn!("bus error, status {=u8:#x}", status.bits());

            // Send and receive share the same error stop.
            if status.contains(MasterStatus::BUS_BUSY) {
                self.hw.control(MasterCommand::BurstSendErrorStop);
            }
            self.set_state(State::Callback);
        }

        loop {
            match self.state() {
                State::Idle => return self.start_next(),
                State::WriteNext => return self.write_next(),
                State::WriteFinal => return self.write_final(),
                State::WritePause => return self.write_pause(),
                State::ReadOne => return self.read_one(),
                State::ReadFirst => return self.read_first(),
                State::ReadNext => return self.read_next(),
                State::ReadFinal => return self.read_final(),
                State::ReadPause => return self.read_pause(),
                State::ReadWait => self.read_wait(),
                State::Callback => {
                    self.finish(status);

                    // The stop issued above raises its own interrupt, which
                    // starts the next command.
                    if status.failed() && status.contains(MasterStatus::BUS_BUSY) {
                        return;
                    }
                }
            }
        }
    }

    fn start_next(&mut self) {
        let Some(cmd) = self.queue.front_mut() else {
            return;
        };
        self.received.reset();
        self.resumed = false;

        let next = if cmd.write_count != 0 {
            self.hw.set_target(cmd.address, Direction::Transmit);
            self.hw.put_data(cmd.write.next().unwrap_or(0xFF));

            if cmd.write_count == 1 && cmd.read_count == 0 {
                self.hw.control(MasterCommand::SingleSend);
                State::Callback
            } else if cmd.write_count == 1 {
                self.hw.control(MasterCommand::BurstSendStart);
                read_entry(cmd.read_count)
            } else {
                self.hw.control(MasterCommand::BurstSendStart);
                if cmd.write_count != 2 {
                    State::WriteNext
                } else {
                    State::WriteFinal
                }
            }
        } else {
            self.hw.set_target(cmd.address, Direction::Receive);

            if cmd.read_count == 1 {
                self.hw.control(MasterCommand::SingleReceive);
                State::ReadWait
            } else {
                self.hw.control(MasterCommand::BurstReceiveStart);
                if cmd.read_count == 2 {
                    State::ReadFinal
                } else {
                    State::ReadNext
                }
            }
        };

        self.set_state(next);
    }

    fn write_next(&mut self) {
        let Some(cmd) = self.queue.front_mut() else {
            return self.set_state(State::Idle);
        };

        if cmd.write.bytes_sent() == cmd.write_batch {
            self.set_state(State::WritePause);
            return self.batch_done();
        }

        self.hw.put_data(cmd.write.next().unwrap_or(0xFF));
        self.hw.control(MasterCommand::BurstSendCont);

        if cmd.write_count - cmd.write.bytes_sent() == 1 {
            self.set_state(State::WriteFinal);
        }
    }

    fn write_final(&mut self) {
        let Some(cmd) = self.queue.front_mut() else {
            return self.set_state(State::Idle);
        };

        if cmd.write.bytes_sent() == cmd.write_batch {
            self.set_state(State::WritePause);
            return self.batch_done();
        }

        self.hw.put_data(cmd.write.next().unwrap_or(0xFF));

        let next = if cmd.read_count == 0 {
            self.hw.control(MasterCommand::BurstSendFinish);
            State::Callback
        } else {
            self.hw.control(MasterCommand::BurstSendCont);
            read_entry(cmd.read_count)
        };
        self.set_state(next);
    }

    fn write_pause(&mut self) {
        if !self.resumed {
            return;
        }
        self.resumed = false;

        let Some(cmd) = self.queue.front_mut() else {
            return self.set_state(State::Idle);
        };

        cmd.write_count -= cmd.write_batch;
        self.hw.put_data(cmd.write.next().unwrap_or(0xFF));

        let left = cmd.write_count - cmd.write.bytes_sent();
        let next = if left == 0 {
            if cmd.read_count == 0 {
                self.hw.control(MasterCommand::BurstSendFinish);
                State::Callback
            } else {
                self.hw.control(MasterCommand::BurstSendCont);
                read_entry(cmd.read_count)
            }
        } else {
            self.hw.control(MasterCommand::BurstSendCont);
            if left == 1 {
                State::WriteFinal
            } else {
                State::WriteNext
            }
        };
        self.set_state(next);
    }

    fn read_one(&mut self) {
        let Some(cmd) = self.queue.front_mut() else {
            return self.set_state(State::Idle);
        };

        self.hw.set_target(cmd.address, Direction::Receive);
        self.hw.control(MasterCommand::SingleReceive);
        self.received.reset();
        self.set_state(State::ReadWait);
    }

    fn read_first(&mut self) {
        let Some(cmd) = self.queue.front_mut() else {
            return self.set_state(State::Idle);
        };

        self.hw.set_target(cmd.address, Direction::Receive);
        self.hw.control(MasterCommand::BurstReceiveStart);
        self.received.reset();

        let next = if cmd.read_count == 2 {
            State::ReadFinal
        } else {
            State::ReadNext
        };
        self.set_state(next);
    }

    fn read_next(&mut self) {
        let Some(cmd) = self.queue.front_mut() else {
            return self.set_state(State::Idle);
        };

        let _ = self.received.write_byte(self.hw.get_data());
        let index = self.received.get_size();

        if index == cmd.read_batch {
            self.set_state(State::ReadPause);
            return self.batch_ready();
        }

        self.hw.control(MasterCommand::BurstReceiveCont);
        if cmd.read_count - index == 2 {
            self.set_state(State::ReadFinal);
        }
    }

    fn read_final(&mut self) {
        let Some(cmd) = self.queue.front_mut() else {
            return self.set_state(State::Idle);
        };

        let _ = self.received.write_byte(self.hw.get_data());

        if self.received.get_size() == cmd.read_batch {
            self.set_state(State::ReadPause);
            return self.batch_ready();
        }

        self.hw.control(MasterCommand::BurstReceiveFinish);
        self.set_state(State::ReadWait);
    }

    fn read_pause(&mut self) {
        if !self.resumed {
            return;
        }
        self.resumed = false;

        let Some(cmd) = self.queue.front_mut() else {
            return self.set_state(State::Idle);
        };

        cmd.read_count -= cmd.read_batch;
        self.received.reset();

        let next = if cmd.read_count == 1 {
            self.hw.control(MasterCommand::BurstReceiveFinish);
            State::ReadWait
        } else {
            self.hw.control(MasterCommand::BurstReceiveCont);
            if cmd.read_count == 2 {
                State::ReadFinal
            } else {
                State::ReadNext
            }
        };
        self.set_state(next);
    }

    fn read_wait(&mut self) {
        let _ = self.received.write_byte(self.hw.get_data());
        self.set_state(State::Callback);
    }

    /// Retires the head command and reports its outcome.
    fn finish(&mut self, status: MasterStatus) {
        let Some(cmd) = self.queue.pop() else {
            return self.set_state(State::Idle);
        };

        let result = Status::from(status);
        debug!("transfer to {=u8:#x} finished: {}", cmd.address, result);

        let data = self.take_received();
        self.complete(cmd, result, &data);

        self.set_state(State::Idle);
    }
}

fn read_entry(read_count: usize) -> State {
    if read_count == 1 {
        State::ReadOne
    } else {
        State::ReadFirst
    }
}
