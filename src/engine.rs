use core::cmp;

use crate::{
    command::{Command, CommandQueue, Composite, Transfer},
    config::{MasterConfig, MAX_BATCH, NUM_COMMANDS},
    hal::{I2cMaster, InterruptLine, MasterInterrupt},
    irq_mask::IrqMask,
    receive_buffer::ReceiveBuffer,
    state_holder::StateHolder,
    Rejected, State, Status,
};

pub const STATES_HISTORY_SIZE: usize = 5;

/// Completion callback of a command.
///
/// Runs in interrupt context with the engine borrowed, so it may queue the
/// next command or resume a paused one. The slice holds the bytes read by
/// the batch that just ended, empty for writes.
pub type Callback<H, C, const N: usize> = fn(&mut Engine<H, C, N>, C, Status, &[u8]);

#[cfg(feature = "dump")]
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StateDump {
    pub state_history: [State; STATES_HISTORY_SIZE],
    pub current_state: State,
}

/// Interrupt-driven I2C master transaction engine.
///
/// Commands run one at a time in FIFO order. All stepping happens in
/// [`Engine::on_interrupt`], which the platform calls from the peripheral's
/// interrupt vector.
pub struct Engine<H, C, const N: usize = NUM_COMMANDS> {
    pub(crate) hw: H,
    pub(crate) state: StateHolder<State, STATES_HISTORY_SIZE>,
    pub(crate) queue: CommandQueue<Command<H, C, N>, N>,
    pub(crate) received: ReceiveBuffer<MAX_BATCH>,
    pub(crate) resumed: bool,
}

impl<H: I2cMaster + InterruptLine, C: Copy, const N: usize> Engine<H, C, N> {
    pub fn new(mut hw: H, config: &MasterConfig) -> Self {
        assert!(N >= 2, "Command queue needs at least two slots");
        config.validate();

        hw.init_master(config);
        hw.enable_interrupts(MasterInterrupt::DATA);
        hw.enable();

        Self {
            hw,
            state: StateHolder::new(State::Idle),
            queue: CommandQueue::new(),
            received: ReceiveBuffer::new(),
            resumed: false,
        }
    }

    /// Queues a transfer.
    pub fn command(
        &mut self,
        transfer: Transfer<'_>,
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        self.enqueue(Command::new(transfer, callback, context, Composite::Plain))
    }

    pub fn write(
        &mut self,
        address: u8,
        data: &[u8],
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        self.command(Transfer::write(address, data), callback, context)
    }

    /// Writes `write` (typically a register address) then reads `read_count`
    /// bytes after a repeated start.
    pub fn read(
        &mut self,
        address: u8,
        write: &[u8],
        read_count: usize,
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        self.command(Transfer::read(address, write, read_count), callback, context)
    }

    /// Writes `total` bytes, pausing with [`Status::BatchDone`] after every
    /// `batch` bytes until [`Engine::resume`] supplies the next batch.
    pub fn write_batched(
        &mut self,
        address: u8,
        first: &[u8],
        total: usize,
        batch: usize,
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        self.command(
            Transfer::write_batched(address, first, total, batch),
            callback,
            context,
        )
    }

    /// Reads `read_count` bytes, pausing with [`Status::BatchReady`] after
    /// every `batch` bytes until [`Engine::resume`] is called.
    pub fn read_batched(
        &mut self,
        address: u8,
        write: &[u8],
        read_count: usize,
        batch: usize,
        callback: Option<Callback<H, C, N>>,
        context: C,
    ) -> Result<(), Rejected> {
        self.command(
            Transfer::read(address, write, read_count).with_read_batch(batch),
            callback,
            context,
        )
    }

    pub(crate) fn enqueue(&mut self, command: Command<H, C, N>) -> Result<(), Rejected> {
        let mut hw = IrqMask::new(&mut self.hw);

        let address = command.address;
        if self.queue.push(command).is_err() {
            warn!("command queue full, rejecting transfer to {=u8:#x}", address);
            return Err(Rejected::QueueFull);
        }
        debug!("queued transfer to {=u8:#x}", address);

        if matches!(self.state.get_state(), State::Idle) {
            hw.trigger();
        }

        Ok(())
    }

    /// Continues a paused batched transfer.
    ///
    /// For writes `data` is the next batch; reads ignore it.
    pub fn resume(&mut self, data: &[u8]) -> Result<(), Rejected> {
        match self.state.get_state() {
            State::WritePause => self.resume_write(data),
            State::ReadPause => self.resume_read(),
            _ => Err(Rejected::NotPaused),
        }
    }

    pub fn resume_write(&mut self, data: &[u8]) -> Result<(), Rejected> {
        let mut hw = IrqMask::new(&mut self.hw);

        if !matches!(self.state.get_state(), State::WritePause) {
            warn!("write resume while not paused");
            return Err(Rejected::NotPaused);
        }

        let Some(command) = self.queue.front_mut() else {
            return Err(Rejected::NotPaused);
        };

        let needed = command.next_write_batch();
        assert!(data.len() >= needed, "Next write batch is too short");
        command.write.write(&data[..needed]);

        self.resumed = true;
        hw.trigger();
        Ok(())
    }

    pub fn resume_read(&mut self) -> Result<(), Rejected> {
        let mut hw = IrqMask::new(&mut self.hw);

        if !matches!(self.state.get_state(), State::ReadPause) {
            warn!("read resume while not paused");
            return Err(Rejected::NotPaused);
        }

        self.resumed = true;
        hw.trigger();
        Ok(())
    }

    pub fn state(&self) -> State {
        self.state.get_state()
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state(), State::Idle) && self.queue.is_empty()
    }

    /// Commands waiting or in flight.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub(crate) fn set_state(&self, state: State) {
        trace!("engine state {}", state);
        self.state.set_state(state);
    }

    /// Copies the bytes of the current read batch out of the engine so the
    /// callback can borrow the engine mutably.
    pub(crate) fn take_received(&self) -> heapless::Vec<u8, MAX_BATCH> {
        let data = self.received.as_slice();
        let mut out = heapless::Vec::new();
        let _ = out.extend_from_slice(&data[..cmp::min(data.len(), MAX_BATCH)]);
        out
    }

    #[cfg(feature = "dump")]
    pub fn dump_state(&self) -> StateDump {
        let mut states = [State::Idle; STATES_HISTORY_SIZE];

        critical_section::with(|cs| {
            let states_deque = self.state.get_history(cs);
            crate::state_holder::deque_into_array(&states_deque, &mut states);
        });

        StateDump {
            state_history: states,
            current_state: self.state(),
        }
    }
}
