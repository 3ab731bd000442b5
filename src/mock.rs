//! Simulated I2C peripheral for host tests.
//!
//! Every control command completes immediately against the attached
//! targets and raises the peripheral interrupt. Tests drain the interrupt
//! with [`MockBus::take_interrupt`] and feed it to the code under test.

use std::collections::VecDeque;

use crate::{
    config::MasterConfig,
    engine::Engine,
    hal::{
        AddressSlot, Direction, I2cMaster, I2cSlave, InterruptLine, MasterCommand,
        MasterInterrupt, MasterStatus, SlaveInterrupt, SlaveStatus,
    },
    Status,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub address: u8,
    pub direction: Direction,
    pub bytes: Vec<u8>,
    pub stopped: bool,
}

pub enum Target {
    /// First byte of every write selects the register, the rest are stored
    /// at auto-incrementing addresses. Reads continue from the pointer.
    Registers {
        regs: [u8; 256],
        pointer: u8,
        fresh: bool,
    },
    /// Replies with queued bytes, 0xFF once they run out.
    Scripted {
        replies: VecDeque<u8>,
        written: Vec<u8>,
    },
}

impl Target {
    pub fn registers() -> Self {
        Target::Registers {
            regs: [0; 256],
            pointer: 0,
            fresh: true,
        }
    }

    pub fn scripted(replies: &[u8]) -> Self {
        Target::Scripted {
            replies: replies.iter().copied().collect(),
            written: Vec::new(),
        }
    }

    fn begin_write(&mut self) {
        if let Target::Registers { fresh, .. } = self {
            *fresh = true;
        }
    }

    fn write(&mut self, byte: u8) {
        match self {
            Target::Registers {
                regs,
                pointer,
                fresh,
            } => {
                if *fresh {
                    *pointer = byte;
                    *fresh = false;
                } else {
                    regs[*pointer as usize] = byte;
                    *pointer = pointer.wrapping_add(1);
                }
            }
            Target::Scripted { written, .. } => written.push(byte),
        }
    }

    fn read(&mut self) -> u8 {
        match self {
            Target::Registers { regs, pointer, .. } => {
                let byte = regs[*pointer as usize];
                *pointer = pointer.wrapping_add(1);
                byte
            }
            Target::Scripted { replies, .. } => replies.pop_front().unwrap_or(0xFF),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub context: u32,
    pub status: Status,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
struct SlaveFrame {
    interrupt: SlaveInterrupt,
    status: SlaveStatus,
    data: u8,
}

pub struct MockBus {
    targets: Vec<(u8, Target)>,

    pub line_enabled: bool,
    pending: bool,
    raised: MasterInterrupt,
    pub enabled_interrupts: MasterInterrupt,
    pub config: Option<MasterConfig>,

    address: u8,
    direction: Direction,
    data_out: u8,
    data_in: u8,
    status: MasterStatus,
    bus_held: bool,

    pub external_busy: bool,
    pub controller_busy: bool,
    pub lose_arbitration: bool,
    pub nack_data: bool,
    pub time_out: bool,

    pub commands: Vec<MasterCommand>,
    pub segments: Vec<Segment>,
    pub completions: Vec<Completion>,

    frame: SlaveFrame,
    pub own: [u8; 2],
    pub slave_enabled: bool,
    pub slave_interrupts: SlaveInterrupt,
    pub slave_out: Vec<u8>,
    pub ack_override: bool,
    pub ack_value: Option<bool>,
}

impl MockBus {
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            line_enabled: false,
            pending: false,
            raised: MasterInterrupt::empty(),
            enabled_interrupts: MasterInterrupt::empty(),
            config: None,
            address: 0,
            direction: Direction::Transmit,
            data_out: 0,
            data_in: 0,
            status: MasterStatus::IDLE,
            bus_held: false,
            external_busy: false,
            controller_busy: false,
            lose_arbitration: false,
            nack_data: false,
            time_out: false,
            commands: Vec::new(),
            segments: Vec::new(),
            completions: Vec::new(),
            frame: SlaveFrame {
                interrupt: SlaveInterrupt::empty(),
                status: SlaveStatus::empty(),
                data: 0,
            },
            own: [0; 2],
            slave_enabled: false,
            slave_interrupts: SlaveInterrupt::empty(),
            slave_out: Vec::new(),
            ack_override: false,
            ack_value: None,
        }
    }

    pub fn with_target(mut self, address: u8, target: Target) -> Self {
        self.targets.push((address, target));
        self
    }

    pub fn target(&self, address: u8) -> &Target {
        &self
            .targets
            .iter()
            .find(|(a, _)| *a == address)
            .expect("no such target")
            .1
    }

    pub fn register(&self, address: u8, register: u8) -> u8 {
        match self.target(address) {
            Target::Registers { regs, .. } => regs[register as usize],
            Target::Scripted { .. } => panic!("target has no registers"),
        }
    }

    pub fn set_register(&mut self, address: u8, register: u8, value: u8) {
        match self.target_mut(address) {
            Some(Target::Registers { regs, .. }) => regs[register as usize] = value,
            _ => panic!("target has no registers"),
        }
    }

    pub fn written(&self, address: u8) -> &[u8] {
        match self.target(address) {
            Target::Scripted { written, .. } => written,
            Target::Registers { .. } => panic!("target is not scripted"),
        }
    }

    pub fn reads(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.direction == Direction::Receive)
            .count()
    }

    /// Consumes a pending interrupt if the line is unmasked.
    pub fn take_interrupt(&mut self) -> bool {
        if self.pending && self.line_enabled {
            self.pending = false;
            true
        } else {
            false
        }
    }

    /// Pends the interrupt with nothing for the handler to do.
    pub fn trigger_spurious(&mut self) {
        self.pending = true;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn bus_held(&self) -> bool {
        self.bus_held
    }

    fn target_mut(&mut self, address: u8) -> Option<&mut Target> {
        self.targets
            .iter_mut()
            .find(|(a, _)| *a == address)
            .map(|(_, t)| t)
    }

    fn raise(&mut self, interrupt: MasterInterrupt) {
        self.raised |= interrupt;
        self.pending = true;
    }

    /// Presents one slave-side event and raises the interrupt.
    pub fn slave_event(&mut self, interrupt: SlaveInterrupt, status: SlaveStatus, data: u8) {
        self.frame = SlaveFrame {
            interrupt,
            status,
            data,
        };
        self.pending = true;
    }
}

impl InterruptLine for MockBus {
    fn is_enabled(&self) -> bool {
        self.line_enabled
    }

    fn enable(&mut self) {
        self.line_enabled = true;
    }

    fn disable(&mut self) {
        self.line_enabled = false;
    }

    fn trigger(&mut self) {
        self.pending = true;
    }
}

impl I2cMaster for MockBus {
    fn init_master(&mut self, config: &MasterConfig) {
        self.config = Some(*config);
    }

    fn set_target(&mut self, address: u8, direction: Direction) {
        self.address = address;
        self.direction = direction;
    }

    fn put_data(&mut self, byte: u8) {
        self.data_out = byte;
    }

    fn get_data(&mut self) -> u8 {
        self.data_in
    }

    fn control(&mut self, command: MasterCommand) {
        self.commands.push(command);
        self.status = MasterStatus::empty();

        if command == MasterCommand::BurstSendErrorStop {
            self.bus_held = false;
            self.close_segment();
            return self.raise(MasterInterrupt::DATA);
        }

        if self.time_out {
            self.time_out = false;
            self.bus_held = false;
            self.close_segment();
            return self.raise(MasterInterrupt::TIMEOUT);
        }

        if self.lose_arbitration {
            self.lose_arbitration = false;
            self.bus_held = false;
            self.status = MasterStatus::ERROR | MasterStatus::ARB_LOST;
            return self.raise(MasterInterrupt::DATA);
        }

        if command.starts() {
            self.bus_held = true;
            self.segments.push(Segment {
                address: self.address,
                direction: self.direction,
                bytes: Vec::new(),
                stopped: false,
            });

            let (address, direction) = (self.address, self.direction);
            match self.target_mut(address) {
                Some(target) => {
                    if direction == Direction::Transmit {
                        target.begin_write();
                    }
                }
                None => {
                    self.status = MasterStatus::ERROR | MasterStatus::ADDR_NACK;
                    return self.settle(command);
                }
            }
        }

        if command.transfers() {
            let (address, direction, out) = (self.address, self.direction, self.data_out);
            match direction {
                Direction::Transmit if self.nack_data => {
                    self.nack_data = false;
                    self.status = MasterStatus::ERROR | MasterStatus::DATA_NACK;
                    return self.settle(command);
                }
                Direction::Transmit => {
                    if let Some(target) = self.target_mut(address) {
                        target.write(out);
                    }
                    self.log_byte(out);
                }
                Direction::Receive => {
                    let byte = self.target_mut(address).map_or(0xFF, |t| t.read());
                    self.data_in = byte;
                    self.log_byte(byte);
                }
            }
        }

        self.settle(command)
    }

    fn is_busy(&self) -> bool {
        self.controller_busy
    }

    fn is_bus_busy(&self) -> bool {
        self.bus_held || self.external_busy
    }

    fn status(&self) -> MasterStatus {
        let mut status = self.status;
        if self.bus_held {
            status |= MasterStatus::BUS_BUSY;
        } else if !status.failed() {
            status |= MasterStatus::IDLE;
        }
        status
    }

    fn interrupt_status(&self) -> MasterInterrupt {
        self.raised
    }

    fn clear_interrupts(&mut self, interrupts: MasterInterrupt) {
        self.raised.remove(interrupts);
    }

    fn enable_interrupts(&mut self, interrupts: MasterInterrupt) {
        self.enabled_interrupts |= interrupts;
    }
}

impl MockBus {
    fn settle(&mut self, command: MasterCommand) {
        if command.stops() {
            self.bus_held = false;
            self.close_segment();
        }
        self.raise(MasterInterrupt::DATA);
    }

    fn log_byte(&mut self, byte: u8) {
        if let Some(segment) = self.segments.last_mut() {
            segment.bytes.push(byte);
        }
    }

    fn close_segment(&mut self) {
        if let Some(segment) = self.segments.last_mut() {
            segment.stopped = true;
        }
    }
}

impl I2cSlave for MockBus {
    fn init_slave(&mut self) {
        self.slave_enabled = true;
    }

    fn set_own_address(&mut self, slot: AddressSlot, address: u8) {
        self.own[slot as usize] = address;
    }

    fn own_address(&self, slot: AddressSlot) -> u8 {
        self.own[slot as usize]
    }

    fn read_data(&mut self) -> u8 {
        self.frame.data
    }

    fn write_data(&mut self, byte: u8) {
        self.slave_out.push(byte);
    }

    fn slave_status(&self) -> SlaveStatus {
        self.frame.status
    }

    fn slave_interrupt_status(&self) -> SlaveInterrupt {
        self.frame.interrupt
    }

    fn clear_slave_interrupts(&mut self, interrupts: SlaveInterrupt) {
        self.frame.interrupt.remove(interrupts);
    }

    fn enable_slave_interrupts(&mut self, interrupts: SlaveInterrupt) {
        self.slave_interrupts |= interrupts;
    }

    fn set_ack_override(&mut self, enabled: bool) {
        self.ack_override = enabled;
    }

    fn ack_override(&self) -> bool {
        self.ack_override
    }

    fn set_ack_value(&mut self, ack: bool) {
        self.ack_value = Some(ack);
    }
}

pub type TestEngine = Engine<MockBus, u32>;

pub fn engine(bus: MockBus) -> TestEngine {
    Engine::new(bus, &MasterConfig::new(16_000_000))
}

/// Callback that logs every notification into the bus.
pub fn record(engine: &mut TestEngine, context: u32, status: Status, data: &[u8]) {
    engine.hardware_mut().completions.push(Completion {
        context,
        status,
        data: data.to_vec(),
    });
}

/// Services interrupts until the bus goes quiet. Returns how many ran.
pub fn run(engine: &mut TestEngine) -> usize {
    let mut serviced = 0;
    while engine.hardware_mut().take_interrupt() {
        engine.on_interrupt();
        serviced += 1;
        assert!(serviced < 1000, "engine never settles");
    }
    serviced
}
