/// Default number of command slots. One slot always stays free, so this
/// allows `NUM_COMMANDS - 1` outstanding commands.
pub const NUM_COMMANDS: usize = 10;

/// Largest batch a single command moves between two pauses.
pub const MAX_BATCH: usize = 32;

/// Largest SMBus block payload.
pub const SMBUS_MAX_BLOCK: usize = 32;

/// Clock-low timeout programmed for SMBus operation (25 ms).
pub const SMBUS_TIMEOUT: u8 = 0x9C;

pub const ARP_PREPARE_TO_ARP: u8 = 0x01;
pub const ARP_RESET_DEVICE: u8 = 0x02;
pub const ARP_GET_UDID: u8 = 0x03;
pub const ARP_ASSIGN_ADDRESS: u8 = 0x04;

pub const ADDR_HOST: u8 = 0x08;
pub const ADDR_SMART_BATTERY_CHARGER: u8 = 0x09;
pub const ADDR_SMART_BATTERY_SELECTOR: u8 = 0x0A;
pub const ADDR_SMART_BATTERY: u8 = 0x0B;
pub const ADDR_DEFAULT_DEVICE: u8 = 0x61;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Speed {
    Standard,
    Fast,
}

impl Speed {
    pub fn hz(self) -> u32 {
        match self {
            Speed::Standard => 100_000,
            Speed::Fast => 400_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MasterConfig {
    pub system_clock_hz: u32,
    pub speed: Speed,
    /// Raw value for the controller's clock-low timeout counter.
    pub bus_timeout: Option<u8>,
}

impl MasterConfig {
    pub const fn new(system_clock_hz: u32) -> Self {
        Self {
            system_clock_hz,
            speed: Speed::Standard,
            bus_timeout: None,
        }
    }

    pub const fn smbus(system_clock_hz: u32) -> Self {
        Self {
            system_clock_hz,
            speed: Speed::Standard,
            bus_timeout: Some(SMBUS_TIMEOUT),
        }
    }

    pub const fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    pub(crate) fn validate(&self) {
        assert!(
            self.system_clock_hz >= 20 * self.speed.hz(),
            "System clock is too slow for the requested bus speed"
        );
    }
}
