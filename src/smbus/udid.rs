/// Bytes of an ARP UDID packet: the 16-byte UDID followed by an address.
pub const UDID_PACKET_LEN: usize = 17;

/// SMBus Unique Device Identifier, reported to the ARP master.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Udid {
    /// Address type and PEC support.
    pub device_capabilities: u8,
    /// UDID revision and silicon revision.
    pub version: u8,
    pub vendor_id: u16,
    pub device_id: u16,
    /// Protocol layer interfaces supported over SMBus.
    pub interface: u16,
    pub subsystem_vendor_id: u16,
    pub subsystem_device_id: u16,
    pub vendor_specific_id: u32,
}

impl Udid {
    /// Lays the UDID out most significant byte first, followed by `address`.
    pub fn encode(&self, address: u8) -> [u8; UDID_PACKET_LEN] {
        let mut packet = [0u8; UDID_PACKET_LEN];

        packet[0] = self.device_capabilities;
        packet[1] = self.version;
        packet[2..4].copy_from_slice(&self.vendor_id.to_be_bytes());
        packet[4..6].copy_from_slice(&self.device_id.to_be_bytes());
        packet[6..8].copy_from_slice(&self.interface.to_be_bytes());
        packet[8..10].copy_from_slice(&self.subsystem_vendor_id.to_be_bytes());
        packet[10..12].copy_from_slice(&self.subsystem_device_id.to_be_bytes());
        packet[12..16].copy_from_slice(&self.vendor_specific_id.to_be_bytes());
        packet[16] = address;

        packet
    }

    pub fn decode(packet: &[u8; UDID_PACKET_LEN]) -> (Self, u8) {
        let be16 = |i: usize| u16::from_be_bytes([packet[i], packet[i + 1]]);

        let udid = Self {
            device_capabilities: packet[0],
            version: packet[1],
            vendor_id: be16(2),
            device_id: be16(4),
            interface: be16(6),
            subsystem_vendor_id: be16(8),
            subsystem_device_id: be16(10),
            vendor_specific_id: u32::from_be_bytes([
                packet[12], packet[13], packet[14], packet[15],
            ]),
        };

        (udid, packet[16])
    }
}
