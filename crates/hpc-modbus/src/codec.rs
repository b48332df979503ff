//! ---
//! hpc_section: "02-device-control"
//! hpc_subsection: "module"
//! hpc_type: "source"
//! hpc_scope: "code"
//! hpc_description: "Modbus register access and decoding."
//! hpc_version: "v0.1.0"
//! hpc_owner: "tbd"
//! ---
//! Wire-level decoding shared by the TCP client and the simulator.

/// Coil ON pattern on the Modbus wire.
pub const COIL_ON: u16 = 0xFF00;
/// Coil OFF pattern on the Modbus wire.
pub const COIL_OFF: u16 = 0x0000;

/// The 16-bit pattern a coil boolean encodes to.
pub fn coil_pattern(on: bool) -> u16 {
    if on {
        COIL_ON
    } else {
        COIL_OFF
    }
}

/// Flatten register words into big-endian bytes, high byte first.
pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

/// Decode big-endian bytes into a signed integer. Supported widths are
/// 1, 2, 4 and 8 bytes; anything else decodes to 0.
pub fn decode_be(data: &[u8]) -> i64 {
    match data.len() {
        1 => i64::from(data[0] as i8),
        2 => i64::from(i16::from_be_bytes([data[0], data[1]])),
        4 => i64::from(i32::from_be_bytes([data[0], data[1], data[2], data[3]])),
        8 => i64::from_be_bytes([
            data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
        ]),
        _ => 0,
    }
}
