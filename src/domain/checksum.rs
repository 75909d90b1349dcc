//! CRC-16/CCITT-FALSE as used by the payment string's trailing checksum field.

const POLYNOMIAL: u16 = 0x1021;
const INITIAL: u16 = 0xFFFF;

/// Computes the raw 16-bit register over `text`.
///
/// Each character's code is folded into the high byte of the register, MSB first,
/// with no reflection and no final XOR. Callers are expected to pass ASCII; wider
/// characters contribute their low byte only.
pub fn crc16(text: &str) -> u16 {
    text.chars().fold(INITIAL, |crc, ch| {
        let mut crc = crc ^ ((ch as u32 as u16) << 8);
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
        }
        crc
    })
}

/// Renders the checksum of `text` as four uppercase, zero-padded hex digits.
pub fn compute(text: &str) -> String {
    format!("{:04X}", crc16(text))
}
