use crate::FCS_BYTES;

/// Ethernet CRC-32 polynomial, reflected form of 0x04C11DB7.
const CRC32_POLY: u32 = 0xEDB8_8320;

const fn make_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                CRC32_POLY ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

const TABLE: [u32; 256] = make_table();

/// Streaming Ethernet CRC-32 engine.
///
/// Holds the running register for one frame: seeded all-ones, updated a byte
/// or a masked word at a time in wire order, bit-complemented on finalize.
/// Both MACs drive one of these over the same destination + source + type +
/// payload region, so a value written by the transmitter is reproducible by
/// the receiver's consumer.
#[derive(Debug, Clone)]
pub struct Crc32 {
    state: u32,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc32 {
    /// Engine in the reset state (register all-ones).
    pub fn new() -> Self {
        Self { state: 0xFFFF_FFFF }
    }

    /// Re-seed for a new frame.
    pub fn reset(&mut self) {
        self.state = 0xFFFF_FFFF;
    }

    /// Mix one byte into the register.
    pub fn update(&mut self, byte: u8) {
        let index = (self.state ^ byte as u32) & 0xFF;
        self.state = (self.state >> 8) ^ TABLE[index as usize];
    }

    /// One accumulation cycle: mix the contiguous low-order run of `keep`
    /// bytes of `word`, lane 0 (the least significant byte) first. A zero
    /// mask is a no-op cycle; set bits above the lowest clear bit are
    /// ignored.
    pub fn update_word(&mut self, word: u32, keep: u8) {
        let n = (keep.trailing_ones() as usize).min(4);
        for byte in &word.to_le_bytes()[..n] {
            self.update(*byte);
        }
    }

    /// The externally visible CRC value. Non-destructive; the register keeps
    /// accumulating if fed further.
    pub fn finalize(&self) -> u32 {
        !self.state
    }

    /// One-shot CRC over a byte slice.
    pub fn digest(data: &[u8]) -> u32 {
        let mut crc = Self::new();
        for b in data {
            crc.update(*b);
        }
        crc.finalize()
    }
}

/// Consumer-side frame check: recompute the CRC over everything but the
/// trailing FCS and compare against the FCS, which sits on the wire least
/// significant byte first. Frames too short to carry an FCS fail.
pub fn fcs_ok(frame: &[u8]) -> bool {
    if frame.len() < FCS_BYTES {
        return false;
    }
    let (body, fcs) = frame.split_at(frame.len() - FCS_BYTES);
    let wire = u32::from_le_bytes(fcs.try_into().unwrap());
    Crc32::digest(body) == wire
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn check_vector() {
        // The canonical CRC-32 reference vector.
        assert_eq!(Crc32::digest(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty_input() {
        assert_eq!(Crc32::digest(b""), 0x0000_0000);
        let crc = Crc32::new();
        assert_eq!(crc.finalize(), 0x0000_0000);
    }

    #[test]
    fn leading_byte_masks() {
        // 0x33221100 little-endian carries bytes 00 11 22 33 on the wire.
        let word = 0x3322_1100;
        for (keep, bytes) in [
            (0x1u8, &[0x00u8][..]),
            (0x3, &[0x00, 0x11][..]),
            (0x7, &[0x00, 0x11, 0x22][..]),
            (0xF, &[0x00, 0x11, 0x22, 0x33][..]),
        ] {
            let mut crc = Crc32::new();
            crc.update_word(word, keep);
            assert_eq!(crc.finalize(), Crc32::digest(bytes));
        }
    }

    #[test]
    fn zero_mask_is_noop() {
        let mut crc = Crc32::new();
        crc.update(0xAB);
        let before = crc.finalize();
        crc.update_word(0xDEAD_BEEF, 0);
        assert_eq!(crc.finalize(), before);
    }

    #[test]
    fn gapped_mask_counts_low_run_only() {
        let mut a = Crc32::new();
        a.update_word(0x4433_2211, 0b0101);
        let mut b = Crc32::new();
        b.update_word(0x4433_2211, 0b0001);
        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn streaming_matches_crc32fast() {
        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let len = rng.gen_range(1..256);
            let data: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();

            assert_eq!(Crc32::digest(&data), crc32fast::hash(&data));

            // Same bytes fed as masked words, a cycle per chunk.
            let mut crc = Crc32::new();
            for chunk in data.chunks(4) {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                let keep = (1u8 << chunk.len()).wrapping_sub(1);
                crc.update_word(u32::from_le_bytes(word), keep);
            }
            assert_eq!(crc.finalize(), crc32fast::hash(&data));
        }
    }

    #[test]
    fn fcs_check() {
        let mut frame = b"some frame body".to_vec();
        let crc = Crc32::digest(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        assert!(fcs_ok(&frame));
        frame[3] ^= 0x40;
        assert!(!fcs_ok(&frame));
        assert!(!fcs_ok(&[0x11, 0x22]));
    }
}
