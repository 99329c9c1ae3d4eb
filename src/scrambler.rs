/// 64-bit parallel self-synchronizing line scrambler, generator polynomial
/// 1 + x^39 + x^58.
///
/// The 128-bit state register holds the last two scrambled words, least
/// significant bit first: for lane i in 0..64, output bit i is input bit i
/// xor state bit 6+i xor state bit 25+i, and the state shifts down one word
/// with the newest scrambled word entering the upper half. The descrambler
/// runs the identical taps but feeds its *input* — the scrambled stream —
/// into the state, which is what makes the pair self-synchronizing: two
/// matching observed words are enough to bring any descrambler into
/// lock-step.
///
/// State is continuous across frames for the lifetime of a link and is owned
/// by the caller, one instance per direction; `reset()` (or `new()`) seeds
/// all ones. The MACs never touch it.
#[derive(Debug, Clone)]
pub struct Scrambler {
    state: u128,
}

impl Default for Scrambler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scrambler {
    /// Scrambler in the reset state (all 128 state bits set).
    pub fn new() -> Self {
        Self { state: u128::MAX }
    }

    /// Re-seed the state to all ones.
    pub fn reset(&mut self) {
        self.state = u128::MAX;
    }

    fn taps(&self) -> u64 {
        (self.state >> 6) as u64 ^ (self.state >> 25) as u64
    }

    /// Scramble one 64-bit word; the scrambled word enters the state.
    pub fn scramble(&mut self, word: u64) -> u64 {
        let out = word ^ self.taps();
        self.state = (self.state >> 64) | ((out as u128) << 64);
        out
    }

    /// Descramble one 64-bit word; the *observed* (still scrambled) word
    /// enters the state.
    pub fn descramble(&mut self, word: u64) -> u64 {
        let out = word ^ self.taps();
        self.state = (self.state >> 64) | ((word as u128) << 64);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    /// Bit-by-bit model of the same register, kept deliberately naive so the
    /// word-parallel implementation is checked against an independent
    /// expression of the definition.
    struct BitModel {
        state: [u8; 128],
    }

    impl BitModel {
        fn new() -> Self {
            Self { state: [1; 128] }
        }

        fn step(&mut self, word: u64) -> u64 {
            let mut out = 0u64;
            for i in 0..64 {
                let bit = ((word >> i) & 1) as u8 ^ self.state[6 + i] ^ self.state[25 + i];
                out |= (bit as u64) << i;
            }
            let mut next = [0u8; 128];
            next[..64].copy_from_slice(&self.state[64..]);
            for i in 0..64 {
                next[64 + i] = ((out >> i) & 1) as u8;
            }
            self.state = next;
            out
        }
    }

    #[test]
    fn cold_start_zeros_stay_zero() {
        // All-ones state: both taps read 1, so zero input scrambles to zero.
        let mut scr = Scrambler::new();
        for _ in 0..4 {
            assert_eq!(scr.scramble(0), 0);
        }
    }

    #[test]
    fn matches_bit_model() {
        let mut rng = rand::thread_rng();
        let mut scr = Scrambler::new();
        let mut model = BitModel::new();
        for _ in 0..64 {
            let word: u64 = rng.r#gen();
            assert_eq!(scr.scramble(word), model.step(word));
        }
    }

    #[test]
    fn descrambler_recovers_stream() {
        let mut rng = rand::thread_rng();
        let mut scr = Scrambler::new();
        let mut descr = Scrambler::new();
        for _ in 0..256 {
            let word: u64 = rng.r#gen();
            assert_eq!(descr.descramble(scr.scramble(word)), word);
        }
    }

    #[test]
    fn converges_after_two_words() {
        // A descrambler with arbitrary state locks on once the 128-bit
        // register has been refilled from the observed stream.
        let mut rng = rand::thread_rng();
        let mut scr = Scrambler::new();
        let mut descr = Scrambler {
            state: rng.r#gen::<u128>(),
        };
        descr.descramble(scr.scramble(rng.r#gen()));
        descr.descramble(scr.scramble(rng.r#gen()));
        for _ in 0..16 {
            let word: u64 = rng.r#gen();
            assert_eq!(descr.descramble(scr.scramble(word)), word);
        }
    }

    #[test]
    fn state_survives_idle_gaps() {
        // Continuous across frames: scrambling the same words again from the
        // evolved state must not repeat the first frame's output.
        let mut scr = Scrambler::new();
        let first: Vec<u64> = (0..8).map(|_| scr.scramble(0x5555_5555_5555_5555)).collect();
        let second: Vec<u64> = (0..8).map(|_| scr.scramble(0x5555_5555_5555_5555)).collect();
        assert_ne!(first, second);
    }
}
