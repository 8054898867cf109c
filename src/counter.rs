//! Growable byte-sequence counter used as the per-block nonce source
//!
//! The counter behaves like an unbounded unsigned integer stored in a byte
//! buffer. Incrementing an all-`0xFF` buffer grows it by one byte instead of
//! wrapping to zero, so a nonce is never silently reused.

/// Byte order of a counter buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Most-significant byte first; growth prepends.
    Big,
    /// Least-significant byte first; growth appends.
    Little,
}

impl Endianness {
    /// The byte order of the host platform.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

/// Increments `counter` in place.
///
/// The first byte below `0xFF`, scanning from the least-significant end, is
/// incremented; every `0xFF` passed over on the way is reset to zero. If no
/// such byte exists (including the empty buffer) the zeroed buffer gains a
/// new most-significant byte with value 1.
pub fn increment(counter: &mut Vec<u8>, endianness: Endianness) {
    let carried = match endianness {
        Endianness::Big => carry(counter.iter_mut().rev()),
        Endianness::Little => carry(counter.iter_mut()),
    };

    if carried {
        match endianness {
            Endianness::Big => counter.insert(0, 1),
            Endianness::Little => counter.push(1),
        }
    }
}

/// Adds one to the bytes yielded least-significant first. Returns true when
/// the carry ran off the end.
fn carry<'a>(bytes: impl Iterator<Item = &'a mut u8>) -> bool {
    for byte in bytes {
        if *byte < u8::MAX {
            *byte += 1;
            return false;
        }
        *byte = 0;
    }
    true
}

/// An owned counter of record, advanced once per processed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    bytes: Vec<u8>,
    endianness: Endianness,
}

impl Counter {
    /// A zero-valued counter `width` bytes wide.
    pub fn new(width: usize, endianness: Endianness) -> Self {
        Self {
            bytes: vec![0u8; width],
            endianness,
        }
    }

    /// The value reached after `n` increments of a zero counter of `width`
    /// bytes, or `None` if that value does not fit in `width` bytes (in which
    /// case the sequential counter would have grown).
    pub fn at(width: usize, n: u64, endianness: Endianness) -> Option<Self> {
        let le = n.to_le_bytes();
        let significant = le.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        if significant > width {
            return None;
        }

        let mut bytes = vec![0u8; width];
        bytes[..significant].copy_from_slice(&le[..significant]);
        if endianness == Endianness::Big {
            bytes.reverse();
        }
        Some(Self { bytes, endianness })
    }

    /// Advances the counter by one, growing it if it was saturated.
    pub fn increment(&mut self) {
        increment(&mut self.bytes, self.endianness);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bump(mut bytes: Vec<u8>, endianness: Endianness) -> Vec<u8> {
        increment(&mut bytes, endianness);
        bytes
    }

    #[test]
    fn test_small_numbers_native() {
        for initial in [0i32, 255, 40442, -2] {
            let bytes = bump(initial.to_ne_bytes().to_vec(), Endianness::native());
            let actual = i32::from_ne_bytes(bytes.try_into().unwrap());
            assert_eq!(actual, initial + 1, "incrementing {}", initial);
        }
    }

    #[test]
    fn test_resize_only_when_saturated() {
        let cases = [(1usize, 0xFFu8, true), (24, 0xFF, true), (24, 0xFE, false), (0, 0, true)];
        for (size, fill, expect_grow) in cases {
            for endianness in [Endianness::Big, Endianness::Little] {
                let bytes = bump(vec![fill; size], endianness);
                let expected = if expect_grow { size + 1 } else { size };
                assert_eq!(bytes.len(), expected, "size {} fill {:#x}", size, fill);
            }
        }
    }

    #[test]
    fn test_empty_becomes_one() {
        assert_eq!(bump(Vec::new(), Endianness::Big), vec![1]);
        assert_eq!(bump(Vec::new(), Endianness::Little), vec![1]);
    }

    #[test]
    fn test_growth_is_mirrored() {
        for size in [1usize, 12, 24] {
            let big = bump(vec![0xFF; size], Endianness::Big);
            let little = bump(vec![0xFF; size], Endianness::Little);

            assert_eq!(big.len(), size + 1);
            assert_eq!(big[0], 1);
            assert!(big[1..].iter().all(|&b| b == 0));

            assert_eq!(little.len(), size + 1);
            assert_eq!(little[size], 1);
            assert!(little[..size].iter().all(|&b| b == 0));

            let mut reversed = little.clone();
            reversed.reverse();
            assert_eq!(big, reversed);
        }
    }

    #[test]
    fn test_carry_resets_low_bytes() {
        assert_eq!(bump(vec![0x00, 0xFF, 0xFF], Endianness::Big), vec![0x01, 0x00, 0x00]);
        assert_eq!(bump(vec![0xFF, 0xFF, 0x00], Endianness::Little), vec![0x00, 0x00, 0x01]);
        assert_eq!(bump(vec![0x12, 0xFE], Endianness::Big), vec![0x12, 0xFF]);
    }

    #[test]
    fn test_first_increment_is_one() {
        let mut counter = Counter::new(12, Endianness::Little);
        counter.increment();
        let mut expected = vec![0u8; 12];
        expected[0] = 1;
        assert_eq!(counter.as_bytes(), &expected[..]);
    }

    #[test]
    fn test_at_matches_sequential() {
        for endianness in [Endianness::Big, Endianness::Little] {
            let mut counter = Counter::new(12, endianness);
            for n in 1..=70_000u64 {
                counter.increment();
                if n % 997 == 0 || n == 255 || n == 256 || n == 65_536 {
                    assert_eq!(Some(counter.clone()), Counter::at(12, n, endianness), "n = {}", n);
                }
            }
        }
    }

    #[test]
    fn test_at_rejects_values_wider_than_counter() {
        assert!(Counter::at(1, 255, Endianness::Little).is_some());
        assert!(Counter::at(1, 256, Endianness::Little).is_none());
        assert_eq!(Counter::at(0, 0, Endianness::Big).map(|c| c.len()), Some(0));
    }

    #[test]
    fn test_counter_grows_past_width() {
        let mut counter = Counter::at(2, 0xFFFF, Endianness::Big).unwrap();
        counter.increment();
        assert_eq!(counter.as_bytes(), &[1, 0, 0]);
    }
}
