//! Property-based tests for lasynth-core primitives.
//!
//! Checks the saturation curve, the bit-serial multiplier and ring buffer
//! addressing over randomized inputs.

use lasynth_core::{RingBuffer, SATURATION_KNEE, serial_mul, soft_saturate};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Soft saturation is odd-symmetric and never exceeds the 16-bit range.
    #[test]
    fn soft_saturate_bounded_and_symmetric(x in -10_000_000i32..10_000_000i32) {
        let y = soft_saturate(x);
        prop_assert!(y > i16::MIN);
        prop_assert_eq!(soft_saturate(-x), -y);
        if x.abs() <= SATURATION_KNEE {
            prop_assert_eq!(i32::from(y), x);
        }
    }

    /// Soft saturation is monotonic.
    #[test]
    fn soft_saturate_monotonic(a in -1_000_000i32..1_000_000i32, b in -1_000_000i32..1_000_000i32) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(soft_saturate(lo) <= soft_saturate(hi));
    }

    /// The bit-serial multiply stays within a few LSB of the exact product.
    #[test]
    fn serial_mul_close_to_product(
        sample in -32768i32..=32767i32,
        add_mask in any::<u8>(),
        carry_mask in any::<u8>(),
    ) {
        let exact = (sample * i32::from(add_mask)) >> 8;
        let got = serial_mul(sample, add_mask, carry_mask);
        prop_assert!((got - exact).abs() <= 8, "got {} exact {}", got, exact);
    }

    /// A sample written `d` steps ago is read back with `tap(d)`.
    #[test]
    fn ring_buffer_tap_reads_history(
        capacity in 2usize..256,
        writes in prop::collection::vec(any::<i16>(), 1..512),
        delay_seed in any::<usize>(),
    ) {
        let mut ring = RingBuffer::new(capacity);
        for &s in &writes {
            ring.store(s);
            ring.advance();
        }
        let max_delay = writes.len().min(capacity - 1);
        prop_assume!(max_delay >= 1);
        let delay = 1 + delay_seed % max_delay;
        prop_assert_eq!(ring.tap(delay), writes[writes.len() - delay]);
    }
}
