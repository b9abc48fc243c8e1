//! Integer arithmetic helpers shared by the synthesis and reverb stages.
//!
//! Everything here works on fixed-point integers so that rendering is
//! deterministic across platforms.
//!
//! | Function | Purpose |
//! |----------|---------|
//! | [`serial_mul`] | 8-bit shift-and-add multiply of the reverb DSP |
//! | [`clip_i16`] | Hard clamp to the 16-bit range |
//! | [`soft_saturate`] | DAC-stage soft clipping to 16 bits |
//! | [`i16_to_f32`] | 16-bit sample to `[-1.0, 1.0)` float |

/// Level below which [`soft_saturate`] passes samples through untouched.
pub const SATURATION_KNEE: i32 = 24576;

/// Headroom between [`SATURATION_KNEE`] and full scale.
const SATURATION_HEAD: i64 = (i16::MAX as i64) - SATURATION_KNEE as i64;

/// Multiply `sample` by an 8-bit coefficient the way the reverb DSP does it.
///
/// The hardware multiplies bit-serially: for each set bit of `add_mask`
/// (MSB first) it adds a progressively right-shifted copy of the sample.
/// Bits of `carry_mask` control whether the bit shifted out of a negative
/// sample is carried back in, which changes rounding toward zero.
///
/// The result approximates `(sample * add_mask) >> 8`.
///
/// # Example
///
/// ```rust
/// use lasynth_core::serial_mul;
///
/// assert_eq!(serial_mul(1024, 0x80, 0xFF), 512);
/// assert_eq!(serial_mul(1024, 0xFF, 0xFF), 1020);
/// assert_eq!(serial_mul(-1024, 0x80, 0x00), -512);
/// ```
#[inline]
pub fn serial_mul(sample: i32, add_mask: u8, carry_mask: u8) -> i32 {
    let mut sample = sample;
    let mut mask: u8 = 0x80;
    let mut result = 0i32;
    for _ in 0..8 {
        let carry = if sample < 0 && (mask & carry_mask) != 0 {
            sample & 1
        } else {
            0
        };
        sample >>= 1;
        if mask & add_mask != 0 {
            result += sample + carry;
        }
        mask >>= 1;
    }
    result
}

/// Clamp a wide intermediate to the signed 16-bit range.
#[inline]
pub fn clip_i16(x: i32) -> i16 {
    x.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Output-stage soft saturation.
///
/// Linear up to [`SATURATION_KNEE`], then a rational curve that leaves the
/// knee with unit slope and approaches full scale asymptotically:
///
/// ```text
/// y = knee + d * head / (d + head),   d = |x| - knee
/// ```
///
/// The curve is odd-symmetric; the result always fits in an `i16` and never
/// reaches `i16::MIN`.
///
/// # Example
///
/// ```rust
/// use lasynth_core::{soft_saturate, SATURATION_KNEE};
///
/// assert_eq!(soft_saturate(1000), 1000);
/// assert_eq!(soft_saturate(SATURATION_KNEE), SATURATION_KNEE as i16);
/// assert!(soft_saturate(1_000_000) < i16::MAX);
/// assert_eq!(soft_saturate(-1_000_000), -soft_saturate(1_000_000));
/// ```
#[inline]
pub fn soft_saturate(x: i32) -> i16 {
    let magnitude = i64::from(x).abs();
    if magnitude <= i64::from(SATURATION_KNEE) {
        return x as i16;
    }
    let d = magnitude - i64::from(SATURATION_KNEE);
    let y = i64::from(SATURATION_KNEE) + d * SATURATION_HEAD / (d + SATURATION_HEAD);
    let y = y as i16;
    if x < 0 { -y } else { y }
}

/// Convert a 16-bit sample to a float in `[-1.0, 1.0)`.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}
