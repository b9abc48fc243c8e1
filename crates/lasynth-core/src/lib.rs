//! lasynth Core - integer DSP primitives for LA synthesis
//!
//! This crate holds the small, allocation-free building blocks shared by the
//! synthesis engine and the reverb: a circular 16-bit sample buffer and the
//! fixed-point arithmetic of the original hardware.
//!
//! # Contents
//!
//! - [`RingBuffer`] - Fixed-capacity circular buffer with a resizable active window
//! - [`serial_mul`] - Bit-serial 8-bit multiply of the reverb DSP
//! - [`soft_saturate`] - DAC-stage soft clipping to 16 bits
//! - [`clip_i16`], [`i16_to_f32`] - Sample-format helpers
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible (it needs `alloc` for buffer storage).
//! Disable the default `std` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! lasynth-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Design Principles
//!
//! - **Deterministic**: integer arithmetic only, identical output on every platform
//! - **Real-time safe**: buffers are sized once and never reallocate

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod math;
pub mod ring_buffer;

pub use math::{SATURATION_KNEE, clip_i16, i16_to_f32, serial_mul, soft_saturate};
pub use ring_buffer::RingBuffer;
