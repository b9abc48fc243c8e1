//! lasynth Reverb - integer delay-network reverb
//!
//! The reverb unit of the LA synthesizer: a fixed comb/allpass network with
//! four modes, each tuned by a 3-bit time and a 3-bit level parameter.
//!
//! - [`ReverbModel`] - The network and its per-sample processing
//! - [`ReverbMode`] - Room, Hall, Plate, Tap Delay
//! - [`ModeSettings`] - Static tuning tables of a mode
//!
//! The network runs entirely in integers at the native 32 kHz rate. Delay
//! memory is sized for the largest mode up front and is never cleared by a
//! parameter change, only by [`ReverbModel::reset`].
//!
//! # no_std Support
//!
//! Disable the default `std` feature; `alloc` is still required.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod filters;
pub mod model;
pub mod settings;

pub use filters::{AllpassStage, CombStage};
pub use model::{ReverbModel, TAIL_FLOOR};
pub use settings::{MAX_TIME_LEVEL, ModeSettings, ReverbMode};
