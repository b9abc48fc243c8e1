//! MIDI messages, channel assignment and the cross-thread event queue.
//!
//! The engine consumes already-parsed channel messages. [`MidiMessage::parse`]
//! turns raw bytes into one; anything malformed or unsupported parses to
//! `None` and is dropped.
//!
//! Events from other threads travel through a lock-free SPSC queue
//! ([`rtrb`]): the sequencer owns a [`MidiSender`], the renderer drains the
//! matching `MidiReceiver` at the frame each event is stamped with.
//!
//! ```text
//! sequencer thread              audio thread
//! MidiSender::send(TimedMidi) ─► MidiReceiver ─► Synth::render_*
//! ```

use rtrb::{Consumer, Producer, PushError, RingBuffer};

use crate::error::SendError;

/// Number of MIDI channels.
pub const MIDI_CHANNELS: usize = 16;
/// Index of the rhythm part.
pub const RHYTHM_PART: usize = 8;
/// Number of parts (eight melodic plus rhythm).
pub const PART_COUNT: usize = 9;

/// A channel message the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Key released.
    NoteOff {
        /// Channel, 0-15.
        channel: u8,
        /// Key, 0-127.
        key: u8,
        /// Release velocity (unused by the engine).
        velocity: u8,
    },
    /// Key pressed with a non-zero velocity.
    NoteOn {
        /// Channel, 0-15.
        channel: u8,
        /// Key, 0-127.
        key: u8,
        /// Velocity, 1-127.
        velocity: u8,
    },
    /// Control change, including channel-mode messages (120-127).
    ControlChange {
        /// Channel, 0-15.
        channel: u8,
        /// Controller number, 0-127.
        controller: u8,
        /// Value, 0-127.
        value: u8,
    },
    /// Program change.
    ProgramChange {
        /// Channel, 0-15.
        channel: u8,
        /// Program, 0-127.
        program: u8,
    },
    /// Pitch bend.
    PitchBend {
        /// Channel, 0-15.
        channel: u8,
        /// 14-bit value, 8192 = centre.
        value: u16,
    },
}

impl MidiMessage {
    /// Parse a channel message. Running status is not supported; the slice
    /// must start with a status byte. Returns `None` for malformed input and
    /// for message types the engine ignores.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        if status < 0x80 || status >= 0xF0 {
            return None;
        }
        let channel = status & 0x0F;
        let byte = |i: usize| data.get(i).copied().filter(|b| *b < 0x80);
        match status & 0xF0 {
            0x80 => Some(Self::NoteOff {
                channel,
                key: byte(0)?,
                velocity: byte(1)?,
            }),
            0x90 => {
                let key = byte(0)?;
                let velocity = byte(1)?;
                Some(if velocity == 0 {
                    Self::NoteOff {
                        channel,
                        key,
                        velocity: 64,
                    }
                } else {
                    Self::NoteOn {
                        channel,
                        key,
                        velocity,
                    }
                })
            }
            0xB0 => Some(Self::ControlChange {
                channel,
                controller: byte(0)?,
                value: byte(1)?,
            }),
            0xC0 => Some(Self::ProgramChange {
                channel,
                program: byte(0)?,
            }),
            0xE0 => Some(Self::PitchBend {
                channel,
                value: u16::from(byte(0)?) | (u16::from(byte(1)?) << 7),
            }),
            _ => None,
        }
    }

    /// Parse a packed short message (status in the low byte, then data 1
    /// and data 2).
    pub fn from_packed(packed: u32) -> Option<Self> {
        let bytes = packed.to_le_bytes();
        Self::parse(&bytes[..3])
    }

    /// Channel the message is addressed to.
    pub fn channel(&self) -> u8 {
        match *self {
            Self::NoteOff { channel, .. }
            | Self::NoteOn { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::PitchBend { channel, .. } => channel,
        }
    }
}

/// A message stamped with the output frame it takes effect at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedMidi {
    /// Output frame (session clock) of the event.
    pub frame: u64,
    /// The message.
    pub message: MidiMessage,
}

impl TimedMidi {
    /// Stamp a message.
    pub fn new(frame: u64, message: MidiMessage) -> Self {
        Self { frame, message }
    }
}

/// MIDI channel to part assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelMap {
    parts: [Option<u8>; MIDI_CHANNELS],
}

impl Default for ChannelMap {
    /// Parts 1-8 on channels 1-8, rhythm on channel 10.
    fn default() -> Self {
        let mut parts = [None; MIDI_CHANNELS];
        for (part, slot) in parts.iter_mut().take(8).enumerate() {
            *slot = Some(part as u8);
        }
        parts[9] = Some(RHYTHM_PART as u8);
        Self { parts }
    }
}

impl ChannelMap {
    /// Power-on map of the hardware: parts 1-8 on channels 2-9, rhythm on 10.
    pub fn factory() -> Self {
        let mut parts = [None; MIDI_CHANNELS];
        for part in 0..8 {
            parts[part + 1] = Some(part as u8);
        }
        parts[9] = Some(RHYTHM_PART as u8);
        Self { parts }
    }

    /// A map with no channel assigned.
    pub fn empty() -> Self {
        Self {
            parts: [None; MIDI_CHANNELS],
        }
    }

    /// Assign a channel to a part (`None` to mute the channel). Out-of-range
    /// channels and parts are ignored.
    pub fn set(&mut self, channel: u8, part: Option<u8>) {
        if let Some(slot) = self.parts.get_mut(usize::from(channel)) {
            *slot = part.filter(|p| usize::from(*p) < PART_COUNT);
        }
    }

    /// Part listening on a channel.
    #[inline]
    pub fn part(&self, channel: u8) -> Option<usize> {
        self.parts
            .get(usize::from(channel))
            .copied()
            .flatten()
            .map(usize::from)
    }
}

/// Sending half of the MIDI queue. Lives on the sequencer thread.
pub struct MidiSender {
    producer: Producer<TimedMidi>,
}

impl core::fmt::Debug for MidiSender {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MidiSender")
            .field("free_slots", &self.producer.slots())
            .finish()
    }
}

impl MidiSender {
    /// Queue an event. A full queue hands the event back.
    pub fn send(&mut self, event: TimedMidi) -> core::result::Result<(), SendError> {
        self.producer.push(event).map_err(|PushError::Full(event)| SendError(event))
    }

    /// Parse and queue raw bytes. Malformed bytes are dropped and count as
    /// sent.
    pub fn send_bytes(&mut self, frame: u64, bytes: &[u8]) -> core::result::Result<(), SendError> {
        match MidiMessage::parse(bytes) {
            Some(message) => self.send(TimedMidi::new(frame, message)),
            None => Ok(()),
        }
    }

    /// Free slots left in the queue.
    pub fn free_slots(&self) -> usize {
        self.producer.slots()
    }

    /// Whether the receiving session has been dropped.
    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}

/// Receiving half of the MIDI queue, owned by the session.
pub(crate) struct MidiReceiver {
    consumer: Consumer<TimedMidi>,
}

impl core::fmt::Debug for MidiReceiver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MidiReceiver")
            .field("pending", &self.consumer.slots())
            .finish()
    }
}

impl MidiReceiver {
    /// Frame of the next queued event.
    #[inline]
    pub(crate) fn peek_frame(&self) -> Option<u64> {
        self.consumer.peek().ok().map(|event| event.frame)
    }

    /// Take the next queued event.
    #[inline]
    pub(crate) fn pop(&mut self) -> Option<TimedMidi> {
        self.consumer.pop().ok()
    }
}

/// Create a queue holding up to `capacity` events.
pub(crate) fn midi_queue(capacity: usize) -> (MidiSender, MidiReceiver) {
    let (producer, consumer) = RingBuffer::new(capacity);
    (MidiSender { producer }, MidiReceiver { consumer })
}
