//! xosc Ableton Bridge
//!
//! Ableton Live sends the notes of a clip as pairs of OSC messages:
//!
//! ```text
//! /Note1 = 42        key of the note in polyphony slot 1
//! /Velocity1 = 100   its velocity, 0 for note off
//! ```
//!
//! This crate translates in both directions:
//! - OSC to notes: [`AbletonNoteCorrelator`] pairs `/Note{n}` and
//!   `/Velocity{n}` per peer into [`AbletonNote`] events
//! - MIDI to OSC: [`AbletonNotesSender`] assigns polyphony slots to held keys
//!   and sends the paired messages
//! - MIDI devices (feature `midi`): forward a hardware input port to a sender,
//!   and play correlated notes on an output port
//!
//! Both directions keep per-slot state and must see events in order. The
//! `spawn` helpers pin each direction to a single task.

pub mod ableton;
pub mod error;
pub mod midi;

pub use ableton::{
    route_ableton_notes, spawn_note_correlator, unroute_ableton_notes, AbletonNote,
    AbletonNoteCorrelator, AbletonNotesConfig, AbletonNotesSender, NoteSenderHandle,
};
pub use error::{BridgeError, Result};
pub use midi::MidiNoteEvent;

#[cfg(feature = "midi")]
pub use midi::device::{
    forward_midi_input, list_input_ports, list_output_ports, play_notes, MidiForwardConfig,
    MidiForwarder, MidiPlayConfig, MidiPlayer,
};
