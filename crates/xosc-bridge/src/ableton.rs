//! Ableton note protocol
//!
//! A held note is sent as two messages sharing a polyphony index `n`,
//! `{base}/Note{n}` with the key and `{base}/Velocity{n}` with the velocity.
//! Note off repeats the pair with velocity 0. Indexes start at 1.
//!
//! The state on either side is only correct when the pairs are seen in the
//! order they were sent, by one task. [`spawn_note_correlator`] and
//! [`AbletonNotesSender::spawn`] run each side as a single task.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};
use xosc_core::{AddressMatcher, DynValue, Message, Peer};
use xosc_router::{OscInput, OscOutput, RouteOptions};

use crate::error::{BridgeError, Result};
use crate::midi::MidiNoteEvent;

const NOTE: &str = "Note";
const VELOCITY: &str = "Velocity";

/// Events buffered in front of a spawned sender
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Ableton notes configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AbletonNotesConfig {
    /// Path prefix of the note addresses, e.g. `/live`. Empty for none.
    pub address_base: String,
    /// Treat a MIDI note on with velocity 0 as a note off
    pub note_off_on_zero_velocity: bool,
}

impl Default for AbletonNotesConfig {
    fn default() -> Self {
        Self {
            address_base: String::new(),
            note_off_on_zero_velocity: true,
        }
    }
}

impl AbletonNotesConfig {
    pub fn with_base(address_base: impl Into<String>) -> Self {
        Self {
            address_base: address_base.into(),
            ..Default::default()
        }
    }
}

/// A note assembled from a `/Note{n}` and `/Velocity{n}` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbletonNote {
    pub key: i32,
    /// 0 for note off
    pub velocity: i32,
    pub polyphony_index: u32,
    pub peer: Peer,
}

impl AbletonNote {
    pub fn is_note_off(&self) -> bool {
        self.velocity == 0
    }

    /// The MIDI message for this note, `None` when key or velocity are out
    /// of the MIDI range
    pub fn to_midi(&self, channel: u8) -> Option<MidiNoteEvent> {
        let key = u8::try_from(self.key).ok().filter(|k| *k <= 0x7f)?;
        let velocity = u8::try_from(self.velocity).ok().filter(|v| *v <= 0x7f)?;
        let channel = channel & 0x0f;
        Some(if velocity == 0 {
            MidiNoteEvent::NoteOff {
                channel,
                key,
                velocity,
            }
        } else {
            MidiNoteEvent::NoteOn {
                channel,
                key,
                velocity,
            }
        })
    }
}

fn prefix(base: &str, kind: &str) -> String {
    format!("{}/{}", base, kind)
}

fn route_address(base: &str, kind: &str) -> String {
    format!("{}/{}*", base, kind)
}

/// Route `{base}/Note*` and `{base}/Velocity*` on `input` as integers.
///
/// Decoded messages are published on the input's shared stream, where an
/// [`AbletonNoteCorrelator`] picks them up.
pub fn route_ableton_notes(input: &OscInput, base: &str) -> Result<()> {
    for kind in [NOTE, VELOCITY] {
        input.route_with(
            RouteOptions::<i32>::new(route_address(base, kind))
                .matcher(AddressMatcher::prefix(prefix(base, kind))),
        )?;
    }
    Ok(())
}

/// Remove the routes added by [`route_ableton_notes`]
pub fn unroute_ableton_notes(input: &OscInput, base: &str) -> Result<()> {
    let note = route_address(base, NOTE);
    let velocity = route_address(base, VELOCITY);
    input.unroute(&[note.as_str(), velocity.as_str()])?;
    Ok(())
}

/// Pairs received `/Note{n}` and `/Velocity{n}` messages, per peer.
///
/// Not thread safe by construction: `process` takes `&mut self`, so one
/// task owns it and sees the messages in arrival order.
#[derive(Debug)]
pub struct AbletonNoteCorrelator {
    note_prefix: String,
    velocity_prefix: String,
    /// Per peer, the key last seen for each polyphony index
    peers: HashMap<Peer, HashMap<u32, i32>>,
}

impl AbletonNoteCorrelator {
    pub fn new(base: &str) -> Self {
        Self {
            note_prefix: prefix(base, NOTE),
            velocity_prefix: prefix(base, VELOCITY),
            peers: HashMap::new(),
        }
    }

    /// Feed one decoded message. Messages of other routes are ignored.
    pub fn process(&mut self, message: &Message<DynValue>) -> Option<AbletonNote> {
        if !self.accepts(&message.address) {
            return None;
        }
        let Some(&value) = message.value_as::<i32>() else {
            warn!(
                "Expected an integer on {} from {}, got {:?}",
                message.address, message.peer, message.value
            );
            return None;
        };
        self.process_value(&message.peer, &message.address, value)
    }

    /// Feed one `/Note{n}` or `/Velocity{n}` value
    pub fn process_value(&mut self, peer: &Peer, address: &str, value: i32) -> Option<AbletonNote> {
        if let Some(suffix) = address.strip_prefix(self.note_prefix.as_str()) {
            let index = parse_index(address, suffix)?;
            trace!("{} holds key {} on index {}", peer, value, index);
            self.peers
                .entry(peer.clone())
                .or_default()
                .insert(index, value);
            return None;
        }

        let suffix = address.strip_prefix(self.velocity_prefix.as_str())?;
        let index = parse_index(address, suffix)?;
        let Some(keys) = self.peers.get_mut(peer) else {
            warn!("Velocity on {} from {} before any note", address, peer);
            return None;
        };
        let Some(key) = keys.remove(&index) else {
            warn!(
                "Velocity on {} from {} without a note for index {}",
                address, peer, index
            );
            return None;
        };

        Some(AbletonNote {
            key,
            velocity: value,
            polyphony_index: index,
            peer: peer.clone(),
        })
    }

    /// Notes waiting for their velocity, over all peers
    pub fn pending(&self) -> usize {
        self.peers.values().map(HashMap::len).sum()
    }

    /// Forget the state of one peer
    pub fn reset_peer(&mut self, peer: &Peer) {
        self.peers.remove(peer);
    }

    fn accepts(&self, address: &str) -> bool {
        address.starts_with(self.note_prefix.as_str())
            || address.starts_with(self.velocity_prefix.as_str())
    }
}

fn parse_index(address: &str, suffix: &str) -> Option<u32> {
    match suffix.parse() {
        Ok(index) => Some(index),
        Err(_) => {
            warn!("No polyphony index in {}", address);
            None
        }
    }
}

/// Correlate the notes published by `input` on a dedicated task.
///
/// The routes must be added separately with [`route_ableton_notes`]. The
/// task ends when the returned receiver is dropped or the input goes away.
pub fn spawn_note_correlator(input: &OscInput, base: &str) -> mpsc::Receiver<AbletonNote> {
    // subscribe before spawning, or messages handled in between are lost
    let mut messages = input.subscribe();
    let (tx, rx) = mpsc::channel(input.config().channel_capacity.max(1));
    let mut correlator = AbletonNoteCorrelator::new(base);

    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                _ = tx.closed() => break,
                message = messages.recv() => message,
            };
            match message {
                Ok(message) => {
                    if let Some(note) = correlator.process(&message) {
                        debug!("Note {:?}", note);
                        if tx.send(note).await.is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // pairs may be broken from here on
                    warn!("Note correlator lagged, {} messages skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Note correlator stopped");
    });

    rx
}

/// Sends MIDI notes as Ableton note pairs.
///
/// Each held key gets polyphony index `held + 1`. Like the Ableton side,
/// this does not look for a free slot, so releasing a lower index while
/// higher ones are held can hand out an index that is still in use.
pub struct AbletonNotesSender {
    output: Arc<OscOutput>,
    config: AbletonNotesConfig,
    /// Held key to polyphony index
    held: HashMap<i32, u32>,
}

impl AbletonNotesSender {
    /// Route the note addresses on `output` and create the sender
    pub fn new(output: Arc<OscOutput>, config: AbletonNotesConfig) -> Result<Self> {
        for kind in [NOTE, VELOCITY] {
            output.route_with(
                RouteOptions::<i32>::new(route_address(&config.address_base, kind))
                    .matcher(AddressMatcher::prefix(prefix(&config.address_base, kind))),
            )?;
        }
        Ok(Self {
            output,
            config,
            held: HashMap::new(),
        })
    }

    pub fn config(&self) -> &AbletonNotesConfig {
        &self.config
    }

    /// Number of held keys
    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Polyphony index of a held key
    pub fn index_of(&self, key: i32) -> Option<u32> {
        self.held.get(&key).copied()
    }

    /// Hold `key` and send its note pair, returning the polyphony index
    pub async fn note_on(&mut self, key: i32, velocity: i32) -> Result<u32> {
        let index = self.held.len() as u32 + 1;
        self.held.insert(key, index);
        self.send_pair(index, key, velocity).await?;
        Ok(index)
    }

    /// Release `key` and send its note pair.
    ///
    /// A key that is not held is logged and nothing is sent.
    pub async fn note_off(&mut self, key: i32, velocity: i32) -> Result<Option<u32>> {
        let Some(index) = self.held.remove(&key) else {
            error!("Note off for key {} without a note on", key);
            return Ok(None);
        };
        self.send_pair(index, key, velocity).await?;
        Ok(Some(index))
    }

    /// Apply one MIDI note event, returning the polyphony index it used
    pub async fn handle_event(&mut self, event: MidiNoteEvent) -> Result<Option<u32>> {
        match event {
            MidiNoteEvent::NoteOn { key, velocity, .. }
                if velocity == 0 && self.config.note_off_on_zero_velocity =>
            {
                self.note_off(key.into(), 0).await
            }
            MidiNoteEvent::NoteOn { key, velocity, .. } => {
                self.note_on(key.into(), velocity.into()).await.map(Some)
            }
            MidiNoteEvent::NoteOff { key, velocity, .. } => {
                self.note_off(key.into(), velocity.into()).await
            }
        }
    }

    /// Apply one raw MIDI message. Anything but note on and note off is
    /// ignored.
    pub async fn handle_midi(&mut self, message: &[u8]) -> Result<Option<u32>> {
        match MidiNoteEvent::parse(message) {
            Some(event) => self.handle_event(event).await,
            None => {
                trace!("Ignoring MIDI message {:02x?}", message);
                Ok(None)
            }
        }
    }

    /// Remove the note routes from the output
    pub fn unroute(&self) -> Result<()> {
        let note = route_address(&self.config.address_base, NOTE);
        let velocity = route_address(&self.config.address_base, VELOCITY);
        self.output.unroute(&[note.as_str(), velocity.as_str()])?;
        Ok(())
    }

    /// Move the sender onto its own task, fed through the returned handle
    pub fn spawn(mut self) -> NoteSenderHandle {
        let (tx, mut rx) = mpsc::channel::<MidiNoteEvent>(EVENT_QUEUE_CAPACITY);
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = self.handle_event(event).await {
                    error!("Failed to send {:?}: {}", event, e);
                }
            }
            debug!("Note sender stopped with {} held keys", self.held.len());
            self
        });
        NoteSenderHandle { tx, task }
    }

    async fn send_pair(&self, index: u32, key: i32, velocity: i32) -> Result<()> {
        let base = &self.config.address_base;
        self.output
            .send_async(&format!("{}/{}{}", base, NOTE, index), key)
            .await?;
        self.output
            .send_async(&format!("{}/{}{}", base, VELOCITY, index), velocity)
            .await?;
        Ok(())
    }
}

/// Handle of a spawned [`AbletonNotesSender`]
pub struct NoteSenderHandle {
    tx: mpsc::Sender<MidiNoteEvent>,
    task: JoinHandle<AbletonNotesSender>,
}

impl NoteSenderHandle {
    /// Queue one event, waiting while the queue is full
    pub async fn send(&self, event: MidiNoteEvent) -> Result<()> {
        self.tx.send(event).await.map_err(|_| BridgeError::Closed)
    }

    /// A queue handle for producers outside the runtime, e.g. MIDI callbacks
    pub fn sender(&self) -> mpsc::Sender<MidiNoteEvent> {
        self.tx.clone()
    }

    /// Wait for the queued events to be sent and get the sender back.
    ///
    /// Does not return while clones from [`NoteSenderHandle::sender`] are
    /// alive.
    pub async fn close(self) -> Result<AbletonNotesSender> {
        drop(self.tx);
        Ok(self.task.await?)
    }
}
