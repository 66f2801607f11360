//! MIDI note messages
//!
//! Only the two channel voice messages the note bridge needs are decoded:
//! note off (`0x8n`) and note on (`0x9n`). Everything else is ignored.

use serde::{Deserialize, Serialize};

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;

/// A note on or note off short message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MidiNoteEvent {
    NoteOn { channel: u8, key: u8, velocity: u8 },
    NoteOff { channel: u8, key: u8, velocity: u8 },
}

impl MidiNoteEvent {
    /// Decode a raw MIDI message, `None` for anything but a complete note
    /// on or note off
    pub fn parse(message: &[u8]) -> Option<Self> {
        let (&status, data) = message.split_first()?;
        let (&key, &velocity) = match data {
            [key, velocity, ..] => (key, velocity),
            _ => return None,
        };
        if key > 0x7f || velocity > 0x7f {
            return None;
        }

        let channel = status & 0x0f;
        match status & 0xf0 {
            NOTE_ON => Some(MidiNoteEvent::NoteOn {
                channel,
                key,
                velocity,
            }),
            NOTE_OFF => Some(MidiNoteEvent::NoteOff {
                channel,
                key,
                velocity,
            }),
            _ => None,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiNoteEvent::NoteOn { channel, .. } | MidiNoteEvent::NoteOff { channel, .. } => {
                channel
            }
        }
    }

    pub fn key(&self) -> u8 {
        match *self {
            MidiNoteEvent::NoteOn { key, .. } | MidiNoteEvent::NoteOff { key, .. } => key,
        }
    }

    pub fn velocity(&self) -> u8 {
        match *self {
            MidiNoteEvent::NoteOn { velocity, .. } | MidiNoteEvent::NoteOff { velocity, .. } => {
                velocity
            }
        }
    }

    /// The three byte wire form
    pub fn to_bytes(&self) -> [u8; 3] {
        let status = match self {
            MidiNoteEvent::NoteOn { .. } => NOTE_ON,
            MidiNoteEvent::NoteOff { .. } => NOTE_OFF,
        };
        [status | (self.channel() & 0x0f), self.key(), self.velocity()]
    }
}

/// Hardware MIDI ports: input forwarding and note playback
#[cfg(feature = "midi")]
pub mod device {
    use midir::{Ignore, MidiInput, MidiInputPort, MidiOutput, MidiOutputPort};
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use std::sync::mpsc::RecvTimeoutError;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tracing::{debug, info, warn};

    use super::MidiNoteEvent;
    use crate::ableton::{AbletonNote, NoteSenderHandle};
    use crate::{BridgeError, Result};

    /// MIDI forwarding configuration
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct MidiForwardConfig {
        /// Input port name, or a part of it. The first port when `None`.
        pub input_port: Option<String>,
        /// Client name announced to the MIDI system
        pub client_name: String,
    }

    impl Default for MidiForwardConfig {
        fn default() -> Self {
            Self {
                input_port: None,
                client_name: "xosc MIDI Input".to_string(),
            }
        }
    }

    /// List available MIDI input ports
    pub fn list_input_ports() -> Result<Vec<String>> {
        let midi_in =
            MidiInput::new("xosc MIDI Scanner").map_err(|e| BridgeError::Midi(e.to_string()))?;

        let ports = midi_in.ports();
        Ok(ports
            .iter()
            .filter_map(|p| midi_in.port_name(p).ok())
            .collect())
    }

    /// List available MIDI output ports
    pub fn list_output_ports() -> Result<Vec<String>> {
        let midi_out =
            MidiOutput::new("xosc MIDI Scanner").map_err(|e| BridgeError::Midi(e.to_string()))?;

        let ports = midi_out.ports();
        Ok(ports
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect())
    }

    /// Find input port by name or use first available
    fn find_input_port(midi_in: &MidiInput, port_name: Option<&str>) -> Option<MidiInputPort> {
        let ports = midi_in.ports();
        match port_name {
            Some(name) => ports.into_iter().find(|p| {
                midi_in
                    .port_name(p)
                    .map(|n| n.contains(name))
                    .unwrap_or(false)
            }),
            None => ports.into_iter().next(),
        }
    }

    /// Find output port by name or use first available
    fn find_output_port(midi_out: &MidiOutput, port_name: Option<&str>) -> Option<MidiOutputPort> {
        let ports = midi_out.ports();
        match port_name {
            Some(name) => ports.into_iter().find(|p| {
                midi_out
                    .port_name(p)
                    .map(|n| n.contains(name))
                    .unwrap_or(false)
            }),
            None => ports.into_iter().next(),
        }
    }

    /// A running MIDI input forwarding, stopped on drop
    pub struct MidiForwarder {
        port_name: String,
        running: Arc<Mutex<bool>>,
        thread: Option<std::thread::JoinHandle<()>>,
    }

    impl MidiForwarder {
        pub fn port_name(&self) -> &str {
            &self.port_name
        }

        pub fn stop(&mut self) {
            *self.running.lock() = false;
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    warn!("MIDI input thread panicked");
                }
            }
        }
    }

    impl Drop for MidiForwarder {
        fn drop(&mut self) {
            self.stop();
        }
    }

    /// Forward note events of a MIDI input port to a note sender.
    ///
    /// The connection lives on its own thread, midir connections are not
    /// `Send` on every backend. Events reach the sender in arrival order.
    pub fn forward_midi_input(
        config: MidiForwardConfig,
        notes: &NoteSenderHandle,
    ) -> Result<MidiForwarder> {
        let running = Arc::new(Mutex::new(true));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<String>>();
        let tx = notes.sender();
        let thread_running = running.clone();

        let thread = std::thread::spawn(move || {
            let mut midi_in = match MidiInput::new(&config.client_name) {
                Ok(m) => m,
                Err(e) => {
                    let _ = ready_tx.send(Err(BridgeError::Midi(e.to_string())));
                    return;
                }
            };
            midi_in.ignore(Ignore::All);

            let port = match find_input_port(&midi_in, config.input_port.as_deref()) {
                Some(p) => p,
                None => {
                    let name = config.input_port.unwrap_or_else(|| "any".to_string());
                    let _ = ready_tx.send(Err(BridgeError::DeviceNotFound(name)));
                    return;
                }
            };
            let port_name = midi_in
                .port_name(&port)
                .unwrap_or_else(|_| "Unknown".to_string());

            let _conn = match midi_in.connect(
                &port,
                "xosc-midi",
                move |_stamp, message, _| {
                    let Some(event) = MidiNoteEvent::parse(message) else {
                        return;
                    };
                    debug!("MIDI {:?}", event);
                    // the callback runs on a midir thread, outside the runtime
                    if tx.blocking_send(event).is_err() {
                        warn!("Note sender closed, dropping {:?}", event);
                    }
                },
                (),
            ) {
                Ok(conn) => conn,
                Err(e) => {
                    let _ = ready_tx.send(Err(BridgeError::ConnectionFailed(e.to_string())));
                    return;
                }
            };

            info!("Forwarding MIDI input: {}", port_name);
            let _ = ready_tx.send(Ok(port_name));

            // Keep the connection alive while running
            while *thread_running.lock() {
                std::thread::sleep(Duration::from_millis(100));
            }
            info!("MIDI input forwarding stopped");
        });

        let port_name = ready_rx
            .recv()
            .map_err(|_| BridgeError::Midi("MIDI input thread exited".to_string()))??;

        Ok(MidiForwarder {
            port_name,
            running,
            thread: Some(thread),
        })
    }

    /// MIDI playback configuration
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct MidiPlayConfig {
        /// Output port name, or a part of it. The first port when `None`.
        pub output_port: Option<String>,
        /// Client name announced to the MIDI system
        pub client_name: String,
        /// Channel of the played notes, 0-15
        pub channel: u8,
    }

    impl Default for MidiPlayConfig {
        fn default() -> Self {
            Self {
                output_port: None,
                client_name: "xosc MIDI Output".to_string(),
                channel: 0,
            }
        }
    }

    /// A running note playback, stopped on drop
    pub struct MidiPlayer {
        port_name: String,
        running: Arc<Mutex<bool>>,
        forward: JoinHandle<()>,
        thread: Option<std::thread::JoinHandle<()>>,
    }

    impl MidiPlayer {
        pub fn port_name(&self) -> &str {
            &self.port_name
        }

        pub fn stop(&mut self) {
            *self.running.lock() = false;
            self.forward.abort();
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() {
                    warn!("MIDI output thread panicked");
                }
            }
        }
    }

    impl Drop for MidiPlayer {
        fn drop(&mut self) {
            self.stop();
        }
    }

    /// Play correlated notes on a MIDI output port.
    ///
    /// A note with velocity 0 plays as note off, any other as note on.
    /// Notes outside the 7-bit MIDI range are skipped. Playback ends when
    /// `notes` closes or the player stops. Must be called within a tokio
    /// runtime.
    pub fn play_notes(
        mut notes: mpsc::Receiver<AbletonNote>,
        config: MidiPlayConfig,
    ) -> Result<MidiPlayer> {
        let running = Arc::new(Mutex::new(true));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<String>>();
        let (note_tx, note_rx) = std::sync::mpsc::channel::<AbletonNote>();
        let thread_running = running.clone();

        let thread = std::thread::spawn(move || {
            let midi_out = match MidiOutput::new(&config.client_name) {
                Ok(m) => m,
                Err(e) => {
                    let _ = ready_tx.send(Err(BridgeError::Midi(e.to_string())));
                    return;
                }
            };

            let port = match find_output_port(&midi_out, config.output_port.as_deref()) {
                Some(p) => p,
                None => {
                    let name = config.output_port.unwrap_or_else(|| "any".to_string());
                    let _ = ready_tx.send(Err(BridgeError::DeviceNotFound(name)));
                    return;
                }
            };
            let port_name = midi_out
                .port_name(&port)
                .unwrap_or_else(|_| "Unknown".to_string());

            let mut conn = match midi_out.connect(&port, "xosc-midi") {
                Ok(conn) => conn,
                Err(e) => {
                    let _ = ready_tx.send(Err(BridgeError::ConnectionFailed(e.to_string())));
                    return;
                }
            };

            info!("Playing notes on MIDI output: {}", port_name);
            let _ = ready_tx.send(Ok(port_name));

            while *thread_running.lock() {
                let note = match note_rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(note) => note,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                let Some(event) = note.to_midi(config.channel) else {
                    warn!(
                        "Skipping note out of MIDI range from {}: key {} velocity {}",
                        note.peer, note.key, note.velocity
                    );
                    continue;
                };
                debug!("MIDI {:?}", event);
                if let Err(e) = conn.send(&event.to_bytes()) {
                    warn!("MIDI send error: {}", e);
                }
            }
            info!("MIDI note playback stopped");
        });

        let port_name = ready_rx
            .recv()
            .map_err(|_| BridgeError::Midi("MIDI output thread exited".to_string()))??;

        // the connection stays on its thread, notes cross over a std channel
        let forward = tokio::spawn(async move {
            while let Some(note) = notes.recv().await {
                if note_tx.send(note).is_err() {
                    break;
                }
            }
        });

        Ok(MidiPlayer {
            port_name,
            running,
            forward,
            thread: Some(thread),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_on() {
        assert_eq!(
            MidiNoteEvent::parse(&[0x93, 60, 100]),
            Some(MidiNoteEvent::NoteOn {
                channel: 3,
                key: 60,
                velocity: 100
            })
        );
    }

    #[test]
    fn test_parse_note_off() {
        let event = MidiNoteEvent::parse(&[0x80, 42, 0]).unwrap();
        assert_eq!(event.key(), 42);
        assert_eq!(event.velocity(), 0);
        assert_eq!(event.channel(), 0);
        assert!(matches!(event, MidiNoteEvent::NoteOff { .. }));
    }

    #[test]
    fn test_ignores_other_messages() {
        // control change, program change, clock, running status
        assert_eq!(MidiNoteEvent::parse(&[0xb0, 74, 10]), None);
        assert_eq!(MidiNoteEvent::parse(&[0xc0, 5]), None);
        assert_eq!(MidiNoteEvent::parse(&[0xf8]), None);
        assert_eq!(MidiNoteEvent::parse(&[60, 100]), None);
        assert_eq!(MidiNoteEvent::parse(&[]), None);
        assert_eq!(MidiNoteEvent::parse(&[0x90, 60]), None);
    }

    #[test]
    fn test_to_bytes() {
        let bytes = [0x9f, 127, 1];
        assert_eq!(MidiNoteEvent::parse(&bytes).unwrap().to_bytes(), bytes);
    }

    #[test]
    fn test_played_note_bytes() {
        let note = |key, velocity| crate::AbletonNote {
            key,
            velocity,
            polyphony_index: 1,
            peer: xosc_core::Peer::new("live", 9001, "udp"),
        };
        assert_eq!(note(42, 0).to_midi(0).unwrap().to_bytes(), [0x80, 42, 0]);
        assert_eq!(note(60, 100).to_midi(2).unwrap().to_bytes(), [0x92, 60, 100]);
        // skipped by the player
        assert_eq!(note(128, 100).to_midi(0), None);
        assert_eq!(note(60, -1).to_midi(0), None);
    }
}
