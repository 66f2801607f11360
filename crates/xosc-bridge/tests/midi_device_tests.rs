//! MIDI device tests
//!
//! Hosts without MIDI support fail at client creation, so these only check
//! that a missing port is reported instead of playing or forwarding nothing.

#![cfg(feature = "midi")]

use tokio::sync::mpsc;
use xosc_bridge::{play_notes, BridgeError, MidiPlayConfig};

const MISSING_PORT: &str = "xosc test port that does not exist";

#[tokio::test]
async fn test_play_notes_on_missing_port() {
    let (_tx, rx) = mpsc::channel(8);
    let config = MidiPlayConfig {
        output_port: Some(MISSING_PORT.to_string()),
        ..Default::default()
    };

    match play_notes(rx, config) {
        Err(BridgeError::DeviceNotFound(name)) => assert_eq!(name, MISSING_PORT),
        Err(BridgeError::Midi(_)) => {}
        Err(e) => panic!("unexpected error: {}", e),
        Ok(player) => panic!("connected to {}", player.port_name()),
    }
}

#[test]
fn test_default_play_config() {
    let config = MidiPlayConfig::default();
    assert_eq!(config.output_port, None);
    assert_eq!(config.channel, 0);
}
