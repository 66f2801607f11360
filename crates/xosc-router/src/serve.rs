//! Receive loops feeding an [`OscInput`]

use tracing::{error, info};
use xosc_transport::{TransportEvent, TransportReceiver};

use crate::input::OscInput;

/// Feed every packet of `receiver` to `input`, one at a time.
///
/// Returns when the receiver closes or the input is closed. Decode failures
/// are logged by [`OscInput::handle`] and never end the loop.
pub async fn serve<R: TransportReceiver>(input: &OscInput, mut receiver: R) {
    info!("Input accepting packets");

    while let Some((event, peer)) = receiver.recv().await {
        if input.is_closed() {
            break;
        }
        match event {
            TransportEvent::Data(bytes) => input.handle(&peer, &bytes),
            TransportEvent::Error(e) => {
                error!("Transport error from {}: {}", peer, e);
            }
            TransportEvent::Closed { reason } => {
                info!("Transport closed: {:?}", reason);
                break;
            }
        }
    }

    info!("Input stopped accepting packets");
}

/// Spawn the receive loop of a bound UDP transport
#[cfg(feature = "udp")]
pub fn serve_udp(
    input: std::sync::Arc<OscInput>,
    transport: &xosc_transport::UdpTransport,
) -> tokio::task::JoinHandle<()> {
    let receiver = transport.start_receiver();
    tokio::spawn(async move { serve(&input, receiver).await })
}
