//! xosc Router
//!
//! Address routing on top of the xosc codec:
//! - Route tables with exact and predicate matched addresses ([`Router`])
//! - The input pipeline, from packets to typed messages ([`OscInput`])
//! - The output pipeline, from typed values to packets ([`OscOutput`])
//! - Receive loops connecting a transport to an input ([`serve`])
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xosc_router::{serve_udp, InputConfig, OscInput};
//! use xosc_transport::UdpTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let input = Arc::new(OscInput::new(InputConfig::default()));
//!     let frequency = input.route::<f32>("/oscillator/4/frequency")?;
//!     let mut updates = frequency.subscribe();
//!
//!     let transport = UdpTransport::bind("0.0.0.0:9000").await?;
//!     serve_udp(input, &transport);
//!
//!     while let Ok(message) = updates.recv().await {
//!         println!("{} Hz from {}", message.value, message.peer);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod input;
pub mod output;
pub mod router;
pub mod serve;

pub use error::{ActionError, Result, RouterError};
pub use input::{InputConfig, InputDispatch, InputRoute, OscInput, RouteOptions};
pub use output::{OscOutput, OutputConfig, OutputEncode, OutputRoute};
pub use router::{Route, RouteInfo, Router};
pub use serve::serve;

#[cfg(feature = "udp")]
pub use serve::serve_udp;
