//! WHEP (WebRTC-HTTP Egress Protocol) client
//!
//! - `http`: offer POST, redirects, resource DELETE
//! - `session`: the negotiation state machine
//! - `client`: negotiation wired to track routing

pub mod client;
pub mod http;
pub mod session;
#[cfg(test)]
pub(crate) mod test_server;

pub use client::WhepClient;
pub use http::{WhepAnswer, WhepSignaling};
pub use session::{SessionState, WhepSession};
