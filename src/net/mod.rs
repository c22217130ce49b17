//! Networking: wire codec, framing, player slots and the WebTransport server

pub mod framing;
pub mod game_session;
pub mod protocol;
pub mod session;
pub mod tls;
pub mod transport;
