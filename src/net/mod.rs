//! Transport abstractions shared by the reactor and the connection object.

pub mod tcp_listener;
pub mod tcp_stream;
