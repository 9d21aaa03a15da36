#![forbid(unsafe_code)]

//! Terminal monitor mirroring the traffic-light daemon.

pub mod poller;
pub mod render;
pub mod source;
