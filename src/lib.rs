//! DNSManager
//!
//! Manage the records of zones on authoritative nameservers, using dynamic
//! updates (RFC 2136) and zone transfers, both authenticated with TSIG
//! (RFC 8945).

pub mod base;
pub mod net;
pub mod repository;
pub mod service;
pub mod tsig;
pub mod update;
pub mod util;
pub mod xfr;
pub mod zone;
