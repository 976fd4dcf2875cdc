//! The DNS wire format.
//!
//! This module provides the minimal set of DNS types needed to build dynamic
//! updates, sign them, and read zone transfers: domain names, records,
//! messages, and a reader and writer for the wire format that handle name
//! compression.

mod iana;
pub mod message;
pub mod name;
pub mod rdata;
pub mod record;
pub mod wire;

pub use iana::{Class, Opcode, RType, Rcode, UnknownMnemonic};
pub use message::{Header, Message, Question};
pub use name::{Name, ParseNameError};
pub use rdata::{Mx, ParseDataError, RecordData, Soa, Srv, Tsig, Txt};
pub use record::{Record, RecordType};
pub use wire::{ProtocolError, WireReader, WireWriter};
