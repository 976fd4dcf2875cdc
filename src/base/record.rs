//! Resource records.

use std::{fmt, hash, str::FromStr};

use serde::{Deserialize, Serialize};

use super::{
    Class, RType,
    name::Name,
    rdata::RecordData,
    wire::{ProtocolError, WireReader, WireWriter},
};

//----------- RecordType -------------------------------------------------------

/// A record type that can be managed through dynamic updates.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
#[value(rename_all = "UPPER")]
pub enum RecordType {
    A,
    Cname,
    Ptr,
    Mx,
    Txt,
    Srv,
}

impl RecordType {
    /// All managed record types.
    pub const ALL: [Self; 6] = [
        Self::A,
        Self::Cname,
        Self::Ptr,
        Self::Mx,
        Self::Txt,
        Self::Srv,
    ];

    /// The underlying record type code.
    pub const fn rtype(self) -> RType {
        match self {
            Self::A => RType::A,
            Self::Cname => RType::CNAME,
            Self::Ptr => RType::PTR,
            Self::Mx => RType::MX,
            Self::Txt => RType::TXT,
            Self::Srv => RType::SRV,
        }
    }

    /// The managed record type for a record type code, if any.
    pub fn from_rtype(rtype: RType) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.rtype() == rtype)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Cname => "CNAME",
            Self::Ptr => "PTR",
            Self::Mx => "MX",
            Self::Txt => "TXT",
            Self::Srv => "SRV",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported record type '{s}'"))
    }
}

//----------- Record -----------------------------------------------------------

/// A resource record.
///
/// Records are compared and hashed by their owner name, type and data.  The
/// class and TTL are not significant, so that a zone never holds the same
/// record twice with different TTLs.
#[derive(Clone, Debug)]
pub struct Record {
    /// The owner name.
    pub name: Name,

    /// The record type.
    ///
    /// This is stored separately from the data because deletions in dynamic
    /// updates carry a type but no data.
    pub rtype: RType,

    pub class: Class,

    pub ttl: u32,

    pub data: RecordData,
}

impl Record {
    /// Construct a new record in the `IN` class.
    ///
    /// ## Panics
    ///
    /// Panics if `data` is [`RecordData::Empty`] or [`RecordData::Unknown`],
    /// whose type cannot be inferred.
    pub fn new(name: Name, ttl: u32, data: RecordData) -> Self {
        let rtype = match &data {
            RecordData::A(_) => RType::A,
            RecordData::Aaaa(_) => RType::AAAA,
            RecordData::Ns(_) => RType::NS,
            RecordData::Cname(_) => RType::CNAME,
            RecordData::Ptr(_) => RType::PTR,
            RecordData::Mx(_) => RType::MX,
            RecordData::Txt(_) => RType::TXT,
            RecordData::Srv(_) => RType::SRV,
            RecordData::Soa(_) => RType::SOA,
            RecordData::Tsig(_) => RType::TSIG,
            RecordData::Empty | RecordData::Unknown(_) => {
                panic!("the record type of opaque data must be given explicitly")
            }
        };
        Self {
            name,
            rtype,
            class: Class::IN,
            ttl,
            data,
        }
    }

    /// Construct a data-less record, as used for deletions.
    pub fn empty(name: Name, rtype: RType, class: Class) -> Self {
        Self {
            name,
            rtype,
            class,
            ttl: 0,
            data: RecordData::Empty,
        }
    }

    /// The record type, if it is one of the managed types.
    pub fn record_type(&self) -> Option<RecordType> {
        RecordType::from_rtype(self.rtype)
    }

    /// Parse a record.
    pub fn parse(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let name = Name::parse(reader)?;
        let rtype = RType(reader.read_u16()?);
        let class = Class(reader.read_u16()?);
        let ttl = reader.read_u32()?;
        let len = usize::from(reader.read_u16()?);
        let data = RecordData::parse(rtype, reader, len)?;
        Ok(Self {
            name,
            rtype,
            class,
            ttl,
            data,
        })
    }

    /// Compose this record.
    pub fn compose(&self, writer: &mut WireWriter, compress: bool) {
        self.name.compose(writer, compress);
        writer.put_u16(self.rtype.to_int());
        writer.put_u16(self.class.to_int());
        writer.put_u32(self.ttl);

        let len_pos = writer.len();
        writer.put_u16(0);
        self.data.compose(writer, compress);
        let len = writer.len() - len_pos - 2;
        writer.patch_u16(len_pos, len as u16);
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.rtype == other.rtype && self.data == other.data
    }
}

impl Eq for Record {}

impl hash::Hash for Record {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.rtype.hash(state);
        self.data.hash(state);
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.name, self.ttl, self.class, self.rtype
        )?;
        if self.data != RecordData::Empty {
            write!(f, " {}", self.data)?;
        }
        Ok(())
    }
}
