//! Record data.
//!
//! [`RecordData`] holds the parsed data of the record types this crate
//! understands.  Anything else is carried as opaque bytes so that zone
//! transfers can pass over it.

use std::{
    fmt,
    net::{Ipv4Addr, Ipv6Addr},
};

use bytes::Bytes;

use super::{
    RType,
    name::{Name, ParseNameError},
    record::RecordType,
    wire::{ProtocolError, WireReader, WireWriter},
};

//----------- RecordData -------------------------------------------------------

/// The data of a resource record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RecordData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ns(Name),
    Cname(Name),
    Ptr(Name),
    Mx(Mx),
    Txt(Txt),
    Srv(Srv),
    Soa(Soa),
    Tsig(Tsig),

    /// No data at all, as used by deletions in dynamic updates.
    Empty,

    /// Data of a type this crate does not interpret.
    Unknown(Bytes),
}

impl RecordData {
    /// Parse record data of the given type.
    ///
    /// `reader` must be positioned at the start of the data, which spans
    /// `len` bytes.  The data must fill `len` exactly.
    pub fn parse(
        rtype: RType,
        reader: &mut WireReader<'_>,
        len: usize,
    ) -> Result<Self, ProtocolError> {
        let start = reader.position();
        let end = start + len;
        if end > reader.data().len() {
            return Err(ProtocolError::TruncatedMessage { offset: end });
        }
        if len == 0 {
            return Ok(Self::Empty);
        }

        let data = match rtype {
            RType::A => {
                let octets: [u8; 4] = reader
                    .read_slice(len)?
                    .try_into()
                    .map_err(|_| ProtocolError::malformed(start, "A data must be 4 bytes"))?;
                Self::A(octets.into())
            }
            RType::AAAA => {
                let octets: [u8; 16] = reader
                    .read_slice(len)?
                    .try_into()
                    .map_err(|_| ProtocolError::malformed(start, "AAAA data must be 16 bytes"))?;
                Self::Aaaa(octets.into())
            }
            RType::NS => Self::Ns(Name::parse(reader)?),
            RType::CNAME => Self::Cname(Name::parse(reader)?),
            RType::PTR => Self::Ptr(Name::parse(reader)?),
            RType::MX => Self::Mx(Mx {
                preference: reader.read_u16()?,
                exchange: Name::parse(reader)?,
            }),
            RType::TXT => {
                let mut strings = Vec::new();
                while reader.position() < end {
                    let len = usize::from(reader.read_u8()?);
                    strings.push(reader.read_slice(len)?.into());
                }
                Self::Txt(Txt(strings))
            }
            RType::SRV => Self::Srv(Srv {
                priority: reader.read_u16()?,
                weight: reader.read_u16()?,
                port: reader.read_u16()?,
                target: Name::parse(reader)?,
            }),
            RType::SOA => Self::Soa(Soa {
                mname: Name::parse(reader)?,
                rname: Name::parse(reader)?,
                serial: reader.read_u32()?,
                refresh: reader.read_u32()?,
                retry: reader.read_u32()?,
                expire: reader.read_u32()?,
                minimum: reader.read_u32()?,
            }),
            RType::TSIG => Self::Tsig(Tsig {
                algorithm: Name::parse(reader)?,
                time_signed: reader.read_u48()?,
                fudge: reader.read_u16()?,
                mac: {
                    let len = usize::from(reader.read_u16()?);
                    Bytes::copy_from_slice(reader.read_slice(len)?)
                },
                original_id: reader.read_u16()?,
                error: reader.read_u16()?,
                other: {
                    let len = usize::from(reader.read_u16()?);
                    Bytes::copy_from_slice(reader.read_slice(len)?)
                },
            }),
            _ => Self::Unknown(Bytes::copy_from_slice(reader.read_slice(len)?)),
        };

        if reader.position() != end {
            return Err(ProtocolError::malformed(
                start,
                "record data does not match its length",
            ));
        }
        Ok(data)
    }

    /// Compose this record data.
    ///
    /// Names inside NS, CNAME, PTR, MX and SOA data may be compressed.
    pub fn compose(&self, writer: &mut WireWriter, compress: bool) {
        match self {
            Self::A(addr) => writer.put_slice(&addr.octets()),
            Self::Aaaa(addr) => writer.put_slice(&addr.octets()),
            Self::Ns(name) | Self::Cname(name) | Self::Ptr(name) => {
                name.compose(writer, compress)
            }
            Self::Mx(mx) => {
                writer.put_u16(mx.preference);
                mx.exchange.compose(writer, compress);
            }
            Self::Txt(txt) => {
                for string in &txt.0 {
                    writer.put_u8(string.len() as u8);
                    writer.put_slice(string);
                }
            }
            Self::Srv(srv) => {
                writer.put_u16(srv.priority);
                writer.put_u16(srv.weight);
                writer.put_u16(srv.port);
                srv.target.compose(writer, false);
            }
            Self::Soa(soa) => {
                soa.mname.compose(writer, compress);
                soa.rname.compose(writer, compress);
                writer.put_u32(soa.serial);
                writer.put_u32(soa.refresh);
                writer.put_u32(soa.retry);
                writer.put_u32(soa.expire);
                writer.put_u32(soa.minimum);
            }
            Self::Tsig(tsig) => tsig.compose(writer),
            Self::Empty => {}
            Self::Unknown(data) => writer.put_slice(data),
        }
    }

    /// Parse record data of a managed type from its presentation format.
    ///
    /// Relative names are resolved against `origin`, see [`Name::resolve()`].
    pub fn parse_text(
        rtype: RecordType,
        text: &str,
        origin: &Name,
    ) -> Result<Self, ParseDataError> {
        let text = text.trim();
        let mut fields = text.split_ascii_whitespace();
        let mut next = |what: &'static str| fields.next().ok_or(ParseDataError::Missing(what));

        Ok(match rtype {
            RecordType::A => Self::A(
                text.parse()
                    .map_err(|_| ParseDataError::Invalid("IPv4 address"))?,
            ),
            RecordType::Cname => Self::Cname(Name::resolve(next("target")?, origin)?),
            RecordType::Ptr => Self::Ptr(Name::resolve(next("target")?, origin)?),
            RecordType::Mx => Self::Mx(Mx {
                preference: parse_int(next("preference")?, "preference")?,
                exchange: Name::resolve(next("exchange")?, origin)?,
            }),
            RecordType::Txt => Self::Txt(Txt::parse_text(text)?),
            RecordType::Srv => Self::Srv(Srv {
                priority: parse_int(next("priority")?, "priority")?,
                weight: parse_int(next("weight")?, "weight")?,
                port: parse_int(next("port")?, "port")?,
                target: Name::resolve(next("target")?, origin)?,
            }),
        })
    }
}

fn parse_int(text: &str, what: &'static str) -> Result<u16, ParseDataError> {
    text.parse().map_err(|_| ParseDataError::Invalid(what))
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A(addr) => addr.fmt(f),
            Self::Aaaa(addr) => addr.fmt(f),
            Self::Ns(name) | Self::Cname(name) | Self::Ptr(name) => name.fmt(f),
            Self::Mx(mx) => write!(f, "{} {}", mx.preference, mx.exchange),
            Self::Txt(txt) => txt.fmt(f),
            Self::Srv(srv) => write!(
                f,
                "{} {} {} {}",
                srv.priority, srv.weight, srv.port, srv.target
            ),
            Self::Soa(soa) => write!(
                f,
                "{} {} {} {} {} {} {}",
                soa.mname, soa.rname, soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum
            ),
            Self::Tsig(tsig) => write!(
                f,
                "{} {} {} {} {} {}",
                tsig.algorithm,
                tsig.time_signed,
                tsig.fudge,
                tsig.mac.len(),
                tsig.original_id,
                super::Rcode(tsig.error)
            ),
            Self::Empty => Ok(()),
            Self::Unknown(data) => {
                write!(f, "\\# {}", data.len())?;
                if !data.is_empty() {
                    f.write_str(" ")?;
                    for b in data.iter() {
                        write!(f, "{b:02x}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

//----------- Mx ---------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Mx {
    pub preference: u16,
    pub exchange: Name,
}

//----------- Txt --------------------------------------------------------------

/// Text data, as a sequence of character strings of up to 255 bytes each.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Txt(pub Vec<Box<[u8]>>);

impl Txt {
    /// Parse text data.
    ///
    /// Quoted strings (with `\"` and `\\` escapes) become one character
    /// string each.  Unquoted text is taken verbatim and split into 255-byte
    /// chunks.
    pub fn parse_text(text: &str) -> Result<Self, ParseDataError> {
        if !text.starts_with('"') {
            if text.is_empty() {
                return Ok(Self(vec![Box::default()]));
            }
            return Ok(Self(text.as_bytes().chunks(255).map(Box::from).collect()));
        }

        let mut strings = Vec::new();
        let mut bytes = text.bytes().peekable();
        loop {
            while bytes.next_if(u8::is_ascii_whitespace).is_some() {}
            match bytes.next() {
                None => break,
                Some(b'"') => {}
                Some(_) => return Err(ParseDataError::Invalid("quoted string")),
            }
            let mut current = Vec::new();
            loop {
                match bytes.next() {
                    None => return Err(ParseDataError::Invalid("unterminated string")),
                    Some(b'"') => break,
                    Some(b'\\') => {
                        let escaped = bytes
                            .next()
                            .ok_or(ParseDataError::Invalid("unterminated string"))?;
                        current.push(escaped);
                    }
                    Some(b) => current.push(b),
                }
            }
            if current.len() > 255 {
                return Err(ParseDataError::Invalid("character string over 255 bytes"));
            }
            strings.push(current.into_boxed_slice());
        }
        Ok(Self(strings))
    }
}

impl fmt::Display for Txt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, string) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            f.write_str("\"")?;
            for &b in string.iter() {
                match b {
                    b'"' | b'\\' => write!(f, "\\{}", b as char)?,
                    0x20..=0x7E => write!(f, "{}", b as char)?,
                    _ => write!(f, "\\{b:03}")?,
                }
            }
            f.write_str("\"")?;
        }
        Ok(())
    }
}

//----------- Srv --------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Srv {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: Name,
}

//----------- Soa --------------------------------------------------------------

/// The start of authority of a zone.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Soa {
    /// The primary nameserver.
    pub mname: Name,

    /// The mailbox of the responsible person.
    pub rname: Name,

    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

//----------- Tsig -------------------------------------------------------------

/// The data of a transaction signature record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tsig {
    /// The name of the MAC algorithm.
    pub algorithm: Name,

    /// Seconds since the UNIX epoch; only the low 48 bits are transmitted.
    pub time_signed: u64,

    /// The permitted clock skew, in seconds.
    pub fudge: u16,

    /// The message authentication code.
    pub mac: Bytes,

    /// The ID of the message as it was originally signed.
    pub original_id: u16,

    /// An extended response code.
    pub error: u16,

    /// Other data; carries the server time for BADTIME errors.
    pub other: Bytes,
}

impl Tsig {
    /// Compose this data.  TSIG data is never compressed.
    fn compose(&self, writer: &mut WireWriter) {
        self.algorithm.compose(writer, false);
        writer.put_u48(self.time_signed);
        writer.put_u16(self.fudge);
        writer.put_u16(self.mac.len() as u16);
        writer.put_slice(&self.mac);
        writer.put_u16(self.original_id);
        writer.put_u16(self.error);
        writer.put_u16(self.other.len() as u16);
        writer.put_slice(&self.other);
    }
}

//----------- ParseDataError ---------------------------------------------------

/// An error when parsing record data from text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseDataError {
    /// A required field was missing.
    Missing(&'static str),

    /// A field could not be parsed.
    Invalid(&'static str),

    /// A domain name could not be parsed.
    Name(ParseNameError),
}

impl std::error::Error for ParseDataError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Name(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for ParseDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(what) => write!(f, "the record content is missing the {what}"),
            Self::Invalid(what) => write!(f, "the record content has an invalid {what}"),
            Self::Name(error) => write!(f, "the record content has an invalid name: {error}"),
        }
    }
}

//--- Conversion

impl From<ParseNameError> for ParseDataError {
    fn from(value: ParseNameError) -> Self {
        Self::Name(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Name {
        "example.com".parse().unwrap()
    }

    #[test]
    fn parse_managed_types() {
        let a = RecordData::parse_text(RecordType::A, "1.2.3.4", &origin()).unwrap();
        assert_eq!(a, RecordData::A(Ipv4Addr::new(1, 2, 3, 4)));
        assert_eq!(a.to_string(), "1.2.3.4");

        let mx = RecordData::parse_text(RecordType::Mx, "10 mail", &origin()).unwrap();
        assert_eq!(mx.to_string(), "10 mail.example.com.");

        let srv =
            RecordData::parse_text(RecordType::Srv, "0 5 5060 sip.example.net.", &origin())
                .unwrap();
        assert_eq!(srv.to_string(), "0 5 5060 sip.example.net.");

        let cname =
            RecordData::parse_text(RecordType::Cname, "www.example.com", &origin()).unwrap();
        assert_eq!(cname.to_string(), "www.example.com.");

        assert_eq!(
            RecordData::parse_text(RecordType::A, "1.2.3", &origin()),
            Err(ParseDataError::Invalid("IPv4 address"))
        );
        assert_eq!(
            RecordData::parse_text(RecordType::Mx, "10", &origin()),
            Err(ParseDataError::Missing("exchange"))
        );
    }

    #[test]
    fn txt_strings() {
        let txt = Txt::parse_text(r#""v=spf1 -all" "second \"part\"""#).unwrap();
        assert_eq!(txt.0.len(), 2);
        assert_eq!(&*txt.0[1], b"second \"part\"");
        assert_eq!(txt.to_string(), r#""v=spf1 -all" "second \"part\"""#);

        let bare = Txt::parse_text(&"x".repeat(300)).unwrap();
        assert_eq!(bare.0.len(), 2);
        assert_eq!(bare.0[0].len(), 255);

        assert!(Txt::parse_text("\"open").is_err());
    }

    #[test]
    fn a_record_length_is_checked() {
        let data = [1, 2, 3, 4, 5];
        let mut reader = WireReader::new(&data);
        let err = RecordData::parse(RType::A, &mut reader, 5).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedMessage { .. }));
    }

    #[test]
    fn txt_wire_format() {
        let data = RecordData::Txt(Txt(vec![b"hello".as_slice().into(), Box::default()]));
        let mut writer = WireWriter::new();
        data.compose(&mut writer, false);
        let wire = writer.finish();
        assert_eq!(&wire[..], b"\x05hello\x00");

        let mut reader = WireReader::new(&wire);
        assert_eq!(
            RecordData::parse(RType::TXT, &mut reader, wire.len()).unwrap(),
            data
        );
    }
}
