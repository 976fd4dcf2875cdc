//! DNS messages.

use std::fmt;

use bytes::Bytes;

use super::{
    Class, Opcode, RType, Rcode,
    name::Name,
    record::Record,
    wire::{ProtocolError, WireReader, WireWriter},
};

/// The length of a message header, in bytes.
pub const HEADER_LEN: usize = 12;

//----------- Header -----------------------------------------------------------

/// A message header, without the section counts.
///
/// Section counts are derived from the sections when composing, and checked
/// against the sections when parsing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub id: u16,

    /// Whether this is a response.
    pub qr: bool,

    pub opcode: Opcode,

    /// Authoritative answer.
    pub aa: bool,

    /// Truncated.
    pub tc: bool,

    /// Recursion desired.
    pub rd: bool,

    /// Recursion available.
    pub ra: bool,

    /// The response code; only the low four bits are transmitted.
    pub rcode: Rcode,
}

impl Header {
    /// The flags word of this header.
    fn flags(&self) -> u16 {
        let mut flags = u16::from(self.opcode.to_int() & 0x0F) << 11;
        flags |= self.rcode.to_int() & 0x0F;
        for (bit, set) in [
            (15, self.qr),
            (10, self.aa),
            (9, self.tc),
            (8, self.rd),
            (7, self.ra),
        ] {
            if set {
                flags |= 1 << bit;
            }
        }
        flags
    }

    /// Interpret a flags word.
    fn from_flags(id: u16, flags: u16) -> Self {
        Self {
            id,
            qr: flags & (1 << 15) != 0,
            opcode: Opcode(((flags >> 11) & 0x0F) as u8),
            aa: flags & (1 << 10) != 0,
            tc: flags & (1 << 9) != 0,
            rd: flags & (1 << 8) != 0,
            ra: flags & (1 << 7) != 0,
            rcode: Rcode(flags & 0x0F),
        }
    }

    /// The flag mnemonics that are set.
    fn flag_names(&self) -> Vec<&'static str> {
        [
            ("QR", self.qr),
            ("AA", self.aa),
            ("TC", self.tc),
            ("RD", self.rd),
            ("RA", self.ra),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }
}

//----------- Question ---------------------------------------------------------

/// An entry in the question section.
///
/// In dynamic updates this is the zone section, naming the zone with type SOA.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    pub qname: Name,
    pub qtype: RType,
    pub qclass: Class,
}

impl Question {
    pub fn new(qname: Name, qtype: RType) -> Self {
        Self {
            qname,
            qtype,
            qclass: Class::IN,
        }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.qname, self.qclass, self.qtype)
    }
}

//----------- Message ----------------------------------------------------------

/// A DNS message.
///
/// The four sections are named after their roles in queries.  For dynamic
/// updates (RFC 2136) they hold the zone, prerequisites, updates and
/// additional data respectively.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
}

impl Message {
    /// Construct a new, empty message.
    pub fn new(id: u16, opcode: Opcode) -> Self {
        Self {
            header: Header {
                id,
                opcode,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// A random message ID.
    pub fn random_id() -> u16 {
        let rng = ring::rand::SystemRandom::new();
        ring::rand::generate::<[u8; 2]>(&rng)
            .map(|id| u16::from_be_bytes(id.expose()))
            .unwrap_or_default()
    }

    /// The response code.
    pub fn rcode(&self) -> Rcode {
        self.header.rcode
    }

    /// Encode this message, compressing names.
    pub fn encode(&self) -> Bytes {
        let mut writer = WireWriter::new();
        self.compose(&mut writer, true);
        writer.finish()
    }

    /// Compose this message into a writer.
    pub fn compose(&self, writer: &mut WireWriter, compress: bool) {
        writer.put_u16(self.header.id);
        writer.put_u16(self.header.flags());
        writer.put_u16(self.questions.len() as u16);
        writer.put_u16(self.answers.len() as u16);
        writer.put_u16(self.authority.len() as u16);
        writer.put_u16(self.additional.len() as u16);

        for question in &self.questions {
            question.qname.compose(writer, compress);
            writer.put_u16(question.qtype.to_int());
            writer.put_u16(question.qclass.to_int());
        }
        for record in self.records() {
            record.compose(writer, compress);
        }
    }

    /// Decode a message.
    ///
    /// The message must consist of exactly the records its header announces.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = WireReader::new(data);
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::TruncatedMessage { offset: HEADER_LEN });
        }

        let id = reader.read_u16()?;
        let header = Header::from_flags(id, reader.read_u16()?);
        let qdcount = reader.read_u16()?;
        let ancount = reader.read_u16()?;
        let nscount = reader.read_u16()?;
        let arcount = reader.read_u16()?;

        let questions = (0..qdcount)
            .map(|_| {
                Ok(Question {
                    qname: Name::parse(&mut reader)?,
                    qtype: RType(reader.read_u16()?),
                    qclass: Class(reader.read_u16()?),
                })
            })
            .collect::<Result<_, ProtocolError>>()?;
        let mut section = |count: u16| {
            (0..count)
                .map(|_| Record::parse(&mut reader))
                .collect::<Result<Vec<_>, _>>()
        };
        let answers = section(ancount)?;
        let authority = section(nscount)?;
        let additional = section(arcount)?;

        if !reader.is_empty() {
            return Err(ProtocolError::malformed(
                reader.position(),
                "data after the last announced record",
            ));
        }

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }

    /// All records in the message, in section order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.answers
            .iter()
            .chain(&self.authority)
            .chain(&self.additional)
    }

    /// The TSIG record, if the message ends in one.
    pub fn tsig(&self) -> Option<&Record> {
        self.additional.last().filter(|r| r.rtype == RType::TSIG)
    }

    /// Whether this message uses the update section names.
    fn is_update(&self) -> bool {
        self.header.opcode == Opcode::UPDATE
    }
}

/// Prints a multi-line dump of the message, one record per line.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "id {}", self.header.id)?;
        writeln!(f, "opcode {}", self.header.opcode)?;
        writeln!(f, "rcode {}", self.header.rcode)?;
        write!(f, "flags {}", self.header.flag_names().join(" "))?;

        let [zone, prereq, update] = if self.is_update() {
            ["ZONE", "PREREQ", "UPDATE"]
        } else {
            ["QUESTION", "ANSWER", "AUTHORITY"]
        };
        write!(f, "\n;{zone}")?;
        for question in &self.questions {
            write!(f, "\n{question}")?;
        }
        for (name, section) in [
            (prereq, &self.answers),
            (update, &self.authority),
            ("ADDITIONAL", &self.additional),
        ] {
            write!(f, "\n;{name}")?;
            for record in section {
                write!(f, "\n{record}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::base::rdata::{Mx, RecordData, Soa};

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn sample() -> Message {
        let mut message = Message::new(0xBEEF, Opcode::QUERY);
        message.header.qr = true;
        message.header.aa = true;
        message.questions.push(Question::new(name("example.com"), RType::AXFR));
        message.answers.push(Record::new(
            name("example.com"),
            3600,
            RecordData::Soa(Soa {
                mname: name("ns1.example.com"),
                rname: name("hostmaster.example.com"),
                serial: 2024010101,
                refresh: 7200,
                retry: 900,
                expire: 1209600,
                minimum: 300,
            }),
        ));
        message.answers.push(Record::new(
            name("www.example.com"),
            300,
            RecordData::A(Ipv4Addr::new(192, 0, 2, 1)),
        ));
        message.authority.push(Record::new(
            name("example.com"),
            300,
            RecordData::Mx(Mx {
                preference: 10,
                exchange: name("mail.example.com"),
            }),
        ));
        message
    }

    #[test]
    fn encode_decode() {
        let message = sample();
        let wire = message.encode();
        let decoded = Message::decode(&wire).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.header.id, 0xBEEF);
        assert!(decoded.header.qr && decoded.header.aa);
        assert_eq!(decoded.answers[1].ttl, 300);

        // Repeated names must be compressed.
        let mut plain = WireWriter::new();
        message.compose(&mut plain, false);
        assert!(wire.len() < plain.finish().len());
    }

    #[test]
    fn rejects_truncation() {
        let wire = sample().encode();
        for len in [0, 5, HEADER_LEN, wire.len() - 1] {
            let err = Message::decode(&wire[..len]).unwrap_err();
            assert!(
                matches!(err, ProtocolError::TruncatedMessage { .. }),
                "length {len}: {err}"
            );
        }
    }

    #[test]
    fn rejects_inconsistent_counts() {
        let mut wire = sample().encode().to_vec();
        // Claim one record fewer in the authority section.
        wire[9] = 0;
        let err = Message::decode(&wire).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedMessage { .. }));
    }

    #[test]
    fn rejects_compression_loops() {
        let mut wire = vec![0, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];
        // A question whose name points at itself.
        wire.extend([0xC0, 12, 0, 1, 0, 1]);
        let err = Message::decode(&wire).unwrap_err();
        assert_eq!(err, ProtocolError::CompressionLoop { offset: 12 });
    }

    #[test]
    fn update_dump() {
        let mut message = Message::new(7, Opcode::UPDATE);
        message.header.qr = true;
        message.questions.push(Question::new(name("example.com"), RType::SOA));
        let text = message.to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[2], "rcode NOERROR");
        assert_eq!(
            &lines[4..],
            &[
                ";ZONE",
                "example.com. IN SOA",
                ";PREREQ",
                ";UPDATE",
                ";ADDITIONAL"
            ]
        );
    }
}
