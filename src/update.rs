//! Building dynamic updates (RFC 2136).

use std::fmt;

use crate::base::{Class, Message, Name, Opcode, Question, RType, Record};

//----------- Operation --------------------------------------------------------

/// One change in a dynamic update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    /// Add a record.
    Add(Record),

    /// Replace the records at a name by a new record.
    ///
    /// All records of the given type (or all records, if no type is given)
    /// at the owner of `record` are deleted, then `record` is added.  Both
    /// happen in the same transaction, so the name is never observed empty.
    Replace {
        rtype: Option<RType>,
        record: Record,
    },

    /// Delete the records at a name, optionally only those of one type.
    Delete { name: Name, rtype: Option<RType> },

    /// Delete one exact record.
    DeleteRecord(Record),
}

impl Operation {
    /// The owner name affected by this operation.
    pub fn name(&self) -> &Name {
        match self {
            Self::Add(record) | Self::DeleteRecord(record) => &record.name,
            Self::Replace { record, .. } => &record.name,
            Self::Delete { name, .. } => name,
        }
    }

    /// The update section records this operation is encoded as.
    fn records(&self) -> Vec<Record> {
        match self {
            Self::Add(record) => vec![Record {
                class: Class::IN,
                ..record.clone()
            }],
            Self::Replace { rtype, record } => {
                let mut records = Self::Delete {
                    name: record.name.clone(),
                    rtype: *rtype,
                }
                .records();
                records.extend(Self::Add(record.clone()).records());
                records
            }
            Self::Delete { name, rtype } => vec![Record::empty(
                name.clone(),
                rtype.unwrap_or(RType::ANY),
                Class::ANY,
            )],
            Self::DeleteRecord(record) => vec![Record {
                class: Class::NONE,
                ttl: 0,
                ..record.clone()
            }],
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add(record) => write!(f, "add {record}"),
            Self::Replace { rtype, record } => match rtype {
                Some(rtype) => write!(f, "replace {} {rtype} with {record}", record.name),
                None => write!(f, "replace {} with {record}", record.name),
            },
            Self::Delete { name, rtype } => match rtype {
                Some(rtype) => write!(f, "delete {name} {rtype}"),
                None => write!(f, "delete {name}"),
            },
            Self::DeleteRecord(record) => write!(f, "delete {record}"),
        }
    }
}

//----------- UpdateMessage ----------------------------------------------------

/// A dynamic update being built.
///
/// Operations are encoded, and applied by the server, in the order they were
/// added.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateMessage {
    /// The zone to update.
    pub zone: Name,

    pub operations: Vec<Operation>,
}

impl UpdateMessage {
    /// Start an update of the given zone.
    pub fn new(zone: Name) -> Self {
        Self {
            zone,
            operations: Vec::new(),
        }
    }

    /// Add a record.
    pub fn add(&mut self, record: Record) -> &mut Self {
        self.operations.push(Operation::Add(record));
        self
    }

    /// Replace the records at the owner of `record`.
    ///
    /// With `rtype`, only records of that type are replaced.
    pub fn replace(&mut self, rtype: Option<RType>, record: Record) -> &mut Self {
        self.operations.push(Operation::Replace { rtype, record });
        self
    }

    /// Delete the records at a name, optionally only those of one type.
    pub fn delete(&mut self, name: Name, rtype: Option<RType>) -> &mut Self {
        self.operations.push(Operation::Delete { name, rtype });
        self
    }

    /// Delete one exact record.
    pub fn delete_record(&mut self, record: Record) -> &mut Self {
        self.operations.push(Operation::DeleteRecord(record));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Build the update message.
    ///
    /// Every operation must affect a name within the zone.
    pub fn to_message(&self, id: u16) -> Result<Message, UpdateError> {
        let mut message = Message::new(id, Opcode::UPDATE);
        message
            .questions
            .push(Question::new(self.zone.clone(), RType::SOA));
        for operation in &self.operations {
            if !operation.name().ends_with(&self.zone) {
                return Err(UpdateError::NotInZone {
                    name: operation.name().clone(),
                    zone: self.zone.clone(),
                });
            }
            message.authority.extend(operation.records());
        }
        Ok(message)
    }
}

//============ Errors ==========================================================

//----------- UpdateError ------------------------------------------------------

/// An update that cannot be built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateError {
    /// A name lies outside the zone being updated.
    NotInZone { name: Name, zone: Name },
}

impl std::error::Error for UpdateError {}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInZone { name, zone } => {
                write!(f, "'{name}' is not in the zone '{zone}'")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::base::RecordData;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn a(owner: &str, last: u8) -> Record {
        Record::new(name(owner), 300, RecordData::A(Ipv4Addr::new(192, 0, 2, last)))
    }

    #[test]
    fn encoding_follows_call_order() {
        let mut update = UpdateMessage::new(name("example.com"));
        update
            .add(a("one.example.com", 1))
            .replace(Some(RType::A), a("www.example.com", 2))
            .delete(name("old.example.com"), None)
            .delete(name("mail.example.com"), Some(RType::MX))
            .delete_record(a("two.example.com", 3));

        let message = update.to_message(42).unwrap();
        assert_eq!(message.header.id, 42);
        assert_eq!(message.header.opcode, Opcode::UPDATE);
        assert_eq!(message.questions[0].qname, name("example.com"));
        assert_eq!(message.questions[0].qtype, RType::SOA);
        assert!(message.answers.is_empty());

        let summary: Vec<_> = message
            .authority
            .iter()
            .map(|r| (r.name.to_fqdn_string(), r.rtype, r.class, r.ttl))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("one.example.com".into(), RType::A, Class::IN, 300),
                // A replace is a delete immediately followed by an add.
                ("www.example.com".into(), RType::A, Class::ANY, 0),
                ("www.example.com".into(), RType::A, Class::IN, 300),
                ("old.example.com".into(), RType::ANY, Class::ANY, 0),
                ("mail.example.com".into(), RType::MX, Class::ANY, 0),
                ("two.example.com".into(), RType::A, Class::NONE, 0),
            ]
        );
        assert_eq!(message.authority[1].data, RecordData::Empty);
        assert_eq!(message.authority[5].data, a("x.example.com", 3).data);
    }

    #[test]
    fn names_must_be_in_zone() {
        let mut update = UpdateMessage::new(name("example.com"));
        update.add(a("www.example.net", 1));
        assert_eq!(
            update.to_message(1),
            Err(UpdateError::NotInZone {
                name: name("www.example.net"),
                zone: name("example.com"),
            })
        );
    }

    #[test]
    fn wire_round_trip() {
        let mut update = UpdateMessage::new(name("example.com"));
        update.replace(None, a("www.example.com", 1));
        let message = update.to_message(7).unwrap();
        let decoded = Message::decode(&message.encode()).unwrap();
        assert_eq!(decoded.authority.len(), 2);
        assert_eq!(decoded.authority[0].class, Class::ANY);
        assert_eq!(decoded.authority[0].rtype, RType::ANY);
        assert_eq!(decoded.authority[1], a("www.example.com", 1));
    }
}
