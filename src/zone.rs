//! Zone snapshots.

use std::collections::BTreeMap;

use crate::{
    base::{Name, RType, Record, RecordData},
    update::{Operation, UpdateMessage},
};

//----------- Zone -------------------------------------------------------------

/// A snapshot of the records in a zone.
///
/// Records are grouped by owner name, in canonical order.  A zone never holds
/// the same record twice, see [`Record`]'s notion of equality.  Zones are not
/// modified once built; applying an update yields a new zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Zone {
    /// The apex of the zone.
    apex: Name,

    /// The SOA record of the zone, if it is known.
    soa: Option<Record>,

    /// The records, by owner name.
    records: BTreeMap<Name, Vec<Record>>,
}

impl Zone {
    /// The apex of the zone.
    pub fn apex(&self) -> &Name {
        &self.apex
    }

    /// The SOA record of the zone.
    pub fn soa(&self) -> Option<&Record> {
        self.soa.as_ref()
    }

    /// The SOA serial number of the zone.
    pub fn serial(&self) -> Option<u32> {
        match &self.soa.as_ref()?.data {
            RecordData::Soa(soa) => Some(soa.serial),
            _ => None,
        }
    }

    /// The number of records.
    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, in canonical order of their owner names.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values().flatten()
    }

    /// The records at a name.
    pub fn records_at(&self, name: &Name) -> &[Record] {
        self.records.get(name).map_or(&[], Vec::as_slice)
    }

    /// Apply a dynamic update, yielding the resulting zone.
    ///
    /// The SOA and NS records at the apex survive deletions, and the SOA
    /// serial is incremented if anything changed.
    pub fn apply(&self, update: &UpdateMessage) -> Zone {
        let mut builder = ZoneBuilder {
            apex: self.apex.clone(),
            soa: self.soa.clone(),
            records: self.records.clone(),
        };

        for operation in &update.operations {
            match operation {
                Operation::Add(record) => builder.upsert(record.clone()),
                Operation::Replace { rtype, record } => {
                    builder.delete(&record.name, *rtype);
                    builder.upsert(record.clone());
                }
                Operation::Delete { name, rtype } => builder.delete(name, *rtype),
                Operation::DeleteRecord(record) => builder.delete_record(record),
            }
        }

        let mut zone = builder.finish();
        if zone.records != self.records {
            if let Some(Record {
                data: RecordData::Soa(soa),
                ..
            }) = &mut zone.soa
            {
                soa.serial = soa.serial.wrapping_add(1);
            }
            // The SOA record among the records follows the bumped one.
            if let (Some(soa), Some(rrs)) = (&zone.soa, zone.records.get_mut(&zone.apex)) {
                if let Some(old) = rrs.iter_mut().find(|r| r.rtype == RType::SOA) {
                    *old = soa.clone();
                }
            }
        }
        zone
    }
}

impl<'a> IntoIterator for &'a Zone {
    type Item = &'a Record;
    type IntoIter = std::iter::Flatten<std::collections::btree_map::Values<'a, Name, Vec<Record>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.values().flatten()
    }
}

//----------- ZoneBuilder ------------------------------------------------------

/// Builds a [`Zone`] from individual records.
#[derive(Clone, Debug)]
pub struct ZoneBuilder {
    apex: Name,
    soa: Option<Record>,
    records: BTreeMap<Name, Vec<Record>>,
}

impl ZoneBuilder {
    /// Start building a zone.
    pub fn new(apex: Name) -> Self {
        Self {
            apex,
            soa: None,
            records: BTreeMap::new(),
        }
    }

    /// Set the SOA record of the zone.
    ///
    /// This does not add the record to the zone's records.
    pub fn set_soa(&mut self, soa: Record) {
        self.soa = Some(soa);
    }

    /// Insert a record.
    ///
    /// Returns whether the record was new; duplicates are dropped.
    pub fn insert(&mut self, record: Record) -> bool {
        let rrs = self.records.entry(record.name.clone()).or_default();
        if rrs.contains(&record) {
            return false;
        }
        rrs.push(record);
        true
    }

    /// Insert a record, replacing an equal one.
    fn upsert(&mut self, record: Record) {
        let rrs = self.records.entry(record.name.clone()).or_default();
        match rrs.iter_mut().find(|r| **r == record) {
            Some(existing) => *existing = record,
            None => rrs.push(record),
        }
    }

    /// Whether a record is protected from deletion.
    fn is_protected(&self, record: &Record) -> bool {
        record.name == self.apex && matches!(record.rtype, RType::SOA | RType::NS)
    }

    /// Delete the records at a name, optionally only those of one type.
    fn delete(&mut self, name: &Name, rtype: Option<RType>) {
        let apex = self.apex.clone();
        if let Some(rrs) = self.records.get_mut(name) {
            rrs.retain(|r| {
                (name == &apex && matches!(r.rtype, RType::SOA | RType::NS))
                    || rtype.is_some_and(|t| t != r.rtype)
            });
            if rrs.is_empty() {
                self.records.remove(name);
            }
        }
    }

    /// Delete one exact record.
    fn delete_record(&mut self, record: &Record) {
        if self.is_protected(record) {
            return;
        }
        if let Some(rrs) = self.records.get_mut(&record.name) {
            rrs.retain(|r| r != record);
            if rrs.is_empty() {
                self.records.remove(&record.name);
            }
        }
    }

    /// Finish building.
    pub fn finish(self) -> Zone {
        Zone {
            apex: self.apex,
            soa: self.soa,
            records: self.records,
        }
    }
}
