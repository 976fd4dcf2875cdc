//! Querying and reconciling the records of zones.
//!
//! Records are handled here in the flat form they are exported in: one
//! [`ImportedRecord`] per resource record, with the owner name relative to
//! the zone and the data in presentation format.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    base::{Name, ParseDataError, RType, Record, RecordData, RecordType},
    update::UpdateMessage,
    xfr::Retain,
    zone::Zone,
};

//----------- ImportedRecord ---------------------------------------------------

/// A record as exported from a zone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedRecord {
    /// The zone the record belongs to, without a trailing dot.
    pub zone: String,

    /// The owner name relative to the zone; `@` for the apex.
    pub name: String,

    /// The record data in presentation format.
    pub content: String,

    pub rtype: RecordType,

    pub ttl: u32,
}

impl ImportedRecord {
    /// Export a record of a zone.
    ///
    /// Returns [`None`] if the record type is not managed.
    pub fn from_record(zone: &Name, record: &Record) -> Option<Self> {
        Some(Self {
            zone: zone.to_fqdn_string(),
            name: record
                .name
                .relative_to(zone)
                .unwrap_or_else(|| record.name.to_string()),
            content: record.data.to_string(),
            rtype: record.record_type()?,
            ttl: record.ttl,
        })
    }

    /// The fully qualified owner name, without a trailing dot.
    pub fn fqdn(&self) -> String {
        match self.name.as_str() {
            "@" => self.zone.clone(),
            name if name.ends_with('.') => name.trim_end_matches('.').into(),
            name => format!("{name}.{}", self.zone),
        }
    }

    /// Convert back into a record.
    pub fn to_record(&self) -> Result<Record, RepositoryError> {
        let invalid = |error| RepositoryError::InvalidRecord {
            record: self.to_string(),
            error,
        };
        let zone: Name = self
            .zone
            .parse()
            .map_err(|error| invalid(ParseDataError::Name(error)))?;
        let name = Name::resolve(&self.name, &zone).map_err(|error| invalid(error.into()))?;
        let data = RecordData::parse_text(self.rtype, &self.content, &zone).map_err(invalid)?;
        Ok(Record::new(name, self.ttl, data))
    }
}

impl fmt::Display for ImportedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.fqdn(),
            self.ttl,
            self.rtype,
            self.content
        )
    }
}

//----------- Repository -------------------------------------------------------

/// The managed records of one or more zones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Repository {
    records: Vec<ImportedRecord>,
}

impl Repository {
    /// Collect the managed records of a zone.
    pub fn from_zone(zone: &Zone) -> Self {
        Self::from_zones([zone])
    }

    /// Collect the managed records of several zones.
    pub fn from_zones<'a>(zones: impl IntoIterator<Item = &'a Zone>) -> Self {
        let records = zones
            .into_iter()
            .flat_map(|zone| {
                zone.iter()
                    .filter_map(|record| ImportedRecord::from_record(zone.apex(), record))
            })
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[ImportedRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ImportedRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Find records by owner name.
    ///
    /// `name` must match either the relative name or the fully qualified name
    /// exactly; a trailing dot is ignored in the latter.
    pub fn find_by_name(&self, name: &str, rtype: Option<RecordType>) -> Vec<&ImportedRecord> {
        let fqdn = name.strip_suffix('.').unwrap_or(name);
        self.filter(rtype, |r| r.name == name || r.fqdn() == fqdn)
    }

    /// Find records by their data.
    pub fn find_by_content(
        &self,
        content: &str,
        rtype: Option<RecordType>,
    ) -> Vec<&ImportedRecord> {
        self.filter(rtype, |r| r.content == content)
    }

    fn filter(
        &self,
        rtype: Option<RecordType>,
        matches: impl Fn(&ImportedRecord) -> bool,
    ) -> Vec<&ImportedRecord> {
        self.records
            .iter()
            .filter(|r| rtype.is_none_or(|t| r.rtype == t) && matches(r))
            .collect()
    }
}

//----------- sync_scope() -----------------------------------------------------

/// The records of a zone to compare against when synchronizing to `desired`.
///
/// These are the types an import exports, plus every type in `desired`.
/// Record sets of other types are left alone, even when pruning.
pub fn sync_scope(desired: &[ImportedRecord]) -> Retain {
    let mut scope = Retain::import();
    if let Retain::Only(types) = &mut scope {
        for rtype in desired.iter().map(|r| r.rtype.rtype()) {
            if !types.contains(&rtype) {
                types.push(rtype);
            }
        }
    }
    scope
}

//----------- reconcile() ------------------------------------------------------

/// The records of a zone, grouped into record sets.
type RecordSets = BTreeMap<(Name, RType), Vec<Record>>;

/// Compute the update turning the managed records of a zone into `desired`.
///
/// Record sets missing from the zone are added, and those that differ (in
/// data or TTL) are replaced.  With `prune`, managed record sets that are not
/// desired are deleted.  All desired records must belong to the zone.
pub fn reconcile(
    current: &Zone,
    desired: &[ImportedRecord],
    prune: bool,
) -> Result<UpdateMessage, RepositoryError> {
    let mut wanted = RecordSets::new();
    for imported in desired {
        let zone = imported.zone.parse::<Name>().ok();
        if zone.as_ref() != Some(current.apex()) {
            return Err(RepositoryError::ForeignZone {
                zone: imported.zone.clone(),
                expected: current.apex().clone(),
            });
        }
        let record = imported.to_record()?;
        let rrset = wanted.entry((record.name.clone(), record.rtype)).or_default();
        if !rrset.contains(&record) {
            rrset.push(record);
        }
    }

    let mut existing = RecordSets::new();
    for record in current.iter().filter(|r| r.record_type().is_some()) {
        existing
            .entry((record.name.clone(), record.rtype))
            .or_default()
            .push(record.clone());
    }

    let mut update = UpdateMessage::new(current.apex().clone());
    for ((name, rtype), records) in &wanted {
        match existing.get(&(name.clone(), *rtype)) {
            None => {
                for record in records {
                    update.add(record.clone());
                }
            }
            Some(present) if same_rrset(present, records) => {}
            Some(_) => {
                let mut records = records.iter().cloned();
                if let Some(first) = records.next() {
                    update.replace(Some(*rtype), first);
                }
                for record in records {
                    update.add(record);
                }
            }
        }
    }

    if prune {
        for (name, rtype) in existing.keys() {
            if !wanted.contains_key(&(name.clone(), *rtype)) {
                update.delete(name.clone(), Some(*rtype));
            }
        }
    }
    Ok(update)
}

/// Whether two record sets hold the same records with the same TTLs.
fn same_rrset(a: &[Record], b: &[Record]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|x| b.iter().any(|y| x == y && x.ttl == y.ttl))
}

//============ Errors ==========================================================

//----------- RepositoryError --------------------------------------------------

/// An exported record could not be used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RepositoryError {
    /// A record could not be parsed.
    InvalidRecord {
        record: String,
        error: ParseDataError,
    },

    /// A record belongs to a different zone.
    ForeignZone { zone: String, expected: Name },
}

impl std::error::Error for RepositoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidRecord { error, .. } => Some(error),
            Self::ForeignZone { .. } => None,
        }
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRecord { record, error } => {
                write!(f, "invalid record '{record}': {error}")
            }
            Self::ForeignZone { zone, expected } => {
                write!(f, "a record of zone '{zone}' cannot be synchronized into '{expected}'")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    use super::*;
    use crate::{tests::test_zone, update::Operation};

    fn imported(name: &str, content: &str, rtype: RecordType, ttl: u32) -> ImportedRecord {
        ImportedRecord {
            zone: "example.com".into(),
            name: name.into(),
            content: content.into(),
            rtype,
            ttl,
        }
    }

    #[test]
    fn export_format() {
        let repository = Repository::from_zone(&test_zone());
        let www = repository.find_by_name("www", Some(RecordType::A));
        assert_json_eq!(
            serde_json::to_value(&www).unwrap(),
            json!([{
                "zone": "example.com",
                "name": "www",
                "content": "192.0.2.1",
                "rtype": "A",
                "ttl": 300
            }])
        );

        // SOA and NS records are not managed, so they are not exported.
        assert_eq!(repository.len(), test_zone().len() - 2);
        let apex: Vec<_> = repository
            .find_by_name("@", None)
            .iter()
            .map(|r| r.rtype)
            .collect();
        assert_eq!(apex, [RecordType::Mx, RecordType::Txt]);
    }

    #[test]
    fn find_records() {
        let repository = Repository::from_zone(&test_zone());
        assert_eq!(repository.find_by_name("www", None).len(), 1);
        assert_eq!(repository.find_by_name("www.example.com", None).len(), 1);
        assert_eq!(repository.find_by_name("www.example.com.", None).len(), 1);
        assert!(repository.find_by_name("WWW", None).is_empty());
        assert!(repository.find_by_name("www", Some(RecordType::Mx)).is_empty());

        let by_content = repository.find_by_content("www.example.com.", None);
        assert_eq!(by_content.len(), 1);
        assert_eq!(by_content[0].name, "ftp");
        assert_eq!(by_content[0].rtype, RecordType::Cname);
    }

    #[test]
    fn sync_scope_follows_desired_types() {
        let scope = sync_scope(&[]);
        assert_eq!(scope, Retain::import());

        let scope = sync_scope(&[
            imported("www", "192.0.2.1", RecordType::A, 300),
            imported("@", "\"v=spf1 -all\"", RecordType::Txt, 300),
        ]);
        assert!(scope.keeps(RType::TXT));
        assert!(scope.keeps(RType::MX));
        assert!(!scope.keeps(RType::SRV));
        assert!(!scope.keeps(RType::SOA));
    }

    #[test]
    fn records_round_trip_through_text() {
        let zone = test_zone();
        for record in zone.iter() {
            let Some(exported) = ImportedRecord::from_record(zone.apex(), record) else {
                continue;
            };
            let back = exported.to_record().unwrap();
            assert_eq!(&back, record);
            assert_eq!(back.ttl, record.ttl);
        }
    }

    #[test]
    fn reconcile_changes() {
        let zone = test_zone();
        let mut desired = Repository::from_zone(&zone).into_records();

        // Nothing to do for an identical set of records.
        assert!(reconcile(&zone, &desired, true).unwrap().is_empty());

        desired.retain(|r| r.name != "mail");
        desired.push(imported("new", "192.0.2.77", RecordType::A, 60));
        for r in desired.iter_mut().filter(|r| r.name == "www") {
            r.content = "192.0.2.99".into();
        }

        let update = reconcile(&zone, &desired, false).unwrap();
        let summary: Vec<_> = update.operations.iter().map(|o| o.to_string()).collect();
        assert_eq!(
            summary,
            [
                "add new.example.com. 60 IN A 192.0.2.77",
                "replace www.example.com. A with www.example.com. 300 IN A 192.0.2.99",
            ]
        );

        let pruned = reconcile(&zone, &desired, true).unwrap();
        assert_eq!(
            pruned.operations.last(),
            Some(&Operation::Delete {
                name: "mail.example.com".parse().unwrap(),
                rtype: Some(RType::A),
            })
        );

        // Applying the update yields the desired records.
        let synced = Repository::from_zone(&zone.apply(&pruned));
        let mut got: Vec<_> = synced.records().iter().map(|r| r.to_string()).collect();
        let mut want: Vec<_> = desired.iter().map(|r| r.to_string()).collect();
        got.sort();
        want.sort();
        assert_eq!(got, want);
    }

    #[test]
    fn reconcile_rejects_bad_input() {
        let zone = test_zone();
        let mut other = imported("www", "192.0.2.1", RecordType::A, 300);
        other.zone = "example.net".into();
        assert!(matches!(
            reconcile(&zone, &[other], false),
            Err(RepositoryError::ForeignZone { .. })
        ));

        let broken = imported("www", "not-an-address", RecordType::A, 300);
        assert!(matches!(
            reconcile(&zone, &[broken], false),
            Err(RepositoryError::InvalidRecord { .. })
        ));
    }
}
