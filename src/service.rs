//! Operating on the records of a zone.
//!
//! A [`DnsService`] carries out record changes and transfers against the
//! primary nameserver of one zone.  Each change is one dynamic update, which
//! moves through the [`Phase`]s of an operation: it is built, signed, sent,
//! and its response classified.

use std::{collections::HashMap, fmt, net::SocketAddr, time::Duration};

use tokio::{
    sync::mpsc,
    task::{self, JoinSet},
};
use tracing::{debug, info, warn};

use crate::{
    base::{Message, Name, ProtocolError, RType, Rcode, Record},
    net::{self, TransportError},
    repository::Repository,
    tsig::{self, Key, SignatureError, Signer, Verifier, VerifyError},
    update::{UpdateError, UpdateMessage},
    xfr::{self, Retain, TransferError, TransferOptions},
    zone::Zone,
};

//----------- ZoneCredential ---------------------------------------------------

/// How to reach and authenticate to the primary nameserver of a zone.
#[derive(Clone, Debug)]
pub struct ZoneCredential {
    /// The zone.
    pub zone: Name,

    /// The host name or address of the nameserver.
    pub nameserver: String,

    pub port: u16,

    /// The key updates and transfers are signed with.
    pub key: Key,
}

//----------- ServerResponse ---------------------------------------------------

/// The response of a nameserver to an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerResponse {
    pub rcode: Rcode,

    /// A dump of the whole response, for diagnostics.
    pub text: String,
}

impl ServerResponse {
    /// Whether the update was applied.
    pub fn is_success(&self) -> bool {
        self.rcode.is_success()
    }

    /// The response code mnemonic, e.g. `NOERROR`.
    pub fn status(&self) -> String {
        self.rcode.to_string()
    }
}

//----------- Phase ------------------------------------------------------------

/// The phase of an operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Building,
    Signing,
    Sending,
    Classifying,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Building => "building",
            Self::Signing => "signing",
            Self::Sending => "sending",
            Self::Classifying => "classifying",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// Tracks the phase of one update.
struct Progress {
    id: u16,
    phase: Phase,
}

impl Progress {
    fn advance(&mut self, next: Phase) {
        debug!("Update {}: {} -> {}", self.id, self.phase, next);
        self.phase = next;
    }
}

//----------- DnsService -------------------------------------------------------

/// Carries out operations on the primary nameserver of a zone.
#[derive(Clone, Debug)]
pub struct DnsService {
    credential: ZoneCredential,

    /// The timeout for each network operation.
    timeout: Duration,

    /// The time limit for a whole zone transfer.
    transfer_limit: Duration,
}

impl DnsService {
    /// Operate on a zone.
    ///
    /// Zone transfers may take six times `timeout` in total, unless a limit
    /// is set with [`Self::with_transfer_limit()`].
    pub fn new(credential: ZoneCredential, timeout: Duration) -> Self {
        Self {
            credential,
            timeout,
            transfer_limit: timeout * 6,
        }
    }

    /// Limit how long a whole zone transfer may take.
    pub fn with_transfer_limit(mut self, limit: Duration) -> Self {
        self.transfer_limit = limit;
        self
    }

    pub fn credential(&self) -> &ZoneCredential {
        &self.credential
    }

    /// The zone operated on.
    pub fn zone(&self) -> &Name {
        &self.credential.zone
    }

    /// The addresses of the nameserver.
    async fn candidates(&self) -> Result<Vec<SocketAddr>, ServiceError> {
        Ok(net::resolve(&self.credential.nameserver, self.credential.port).await?)
    }

    /// Add a record.
    ///
    /// Unless `force` is set, the add is rejected if the zone already holds
    /// records of the same type at the same name.  If the zone cannot be
    /// transferred to check this, the record is added regardless.  With
    /// `force`, existing records are replaced.
    pub async fn add_record(
        &self,
        record: Record,
        force: bool,
    ) -> Result<ServerResponse, ServiceError> {
        let mut update = UpdateMessage::new(self.zone().clone());
        if force {
            update.replace(Some(record.rtype), record);
            return self.send_update(&update).await;
        }

        match self.transfer(Retain::Only(vec![record.rtype])).await {
            Ok(zone) if !zone.records_at(&record.name).is_empty() => {
                return Err(ServiceError::Conflict {
                    name: record.name,
                    zone: self.zone().clone(),
                    rtype: record.rtype,
                });
            }
            Ok(_) => {}
            Err(ServiceError::Transfer(error)) => {
                warn!(
                    "Could not check '{}' for existing records: {error}",
                    self.zone()
                );
            }
            Err(error) => return Err(error),
        }
        update.add(record);
        self.send_update(&update).await
    }

    /// Replace the records of the same type at the name of a record.
    ///
    /// Existing records are not checked; the content may change silently.
    pub async fn replace_record(&self, record: Record) -> Result<ServerResponse, ServiceError> {
        let mut update = UpdateMessage::new(self.zone().clone());
        update.replace(Some(record.rtype), record);
        self.send_update(&update).await
    }

    /// Remove the records at a name, optionally only those of one type.
    pub async fn remove_record(
        &self,
        name: Name,
        rtype: Option<RType>,
    ) -> Result<ServerResponse, ServiceError> {
        let mut update = UpdateMessage::new(self.zone().clone());
        update.delete(name, rtype);
        self.send_update(&update).await
    }

    /// Sign and send an update, and classify the response.
    ///
    /// Responses with any response code are returned; only failures to get a
    /// trustworthy response are errors.
    pub async fn send_update(
        &self,
        update: &UpdateMessage,
    ) -> Result<ServerResponse, ServiceError> {
        let mut progress = Progress {
            id: Message::random_id(),
            phase: Phase::Idle,
        };
        let result = self.run_update(update, &mut progress).await;
        match &result {
            Ok(response) if response.is_success() => progress.advance(Phase::Done),
            Ok(response) => {
                info!("The server rejected the update with {}", response.rcode);
                progress.advance(Phase::Failed);
            }
            Err(error) => {
                debug!("Update {} failed: {error}", progress.id);
                progress.advance(Phase::Failed);
            }
        }
        result
    }

    async fn run_update(
        &self,
        update: &UpdateMessage,
        progress: &mut Progress,
    ) -> Result<ServerResponse, ServiceError> {
        progress.advance(Phase::Building);
        let message = update.to_message(progress.id)?;
        for operation in &update.operations {
            debug!("Update {}: {operation}", progress.id);
        }

        progress.advance(Phase::Signing);
        let key = &self.credential.key;
        let mut signer = Signer::new(key.clone());
        let request = signer.sign(&message, tsig::now());
        let mac = signer.mac().cloned().unwrap_or_default();

        progress.advance(Phase::Sending);
        let response = self.exchange(&request).await?;

        progress.advance(Phase::Classifying);
        let mut verifier = Verifier::new(key.clone(), mac);
        let response = verifier.verify_next(&response, tsig::now())?;
        if response.header.id != progress.id || !response.header.qr {
            return Err(
                ProtocolError::malformed(0, "the response does not match the update").into(),
            );
        }
        Ok(ServerResponse {
            rcode: response.rcode(),
            text: response.to_string(),
        })
    }

    /// Send a request to the first reachable address of the nameserver.
    ///
    /// Once a request has been sent, it is never sent again.
    async fn exchange(&self, request: &[u8]) -> Result<bytes::Bytes, ServiceError> {
        let mut last_error = None;
        for addr in self.candidates().await? {
            let mut conn = match net::Connection::connect(addr, self.timeout).await {
                Ok(conn) => conn,
                Err(error) => {
                    warn!("Could not connect to {addr}: {error}");
                    last_error = Some(error);
                    continue;
                }
            };
            conn.send(request).await?;
            return Ok(conn.recv().await?);
        }
        Err(last_error.map_or(ServiceError::NoNameservers, ServiceError::Transport))
    }

    /// Transfer the zone.
    pub async fn transfer(&self, retain: Retain) -> Result<Zone, ServiceError> {
        let options = TransferOptions {
            limit: Some(self.transfer_limit),
            retain,
            key: Some(self.credential.key.clone()),
            ..TransferOptions::new(self.timeout)
        };
        let candidates = self.candidates().await?;
        Ok(xfr::transfer(&candidates, self.zone(), &options).await?)
    }

    /// Import the records of the zone.
    ///
    /// Only A, CNAME and MX records are imported.
    pub async fn import_records(&self) -> Result<Repository, ServiceError> {
        let zone = self.transfer(Retain::import()).await?;
        Ok(Repository::from_zone(&zone))
    }
}

//----------- search() ---------------------------------------------------------

/// Progress of a search across zones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchEvent {
    /// The records of a zone have been imported.
    Imported { zone: Name, records: usize },

    /// A zone could not be imported.
    Failed { zone: Name, error: String },
}

/// The outcome of a search across zones.
#[derive(Debug)]
pub struct SearchResult {
    /// The records of all zones that could be imported.
    pub records: Repository,

    /// The zones that could not be imported.
    pub failed: Vec<(Name, ServiceError)>,
}

/// Import the records of several zones concurrently.
///
/// Each zone is transferred by its own task.  Zones that fail are logged and
/// left out of the result.  Progress is reported over `progress`, if given.
pub async fn search(
    services: Vec<DnsService>,
    progress: Option<mpsc::UnboundedSender<SearchEvent>>,
) -> SearchResult {
    let mut tasks = JoinSet::new();
    let mut names = HashMap::new();
    for service in services {
        let zone = service.zone().clone();
        let handle = tasks.spawn(async move { service.transfer(Retain::import()).await });
        names.insert(handle.id(), zone);
    }
    collect(tasks, names, progress).await
}

/// Collect the outcomes of per-zone transfer tasks.
///
/// `names` maps each task to its zone.  A task that panicked or was cancelled
/// counts as a failed zone.
async fn collect(
    mut tasks: JoinSet<Result<Zone, ServiceError>>,
    mut names: HashMap<task::Id, Name>,
    progress: Option<mpsc::UnboundedSender<SearchEvent>>,
) -> SearchResult {
    let mut zones = Vec::new();
    let mut failed = Vec::new();
    while let Some(joined) = tasks.join_next_with_id().await {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(error) => (error.id(), Err(ServiceError::Interrupted(error.to_string()))),
        };
        let Some(zone) = names.remove(&id) else {
            warn!("A search task for an unknown zone completed");
            continue;
        };
        let event = match result {
            Ok(snapshot) => {
                let event = SearchEvent::Imported {
                    zone: zone.clone(),
                    records: snapshot.len(),
                };
                zones.push(snapshot);
                event
            }
            Err(error) => {
                warn!("Excluding zone '{zone}' from the search: {error}");
                let event = SearchEvent::Failed {
                    zone: zone.clone(),
                    error: error.to_string(),
                };
                failed.push((zone, error));
                event
            }
        };
        if let Some(progress) = &progress {
            // The receiver may have lost interest.
            let _ = progress.send(event);
        }
    }

    zones.sort_by(|a, b| a.apex().cmp(b.apex()));
    failed.sort_by(|a, b| a.0.cmp(&b.0));
    SearchResult {
        records: Repository::from_zones(&zones),
        failed,
    }
}

//============ Errors ==========================================================

//----------- ServiceError -----------------------------------------------------

/// An operation on a zone failed.
#[derive(Debug)]
pub enum ServiceError {
    /// The update could not be built.
    Update(UpdateError),

    /// The nameserver could not be talked to.
    Transport(TransportError),

    /// The nameserver host had no addresses.
    NoNameservers,

    /// The response was malformed.
    Protocol(ProtocolError),

    /// The response failed TSIG verification, or the server rejected ours.
    Signature(SignatureError),

    /// The zone could not be transferred.
    Transfer(TransferError),

    /// A record of the same type already exists at the name.
    Conflict { name: Name, zone: Name, rtype: RType },

    /// The task carrying out the operation panicked or was cancelled.
    Interrupted(String),
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Update(error) => Some(error),
            Self::Transport(error) => Some(error),
            Self::Protocol(error) => Some(error),
            Self::Signature(error) => Some(error),
            Self::Transfer(error) => Some(error),
            Self::NoNameservers | Self::Conflict { .. } | Self::Interrupted(_) => None,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update(error) => error.fmt(f),
            Self::Transport(error) => error.fmt(f),
            Self::NoNameservers => f.write_str("the nameserver has no addresses"),
            Self::Protocol(error) => write!(f, "the server's response was invalid: {error}"),
            Self::Signature(error) => error.fmt(f),
            Self::Transfer(error) => error.fmt(f),
            Self::Interrupted(reason) => write!(f, "the operation was interrupted: {reason}"),
            Self::Conflict { name, zone, .. } => {
                let name = name.relative_to(zone).unwrap_or_else(|| name.to_string());
                write!(
                    f,
                    "Record already exists [{name}] in zone [{}]",
                    zone.to_fqdn_string()
                )
            }
        }
    }
}

//--- Conversion

impl From<UpdateError> for ServiceError {
    fn from(value: UpdateError) -> Self {
        Self::Update(value)
    }
}

impl From<TransportError> for ServiceError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<ProtocolError> for ServiceError {
    fn from(value: ProtocolError) -> Self {
        Self::Protocol(value)
    }
}

impl From<VerifyError> for ServiceError {
    fn from(value: VerifyError) -> Self {
        match value {
            VerifyError::Protocol(error) => Self::Protocol(error),
            VerifyError::Signature(error) => Self::Signature(error),
        }
    }
}

impl From<TransferError> for ServiceError {
    fn from(value: TransferError) -> Self {
        match value {
            TransferError::Signature(error) => Self::Signature(error),
            error => Self::Transfer(error),
        }
    }
}
