//! Zone transfers (RFC 5936).

use std::{fmt, net::SocketAddr, time::Duration};

use tracing::{debug, trace, warn};

use crate::{
    base::{Message, Name, Opcode, ProtocolError, Question, RType, Rcode, Record},
    net::{Connection, TransportError},
    tsig::{self, Key, SignatureError, Signer, Verifier, VerifyError},
    zone::{Zone, ZoneBuilder},
};

//----------- Retain -----------------------------------------------------------

/// Which records of a transfer to keep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Retain {
    /// Keep all records.
    #[default]
    All,

    /// Keep only records of the listed types.
    Only(Vec<RType>),
}

impl Retain {
    /// The record types kept when importing a zone.
    pub fn import() -> Self {
        Self::Only(vec![RType::A, RType::CNAME, RType::MX])
    }

    /// Whether records of the given type are kept.
    pub fn keeps(&self, rtype: RType) -> bool {
        match self {
            Self::All => true,
            Self::Only(types) => types.contains(&rtype),
        }
    }
}

//----------- TransferOptions --------------------------------------------------

/// How to perform a zone transfer.
#[derive(Clone, Debug)]
pub struct TransferOptions {
    /// The timeout for each network operation.
    pub timeout: Duration,

    /// The time limit for the whole transfer from one nameserver.
    pub limit: Option<Duration>,

    /// Which records to keep.
    pub retain: Retain,

    /// The key to sign the transfer request with.
    pub key: Option<Key>,
}

impl TransferOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            limit: None,
            retain: Retain::All,
            key: None,
        }
    }
}

//----------- Assembler --------------------------------------------------------

/// Assembles a zone from the messages of a transfer response.
#[derive(Debug)]
pub struct Assembler {
    zone: Name,
    retain: Retain,

    /// The initial SOA record, once seen.
    soa: Option<Record>,

    builder: ZoneBuilder,

    /// Whether the terminating SOA record has been seen.
    complete: bool,

    /// The number of records received.
    count: usize,
}

impl Assembler {
    pub fn new(zone: Name, retain: Retain) -> Self {
        Self {
            builder: ZoneBuilder::new(zone.clone()),
            zone,
            retain,
            soa: None,
            complete: false,
            count: 0,
        }
    }

    /// Process the next response message.
    ///
    /// Returns whether the transfer is complete.
    pub fn push(&mut self, message: &Message) -> Result<bool, TransferError> {
        if !message.rcode().is_success() {
            return Err(TransferError::UnexpectedRcode(message.rcode()));
        }
        if self.complete {
            return Err(ProtocolError::malformed(0, "message after the end of the transfer").into());
        }

        for record in &message.answers {
            if self.complete {
                return Err(ProtocolError::malformed(0, "records after the final SOA").into());
            }
            self.count += 1;

            let Some(soa) = &self.soa else {
                if record.rtype != RType::SOA || record.name != self.zone {
                    return Err(ProtocolError::malformed(
                        0,
                        "the transfer does not start with the zone's SOA",
                    )
                    .into());
                }
                self.soa = Some(record.clone());
                self.builder.set_soa(record.clone());
                self.keep(record);
                continue;
            };

            if record.rtype == RType::SOA && record == soa {
                self.complete = true;
                continue;
            }
            if !record.name.ends_with(&self.zone) {
                trace!("Ignoring out-of-zone record {record}");
                continue;
            }
            self.keep(record);
        }
        Ok(self.complete)
    }

    fn keep(&mut self, record: &Record) {
        if self.retain.keeps(record.rtype) {
            self.builder.insert(record.clone());
        }
    }

    /// The number of records received so far.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Finish the transfer, yielding the zone.
    pub fn finish(self) -> Result<Zone, TransferError> {
        if !self.complete {
            return Err(TransferError::IncompleteTransfer);
        }
        Ok(self.builder.finish())
    }
}

//----------- transfer() -------------------------------------------------------

/// Transfer a zone from the first nameserver that serves it.
///
/// Nameservers that cannot be reached are skipped.  Any other failure ends
/// the transfer, as another nameserver is unlikely to do better.
pub async fn transfer(
    candidates: &[SocketAddr],
    zone: &Name,
    options: &TransferOptions,
) -> Result<Zone, TransferError> {
    let mut failures = Vec::new();
    for &addr in candidates {
        let result = match options.limit {
            Some(limit) => tokio::time::timeout(limit, transfer_from(addr, zone, options))
                .await
                .unwrap_or(Err(TransferError::TimedOut)),
            None => transfer_from(addr, zone, options).await,
        };
        match result {
            Err(TransferError::Transport(error)) => {
                warn!("Could not transfer '{zone}' from {addr}: {error}");
                failures.push((addr, error));
            }
            result => return result,
        }
    }
    Err(TransferError::NoNameserversResponded(failures))
}

/// Transfer a zone from one nameserver.
async fn transfer_from(
    addr: SocketAddr,
    zone: &Name,
    options: &TransferOptions,
) -> Result<Zone, TransferError> {
    let id = Message::random_id();
    let mut query = Message::new(id, Opcode::QUERY);
    query
        .questions
        .push(Question::new(zone.clone(), RType::AXFR));

    let (request, mut verifier) = match &options.key {
        Some(key) => {
            let mut signer = Signer::new(key.clone());
            let request = signer.sign(&query, tsig::now());
            let mac = signer.mac().cloned().unwrap_or_default();
            (request, Some(Verifier::new(key.clone(), mac)))
        }
        None => (query.encode(), None),
    };

    debug!("Requesting AXFR of '{zone}' from {addr}");
    let mut conn = Connection::connect(addr, options.timeout).await?;
    conn.send(&request).await?;

    let mut assembler = Assembler::new(zone.clone(), options.retain.clone());
    loop {
        let data = match conn.recv().await {
            Ok(data) => data,
            Err(TransportError::Closed) => return Err(TransferError::IncompleteTransfer),
            Err(error) => return Err(error.into()),
        };
        let message = match &mut verifier {
            Some(verifier) => verifier.verify_next(&data, tsig::now())?,
            None => Message::decode(&data)?,
        };
        if message.header.id != id || !message.header.qr {
            return Err(ProtocolError::malformed(0, "the response does not match the query").into());
        }
        if assembler.push(&message)? {
            break;
        }
    }
    if let Some(verifier) = verifier {
        verifier.finish()?;
    }

    debug!(
        "Transferred {} records of '{zone}' from {addr}",
        assembler.count()
    );
    assembler.finish()
}

//============ Errors ==========================================================

//----------- TransferError ----------------------------------------------------

/// A zone transfer failed.
#[derive(Debug)]
pub enum TransferError {
    /// The nameserver could not be talked to.
    Transport(TransportError),

    /// The response was malformed.
    Protocol(ProtocolError),

    /// The response failed TSIG verification.
    Signature(SignatureError),

    /// The nameserver denied the transfer.
    UnexpectedRcode(Rcode),

    /// The connection was closed before the transfer completed.
    IncompleteTransfer,

    /// The transfer exceeded its time limit.
    TimedOut,

    /// None of the candidate nameservers could be reached.
    NoNameserversResponded(Vec<(SocketAddr, TransportError)>),
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(error) => Some(error),
            Self::Protocol(error) => Some(error),
            Self::Signature(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(error) => error.fmt(f),
            Self::Protocol(error) => write!(f, "the server's response was invalid: {error}"),
            Self::Signature(error) => error.fmt(f),
            Self::UnexpectedRcode(rcode) => write!(f, "the server refused the transfer ({rcode})"),
            Self::IncompleteTransfer => {
                f.write_str("the server closed the connection before the transfer completed")
            }
            Self::TimedOut => f.write_str("the transfer took too long"),
            Self::NoNameserversResponded(failures) => {
                f.write_str("no nameservers responded")?;
                for (addr, error) in failures {
                    write!(f, "\n  {addr}: {error}")?;
                }
                Ok(())
            }
        }
    }
}

//--- Conversion

impl From<TransportError> for TransferError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}

impl From<ProtocolError> for TransferError {
    fn from(value: ProtocolError) -> Self {
        Self::Protocol(value)
    }
}

impl From<SignatureError> for TransferError {
    fn from(value: SignatureError) -> Self {
        Self::Signature(value)
    }
}

impl From<VerifyError> for TransferError {
    fn from(value: VerifyError) -> Self {
        match value {
            VerifyError::Protocol(error) => Self::Protocol(error),
            VerifyError::Signature(error) => Self::Signature(error),
        }
    }
}
