//! Transaction signatures (RFC 8945).
//!
//! Outgoing messages are signed with a [`Signer`], incoming ones checked with
//! a [`Verifier`].  Both handle sequences of messages, as used by zone
//! transfers: the first message of a response is chained to the request MAC,
//! every later one to the MAC before it.

use std::{fmt, str::FromStr};

use base64::Engine;
use bytes::Bytes;
use ring::hmac;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::base::{
    Class, Message, Name, ParseNameError, ProtocolError, RType, Rcode, Record, RecordData, Tsig,
    WireReader, message::HEADER_LEN,
};

/// The default permitted clock skew, in seconds.
pub const DEFAULT_FUDGE: u16 = 300;

/// The number of unsigned messages allowed between two signed ones.
const MAX_UNSIGNED: usize = 99;

/// The current time in seconds since the UNIX epoch.
pub fn now() -> u64 {
    u64::try_from(jiff::Timestamp::now().as_second()).unwrap_or(0)
}

//----------- Algorithm --------------------------------------------------------

/// A TSIG MAC algorithm.
///
/// `hmac-md5` is not supported.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    HmacSha1,
    #[default]
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl Algorithm {
    pub const ALL: [Self; 4] = [
        Self::HmacSha1,
        Self::HmacSha256,
        Self::HmacSha384,
        Self::HmacSha512,
    ];

    /// The algorithm name, without the trailing dot.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HmacSha1 => "hmac-sha1",
            Self::HmacSha256 => "hmac-sha256",
            Self::HmacSha384 => "hmac-sha384",
            Self::HmacSha512 => "hmac-sha512",
        }
    }

    /// The algorithm name as it appears in TSIG records.
    pub fn to_name(self) -> Name {
        Name::from_labels(self.as_str().split('.'))
            .unwrap_or_else(|_| unreachable!("algorithm names are valid"))
    }

    /// Look up an algorithm by its name in a TSIG record.
    pub fn from_name(name: &Name) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.to_name() == *name)
    }

    fn hmac(self) -> hmac::Algorithm {
        match self {
            Self::HmacSha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            Self::HmacSha256 => hmac::HMAC_SHA256,
            Self::HmacSha384 => hmac::HMAC_SHA384,
            Self::HmacSha512 => hmac::HMAC_SHA512,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_suffix('.').unwrap_or(s);
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported TSIG algorithm '{s}'"))
    }
}

//----------- Key --------------------------------------------------------------

/// A TSIG key.
#[derive(Clone)]
pub struct Key {
    /// The name of the key, as shared with the server.
    name: Name,

    algorithm: Algorithm,

    /// The secret, prepared for the algorithm.
    key: hmac::Key,

    /// The permitted clock skew for messages we sign.
    fudge: u16,
}

impl Key {
    /// Construct a new key from its raw secret.
    pub fn new(name: Name, algorithm: Algorithm, secret: &[u8]) -> Result<Self, KeyError> {
        if secret.is_empty() {
            return Err(KeyError::EmptySecret);
        }
        Ok(Self {
            name,
            algorithm,
            key: hmac::Key::new(algorithm.hmac(), secret),
            fudge: DEFAULT_FUDGE,
        })
    }

    /// Construct a new key from a textual name and a base64-encoded secret.
    pub fn from_base64(name: &str, algorithm: Algorithm, secret: &str) -> Result<Self, KeyError> {
        let name = name.parse().map_err(KeyError::InvalidName)?;
        let secret = base64::engine::general_purpose::STANDARD
            .decode(secret.trim())
            .map_err(KeyError::InvalidSecret)?;
        Self::new(name, algorithm, &secret)
    }

    /// Use a different fudge for signing.
    pub fn with_fudge(self, fudge: u16) -> Self {
        Self { fudge, ..self }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .field("fudge", &self.fudge)
            .finish_non_exhaustive()
    }
}

//----------- Digest input -----------------------------------------------------

/// The TSIG variables covered by a MAC.
enum Variables<'a> {
    /// All variables, for requests and the first message of a response.
    Full(&'a Name, &'a Tsig),

    /// Only the timers, for later messages of a response.
    Timers(&'a Tsig),
}

/// Assemble the data a MAC is computed over.
fn digest_input(prior_mac: Option<&[u8]>, messages: &[&[u8]], variables: Variables<'_>) -> Vec<u8> {
    let mut data = Vec::new();
    if let Some(mac) = prior_mac {
        data.extend_from_slice(&(mac.len() as u16).to_be_bytes());
        data.extend_from_slice(mac);
    }
    for message in messages {
        data.extend_from_slice(message);
    }
    match variables {
        Variables::Full(key_name, tsig) => {
            key_name.compose_canonical(&mut data);
            data.extend_from_slice(&Class::ANY.to_int().to_be_bytes());
            data.extend_from_slice(&0u32.to_be_bytes());
            tsig.algorithm.compose_canonical(&mut data);
            data.extend_from_slice(&tsig.time_signed.to_be_bytes()[2..]);
            data.extend_from_slice(&tsig.fudge.to_be_bytes());
            data.extend_from_slice(&tsig.error.to_be_bytes());
            data.extend_from_slice(&(tsig.other.len() as u16).to_be_bytes());
            data.extend_from_slice(&tsig.other);
        }
        Variables::Timers(tsig) => {
            data.extend_from_slice(&tsig.time_signed.to_be_bytes()[2..]);
            data.extend_from_slice(&tsig.fudge.to_be_bytes());
        }
    }
    data
}

//----------- Signer -----------------------------------------------------------

/// Signs a message or a sequence of messages.
#[derive(Debug)]
pub struct Signer {
    key: Key,

    /// The MAC the next signature is chained to.
    prior_mac: Option<Bytes>,

    /// Messages sent without a signature since the last signed one.
    unsigned: Vec<u8>,

    /// Whether nothing has been signed yet.
    first: bool,
}

impl Signer {
    /// Prepare to sign a request.
    pub fn new(key: Key) -> Self {
        Self {
            key,
            prior_mac: None,
            unsigned: Vec::new(),
            first: true,
        }
    }

    /// Prepare to sign the response to a request with the given MAC.
    pub fn for_response(key: Key, request_mac: Bytes) -> Self {
        Self {
            prior_mac: Some(request_mac),
            ..Self::new(key)
        }
    }

    /// The MAC of the last signed message.
    pub fn mac(&self) -> Option<&Bytes> {
        self.prior_mac.as_ref().filter(|_| !self.first)
    }

    /// Sign a message, returning its wire form with the TSIG record appended.
    pub fn sign(&mut self, message: &Message, time: u64) -> Bytes {
        self.sign_with_error(message, time, Rcode::NOERROR)
    }

    /// Sign a message, reporting a TSIG error in the signature.
    pub fn sign_with_error(&mut self, message: &Message, time: u64, error: Rcode) -> Bytes {
        let wire = message.encode();
        let mut tsig = Tsig {
            algorithm: self.key.algorithm.to_name(),
            time_signed: time,
            fudge: self.key.fudge,
            mac: Bytes::new(),
            original_id: message.header.id,
            error: error.to_int(),
            other: Bytes::new(),
        };
        let variables = if self.first {
            Variables::Full(&self.key.name, &tsig)
        } else {
            Variables::Timers(&tsig)
        };
        let data = digest_input(
            self.prior_mac.as_deref(),
            &[self.unsigned.as_slice(), &wire[..]],
            variables,
        );
        tsig.mac = Bytes::copy_from_slice(hmac::sign(&self.key.key, &data).as_ref());
        trace!("Signed message {} with key '{}'", message.header.id, self.key.name);

        self.prior_mac = Some(tsig.mac.clone());
        self.unsigned.clear();
        self.first = false;

        let mut signed = message.clone();
        signed.additional.push(Record {
            name: self.key.name.clone(),
            rtype: RType::TSIG,
            class: Class::ANY,
            ttl: 0,
            data: RecordData::Tsig(tsig),
        });
        signed.encode()
    }

    /// Send a message of a sequence without signing it.
    ///
    /// The message is still covered by the next signature.
    pub fn skip(&mut self, message: &Message) -> Bytes {
        let wire = message.encode();
        self.unsigned.extend_from_slice(&wire);
        wire
    }
}

//----------- Verifier ---------------------------------------------------------

/// Verifies a message or a sequence of messages.
#[derive(Debug)]
pub struct Verifier {
    key: Key,

    /// The MAC the next signature is chained to.
    ///
    /// This is [`None`] only when verifying a request.
    prior_mac: Option<Bytes>,

    /// Unsigned messages received since the last signed one.
    unsigned: Vec<u8>,

    /// The number of messages in `unsigned`.
    unsigned_count: usize,

    /// Whether no message has been verified yet.
    first: bool,
}

impl Verifier {
    /// Prepare to verify the response to a request signed with `request_mac`.
    pub fn new(key: Key, request_mac: Bytes) -> Self {
        Self {
            key,
            prior_mac: Some(request_mac),
            unsigned: Vec::new(),
            unsigned_count: 0,
            first: true,
        }
    }

    /// Verify a signed request.
    ///
    /// Returns the request without its TSIG record, and the request MAC to
    /// sign the response with.
    pub fn verify_request(
        key: &Key,
        data: &[u8],
        now: u64,
    ) -> Result<(Message, Bytes), VerifyError> {
        let mut verifier = Self {
            prior_mac: None,
            ..Self::new(key.clone(), Bytes::new())
        };
        let message = verifier.verify_next(data, now)?;
        let mac = verifier.prior_mac.unwrap_or_default();
        Ok((message, mac))
    }

    /// Verify the next message of the sequence.
    ///
    /// Returns the message without its TSIG record.  Responses may carry no
    /// signature at all only if they report an error; such messages are
    /// returned as they are, and it is up to the caller to distrust them.
    pub fn verify_next(&mut self, data: &[u8], now: u64) -> Result<Message, VerifyError> {
        let mut message = Message::decode(data)?;

        let record = match message.additional.last() {
            Some(last) if last.rtype == RType::TSIG => message.additional.pop(),
            _ => None,
        };
        let Some(record) = record else {
            if self.first {
                if self.prior_mac.is_some() && !message.rcode().is_success() {
                    warn!(
                        "Received an unsigned {} response; it cannot be authenticated",
                        message.rcode()
                    );
                    return Ok(message);
                }
                return Err(SignatureError::Unsigned.into());
            }
            if self.unsigned_count == MAX_UNSIGNED {
                return Err(SignatureError::Unsigned.into());
            }
            self.unsigned.extend_from_slice(data);
            self.unsigned_count += 1;
            return Ok(message);
        };

        let offset = tsig_offset(data, &message)?;
        let RecordData::Tsig(tsig) = record.data else {
            return Err(ProtocolError::malformed(offset, "TSIG record without TSIG data").into());
        };

        if record.name != self.key.name
            || Algorithm::from_name(&tsig.algorithm) != Some(self.key.algorithm)
        {
            return Err(SignatureError::BadKey.into());
        }
        match Rcode(tsig.error) {
            Rcode::NOERROR => {}
            Rcode::BADKEY => return Err(SignatureError::BadKey.into()),
            Rcode::BADTIME => return Err(SignatureError::BadTime.into()),
            _ => return Err(SignatureError::BadSignature.into()),
        }

        // The MAC covers the message as it was before the TSIG record was
        // added: with its original ID and one additional record less.
        let mut stripped = data[..offset].to_vec();
        stripped[0..2].copy_from_slice(&tsig.original_id.to_be_bytes());
        let arcount = message.additional.len() as u16;
        stripped[10..12].copy_from_slice(&arcount.to_be_bytes());

        let variables = if self.first {
            Variables::Full(&record.name, &tsig)
        } else {
            Variables::Timers(&tsig)
        };
        let input = digest_input(
            self.prior_mac.as_deref(),
            &[self.unsigned.as_slice(), stripped.as_slice()],
            variables,
        );
        hmac::verify(&self.key.key, &input, &tsig.mac)
            .map_err(|_| SignatureError::BadSignature)?;

        if now.abs_diff(tsig.time_signed) > u64::from(tsig.fudge) {
            return Err(SignatureError::BadTime.into());
        }

        trace!("Verified message {} with key '{}'", message.header.id, self.key.name);
        self.prior_mac = Some(tsig.mac);
        self.unsigned.clear();
        self.unsigned_count = 0;
        self.first = false;
        Ok(message)
    }

    /// Finish verifying a sequence.
    ///
    /// The last message of a sequence must be signed.
    pub fn finish(self) -> Result<(), SignatureError> {
        if self.unsigned_count > 0 {
            return Err(SignatureError::Unsigned);
        }
        Ok(())
    }
}

/// The offset of the TSIG record in a message.
///
/// `message` is the parsed message with the TSIG record already removed.
fn tsig_offset(data: &[u8], message: &Message) -> Result<usize, ProtocolError> {
    let mut reader = WireReader::new(data);
    reader.set_position(HEADER_LEN);
    for _ in &message.questions {
        Name::parse(&mut reader)?;
        reader.read_slice(4)?;
    }
    for _ in message.records() {
        Record::parse(&mut reader)?;
    }
    Ok(reader.position())
}

//============ Errors ==========================================================

//----------- SignatureError ---------------------------------------------------

/// A message failed TSIG verification.
///
/// Failures reported by the server, in the error field of its TSIG record,
/// map to the same variants as failures detected locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureError {
    /// The key name or algorithm is not the one expected.
    BadKey,

    /// The MAC does not match the message.
    BadSignature,

    /// The signature time is outside the fudge window.
    BadTime,

    /// The message should have been signed but was not.
    Unsigned,
}

impl std::error::Error for SignatureError {}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BadKey => {
                "Looks like you have a wrong key to be used to communicate with DNS Server [BADKEY]"
            }
            Self::BadSignature => {
                "Looks like you have wrong signature to communite with DNS Server [BADSIGNATURE]"
            }
            Self::BadTime => {
                "Looks like you have unsynchronized datetime on DNS Server [BADTIME]"
            }
            Self::Unsigned => "the DNS server response was not signed",
        })
    }
}

//----------- VerifyError ------------------------------------------------------

/// An error while verifying a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// The message could not be parsed.
    Protocol(ProtocolError),

    /// The message failed verification.
    Signature(SignatureError),
}

impl std::error::Error for VerifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(error) => Some(error),
            Self::Signature(error) => Some(error),
        }
    }
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(error) => error.fmt(f),
            Self::Signature(error) => error.fmt(f),
        }
    }
}

//--- Conversion

impl From<ProtocolError> for VerifyError {
    fn from(value: ProtocolError) -> Self {
        Self::Protocol(value)
    }
}

impl From<SignatureError> for VerifyError {
    fn from(value: SignatureError) -> Self {
        Self::Signature(value)
    }
}

//----------- KeyError ---------------------------------------------------------

/// An invalid TSIG key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyError {
    /// The key name is not a valid domain name.
    InvalidName(ParseNameError),

    /// The secret is not valid base64.
    InvalidSecret(base64::DecodeError),

    /// The secret is empty.
    EmptySecret,
}

impl std::error::Error for KeyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidName(error) => Some(error),
            Self::InvalidSecret(error) => Some(error),
            Self::EmptySecret => None,
        }
    }
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName(error) => write!(f, "invalid TSIG key name: {error}"),
            Self::InvalidSecret(error) => write!(f, "invalid TSIG key secret: {error}"),
            Self::EmptySecret => f.write_str("the TSIG key secret is empty"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::base::{Opcode, Question};

    const T: u64 = 1_700_000_000;

    fn key(name: &str) -> Key {
        Key::from_base64(name, Algorithm::HmacSha256, "c2VjcmV0").unwrap()
    }

    fn update() -> Message {
        let mut message = Message::new(0x1234, Opcode::UPDATE);
        message
            .questions
            .push(Question::new("example.com".parse().unwrap(), RType::SOA));
        message.authority.push(Record::new(
            "www.example.com".parse().unwrap(),
            300,
            RecordData::A(Ipv4Addr::new(192, 0, 2, 1)),
        ));
        message
    }

    fn response(id: u16, rcode: Rcode) -> Message {
        let mut message = Message::new(id, Opcode::UPDATE);
        message.header.qr = true;
        message.header.rcode = rcode;
        message
    }

    #[test]
    fn algorithms() {
        assert_eq!("hmac-sha512.".parse(), Ok(Algorithm::HmacSha512));
        assert!("hmac-md5".parse::<Algorithm>().is_err());
        assert_eq!(
            Algorithm::from_name(&"HMAC-SHA1.".parse().unwrap()),
            Some(Algorithm::HmacSha1)
        );
        assert_eq!(Algorithm::default().to_string(), "hmac-sha256");
    }

    #[test]
    fn keys() {
        assert_eq!(
            Key::from_base64("k1", Algorithm::HmacSha256, "").unwrap_err(),
            KeyError::EmptySecret
        );
        assert!(matches!(
            Key::from_base64("k1", Algorithm::HmacSha256, "not base64!"),
            Err(KeyError::InvalidSecret(_))
        ));
        let debug = format!("{:?}", key("k1"));
        assert!(debug.contains("k1") && !debug.contains("secret"));
    }

    #[test]
    fn sign_and_verify() {
        let wire = Signer::new(key("k1")).sign(&update(), T);
        let (message, mac) = Verifier::verify_request(&key("k1"), &wire, T + 10).unwrap();
        assert_eq!(message, update());
        assert_eq!(mac.len(), 32);

        // The fudge window is inclusive.
        assert!(Verifier::verify_request(&key("k1"), &wire, T + 300).is_ok());
        assert!(Verifier::verify_request(&key("k1"), &wire, T - 300).is_ok());
    }

    #[test]
    fn tampering_is_detected() {
        let mut wire = Signer::new(key("k1")).sign(&update(), T).to_vec();
        let pos = wire
            .windows(4)
            .position(|w| w == [192, 0, 2, 1])
            .unwrap();
        wire[pos + 3] ^= 1;
        assert_eq!(
            Verifier::verify_request(&key("k1"), &wire, T),
            Err(VerifyError::Signature(SignatureError::BadSignature))
        );

        let other = Key::from_base64("k1", Algorithm::HmacSha256, "b3RoZXI=").unwrap();
        let wire = Signer::new(other).sign(&update(), T);
        assert_eq!(
            Verifier::verify_request(&key("k1"), &wire, T),
            Err(VerifyError::Signature(SignatureError::BadSignature))
        );
    }

    #[test]
    fn skew_and_key_mismatch() {
        let wire = Signer::new(key("k1")).sign(&update(), T);
        assert_eq!(
            Verifier::verify_request(&key("k1"), &wire, T + 301),
            Err(VerifyError::Signature(SignatureError::BadTime))
        );
        assert_eq!(
            Verifier::verify_request(&key("k2"), &wire, T),
            Err(VerifyError::Signature(SignatureError::BadKey))
        );

        let sha1 = Key::from_base64("k1", Algorithm::HmacSha1, "c2VjcmV0").unwrap();
        assert_eq!(
            Verifier::verify_request(&sha1, &wire, T),
            Err(VerifyError::Signature(SignatureError::BadKey))
        );
    }

    #[test]
    fn unsigned_messages() {
        assert_eq!(
            Verifier::verify_request(&key("k1"), &update().encode(), T),
            Err(VerifyError::Signature(SignatureError::Unsigned))
        );

        // Unsigned error responses are passed through.
        let mut verifier = Verifier::new(key("k1"), Bytes::from_static(&[0; 32]));
        let refused = response(1, Rcode::REFUSED).encode();
        let message = verifier.verify_next(&refused, T).unwrap();
        assert_eq!(message.rcode(), Rcode::REFUSED);

        let mut verifier = Verifier::new(key("k1"), Bytes::from_static(&[0; 32]));
        let ok = response(1, Rcode::NOERROR).encode();
        assert_eq!(
            verifier.verify_next(&ok, T),
            Err(VerifyError::Signature(SignatureError::Unsigned))
        );
    }

    #[test]
    fn peer_errors() {
        let mut client = Signer::new(key("k1"));
        let request = client.sign(&update(), T);
        let request_mac = client.mac().unwrap().clone();
        let (_, server_mac) = Verifier::verify_request(&key("k1"), &request, T).unwrap();
        assert_eq!(server_mac, request_mac);

        let mut server = Signer::for_response(key("k1"), server_mac);
        let wire = server.sign_with_error(&response(0x1234, Rcode::NOTAUTH), T, Rcode::BADTIME);
        let mut verifier = Verifier::new(key("k1"), request_mac);
        assert_eq!(
            verifier.verify_next(&wire, T),
            Err(VerifyError::Signature(SignatureError::BadTime))
        );
    }

    #[test]
    fn response_sequences() {
        let mut client = Signer::new(key("k1"));
        let request = client.sign(&update(), T);
        let (_, request_mac) = Verifier::verify_request(&key("k1"), &request, T).unwrap();

        let mut server = Signer::for_response(key("k1"), request_mac.clone());
        let first = server.sign(&response(1, Rcode::NOERROR), T);
        let middle = server.skip(&response(1, Rcode::NOERROR));
        let last = server.sign(&response(1, Rcode::NOERROR), T + 1);

        let mut verifier = Verifier::new(key("k1"), request_mac.clone());
        for wire in [&first, &middle, &last] {
            let message = verifier.verify_next(wire, T).unwrap();
            assert!(message.additional.is_empty());
        }
        verifier.finish().unwrap();

        // A sequence must end with a signed message.
        let mut verifier = Verifier::new(key("k1"), request_mac.clone());
        verifier.verify_next(&first, T).unwrap();
        verifier.verify_next(&middle, T).unwrap();
        assert_eq!(verifier.finish(), Err(SignatureError::Unsigned));

        // Leaving out the unsigned message breaks the chain.
        let mut verifier = Verifier::new(key("k1"), request_mac);
        verifier.verify_next(&first, T).unwrap();
        assert_eq!(
            verifier.verify_next(&last, T),
            Err(VerifyError::Signature(SignatureError::BadSignature))
        );
    }
}
