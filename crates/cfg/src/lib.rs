//! Configuring DNSManager.
//!
//! The configuration file lists the zones DNSManager manages: for each, the
//! primary nameserver to send updates to and the TSIG key to sign them with.
//! It also holds defaults for new records.

use std::{collections::BTreeMap, fmt, fs, io, time::Duration};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, base64::Base64, serde_as};
use tracing::debug;

use dnsmanager::{
    base::{Name, ParseNameError, RecordType},
    service::ZoneCredential,
    tsig::{Algorithm, Key, KeyError},
    util,
};

/// The environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "DNSMANAGER_CONFIG_PATH";

/// A commented configuration file to start from.
pub const TEMPLATE: &str = include_str!("../../../etc/config.template.toml");

/// The default nameserver port.
const DEFAULT_PORT: u16 = 53;

//----------- Config -----------------------------------------------------------

/// The configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Defaults for new records.
    #[serde(default)]
    pub defaults: DefaultsSpec,

    /// The managed zones, by name.
    #[serde(default)]
    pub zones: BTreeMap<String, ZoneSpec>,
}

impl Config {
    /// Load the configuration file at the given path.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source: Box::new(source),
        })?;
        debug!("Loaded the configuration from '{path}'");
        Ok(config)
    }

    /// Save the configuration, atomically replacing the file at `path`.
    pub fn save(&self, path: &Utf8Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        util::write_file(path, text.as_bytes()).map_err(|source| ConfigError::Write {
            path: path.to_owned(),
            source,
        })?;
        debug!("Saved the configuration to '{path}'");
        Ok(())
    }

    /// The names of the configured zones.
    pub fn zone_names(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    /// Look up a zone.
    ///
    /// Zone names are matched case-insensitively, with or without a trailing
    /// dot.
    pub fn zone(&self, zone: &str) -> Result<(&str, &ZoneSpec), ConfigError> {
        let wanted = normalize(zone);
        self.zones
            .iter()
            .find(|(name, _)| normalize(name) == wanted)
            .map(|(name, spec)| (name.as_str(), spec))
            .ok_or_else(|| ConfigError::UnknownZone(zone.into()))
    }

    /// The credential for operating on a zone.
    pub fn credential(&self, zone: &str) -> Result<ZoneCredential, ConfigError> {
        let (name, spec) = self.zone(zone)?;
        let apex = name.parse::<Name>().map_err(|error| ConfigError::InvalidZone {
            zone: name.into(),
            error,
        })?;
        let invalid_key = |error| ConfigError::InvalidKey {
            zone: name.into(),
            error,
        };
        let key_name = spec
            .key_name
            .parse::<Name>()
            .map_err(|error| invalid_key(KeyError::InvalidName(error)))?;
        let key = Key::new(key_name, spec.algorithm, &spec.key_secret).map_err(invalid_key)?;

        Ok(ZoneCredential {
            zone: apex,
            nameserver: spec.server.clone(),
            port: spec.port.unwrap_or(DEFAULT_PORT),
            key,
        })
    }

    /// The record type and TTL for new records in a zone.
    pub fn defaults_for(&self, zone: &str) -> (RecordType, u32) {
        let spec = self.zone(zone).ok().map(|(_, spec)| spec);
        (
            spec.and_then(|s| s.rtype).unwrap_or(self.defaults.rtype),
            spec.and_then(|s| s.ttl).unwrap_or(self.defaults.ttl),
        )
    }

    /// The timeout for network operations.
    pub fn timeout(&self) -> Duration {
        self.defaults.timeout
    }

    /// The time limit for a whole zone transfer.
    pub fn transfer_limit(&self) -> Duration {
        self.defaults.transfer_limit
    }

    /// Add a zone.
    pub fn add_zone(&mut self, zone: &str, spec: ZoneSpec) -> Result<(), ConfigError> {
        if self.zone(zone).is_ok() {
            return Err(ConfigError::DuplicateZone(zone.into()));
        }
        let name = zone.parse::<Name>().map_err(|error| ConfigError::InvalidZone {
            zone: zone.into(),
            error,
        })?;
        self.zones.insert(name.to_fqdn_string(), spec);
        Ok(())
    }

    /// Remove a zone.
    pub fn remove_zone(&mut self, zone: &str) -> Result<ZoneSpec, ConfigError> {
        let (name, _) = self.zone(zone)?;
        let name = name.to_owned();
        Ok(self
            .zones
            .remove(&name)
            .expect("the zone was just found in the map"))
    }

    /// The configured zone a domain name belongs to.
    ///
    /// If zones are nested, the innermost one is chosen.
    pub fn zone_for_fqdn(&self, fqdn: &Name) -> Option<&str> {
        self.zones
            .keys()
            .filter_map(|zone| Some((zone, zone.parse::<Name>().ok()?)))
            .filter(|(_, apex)| fqdn.ends_with(apex))
            .max_by_key(|(_, apex)| apex.labels().len())
            .map(|(zone, _)| zone.as_str())
    }

    /// Find the configuration file.
    ///
    /// An explicitly given path, or one set in the environment, is used as
    /// is.  Otherwise, the first existing file among [`Self::search_paths()`]
    /// is chosen.
    pub fn locate(explicit: Option<&Utf8Path>) -> Result<Utf8PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path.to_owned());
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.is_empty() {
                return Ok(path.into());
            }
        }

        let searched = Self::search_paths();
        searched
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or(ConfigError::NotFound { searched })
    }

    /// The places the configuration file is looked for.
    pub fn search_paths() -> Vec<Utf8PathBuf> {
        let mut paths = vec![Utf8PathBuf::from("dnsmanager.toml")];
        let config_home = std::env::var("XDG_CONFIG_HOME")
            .ok()
            .filter(|dir| !dir.is_empty())
            .map(Utf8PathBuf::from)
            .or_else(|| {
                let home = std::env::var("HOME").ok()?;
                Some(Utf8PathBuf::from(home).join(".config"))
            });
        if let Some(dir) = config_home {
            paths.push(dir.join("dnsmanager/config.toml"));
        }
        paths.push("/etc/dnsmanager/config.toml".into());
        paths
    }
}

/// Normalize a zone name for comparison.
fn normalize(zone: &str) -> String {
    zone.trim_end_matches('.').to_ascii_lowercase()
}

//----------- DefaultsSpec -----------------------------------------------------

/// Defaults for new records and operations.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct DefaultsSpec {
    /// The record type of new records.
    pub rtype: RecordType,

    /// The TTL of new records.
    pub ttl: u32,

    /// The timeout for each network operation.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub timeout: Duration,

    /// The time limit for a whole zone transfer.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub transfer_limit: Duration,
}

impl Default for DefaultsSpec {
    fn default() -> Self {
        Self {
            rtype: RecordType::A,
            ttl: 300,
            timeout: Duration::from_secs(10),
            transfer_limit: Duration::from_secs(60),
        }
    }
}

//----------- ZoneSpec ---------------------------------------------------------

/// The configuration of a zone.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ZoneSpec {
    /// The primary nameserver, as a host name or address.
    pub server: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// The name of the TSIG key.
    pub key_name: String,

    /// The TSIG key secret.
    #[serde_as(as = "Base64")]
    pub key_secret: Vec<u8>,

    #[serde(default)]
    pub algorithm: Algorithm,

    /// The record type of new records, overriding the defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtype: Option<RecordType>,

    /// The TTL of new records, overriding the defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

//============ Errors ==========================================================

//----------- ConfigError ------------------------------------------------------

/// An error in handling the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// No configuration file was found.
    NotFound { searched: Vec<Utf8PathBuf> },

    /// The configuration file could not be read.
    Read {
        path: Utf8PathBuf,
        source: io::Error,
    },

    /// The configuration file is invalid.
    Parse {
        path: Utf8PathBuf,
        source: Box<toml::de::Error>,
    },

    /// The configuration could not be serialized.
    Serialize(toml::ser::Error),

    /// The configuration file could not be written.
    Write {
        path: Utf8PathBuf,
        source: io::Error,
    },

    /// A zone is not configured.
    UnknownZone(String),

    /// A zone is configured already.
    DuplicateZone(String),

    /// A zone name is invalid.
    InvalidZone { zone: String, error: ParseNameError },

    /// The key of a zone is invalid.
    InvalidKey { zone: String, error: KeyError },
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } | Self::Write { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(&**source),
            Self::Serialize(error) => Some(error),
            Self::InvalidZone { error, .. } => Some(error),
            Self::InvalidKey { error, .. } => Some(error),
            Self::NotFound { .. } | Self::UnknownZone(_) | Self::DuplicateZone(_) => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { searched } => {
                f.write_str("no configuration file found (searched ")?;
                for (i, path) in searched.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{path}'")?;
                }
                write!(f, "; set {CONFIG_PATH_ENV} or use '--config')")
            }
            Self::Read { path, source } => {
                write!(f, "could not read the config file '{path}': {source}")
            }
            Self::Parse { path, source } => {
                write!(f, "the config file '{path}' is invalid: {source}")
            }
            Self::Serialize(error) => write!(f, "could not serialize the config: {error}"),
            Self::Write { path, source } => {
                write!(f, "could not write the config file '{path}': {source}")
            }
            Self::UnknownZone(zone) => {
                write!(f, "Zone ({zone}) not found in configuration file")
            }
            Self::DuplicateZone(zone) => {
                write!(f, "Zone ({zone}) already exists in configuration file")
            }
            Self::InvalidZone { zone, error } => {
                write!(f, "invalid zone name '{zone}': {error}")
            }
            Self::InvalidKey { zone, error } => {
                write!(f, "invalid key for zone '{zone}': {error}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(server: &str) -> ZoneSpec {
        ZoneSpec {
            server: server.into(),
            port: None,
            key_name: "k1".into(),
            key_secret: b"secret".to_vec(),
            algorithm: Algorithm::HmacSha256,
            rtype: None,
            ttl: None,
        }
    }

    #[test]
    fn template_parses() {
        let config: Config = toml::from_str(TEMPLATE).unwrap();
        assert_eq!(config.defaults, DefaultsSpec::default());

        let credential = config.credential("example.com").unwrap();
        assert_eq!(credential.zone, "example.com".parse().unwrap());
        assert_eq!(credential.nameserver, "ns1.example.com");
        assert_eq!(credential.port, 53);
        assert_eq!(credential.key.name(), &"example-key".parse().unwrap());
        assert_eq!(credential.key.algorithm(), Algorithm::HmacSha256);
    }

    #[test]
    fn zone_lookup_and_defaults() {
        let config: Config = toml::from_str(
            r#"
            [defaults]
            rtype = "CNAME"
            ttl = 600
            timeout = 3
            transfer-limit = 30

            [zones."Example.COM"]
            server = "192.0.2.53"
            port = 5353
            key-name = "k1"
            key-secret = "c2VjcmV0"
            algorithm = "hmac-sha512"
            ttl = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.zone("example.com.").unwrap().0, "Example.COM");
        assert!(matches!(
            config.zone("example.net"),
            Err(ConfigError::UnknownZone(_))
        ));
        assert_eq!(config.defaults_for("example.com"), (RecordType::Cname, 60));
        assert_eq!(config.defaults_for("example.net"), (RecordType::Cname, 600));
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(config.transfer_limit(), Duration::from_secs(30));

        let credential = config.credential("example.com").unwrap();
        assert_eq!(credential.port, 5353);
        assert_eq!(credential.key.algorithm(), Algorithm::HmacSha512);
    }

    #[test]
    fn invalid_files() {
        let unknown_field = "[zones.\"example.com\"]\nserver = \"ns1\"\nkey-name = \"k\"\nkey-secret = \"c2VjcmV0\"\nkeyring = \"x\"\n";
        assert!(toml::from_str::<Config>(unknown_field).is_err());

        let bad_secret = "[zones.\"example.com\"]\nserver = \"ns1\"\nkey-name = \"k\"\nkey-secret = \"not base64!\"\n";
        assert!(toml::from_str::<Config>(bad_secret).is_err());

        let mut config = Config::default();
        config
            .add_zone(
                "example.com",
                ZoneSpec {
                    key_secret: Vec::new(),
                    ..spec("ns1")
                },
            )
            .unwrap();
        assert!(matches!(
            config.credential("example.com"),
            Err(ConfigError::InvalidKey {
                error: KeyError::EmptySecret,
                ..
            })
        ));
    }

    #[test]
    fn nested_zones() {
        let mut config = Config::default();
        config.add_zone("example.com", spec("ns1")).unwrap();
        config.add_zone("dev.example.com.", spec("ns2")).unwrap();

        let name = |s: &str| s.parse::<Name>().unwrap();
        assert_eq!(
            config.zone_for_fqdn(&name("www.dev.example.com")),
            Some("dev.example.com")
        );
        assert_eq!(
            config.zone_for_fqdn(&name("www.example.com")),
            Some("example.com")
        );
        assert_eq!(config.zone_for_fqdn(&name("example.com")), Some("example.com"));
        assert_eq!(config.zone_for_fqdn(&name("www.example.net")), None);
    }

    #[test]
    fn add_save_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("config.toml")).unwrap();

        let mut config = Config::default();
        config.add_zone("example.com", spec("ns1")).unwrap();
        assert!(matches!(
            config.add_zone("EXAMPLE.com.", spec("ns2")),
            Err(ConfigError::DuplicateZone(_))
        ));
        config.save(&path).unwrap();

        let mut loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.remove_zone("example.com.").unwrap().server, "ns1");
        assert!(loaded.zones.is_empty());
        assert!(matches!(
            loaded.remove_zone("example.com"),
            Err(ConfigError::UnknownZone(_))
        ));
    }

    #[test]
    fn explicit_paths_win() {
        let path = Utf8Path::new("/nonexistent/config.toml");
        assert_eq!(Config::locate(Some(path)).unwrap(), path);
        assert!(matches!(
            Config::load(path),
            Err(ConfigError::Read { .. })
        ));
    }
}
