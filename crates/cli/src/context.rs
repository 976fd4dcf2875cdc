use camino::Utf8PathBuf;
use tracing::debug;

use dnsmanager::base::Name;
use dnsmanager::service::DnsService;
use dnsmanager_cfg::{Config, ConfigError};

use crate::error::CliError;

//----------- Context ----------------------------------------------------------

/// What every command gets to work with.
#[derive(Clone, Debug)]
pub struct Context {
    /// The configuration file given on the command line.
    config: Option<Utf8PathBuf>,

    /// Whether to print results as JSON.
    pub json: bool,
}

impl Context {
    pub fn new(config: Option<Utf8PathBuf>, json: bool) -> Self {
        Self { config, json }
    }

    /// Find and load the configuration file.
    pub fn load_config(&self) -> Result<(Utf8PathBuf, Config), CliError> {
        let path = Config::locate(self.config.as_deref())?;
        let config = Config::load(&path)?;
        Ok((path, config))
    }

    /// Load the configuration file, or start a new one if there is none.
    pub fn load_or_create_config(&self) -> Result<(Utf8PathBuf, Config), CliError> {
        match Config::locate(self.config.as_deref()) {
            Ok(path) if path.exists() => Ok((path.clone(), Config::load(&path)?)),
            Ok(path) => Ok((path, Config::default())),
            Err(ConfigError::NotFound { searched }) => {
                // Prefer the per-user location over the working directory.
                let path = searched
                    .get(1)
                    .or(searched.first())
                    .cloned()
                    .unwrap_or_else(|| "dnsmanager.toml".into());
                debug!("Starting a new configuration file at '{path}'");
                Ok((path, Config::default()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Set up the service for a configured zone.
pub fn service(config: &Config, zone: &str) -> Result<DnsService, CliError> {
    let credential = config.credential(zone)?;
    let service = DnsService::new(credential, config.timeout())
        .with_transfer_limit(config.transfer_limit());
    Ok(service)
}

//----------- Target -----------------------------------------------------------

/// The record name a command operates on, and its zone.
#[derive(Clone, Debug)]
pub struct Target {
    /// The zone, as named in the configuration.
    pub zone: String,

    pub apex: Name,

    /// The fully qualified record name.
    pub name: Name,
}

impl Target {
    /// Work out the name and zone a command refers to.
    ///
    /// Without an explicit zone, the innermost configured zone containing the
    /// name is used.  With one, the name may be relative to it.
    pub fn resolve(config: &Config, name: &str, zone: Option<&str>) -> Result<Self, CliError> {
        let zone = match zone {
            Some(zone) => config.zone(zone)?.0.to_owned(),
            None => {
                let fqdn = name
                    .parse::<Name>()
                    .map_err(|err| CliError::Usage(format!("invalid name '{name}': {err}")))?;
                config
                    .zone_for_fqdn(&fqdn)
                    .ok_or_else(|| {
                        CliError::Usage(format!(
                            "'{name}' is not in any configured zone; use '--zone'"
                        ))
                    })?
                    .to_owned()
            }
        };

        let apex = zone
            .parse::<Name>()
            .map_err(|err| CliError::Usage(format!("invalid zone '{zone}': {err}")))?;
        let name = Name::resolve(name, &apex)
            .map_err(|err| CliError::Usage(format!("invalid name '{name}': {err}")))?;
        if !name.ends_with(&apex) {
            return Err(CliError::Usage(format!(
                "'{}' is not in zone [{zone}]",
                name.to_fqdn_string()
            )));
        }
        Ok(Self { zone, apex, name })
    }

    /// The record name as printed.
    pub fn domain(&self) -> String {
        self.name.to_fqdn_string()
    }
}

#[cfg(test)]
mod tests {
    use dnsmanager_cfg::ZoneSpec;

    use super::*;

    fn config() -> Config {
        let mut config = Config::default();
        for zone in ["example.com", "dev.example.com"] {
            let spec = ZoneSpec {
                server: "127.0.0.1".into(),
                port: None,
                key_name: "k1".into(),
                key_secret: b"secret".to_vec(),
                algorithm: Default::default(),
                rtype: None,
                ttl: None,
            };
            config.add_zone(zone, spec).unwrap();
        }
        config
    }

    #[test]
    fn targets() {
        let config = config();

        let target = Target::resolve(&config, "www.dev.example.com", None).unwrap();
        assert_eq!(target.zone, "dev.example.com");
        assert_eq!(target.domain(), "www.dev.example.com");

        let target = Target::resolve(&config, "www", Some("example.com.")).unwrap();
        assert_eq!(target.zone, "example.com");
        assert_eq!(target.domain(), "www.example.com");

        let target = Target::resolve(&config, "@", Some("example.com")).unwrap();
        assert_eq!(target.name, target.apex);

        let err = Target::resolve(&config, "www.example.net", None).unwrap_err();
        assert_eq!(err.code(), 2);
        let err = Target::resolve(&config, "www", Some("example.net")).unwrap_err();
        assert_eq!(err.code(), 2);
        let err = Target::resolve(&config, "www.example.net.", Some("example.com")).unwrap_err();
        assert_eq!(err.code(), 2);
    }
}
