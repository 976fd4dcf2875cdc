use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use dnsmanager::base::RecordType;
use dnsmanager::tsig::Algorithm;
use dnsmanager_cfg::{Config, ZoneSpec};

use crate::context::Context;
use crate::error::CliError;
use crate::output::{confirm, print_json};
use crate::println;

#[derive(Clone, Debug, clap::Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Clone, Debug, clap::Subcommand)]
enum ConfigCommands {
    /// Show the configuration
    Show,

    /// Add a zone to the configuration
    Add {
        /// The zone to add
        zone: String,

        /// The primary nameserver of the zone
        #[arg(long)]
        server: String,

        /// The name of the TSIG key
        #[arg(long)]
        key_name: String,

        /// The TSIG key secret, in base64
        #[arg(long)]
        key_secret: String,

        /// The nameserver port [default: 53]
        #[arg(long)]
        port: Option<u16>,

        /// The TSIG algorithm
        #[arg(long, value_enum, default_value_t)]
        algorithm: Algorithm,

        /// The record type of new records in the zone
        #[arg(long, value_enum, ignore_case = true)]
        rtype: Option<RecordType>,

        /// The TTL of new records in the zone
        #[arg(long)]
        ttl: Option<u32>,
    },

    /// Remove a zone from the configuration
    Remove {
        /// The zone to remove
        zone: String,

        /// Answer yes to all questions
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

impl ConfigCommand {
    pub fn execute(self, context: &Context) -> Result<(), CliError> {
        match self.command {
            ConfigCommands::Show => {
                let (_, config) = context.load_config()?;
                if context.json {
                    return print_json(&config);
                }
                for line in show(&config) {
                    println!("{line}");
                }
                Ok(())
            }
            ConfigCommands::Add {
                zone,
                server,
                key_name,
                key_secret,
                port,
                algorithm,
                rtype,
                ttl,
            } => {
                let key_secret = STANDARD
                    .decode(key_secret.trim())
                    .map_err(|err| CliError::Usage(format!("invalid key secret: {err}")))?;
                let spec = ZoneSpec {
                    server,
                    port,
                    key_name,
                    key_secret,
                    algorithm,
                    rtype,
                    ttl,
                };

                let (path, mut config) = context.load_or_create_config()?;
                config.add_zone(&zone, spec)?;
                // Reject keys that could not be used.
                config.credential(&zone)?;
                config.save(&path)?;
                println!("Zone {zone} added to config file ({path})");
                Ok(())
            }
            ConfigCommands::Remove { zone, yes } => {
                let (path, mut config) = context.load_config()?;
                let zone = config.zone(&zone)?.0.to_owned();

                let question =
                    format!("Do you want to remove ({zone}) section from config file({path}) ?");
                if !confirm(&question, yes) {
                    return Err(CliError::Failure("Nothing was removed".into()));
                }

                config.remove_zone(&zone)?;
                config.save(&path)?;
                println!("Zone {zone} removed from config file ({path})");
                Ok(())
            }
        }
    }
}

/// Format the configuration for display.
///
/// Key secrets are not shown.
fn show(config: &Config) -> Vec<String> {
    let defaults = &config.defaults;
    let mut lines = vec![
        ">> DEFAULTS Variable <<".to_string(),
        format!("-> rtype: {}", defaults.rtype),
        format!("-> ttl: {}", defaults.ttl),
        format!("-> timeout: {}", defaults.timeout.as_secs()),
        "----------------".to_string(),
        ">> Section Variable <<".to_string(),
    ];

    for (i, (zone, spec)) in config.zones.iter().enumerate() {
        lines.push(format!("[{}] Section ({zone})", i + 1));
        lines.push(format!("-> SERVER: {}", spec.server));
        if let Some(port) = spec.port {
            lines.push(format!("-> PORT: {port}"));
        }
        lines.push(format!("-> KEY-NAME: {}", spec.key_name));
        lines.push(format!("-> ALGORITHM: {}", spec.algorithm));
        if let Some(rtype) = spec.rtype {
            lines.push(format!("-> RTYPE: {rtype}"));
        }
        if let Some(ttl) = spec.ttl {
            lines.push(format!("-> TTL: {ttl}"));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cmd {
        #[command(flatten)]
        config: ConfigCommand,
    }

    #[test]
    fn add_arguments() {
        let cmd = Cmd::try_parse_from([
            "config",
            "add",
            "example.com",
            "--server",
            "ns1.example.com",
            "--key-name",
            "k1",
            "--key-secret",
            "c2VjcmV0",
            "--algorithm",
            "hmac-sha512",
            "--rtype",
            "mx",
        ])
        .unwrap();
        let ConfigCommands::Add {
            algorithm, rtype, port, ..
        } = cmd.config.command
        else {
            panic!("expected 'add'");
        };
        assert_eq!(algorithm, Algorithm::HmacSha512);
        assert_eq!(rtype, Some(RecordType::Mx));
        assert_eq!(port, None);
    }

    #[test]
    fn show_hides_secrets() {
        let mut config = Config::default();
        let spec = ZoneSpec {
            server: "ns1.example.com".into(),
            port: Some(5353),
            key_name: "k1".into(),
            key_secret: b"secret".to_vec(),
            algorithm: Algorithm::HmacSha256,
            rtype: None,
            ttl: Some(60),
        };
        config.add_zone("example.com", spec).unwrap();

        let lines = show(&config);
        assert_eq!(lines[0], ">> DEFAULTS Variable <<");
        assert_eq!(lines[1], "-> rtype: A");
        assert_eq!(lines[6], "[1] Section (example.com)");
        assert!(lines.contains(&"-> PORT: 5353".to_string()));
        assert!(lines.contains(&"-> TTL: 60".to_string()));
        assert!(!lines.iter().any(|l| l.contains("c2VjcmV0")));
    }
}
