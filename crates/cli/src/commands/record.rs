//! Changing records.

use serde::Serialize;

use dnsmanager::base::{Record, RecordData, RecordType};
use dnsmanager::service::ServerResponse;
use dnsmanager_cfg::Config;

use crate::ansi::{GREEN, RESET};
use crate::context::{self, Context, Target};
use crate::error::CliError;
use crate::output::{confirm, print_json};
use crate::println;

/// The arguments describing a record.
#[derive(Clone, Debug, clap::Args)]
pub struct RecordArgs {
    /// The record name, fully qualified or relative to the zone
    name: String,

    /// The record content, e.g. an address or '10 mail.example.com.'
    #[arg(long)]
    content: String,

    /// The record type [default: from the configuration]
    #[arg(long, value_enum, ignore_case = true)]
    rtype: Option<RecordType>,

    /// The record TTL in seconds [default: from the configuration]
    #[arg(long)]
    ttl: Option<u32>,

    /// The zone of the record [default: the configured zone containing it]
    #[arg(long)]
    zone: Option<String>,

    /// Answer yes to all questions
    #[arg(short = 'y', long)]
    yes: bool,
}

impl RecordArgs {
    /// Resolve the target name and build the record.
    fn prepare(&self, config: &Config) -> Result<(Target, Record), CliError> {
        let target = Target::resolve(config, &self.name, self.zone.as_deref())?;
        let (rtype, ttl) = config.defaults_for(&target.zone);
        let rtype = self.rtype.unwrap_or(rtype);
        let ttl = self.ttl.unwrap_or(ttl);

        let data = RecordData::parse_text(rtype, &self.content, &target.apex).map_err(|err| {
            CliError::Usage(format!("invalid {rtype} content '{}': {err}", self.content))
        })?;
        let record = Record::new(target.name.clone(), ttl, data);
        Ok((target, record))
    }
}

//----------- New --------------------------------------------------------------

#[derive(Clone, Debug, clap::Args)]
pub struct New {
    #[command(flatten)]
    record: RecordArgs,

    /// Replace existing records of the same type instead of refusing
    #[arg(long)]
    force: bool,
}

impl New {
    pub async fn execute(self, context: &Context) -> Result<(), CliError> {
        let (_, config) = context.load_config()?;
        let (target, record) = self.record.prepare(&config)?;

        let question = format!(
            "Do you want to add new record [{}] in zone [{}] ?",
            target.domain(),
            target.zone
        );
        if !confirm(&question, self.record.yes) {
            return Ok(());
        }

        let service = context::service(&config, &target.zone)?;
        let response = service.add_record(record, self.force).await?;
        report(context, &target, "add", response)
    }
}

//----------- Update -----------------------------------------------------------

#[derive(Clone, Debug, clap::Args)]
pub struct Update {
    #[command(flatten)]
    record: RecordArgs,
}

impl Update {
    pub async fn execute(self, context: &Context) -> Result<(), CliError> {
        let (_, config) = context.load_config()?;
        let (target, record) = self.record.prepare(&config)?;

        let question = format!(
            "Do you want to update record [{}] in zone [{}] ?",
            target.domain(),
            target.zone
        );
        if !confirm(&question, self.record.yes) {
            return Ok(());
        }

        let service = context::service(&config, &target.zone)?;
        let response = service.replace_record(record).await?;
        report(context, &target, "update", response)
    }
}

//----------- Remove -----------------------------------------------------------

#[derive(Clone, Debug, clap::Args)]
pub struct Remove {
    /// The record name, fully qualified or relative to the zone
    name: String,

    /// Only remove records of this type
    #[arg(long, value_enum, ignore_case = true)]
    rtype: Option<RecordType>,

    /// The zone of the record [default: the configured zone containing it]
    #[arg(long)]
    zone: Option<String>,

    /// Answer yes to all questions
    #[arg(short = 'y', long)]
    yes: bool,
}

impl Remove {
    pub async fn execute(self, context: &Context) -> Result<(), CliError> {
        let (_, config) = context.load_config()?;
        let target = Target::resolve(&config, &self.name, self.zone.as_deref())?;

        let question = format!(
            "Do you want to remove record [{}] in zone [{}] ?",
            target.domain(),
            target.zone
        );
        if !confirm(&question, self.yes) {
            return Ok(());
        }

        let service = context::service(&config, &target.zone)?;
        let response = service
            .remove_record(target.name.clone(), self.rtype.map(RecordType::rtype))
            .await?;
        report(context, &target, "remove", response)
    }
}

//----------- Reporting --------------------------------------------------------

/// The outcome of a change, as printed with '--json'.
#[derive(Serialize)]
struct Outcome<'a> {
    zone: &'a str,
    name: String,
    status: String,

    /// A dump of the server's response, if it was not a success.
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// Report the server's response to a change.
fn report(
    context: &Context,
    target: &Target,
    action: &str,
    response: ServerResponse,
) -> Result<(), CliError> {
    let success = response.is_success();
    if context.json {
        print_json(&Outcome {
            zone: &target.zone,
            name: target.domain(),
            status: response.status(),
            message: (!success).then_some(response.text.as_str()),
        })?;
    } else if success {
        println!(
            "{GREEN}Successfully {action} record [{}] in zone [{}]{RESET}",
            target.domain(),
            target.zone
        );
    }

    if success {
        Ok(())
    } else {
        Err(CliError::Failure(format!(
            "{}\n{}",
            response.status(),
            response.text.trim_end()
        )))
    }
}
