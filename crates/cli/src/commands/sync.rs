use std::fs;

use camino::Utf8PathBuf;

use dnsmanager::repository::{self, ImportedRecord};

use crate::context::{self, Context};
use crate::error::CliError;
use crate::output::confirm;
use crate::println;

/// Bring a zone in line with an exported record file.
///
/// Record sets in the file that are missing from the zone are added, and
/// those that differ are replaced.  Only the types 'import' exports (A, CNAME
/// and MX) and the types present in the file are considered.
#[derive(Clone, Debug, clap::Args)]
pub struct Sync {
    /// The zone to synchronize
    zone: String,

    /// The exported record file describing the desired state
    #[arg(long = "from", value_name = "PATH")]
    from: Utf8PathBuf,

    /// Also delete record sets that are not in the file
    #[arg(long)]
    prune: bool,

    /// Only show the changes that would be made
    #[arg(long)]
    dry_run: bool,

    /// Answer yes to all questions
    #[arg(short = 'y', long)]
    yes: bool,
}

impl Sync {
    pub async fn execute(self, context: &Context) -> Result<(), CliError> {
        let (_, config) = context.load_config()?;
        let zone = config.zone(&self.zone)?.0.to_owned();

        let text = fs::read_to_string(&self.from)
            .map_err(|err| CliError::Failure(format!("could not read '{}': {err}", self.from)))?;
        let desired: Vec<ImportedRecord> = serde_json::from_str(&text)
            .map_err(|err| CliError::Usage(format!("invalid record file '{}': {err}", self.from)))?;

        let service = context::service(&config, &zone)?;
        let current = service.transfer(repository::sync_scope(&desired)).await?;
        let update = repository::reconcile(&current, &desired, self.prune)
            .map_err(|err| CliError::Usage(err.to_string()))?;

        if update.is_empty() {
            println!("Zone [{zone}] is already in sync");
            return Ok(());
        }
        for operation in &update.operations {
            println!("-> {operation}");
        }
        if self.dry_run {
            return Ok(());
        }

        let question = format!(
            "Do you want to apply {} changes to zone [{zone}] ?",
            update.operations.len()
        );
        if !confirm(&question, self.yes) {
            return Ok(());
        }

        let response = service.send_update(&update).await?;
        if !response.is_success() {
            return Err(CliError::Failure(format!(
                "{}\n{}",
                response.status(),
                response.text.trim_end()
            )));
        }
        println!("Successfully synchronized zone [{zone}]");
        Ok(())
    }
}
