use dnsmanager::repository::ImportedRecord;

use crate::ansi::{BOLD, RESET};
use crate::context::{self, Context, Target};
use crate::error::CliError;
use crate::output::{print_json, record_details};
use crate::println;

/// Look up records in a single zone.
#[derive(Clone, Debug, clap::Args)]
pub struct Check {
    /// The record name, fully qualified or relative to the zone
    fqdn: Option<String>,

    /// The zone to look in [default: the configured zone containing FQDN]
    #[arg(long)]
    zone: Option<String>,

    /// Only show records with this content
    #[arg(long, value_name = "CONTENT")]
    with_content: Option<String>,
}

impl Check {
    pub async fn execute(self, context: &Context) -> Result<(), CliError> {
        let (_, config) = context.load_config()?;

        let (zone, target) = match (&self.fqdn, &self.with_content) {
            (Some(fqdn), _) => {
                let target = Target::resolve(&config, fqdn, self.zone.as_deref())?;
                (target.zone.clone(), Some(target))
            }
            (None, Some(_)) => {
                let zone = self.zone.as_deref().ok_or_else(|| {
                    CliError::Usage("'--zone' is needed when no FQDN is given".into())
                })?;
                (config.zone(zone)?.0.to_owned(), None)
            }
            (None, None) => return Err(CliError::Usage("FQDN is needed".into())),
        };

        let repository = context::service(&config, &zone)?.import_records().await?;
        if repository.is_empty() {
            return Err(CliError::Failure("No Data".into()));
        }

        let found = match (&target, &self.with_content) {
            (Some(target), content) => {
                let mut found = repository.find_by_name(&target.domain(), None);
                if let Some(content) = content {
                    found.retain(|r| &r.content == content);
                }
                found
            }
            (None, Some(content)) => repository.find_by_content(content, None),
            (None, None) => Vec::new(),
        };

        if context.json {
            return print_json(&found);
        }
        print_report(target.as_ref(), &found);
        Ok(())
    }
}

/// Print the records found in the human-readable format.
fn print_report(target: Option<&Target>, found: &[&ImportedRecord]) {
    println!("{BOLD}>> DNS Record Information <<{RESET}");
    if found.is_empty() {
        match target {
            Some(target) => println!("FQDN ({}): Not available", target.domain()),
            None => println!("No matching records"),
        }
        return;
    }

    for (i, record) in found.iter().enumerate() {
        if i > 0 {
            println!();
        }
        for line in record_details(record) {
            println!("{line}");
        }
    }
}
