use tokio::sync::mpsc;

use dnsmanager::base::RecordType;
use dnsmanager::service::{self, SearchEvent};

use crate::ansi::{RESET, YELLOW};
use crate::context::{self, Context};
use crate::error::CliError;
use crate::output::{print_json, record_table};
use crate::{eprintln, println};

/// Search for records across zones.
#[derive(Clone, Debug, clap::Args)]
pub struct Find {
    /// The record name, fully qualified or relative to its zone
    name: String,

    /// Only show records with this content
    #[arg(long)]
    content: Option<String>,

    /// Only show records of this type
    #[arg(long, value_enum, ignore_case = true)]
    rtype: Option<RecordType>,

    /// Only search this zone [default: all configured zones]
    #[arg(long)]
    zone: Option<String>,
}

impl Find {
    pub async fn execute(self, context: &Context) -> Result<(), CliError> {
        let (_, config) = context.load_config()?;

        let zones: Vec<String> = match &self.zone {
            Some(zone) => vec![config.zone(zone)?.0.to_owned()],
            None => config.zone_names().map(String::from).collect(),
        };
        let services = zones
            .iter()
            .map(|zone| context::service(&config, zone))
            .collect::<Result<Vec<_>, _>>()?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let report = async {
            while let Some(event) = rx.recv().await {
                match event {
                    SearchEvent::Imported { zone, records } => {
                        eprintln!("Imported {records} records from zone [{zone}]")
                    }
                    SearchEvent::Failed { zone, error } => {
                        eprintln!("{YELLOW}Skipping zone [{zone}]:{RESET} {error}")
                    }
                }
            }
        };
        let (result, ()) = tokio::join!(service::search(services, Some(tx)), report);

        if result.records.is_empty() {
            return Err(CliError::Failure("No record data found!".into()));
        }

        let mut found = result.records.find_by_name(&self.name, self.rtype);
        if let Some(content) = &self.content {
            found.retain(|r| &r.content == content);
        }
        if found.is_empty() {
            return Err(CliError::Failure(format!(
                "Domain [{}] is not available at the moment",
                self.name
            )));
        }

        if context.json {
            return print_json(&found);
        }
        for line in record_table(found) {
            println!("{line}");
        }
        Ok(())
    }
}
