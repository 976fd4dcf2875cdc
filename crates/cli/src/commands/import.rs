use camino::Utf8PathBuf;
use tracing::debug;

use dnsmanager::util;

use crate::context::{self, Context};
use crate::error::CliError;
use crate::println;

/// Export the records of a zone.
///
/// The A, CNAME and MX records of the zone are transferred from its
/// nameserver and written out as a JSON array.
#[derive(Clone, Debug, clap::Args)]
pub struct Import {
    /// The zone to export
    zone: String,

    /// The file to write to, or '-' for stdout
    #[arg(short = 'f', long = "out-file", value_name = "PATH", default_value = "out.json")]
    out_file: Utf8PathBuf,
}

impl Import {
    pub async fn execute(self, context: &Context) -> Result<(), CliError> {
        let (_, config) = context.load_config()?;
        let zone = config.zone(&self.zone)?.0.to_owned();

        let repository = context::service(&config, &zone)?.import_records().await?;
        let records = repository.into_records();
        let text = serde_json::to_string_pretty(&records)
            .map_err(|err| CliError::Failure(format!("could not serialize the records: {err}")))?;

        if self.out_file == "-" {
            println!("{text}");
            return Ok(());
        }

        util::write_file(&self.out_file, format!("{text}\n").as_bytes()).map_err(|err| {
            CliError::Failure(format!("could not write '{}': {err}", self.out_file))
        })?;
        debug!("Wrote {} records to '{}'", records.len(), self.out_file);

        let path = self
            .out_file
            .canonicalize_utf8()
            .unwrap_or_else(|_| self.out_file.clone());
        if context.json {
            println!(
                "{}",
                serde_json::json!({ "zone": zone, "records": records.len(), "path": path.as_str() })
            );
        } else {
            println!("Successfully imported {} in {path}", records.len());
        }
        Ok(())
    }
}
