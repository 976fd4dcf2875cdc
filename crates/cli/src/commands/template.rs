use camino::Utf8PathBuf;

use dnsmanager::util;
use dnsmanager_cfg::TEMPLATE;

use crate::error::CliError;
use crate::{print, println};

/// Print a commented configuration file to start from.
#[derive(Clone, Debug, clap::Args)]
pub struct Template {
    /// Write the template to a file instead
    #[arg(short = 'o', long, value_name = "PATH")]
    output: Option<Utf8PathBuf>,
}

impl Template {
    pub fn execute(self) -> Result<(), CliError> {
        let Some(path) = self.output else {
            print!("{TEMPLATE}");
            return Ok(());
        };

        if path.exists() {
            return Err(CliError::Usage(format!(
                "'{path}' already exists; not overwriting it"
            )));
        }
        util::write_file(&path, TEMPLATE.as_bytes())
            .map_err(|err| CliError::Failure(format!("could not write '{path}': {err}")))?;
        println!("Configuration template written to {path}");
        Ok(())
    }
}
