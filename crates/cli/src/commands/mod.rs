//! The commands of the CLI.

mod check;
mod config;
mod find;
mod import;
mod record;
mod sync;
mod template;

use crate::context::Context;
use crate::error::CliError;

#[derive(Clone, Debug, clap::Subcommand)]
pub enum Command {
    /// Add a new record to a zone
    #[command(name = "new")]
    New(record::New),

    /// Replace the records of a type at a name
    #[command(name = "update", alias = "put")]
    Update(record::Update),

    /// Remove records from a zone
    #[command(name = "rm")]
    Remove(record::Remove),

    /// Show the records at a name, or with some content, in one zone
    #[command(name = "check")]
    Check(check::Check),

    /// Search for records across the configured zones
    #[command(name = "find")]
    Find(find::Find),

    /// Export the records of a zone as JSON
    #[command(name = "import")]
    Import(import::Import),

    /// Bring a zone in line with an exported record file
    #[command(name = "sync")]
    Sync(sync::Sync),

    /// Show or change the configuration file
    #[command(name = "config")]
    Config(config::ConfigCommand),

    /// Print a configuration file template
    #[command(name = "template")]
    Template(template::Template),
}

impl Command {
    pub async fn execute(self, context: &Context) -> Result<(), CliError> {
        match self {
            Self::New(cmd) => cmd.execute(context).await,
            Self::Update(cmd) => cmd.execute(context).await,
            Self::Remove(cmd) => cmd.execute(context).await,
            Self::Check(cmd) => cmd.execute(context).await,
            Self::Find(cmd) => cmd.execute(context).await,
            Self::Import(cmd) => cmd.execute(context).await,
            Self::Sync(cmd) => cmd.execute(context).await,
            Self::Config(cmd) => cmd.execute(context),
            Self::Template(cmd) => cmd.execute(),
        }
    }
}
