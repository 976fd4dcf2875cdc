use std::fmt;
use std::process::ExitCode;

use dnsmanager::service::ServiceError;
use dnsmanager_cfg::ConfigError;

//----------- CliError ---------------------------------------------------------

/// A command failed.
#[derive(Debug)]
pub enum CliError {
    /// The command was used incorrectly.
    Usage(String),

    /// The operation failed.
    Failure(String),
}

impl CliError {
    /// The process exit status for this error.
    pub fn code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Failure(_) => 1,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

impl std::error::Error for CliError {}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usage(msg) | Self::Failure(msg) => f.write_str(msg),
        }
    }
}

//--- Conversion

impl From<ConfigError> for CliError {
    fn from(value: ConfigError) -> Self {
        match value {
            ConfigError::UnknownZone(_)
            | ConfigError::DuplicateZone(_)
            | ConfigError::InvalidZone { .. } => Self::Usage(value.to_string()),
            _ => Self::Failure(value.to_string()),
        }
    }
}

impl From<ServiceError> for CliError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::Conflict { .. } | ServiceError::Update(_) => {
                Self::Usage(value.to_string())
            }
            _ => Self::Failure(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use dnsmanager::tsig::SignatureError;

    use super::*;

    #[test]
    fn exit_codes() {
        let err = CliError::from(ConfigError::UnknownZone("example.org".into()));
        assert_eq!(err.code(), 2);
        assert_eq!(
            err.to_string(),
            "Zone (example.org) not found in configuration file"
        );

        let err = CliError::from(ServiceError::Signature(SignatureError::BadKey));
        assert_eq!(err.code(), 1);
    }
}
