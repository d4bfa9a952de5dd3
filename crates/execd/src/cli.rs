//! Command line arguments.

use std::path::PathBuf;

use clap::Parser;

/// In-sandbox command execution daemon speaking MCP over stdio.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "execd")]
#[command(about = "In-sandbox command execution daemon")]
#[command(version)]
pub struct Cli {
    /// YAML configuration file; defaults apply when absent
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_no_arguments() {
        let cli = Cli::try_parse_from(["execd"]).unwrap();
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_config_forms() {
        let spaced = Cli::try_parse_from(["execd", "--config", "/etc/execd.yaml"]).unwrap();
        let joined = Cli::try_parse_from(["execd", "--config=/etc/execd.yaml"]).unwrap();
        let short = Cli::try_parse_from(["execd", "-c", "/etc/execd.yaml"]).unwrap();

        assert_eq!(spaced.config, Some(PathBuf::from("/etc/execd.yaml")));
        assert_eq!(spaced, joined);
        assert_eq!(spaced, short);
    }

    #[test]
    fn test_missing_config_value() {
        assert!(Cli::try_parse_from(["execd", "--config"]).is_err());
    }

    #[test]
    fn test_unknown_argument() {
        let err = Cli::try_parse_from(["execd", "--headless"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_help_and_version() {
        let help = Cli::try_parse_from(["execd", "--help"]).unwrap_err();
        assert_eq!(help.kind(), ErrorKind::DisplayHelp);
        let version = Cli::try_parse_from(["execd", "-V"]).unwrap_err();
        assert_eq!(version.kind(), ErrorKind::DisplayVersion);
    }
}
