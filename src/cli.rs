//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use url::Url;

/// Gate, start and track downloads the way a landing page does.
///
/// Runs visitor interactions through the download gatekeeper: bot scoring,
/// rate limiting, token issuance, verification and telemetry.
#[derive(Parser, Debug)]
#[command(name = "download-gate")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/download-gate/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding persisted gate state
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(flatten)]
    pub site: SiteArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Site settings; each overrides the config file.
#[derive(ClapArgs, Debug, Default)]
pub struct SiteArgs {
    /// Venture (brand) identifier
    #[arg(long, global = true)]
    pub venture: Option<String>,

    /// Site base URL
    #[arg(long, global = true)]
    pub site_url: Option<Url>,

    /// Download target URL
    #[arg(long, global = true)]
    pub download_url: Option<Url>,

    /// Release label sent with downloads
    #[arg(long, global = true)]
    pub release: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Activate a download control one or more times
    Click(ClickArgs),
    /// Show published download metadata and checksums
    Info,
    /// Show the persisted rate-limit window and conversion count
    Status,
    /// Clear persisted gate state
    Reset,
}

#[derive(ClapArgs, Debug)]
pub struct ClickArgs {
    /// Control to activate
    #[arg(long, default_value = "primary_cta")]
    pub control: String,

    /// Number of activations (1-20)
    #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=20))]
    pub count: u8,

    /// Value submitted in the hidden honeypot field
    #[arg(long)]
    pub honeypot: Option<String>,

    /// User agent reported by the simulated visitor
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Activate via keyboard instead of a click
    #[arg(long)]
    pub keyboard: bool,

    /// Write admitted downloads into this directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_click_defaults() {
        let args = Args::try_parse_from(["download-gate", "click"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        let Command::Click(click) = args.command else {
            panic!("expected click");
        };
        assert_eq!(click.control, "primary_cta");
        assert_eq!(click.count, 1);
        assert!(click.honeypot.is_none());
        assert!(!click.keyboard);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["download-gate", "-v", "status"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["download-gate", "status", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["download-gate", "-q", "reset"]).unwrap();
        assert!(args.quiet);
        assert!(matches!(args.command, Command::Reset));
    }

    #[test]
    fn test_cli_click_all_flags() {
        let args = Args::try_parse_from([
            "download-gate",
            "--site-url",
            "https://acme.example.com/",
            "--download-url",
            "https://cdn.example.com/acme.zip",
            "--venture",
            "acme",
            "click",
            "--control",
            "footer_download",
            "-n",
            "4",
            "--honeypot",
            "x",
            "--user-agent",
            "curl/8.0",
            "--keyboard",
        ])
        .unwrap();
        assert_eq!(args.site.venture.as_deref(), Some("acme"));
        assert!(args.site.site_url.is_some());
        let Command::Click(click) = args.command else {
            panic!("expected click");
        };
        assert_eq!(click.control, "footer_download");
        assert_eq!(click.count, 4);
        assert_eq!(click.honeypot.as_deref(), Some("x"));
        assert_eq!(click.user_agent.as_deref(), Some("curl/8.0"));
        assert!(click.keyboard);
    }

    #[test]
    fn test_cli_count_out_of_range_rejected() {
        let err = Args::try_parse_from(["download-gate", "click", "-n", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        let err = Args::try_parse_from(["download-gate", "click", "-n", "21"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_invalid_url_rejected() {
        let err =
            Args::try_parse_from(["download-gate", "--site-url", "not a url", "info"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_subcommand_required() {
        assert!(Args::try_parse_from(["download-gate"]).is_err());
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["download-gate", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
