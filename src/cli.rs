use clap::{Parser, Subcommand};

/// privlink — single-use and time-limited private access links
#[derive(Parser)]
#[command(name = "privlink", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and the expiry reclaimer
    Serve {
        /// Port to bind (defaults to PRIVLINK_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage access links
    Link {
        #[command(subcommand)]
        command: LinkCommands,
    },

    /// Show total and active link counts
    Stats,

    /// Show the access log, newest first
    Logs {
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long, default_value = "20")]
        per_page: i64,
    },

    /// Delete expired links now
    Sweep,
}

#[derive(Subcommand)]
pub enum LinkCommands {
    /// Issue a new access link
    Create {
        /// Absolute http(s) URL the bearer is redirected to
        #[arg(long)]
        url: String,
        /// Usage mode: single, multiple
        #[arg(long, default_value = "single")]
        mode: String,
        /// Lifetime in hours
        #[arg(long, default_value = "24")]
        hours: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_link_create() {
        let cli = Cli::try_parse_from([
            "privlink", "link", "create", "--url", "https://ex.com/doc", "--mode", "multiple", "--hours", "72",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Link {
                command: LinkCommands::Create { url, mode, hours },
            }) => {
                assert_eq!(url, "https://ex.com/doc");
                assert_eq!(mode, "multiple");
                assert_eq!(hours, 72);
            }
            _ => panic!("Expected link create"),
        }
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["privlink", "logs"]).unwrap();
        match cli.command {
            Some(Commands::Logs { page, per_page }) => {
                assert_eq!(page, 1);
                assert_eq!(per_page, 20);
            }
            _ => panic!("Expected logs"),
        }
    }
}
