use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Quran LMS daemon. With no subcommand it serves JSON-lines requests on
/// stdin/stdout.
#[derive(Debug, Parser)]
#[command(name = "quranlmsd", version)]
pub struct Cli {
    /// Workspace directory to open before the first request.
    #[arg(long, env = "QURANLMS_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Session token to restore when a workspace is preselected.
    #[arg(long, env = "QURANLMS_SESSION_TOKEN", requires = "workspace")]
    pub session_token: Option<String>,

    /// Log filter, e.g. `info` or `quranlms=debug`. Logs go to stderr.
    #[arg(long = "log", env = "QURANLMS_LOG", default_value = "info")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP notification endpoint.
    Notify {
        #[arg(long, env = "QURANLMS_NOTIFY_ADDR", default_value = "0.0.0.0:8787")]
        addr: SocketAddr,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_the_stdin_loop() {
        let cli = Cli::try_parse_from(["quranlmsd"]).expect("parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.log_filter, "info");
    }

    #[test]
    fn notify_takes_an_address() {
        let cli = Cli::try_parse_from(["quranlmsd", "notify", "--addr", "127.0.0.1:9000"])
            .expect("parse");
        match cli.command {
            Some(Command::Notify { addr }) => assert_eq!(addr.port(), 9000),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn session_token_needs_a_workspace() {
        assert!(Cli::try_parse_from(["quranlmsd", "--session-token", "abc"]).is_err());
    }
}
