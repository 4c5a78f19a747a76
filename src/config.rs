//! Configuration and CLI argument handling

use std::{env, path::PathBuf};

use clap::Parser;

/// File name used when no data file is given
const DATA_FILE_NAME: &str = "timers.json";

/// CLI argument parsing structure
#[derive(Parser, Debug, Clone)]
#[command(name = "timerd")]
#[command(about = "A persistent multi-timer countdown daemon")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// JSON file the timers are stored in
    #[arg(short, long)]
    pub data_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    /// Where timers are persisted
    pub fn data_path(&self) -> PathBuf {
        self.data_file.clone().unwrap_or_else(default_data_path)
    }
}

fn default_data_path() -> PathBuf {
    match env::var_os("HOME") {
        Some(home) => PathBuf::from(home)
            .join(".local/share")
            .join("timerd")
            .join(DATA_FILE_NAME),
        None => PathBuf::from(DATA_FILE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["timerd"]).unwrap();
        assert_eq!(config.address(), "127.0.0.1:20554");
        assert_eq!(config.log_level(), "info");
        assert!(config.data_path().ends_with(DATA_FILE_NAME));
    }

    #[test]
    fn explicit_arguments() {
        let config =
            Config::try_parse_from(["timerd", "-p", "8080", "-d", "/tmp/t.json", "-v"]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.data_path(), PathBuf::from("/tmp/t.json"));
        assert_eq!(config.log_level(), "debug");
    }
}
