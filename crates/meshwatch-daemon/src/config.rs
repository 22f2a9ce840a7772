//! CLI argument parsing and config file support.
//!
//! Positional arguments name the chat endpoint, matching the usage the
//! bot has always had: `<server[:port]> <nickname> <target>`. The
//! optional JSON config file carries the bot parameters; CLI flags
//! override it.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use meshwatch_types::config::BotConfig;

/// IRC default port when `<server>` carries none.
const DEFAULT_PORT: u16 = 6667;

// ---------------------------------------------------------------------------
// CLI arguments (manual parsing, no clap dependency)
// ---------------------------------------------------------------------------

/// Parsed command-line arguments.
pub struct CliArgs {
    pub server: String,
    pub port: u16,
    pub nickname: String,
    pub target: String,
    pub config_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

impl CliArgs {
    /// Parses CLI arguments from `std::env::args`.
    ///
    /// Malformed arguments print usage and exit with a non-zero
    /// status — configuration errors are fatal at startup.
    pub fn parse_from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();

        let mut positional: Vec<&String> = Vec::new();
        let mut config_path = None;
        let mut data_dir = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--config" => {
                    i += 1;
                    match args.get(i) {
                        Some(path) => config_path = Some(PathBuf::from(path)),
                        None => usage_exit("--config needs a path"),
                    }
                }
                "--data-dir" => {
                    i += 1;
                    match args.get(i) {
                        Some(path) => data_dir = Some(PathBuf::from(path)),
                        None => usage_exit("--data-dir needs a path"),
                    }
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    usage_exit(&format!("unknown option: {other}"));
                }
                _ => positional.push(&args[i]),
            }
            i += 1;
        }

        if positional.len() != 3 {
            usage_exit("expected <server[:port]> <nickname> <target>");
        }

        let (server, port) = match parse_server(positional[0]) {
            Ok(endpoint) => endpoint,
            Err(e) => usage_exit(&e),
        };

        Self {
            server,
            port,
            nickname: positional[1].clone(),
            target: positional[2].clone(),
            config_path,
            data_dir,
        }
    }
}

/// Splits `server[:port]`, defaulting to the IRC port.
pub fn parse_server(arg: &str) -> Result<(String, u16), String> {
    match arg.split_once(':') {
        None => Ok((arg.to_string(), DEFAULT_PORT)),
        Some((host, port)) => {
            if host.is_empty() {
                return Err("empty server name".into());
            }
            let port: u16 = port
                .parse()
                .map_err(|_| format!("erroneous port: {port}"))?;
            Ok((host.to_string(), port))
        }
    }
}

fn usage_exit(reason: &str) -> ! {
    eprintln!("error: {reason}");
    eprintln!();
    print_usage();
    std::process::exit(1);
}

fn print_usage() {
    println!(
        r#"Usage: meshwatch-daemon <server[:port]> <nickname> <target> [OPTIONS]

target is a nickname or a channel.

OPTIONS:
    --config <PATH>      Load bot settings from a JSON config file
    --data-dir <PATH>    Directory for highscores, change logs and the
                         broadcast pipe (default: ./data)
    -h, --help           Show this help

ENVIRONMENT:
    RUST_LOG             Log level filter (default: info)
"#
    );
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// JSON config file format: the [`BotConfig`] fields at top level plus
/// an optional `data_dir`.
///
/// Example `meshwatch.json`:
/// ```json
/// {
///   "data_dir": "/var/lib/meshwatch",
///   "feed_url": "https://map.example.net/nodes.json",
///   "update_interval_secs": 60,
///   "delete_timeout": 5,
///   "notify": { "rename": false }
/// }
/// ```
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    #[serde(flatten)]
    bot: BotConfig,
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

/// Fully resolved daemon configuration with all defaults applied.
pub struct DaemonConfig {
    pub server: String,
    pub port: u16,
    pub nickname: String,
    pub target: String,
    pub data_dir: PathBuf,
    pub bot: BotConfig,
}

impl DaemonConfig {
    /// Resolves the final configuration from CLI arguments and the
    /// optional config file. CLI values win.
    pub fn resolve(cli: CliArgs) -> Result<Self, String> {
        let file = match &cli.config_path {
            Some(path) => load_file(path)?,
            None => ConfigFile::default(),
        };

        let data_dir = cli
            .data_dir
            .or(file.data_dir)
            .unwrap_or_else(|| PathBuf::from("data"));

        Ok(Self {
            server: cli.server,
            port: cli.port,
            nickname: cli.nickname,
            target: cli.target,
            data_dir,
            bot: file.bot,
        })
    }
}

fn load_file(path: &Path) -> Result<ConfigFile, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read config file {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid config JSON: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
