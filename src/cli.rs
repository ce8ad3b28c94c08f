//! Command-line interface for passabot.

use std::ffi::OsString;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Province code to search in (overrides config file).
    pub province: Option<String>,
    /// Seconds between availability checks (overrides config file).
    pub interval: Option<u64>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('p') | Long("province") => {
                let value: String = parser.value()?.parse()?;
                if value.trim().is_empty() {
                    return Err(ArgsError::InvalidValue("province", value));
                }
                result.province = Some(value.trim().to_uppercase());
            }
            Short('i') | Long("interval") => {
                let value: String = parser.value()?.parse()?;
                let secs = value
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or_else(|| ArgsError::InvalidValue("interval", value.clone()))?;
                result.interval = Some(secs);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"passabot {version}
Watches the passport booking site and posts free slots to Telegram

USAGE:
    passabot [OPTIONS]

OPTIONS:
    -c, --config <FILE>      Path to configuration file (JSON)
    -p, --province <CODE>    Province code to search in (e.g. MI)
    -i, --interval <SECS>    Seconds between availability checks [default: 60]
    -l, --log-level <LVL>    Log level (error, warn, info, debug, trace)
    -h, --help               Print help
    -V, --version            Print version

ENVIRONMENT VARIABLES:
    PASSABOT_SPID_USERNAME             SPID username
    PASSABOT_SPID_PASSWORD             SPID password
    PASSABOT_SPID_SESSION_ID           Pre-obtained JSESSIONID (skips SPID login)
    PASSABOT_CSRF_TOKEN                Pre-obtained CSRF token
    PASSABOT_PROVINCE                  Province code
    PASSABOT_TELEGRAM_BOT_TOKEN        Telegram bot token
    PASSABOT_TELEGRAM_DATA_CHAT_ID     Chat receiving availability
    PASSABOT_TELEGRAM_CONTROL_CHAT_ID  Chat receiving operator alerts
    PASSABOT_POLL_INTERVAL             Seconds between checks
    PASSABOT_LOG_LEVEL                 Log level (overrides config)
    RUST_LOG                           Alternative log level setting

EXAMPLES:
    # Credentials and chat ids from the environment
    passabot -p MI

    # Everything from a config file, checking every two minutes
    passabot -c /etc/passabot/config.json -i 120
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("passabot {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
