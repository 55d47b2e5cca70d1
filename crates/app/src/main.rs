use std::fmt;
use std::net::SocketAddr;

use practice_core::model::{PracticeMode, SetId};
use services::{
    AppServices, Clock, DashboardOptions, RelayConfig, RelayServer, SessionConfig, SessionOptions,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod driver;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidSetId { raw: String },
    InvalidMode { raw: String },
    InvalidDbUrl { raw: String },
    InvalidAddr { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidSetId { raw } => write!(f, "invalid --set value: {raw}"),
            ArgsError::InvalidMode { raw } => write!(f, "invalid --mode value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidAddr { raw } => write!(f, "invalid --addr value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- practice [--db <sqlite_url>] [--data <dir>] [--set <id>]");
    eprintln!("                               [--mode class|normal] [--force-mode class|normal]");
    eprintln!("                               [--dashboard <ws_url>] [--room <id>]");
    eprintln!("                               [--student <id>] [--name <display name>]");
    eprintln!("  cargo run -p app -- relay    [--addr <host:port>]");
    eprintln!();
    eprintln!("Without --set, practice lists the available sets.");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://stepcode.sqlite3");
    eprintln!("  --data ./data");
    eprintln!("  --addr 127.0.0.1:8000");
    eprintln!();
    eprintln!("Environment (.env is read first):");
    eprintln!("  STEPCODE_DB_URL, STEPCODE_DATA_DIR, STEPCODE_SET, STEPCODE_MODE,");
    eprintln!("  STEPCODE_ROOM, STEPCODE_STUDENT, STEPCODE_NAME, STEPCODE_DASHBOARD_URL,");
    eprintln!("  STEPCODE_RELAY_ADDR, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Practice,
    Relay,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "practice" => Some(Self::Practice),
            "relay" => Some(Self::Relay),
            _ => None,
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_mode(raw: String) -> Result<PracticeMode, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidMode { raw })
}

fn parse_set(raw: String) -> Result<SetId, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidSetId { raw })
}

struct PracticeArgs {
    db_url: String,
    data_dir: String,
    set_id: Option<SetId>,
    requested_mode: Option<PracticeMode>,
    forced_mode: Option<PracticeMode>,
    dashboard: DashboardOptions,
}

impl PracticeArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url =
            env_value("STEPCODE_DB_URL").map_or_else(|| "sqlite://stepcode.sqlite3".into(), normalize_sqlite_url);
        let mut data_dir = env_value("STEPCODE_DATA_DIR").unwrap_or_else(|| "./data".into());
        let mut set_id = env_value("STEPCODE_SET").map(parse_set).transpose()?;
        let mut requested_mode = env_value("STEPCODE_MODE").map(parse_mode).transpose()?;
        let mut forced_mode = None;
        let mut dashboard = DashboardOptions {
            url: env_value("STEPCODE_DASHBOARD_URL"),
            room: env_value("STEPCODE_ROOM"),
            student: env_value("STEPCODE_STUDENT"),
            display_name: env_value("STEPCODE_NAME"),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--data" => data_dir = require_value(args, "--data")?,
                "--set" => set_id = Some(parse_set(require_value(args, "--set")?)?),
                "--mode" => requested_mode = Some(parse_mode(require_value(args, "--mode")?)?),
                "--force-mode" => {
                    forced_mode = Some(parse_mode(require_value(args, "--force-mode")?)?);
                }
                "--dashboard" => dashboard.url = Some(require_value(args, "--dashboard")?),
                "--room" => dashboard.room = Some(require_value(args, "--room")?),
                "--student" => dashboard.student = Some(require_value(args, "--student")?),
                "--name" => dashboard.display_name = Some(require_value(args, "--name")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            data_dir,
            set_id,
            requested_mode,
            forced_mode,
            dashboard,
        })
    }
}

struct RelayArgs {
    addr: SocketAddr,
}

impl RelayArgs {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut raw = env_value("STEPCODE_RELAY_ADDR").unwrap_or_else(|| "127.0.0.1:8000".into());
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--addr" => raw = require_value(args, "--addr")?,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        let addr = raw.parse().map_err(|_| ArgsError::InvalidAddr { raw })?;
        Ok(Self { addr })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn practice(args: PracticeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&args.db_url)?;
    let services = AppServices::new_sqlite(
        &args.db_url,
        args.data_dir,
        Clock::default_clock(),
        SessionConfig::default(),
    )
    .await?;

    let Some(set_id) = args.set_id else {
        for entry in services.list_sets().await? {
            let title = entry.title.as_deref().unwrap_or("");
            println!("{}\t{title}", entry.id);
        }
        return Ok(());
    };

    let mut options = SessionOptions::new(set_id);
    options.forced_mode = args.forced_mode;
    options.requested_mode = args.requested_mode;
    let session = services.open_session(options, &args.dashboard).await?;
    driver::run(session).await?;
    Ok(())
}

async fn relay(args: RelayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(args.addr).await?;
    let cancel = CancellationToken::new();
    let server = RelayServer::new(RelayConfig::default(), Clock::default_clock());
    let served = tokio::spawn(server.serve(listener, cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("relay shutting down");
    cancel.cancel();
    served.await??;
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: a practice session when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Practice,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Practice,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let report = |e: ArgsError| {
        eprintln!("{e}");
        print_usage();
        e
    };
    match cmd {
        Command::Practice => practice(PracticeArgs::parse(&mut iter).map_err(report)?).await,
        Command::Relay => relay(RelayArgs::parse(&mut iter).map_err(report)?).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
