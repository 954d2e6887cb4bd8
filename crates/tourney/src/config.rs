use anyhow::anyhow;
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::{Read, Write},
    path::PathBuf,
};
use time::{format_description::well_known::Iso8601, OffsetDateTime};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to Settings.toml file holding configuration options
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level to run with the service (default: info)
    #[arg(short, long)]
    pub level: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Settings {
    pub config: Option<String>,
    pub level: Option<String>,
    #[serde(default)]
    pub db_settings: DBSettings,
    #[serde(default)]
    pub api_settings: APISettings,
    #[serde(default)]
    pub bracket_settings: BracketSettings,
    #[serde(default)]
    pub tournament_settings: TournamentSettings,
}

impl ConfigurableSettings for Settings {
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings) {
        if let Some(level) = &cli_settings.level {
            self.level = Some(level.clone());
        }
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/local.toml")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DBSettings {
    pub data_folder: String,
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    /// Upper bound for a single write (including waiting on the writer lock)
    pub write_timeout_secs: u64,
    pub sqlite_config: SqliteSettings,
}

impl Default for DBSettings {
    fn default() -> Self {
        DBSettings {
            data_folder: String::from("./data"),
            read_max_connections: 8,
            read_min_connections: 1,
            write_max_connections: 1,
            idle_timeout_secs: 600,   // 10 minutes
            acquire_timeout_secs: 15, // 15 seconds
            write_timeout_secs: 30,
            sqlite_config: SqliteSettings::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SqliteSettings {
    pub mode: String,
    pub busy_timeout_ms: u32,
    pub journal_mode: String,
    pub synchronous: String,
    pub cache_size: i32,
    pub wal_autocheckpoint: Option<u32>,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            mode: "ReadWriteCreate".to_string(),
            busy_timeout_ms: 5000,
            journal_mode: "WAL".to_string(),
            synchronous: "NORMAL".to_string(),
            cache_size: 100000,
            wal_autocheckpoint: Some(1000),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BracketSettings {
    /// Url of the bracket service that seeds matches for a started tournament
    pub base_url: String,
    /// A promotion whose bracket call takes longer than this is treated as failed
    pub timeout_secs: u64,
    /// Retries on transient errors, all of them inside `timeout_secs`
    #[serde(default = "default_bracket_retries")]
    pub max_retries: u32,
    /// Use the in-process generator instead of the bracket service
    /// (only honoured in debug builds or with the `e2e-testing` feature)
    #[serde(default)]
    pub mock_enabled: bool,
}

impl Default for BracketSettings {
    fn default() -> Self {
        BracketSettings {
            base_url: String::from("http://127.0.0.1:9800"),
            timeout_secs: 30,
            max_retries: default_bracket_retries(),
            mock_enabled: false,
        }
    }
}

fn default_bracket_retries() -> u32 {
    2
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TournamentSettings {
    /// Buffered lifecycle signals per subscriber before the oldest are dropped
    pub signal_capacity: usize,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        TournamentSettings {
            signal_capacity: 64,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct APISettings {
    pub domain: String,
    pub port: String,
    pub origins: Vec<String>,
}

impl Default for APISettings {
    fn default() -> Self {
        APISettings {
            domain: String::from("127.0.0.1"),
            port: String::from("9990"),
            origins: vec![String::from("http://localhost:3000")],
        }
    }
}

pub fn get_settings() -> Result<Settings, anyhow::Error> {
    get_settings_with_cli(Cli::parse().into())
}

pub struct CliSettings {
    pub config: Option<String>,
    pub level: Option<String>,
}

impl From<Cli> for CliSettings {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            level: cli.level,
        }
    }
}

pub trait ConfigurableSettings: Serialize + for<'de> Deserialize<'de> + Default {
    /// Apply CLI settings after loading from file
    fn apply_cli_overrides(&mut self, cli_settings: &CliSettings);

    /// Get the default config file path
    fn default_config_path() -> PathBuf {
        PathBuf::from("./config/settings.toml")
    }

    /// Get the config directory path
    fn config_directory() -> PathBuf {
        PathBuf::from("./config")
    }
}

pub fn get_settings_with_cli<T: ConfigurableSettings>(
    cli_settings: CliSettings,
) -> Result<T, anyhow::Error> {
    let mut settings = if let Some(config_path) = cli_settings.config.clone() {
        let path = PathBuf::from(config_path);

        let absolute_path = if path.is_absolute() {
            path
        } else {
            env::current_dir()?.join(path)
        };

        let mut file =
            File::open(absolute_path).map_err(|e| anyhow!("Failed to find file: {}", e))?;
        read_settings(&mut file)?
    } else {
        let default_path = T::default_config_path();
        match File::open(&default_path) {
            Ok(mut file) => read_settings(&mut file)?,
            Err(_) => {
                let default_settings = T::default();

                fs::create_dir_all(T::config_directory())
                    .map_err(|e| anyhow!("Failed to create config directory: {}", e))?;

                let toml_content = toml::to_string(&default_settings)
                    .map_err(|e| anyhow!("Failed to serialize default settings: {}", e))?;

                let mut file = fs::File::create(&default_path)
                    .map_err(|e| anyhow!("Failed to create config file: {}", e))?;
                file.write_all(toml_content.as_bytes())
                    .map_err(|e| anyhow!("Failed to write default config: {}", e))?;

                default_settings
            }
        }
    };

    settings.apply_cli_overrides(&cli_settings);

    Ok(settings)
}

fn read_settings<T: ConfigurableSettings>(file: &mut File) -> Result<T, anyhow::Error> {
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| anyhow!("Failed to read config: {}", e))?;
    toml::from_str(&content).map_err(|e| anyhow!("Failed to map config to settings: {}", e))
}

pub fn setup_logger(
    level: Option<String>,
    filter_targets: Vec<String>,
) -> Result<(), fern::InitError> {
    let rust_log = get_log_level(level);
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            let timestamp = OffsetDateTime::now_utc()
                .format(&Iso8601::DEFAULT)
                .unwrap_or_default();
            out.finish(format_args!(
                "[{} {}] {}: {}",
                timestamp,
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .level(rust_log)
        .filter(move |metadata| {
            !filter_targets
                .iter()
                .any(|filter| metadata.target().starts_with(filter))
        })
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

pub fn get_log_level(level: Option<String>) -> LevelFilter {
    let level = level.unwrap_or_else(|| env::var("RUST_LOG").unwrap_or_default());
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}
