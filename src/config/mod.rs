//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::render::DEFAULT_THEME;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "sandmark";
const ENV_PREFIX: &str = "SANDMARK";
const DEFAULT_REPLY_TIMEOUT_MS: u64 = 10_000;

/// Command-line arguments for the sandmark binary.
#[derive(Debug, Parser)]
#[command(
    name = "sandmark",
    version,
    about = "Math-safe markdown rendering for assistant chat"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SANDMARK_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render one document to HTML on stdout.
    Render(RenderArgs),
    /// Answer RENDER requests as JSON lines on stdin/stdout.
    Serve(ServeArgs),
    /// Print the stylesheets of the engines that loaded.
    Stylesheets(StylesheetsArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RenderMode {
    /// Escape, protect math and code, restore `$` delimiters.
    #[default]
    Chat,
    /// Sanitised grammar output with math typeset in place.
    Sandbox,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the syntax highlighting theme.
    #[arg(long = "highlight-theme", value_name = "THEME")]
    pub highlight_theme: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Pipeline to render with.
    #[arg(long, value_enum, default_value_t = RenderMode::Chat)]
    pub mode: RenderMode,

    /// How long to wait for the sandbox channel's reply (`--mode sandbox`).
    #[arg(long = "reply-timeout-ms", value_name = "MILLIS")]
    pub reply_timeout_ms: Option<u64>,

    /// Markdown file to render; stdin when omitted.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Accept messages only from this origin; repeat for several.
    #[arg(long = "allowed-origin", value_name = "ORIGIN")]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StylesheetsArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub sandbox: SandboxSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub highlight_theme: String,
}

#[derive(Debug, Clone)]
pub struct SandboxSettings {
    /// Empty means every origin is accepted.
    pub allowed_origins: Vec<String>,
    pub reply_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("sandbox.allowed_origins"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Render(args)) => raw.apply_render_overrides(args),
        Some(Command::Serve(args)) => raw.apply_serve_overrides(args),
        Some(Command::Stylesheets(args)) => raw.apply_common_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeArgs::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    sandbox: RawSandboxSettings,
}

impl RawSettings {
    fn apply_common_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(theme) = overrides.highlight_theme.as_ref() {
            self.render.highlight_theme = Some(theme.clone());
        }
    }

    fn apply_render_overrides(&mut self, args: &RenderArgs) {
        self.apply_common_overrides(&args.overrides);
        if let Some(timeout) = args.reply_timeout_ms {
            self.sandbox.reply_timeout_ms = Some(timeout);
        }
    }

    fn apply_serve_overrides(&mut self, args: &ServeArgs) {
        self.apply_common_overrides(&args.overrides);
        if !args.allowed_origins.is_empty() {
            self.sandbox.allowed_origins = Some(args.allowed_origins.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            render,
            sandbox,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;
        let sandbox = build_sandbox_settings(sandbox)?;

        Ok(Self {
            logging,
            render,
            sandbox,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let highlight_theme = render
        .highlight_theme
        .unwrap_or_else(|| DEFAULT_THEME.to_string());
    if highlight_theme.trim().is_empty() {
        return Err(LoadError::invalid(
            "render.highlight_theme",
            "theme name must not be empty",
        ));
    }

    Ok(RenderSettings { highlight_theme })
}

fn build_sandbox_settings(sandbox: RawSandboxSettings) -> Result<SandboxSettings, LoadError> {
    let mut allowed_origins = Vec::new();
    for origin in sandbox.allowed_origins.unwrap_or_default() {
        let trimmed = origin.trim();
        if trimmed.is_empty() {
            return Err(LoadError::invalid(
                "sandbox.allowed_origins",
                "origins must not be empty",
            ));
        }
        allowed_origins.push(trimmed.to_string());
    }

    let timeout_ms = sandbox
        .reply_timeout_ms
        .unwrap_or(DEFAULT_REPLY_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "sandbox.reply_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(SandboxSettings {
        allowed_origins,
        reply_timeout: Duration::from_millis(timeout_ms),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    highlight_theme: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSandboxSettings {
    allowed_origins: Option<Vec<String>>,
    reply_timeout_ms: Option<u64>,
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
