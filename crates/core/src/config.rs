use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub proxy: ProxyConfig,
    pub outbound: OutboundConfig,
    pub notification: NotificationConfig,
    pub supervisor: SupervisorConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    pub channel_url: String,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub endpoint: String,
    pub token: SecretString,
}

#[derive(Clone, Debug)]
pub struct OutboundConfig {
    pub timeout_ms: u64,
    pub skip_tls_verify: bool,
    pub notify_skip_tls_verify: bool,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub time_zone: String,
}

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub restart_on_disconnect: bool,
    pub forward_args: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_channel_url: Option<String>,
    pub proxy_endpoint: Option<String>,
    pub proxy_token: Option<String>,
    pub skip_tls_verify: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_TIME_ZONE: &str = "Australia/Sydney";
pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                channel_url: String::new(),
                api_base_url: DEFAULT_SLACK_API_BASE_URL.to_string(),
            },
            proxy: ProxyConfig { endpoint: String::new(), token: String::new().into() },
            outbound: OutboundConfig {
                timeout_ms: 2_000,
                skip_tls_verify: true,
                notify_skip_tls_verify: true,
            },
            notification: NotificationConfig { time_zone: DEFAULT_TIME_ZONE.to_string() },
            supervisor: SupervisorConfig { restart_on_disconnect: true, forward_args: true },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("clockbridge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Parsed notification time zone. Validation guarantees this parses for loaded configs.
    pub fn time_zone(&self) -> Result<Tz, ConfigError> {
        parse_time_zone(&self.notification.time_zone)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(app_token) = slack.app_token {
                self.slack.app_token = secret_value(app_token);
            }
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(channel_url) = slack.channel_url {
                self.slack.channel_url = channel_url;
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(proxy) = patch.proxy {
            if let Some(endpoint) = proxy.endpoint {
                self.proxy.endpoint = endpoint;
            }
            if let Some(token) = proxy.token {
                self.proxy.token = secret_value(token);
            }
        }

        if let Some(outbound) = patch.outbound {
            if let Some(timeout_ms) = outbound.timeout_ms {
                self.outbound.timeout_ms = timeout_ms;
            }
            if let Some(skip_tls_verify) = outbound.skip_tls_verify {
                self.outbound.skip_tls_verify = skip_tls_verify;
            }
            if let Some(notify_skip_tls_verify) = outbound.notify_skip_tls_verify {
                self.outbound.notify_skip_tls_verify = notify_skip_tls_verify;
            }
        }

        if let Some(notification) = patch.notification {
            if let Some(time_zone) = notification.time_zone {
                self.notification.time_zone = time_zone;
            }
        }

        if let Some(supervisor) = patch.supervisor {
            if let Some(restart_on_disconnect) = supervisor.restart_on_disconnect {
                self.supervisor.restart_on_disconnect = restart_on_disconnect;
            }
            if let Some(forward_args) = supervisor.forward_args {
                self.supervisor.forward_args = forward_args;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // Prefixed names win over the legacy unprefixed keys.
        let app_token =
            read_env("CLOCKBRIDGE_SLACK_APP_TOKEN").or_else(|| read_env("SLACK_SIGNING_SECRET"));
        if let Some(value) = app_token {
            self.slack.app_token = secret_value(value);
        }
        let bot_token =
            read_env("CLOCKBRIDGE_SLACK_BOT_TOKEN").or_else(|| read_env("SLACK_BOT_TOKEN"));
        if let Some(value) = bot_token {
            self.slack.bot_token = secret_value(value);
        }
        let channel_url =
            read_env("CLOCKBRIDGE_SLACK_CHANNEL_URL").or_else(|| read_env("SLACK_CHANNEL_URL"));
        if let Some(value) = channel_url {
            self.slack.channel_url = value;
        }
        if let Some(value) = read_env("CLOCKBRIDGE_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        let endpoint = read_env("CLOCKBRIDGE_PROXY_ENDPOINT")
            .or_else(|| read_env("PROXY_TO_API_ENDPOINT"));
        if let Some(value) = endpoint {
            self.proxy.endpoint = value;
        }
        let token =
            read_env("CLOCKBRIDGE_PROXY_TOKEN").or_else(|| read_env("PROXY_TO_API_TOKEN"));
        if let Some(value) = token {
            self.proxy.token = secret_value(value);
        }

        if let Some(value) = read_env("CLOCKBRIDGE_OUTBOUND_TIMEOUT_MS") {
            self.outbound.timeout_ms = parse_u64("CLOCKBRIDGE_OUTBOUND_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("CLOCKBRIDGE_OUTBOUND_SKIP_TLS_VERIFY") {
            self.outbound.skip_tls_verify =
                parse_bool("CLOCKBRIDGE_OUTBOUND_SKIP_TLS_VERIFY", &value)?;
        }
        if let Some(value) = read_env("CLOCKBRIDGE_OUTBOUND_NOTIFY_SKIP_TLS_VERIFY") {
            self.outbound.notify_skip_tls_verify =
                parse_bool("CLOCKBRIDGE_OUTBOUND_NOTIFY_SKIP_TLS_VERIFY", &value)?;
        }

        if let Some(value) = read_env("CLOCKBRIDGE_NOTIFICATION_TIME_ZONE") {
            self.notification.time_zone = value;
        }

        if let Some(value) = read_env("CLOCKBRIDGE_SUPERVISOR_RESTART_ON_DISCONNECT") {
            self.supervisor.restart_on_disconnect =
                parse_bool("CLOCKBRIDGE_SUPERVISOR_RESTART_ON_DISCONNECT", &value)?;
        }
        if let Some(value) = read_env("CLOCKBRIDGE_SUPERVISOR_FORWARD_ARGS") {
            self.supervisor.forward_args =
                parse_bool("CLOCKBRIDGE_SUPERVISOR_FORWARD_ARGS", &value)?;
        }

        let log_level =
            read_env("CLOCKBRIDGE_LOGGING_LEVEL").or_else(|| read_env("CLOCKBRIDGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CLOCKBRIDGE_LOGGING_FORMAT").or_else(|| read_env("CLOCKBRIDGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(app_token);
        }
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(channel_url) = overrides.slack_channel_url {
            self.slack.channel_url = channel_url;
        }
        if let Some(endpoint) = overrides.proxy_endpoint {
            self.proxy.endpoint = endpoint;
        }
        if let Some(token) = overrides.proxy_token {
            self.proxy.token = secret_value(token);
        }
        if let Some(skip_tls_verify) = overrides.skip_tls_verify {
            self.outbound.skip_tls_verify = skip_tls_verify;
            self.outbound.notify_skip_tls_verify = skip_tls_verify;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_proxy(&self.proxy)?;
        validate_outbound(&self.outbound)?;
        parse_time_zone(&self.notification.time_zone)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("clockbridge.toml"), PathBuf::from("config/clockbridge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let app_token = slack.app_token.expose_secret();
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required (CLOCKBRIDGE_SLACK_APP_TOKEN or SLACK_SIGNING_SECRET)"
                .to_string(),
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}"
        )));
    }

    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required (CLOCKBRIDGE_SLACK_BOT_TOKEN or SLACK_BOT_TOKEN)"
                .to_string(),
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}"
        )));
    }

    validate_http_url("slack.channel_url", &slack.channel_url)?;
    validate_http_url("slack.api_base_url", &slack.api_base_url)?;
    Ok(())
}

fn validate_proxy(proxy: &ProxyConfig) -> Result<(), ConfigError> {
    validate_http_url("proxy.endpoint", &proxy.endpoint)?;
    if proxy.token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "proxy.token is required (CLOCKBRIDGE_PROXY_TOKEN or PROXY_TO_API_TOKEN)".to_string(),
        ));
    }
    Ok(())
}

fn validate_outbound(outbound: &OutboundConfig) -> Result<(), ConfigError> {
    if outbound.timeout_ms == 0 || outbound.timeout_ms > 30_000 {
        return Err(ConfigError::Validation(
            "outbound.timeout_ms must be in range 1..=30000".to_string(),
        ));
    }
    Ok(())
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{key} is required")));
    }
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{key} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn parse_time_zone(value: &str) -> Result<Tz, ConfigError> {
    value.trim().parse::<Tz>().map_err(|_| {
        ConfigError::Validation(format!(
            "notification.time_zone `{value}` is not a known IANA time zone"
        ))
    })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    proxy: Option<ProxyPatch>,
    outbound: Option<OutboundPatch>,
    notification: Option<NotificationPatch>,
    supervisor: Option<SupervisorPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    channel_url: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProxyPatch {
    endpoint: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutboundPatch {
    timeout_ms: Option<u64>,
    skip_tls_verify: Option<bool>,
    notify_skip_tls_verify: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    time_zone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SupervisorPatch {
    restart_on_disconnect: Option<bool>,
    forward_args: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
