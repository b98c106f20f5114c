use chrono_tz::Tz;
use config::Config;
use config::ConfigError;
use config::FileFormat;
use secrecy::ExposeSecret;
use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use sqlx::postgres::PgConnectOptions;
use sqlx::postgres::PgSslMode;

/// Top-level server configuration, loaded once at startup (§6). Every knob
/// the pipeline reads at runtime lives under one of these four sections.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub pipeline: PipelineSettings,
    pub llm: LlmSettings,
}

#[derive(Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub base_url: String,
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: Secret<String>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub require_ssl: bool,
}

impl DatabaseSettings {
    pub fn connect_options(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl { PgSslMode::Require } else { PgSslMode::Prefer };
        self.connect_options_without_db().database(&self.database_name).ssl_mode(ssl_mode)
    }

    pub fn connect_options_without_db(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .username(&self.username)
            .password(self.password.expose_secret())
            .port(self.port)
    }
}

/// Knobs that govern the poll scheduler and the pipeline engine (§6).
#[derive(Deserialize, Clone)]
pub struct PipelineSettings {
    /// [0, 1]. Candidates at or above this are persisted as `accepted`;
    /// candidates below it are still persisted, as `draft` (§4.D).
    pub confidence_threshold: f64,
    /// Cadence of the background poll loop, per tenant.
    pub poll_period_minutes: u64,
    /// Upper bound on messages fetched in a single poll, per tenant.
    pub max_messages_per_poll: usize,
    /// Upper bound on messages grouped into one pipeline batch.
    pub batch_size: usize,
    /// IANA zone used to compute a tenant's cold-start cursor (start of
    /// today in this zone) the first time it is ever polled.
    pub first_sync_timezone: String,
    /// Messages whose body exceeds this many characters are truncated
    /// before being handed to the prefilter stage.
    pub prefilter_max_content_length: usize,
    /// Idempotency rows older than this are eligible for the expiry sweep.
    pub idempotency_ttl_days: i64,
    /// Global kill switch; the scheduler loop no-ops while false.
    pub polling_enabled: bool,
}

impl PipelineSettings {
    pub fn first_sync_tz(&self) -> Result<Tz, String> {
        self.first_sync_timezone.parse().map_err(|_| format!("invalid IANA timezone: {}", self.first_sync_timezone))
    }
}

/// Collaborator settings for the OpenAI-compatible chat-completion endpoint
/// (§4.E). Matches OpenRouter's surface, but any compatible provider works.
#[derive(Deserialize, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Secret<String>,
    pub request_timeout_ms: u64,
}

/// Which `configuration/{env}.yaml` overlay to load, selected by the
/// `APP_ENVIRONMENT` env var (defaults to `local`).
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!("{other} is not a supported environment. Use `local` or `production`.")),
        }
    }
}

/// Loads `configuration/base.yaml`, layers an environment-specific overlay,
/// then layers `APP_*`-prefixed environment variables on top (highest
/// precedence), mirroring the teacher's base/overlay/env-var layering.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let base_path = std::env::current_dir().expect("failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(ConfigError::Message)?;
    let environment_filename = format!("{}.yaml", environment.as_str());

    let settings = Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")).format(FileFormat::Yaml))
        .add_source(config::File::from(configuration_directory.join(environment_filename)).format(FileFormat::Yaml).required(false))
        .add_source(config::Environment::with_prefix("APP").prefix_separator("_").separator("__"))
        .build()?;
    settings.try_deserialize()
}
