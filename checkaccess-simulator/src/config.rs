use clap::Parser;
use std::path::PathBuf;
use validator::{Validate, ValidationError};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MIN_LATENCY_MS: i64 = 50;
pub const DEFAULT_MAX_LATENCY_MS: i64 = 200;
pub const DEFAULT_ALLOW_RATE: f64 = 0.9;
pub const DEFAULT_THROTTLE_RATE: f64 = 0.01;

#[derive(Debug, Clone, Parser, Validate)]
#[command(
    name = "checkaccess-simulator",
    about = "Mock Azure CheckAccess and token server",
    version
)]
#[validate(schema(function = "validate_tls_material"))]
pub struct SimulatorConfig {
    /// Server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Minimum response latency in ms
    #[arg(long = "min-latency", default_value_t = DEFAULT_MIN_LATENCY_MS, allow_negative_numbers = true)]
    pub min_latency_ms: i64,

    /// Maximum response latency in ms
    #[arg(long = "max-latency", default_value_t = DEFAULT_MAX_LATENCY_MS, allow_negative_numbers = true)]
    pub max_latency_ms: i64,

    /// Rate of allowed decisions (0.0-1.0)
    #[arg(long = "allow-rate", default_value_t = DEFAULT_ALLOW_RATE, allow_negative_numbers = true)]
    #[validate(range(min = 0.0, max = 1.0, message = "allow-rate must be within 0.0-1.0"))]
    pub allow_rate: f64,

    /// Rate of throttled responses (0.0-1.0)
    #[arg(long = "throttle-rate", default_value_t = DEFAULT_THROTTLE_RATE, allow_negative_numbers = true)]
    #[validate(range(min = 0.0, max = 1.0, message = "throttle-rate must be within 0.0-1.0"))]
    pub throttle_rate: f64,

    /// TLS certificate file
    #[arg(long = "cert")]
    pub cert_file: Option<PathBuf>,

    /// TLS key file
    #[arg(long = "key")]
    pub key_file: Option<PathBuf>,

    /// Enable TLS
    #[arg(long = "tls")]
    pub use_tls: bool,

    /// Log every request at info level
    #[arg(long)]
    pub verbose: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            min_latency_ms: DEFAULT_MIN_LATENCY_MS,
            max_latency_ms: DEFAULT_MAX_LATENCY_MS,
            allow_rate: DEFAULT_ALLOW_RATE,
            throttle_rate: DEFAULT_THROTTLE_RATE,
            cert_file: None,
            key_file: None,
            use_tls: false,
            verbose: false,
        }
    }
}

impl SimulatorConfig {
    /// Parse the command line and reject inconsistent settings.
    pub fn from_args() -> anyhow::Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Certificate and key paths when TLS is enabled.
    pub fn tls_material(&self) -> Option<(&PathBuf, &PathBuf)> {
        if !self.use_tls {
            return None;
        }
        self.cert_file.as_ref().zip(self.key_file.as_ref())
    }
}

fn validate_tls_material(config: &SimulatorConfig) -> Result<(), ValidationError> {
    let missing = |path: &Option<PathBuf>| path.as_ref().map_or(true, |p| p.as_os_str().is_empty());
    if config.use_tls && (missing(&config.cert_file) || missing(&config.key_file)) {
        let mut err = ValidationError::new("tls_material");
        err.message = Some("TLS enabled but cert or key file not specified".into());
        return Err(err);
    }
    Ok(())
}
