//! Process configuration, read once from the environment at startup.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Settings for the remote multimodal model.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl InferenceConfig {
    /// Defaults for everything except the key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    fn from_env() -> Result<Self> {
        let api_key = non_empty_var("INFERENCE_API_KEY")
            .or_else(|| non_empty_var("GROQ_API_KEY"))
            .ok_or_else(|| anyhow!("INFERENCE_API_KEY (or GROQ_API_KEY) environment variable not set"))?;

        let mut config = Self::new(api_key);
        if let Ok(url) = env::var("INFERENCE_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = env::var("INFERENCE_MODEL") {
            config.model = model;
        }
        config.temperature = parse_var("INFERENCE_TEMPERATURE", DEFAULT_TEMPERATURE)?;
        config.max_tokens = parse_var("INFERENCE_MAX_TOKENS", DEFAULT_MAX_TOKENS)?;
        Ok(config)
    }
}

/// Credentials for the Supabase document table.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub jwt_secret: String,
    pub inference: InferenceConfig,
    /// `None` selects the in-memory store.
    pub supabase: Option<SupabaseConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let jwt_secret =
            env::var("JWT_SECRET").context("JWT_SECRET environment variable not set")?;
        if jwt_secret.is_empty() {
            return Err(anyhow!("JWT_SECRET must not be empty"));
        }

        let supabase = match (env::var("SUPABASE_URL"), env::var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Ok(url), Ok(service_role_key)) => Some(SupabaseConfig {
                url,
                service_role_key,
            }),
            _ => {
                warn!("SUPABASE_URL/SUPABASE_SERVICE_ROLE_KEY not set, records are kept in memory");
                None
            }
        };

        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            jwt_secret,
            inference: InferenceConfig::from_env()?,
            supabase,
        })
    }
}

/// Value of `name`, treating blank values as unset.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}
