use anyhow::{anyhow, Context, Result};
use chrono::{Local, TimeZone, Utc};
use dotenvy::dotenv;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

// A static variable to ensure that environment variables are loaded only once.
static LOAD_ENV: OnceLock<()> = OnceLock::new();

/// Loads environment variables from `.env` and environment-specific files.
///
/// This function initializes environment variables by loading them from `.env` files.
/// It follows a specific order of precedence:
/// 1. Loads the default `.env` file.
/// 2. Loads an environment-specific file (`.env.dev` for debug mode or `.env.prod` for production mode).
/// 3. Loads a local override file (`.env.local`) if it exists.
pub fn load_dotenv() {
    LOAD_ENV.get_or_init(|| {
        // load .env
        dotenv().ok();

        let debug = cfg!(debug_assertions);
        let env_file = if debug { ".env.dev" } else { ".env.prod" };

        // load .env.dev or .env.prod
        if Path::new(env_file).exists() {
            dotenvy::from_filename(env_file).ok();
        }

        // load .env.local
        if Path::new(".env.local").exists() {
            dotenvy::from_filename(".env.local").ok();
        }
    });
}

/// Retrieves a value from an environment variable and parses it into type `T`.
/// If the variable is not set, returns `default`. If parsing fails, returns an error.
pub fn get_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Debug,
{
    match env::var(key) {
        Ok(val) => val.parse()
            .map_err(|_| anyhow!(format!("Failed to parse {} env var", key))),
        Err(_) => Ok(default)
    }
}

/// Retrieves a vector from an environment variable.
/// If the variable is not set, returns `default`. If parsing fails, returns an error.
pub fn get_vec_from_env_or<T>(key: &str, default: Vec<T>) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: Into<anyhow::Error>,
{
    match env::var(key) {
        Ok(val) => val.split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().map_err(Into::into)
                .context(format!("Failed to parse {} env var", key)))
            .collect(),
        Err(_) => Ok(default),
    }
}

/// Retrieves a `u64` from an environment variable.
/// Supporting K, M, G suffixes (case-insensitive).
/// If the variable is not set, returns `default`. If parsing fails, returns an error.
pub fn get_size_from_env_or(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(val) => parse_size(&val)
            .ok_or(anyhow!(format!("Failed to parse {} env var", key))),
        Err(_) => Ok(default),
    }
}

/// Converts a size string to a number, supporting K, M, G suffixes (case-insensitive)
///
/// # Arguments
/// * `size_str` - The size string to parse
///
/// # Returns
/// Parsed numeric size, or None if parsing fails
pub fn parse_size(size_str: &str) -> Option<u64> {
    if size_str.is_empty() {
        return None;
    }

    let size_str = size_str.to_lowercase();

    // Split into numeric part and unit multiplier
    let (num_part, unit_multiplier) = match size_str.chars().last() {
        Some('k') => (&size_str[..size_str.len() - 1], 1024u64),
        Some('m') => (&size_str[..size_str.len() - 1], 1024u64 * 1024),
        Some('g') => (&size_str[..size_str.len() - 1], 1024u64 * 1024 * 1024),
        _ => (size_str.as_str(), 1),
    };

    num_part.parse::<u64>().ok().map(|num| num * unit_multiplier)
}

/// Current time as Unix milliseconds, the unit every timestamp column uses.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Formats a Unix-millisecond timestamp as a local `yyyy-MM-dd HH:mm` string.
pub fn format_millis(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(datetime) => datetime.format("%Y-%m-%d %H:%M").to_string(),
        None => String::new(),
    }
}
