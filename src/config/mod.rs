use crate::util::common::{get_env_or, get_size_from_env_or, get_vec_from_env_or, load_dotenv};
use tower_http::cors::{CorsLayer, AllowHeaders, AllowOrigin, AllowMethods, Any};
use std::time::Duration;
use std::str::FromStr;
use std::fmt::Debug;

pub mod db;

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Basic app info
    pub app_name: String,
    pub app_version: String,

    // App settings
    pub static_url: String,
    pub static_path: String,

    // Server settings
    pub http: HTTPConfig,
    pub upload: UploadConfig,
    pub db: DBConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct HTTPConfig {
    pub ip: String,
    pub port: u16,
    pub max_body_size: u64,
    pub cors: CORSConfig,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub base_path: String,
    pub base_url: String,
    pub image_formats: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DBConfig {
    pub url: String,
    pub pool_size: u32,
    pub auto_migrate: bool,
}

#[derive(Debug, Clone)]
pub struct CORSConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age: u64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_requests: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        load_dotenv();

        Ok(AppConfig {
            app_name: get_env_or("APP_NAME", "Inkpad".to_string())?,
            app_version: get_env_or("APP_VERSION", env!("CARGO_PKG_VERSION").to_string())?,

            static_url: get_env_or("STATIC_URL", "/static".to_string())?,
            static_path: get_env_or("STATIC_PATH", "./static".to_string())?,

            http: HTTPConfig::from_env()?,
            upload: UploadConfig::from_env()?,
            db: DBConfig::from_env()?,
            log: LogConfig::from_env()?,
        })
    }
}

impl HTTPConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        load_dotenv();

        Ok(HTTPConfig {
            ip: get_env_or("HTTP_IP", "127.0.0.1".to_string())?,
            port: get_env_or("HTTP_PORT", 8000)?,
            max_body_size: get_size_from_env_or("HTTP_MAX_BODY_SIZE", 10 * 1024 * 1024)?,
            cors: CORSConfig::from_env()?,
        })
    }
}

impl UploadConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        load_dotenv();

        Ok(UploadConfig {
            base_path: get_env_or("UPLOAD_PATH", "./uploads".to_string())?,
            base_url: get_env_or("UPLOAD_URL", "/uploads".to_string())?,
            image_formats: get_vec_from_env_or(
                "UPLOAD_IMAGE_FORMATS",
                strs_to_strings(vec!["jpeg", "jpg", "png", "webp", "gif"]),
            )?,
        })
    }
}

impl DBConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        load_dotenv();

        Ok(DBConfig {
            url: get_env_or("DATABASE_URL", "sqlite://app.db".to_string())?,
            pool_size: get_env_or("DATABASE_POOL_SIZE", 5)?,
            auto_migrate: get_env_or("DATABASE_AUTO_MIGRATE", true)?,
        })
    }
}

impl CORSConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        load_dotenv();

        Ok(CORSConfig {
            allowed_origins: get_vec_from_env_or("CORS_ALLOWED_ORIGINS", vec![])?,
            allowed_methods: get_vec_from_env_or(
                "CORS_ALLOWED_METHODS",
                strs_to_strings(vec!["GET", "POST", "OPTIONS"]),
            )?,
            allowed_headers: get_vec_from_env_or(
                "CORS_ALLOWED_HEADERS",
                strs_to_strings(vec!["Content-Type", "Authorization"]),
            )?,
            allow_credentials: get_env_or("CORS_ALLOW_CREDENTIALS", false)?,
            max_age: get_env_or("CORS_MAX_AGE", 86400)?,
        })
    }

    pub fn into_layer(self) -> CorsLayer {
        let mut cors = CorsLayer::new();

        cors = if self.allowed_origins.contains(&"*".to_string()) {
            cors.allow_origin(Any)
        } else {
            cors.allow_origin(AllowOrigin::list(convert_vec(self.allowed_origins.clone())))
        };

        cors = if self.allowed_methods.contains(&"*".to_string()) {
            cors.allow_methods(Any)
        } else {
            cors.allow_methods(AllowMethods::list(convert_vec(self.allowed_methods.clone())))
        };

        cors = if self.allowed_headers.contains(&"*".to_string()) {
            cors.allow_headers(Any)
        } else {
            cors.allow_headers(AllowHeaders::list(convert_vec(self.allowed_headers.clone())))
        };

        // CorsLayer panics on a wildcard origin combined with credentials.
        if !self.allowed_origins.contains(&"*".to_string()) {
            cors = cors.allow_credentials(self.allow_credentials);
        }

        cors.max_age(Duration::from_secs(self.max_age))
    }
}

impl LogConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        load_dotenv();

        Ok(LogConfig {
            log_requests: get_env_or("LOG_REQUESTS", false)?,
        })
    }
}

// convert vectors of &str to owned Strings
fn strs_to_strings(vec: Vec<&str>) -> Vec<String> {
    vec.into_iter().map(|s| s.to_string()).collect()
}

// Entries that fail to parse as header values are skipped
fn convert_vec<T: FromStr>(strings: Vec<String>) -> Vec<T>
where
    <T as FromStr>::Err: Debug,
{
    strings.into_iter().filter_map(|s| s.parse().ok()).collect()
}
