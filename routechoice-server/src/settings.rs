//! Runtime settings, read from flags or the environment.
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// How admin requests prove who they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AuthMode {
    /// Signed HTTP-only session cookie issued by the login endpoint
    #[default]
    Cookie,
    /// HTTP Basic credentials on every request
    Basic,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "routechoice-server", version)]
#[command(about = "Route choice study service - scenario sampling, choice and survey logging")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDRESS", default_value = "127.0.0.1:3000")]
    pub bind_address: String,

    /// Directory for file-backed storage when no key-value service is configured
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Base URL of the REST key-value service
    #[arg(long, env = "KV_REST_API_URL", requires = "kv_rest_api_token")]
    pub kv_rest_api_url: Option<String>,

    /// Bearer token for the REST key-value service
    #[arg(long, env = "KV_REST_API_TOKEN", hide_env_values = true)]
    pub kv_rest_api_token: Option<String>,

    /// Admin username; admin routes stay locked while unset
    #[arg(long, env = "ADMIN_USERNAME")]
    pub admin_username: Option<String>,

    /// Admin password
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Admin authentication scheme
    #[arg(long, env = "ADMIN_AUTH", value_enum, default_value_t = AuthMode::Cookie)]
    pub admin_auth: AuthMode,

    /// Secret that signs admin session cookies (random per process when unset)
    #[arg(long, env = "ADMIN_COOKIE_SECRET", hide_env_values = true)]
    pub admin_cookie_secret: Option<String>,

    /// Base URL of an OSRM-compatible routing service
    #[arg(long, env = "ROUTING_URL")]
    pub routing_url: Option<String>,

    /// Prefix for session keys in storage
    #[arg(long, env = "SESSION_KEY_PREFIX", default_value = "session:")]
    pub session_key_prefix: String,

    /// Append-only log of finalized participant records (defaults to <data-dir>/records.jsonl)
    #[arg(long, env = "RECORDS_LOG")]
    pub records_log: Option<PathBuf>,
}

impl Args {
    #[must_use]
    pub fn records_log_path(&self) -> PathBuf {
        self.records_log
            .clone()
            .unwrap_or_else(|| self.data_dir.join("records.jsonl"))
    }

    /// REST key-value credentials, when both halves are present.
    #[must_use]
    pub fn kv_rest(&self) -> Option<(&str, &str)> {
        match (&self.kv_rest_api_url, &self.kv_rest_api_token) {
            (Some(url), Some(token)) if !url.trim().is_empty() => Some((url, token)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_log_defaults_under_the_data_dir() {
        let args = Args::parse_from(["routechoice-server", "--data-dir", "/srv/study"]);
        assert_eq!(args.records_log_path(), PathBuf::from("/srv/study/records.jsonl"));

        let args = Args::parse_from([
            "routechoice-server",
            "--records-log",
            "/var/log/records.jsonl",
        ]);
        assert_eq!(args.records_log_path(), PathBuf::from("/var/log/records.jsonl"));
    }

    #[test]
    fn auth_mode_parses_from_flags() {
        let args = Args::parse_from(["routechoice-server", "--admin-auth", "basic"]);
        assert_eq!(args.admin_auth, AuthMode::Basic);
    }

    #[test]
    fn kv_rest_needs_both_url_and_token() {
        let args = Args::parse_from([
            "routechoice-server",
            "--kv-rest-api-url",
            "https://kv.example.com",
            "--kv-rest-api-token",
            "secret",
        ]);
        assert_eq!(args.kv_rest(), Some(("https://kv.example.com", "secret")));
    }
}
