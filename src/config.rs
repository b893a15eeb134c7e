//! Gateway configuration.
//!
//! Resolution order: built-in defaults, then `LECTERN_*` environment
//! variables, then command-line flags.

use crate::error::{AppError, AppResult};

pub const DEFAULT_HTTP_PORT: u16 = 7878;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60 * 24 * 7;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_GUARDED_PREFIXES: &[&str] = &["/api/admin", "/api/institutions"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    /// In-process accounts and roles.
    Local,
    /// Hosted identity service and document database.
    Hosted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub http_port: u16,
    pub provider: ProviderMode,
    pub endpoint: Option<String>,
    pub project_id: Option<String>,
    pub api_key: Option<String>,
    pub database_id: Option<String>,
    pub collection_id: Option<String>,
    pub session_ttl_secs: u64,
    /// Per-call limit for the hosted backend.
    pub request_timeout_secs: u64,
    pub cookie_secure: bool,
    pub guarded_prefixes: Vec<String>,
    /// Local mode only: account seeded with the admin role at startup.
    pub bootstrap_admin: Option<(String, String)>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            provider: ProviderMode::Local,
            endpoint: None,
            project_id: None,
            api_key: None,
            database_id: None,
            collection_id: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            cookie_secure: true,
            guarded_prefixes: DEFAULT_GUARDED_PREFIXES.iter().map(|s| s.to_string()).collect(),
            bootstrap_admin: None,
        }
    }
}

pub const USAGE: &str = "lectern Server\n\nUSAGE:\n  lectern_server [OPTIONS]\n\nOPTIONS:\n  --http-port N            HTTP port (env: LECTERN_HTTP_PORT, default 7878)\n  --provider local|hosted  Identity backend (env: LECTERN_PROVIDER, default local)\n  --endpoint URL           Hosted backend base URL (env: LECTERN_ENDPOINT)\n  --project-id ID          Hosted project id (env: LECTERN_PROJECT_ID)\n  --api-key KEY            Hosted database API key (env: LECTERN_API_KEY)\n  --database-id ID         Database holding user records (env: LECTERN_DATABASE_ID)\n  --collection-id ID       Collection holding user records (env: LECTERN_COLLECTION_ID)\n  --session-ttl-secs N     Local session lifetime (env: LECTERN_SESSION_TTL_SECS)\n  --request-timeout-secs N Hosted backend call limit (env: LECTERN_REQUEST_TIMEOUT_SECS, default 30)\n  --insecure-cookies       Drop the Secure cookie attribute (env: LECTERN_COOKIE_SECURE=false)\n";

fn parse_bool(name: &str, v: &str) -> AppResult<bool> {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::validation("invalid_config".to_string(), format!("{} expects a boolean, got '{}'", name, v))),
    }
}

fn parse_num<T: std::str::FromStr>(name: &str, v: &str) -> AppResult<T> {
    v.trim().parse::<T>()
        .map_err(|_| AppError::validation("invalid_config".to_string(), format!("{} expects a number, got '{}'", name, v)))
}

fn flag_value(args: &[String], i: usize) -> AppResult<&str> {
    args.get(i + 1)
        .map(|s| s.as_str())
        .ok_or_else(|| AppError::validation("invalid_config".to_string(), format!("{} expects a value", args[i])))
}

fn parse_mode(v: &str) -> AppResult<ProviderMode> {
    match v.to_lowercase().as_str() {
        "local" => Ok(ProviderMode::Local),
        "hosted" | "http" => Ok(ProviderMode::Hosted),
        other => Err(AppError::validation("invalid_config".to_string(), format!("unknown provider '{}'", other))),
    }
}

impl GatewayConfig {
    /// Defaults overlaid with the process environment and `args`.
    pub fn resolve(args: &[String]) -> AppResult<Self> {
        let mut cfg = Self::from_lookup(|k| std::env::var(k).ok())?;
        cfg.apply_args(args)?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Defaults overlaid with whatever `lookup` returns for the `LECTERN_*` keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = lookup("LECTERN_HTTP_PORT") { cfg.http_port = parse_num("LECTERN_HTTP_PORT", &v)?; }
        if let Some(v) = lookup("LECTERN_PROVIDER") { cfg.provider = parse_mode(&v)?; }
        if let Some(v) = lookup("LECTERN_ENDPOINT") { cfg.endpoint = Some(v); }
        if let Some(v) = lookup("LECTERN_PROJECT_ID") { cfg.project_id = Some(v); }
        if let Some(v) = lookup("LECTERN_API_KEY") { cfg.api_key = Some(v); }
        if let Some(v) = lookup("LECTERN_DATABASE_ID") { cfg.database_id = Some(v); }
        if let Some(v) = lookup("LECTERN_COLLECTION_ID") { cfg.collection_id = Some(v); }
        if let Some(v) = lookup("LECTERN_SESSION_TTL_SECS") { cfg.session_ttl_secs = parse_num("LECTERN_SESSION_TTL_SECS", &v)?; }
        if let Some(v) = lookup("LECTERN_REQUEST_TIMEOUT_SECS") { cfg.request_timeout_secs = parse_num("LECTERN_REQUEST_TIMEOUT_SECS", &v)?; }
        if let Some(v) = lookup("LECTERN_COOKIE_SECURE") { cfg.cookie_secure = parse_bool("LECTERN_COOKIE_SECURE", &v)?; }
        if let Some(v) = lookup("LECTERN_GUARDED_PREFIXES") {
            cfg.guarded_prefixes = v.split(',').map(|s| s.trim().trim_end_matches('/').to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let (Some(email), Some(pass)) = (lookup("LECTERN_BOOTSTRAP_ADMIN_EMAIL"), lookup("LECTERN_BOOTSTRAP_ADMIN_PASSWORD")) {
            cfg.bootstrap_admin = Some((email, pass));
        }
        Ok(cfg)
    }

    /// CLI flags override environment.
    pub fn apply_args(&mut self, args: &[String]) -> AppResult<()> {
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--http-port" => { self.http_port = parse_num(flag, flag_value(args, i)?)?; i += 1; }
                "--provider" => { self.provider = parse_mode(flag_value(args, i)?)?; i += 1; }
                "--endpoint" => { self.endpoint = Some(flag_value(args, i)?.to_string()); i += 1; }
                "--project-id" => { self.project_id = Some(flag_value(args, i)?.to_string()); i += 1; }
                "--api-key" => { self.api_key = Some(flag_value(args, i)?.to_string()); i += 1; }
                "--database-id" => { self.database_id = Some(flag_value(args, i)?.to_string()); i += 1; }
                "--collection-id" => { self.collection_id = Some(flag_value(args, i)?.to_string()); i += 1; }
                "--session-ttl-secs" => { self.session_ttl_secs = parse_num(flag, flag_value(args, i)?)?; i += 1; }
                "--request-timeout-secs" => { self.request_timeout_secs = parse_num(flag, flag_value(args, i)?)?; i += 1; }
                "--insecure-cookies" => { self.cookie_secure = false; }
                _ => {}
            }
            i += 1;
        }
        Ok(())
    }

    /// Hosted mode needs every coordinate of the backend.
    pub fn check(&self) -> AppResult<()> {
        if self.request_timeout_secs == 0 {
            return Err(AppError::validation("invalid_config", "request timeout must be at least one second"));
        }
        if self.provider == ProviderMode::Hosted {
            let missing: Vec<&str> = [
                ("endpoint", &self.endpoint),
                ("project-id", &self.project_id),
                ("api-key", &self.api_key),
                ("database-id", &self.database_id),
                ("collection-id", &self.collection_id),
            ]
            .iter()
            .filter(|(_, v)| v.as_deref().map(str::is_empty).unwrap_or(true))
            .map(|(k, _)| *k)
            .collect();
            if !missing.is_empty() {
                return Err(AppError::validation(
                    "invalid_config".to_string(),
                    format!("hosted provider requires: {}", missing.join(", ")),
                ));
            }
        }
        Ok(())
    }
}
