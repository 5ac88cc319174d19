use tracing::{info, warn};
use worker::Env;

/// Settings read from worker secrets and vars at the start of each request.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub admin_secret: Option<String>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub jwt_secret: Option<String>,
    pub db_binding: String,
    pub cors_origin: String,
    pub public_api_url: Option<String>,
    pub environment: String,
}

impl Config {
    pub fn load(env: &Env) -> Self {
        Self::from_lookup(|key| {
            env.secret(key)
                .map(|s| s.to_string())
                .or_else(|_| env.var(key).map(|v| v.to_string()))
                .ok()
        })
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = |key: &str| {
            let value = lookup(key).map(|raw| normalize_secret(&raw));
            match value {
                Some(v) if !v.is_empty() => Some(v),
                _ => {
                    warn!("{key} is not configured");
                    None
                }
            }
        };
        let with_default = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| {
                    info!("{key} not set, using default: {default}");
                    default.to_string()
                })
        };

        Self {
            admin_secret: secret("ADMIN_SECRET"),
            admin_username: secret("ADMIN_USERNAME"),
            admin_password: secret("ADMIN_PASSWORD"),
            jwt_secret: lookup("ADMIN_JWT_SECRET")
                .map(|raw| normalize_secret(&raw))
                .filter(|v| !v.is_empty()),
            db_binding: with_default("DB_BINDING", "DB"),
            cors_origin: with_default("CORS_ORIGIN", "*"),
            public_api_url: lookup("PUBLIC_API_URL").filter(|v| !v.trim().is_empty()),
            environment: with_default("ENVIRONMENT", "development"),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

// Secrets pasted into dashboards often carry a trailing newline or wrapping quotes.
fn normalize_secret(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}
