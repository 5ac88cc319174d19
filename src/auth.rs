//! Admin gate.
//!
//! The dashboard authenticates with one shared secret, sent either as the
//! `X-Admin-Key` header or as the `admin_token` cookie set at login. Tooling
//! that holds a user session may instead send an HS256 bearer token whose role
//! claim is `admin`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::warn;
use worker::{Request, RouteContext};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};

type HmacSha256 = Hmac<Sha256>;

pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";
pub const ADMIN_COOKIE: &str = "admin_token";
pub const SYSTEM_ADMIN: &str = "system-admin";
const COOKIE_MAX_AGE_SECS: u32 = 60 * 60 * 24 * 7;

/// Who passed the gate; recorded as `reviewed_by` / `updated_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admin {
    pub id: String,
}

/// The credential-bearing parts of a request.
#[derive(Debug, Default, Clone)]
pub struct Credentials {
    pub admin_key: Option<String>,
    pub cookie_header: Option<String>,
    pub authorization: Option<String>,
}

impl Credentials {
    pub fn from_request(req: &Request) -> ApiResult<Self> {
        let headers = req.headers();
        Ok(Self {
            admin_key: headers.get(ADMIN_KEY_HEADER)?,
            cookie_header: headers.get("Cookie")?,
            authorization: headers.get("Authorization")?,
        })
    }
}

pub fn require_admin(req: &Request, ctx: &RouteContext<Config>) -> ApiResult<Admin> {
    let credentials = Credentials::from_request(req)?;
    let now = crate::db::now().timestamp();
    authorize(&credentials, &ctx.data, now)
}

pub fn authorize(credentials: &Credentials, config: &Config, now: i64) -> ApiResult<Admin> {
    if let Some(secret) = config.admin_secret.as_deref() {
        let cookie = credentials
            .cookie_header
            .as_deref()
            .and_then(|header| cookie_value(header, ADMIN_COOKIE));
        let presented = [credentials.admin_key.as_deref(), cookie.as_deref()];
        if presented.iter().flatten().any(|key| *key == secret) {
            return Ok(Admin {
                id: SYSTEM_ADMIN.to_string(),
            });
        }
    }

    if let (Some(jwt_secret), Some(header)) = (
        config.jwt_secret.as_deref(),
        credentials.authorization.as_deref(),
    ) {
        let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
        match verify_bearer(token, jwt_secret.as_bytes(), now) {
            Ok(admin) => return Ok(admin),
            Err(reason) => warn!("bearer token rejected: {reason}"),
        }
    }

    Err(ApiError::Unauthorized("Admin access required".into()))
}

pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.trim().to_string())
    })
}

pub fn login_cookie(secret: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{ADMIN_COOKIE}={secret}; HttpOnly; SameSite=Strict; Max-Age={COOKIE_MAX_AGE_SECS}; Path=/"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn logout_cookie() -> String {
    format!("{ADMIN_COOKIE}=; HttpOnly; SameSite=Strict; Max-Age=0; Path=/")
}

#[derive(Debug, Deserialize)]
struct JwtHeader {
    alg: String,
}

#[derive(Debug, Default, Deserialize)]
struct RoleMetadata {
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    exp: Option<i64>,
    role: Option<String>,
    #[serde(default)]
    app_metadata: RoleMetadata,
    #[serde(default)]
    user_metadata: RoleMetadata,
}

impl Claims {
    fn role(&self) -> Option<&str> {
        self.app_metadata
            .role
            .as_deref()
            .or(self.user_metadata.role.as_deref())
            .or(self.role.as_deref())
    }
}

pub fn verify_bearer(token: &str, secret: &[u8], now: i64) -> Result<Admin, String> {
    let mut parts = token.split('.');
    let (Some(header_part), Some(payload_part), Some(sig_part), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err("malformed token".into());
    };

    let header: JwtHeader = decode_part(header_part)?;
    if header.alg != "HS256" {
        return Err(format!("unsupported alg {}", header.alg));
    }

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| e.to_string())?;
    mac.update(header_part.as_bytes());
    mac.update(b".");
    mac.update(payload_part.as_bytes());
    let signature = URL_SAFE_NO_PAD
        .decode(sig_part)
        .map_err(|e| e.to_string())?;
    mac.verify_slice(&signature)
        .map_err(|_| "signature mismatch".to_string())?;

    let claims: Claims = decode_part(payload_part)?;
    if claims.exp.is_some_and(|exp| exp <= now) {
        return Err("token expired".into());
    }
    if claims.role() != Some("admin") {
        return Err("role is not admin".into());
    }

    Ok(Admin {
        id: claims.sub.unwrap_or_else(|| "admin".to_string()),
    })
}

fn decode_part<T: serde::de::DeserializeOwned>(part: &str) -> Result<T, String> {
    let bytes = URL_SAFE_NO_PAD.decode(part).map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}
