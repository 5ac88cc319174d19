use serde::Deserialize;
use serde_json::json;
use worker::*;

use crate::auth::{login_cookie, logout_cookie, require_admin};
use crate::config::Config;
use crate::error::{read_json, ApiError, ApiResult};
use crate::handlers::json_response;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returns the shared secret to place in the session cookie.
pub fn check_login<'a>(config: &'a Config, login: &LoginRequest) -> ApiResult<&'a str> {
    let (Some(username), Some(password), Some(secret)) = (
        config.admin_username.as_deref(),
        config.admin_password.as_deref(),
        config.admin_secret.as_deref(),
    ) else {
        return Err(ApiError::Config);
    };

    if login.username == username && login.password == password {
        Ok(secret)
    } else {
        Err(ApiError::Unauthorized("Invalid credentials".into()))
    }
}

pub async fn login(mut req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let body: LoginRequest = read_json(&mut req).await?;
    let secret = check_login(&ctx.data, &body).inspect_err(|e| {
        if let ApiError::Unauthorized(_) = e {
            tracing::warn!(username = %body.username, "admin login failed");
        }
    })?;

    tracing::info!(username = %body.username, "admin logged in");
    let mut response = json_response(&json!({ "success": true }))?;
    response
        .headers_mut()
        .set("Set-Cookie", &login_cookie(secret, ctx.data.is_production()))?;
    Ok(response)
}

pub async fn logout(_req: Request, _ctx: RouteContext<Config>) -> ApiResult<Response> {
    let mut response = json_response(&json!({ "success": true }))?;
    response.headers_mut().set("Set-Cookie", &logout_cookie())?;
    Ok(response)
}

pub async fn session(req: Request, ctx: RouteContext<Config>) -> ApiResult<Response> {
    let authenticated = require_admin(&req, &ctx).is_ok();
    json_response(&json!({ "authenticated": authenticated }))
}
