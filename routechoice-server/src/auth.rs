//! Admin authentication: signed session cookie or HTTP Basic credentials.
use axum::{
    Json, async_trait,
    extract::{FromRequestParts, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, header, request::Parts},
    response::{IntoResponse, Response},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

use crate::AppState;
use crate::error::ApiError;
use crate::settings::AuthMode;

pub const ADMIN_COOKIE: &str = "admin_session";

type HmacSha256 = Hmac<Sha256>;

/// Configured admin credentials and the key that signs session cookies.
pub struct AdminAuth {
    mode: AuthMode,
    credentials: Option<(String, String)>,
    secret: Vec<u8>,
}

impl AdminAuth {
    /// Build the authenticator. Without a username and password every admin
    /// request is rejected; without a cookie secret a random one is drawn, so
    /// cookies do not outlive the process.
    #[must_use]
    pub fn new(
        mode: AuthMode,
        username: Option<String>,
        password: Option<String>,
        cookie_secret: Option<String>,
    ) -> Self {
        let credentials = match (username, password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => {
                log::warn!("admin credentials are not configured; admin routes are locked");
                None
            }
        };
        let secret = cookie_secret.filter(|s| !s.is_empty()).map_or_else(
            || rand::random::<[u8; 32]>().to_vec(),
            String::into_bytes,
        );
        Self {
            mode,
            credentials,
            secret,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> AuthMode {
        self.mode
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length")
    }

    fn digest(&self, domain: &[u8], value: &str) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(domain);
        mac.update(value.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Constant-time check of `candidate` against `expected` via their MACs.
    fn matches(&self, domain: &[u8], candidate: &str, expected: &str) -> bool {
        let mut mac = self.mac();
        mac.update(domain);
        mac.update(candidate.as_bytes());
        mac.verify_slice(&self.digest(domain, expected)).is_ok()
    }

    /// Whether a username/password pair is the configured one.
    #[must_use]
    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        let Some((user, pass)) = &self.credentials else {
            return false;
        };
        // Both comparisons always run.
        let user_ok = self.matches(b"user", username, user);
        let pass_ok = self.matches(b"pass", password, pass);
        user_ok & pass_ok
    }

    /// Cookie value proving a successful login.
    #[must_use]
    pub fn session_token(&self) -> Option<String> {
        let (user, _) = self.credentials.as_ref()?;
        Some(hex::encode(self.digest(b"session", user)))
    }

    fn verify_token(&self, token: &str) -> bool {
        let Some((user, _)) = &self.credentials else {
            return false;
        };
        let Ok(presented) = hex::decode(token) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(b"session");
        mac.update(user.as_bytes());
        mac.verify_slice(&presented).is_ok()
    }

    fn verify_cookie(&self, headers: &HeaderMap) -> bool {
        cookie_values(headers, ADMIN_COOKIE).any(|token| self.verify_token(token))
    }

    fn verify_basic(&self, headers: &HeaderMap) -> bool {
        let Some(encoded) = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Basic "))
        else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(pair) = String::from_utf8(decoded) else {
            return false;
        };
        pair.split_once(':')
            .is_some_and(|(user, pass)| self.check_credentials(user, pass))
    }

    /// Accept a valid session cookie or valid Basic credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`], carrying a Basic challenge in Basic mode.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<AdminUser, ApiError> {
        if self.verify_cookie(headers) || self.verify_basic(headers) {
            return Ok(AdminUser);
        }
        Err(ApiError::Unauthorized {
            challenge: self.mode == AuthMode::Basic,
        })
    }

    #[must_use]
    pub fn login_cookie(&self, token: &str) -> String {
        format!("{ADMIN_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/")
    }

    #[must_use]
    pub fn logout_cookie(&self) -> String {
        format!("{ADMIN_COOKIE}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0")
    }
}

fn cookie_values<'a>(headers: &'a HeaderMap, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(move |pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then_some(value)
        })
}

/// Proof that the request came from the admin.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser;

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state.auth.authorize(&parts.headers)
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// `POST /api/admin/login`
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let challenge = state.auth.mode() == AuthMode::Basic;
    if !state.auth.check_credentials(&request.username, &request.password) {
        log::warn!("rejected admin login");
        return Err(ApiError::Unauthorized { challenge });
    }
    let token = state
        .auth
        .session_token()
        .ok_or(ApiError::Unauthorized { challenge })?;
    let cookie = HeaderValue::from_str(&state.auth.login_cookie(&token))
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    log::info!("admin logged in");
    Ok(([(header::SET_COOKIE, cookie)], Json(json!({ "success": true }))).into_response())
}

/// `POST /api/admin/logout`
pub async fn logout(State(state): State<AppState>) -> Result<Response, ApiError> {
    let cookie = HeaderValue::from_str(&state.auth.logout_cookie())
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(([(header::SET_COOKIE, cookie)], Json(json!({ "success": true }))).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(mode: AuthMode) -> AdminAuth {
        AdminAuth::new(
            mode,
            Some("researcher".into()),
            Some("hunter2".into()),
            Some("cookie-secret".into()),
        )
    }

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn credentials_must_both_match() {
        let auth = auth(AuthMode::Cookie);
        assert!(auth.check_credentials("researcher", "hunter2"));
        assert!(!auth.check_credentials("researcher", "hunter3"));
        assert!(!auth.check_credentials("admin", "hunter2"));
        assert!(!auth.check_credentials("", ""));
    }

    #[test]
    fn unconfigured_auth_rejects_everything() {
        let auth = AdminAuth::new(AuthMode::Cookie, Some("researcher".into()), None, None);
        assert!(!auth.check_credentials("researcher", ""));
        assert!(auth.session_token().is_none());
        assert!(auth.authorize(&HeaderMap::new()).is_err());
    }

    #[test]
    fn session_cookie_is_accepted_among_others() {
        let auth = auth(AuthMode::Cookie);
        let token = auth.session_token().unwrap();
        let request = headers(
            header::COOKIE,
            &format!("theme=dark; {ADMIN_COOKIE}={token}; other=1"),
        );
        assert!(auth.authorize(&request).is_ok());
    }

    #[test]
    fn tokens_are_bound_to_the_secret() {
        let token = auth(AuthMode::Cookie).session_token().unwrap();
        let other = AdminAuth::new(
            AuthMode::Cookie,
            Some("researcher".into()),
            Some("hunter2".into()),
            Some("different".into()),
        );
        let stolen = headers(header::COOKIE, &format!("{ADMIN_COOKIE}={token}"));
        assert!(other.authorize(&stolen).is_err());
        assert!(other.authorize(&headers(header::COOKIE, "admin_session=zz")).is_err());
    }

    #[test]
    fn basic_credentials_and_challenge() {
        let auth = auth(AuthMode::Basic);
        let good = STANDARD.encode("researcher:hunter2");
        assert!(
            auth.authorize(&headers(header::AUTHORIZATION, &format!("Basic {good}")))
                .is_ok()
        );

        let bad = STANDARD.encode("researcher:wrong");
        let err = auth
            .authorize(&headers(header::AUTHORIZATION, &format!("Basic {bad}")))
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { challenge: true }));

        let err = auth
            .authorize(&headers(header::AUTHORIZATION, "Basic !!!"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { challenge: true }));
    }

    #[test]
    fn cookie_mode_rejects_without_challenge() {
        let err = auth(AuthMode::Cookie).authorize(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { challenge: false }));
    }

    #[test]
    fn cookies_carry_the_expected_attributes() {
        let auth = auth(AuthMode::Cookie);
        let cookie = auth.login_cookie("abc");
        assert!(cookie.starts_with("admin_session=abc;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(auth.logout_cookie().contains("Max-Age=0"));
    }
}
