use std::collections::BTreeMap;

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use time::Duration;
use tower_cookies::cookie::{Cookie, CookieJar, SameSite};
use tower_cookies::Key;

pub const USER_SESSION_KEY: &str = "userId";

/// Key/value data carried inside the encrypted session cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    data: BTreeMap<String, String>,
}

impl Session {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn unset(&mut self, key: &str) {
        self.data.remove(key);
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.get(USER_SESSION_KEY)
    }
}

/// Cookie-backed session storage. The payload is encrypted and
/// authenticated with a key derived from the server secret, so a tampered
/// or foreign cookie simply decodes to an empty session.
#[derive(Clone)]
pub struct SessionStore {
    key: Key,
    cookie_name: String,
    secure: bool,
}

impl SessionStore {
    pub fn new(secret: &str, cookie_name: impl Into<String>, secure: bool) -> Self {
        // Key needs 64 bytes; stretch whatever the operator configured.
        let digest = Sha512::digest(secret.as_bytes());
        Self {
            key: Key::from(digest.as_slice()),
            cookie_name: cookie_name.into(),
            secure,
        }
    }

    pub fn get_session(&self, headers: &HeaderMap) -> Session {
        let Some(raw) = get_cookie_value(headers, &self.cookie_name) else {
            return Session::default();
        };

        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new(self.cookie_name.clone(), raw.to_string()));

        match jar.private(&self.key).get(&self.cookie_name) {
            Some(cookie) => serde_json::from_str(cookie.value()).unwrap_or_else(|e| {
                tracing::debug!("Discarding undecodable session payload: {}", e);
                Session::default()
            }),
            None => {
                tracing::debug!("Session cookie failed verification");
                Session::default()
            }
        }
    }

    /// Serialize and encrypt the session into a `Set-Cookie` value. Without
    /// `max_age` the cookie lasts for the browser session.
    pub fn commit_session(
        &self,
        session: &Session,
        max_age: Option<Duration>,
    ) -> Result<String, serde_json::Error> {
        let payload = serde_json::to_string(session)?;

        let mut builder = Cookie::build((self.cookie_name.clone(), payload))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .secure(self.secure);
        if let Some(max_age) = max_age {
            builder = builder.max_age(max_age);
        }

        let mut jar = CookieJar::new();
        jar.private_mut(&self.key).add(builder.build());

        Ok(jar
            .get(&self.cookie_name)
            .map(|cookie| cookie.to_string())
            .unwrap_or_default())
    }

    /// A `Set-Cookie` value that expires the session immediately.
    pub fn destroy_session(&self, _session: &Session) -> String {
        let mut cookie = Cookie::build((self.cookie_name.clone(), ""))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .secure(self.secure)
            .build();
        cookie.make_removal();
        cookie.to_string()
    }
}

pub fn get_cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val)
            } else {
                None
            }
        })
}
