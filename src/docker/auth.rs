// Per-registry credential lookup

use base64::{engine::general_purpose, Engine as _};
use bollard::auth::DockerCredentials;
use std::collections::HashMap;
use tracing::debug;

use super::reference::registry_host;

/// Registry host -> opaque auth string, loaded once at client construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthMapping {
    entries: HashMap<String, String>,
}

impl AuthMapping {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the auth string for the host part of `image`.
    ///
    /// The host is everything before the first `/`. Returns `None` when the
    /// mapping has no entry for it.
    pub fn get_auth(&self, image: &str) -> Option<&str> {
        let host = registry_host(image);
        self.entries.get(host).map(String::as_str)
    }

    /// Resolve engine credentials for `image`, or `None` for an anonymous call
    pub fn credentials_for(&self, image: &str) -> Option<DockerCredentials> {
        let host = registry_host(image);
        match self.get_auth(image) {
            Some(auth) => {
                debug!("Using configured credentials for registry: {}", host);
                Some(credentials_from_auth(host, auth))
            }
            None => {
                debug!("No credentials configured for registry: {}", host);
                None
            }
        }
    }
}

impl FromIterator<(String, String)> for AuthMapping {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Turn an opaque auth string into engine credentials.
///
/// Accepted forms, tried in order:
/// - base64 encoded JSON auth config (the `X-Registry-Auth` header format)
/// - base64 encoded `username:password` (the Docker `config.json` `auth` field)
/// - anything else is passed through as an identity token
pub fn credentials_from_auth(host: &str, auth: &str) -> DockerCredentials {
    let auth = auth.trim();

    if let Some(decoded) = decode_base64(auth) {
        if let Ok(mut credentials) = serde_json::from_slice::<DockerCredentials>(&decoded) {
            if credentials.serveraddress.is_none() {
                credentials.serveraddress = Some(host.to_string());
            }
            return credentials;
        }

        if let Ok(text) = String::from_utf8(decoded) {
            if let Some((username, password)) = text.split_once(':') {
                return DockerCredentials {
                    username: Some(username.to_string()),
                    password: Some(password.to_string()),
                    serveraddress: Some(host.to_string()),
                    ..Default::default()
                };
            }
        }
    }

    DockerCredentials {
        identitytoken: Some(auth.to_string()),
        serveraddress: Some(host.to_string()),
        ..Default::default()
    }
}

fn decode_base64(value: &str) -> Option<Vec<u8>> {
    general_purpose::STANDARD
        .decode(value)
        .or_else(|_| general_purpose::URL_SAFE.decode(value))
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(value))
        .ok()
}
