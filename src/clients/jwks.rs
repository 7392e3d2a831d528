//! JWKS fetching and caching for federated-token verification.

use std::collections::HashMap;

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::identity::IdpError;

/// A single JSON Web Key from the provider's JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: Option<String>,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url).
    pub n: Option<String>,
    /// RSA exponent (base64url).
    pub e: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

/// Cache of the provider's verification keys, keyed by `kid`.
///
/// Refreshed once per lookup miss. A fetch failure fails the current
/// verification; there is no retry and no stale-cache fallback, so an
/// outage at the provider never turns into amplified fetch load.
pub struct JwksCache {
    jwks_url: String,
    client: reqwest::Client,
    keys: RwLock<HashMap<String, DecodingKey>>,
}

impl JwksCache {
    #[must_use]
    pub fn new(jwks_url: String, client: reqwest::Client) -> Self {
        Self {
            jwks_url,
            client,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Get the decoding key for a `kid`, fetching the JWKS document on a
    /// cache miss. `None` selects the sole cached key, if there is one.
    pub async fn get_key(&self, kid: Option<&str>) -> Result<DecodingKey, IdpError> {
        if let Some(key) = self.get_cached(kid).await {
            return Ok(key);
        }

        self.refresh().await?;

        self.get_cached(kid).await.ok_or_else(|| {
            IdpError::Jwks(match kid {
                Some(k) => format!("No verification key with kid {k}"),
                None => "No verification keys available".to_string(),
            })
        })
    }

    async fn get_cached(&self, kid: Option<&str>) -> Option<DecodingKey> {
        let keys = self.keys.read().await;
        match kid {
            Some(k) => keys.get(k).cloned(),
            None => keys.values().next().cloned(),
        }
    }

    async fn refresh(&self) -> Result<(), IdpError> {
        debug!("Fetching JWKS from {}", self.jwks_url);

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| IdpError::Jwks(format!("JWKS fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IdpError::Jwks(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let document: JwksDocument = response
            .json()
            .await
            .map_err(|e| IdpError::Jwks(format!("Invalid JWKS document: {e}")))?;

        let new_keys = parse_keys(&document);
        if new_keys.is_empty() {
            return Err(IdpError::Jwks("No usable keys in JWKS document".to_string()));
        }

        *self.keys.write().await = new_keys;
        Ok(())
    }
}

fn parse_keys(document: &JwksDocument) -> HashMap<String, DecodingKey> {
    let mut keys = HashMap::new();

    for jwk in &document.keys {
        if jwk.kty != "RSA" || jwk.key_use.as_deref() == Some("enc") {
            continue;
        }

        let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
            warn!("Skipping JWK without RSA components");
            continue;
        };

        match DecodingKey::from_rsa_components(n, e) {
            Ok(key) => {
                let kid = jwk.kid.clone().unwrap_or_else(|| "default".to_string());
                keys.insert(kid, key);
            }
            Err(e) => warn!("Failed to parse JWK: {e}"),
        }
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rsa_signature_keys_and_skips_others() {
        let json = r#"{
            "keys": [
                {
                    "kty": "RSA",
                    "kid": "key-1",
                    "use": "sig",
                    "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
                    "e": "AQAB"
                },
                { "kty": "EC", "kid": "key-2" },
                { "kty": "RSA", "kid": "key-3", "use": "enc", "n": "AQAB", "e": "AQAB" }
            ]
        }"#;

        let document: JwksDocument = serde_json::from_str(json).unwrap();
        let keys = parse_keys(&document);

        assert_eq!(keys.len(), 1);
        assert!(keys.contains_key("key-1"));
    }

    #[test]
    fn jwk_without_components_is_skipped() {
        let json = r#"{ "keys": [ { "kty": "RSA", "kid": "bare" } ] }"#;
        let document: JwksDocument = serde_json::from_str(json).unwrap();
        assert!(parse_keys(&document).is_empty());
    }
}
