//! Stream Authentication
//!
//! Signs streaming requests with OAuth 1.0a (HMAC-SHA1). The streaming
//! endpoint requires an `Authorization` header computed over the HTTP
//! method, the target URL and every form parameter of the request.
//!
//! # Signing Flow
//!
//! 1. Collect `oauth_*` protocol parameters, the request's form parameters
//!    and any query parameters of the target URL
//! 2. Percent-encode keys and values (RFC 3986), sort, join as `k=v&...`
//! 3. Signature base: `METHOD&enc(base_url)&enc(parameter_string)`
//! 4. Key: `enc(consumer_secret)&enc(token_secret)`
//! 5. Signature: base64(HMAC-SHA1(key, base))
//!
//! # References
//!
//! - [RFC 5849](https://www.rfc-editor.org/rfc/rfc5849)

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use rand::distr::Alphanumeric;
use sha1::Sha1;
use thiserror::Error;
use url::Url;

// =============================================================================
// Constants
// =============================================================================

/// Characters left unescaped by OAuth: RFC 3986 unreserved set.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Length of the random nonce sent with each request.
const NONCE_LEN: usize = 32;

const SIGNATURE_METHOD: &str = "HMAC-SHA1";
const OAUTH_VERSION: &str = "1.0";

type HmacSha1 = Hmac<Sha1>;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while building credentials or signing.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// A credential value is empty.
    #[error("credential {0} cannot be empty")]
    EmptyCredential(&'static str),

    /// The signing key was rejected by the MAC.
    #[error("failed to initialise request signer")]
    Signer,
}

// =============================================================================
// Credentials
// =============================================================================

/// Long-lived OAuth credentials: consumer key pair and access token pair.
///
/// The `Debug` implementation redacts both secrets.
#[derive(Clone)]
pub struct OAuthCredentials {
    consumer_key: String,
    consumer_secret: String,
    access_token: String,
    access_secret: String,
}

impl OAuthCredentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the four values is empty.
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_secret: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let creds = Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token: access_token.into(),
            access_secret: access_secret.into(),
        };

        for (name, value) in [
            ("consumer key", &creds.consumer_key),
            ("consumer secret", &creds.consumer_secret),
            ("access token", &creds.access_token),
            ("access secret", &creds.access_secret),
        ] {
            if value.is_empty() {
                return Err(AuthError::EmptyCredential(name));
            }
        }

        Ok(creds)
    }

    /// The consumer (application) key.
    #[must_use]
    pub fn consumer_key(&self) -> &str {
        &self.consumer_key
    }

    /// The access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"[REDACTED]")
            .field("access_token", &self.access_token)
            .field("access_secret", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Authenticator
// =============================================================================

/// Produces signed `Authorization` headers for streaming requests.
///
/// Built once at startup from validated credentials.
#[derive(Debug, Clone)]
pub struct StreamAuthenticator {
    credentials: OAuthCredentials,
}

impl StreamAuthenticator {
    /// Create an authenticator for the given credentials.
    #[must_use]
    pub const fn new(credentials: OAuthCredentials) -> Self {
        Self { credentials }
    }

    /// Credentials used for signing.
    #[must_use]
    pub const fn credentials(&self) -> &OAuthCredentials {
        &self.credentials
    }

    /// Build the `Authorization` header for a request, with a fresh nonce
    /// and the current timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the signer cannot be initialised.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &Url,
        params: &[(&str, &str)],
    ) -> Result<String, AuthError> {
        let nonce = generate_nonce();
        let timestamp = chrono::Utc::now().timestamp();
        self.authorization_header_with(method, url, params, &nonce, timestamp)
    }

    /// Build the `Authorization` header with an explicit nonce and timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the signer cannot be initialised.
    pub fn authorization_header_with(
        &self,
        method: &str,
        url: &Url,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: i64,
    ) -> Result<String, AuthError> {
        let timestamp = timestamp.to_string();
        let signature = self.signature(method, url, params, nonce, &timestamp)?;

        let mut header_params = self.protocol_params(nonce, &timestamp);
        header_params.push(("oauth_signature", signature.as_str()));
        header_params.sort_unstable();

        let fields = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {fields}"))
    }

    /// Compute the base64 HMAC-SHA1 signature of a request.
    ///
    /// # Errors
    ///
    /// Returns an error if the signer cannot be initialised.
    pub fn signature(
        &self,
        method: &str,
        url: &Url,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, AuthError> {
        let base = self.signature_base(method, url, params, nonce, timestamp);
        let key = format!(
            "{}&{}",
            encode(&self.credentials.consumer_secret),
            encode(&self.credentials.access_secret)
        );

        let mut mac = HmacSha1::new_from_slice(key.as_bytes()).map_err(|_| AuthError::Signer)?;
        mac.update(base.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    fn signature_base(
        &self,
        method: &str,
        url: &Url,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let mut base_url = url.clone();
        base_url.set_query(None);
        base_url.set_fragment(None);

        let mut encoded: Vec<(String, String)> = self
            .protocol_params(nonce, timestamp)
            .into_iter()
            .chain(params.iter().copied())
            .map(|(k, v)| (encode(k), encode(v)))
            .chain(url.query_pairs().map(|(k, v)| (encode(&k), encode(&v))))
            .collect();
        encoded.sort_unstable();

        let parameter_string = encoded
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        format!(
            "{}&{}&{}",
            method.to_ascii_uppercase(),
            encode(base_url.as_str()),
            encode(&parameter_string)
        )
    }

    fn protocol_params<'a>(&'a self, nonce: &'a str, timestamp: &'a str) -> Vec<(&'a str, &'a str)> {
        vec![
            ("oauth_consumer_key", self.credentials.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", SIGNATURE_METHOD),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.credentials.access_token.as_str()),
            ("oauth_version", OAUTH_VERSION),
        ]
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

fn generate_nonce() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Published example from the Twitter API documentation.
    fn doc_authenticator() -> StreamAuthenticator {
        StreamAuthenticator::new(
            OAuthCredentials::new(
                "xvz1evFS4wEEPTGEFPHBog",
                "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
                "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
                "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
            )
            .unwrap(),
        )
    }

    const DOC_NONCE: &str = "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg";
    const DOC_TIMESTAMP: i64 = 1_318_622_958;

    fn doc_url() -> Url {
        Url::parse("https://api.twitter.com/1.1/statuses/update.json?include_entities=true")
            .unwrap()
    }

    #[test]
    fn signature_matches_documented_example() {
        let auth = doc_authenticator();
        let signature = auth
            .signature(
                "POST",
                &doc_url(),
                &[("status", "Hello Ladies + Gentlemen, a signed OAuth request!")],
                DOC_NONCE,
                &DOC_TIMESTAMP.to_string(),
            )
            .unwrap();

        assert_eq!(signature, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn header_contains_encoded_signature() {
        let auth = doc_authenticator();
        let header = auth
            .authorization_header_with(
                "POST",
                &doc_url(),
                &[("status", "Hello Ladies + Gentlemen, a signed OAuth request!")],
                DOC_NONCE,
                DOC_TIMESTAMP,
            )
            .unwrap();

        assert!(header.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\", "));
        assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(header.contains("oauth_timestamp=\"1318622958\""));
        assert!(header.ends_with("oauth_version=\"1.0\""));
        assert!(!header.contains("status"));
    }

    #[test]
    fn fresh_headers_use_distinct_nonces() {
        let auth = doc_authenticator();
        let url = Url::parse("https://stream.twitter.com/1.1/statuses/filter.json").unwrap();
        let a = auth.authorization_header("POST", &url, &[("track", "a")]).unwrap();
        let b = auth.authorization_header("POST", &url, &[("track", "a")]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn nonce_is_alphanumeric() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_LEN);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn encode_leaves_unreserved_characters() {
        assert_eq!(encode("a-b.c_d~e"), "a-b.c_d~e");
        assert_eq!(encode("rust,go"), "rust%2Cgo");
        assert_eq!(encode("a b+c"), "a%20b%2Bc");
    }

    #[test]
    fn empty_credential_is_rejected() {
        let err = OAuthCredentials::new("key", "", "token", "secret").unwrap_err();
        assert!(matches!(err, AuthError::EmptyCredential("consumer secret")));
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = OAuthCredentials::new("key", "csecret", "token", "asecret").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("csecret"));
        assert!(!debug.contains("asecret"));
    }
}
