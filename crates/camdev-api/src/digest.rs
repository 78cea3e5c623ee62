// HTTP Digest authentication (RFC 2617, MD5, qop=auth)
//
// Wraps a `reqwest::Client`. The first request goes out unauthenticated;
// a 401 challenge is parsed, and the request is replayed exactly once with
// a computed `Authorization` header. Later requests reuse the challenge
// preemptively with an incremented nonce-count.

use std::sync::{Mutex, PoisonError};

use digest_auth::{AuthContext, HttpMethod, WwwAuthenticateHeader};
use rand::RngCore;
use reqwest::header::{AUTHORIZATION, HeaderValue, WWW_AUTHENTICATE};
use reqwest::{Method, Request, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;

use crate::error::Error;

/// Parse a `WWW-Authenticate` header value. `None` unless it is a Digest
/// challenge carrying a nonce.
pub fn parse_challenge(header: &str) -> Option<WwwAuthenticateHeader> {
    digest_auth::parse(header.trim())
        .ok()
        .filter(|c| !c.nonce.is_empty())
}

/// Per-client Digest state: the last challenge, whose `nc` field is the
/// nonce-count of the last authenticated request.
#[derive(Default)]
struct DigestState {
    challenge: Option<WwwAuthenticateHeader>,
}

/// HTTP client that authenticates requests with Digest auth.
///
/// Each camera client owns its own instance. The challenge and nonce-count
/// live behind a mutex, so concurrent requests through one instance still
/// get distinct nonce-counts.
pub struct DigestClient {
    http: reqwest::Client,
    username: String,
    password: SecretString,
    state: Mutex<DigestState>,
}

impl DigestClient {
    pub fn new(http: reqwest::Client, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            http,
            username: username.into(),
            password,
            state: Mutex::new(DigestState::default()),
        }
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The number of authenticated requests issued against the current nonce.
    pub fn nonce_count(&self) -> u32 {
        self.lock_state().challenge.as_ref().map_or(0, |c| c.nc)
    }

    /// Send a GET request to `url`.
    pub async fn get(&self, url: Url) -> Result<Response, Error> {
        let request = self.http.request(Method::GET, url).build()?;
        self.execute(request).await
    }

    /// Send `request`, answering a single Digest challenge if one comes back.
    ///
    /// A second 401 is returned to the caller untouched.
    pub async fn execute(&self, request: Request) -> Result<Response, Error> {
        let replay = request.try_clone();
        let mut request = request;

        if let Some(value) = self.next_authorization(request.method(), request.url())? {
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let resp = self.http.execute(request).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        let Some(challenge) = resp
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_challenge)
        else {
            return Ok(resp);
        };
        // The 401 body is never read.
        drop(resp);

        let Some(mut replay) = replay else {
            return Err(Error::Authentication {
                message: "request body cannot be replayed for digest auth".into(),
            });
        };

        debug!(realm = %challenge.realm, url = %replay.url(), "answering digest challenge");
        {
            let mut state = self.lock_state();
            let mut challenge = challenge;
            // A fresh nonce restarts the count; a repeated one continues it.
            if let Some(previous) = state.challenge.as_ref().filter(|c| c.nonce == challenge.nonce) {
                challenge.nc = previous.nc;
            }
            state.challenge = Some(challenge);
        }

        if let Some(value) = self.next_authorization(replay.method(), replay.url())? {
            replay.headers_mut().insert(AUTHORIZATION, value);
        }

        Ok(self.http.execute(replay).await?)
    }

    /// Build the next `Authorization` header, bumping the nonce-count.
    fn next_authorization(&self, method: &Method, url: &Url) -> Result<Option<HeaderValue>, Error> {
        let uri = request_uri(url);
        let mut context = AuthContext::new_with_method(
            self.username.as_str(),
            self.password.expose_secret(),
            uri.as_str(),
            None::<&[u8]>,
            HttpMethod::from(method.as_str()),
        );
        context.set_custom_cnonce(new_cnonce());

        let mut state = self.lock_state();
        let Some(challenge) = state.challenge.as_mut() else {
            return Ok(None);
        };
        let header = challenge
            .respond(&context)
            .map_err(|e| Error::Authentication {
                message: format!("cannot answer digest challenge: {e}"),
            })?
            .to_header_string();
        drop(state);

        HeaderValue::from_str(&header)
            .map(Some)
            .map_err(|e| Error::Authentication {
                message: format!("invalid authorization header: {e}"),
            })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, DigestState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Path plus query, the `digest-uri` of RFC 2617.
fn request_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_owned(),
    }
}

/// 8 random bytes, hex-encoded.
fn new_cnonce() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
