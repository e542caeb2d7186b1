//! OAuth 2.0 management for TikTok API authentication.
//!
//! This module encapsulates all OAuth-related operations for authenticating with the TikTok
//! open API, including authorization URL construction (with PKCE for desktop apps), the
//! authorization-code exchange, and token refresh.
//!
//! TikTok deviates from stock OAuth 2.0 in two ways that shape this module:
//!
//! 1. The client identifier parameter is named `client_key`, not `client_id`.
//! 2. Desktop (loopback-redirect) apps must send a PKCE challenge that is the
//!    *hex*-encoded SHA-256 of the verifier, not the base64url encoding from RFC 7636.
//!
//! The authorization URL is therefore assembled by hand, while the token exchange and
//! refresh still go through the [`oauth2`] crate, which accepts the extra form parameters.

use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use oauth2::basic::{
    BasicErrorResponse, BasicErrorResponseType, BasicRevocationErrorResponse,
    BasicTokenIntrospectionResponse, BasicTokenType,
};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
    ExtraTokenFields, RedirectUrl, RequestTokenError, StandardRevocableToken,
    StandardTokenResponse, TokenUrl, reqwest,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

/// TikTok authorization endpoint presented to the user's browser.
pub const AUTHORIZE_URL: &str = "https://www.tiktok.com/v2/auth/authorize/";

/// TikTok token endpoint used for both the code exchange and token refresh.
pub const TOKEN_URL: &str = "https://open.tiktokapis.com/v2/oauth/token/";

/// Redirect target assumed when the configuration does not name one.
pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:8080/oauth/redirect";

/// How long before actual expiry an access token is treated as expired.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Characters a PKCE code verifier may contain (RFC 7636 unreserved set).
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Length of generated code verifiers.
const VERIFIER_LEN: usize = 50;

/// Page shown in the user's browser once the authorization redirect has been consumed.
const OAUTH_DONE_HTML: &str = "<!DOCTYPE html>\
<html><body><h1>Authorization complete</h1>\
<p>You can close this window and return to the application.</p></body></html>";

/// Token fields TikTok returns alongside the standard OAuth 2.0 set.
///
/// `open_id` identifies the authorizing user and is also what the user-info endpoint
/// reports; keeping it on the token lets callers associate persisted tokens with users
/// without an extra API call.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TikTokTokenFields {
    /// TikTok's stable identifier for the authorizing user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_id: Option<String>,
    /// Lifetime of the refresh token itself, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<u64>,
    /// Server-side request correlation id, useful when reporting API issues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,
}

impl ExtraTokenFields for TikTokTokenFields {}

/// An OAuth 2.0 token as issued by TikTok's token endpoint.
pub type TikTokTokenResponse = StandardTokenResponse<TikTokTokenFields, BasicTokenType>;

/// The [`oauth2`] client type used for the code exchange and refresh grants.
type OAuthClient = oauth2::Client<
    BasicErrorResponse,
    TikTokTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Configuration for an [`OAuthManager`].
///
/// Immutable after construction. `client_key` must be non-empty; everything else has a
/// default.
#[derive(Debug, Clone, Default)]
pub struct OAuthConfig {
    /// The application's client key (TikTok's name for the OAuth client id).
    pub client_key: String,
    /// The application's client secret.
    pub client_secret: String,
    /// Redirect URL registered for the application.
    ///
    /// Defaults to [`DEFAULT_REDIRECT_URL`]. A loopback host (`localhost` or
    /// `127.0.0.1`) marks the application as a desktop app and enables PKCE.
    pub redirect_url: Option<String>,
    /// How long before actual expiry an access token is treated as expired.
    ///
    /// Defaults to [`DEFAULT_REFRESH_MARGIN`].
    pub refresh_margin: Option<Duration>,
}

/// Pending PKCE code verifiers, keyed by the `state` value embedded in the
/// authorization URL that created them.
///
/// Entries are write-once: inserted when an authorization URL is built and removed the
/// first time the state is redeemed, whether or not the subsequent exchange succeeds.
/// The map is mutex-guarded so concurrent authorization attempts and callback handling
/// on a shared manager need no external synchronization.
#[derive(Debug, Default)]
struct VerifierStore {
    inner: Mutex<HashMap<String, String>>,
}

impl VerifierStore {
    fn insert(&self, state: &str, verifier: &str) {
        self.inner
            .lock()
            .expect("verifier store lock poisoned")
            .insert(state.to_owned(), verifier.to_owned());
    }

    /// Removes and returns the verifier stored under `state`, if any.
    fn take(&self, state: &str) -> Option<String> {
        self.inner
            .lock()
            .expect("verifier store lock poisoned")
            .remove(state)
    }
}

/// Manages OAuth 2.0 authentication flows for TikTok API access.
///
/// The manager owns the OAuth client configuration and the store of pending PKCE
/// verifiers, and provides a consistent interface for building authorization URLs,
/// exchanging authorization codes, and refreshing tokens. It is typically shared
/// behind an [`std::sync::Arc`] with the API client so both can drive token refresh.
#[derive(Debug)]
pub struct OAuthManager {
    client_key: String,
    client_secret: String,
    redirect_url: RedirectUrl,
    refresh_margin: Duration,
    is_desktop: bool,
    verifiers: VerifierStore,
}

impl OAuthManager {
    /// Creates a new OAuth manager from the given configuration.
    ///
    /// # Errors
    ///
    /// Fails if `client_key` is empty or the configured redirect URL does not parse.
    pub fn new(config: OAuthConfig) -> eyre::Result<Self> {
        eyre::ensure!(!config.client_key.is_empty(), "client key not provided");

        let redirect = config
            .redirect_url
            .unwrap_or_else(|| DEFAULT_REDIRECT_URL.to_string());
        let redirect_url = RedirectUrl::new(redirect).context("parse redirect URL")?;
        let is_desktop = matches!(
            redirect_url.url().host_str(),
            Some("localhost") | Some("127.0.0.1")
        );

        Ok(Self {
            client_key: config.client_key,
            client_secret: config.client_secret,
            redirect_url,
            refresh_margin: config.refresh_margin.unwrap_or(DEFAULT_REFRESH_MARGIN),
            is_desktop,
            verifiers: VerifierStore::default(),
        })
    }

    /// How long before actual expiry an access token should be treated as expired.
    pub fn refresh_margin(&self) -> Duration {
        self.refresh_margin
    }

    /// Whether the configured redirect URL points at a loopback address.
    ///
    /// Loopback redirects mark a desktop/native application, which must use PKCE.
    pub fn is_desktop(&self) -> bool {
        self.is_desktop
    }

    /// Builds the authorization URL the user's browser should be sent to.
    ///
    /// The URL carries `client_key`, `redirect_uri`, `response_type=code`, the given
    /// `scope` (comma-separated scope names, per TikTok), and a freshly generated
    /// `state` value (a time-ordered UUID) that correlates the eventual callback with
    /// this request.
    ///
    /// For desktop applications a 50-character code verifier is generated and stored
    /// under the state, and `code_challenge` (the hex-encoded SHA-256 of the verifier)
    /// plus `code_challenge_method=S256` are appended. The verifier stays in the store
    /// until [`Self::exchange_code`] redeems the state.
    ///
    /// This method does not fail: a malformed scope merely produces an odd-looking URL.
    pub fn authorize_url(&self, scope: &str) -> String {
        self.authorize_url_with_state(scope).0
    }

    /// [`Self::authorize_url`], additionally returning the embedded state value so the
    /// caller can match the callback against it.
    pub fn authorize_url_with_state(&self, scope: &str) -> (String, String) {
        let state = Uuid::now_v7().to_string();

        let mut url = Url::parse(AUTHORIZE_URL).expect("authorization endpoint URL is valid");
        url.query_pairs_mut()
            .append_pair("client_key", &self.client_key)
            .append_pair("redirect_uri", self.redirect_url.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", scope)
            .append_pair("state", &state);

        if self.is_desktop {
            let verifier = generate_code_verifier();
            self.verifiers.insert(&state, &verifier);

            let challenge = hex::encode(Sha256::digest(verifier.as_bytes()));
            url.query_pairs_mut()
                .append_pair("code_challenge", &challenge)
                .append_pair("code_challenge_method", "S256");
        }

        (String::from(url), state)
    }

    /// Exchanges an authorization code from the redirect callback for a token.
    ///
    /// If a code verifier is stored under `state`, it is removed from the store and
    /// attached to the exchange as the `code_verifier` form parameter. Removal happens
    /// on lookup, before the exchange runs, so a failed exchange never leaves a
    /// dangling verifier behind. A missing verifier is not an error: non-desktop
    /// flows never store one.
    ///
    /// # Errors
    ///
    /// Surfaces the token endpoint's failure. When TikTok returns an error body, its
    /// `error_description` replaces the generic transport message.
    pub async fn exchange_code(&self, code: &str, state: &str) -> eyre::Result<TikTokTokenResponse> {
        let client = self.oauth_client();
        let http_client = reqwest::ClientBuilder::new()
            // the token endpoint should never redirect us anywhere
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("building reqwest client should not fail");

        let mut request = client
            .exchange_code(AuthorizationCode::new(code.to_owned()))
            .add_extra_param("client_key", self.client_key.clone());
        if let Some(verifier) = self.verifiers.take(state) {
            tracing::debug!("attaching stored PKCE verifier to token exchange");
            request = request.add_extra_param("code_verifier", verifier);
        }

        match request.request_async(&http_client).await {
            Ok(token) => Ok(token),
            Err(RequestTokenError::ServerResponse(response)) => {
                let message = match response.error_description() {
                    Some(description) => description.clone(),
                    None => format!("{:?}", response.error()),
                };
                Err(eyre::eyre!("token exchange rejected: {message}"))
            }
            Err(e) => Err(e).context("exchange authorization code for access token"),
        }
    }

    /// Attempts to refresh an existing token using its refresh token.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(new_token))` - Refresh succeeded, new token is available
    /// * `Ok(None)` - No refresh token available, or the grant was rejected as invalid
    /// * `Err(_)` - Network or other error occurred during the refresh attempt
    ///
    /// When refresh yields `Ok(None)`, the token should be considered dead and the user
    /// sent back through [`Self::authenticate`] (or an externally driven redirect flow).
    pub async fn refresh_token(
        &self,
        token: &TikTokTokenResponse,
    ) -> eyre::Result<Option<TikTokTokenResponse>> {
        use oauth2::TokenResponse;

        let Some(refresh_token) = token.refresh_token() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        tracing::debug!("attempting to refresh OAuth token");

        let client = self.oauth_client();
        let http_client = reqwest::ClientBuilder::new()
            // the token endpoint should never redirect us anywhere
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("building reqwest client should not fail");

        match client
            .exchange_refresh_token(refresh_token)
            .add_extra_param("client_key", self.client_key.clone())
            .request_async(&http_client)
            .await
        {
            Ok(new_token) => {
                tracing::debug!("successfully refreshed OAuth token");
                Ok(Some(new_token))
            }
            Err(ref e @ RequestTokenError::ServerResponse(ref sr))
                if matches!(sr.error(), BasicErrorResponseType::InvalidGrant) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }

    /// Performs a complete desktop OAuth 2.0 authorization flow.
    ///
    /// This composes the other operations on this type:
    /// 1. Builds an authorization URL (with PKCE, since desktop flows require it)
    /// 2. Starts a one-shot HTTP server on the configured loopback redirect address
    /// 3. Opens the user's browser at the authorization URL
    /// 4. Waits for the callback and exchanges the authorization code for a token
    ///
    /// # Errors
    ///
    /// Fails if the configured redirect URL is not a loopback address, if the callback
    /// listener cannot be bound, or if any step of the flow fails.
    pub async fn authenticate(&self, scope: &str) -> eyre::Result<TikTokTokenResponse> {
        eyre::ensure!(
            self.is_desktop,
            "interactive authentication requires a loopback redirect URL"
        );

        let (auth_url, state) = self.authorize_url_with_state(scope);
        let eventually_authorization_code = self
            .wait_for_callback(state.clone())
            .await
            .context("set up redirect endpoint")?;

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        webbrowser::open(&auth_url).context("open user's browser")?;
        let code = eventually_authorization_code
            .await
            .context("await user authorization code")?;

        self.exchange_code(&code, &state).await
    }

    /// Sets up a one-shot HTTP server to receive the OAuth authorization callback.
    ///
    /// The server binds the host and port of the configured redirect URL, accepts a
    /// single connection, validates that the presented `state` matches
    /// `expected_state`, and extracts the `code` query parameter from the callback.
    ///
    /// # Returns
    ///
    /// A future that resolves to the authorization code once the callback arrives.
    async fn wait_for_callback(
        &self,
        expected_state: String,
    ) -> eyre::Result<impl Future<Output = eyre::Result<String>>> {
        let url = self.redirect_url.url();
        let host = url.host_str().unwrap_or("127.0.0.1").to_string();
        let port = url.port_or_known_default().unwrap_or(80);
        let socket = tokio::net::TcpListener::bind((host.as_str(), port))
            .await
            .with_context(|| format!("bind callback listener on {host}:{port}"))?;

        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let r = async move {
                let (conn, _) = socket.accept().await.context("accept")?;
                let conn = hyper_util::rt::TokioIo::new(conn);
                let (got, mut gotten) = tokio::sync::mpsc::channel(1);
                let service = service_fn(move |req: Request<body::Incoming>| {
                    let expected_state = expected_state.clone();
                    let got = got.clone();
                    async move {
                        let mut presented_state = None;
                        let mut presented_code = None;
                        for (k, v) in
                            form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
                        {
                            match &*k {
                                "state" => presented_state = Some(v),
                                "code" => presented_code = Some(v),
                                _ => {}
                            }
                        }
                        if presented_state.as_deref() != Some(expected_state.as_str()) {
                            return Err("state does not match the authorization request");
                        }
                        let Some(code) = presented_code else {
                            return Err("no authorization code found");
                        };
                        got.send(code.into_owned())
                            .await
                            .expect("channel won't be closed until server exit");
                        Ok(Response::new(Full::<Bytes>::from(OAUTH_DONE_HTML)))
                    }
                });
                let mut serve = std::pin::pin!(
                    hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
                );

                tokio::select! {
                    exit = &mut serve => {
                        if let Err(e) = exit {
                            Err(e).context("redirect server got bad request")
                        } else {
                            eyre::bail!("redirect server exit prematurely");
                        }
                    }
                    code = gotten.recv() => {
                        serve.graceful_shutdown();
                        let code = code.expect("channel won't be closed until service_fn is dropped");
                        Ok(code)
                    }
                }
            };
            let _ = tx.send(r.await);
        });
        Ok(async move { rx.await.context("redirect future dropped prematurely")? })
    }

    /// Builds the [`oauth2`] client used for token endpoint calls.
    ///
    /// `AuthType::RequestBody` puts the client credentials in the form body, where
    /// TikTok expects them. The crate still names the id field `client_id`; the
    /// `client_key` spelling TikTok reads is added per-request as an extra parameter.
    fn oauth_client(&self) -> OAuthClient {
        oauth2::Client::new(ClientId::new(self.client_key.clone()))
            .set_client_secret(ClientSecret::new(self.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(AUTHORIZE_URL.to_string()).expect("Invalid authorization endpoint URL"),
            )
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string()).expect("Invalid token endpoint URL"))
            .set_redirect_uri(self.redirect_url.clone())
            .set_auth_type(AuthType::RequestBody)
    }
}

/// Generates a random PKCE code verifier.
///
/// 50 characters drawn from the RFC 7636 unreserved set.
fn generate_code_verifier() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    (0..VERIFIER_LEN)
        .map(|_| VERIFIER_CHARSET[rng.random_range(0..VERIFIER_CHARSET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop_manager() -> OAuthManager {
        OAuthManager::new(OAuthConfig {
            client_key: "test-client-key".into(),
            client_secret: "test-client-secret".into(),
            ..Default::default()
        })
        .unwrap()
    }

    fn query_map(url: &str) -> HashMap<String, String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn missing_client_key_is_a_construction_error() {
        let err = OAuthManager::new(OAuthConfig::default()).unwrap_err();
        assert!(err.to_string().contains("client key"));
    }

    #[test]
    fn authorize_url_carries_standard_parameters() {
        let manager = desktop_manager();
        let url = manager.authorize_url("user.info.basic,video.list");
        let params = query_map(&url);

        assert!(url.starts_with(AUTHORIZE_URL));
        assert_eq!(params["client_key"], "test-client-key");
        assert_eq!(params["redirect_uri"], DEFAULT_REDIRECT_URL);
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "user.info.basic,video.list");
        assert!(!params["state"].is_empty());
    }

    #[test]
    fn loopback_redirect_gets_hex_sha256_pkce_challenge() {
        let manager = desktop_manager();
        let url = manager.authorize_url("user.info.basic");
        let params = query_map(&url);

        assert_eq!(params["code_challenge_method"], "S256");

        let verifier = manager
            .verifiers
            .take(&params["state"])
            .expect("verifier stored under the embedded state");
        assert_eq!(
            params["code_challenge"],
            hex::encode(Sha256::digest(verifier.as_bytes()))
        );
    }

    #[test]
    fn explicit_ipv4_loopback_also_counts_as_desktop() {
        let manager = OAuthManager::new(OAuthConfig {
            client_key: "k".into(),
            client_secret: "s".into(),
            redirect_url: Some("http://127.0.0.1:9090/callback".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(manager.is_desktop());

        let params = query_map(&manager.authorize_url("user.info.basic"));
        assert!(params.contains_key("code_challenge"));
    }

    #[test]
    fn remote_redirect_gets_no_challenge_and_stores_nothing() {
        let manager = OAuthManager::new(OAuthConfig {
            client_key: "k".into(),
            client_secret: "s".into(),
            redirect_url: Some("https://example.com/oauth/callback".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(!manager.is_desktop());

        let params = query_map(&manager.authorize_url("user.info.basic"));
        assert!(!params.contains_key("code_challenge"));
        assert!(!params.contains_key("code_challenge_method"));
        assert_eq!(manager.verifiers.take(&params["state"]), None);
    }

    #[test]
    fn verifier_is_consumed_on_first_redemption() {
        let manager = desktop_manager();
        let params = query_map(&manager.authorize_url("user.info.basic"));
        let state = &params["state"];

        assert!(manager.verifiers.take(state).is_some());
        // second redemption of the same state finds nothing
        assert_eq!(manager.verifiers.take(state), None);
    }

    #[test]
    fn each_authorization_attempt_gets_its_own_state() {
        let manager = desktop_manager();
        let first = query_map(&manager.authorize_url("user.info.basic"));
        let second = query_map(&manager.authorize_url("user.info.basic"));
        assert_ne!(first["state"], second["state"]);
    }

    #[test]
    fn generated_verifiers_use_the_unreserved_charset() {
        let verifier = generate_code_verifier();
        assert_eq!(verifier.len(), VERIFIER_LEN);
        assert!(
            verifier
                .bytes()
                .all(|b| VERIFIER_CHARSET.contains(&b))
        );
    }

    #[test]
    fn verifiers_are_unique() {
        assert_ne!(generate_code_verifier(), generate_code_verifier());
    }
}
