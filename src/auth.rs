use crate::common::error::SyncError;
use crate::common::strava_client::{OAuthTokenRequest, OAuthTokenResponse, StravaClient};
use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};

pub const DEFAULT_PORT: u16 = 8080;
const SCOPE_READ_WRITE: &str = "activity:read_all,activity:write";
const SCOPE_READ_ONLY: &str = "activity:read_all";
const DONE_MESSAGE: &str = "You can now close this window.";

#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub client_id: String,
    pub client_secret: String,
    pub port: u16,
    pub read_only: bool,
}

impl AuthOptions {
    pub fn scope(&self) -> &'static str {
        if self.read_only {
            SCOPE_READ_ONLY
        } else {
            SCOPE_READ_WRITE
        }
    }

    /// Must match the address the redirect listener is bound to.
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }
}

/// A random value echoed back by the authorization server.
pub fn new_state() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 16]>())
}

pub fn authorize_url(oauth_base: &str, options: &AuthOptions, state: &str) -> String {
    format!(
        "{oauth_base}/authorize?client_id={}&response_type=code&redirect_uri={}&approval_prompt=force&scope={}&state={}",
        urlencoding::encode(&options.client_id),
        urlencoding::encode(&options.redirect_uri()),
        urlencoding::encode(options.scope()),
        urlencoding::encode(state),
    )
}

/// Extracts the authorization code from the decoded redirect query.
pub fn check_redirect(
    params: &HashMap<String, String>,
    expected_state: &str,
) -> Result<String, SyncError> {
    if let Some(error) = params.get("error") {
        return Err(SyncError::Auth(format!("access was not granted: {error}")));
    }
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(SyncError::Auth(
            "state mismatch in redirect; restart the authorization".to_string(),
        ));
    }
    match params.get("code") {
        Some(code) if !code.is_empty() => Ok(code.clone()),
        _ => Err(SyncError::Auth("redirect did not include a code".to_string())),
    }
}

type CodeSender = oneshot::Sender<Result<String, SyncError>>;

#[derive(Clone)]
struct Redirect {
    state: Arc<str>,
    done: Arc<Mutex<Option<CodeSender>>>,
}

async fn receive(
    State(redirect): State<Redirect>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let result = check_redirect(&params, &redirect.state);
    let response = match &result {
        Ok(_) => (StatusCode::OK, DONE_MESSAGE.to_string()),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()),
    };

    let sender = redirect.done.lock().ok().and_then(|mut done| done.take());
    match sender {
        Some(sender) => {
            if sender.send(result).is_err() {
                debug!("redirect arrived after the listener stopped");
            }
        }
        None => debug!("ignoring repeated redirect"),
    }
    response
}

/// Serves the redirect route on `listener` until one redirect arrives, then
/// shuts down and returns its code.
pub async fn wait_for_code(listener: TcpListener, state: &str) -> Result<String, SyncError> {
    let (sender, receiver) = oneshot::channel();
    let app = Router::new().route("/", get(receive)).with_state(Redirect {
        state: state.into(),
        done: Arc::new(Mutex::new(Some(sender))),
    });

    let outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let result = receiver
                .await
                .unwrap_or_else(|_| Err(SyncError::Auth("redirect listener closed".to_string())));
            if let Ok(mut slot) = slot.lock() {
                *slot = Some(result);
            }
        })
        .await
        .map_err(|e| SyncError::Auth(format!("redirect listener failed: {e}")))?;

    let result = outcome.lock().ok().and_then(|mut outcome| outcome.take());
    result.unwrap_or_else(|| Err(SyncError::Auth("no redirect received".to_string())))
}

fn authorize_prompt(opened: bool, url: &str) -> String {
    if opened {
        format!("Opened your browser to authorize access. If it did not open, visit:\n\n{url}\n")
    } else {
        format!("Open this URL in your browser to authorize access:\n\n{url}\n")
    }
}

/// Runs the browser authorization flow and prints the resulting access token.
pub async fn authorize(client: &StravaClient, options: &AuthOptions) -> Result<OAuthTokenResponse> {
    let listener = TcpListener::bind(("127.0.0.1", options.port))
        .await
        .with_context(|| format!("failed to listen on port {}", options.port))?;

    let state = new_state();
    let url = authorize_url(&client.config().oauth_base, options, &state);
    let opened = open::that_detached(&url)
        .inspect_err(|e| debug!("failed to open browser: {e}"))
        .is_ok();
    println!("{}", authorize_prompt(opened, &url));
    info!(port = options.port, scope = options.scope(), "Waiting for authorization redirect");

    let code = wait_for_code(listener, &state).await?;
    let token = client
        .exchange_oauth_code(&OAuthTokenRequest {
            grant_type: "authorization_code".to_string(),
            code,
            client_id: options.client_id.clone(),
            client_secret: options.client_secret.clone(),
        })
        .await
        .context("failed to exchange authorization code")?;

    if let Some(athlete) = &token.athlete {
        println!(
            "Hello, {} {}!",
            athlete.firstname.as_deref().unwrap_or_default(),
            athlete.lastname.as_deref().unwrap_or_default()
        );
    }
    println!("Your Strava access token is: {}", token.access_token);
    Ok(token)
}
