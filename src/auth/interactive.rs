use async_trait::async_trait;
use axum::extract::{ Query, State };
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use azure_core::Url;
use azure_identity::authorization_code_flow::{ self, AuthorizationCodeFlow };
use chrono::Utc;
use log::{ info, warn, debug };
use oauth2::basic::BasicClient;
use oauth2::{ AuthUrl, AuthorizationCode, ClientId, TokenResponse, TokenUrl };
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::sync::mpsc;

use super::{ AccessToken, TokenCredential };
use crate::config::DEFAULT_AUTHORITY_HOST;
use crate::error::{ Error, Result };

// Public client registration used by the Azure CLI.
const DEFAULT_CLIENT_ID: &str = "04b07795-8ddb-461a-bbee-02f9e1bf7b46";
const DEFAULT_TENANT: &str = "organizations";
const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

const SUCCESS_PAGE: &str =
    "<html><body><h3>Authentication complete. You can close this window.</h3></body></html>";
const FAILURE_PAGE: &str =
    "<html><body><h3>Authentication failed. Check the application log.</h3></body></html>";

#[derive(Debug, PartialEq)]
enum RedirectOutcome {
    Code(String),
    Denied(String),
    Ignored,
}

#[derive(Clone)]
struct RedirectState {
    expected_state: Arc<str>,
    outcome: mpsc::Sender<RedirectOutcome>,
}

/// Authorization-code sign-in with PKCE through the system browser. The
/// authorize URL and code exchange come from `azure_identity`; the redirect is
/// caught by a loopback axum server.
pub struct InteractiveBrowserCredential {
    authority_host: String,
    tenant_id: String,
    client_id: String,
    login_timeout: Duration,
    open_browser: bool,
}

impl InteractiveBrowserCredential {
    pub fn new(tenant_id: Option<&str>, client_id: Option<&str>, authority_host: Option<&str>) -> Result<Self> {
        let authority_host = authority_host.unwrap_or(DEFAULT_AUTHORITY_HOST).trim_end_matches('/');
        Url::parse(authority_host).map_err(|e| {
            Error::Configuration(format!("Invalid authority host '{}': {}", authority_host, e))
        })?;

        Ok(Self {
            authority_host: authority_host.to_string(),
            tenant_id: tenant_id
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_TENANT)
                .to_string(),
            client_id: client_id
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_CLIENT_ID)
                .to_string(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            open_browser: true,
        })
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Only log the sign-in URL instead of launching a browser.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        let endpoint = format!("{}/{}/oauth2/v2.0/{}", self.authority_host, self.tenant_id, name);
        Url::parse(&endpoint).map_err(|e| Error::Configuration(format!("Invalid endpoint '{}': {}", endpoint, e)))
    }

    fn start_flow(&self, scope: &str, redirect_url: Url) -> Result<AuthorizationCodeFlow> {
        let client = BasicClient::new(
            ClientId::new(self.client_id.clone()),
            None,
            AuthUrl::from_url(self.endpoint("authorize")?),
            Some(TokenUrl::from_url(self.endpoint("token")?))
        );
        Ok(authorization_code_flow::start(client, &self.tenant_id, redirect_url, &[scope]))
    }
}

fn parse_redirect(params: &HashMap<String, String>, expected_state: &str) -> RedirectOutcome {
    if let Some(error) = params.get("error") {
        return RedirectOutcome::Denied(match params.get("error_description") {
            Some(description) => format!("{}: {}", error, description),
            None => error.clone(),
        });
    }

    match params.get("code") {
        Some(_) if params.get("state").map(String::as_str) != Some(expected_state) =>
            RedirectOutcome::Denied("state mismatch in redirect".to_string()),
        Some(code) => RedirectOutcome::Code(code.clone()),
        None => RedirectOutcome::Ignored,
    }
}

async fn handle_redirect(
    State(state): State<RedirectState>,
    Query(params): Query<HashMap<String, String>>
) -> (StatusCode, Html<&'static str>) {
    let outcome = parse_redirect(&params, &state.expected_state);
    let page = match outcome {
        RedirectOutcome::Code(_) => SUCCESS_PAGE,
        RedirectOutcome::Denied(_) => FAILURE_PAGE,
        RedirectOutcome::Ignored => {
            return (StatusCode::NOT_FOUND, Html(""));
        }
    };
    if state.outcome.send(outcome).await.is_err() {
        debug!("Redirect arrived after the sign-in wait ended");
    }
    (StatusCode::OK, Html(page))
}

/// Serves the loopback redirect until a code (or a denial) arrives. Each
/// connection is handled independently, so idle browser preconnects do not
/// hold up the real redirect.
pub(crate) async fn wait_for_code(listener: TcpListener, expected_state: &str, timeout: Duration) -> Result<String> {
    let (sender, mut receiver) = mpsc::channel(1);
    let app = Router::new()
        .route("/", get(handle_redirect))
        .with_state(RedirectState {
            expected_state: Arc::from(expected_state),
            outcome: sender,
        });

    let server = tokio::spawn(async move { axum::serve(listener, app).await });
    let outcome = tokio::time::timeout(timeout, receiver.recv()).await;
    server.abort();

    match outcome {
        Ok(Some(RedirectOutcome::Code(code))) => Ok(code),
        Ok(Some(RedirectOutcome::Denied(reason))) =>
            Err(Error::Authentication(format!("InteractiveBrowserCredential: {}", reason))),
        Ok(Some(RedirectOutcome::Ignored)) | Ok(None) =>
            Err(Error::Authentication("InteractiveBrowserCredential: redirect listener stopped".to_string())),
        Err(_) =>
            Err(Error::Authentication(format!("InteractiveBrowserCredential: no sign-in completed within {:?}", timeout))),
    }
}

async fn launch_browser(url: &str) {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(windows) {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    } else {
        Command::new("xdg-open")
    };
    command.arg(url);

    match command.spawn() {
        Ok(_) => debug!("Launched system browser for sign-in"),
        Err(e) => warn!("Could not launch a browser ({}); open the URL manually.", e),
    }
}

#[async_trait]
impl TokenCredential for InteractiveBrowserCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let redirect = format!("http://localhost:{}", listener.local_addr()?.port());
        let redirect_url = Url::parse(&redirect).map_err(|e| {
            Error::Configuration(format!("Invalid redirect URL '{}': {}", redirect, e))
        })?;

        let flow = self.start_flow(scope, redirect_url)?;
        info!("Sign in at: {}", flow.authorize_url);
        if self.open_browser {
            launch_browser(flow.authorize_url.as_str()).await;
        }

        let state = flow.csrf_state.secret().clone();
        let code = wait_for_code(listener, &state, self.login_timeout).await?;

        let response = flow
            .exchange(azure_core::new_http_client(), AuthorizationCode::new(code)).await
            .map_err(|e| Error::Authentication(format!("InteractiveBrowserCredential: {}", e)))?;

        let lifetime = response
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .unwrap_or_else(chrono::Duration::zero);
        Ok(AccessToken {
            token: response.access_token().secret().to_string(),
            expires_on: Utc::now() + lifetime,
        })
    }
}
