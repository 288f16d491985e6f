use azure_core::error::ErrorKind as AzureErrorKind;
use reqwest::{ Response, StatusCode };
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The credential could not attempt a token exchange in this environment
    /// (missing variables, no identity endpoint, CLI not logged in).
    #[error("credential unavailable: {0}")]
    CredentialUnavailable(String),

    #[error("remote service error ({status}): {code}: {message}")]
    RemoteService {
        status: u16,
        code: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// SDK failure that carried no HTTP status (connection, body decoding).
    #[error("azure sdk error: {0}")]
    Sdk(azure_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Closed classification callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NotFound,
    AlreadyExists,
    AuthenticationFailure,
    RemoteServiceError,
    Local,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::Authentication(_) | Error::CredentialUnavailable(_) =>
                ErrorKind::AuthenticationFailure,
            Error::RemoteService { .. } | Error::Transport(_) | Error::Sdk(_) =>
                ErrorKind::RemoteServiceError,
            Error::Io(_) | Error::Csv(_) | Error::Json(_) => ErrorKind::Local,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    /// Maps a non-success service status, error code and message onto the closed set.
    pub fn from_status(status: StatusCode, code: &str, message: &str) -> Self {
        let lowered_code = code.to_ascii_lowercase();
        let lowered_message = message.to_ascii_lowercase();
        let detail = if message.is_empty() { code.to_string() } else { message.to_string() };

        if status == StatusCode::NOT_FOUND || lowered_code.ends_with("notfound") {
            Error::NotFound(detail)
        } else if
            lowered_code.contains("alreadyexists") ||
            lowered_message.contains("already exists") ||
            (status == StatusCode::CONFLICT && code.is_empty())
        {
            Error::AlreadyExists(detail)
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Error::Authentication(detail)
        } else {
            Error::RemoteService {
                status: status.as_u16(),
                code: code.to_string(),
                message: message.to_string(),
            }
        }
    }

    /// Consumes a failed response and translates it. Reads `x-ms-error-code`
    /// first, then the JSON `{"error": {"code", "message"}}` body when present.
    pub async fn from_response(response: Response) -> Self {
        let status = response.status();
        let header_code = response
            .headers()
            .get("x-ms-error-code")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let text = response.text().await.unwrap_or_default();

        let (body_code, body_message) = match serde_json::from_str::<Value>(&text) {
            Ok(json) => {
                let error = json.get("error");
                let code = error
                    .and_then(|e| e.get("code"))
                    .and_then(Value::as_str)
                    .map(String::from);
                let message = error
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .map(String::from);
                (code, message)
            }
            Err(_) => (None, None),
        };

        let code = header_code.or(body_code).unwrap_or_default();
        let message = body_message.unwrap_or_else(|| text.trim().to_string());
        Error::from_status(status, &code, &message)
    }
}

impl From<azure_core::Error> for Error {
    fn from(e: azure_core::Error) -> Self {
        match e.kind() {
            AzureErrorKind::HttpResponse { status, error_code } => {
                let status = StatusCode::from_u16(*status as u16).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let code = error_code.clone().unwrap_or_default();
                Error::from_status(status, &code, &e.to_string())
            }
            _ => Error::Sdk(e),
        }
    }
}
