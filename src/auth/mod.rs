pub mod environment;
pub mod identity;
pub mod interactive;

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use log::{ info, error, debug };
use std::fmt;
use std::sync::Arc;

use crate::config::{ self, DEFAULT_MANAGEMENT_SCOPE };
use crate::error::{ Error, Result };

pub use environment::EnvironmentCredential;
pub use identity::AzureIdentityCredential;
pub use interactive::InteractiveBrowserCredential;

/// A bearer token together with the expiry reported by the issuer.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scope: &str) -> Result<AccessToken>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMethod {
    Default,
    ManagedIdentity,
    ServicePrincipal,
    Environment,
    Cli,
    Interactive,
}

impl fmt::Display for CredentialMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialMethod::Default => "default",
            CredentialMethod::ManagedIdentity => "managed_identity",
            CredentialMethod::ServicePrincipal => "service_principal",
            CredentialMethod::Environment => "environment",
            CredentialMethod::Cli => "cli",
            CredentialMethod::Interactive => "interactive",
        };
        f.write_str(name)
    }
}

pub fn get_credential_method(method_str: &str) -> Result<CredentialMethod> {
    match method_str.trim().to_lowercase().as_str() {
        "default" => Ok(CredentialMethod::Default),
        "managed_identity" => Ok(CredentialMethod::ManagedIdentity),
        "service_principal" => Ok(CredentialMethod::ServicePrincipal),
        "environment" => Ok(CredentialMethod::Environment),
        "cli" => Ok(CredentialMethod::Cli),
        "interactive" => Ok(CredentialMethod::Interactive),
        _ => Err(Error::Configuration(format!("Unknown authentication method: {}", method_str))),
    }
}

/// Strategy-specific parameters. Which ones are required depends on the method.
#[derive(Clone, Default)]
pub struct CredentialOptions {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub authority_host: Option<String>,
}

impl fmt::Debug for CredentialOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialOptions")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

impl CredentialOptions {
    pub fn from_env() -> Self {
        Self {
            tenant_id: config::env_var(config::ENV_TENANT_ID),
            client_id: config::env_var(config::ENV_CLIENT_ID),
            client_secret: config::env_var(config::ENV_CLIENT_SECRET),
            authority_host: config::env_var(config::ENV_AUTHORITY_HOST),
        }
    }

    pub fn service_principal(tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            tenant_id: Some(tenant_id.to_string()),
            client_id: Some(client_id.to_string()),
            client_secret: Some(client_secret.to_string()),
            ..Default::default()
        }
    }

    pub fn with_authority_host(mut self, authority_host: &str) -> Self {
        self.authority_host = Some(authority_host.to_string());
        self
    }
}

fn require(value: &Option<String>, name: &str, method: CredentialMethod) -> Result<String> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| Error::Configuration(format!("{} credential requires '{}'", method, name)))
}

pub fn create_credential(
    method: CredentialMethod,
    options: &CredentialOptions
) -> Result<Arc<dyn TokenCredential>> {
    debug!("Creating credential for method: {}", method);
    match method {
        CredentialMethod::Default => {
            let credential = AzureIdentityCredential::default_chain()?;
            info!("Using DefaultAzureCredential");
            Ok(Arc::new(credential))
        }
        CredentialMethod::ManagedIdentity => {
            let credential = AzureIdentityCredential::managed_identity(options.client_id.as_deref());
            info!("Using ManagedIdentityCredential");
            Ok(Arc::new(credential))
        }
        CredentialMethod::ServicePrincipal => {
            let tenant_id = require(&options.tenant_id, "tenant_id", method)?;
            let client_id = require(&options.client_id, "client_id", method)?;
            let client_secret = require(&options.client_secret, "client_secret", method)?;
            let credential = AzureIdentityCredential::client_secret(
                &tenant_id,
                &client_id,
                &client_secret,
                options.authority_host.as_deref()
            )?;
            info!("Using ClientSecretCredential (Service Principal)");
            Ok(Arc::new(credential))
        }
        CredentialMethod::Environment => {
            let credential = EnvironmentCredential::new(options.authority_host.as_deref());
            info!("Using EnvironmentCredential");
            Ok(Arc::new(credential))
        }
        CredentialMethod::Cli => {
            if options.tenant_id.is_some() {
                debug!("AzureCliCredential uses the tenant of the active az login");
            }
            let credential = AzureIdentityCredential::azure_cli();
            info!("Using AzureCliCredential");
            Ok(Arc::new(credential))
        }
        CredentialMethod::Interactive => {
            let credential = InteractiveBrowserCredential::new(
                options.tenant_id.as_deref(),
                options.client_id.as_deref(),
                options.authority_host.as_deref()
            )?;
            info!("Using InteractiveBrowserCredential");
            Ok(Arc::new(credential))
        }
    }
}

/// Resolves a credential strategy by name and hands out tokens for it.
pub struct AzureAuthHelper {
    method: CredentialMethod,
    credential: Arc<dyn TokenCredential>,
}

impl AzureAuthHelper {
    pub fn new(method: &str, options: CredentialOptions) -> Result<Self> {
        let credential = get_credential_method(method).and_then(|method| {
            create_credential(method, &options).map(|credential| (method, credential))
        });

        match credential {
            Ok((method, credential)) => Ok(Self { method, credential }),
            Err(e) => {
                error!("Failed to initialize credential: {}", e);
                Err(e)
            }
        }
    }

    pub fn method(&self) -> CredentialMethod {
        self.method
    }

    /// Requests a token for `scope`, defaulting to the management API.
    pub async fn get_token(&self, scope: Option<&str>) -> Result<String> {
        let scope = scope.unwrap_or(DEFAULT_MANAGEMENT_SCOPE);
        match self.credential.get_token(scope).await {
            Ok(token) => {
                info!("Successfully acquired token for scope: {}", scope);
                Ok(token.token)
            }
            Err(e) => {
                error!("Failed to acquire token for scope {}: {}", scope, e);
                Err(e)
            }
        }
    }

    pub fn get_credential(&self) -> Arc<dyn TokenCredential> {
        Arc::clone(&self.credential)
    }
}
