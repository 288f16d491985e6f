use async_trait::async_trait;
use azure_core::auth::{ AccessToken as SdkAccessToken, TokenCredential as SdkTokenCredential };
use azure_core::Url;
use azure_identity::{
    AppServiceManagedIdentityCredential,
    AzureCliCredential,
    ClientSecretCredential,
    DefaultAzureCredential,
    TokenCredentialOptions,
    VirtualMachineManagedIdentityCredential,
};
use chrono::{ TimeZone, Utc };
use log::{ warn, debug };
use std::sync::Arc;

use super::{ AccessToken, TokenCredential };
use crate::config::{ self, DEFAULT_AUTHORITY_HOST };
use crate::error::{ Error, Result };

/// Adapts an `azure_identity` credential to this crate's `TokenCredential`.
pub struct AzureIdentityCredential {
    source: &'static str,
    inner: Arc<dyn SdkTokenCredential>,
}

impl AzureIdentityCredential {
    pub fn new(source: &'static str, inner: Arc<dyn SdkTokenCredential>) -> Self {
        Self { source, inner }
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    pub fn client_secret(
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        authority_host: Option<&str>
    ) -> Result<Self> {
        let authority_host = parse_authority_host(authority_host)?;
        let credential = ClientSecretCredential::new(
            azure_core::new_http_client(),
            authority_host,
            tenant_id.to_string(),
            client_id.to_string(),
            client_secret.to_string()
        );
        Ok(Self::new("ClientSecretCredential", Arc::new(credential)))
    }

    /// App Service identity when `IDENTITY_ENDPOINT` is set, the VM metadata
    /// endpoint otherwise. Only the system-assigned identity is used.
    pub fn managed_identity(client_id: Option<&str>) -> Self {
        if client_id.is_some() {
            warn!("ManagedIdentityCredential ignores client_id; using the system-assigned identity");
        }

        if config::env_var(config::ENV_IDENTITY_ENDPOINT).is_some() {
            match AppServiceManagedIdentityCredential::create(TokenCredentialOptions::default()) {
                Ok(credential) => {
                    debug!("Managed identity resolved to the App Service endpoint");
                    return Self::new("ManagedIdentityCredential", Arc::new(credential));
                }
                Err(e) => debug!("App Service identity unavailable: {}", e),
            }
        }

        let credential = VirtualMachineManagedIdentityCredential::new(TokenCredentialOptions::default());
        Self::new("ManagedIdentityCredential", Arc::new(credential))
    }

    pub fn azure_cli() -> Self {
        Self::new("AzureCliCredential", Arc::new(AzureCliCredential::new()))
    }

    /// The SDK's default chain: environment, managed identity, then the Azure CLI.
    pub fn default_chain() -> Result<Self> {
        let credential = DefaultAzureCredential::create(TokenCredentialOptions::default()).map_err(|e| {
            Error::Configuration(format!("DefaultAzureCredential: {}", e))
        })?;
        Ok(Self::new("DefaultAzureCredential", Arc::new(credential)))
    }
}

pub(crate) fn parse_authority_host(authority_host: Option<&str>) -> Result<Url> {
    let authority_host = authority_host.unwrap_or(DEFAULT_AUTHORITY_HOST);
    Url::parse(authority_host).map_err(|e| {
        Error::Configuration(format!("Invalid authority host '{}': {}", authority_host, e))
    })
}

pub(crate) fn from_sdk_token(token: &SdkAccessToken) -> AccessToken {
    AccessToken {
        token: token.token.secret().to_string(),
        expires_on: Utc.timestamp_opt(token.expires_on.unix_timestamp(), 0).single().unwrap_or_else(Utc::now),
    }
}

#[async_trait]
impl TokenCredential for AzureIdentityCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        match self.inner.get_token(&[scope]).await {
            Ok(token) => Ok(from_sdk_token(&token)),
            Err(e) => Err(Error::Authentication(format!("{}: {}", self.source, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_host_defaults_to_public_cloud() {
        let url = parse_authority_host(None).unwrap();
        assert_eq!(url.as_str(), "https://login.microsoftonline.com/");
    }

    #[test]
    fn malformed_authority_host_is_rejected() {
        let err = AzureIdentityCredential::client_secret("t", "c", "s", Some("not a url")).err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn sdk_token_is_converted_with_expiry() {
        let expires_on = time::OffsetDateTime::from_unix_timestamp(4_102_444_800).unwrap();
        let token = SdkAccessToken::new("tok".to_string(), expires_on);
        let converted = from_sdk_token(&token);
        assert_eq!(converted.token, "tok");
        assert_eq!(converted.expires_on.timestamp(), 4_102_444_800);
    }

    #[test]
    fn strategies_report_their_source() {
        assert_eq!(AzureIdentityCredential::azure_cli().source(), "AzureCliCredential");
        assert_eq!(AzureIdentityCredential::managed_identity(None).source(), "ManagedIdentityCredential");
    }
}
