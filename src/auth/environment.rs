use async_trait::async_trait;
use log::debug;

use super::{ AccessToken, AzureIdentityCredential, TokenCredential };
use crate::config;
use crate::error::{ Error, Result };

/// Service principal read from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and
/// `AZURE_CLIENT_SECRET` at token time. `AZURE_AUTHORITY_HOST` is honoured
/// when no authority host was configured.
pub struct EnvironmentCredential {
    authority_host: Option<String>,
}

impl EnvironmentCredential {
    pub fn new(authority_host: Option<&str>) -> Self {
        Self {
            authority_host: authority_host.map(String::from),
        }
    }

    fn resolve<F>(&self, lookup: F) -> Result<AzureIdentityCredential>
        where F: Fn(&str) -> Option<String>
    {
        let tenant_id = lookup(config::ENV_TENANT_ID);
        let client_id = lookup(config::ENV_CLIENT_ID);
        let client_secret = lookup(config::ENV_CLIENT_SECRET);

        match (tenant_id, client_id, client_secret) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                let authority_host = self.authority_host
                    .clone()
                    .or_else(|| lookup(config::ENV_AUTHORITY_HOST));
                AzureIdentityCredential::client_secret(
                    &tenant_id,
                    &client_id,
                    &client_secret,
                    authority_host.as_deref()
                )
            }
            _ =>
                Err(
                    Error::CredentialUnavailable(
                        format!(
                            "EnvironmentCredential: {}, {} and {} must all be set",
                            config::ENV_TENANT_ID,
                            config::ENV_CLIENT_ID,
                            config::ENV_CLIENT_SECRET
                        )
                    )
                ),
        }
    }
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let credential = self.resolve(config::env_var)?;
        debug!("EnvironmentCredential resolved a service principal from the environment");
        credential.get_token(scope).await
    }
}
