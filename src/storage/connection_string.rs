use std::collections::HashMap;
use std::fmt;
use url::Url;

use crate::error::{ Error, Result };

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// The parts of a storage account connection string this crate needs.
#[derive(Clone, PartialEq)]
pub struct ConnectionString {
    pub account_name: String,
    pub account_key: String,
    pub dfs_endpoint: Url,
    pub blob_endpoint: Url,
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("dfs_endpoint", &self.dfs_endpoint.as_str())
            .field("blob_endpoint", &self.blob_endpoint.as_str())
            .finish()
    }
}

fn parse_endpoint(value: &str, key: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| Error::Configuration(format!("Invalid {} '{}': {}", key, value, e)))
}

impl ConnectionString {
    pub fn parse(connection_string: &str) -> Result<Self> {
        let settings: HashMap<String, String> = connection_string
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| {
                part.split_once('=').map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            })
            .collect();

        let get = |key: &str| settings.get(&key.to_ascii_lowercase()).filter(|v| !v.is_empty());

        let account_name = get("AccountName")
            .cloned()
            .ok_or_else(|| Error::Configuration("Connection string is missing AccountName".into()))?;
        let account_key = get("AccountKey")
            .cloned()
            .ok_or_else(|| Error::Configuration("Connection string is missing AccountKey".into()))?;

        let protocol = get("DefaultEndpointsProtocol").map(String::as_str).unwrap_or("https");
        let suffix = get("EndpointSuffix").map(String::as_str).unwrap_or(DEFAULT_ENDPOINT_SUFFIX);

        let explicit_dfs = get("DfsEndpoint").map(|v| parse_endpoint(v, "DfsEndpoint")).transpose()?;
        let explicit_blob = get("BlobEndpoint").map(|v| parse_endpoint(v, "BlobEndpoint")).transpose()?;

        let default_endpoint = |service: &str| {
            parse_endpoint(
                &format!("{}://{}.{}.{}", protocol, account_name, service, suffix),
                "endpoint"
            )
        };

        let dfs_endpoint = match (&explicit_dfs, &explicit_blob) {
            (Some(dfs), _) => dfs.clone(),
            (None, Some(blob)) => swap_service(blob, ".blob.", ".dfs.")?,
            (None, None) => default_endpoint("dfs")?,
        };
        let blob_endpoint = match (&explicit_blob, &explicit_dfs) {
            (Some(blob), _) => blob.clone(),
            (None, Some(dfs)) => swap_service(dfs, ".dfs.", ".blob.")?,
            (None, None) => default_endpoint("blob")?,
        };

        Ok(Self {
            account_name,
            account_key,
            dfs_endpoint,
            blob_endpoint,
        })
    }
}

// Hosts without the service label (emulators, proxies) are used for both services.
fn swap_service(endpoint: &Url, from: &str, to: &str) -> Result<Url> {
    let swapped = endpoint.as_str().replacen(from, to, 1);
    parse_endpoint(&swapped, "endpoint")
}
