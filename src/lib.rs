pub mod auth;
pub mod config;
pub mod error;
pub mod search;
pub mod storage;

pub use auth::{ AzureAuthHelper, CredentialMethod, CredentialOptions, TokenCredential, create_credential, get_credential_method };
pub use error::{ Error, ErrorKind, Result };
pub use search::{ CompressionType, IndexScenario, SearchCredential, SearchIndexManager };
pub use storage::{ DataLakeGen2, DirectorySasPermissions, PathItem, Table };
