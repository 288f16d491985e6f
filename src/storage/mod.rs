pub mod connection_string;
pub mod models;
pub mod sas;
pub mod table;

use azure_storage::{ CloudLocation, StorageCredentials };
use azure_storage_blobs::prelude::{ BlobServiceClient, ClientBuilder, PublicAccess };
use azure_storage_datalake::prelude::*;
use chrono::{ DateTime, Utc };
use futures::StreamExt;
use log::{ info, error, debug };
use std::path::Path;

use crate::error::{ Error, ErrorKind, Result };
use models::{ split_parent, to_chrono };

pub use connection_string::ConnectionString;
pub use models::PathItem;
pub use sas::DirectorySasPermissions;
pub use table::Table;

/// A session against one Data Lake Gen2 account. The SDK clients and the
/// account key are set up once here and shared by every operation; dropping
/// the value releases them.
///
/// `NotFound` and `AlreadyExists` outcomes are logged at `info`, every other
/// failure at `error`. All failures are returned to the caller.
pub struct DataLakeGen2 {
    account_name: String,
    account_key: String,
    data_lake: DataLakeClient,
    blob_service: BlobServiceClient,
}

fn log_failure<T, E: Into<Error>>(action: &str, target: &str, result: std::result::Result<T, E>) -> Result<T> {
    let result = result.map_err(Into::into);
    if let Err(e) = &result {
        match e.kind() {
            ErrorKind::NotFound | ErrorKind::AlreadyExists => {
                info!("Could not {} '{}': {}", action, target, e);
            }
            _ => error!("Failed to {} '{}': {}", action, target, e),
        }
    }
    result
}

fn join_path(container: &str, path: &str) -> String {
    format!("{}/{}", container, path.trim_matches('/'))
}

fn custom_location(account_name: &str, endpoint: &url::Url) -> CloudLocation {
    CloudLocation::Custom {
        account: account_name.to_string(),
        uri: endpoint.as_str().trim_end_matches('/').to_string(),
    }
}

impl DataLakeGen2 {
    pub fn new(connection_string: &str) -> Result<Self> {
        let parsed = ConnectionString::parse(connection_string).map_err(|e| {
            error!("Invalid storage connection string: {}", e);
            e
        })?;

        info!(
            "Initializing Data Lake client for account: {}, endpoint: {}",
            parsed.account_name,
            parsed.dfs_endpoint
        );

        let credentials = StorageCredentials::access_key(parsed.account_name.clone(), parsed.account_key.clone());
        let data_lake = DataLakeClientBuilder::with_location(
            custom_location(&parsed.account_name, &parsed.dfs_endpoint),
            credentials.clone()
        ).build();
        let blob_service = ClientBuilder::with_location(
            custom_location(&parsed.account_name, &parsed.blob_endpoint),
            credentials
        ).blob_service_client();

        Ok(Self {
            account_name: parsed.account_name,
            account_key: parsed.account_key,
            data_lake,
            blob_service,
        })
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    fn file_system(&self, container: &str) -> FileSystemClient {
        self.data_lake.file_system_client(container)
    }

    // Containers

    pub async fn create_container(&self, container: &str) -> Result<()> {
        log_failure("create container", container, self.file_system(container).create().await)?;
        info!("Container '{}' created", container);
        Ok(())
    }

    pub async fn container_exists(&self, container: &str) -> Result<bool> {
        match self.file_system(container).get_properties().await.map_err(Error::from) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => log_failure("check container", container, Err(e)),
        }
    }

    /// Creates the container unless it is already there.
    pub async fn create_or_replace_container(&self, container: &str) -> Result<()> {
        if self.container_exists(container).await? {
            info!("Container '{}' already exists", container);
            return Ok(());
        }
        match self.create_container(container).await {
            Err(e) if e.is_already_exists() => Ok(()),
            other => other,
        }
    }

    pub async fn delete_container(&self, container: &str) -> Result<()> {
        log_failure("delete container", container, self.file_system(container).delete().await)?;
        info!("Container '{}' deleted", container);
        Ok(())
    }

    pub async fn list_containers(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut pages = self.data_lake.list_file_systems().into_stream();
        while let Some(page) = pages.next().await {
            let page = log_failure("list containers", &self.account_name, page)?;
            names.extend(page.file_systems.into_iter().map(|fs| fs.name));
        }
        debug!("Found {} containers", names.len());
        Ok(names)
    }

    // Paths

    async fn fetch_paths(
        &self,
        container: &str,
        directory: Option<&str>,
        recursive: bool
    ) -> Result<Vec<PathItem>> {
        let file_system = self.file_system(container);
        let mut request = file_system.list_paths().recursive(recursive);
        if let Some(directory) = directory.map(|d| d.trim_matches('/')).filter(|d| !d.is_empty()) {
            request = request.directory(directory.to_string());
        }

        let mut items = Vec::new();
        let mut pages = request.into_stream();
        while let Some(page) = pages.next().await {
            let page = page?;
            items.extend(
                page.paths.into_iter().map(|path| PathItem {
                    name: path.name,
                    is_directory: path.is_directory,
                    content_length: path.content_length.max(0) as u64,
                    last_modified: to_chrono(path.last_modified),
                })
            );
        }
        Ok(items)
    }

    /// Every path in the container, at any depth.
    pub async fn list_paths(&self, container: &str) -> Result<Vec<PathItem>> {
        log_failure("list paths in", container, self.fetch_paths(container, None, true).await)
    }

    /// Everything beneath `directory`, at any depth. Names are relative to
    /// the container.
    pub async fn list_directory(&self, container: &str, directory: &str) -> Result<Vec<PathItem>> {
        log_failure(
            "list directory",
            &join_path(container, directory),
            self.fetch_paths(container, Some(directory), true).await
        )
    }

    /// Only the direct children of `directory`.
    pub async fn list_directory_children(&self, container: &str, directory: &str) -> Result<Vec<PathItem>> {
        log_failure(
            "list directory",
            &join_path(container, directory),
            self.fetch_paths(container, Some(directory), false).await
        )
    }

    // Looks the path up in its parent's listing. A missing container or
    // parent means the path is absent.
    async fn find_path(&self, container: &str, path: &str) -> Result<Option<PathItem>> {
        let (parent, _) = split_parent(path);
        let wanted = path.trim_matches('/');
        match self.fetch_paths(container, Some(parent), false).await {
            Ok(items) => Ok(items.into_iter().find(|item| item.name == wanted)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => log_failure("look up", &join_path(container, path), Err(e)),
        }
    }

    // Directories

    /// Fails with `AlreadyExists` when the directory is already present.
    pub async fn create_directory(&self, container: &str, directory: &str) -> Result<()> {
        let target = join_path(container, directory);
        let client = self.file_system(container).get_directory_client(directory.trim_matches('/'));
        log_failure("create directory", &target, client.create_if_not_exists().await)?;
        info!("Directory '{}' created", target);
        Ok(())
    }

    /// Succeeds when the directory exists afterwards. A file already sitting
    /// at that path is reported as `AlreadyExists`.
    pub async fn create_or_replace_directory(&self, container: &str, directory: &str) -> Result<()> {
        let target = join_path(container, directory);
        match self.find_path(container, directory).await? {
            Some(item) if item.is_directory => {
                info!("Directory '{}' already exists", target);
                return Ok(());
            }
            Some(_) => {
                return log_failure(
                    "create directory",
                    &target,
                    Err(Error::AlreadyExists(format!("a file already exists at '{}'", target)))
                );
            }
            None => {}
        }

        let client = self.file_system(container).get_directory_client(directory.trim_matches('/'));
        match client.create_if_not_exists().await.map_err(Error::from) {
            Ok(_) => {
                info!("Directory '{}' created", target);
                Ok(())
            }
            // Lost a race with another writer; only a directory is acceptable.
            Err(e) if e.is_already_exists() => {
                match self.find_path(container, directory).await? {
                    Some(item) if item.is_directory => Ok(()),
                    _ => log_failure("create directory", &target, Err(e)),
                }
            }
            Err(e) => log_failure("create directory", &target, Err(e)),
        }
    }

    /// Creates `a/b/c` from `["a", "b", "c"]`; missing parents are created by
    /// the service.
    pub async fn create_hierarchical_directory(&self, container: &str, segments: &[&str]) -> Result<()> {
        let path = segments
            .iter()
            .map(|s| s.trim_matches('/'))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        if path.is_empty() {
            return Err(Error::Configuration("Hierarchical directory needs at least one segment".into()));
        }
        self.create_directory(container, &path).await
    }

    /// Deletes the directory and everything beneath it.
    pub async fn delete_directory(&self, container: &str, directory: &str) -> Result<()> {
        let target = join_path(container, directory);
        let client = self.file_system(container).get_directory_client(directory.trim_matches('/'));
        log_failure("delete directory", &target, client.delete(true).await)?;
        info!("Directory '{}' deleted", target);
        Ok(())
    }

    /// Deletes the files directly inside `directory`, leaving subdirectories
    /// alone. Returns how many files were removed.
    pub async fn empty_directory(&self, container: &str, directory: &str) -> Result<usize> {
        let children = self.list_directory_children(container, directory).await?;
        let mut removed = 0;
        for file in children.iter().filter(|item| !item.is_directory) {
            self.delete_file(container, &file.name).await?;
            removed += 1;
        }
        info!("Emptied directory '{}', {} files removed", join_path(container, directory), removed);
        Ok(removed)
    }

    // Files

    /// `false` when the file, or the container holding it, is missing.
    pub async fn file_exists(&self, container: &str, path: &str) -> Result<bool> {
        let exists = self.find_path(container, path).await?.is_some_and(|item| !item.is_directory);
        debug!("File '{}' exists: {}", join_path(container, path), exists);
        Ok(exists)
    }

    pub async fn delete_file(&self, container: &str, path: &str) -> Result<()> {
        let target = join_path(container, path);
        let client = self.file_system(container).get_file_client(path.trim_matches('/'));
        log_failure("delete file", &target, client.delete().await)?;
        info!("File '{}' deleted", target);
        Ok(())
    }

    async fn upload(&self, container: &str, path: &str, data: Vec<u8>) -> Result<()> {
        let client = self.file_system(container).get_file_client(path.trim_matches('/'));
        let length = data.len() as i64;

        client.create().await?;
        if !data.is_empty() {
            client.append(0, data).await?;
        }
        client.flush(length).await?;
        Ok(())
    }

    /// Writes `data` to `path`, replacing any existing file.
    pub async fn upload_bytes(&self, container: &str, path: &str, data: Vec<u8>) -> Result<()> {
        let target = join_path(container, path);
        let size = data.len();
        log_failure("upload file", &target, self.upload(container, path, data).await)?;
        info!("Uploaded {} bytes to '{}'", size, target);
        Ok(())
    }

    /// Serializes `table` as CSV and stores it at `path`. An existing file is
    /// deleted first; the two steps are not atomic.
    pub async fn to_csv_file(&self, container: &str, path: &str, table: &Table) -> Result<()> {
        let target = join_path(container, path);
        let csv = log_failure("serialize table for", &target, table.to_csv())?;

        if self.file_exists(container, path).await? {
            self.delete_file(container, path).await?;
        }

        let size = csv.len();
        log_failure("upload file", &target, self.upload(container, path, csv).await)?;
        info!("Uploaded CSV ({} bytes, {} rows) to '{}'", size, table.rows.len(), target);
        Ok(())
    }

    /// Downloads the file to `local_path`. Returns the number of bytes written.
    pub async fn download_file(
        &self,
        container: &str,
        path: &str,
        local_path: impl AsRef<Path>
    ) -> Result<u64> {
        let target = join_path(container, path);
        let client = self.file_system(container).get_file_client(path.trim_matches('/'));
        let response = log_failure("download file", &target, client.read().await)?;

        let written = response.data.len() as u64;
        log_failure("write download of", &target, tokio::fs::write(local_path.as_ref(), &response.data).await)?;
        info!("Downloaded '{}' to '{}' ({} bytes)", target, local_path.as_ref().display(), written);
        Ok(written)
    }

    pub async fn get_updated_date_file(&self, container: &str, path: &str) -> Result<DateTime<Utc>> {
        let target = join_path(container, path);
        let last_modified = match self.find_path(container, path).await? {
            Some(item) if !item.is_directory =>
                item.last_modified.ok_or_else(|| Error::RemoteService {
                    status: 200,
                    code: "InvalidLastModified".into(),
                    message: format!("No usable last modified time for '{}'", target),
                }),
            _ => Err(Error::NotFound(format!("file '{}' does not exist", target))),
        };
        let last_modified = log_failure("read last modified of", &target, last_modified)?;
        debug!("File '{}' last modified at {}", target, last_modified);
        Ok(last_modified)
    }

    // Access

    /// Issues a directory-scoped SAS token signed locally with the account
    /// key. No request is sent.
    pub fn grant_access_directory(
        &self,
        container: &str,
        directory: &str,
        permissions: &DirectorySasPermissions,
        expiry: DateTime<Utc>
    ) -> Result<String> {
        let target = join_path(container, directory);
        let token = log_failure(
            "issue SAS token for",
            &target,
            sas::directory_sas(&self.account_name, &self.account_key, container, directory, permissions, expiry)
        )?;
        info!("Issued SAS token for '{}' with permissions '{}', expiring {}", target, permissions, expiry);
        Ok(token)
    }

    /// Sets the container's public access level to `container`, allowing
    /// anonymous reads of the container and its blobs.
    pub async fn change_anonymous_access_container(&self, container: &str) -> Result<()> {
        let client = self.blob_service.container_client(container);
        log_failure("change public access of", container, client.set_acl(PublicAccess::Container).await)?;
        info!("Container '{}' now allows anonymous container access", container);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTION: &str =
        "DefaultEndpointsProtocol=https;AccountName=myaccount;AccountKey=c3RvcmFnZS10ZXN0LWtleQ==;EndpointSuffix=core.windows.net";

    #[test]
    fn custom_location_drops_the_trailing_slash() {
        let endpoint = url::Url::parse("https://myaccount.dfs.core.windows.net/").unwrap();
        match custom_location("myaccount", &endpoint) {
            CloudLocation::Custom { account, uri } => {
                assert_eq!(account, "myaccount");
                assert_eq!(uri, "https://myaccount.dfs.core.windows.net");
            }
            _ => panic!("expected a custom location"),
        }
    }

    #[test]
    fn session_from_connection_string() {
        let lake = DataLakeGen2::new(CONNECTION).unwrap();
        assert_eq!(lake.account_name(), "myaccount");
    }

    #[test]
    fn malformed_connection_string_is_rejected() {
        let err = DataLakeGen2::new("AccountName=only").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn sas_token_is_issued_without_a_request() {
        let lake = DataLakeGen2::new(CONNECTION).unwrap();
        let expiry = chrono::Utc::now() + chrono::Duration::hours(1);
        let token = lake
            .grant_access_directory("landing", "raw", &DirectorySasPermissions::read_only(), expiry)
            .unwrap();
        assert!(token.contains("sr=d"));
        assert!(token.contains("sdd=1"));
        assert!(token.contains("sig="));
    }

    #[tokio::test]
    async fn hierarchical_path_requires_a_segment() {
        let lake = DataLakeGen2::new(CONNECTION).unwrap();
        let err = lake.create_hierarchical_directory("landing", &["", "/"]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
