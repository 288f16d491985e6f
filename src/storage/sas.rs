use azure_core::auth::Secret;
use azure_storage::shared_access_signature::service_sas::{
    BlobSasPermissions,
    BlobSharedAccessSignature,
    BlobSignedResource,
};
use azure_storage::shared_access_signature::SasToken;
use chrono::{ DateTime, Utc };
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

use crate::error::{ Error, Result };

/// Permissions a directory SAS may carry. Rendered in the canonical
/// `racwdlmeop` order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectorySasPermissions {
    pub read: bool,
    pub add: bool,
    pub create: bool,
    pub write: bool,
    pub delete: bool,
    pub list: bool,
    pub move_: bool,
    pub execute: bool,
    pub manage_ownership: bool,
    pub manage_access_control: bool,
}

impl DirectorySasPermissions {
    pub fn read_only() -> Self {
        Self { read: true, list: true, ..Default::default() }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            add: true,
            create: true,
            write: true,
            list: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_string().is_empty()
    }
}

impl fmt::Display for DirectorySasPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.read, 'r'),
            (self.add, 'a'),
            (self.create, 'c'),
            (self.write, 'w'),
            (self.delete, 'd'),
            (self.list, 'l'),
            (self.move_, 'm'),
            (self.execute, 'e'),
            (self.manage_ownership, 'o'),
            (self.manage_access_control, 'p'),
        ];
        for (set, flag) in flags {
            if set {
                write!(f, "{}", flag)?;
            }
        }
        Ok(())
    }
}

impl FromStr for DirectorySasPermissions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut permissions = Self::default();
        for flag in s.chars() {
            match flag {
                'r' => permissions.read = true,
                'a' => permissions.add = true,
                'c' => permissions.create = true,
                'w' => permissions.write = true,
                'd' => permissions.delete = true,
                'l' => permissions.list = true,
                'm' => permissions.move_ = true,
                'e' => permissions.execute = true,
                'o' => permissions.manage_ownership = true,
                'p' => permissions.manage_access_control = true,
                other => {
                    return Err(
                        Error::Configuration(format!("Unknown SAS permission '{}'", other))
                    );
                }
            }
        }
        Ok(permissions)
    }
}

fn sdk_permissions(permissions: &DirectorySasPermissions) -> BlobSasPermissions {
    BlobSasPermissions {
        read: permissions.read,
        add: permissions.add,
        create: permissions.create,
        write: permissions.write,
        delete: permissions.delete,
        list: permissions.list,
        move_: permissions.move_,
        execute: permissions.execute,
        ownership: permissions.manage_ownership,
        permissions: permissions.manage_access_control,
        ..Default::default()
    }
}

/// Number of path segments below the container, as sent in `sdd`.
pub(crate) fn directory_depth(directory: &str) -> usize {
    directory
        .split('/')
        .filter(|segment| !segment.is_empty())
        .count()
}

/// Builds a service SAS (`sr=d`) for one directory, signed locally with the
/// account key by `azure_storage`. Returns the query string without a
/// leading `?`.
pub(crate) fn directory_sas(
    account_name: &str,
    account_key: &str,
    container: &str,
    directory: &str,
    permissions: &DirectorySasPermissions,
    expiry: DateTime<Utc>
) -> Result<String> {
    let directory = directory.trim_matches('/');
    if directory.is_empty() {
        return Err(Error::Configuration("A directory SAS needs a directory path".into()));
    }
    if permissions.is_empty() {
        return Err(Error::Configuration("A directory SAS needs at least one permission".into()));
    }

    let expiry = OffsetDateTime::from_unix_timestamp(expiry.timestamp()).map_err(|e| {
        Error::Configuration(format!("SAS expiry out of range: {}", e))
    })?;
    let resource = format!("/blob/{}/{}/{}", account_name, container, directory);

    let signature = BlobSharedAccessSignature::new(
        Secret::new(account_key.to_string()),
        resource,
        sdk_permissions(permissions),
        expiry,
        BlobSignedResource::Directory
    ).signed_directory_depth(directory_depth(directory));

    Ok(signature.token()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    const KEY: &str = "c3RvcmFnZS10ZXN0LWtleQ==";

    fn pairs(token: &str) -> HashMap<String, String> {
        url::form_urlencoded
            ::parse(token.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn permissions_render_in_canonical_order() {
        let permissions: DirectorySasPermissions = "lwr".parse().unwrap();
        assert_eq!(permissions.to_string(), "rwl");
        assert_eq!(DirectorySasPermissions::read_only().to_string(), "rl");
        assert!("rx".parse::<DirectorySasPermissions>().is_err());
    }

    #[test]
    fn depth_counts_segments() {
        assert_eq!(directory_depth("raw"), 1);
        assert_eq!(directory_depth("/raw/2024/01/"), 3);
    }

    #[test]
    fn directory_token_is_scoped_to_the_directory() {
        let expiry = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let token = directory_sas(
            "myaccount",
            KEY,
            "landing",
            "/raw/2024/",
            &DirectorySasPermissions::read_only(),
            expiry
        ).unwrap();

        let pairs = pairs(&token);
        assert_eq!(pairs.get("sr").map(String::as_str), Some("d"));
        assert_eq!(pairs.get("sdd").map(String::as_str), Some("2"));
        assert_eq!(pairs.get("sp").map(String::as_str), Some("rl"));
        assert!(pairs.get("se").is_some_and(|se| se.starts_with("2030-01-01T00:00:00")));
        assert!(pairs.get("sig").is_some_and(|sig| !sig.is_empty()));
    }

    #[test]
    fn signature_depends_on_the_key() {
        let expiry = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let permissions = DirectorySasPermissions::read_write();
        let first = directory_sas("myaccount", KEY, "landing", "raw", &permissions, expiry).unwrap();
        let again = directory_sas("myaccount", KEY, "landing", "raw", &permissions, expiry).unwrap();
        let other = directory_sas("myaccount", "b3RoZXIta2V5", "landing", "raw", &permissions, expiry).unwrap();

        assert_eq!(pairs(&first).get("sig"), pairs(&again).get("sig"));
        assert_ne!(pairs(&first).get("sig"), pairs(&other).get("sig"));
        assert_eq!(pairs(&first).get("sp").map(String::as_str), Some("racwl"));
    }

    #[test]
    fn empty_permissions_or_directory_are_rejected() {
        let expiry = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let empty = DirectorySasPermissions::default();
        assert!(directory_sas("a", KEY, "c", "raw", &empty, expiry).is_err());
        let read = DirectorySasPermissions::read_only();
        assert!(directory_sas("a", KEY, "c", "/", &read, expiry).is_err());
    }
}
