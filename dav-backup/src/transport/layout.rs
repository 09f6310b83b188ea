//! URLs of the files that make up a backup.
//!
//! ```text
//! <base>/
//!   <root>/
//!     manifest.json
//!     data.json
//!     images/<escaped asset name>.base64
//!   <legacy filename>
//! ```

use crate::utils::errors::{Result, SyncError};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Url;

pub const MANIFEST_FILENAME: &str = "manifest.json";
pub const DATA_FILENAME: &str = "data.json";
pub const IMAGES_DIR: &str = "images";
pub const ASSET_SUFFIX: &str = ".base64";
pub const DEFAULT_ROOT_DIR: &str = "prompthub-backup";
pub const DEFAULT_LEGACY_FILENAME: &str = "prompthub-backup.json";

/// Characters left alone when escaping asset names: letters, digits and
/// `- _ . ! ~ * ' ( )`, the same set browsers keep in URI components.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    base: String,
    root_dir: String,
    legacy_filename: String,
}

impl RemoteLayout {
    pub fn new(base_url: &str, root_dir: &str, legacy_filename: &str) -> Result<Self> {
        let parsed = Url::parse(base_url).map_err(|e| SyncError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "{base_url}: unsupported scheme {}",
                parsed.scheme()
            )));
        }

        Ok(Self {
            base: base_url.trim_end_matches('/').to_string(),
            root_dir: root_dir.trim_matches('/').to_string(),
            legacy_filename: legacy_filename.trim_matches('/').to_string(),
        })
    }

    /// Layout with the default root directory and legacy file name.
    pub fn with_defaults(base_url: &str) -> Result<Self> {
        Self::new(base_url, DEFAULT_ROOT_DIR, DEFAULT_LEGACY_FILENAME)
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn root_url(&self) -> String {
        format!("{}/{}", self.base, self.root_dir)
    }

    pub fn images_url(&self) -> String {
        format!("{}/{}", self.root_url(), IMAGES_DIR)
    }

    pub fn manifest_url(&self) -> String {
        format!("{}/{}", self.root_url(), MANIFEST_FILENAME)
    }

    pub fn data_url(&self) -> String {
        format!("{}/{}", self.root_url(), DATA_FILENAME)
    }

    pub fn asset_url(&self, name: &str) -> String {
        format!(
            "{}/{}{}",
            self.images_url(),
            utf8_percent_encode(name, COMPONENT),
            ASSET_SUFFIX
        )
    }

    pub fn legacy_url(&self) -> String {
        format!("{}/{}", self.base, self.legacy_filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_urls() {
        let layout = RemoteLayout::with_defaults("https://dav.example.com/remote.php/dav/").unwrap();
        assert_eq!(layout.base_url(), "https://dav.example.com/remote.php/dav");
        assert_eq!(layout.root_url(), "https://dav.example.com/remote.php/dav/prompthub-backup");
        assert_eq!(layout.manifest_url(), "https://dav.example.com/remote.php/dav/prompthub-backup/manifest.json");
        assert_eq!(layout.data_url(), "https://dav.example.com/remote.php/dav/prompthub-backup/data.json");
        assert_eq!(layout.legacy_url(), "https://dav.example.com/remote.php/dav/prompthub-backup.json");
    }

    #[test]
    fn test_asset_names_are_escaped() {
        let layout = RemoteLayout::new("http://nas.local:5005", "backup", "backup.json").unwrap();
        assert_eq!(layout.asset_url("a.png"), "http://nas.local:5005/backup/images/a.png.base64");
        assert_eq!(
            layout.asset_url("my photo (1).png"),
            "http://nas.local:5005/backup/images/my%20photo%20(1).png.base64"
        );
        assert_eq!(layout.asset_url("a/b#c.png"), "http://nas.local:5005/backup/images/a%2Fb%23c.png.base64");
        assert_eq!(layout.asset_url("图.png"), "http://nas.local:5005/backup/images/%E5%9B%BE.png.base64");
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(matches!(RemoteLayout::with_defaults("not a url"), Err(SyncError::InvalidUrl(_))));
        assert!(matches!(RemoteLayout::with_defaults("ftp://host/dav"), Err(SyncError::InvalidUrl(_))));
    }
}
