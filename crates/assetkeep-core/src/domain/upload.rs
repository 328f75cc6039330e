//! Asset upload requests and their validation.

use assetkeep_state::AssetType;
use serde::{Deserialize, Serialize};

use super::error::{AssetError, Result};

/// One (type, locator) pair as reported by a build uploader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetUpload {
    /// Wire name of the asset type, e.g. `"kernel_object"`.
    pub asset_type: String,
    pub download_url: String,
}

impl AssetUpload {
    pub fn new(asset_type: AssetType, download_url: impl Into<String>) -> Self {
        Self {
            asset_type: asset_type.as_str().to_string(),
            download_url: download_url.into(),
        }
    }

    /// Check the type is known and the locator is non-empty.
    pub fn validate(&self) -> Result<ValidatedUpload> {
        let asset_type: AssetType = self.asset_type.parse().map_err(|_| {
            AssetError::InvalidArgument(format!("unknown asset type: {:?}", self.asset_type))
        })?;

        let download_url = self.download_url.trim();
        if download_url.is_empty() {
            return Err(AssetError::InvalidArgument(format!(
                "empty download url for {} asset",
                asset_type
            )));
        }

        Ok(ValidatedUpload {
            asset_type,
            download_url: download_url.to_string(),
        })
    }
}

/// An upload that passed [`AssetUpload::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub asset_type: AssetType,
    pub download_url: String,
}

/// Validate a whole batch. Nothing is accepted unless everything is.
pub fn validate_batch(uploads: &[AssetUpload]) -> Result<Vec<ValidatedUpload>> {
    if uploads.is_empty() {
        return Err(AssetError::InvalidArgument(
            "asset list must not be empty".to_string(),
        ));
    }
    uploads.iter().map(AssetUpload::validate).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_type_and_url_pass() {
        let upload = AssetUpload::new(AssetType::BootableDisk, " http://x/disk.raw ");
        let v = upload.validate().unwrap();
        assert_eq!(v.asset_type, AssetType::BootableDisk);
        assert_eq!(v.download_url, "http://x/disk.raw");
    }

    #[test]
    fn unknown_type_rejected() {
        let upload = AssetUpload {
            asset_type: "vmlinux".to_string(),
            download_url: "http://x/vmlinux".to_string(),
        };
        let err = upload.validate().unwrap_err();
        assert!(matches!(err, AssetError::InvalidArgument(_)));
        assert!(err.to_string().contains("vmlinux"));
    }

    #[test]
    fn blank_url_rejected() {
        let upload = AssetUpload::new(AssetType::KernelObject, "   ");
        assert!(matches!(
            upload.validate(),
            Err(AssetError::InvalidArgument(_))
        ));
    }

    #[test]
    fn batch_rejects_empty_and_any_bad_item() {
        assert!(validate_batch(&[]).is_err());

        let batch = vec![
            AssetUpload::new(AssetType::KernelObject, "http://x/vmlinux"),
            AssetUpload::new(AssetType::BootableDisk, ""),
        ];
        assert!(validate_batch(&batch).is_err());
    }
}
