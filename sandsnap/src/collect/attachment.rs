use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::error::{QueryError, QueryResult};

/// Attachment listing (`.../{objectId}/attachments?f=pjson`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttachmentListing {
    #[serde(default)]
    pub attachment_infos: Vec<AttachmentInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttachmentInfo {
    pub id: u64,
    pub name: Option<String>,
    pub content_type: Option<String>,
    /// Some servers link the payload directly, absolute or relative.
    pub url: Option<String>,
}

impl AttachmentInfo {
    /// Absolute URL of the payload, resolved against the listing URL.
    pub fn resolve(&self, listing_url: &Url) -> QueryResult<Url> {
        // Url::join replaces the last segment unless the base ends with '/'.
        let mut base = listing_url.clone();
        base.set_query(None);
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let link = match &self.url {
            Some(link) => link.clone(),
            None => self.id.to_string(),
        };
        base.join(&link)
            .map_err(|e| QueryError::invalid(format!("bad attachment link {link:?}: {e}")))
    }
}

/// Binary payload of a record's first attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub record_id: u64,
    pub id: u64,
    pub name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl Attachment {
    /// File name used by [`Attachment::save_in`]: `{record_id}_{name}`,
    /// falling back to `{record_id}_{id}.bin`.
    pub fn file_name(&self) -> String {
        let name = self
            .name
            .as_deref()
            .and_then(|n| Path::new(n).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.bin", self.id));
        format!("{}_{}", self.record_id, name)
    }

    /// Write the payload into `dir`, creating it if needed.
    pub fn save_in(&self, dir: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
        use anyhow::Context;

        let dir = dir.as_ref();
        fs::create_dir_all(dir).context(format!("Failed to create directory: {:?}", dir))?;
        let path = dir.join(self.file_name());
        fs::write(&path, &self.data).context(format!("Failed to write file: {:?}", path))?;
        log::info!("Saved attachment {} of record {} to {:?}", self.id, self.record_id, path);
        Ok(path)
    }
}
