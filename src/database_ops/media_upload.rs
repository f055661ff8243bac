//! Download a remote image and bind it to a record field.

use rand::{distributions::Alphanumeric, thread_rng, Rng};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::store::{
    AssetField, BinaryAttachment, RecordRef, Store, StoreError, StoredFile,
};
use crate::util::http::{FetchError, FetchedBody, HttpFetch};

/// Every stored asset uses this extension regardless of the source format.
pub const ASSET_EXT: &str = ".jpg";
const SUFFIX_LEN: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    /// A required attachment field was empty; the call is rejected, never retried.
    #[error("attachment is missing `{0}`")]
    Invalid(&'static str),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AttachError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, AttachError::Invalid(_))
    }
}

#[derive(Clone)]
pub struct AssetUploader {
    fetch: Arc<dyn HttpFetch>,
    store: Arc<dyn Store>,
}

impl AssetUploader {
    pub fn new(fetch: Arc<dyn HttpFetch>, store: Arc<dyn Store>) -> Self {
        Self { fetch, store }
    }

    /// Fetch `url` and attach it to `target.field` at `position`, named after `slug`.
    ///
    /// `Cover` is single-valued; attaching a second cover to the same record is a
    /// caller error and is not checked here.
    #[instrument(skip(self))]
    pub async fn attach(
        &self,
        url: &str,
        target: RecordRef,
        slug: &str,
        field: AssetField,
        position: u32,
    ) -> Result<StoredFile, AttachError> {
        let body = self.fetch.get_bytes(url).await?;
        let attachment = build_attachment(body, slug, target, field, position)?;
        let stored = self.store.attach_file(attachment).await?;
        debug!(file_id = stored.id, stored_name = %stored.stored_name, "asset attached");
        Ok(stored)
    }
}

/// Validate a fetched body and wrap it for the store.
pub fn build_attachment(
    body: FetchedBody,
    slug: &str,
    target: RecordRef,
    field: AssetField,
    position: u32,
) -> Result<BinaryAttachment, AttachError> {
    let mime = body
        .content_type
        .as_deref()
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if mime.is_empty() {
        return Err(AttachError::Invalid("mime"));
    }
    let slug = slug.trim();
    if slug.is_empty() {
        return Err(AttachError::Invalid("filename"));
    }
    if body.bytes.is_empty() {
        return Err(AttachError::Invalid("content"));
    }

    Ok(BinaryAttachment {
        size: body.bytes.len() as u64,
        content: body.bytes,
        mime,
        ext: ASSET_EXT.to_string(),
        filename: format!("{slug}{ASSET_EXT}"),
        stored_name: stored_name(slug),
        target,
        field,
        position,
    })
}

/// `{base}_{random}{ext}` so uploads sharing a slug never overwrite each other.
pub fn stored_name(base: &str) -> String {
    let suffix: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{base}_{suffix}{ASSET_EXT}")
}
