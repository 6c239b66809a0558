//! Transfer offload
//!
//! File, image and folder envelopes never carry their data over the relay.
//! Outbound, the sender uploads the local path to the object store and sends
//! the resulting key; inbound, the receiver fetches the key into a download
//! directory and rewrites the payload to the local result path.
//!
//! Key layout:
//! - file/image with extension: `{namespace}/{clientId}/{millis}_{random}.{ext}`
//! - file/image without extension: `{namespace}/{clientId}/{millis}_{random}_{name}`
//! - folder prefix: `{namespace}/{clientId}/{millis}_{random}_{name}/`

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::envelope::{Envelope, MessageKind};
use crate::errors::TransferError;
use crate::store::SharedStore;
use crate::types::{short_random, unix_time_millis, unix_time_secs, ClientId};
use crate::walk::{relative_files, to_key_suffix};

/// Default key namespace for relayed transfers
pub const DEFAULT_NAMESPACE: &str = "cross_comm";

// ----------------------------------------------------------------------------
// Transfer Reports
// ----------------------------------------------------------------------------

/// Outcome of an outbound transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Object key (file/image) or key prefix ending in `/` (folder)
    pub store_key: String,
    /// Objects written to the store
    pub uploaded: usize,
    /// Files that could not be written (folders only)
    pub failed: usize,
}

impl UploadReport {
    /// True when some but not all folder entries were uploaded
    pub fn is_partial(&self) -> bool {
        self.failed > 0 && self.uploaded > 0
    }
}

/// Outcome of an inbound transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    /// Local file, or local folder holding the fetched tree
    pub local_path: PathBuf,
    /// Objects written to disk
    pub downloaded: usize,
    /// Objects that could not be fetched or written
    pub failed: usize,
}

// ----------------------------------------------------------------------------
// Transfer Offload
// ----------------------------------------------------------------------------

/// Moves file, image and folder payloads through the object store
#[derive(Clone)]
pub struct TransferOffload {
    store: Option<SharedStore>,
    namespace: String,
}

impl TransferOffload {
    /// Offload through `store`; `None` disables file transfer
    pub fn new(store: Option<SharedStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Offload without a store: every transfer fails as not configured
    pub fn disabled() -> Self {
        Self::new(None, DEFAULT_NAMESPACE)
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Upload `path` for an outbound envelope of `kind`
    pub async fn upload(
        &self,
        client_id: &ClientId,
        kind: MessageKind,
        path: &Path,
    ) -> Result<UploadReport, TransferError> {
        if !kind.is_transfer() {
            return Err(TransferError::NotTransferKind { kind });
        }
        let store = self.store.as_ref().ok_or(TransferError::StoreNotConfigured)?;

        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransferError::PathNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if kind == MessageKind::Folder {
            if !metadata.is_dir() {
                return Err(TransferError::ExpectedDirectory {
                    kind,
                    path: path.to_path_buf(),
                });
            }
            self.upload_folder(store, client_id, path).await
        } else {
            if !metadata.is_file() {
                return Err(TransferError::ExpectedFile {
                    kind,
                    path: path.to_path_buf(),
                });
            }
            let key = self.file_key(client_id, path);
            store.put_file(&key, path).await?;
            info!("Uploaded {} to store key {}", path.display(), key);
            Ok(UploadReport {
                store_key: key,
                uploaded: 1,
                failed: 0,
            })
        }
    }

    async fn upload_folder(
        &self,
        store: &SharedStore,
        client_id: &ClientId,
        folder: &Path,
    ) -> Result<UploadReport, TransferError> {
        let prefix = self.folder_prefix(client_id, folder);
        let root = folder.to_path_buf();
        let files = tokio::task::spawn_blocking(move || relative_files(&root, true))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        let mut uploaded = 0;
        let mut failed = 0;
        for relative in &files {
            let key = format!("{}{}", prefix, to_key_suffix(relative));
            match store.put_file(&key, &folder.join(relative)).await {
                Ok(()) => uploaded += 1,
                Err(e) => {
                    warn!("Failed to upload {}: {}", relative.display(), e);
                    failed += 1;
                }
            }
        }

        if uploaded == 0 {
            return Err(TransferError::NothingUploaded { failed });
        }
        if failed > 0 {
            warn!(
                "Folder upload to {} was partial: {} uploaded, {} failed",
                prefix, uploaded, failed
            );
        } else {
            info!("Uploaded {} files from folder to {}", uploaded, prefix);
        }
        Ok(UploadReport {
            store_key: prefix,
            uploaded,
            failed,
        })
    }

    /// Fetch the payload behind `store_key` into `download_dir`
    pub async fn download(
        &self,
        kind: MessageKind,
        store_key: &str,
        download_dir: &Path,
    ) -> Result<DownloadReport, TransferError> {
        if !kind.is_transfer() {
            return Err(TransferError::NotTransferKind { kind });
        }
        let store = self.store.as_ref().ok_or(TransferError::StoreNotConfigured)?;
        tokio::fs::create_dir_all(download_dir).await?;

        if kind == MessageKind::Folder {
            return download_folder(store, store_key, download_dir).await;
        }

        let file_name = key_base_name(store_key).ok_or_else(|| TransferError::InvalidStoreKey {
            key: store_key.to_string(),
        })?;
        let data = store.get_object(store_key).await?;
        let local_path = download_dir.join(file_name);
        tokio::fs::write(&local_path, data).await?;
        info!("Downloaded {} to {}", store_key, local_path.display());
        Ok(DownloadReport {
            local_path,
            downloaded: 1,
            failed: 0,
        })
    }

    /// Rewrite an inbound transfer envelope to point at its downloaded copy
    ///
    /// The store key is kept on the returned envelope for reference.
    pub async fn localize(
        &self,
        envelope: Envelope,
        download_dir: &Path,
    ) -> Result<Envelope, TransferError> {
        let key = match envelope.store_key() {
            Some(key) => key.to_string(),
            None => return Ok(envelope),
        };
        let report = self.download(envelope.kind(), &key, download_dir).await?;
        Ok(envelope.with_payload(report.local_path.display().to_string()))
    }

    /// Object key for a single file
    pub fn file_key(&self, client_id: &ClientId, path: &Path) -> String {
        let stamp = format!("{}_{}", unix_time_millis(), short_random());
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .filter(|ext| !ext.is_empty());
        match extension {
            Some(ext) => format!("{}/{}/{}.{}", self.namespace, client_id, stamp, ext),
            None => format!(
                "{}/{}/{}_{}",
                self.namespace,
                client_id,
                stamp,
                entry_name(path)
            ),
        }
    }

    /// Key prefix for a folder, ending in `/`
    pub fn folder_prefix(&self, client_id: &ClientId, path: &Path) -> String {
        format!(
            "{}/{}/{}_{}_{}/",
            self.namespace,
            client_id,
            unix_time_millis(),
            short_random(),
            entry_name(path)
        )
    }
}

impl core::fmt::Debug for TransferOffload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransferOffload")
            .field("configured", &self.is_configured())
            .field("namespace", &self.namespace)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

async fn download_folder(
    store: &SharedStore,
    prefix: &str,
    download_dir: &Path,
) -> Result<DownloadReport, TransferError> {
    if prefix.trim_matches('/').is_empty() || !prefix.ends_with('/') {
        return Err(TransferError::InvalidFolderPrefix {
            key: prefix.to_string(),
        });
    }
    let local_root = fresh_folder(download_dir).await?;
    let keys = store.list_keys(prefix).await?;

    let mut downloaded = 0;
    let mut failed = 0;
    for key in &keys {
        let relative = &key[prefix.len()..];
        let Some(target) = safe_join(&local_root, relative) else {
            debug!("Skipping store key {} outside of folder prefix", key);
            continue;
        };
        match fetch_to(store, key, &target).await {
            Ok(()) => downloaded += 1,
            Err(e) => {
                warn!("Failed to download {}: {}", key, e);
                failed += 1;
            }
        }
    }

    if downloaded == 0 {
        warn!("Folder download from {} fetched no files", prefix);
    } else {
        info!(
            "Downloaded {} files from {} into {} ({} failed)",
            downloaded,
            prefix,
            local_root.display(),
            failed
        );
    }
    Ok(DownloadReport {
        local_path: local_root,
        downloaded,
        failed,
    })
}

async fn fetch_to(store: &SharedStore, key: &str, target: &Path) -> Result<(), TransferError> {
    let data = store.get_object(key).await?;
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, data).await?;
    Ok(())
}

/// New `folder_{unixSeconds}` directory under `parent`, suffixed on collision
async fn fresh_folder(parent: &Path) -> Result<PathBuf, TransferError> {
    let base = format!("folder_{}", unix_time_secs() as u64);
    let mut candidate = parent.join(&base);
    let mut attempt = 1;
    while tokio::fs::try_exists(&candidate).await? {
        candidate = parent.join(format!("{}_{}", base, attempt));
        attempt += 1;
    }
    tokio::fs::create_dir_all(&candidate).await?;
    Ok(candidate)
}

/// Join a `/`-separated relative key onto `root`, refusing anything that escapes it
fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    let mut pushed = false;
    for part in relative.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            part if part.contains('\\') => return None,
            part => {
                path.push(part);
                pushed = true;
            }
        }
    }
    pushed.then_some(path)
}

fn key_base_name(key: &str) -> Option<&str> {
    key.rsplit('/').next().filter(|name| !name.is_empty())
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
}
