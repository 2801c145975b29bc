use super::{MessageStore, miss};
use crate::body::{self, ReplayBody};
use crate::container::{ResponseContainer, assemble_response};
use crate::error::ReplayError;
use crate::headers::HeaderMultimap;
use crate::key::{KeyDeriver, UrlKeyDeriver};
use async_trait::async_trait;
use bytes::Bytes;
use http::request::Parts;
use http::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File};

/// Metadata file extension
const METADATA_EXTENSION: &str = "json";

/// Body file extension
const BODY_EXTENSION: &str = "data";

/// On-disk metadata for one entry (`<hash>.json`).
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredMetadata {
    status_code: u16,
    #[serde(default)]
    reason_phrase: String,
    #[serde(default)]
    response_headers: HeaderMultimap,
    #[serde(default)]
    content_headers: HeaderMultimap,
}

/// Store that persists each entry as two files under a root directory.
///
/// Entry files are named after the uppercase hex SHA-1 of the request key:
/// `<hash>.json` holds status, reason phrase and headers, `<hash>.data` holds
/// the raw body and is absent for body-less entries. Each file is written to
/// a temporary name and renamed into place, so a `load` never observes a
/// half-written file. There is no locking: concurrent writers of the same key
/// race and the last rename wins, per file.
#[derive(Clone)]
pub struct FileSystemStore {
    root: PathBuf,
    key_deriver: Arc<dyn KeyDeriver>,
}

impl FileSystemStore {
    /// Store rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_key_deriver(root, UrlKeyDeriver)
    }

    #[must_use]
    pub fn with_key_deriver(
        root: impl Into<PathBuf>,
        key_deriver: impl KeyDeriver + 'static,
    ) -> Self {
        Self {
            root: root.into(),
            key_deriver: Arc::new(key_deriver),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File stem for `key`: uppercase hex SHA-1.
    #[must_use]
    pub fn path_key(key: &str) -> String {
        hex::encode_upper(Sha1::digest(key.as_bytes()))
    }

    /// `(metadata, body)` file paths for `key`.
    #[must_use]
    pub fn paths_for_key(&self, key: &str) -> (PathBuf, PathBuf) {
        let stem = Self::path_key(key);
        (
            self.root.join(format!("{stem}.{METADATA_EXTENSION}")),
            self.root.join(format!("{stem}.{BODY_EXTENSION}")),
        )
    }

    async fn ensure_root(&self) -> Result<(), ReplayError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ReplayError::io(&self.root, e))
    }

    /// Write `contents` next to `path` under a temporary name, then rename.
    ///
    /// Both steps run on one blocking task. Once spawned it runs to
    /// completion even if the caller's future is dropped, so a cancelled
    /// `put` leaves either the renamed file or nothing, never a temp file.
    async fn write_atomic(&self, path: PathBuf, contents: Bytes) -> Result<(), ReplayError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = self
            .root
            .join(format!(".{file_name}.{:016x}.tmp", rand::random::<u64>()));

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_then_rename(&tmp, &target, &contents))
            .await
            .map_err(|e| ReplayError::io(path, std::io::Error::other(e)))?
    }

    async fn read_metadata(&self, path: &Path) -> Result<StoredMetadata, ReplayError> {
        let raw = fs::read(path).await.map_err(|e| ReplayError::io(path, e))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn open_body(path: &Path) -> Option<ReplayBody> {
        match File::open(path).await {
            Ok(file) => Some(body::from_file(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "stored body exists but cannot be opened; replaying without body"
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for FileSystemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn write_then_rename(tmp: &Path, path: &Path, contents: &[u8]) -> Result<(), ReplayError> {
    if let Err(e) = std::fs::write(tmp, contents) {
        discard(tmp);
        return Err(ReplayError::io(tmp, e));
    }
    if let Err(e) = std::fs::rename(tmp, path) {
        discard(tmp);
        return Err(ReplayError::io(path, e));
    }
    Ok(())
}

/// Best-effort removal of a leftover temporary file.
fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != ErrorKind::NotFound
    {
        tracing::debug!(path = %path.display(), error = %e, "failed to remove temporary file");
    }
}

/// Remove a file, treating "already gone" as success.
async fn remove_if_exists(path: &Path) -> Result<bool, ReplayError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ReplayError::io(path, e)),
    }
}

#[async_trait]
impl MessageStore for FileSystemStore {
    fn key_deriver(&self) -> &dyn KeyDeriver {
        self.key_deriver.as_ref()
    }

    async fn put(&self, container: ResponseContainer) -> Result<(), ReplayError> {
        self.ensure_root().await?;
        let (metadata_path, body_path) = self.paths_for_key(&container.request_key);

        // Body first: metadata is what makes the entry visible to `load`.
        match &container.body {
            Some(bytes) => self.write_atomic(body_path, bytes.clone()).await?,
            None => {
                remove_if_exists(&body_path).await?;
            }
        }

        let metadata = StoredMetadata {
            status_code: container.status.as_u16(),
            reason_phrase: container.reason_phrase,
            response_headers: container.response_headers,
            content_headers: container.content_headers,
        };
        let json = serde_json::to_vec_pretty(&metadata)?;
        self.write_atomic(metadata_path.clone(), Bytes::from(json)).await?;

        tracing::debug!(
            key = %container.request_key,
            path = %metadata_path.display(),
            status = metadata.status_code,
            "stored response on disk"
        );
        Ok(())
    }

    async fn load(&self, request: &Parts) -> Response<ReplayBody> {
        let key = self.key_for(request);
        let (metadata_path, body_path) = self.paths_for_key(&key);

        if !fs::try_exists(&metadata_path).await.unwrap_or(false) {
            tracing::debug!(
                key = %key,
                path = %metadata_path.display(),
                "no stored response on disk"
            );
            return miss(&format!(
                "No stored response at '{}'",
                metadata_path.display()
            ));
        }

        let metadata = match self.read_metadata(&metadata_path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    path = %metadata_path.display(),
                    error = %e,
                    "stored metadata is unreadable"
                );
                return miss(&format!(
                    "Unreadable stored response at '{}'",
                    metadata_path.display()
                ));
            }
        };

        let Ok(status) = StatusCode::from_u16(metadata.status_code) else {
            tracing::warn!(
                path = %metadata_path.display(),
                status = metadata.status_code,
                "stored metadata has an invalid status code"
            );
            return miss(&format!(
                "Invalid status code in '{}'",
                metadata_path.display()
            ));
        };

        let body = Self::open_body(&body_path).await;
        assemble_response(
            status,
            &metadata.reason_phrase,
            &metadata.response_headers,
            &metadata.content_headers,
            body,
        )
        .unwrap_or_else(|e| {
            tracing::warn!(
                path = %metadata_path.display(),
                error = %e,
                "stored response cannot be replayed"
            );
            miss(&format!(
                "Stored response at '{}' cannot be replayed",
                metadata_path.display()
            ))
        })
    }

    async fn remove(&self, request: &Parts) -> Result<bool, ReplayError> {
        let (metadata_path, body_path) = self.paths_for_key(&self.key_for(request));
        let existed = remove_if_exists(&metadata_path).await?;
        remove_if_exists(&body_path).await?;
        Ok(existed)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::container::reason_phrase;
    use crate::store::test_support::{get, request};
    use http::Method;
    use hyper::ext::ReasonPhrase;
    use serde_json::json;

    fn live(status: u16, body: Option<&'static str>) -> Response<Option<Bytes>> {
        Response::builder()
            .status(status)
            .header("content-type", "text/plain")
            .header("set-cookie", "a=1")
            .header("set-cookie", "b=2")
            .body(body.map(|text| Bytes::from_static(text.as_bytes())))
            .unwrap()
    }

    #[test]
    fn test_path_key_is_uppercase_sha1() {
        assert_eq!(
            FileSystemStore::path_key("abc"),
            "A9993E364706816ABA3E25717850C26C9CD0D89D"
        );
        assert_eq!(
            FileSystemStore::path_key("http://x/a"),
            FileSystemStore::path_key("http://x/a")
        );
    }

    #[test]
    fn test_paths_for_key() {
        let store = FileSystemStore::new("/fixtures");
        let (json, data) = store.paths_for_key("abc");
        assert_eq!(
            json,
            PathBuf::from("/fixtures/A9993E364706816ABA3E25717850C26C9CD0D89D.json")
        );
        assert_eq!(
            data,
            PathBuf::from("/fixtures/A9993E364706816ABA3E25717850C26C9CD0D89D.data")
        );
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path().join("nested/fixtures"));

        let mut response = live(200, Some("hi"));
        response
            .extensions_mut()
            .insert(ReasonPhrase::from_static(b"Fine Thanks"));
        store.save(&get("http://x/a"), &response).await.unwrap();

        let loaded = store.load(&get("http://x/a")).await;
        assert_eq!(loaded.status(), StatusCode::OK);
        assert_eq!(reason_phrase(&loaded), "Fine Thanks");
        assert_eq!(loaded.headers()["content-type"], "text/plain");
        let cookies: Vec<_> = loaded.headers().get_all("set-cookie").iter().collect();
        assert_eq!(cookies, ["a=1", "b=2"]);
        let bytes = body::collect(loaded.into_body()).await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"hi"[..]));
    }

    #[tokio::test]
    async fn test_metadata_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path());
        store.save(&get("http://x/a"), &live(200, Some("hi"))).await.unwrap();

        let (json_path, data_path) = store.paths_for_key("http://x/a");
        let metadata: serde_json::Value =
            serde_json::from_slice(&std::fs::read(json_path).unwrap()).unwrap();
        assert_eq!(metadata["statusCode"], 200);
        assert_eq!(metadata["reasonPhrase"], "OK");
        assert_eq!(metadata["responseHeaders"], json!({"set-cookie": ["a=1", "b=2"]}));
        assert_eq!(metadata["contentHeaders"], json!({"content-type": ["text/plain"]}));
        assert_eq!(std::fs::read(data_path).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn test_no_temporary_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path());
        store.save(&get("http://x/a"), &live(200, Some("hi"))).await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        let stem = FileSystemStore::path_key("http://x/a");
        assert_eq!(names, [format!("{stem}.data"), format!("{stem}.json")]);
    }

    #[tokio::test]
    async fn test_miss_names_metadata_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path());
        let response = store.load(&get("http://x/never-saved")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let (json_path, _) = store.paths_for_key("http://x/never-saved");
        assert!(reason_phrase(&response).contains(&json_path.display().to_string()));
        assert_eq!(body::collect(response.into_body()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_response_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path().join("fixtures"));
        store.save(&get("http://x/a"), &live(500, Some("boom"))).await.unwrap();

        assert!(!store.root().exists());
        assert_eq!(store.load(&get("http://x/a")).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metadata_without_body_file_loads_without_body() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path());
        store.save(&get("http://x/a"), &live(200, Some("hi"))).await.unwrap();

        let (_, data_path) = store.paths_for_key("http://x/a");
        std::fs::remove_file(data_path).unwrap();

        let response = store.load(&get("http://x/a")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get("content-type").is_none());
        assert_eq!(body::collect(response.into_body()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_body_file_without_metadata_is_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path());
        let (_, data_path) = store.paths_for_key("http://x/orphan");
        std::fs::write(data_path, b"orphan").unwrap();

        let response = store.load(&get("http://x/orphan")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_corrupted_metadata_degrades_to_404() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path());
        let (json_path, _) = store.paths_for_key("http://x/bad");
        std::fs::write(json_path, b"{not json").unwrap();

        let response = store.load(&get("http://x/bad")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(reason_phrase(&response).starts_with("Unreadable stored response"));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path());
        let req = get("http://x/a");
        store.save(&req, &live(200, Some("first"))).await.unwrap();
        store.save(&req, &live(202, Some("second"))).await.unwrap();

        let response = store.load(&req).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let bytes = body::collect(response.into_body()).await.unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"second"[..]));
    }

    #[tokio::test]
    async fn test_register_body_less_fixture_removes_stale_body() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path());
        store.save(&get("http://x/a"), &live(200, Some("old"))).await.unwrap();

        store
            .register(|b| {
                Ok(b.url("http://x/a")
                    .status(StatusCode::NO_CONTENT)
                    .header("X-Fixture", "yes"))
            })
            .await
            .unwrap();

        let (_, data_path) = store.paths_for_key("http://x/a");
        assert!(!data_path.exists());
        let response = store.load(&request(Method::DELETE, "http://x/a")).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()["x-fixture"], "yes");
        assert_eq!(body::collect(response.into_body()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_survive_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        FileSystemStore::new(dir.path())
            .save(&get("http://x/a"), &live(200, Some("persisted")))
            .await
            .unwrap();

        let reopened = FileSystemStore::new(dir.path());
        let bytes = body::collect(reopened.load(&get("http://x/a")).await.into_body())
            .await
            .unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"persisted"[..]));
    }

    #[tokio::test]
    async fn test_remove_deletes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path());
        let req = get("http://x/a");
        store.save(&req, &live(200, Some("hi"))).await.unwrap();

        assert!(store.remove(&req).await.unwrap());
        let (json_path, data_path) = store.paths_for_key("http://x/a");
        assert!(!json_path.exists());
        assert!(!data_path.exists());
        assert!(!store.remove(&req).await.unwrap());
    }

    fn temp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect()
    }

    #[tokio::test]
    async fn test_cancelled_put_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSystemStore::new(dir.path());
        let container = crate::ContainerBuilder::new()
            .url("http://x/large")
            .body_bytes(vec![7u8; 1024 * 1024])
            .build()
            .unwrap();

        for attempt in 0..10u64 {
            let deadline = std::time::Duration::from_micros(attempt * 100);
            _ = tokio::time::timeout(deadline, store.put(container.clone())).await;
        }

        // writes already handed to the blocking pool finish on their own
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert!(temp_files(dir.path()).is_empty(), "{:?}", temp_files(dir.path()));

        let response = store.load(&get("http://x/large")).await;
        if response.status() == StatusCode::OK {
            let bytes = body::collect(response.into_body()).await.unwrap().unwrap();
            assert_eq!(bytes.len(), 1024 * 1024);
        }
    }

    #[test]
    fn test_failed_write_removes_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join(".entry.json.tmp");
        // rename onto a non-empty directory fails after the temp file exists
        let target = dir.path().join("occupied");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("inner"), b"x").unwrap();

        let result = write_then_rename(&tmp, &target, b"{}");
        assert!(matches!(result, Err(ReplayError::Io { .. })));
        assert!(!tmp.exists());
    }
}
