//! Store handle and document I/O.

use crate::document::{Document, validate_id};
use crate::error::{Error, Result};
use crate::events::{EVENT_CAPACITY, StoreEvent};
use crate::format::{Format, Json};
use crate::idgen::{IdGenerator, RandomDigits};
use crate::stream::{BufferedSink, ChannelSink, DocumentStream, ScanSink};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::fmt;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Configuration for a [`Store`].
///
/// Defaults to plain JSON documents with random-digit identifiers.
#[derive(Clone)]
pub struct StoreOptions {
    format: Arc<dyn Format>,
    id_generator: Arc<dyn IdGenerator>,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `format` to name and encode documents.
    pub fn format(self, format: impl Format + 'static) -> Self {
        self.shared_format(Arc::new(format))
    }

    pub fn shared_format(mut self, format: Arc<dyn Format>) -> Self {
        self.format = format;
        self
    }

    /// Use `id_generator` for documents saved without an identifier.
    pub fn id_generator(self, id_generator: impl IdGenerator + 'static) -> Self {
        self.shared_id_generator(Arc::new(id_generator))
    }

    pub fn shared_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            format: Arc::new(Json),
            id_generator: Arc::new(RandomDigits),
        }
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// A directory of documents, one file per document.
///
/// The handle holds only configuration; every operation goes to the
/// filesystem. Cloning is cheap and clones share the event channel.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    format: Arc<dyn Format>,
    id_generator: Arc<dyn IdGenerator>,
    events: broadcast::Sender<StoreEvent>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("dir", &self.inner.dir)
            .field("format", &self.inner.format)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Create a JSON store over `dir`.
    ///
    /// The directory is expected to exist; see [`Store::open`] to create it.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self::with_options(dir, StoreOptions::default())
    }

    /// Create a store over `dir` with explicit options.
    pub fn with_options<P: AsRef<Path>>(dir: P, options: StoreOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                dir: dir.as_ref().to_path_buf(),
                format: options.format,
                id_generator: options.id_generator,
                events,
            }),
        }
    }

    /// Open a JSON store, creating the directory if it does not exist.
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_with(dir, StoreOptions::default()).await
    }

    /// Open a store with explicit options, creating the directory if needed.
    ///
    /// Fails with [`Error::NotADirectory`] if the path exists but is not a
    /// directory.
    pub async fn open_with<P: AsRef<Path>>(dir: P, options: StoreOptions) -> Result<Self> {
        let dir = dir.as_ref();

        match fs::metadata(dir).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(Error::not_a_directory(dir)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                fs::create_dir_all(dir).await?;
                info!(path = %dir.display(), "created document directory");
            }
            Err(err) => return Err(err.into()),
        }

        debug!(path = %dir.display(), "opened store");
        Ok(Self::with_options(dir, options))
    }

    /// Get the document directory.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Get the document format.
    pub fn format(&self) -> &dyn Format {
        self.inner.format.as_ref()
    }

    /// File extension of documents in this store.
    pub fn extension(&self) -> &str {
        self.inner.format.extension()
    }

    /// Get the path of the file holding document `id`.
    ///
    /// Returns: `{dir}/{id}{extension}`
    pub fn document_path(&self, id: &str) -> Result<PathBuf> {
        validate_id(id)?;
        Ok(self
            .inner
            .dir
            .join(format!("{}{}", id, self.inner.format.extension())))
    }

    /// Subscribe to the outcomes of `save`, `get`, `remove` and `clear`.
    ///
    /// Only events published after subscribing are received.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    fn publish(&self, event: impl FnOnce() -> StoreEvent) {
        if self.inner.events.receiver_count() > 0 {
            let _ = self.inner.events.send(event());
        }
    }

    /// Save a document, assigning an identifier if it has none.
    ///
    /// Overwrites any existing document with the same identifier. Returns
    /// the document as written, including its identifier; `document` itself
    /// is left untouched.
    pub async fn save(&self, document: &Document) -> Result<Document> {
        let result = self.write_document(document).await;

        match &result {
            Ok(saved) => {
                debug!(id = saved.id().unwrap_or_default(), "saved document");
                self.publish(|| StoreEvent::Saved {
                    document: saved.clone(),
                    error: None,
                });
            }
            Err(err) => {
                debug!(error = %err, "failed to save document");
                self.publish(|| StoreEvent::Saved {
                    document: document.clone(),
                    error: Some(err.to_string()),
                });
            }
        }

        result
    }

    async fn write_document(&self, document: &Document) -> Result<Document> {
        let mut saved = document.clone();
        let id = match document.id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.inner.id_generator.generate();
                saved.set_id(id.clone());
                id
            }
        };

        let path = self.document_path(&id)?;
        let dir = self.inner.dir.clone();
        let format = self.inner.format.clone();

        // Encoding may run a key derivation; keep it off the async workers.
        run_blocking(move || {
            let bytes = format.serialize(&saved)?;
            write_atomic(&dir, &path, &bytes)?;
            Ok(saved)
        })
        .await
    }

    /// Read document `id`.
    ///
    /// The returned document's `_id` is always `id`, whatever identifier the
    /// stored bytes carry.
    pub async fn get(&self, id: &str) -> Result<Document> {
        let result = self.read_document(id).await;

        if let Err(err) = &result {
            debug!(id, error = %err, "failed to read document");
        }
        self.publish(|| StoreEvent::Fetched {
            id: id.to_string(),
            document: result.as_ref().ok().cloned(),
            error: result.as_ref().err().map(ToString::to_string),
        });

        result
    }

    async fn read_document(&self, id: &str) -> Result<Document> {
        let path = self.document_path(id)?;
        let format = self.inner.format.clone();
        let id = id.to_string();

        run_blocking(move || {
            let bytes = std::fs::read(&path).map_err(|e| Error::from_document_io(&id, e))?;
            let mut document = format.deserialize(&bytes)?;
            document.set_id(id);
            Ok(document)
        })
        .await
    }

    /// Remove document `id`.
    ///
    /// Removing a document that does not exist is an error, unlike in
    /// [`Store::clear`].
    pub async fn remove(&self, id: &str) -> Result<()> {
        let result = self.remove_document(id).await;

        match &result {
            Ok(()) => debug!(id, "removed document"),
            Err(err) => debug!(id, error = %err, "failed to remove document"),
        }
        self.publish(|| StoreEvent::Removed {
            id: id.to_string(),
            error: result.as_ref().err().map(ToString::to_string),
        });

        result
    }

    async fn remove_document(&self, id: &str) -> Result<()> {
        let path = self.document_path(id)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| Error::from_document_io(id, e))
    }

    /// List the identifiers of all documents, sorted.
    ///
    /// Only regular entries ending in the store's extension count; anything
    /// else in the directory is ignored.
    pub async fn ids(&self) -> Result<Vec<String>> {
        let extension = self.extension();
        let mut entries = fs::read_dir(&self.inner.dir).await?;
        let mut ids = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            // Follows symlinks, so a link to a directory is not a document.
            let metadata = match fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            if metadata.is_dir() {
                continue;
            }

            let file_name = entry.file_name();
            if let Some(id) = file_name
                .to_str()
                .and_then(|name| id_from_file_name(name, extension))
            {
                ids.push(id.to_string());
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// Run `op` for every document concurrently and join the outcomes.
    ///
    /// Not-found outcomes are skipped. The first other error is returned
    /// after every operation has finished; items completing after it are not
    /// passed to `on_item`.
    async fn fan_out<T, F, Fut>(&self, op: F, mut on_item: impl FnMut(T)) -> Result<()>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let ids = self.ids().await?;

        let mut pending: FuturesUnordered<_> = ids
            .into_iter()
            .map(|id| {
                let fut = op(id.clone());
                async move { (id, fut.await) }
            })
            .collect();

        let mut first_error = None;
        while let Some((id, outcome)) = pending.next().await {
            match outcome {
                Ok(item) => {
                    if first_error.is_none() {
                        on_item(item);
                    }
                }
                Err(err) if err.is_not_found() => {
                    warn!(id = %id, "document disappeared during bulk operation, skipping");
                }
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    } else {
                        debug!(id = %id, error = %err, "additional failure during bulk operation");
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Remove every document in the store.
    ///
    /// Documents deleted by someone else while clearing are not an error.
    /// Files without the store's extension are left alone.
    pub async fn clear(&self) -> Result<()> {
        let mut removed = 0usize;
        let result = self
            .fan_out(
                move |id| async move { self.remove_document(&id).await },
                |()| removed += 1,
            )
            .await;

        match &result {
            Ok(()) => debug!(removed, "cleared store"),
            Err(err) => debug!(removed, error = %err, "failed to clear store"),
        }
        self.publish(|| StoreEvent::Cleared {
            error: result.as_ref().err().map(ToString::to_string),
        });

        result
    }

    async fn run_scan<P, S>(&self, filter: &P, mut sink: S) -> S::Output
    where
        P: Fn(&Document) -> bool,
        S: ScanSink,
    {
        let outcome = self
            .fan_out(
                move |id| async move { self.read_document(&id).await },
                |document| {
                    if filter(&document) {
                        sink.emit_item(document);
                    }
                },
            )
            .await;

        match outcome {
            Ok(()) => sink.emit_done(),
            Err(err) => sink.emit_error(err),
        }
    }

    /// Read every document and return those matching `filter`.
    ///
    /// Order is unspecified. Documents deleted while scanning are skipped;
    /// any other read failure fails the whole scan.
    pub async fn scan<P>(&self, filter: P) -> Result<Vec<Document>>
    where
        P: Fn(&Document) -> bool,
    {
        self.run_scan(&filter, BufferedSink::default()).await
    }

    /// Return every document in the store.
    pub async fn all(&self) -> Result<Vec<Document>> {
        self.scan(|_| true).await
    }

    /// Start a scan and return its event stream immediately.
    ///
    /// The scan runs on a spawned tokio task; matching documents are yielded
    /// as they are read, followed by one terminal event.
    pub fn scan_stream<P>(&self, filter: P) -> DocumentStream
    where
        P: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();

        tokio::spawn(async move {
            store.run_scan(&filter, ChannelSink::new(tx)).await;
        });

        DocumentStream::new(rx)
    }

    /// Stream every document in the store.
    pub fn all_stream(&self) -> DocumentStream {
        self.scan_stream(|_| true)
    }
}

/// Run blocking filesystem and codec work on tokio's blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Io {
            source: std::io::Error::other(e),
        })?
}

/// Derive a document identifier from a directory entry name.
fn id_from_file_name<'a>(name: &'a str, extension: &str) -> Option<&'a str> {
    let id = name.strip_suffix(extension)?;
    validate_id(id).ok().map(|()| id)
}

/// Write a document atomically using tempfile.
///
/// The temporary file has no document extension, so it is never visible to
/// listings.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut temp_file = tempfile::NamedTempFile::new_in(dir)?;
    temp_file.write_all(bytes)?;
    temp_file.flush()?;
    temp_file.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Cipher, Encrypted};
    use serde_json::json;
    use std::fs as stdfs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    /// Format that writes a constant and reads it back under `ret`.
    #[derive(Debug)]
    struct ConstantFormat;

    impl Format for ConstantFormat {
        fn extension(&self) -> &str {
            ".test"
        }

        fn serialize(&self, _document: &Document) -> Result<Vec<u8>> {
            Ok(b"1".to_vec())
        }

        fn deserialize(&self, bytes: &[u8]) -> Result<Document> {
            let text = String::from_utf8_lossy(bytes).into_owned();
            Ok(doc(json!({ "ret": text })))
        }
    }

    #[test]
    fn test_defaults_to_json() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());
        assert_eq!(store.extension(), ".json");
        assert_eq!(store.dir(), temp_dir.path());
    }

    #[test]
    fn test_document_path() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());

        let path = store.document_path("abc").unwrap();
        assert_eq!(path, temp_dir.path().join("abc.json"));
        assert!(store.document_path("../abc").is_err());
    }

    #[test]
    fn test_id_from_file_name() {
        assert_eq!(id_from_file_name("a.json", ".json"), Some("a"));
        assert_eq!(id_from_file_name("a.b.json", ".json"), Some("a.b"));
        assert_eq!(id_from_file_name("a.json.enc", ".json"), None);
        assert_eq!(id_from_file_name("a.json.enc", ".json.enc"), Some("a"));
        assert_eq!(id_from_file_name(".json", ".json"), None);
        assert_eq!(id_from_file_name("readme.txt", ".json"), None);
    }

    #[tokio::test]
    async fn test_open_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("docs");

        let store = Store::open(&dir).await.unwrap();
        assert_eq!(store.dir(), dir);
        assert!(dir.is_dir());

        // Opening again reuses the existing directory.
        Store::open(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_rejects_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file.txt");
        stdfs::write(&file, "not a directory").unwrap();

        let err = Store::open(&file).await.unwrap_err();
        assert!(matches!(err, Error::NotADirectory { .. }));
    }

    #[tokio::test]
    async fn test_save_generates_id() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());

        let original = doc(json!({ "create": true }));
        let saved = store.save(&original).await.unwrap();

        let id = saved.id().unwrap();
        assert!(!id.is_empty());
        assert!(temp_dir.path().join(format!("{id}.json")).is_file());
        assert_eq!(original.id(), None);
    }

    #[tokio::test]
    async fn test_save_uses_given_id() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());

        let saved = store
            .save(&doc(json!({ "_id": "k1", "create": true })))
            .await
            .unwrap();
        assert_eq!(saved.id(), Some("k1"));
        assert!(temp_dir.path().join("k1.json").is_file());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());

        let mut saved = store.save(&doc(json!({ "create": true }))).await.unwrap();
        saved.insert("create", false);
        let second = store.save(&saved).await.unwrap();
        assert_eq!(second.id(), saved.id());

        let path = store.document_path(saved.id().unwrap()).unwrap();
        let on_disk: serde_json::Value = serde_json::from_slice(&stdfs::read(path).unwrap()).unwrap();
        assert_eq!(on_disk["create"], json!(false));
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());

        store.save(&doc(json!({ "_id": "a" }))).await.unwrap();
        let names: Vec<_> = stdfs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.json")]);
    }

    #[tokio::test]
    async fn test_save_into_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path().join("missing"));

        let original = doc(json!({ "create": true }));
        let err = store.save(&original).await.unwrap_err();
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_custom_id_generator() {
        let temp_dir = TempDir::new().unwrap();
        let options = StoreOptions::new().id_generator(|| "new_id".to_string());
        let store = Store::with_options(temp_dir.path(), options);

        let saved = store.save(&Document::new()).await.unwrap();
        assert_eq!(saved.id(), Some("new_id"));
    }

    #[tokio::test]
    async fn test_custom_format() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::with_options(temp_dir.path(), StoreOptions::new().format(ConstantFormat));
        assert_eq!(store.extension(), ".test");

        let saved = store.save(&Document::new()).await.unwrap();
        let fetched = store.get(saved.id().unwrap()).await.unwrap();
        assert_eq!(fetched.get("ret"), Some(&json!("1")));
    }

    #[tokio::test]
    async fn test_get_reconciles_id() {
        let temp_dir = TempDir::new().unwrap();
        stdfs::write(
            temp_dir.path().join("0123.json"),
            r#"{"_id":"invalid","success":true}"#,
        )
        .unwrap();

        let store = Store::new(temp_dir.path());
        let fetched = store.get("0123").await.unwrap();
        assert_eq!(fetched.id(), Some("0123"));
        assert_eq!(fetched.get("success"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());

        let err = store.get("asdf").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("asdf"));
    }

    #[tokio::test]
    async fn test_get_corrupt_is_not_not_found() {
        let temp_dir = TempDir::new().unwrap();
        stdfs::write(temp_dir.path().join("bad.json"), "{oops").unwrap();

        let store = Store::new(temp_dir.path());
        let err = store.get("bad").await.unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());

        let saved = store.save(&doc(json!({ "success": true }))).await.unwrap();
        let id = saved.id().unwrap();
        store.remove(id).await.unwrap();
        assert!(store.get(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_remove_missing_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());

        let err = store.remove("bogus key").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_ids_filter_extension() {
        let temp_dir = TempDir::new().unwrap();
        stdfs::write(temp_dir.path().join("b.json"), "{}").unwrap();
        stdfs::write(temp_dir.path().join("a.json"), "{}").unwrap();
        stdfs::write(temp_dir.path().join("c.txt"), "{}").unwrap();
        stdfs::create_dir(temp_dir.path().join("d.json")).unwrap();

        let store = Store::new(temp_dir.path());
        assert_eq!(store.ids().await.unwrap(), vec!["a", "b"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ids_skip_symlinked_directory() {
        let temp_dir = TempDir::new().unwrap();
        stdfs::write(temp_dir.path().join("a.json"), "{}").unwrap();
        stdfs::create_dir(temp_dir.path().join("target")).unwrap();
        std::os::unix::fs::symlink(
            temp_dir.path().join("target"),
            temp_dir.path().join("linked.json"),
        )
        .unwrap();

        let store = Store::new(temp_dir.path());
        assert_eq!(store.ids().await.unwrap(), vec!["a"]);
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_keeps_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());
        store.save(&doc(json!({ "n": 1 }))).await.unwrap();
        store.save(&doc(json!({ "n": 2 }))).await.unwrap();
        stdfs::write(temp_dir.path().join("notes.txt"), "keep").unwrap();

        store.clear().await.unwrap();
        store.clear().await.unwrap();

        assert!(store.ids().await.unwrap().is_empty());
        assert!(temp_dir.path().join("notes.txt").is_file());
    }

    #[tokio::test]
    async fn test_clear_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path().join("missing"));
        assert!(store.clear().await.is_err());
    }

    #[tokio::test]
    async fn test_scan_fails_on_corrupt_document() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());
        store.save(&doc(json!({ "_id": "good" }))).await.unwrap();
        stdfs::write(temp_dir.path().join("bad.json"), "{oops").unwrap();

        assert!(store.all().await.is_err());
    }

    #[tokio::test]
    async fn test_fan_out_skips_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());
        for id in ["a", "b", "c"] {
            store.save(&doc(json!({ "_id": id }))).await.unwrap();
        }

        let seen = AtomicUsize::new(0);
        let mut items = Vec::new();
        let result = store
            .fan_out(
                |id| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if id == "b" {
                            Err(Error::not_found(id))
                        } else {
                            Ok(id)
                        }
                    }
                },
                |id| items.push(id),
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        items.sort();
        assert_eq!(items, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_fan_out_runs_every_operation_after_failure() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());
        for id in ["a", "b", "c", "d"] {
            store.save(&doc(json!({ "_id": id }))).await.unwrap();
        }

        let seen = AtomicUsize::new(0);
        let result = store
            .fan_out(
                |id| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if id == "a" {
                            Err(Error::serialization("boom"))
                        } else {
                            Ok(())
                        }
                    }
                },
                |()| {},
            )
            .await;

        assert!(matches!(result, Err(Error::Serialization { .. })));
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_events_published() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path());
        let mut events = store.subscribe();

        let saved = store.save(&doc(json!({ "_id": "a" }))).await.unwrap();
        store.get("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert!(store.remove("a").await.is_err());

        match events.recv().await.unwrap() {
            StoreEvent::Saved { document, error } => {
                assert_eq!(document, saved);
                assert!(error.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            events.recv().await.unwrap(),
            StoreEvent::Fetched { document: Some(_), error: None, .. }
        ));
        assert!(events.recv().await.unwrap().is_ok());
        let failed = events.recv().await.unwrap();
        assert!(matches!(failed, StoreEvent::Removed { .. }));
        assert!(failed.error().is_some());
    }

    #[tokio::test]
    async fn test_failed_save_event_carries_original() {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::new(temp_dir.path().join("missing"));
        let mut events = store.subscribe();

        let original = doc(json!({ "create": true }));
        assert!(store.save(&original).await.is_err());

        match events.recv().await.unwrap() {
            StoreEvent::Saved { document, error } => {
                assert_eq!(document, original);
                assert!(error.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_encrypted_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let format = Encrypted::new(Cipher::ChaCha20Poly1305, "password", Json);
        let store = Store::with_options(temp_dir.path(), StoreOptions::new().format(format));

        let saved = store
            .save(&doc(json!({ "_id": "secret", "pin": 1234 })))
            .await
            .unwrap();
        assert!(temp_dir.path().join("secret.json.enc").is_file());

        let fetched = store.get("secret").await.unwrap();
        assert_eq!(fetched, saved);

        // A plain JSON store in the same directory sees nothing.
        assert!(Store::new(temp_dir.path()).all().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_encrypted_scan_does_not_block_runtime() {
        let temp_dir = TempDir::new().unwrap();
        let format = Encrypted::new(Cipher::ChaCha20Poly1305, "password", Json);
        let store = Store::with_options(temp_dir.path(), StoreOptions::new().format(format));
        for n in 0..4 {
            store.save(&doc(json!({ "n": n }))).await.unwrap();
        }

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        tokio::task::yield_now().await;
        let before = ticks.load(Ordering::SeqCst);

        // Every read derives a key; the ticker must keep running meanwhile.
        assert_eq!(store.all().await.unwrap().len(), 4);
        let during = ticks.load(Ordering::SeqCst) - before;
        ticker.abort();

        assert!(during >= 2, "runtime starved during scan: {during} ticks");
    }
}
