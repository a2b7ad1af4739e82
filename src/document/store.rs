use super::{ConfigDocument, ServerDefinitions, merge_definitions};
use crate::error::ConfigError;
use std::fs::Permissions;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Read/modify/write access to the configuration file.
///
/// Every operation re-reads the file so edits made by other means are
/// respected. Mutations hold `write_lock` for the whole read-modify-write
/// cycle and persist through a temporary file plus rename, so a concurrent
/// [`DocumentStore::get`] sees either the previous or the new version.
/// Symlinks are followed and the file keeps its permissions. Where the
/// file cannot be replaced (a single-file bind mount), it is rewritten in
/// place instead.
#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    servers_key: String,
    write_lock: Mutex<()>,
}

impl DocumentStore {
    pub fn new(path: impl Into<PathBuf>, servers_key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            servers_key: servers_key.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn servers_key(&self) -> &str {
        &self.servers_key
    }

    /// Load the full document from disk.
    pub async fn load(&self) -> Result<ConfigDocument, ConfigError> {
        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConfigError::storage(&self.path, e))?;
        ConfigDocument::parse(&text).map_err(|e| ConfigError::storage(&self.path, e))
    }

    /// Current server definitions; empty when the field is absent.
    pub async fn get(&self) -> Result<ServerDefinitions, ConfigError> {
        let document = self.load().await?;
        self.definitions_of(&document)
    }

    /// Server definitions held by an already loaded document.
    pub fn definitions_of(
        &self,
        document: &ConfigDocument,
    ) -> Result<ServerDefinitions, ConfigError> {
        document
            .server_definitions(&self.servers_key)
            .map_err(|e| ConfigError::storage(&self.path, e))
    }

    /// Wholesale replacement of the server definitions.
    pub async fn replace(
        &self,
        definitions: ServerDefinitions,
    ) -> Result<ServerDefinitions, ConfigError> {
        self.update(|_| Ok(definitions)).await
    }

    /// Per-name shallow merge of `partial` into the stored definitions.
    pub async fn merge(&self, partial: ServerDefinitions) -> Result<ServerDefinitions, ConfigError> {
        self.update(|mut current| {
            merge_definitions(&mut current, partial);
            Ok(current)
        })
        .await
    }

    /// Delete one server definition. Fails without writing when absent.
    pub async fn remove(&self, server_name: &str) -> Result<ServerDefinitions, ConfigError> {
        self.update(|mut current| {
            if current.remove(server_name).is_none() {
                return Err(ConfigError::NotFound(server_name.to_string()));
            }
            Ok(current)
        })
        .await
    }

    async fn update<F>(&self, apply: F) -> Result<ServerDefinitions, ConfigError>
    where
        F: FnOnce(ServerDefinitions) -> Result<ServerDefinitions, ConfigError>,
    {
        let _guard = self.write_lock.lock().await;

        let mut document = self.load().await?;
        let current = self.definitions_of(&document)?;
        let updated = apply(current)?;

        document
            .set_server_definitions(&self.servers_key, &updated)
            .map_err(|e| ConfigError::storage(&self.path, e))?;
        self.persist(&document).await?;

        info!(
            name: "config.document.persisted",
            path = %self.path.display(),
            servers = updated.len(),
            "Configuration document persisted"
        );
        Ok(updated)
    }

    async fn persist(&self, document: &ConfigDocument) -> Result<(), ConfigError> {
        let text = document
            .to_yaml()
            .map_err(|e| ConfigError::storage(&self.path, e))?;

        // Write to the file a symlink points at, not over the link itself.
        let target = fs::canonicalize(&self.path)
            .await
            .map_err(|e| ConfigError::storage(&self.path, e))?;
        let permissions = fs::metadata(&target)
            .await
            .map_err(|e| ConfigError::storage(&self.path, e))?
            .permissions();

        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("config.yaml");
        let tmp_path = target.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        debug!(tmp = %tmp_path.display(), "Writing configuration to temporary file");
        if let Err(e) = write_file(&tmp_path, text.as_bytes(), Some(permissions)).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ConfigError::storage(&self.path, e));
        }

        match fs::rename(&tmp_path, &target).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                if !rename_blocked(&e) {
                    return Err(ConfigError::storage(&self.path, e));
                }
                // Single-file bind mounts cannot be replaced, only rewritten.
                warn!(
                    path = %target.display(),
                    error = %e,
                    "Atomic replace not possible, rewriting configuration in place"
                );
                write_file(&target, text.as_bytes(), None)
                    .await
                    .map_err(|e| ConfigError::storage(&self.path, e))
            }
        }
    }
}

/// Rename failures that mean the target cannot be swapped out, as opposed
/// to failures of the write itself.
fn rename_blocked(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::CrossesDevices | io::ErrorKind::ResourceBusy
    )
}

/// Write `contents` to `path`, applying `permissions` before any byte lands.
async fn write_file(
    path: &Path,
    contents: &[u8],
    permissions: Option<Permissions>,
) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    if let Some(permissions) = permissions {
        file.set_permissions(permissions).await?;
    }
    file.write_all(contents).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn definitions(value: serde_json::Value) -> ServerDefinitions {
        serde_json::from_value(value).unwrap()
    }

    async fn store_with(text: &str) -> (TempDir, DocumentStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, text).await.unwrap();
        (dir, DocumentStore::new(path, "mcpServers"))
    }

    #[tokio::test]
    async fn get_on_missing_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path().join("absent.yaml"), "mcpServers");
        let err = store.get().await.unwrap_err();
        assert!(matches!(err, ConfigError::StorageUnavailable { .. }));
    }

    #[tokio::test]
    async fn get_on_unparsable_file_is_storage_error() {
        let (_dir, store) = store_with("mcpServers: [unclosed\n").await;
        assert!(matches!(
            store.get().await,
            Err(ConfigError::StorageUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn replace_is_total() {
        let (_dir, store) =
            store_with("mcpServers:\n  x:\n    url: u1\n  y:\n    url: u2\n").await;
        store
            .replace(definitions(json!({"x": {"command": "npx"}})))
            .await
            .unwrap();

        let stored = store.get().await.unwrap();
        assert_eq!(
            serde_json::to_value(&stored).unwrap(),
            json!({"x": {"command": "npx"}})
        );
    }

    #[tokio::test]
    async fn merge_persists_overlay() {
        let (_dir, store) = store_with("mcpServers:\n  search:\n    url: u1\n").await;
        let merged = store
            .merge(definitions(json!({"search": {"timeout": 30}})))
            .await
            .unwrap();

        let expected = json!({"search": {"url": "u1", "timeout": 30}});
        assert_eq!(serde_json::to_value(&merged).unwrap(), expected);
        assert_eq!(serde_json::to_value(store.get().await.unwrap()).unwrap(), expected);
    }

    #[tokio::test]
    async fn remove_absent_name_leaves_file_untouched() {
        let text = "# managed by ops\nversion: 1\nmcpServers:\n  a:\n    url: u1\n";
        let (_dir, store) = store_with(text).await;

        let err = store.remove("nonexistent").await.unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(ref n) if n == "nonexistent"));
        assert_eq!(fs::read_to_string(store.path()).await.unwrap(), text);
    }

    #[tokio::test]
    async fn removing_last_server_persists_empty_map() {
        let (_dir, store) = store_with("mcpServers:\n  a:\n    url: u1\n").await;
        store.remove("a").await.unwrap();

        let document = store.load().await.unwrap();
        assert_eq!(
            document.get("mcpServers"),
            Some(&serde_yaml::Value::Mapping(serde_yaml::Mapping::new()))
        );
    }

    #[tokio::test]
    async fn unrelated_fields_survive_mutation() {
        let (_dir, store) = store_with(
            "version: 1.2.1\ninterface:\n  customWelcome: hi\nmcpServers: {}\nregistration:\n  socialLogins: [github]\n",
        )
        .await;
        store
            .merge(definitions(json!({"time": {"command": "npx"}})))
            .await
            .unwrap();

        let document = store.load().await.unwrap();
        assert_eq!(
            document.get("version"),
            Some(&serde_yaml::Value::String("1.2.1".into()))
        );
        let social = &document.get("registration").unwrap()["socialLogins"][0];
        assert_eq!(social.as_str(), Some("github"));
        assert_eq!(
            document.get("interface").unwrap()["customWelcome"].as_str(),
            Some("hi")
        );
    }

    #[tokio::test]
    async fn concurrent_merges_do_not_lose_updates() {
        let (_dir, store) = store_with("mcpServers: {}\n").await;
        let store = std::sync::Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let name = format!("server-{i}");
                store
                    .merge(definitions(json!({ name: {"url": "u"} })))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get().await.unwrap().len(), 8);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn writes_through_symlink_and_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real.yaml");
        fs::write(&real, "mcpServers: {}\n").await.unwrap();
        fs::set_permissions(&real, Permissions::from_mode(0o600))
            .await
            .unwrap();
        let link = dir.path().join("config.yaml");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let store = DocumentStore::new(link.clone(), "mcpServers");
        store
            .merge(definitions(json!({"s": {"url": "u"}})))
            .await
            .unwrap();

        let link_meta = fs::symlink_metadata(&link).await.unwrap();
        assert!(link_meta.file_type().is_symlink());
        assert!(fs::read_to_string(&real).await.unwrap().contains("url: u"));
        let mode = fs::metadata(&real).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        // No temporary files left next to the target.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn only_device_and_busy_errors_fall_back_to_in_place_write() {
        assert!(rename_blocked(&io::Error::from(io::ErrorKind::CrossesDevices)));
        assert!(rename_blocked(&io::Error::from(io::ErrorKind::ResourceBusy)));
        assert!(!rename_blocked(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!rename_blocked(&io::Error::from(io::ErrorKind::StorageFull)));
    }
}
