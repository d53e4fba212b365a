//! Shared settings with validated updates and write-through persistence.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Settings, SettingsPatch};
use crate::error::{PrintError, Result};

/// Where settings live between restarts.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    /// The stored document, or `None` if nothing has been saved yet.
    async fn load(&self) -> Result<Option<Value>>;

    async fn save(&self, document: &Value) -> Result<()>;
}

/// `printer_settings.json` on disk, written atomically via a temp file.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl SettingsBackend for JsonFileBackend {
    async fn load(&self) -> Result<Option<Value>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PrintError::IoFatal(format!(
                    "read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };
        serde_json::from_str(&text).map(Some).map_err(|e| {
            PrintError::Invariant(format!("parse {}: {}", self.path.display(), e))
        })
    }

    async fn save(&self, document: &Value) -> Result<()> {
        let text = serde_json::to_string_pretty(document)
            .map_err(|e| PrintError::Invariant(format!("encode settings: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        let io_err = |e: std::io::Error| {
            PrintError::IoFatal(format!("write {}: {}", self.path.display(), e))
        };
        tokio::fs::write(&tmp, text).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

/// Volatile backend, optionally failing every save.
#[derive(Default)]
pub struct MemoryBackend {
    document: Mutex<Option<Value>>,
    fail_saves: AtomicBool,
}

impl MemoryBackend {
    pub fn with_document(document: Value) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            ..Self::default()
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn document(&self) -> Option<Value> {
        self.document
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SettingsBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<Value>> {
        Ok(self.document())
    }

    async fn save(&self, document: &Value) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PrintError::IoFatal("settings backend unavailable".into()));
        }
        *self.document.lock().unwrap_or_else(|e| e.into_inner()) = Some(document.clone());
        Ok(())
    }
}

/// Readers never see a half-applied patch; writers are serialized and the
/// new record is persisted before it becomes visible.
pub struct SettingsStore {
    current: RwLock<Settings>,
    backend: Box<dyn SettingsBackend>,
}

impl SettingsStore {
    /// Load from `backend`, falling back to defaults when nothing is stored.
    pub async fn load(backend: Box<dyn SettingsBackend>) -> Result<Self> {
        let settings = match backend.load().await? {
            Some(document) => Settings::from_stored(document)?,
            None => {
                info!("no stored settings, using defaults");
                Settings::default()
            }
        };
        Ok(Self {
            current: RwLock::new(settings),
            backend,
        })
    }

    /// Defaults, persisted nowhere.
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            current: RwLock::new(settings),
            backend: Box::new(MemoryBackend::default()),
        }
    }

    /// Snapshot of the current settings.
    pub async fn get(&self) -> Settings {
        self.current.read().await.clone()
    }

    /// Validate, persist, then publish. Any failure leaves settings unchanged.
    pub async fn update(&self, patch: &SettingsPatch) -> Result<Settings> {
        let mut current = self.current.write().await;
        let next = patch.apply(&current)?;
        self.backend.save(&next.to_json()).await?;
        debug!(?patch, "settings updated");
        *current = next.clone();
        Ok(next)
    }

    /// [`update`](Self::update) from a raw JSON object.
    pub async fn update_json(&self, value: Value) -> Result<Settings> {
        let patch = SettingsPatch::from_json(value)?;
        self.update(&patch).await
    }

    pub async fn reset_offsets(&self) -> Result<Settings> {
        self.update(&SettingsPatch {
            x_offset: Some(0),
            y_offset: Some(0),
            ..SettingsPatch::default()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    struct Shared(Arc<MemoryBackend>);

    #[async_trait]
    impl SettingsBackend for Shared {
        async fn load(&self) -> Result<Option<Value>> {
            self.0.load().await
        }
        async fn save(&self, document: &Value) -> Result<()> {
            self.0.save(document).await
        }
    }

    #[tokio::test]
    async fn test_rejected_patch_leaves_settings_unchanged() {
        let store = SettingsStore::in_memory(Settings {
            x_offset: 10,
            ..Settings::default()
        });

        let err = store.update_json(json!({"x_offset": 9999})).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Invariant);
        assert_eq!(store.get().await.x_offset, 10);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_settings_unchanged() {
        let backend = Arc::new(MemoryBackend::default());
        let store = SettingsStore::load(Box::new(Shared(backend.clone())))
            .await
            .unwrap();

        backend.fail_saves(true);
        let err = store.update_json(json!({"x_offset": 5})).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IoFatal);
        assert_eq!(store.get().await.x_offset, 0);

        backend.fail_saves(false);
        store.update_json(json!({"x_offset": 5})).await.unwrap();
        assert_eq!(backend.document().unwrap()["x_offset"], json!(5));
    }

    #[tokio::test]
    async fn test_json_file_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printer_settings.json");

        let store = SettingsStore::load(Box::new(JsonFileBackend::new(&path)))
            .await
            .unwrap();
        assert_eq!(store.get().await, Settings::default());

        store
            .update_json(json!({"y_offset": -12, "adaptive_speed_aggressive": true}))
            .await
            .unwrap();

        let reloaded = SettingsStore::load(Box::new(JsonFileBackend::new(&path)))
            .await
            .unwrap();
        let settings = reloaded.get().await;
        assert_eq!(settings.y_offset, -12);
        assert!(settings.adaptive_speed_aggressive);
    }

    #[tokio::test]
    async fn test_unparsable_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printer_settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(SettingsStore::load(Box::new(JsonFileBackend::new(&path))).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_offsets() {
        let store = SettingsStore::in_memory(Settings {
            x_offset: 30,
            y_offset: -10,
            ..Settings::default()
        });
        let settings = store.reset_offsets().await.unwrap();
        assert_eq!((settings.x_offset, settings.y_offset), (0, 0));
    }
}
