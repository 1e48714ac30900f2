use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

/// Durable home of the serialized job list.
///
/// The whole list lives under a single key and is rewritten on every
/// mutation, so implementations only need whole-value load and save.
pub trait JobPersistence: Send + Sync {
    /// Returns `None` when nothing has been saved yet.
    fn load(&self) -> io::Result<Option<String>>;

    fn save(&self, data: &str) -> io::Result<()>;
}

/// Stores the job list in a single JSON file.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    path: PathBuf,
}

impl FilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl JobPersistence for FilePersistence {
    fn load(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, data: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write to a sibling file and rename so a crash never leaves a torn list.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)
    }
}

/// Keeps the serialized job list in memory.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    data: Mutex<Option<String>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with previously saved contents.
    pub fn with_contents(data: impl Into<String>) -> Self {
        Self {
            data: Mutex::new(Some(data.into())),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl JobPersistence for MemoryPersistence {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self.contents())
    }

    fn save(&self, data: &str) -> io::Result<()> {
        *self
            .data
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(data.to_string());
        Ok(())
    }
}
