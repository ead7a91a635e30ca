use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::KiraError;
use crate::sanitize::normalize_path;

pub trait NoteStore: Send + Sync {
    fn exists(&self, path: &str) -> bool;
    /// Writes `content` only when nothing lives at `path`; `Ok(false)` when
    /// the path is already taken.
    fn create_if_absent(&self, path: &str, content: &str) -> Result<bool, KiraError>;
    fn read_text(&self, path: &str) -> Result<String, KiraError>;
    fn write_text(&self, path: &str, content: &str) -> Result<(), KiraError>;
    fn list_children(&self, folder: &str) -> Result<Vec<String>, KiraError>;
    fn ensure_folder(&self, folder: &str) -> Result<(), KiraError>;
}

pub fn note_path(folder: &str, stem: &str) -> String {
    normalize_path(&format!("{folder}/{stem}.md"))
}

#[derive(Debug, Clone)]
pub struct Vault {
    root: Utf8PathBuf,
}

impl Vault {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn current_dir() -> Result<Self, KiraError> {
        let cwd = std::env::current_dir().map_err(|err| KiraError::Filesystem(err.to_string()))?;
        let root = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|_| KiraError::Filesystem("invalid vault path".to_string()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Utf8PathBuf {
        self.root.join(normalize_path(path))
    }

    fn ensure_parent(path: &Utf8Path) -> Result<&Utf8Path, KiraError> {
        let parent = path
            .parent()
            .ok_or_else(|| KiraError::Filesystem(format!("invalid note path {path}")))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(parent)
    }

    fn staged(parent: &Utf8Path, content: &str) -> Result<tempfile::NamedTempFile, KiraError> {
        let temp = tempfile::Builder::new()
            .prefix(".kira-ss-note")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        fs::write(temp.path(), content).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(temp)
    }
}

impl NoteStore for Vault {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).as_std_path().exists()
    }

    fn create_if_absent(&self, path: &str, content: &str) -> Result<bool, KiraError> {
        let target = self.resolve(path);
        let parent = Self::ensure_parent(&target)?;
        let temp = Self::staged(parent, content)?;
        match temp.persist_noclobber(target.as_std_path()) {
            Ok(_) => Ok(true),
            Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(KiraError::Filesystem(format!("create {target}: {}", err.error))),
        }
    }

    fn read_text(&self, path: &str) -> Result<String, KiraError> {
        let target = self.resolve(path);
        fs::read_to_string(target.as_std_path()).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => KiraError::NoteNotFound(path.to_string()),
            _ => KiraError::Filesystem(format!("read {target}: {err}")),
        })
    }

    fn write_text(&self, path: &str, content: &str) -> Result<(), KiraError> {
        let target = self.resolve(path);
        let parent = Self::ensure_parent(&target)?;
        let temp = Self::staged(parent, content)?;
        temp.persist(target.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("write {target}: {}", err.error)))?;
        Ok(())
    }

    fn list_children(&self, folder: &str) -> Result<Vec<String>, KiraError> {
        let dir = self.resolve(folder);
        if !dir.as_std_path().is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in
            fs::read_dir(dir.as_std_path()).map_err(|err| KiraError::Filesystem(err.to_string()))?
        {
            let entry = entry.map_err(|err| KiraError::Filesystem(err.to_string()))?;
            if let Ok(name) = entry.file_name().into_string() {
                if !name.starts_with('.') {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn ensure_folder(&self, folder: &str) -> Result<(), KiraError> {
        fs::create_dir_all(self.resolve(folder).as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }
}
