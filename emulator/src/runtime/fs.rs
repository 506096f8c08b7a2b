use std::collections::HashMap;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

/// Host files reachable by the `read file chunk` syscall
pub trait Filesystem: Send {
    /// Read a whole file, given its path relative to the data directory
    ///
    /// # Errors
    ///
    /// Forwards the underlying I/O error, notably when the file does not exist.
    fn read(&self, path: &Utf8Path) -> std::io::Result<Vec<u8>>;
}

#[derive(Debug, Default)]
pub struct InMemoryFilesystem {
    files: HashMap<Utf8PathBuf, Vec<u8>>,
}

impl InMemoryFilesystem {
    #[must_use]
    pub const fn new(files: HashMap<Utf8PathBuf, Vec<u8>>) -> Self {
        InMemoryFilesystem { files }
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<Utf8PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl Filesystem for InMemoryFilesystem {
    fn read(&self, path: &Utf8Path) -> std::io::Result<Vec<u8>> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"))
    }
}

/// Files under a directory of the host
#[derive(Debug, Clone)]
pub struct NativeFilesystem {
    root: Utf8PathBuf,
}

impl NativeFilesystem {
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        NativeFilesystem { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl Filesystem for NativeFilesystem {
    fn read(&self, path: &Utf8Path) -> std::io::Result<Vec<u8>> {
        // Paths come from the guest program and must stay under the root
        let contained = path
            .components()
            .all(|component| matches!(component, Utf8Component::Normal(_)));
        if !contained {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{path} is outside of the data directory"),
            ));
        }

        std::fs::read(self.root.join(path))
    }
}
