use crate::nested::WorkflowNodeFactory;
use crate::registry::NodeRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use wfcore::WorkflowIr;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Cannot read node directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Registers every `*.json` workflow document in a directory as a node type
/// named after the file stem.
pub struct WorkflowLoader {
    dir: PathBuf,
}

impl WorkflowLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load the directory into `registry`. Files that fail to read or parse
    /// are logged and skipped. Returns the number of types registered.
    pub fn load_into(&self, registry: &mut NodeRegistry) -> Result<usize, LoaderError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| LoaderError::Directory {
            path: self.dir.clone(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                tracing::warn!("Skipping {}: file name is not valid UTF-8", path.display());
                continue;
            };

            match Self::read_document(&path) {
                Ok(doc) => {
                    tracing::info!("Loaded workflow node type '{}' from {}", name, path.display());
                    registry.register_scanned(Arc::new(WorkflowNodeFactory::named(name, doc)));
                    loaded += 1;
                }
                Err(e) => tracing::warn!("Skipping {}: {}", path.display(), e),
            }
        }

        Ok(loaded)
    }

    fn read_document(path: &Path) -> Result<WorkflowIr, String> {
        let json = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        WorkflowIr::from_json(&json).map_err(|e| e.to_string())
    }
}

impl NodeRegistry {
    /// Register every workflow document found in `dir`
    pub fn scan_directory(&mut self, dir: impl Into<PathBuf>) -> Result<usize, LoaderError> {
        WorkflowLoader::new(dir).load_into(self)
    }

    /// Drop the types registered by earlier scans, then scan `dir` again
    pub fn rescan(&mut self, dir: impl Into<PathBuf>) -> Result<usize, LoaderError> {
        self.clear_scanned();
        self.scan_directory(dir)
    }
}
