//! Completion markers
//!
//! A marker records that a target's action finished successfully. Its
//! presence is the only thing consulted when deciding whether to skip a
//! target: there is no freshness or checksum check, so a marker stays valid
//! until someone deletes it.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const MARKER_SUFFIX: &str = ".done";

/// Storage for completion markers
pub trait MarkerStore {
    fn exists(&self, name: &str) -> bool;
    fn mark(&self, name: &str) -> io::Result<()>;
}

/// Markers as empty `<name>.done` files inside a directory
#[derive(Debug, Clone)]
pub struct FileMarkerStore {
    dir: PathBuf,
}

impl FileMarkerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", name, MARKER_SUFFIX))
    }
}

impl MarkerStore for FileMarkerStore {
    fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    fn mark(&self, name: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(name), b"")
    }
}

/// Marker store kept in memory, for tests and dry runs
#[derive(Debug, Default)]
pub struct InMemoryMarkerStore {
    marked: RefCell<BTreeSet<String>>,
}

impl InMemoryMarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_marked<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            marked: RefCell::new(names.into_iter().map(Into::into).collect()),
        }
    }

    pub fn remove(&self, name: &str) -> bool {
        self.marked.borrow_mut().remove(name)
    }

    pub fn marked(&self) -> Vec<String> {
        self.marked.borrow().iter().cloned().collect()
    }
}

impl MarkerStore for InMemoryMarkerStore {
    fn exists(&self, name: &str) -> bool {
        self.marked.borrow().contains(name)
    }

    fn mark(&self, name: &str) -> io::Result<()> {
        self.marked.borrow_mut().insert(name.to_string());
        Ok(())
    }
}
