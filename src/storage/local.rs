// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Component, Path, PathBuf};

use tokio::fs::{self, OpenOptions};

use crate::storage::{ByteSink, ByteSource, ObjectStore};

/// Filesystem-backed store rooted at one directory.
///
/// Virtual paths are resolved strictly below the root; parent-directory
/// components are rejected so a wire-supplied filename can never escape.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> std::io::Result<PathBuf> {
        let rel = Path::new(path);
        let escapes = rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
        if escapes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("path {path:?} escapes the store root"),
            ));
        }
        Ok(self.root.join(rel))
    }
}

impl ObjectStore for LocalStore {
    async fn open_read(&self, path: &str) -> std::io::Result<ByteSource> {
        let file = fs::File::open(self.resolve(path)?).await?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &str, append: bool) -> std::io::Result<ByteSink> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(!append)
            .append(false)
            .open(&full)
            .await?;
        Ok(Box::new(file))
    }

    async fn len(&self, path: &str) -> std::io::Result<u64> {
        Ok(fs::metadata(self.resolve(path)?).await?.len())
    }

    async fn exists(&self, path: &str) -> std::io::Result<bool> {
        match fs::metadata(self.resolve(path)?).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
