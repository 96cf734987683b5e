// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The storage capability the transfer loops stream against.
//!
//! The engine never touches a filesystem directly; it consumes an
//! [`ObjectStore`] handed in by the caller. Sources and sinks are plain
//! tokio streams, seekable so a transfer can restart from a checkpoint.

/// Local-filesystem implementation.
pub mod local;

use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

pub trait SourceStream: AsyncRead + AsyncSeek + Unpin + Send {}
impl<T: AsyncRead + AsyncSeek + Unpin + Send> SourceStream for T {}

pub trait SinkStream: AsyncWrite + AsyncSeek + Unpin + Send {}
impl<T: AsyncWrite + AsyncSeek + Unpin + Send> SinkStream for T {}

/// Lazy, restartable byte stream backing a send.
pub type ByteSource = Box<dyn SourceStream>;
/// Streamed, seekable byte sink backing a receive; `shutdown` flushes
/// durably.
pub type ByteSink = Box<dyn SinkStream>;

/// Where transferred files come from and go to.
pub trait ObjectStore: Send + Sync {
    fn open_read(
        &self,
        path: &str,
    ) -> impl Future<Output = std::io::Result<ByteSource>> + Send;

    /// Open `path` for writing, truncating unless `append`.
    fn open_write(
        &self,
        path: &str,
        append: bool,
    ) -> impl Future<Output = std::io::Result<ByteSink>> + Send;

    fn len(&self, path: &str) -> impl Future<Output = std::io::Result<u64>> + Send;

    fn exists(&self, path: &str) -> impl Future<Output = std::io::Result<bool>> + Send;
}
