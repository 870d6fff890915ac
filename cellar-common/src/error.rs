// Copyright 2025 foyer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    backtrace::Backtrace,
    fmt::{Debug, Display},
    sync::Arc,
};

/// The category of a cellar [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid configuration.
    Config,
    /// Memory allocation failed.
    Alloc,
    /// The value can never fit under a strict capacity limit.
    NoSpace,
    /// Compression or decompression failed.
    Codec,
    /// Raised outside cellar, e.g. by a user callback.
    External,
    /// The operation is not supported by the target.
    Unsupported,
}

impl ErrorKind {
    /// A short description of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "Config error",
            ErrorKind::Alloc => "Allocation failed",
            ErrorKind::NoSpace => "No space",
            ErrorKind::Codec => "Codec error",
            ErrorKind::External => "External error",
            ErrorKind::Unsupported => "Unsupported operation",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error type of all fallible cellar operations.
///
/// An error carries its [`ErrorKind`], a message, ordered key/value context, an optional source error and the
/// backtrace captured at creation.
///
/// `Display` prints a single line:
///
/// ```shell
/// No space, context: { capacity: 1024, usage: 512, charge: 4096 } => value can never fit in the shard
/// ```
///
/// `Debug` prints the context, the source and the backtrace on separate lines. `{:#?}` prints the raw struct.
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
    source: Option<Arc<anyhow::Error>>,
    backtrace: Option<Arc<Backtrace>>,
}

impl Error {
    /// Create an error of `kind` with `message`.
    ///
    /// ```rust
    /// # use cellar_common::error::{Error, ErrorKind};
    /// let err = Error::new(ErrorKind::Codec, "decompress value failed")
    ///     .with_context("len", 42)
    ///     .with_source(std::io::Error::other("bad frame"));
    /// assert_eq!(err.kind(), ErrorKind::Codec);
    /// ```
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: vec![],
            source: None,
            backtrace: Some(Arc::new(Backtrace::capture())),
        }
    }

    /// Append a context entry.
    pub fn with_context(mut self, key: &'static str, value: impl ToString) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Attach the source error. The source can only be set once.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(Arc::new(source.into()));
        self
    }

    /// The error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The context entries in insertion order.
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// The backtrace captured at creation.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    /// The source error.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.source.as_deref()
    }

    /// Downcast the source error.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source()?.downcast_ref::<E>()
    }

    /// A value that can never fit in a shard of `capacity`.
    pub fn no_space(capacity: usize, usage: usize, charge: usize) -> Self {
        Self::new(ErrorKind::NoSpace, "value can never fit in the shard")
            .with_context("capacity", capacity)
            .with_context("usage", usage)
            .with_context("charge", charge)
    }

    /// An allocation of `size` bytes failed.
    pub fn alloc(size: usize, source: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorKind::Alloc, "allocate buffer failed")
            .with_context("size", size)
            .with_source(source)
    }

    /// An invalid configuration.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.context.is_empty() {
            let context = self.context.iter().map(|(k, v)| format!("{k}: {v}")).collect::<Vec<_>>();
            write!(f, ", context: {{ {} }}", context.join(", "))?;
        }
        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }
        if let Some(source) = &self.source {
            write!(f, ", source: {source}")?;
        }
        Ok(())
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if f.alternate() {
            return f
                .debug_struct("Error")
                .field("kind", &self.kind)
                .field("message", &self.message)
                .field("context", &self.context)
                .field("source", &self.source)
                .field("backtrace", &self.backtrace)
                .finish();
        }

        match self.message.is_empty() {
            true => writeln!(f, "{}", self.kind)?,
            false => writeln!(f, "{} => {}", self.kind, self.message)?,
        }
        if !self.context.is_empty() {
            writeln!(f, "\nContext:")?;
            for (k, v) in &self.context {
                writeln!(f, "  {k}: {v}")?;
            }
        }
        if let Some(source) = &self.source {
            writeln!(f, "\nSource:\n  {source:#}")?;
        }
        if let Some(backtrace) = &self.backtrace {
            writeln!(f, "\nBacktrace:\n{backtrace}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref().as_ref())
    }
}

/// Result type of cellar.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct FrameError(&'static str);

    impl Display for FrameError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "bad frame: {}", self.0)
        }
    }

    impl std::error::Error for FrameError {}

    #[test]
    fn test_error_is_send_sync_static() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<Error>();
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Error::no_space(1024, 512, 4096).to_string(),
            "No space, context: { capacity: 1024, usage: 512, charge: 4096 } => value can never fit in the shard"
        );
        assert_eq!(
            Error::new(ErrorKind::Codec, "decompress value failed")
                .with_source(FrameError("crc"))
                .to_string(),
            "Codec error => decompress value failed, source: bad frame: crc"
        );
        assert_eq!(Error::new(ErrorKind::Unsupported, "").to_string(), "Unsupported operation");
    }

    #[test]
    fn test_downcast_source() {
        let err = Error::new(ErrorKind::External, "create failed").with_source(FrameError("len"));
        assert_eq!(err.downcast_ref::<FrameError>(), Some(&FrameError("len")));
        assert!(err.downcast_ref::<std::io::Error>().is_none());
        assert_eq!(err.context(), &[]);
    }

    #[test]
    fn test_alloc_context() {
        let err = Error::alloc(64, std::io::Error::other("oom"));
        assert_eq!(err.kind(), ErrorKind::Alloc);
        assert_eq!(err.context(), &[("size", "64".to_string())]);
    }
}
