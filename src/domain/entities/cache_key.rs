//! Cache key derivation.

use std::fmt;

/// Separator between key segments.
pub const KEY_SEPARATOR: char = '\n';

/// Fingerprint of the image a request produces.
///
/// Two requests with equal keys yield the same cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wraps an already derived key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this key belongs to any variant of `source`.
    ///
    /// The source must be followed directly by the separator so that
    /// `a.png` does not match keys of `a.png2`.
    #[must_use]
    pub fn matches_source(&self, source: &str) -> bool {
        self.0
            .strip_prefix(source)
            .is_some_and(|rest| rest.starts_with(KEY_SEPARATOR))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.replace(KEY_SEPARATOR, "|"))
    }
}

/// Incremental builder for separator-delimited keys.
#[derive(Debug, Default)]
pub(crate) struct KeyBuilder {
    buf: String,
}

impl KeyBuilder {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: String::with_capacity(capacity),
        }
    }

    pub(crate) fn segment(&mut self, args: fmt::Arguments<'_>) -> &mut Self {
        use std::fmt::Write;
        // Writing into a String cannot fail.
        let _ = self.buf.write_fmt(args);
        self.buf.push(KEY_SEPARATOR);
        self
    }

    pub(crate) fn finish(self) -> CacheKey {
        CacheKey(self.buf)
    }
}
