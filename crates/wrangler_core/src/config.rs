//! Engine configuration.

use wrangler_storage::DEFAULT_PAGE_SIZE;

/// Default key separator. UTF-8 text never contains this byte.
pub const DEFAULT_SEPARATOR: u8 = 0xFF;

/// Configuration for a [`crate::Wrangler`] handle and its factories.
#[derive(Debug, Clone)]
pub struct Config {
    /// Byte separating key segments. Must not appear in model names,
    /// attribute names or index tokens.
    pub separator: u8,

    /// Whether `create` and `find` cache instances unless told otherwise.
    pub cache: bool,

    /// Whether a cache hit queues a background re-read of the record.
    pub refresh_on_hit: bool,

    /// Number of pairs fetched per page by scans.
    pub scan_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            cache: true,
            refresh_on_hit: true,
            scan_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key separator byte.
    #[must_use]
    pub const fn separator(mut self, value: u8) -> Self {
        self.separator = value;
        self
    }

    /// Sets whether instances are cached by default.
    #[must_use]
    pub const fn cache(mut self, value: bool) -> Self {
        self.cache = value;
        self
    }

    /// Sets whether cache hits trigger a background refresh.
    #[must_use]
    pub const fn refresh_on_hit(mut self, value: bool) -> Self {
        self.refresh_on_hit = value;
        self
    }

    /// Sets the scan page size. Zero is treated as one.
    #[must_use]
    pub const fn scan_page_size(mut self, value: usize) -> Self {
        self.scan_page_size = value;
        self
    }
}

/// Options for [`crate::Factory::create_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOptions {
    /// Insert the new instance into the factory cache.
    pub cache: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self { cache: true }
    }
}

impl CreateOptions {
    /// Options that skip the cache.
    #[must_use]
    pub const fn uncached() -> Self {
        Self { cache: false }
    }
}

/// Options for [`crate::Factory::find_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindOptions {
    /// Consult and populate the factory cache.
    pub cache: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self { cache: true }
    }
}

impl FindOptions {
    /// Options that bypass the cache and always read the store.
    #[must_use]
    pub const fn uncached() -> Self {
        Self { cache: false }
    }
}
