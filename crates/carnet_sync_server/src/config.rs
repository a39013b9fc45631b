//! Server configuration.

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of changes returned per changes request; further
    /// changes are signalled through `hasMore`.
    pub page_size: u32,
    /// Maximum number of changes accepted per push request.
    pub max_push_batch: usize,
}

impl ServerConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self {
            page_size: 100,
            max_push_batch: 500,
        }
    }

    /// Sets the changes page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, max: usize) -> Self {
        self.max_push_batch = max;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
