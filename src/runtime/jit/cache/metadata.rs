use std::time::Duration;

/// Metadata for cached functions
#[derive(Debug, Clone)]
pub struct CacheMetadata {
    pub compilation_time: Duration,
    pub backend: &'static str,
}

impl CacheMetadata {
    pub fn new(compilation_time: Duration, backend: &'static str) -> Self {
        Self {
            compilation_time,
            backend,
        }
    }
}
