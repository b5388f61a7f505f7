//! Metric name and label definitions.

/// HTTP request metrics
pub mod http {
    /// Total number of HTTP requests handled
    pub const REQUESTS_TOTAL: &str = "attache_http_requests_total";
    /// Duration of HTTP requests in seconds
    pub const REQUEST_DURATION_SECONDS: &str = "attache_http_request_duration_seconds";
    /// Number of requests currently being processed
    pub const REQUESTS_IN_FLIGHT: &str = "attache_http_requests_in_flight";
}

/// Representation cache metrics
pub mod cache {
    /// `get` calls answered from an existing entry
    pub const HITS_TOTAL: &str = "attache_representation_cache_hits_total";
    /// `ensure` calls that had to run a transform
    pub const MISSES_TOTAL: &str = "attache_representation_cache_misses_total";
    /// Transforms that failed or timed out inside `ensure`
    pub const FAILURES_TOTAL: &str = "attache_representation_cache_failures_total";
    /// Concurrent publishes that lost the race to another writer
    pub const PUBLISH_RACES_TOTAL: &str = "attache_representation_cache_publish_races_total";
    /// Duration of a single transform invocation in seconds
    pub const TRANSFORM_DURATION_SECONDS: &str = "attache_transform_duration_seconds";
}

/// Content resolver metrics
pub mod resolver {
    /// A stage deferred to the next strategy
    pub const STAGE_FALLBACKS_TOTAL: &str = "attache_resolver_stage_fallbacks_total";
    /// Every strategy failed and a null/placeholder result was returned
    pub const EXHAUSTED_TOTAL: &str = "attache_resolver_exhausted_total";
    /// PDF pages encoded into data URLs
    pub const PDF_PAGES_ENCODED_TOTAL: &str = "attache_pdf_pages_encoded_total";
    /// PDFs answered with the textual placeholder
    pub const PDF_TEXT_FALLBACKS_TOTAL: &str = "attache_pdf_text_fallbacks_total";
}

/// Common label keys
pub mod labels {
    pub const STAGE: &str = "stage";
    pub const ENTRY: &str = "entry";
    pub const KIND: &str = "kind";
    pub const ENDPOINT: &str = "endpoint";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
}

/// Histogram buckets
pub mod buckets {
    /// Transform duration buckets (in seconds), 5ms to the 30s timeout
    pub const TRANSFORM_DURATION: [f64; 11] =
        [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0, 30.0];

    /// HTTP request duration buckets (in seconds)
    pub const HTTP_DURATION: [f64; 10] = [0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];
}
