//! Record store for captured request/response pairs

mod cache;
mod record;

pub use cache::{CaptureOutcome, RecordStore};
pub use record::{EndpointRecord, ParamVariant};

/// Substring filters used when browsing the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Keep sites containing this text
    pub site_contains: Option<String>,
    /// Keep endpoints whose URL contains this text
    pub url_contains: Option<String>,
    /// Keep variants whose status code contains this text
    pub status_contains: Option<String>,
}
