use nodelink_core::{ReadPreference, WriteConcern, DEFAULT_MAX_DEPTH};

/// Manager-level configuration.
///
/// Defaults apply to every operation executed through handles derived from
/// the manager unless the operation supplies its own value.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Application name reported in handshake metadata.
    pub app_name: Option<String>,
    /// Nesting bound for document encoding and decoding.
    pub max_document_depth: usize,
    /// Read preference applied when an operation supplies none.
    pub read_preference: ReadPreference,
    /// Write concern applied to writes and bulk writes that supply none.
    pub write_concern: Option<WriteConcern>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            app_name: None,
            max_document_depth: DEFAULT_MAX_DEPTH,
            read_preference: ReadPreference::default(),
            write_concern: None,
        }
    }
}
