use core::fmt;

/// Errors when building or reading page tables.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PagingErrors {
    /// Malformed input: misaligned addresses or lengths, a range beyond the linear
    /// address width, or an attribute and mask combination that cannot be applied.
    InvalidParameter,
    /// The paging mode is not handled by this operation.
    Unsupported,
    /// The supplied buffer is too small. `required` is the exact size needed: bytes of
    /// page buffer for a map, number of regions for a parse.
    BufferTooSmall { required: usize },
}

impl fmt::Display for PagingErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::Unsupported => write!(f, "unsupported paging mode"),
            Self::BufferTooSmall { required } => {
                write!(f, "buffer too small, {} required", required)
            }
        }
    }
}
