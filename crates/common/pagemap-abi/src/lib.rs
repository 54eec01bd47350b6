#![cfg_attr(not(test), no_std)]

pub mod errors;
pub mod mode;

#[macro_use]
extern crate static_assertions;

/// Prelude to re-export commonly used items.
pub mod prelude {
    pub use crate::errors::PagingErrors;
    pub use crate::mode::{PagingLevel, PagingMode};
}
