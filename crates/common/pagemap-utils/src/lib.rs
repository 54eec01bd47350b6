#![cfg_attr(not(test), no_std)]

/// Alignment helpers.
pub mod align;

#[macro_use]
mod macros;
