//! Declaration front-ends
//!
//! Implementations of the `DeclarationFrontend` trait.

pub mod rust;

pub use rust::RustFrontend;
