//! Feature encoding: raw validated records -> fixed-length numeric vectors.

pub mod encoder;

pub use encoder::*;
