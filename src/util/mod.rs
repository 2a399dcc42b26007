pub mod common;
pub mod extractor;
pub mod maybe;
