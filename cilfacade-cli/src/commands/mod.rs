pub mod common;
pub mod info;
pub mod rewrite;
pub mod synthesize;
