//! File system helpers shared by the archiver and the manifest builder.

pub mod walker;
