//! Configuration parsing: runtime settings and the target manifest

pub mod manifest;
pub mod settings;
