//! Filesystem helpers for downloaded media

pub mod paths;

pub use paths::{avoid_collision, media_path, sanitize_filename, temp_path};
