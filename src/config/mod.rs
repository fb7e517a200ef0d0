// src/config/mod.rs

//! Configuration: optional TOML file, CLI overrides, validated [`Settings`].

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, resolve_settings};
pub use model::{ConfigOverrides, RawConfigFile, Settings};
