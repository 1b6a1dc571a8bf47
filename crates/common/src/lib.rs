//! Shared types and utilities for the iRODS FUSE filesystem.
//!
//! This crate provides functionality used across all irods-fuse crates:
//! - The core error type with stable errno mapping
//! - Zone path normalization utilities
//! - Duration-string parsing for configuration fields
//! - Mount instance identifiers
//! - The full mount configuration schema with validation

pub mod config;
pub mod duration;
pub mod error;
pub mod instance;
pub mod path;

// Re-export commonly used items at crate root
pub use config::{
    parse_pool_service_endpoint, Config, MetadataCacheTimeoutSetting, PathMapping,
    PoolServiceEndpoint,
};
pub use duration::{format_duration, parse_duration};
pub use error::FsError;
pub use instance::instance_id;
pub use path::{join_path, normalize_path, path_depth, path_name, path_parent};
