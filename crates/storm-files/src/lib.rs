//! # storm-files
//!
//! File attachments for Storm models.
//!
//! - `FileService` registers the `File` model on a `Storm` context and
//!   builds files from uploads, local paths, raw data, URLs and paths
//!   already on the disk
//! - files are stored under a three-level partition of an opaque disk name,
//!   in a public or a protected folder
//! - image files produce thumbnails on request, falling back to a
//!   placeholder when the source cannot be resized
//! - existence checks are cached, positive answers only
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storm_cache::{CacheConfig, MemoryBackend};
//! use storm_files::{FileService, FilesConfig, UploadedFile};
//! use storm_orm::{ModelSchema, RelationDefinition, Row, Storm};
//! use storm_storage::{LocalBackend, LocalStorageConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let storm = Storm::memory();
//! storm.register(ModelSchema::new("Product", "products").relation(RelationDefinition::attach_many("photos", "File")))?;
//!
//! let files = FileService::install(
//!     &storm,
//!     Arc::new(LocalBackend::new(LocalStorageConfig::from_env())),
//!     Arc::new(MemoryBackend::new(CacheConfig::default())),
//!     FilesConfig::from_env(),
//! )?;
//!
//! let session = Storm::new_session_key();
//! let product = storm.new_record("Product")?;
//! let photo = files.from_post(UploadedFile::new("front.png", std::fs::read("front.png")?)).await?;
//! storm.relation(&product, "photos")?.add(photo.record(), Some(&session), Row::new()).await?;
//! storm.save(&product, Some(&session)).await?;
//!
//! println!("{}", photo.get_thumb(200, 200, None).await);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod disk;
pub mod error;
pub mod existence;
pub mod file;
pub mod logging;
pub mod mime_types;
mod observer;
pub mod partition;
pub mod schema;
pub mod thumbnail;

pub use config::{FilesConfig, FilesConfigBuilder};
pub use disk::Disk;
pub use error::{FilesError, FilesResult};
pub use existence::ExistenceCache;
pub use file::{size_to_string, AttachedFile, FileService, UploadedFile};
pub use logging::{init_logging, LoggingConfig};
pub use partition::{generate_disk_name, partition_directory};
pub use schema::{file_schema, files_migration, FILE_MODEL};
pub use thumbnail::{ThumbMode, ThumbOptions};
