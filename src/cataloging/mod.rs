// src/cataloging/mod.rs

//! Cataloging pipeline: selection, execution, and relationship synthesis

mod config;
pub mod relationships;
pub mod runtime;
pub mod select;

pub use config::{DataGenerationConfig, ExecutorConfig, RelationshipsConfig, SearchConfig};
pub use runtime::{run_catalogers, RuntimeOutcome};
pub use select::{
    default_catalogers, select, CatalogerReference, SelectionRequest, DECLARED_TAG, DIRECTORY_TAG,
    IMAGE_TAG, INSTALLED_TAG, LANGUAGE_TAG, OS_TAG, PACKAGE_TAG,
};
