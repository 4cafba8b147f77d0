//! Import functionality
//!
//! Readers for the two documents an audit consumes:
//! - Package XML, built into a [`crate::models::PackageModel`]
//! - Reference SQL scripts, split into named sections
//!
//! Both may be UTF-16 encoded; [`text::read_text_file`] handles the BOM.

pub mod package;
pub mod reference_sql;
pub mod text;

pub use package::{
    PIPELINE_EXECUTABLE, PackageModelBuilder, SEQUENCE_EXECUTABLE, SQL_TASK_EXECUTABLE,
};
pub use reference_sql::{ReferenceScript, ReferenceSection};
pub use text::{decode_text, read_text_file};
