//! SQL export
//!
//! Turns a package into one consolidated SQL script:
//! - Extraction of every embedded query
//! - Classification and ordering by the configured rule list
//! - Beautification
//! - Assembly with the warehouse DDL and null-record insert

pub mod beautifier;
pub mod classifier;
pub mod extractor;
pub mod sql_file;

pub use beautifier::{
    BeautifyError, SqlBeautifier, StatementKind, align_column_aliases, align_equals_signs,
    format_create_table, split_column_definitions,
};
pub use classifier::{Classification, QueryOrder, SqlClassifierOrderer};
pub use extractor::{ExtractedQueries, SqlExtractor};
pub use sql_file::{
    NoSchemaProvider, SECTION_DIVIDER, SchemaProviderError, SqlFile, SqlFileBuilder,
    StaticSchemaProvider, TableSchemaProvider, find_insert_statement,
};
