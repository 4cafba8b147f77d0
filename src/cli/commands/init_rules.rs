//! Init-rules command implementation

use std::path::Path;

use crate::cli::error::CliError;
use crate::config::ensure_rules_file;

/// Default location of the property rules file
pub const DEFAULT_RULES_PATH: &str = "property_rules.yml";

/// Write the built-in property rules unless the file already exists
pub fn handle_init_rules(path: &Path) -> Result<(), CliError> {
    if ensure_rules_file(path)? {
        println!("Created {}", path.display());
    } else {
        println!("{} already exists, left unchanged", path.display());
    }
    Ok(())
}
