//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, load_config, ai_client)
//! - `import` - CSV import
//! - `imports` - Import run listing and recovery
//! - `categories` - Allowed category management
//! - `cache` - Normalization cache inspection

pub mod cache;
pub mod categories;
pub mod core;
pub mod import;
pub mod imports;

// Re-export command functions for main.rs
pub use cache::*;
pub use categories::*;
pub use core::*;
pub use import::*;
pub use imports::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
