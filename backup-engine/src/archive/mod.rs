//! ZIP archive creation and extraction.
//!
//! - `writer`: builds one deflate-compressed archive from files and directories
//! - `reader`: lists and extracts members, fully or by selection
//! - `selection`: member-path prefix matching and root grouping

pub mod reader;
pub mod selection;
pub mod writer;

pub use reader::{extract_all, extract_matching, list_members, ExtractSummary};
pub use selection::{root_groups, root_of, Selection};
pub use writer::{create_archive, ArchiveSummary};
