//! Reading checked-out documentation trees

mod reader;
mod scanner;

pub use reader::{ContentReader, ReadError};
pub use scanner::{
    CancelFlag, DEFAULT_EXTENSIONS, DirNode, DocumentNode, FileNode, FilePreview,
    PREVIEW_UNAVAILABLE, Preview, PreviewOptions, ScanError, StructureScanner, build_preview,
    extract_title,
};
