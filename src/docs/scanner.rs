//! Document tree discovery and preview generation.
//!
//! The scanner walks a checked-out documentation tree and builds an ordered
//! [`DocumentNode`] summary. Every file node carries a bounded preview; a file that
//! cannot be previewed is still listed, with the reason instead of a preview.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extensions recognised as documentation when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["md", "mdx", "markdown"];

/// Marker shown in place of a preview for files that could not be read.
pub const PREVIEW_UNAVAILABLE: &str = "preview unavailable";

/// Upper bound on bytes read per character of preview.
const BYTES_PER_CHAR: usize = 4;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("documentation root {0} does not exist")]
    RootMissing(PathBuf),

    #[error("documentation root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("scan cancelled")]
    Cancelled,

    #[error("failed to list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Limits applied to every preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewOptions {
    pub max_chars: usize,
    pub max_paragraphs: usize,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            max_chars: 600,
            max_paragraphs: 3,
        }
    }
}

/// Leading excerpt of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    #[serde(rename = "preview")]
    pub text: String,
    /// Whether content was left out.
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FilePreview {
    Available(Preview),
    Unavailable { preview_unavailable: String },
}

impl FilePreview {
    pub fn is_available(&self) -> bool {
        matches!(self, FilePreview::Available(_))
    }

    /// Preview text, or the unavailable marker.
    pub fn text(&self) -> &str {
        match self {
            FilePreview::Available(preview) => &preview.text,
            FilePreview::Unavailable { .. } => PREVIEW_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirNode {
    pub name: String,
    /// Path relative to the scanned root, `/`-separated; empty for the root.
    pub path: String,
    pub children: Vec<DocumentNode>,
    /// Why the directory could not be listed; its children are then empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_unavailable: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub preview: FilePreview,
}

/// One entry of a scanned documentation tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DocumentNode {
    Dir(DirNode),
    File(FileNode),
}

impl DocumentNode {
    pub fn name(&self) -> &str {
        match self {
            DocumentNode::Dir(dir) => &dir.name,
            DocumentNode::File(file) => &file.name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            DocumentNode::Dir(dir) => &dir.path,
            DocumentNode::File(file) => &file.path,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, DocumentNode::Dir(_))
    }

    /// Children of a directory; empty for files.
    pub fn children(&self) -> &[DocumentNode] {
        match self {
            DocumentNode::Dir(dir) => &dir.children,
            DocumentNode::File(_) => &[],
        }
    }

}

#[cfg(test)]
impl DocumentNode {
    pub(crate) fn find(&self, path: &str) -> Option<&DocumentNode> {
        if self.path() == path {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(path))
    }
}

/// Shared flag to stop an in-progress scan.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Builds [`DocumentNode`] trees for documentation directories.
#[derive(Debug, Clone)]
pub struct StructureScanner {
    options: PreviewOptions,
    extensions: Vec<String>,
}

impl Default for StructureScanner {
    fn default() -> Self {
        Self::new(PreviewOptions::default())
    }
}

impl StructureScanner {
    pub fn new(options: PreviewOptions) -> Self {
        Self {
            options,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Replace the recognised extensions (case-insensitive, leading dot optional).
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn options(&self) -> &PreviewOptions {
        &self.options
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Whether `path` has one of the recognised documentation extensions.
    pub fn is_document(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }

    /// Scan `root` into an ordered tree.
    pub fn scan(&self, root: &Path) -> Result<DocumentNode, ScanError> {
        self.scan_with_cancel(root, &CancelFlag::new())
    }

    /// Scan `root`, checking `cancel` before each file.
    pub fn scan_with_cancel(
        &self,
        root: &Path,
        cancel: &CancelFlag,
    ) -> Result<DocumentNode, ScanError> {
        let metadata = match fs::metadata(root) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ScanError::RootMissing(root.to_path_buf()));
            }
            Err(source) => {
                return Err(ScanError::Io {
                    path: root.to_path_buf(),
                    source,
                });
            }
        };
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let entries = fs::read_dir(root).map_err(|source| ScanError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let children = self.scan_entries(entries, "", cancel)?;

        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(DocumentNode::Dir(DirNode {
            name,
            path: String::new(),
            children,
            listing_unavailable: None,
        }))
    }

    /// Directory node for `dir`, or None if it holds no documents. A directory that
    /// cannot be listed is kept, marked with the reason.
    fn scan_directory(
        &self,
        dir: &Path,
        rel: &str,
        cancel: &CancelFlag,
    ) -> Result<Option<DocumentNode>, ScanError> {
        let name = rel.rsplit('/').next().unwrap_or(rel).to_string();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Listing unavailable for {}: {}", dir.display(), e);
                return Ok(Some(DocumentNode::Dir(DirNode {
                    name,
                    path: rel.to_string(),
                    children: Vec::new(),
                    listing_unavailable: Some(e.to_string()),
                })));
            }
        };

        let children = self.scan_entries(entries, rel, cancel)?;
        if children.is_empty() {
            return Ok(None);
        }

        Ok(Some(DocumentNode::Dir(DirNode {
            name,
            path: rel.to_string(),
            children,
            listing_unavailable: None,
        })))
    }

    fn scan_entries(
        &self,
        entries: fs::ReadDir,
        rel: &str,
        cancel: &CancelFlag,
    ) -> Result<Vec<DocumentNode>, ScanError> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        for entry in entries.filter_map(Result::ok) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            // DirEntry::file_type does not follow symlinks.
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }

            let child_rel = if rel.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", rel, name)
            };
            let path = entry.path();

            if file_type.is_dir() {
                dirs.push((name, path, child_rel));
            } else if file_type.is_file() && self.is_document(&path) {
                files.push((name, path, child_rel));
            }
        }

        dirs.sort_by(|a, b| a.0.cmp(&b.0));
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut nodes = Vec::with_capacity(dirs.len() + files.len());
        for (_, path, child_rel) in dirs {
            if let Some(node) = self.scan_directory(&path, &child_rel, cancel)? {
                nodes.push(node);
            }
        }
        for (name, path, child_rel) in files {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            nodes.push(DocumentNode::File(self.file_node(name, &path, child_rel)));
        }
        Ok(nodes)
    }

    fn file_node(&self, name: String, path: &Path, rel: String) -> FileNode {
        match self.read_excerpt(path) {
            Ok((title, preview, size)) => FileNode {
                name,
                path: rel,
                size,
                title,
                preview: FilePreview::Available(preview),
            },
            Err(e) => {
                log::warn!("Preview unavailable for {}: {}", path.display(), e);
                FileNode {
                    name,
                    path: rel,
                    size: fs::metadata(path).map(|m| m.len()).unwrap_or(0),
                    title: None,
                    preview: FilePreview::Unavailable {
                        preview_unavailable: e.to_string(),
                    },
                }
            }
        }
    }

    /// Bounded preview of a single document.
    pub fn preview_file(&self, path: &Path) -> io::Result<Preview> {
        self.read_excerpt(path).map(|(_, preview, _)| preview)
    }

    /// Title, preview and byte size of a document, reading at most
    /// `BYTES_PER_CHAR * max_chars` bytes.
    fn read_excerpt(&self, path: &Path) -> io::Result<(Option<String>, Preview, u64)> {
        let limit = self.options.max_chars.saturating_mul(BYTES_PER_CHAR);
        let (text, size) = read_prefix(path, limit)?;
        let cut_short = size > text.len() as u64;

        let body = split_front_matter(&text).map_or("", |(_, body)| body);
        let title = extract_title(&text);
        let mut preview = build_preview(body, &self.options);
        preview.truncated |= cut_short;
        Ok((title, preview, size))
    }
}

/// Read at most `limit` bytes of `path` as UTF-8, returning the text and the file size.
///
/// A multi-byte character split by the limit is dropped; any other invalid UTF-8 is an
/// `InvalidData` error.
fn read_prefix(path: &Path, limit: usize) -> io::Result<(String, u64)> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();

    let mut buf = Vec::with_capacity(limit.min(size as usize));
    file.take(limit as u64).read_to_end(&mut buf)?;

    match String::from_utf8(buf) {
        Ok(text) => Ok((text, size)),
        Err(e) => {
            let error = e.utf8_error();
            let hit_limit = e.as_bytes().len() == limit && size > limit as u64;
            if error.error_len().is_none() && hit_limit {
                let mut bytes = e.into_bytes();
                bytes.truncate(error.valid_up_to());
                let text = String::from_utf8(bytes).map_err(|e| not_utf8(e.utf8_error()))?;
                Ok((text, size))
            } else {
                Err(not_utf8(error))
            }
        }
    }
}

fn not_utf8(error: std::str::Utf8Error) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("file is not valid UTF-8 ({})", error),
    )
}

/// Split a leading `---` YAML block off `text`.
///
/// Returns the YAML between the delimiters (None if there is no block) and the body
/// after it, or None overall if the block is never closed.
fn split_front_matter(text: &str) -> Option<(Option<&str>, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return Some((None, text));
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((Some(&rest[..offset]), &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Front matter fields read during a scan.
#[derive(Deserialize)]
struct FrontMatter {
    title: Option<String>,
}

/// `title` from a front matter block. serde_yaml handles quoted and block scalars.
fn front_matter_title(yaml: &str) -> Option<String> {
    let yaml = yaml.trim();
    if yaml.is_empty() {
        return None;
    }
    let fields: FrontMatter = serde_yaml::from_str(yaml)
        .inspect_err(|e| log::debug!("Ignoring malformed front matter: {}", e))
        .ok()?;
    let title = fields.title?.trim().to_string();
    (!title.is_empty()).then_some(title)
}

/// First level-1 heading of the body, falling back to a front matter `title`.
pub fn extract_title(text: &str) -> Option<String> {
    let (yaml, body) = split_front_matter(text)?;
    let heading = body
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix("# "))
        .map(|title| title.trim().trim_end_matches('#').trim().to_string())
        .find(|title| !title.is_empty());

    heading.or_else(|| front_matter_title(yaml?))
}

/// Leading paragraphs of `body`, bounded by both limits.
pub fn build_preview(body: &str, options: &PreviewOptions) -> Preview {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut truncated = false;

    for line in body.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
            continue;
        }
        if paragraphs.len() >= options.max_paragraphs {
            truncated = true;
            break;
        }
        current.push(line.trim_end());
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    let joined = paragraphs.join("\n\n");
    let text = match joined.char_indices().nth(options.max_chars) {
        Some((cut, _)) => {
            truncated = true;
            joined[..cut].to_string()
        }
        None => joined,
    };

    Preview { text, truncated }
}
