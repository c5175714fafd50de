//! Mapping between request paths and files under the data root.
//!
//! A [`RequestPath`] is normalized and validated once, when it is parsed
//! from the request. It can never hold a `..` segment, so every data path
//! built from it is lexically under the root. Symlinks can still point
//! elsewhere; [`PathResolver::is_confined`] resolves them and re-checks the
//! prefix before a data path is read or written.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped when a path segment is written into a URL or HTML
/// attribute. Includes the quote and angle-bracket characters so the result
/// can be embedded in markup and JSON string literals verbatim.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'\'')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

const HTML: &str = "html";
const INDEX: &str = "index";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path escapes the data root: {raw}")]
    Escape { raw: String },
    #[error("path is not valid UTF-8 once decoded: {raw}")]
    Encoding { raw: String },
}

/// A normalized URL path: starts with `/`, no trailing slash except for the
/// root, no empty, `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestPath {
    segments: Vec<String>,
}

impl RequestPath {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Percent-decodes and normalizes the path part of a request-target.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let mut segments = Vec::new();
        for piece in raw.split('/') {
            let decoded = percent_decode_str(piece)
                .decode_utf8()
                .map_err(|_| PathError::Encoding {
                    raw: raw.to_string(),
                })?;
            segments.push(decoded.into_owned());
        }
        Self::from_segments(segments).map_err(|_| PathError::Escape {
            raw: raw.to_string(),
        })
    }

    /// Builds a path from already-decoded segments.
    fn from_segments<I>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut kept = Vec::new();
        for segment in segments {
            match segment.as_str() {
                "" | "." => continue,
                ".." => return Err(PathError::Escape { raw: segment }),
                s if s.contains(['/', '\\', '\0']) => {
                    return Err(PathError::Escape { raw: segment });
                }
                _ => kept.push(segment),
            }
        }
        Ok(Self { segments: kept })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Extension of the last segment; a leading dot does not start one.
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name()?;
        match name.rfind('.') {
            Some(0) | None => None,
            Some(i) => Some(&name[i + 1..]),
        }
    }

    /// The containing directory; `None` for the root.
    pub fn parent(&self) -> Option<RequestPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The path percent-encoded for use in a URL, `Location` header or href.
    pub fn to_href(&self) -> String {
        if self.is_root() {
            return "/".to_string();
        }
        self.segments
            .iter()
            .map(|s| format!("/{}", utf8_percent_encode(s, SEGMENT)))
            .collect()
    }
}

impl fmt::Display for RequestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// What a request path points at on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Missing,
}

/// Resolves request paths against the data root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    fallback_extensions: Vec<String>,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>, fallback_extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            fallback_extensions,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn to_data_path(&self, path: &RequestPath) -> PathBuf {
        let mut data = self.root.clone();
        data.extend(path.segments());
        data
    }

    /// Inverse of [`to_data_path`](Self::to_data_path). `None` when
    /// `data_path` is not under the root or is not valid UTF-8.
    pub fn to_request_path(&self, data_path: &Path) -> Option<RequestPath> {
        let relative = data_path.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => segments.push(name.to_str()?.to_string()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        RequestPath::from_segments(segments).ok()
    }

    /// Whether `data_path` is still under the root once symlinks are
    /// resolved.
    ///
    /// Trailing components that do not exist yet are allowed; the nearest
    /// existing ancestor decides. A dangling symlink counts as outside.
    pub fn is_confined(&self, data_path: &Path) -> io::Result<bool> {
        let root = fs::canonicalize(&self.root)?;

        let mut existing = data_path;
        loop {
            match fs::symlink_metadata(existing) {
                Ok(_) => break,
                Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                    match existing.parent() {
                        Some(parent) => existing = parent,
                        None => return Ok(false),
                    }
                }
                Err(e) => return Err(e),
            }
        }

        match fs::canonicalize(existing) {
            Ok(real) => Ok(real.starts_with(&root)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn classify(&self, path: &RequestPath) -> EntryKind {
        match fs::metadata(self.to_data_path(path)) {
            Ok(meta) if meta.is_dir() => EntryKind::Directory,
            Ok(_) => EntryKind::File,
            Err(_) => EntryKind::Missing,
        }
    }

    /// Finds a file to show in place of `path`, which had no exact match.
    ///
    /// Directories and extension-less misses try `<p>.html`,
    /// `<p>/index.html`, then `<p>.*` and `<p>/index.*`. A missing `.html`
    /// file tries its siblings `<stem>.*`. "Any extension" candidates are
    /// ranked by the configured extension list, then by file name.
    pub fn guess(&self, path: &RequestPath, kind: EntryKind) -> io::Result<Option<PathBuf>> {
        let data = self.to_data_path(path);

        match (kind, path.extension()) {
            (EntryKind::Directory, _) | (EntryKind::Missing, None) => {
                let sibling = self.sibling_stem(path);

                let mut html = Vec::new();
                if let Some((dir, stem)) = &sibling {
                    html.push(dir.join(format!("{stem}.{HTML}")));
                }
                html.push(data.join(format!("{INDEX}.{HTML}")));
                if let Some(found) = html.into_iter().find(|p| p.is_file()) {
                    return Ok(Some(found));
                }

                if let Some((dir, stem)) = &sibling {
                    if let Some(found) = self.first_with_stem(dir, stem)? {
                        return Ok(Some(found));
                    }
                }
                if kind == EntryKind::Directory {
                    return self.first_with_stem(&data, INDEX);
                }
                Ok(None)
            }
            (EntryKind::Missing, Some(ext)) if ext == HTML => match self.sibling_stem(path) {
                Some((dir, name)) => {
                    let stem = &name[..name.len() - HTML.len() - 1];
                    self.first_with_stem(&dir, stem)
                }
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Parent data directory and file name; `None` for the root, which has
    /// no siblings inside the data root.
    fn sibling_stem(&self, path: &RequestPath) -> Option<(PathBuf, String)> {
        let parent = path.parent()?;
        let name = path.file_name()?.to_string();
        Some((self.to_data_path(&parent), name))
    }

    /// Best regular file in `dir` named `<stem>.<ext>` with a single,
    /// non-empty extension.
    fn first_with_stem(&self, dir: &Path, stem: &str) -> io::Result<Option<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let prefix = format!("{stem}.");
        let mut candidates = Vec::new();
        for entry in entries {
            let entry = entry?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let Some(ext) = name.strip_prefix(&prefix) else {
                continue;
            };
            if ext.is_empty() || ext.contains('.') || !entry.path().is_file() {
                continue;
            }
            let rank = self
                .fallback_extensions
                .iter()
                .position(|e| e.eq_ignore_ascii_case(ext))
                .unwrap_or(usize::MAX);
            candidates.push((rank, name));
        }

        candidates.sort();
        Ok(candidates.into_iter().next().map(|(_, name)| dir.join(name)))
    }
}
