use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::access::IdentityId;

use super::validator::extension_of;

const ROOT_SEGMENT: &str = "users";
const ANONYMOUS_SEGMENT: &str = "anonymous";
/// Keeps `<base>-<suffix>.<ext>` under the 255-byte file name limit of common filesystems.
const MAX_BASE_BYTES: usize = 200;
const MAX_EXTENSION_BYTES: usize = 16;

/// Which slot of an application a document fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Cv,
    CoverLetter,
}

impl DocumentKind {
    pub const fn tag(self) -> &'static str {
        match self {
            DocumentKind::Cv => "cv",
            DocumentKind::CoverLetter => "cover_letter",
        }
    }
}

/// Source of the collision-avoiding suffix appended to stored file names.
pub trait SuffixSource: Send + Sync {
    fn next_suffix(&self) -> String;
}

/// Random 32-character hex suffix.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSuffix;

impl SuffixSource for UuidSuffix {
    fn next_suffix(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Reduces a user-supplied name to alphanumerics plus `-`, `_` and `.`, keeping only the final
/// path component. The result is at most `MAX_BASE_BYTES` long and cut on a char boundary.
pub fn sanitize_base_name(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let mut cleaned = String::new();
    for ch in last
        .trim()
        .chars()
        .map(|ch| if ch == ' ' { '_' } else { ch })
        .filter(|ch| ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.'))
    {
        if cleaned.len() + ch.len_utf8() > MAX_BASE_BYTES {
            break;
        }
        cleaned.push(ch);
    }

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Splits a name into sanitized stem and `.ext` (lowercase, ASCII alphanumeric).
fn secure_file_name(filename: &str, suffix: &str) -> String {
    let last = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let extension: String = extension_of(last)
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_EXTENSION_BYTES)
        .collect();
    let stem = if extension.is_empty() {
        last
    } else {
        &last[..last.rfind('.').unwrap_or(last.len())]
    };

    let base = sanitize_base_name(stem);
    if extension.is_empty() {
        format!("{base}-{suffix}")
    } else {
        format!("{base}-{suffix}.{extension}")
    }
}

/// Derives day-bucketed storage keys for accepted documents.
#[derive(Clone)]
pub struct StoragePathBuilder {
    suffixes: Arc<dyn SuffixSource>,
}

impl Default for StoragePathBuilder {
    fn default() -> Self {
        Self::new(Arc::new(UuidSuffix))
    }
}

impl StoragePathBuilder {
    pub fn new(suffixes: Arc<dyn SuffixSource>) -> Self {
        Self { suffixes }
    }

    /// `users/<owner>/<YYYY>/<MM>/<DD>/<kind>/<base>-<suffix><.ext>` for today (UTC).
    pub fn derive(&self, owner: Option<IdentityId>, kind: DocumentKind, filename: &str) -> String {
        self.derive_on(owner, Utc::now().date_naive(), kind, filename)
    }

    pub fn derive_on(
        &self,
        owner: Option<IdentityId>,
        date: NaiveDate,
        kind: DocumentKind,
        filename: &str,
    ) -> String {
        let owner = owner
            .map(|id| id.to_string())
            .unwrap_or_else(|| ANONYMOUS_SEGMENT.to_string());
        let name = secure_file_name(filename, &self.suffixes.next_suffix());

        format!(
            "{ROOT_SEGMENT}/{owner}/{:04}/{:02}/{:02}/{}/{name}",
            date.year(),
            date.month(),
            date.day(),
            kind.tag()
        )
    }
}

/// Content type served when a stored document is downloaded.
pub fn content_type_for(filename: &str) -> mime::Mime {
    match extension_of(filename).as_deref() {
        Some("pdf") => mime::APPLICATION_PDF,
        Some("doc") => "application/msword"
            .parse()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM),
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            .parse()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage key '{0}' is not a relative path")]
    InvalidKey(String),
    #[error("document '{0}' not found")]
    Missing(String),
    #[error("document storage failed: {0}")]
    Io(#[from] io::Error),
}

/// Persistence for accepted documents, addressed by derived storage key.
pub trait DocumentStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    /// Removing a key that holds nothing succeeds.
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Stores documents below a media root directory.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let well_formed = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !well_formed {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl DocumentStore for FsDocumentStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::Missing(key.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}
