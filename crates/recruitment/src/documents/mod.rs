//! Screening and storage of candidate-submitted documents.

pub mod storage;
pub mod validator;

pub use storage::{
    content_type_for, sanitize_base_name, DocumentKind, DocumentStore, FsDocumentStore,
    StorageError, StoragePathBuilder, SuffixSource, UuidSuffix,
};
pub use validator::{
    extension_of, DocumentValidator, RejectionReason, Verdict, ALLOWED_EXTENSIONS,
    MAX_FILE_SIZE_BYTES,
};
