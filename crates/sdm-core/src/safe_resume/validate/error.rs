//! Error types for safe-resume validation.

use std::fmt;

/// The remote resource no longer matches the stored snapshot.
#[derive(Debug)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
}

#[derive(Debug)]
pub enum ValidationErrorKind {
    /// Remote ETag, Last-Modified, or size changed.
    RemoteChanged {
        etag_changed: bool,
        last_modified_changed: bool,
        size_changed: bool,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValidationErrorKind::RemoteChanged {
                etag_changed,
                last_modified_changed,
                size_changed,
            } => {
                let fields: Vec<&str> = [
                    (*etag_changed, "ETag"),
                    (*last_modified_changed, "Last-Modified"),
                    (*size_changed, "size"),
                ]
                .into_iter()
                .filter_map(|(changed, name)| changed.then_some(name))
                .collect();
                write!(f, "{} differs from the stored snapshot", fields.join(", "))
            }
        }
    }
}

impl std::error::Error for ValidationError {}
