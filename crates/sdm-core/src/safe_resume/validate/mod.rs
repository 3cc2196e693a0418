//! Compares stored resource metadata with a fresh probe.

mod error;

use crate::model::ResourceMetadata;

pub use error::{ValidationError, ValidationErrorKind};

fn differs<T: PartialEq>(stored: &Option<T>, current: &Option<T>) -> bool {
    match (stored, current) {
        (None, None) => false,
        (Some(a), Some(b)) => a != b,
        _ => true,
    }
}

/// Returns Ok(()) if bytes fetched against `stored` may be combined with bytes
/// fetched against `current`.
///
/// With no stored metadata (never probed) there is nothing to protect, so the
/// caller proceeds with a fresh plan. Otherwise ETag, Last-Modified, and size
/// must all match.
pub fn validate_for_resume(
    stored: Option<&ResourceMetadata>,
    current: &ResourceMetadata,
) -> Result<(), ValidationError> {
    let Some(stored) = stored else {
        return Ok(());
    };

    let etag_changed = differs(&stored.etag, &current.etag);
    let last_modified_changed = differs(&stored.last_modified, &current.last_modified);
    let size_changed = differs(&stored.total_size, &current.total_size);

    if etag_changed || last_modified_changed || size_changed {
        return Err(ValidationError {
            kind: ValidationErrorKind::RemoteChanged {
                etag_changed,
                last_modified_changed,
                size_changed,
            },
        });
    }

    Ok(())
}
