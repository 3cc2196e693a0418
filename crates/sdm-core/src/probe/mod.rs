//! HTTP metadata probing.
//!
//! Uses the curl crate (libcurl) to learn the resource size, whether byte
//! ranges are honored, and the ETag/Last-Modified validators used for
//! resume safety. A `HEAD` is tried first; servers that reject it or omit
//! the length get a one-byte ranged `GET` instead.

mod parse;

use std::collections::BTreeMap;
use std::str;
use std::time::Duration;

use curl::easy::{Easy, List};

use crate::config::TimeoutConfig;
use crate::model::ResourceMetadata;
use crate::retry::TransferError;
use crate::url_model::parse_content_disposition_filename;

pub use parse::{parse_content_range, parse_headers, ContentRange, ResponseHeaders};

/// Installs caller-supplied request headers (auth, cookies) plus `extra` lines.
pub(crate) fn apply_headers(
    easy: &mut Easy,
    headers: &BTreeMap<String, String>,
    extra: &[&str],
) -> Result<(), curl::Error> {
    if headers.is_empty() && extra.is_empty() {
        return Ok(());
    }
    let mut list = List::new();
    for (k, v) in headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    for line in extra {
        list.append(line)?;
    }
    easy.http_headers(list)
}

/// Probes `url` and returns what the server reports about it.
///
/// Blocking; call from `spawn_blocking` when used from async code.
pub fn probe(
    url: &str,
    headers: &BTreeMap<String, String>,
    timeouts: &TimeoutConfig,
) -> Result<ResourceMetadata, TransferError> {
    let head_result = head(url, headers, timeouts);
    match &head_result {
        Ok(h) if h.content_length.is_some() => return Ok(metadata_from(h.clone(), None)),
        Ok(_) => tracing::debug!(url, "HEAD reported no length; trying ranged GET"),
        Err(e) => tracing::debug!(url, error = %e, "HEAD failed; trying ranged GET"),
    }
    match range_probe(url, headers, timeouts) {
        Ok(h) => {
            let total = match (h.status, h.content_range) {
                (Some(206), Some(cr)) => cr.total,
                _ => None,
            };
            Ok(metadata_from(h, total))
        }
        // A lengthless HEAD still beats nothing.
        Err(e) => match head_result {
            Ok(h) => Ok(metadata_from(h, None)),
            Err(_) => Err(e),
        },
    }
}

fn metadata_from(h: ResponseHeaders, ranged_total: Option<u64>) -> ResourceMetadata {
    let (total_size, accept_ranges) = match ranged_total {
        Some(total) => (Some(total), true),
        None if h.status == Some(206) => (None, false),
        None => (h.content_length, h.accept_ranges),
    };
    ResourceMetadata {
        total_size,
        accept_ranges,
        filename: h
            .content_disposition
            .as_deref()
            .and_then(parse_content_disposition_filename),
        etag: h.etag,
        last_modified: h.last_modified,
    }
}

fn configure(easy: &mut Easy, url: &str, timeouts: &TimeoutConfig) -> Result<(), curl::Error> {
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(Duration::from_secs(timeouts.connect_secs))?;
    easy.timeout(Duration::from_secs(timeouts.probe_secs))?;
    Ok(())
}

fn head(
    url: &str,
    headers: &BTreeMap<String, String>,
    timeouts: &TimeoutConfig,
) -> Result<ResponseHeaders, TransferError> {
    let mut lines: Vec<String> = Vec::new();
    let mut easy = Easy::new();
    configure(&mut easy, url, timeouts)?;
    easy.nobody(true)?;
    apply_headers(&mut easy, headers, &[])?;
    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                lines.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform()?;
    }
    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }
    Ok(parse_headers(&lines))
}

/// `GET` with `Range: bytes=0-0`. A server that ignores the range would
/// stream the whole body, so the transfer is cut after the first write.
fn range_probe(
    url: &str,
    headers: &BTreeMap<String, String>,
    timeouts: &TimeoutConfig,
) -> Result<ResponseHeaders, TransferError> {
    let mut lines: Vec<String> = Vec::new();
    let mut got_body = false;
    let mut easy = Easy::new();
    configure(&mut easy, url, timeouts)?;
    apply_headers(&mut easy, headers, &["Range: bytes=0-0"])?;
    let result = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                lines.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.write_function(|data| {
            got_body = true;
            Ok(if data.len() <= 1 { data.len() } else { 0 })
        })?;
        transfer.perform()
    };
    match result {
        Ok(()) => {}
        Err(e) if e.is_write_error() && got_body => {}
        Err(e) => return Err(e.into()),
    }
    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }
    Ok(parse_headers(&lines))
}
