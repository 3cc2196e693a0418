//! Parse HTTP response header lines.

/// `Content-Range: bytes start-end/total` (total may be `*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

/// Headers of the final response (after redirects) relevant to probing and fetching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    /// Status from the `HTTP/x y` line, if one was seen.
    pub status: Option<u32>,
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
    /// True if server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_disposition: Option<String>,
}

/// Parses a `Content-Range` value. Unsatisfied ranges (`bytes */N`) yield `None`.
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let (start, end) = span.trim().split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = end.trim().parse::<u64>().ok()?;
    if end < start {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    Some(ContentRange { start, end, total })
}

/// Parse collected header lines. A status line starts a new response, so
/// only the last response of a redirect chain is reported.
pub fn parse_headers<S: AsRef<str>>(lines: &[S]) -> ResponseHeaders {
    let mut out = ResponseHeaders::default();

    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            out = ResponseHeaders {
                status: line.split_whitespace().nth(1).and_then(|c| c.parse().ok()),
                ..ResponseHeaders::default()
            };
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            out.content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("content-range") {
            out.content_range = parse_content_range(value);
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            out.accept_ranges = value.eq_ignore_ascii_case("bytes");
        } else if name.eq_ignore_ascii_case("etag") {
            out.etag = Some(value.trim_matches('"').to_string());
        } else if name.eq_ignore_ascii_case("last-modified") {
            out.last_modified = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("content-disposition") {
            out.content_disposition = Some(value.to_string());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_headers_content_length_and_ranges() {
        let r = parse_headers(&[
            "HTTP/1.1 200 OK",
            "Content-Length: 12345",
            "Accept-Ranges: bytes",
        ]);
        assert_eq!(r.status, Some(200));
        assert_eq!(r.content_length, Some(12345));
        assert!(r.accept_ranges);
        assert!(r.etag.is_none());
    }

    #[test]
    fn parse_headers_validators() {
        let r = parse_headers(&[
            "ETag: \"abc-123\"",
            "Last-Modified: Wed, 21 Oct 2015 07:28:00 GMT",
        ]);
        assert_eq!(r.etag.as_deref(), Some("abc-123"));
        assert_eq!(
            r.last_modified.as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
    }

    #[test]
    fn redirect_chain_keeps_last_response() {
        let r = parse_headers(&[
            "HTTP/1.1 302 Found",
            "Location: /real",
            "Content-Length: 0",
            "ETag: \"old\"",
            "",
            "HTTP/1.1 206 Partial Content",
            "Content-Range: bytes 0-0/4096",
            "Content-Length: 1",
        ]);
        assert_eq!(r.status, Some(206));
        assert_eq!(r.content_length, Some(1));
        assert!(r.etag.is_none());
        assert_eq!(
            r.content_range,
            Some(ContentRange {
                start: 0,
                end: 0,
                total: Some(4096)
            })
        );
    }

    #[test]
    fn content_range_forms() {
        assert_eq!(
            parse_content_range("bytes 250000-499999/1000000"),
            Some(ContentRange {
                start: 250_000,
                end: 499_999,
                total: Some(1_000_000)
            })
        );
        assert_eq!(
            parse_content_range("bytes 0-9/*"),
            Some(ContentRange {
                start: 0,
                end: 9,
                total: None
            })
        );
        assert_eq!(parse_content_range("bytes */1000"), None);
        assert_eq!(parse_content_range("bytes 9-0/10"), None);
        assert_eq!(parse_content_range("items 0-9/10"), None);
    }

    #[test]
    fn parse_headers_content_disposition() {
        let r = parse_headers(&["Content-Disposition: attachment; filename=\"report.pdf\""]);
        assert!(r
            .content_disposition
            .as_deref()
            .unwrap()
            .contains("report.pdf"));
    }
}
