//! `sdm get <url>` – submit a download and follow it in the foreground.

use anyhow::{bail, Result};
use sdm_core::{DownloadRequest, Engine};
use std::path::PathBuf;

use super::follow::{follow, report};

#[derive(Debug)]
pub struct GetArgs {
    pub url: String,
    pub output: PathBuf,
    pub segments: Option<usize>,
    pub limit: Option<u64>,
    pub sha256: Option<String>,
    pub headers: Vec<String>,
}

/// Splits a `-H "Name: value"` argument.
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("header must look like 'Name: value', got {:?}", raw),
    }
}

pub fn build_request(args: GetArgs) -> Result<DownloadRequest> {
    let mut req = DownloadRequest::new(args.url, args.output);
    if let Some(n) = args.segments {
        req = req.with_segments(n);
    }
    if let Some(hex) = args.sha256 {
        req = req.with_sha256(hex);
    }
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        req = req.with_header(name, value);
    }
    Ok(req)
}

pub async fn run_get(engine: &Engine, args: GetArgs) -> Result<()> {
    if args.limit.is_some() {
        engine.set_bandwidth_limit(args.limit);
    }
    let req = build_request(args)?;
    let events = engine.subscribe();
    let id = engine.submit(req).await?;
    println!("Started download {}", id);
    let settled = follow(engine, id, events).await?;
    report(id, &settled)
}
