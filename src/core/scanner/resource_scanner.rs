// src/core/scanner/resource_scanner.rs

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use once_cell::sync::Lazy;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::models::{ResourceBreakdown, round2};
use crate::error::{ProbeError, Result};

static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());
static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("script[src]").unwrap());
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("link[rel][href]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    Script,
    Stylesheet,
}

/// Sub-resource references found in a page, each list already capped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRefs {
    pub images: Vec<String>,
    pub scripts: Vec<String>,
    pub stylesheets: Vec<String>,
}

impl ResourceRefs {
    pub fn len(&self) -> usize {
        self.images.len() + self.scripts.len() + self.stylesheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tagged(self) -> impl Iterator<Item = (ResourceKind, String)> {
        let images = self.images.into_iter().map(|u| (ResourceKind::Image, u));
        let scripts = self.scripts.into_iter().map(|u| (ResourceKind::Script, u));
        let stylesheets = self.stylesheets.into_iter().map(|u| (ResourceKind::Stylesheet, u));
        images.chain(scripts).chain(stylesheets)
    }
}

/// Pulls `<img src>`, `<script src>` and stylesheet `<link href>` references
/// out of `html`, keeping at most `limit` of each kind in document order.
pub fn extract_resources(html: &str, limit: usize) -> ResourceRefs {
    let document = Html::parse_document(html);
    let collect = |selector: &Selector, attr: &str| -> Vec<String> {
        document
            .select(selector)
            .filter_map(|el| el.value().attr(attr))
            .map(str::to_string)
            .take(limit)
            .collect()
    };

    let stylesheets = document
        .select(&LINK_SELECTOR)
        .filter(|el| {
            el.value()
                .attr("rel")
                .is_some_and(|rel| rel.split_ascii_whitespace().any(|t| t.eq_ignore_ascii_case("stylesheet")))
        })
        .filter_map(|el| el.value().attr("href"))
        .map(str::to_string)
        .take(limit)
        .collect();

    ResourceRefs {
        images: collect(&IMG_SELECTOR, "src"),
        scripts: collect(&SCRIPT_SELECTOR, "src"),
        stylesheets,
    }
}

/// Sums `(kind, kilobytes)` samples per category. The order of the samples
/// does not matter.
pub fn aggregate(samples: impl IntoIterator<Item = (ResourceKind, f64)>) -> ResourceBreakdown {
    let mut totals = ResourceBreakdown::default();
    for (kind, kb) in samples {
        let kb = kb.max(0.0);
        match kind {
            ResourceKind::Image => totals.images_kb += kb,
            ResourceKind::Script => totals.scripts_kb += kb,
            ResourceKind::Stylesheet => totals.css_kb += kb,
        }
    }
    ResourceBreakdown {
        images_kb: round2(totals.images_kb),
        scripts_kb: round2(totals.scripts_kb),
        css_kb: round2(totals.css_kb),
    }
}

/// Measures every referenced sub-resource of a page and totals them by kind.
///
/// # Arguments
/// * `client` - Shared HTTP client.
/// * `base` - Final URL of the page, used to resolve relative references.
/// * `html` - The page body.
/// * `limit` - Maximum number of resources per kind.
/// * `workers` - Maximum number of requests in flight.
/// * `per_request` - Timeout applied to each HEAD/GET.
pub async fn run_resource_scan(
    client: &Client,
    base: &Url,
    html: &str,
    limit: usize,
    workers: usize,
    per_request: Duration,
) -> ResourceBreakdown {
    // `Html` is not `Send`, so parsing finishes before the first await.
    let refs = extract_resources(html, limit);
    if refs.is_empty() {
        debug!(base = %base, "Page references no sub-resources.");
        return ResourceBreakdown::default();
    }
    info!(base = %base, resources = refs.len(), "Starting resource scan.");

    let permits = Arc::new(Semaphore::new(workers.max(1)));
    let tasks = refs.tagged().map(|(kind, reference)| {
        let permits = permits.clone();
        let absolute = absolutize(base, &reference);
        async move {
            let _permit = match permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => return (kind, 0.0),
            };
            match measure_resource_size(client, &absolute, per_request).await {
                Ok(kb) => (kind, kb),
                Err(e) => {
                    warn!(error = %e, "Resource size measurement failed.");
                    (kind, 0.0)
                }
            }
        }
    });

    let breakdown = aggregate(join_all(tasks).await);
    info!(?breakdown, "Resource scan finished.");
    breakdown
}

/// Resolves `reference` against `base`, passing it through unchanged when
/// it cannot be resolved.
fn absolutize(base: &Url, reference: &str) -> String {
    base.join(reference.trim())
        .map(String::from)
        .unwrap_or_else(|_| reference.to_string())
}

/// HEAD first; full GET when HEAD fails or carries no `Content-Length`.
async fn measure_resource_size(client: &Client, url: &str, per_request: Duration) -> Result<f64> {
    let head = client
        .head(url)
        .timeout(per_request)
        .send()
        .await
        .map_err(|e| ProbeError::resource(url, e))?;

    if head.status().as_u16() < 400 {
        let declared = head
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(bytes) = declared {
            debug!(url, bytes, "Size taken from Content-Length.");
            return Ok(bytes as f64 / 1024.0);
        }
    }

    let body = client
        .get(url)
        .timeout(per_request)
        .send()
        .await
        .map_err(|e| ProbeError::resource(url, e))?
        .bytes()
        .await
        .map_err(|e| ProbeError::resource(url, e))?;
    debug!(url, bytes = body.len(), "Size measured by download.");
    Ok(body.len() as f64 / 1024.0)
}
