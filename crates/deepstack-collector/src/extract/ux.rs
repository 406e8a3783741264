//! UX and performance clues: viewport, CDN hosts, image hygiene.

use std::collections::BTreeSet;

use deepstack_signals::{AltTextSample, Category, DomSnapshot, LazyLoadingSample, Matcher, UxPerformance};

use crate::error::ExtractError;

/// Authority part of an absolute (`scheme://host[:port]/...`) URL.
fn authority(url: &str) -> Option<&str> {
    let rest = &url[url.find("://")? + 3..];
    let host = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    (!host.is_empty()).then_some(host)
}

/// CDN hosts referenced by script sources and stylesheets.
pub fn cdn_domains(dom: &DomSnapshot, matcher: &Matcher<'_>) -> BTreeSet<String> {
    dom.script_sources()
        .chain(dom.stylesheet_hrefs())
        .filter(|url| matcher.matches_any(Category::Cdn, url))
        .filter_map(authority)
        .map(str::to_string)
        .collect()
}

pub fn extract(
    dom: &DomSnapshot,
    matcher: &Matcher<'_>,
    sample_limit: usize,
) -> Result<UxPerformance, ExtractError> {
    let sample = &dom.images[..dom.images.len().min(sample_limit)];
    let with_lazy_loading = sample
        .iter()
        .filter(|img| img.loading.as_deref() == Some("lazy"))
        .count();
    let with_alt_text = sample.iter().filter(|img| img.has_alt).count();

    Ok(UxPerformance {
        viewport_meta_content: dom.meta("viewport"),
        identified_cdn_domains: cdn_domains(dom, matcher),
        lazy_loading_images: LazyLoadingSample {
            sampled_images: sample.len(),
            with_lazy_loading,
        },
        alt_text_images: AltTextSample {
            sampled_images: sample.len(),
            with_alt_text,
        },
    })
}
