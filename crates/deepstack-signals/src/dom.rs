//! Owned snapshot of the markup-level facts the extractors read.
//!
//! The live DOM is serialized by the browser and parsed here once with
//! `scraper`. `scraper::Html` is `!Send`, so nothing of it survives this
//! module: [`DomSnapshot::parse`] copies out plain strings and drops the tree,
//! and the snapshot can then cross `.await` points freely.

use scraper::{ElementRef, Html, Selector};

/// A `<script>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptTag {
    pub src: Option<String>,
    /// Inline body, if non-empty.
    pub inline: Option<String>,
    pub script_type: Option<String>,
}

impl ScriptTag {
    /// `src` and inline body joined into one blob, the unit MarTech and
    /// consent matching scan.
    pub fn blob(&self) -> String {
        let mut blob = String::new();
        if let Some(src) = &self.src {
            blob.push_str(src);
            blob.push(' ');
        }
        if let Some(body) = &self.inline {
            blob.push_str(body);
        }
        blob
    }

    pub fn is_json_ld(&self) -> bool {
        self.script_type
            .as_deref()
            .map(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
            .unwrap_or(false)
    }
}

/// A `<meta name=... content=...>` element. `name` is lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTag {
    pub name: String,
    pub content: String,
}

/// A `<link>` element. `rel` tokens are lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTag {
    pub rel: Vec<String>,
    pub href: Option<String>,
    pub hreflang: Option<String>,
}

impl LinkTag {
    pub fn has_rel(&self, token: &str) -> bool {
        self.rel.iter().any(|r| r == token)
    }
}

/// An `<img>` element, reduced to the two attributes the UX clues need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTag {
    pub loading: Option<String>,
    /// `alt` attribute present, even when empty.
    pub has_alt: bool,
}

/// Everything the static-markup extractors need from one page.
#[derive(Debug, Clone, Default)]
pub struct DomSnapshot {
    pub title: Option<String>,
    pub scripts: Vec<ScriptTag>,
    pub metas: Vec<MetaTag>,
    pub links: Vec<LinkTag>,
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    /// Images in document order.
    pub images: Vec<ImageTag>,
}

impl DomSnapshot {
    /// Parse serialized HTML into a snapshot.
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        let mut snapshot = DomSnapshot::default();

        if let Some(title) = select(&document, "title").next() {
            let text = title.text().collect::<String>();
            let text = text.trim();
            if !text.is_empty() {
                snapshot.title = Some(text.to_string());
            }
        }

        for el in select(&document, "script") {
            let body = el.text().collect::<String>();
            snapshot.scripts.push(ScriptTag {
                src: attr(&el, "src"),
                inline: if body.trim().is_empty() { None } else { Some(body) },
                script_type: attr(&el, "type"),
            });
        }

        for el in select(&document, "meta[name]") {
            let (Some(name), Some(content)) = (attr(&el, "name"), attr(&el, "content")) else {
                continue;
            };
            snapshot.metas.push(MetaTag {
                name: name.to_lowercase(),
                content,
            });
        }

        for el in select(&document, "link") {
            let rel = el
                .value()
                .attr("rel")
                .map(|r| r.split_whitespace().map(|t| t.to_lowercase()).collect())
                .unwrap_or_default();
            snapshot.links.push(LinkTag {
                rel,
                href: attr(&el, "href"),
                hreflang: attr(&el, "hreflang"),
            });
        }

        snapshot.h1 = heading_texts(&document, "h1");
        snapshot.h2 = heading_texts(&document, "h2");

        for el in select(&document, "img") {
            snapshot.images.push(ImageTag {
                loading: attr(&el, "loading"),
                has_alt: el.value().attr("alt").is_some(),
            });
        }

        snapshot
    }

    /// Content of the first `<meta>` with the given (case-insensitive) name,
    /// trimmed; empty content counts as absent.
    pub fn meta(&self, name: &str) -> Option<String> {
        let name = name.to_lowercase();
        self.metas
            .iter()
            .filter(|m| m.name == name)
            .map(|m| m.content.trim())
            .find(|c| !c.is_empty())
            .map(str::to_string)
    }

    /// Inline bodies of scripts that are not JSON-LD.
    pub fn inline_scripts(&self) -> impl Iterator<Item = &str> {
        self.scripts
            .iter()
            .filter(|s| !s.is_json_ld())
            .filter_map(|s| s.inline.as_deref())
    }

    /// `src` attributes of external scripts.
    pub fn script_sources(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().filter_map(|s| s.src.as_deref())
    }

    /// `href` of every stylesheet link.
    pub fn stylesheet_hrefs(&self) -> impl Iterator<Item = &str> {
        self.links
            .iter()
            .filter(|l| l.has_rel("stylesheet"))
            .filter_map(|l| l.href.as_deref())
    }

    /// Raw bodies of `application/ld+json` scripts.
    pub fn json_ld_blocks(&self) -> impl Iterator<Item = &str> {
        self.scripts
            .iter()
            .filter(|s| s.is_json_ld())
            .filter_map(|s| s.inline.as_deref())
    }
}

fn select<'a>(document: &'a Html, css: &str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    let selector = Selector::parse(css).ok();
    selector
        .into_iter()
        .flat_map(move |sel| document.select(&sel).collect::<Vec<_>>())
}

fn attr(el: &ElementRef<'_>, name: &str) -> Option<String> {
    el.value().attr(name).map(str::to_string)
}

/// Whitespace-normalized text of every element matching `tag`, empties dropped.
fn heading_texts(document: &Html, tag: &str) -> Vec<String> {
    select(document, tag)
        .map(|el| normalize_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
