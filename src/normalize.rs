//! HTML normalization: boilerplate removal, main-content selection, canonical
//! text and outbound link extraction.

use std::collections::{HashMap, HashSet};

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

const BOILERPLATE: &str = "script, style, noscript, header, footer, nav, aside";

/// Elements whose boundaries separate words in extracted text.
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "blockquote",
    "br",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "hr",
    "li",
    "main",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "td",
    "th",
    "tr",
    "ul",
];

/// Minimum number of same-shaped children for a region to count as a card list.
const MIN_CARDS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    /// Whitespace-collapsed main text, or newline-joined headlines in headline mode.
    pub main_text: String,
    /// Absolute http(s) links in document order, fragments stripped, deduplicated.
    pub outbound_links: Vec<String>,
}

#[derive(Clone)]
struct Selectors {
    boilerplate: Selector,
    article: Selector,
    main: Selector,
    role_main: Selector,
    body: Selector,
    body_descendants: Selector,
    anchors: Selector,
    headings: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            boilerplate: Selector::parse(BOILERPLATE).expect("boilerplate selector"),
            article: Selector::parse("article").expect("article selector"),
            main: Selector::parse("main").expect("main selector"),
            role_main: Selector::parse(r#"[role="main"]"#).expect("role=main selector"),
            body: Selector::parse("body").expect("body selector"),
            body_descendants: Selector::parse("body *").expect("body descendants selector"),
            anchors: Selector::parse("a[href]").expect("anchor selector"),
            headings: Selector::parse("h1, h2, h3, h4, h5, h6").expect("heading selector"),
        }
    }
}

/// Stateless page normalizer.
///
/// Headline mode is enabled per host: listing pages on those hosts are
/// reduced to the headlines of their repeated cards, one per line.
#[derive(Clone)]
pub struct Normalizer {
    selectors: Selectors,
    headline_hosts: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Normalizer {
    pub fn new(headline_hosts: Vec<String>) -> Self {
        let headline_hosts = headline_hosts
            .into_iter()
            .map(|host| strip_www(host.trim().to_ascii_lowercase()))
            .filter(|host| !host.is_empty())
            .collect();
        Self {
            selectors: Selectors::new(),
            headline_hosts,
        }
    }

    pub fn normalize(&self, html: &str, base_url: &Url) -> NormalizedDocument {
        let mut document = Html::parse_document(html);
        strip_boilerplate(&mut document, &self.selectors.boilerplate);

        let headlines = if self.is_headline_host(base_url) {
            let region = self.select_listing_region(&document);
            headline_lines(region, &self.selectors.headings)
        } else {
            None
        };

        let main_text = match headlines {
            Some(lines) => lines,
            None => collapse_whitespace(&element_text(self.select_main(&document))),
        };
        let outbound_links = extract_links(&document, &self.selectors.anchors, base_url);

        NormalizedDocument {
            main_text,
            outbound_links,
        }
    }

    fn is_headline_host(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = strip_www(host.to_ascii_lowercase());
        self.headline_hosts
            .iter()
            .any(|configured| host == *configured || host.ends_with(&format!(".{configured}")))
    }

    fn select_main<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        first_match(document, &self.selectors.article)
            .or_else(|| first_match(document, &self.selectors.main))
            .or_else(|| first_match(document, &self.selectors.role_main))
            .or_else(|| densest_block(document, &self.selectors.body_descendants))
            .or_else(|| first_match(document, &self.selectors.body))
            .unwrap_or_else(|| document.root_element())
    }

    // Listing pages tend to mark each card as an <article>, so the first
    // article is a card rather than the list that holds them.
    fn select_listing_region<'a>(&self, document: &'a Html) -> ElementRef<'a> {
        first_match(document, &self.selectors.main)
            .or_else(|| first_match(document, &self.selectors.role_main))
            .or_else(|| densest_block(document, &self.selectors.body_descendants))
            .or_else(|| first_match(document, &self.selectors.body))
            .unwrap_or_else(|| document.root_element())
    }
}

// `Html::select` walks the whole node arena, detached nodes included; only
// the live tree under the root element is searched here.
fn first_match<'a>(document: &'a Html, selector: &Selector) -> Option<ElementRef<'a>> {
    document.root_element().select(selector).next()
}

fn strip_boilerplate(document: &mut Html, boilerplate: &Selector) {
    let mut doomed: Vec<_> = document
        .root_element()
        .select(boilerplate)
        .map(|el| el.id())
        .collect();
    doomed.extend(
        document
            .tree
            .root()
            .descendants()
            .filter(|node| node.value().is_comment())
            .map(|node| node.id()),
    );

    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn densest_block<'a>(document: &'a Html, body_descendants: &Selector) -> Option<ElementRef<'a>> {
    let mut best: Option<(usize, ElementRef<'a>)> = None;
    for element in document.root_element().select(body_descendants) {
        let len = collapse_whitespace(&element_text(element)).chars().count();
        if len == 0 {
            continue;
        }
        if best.as_ref().is_none_or(|(best_len, _)| len > *best_len) {
            best = Some((len, element));
        }
    }
    best.map(|(_, element)| element)
}

fn headline_lines(region: ElementRef<'_>, headings: &Selector) -> Option<String> {
    let mut region = region;
    loop {
        let children: Vec<ElementRef<'_>> =
            region.children().filter_map(ElementRef::wrap).collect();
        if let Some(cards) = repeated_cards(&children) {
            return join_card_headlines(&cards, headings);
        }
        match children.as_slice() {
            [only] => region = *only,
            _ => return None,
        }
    }
}

fn join_card_headlines(cards: &[ElementRef<'_>], headings: &Selector) -> Option<String> {
    let mut seen = HashSet::new();
    let mut lines = Vec::new();
    for card in cards {
        let heading = card
            .select(headings)
            .next()
            .map(|heading| collapse_whitespace(&element_text(heading)))
            .filter(|text| !text.is_empty());
        let text = heading.unwrap_or_else(|| collapse_whitespace(&element_text(*card)));
        if text.is_empty() {
            continue;
        }
        if seen.insert(text.clone()) {
            lines.push(text);
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Children sharing the most common tag+class shape, when that shape repeats
/// and covers at least half of the region.
fn repeated_cards<'a>(children: &[ElementRef<'a>]) -> Option<Vec<ElementRef<'a>>> {
    let mut counts: HashMap<(String, String), usize> = HashMap::new();
    for child in children {
        *counts.entry(card_shape(child)).or_default() += 1;
    }

    // Ties resolve to the shape that appears first in the document.
    let mut best: Option<(&(String, String), usize)> = None;
    for child in children {
        let shape = counts.get_key_value(&card_shape(child))?;
        if best.is_none_or(|(_, count)| *shape.1 > count) {
            best = Some((shape.0, *shape.1));
        }
    }

    let (shape, count) = best?;
    if count < MIN_CARDS || count * 2 < children.len() {
        return None;
    }
    Some(
        children
            .iter()
            .filter(|child| card_shape(child) == *shape)
            .copied()
            .collect(),
    )
}

fn card_shape(element: &ElementRef<'_>) -> (String, String) {
    let mut classes: Vec<&str> = element.value().classes().collect();
    classes.sort_unstable();
    (element.value().name().to_owned(), classes.join(" "))
}

fn element_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                let block = BLOCK_TAGS.contains(&el.name());
                if block {
                    out.push(' ');
                }
                collect_text(child, out);
                if block {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_links(document: &Html, anchors: &Selector, base_url: &Url) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for anchor in document.root_element().select(anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }

        let Ok(mut resolved) = base_url.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        if resolved.fragment().is_some() && is_same_document(&resolved, base_url) {
            continue;
        }
        resolved.set_fragment(None);

        let link = resolved.to_string();
        if link.is_empty() {
            continue;
        }
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }

    links
}

fn is_same_document(a: &Url, b: &Url) -> bool {
    let mut a = a.clone();
    let mut b = b.clone();
    a.set_fragment(None);
    b.set_fragment(None);
    a == b
}

fn strip_www(host: String) -> String {
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_owned(),
        None => host,
    }
}
