//! Picks the single link that represents a cycle's "new item".
//!
//! Keyword tier: slug the first added line of the diff and take the first
//! page link containing at least [`MIN_KEYWORD_MATCHES`] of its keywords.
//! Section tier: the first section link missing from the previous snapshot.

use unicode_normalization::UnicodeNormalization as _;
use unicode_normalization::char::is_combining_mark;

use crate::diff::DiffSummary;
use crate::formats::MonitoredTarget;

pub const MIN_KEYWORD_MATCHES: usize = 2;
pub const MIN_KEYWORD_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Keywords,
    SectionLinks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub link: String,
    pub resolved_by: ResolvedBy,
}

/// Lowercased ASCII keywords of a headline, in order, without duplicates.
pub fn keywords(text: &str) -> Vec<String> {
    let folded: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    let mut out: Vec<String> = Vec::new();
    for token in folded.split_whitespace() {
        // Modifier letters and symbols are not ASCII alphanumerics either.
        let word: String = token
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .collect();
        if word.chars().count() < MIN_KEYWORD_CHARS || out.contains(&word) {
            continue;
        }
        out.push(word);
    }
    out
}

/// First link whose lowercased text contains at least two of the headline's keywords.
pub fn match_headline(headline: &str, links: &[String]) -> Option<String> {
    let keywords = keywords(headline);
    if keywords.is_empty() {
        return None;
    }

    for link in links {
        let lowered = link.to_lowercase();
        let matches = keywords
            .iter()
            .filter(|keyword| lowered.contains(keyword.as_str()))
            .count();
        if matches >= MIN_KEYWORD_MATCHES {
            tracing::debug!(headline, link = %link, matches, "headline matched link");
            return Some(link.clone());
        }
    }

    tracing::warn!(headline, "no link matched enough headline keywords");
    None
}

pub fn resolve_new_item(
    summary: &DiffSummary,
    links: &[String],
    section_added: Option<String>,
) -> Option<NewItem> {
    let by_keywords = summary
        .first_added_line()
        .map(str::trim)
        .filter(|headline| !headline.is_empty())
        .and_then(|headline| match_headline(headline, links));

    if let Some(link) = by_keywords {
        return Some(NewItem {
            link,
            resolved_by: ResolvedBy::Keywords,
        });
    }

    section_added.map(|link| NewItem {
        link,
        resolved_by: ResolvedBy::SectionLinks,
    })
}

/// Moves the stored new-item link into the previous slot when a different
/// link was resolved. Returns whether anything rotated.
pub fn rotate_new_item(target: &mut MonitoredTarget, resolved: Option<&str>) -> bool {
    let Some(resolved) = resolved else {
        return false;
    };
    if target.last_new_item_link.as_deref() == Some(resolved) {
        return false;
    }

    target.previous_new_item_link = target.last_new_item_link.take();
    target.last_new_item_link = Some(resolved.to_owned());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::summarize_lines;

    fn links(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn keywords_fold_diacritics_and_drop_short_tokens() {
        assert_eq!(
            keywords("Gran incendio en la ciudad"),
            vec!["gran", "incendio", "ciudad"]
        );
        assert_eq!(
            keywords("Año récord: ¡Pingüino CAMPEÓN!"),
            vec!["record", "pinguino", "campeon"]
        );
        assert_eq!(keywords("Storm hits coast"), vec!["storm", "hits", "coast"]);
        assert!(keywords("a la de el").is_empty());
        assert!(keywords("   ").is_empty());
    }

    #[test]
    fn keywords_strip_punctuation_before_length_check() {
        assert_eq!(keywords("2024, (vote) hi!!"), vec!["2024", "vote"]);
        assert_eq!(keywords("fire fire FIRE ciudad"), vec!["fire", "ciudad"]);
    }

    #[test]
    fn headline_match_needs_two_keywords() {
        let page_links = links(&[
            "https://news.example/world/weather",
            "https://news.example/sports/ciudad-fc",
            "https://news.example/about",
            "https://news.example/world/incendio-ciudad-2024",
            "https://news.example/world/economy",
            "https://news.example/contact",
        ]);
        assert_eq!(
            match_headline("Gran incendio en la ciudad", &page_links),
            Some("https://news.example/world/incendio-ciudad-2024".to_owned())
        );
        assert_eq!(match_headline("Ciudad tranquila hoy", &page_links), None);
    }

    #[test]
    fn link_comparison_is_case_insensitive() {
        let page_links = links(&["https://news.example/World/Storm-Hits-Coast"]);
        assert_eq!(
            match_headline("Storm hits coast", &page_links),
            Some("https://news.example/World/Storm-Hits-Coast".to_owned())
        );
    }

    #[test]
    fn keyword_tier_wins_over_section_tier() {
        let summary = summarize_lines(None, "Gran incendio en la ciudad", 800);
        let page_links = links(&[
            "https://news.example/a",
            "https://news.example/incendio-ciudad-2024",
        ]);
        let item = resolve_new_item(
            &summary,
            &page_links,
            Some("https://news.example/a".to_owned()),
        )
        .unwrap();
        assert_eq!(item.link, "https://news.example/incendio-ciudad-2024");
        assert_eq!(item.resolved_by, ResolvedBy::Keywords);
    }

    #[test]
    fn falls_back_to_section_tier() {
        let summary = summarize_lines(None, "Nothing relevant here", 800);
        let page_links = links(&["https://news.example/world/first-new"]);
        let item = resolve_new_item(
            &summary,
            &page_links,
            Some("https://news.example/world/first-new".to_owned()),
        )
        .unwrap();
        assert_eq!(item.resolved_by, ResolvedBy::SectionLinks);

        let cosmetic = summarize_lines(Some("A\nB"), "B\nA", 800);
        let item = resolve_new_item(&cosmetic, &page_links, None);
        assert_eq!(item, None);
    }

    #[test]
    fn rotation_keeps_single_previous_slot() {
        let mut target = MonitoredTarget::new("https://news.example/world/");

        assert!(rotate_new_item(&mut target, Some("L1")));
        assert_eq!(target.last_new_item_link.as_deref(), Some("L1"));
        assert_eq!(target.previous_new_item_link, None);

        assert!(rotate_new_item(&mut target, Some("L2")));
        assert_eq!(target.last_new_item_link.as_deref(), Some("L2"));
        assert_eq!(target.previous_new_item_link.as_deref(), Some("L1"));

        assert!(!rotate_new_item(&mut target, Some("L2")));
        assert!(!rotate_new_item(&mut target, None));
        assert_eq!(target.last_new_item_link.as_deref(), Some("L2"));
        assert_eq!(target.previous_new_item_link.as_deref(), Some("L1"));
    }
}
