//! One monitoring cycle over an already-fetched document.
//!
//! Everything here is synchronous and free of I/O: the caller fetches and
//! normalizes the page, hands the result in, and persists whatever the
//! returned [`Cycle`] asks for.

use chrono::{DateTime, Utc};

use crate::diff::summarize_lines;
use crate::fingerprint::fingerprint;
use crate::formats::{MonitoredTarget, PageVersion};
use crate::normalize::NormalizedDocument;
use crate::notification::ChangeNotification;
use crate::resolve::{NewItem, resolve_new_item, rotate_new_item};
use crate::section::SectionKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    Unchanged,
    Changed(Box<ChangedCycle>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedCycle {
    /// History entry to append alongside the updated target.
    pub version: PageVersion,
    pub notification: ChangeNotification,
    pub new_item: Option<NewItem>,
    /// No digest was stored before this cycle.
    pub baseline: bool,
}

/// Applies one cycle's result to `target` and reports what changed.
pub fn evaluate(
    target: &mut MonitoredTarget,
    document: &NormalizedDocument,
    now: DateTime<Utc>,
    max_chars: usize,
) -> Cycle {
    target.last_checked_at = Some(now);

    let section = SectionKey::from_url(&target.url);
    let section_links = section
        .as_ref()
        .map(|key| key.filter(document.outbound_links.iter().map(String::as_str)))
        .unwrap_or_default();

    let hash = fingerprint(&document.main_text);
    if target.last_content_hash.as_deref() == Some(hash.as_str()) {
        target.last_error = None;
        target.set_snapshot_links(&section_links);
        return Cycle::Unchanged;
    }

    let baseline = target.last_content_hash.is_none();
    let summary = summarize_lines(
        target.last_normalized_content.as_deref(),
        &document.main_text,
        max_chars,
    );
    let section_added = section.as_ref().and_then(|key| {
        key.first_added(&document.outbound_links, target.last_link_snapshot.as_deref())
    });
    let new_item = resolve_new_item(&summary, &document.outbound_links, section_added);
    rotate_new_item(target, new_item.as_ref().map(|item| item.link.as_str()));

    target.last_content_hash = Some(hash.clone());
    target.last_normalized_content = Some(document.main_text.clone());
    target.last_changed_at = Some(now);
    target.last_error = None;
    target.set_snapshot_links(&section_links);

    let notification = ChangeNotification {
        monitored_url: target.url.clone(),
        subject_link: new_item
            .as_ref()
            .map(|item| item.link.clone())
            .unwrap_or_else(|| target.url.clone()),
        previous_link: target.previous_new_item_link.clone(),
        diff_text: summary.rendered_text,
    };
    let version = PageVersion::new(&target.id, document.main_text.clone(), hash, now);

    Cycle::Changed(Box::new(ChangedCycle {
        version,
        notification,
        new_item,
        baseline,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DEFAULT_MAX_CHARS;
    use crate::resolve::ResolvedBy;

    fn document(text: &str, links: &[&str]) -> NormalizedDocument {
        NormalizedDocument {
            main_text: text.to_owned(),
            outbound_links: links.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    fn changed(cycle: Cycle) -> ChangedCycle {
        match cycle {
            Cycle::Changed(changed) => *changed,
            Cycle::Unchanged => panic!("expected a changed cycle"),
        }
    }

    #[test]
    fn first_run_establishes_baseline() {
        let mut target = MonitoredTarget::new("https://news.example/world/");
        let doc = document(
            "Storm hits coast",
            &[
                "https://news.example/world/storm-hits-coast",
                "https://news.example/world/other",
                "https://news.example/sports/game",
            ],
        );
        let now = Utc::now();

        let cycle = changed(evaluate(&mut target, &doc, now, DEFAULT_MAX_CHARS));

        assert!(cycle.baseline);
        assert_eq!(cycle.version.content, "Storm hits coast");
        assert_eq!(cycle.version.target_id, target.id);
        assert_eq!(
            target.snapshot_links(),
            vec![
                "https://news.example/world/storm-hits-coast",
                "https://news.example/world/other",
            ]
        );
        let item = cycle.new_item.expect("keyword tier resolves");
        assert_eq!(item.link, "https://news.example/world/storm-hits-coast");
        assert_eq!(item.resolved_by, ResolvedBy::Keywords);
        assert_eq!(
            target.last_new_item_link.as_deref(),
            Some("https://news.example/world/storm-hits-coast")
        );
        assert_eq!(target.previous_new_item_link, None);
        assert_eq!(target.last_changed_at, Some(now));
        assert_eq!(target.last_checked_at, Some(now));
        assert_eq!(
            target.last_content_hash.as_deref(),
            Some(cycle.version.content_hash.as_str())
        );
        assert!(
            cycle
                .notification
                .body()
                .contains("new link: https://news.example/world/storm-hits-coast")
        );
    }

    #[test]
    fn identical_content_is_unchanged_and_idempotent() {
        let mut target = MonitoredTarget::new("https://news.example/world/");
        let doc = document("Storm hits coast", &["https://news.example/world/storm-hits-coast"]);
        changed(evaluate(&mut target, &doc, Utc::now(), DEFAULT_MAX_CHARS));
        target.last_error = Some("Timeout: earlier failure".to_owned());
        let before = target.clone();

        let cycle = evaluate(&mut target, &doc, Utc::now(), DEFAULT_MAX_CHARS);

        assert_eq!(cycle, Cycle::Unchanged);
        assert_eq!(target.last_error, None);
        assert_eq!(target.last_new_item_link, before.last_new_item_link);
        assert_eq!(target.previous_new_item_link, before.previous_new_item_link);
        assert_eq!(target.last_changed_at, before.last_changed_at);
    }

    #[test]
    fn unchanged_cycle_refreshes_link_snapshot() {
        let mut target = MonitoredTarget::new("https://news.example/world/");
        changed(evaluate(
            &mut target,
            &document("same", &["https://news.example/world/a"]),
            Utc::now(),
            DEFAULT_MAX_CHARS,
        ));

        let cycle = evaluate(
            &mut target,
            &document("same", &["https://news.example/world/b"]),
            Utc::now(),
            DEFAULT_MAX_CHARS,
        );

        assert_eq!(cycle, Cycle::Unchanged);
        assert_eq!(target.snapshot_links(), vec!["https://news.example/world/b"]);
    }

    #[test]
    fn section_tier_rotates_previous_link() {
        let mut target = MonitoredTarget::new("https://news.example/world/");
        changed(evaluate(
            &mut target,
            &document("Intro text", &["https://news.example/world/a"]),
            Utc::now(),
            DEFAULT_MAX_CHARS,
        ));
        assert_eq!(target.last_new_item_link, None);

        let cycle = changed(evaluate(
            &mut target,
            &document(
                "Intro text\nAn update",
                &["https://news.example/world/b", "https://news.example/world/a"],
            ),
            Utc::now(),
            DEFAULT_MAX_CHARS,
        ));
        assert!(!cycle.baseline);
        assert_eq!(
            cycle.new_item.map(|item| item.resolved_by),
            Some(ResolvedBy::SectionLinks)
        );
        assert_eq!(
            target.last_new_item_link.as_deref(),
            Some("https://news.example/world/b")
        );

        let cycle = changed(evaluate(
            &mut target,
            &document(
                "Intro text\nAnother update",
                &[
                    "https://news.example/world/c",
                    "https://news.example/world/b",
                    "https://news.example/world/a",
                ],
            ),
            Utc::now(),
            DEFAULT_MAX_CHARS,
        ));
        assert_eq!(
            target.last_new_item_link.as_deref(),
            Some("https://news.example/world/c")
        );
        assert_eq!(
            target.previous_new_item_link.as_deref(),
            Some("https://news.example/world/b")
        );
        assert_eq!(cycle.notification.subject_link, "https://news.example/world/c");
        assert!(
            cycle
                .notification
                .body()
                .ends_with("old link: https://news.example/world/b")
        );
    }

    #[test]
    fn unresolved_change_keeps_links_and_uses_page_as_subject() {
        let mut target = MonitoredTarget::new("https://news.example/world/");
        target.last_new_item_link = Some("https://news.example/world/kept".to_owned());

        let cycle = changed(evaluate(
            &mut target,
            &document("Quiet day", &[]),
            Utc::now(),
            DEFAULT_MAX_CHARS,
        ));

        assert_eq!(cycle.new_item, None);
        assert_eq!(
            target.last_new_item_link.as_deref(),
            Some("https://news.example/world/kept")
        );
        assert_eq!(cycle.notification.subject_link, "https://news.example/world/");
    }
}
