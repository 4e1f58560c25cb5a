//! Section scoping for link snapshots.
//!
//! A target's section is its host (without `www.`) plus the first non-empty
//! path segment. Only links inside the section take part in "new link"
//! tracking, which keeps sitewide navigation out of the comparison.

use std::collections::HashSet;

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionKey {
    host: String,
    path_prefix: String,
}

impl SectionKey {
    /// Returns `None` when the URL cannot be parsed or has no host.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = Url::parse(url).ok()?;
        let host = stripped_host(&url)?;
        let path_prefix = section_prefix(url.path());
        Some(Self { host, path_prefix })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    pub fn contains(&self, link: &str) -> bool {
        let Ok(url) = Url::parse(link) else {
            return false;
        };
        let Some(host) = stripped_host(&url) else {
            return false;
        };
        if !host.ends_with(&self.host) {
            return false;
        }

        let path = url.path();
        if path.ends_with('/') {
            path.starts_with(&self.path_prefix)
        } else {
            format!("{path}/").starts_with(&self.path_prefix)
        }
    }

    pub fn filter<'a, I>(&self, links: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        links
            .into_iter()
            .filter(|link| self.contains(link))
            .map(str::to_owned)
            .collect()
    }

    /// First section link in `current` that the previous snapshot did not
    /// contain. Without a previous snapshot there is no baseline and nothing
    /// counts as new.
    pub fn first_added(
        &self,
        current: &[String],
        previous_snapshot: Option<&str>,
    ) -> Option<String> {
        let previous_snapshot = previous_snapshot?;
        let previous: HashSet<String> = self
            .filter(parse_snapshot(previous_snapshot))
            .into_iter()
            .collect();

        current
            .iter()
            .filter(|link| self.contains(link))
            .find(|link| !previous.contains(*link))
            .cloned()
    }
}

fn stripped_host(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => Some(rest.to_owned()),
        None => Some(host),
    }
}

fn section_prefix(path: &str) -> String {
    match path.split('/').find(|segment| !segment.is_empty()) {
        Some(segment) => format!("/{segment}/"),
        None => "/".to_owned(),
    }
}

/// Persisted snapshot form: one link per line.
pub fn join_snapshot(links: &[String]) -> String {
    links.join("\n")
}

/// Reads a persisted snapshot, trimming each line and skipping blanks.
pub fn parse_snapshot(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().map(str::trim).filter(|line| !line.is_empty())
}
