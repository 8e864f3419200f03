//! Trusted-domain allow-list.
//!
//! Matching is done on whole DNS labels: a host matches an entry when it is
//! the entry itself or a subdomain of it. Raw substring matching is never
//! used, so `fake-bofip.example.com` does not match `bofip.example.gov`
//! and `bofip.example.gov.evil.com` does not match either.

use url::{Host, Url};

use crate::error::{Result, SearchError};

/// An immutable set of trusted source domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    entries: Vec<String>,
}

impl AllowList {
    /// Build an allow-list from configured domain strings.
    ///
    /// Entries are trimmed, lower-cased and stripped of a leading `www.`,
    /// a trailing dot and any scheme or path a user may have pasted.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if no usable entry remains. Running
    /// with an empty allow-list would let every domain through.
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cleaned: Vec<String> = entries
            .into_iter()
            .filter_map(|e| clean_entry(e.as_ref()))
            .collect();
        cleaned.sort();
        cleaned.dedup();
        if cleaned.is_empty() {
            return Err(SearchError::Config("allow-list must not be empty".into()));
        }
        Ok(Self { entries: cleaned })
    }

    /// The normalised entries, sorted.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Returns the allow-list entry that `url` falls under, if any.
    ///
    /// When several entries match (`impots.gouv.fr` and
    /// `bofip.impots.gouv.fr`), the most specific one is returned.
    pub fn matching_entry(&self, url: &str) -> Option<&str> {
        let host = host_of(url)?;
        self.entry_for_host(&host)
    }

    /// Returns the allow-list entry that `host` falls under, if any.
    pub fn entry_for_host(&self, host: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|entry| host_matches(host, entry))
            .max_by_key(|entry| entry.len())
            .map(String::as_str)
    }

    /// Whether `url` points at an allow-listed domain.
    pub fn allows(&self, url: &str) -> bool {
        self.matching_entry(url).is_some()
    }
}

/// Extract the lower-cased DNS host of `url`, without `www.` or a trailing dot.
///
/// Returns `None` for unparseable URLs, non-HTTP schemes and IP hosts.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    match parsed.host()? {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_lowercase();
            let domain = domain.strip_prefix("www.").unwrap_or(&domain).to_owned();
            if domain.is_empty() {
                None
            } else {
                Some(domain)
            }
        }
        Host::Ipv4(_) | Host::Ipv6(_) => None,
    }
}

/// Whole-label suffix match: `host == entry` or `host` ends with `.entry`.
pub fn host_matches(host: &str, entry: &str) -> bool {
    if host == entry {
        return true;
    }
    host.len() > entry.len()
        && host.ends_with(entry)
        && host.as_bytes()[host.len() - entry.len() - 1] == b'.'
}

fn clean_entry(raw: &str) -> Option<String> {
    let mut entry = raw.trim().to_lowercase();
    if let Some((_, rest)) = entry.split_once("://") {
        entry = rest.to_owned();
    }
    let entry = entry.split(['/', '?', '#']).next().unwrap_or_default();
    let entry = entry.trim_end_matches('.');
    let entry = entry.strip_prefix("www.").unwrap_or(entry);
    if entry.is_empty() || !entry.contains('.') {
        return None;
    }
    Some(entry.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> AllowList {
        AllowList::new(["bofip.example.gov", "legifrance.gouv.fr", "impots.gouv.fr"])
            .expect("allow-list")
    }

    #[test]
    fn exact_host_allowed() {
        assert!(list().allows("https://bofip.example.gov/doc/1"));
    }

    #[test]
    fn subdomain_allowed() {
        assert!(list().allows("https://www.legifrance.gouv.fr/codes/article"));
        assert!(list().allows("https://api.legifrance.gouv.fr/x"));
    }

    #[test]
    fn lookalike_prefix_rejected() {
        assert!(!list().allows("https://fake-bofip.example.com/doc"));
        assert!(!list().allows("https://fakebofip.example.gov/doc"));
        assert!(!list().allows("https://notlegifrance.gouv.fr/"));
    }

    #[test]
    fn trusted_name_inside_untrusted_host_rejected() {
        assert!(!list().allows("https://bofip.example.gov.evil.com/doc"));
        assert!(!list().allows("https://evil.com/bofip.example.gov"));
        assert!(!list().allows("https://evil.com/?u=https://legifrance.gouv.fr"));
    }

    #[test]
    fn userinfo_trick_rejected() {
        assert!(!list().allows("https://legifrance.gouv.fr@evil.com/"));
    }

    #[test]
    fn host_case_and_trailing_dot_ignored() {
        assert!(list().allows("HTTPS://WWW.LEGIFRANCE.GOUV.FR./x"));
    }

    #[test]
    fn non_http_and_ip_hosts_rejected() {
        assert!(!list().allows("ftp://legifrance.gouv.fr/x"));
        assert!(!list().allows("https://127.0.0.1/x"));
        assert!(!list().allows("not a url"));
    }

    #[test]
    fn most_specific_entry_wins() {
        let l = list();
        assert_eq!(
            l.matching_entry("https://bofip.impots.gouv.fr/x"),
            Some("impots.gouv.fr")
        );
        let l = AllowList::new(["impots.gouv.fr", "bofip.impots.gouv.fr"]).expect("allow-list");
        assert_eq!(
            l.matching_entry("https://bofip.impots.gouv.fr/x"),
            Some("bofip.impots.gouv.fr")
        );
    }

    #[test]
    fn entries_are_cleaned() {
        let l = AllowList::new([" https://WWW.Senat.fr/ ", "senat.fr", "", "localhost"])
            .expect("allow-list");
        assert_eq!(l.entries(), ["senat.fr"]);
    }

    #[test]
    fn empty_allow_list_is_config_error() {
        let err = AllowList::new(Vec::<String>::new()).unwrap_err();
        assert!(err.to_string().contains("allow-list"));
        assert!(AllowList::new(["", "  "]).is_err());
    }

    #[test]
    fn host_of_strips_www() {
        assert_eq!(
            host_of("https://www.conseil-etat.fr/a").as_deref(),
            Some("conseil-etat.fr")
        );
    }
}
