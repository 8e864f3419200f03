//! Publication-date extraction and the recency bonus.

use chrono::NaiveDate;
use regex::Regex;

use crate::config::RecencyParams;
use crate::types::CandidateDocument;

/// Finds dates in document metadata.
#[derive(Debug, Clone)]
pub struct DateExtractor {
    full: Regex,
    year: Regex,
}

impl DateExtractor {
    /// Compile the date patterns.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            full: Regex::new(r"\b((?:19|20)\d{2})[-/](0[1-9]|1[0-2])[-/](0[1-9]|[12]\d|3[01])\b")?,
            year: Regex::new(r"\b((?:19|20)\d{2})\b")?,
        })
    }

    /// Best-known date of `doc`.
    ///
    /// In order: the explicit date from the backend, the first
    /// `YYYY-MM-DD` / `YYYY/MM/DD` in URL, title or snippet, then January 1
    /// of the largest four-digit year found there.
    pub fn extract(&self, doc: &CandidateDocument) -> Option<NaiveDate> {
        if let Some(date) = doc.date {
            return Some(date);
        }
        let text = format!("{} {} {}", doc.url, doc.title, doc.snippet);
        self.from_text(&text)
    }

    /// Date found in free text, using the same rules as [`Self::extract`].
    pub fn from_text(&self, text: &str) -> Option<NaiveDate> {
        for caps in self.full.captures_iter(text) {
            let parsed = (
                caps[1].parse::<i32>(),
                caps[2].parse::<u32>(),
                caps[3].parse::<u32>(),
            );
            if let (Ok(y), Ok(m), Ok(d)) = parsed {
                if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                    return Some(date);
                }
            }
        }

        self.year
            .captures_iter(text)
            .filter_map(|caps| caps[1].parse::<i32>().ok())
            .max()
            .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
    }
}

/// Parse a backend-provided date string.
///
/// Accepts ISO dates, `DD/MM/YYYY` and French or English
/// `12 janv. 2024` / `Jan 12, 2024` forms. Anything else is `None`.
pub fn parse_explicit_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%b %d, %Y", "%d %b %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    if s.len() >= 10 {
        if let Some(head) = s.get(..10) {
            if let Ok(date) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
                return Some(date);
            }
        }
    }
    parse_french_date(s)
}

fn parse_french_date(s: &str) -> Option<NaiveDate> {
    let mut parts = s.split_whitespace();
    let day: u32 = parts.next()?.trim_end_matches(['e', 'r']).parse().ok()?;
    let month_word = parts.next()?.trim_end_matches('.').to_lowercase();
    let year: i32 = parts.next()?.trim_end_matches(',').parse().ok()?;
    let month = match month_word.as_str() {
        "janv" | "janvier" => 1,
        "févr" | "fevr" | "février" | "fevrier" => 2,
        "mars" => 3,
        "avr" | "avril" => 4,
        "mai" => 5,
        "juin" => 6,
        "juil" | "juillet" => 7,
        "août" | "aout" => 8,
        "sept" | "septembre" => 9,
        "oct" | "octobre" => 10,
        "nov" | "novembre" => 11,
        "déc" | "dec" | "décembre" | "decembre" => 12,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Linear recency bonus.
///
/// `params.max_bonus` for a document dated today (or later), decaying to
/// zero at `params.horizon_years`. Undated documents get zero.
pub fn recency_bonus(date: Option<NaiveDate>, today: NaiveDate, params: &RecencyParams) -> f64 {
    let Some(date) = date else {
        return 0.0;
    };
    let age_years = (today - date).num_days() as f64 / 365.25;
    let age_years = age_years.clamp(0.0, params.horizon_years);
    (params.max_bonus * (1.0 - age_years / params.horizon_years)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Family;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).expect("date")
    }

    fn doc(url: &str, title: &str, snippet: &str) -> CandidateDocument {
        CandidateDocument {
            url: url.into(),
            title: title.into(),
            snippet: snippet.into(),
            domain: "example.gov".into(),
            family: Family::Statute,
            query: String::new(),
            date: None,
        }
    }

    #[test]
    fn full_date_in_url_preferred_over_years() {
        let ex = DateExtractor::new().expect("regex");
        let d = doc("https://example.gov/2021/03/15/decision", "Loi de finances 2024", "");
        assert_eq!(ex.extract(&d), NaiveDate::from_ymd_opt(2021, 3, 15));
    }

    #[test]
    fn max_year_anchored_to_january_first() {
        let ex = DateExtractor::new().expect("regex");
        let d = doc("https://example.gov/a", "Réforme 2019 et 2023", "depuis 1998");
        assert_eq!(ex.extract(&d), NaiveDate::from_ymd_opt(2023, 1, 1));
    }

    #[test]
    fn explicit_backend_date_wins() {
        let ex = DateExtractor::new().expect("regex");
        let mut d = doc("https://example.gov/2010-01-01/x", "", "");
        d.date = NaiveDate::from_ymd_opt(2024, 5, 2);
        assert_eq!(ex.extract(&d), NaiveDate::from_ymd_opt(2024, 5, 2));
    }

    #[test]
    fn invalid_calendar_date_falls_back_to_year() {
        let ex = DateExtractor::new().expect("regex");
        assert_eq!(ex.from_text("le 2023-02-30"), NaiveDate::from_ymd_opt(2023, 1, 1));
    }

    #[test]
    fn no_date_found() {
        let ex = DateExtractor::new().expect("regex");
        assert_eq!(ex.from_text("article 150-0 B ter"), None);
        assert_eq!(ex.from_text("LEGIARTI000036428074"), None);
    }

    #[test]
    fn explicit_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 12);
        assert_eq!(parse_explicit_date("2024-01-12"), expected);
        assert_eq!(parse_explicit_date("12/01/2024"), expected);
        assert_eq!(parse_explicit_date("Jan 12, 2024"), expected);
        assert_eq!(parse_explicit_date("12 janv. 2024"), expected);
        assert_eq!(parse_explicit_date("2024-01-12T08:00:00Z"), expected);
        assert_eq!(parse_explicit_date("il y a 3 jours"), None);
    }

    #[test]
    fn bonus_is_max_today_and_zero_past_horizon() {
        let params = RecencyParams::default();
        let max = recency_bonus(Some(today()), today(), &params);
        assert!((max - 0.2).abs() < 1e-9);
        let old = NaiveDate::from_ymd_opt(2010, 1, 1);
        assert_eq!(recency_bonus(old, today(), &params), 0.0);
        assert_eq!(recency_bonus(None, today(), &params), 0.0);
    }

    #[test]
    fn future_dates_get_max_bonus() {
        let params = RecencyParams::default();
        let future = NaiveDate::from_ymd_opt(2026, 1, 1);
        assert!((recency_bonus(future, today(), &params) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn bonus_is_monotonic_in_date() {
        let params = RecencyParams::default();
        let mut previous = -1.0;
        for year in 2000..=2026 {
            let bonus = recency_bonus(NaiveDate::from_ymd_opt(year, 6, 1), today(), &params);
            assert!(bonus >= previous, "bonus decreased at {year}");
            previous = bonus;
        }
    }
}
