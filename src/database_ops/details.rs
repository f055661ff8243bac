//! Detail-page scraping: long/short description and age rating.

use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::normalization::slug::to_detail_path;
use crate::normalization::AgeRating;
use crate::util::http::{FetchError, HttpFetch};

pub const SHORT_DESCRIPTION_CHARS: usize = 160;

const DESCRIPTION_SELECTOR: &str = ".description";
const RATING_ICON_SELECTOR: &str = ".age-restrictions__icon use";

#[derive(Debug, Clone, PartialEq)]
pub struct GameDetails {
    /// Inner markup of the description container.
    pub description: String,
    /// First 160 characters of the description's plain text.
    pub short_description: String,
    pub age_rating: AgeRating,
}

#[derive(Debug, thiserror::Error)]
pub enum DetailsError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("detail page has no `{0}` container")]
    MissingContainer(&'static str),
}

pub struct DetailsScraper {
    fetch: Arc<dyn HttpFetch>,
    base_url: String,
}

impl DetailsScraper {
    pub fn new(fetch: Arc<dyn HttpFetch>, base_url: &str) -> Self {
        Self {
            fetch,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn page_url(&self, slug: &str) -> String {
        format!("{}/{}", self.base_url, to_detail_path(slug))
    }

    #[instrument(skip(self))]
    pub async fn fetch_details(&self, slug: &str) -> Result<GameDetails, DetailsError> {
        let url = self.page_url(slug);
        let html = self.fetch.get_text(&url).await?;
        let details = parse_details(&html)?;
        debug!(%url, rating = %details.age_rating, "detail page parsed");
        Ok(details)
    }
}

/// Extract [`GameDetails`] from a detail page. Pages without a rating icon, or with
/// an icon outside the known vocabulary, rate as `PEGI_3`.
pub fn parse_details(html: &str) -> Result<GameDetails, DetailsError> {
    let doc = Html::parse_document(html);
    let container = select_first(&doc, DESCRIPTION_SELECTOR)
        .ok_or(DetailsError::MissingContainer(DESCRIPTION_SELECTOR))?;

    let text = plain_text(container);
    let age_rating = select_first(&doc, RATING_ICON_SELECTOR)
        // SVG `xlink:href` is namespaced; match on the local name.
        .and_then(|icon| {
            icon.value()
                .attrs()
                .find(|(name, _)| *name == "href" || *name == "xlink:href")
                .map(|(_, value)| value)
        })
        .and_then(AgeRating::from_icon_reference)
        .unwrap_or_default();

    Ok(GameDetails {
        description: container.inner_html().trim().to_string(),
        short_description: truncate_chars(&text, SHORT_DESCRIPTION_CHARS),
        age_rating,
    })
}

fn select_first<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector).next()
}

/// Text content with whitespace runs collapsed to single spaces.
pub fn plain_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::http::stub::{Canned, StubFetch};

    fn page(description: &str, rating_icon: Option<&str>) -> String {
        let icon = rating_icon
            .map(|href| {
                format!(
                    r##"<div class="age-restrictions__icon"><svg><use xlink:href="{href}"></use></svg></div>"##
                )
            })
            .unwrap_or_default();
        format!(
            r#"<html><body>{icon}<div class="description"><p>{description}</p></div></body></html>"#
        )
    }

    #[test]
    fn defaults_rating_without_icon() {
        let details = parse_details(&page("A quiet space mystery.", None)).unwrap();
        assert_eq!(details.age_rating, AgeRating::Pegi3);
        assert_eq!(details.short_description, "A quiet space mystery.");
        assert_eq!(details.description, "<p>A quiet space mystery.</p>");
    }

    #[test]
    fn reads_rating_icon() {
        let details = parse_details(&page("x", Some("#pegi_12"))).unwrap();
        assert_eq!(details.age_rating, AgeRating::Pegi12);
    }

    #[test]
    fn unknown_rating_falls_back() {
        let details = parse_details(&page("x", Some("#usk_0"))).unwrap();
        assert_eq!(details.age_rating, AgeRating::Pegi3);
    }

    #[test]
    fn short_description_is_prefix_of_plain_text() {
        let long = "Explore a solar system trapped in an endless time loop. ".repeat(6);
        let details = parse_details(&page(&long, None)).unwrap();
        let full = long.split_whitespace().collect::<Vec<_>>().join(" ");
        assert!(full.chars().count() > SHORT_DESCRIPTION_CHARS);
        assert_eq!(details.short_description.chars().count(), 160);
        assert!(full.starts_with(&details.short_description));
    }

    #[test]
    fn missing_container_is_an_error() {
        let err = parse_details("<html><body><p>nothing</p></body></html>").unwrap_err();
        assert!(matches!(err, DetailsError::MissingContainer(_)));
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
    }

    #[tokio::test]
    async fn addresses_pages_with_underscored_slug() {
        let fetch = Arc::new(StubFetch::new().route(
            "https://details.test/outer_wilds",
            Canned::Text(page("Outer Wilds", Some("#pegi_7"))),
        ));
        let scraper = DetailsScraper::new(fetch, "https://details.test/");
        let details = scraper.fetch_details("outer-wilds").await.unwrap();
        assert_eq!(details.age_rating, AgeRating::Pegi7);
    }

    #[tokio::test]
    async fn network_failure_is_reported() {
        let fetch = Arc::new(StubFetch::new());
        let scraper = DetailsScraper::new(fetch, "https://details.test");
        let err = scraper.fetch_details("nope").await.unwrap_err();
        assert!(matches!(err, DetailsError::Fetch(_)));
    }
}
