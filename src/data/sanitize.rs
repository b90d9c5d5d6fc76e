//! Normalization of untrusted provider data
//!
//! Provider strings may contain markup, control characters, or absurd lengths.
//! Everything passes through here before it becomes a [`Review`] or a
//! [`BusinessCandidate`].

use reqwest::Url;

use super::{
    BusinessCandidate, RawBusiness, RawReview, Review, AUTHOR_NAME_MAX, MAX_RATING,
    RELATIVE_LABEL_MAX, REVIEW_TEXT_MAX, URL_MAX,
};

/// Longest business name or address kept from a search hit
const BUSINESS_FIELD_MAX: usize = 255;

/// Removes `<tag>` style markup, keeping the text between tags
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_tag = false;

    while let Some(c) = chars.next() {
        if in_tag {
            if c == '>' {
                in_tag = false;
            }
            continue;
        }
        if c == '<' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_alphabetic() || next == '/' || next == '!' {
                    in_tag = true;
                    continue;
                }
            }
        }
        out.push(c);
    }

    out
}

fn truncate_chars(input: &str, max: usize) -> String {
    input.chars().take(max).collect()
}

/// Sanitizes a single-line field
///
/// Strips markup and control characters, collapses runs of whitespace
/// (including line breaks) into one space, trims, and truncates to `max`
/// characters.
pub fn sanitize_line(input: &str, max: usize) -> String {
    let stripped = strip_tags(input);
    let collapsed = stripped
        .split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    truncate_chars(&collapsed, max)
}

/// Sanitizes a multi-line field such as a review body
///
/// Like [`sanitize_line`] but keeps line breaks, so paragraphs survive.
pub fn sanitize_multiline(input: &str, max: usize) -> String {
    let stripped = strip_tags(input).replace("\r\n", "\n");
    let lines: Vec<String> = stripped
        .split('\n')
        .map(|line| sanitize_line(line, usize::MAX))
        .collect();
    let joined = lines.join("\n");
    truncate_chars(joined.trim(), max)
}

/// Parses `input` as an absolute http(s) URL
///
/// Returns `None` for anything empty, too long, relative, or using another
/// scheme.
pub fn sanitize_url(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.len() > URL_MAX {
        return None;
    }

    let url = Url::parse(trimmed).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    if url.as_str().len() > URL_MAX {
        return None;
    }

    Some(url.to_string())
}

/// Whether a stored URL would survive [`sanitize_url`] unchanged in meaning
pub fn is_well_formed_url(input: &str) -> bool {
    sanitize_url(input).is_some()
}

/// Rounds and clamps a provider rating into 0..=5
pub fn clamp_rating(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, MAX_RATING as f64) as u8
}

/// Turns a raw provider review into a storable [`Review`]
pub fn normalize_review(raw: &RawReview) -> Review {
    Review {
        author_name: raw
            .author_name
            .as_deref()
            .map(|s| sanitize_line(s, AUTHOR_NAME_MAX))
            .unwrap_or_default(),
        author_profile_url: raw.author_url.as_deref().and_then(sanitize_url),
        avatar_url: raw.profile_photo_url.as_deref().and_then(sanitize_url),
        rating: raw.rating.map(clamp_rating).unwrap_or(0),
        text: raw
            .text
            .as_deref()
            .map(|s| sanitize_multiline(s, REVIEW_TEXT_MAX))
            .unwrap_or_default(),
        timestamp: raw.time.unwrap_or(0).max(0),
        relative_time_label: raw
            .relative_time_description
            .as_deref()
            .map(|s| sanitize_line(s, RELATIVE_LABEL_MAX))
            .unwrap_or_default(),
    }
}

/// Turns a raw search hit into a [`BusinessCandidate`]
///
/// Hits without an identifier are useless to select and are dropped.
pub fn normalize_business(raw: &RawBusiness) -> Option<BusinessCandidate> {
    let id = sanitize_line(raw.place_id.as_deref()?, BUSINESS_FIELD_MAX);
    if id.is_empty() {
        return None;
    }

    Some(BusinessCandidate {
        id,
        name: raw
            .name
            .as_deref()
            .map(|s| sanitize_line(s, BUSINESS_FIELD_MAX))
            .unwrap_or_default(),
        address: raw
            .formatted_address
            .as_deref()
            .map(|s| sanitize_line(s, BUSINESS_FIELD_MAX))
            .unwrap_or_default(),
        rating: raw
            .rating
            .filter(|r| r.is_finite())
            .map(|r| r.clamp(0.0, MAX_RATING as f64))
            .unwrap_or(0.0),
        review_count: raw.user_ratings_total.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_line_strips_tags_and_controls() {
        assert_eq!(
            sanitize_line("  <b>Jane</b>\u{0007} \t Doe\n ", 255),
            "Jane Doe"
        );
    }

    #[test]
    fn test_sanitize_line_keeps_lone_angle_brackets() {
        assert_eq!(sanitize_line("3 < 5 and 7 > 2", 255), "3 < 5 and 7 > 2");
    }

    #[test]
    fn test_sanitize_line_truncates_by_characters() {
        assert_eq!(sanitize_line("héllo wörld", 5), "héllo");
    }

    #[test]
    fn test_sanitize_multiline_keeps_paragraphs() {
        let text = "Great food.\r\n\r\nWill   come back!\u{0000}";
        assert_eq!(
            sanitize_multiline(text, REVIEW_TEXT_MAX),
            "Great food.\n\nWill come back!"
        );
    }

    #[test]
    fn test_sanitize_url_accepts_https() {
        assert_eq!(
            sanitize_url(" https://maps.google.com/contrib/123 ").as_deref(),
            Some("https://maps.google.com/contrib/123")
        );
    }

    #[test]
    fn test_sanitize_url_rejects_bad_input() {
        assert!(sanitize_url("").is_none());
        assert!(sanitize_url("not a url").is_none());
        assert!(sanitize_url("/relative/path").is_none());
        assert!(sanitize_url("javascript:alert(1)").is_none());
        assert!(sanitize_url("ftp://example.com/file").is_none());

        let long = format!("https://example.com/{}", "a".repeat(URL_MAX));
        assert!(sanitize_url(&long).is_none());
    }

    #[test]
    fn test_clamp_rating() {
        assert_eq!(clamp_rating(4.0), 4);
        assert_eq!(clamp_rating(4.6), 5);
        assert_eq!(clamp_rating(9.0), 5);
        assert_eq!(clamp_rating(-2.0), 0);
        assert_eq!(clamp_rating(f64::NAN), 0);
    }

    #[test]
    fn test_normalize_review_defaults_missing_fields() {
        let review = normalize_review(&RawReview::default());
        assert_eq!(review.author_name, "");
        assert!(review.author_profile_url.is_none());
        assert!(review.avatar_url.is_none());
        assert_eq!(review.rating, 0);
        assert_eq!(review.text, "");
        assert_eq!(review.timestamp, 0);
        assert_eq!(review.relative_time_label, "");
    }

    #[test]
    fn test_normalize_review_cleans_every_field() {
        let raw = RawReview {
            author_name: Some(" <i>Sam</i> ".to_string()),
            author_url: Some("https://www.google.com/maps/contrib/1".to_string()),
            profile_photo_url: Some("data:image/png;base64,AAAA".to_string()),
            rating: Some(7.0),
            text: Some("Nice\u{0008} place".to_string()),
            time: Some(-10),
            relative_time_description: Some("a month ago".to_string()),
        };

        let review = normalize_review(&raw);
        assert_eq!(review.author_name, "Sam");
        assert_eq!(
            review.author_profile_url.as_deref(),
            Some("https://www.google.com/maps/contrib/1")
        );
        assert!(review.avatar_url.is_none());
        assert_eq!(review.rating, 5);
        assert_eq!(review.text, "Nice place");
        assert_eq!(review.timestamp, 0);
        assert_eq!(review.relative_time_label, "a month ago");
    }

    #[test]
    fn test_normalize_business_requires_id() {
        assert!(normalize_business(&RawBusiness::default()).is_none());

        let raw = RawBusiness {
            place_id: Some("ChIJ123".to_string()),
            name: Some("Corner Cafe".to_string()),
            formatted_address: None,
            rating: Some(4.4),
            user_ratings_total: Some(120),
        };
        let candidate = normalize_business(&raw).unwrap();
        assert_eq!(candidate.id, "ChIJ123");
        assert_eq!(candidate.name, "Corner Cafe");
        assert_eq!(candidate.address, "");
        assert!((candidate.rating - 4.4).abs() < 1e-9);
        assert_eq!(candidate.review_count, 120);
    }
}
