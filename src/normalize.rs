use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use reqwest::Url;
use scraper::{ElementRef, Node};

/// Collapses every run of whitespace (including non-breaking spaces) into a
/// single space.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-collapsed text content, `None` when empty.
pub fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = collapse_whitespace(&element.text().collect::<String>());
    if text.is_empty() { None } else { Some(text) }
}

/// Text content with `<br>` and block boundaries kept as line breaks.
pub fn text_with_breaks(element: ElementRef<'_>) -> Option<String> {
    let mut raw = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(text) => raw.push_str(text),
            Node::Element(el) if matches!(el.name(), "br" | "p" | "div" | "li") => raw.push('\n'),
            _ => {}
        }
    }

    let lines: Vec<String> = raw.lines().map(collapse_whitespace).collect();
    let start = lines.iter().position(|l| !l.is_empty());
    let end = lines.iter().rposition(|l| !l.is_empty());
    match (start, end) {
        (Some(start), Some(end)) => Some(lines[start..=end].join("\n")),
        _ => None,
    }
}

/// First number in `text`, read across group separators: `1 234` or
/// `12 345 annonces à Paris 75011` give 1234 and 12345.
pub fn parse_count(text: &str) -> Option<u64> {
    let mut chars = text.chars().skip_while(|c| !c.is_ascii_digit()).peekable();
    let mut digits = String::new();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if is_group_separator(c) && chars.peek().is_some_and(char::is_ascii_digit) {
            continue;
        } else {
            break;
        }
    }
    if digits.is_empty() { None } else { digits.parse().ok() }
}

fn is_group_separator(c: char) -> bool {
    matches!(c, ' ' | '\u{a0}' | '\u{202f}')
}

/// Whole-euro amount of a machine-readable `content` value such as `9500`
/// or `1234.50`.
pub fn parse_content_amount(content: &str) -> Option<u64> {
    let value = content.trim().parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value.trunc() as u64)
    } else {
        None
    }
}

/// Whole-euro amount of a displayed price. The decimal part after a comma is
/// dropped, group separators are ignored.
pub fn parse_amount(text: &str) -> Option<u64> {
    let integral = text.split(',').next().unwrap_or_default();
    parse_count(integral)
}

/// Id of an ad from a link such as `//www.leboncoin.fr/voitures/1034567.htm?ca=12_s`.
pub fn ad_id_from_url(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    let id = path.rsplit('/').next()?.strip_suffix(".htm")?;
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

/// Absolute `https` URL for a link found in a page served from `base`.
pub fn absolutize(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Some(rest) = href.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    base.join(href).ok().map(|url| url.to_string())
}

/// Publication timestamp from a `content` attribute carrying the date and a
/// display text that may carry an `HH:MM` (or `HHhMM`) time.
pub fn parse_published_at(content: Option<&str>, text: Option<&str>) -> Option<NaiveDateTime> {
    let content = content.map(str::trim).unwrap_or_default();
    if let Ok(full) = NaiveDateTime::parse_from_str(content, "%Y-%m-%dT%H:%M:%S") {
        return Some(full);
    }
    let date = content
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())?;
    let time = text.and_then(find_time).unwrap_or(NaiveTime::MIN);
    Some(date.and_time(time))
}

fn find_time(text: &str) -> Option<NaiveTime> {
    let chars: Vec<char> = text.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if *c != ':' && *c != 'h' {
            continue;
        }
        let hours: String = chars[..i]
            .iter()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let minutes: String = chars[i + 1..].iter().take_while(|c| c.is_ascii_digit()).collect();
        if (1..=2).contains(&hours.len()) && minutes.len() == 2 {
            let parsed = NaiveTime::from_hms_opt(hours.parse().ok()?, minutes.parse().ok()?, 0);
            if parsed.is_some() {
                return parsed;
            }
        }
    }
    None
}

#[test]
fn test_parse_amount() {
    assert_eq!(parse_amount("15 000 €"), Some(15000));
    assert_eq!(parse_amount("1\u{a0}234,50 €"), Some(1234));
    assert_eq!(parse_amount("Gratuit"), None);
}

#[test]
fn test_parse_content_amount() {
    assert_eq!(parse_content_amount("9500"), Some(9500));
    assert_eq!(parse_content_amount("1234.50"), Some(1234));
    assert_eq!(parse_content_amount(" 80.0 "), Some(80));
    assert_eq!(parse_content_amount("-5"), None);
    assert_eq!(parse_content_amount("sur demande"), None);
}

#[test]
fn test_parse_count_reads_first_number() {
    assert_eq!(parse_count("47 annonces à Paris 75011"), Some(47));
    assert_eq!(parse_count("12\u{a0}345 annonces"), Some(12345));
    assert_eq!(parse_count("Toutes 1 234"), Some(1234));
    assert_eq!(parse_count("annonces"), None);
}

#[test]
fn test_ad_id_from_url() {
    assert_eq!(
        ad_id_from_url("//www.leboncoin.fr/voitures/1034567.htm?ca=12_s"),
        Some("1034567".to_string())
    );
    assert_eq!(ad_id_from_url("/voitures/offres/"), None);
    assert_eq!(ad_id_from_url("/voitures/abc.htm"), None);
}

#[test]
fn test_find_time() {
    assert_eq!(find_time("Aujourd'hui, 14:05"), NaiveTime::from_hms_opt(14, 5, 0));
    assert_eq!(find_time("le 12 septembre à 9h30"), NaiveTime::from_hms_opt(9, 30, 0));
    assert_eq!(find_time("hier"), None);
}
