//! Filter text normalization and compilation
//!
//! [`compile`] never fails: text that cannot be understood becomes an
//! `Invalid` filter carrying the reason.

use hush_core::filter::{DomainMap, Filter, FilterError};
use hush_core::pattern::Pattern;
use hush_core::types::{ContentType, FilterType, PartyMask};

// =============================================================================
// Normalization
// =============================================================================

/// Canonical form of a filter line, which is also the filter's identity.
///
/// Whitespace other than plain spaces is dropped. Comments are trimmed,
/// element hiding filters keep the spaces inside their selector, and every
/// other filter loses all spaces.
pub fn normalize(text: &str) -> String {
    let text: String = text
        .chars()
        .filter(|c| *c == ' ' || !c.is_whitespace())
        .collect();

    if is_comment_line(&text) {
        return text.trim().to_string();
    }

    if let Some(parts) = split_elemhide(&text) {
        let domains: String = parts.domains.chars().filter(|c| *c != ' ').collect();
        return format!("{}{}{}", domains, parts.separator, parts.selector.trim());
    }

    text.replace(' ', "")
}

fn is_comment_line(line: &str) -> bool {
    line.trim_start_matches(' ').starts_with('!')
}

// =============================================================================
// Element Hiding Syntax
// =============================================================================

struct ElemHideParts<'a> {
    domains: &'a str,
    separator: &'a str,
    selector: &'a str,
}

/// Split `domains#sep#selector`. The domain part may not contain any of
/// `/*|@"!`; `sep` is empty or one of `@?$`.
fn split_elemhide(text: &str) -> Option<ElemHideParts<'_>> {
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'/' | b'*' | b'|' | b'@' | b'"' | b'!' => return None,
            b'#' => {}
            _ => continue,
        }

        let sep_len = match (bytes.get(i + 1), bytes.get(i + 2)) {
            (Some(b'#'), _) => 2,
            (Some(b'@' | b'?' | b'$'), Some(b'#')) => 3,
            _ => continue,
        };
        return Some(ElemHideParts {
            domains: &text[..i],
            separator: &text[i..i + sep_len],
            selector: &text[i + sep_len..],
        });
    }
    None
}

fn compile_elemhide(text: &str, parts: &ElemHideParts<'_>) -> Filter {
    let filter_type = match parts.separator {
        "##" => FilterType::ElemHide,
        "#@#" => FilterType::ElemHideException,
        "#?#" => FilterType::ElemHideEmulation,
        _ => return Filter::invalid(text, FilterError::SnippetUnsupported),
    };

    if parts.selector.is_empty() {
        return Filter::invalid(text, FilterError::EmptySelector);
    }

    let domains = match parse_domain_list(parts.domains, ',') {
        Some(domains) => domains,
        None => return Filter::invalid(text, FilterError::InvalidDomain),
    };

    if filter_type == FilterType::ElemHideEmulation && !has_specific_include(&domains) {
        return Filter::invalid(text, FilterError::EmulationWithoutDomain);
    }

    Filter {
        text: text.to_string(),
        filter_type,
        pattern: None,
        domains,
        content_types: ContentType::empty(),
        party: PartyMask::ALL,
        site_keys: Vec::new(),
        match_case: false,
        selector: Some(parts.selector.to_string()),
        reason: None,
    }
}

/// Element hiding domain list; an empty entry invalidates the whole list.
fn parse_domain_list(list: &str, separator: char) -> Option<DomainMap> {
    if list.is_empty() {
        return Some(DomainMap::default());
    }

    let mut entries = Vec::new();
    for raw in list.split(separator) {
        let (included, domain) = match raw.strip_prefix('~') {
            Some(rest) => (false, rest),
            None => (true, raw),
        };
        let domain = normalize_domain(domain)?;
        entries.push((domain, included));
    }
    Some(DomainMap::from_entries(entries))
}

/// Emulation filters need an included domain with an inner dot.
fn has_specific_include(domains: &DomainMap) -> bool {
    domains.iter().any(|(domain, included)| {
        included
            && domain
                .get(1..)
                .and_then(|rest| rest.find('.').map(|dot| dot + 1 < rest.len()))
                .unwrap_or(false)
    })
}

fn normalize_domain(domain: &str) -> Option<String> {
    let trimmed = domain.trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

// =============================================================================
// URL Filters
// =============================================================================

#[derive(Debug, Clone)]
struct ParsedOptions {
    /// `None` until a content type option is seen
    content_types: Option<ContentType>,
    party: PartyMask,
    match_case: bool,
    domains: DomainMap,
    site_keys: Vec<String>,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            content_types: None,
            party: PartyMask::ALL,
            match_case: false,
            domains: DomainMap::default(),
            site_keys: Vec::new(),
        }
    }
}

fn compile_url_filter(text: &str) -> Filter {
    let (is_exception, body) = match text.strip_prefix("@@") {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let (pattern_text, options_text) = split_rule_options(body);
    let options = match options_text.map(parse_options).transpose() {
        Ok(options) => options.unwrap_or_default(),
        Err(reason) => return Filter::invalid(text, reason),
    };

    let content_types = options.content_types.unwrap_or(ContentType::RESOURCE_TYPES);
    if content_types.is_empty() {
        return Filter::invalid(text, FilterError::EmptyContentTypes);
    }

    let pattern = if pattern_text.len() >= 2 && pattern_text.starts_with('/') && pattern_text.ends_with('/') {
        match Pattern::regex(&pattern_text[1..pattern_text.len() - 1], options.match_case) {
            Ok(pattern) => pattern,
            Err(err) => return Filter::invalid(text, FilterError::InvalidRegex(err.to_string())),
        }
    } else {
        Pattern::glob(pattern_text, options.match_case)
    };

    let filter_type = match (is_exception, content_types == ContentType::GENERICBLOCK) {
        (false, _) => FilterType::Blocking,
        (true, true) => FilterType::GenericBlockException,
        (true, false) => FilterType::Exception,
    };

    Filter {
        text: text.to_string(),
        filter_type,
        pattern: Some(pattern),
        domains: options.domains,
        content_types,
        party: options.party,
        site_keys: options.site_keys,
        match_case: options.match_case,
        selector: None,
        reason: None,
    }
}

/// Split the `$options` block off a URL filter.
///
/// The block starts at the leftmost `$` whose remainder is a well-formed
/// option list, so `$` inside a pattern survives.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    for (pos, _) in line.match_indices('$') {
        let rest = &line[pos + 1..];
        if is_option_list(rest) {
            return (&line[..pos], Some(rest));
        }
    }
    (line, None)
}

/// `~?[\w-]+(=[^,]*)?` joined by commas.
fn is_option_list(text: &str) -> bool {
    !text.is_empty()
        && text.split(',').all(|option| {
            let option = option.strip_prefix('~').unwrap_or(option);
            let name = option.split('=').next().unwrap_or_default();
            !name.is_empty()
                && name
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        })
}

fn parse_options(text: &str) -> Result<ParsedOptions, FilterError> {
    let mut options = ParsedOptions::default();

    for raw in text.split(',') {
        let (name, value) = match raw.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (raw, None),
        };
        let (inverse, name) = match name.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, name),
        };

        if let Some(mask) = ContentType::from_keyword(name) {
            let current = options.content_types.unwrap_or(ContentType::empty());
            options.content_types = Some(if inverse {
                options.content_types.unwrap_or(ContentType::RESOURCE_TYPES) & !mask
            } else {
                current | mask
            });
            continue;
        }

        let name_lower = name.to_ascii_lowercase();
        match name_lower.as_str() {
            "match-case" => options.match_case = !inverse,
            "third-party" | "3p" => {
                options.party = if inverse { PartyMask::FIRST_PARTY } else { PartyMask::THIRD_PARTY };
            }
            "first-party" | "1p" => {
                options.party = if inverse { PartyMask::THIRD_PARTY } else { PartyMask::FIRST_PARTY };
            }
            "collapse" => {}
            "domain" => {
                let value = value
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| FilterError::MissingOptionValue(name_lower.clone()))?;
                options.domains = parse_domain_option(value);
                if options.domains.is_empty() {
                    return Err(FilterError::InvalidDomain);
                }
            }
            "sitekey" => {
                let value = value
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| FilterError::MissingOptionValue(name_lower.clone()))?;
                options.site_keys = value
                    .split('|')
                    .filter(|key| !key.is_empty())
                    .map(str::to_ascii_uppercase)
                    .collect();
            }
            _ => return Err(FilterError::UnknownOption(name.to_string())),
        }
    }

    Ok(options)
}

/// `domain=a.com|~b.com`; empty entries are skipped, so a value made only
/// of separators yields an empty map.
fn parse_domain_option(value: &str) -> DomainMap {
    let entries = value.split('|').filter_map(|raw| {
        let (included, domain) = match raw.strip_prefix('~') {
            Some(rest) => (false, rest),
            None => (true, raw),
        };
        normalize_domain(domain).map(|domain| (domain, included))
    });
    DomainMap::from_entries(entries)
}

// =============================================================================
// Entry Point
// =============================================================================

/// Compile one filter line.
pub fn compile(raw: &str) -> Filter {
    let text = normalize(raw);

    if text.is_empty() || is_comment_line(&text) {
        return Filter::comment(text);
    }

    if let Some(parts) = split_elemhide(&text) {
        return compile_elemhide(&text, &parts);
    }

    compile_url_filter(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(text: &str) -> Option<FilterError> {
        compile(text).reason
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  foo  "), "foo");
        assert_eq!(normalize("foo\t$ image"), "foo$image");
        assert_eq!(normalize("  ! a comment  "), "! a comment");
        assert_eq!(normalize("example.org, foo.com ## .a - b "), "example.org,foo.com##.a - b");
        assert_eq!(normalize("example.org\n#@#div"), "example.org#@#div");
    }

    #[test]
    fn test_classification() {
        assert_eq!(compile("foo").filter_type, FilterType::Blocking);
        assert_eq!(compile("@@foo").filter_type, FilterType::Exception);
        assert_eq!(compile("example.com##foo").filter_type, FilterType::ElemHide);
        assert_eq!(compile("example.com#@#foo").filter_type, FilterType::ElemHideException);
        assert_eq!(compile("example.com#?#foo").filter_type, FilterType::ElemHideEmulation);
        assert_eq!(compile("!foo").filter_type, FilterType::Comment);
        assert_eq!(compile("").filter_type, FilterType::Comment);
        assert_eq!(compile("@@$genericblock").filter_type, FilterType::GenericBlockException);
        assert_eq!(compile("@@||example.com^$document").filter_type, FilterType::Exception);
    }

    #[test]
    fn test_elemhide_fields() {
        let filter = compile("Example.org,~foo.example.org##div.ad");
        assert_eq!(filter.selector.as_deref(), Some("div.ad"));
        assert_eq!(filter.domains.get("example.org"), Some(true));
        assert_eq!(filter.domains.get("foo.example.org"), Some(false));
        assert!(filter.pattern.is_none());
    }

    #[test]
    fn test_elemhide_invalid() {
        assert_eq!(reason("example.com#$#log hi"), Some(FilterError::SnippetUnsupported));
        assert_eq!(reason("example.com## "), Some(FilterError::EmptySelector));
        assert_eq!(reason("a.com,,b.com##div"), Some(FilterError::InvalidDomain));
        assert_eq!(reason("~##div"), Some(FilterError::InvalidDomain));
        assert_eq!(reason("#?#div:-abp-has(span)"), Some(FilterError::EmulationWithoutDomain));
        assert_eq!(reason("com#?#div"), Some(FilterError::EmulationWithoutDomain));
        assert_eq!(reason("~example.com#?#div"), Some(FilterError::EmulationWithoutDomain));
        assert!(reason("example.com#?#div").is_none());
    }

    #[test]
    fn test_paths_with_hash_are_url_filters() {
        let filter = compile("/foo/##bar");
        assert_eq!(filter.filter_type, FilterType::Blocking);
        let filter = compile("@@foo##bar");
        assert_eq!(filter.filter_type, FilterType::Exception);
    }

    #[test]
    fn test_options() {
        let filter = compile("adbanner.gif.js$script,image");
        assert_eq!(filter.content_types, ContentType::SCRIPT | ContentType::IMAGE);

        let filter = compile("foo$~image");
        assert_eq!(filter.content_types, ContentType::RESOURCE_TYPES & !ContentType::IMAGE);

        let filter = compile("foo$third-party,match-case");
        assert_eq!(filter.party, PartyMask::THIRD_PARTY);
        assert!(filter.match_case);

        assert_eq!(compile("foo$~third-party").party, PartyMask::FIRST_PARTY);
        assert_eq!(compile("foo$1p").party, PartyMask::FIRST_PARTY);
        assert_eq!(compile("foo$3p").party, PartyMask::THIRD_PARTY);
        assert_eq!(compile("foo$Object-Subrequest").content_types, ContentType::OBJECT_SUBREQUEST);
        assert_eq!(compile("foo$background").content_types, ContentType::IMAGE);
        assert!(compile("foo$collapse").reason.is_none());
    }

    #[test]
    fn test_domain_and_sitekey_options() {
        let filter = compile("combanner.gif$domain=Example.com|~foo.example.com");
        assert_eq!(filter.domains.get("example.com"), Some(true));
        assert_eq!(filter.domains.get("foo.example.com"), Some(false));
        assert!(!filter.is_generic());

        let filter = compile("@@$document,sitekey=abc|def");
        assert_eq!(filter.site_keys, vec!["ABC", "DEF"]);
        assert_eq!(filter.content_types, ContentType::DOCUMENT);

        assert_eq!(reason("foo$domain="), Some(FilterError::MissingOptionValue("domain".into())));
        assert_eq!(reason("foo$sitekey"), Some(FilterError::MissingOptionValue("sitekey".into())));
    }

    #[test]
    fn test_domain_option_without_domains() {
        assert_eq!(reason("foo$domain=|"), Some(FilterError::InvalidDomain));
        assert_eq!(reason("foo$domain=~"), Some(FilterError::InvalidDomain));
        assert_eq!(reason("foo$domain=~|"), Some(FilterError::InvalidDomain));

        // one usable entry is enough
        let filter = compile("foo$domain=|example.com|");
        assert_eq!(filter.filter_type, FilterType::Blocking);
        assert_eq!(filter.domains.get("example.com"), Some(true));
    }

    #[test]
    fn test_invalid_options() {
        assert_eq!(reason("foo$bogus"), Some(FilterError::UnknownOption("bogus".into())));
        assert_eq!(reason("foo$image,~image"), Some(FilterError::EmptyContentTypes));
        assert!(matches!(reason("/ab(c/"), Some(FilterError::InvalidRegex(_))));
    }

    #[test]
    fn test_dollar_inside_pattern() {
        let filter = compile("/ads$/$script");
        assert_eq!(filter.content_types, ContentType::SCRIPT);
        assert!(filter.pattern.as_ref().map_or(false, Pattern::is_regex));

        let filter = compile("foo$bar$baz/");
        assert_eq!(filter.filter_type, FilterType::Blocking);
        assert_eq!(filter.content_types, ContentType::RESOURCE_TYPES);
    }

    #[test]
    fn test_compile_is_pure() {
        for text in ["foo$image", "@@||example.com^$document", "example.org##.ad", "  foo  "] {
            let first = compile(text);
            let second = compile(&first.text);
            assert_eq!(first, second);
            assert_eq!(first.filter_type, second.filter_type);
        }
        assert_eq!(compile("foo"), compile("  foo  "));
    }
}
