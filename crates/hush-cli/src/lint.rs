use std::collections::BTreeMap;
use std::fs;

use hush_compiler::{dedupe, parse_list};
use hush_core::filter::FilterError;
use hush_core::types::FilterType;

pub struct LintOptions {
    pub inputs: Vec<String>,
    pub strict: bool,
    pub verbose: bool,
}

#[derive(Debug, Default)]
pub struct LintReport {
    pub has_header: bool,
    pub title: Option<String>,
    pub lines: usize,
    pub duplicates: usize,
    pub by_type: BTreeMap<&'static str, usize>,
    /// (filter text, reason)
    pub invalid: Vec<(String, FilterError)>,
}

pub fn lint_body(body: &str) -> LintReport {
    let mut parsed = parse_list(body);
    let stats = dedupe(&mut parsed.lines);

    let mut report = LintReport {
        has_header: parsed.has_valid_header(),
        title: parsed.metadata.title.clone(),
        lines: stats.before,
        duplicates: stats.deduped,
        ..LintReport::default()
    };

    for filter in parsed.compile() {
        *report.by_type.entry(filter.filter_type.as_str()).or_insert(0) += 1;
        if filter.filter_type == FilterType::Invalid {
            if let Some(reason) = filter.reason {
                report.invalid.push((filter.text, reason));
            }
        }
    }
    report
}

pub fn run_lint(opts: LintOptions) -> Result<(), String> {
    if opts.inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let mut total_invalid = 0usize;
    for path in &opts.inputs {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        let report = lint_body(&content);
        total_invalid += report.invalid.len();

        println!("{}", path);
        if let Some(title) = &report.title {
            println!("  Title:       {}", title);
        }
        if !report.has_header {
            println!("  Warning:     missing [Adblock ...] header, downloads would be rejected");
        }
        println!("  Lines:       {} ({} duplicates)", report.lines, report.duplicates);
        for (kind, count) in &report.by_type {
            println!("  {:<12} {}", format!("{}:", kind), count);
        }
        let shown = if opts.verbose { report.invalid.len() } else { report.invalid.len().min(20) };
        for (text, reason) in report.invalid.iter().take(shown) {
            println!("  invalid: {}  ({})", text, reason);
        }
        if shown < report.invalid.len() {
            println!("  ... {} more (use --verbose)", report.invalid.len() - shown);
        }
    }

    if opts.strict && total_invalid > 0 {
        return Err(format!("{} invalid filter(s)", total_invalid));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lint_body() {
        let report = lint_body(
            "[Adblock Plus 2.0]\n! Title: Lint\n||ads.example^\n||ads.example^\nfoo$bogus\n##.ad\n#$#log hi\n",
        );
        assert!(report.has_header);
        assert_eq!(report.title.as_deref(), Some("Lint"));
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.by_type.get("blocking"), Some(&1));
        assert_eq!(report.by_type.get("elemhide"), Some(&1));
        assert_eq!(report.invalid.len(), 2);
        assert!(matches!(report.invalid[0].1, FilterError::UnknownOption(_)));
        assert!(matches!(report.invalid[1].1, FilterError::SnippetUnsupported));
    }

    #[test]
    fn test_lint_without_header() {
        let report = lint_body("||ads.example^\n");
        assert!(!report.has_header);
        assert!(report.invalid.is_empty());
    }
}
