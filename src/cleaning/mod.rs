//! Text normalization for titles and abstracts.
//!
//! arXiv metadata is written in LaTeX. Before embedding, titles and abstracts
//! are scrubbed of accent escapes, formatting commands and inline math so the
//! embedding model sees mostly plain prose.
//!
//! The passes run in a fixed order; each pass consumes the previous pass's
//! output:
//!
//! 1. newlines become single spaces
//! 2. braced accent escapes (`\'{e}`) collapse to the bare letter
//! 3. LaTeX commands with a flat brace argument (`\textbf{x}`) are deleted
//! 4. unbraced accent escapes (`\'e`) collapse to the bare letter
//! 5. whitespace-separated inline math (`$x^2$`, `$$y$$`) becomes ` LATEX `
//!
//! Normalizing ordinary LaTeX prose twice gives the same result as once, but
//! this does not hold for every input: a later pass can expose a shape an
//! earlier pass matches. In `\a\'bc{d}`, pass 4 turns `\'b` into `b` and
//! leaves `\abc{d}`, which pass 3 deletes on a second run.

use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder substituted for inline math spans.
pub const LATEX_PLACEHOLDER: &str = "LATEX";

static BRACED_ACCENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\\['"^`H~ckl=bdruvtoi]\{([a-z])\}"#).expect("braced accent pattern")
});

static ENVIRONMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\[a-z]{2,}\{[^{}]+?\}").expect("environment pattern"));

static BARE_ACCENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\\['"^`H~ckl=bdruvtoi]([a-z])"#).expect("bare accent pattern")
});

// `$$` is tried before `$` so display math is consumed whole.
static INLINE_MATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s(?:\$\$[^$]*?\$\$|\$[^$]*?\$)\S*").expect("inline math pattern")
});

static HYPHENATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+(?:-\w+)+").expect("hyphenated word pattern"));

/// Normalize a raw title or abstract.
///
/// # Example
/// ```
/// use arxiv_recommender::cleaning::normalize;
///
/// assert_eq!(normalize("Schr\\\"{o}dinger maps"), "Schrodinger maps");
/// assert_eq!(normalize("bounds on $u$ here"), "bounds on LATEX  here");
/// ```
pub fn normalize(raw: &str) -> String {
    let text = raw.replace('\n', " ");
    let text = BRACED_ACCENT.replace_all(&text, "$1");
    let text = ENVIRONMENT.replace_all(&text, "");
    let text = BARE_ACCENT.replace_all(&text, "$1");
    let placeholder = format!(" {} ", LATEX_PLACEHOLDER);
    INLINE_MATH
        .replace_all(&text, placeholder.as_str())
        .into_owned()
}

/// Build the document string embedded for a paper.
pub fn doc_string(title: &str, abstract_text: &str) -> String {
    format!("{} {}", normalize(title), normalize(abstract_text))
}

/// Collect the distinct hyphenated compounds in `text` (e.g. `well-posedness`).
///
/// Compounds touching a stray hyphen (`a-b-`, `--a-b`) are ignored. Returns
/// `None` when nothing was found; the terms come back sorted.
pub fn hyphenated_terms(text: &str) -> Option<Vec<String>> {
    let mut terms: Vec<String> = HYPHENATED
        .find_iter(text)
        .filter(|m| {
            let before = text[..m.start()].chars().next_back();
            let after = text[m.end()..].chars().next();
            before != Some('-') && after != Some('-')
        })
        .map(|m| m.as_str().to_string())
        .collect();

    if terms.is_empty() {
        return None;
    }
    terms.sort();
    terms.dedup();
    Some(terms)
}
