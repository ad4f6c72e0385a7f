//! Citation validation at finalization.
//!
//! Every key a final answer references, inline or in its claimed list,
//! must exactly match a citation some tool returned in the session. One
//! unmatched key rejects the whole answer.
//!
//! Every bracketed group is scanned. Key-like tokens anywhere in a group
//! are references: `(Reiman2020)`, `[PMC7000001_reiman]`,
//! `(PMID:36449413; Liu2013)`, `(Reiman2020 pages 1-2)`,
//! `(DOI:10.1016/S0140-6736(20)30367-6)`. Page locators are dropped.
//! Author-year groups such as `(Reiman et al., 2020)` must resolve to a
//! pool citation by surname and year. Groups such as `(APOE4)`,
//! `(see above)` or `(n = 1500)` carry no reference.

use std::sync::LazyLock;

use alzassist_core::citation::{Citation, CitationPool};
use alzassist_core::error::OrchestratorError;
use regex_lite::Regex;

static KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.:/()-]*$").expect("valid key pattern"));

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{4,}").expect("valid digit pattern"));

static ID_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i:pmid:|pmc[0-9]|doi:)[0-9]").expect("valid identifier pattern")
});

static LOCATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\s+)(?:pages?|pp?\.?)\s*[0-9]+(?:\s*[-–]\s*[0-9]+)?$")
        .expect("valid locator pattern")
});

static AUTHOR_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^([A-Z][A-Za-z'-]+)(?:\s+et\s+al\.?|\s+(?:and|&)\s+[A-Z][A-Za-z'-]+)?,?\s+((?:19|20)[0-9]{2})[a-z]?$",
    )
    .expect("valid author-year pattern")
});

/// Capitalised words that open prose dates, not author names.
const NOT_AUTHORS: &[&str] = &[
    "In", "By", "Since", "From", "Until", "Before", "After", "As", "At", "On", "Circa", "Early",
    "Late", "Mid", "Spring", "Summer", "Autumn", "Fall", "Winter", "January", "February", "March",
    "April", "May", "June", "July", "August", "September", "October", "November", "December",
];

/// One reference found in answer text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// An exact citation key
    Key(String),
    /// `Surname [et al.], Year`, resolved by surname and year
    AuthorYear {
        label: String,
        surname: String,
        year: String,
    },
}

impl Reference {
    pub fn label(&self) -> &str {
        match self {
            Self::Key(key) => key,
            Self::AuthorYear { label, .. } => label,
        }
    }

    fn resolve<'a>(&self, pool: &'a CitationPool) -> Option<&'a Citation> {
        match self {
            Self::Key(key) => pool.get(key),
            Self::AuthorYear { surname, year, .. } => {
                let surname = surname.to_lowercase();
                pool.iter().find(|c| {
                    let key = c.key.to_lowercase();
                    let text = c.citation.as_deref().unwrap_or("").to_lowercase();
                    (key.contains(&surname) && key.contains(year.as_str()))
                        || (text.contains(&surname) && text.contains(year.as_str()))
                })
            }
        }
    }
}

fn looks_like_key(token: &str) -> bool {
    !token.contains("://")
        && KEY.is_match(token) && (DIGIT_RUN.is_match(token) || ID_PREFIX.is_match(token))
}

/// Strip sentence punctuation and unbalanced or enclosing brackets.
fn clean_token(token: &str) -> &str {
    let mut t = token.trim_matches(|c: char| matches!(c, '.' | ',' | ';' | '"' | '\'' | '[' | ']'));
    loop {
        let opens = t.matches('(').count();
        let closes = t.matches(')').count();
        if t.starts_with('(') && t.ends_with(')') && t.len() >= 2 {
            t = &t[1..t.len() - 1];
        } else if opens > closes && t.starts_with('(') {
            t = &t[1..];
        } else if closes > opens && t.ends_with(')') {
            t = &t[..t.len() - 1];
        } else {
            return t.trim_end_matches('.');
        }
    }
}

/// Outermost bracketed groups, allowing nested parentheses inside.
fn groups(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut stack: Vec<char> = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => {
                if stack.is_empty() {
                    start = i + 1;
                }
                stack.push(c);
            }
            ')' | ']' => {
                let opener = if c == ')' { '(' } else { '[' };
                match stack.last() {
                    Some(&top) if top == opener => {
                        stack.pop();
                        if stack.is_empty() {
                            found.push(&text[start..i]);
                        }
                    }
                    // Unbalanced closer: drop whatever was open.
                    _ => stack.clear(),
                }
            }
            _ => {}
        }
    }
    found
}

fn author_year(item: &str) -> Option<Reference> {
    let caps = AUTHOR_YEAR.captures(item)?;
    let surname = caps.get(1)?.as_str();
    if NOT_AUTHORS.contains(&surname) {
        return None;
    }
    Some(Reference::AuthorYear {
        label: item.to_string(),
        surname: surname.to_string(),
        year: caps.get(2)?.as_str().to_string(),
    })
}

/// References in one `;`-separated item of a group.
fn item_references(item: &str, out: &mut Vec<Reference>) {
    let item = LOCATOR.replace(item.trim(), "");
    let item = item.trim().trim_end_matches(',').trim();
    if item.is_empty() {
        return;
    }
    if let Some(reference) = author_year(item) {
        out.push(reference);
        return;
    }
    for part in item.split(',') {
        let part = LOCATOR.replace(part.trim(), "");
        if let Some(reference) = author_year(part.trim()) {
            out.push(reference);
            continue;
        }
        for token in part.split_whitespace() {
            let token = clean_token(token);
            if looks_like_key(token) {
                out.push(Reference::Key(token.to_string()));
            }
        }
    }
}

/// References found inline, in first-appearance order, deduplicated.
pub fn extract_markers(text: &str) -> Vec<Reference> {
    let mut found = Vec::new();
    for group in groups(text) {
        for item in group.split(';') {
            item_references(item, &mut found);
        }
    }
    let mut references: Vec<Reference> = Vec::new();
    for reference in found {
        if !references.iter().any(|r| r.label() == reference.label()) {
            references.push(reference);
        }
    }
    references
}

/// Validate a final answer against the session's citation pool.
///
/// Returns the referenced citations (inline references first, then claimed
/// keys not already referenced) resolved to the pool's objects.
pub fn validate(
    text: &str,
    claimed: &[String],
    pool: &CitationPool,
) -> Result<Vec<Citation>, OrchestratorError> {
    let mut references = extract_markers(text);
    for key in claimed {
        let key = key.trim();
        if !key.is_empty() && !references.iter().any(|r| r.label() == key) {
            references.push(Reference::Key(key.to_string()));
        }
    }

    let mut unmatched = Vec::new();
    let mut citations: Vec<Citation> = Vec::new();
    for reference in &references {
        match reference.resolve(pool) {
            Some(citation) => {
                if !citations.iter().any(|c| c.key == citation.key) {
                    citations.push(citation.clone());
                }
            }
            None => unmatched.push(reference.label().to_string()),
        }
    }
    if !unmatched.is_empty() {
        return Err(OrchestratorError::CitationIntegrity { unmatched });
    }

    Ok(citations)
}
