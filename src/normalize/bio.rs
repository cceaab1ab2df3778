// src/normalize/bio.rs
//! Title / company heuristics for free-text bios ("CTO at Acme | ex-Google").

use once_cell::sync::OnceCell;
use regex::Regex;

/// Role words that anchor a title window. Matched against whole word parts,
/// so "Co-founder" hits `founder` but "Director" does not hit `cto`.
const TITLE_KEYWORDS: &[&str] = &[
    "ceo", "cto", "cmo", "coo", "cfo", "founder", "vp", "director", "head", "manager", "lead",
    "engineer", "developer", "architect", "principal", "consultant", "researcher",
];

const SEPARATORS: &[&str] = &["|", "·", "•", "/", "-", "—"];

/// Words around the first role keyword: one before, the keyword, two after.
pub fn infer_title(bio: &str) -> Option<String> {
    let words: Vec<&str> = bio.split_whitespace().collect();
    let idx = words.iter().position(|w| is_title_word(w))?;

    let mut start = idx.saturating_sub(1);
    if SEPARATORS.contains(&words[start]) || words[start].ends_with(['.', ',', ';', '!']) {
        start = idx;
    }
    let mut out: Vec<&str> = Vec::new();
    for w in &words[start..(idx + 3).min(words.len())] {
        if SEPARATORS.contains(w) {
            break;
        }
        out.push(w);
        if w.ends_with([',', ';', '.', '!']) {
            break;
        }
    }
    let title = out
        .join(" ")
        .trim_matches(|c: char| ".,!?;:@#$%^&*()|".contains(c))
        .trim()
        .to_string();
    (!title.is_empty()).then_some(title)
}

fn is_title_word(word: &str) -> bool {
    word.to_ascii_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|part| TITLE_KEYWORDS.contains(&part))
}

/// Company after "founder of", "ceo of", "working at", "at", else the first
/// `@handle`. At most three words, stops at separators.
pub fn infer_company(bio: &str) -> Option<String> {
    static RE_PHRASE: OnceCell<Regex> = OnceCell::new();
    static RE_AT: OnceCell<Regex> = OnceCell::new();
    let re_phrase = RE_PHRASE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:founder of|ceo of|working at|at)\s+([^|,;·•\n()]+)").unwrap()
    });
    let re_at = RE_AT.get_or_init(|| Regex::new(r"(?:^|\s)@([A-Za-z0-9][\w.-]*)").unwrap());

    if let Some(c) = re_phrase.captures(bio).and_then(|c| c.get(1)) {
        let company = c
            .as_str()
            .split_whitespace()
            .take_while(|w| !SEPARATORS.contains(w))
            .take(3)
            .collect::<Vec<_>>()
            .join(" ");
        let company = company.trim_matches(|c: char| ".,!?:".contains(c)).trim();
        if !company.is_empty() {
            return Some(company.trim_start_matches('@').to_string());
        }
    }
    re_at
        .captures(bio)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_from_typical_bios() {
        assert_eq!(infer_title("CEO at TechCorp").as_deref(), Some("CEO at TechCorp"));
        assert!(infer_title("Senior Software Engineer at Google")
            .unwrap()
            .contains("Software Engineer"));
        assert!(infer_title("Co-founder of StartupXYZ").unwrap().contains("Co-founder"));
        assert_eq!(infer_title("I love coding and coffee"), None);
        assert_eq!(infer_title(""), None);
    }

    #[test]
    fn director_is_not_cto() {
        let t = infer_title("Art Director, painter").unwrap();
        assert_eq!(t, "Art Director");
    }

    #[test]
    fn companies_from_typical_bios() {
        assert_eq!(infer_company("CEO at TechCorp").as_deref(), Some("TechCorp"));
        assert_eq!(
            infer_company("Founder of StartupXYZ | Building the future").as_deref(),
            Some("StartupXYZ")
        );
        assert_eq!(infer_company("Software Engineer @Google").as_deref(), Some("Google"));
        assert_eq!(infer_company("Loves rust and long walks"), None);
    }
}
