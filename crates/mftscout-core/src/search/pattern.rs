/// Search pattern compilation and matching.
///
/// Three pattern kinds (verbatim, glob, regex), each with case-insensitive
/// and whole-string/substring variants. The matcher is handed text straight
/// out of the index — ASCII bytes, UTF-16 code units, or an assembled path
/// string — and decodes into a reusable scratch buffer only when it must.
use aho_corasick::AhoCorasick;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::model::names::NameText;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    /// Literal text.
    Verbatim,
    /// `?` matches one character, `*` any run.
    Glob,
    /// Full regex syntax.
    Regex,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternSpec {
    pub kind: PatternKind,
    pub pattern: String,
    pub case_insensitive: bool,
    /// Whole-string match instead of any-substring match.
    pub match_whole: bool,
}

impl PatternSpec {
    pub fn verbatim(pattern: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::Verbatim,
            pattern: pattern.into(),
            case_insensitive: false,
            match_whole: false,
        }
    }

    pub fn glob(pattern: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::Glob,
            pattern: pattern.into(),
            case_insensitive: false,
            match_whole: true,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::Regex,
            pattern: pattern.into(),
            case_insensitive: false,
            match_whole: false,
        }
    }

    pub fn case_insensitive(mut self, value: bool) -> Self {
        self.case_insensitive = value;
        self
    }

    pub fn match_whole(mut self, value: bool) -> Self {
        self.match_whole = value;
        self
    }

    pub fn compile(&self) -> Result<PatternMatcher> {
        PatternMatcher::new(self)
    }
}

enum Engine {
    /// Substring scan; ASCII case folding is handled by the automaton.
    Substring(AhoCorasick),
    /// Whole-string literal comparison against a pre-folded needle.
    WholeLiteral { needle: String, fold: bool },
    Regex(Regex),
}

/// A compiled pattern plus its decode scratch.
pub struct PatternMatcher {
    engine: Engine,
    scratch: String,
}

impl PatternMatcher {
    fn new(spec: &PatternSpec) -> Result<Self> {
        let engine = match spec.kind {
            PatternKind::Verbatim => {
                if spec.match_whole {
                    Engine::WholeLiteral {
                        needle: if spec.case_insensitive {
                            spec.pattern.to_lowercase()
                        } else {
                            spec.pattern.clone()
                        },
                        fold: spec.case_insensitive,
                    }
                } else if spec.case_insensitive && !spec.pattern.is_ascii() {
                    // The automaton only folds ASCII; fall back to a regex
                    // for case-insensitive non-ASCII needles.
                    Engine::Regex(build_regex(&regex::escape(&spec.pattern), spec, false)?)
                } else {
                    let ac = AhoCorasick::builder()
                        .ascii_case_insensitive(spec.case_insensitive)
                        .build([spec.pattern.as_str()])
                        .map_err(|e| {
                            IndexError::Pattern(e.to_string())
                        })?;
                    Engine::Substring(ac)
                }
            }
            PatternKind::Glob => {
                Engine::Regex(build_regex(&glob_to_regex(&spec.pattern), spec, false)?)
            }
            PatternKind::Regex => Engine::Regex(build_regex(&spec.pattern, spec, false)?),
        };
        Ok(Self {
            engine,
            scratch: String::new(),
        })
    }

    /// Test `text` against the pattern, decoding through the scratch
    /// buffer when the text is not already a string.
    pub fn is_match(&mut self, text: NameText<'_>) -> bool {
        let haystack: &str = match text {
            NameText::Str(s) => s,
            other => {
                self.scratch.clear();
                other.push_into(&mut self.scratch);
                &self.scratch
            }
        };
        match &self.engine {
            Engine::Substring(ac) => ac.is_match(haystack),
            Engine::WholeLiteral { needle, fold } => {
                if *fold {
                    haystack.to_lowercase() == *needle
                } else {
                    haystack == needle
                }
            }
            Engine::Regex(re) => re.is_match(haystack),
        }
    }
}

fn build_regex(pattern: &str, spec: &PatternSpec, already_anchored: bool) -> Result<Regex> {
    let mut full = String::new();
    if spec.case_insensitive {
        full.push_str("(?i)");
    }
    if spec.match_whole && !already_anchored {
        full.push_str("^(?:");
        full.push_str(pattern);
        full.push_str(")$");
    } else {
        full.push_str(pattern);
    }
    Regex::new(&full).map_err(|e| IndexError::Pattern(e.to_string()))
}

/// Translate a `?`/`*` glob into unanchored regex source. `build_regex`
/// adds the `^(?:...)$` anchors when whole-string matching is requested,
/// so globs get the same whole/substring split as the other kinds.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() + 8);
    out.push_str("(?:");
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push(')');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(spec: PatternSpec, text: &str) -> bool {
        spec.compile().unwrap().is_match(NameText::Str(text))
    }

    #[test]
    fn verbatim_substring() {
        let spec = PatternSpec::verbatim("port");
        assert!(matches(spec.clone(), "report.txt"));
        assert!(!matches(spec, "summary.txt"));
    }

    #[test]
    fn verbatim_case_insensitive() {
        let spec = PatternSpec::verbatim("README").case_insensitive(true);
        assert!(matches(spec.clone(), "readme.md"));
        assert!(matches(spec, "MyReadme.txt"));
    }

    #[test]
    fn verbatim_whole_string() {
        let spec = PatternSpec::verbatim("notes.txt").match_whole(true);
        assert!(matches(spec.clone(), "notes.txt"));
        assert!(!matches(spec, "my-notes.txt"));
    }

    #[test]
    fn glob_wildcards() {
        let spec = PatternSpec::glob("*.rs");
        assert!(matches(spec.clone(), "main.rs"));
        assert!(!matches(spec.clone(), "main.rss"));
        assert!(!matches(spec, "main.rc"));
        let q = PatternSpec::glob("file?.bin");
        assert!(matches(q.clone(), "file1.bin"));
        assert!(!matches(q, "file12.bin"));
    }

    #[test]
    fn glob_escapes_regex_metacharacters() {
        let spec = PatternSpec::glob("a+b (1).txt");
        assert!(matches(spec.clone(), "a+b (1).txt"));
        assert!(!matches(spec, "aab (1).txt"));
    }

    #[test]
    fn glob_substring_mode_matches_inside_the_text() {
        let spec = PatternSpec::glob("cache.???").match_whole(false);
        assert!(matches(spec.clone(), "old-cache.tmp.bak"));
        assert!(matches(spec.clone(), "cache.tmp"));
        assert!(!matches(spec, "cache.md"));
        // The same glob in whole-string mode rejects surrounding text.
        let whole = PatternSpec::glob("cache.???");
        assert!(!matches(whole.clone(), "old-cache.tmp.bak"));
        assert!(matches(whole, "cache.tmp"));
    }

    #[test]
    fn regex_modes() {
        let spec = PatternSpec::regex(r"^\$[A-Z][a-z]+$").match_whole(false);
        assert!(matches(spec, "$Bitmap"));
        let anchored = PatternSpec::regex("b.d").match_whole(true);
        assert!(matches(anchored.clone(), "bad"));
        assert!(!matches(anchored, "abade"));
    }

    #[test]
    fn matcher_decodes_wide_and_ascii_uniformly() {
        let mut m = PatternSpec::verbatim("héllo")
            .case_insensitive(true)
            .compile()
            .unwrap();
        let wide = crate::model::names::encode_utf16le("HÉLLO.txt");
        assert!(m.is_match(NameText::Wide(&wide)));
        assert!(m.is_match(NameText::Str("xhéllox")));
        assert!(!m.is_match(NameText::Ascii(b"hello")));
    }
}
