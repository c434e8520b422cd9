//! Textual source patches.
//!
//! A rule is a sed-style substitution, optionally scoped to one file:
//!
//! ```text
//! [<relative-path>:]s<d><regex><d><replacement><d>[g]
//! ```
//!
//! `<d>` is any non-alphanumeric delimiter and may be escaped inside the
//! pattern or replacement as `\<d>`. The pattern uses `regex` crate syntax.
//! The replacement accepts `\1`..`\9`, `&` for the whole match and `\&` for
//! a literal ampersand. Without `g` only the first match on each line is
//! replaced.
//!
//! Every rule reports how many substitutions it made; zero is an error.

use std::fs;
use std::path::{Component, Path};

use regex::Regex;
use walkdir::WalkDir;

use crate::error::BuildErrorKind;

/// A parsed substitution rule.
#[derive(Debug, Clone)]
pub struct PatchRule {
    text: String,
    path: Option<String>,
    pattern: Regex,
    replacement: String,
    global: bool,
}

/// Result of applying one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub rule: String,
    pub files: usize,
    pub matches: usize,
}

/// Split `body` at unescaped `delim`, returning the segments.
///
/// An escaped delimiter becomes the delimiter itself, regex-escaped when
/// `escape_for_regex` is set for the segment index.
fn split_unescaped(body: &str, delim: char) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        let current = parts.len() - 1;
        if c == '\\' {
            match chars.next() {
                Some(next) if next == delim => {
                    // pattern segment needs a regex-literal delimiter
                    if current == 0 {
                        parts[current].push_str(&regex::escape(&next.to_string()));
                    } else {
                        parts[current].push_str("\\");
                        parts[current].push(next);
                    }
                }
                Some(next) => {
                    parts[current].push('\\');
                    parts[current].push(next);
                }
                None => parts[current].push('\\'),
            }
        } else if c == delim {
            parts.push(String::new());
        } else {
            parts[current].push(c);
        }
    }
    parts
}

/// Translate a sed replacement into `regex` replacement syntax.
fn translate_replacement(raw: &str, delim: char) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(d) if d.is_ascii_digit() => {
                    out.push_str("${");
                    out.push(d);
                    out.push('}');
                }
                Some('&') => out.push('&'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some('$') => out.push_str("$$"),
                Some(d) if d == delim => out.push(d),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            '&' => out.push_str("${0}"),
            '$' => out.push_str("$$"),
            other => out.push(other),
        }
    }
    out
}

impl PatchRule {
    /// Parse a rule.
    ///
    /// # Errors
    ///
    /// Returns [`BuildErrorKind::InvalidPatch`] naming the rule when it is
    /// malformed, its path escapes the tree, or its pattern does not compile.
    pub fn parse(text: &str) -> Result<Self, BuildErrorKind> {
        let invalid = |reason: String| BuildErrorKind::InvalidPatch {
            patch: text.to_string(),
            reason,
        };

        let attempt = |path: Option<&str>, body: &str| -> Result<Self, String> {
            let mut chars = body.chars();
            if chars.next() != Some('s') {
                return Err("substitution must start with 's'".to_string());
            }
            let delim = chars
                .next()
                .ok_or_else(|| "missing delimiter".to_string())?;
            if delim.is_alphanumeric() || delim == '\\' || delim.is_whitespace() {
                return Err(format!("'{delim}' cannot be used as a delimiter"));
            }
            let parts = split_unescaped(chars.as_str(), delim);
            let [pattern, replacement, flags] = <[String; 3]>::try_from(parts)
                .map_err(|parts| {
                    format!(
                        "expected s{delim}pattern{delim}replacement{delim}[g], found {} sections",
                        parts.len()
                    )
                })?;
            let global = match flags.as_str() {
                "" => false,
                "g" => true,
                other => return Err(format!("unsupported flags '{other}'")),
            };
            if pattern.is_empty() {
                return Err("pattern must not be empty".to_string());
            }
            let pattern = Regex::new(&pattern).map_err(|e| format!("invalid pattern: {e}"))?;
            if let Some(path) = path {
                check_relative(path)?;
            }
            Ok(Self {
                text: text.to_string(),
                path: path.map(str::to_string),
                pattern,
                replacement: translate_replacement(&replacement, delim),
                global,
            })
        };

        let trimmed = text.trim();
        match attempt(None, trimmed) {
            Ok(rule) => Ok(rule),
            Err(unscoped) => match trimmed.split_once(':') {
                Some((path, body)) if !path.is_empty() => {
                    attempt(Some(path), body).map_err(invalid)
                }
                _ => Err(invalid(unscoped)),
            },
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Substitute within one string, line by line. Returns the new text and
    /// the number of substitutions.
    pub fn apply_to_str(&self, content: &str) -> (String, usize) {
        let mut out = String::with_capacity(content.len());
        let mut matches = 0;
        for line in content.split_inclusive('\n') {
            let (body, newline) = match line.strip_suffix('\n') {
                Some(body) => (body, "\n"),
                None => (line, ""),
            };
            let limit = if self.global { 0 } else { 1 };
            let found = self.pattern.find_iter(body).count();
            let found = if self.global { found } else { found.min(1) };
            if found == 0 {
                out.push_str(line);
                continue;
            }
            matches += found;
            out.push_str(&self.pattern.replacen(body, limit, self.replacement.as_str()));
            out.push_str(newline);
        }
        (out, matches)
    }

    /// Apply to the tree at `root`, rewriting changed files in place.
    ///
    /// Files that are not UTF-8 text are skipped, as is anything under `.git`.
    pub fn apply(&self, root: &Path) -> Result<PatchOutcome, BuildErrorKind> {
        let files: Vec<_> = match &self.path {
            Some(path) => {
                let file = root.join(path);
                if !file.is_file() {
                    return Err(BuildErrorKind::PatchNotMatched {
                        patch: self.text.clone(),
                    });
                }
                vec![file]
            }
            None => WalkDir::new(root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.file_name() != ".git")
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect(),
        };

        let mut outcome = PatchOutcome {
            rule: self.text.clone(),
            files: 0,
            matches: 0,
        };
        for file in files {
            let Ok(content) = fs::read_to_string(&file) else {
                continue;
            };
            let (patched, matches) = self.apply_to_str(&content);
            if matches == 0 {
                continue;
            }
            // Plain write keeps the file's permissions
            fs::write(&file, patched).map_err(|e| BuildErrorKind::InvalidPatch {
                patch: self.text.clone(),
                reason: format!("cannot write {}: {e}", file.display()),
            })?;
            outcome.files += 1;
            outcome.matches += matches;
        }

        if outcome.matches == 0 {
            return Err(BuildErrorKind::PatchNotMatched {
                patch: self.text.clone(),
            });
        }
        Ok(outcome)
    }
}

fn check_relative(path: &str) -> Result<(), String> {
    let p = Path::new(path);
    if p.is_absolute()
        || p
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(format!("path '{path}' must stay inside the source tree"));
    }
    Ok(())
}

/// Parse and apply `rules` to `root` in declared order, stopping at the first
/// rule that fails.
pub fn apply_all(root: &Path, rules: &[String]) -> Result<Vec<PatchOutcome>, BuildErrorKind> {
    // Parse everything first so a typo in the last rule fails before the
    // tree is touched
    let parsed = rules
        .iter()
        .map(|r| PatchRule::parse(r))
        .collect::<Result<Vec<_>, _>>()?;
    parsed.iter().map(|rule| rule.apply(root)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("s/foo/bar/", "foo foo\nfoo\n", "bar foo\nbar\n", 2)]
    #[case("s/foo/bar/g", "foo foo\nfoo\n", "bar bar\nbar\n", 3)]
    #[case("s|/usr/local|/opt|g", "PREFIX=/usr/local\n", "PREFIX=/opt\n", 1)]
    #[case(r"s/(\w+)=(\w+)/\2=\1/", "a=b\n", "b=a\n", 1)]
    #[case("s/native/[&]/", "-march=native\n", "-march=[native]\n", 1)]
    #[case(r"s/x/\&/", "x\n", "&\n", 1)]
    #[case("s/cost/$5/", "cost\n", "$5\n", 1)]
    #[case(r"s/a\/b/c/", "a/b\n", "c\n", 1)]
    #[case(r"s#\##!#", "#\n", "!\n", 1)]
    fn test_substitution_semantics(
        #[case] rule: &str,
        #[case] input: &str,
        #[case] expected: &str,
        #[case] count: usize,
    ) {
        let rule = PatchRule::parse(rule).unwrap();
        assert_eq!(rule.apply_to_str(input), (expected.to_string(), count));
    }

    #[test]
    fn test_scoped_rule() {
        let rule = PatchRule::parse("src/Makefile:s/-Werror//g").unwrap();
        assert_eq!(rule.path(), Some("src/Makefile"));
    }

    #[test]
    fn test_rule_without_trailing_newline_in_content() {
        let rule = PatchRule::parse("s/a/b/").unwrap();
        assert_eq!(rule.apply_to_str("a"), ("b".to_string(), 1));
    }

    #[rstest]
    #[case("y/a/b/")]
    #[case("s/a/b")]
    #[case("s/a/b/x")]
    #[case("s//b/")]
    #[case("s/(/b/")]
    #[case("../etc/passwd:s/a/b/")]
    #[case("/etc/passwd:s/a/b/")]
    #[case("sab")]
    fn test_invalid_rules(#[case] rule: &str) {
        let err = PatchRule::parse(rule).unwrap_err();
        assert!(matches!(err, BuildErrorKind::InvalidPatch { ref patch, .. } if patch == rule));
    }

    #[test]
    fn test_apply_tree_skips_git_and_binary() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join(".git/config"), "march=native\n").unwrap();
        fs::write(root.join("Makefile"), "CFLAGS += -march=native\n").unwrap();
        fs::write(root.join("src/build.mk"), "OPT = -march=native -O2\n").unwrap();
        fs::write(root.join("blob.bin"), [0xff, 0xfe, b'n', b'a']).unwrap();

        let outcome = PatchRule::parse("s/-march=native//g")
            .unwrap()
            .apply(root)
            .unwrap();
        assert_eq!(outcome.files, 2);
        assert_eq!(outcome.matches, 2);
        assert_eq!(fs::read_to_string(root.join("Makefile")).unwrap(), "CFLAGS += \n");
        assert_eq!(fs::read_to_string(root.join(".git/config")).unwrap(), "march=native\n");
    }

    #[test]
    fn test_zero_matches_fail() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Makefile"), "all:\n").unwrap();
        let err = apply_all(dir.path(), &["s/-march=native//g".to_string()]).unwrap_err();
        assert_eq!(
            err,
            BuildErrorKind::PatchNotMatched {
                patch: "s/-march=native//g".into()
            }
        );
    }

    #[test]
    fn test_scoped_rule_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = apply_all(dir.path(), &["Makefile:s/a/b/".to_string()]).unwrap_err();
        assert!(matches!(err, BuildErrorKind::PatchNotMatched { .. }));
    }

    #[test]
    fn test_rules_apply_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.h"), "#define LEVEL 1\n").unwrap();
        let outcomes = apply_all(
            dir.path(),
            &[
                "config.h:s/LEVEL 1/LEVEL 2/".to_string(),
                "config.h:s/LEVEL 2/LEVEL 3/".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("config.h")).unwrap(),
            "#define LEVEL 3\n"
        );
    }

    #[test]
    fn test_invalid_rule_leaves_tree_untouched() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.c"), "foo\n").unwrap();
        let err = apply_all(dir.path(), &["s/foo/bar/".to_string(), "s/(/x/".to_string()]);
        assert!(err.is_err());
        assert_eq!(fs::read_to_string(dir.path().join("a.c")).unwrap(), "foo\n");
    }
}
