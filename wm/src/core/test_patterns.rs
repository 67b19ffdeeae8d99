//! Test-file matching and per-language detection of added test declarations.
//!
//! Detection is a line-level pattern match over added diff lines, not a
//! parser. Each language contributes a [`TestDeclarationStrategy`] selected by
//! file extension; files with unknown extensions use a generic keyword match.

use std::path::Path;
use std::sync::LazyLock;

use glob::{MatchOptions, Pattern};
use regex::Regex;

/// A line added by a diff, with the file it was added to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedLine {
    pub path: String,
    pub text: String,
}

/// Recognizes test declarations for one language family.
pub trait TestDeclarationStrategy: Sync {
    fn language(&self) -> &'static str;
    fn handles(&self, path: &str) -> bool;
    fn is_test_declaration(&self, line: &str) -> bool;
}

struct RegexStrategy {
    language: &'static str,
    extensions: &'static [&'static str],
    pattern: LazyLock<Regex>,
}

impl TestDeclarationStrategy for RegexStrategy {
    fn language(&self) -> &'static str {
        self.language
    }

    fn handles(&self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    fn is_test_declaration(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }
}

static STRATEGIES: [RegexStrategy; 6] = [
    RegexStrategy {
        language: "rust",
        extensions: &["rs"],
        pattern: LazyLock::new(|| {
            Regex::new(r"^\s*#\[(?:\w+::)*test(?:_case)?\b").expect("rust test pattern")
        }),
    },
    RegexStrategy {
        language: "javascript",
        extensions: &["js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts"],
        pattern: LazyLock::new(|| {
            Regex::new(r"^\s*(?:it|test|describe)(?:\.(?:only|each|concurrent|skip|todo))?\s*[(`]")
                .expect("javascript test pattern")
        }),
    },
    RegexStrategy {
        language: "python",
        extensions: &["py"],
        pattern: LazyLock::new(|| {
            Regex::new(r"^\s*(?:async\s+)?def\s+test\w*\s*\(").expect("python test pattern")
        }),
    },
    RegexStrategy {
        language: "go",
        extensions: &["go"],
        pattern: LazyLock::new(|| {
            Regex::new(r"^\s*func\s+(?:Test|Benchmark|Fuzz|Example)\w*\s*\(")
                .expect("go test pattern")
        }),
    },
    RegexStrategy {
        language: "ruby",
        extensions: &["rb"],
        pattern: LazyLock::new(|| {
            Regex::new(r#"^\s*(?:(?:it|specify|test)\s*[('"]|def\s+test_)"#)
                .expect("ruby test pattern")
        }),
    },
    RegexStrategy {
        language: "jvm",
        extensions: &["java", "kt", "kts", "scala"],
        pattern: LazyLock::new(|| {
            Regex::new(r"^\s*@(?:Test|ParameterizedTest|RepeatedTest)\b").expect("jvm test pattern")
        }),
    },
];

static GENERIC: RegexStrategy = RegexStrategy {
    language: "generic",
    extensions: &[],
    pattern: LazyLock::new(|| {
        Regex::new(r"(?i)^\s*(?:(?:def|fn|func|function|sub)\s+test\w*|(?:it|test)\s*\()")
            .expect("generic test pattern")
    }),
};

/// Strategy for `path`, falling back to the generic keyword match.
pub fn strategy_for(path: &str) -> &'static dyn TestDeclarationStrategy {
    STRATEGIES
        .iter()
        .find(|strategy| strategy.handles(path))
        .map(|strategy| strategy as &dyn TestDeclarationStrategy)
        .unwrap_or(&GENERIC)
}

/// Count added lines that declare a new test.
pub fn count_new_tests(lines: &[AddedLine]) -> usize {
    lines
        .iter()
        .filter(|line| strategy_for(&line.path).is_test_declaration(&line.text))
        .count()
}

/// Compiled set of test-file globs.
#[derive(Debug, Clone)]
pub struct TestFileMatcher {
    patterns: Vec<Pattern>,
}

impl TestFileMatcher {
    /// Compile globs; invalid ones are returned separately instead of failing the set.
    pub fn new(globs: &[String]) -> (Self, Vec<String>) {
        let mut patterns = Vec::new();
        let mut invalid = Vec::new();
        for glob in globs {
            match Pattern::new(glob) {
                Ok(pattern) => patterns.push(pattern),
                Err(err) => invalid.push(format!("{glob}: {err}")),
            }
        }
        (Self { patterns }, invalid)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Match against the full relative path or, failing that, the file name.
    pub fn matches(&self, path: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        let file_name = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(path);
        self.patterns.iter().any(|pattern| {
            pattern.matches_with(path, options) || pattern.matches_with(file_name, options)
        })
    }

    pub fn filter<'a>(&self, paths: &'a [String]) -> Vec<&'a String> {
        paths.iter().filter(|path| self.matches(path)).collect()
    }
}
