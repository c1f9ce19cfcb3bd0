//! Include/exclude class filters.

use crate::result::{CovError, CovResult};
use regex::Regex;

/// Whole-name regex filter over fully-qualified class names.
///
/// Exclusion wins over inclusion. A pattern matching the outer class
/// (`a.Foo`) also matches its nested classes (`a.Foo$Bar`). An empty include
/// list accepts every class that is not excluded.
#[derive(Debug, Clone, Default)]
pub struct ClassFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl ClassFilter {
    /// Compile include and exclude patterns
    pub fn new(include: &[String], exclude: &[String]) -> CovResult<Self> {
        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    /// Filter accepting every class
    #[must_use]
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// True if `class` passes the filter
    #[must_use]
    pub fn accepts(&self, class: &str) -> bool {
        let outer = outer_class(class);
        let matches = |re: &Regex| re.is_match(class) || re.is_match(outer);
        if self.exclude.iter().any(matches) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(matches)
    }
}

/// Name of the outermost enclosing class
#[must_use]
pub fn outer_class(class: &str) -> &str {
    class.split('$').next().unwrap_or(class)
}

fn compile_all(patterns: &[String]) -> CovResult<Vec<Regex>> {
    patterns.iter().map(|p| compile(p)).collect()
}

fn compile(pattern: &str) -> CovResult<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|err| CovError::InvalidPattern {
        pattern: pattern.to_string(),
        message: err.to_string(),
    })
}
