//! `/greeting/{name}`-style path templates.

use crate::error::TemplateError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed path template.
///
/// Placeholders are `{ident}` where `ident` is ASCII alphanumerics and `_`.
/// Each name may appear once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// # Errors
    /// Returns `TemplateError` for unbalanced braces, empty, malformed or duplicate placeholders.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let unbalanced = |position| TemplateError::UnbalancedBrace {
            template: source.to_owned(),
            position,
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut open: Option<usize> = None;

        for (i, c) in source.char_indices() {
            match (c, open) {
                ('{', None) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    open = Some(i);
                }
                ('{', Some(_)) | ('}', None) => return Err(unbalanced(i)),
                ('}', Some(start)) => {
                    let name = &source[start + 1..i];
                    Self::check_name(source, name, &segments)?;
                    segments.push(Segment::Placeholder(name.to_owned()));
                    open = None;
                }
                (_, Some(_)) => {}
                (_, None) => literal.push(c),
            }
        }

        if let Some(start) = open {
            return Err(unbalanced(start));
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_owned(),
            segments,
        })
    }

    fn check_name(source: &str, name: &str, seen: &[Segment]) -> Result<(), TemplateError> {
        if name.is_empty() {
            return Err(TemplateError::EmptyPlaceholder {
                template: source.to_owned(),
            });
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(TemplateError::InvalidPlaceholder {
                template: source.to_owned(),
                name: name.to_owned(),
            });
        }
        if seen
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(existing) if existing == name))
        {
            return Err(TemplateError::DuplicatePlaceholder {
                template: source.to_owned(),
                name: name.to_owned(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names in declaration order
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Substitute every placeholder. Each value is percent-encoded as one
    /// path segment; unreserved characters pass through unchanged.
    ///
    /// Variables not named by the template are ignored.
    ///
    /// # Errors
    /// Returns `TemplateError::MissingVariable` for the first placeholder without a value.
    pub fn expand(&self, vars: &[(&str, &str)]) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let (_, value) = vars
                        .iter()
                        .find(|(k, _)| *k == name.as_str())
                        .ok_or_else(|| TemplateError::MissingVariable { name: name.clone() })?;
                    out.push_str(&urlencoding::encode(value));
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for PathTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
