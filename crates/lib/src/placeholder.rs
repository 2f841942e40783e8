//! Placeholder parsing and substitution for command templates.
//!
//! Build, install and verification commands are configured as templates whose
//! concrete values (interpreter path, output directory, generator, ...) are
//! only known once a unit is running.
//!
//! # Placeholder Format
//!
//! - `{name}` - replaced with the value bound to `name`
//! - `{{` / `}}` - literal `{` / `}`
//!
//! Shell parameter expansions such as `${HOME}` pass through unchanged.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use wheelhouse_lib::placeholder::{parse, substitute, Segment};
//!
//! let segments = parse("{python} -m pip install ${PIP_ARGS}").unwrap();
//! assert_eq!(segments[0], Segment::Placeholder("python".to_string()));
//!
//! let vars = BTreeMap::from([("python", "/opt/py38/bin/python".to_string())]);
//! let cmd = substitute("{python} setup.py sdist", &vars).unwrap();
//! assert_eq!(cmd, "/opt/py38/bin/python setup.py sdist");
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A named placeholder to be resolved
  Placeholder(String),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("unknown placeholder: {{{0}}}")]
  Unknown(String),
}

/// Parse a template into literal and placeholder segments.
///
/// # Errors
///
/// Returns an error if a placeholder is unclosed or its name is not made of
/// ASCII alphanumerics, `_` or `-`.
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let chars: Vec<char> = input.chars().collect();
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];
    match c {
      '{' if chars.get(i + 1) == Some(&'{') => {
        literal.push('{');
        i += 2;
      }
      '}' if chars.get(i + 1) == Some(&'}') => {
        literal.push('}');
        i += 2;
      }
      '$' if chars.get(i + 1) == Some(&'{') => {
        // Shell expansion: copy through the matching brace verbatim
        let close = chars[i + 2..]
          .iter()
          .position(|&ch| ch == '}')
          .ok_or(PlaceholderError::Unclosed(i))?;
        literal.extend(&chars[i..i + 2 + close + 1]);
        i += close + 3;
      }
      '{' => {
        let close = chars[i + 1..]
          .iter()
          .position(|&ch| ch == '}')
          .ok_or(PlaceholderError::Unclosed(i))?;
        let name: String = chars[i + 1..i + 1 + close].iter().collect();
        if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
          return Err(PlaceholderError::Malformed(name));
        }
        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Placeholder(name));
        i += close + 2;
      }
      _ => {
        literal.push(c);
        i += 1;
      }
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Substitute every placeholder in `template` from `vars`.
pub fn substitute(template: &str, vars: &BTreeMap<&str, String>) -> Result<String, PlaceholderError> {
  let mut out = String::with_capacity(template.len());

  for segment in parse(template)? {
    match segment {
      Segment::Literal(text) => out.push_str(&text),
      Segment::Placeholder(name) => {
        let value = vars
          .get(name.as_str())
          .ok_or_else(|| PlaceholderError::Unknown(name.clone()))?;
        out.push_str(value);
      }
    }
  }

  Ok(out)
}
