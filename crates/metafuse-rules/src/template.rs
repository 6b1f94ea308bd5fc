//! Path template parsing and interpolation.
//!
//! Templates are literal text with brace expressions:
//!
//! ```text
//! {path}            required field; interpolation fails when missing
//! {path?}           optional field; elided when missing
//! {path?(inner)}    inner template included iff `path` is present and
//!                   `inner` itself interpolates
//! {path|fallback}   second field lookup when `fallback` parses as a field
//!                   path, literal default otherwise; both fields missing
//!                   fails the interpolation
//! {path:format}     padN | upper | uppercase | lower | lowercase
//! ```
//!
//! Path segments are separated by `.` or `/` and are normalized to dot form
//! before lookup. Braces nest inside conditional subtemplates; unmatched
//! braces render as literals.

use metafuse_core::{normalize_property_path, RuleError};

/// A parsed path template.
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone)]
struct Expr {
    /// Dot-normalized field path
    path: String,
    modifier: Modifier,
}

#[derive(Debug, Clone)]
enum Modifier {
    Required,
    Optional,
    Conditional(Template),
    Fallback(Fallback),
    Format(Format),
}

#[derive(Debug, Clone)]
enum Fallback {
    Field(String),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Format {
    Pad(usize),
    Upper,
    Lower,
}

impl Template {
    /// Parse a template string.
    ///
    /// Fails on malformed expressions (bad path, unknown format); the rule
    /// engine treats that as a soft failure and skips the rule.
    pub fn parse(input: &str) -> Result<Template, RuleError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut i = 0;

        while i < input.len() {
            let c = input[i..].chars().next().unwrap_or('\0');
            if c == '{' {
                match find_matching_brace(input, i) {
                    Some(close) => {
                        if !literal.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal)));
                        }
                        let inner = &input[i + 1..close];
                        segments.push(Segment::Expr(parse_expr(inner)?));
                        i = close + 1;
                    }
                    None => {
                        // Unmatched open brace stays literal.
                        literal.push('{');
                        i += 1;
                    }
                }
            } else {
                literal.push(c);
                i += c.len_utf8();
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Template { segments })
    }

    /// Interpolate against a field source.
    ///
    /// Returns `None` when a required field (or a fallback pair) is missing,
    /// which propagates as a rule failure.
    pub fn render<F>(&self, lookup: &F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Expr(expr) => match &expr.modifier {
                    Modifier::Required => out.push_str(&lookup(&expr.path)?),
                    Modifier::Optional => {
                        if let Some(v) = lookup(&expr.path) {
                            out.push_str(&v);
                        }
                    }
                    Modifier::Conditional(inner) => {
                        if lookup(&expr.path).is_some() {
                            if let Some(v) = inner.render(lookup) {
                                out.push_str(&v);
                            }
                        }
                    }
                    Modifier::Fallback(fallback) => match lookup(&expr.path) {
                        Some(v) => out.push_str(&v),
                        None => match fallback {
                            Fallback::Field(path) => out.push_str(&lookup(path)?),
                            Fallback::Literal(text) => out.push_str(text),
                        },
                    },
                    Modifier::Format(format) => {
                        out.push_str(&format.apply(&lookup(&expr.path)?));
                    }
                },
            }
        }
        Some(out)
    }

    /// Every field path this template can read, including fallback fields
    /// and everything inside conditional subtemplates.
    pub fn variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        for segment in &self.segments {
            if let Segment::Expr(expr) = segment {
                out.push(expr.path.clone());
                match &expr.modifier {
                    Modifier::Conditional(inner) => inner.collect_variables(out),
                    Modifier::Fallback(Fallback::Field(path)) => out.push(path.clone()),
                    _ => {}
                }
            }
        }
    }
}

impl Format {
    fn apply(&self, value: &str) -> String {
        match self {
            Format::Pad(width) => {
                if value.len() >= *width {
                    value.to_string()
                } else {
                    format!("{:0>width$}", value, width = width)
                }
            }
            Format::Upper => value.to_uppercase(),
            Format::Lower => value.to_lowercase(),
        }
    }
}

/// Index of the `}` matching the `{` at `open`, honoring nesting.
fn find_matching_brace(input: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, c) in input[open..].char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_expr(inner: &str) -> Result<Expr, RuleError> {
    let path_end = inner
        .char_indices()
        .find(|(_, c)| !is_path_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(inner.len());

    let raw_path = &inner[..path_end];
    if !is_field_path(raw_path) {
        return Err(RuleError::Template(format!(
            "invalid field path in {{{inner}}}"
        )));
    }
    let path = normalize_property_path(raw_path);
    let rest = &inner[path_end..];

    let modifier = if rest.is_empty() {
        Modifier::Required
    } else if rest == "?" {
        Modifier::Optional
    } else if let Some(sub) = rest.strip_prefix("?(").and_then(|r| r.strip_suffix(')')) {
        Modifier::Conditional(Template::parse(sub)?)
    } else if let Some(format) = rest.strip_prefix(':') {
        Modifier::Format(parse_format(format)?)
    } else if let Some(fallback) = rest.strip_prefix('|') {
        if is_field_path(fallback) {
            Modifier::Fallback(Fallback::Field(normalize_property_path(fallback)))
        } else {
            Modifier::Fallback(Fallback::Literal(fallback.to_string()))
        }
    } else {
        return Err(RuleError::Template(format!(
            "unrecognized expression {{{inner}}}"
        )));
    };

    Ok(Expr { path, modifier })
}

fn parse_format(spec: &str) -> Result<Format, RuleError> {
    match spec {
        "upper" | "uppercase" => Ok(Format::Upper),
        "lower" | "lowercase" => Ok(Format::Lower),
        _ => {
            if let Some(digits) = spec.strip_prefix("pad") {
                let width: usize = digits
                    .parse()
                    .map_err(|_| RuleError::Template(format!("bad pad width: {spec}")))?;
                Ok(Format::Pad(width))
            } else {
                Err(RuleError::Template(format!("unknown format: {spec}")))
            }
        }
    }
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/')
}

/// A field path: dot/slash-separated identifiers, each starting with a
/// letter or underscore. Fallback text not matching this is a literal.
fn is_field_path(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    s.split(['.', '/']).all(|segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    })
}
