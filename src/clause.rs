use std::fmt::{Display, Formatter};

use crate::{
    error::{Error, Result},
    lex::is_word_byte,
    value::{Value, parse_number},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationalOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl RelationalOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            RelationalOp::Eq => "=",
            RelationalOp::Ne => "!=",
            RelationalOp::Lt => "<",
            RelationalOp::Le => "<=",
            RelationalOp::Gt => ">",
            RelationalOp::Ge => ">=",
            RelationalOp::Like => "like",
        }
    }
}

// Multi-character operators share a prefix with the single-character ones, so
//  at any position the longer ones have to be tried first or `<=` comes out
//  as `<` followed by garbage.
const OPERATORS: [(&[u8], RelationalOp); 9] = [
    (b"<=", RelationalOp::Le),
    (b">=", RelationalOp::Ge),
    (b"<>", RelationalOp::Ne),
    (b"<", RelationalOp::Lt),
    (b">", RelationalOp::Gt),
    (b"!=", RelationalOp::Ne),
    (b"==", RelationalOp::Eq),
    (b"=", RelationalOp::Eq),
    (b"like", RelationalOp::Like),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// `%x%`
    Contains,
    /// `x%`
    StartsWith,
    /// `%x`
    EndsWith,
    /// no wildcard at all
    Exact,
}

/// A `like` operand with its SQL wildcards resolved. Only a `%` at either end
///  is a wildcard; anything in between is matched literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub needle: String,
    pub anchor: Anchor,
}

impl Pattern {
    pub fn from_like(s: &str) -> Self {
        let (needle, anchor) = match (s.strip_prefix('%'), s.strip_suffix('%')) {
            _ if s == "%" => ("", Anchor::Contains),
            (Some(rest), Some(_)) => (&rest[..rest.len() - 1], Anchor::Contains),
            (None, Some(rest)) => (rest, Anchor::StartsWith),
            (Some(rest), None) => (rest, Anchor::EndsWith),
            (None, None) => (s, Anchor::Exact),
        };
        Self {
            needle: needle.to_string(),
            anchor,
        }
    }

    fn from_value(field: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Str(s) => Ok(Self::from_like(s)),
            Value::Int(i) => Ok(Self::from_like(&i.to_string())),
            Value::Float(f) => Ok(Self::from_like(&f.to_string())),
            other => Err(Error::TypeMismatch {
                field: field.to_string(),
                found: other.type_name(),
            }),
        }
    }

    /// Regular expression source with the needle escaped and the anchors
    ///  applied, e.g. `^foo` for `foo%`.
    pub fn regex_source(&self) -> String {
        let needle = regex::escape(&self.needle);
        match self.anchor {
            Anchor::Contains => needle,
            Anchor::StartsWith => format!("^{needle}"),
            Anchor::EndsWith => format!("{needle}$"),
            Anchor::Exact => format!("^{needle}$"),
        }
    }

    pub fn to_regex(&self) -> std::result::Result<regex::Regex, regex::Error> {
        regex::Regex::new(&self.regex_source())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Pattern(Pattern),
}

/// Where a comparison's operand came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Placeholder,
    Inline,
}

/// A single relational comparison, the leaf of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Compare {
        field: String,
        op: RelationalOp,
        operand: Operand,
        source: Source,
    },
    /// `num1 > num2`: no bound value, both sides are fields.
    Fields {
        left: String,
        op: RelationalOp,
        right: String,
    },
    /// A fragment without any operator, handed to the backend as written.
    Bare(String),
}

impl Clause {
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Clause::Compare { field, .. } => vec![field.as_str()],
            Clause::Fields { left, right, .. } => vec![left.as_str(), right.as_str()],
            Clause::Bare(_) => vec![],
        }
    }
}

impl Display for Clause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Clause::Compare {
                field,
                op,
                operand,
                source,
            } => {
                write!(f, "{field} {} ", op.symbol())?;
                match (source, operand) {
                    (Source::Placeholder, _) => write!(f, "?"),
                    (Source::Inline, Operand::Value(v)) => write!(f, "{v:?}"),
                    (Source::Inline, Operand::Pattern(p)) => write!(f, "{p:?}"),
                }
            }
            Clause::Fields { left, op, right } => write!(f, "{left} {} {right}", op.symbol()),
            Clause::Bare(text) => write!(f, "{text}"),
        }
    }
}

/// Finds the leftmost relational operator outside of quoted literals.
/// Returns the byte range of the operator and the operator itself.
pub fn find_operator(fragment: &str) -> Option<(usize, usize, RelationalOp)> {
    let bytes = fragment.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if let term @ (b'\'' | b'"') = bytes[i] {
            i += 1;
            while i < bytes.len() && bytes[i] != term {
                i += 1;
            }
            i += 1;
            continue;
        }
        for (text, op) in OPERATORS {
            let end = i + text.len();
            if end > bytes.len() || !bytes[i..end].eq_ignore_ascii_case(text) {
                continue;
            }
            // `like` is a word: `likes > ?` compares the `likes` field
            if op == RelationalOp::Like
                && ((i > 0 && is_word_byte(bytes[i - 1]))
                    || bytes.get(end).copied().is_some_and(is_word_byte))
            {
                continue;
            }
            return Some((i, end, op));
        }
        i += 1;
    }
    None
}

/// Counts `?` placeholders outside of quoted literals.
pub fn count_placeholders(fragment: &str) -> usize {
    let mut count = 0;
    let mut quote = None;
    for b in fragment.bytes() {
        match (quote, b) {
            (None, b'\'' | b'"') => quote = Some(b),
            (None, b'?') => count += 1,
            (Some(term), b) if b == term => quote = None,
            _ => (),
        }
    }
    count
}

pub fn is_identifier(s: &str) -> bool {
    let bytes = s.as_bytes();
    !bytes.is_empty() && !bytes[0].is_ascii_digit() && bytes.iter().copied().all(is_word_byte)
}

enum RightSide {
    Placeholder,
    Literal(Value),
    Field(String),
}

fn parse_right_side(fragment: &str, right: &str) -> Result<RightSide> {
    let malformed = || Error::MalformedClause(fragment.to_string());
    match right.as_bytes() {
        b"?" => Ok(RightSide::Placeholder),
        [] => Err(malformed()),
        [q @ (b'\'' | b'"'), .., last] if q == last && right.len() >= 2 => {
            Ok(RightSide::Literal(Value::Str(right[1..right.len() - 1].to_string())))
        }
        _ if right.eq_ignore_ascii_case("null") => Ok(RightSide::Literal(Value::Null)),
        _ if right.eq_ignore_ascii_case("true") => Ok(RightSide::Literal(Value::Bool(true))),
        _ if right.eq_ignore_ascii_case("false") => Ok(RightSide::Literal(Value::Bool(false))),
        _ => {
            if let Some(number) = parse_number(right) {
                Ok(RightSide::Literal(number))
            } else if is_identifier(right) {
                Ok(RightSide::Field(right.to_string()))
            } else {
                Err(malformed())
            }
        }
    }
}

/// Resolves one raw fragment into a [Clause]. If the fragment has a
///  placeholder, the next value is taken from `values`.
pub fn parse_fragment<'v>(
    fragment: &str,
    values: &mut impl Iterator<Item = &'v Value>,
) -> Result<Clause> {
    let fragment = fragment.trim();
    let malformed = || Error::MalformedClause(fragment.to_string());

    let Some((start, end, op)) = find_operator(fragment) else {
        if count_placeholders(fragment) > 0 {
            return Err(malformed());
        }
        return Ok(Clause::Bare(fragment.to_string()));
    };

    let field = fragment[..start].trim();
    if !is_identifier(field) {
        return Err(malformed());
    }

    let (value, source) = match parse_right_side(fragment, fragment[end..].trim())? {
        RightSide::Placeholder => (values.next().cloned().ok_or_else(malformed)?, Source::Placeholder),
        RightSide::Literal(v) => (v, Source::Inline),
        RightSide::Field(right) if op != RelationalOp::Like => {
            return Ok(Clause::Fields {
                left: field.to_string(),
                op,
                right,
            });
        }
        RightSide::Field(_) => return Err(malformed()),
    };

    let operand = if op == RelationalOp::Like {
        Operand::Pattern(Pattern::from_value(field, &value)?)
    } else {
        Operand::Value(value)
    };

    Ok(Clause::Compare {
        field: field.to_string(),
        op,
        operand,
        source,
    })
}
