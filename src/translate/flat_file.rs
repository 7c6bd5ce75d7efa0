use std::{borrow::Cow, sync::LazyLock};

use regex::{Captures, Regex};

use crate::{
    clause::{Clause, Operand, Pattern, RelationalOp, Source},
    error::Result,
    options::{Direction, QueryOptions, SortOrder, TranslatedOptions},
    parser::{Condition, LogicalNode},
    translate::FilterTranslator,
    value::Value,
};

/// Renders filters as the boolean expressions the flat-file store evaluates
///  per record, e.g. `(isset(@num) && @num > ?)`. Every field is guarded with
///  `isset` so records lacking the field never match.
pub struct FlatFileTranslator;

impl FilterTranslator for FlatFileTranslator {
    type Output = (String, Vec<Value>);

    fn translate_filter(&self, condition: &Condition) -> Result<Option<Self::Output>> {
        let Some(root) = condition.parse()? else {
            return Ok(None);
        };
        let mut expression = String::new();
        let mut values = Vec::with_capacity(condition.values.len());
        render_node(&root, &mut expression, &mut values, false);
        Ok(Some((expression, values)))
    }

    fn translate_options(&self, options: &QueryOptions) -> Result<TranslatedOptions> {
        let keys = options.order_keys()?;
        let order = (!keys.is_empty()).then(|| {
            let parts: Vec<_> = keys
                .iter()
                .map(|(field, direction)| match direction {
                    Direction::Asc => format!("{field} SORT_ASC"),
                    Direction::Desc => format!("{field} SORT_DESC"),
                })
                .collect();
            SortOrder::Expression(parts.join(", "))
        });
        Ok(TranslatedOptions::from_options(options, order))
    }
}

fn render_node(node: &LogicalNode, out: &mut String, values: &mut Vec<Value>, nested: bool) {
    let (children, joiner) = match node {
        LogicalNode::Leaf(clause) => return render_clause(clause, out, values),
        LogicalNode::And(children) => (children, " && "),
        LogicalNode::Or(children) => (children, " || "),
    };
    if nested {
        out.push('(');
    }
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            out.push_str(joiner);
        }
        render_node(child, out, values, true);
    }
    if nested {
        out.push(')');
    }
}

fn operator(op: RelationalOp) -> &'static str {
    match op {
        RelationalOp::Eq => "==",
        RelationalOp::Ne => "!=",
        other => other.symbol(),
    }
}

fn render_clause(clause: &Clause, out: &mut String, values: &mut Vec<Value>) {
    match clause {
        Clause::Compare {
            field,
            op,
            operand: Operand::Value(value),
            source,
        } => {
            let rhs = match source {
                Source::Placeholder => {
                    values.push(value.clone());
                    "?".to_string()
                }
                Source::Inline => literal(value),
            };
            out.push_str(&format!("(isset(@{field}) && @{field} {} {rhs})", operator(*op)));
        }
        Clause::Compare {
            field,
            operand: Operand::Pattern(pattern),
            source,
            ..
        } => {
            let regex = delimited_regex(pattern);
            let arg = match source {
                Source::Placeholder => {
                    values.push(Value::Str(regex));
                    "?".to_string()
                }
                Source::Inline => format!("'{}'", escape_single_quotes(&regex)),
            };
            out.push_str(&format!("(isset(@{field}) && preg_match({arg},@{field}))"));
        }
        Clause::Fields { left, op, right } => {
            out.push_str(&format!(
                "(isset(@{left}) && isset(@{right}) && (@{left} {} @{right}))",
                operator(*op)
            ));
        }
        Clause::Bare(text) => out.push_str(&prefix_fields(text)),
    }
}

/// `/^foo/` style regex for `preg_match`. The delimiter itself has to be
///  escaped inside the pattern.
pub fn delimited_regex(pattern: &Pattern) -> String {
    format!("/{}/", pattern.regex_source().replace('/', "\\/"))
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Str(s) => format!("'{}'", escape_single_quotes(s)),
        // inline literals are always scalars
        Value::List(_) | Value::Map(_) => "NULL".to_string(),
    }
}

fn escape_single_quotes(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\'' || c == '\\' {
            res.push('\\');
        }
        res.push(c);
    }
    res
}

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_]\w*)\b").expect("valid regex"));

/// Words the expression language reads as literals rather than fields.
const LITERAL_WORDS: [&str; 3] = ["null", "true", "false"];

/// Gives every identifier in a hand-written fragment the `@` sigil:
///  `active` becomes `@active`. Quoted literals are copied as they are.
fn prefix_fields(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + 4);
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let term @ (b'\'' | b'"') = bytes[i] {
            out.push_str(&prefix_words(&text[start..i]));
            // an unterminated quote runs to the end
            let end = bytes[i + 1..]
                .iter()
                .position(|&b| b == term)
                .map_or(bytes.len(), |p| i + p + 2);
            out.push_str(&text[i..end]);
            start = end;
            i = end;
            continue;
        }
        i += 1;
    }
    out.push_str(&prefix_words(&text[start..]));
    out
}

fn prefix_words(text: &str) -> Cow<'_, str> {
    IDENTIFIER.replace_all(text, |caps: &Captures| {
        let word = &caps[1];
        if LITERAL_WORDS.iter().any(|w| word.eq_ignore_ascii_case(w)) {
            word.to_string()
        } else {
            format!("@{word}")
        }
    })
}
