use crate::{
    clause::{Clause, count_placeholders, parse_fragment},
    error::{Error, Result},
    lex::{Lexer, TokenType, tokenize},
    value::Value,
};

/// A condition template and the values bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub template: String,
    pub values: Vec<Value>,
}

impl Condition {
    pub fn new(template: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            template: template.into(),
            values,
        }
    }

    /// Builds a condition from the array form `["a = ? AND b = ?", 1, 2]`:
    ///  the first element is the template, the rest are the bound values.
    pub fn from_array(mut items: Vec<Value>) -> Result<Self> {
        if items.is_empty() {
            return Err(Error::MalformedClause(String::new()));
        }
        match items.remove(0) {
            Value::Str(template) => Ok(Self::new(template, items)),
            other => Err(Error::MalformedClause(format!("{other:?}"))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.template.trim().is_empty()
    }

    pub fn parse(&self) -> Result<Option<LogicalNode>> {
        parse(&self.template, &self.values)
    }
}

/// Builds a [Condition] from a template and any values convertible into
///  [Value]: `condition!("num > ? AND text like ?", 5, "%foo%")`
#[macro_export]
macro_rules! condition {
    ($template:expr $(, $value:expr)* $(,)?) => {
        $crate::parser::Condition::new(
            $template,
            vec![$($crate::value::Value::from($value)),*],
        )
    };
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogicalNode {
    Leaf(Clause),
    And(Vec<LogicalNode>),
    Or(Vec<LogicalNode>),
}

impl LogicalNode {
    pub fn leaf_count(&self) -> usize {
        match self {
            LogicalNode::Leaf(_) => 1,
            LogicalNode::And(children) | LogicalNode::Or(children) => {
                children.iter().map(LogicalNode::leaf_count).sum()
            }
        }
    }

    /// Visits the leaves left to right, the same order placeholders were bound in.
    pub fn leaves(&self) -> Vec<&Clause> {
        fn walk<'a>(node: &'a LogicalNode, out: &mut Vec<&'a Clause>) {
            match node {
                LogicalNode::Leaf(clause) => out.push(clause),
                LogicalNode::And(children) | LogicalNode::Or(children) => {
                    children.iter().for_each(|c| walk(c, out))
                }
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }
}

/// Deepest parenthesis nesting accepted. Translation and evaluation recurse
///  once per level, so this bounds their stack use too.
pub const MAX_NESTING: usize = 64;

/// Tokens with every fragment already resolved to a clause.
enum Item {
    Open(usize),
    Close(usize),
    And,
    Or,
    Leaf(Clause),
}

/// Parses a template and binds `values` to its placeholders left to right.
/// An empty template means "no filter" and yields `None`.
pub fn parse(template: &str, values: &[Value]) -> Result<Option<LogicalNode>> {
    let tokens = tokenize(template)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    let lexer = Lexer::new(template);

    let placeholders: usize = tokens
        .iter()
        .filter(|t| t.ty == TokenType::Fragment)
        .map(|t| count_placeholders(lexer.source_of(t)))
        .sum();
    if placeholders != values.len() {
        return Err(Error::PlaceholderMismatch {
            placeholders,
            values: values.len(),
        });
    }

    // First pass: resolve fragments, consuming values as placeholders appear
    let mut cursor = values.iter();
    let items = tokens
        .iter()
        .map(|tok| {
            Ok(match tok.ty {
                TokenType::ParenLeft => Item::Open(tok.start),
                TokenType::ParenRight => Item::Close(tok.start),
                TokenType::And => Item::And,
                TokenType::Or => Item::Or,
                TokenType::Fragment => {
                    Item::Leaf(parse_fragment(lexer.source_of(tok), &mut cursor)?)
                }
            })
        })
        .collect::<Result<Vec<_>>>()?;

    // Second pass: rebuild the nesting
    let mut items = items.into_iter();
    let root = parse_group(&mut items, None, 0, template)?;
    Ok(Some(root))
}

/// Collects one nesting level. `open` is the position of the parenthesis that
///  opened this level, `None` at the top, and `depth` counts the levels above.
///  Returns when the matching `)` (or the end of input at the top level) is
///  reached.
fn parse_group(
    items: &mut impl Iterator<Item = Item>,
    open: Option<usize>,
    depth: usize,
    template: &str,
) -> Result<LogicalNode> {
    let mut children = Vec::new();
    let mut saw_and = false;
    let mut saw_or = false;

    loop {
        match (items.next(), open) {
            (None, None) => break,
            (None, Some(position)) => return Err(Error::UnbalancedParens { position }),
            (Some(Item::Close(position)), None) => {
                return Err(Error::UnbalancedParens { position });
            }
            (Some(Item::Close(_)), Some(_)) => break,
            (Some(Item::Open(_)), _) if depth == MAX_NESTING => {
                return Err(Error::NestingTooDeep { limit: MAX_NESTING });
            }
            (Some(Item::Open(position)), _) => {
                children.push(parse_group(items, Some(position), depth + 1, template)?)
            }
            (Some(Item::And), _) => saw_and = true,
            (Some(Item::Or), _) => saw_or = true,
            (Some(Item::Leaf(clause)), _) => children.push(LogicalNode::Leaf(clause)),
        }
    }

    match (saw_and, saw_or) {
        _ if children.is_empty() => Err(Error::EmptyGroup),
        (true, true) => {
            // Without parentheses there is no way to tell what was meant; the
            //  whole level becomes a conjunction.
            tracing::warn!(
                template,
                "AND and OR mixed on one level without parentheses, treating the level as AND"
            );
            Ok(LogicalNode::And(children))
        }
        (true, false) => Ok(LogicalNode::And(children)),
        (false, true) => Ok(LogicalNode::Or(children)),
        (false, false) if children.len() == 1 => Ok(children.remove(0)),
        (false, false) => Err(Error::MalformedClause(template.to_string())),
    }
}
