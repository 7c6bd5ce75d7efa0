use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
};

use crate::{
    clause::{Clause, Operand, RelationalOp, is_identifier},
    parser::LogicalNode,
    value::Value,
};

/// Anything a filter can be evaluated against: a row, a document, a JSON
///  object. `None` means the field is absent, which is not the same as a
///  field holding [Value::Null].
pub trait Record {
    fn field(&self, name: &str) -> Option<Value>;
}

impl Record for BTreeMap<String, Value> {
    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Record for HashMap<String, Value> {
    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Record for serde_json::Map<String, serde_json::Value> {
    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned().map(Value::from)
    }
}

impl LogicalNode {
    pub fn evaluate(&self, record: &dyn Record) -> bool {
        match self {
            LogicalNode::Leaf(clause) => clause.evaluate(record),
            LogicalNode::And(children) => children.iter().all(|c| c.evaluate(record)),
            LogicalNode::Or(children) => children.iter().any(|c| c.evaluate(record)),
        }
    }
}

impl Clause {
    /// A clause over a missing field is simply false, never an error.
    pub fn evaluate(&self, record: &dyn Record) -> bool {
        match self {
            Clause::Compare {
                field, op, operand, ..
            } => {
                let Some(value) = record.field(field) else {
                    return false;
                };
                match operand {
                    Operand::Value(rhs) => compare(*op, &value, rhs),
                    Operand::Pattern(pattern) => {
                        let haystack = match value {
                            Value::Str(s) => s,
                            Value::Int(i) => i.to_string(),
                            Value::Float(f) => f.to_string(),
                            _ => return false,
                        };
                        pattern.to_regex().is_ok_and(|re| re.is_match(&haystack))
                    }
                }
            }
            Clause::Fields { left, op, right } => {
                match (record.field(left), record.field(right)) {
                    (Some(l), Some(r)) => compare(*op, &l, &r),
                    _ => false,
                }
            }
            // A bare field name reads as "field is set and truthy"
            Clause::Bare(text) if is_identifier(text) => {
                record.field(text).is_some_and(|v| truthy(&v))
            }
            Clause::Bare(_) => false,
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Str(s) => !s.is_empty() && s != "0",
        Value::List(items) => !items.is_empty(),
        Value::Map(map) => !map.is_empty(),
    }
}

/// Orders two values when they are comparable. Numbers (and numeric-looking
///  strings) compare numerically with each other.
fn order(l: &Value, r: &Value) -> Option<Ordering> {
    match (l, r) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => match (l, r) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => None,
            },
        },
    }
}

fn compare(op: RelationalOp, l: &Value, r: &Value) -> bool {
    let ord = order(l, r);
    match op {
        RelationalOp::Eq => ord == Some(Ordering::Equal) || (ord.is_none() && l == r),
        RelationalOp::Ne => !(ord == Some(Ordering::Equal) || (ord.is_none() && l == r)),
        RelationalOp::Lt => ord == Some(Ordering::Less),
        RelationalOp::Le => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        RelationalOp::Gt => ord == Some(Ordering::Greater),
        RelationalOp::Ge => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        RelationalOp::Like => false,
    }
}
