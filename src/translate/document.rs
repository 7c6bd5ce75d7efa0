use serde_json::{Map, Value as Json, json};

use crate::{
    clause::{Clause, Operand, RelationalOp},
    error::{Error, Result},
    options::{Direction, QueryOptions, SortOrder, TranslatedOptions},
    parser::{Condition, LogicalNode},
    translate::FilterTranslator,
    value::Value,
};

/// Builds the nested `$and`/`$or` query documents a document database takes.
pub struct DocumentTranslator;

impl FilterTranslator for DocumentTranslator {
    type Output = Json;

    fn translate_filter(&self, condition: &Condition) -> Result<Option<Json>> {
        match condition.parse()? {
            Some(root) => translate_node(&root).map(Some),
            None => Ok(None),
        }
    }

    fn translate_options(&self, options: &QueryOptions) -> Result<TranslatedOptions> {
        let keys = options.order_keys()?;
        let order = (!keys.is_empty()).then(|| {
            SortOrder::Document(
                keys.into_iter()
                    .map(|(field, direction)| {
                        let dir = match direction {
                            Direction::Asc => 1,
                            Direction::Desc => -1,
                        };
                        (field, Json::from(dir))
                    })
                    .collect(),
            )
        });
        Ok(TranslatedOptions::from_options(options, order))
    }
}

fn translate_node(node: &LogicalNode) -> Result<Json> {
    let (key, children) = match node {
        LogicalNode::Leaf(clause) => return translate_clause(clause),
        LogicalNode::And(children) => ("$and", children),
        LogicalNode::Or(children) => ("$or", children),
    };
    let translated = children
        .iter()
        .map(translate_node)
        .collect::<Result<Vec<_>>>()?;
    Ok(single(key, Json::Array(translated)))
}

fn operator_key(op: RelationalOp) -> &'static str {
    match op {
        RelationalOp::Eq => "$eq",
        RelationalOp::Ne => "$ne",
        RelationalOp::Lt => "$lt",
        RelationalOp::Le => "$lte",
        RelationalOp::Gt => "$gt",
        RelationalOp::Ge => "$gte",
        // patterns never reach the operator table
        RelationalOp::Like => "$regex",
    }
}

fn single(field: &str, value: Json) -> Json {
    let mut doc = Map::with_capacity(1);
    doc.insert(field.to_string(), value);
    Json::Object(doc)
}

fn translate_clause(clause: &Clause) -> Result<Json> {
    match clause {
        Clause::Compare {
            field,
            operand: Operand::Pattern(pattern),
            ..
        } => Ok(single(field, json!({ "$regex": pattern.regex_source() }))),
        Clause::Compare {
            field,
            op,
            operand: Operand::Value(value),
            ..
        } => {
            if !value.is_scalar() {
                return Err(Error::TypeMismatch {
                    field: field.clone(),
                    found: value.type_name(),
                });
            }
            let condition = match (op, value) {
                // `{field: null}` would also match records without the field
                (RelationalOp::Eq, Value::Null) => json!({ "$eq": null, "$exists": true }),
                (RelationalOp::Eq, value) => Json::from(value),
                (op, value) => {
                    let coerced = value.clone().coerce_numeric();
                    let mut doc = Map::with_capacity(2);
                    doc.insert(operator_key(*op).to_string(), Json::from(&coerced));
                    // a null operand matches missing fields too
                    if *op == RelationalOp::Ne || coerced == Value::Null {
                        doc.insert("$exists".to_string(), Json::Bool(true));
                    }
                    Json::Object(doc)
                }
            };
            Ok(single(field, condition))
        }
        Clause::Fields { left, op, right } => {
            let mut comparison = Map::with_capacity(1);
            comparison.insert(
                operator_key(*op).to_string(),
                json!([format!("${left}"), format!("${right}")]),
            );
            Ok(json!({
                "$and": [
                    single(left, json!({ "$exists": true })),
                    single(right, json!({ "$exists": true })),
                    { "$expr": Json::Object(comparison) },
                ]
            }))
        }
        Clause::Bare(text) => Err(Error::UnsupportedClause(text.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition;

    fn translate(cond: Condition) -> Json {
        DocumentTranslator
            .translate_filter(&cond)
            .expect("valid condition")
            .expect("non-empty condition")
    }

    #[test]
    fn equality() {
        assert_eq!(translate(condition!("name = ?", "bob")), json!({"name": "bob"}));
        assert_eq!(translate(condition!("num == 3")), json!({"num": 3}));
        assert_eq!(
            translate(condition!("gone = null")),
            json!({"gone": {"$eq": null, "$exists": true}})
        );
    }

    #[test]
    fn relational_operators_coerce_numbers() {
        assert_eq!(translate(condition!("num > ?", "5")), json!({"num": {"$gt": 5}}));
        assert_eq!(translate(condition!("num >= ?", 2.5)), json!({"num": {"$gte": 2.5}}));
        assert_eq!(translate(condition!("num < ?", 1)), json!({"num": {"$lt": 1}}));
        assert_eq!(translate(condition!("num <= ?", 1)), json!({"num": {"$lte": 1}}));
        assert_eq!(
            translate(condition!("num != ?", "null")),
            json!({"num": {"$ne": null, "$exists": true}})
        );
        assert_eq!(
            translate(condition!("name <> ?", "bob")),
            json!({"name": {"$ne": "bob", "$exists": true}})
        );
    }

    #[test]
    fn null_operand_requires_presence() {
        assert_eq!(
            translate(condition!("num >= ?", "null")),
            json!({"num": {"$gte": null, "$exists": true}})
        );
        assert_eq!(
            translate(condition!("num <= ?", Value::Null)),
            json!({"num": {"$lte": null, "$exists": true}})
        );
        assert_eq!(translate(condition!("num < ?", "nil")), json!({"num": {"$lt": "nil"}}));
    }

    #[test]
    fn logical_composition() {
        assert_eq!(
            translate(condition!("(a = ? OR b = ?) AND c = ?", 1, 2, 3)),
            json!({"$and": [{"$or": [{"a": 1}, {"b": 2}]}, {"c": 3}]})
        );
    }

    #[test]
    fn patterns() {
        assert_eq!(
            translate(condition!("text like ?", "%foo%")),
            json!({"text": {"$regex": "foo"}})
        );
        assert_eq!(
            translate(condition!("text like ?", "foo%")),
            json!({"text": {"$regex": "^foo"}})
        );
        assert_eq!(
            translate(condition!("text like ?", "%f.o")),
            json!({"text": {"$regex": "f\\.o$"}})
        );
    }

    #[test]
    fn field_to_field() {
        assert_eq!(
            translate(condition!("num1 > num2")),
            json!({"$and": [
                {"num1": {"$exists": true}},
                {"num2": {"$exists": true}},
                {"$expr": {"$gt": ["$num1", "$num2"]}}
            ]})
        );
    }

    #[test]
    fn rejects_what_it_cannot_express() {
        assert_eq!(
            DocumentTranslator.translate_filter(&condition!("active")),
            Err(Error::UnsupportedClause("active".into()))
        );
        assert_eq!(
            DocumentTranslator.translate_filter(&condition!("tags = ?", vec![Value::Int(1)])),
            Err(Error::TypeMismatch {
                field: "tags".into(),
                found: "list"
            })
        );
    }

    #[test]
    fn options() {
        let options = QueryOptions::new().with_order("x, y desc").with_offset(20);
        let translated = DocumentTranslator.translate_options(&options).unwrap();
        let Some(SortOrder::Document(order)) = &translated.order else {
            panic!("Expected a document order, got {:?}", translated.order)
        };
        let keys: Vec<_> = order.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
        assert_eq!(keys, vec![("x", json!(1)), ("y", json!(-1))]);
        assert_eq!(translated.offset, Some(20));
        assert_eq!(translated.limit, None);
    }
}
