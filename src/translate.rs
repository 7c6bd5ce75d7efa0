use std::{fmt::Display, str::FromStr};

use crate::{
    error::{Error, Result},
    options::{QueryOptions, TranslatedOptions},
    parser::Condition,
    schema::FieldSchema,
    value::Value,
};

pub mod document;
pub mod flat_file;
pub mod relational;

/// The storage engines a filter can be translated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Flat-file document store: filters are boolean expression strings.
    FlatFile,
    /// SQL engine: the condition grammar is already native.
    Relational,
    /// Document database: filters are `$and`/`$or`/operator documents.
    Document,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jig" | "flat_file" | "flatfile" => Ok(Backend::FlatFile),
            "sql" | "relational" => Ok(Backend::Relational),
            "mongo" | "document" => Ok(Backend::Document),
            _ => Err(Error::UnsupportedBackend(s.to_string())),
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Backend::FlatFile => "flat_file",
            Backend::Relational => "relational",
            Backend::Document => "document",
        })
    }
}

/// A filter in the form one backend executes.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslatedFilter {
    /// An expression such as `(isset(@num) && @num > ?)` and the values for
    ///  its placeholders, in order.
    FlatFile {
        expression: String,
        values: Vec<Value>,
    },
    /// The condition's own template and values, untouched.
    Relational {
        template: String,
        values: Vec<Value>,
    },
    Document(serde_json::Value),
}

/// Implemented once per backend. A translator only sees non-empty
///  conditions: "no filter" is handled by the dispatcher.
///
/// ```rust
/// # use filter_expr::{condition, translate::{FilterTranslator, flat_file::FlatFileTranslator}};
/// let filter = FlatFileTranslator
///     .translate_filter(&condition!("num > ?", 5))
///     .unwrap()
///     .unwrap();
/// assert_eq!(filter.0, "(isset(@num) && @num > ?)");
/// ```
pub trait FilterTranslator {
    type Output;

    /// Translates a condition. `Ok(None)` means the template was empty and
    ///  every record matches.
    fn translate_filter(&self, condition: &Condition) -> Result<Option<Self::Output>>;

    /// Translates the query options (sort order) for the same backend.
    fn translate_options(&self, options: &QueryOptions) -> Result<TranslatedOptions>;
}

/// Routes filters and options through the pipeline of one backend.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'a> {
    backend: Backend,
    schema: &'a FieldSchema,
}

impl<'a> Dispatcher<'a> {
    pub fn new(backend: Backend, schema: &'a FieldSchema) -> Self {
        Self { backend, schema }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn prepare_filter(&self, condition: Option<&Condition>) -> Result<Option<TranslatedFilter>> {
        let Some(condition) = condition.filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        let filter = match self.backend {
            Backend::FlatFile => flat_file::FlatFileTranslator
                .translate_filter(condition)?
                .map(|(expression, values)| TranslatedFilter::FlatFile { expression, values }),
            Backend::Relational => relational::RelationalTranslator::new(self.schema)
                .translate_filter(condition)?
                .map(|(template, values)| TranslatedFilter::Relational { template, values }),
            Backend::Document => document::DocumentTranslator
                .translate_filter(condition)?
                .map(TranslatedFilter::Document),
        };
        tracing::debug!(
            backend = %self.backend,
            template = %condition.template,
            filter = ?filter,
            "translated filter"
        );
        Ok(filter)
    }

    pub fn prepare_options(&self, options: Option<&QueryOptions>) -> Result<Option<TranslatedOptions>> {
        let Some(options) = options.filter(|o| !o.is_empty()) else {
            return Ok(None);
        };
        let translated = match self.backend {
            Backend::FlatFile => flat_file::FlatFileTranslator.translate_options(options)?,
            Backend::Relational => {
                relational::RelationalTranslator::new(self.schema).translate_options(options)?
            }
            Backend::Document => document::DocumentTranslator.translate_options(options)?,
        };
        Ok(Some(translated))
    }
}

/// Translates a filter for a backend without any field configuration. Bound
///  lists and maps are rejected on [Backend::Relational], which needs a schema
///  to encode them.
pub fn prepare_filter(backend: Backend, condition: Option<&Condition>) -> Result<Option<TranslatedFilter>> {
    Dispatcher::new(backend, &FieldSchema::new()).prepare_filter(condition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition;

    #[test]
    fn backend_from_str() {
        assert_eq!("Jig".parse::<Backend>(), Ok(Backend::FlatFile));
        assert_eq!("SQL".parse::<Backend>(), Ok(Backend::Relational));
        assert_eq!("mongo".parse::<Backend>(), Ok(Backend::Document));
        assert_eq!("document".parse::<Backend>(), Ok(Backend::Document));
        assert_eq!(
            "redis".parse::<Backend>(),
            Err(Error::UnsupportedBackend("redis".into()))
        );
        assert_eq!(Backend::FlatFile.to_string(), "flat_file");
    }

    #[test]
    fn no_filter() {
        let schema = FieldSchema::new();
        for backend in [Backend::FlatFile, Backend::Relational, Backend::Document] {
            let dispatcher = Dispatcher::new(backend, &schema);
            assert_eq!(dispatcher.prepare_filter(None), Ok(None));
            assert_eq!(dispatcher.prepare_filter(Some(&condition!(""))), Ok(None));
            assert_eq!(dispatcher.prepare_filter(Some(&condition!("  \t"))), Ok(None));
            assert_eq!(dispatcher.prepare_options(None), Ok(None));
            assert_eq!(
                dispatcher.prepare_options(Some(&QueryOptions::default())),
                Ok(None)
            );
        }
    }

    #[test]
    fn dispatches_per_backend() {
        let schema = FieldSchema::new();
        let cond = condition!("(a = ? OR b = ?) AND c = ?", 1, 2, 3);

        let filter = Dispatcher::new(Backend::FlatFile, &schema)
            .prepare_filter(Some(&cond))
            .unwrap();
        assert_eq!(
            filter,
            Some(TranslatedFilter::FlatFile {
                expression: "((isset(@a) && @a == ?) || (isset(@b) && @b == ?)) && (isset(@c) && @c == ?)"
                    .into(),
                values: vec![1.into(), 2.into(), 3.into()],
            })
        );

        let filter = Dispatcher::new(Backend::Document, &schema)
            .prepare_filter(Some(&cond))
            .unwrap();
        assert_eq!(
            filter,
            Some(TranslatedFilter::Document(serde_json::json!({
                "$and": [{"$or": [{"a": 1}, {"b": 2}]}, {"c": 3}]
            })))
        );

        let filter = Dispatcher::new(Backend::Relational, &schema)
            .prepare_filter(Some(&cond))
            .unwrap();
        assert_eq!(
            filter,
            Some(TranslatedFilter::Relational {
                template: cond.template.clone(),
                values: cond.values.clone(),
            })
        );
    }

    #[test]
    fn without_schema() {
        let filter = prepare_filter(Backend::FlatFile, Some(&condition!("num > ?", 5))).unwrap();
        assert!(matches!(filter, Some(TranslatedFilter::FlatFile { .. })));
        assert_eq!(
            prepare_filter(
                Backend::Relational,
                Some(&condition!("tags = ?", vec![Value::Int(1)]))
            ),
            Err(Error::MissingFieldConfiguration("tags".into()))
        );
    }

    #[test]
    fn malformed_input_fails_everywhere() {
        let schema = FieldSchema::new();
        let cond = condition!("(a = ? AND b = ?", 1, 2);
        for backend in [Backend::FlatFile, Backend::Relational, Backend::Document] {
            assert_eq!(
                Dispatcher::new(backend, &schema).prepare_filter(Some(&cond)),
                Err(Error::UnbalancedParens { position: 0 })
            );
        }
    }

    #[test]
    fn deep_nesting_fails_everywhere() {
        let schema = FieldSchema::new();
        let template = format!("{}a = ?{}", "(".repeat(10_000), ")".repeat(10_000));
        let cond = Condition::new(template, vec![Value::Int(1)]);
        for backend in [Backend::FlatFile, Backend::Relational, Backend::Document] {
            assert_eq!(
                Dispatcher::new(backend, &schema).prepare_filter(Some(&cond)),
                Err(Error::NestingTooDeep {
                    limit: crate::parser::MAX_NESTING
                })
            );
        }
    }
}
