use std::collections::BTreeMap;

use crate::{
    codec::FieldCodecs,
    error::{Error, Result},
    options::{QueryOptions, TranslatedOptions},
    parser::Condition,
    schema::FieldSchema,
    translate::{Backend, Dispatcher, TranslatedFilter},
    value::Value,
};

/// One record as the engine stores it, column name to value.
pub type Row = BTreeMap<String, Value>;

/// The storage engine behind a [DataMapper]. It only ever sees filters and
///  options already translated for its backend, and rows already encoded.
pub trait MapperEngine {
    fn find(
        &mut self,
        filter: Option<&TranslatedFilter>,
        options: Option<&TranslatedOptions>,
    ) -> Result<Vec<Row>>;

    /// The first matching row, if any.
    fn load(
        &mut self,
        filter: Option<&TranslatedFilter>,
        options: Option<&TranslatedOptions>,
    ) -> Result<Option<Row>>;

    fn count(&mut self, filter: Option<&TranslatedFilter>) -> Result<u64>;

    /// Deletes every matching row and returns how many went.
    fn erase(&mut self, filter: Option<&TranslatedFilter>) -> Result<u64>;

    fn insert(&mut self, row: &Row) -> Result<()>;

    /// Writes back a row previously returned by `load`.
    fn update(&mut self, row: &Row) -> Result<()>;

    /// Moves the cursor opened by the last `load` by `offset` rows. `None`
    ///  once it runs off either end of the result set.
    fn skip(&mut self, offset: isize) -> Result<Option<Row>>;

    /// Moves the cursor to the first row of the last `load`.
    fn first(&mut self) -> Result<Option<Row>>;

    /// Moves the cursor to the last row of the last `load`.
    fn last(&mut self) -> Result<Option<Row>>;
}

/// Backend-neutral data mapper: conditions are written once in the SQL-like
///  grammar and translated for whatever engine is plugged in.
///
/// The mapper holds one record buffer. [DataMapper::load] fills it,
///  [DataMapper::set] and [DataMapper::get] work on it, and
///  [DataMapper::insert] or [DataMapper::update] write it back.
pub struct DataMapper<E: MapperEngine> {
    backend: Backend,
    schema: FieldSchema,
    engine: E,
    /// Configured defaults, already encoded for the backend.
    defaults: Row,
    current: Row,
    loaded: bool,
}

impl<E: MapperEngine> DataMapper<E> {
    /// Fails if a configured default cannot be stored on `backend`.
    pub fn new(backend: Backend, schema: FieldSchema, engine: E) -> Result<Self> {
        let codecs = FieldCodecs::new(&schema, backend);
        let defaults = schema
            .iter()
            .filter_map(|(field, conf)| Some((field, conf.nullable, conf.default.clone()?)))
            .map(|(field, nullable, default)| {
                if default == Value::Null && !nullable {
                    return Err(Error::TypeMismatch {
                        field: field.to_string(),
                        found: default.type_name(),
                    });
                }
                Ok((field.to_string(), codecs.encode_field(field, default)?))
            })
            .collect::<Result<Row>>()?;
        Ok(Self {
            backend,
            schema,
            engine,
            current: defaults.clone(),
            defaults,
            loaded: false,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(self.backend, &self.schema)
    }

    fn codecs(&self) -> FieldCodecs<'_> {
        FieldCodecs::new(&self.schema, self.backend)
    }

    /// Every record matching `filter`, with encoded fields decoded.
    pub fn find(
        &mut self,
        filter: Option<&Condition>,
        options: Option<&QueryOptions>,
    ) -> Result<Vec<Row>> {
        let filter = self.dispatcher().prepare_filter(filter)?;
        let options = self.dispatcher().prepare_options(options)?;
        let rows = self.engine.find(filter.as_ref(), options.as_ref())?;
        tracing::debug!(backend = %self.backend, rows = rows.len(), "find");
        let codecs = self.codecs();
        rows.into_iter().map(|row| codecs.decode_record(row)).collect()
    }

    /// Loads the first matching record into the buffer. Returns whether one
    ///  was found; if not, the buffer is reset to a fresh record.
    pub fn load(&mut self, filter: Option<&Condition>, options: Option<&QueryOptions>) -> Result<bool> {
        let filter = self.dispatcher().prepare_filter(filter)?;
        let options = self.dispatcher().prepare_options(options)?;
        let row = self.engine.load(filter.as_ref(), options.as_ref())?;
        Ok(self.position(row))
    }

    /// Moves `offset` records along the loaded result set. Leaving it resets
    ///  the buffer and returns false.
    pub fn skip(&mut self, offset: isize) -> Result<bool> {
        let row = self.engine.skip(offset)?;
        Ok(self.position(row))
    }

    pub fn first(&mut self) -> Result<bool> {
        let row = self.engine.first()?;
        Ok(self.position(row))
    }

    pub fn last(&mut self) -> Result<bool> {
        let row = self.engine.last()?;
        Ok(self.position(row))
    }

    fn position(&mut self, row: Option<Row>) -> bool {
        match row {
            Some(row) => {
                self.current = row;
                self.loaded = true;
            }
            None => self.reset(),
        }
        self.loaded
    }

    pub fn count(&mut self, filter: Option<&Condition>) -> Result<u64> {
        let filter = self.dispatcher().prepare_filter(filter)?;
        self.engine.count(filter.as_ref())
    }

    /// Deletes every matching record and resets the buffer.
    pub fn erase(&mut self, filter: Option<&Condition>) -> Result<u64> {
        let filter = self.dispatcher().prepare_filter(filter)?;
        let erased = self.engine.erase(filter.as_ref())?;
        tracing::debug!(backend = %self.backend, erased, "erase");
        self.reset();
        Ok(erased)
    }

    pub fn insert(&mut self) -> Result<()> {
        self.engine.insert(&self.current)?;
        self.loaded = true;
        Ok(())
    }

    pub fn update(&mut self) -> Result<()> {
        if !self.loaded {
            return Err(Error::Engine("No record loaded to update".to_string()));
        }
        self.engine.update(&self.current)
    }

    /// Sets a field of the buffered record, encoding lists and maps when the
    ///  backend cannot store them natively.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.check_nullable(field, &value)?;
        let stored = self.codecs().encode_field(field, value)?;
        self.current.insert(field.to_string(), stored);
        Ok(())
    }

    fn check_nullable(&self, field: &str, value: &Value) -> Result<()> {
        if *value == Value::Null && self.schema.contains(field) && !self.schema.get(field)?.nullable {
            return Err(Error::TypeMismatch {
                field: field.to_string(),
                found: value.type_name(),
            });
        }
        Ok(())
    }

    /// A field of the buffered record as the application sees it. `None` if
    ///  the record has no such field.
    pub fn get(&self, field: &str) -> Result<Option<Value>> {
        match self.current.get(field) {
            Some(stored) if self.schema.contains(field) => {
                self.codecs().decode_field(field, stored.clone()).map(Some)
            }
            Some(stored) => Ok(Some(stored.clone())),
            None => Ok(None),
        }
    }

    /// The whole buffered record, decoded.
    pub fn cast(&self) -> Result<Row> {
        self.codecs().decode_record(self.current.clone())
    }

    /// Sets every entry of `hive` on the buffered record, as [DataMapper::set]
    ///  would. Nothing is changed if any entry is rejected.
    pub fn copy_from(&mut self, hive: &Row) -> Result<()> {
        let mut next = self.current.clone();
        for (field, value) in hive {
            self.check_nullable(field, value)?;
            next.insert(field.clone(), self.codecs().encode_field(field, value.clone())?);
        }
        self.current = next;
        Ok(())
    }

    /// Writes the decoded fields of the buffered record into `hive`,
    ///  overwriting entries it already has.
    pub fn copy_to(&self, hive: &mut Row) -> Result<()> {
        hive.extend(self.cast()?);
        Ok(())
    }

    pub fn exists(&self, field: &str) -> bool {
        self.current.contains_key(field)
    }

    pub fn clear(&mut self, field: &str) {
        self.current.remove(field);
    }

    /// True while the buffer holds a record that hasn't been loaded or saved.
    pub fn dry(&self) -> bool {
        !self.loaded
    }

    /// Empties the buffer, leaving only the configured defaults.
    pub fn reset(&mut self) {
        self.current = self.defaults.clone();
        self.loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        condition,
        options::SortOrder,
        schema::{DataType, FieldConf},
    };

    /// Keeps rows in memory and remembers what it was asked. `load` opens a
    ///  cursor over every row; filters are recorded, not applied.
    #[derive(Default)]
    struct MemoryEngine {
        rows: Vec<Row>,
        cursor: Option<(Vec<Row>, usize)>,
        last_filter: Option<TranslatedFilter>,
        last_options: Option<TranslatedOptions>,
        updated: Vec<Row>,
    }

    impl MemoryEngine {
        fn with_nums(nums: &[i64]) -> Self {
            let rows = nums
                .iter()
                .map(|n| Row::from([("num".to_string(), Value::Int(*n))]))
                .collect();
            Self {
                rows,
                ..Self::default()
            }
        }

        fn seek(&mut self, to: impl FnOnce(usize, usize) -> Option<usize>) -> Option<Row> {
            let (rows, position) = self.cursor.as_mut()?;
            match to(*position, rows.len()).filter(|p| *p < rows.len()) {
                Some(p) => {
                    *position = p;
                    Some(rows[p].clone())
                }
                None => {
                    self.cursor = None;
                    None
                }
            }
        }
    }

    impl MapperEngine for MemoryEngine {
        fn find(
            &mut self,
            filter: Option<&TranslatedFilter>,
            options: Option<&TranslatedOptions>,
        ) -> Result<Vec<Row>> {
            self.last_filter = filter.cloned();
            self.last_options = options.cloned();
            Ok(self.rows.clone())
        }

        fn load(
            &mut self,
            filter: Option<&TranslatedFilter>,
            options: Option<&TranslatedOptions>,
        ) -> Result<Option<Row>> {
            self.last_filter = filter.cloned();
            self.last_options = options.cloned();
            self.cursor = Some((self.rows.clone(), 0));
            Ok(self.seek(|_, _| Some(0)))
        }

        fn count(&mut self, filter: Option<&TranslatedFilter>) -> Result<u64> {
            self.last_filter = filter.cloned();
            Ok(self.rows.len() as u64)
        }

        fn erase(&mut self, filter: Option<&TranslatedFilter>) -> Result<u64> {
            self.last_filter = filter.cloned();
            let erased = self.rows.len() as u64;
            self.rows.clear();
            Ok(erased)
        }

        fn insert(&mut self, row: &Row) -> Result<()> {
            self.rows.push(row.clone());
            Ok(())
        }

        fn update(&mut self, row: &Row) -> Result<()> {
            self.updated.push(row.clone());
            Ok(())
        }

        fn skip(&mut self, offset: isize) -> Result<Option<Row>> {
            Ok(self.seek(|position, _| position.checked_add_signed(offset)))
        }

        fn first(&mut self) -> Result<Option<Row>> {
            Ok(self.seek(|_, _| Some(0)))
        }

        fn last(&mut self) -> Result<Option<Row>> {
            Ok(self.seek(|_, len| len.checked_sub(1)))
        }
    }

    fn schema() -> FieldSchema {
        FieldSchema::new()
            .with_field(
                "title",
                FieldConf::new(DataType::Text).with_default("new record title"),
            )
            .with_field("num", FieldConf::new(DataType::Int))
            .with_field("tags", FieldConf::new(DataType::Json))
            .with_field("meta", FieldConf::new(DataType::Serialized))
    }

    fn tags() -> Value {
        Value::List(vec!["a".into(), "b".into()])
    }

    #[test]
    fn set_and_get_through_codecs() {
        let mut mapper =
            DataMapper::new(Backend::Relational, schema(), MemoryEngine::default()).unwrap();
        mapper.set("tags", tags()).unwrap();
        mapper.set("meta", tags()).unwrap();
        assert_eq!(mapper.get("tags").unwrap(), Some(tags()));
        assert_eq!(mapper.get("meta").unwrap(), Some(tags()));

        mapper.insert().unwrap();
        let stored = &mapper.engine().rows[0];
        assert_eq!(stored["tags"], Value::from(r#"["a","b"]"#));
        assert_eq!(stored["meta"], Value::from(r#"a:2:{i:0;s:1:"a";i:1;s:1:"b";}"#));
    }

    #[test]
    fn document_backend_stores_natively() {
        let mut mapper =
            DataMapper::new(Backend::Document, schema(), MemoryEngine::default()).unwrap();
        mapper.set("tags", tags()).unwrap();
        mapper.insert().unwrap();
        assert_eq!(mapper.engine().rows[0]["tags"], tags());
    }

    #[test]
    fn unstorable_values() {
        let mut mapper =
            DataMapper::new(Backend::Relational, schema(), MemoryEngine::default()).unwrap();
        assert_eq!(
            mapper.set("num", tags()),
            Err(Error::TypeMismatch {
                field: "num".into(),
                found: "list"
            })
        );
        assert_eq!(
            mapper.set("nope", tags()),
            Err(Error::MissingFieldConfiguration("nope".into()))
        );
    }

    #[test]
    fn non_nullable_fields() {
        let schema = FieldSchema::new().with_field(
            "num",
            FieldConf {
                nullable: false,
                ..FieldConf::new(DataType::Int)
            },
        );
        let mut mapper =
            DataMapper::new(Backend::FlatFile, schema, MemoryEngine::default()).unwrap();
        assert!(mapper.set("num", Value::Null).is_err());
        assert!(mapper.set("num", 3).is_ok());
    }

    #[test]
    fn defaults_and_buffer() {
        let mut mapper =
            DataMapper::new(Backend::FlatFile, schema(), MemoryEngine::default()).unwrap();
        assert!(mapper.dry());
        assert_eq!(mapper.get("title").unwrap(), Some("new record title".into()));
        assert_eq!(mapper.get("num").unwrap(), None);

        mapper.set("num", 5).unwrap();
        assert!(mapper.exists("num"));
        mapper.clear("num");
        assert!(!mapper.exists("num"));

        assert!(mapper.update().is_err());
        mapper.insert().unwrap();
        assert!(!mapper.dry());
        mapper.update().unwrap();
        assert_eq!(mapper.engine().updated.len(), 1);

        mapper.reset();
        assert!(mapper.dry());
    }

    #[test]
    fn find_translates_and_decodes() {
        let mut engine = MemoryEngine::default();
        let mut row = Row::new();
        row.insert("_id".into(), Value::Int(1));
        row.insert("tags".into(), Value::from(r#"["a","b"]"#));
        engine.rows.push(row);

        let mut mapper = DataMapper::new(Backend::Relational, schema(), engine).unwrap();
        let options = QueryOptions::new().with_order("num desc").with_limit(1);
        let rows = mapper
            .find(Some(&condition!("num > ?", 5)), Some(&options))
            .unwrap();
        assert_eq!(rows[0]["tags"], tags());
        assert_eq!(rows[0]["_id"], Value::Int(1));
        assert_eq!(
            mapper.engine().last_filter,
            Some(TranslatedFilter::Relational {
                template: "num > ?".into(),
                values: vec![Value::Int(5)],
            })
        );
        let options = mapper.engine().last_options.clone().unwrap();
        assert_eq!(options.order, Some(SortOrder::Expression("num desc".into())));
        assert_eq!(options.limit, Some(1));
    }

    #[test]
    fn load_count_erase() {
        let mut engine = MemoryEngine::default();
        let mut row = Row::new();
        row.insert("num".into(), Value::Int(7));
        engine.rows.push(row);

        let mut mapper = DataMapper::new(Backend::Document, schema(), engine).unwrap();
        assert!(mapper.load(Some(&condition!("num = ?", 7)), None).unwrap());
        assert_eq!(mapper.get("num").unwrap(), Some(Value::Int(7)));
        assert_eq!(
            mapper.engine().last_filter,
            Some(TranslatedFilter::Document(serde_json::json!({"num": 7})))
        );

        assert_eq!(mapper.count(None).unwrap(), 1);
        assert_eq!(mapper.engine().last_filter, None);

        assert_eq!(mapper.erase(Some(&condition!("num > ?", 1))).unwrap(), 1);
        assert!(mapper.dry());
        assert!(!mapper.load(None, None).unwrap());
    }

    #[test]
    fn translation_errors_stop_before_the_engine() {
        let mut mapper =
            DataMapper::new(Backend::Document, schema(), MemoryEngine::default()).unwrap();
        assert_eq!(
            mapper.count(Some(&condition!("active"))),
            Err(Error::UnsupportedClause("active".into()))
        );
        assert_eq!(mapper.engine().last_filter, None);
    }

    #[test]
    fn unstorable_default_fails_construction() {
        let schema = FieldSchema::new().with_field(
            "num",
            FieldConf::new(DataType::Int).with_default(tags()),
        );
        assert_eq!(
            DataMapper::new(Backend::Relational, schema.clone(), MemoryEngine::default()).err(),
            Some(Error::TypeMismatch {
                field: "num".into(),
                found: "list"
            })
        );
        // stored natively elsewhere
        assert!(DataMapper::new(Backend::Document, schema, MemoryEngine::default()).is_ok());

        let schema = FieldSchema::new().with_field(
            "num",
            FieldConf {
                nullable: false,
                ..FieldConf::new(DataType::Int).with_default(Value::Null)
            },
        );
        assert!(DataMapper::new(Backend::FlatFile, schema, MemoryEngine::default()).is_err());
    }

    #[test]
    fn cursor_navigation() {
        let engine = MemoryEngine::with_nums(&[1, 2, 3]);
        let mut mapper = DataMapper::new(Backend::FlatFile, schema(), engine).unwrap();
        assert!(!mapper.skip(1).unwrap());

        assert!(mapper.load(None, None).unwrap());
        assert_eq!(mapper.get("num").unwrap(), Some(Value::Int(1)));
        assert!(mapper.skip(2).unwrap());
        assert_eq!(mapper.get("num").unwrap(), Some(Value::Int(3)));
        assert!(mapper.skip(-1).unwrap());
        assert_eq!(mapper.get("num").unwrap(), Some(Value::Int(2)));
        assert!(mapper.last().unwrap());
        assert_eq!(mapper.get("num").unwrap(), Some(Value::Int(3)));
        assert!(mapper.first().unwrap());
        assert_eq!(mapper.get("num").unwrap(), Some(Value::Int(1)));

        // running off the end drops the record
        assert!(!mapper.skip(-1).unwrap());
        assert!(mapper.dry());
        assert_eq!(mapper.get("num").unwrap(), None);
        assert_eq!(mapper.get("title").unwrap(), Some("new record title".into()));
        assert!(!mapper.first().unwrap());
    }

    #[test]
    fn copy_between_hive_and_buffer() {
        let mut mapper =
            DataMapper::new(Backend::Relational, schema(), MemoryEngine::default()).unwrap();
        let hive = Row::from([
            ("num".to_string(), Value::Int(4)),
            ("tags".to_string(), tags()),
        ]);
        mapper.copy_from(&hive).unwrap();
        assert_eq!(mapper.get("tags").unwrap(), Some(tags()));
        mapper.insert().unwrap();
        assert_eq!(mapper.engine().rows[0]["tags"], Value::from(r#"["a","b"]"#));

        let mut out = Row::from([("other".to_string(), Value::Bool(true))]);
        mapper.copy_to(&mut out).unwrap();
        assert_eq!(out["tags"], tags());
        assert_eq!(out["num"], Value::Int(4));
        assert_eq!(out["title"], Value::from("new record title"));
        assert_eq!(out["other"], Value::Bool(true));

        // a rejected entry leaves the buffer as it was
        let bad = Row::from([
            ("num".to_string(), Value::Int(9)),
            ("nope".to_string(), tags()),
        ]);
        assert_eq!(
            mapper.copy_from(&bad),
            Err(Error::MissingFieldConfiguration("nope".into()))
        );
        assert_eq!(mapper.get("num").unwrap(), Some(Value::Int(4)));
    }
}
