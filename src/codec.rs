use std::collections::BTreeMap;

use crate::{
    error::{Error, Result},
    schema::{DataType, FieldSchema},
    translate::Backend,
    value::Value,
};

/// Turns a structured value into text a relational column can hold, and back.
///  `field` only names the column in errors.
pub trait Codec: Send + Sync {
    fn encode(&self, field: &str, value: &Value) -> Result<String>;
    fn decode(&self, field: &str, text: &str) -> Result<Value>;
}

fn codec_error(field: &str, message: impl ToString) -> Error {
    Error::Codec {
        field: field.to_string(),
        message: message.to_string(),
    }
}

pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, field: &str, value: &Value) -> Result<String> {
        serde_json::to_string(value).map_err(|e| codec_error(field, e))
    }

    fn decode(&self, field: &str, text: &str) -> Result<Value> {
        serde_json::from_str(text).map_err(|e| codec_error(field, e))
    }
}

/// The `serialize()` text format of PHP (`a:2:{i:0;s:3:"foo";i:1;i:5;}`), so
///  rows written by existing applications stay readable.
pub struct SerializedCodec;

impl Codec for SerializedCodec {
    fn encode(&self, _field: &str, value: &Value) -> Result<String> {
        let mut out = String::new();
        write_serialized(value, &mut out);
        Ok(out)
    }

    fn decode(&self, field: &str, text: &str) -> Result<Value> {
        let mut reader = Reader {
            source: text.as_bytes(),
            current: 0,
            depth: 0,
        };
        let value = reader.value().map_err(|e| codec_error(field, e))?;
        if reader.current != reader.source.len() {
            return Err(codec_error(field, format!("Trailing data at {}", reader.current)));
        }
        Ok(value)
    }
}

static JSON: JsonCodec = JsonCodec;
static SERIALIZED: SerializedCodec = SerializedCodec;

/// The codec for a field type, if values of that type are stored encoded.
pub fn codec_for(data_type: DataType) -> Option<&'static dyn Codec> {
    match data_type {
        DataType::Json => Some(&JSON),
        DataType::Serialized => Some(&SERIALIZED),
        DataType::Text | DataType::Int | DataType::Float | DataType::Bool => None,
    }
}

fn write_float(f: f64, out: &mut String) {
    if f.is_nan() {
        out.push_str("NAN");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "INF" } else { "-INF" });
    } else {
        out.push_str(&f.to_string());
    }
}

fn write_str(s: &str, out: &mut String) {
    // length is in bytes, not characters
    out.push_str(&format!("s:{}:\"{}\";", s.len(), s));
}

fn write_serialized(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("N;"),
        Value::Bool(b) => out.push_str(if *b { "b:1;" } else { "b:0;" }),
        Value::Int(i) => out.push_str(&format!("i:{i};")),
        Value::Float(f) => {
            out.push_str("d:");
            write_float(*f, out);
            out.push(';');
        }
        Value::Str(s) => write_str(s, out),
        Value::List(items) => {
            out.push_str(&format!("a:{}:{{", items.len()));
            for (i, item) in items.iter().enumerate() {
                out.push_str(&format!("i:{i};"));
                write_serialized(item, out);
            }
            out.push('}');
        }
        Value::Map(map) => {
            out.push_str(&format!("a:{}:{{", map.len()));
            for (key, item) in map {
                write_str(key, out);
                write_serialized(item, out);
            }
            out.push('}');
        }
    }
}

/// Same nesting limit serde_json applies to JSON columns.
const MAX_DEPTH: usize = 128;

struct Reader<'input> {
    source: &'input [u8],
    current: usize,
    depth: usize,
}

impl<'input> Reader<'input> {
    fn expect(&mut self, b: u8) -> std::result::Result<(), String> {
        if self.source.get(self.current) == Some(&b) {
            self.current += 1;
            Ok(())
        } else {
            Err(format!(
                "Expected '{}' at {}",
                char::from(b),
                self.current
            ))
        }
    }

    /// Reads up to (and consumes) `term`, returning what came before it.
    fn until(&mut self, term: u8) -> std::result::Result<&'input str, String> {
        let source = self.source;
        let start = self.current;
        while let Some(&b) = source.get(self.current) {
            if b == term {
                self.current += 1;
                return std::str::from_utf8(&source[start..self.current - 1])
                    .map_err(|e| e.to_string());
            }
            self.current += 1;
        }
        Err(format!("Unterminated value starting at {start}"))
    }

    fn value(&mut self) -> std::result::Result<Value, String> {
        let tag = *self
            .source
            .get(self.current)
            .ok_or_else(|| "Unexpected end of input".to_string())?;
        self.current += 1;
        if tag == b'N' {
            self.expect(b';')?;
            return Ok(Value::Null);
        }
        self.expect(b':')?;
        match tag {
            b'b' => match self.until(b';')? {
                "0" => Ok(Value::Bool(false)),
                "1" => Ok(Value::Bool(true)),
                other => Err(format!("Invalid boolean '{other}'")),
            },
            b'i' => {
                let s = self.until(b';')?;
                s.parse().map(Value::Int).map_err(|_| format!("Invalid integer '{s}'"))
            }
            b'd' => match self.until(b';')? {
                "NAN" => Ok(Value::Float(f64::NAN)),
                "INF" => Ok(Value::Float(f64::INFINITY)),
                "-INF" => Ok(Value::Float(f64::NEG_INFINITY)),
                s => s.parse().map(Value::Float).map_err(|_| format!("Invalid float '{s}'")),
            },
            b's' => self.string().map(Value::Str),
            b'a' => self.array(),
            other => Err(format!("Unknown type tag '{}'", char::from(other))),
        }
    }

    // `s:` has already been consumed
    fn string(&mut self) -> std::result::Result<String, String> {
        let len_str = self.until(b':')?;
        let len: usize = len_str
            .parse()
            .map_err(|_| format!("Invalid string length '{len_str}'"))?;
        self.expect(b'"')?;
        let source = self.source;
        let end = self
            .current
            .checked_add(len)
            .ok_or_else(|| format!("Invalid string length '{len_str}'"))?;
        let bytes = source
            .get(self.current..end)
            .ok_or_else(|| "String runs past end of input".to_string())?;
        let s = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
        self.current = end;
        self.expect(b'"')?;
        self.expect(b';')?;
        Ok(s.to_string())
    }

    // `a:` has already been consumed
    fn array(&mut self) -> std::result::Result<Value, String> {
        let count_str = self.until(b':')?;
        let count: usize = count_str
            .parse()
            .map_err(|_| format!("Invalid array length '{count_str}'"))?;
        self.expect(b'{')?;
        if self.depth == MAX_DEPTH {
            return Err(format!("Arrays nested deeper than {MAX_DEPTH}"));
        }
        self.depth += 1;

        // the count is untrusted: every entry takes at least one byte
        let mut entries = Vec::with_capacity(count.min(self.source.len() - self.current));
        for _ in 0..count {
            let key = match self.value()? {
                Value::Int(i) => i.to_string(),
                Value::Str(s) => s,
                other => return Err(format!("Invalid array key of type {}", other.type_name())),
            };
            entries.push((key, self.value()?));
        }
        self.expect(b'}')?;
        self.depth -= 1;

        // Keys 0..n in order are a list, anything else is a map
        let is_list = entries
            .iter()
            .enumerate()
            .all(|(i, (key, _))| key.parse::<usize>() == Ok(i));
        if is_list {
            Ok(Value::List(entries.into_iter().map(|(_, v)| v).collect()))
        } else {
            Ok(Value::Map(entries.into_iter().collect()))
        }
    }
}

/// Applies the configured codecs between application values and what a
///  backend stores. Only the relational backend needs encoding; the other two
///  keep lists and maps natively.
pub struct FieldCodecs<'a> {
    schema: &'a FieldSchema,
    backend: Backend,
}

impl<'a> FieldCodecs<'a> {
    pub fn new(schema: &'a FieldSchema, backend: Backend) -> Self {
        Self { schema, backend }
    }

    fn codec(&self, field: &str) -> Result<Option<&'static dyn Codec>> {
        Ok(codec_for(self.schema.get(field)?.data_type))
    }

    /// Value to store for `field`.
    pub fn encode_field(&self, field: &str, value: Value) -> Result<Value> {
        if self.backend != Backend::Relational || value.is_scalar() {
            return Ok(value);
        }
        let Some(codec) = self.codec(field)? else {
            return Err(Error::TypeMismatch {
                field: field.to_string(),
                found: value.type_name(),
            });
        };
        codec.encode(field, &value).map(Value::Str)
    }

    /// Application value of what the backend stored for `field`.
    pub fn decode_field(&self, field: &str, stored: Value) -> Result<Value> {
        if self.backend != Backend::Relational {
            return Ok(stored);
        }
        match (self.codec(field)?, stored) {
            (Some(codec), Value::Str(text)) => codec.decode(field, &text),
            (_, stored) => Ok(stored),
        }
    }

    /// Decodes every configured column of a row. Columns the schema doesn't
    ///  know (ids, timestamps added by the engine) are left alone.
    pub fn decode_record(&self, row: BTreeMap<String, Value>) -> Result<BTreeMap<String, Value>> {
        row.into_iter()
            .map(|(field, stored)| {
                if self.schema.contains(&field) {
                    let value = self.decode_field(&field, stored)?;
                    Ok((field, value))
                } else {
                    Ok((field, stored))
                }
            })
            .collect()
    }
}
