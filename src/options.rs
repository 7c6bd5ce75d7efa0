use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn parse(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("asc") {
            Some(Direction::Asc)
        } else if word.eq_ignore_ascii_case("desc") {
            Some(Direction::Desc)
        } else {
            None
        }
    }
}

/// Query options in their backend-neutral form. `order` is written the SQL
///  way: `"title, num desc"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.order.as_deref().is_none_or(|o| o.trim().is_empty())
            && self.limit.is_none()
            && self.offset.is_none()
    }

    /// The sort keys in order, direction defaulting to ascending.
    pub fn order_keys(&self) -> Result<Vec<(String, Direction)>> {
        let Some(order) = self.order.as_deref() else {
            return Ok(vec![]);
        };
        order
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let mut words = entry.split_whitespace();
                let field = words.next().unwrap_or_default();
                let direction = match words.next() {
                    None => Direction::Asc,
                    Some(word) => {
                        Direction::parse(word).ok_or_else(|| Error::InvalidOrder(entry.to_string()))?
                    }
                };
                if words.next().is_some() {
                    return Err(Error::InvalidOrder(entry.to_string()));
                }
                Ok((field.to_string(), direction))
            })
            .collect()
    }
}

/// A sort order in the form one backend takes it.
#[derive(Debug, Clone, PartialEq)]
pub enum SortOrder {
    /// `title SORT_ASC, num SORT_DESC` for the flat-file store, or the
    ///  untouched SQL clause.
    Expression(String),
    /// `{"title": 1, "num": -1}`, key order significant.
    Document(serde_json::Map<String, serde_json::Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedOptions {
    pub order: Option<SortOrder>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl TranslatedOptions {
    /// Keeps limit and offset, replacing the order with `order`.
    pub fn from_options(options: &QueryOptions, order: Option<SortOrder>) -> Self {
        Self {
            order,
            limit: options.limit,
            offset: options.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_keys() {
        let options = QueryOptions::new().with_order("x, y desc ,z ASC");
        assert_eq!(
            options.order_keys().unwrap(),
            vec![
                ("x".to_string(), Direction::Asc),
                ("y".to_string(), Direction::Desc),
                ("z".to_string(), Direction::Asc),
            ]
        );
        assert_eq!(QueryOptions::new().order_keys().unwrap(), vec![]);
    }

    #[test]
    fn bad_direction() {
        let options = QueryOptions::new().with_order("x, y sideways");
        assert_eq!(
            options.order_keys(),
            Err(Error::InvalidOrder("y sideways".into()))
        );
        let options = QueryOptions::new().with_order("x desc please");
        assert!(options.order_keys().is_err());
    }

    #[test]
    fn emptiness() {
        assert!(QueryOptions::new().is_empty());
        assert!(QueryOptions::new().with_order("  ").is_empty());
        assert!(!QueryOptions::new().with_limit(10).is_empty());
        assert!(!QueryOptions::new().with_order("x").is_empty());
    }

    #[test]
    fn from_json() {
        let options: QueryOptions =
            serde_json::from_str(r#"{"order": "num desc", "limit": 5}"#).unwrap();
        assert_eq!(
            options,
            QueryOptions::new().with_order("num desc").with_limit(5)
        );
    }
}
