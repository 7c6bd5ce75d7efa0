pub mod clause;
pub mod codec;
pub mod error;
pub mod evaluate;
pub mod lex;
pub mod mapper;
pub mod options;
pub mod parser;
pub mod schema;
pub mod translate;
pub mod value;

pub use error::{Error, Result};
pub use parser::Condition;
pub use translate::{Backend, TranslatedFilter};
pub use value::Value;
