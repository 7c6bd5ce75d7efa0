#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use filter_expr::{
    Value,
    parser::Condition,
    schema::FieldSchema,
    translate::{Backend, Dispatcher},
};

#[derive(Debug)]
pub struct ConditionInput {
    pub template: String,
    pub values: Vec<i64>,
}

const MAX_TEMPLATE_LENGTH: usize = 10000;

impl<'a> Arbitrary<'a> for ConditionInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let s: String = u.arbitrary()?;
        Ok(ConditionInput {
            template: s.chars().take(MAX_TEMPLATE_LENGTH).collect(),
            values: u.arbitrary()?,
        })
    }
}

// Any input either translates or fails with an error; nothing may panic.
fuzz_target!(|data: &[u8]| {
    if let Ok(input) = arbitrary::Unstructured::new(data).arbitrary::<ConditionInput>() {
        let cond = Condition::new(
            input.template,
            input.values.into_iter().map(Value::Int).collect(),
        );
        let schema = FieldSchema::new();
        for backend in [Backend::FlatFile, Backend::Relational, Backend::Document] {
            let _ = Dispatcher::new(backend, &schema).prepare_filter(Some(&cond));
        }
    }
});
