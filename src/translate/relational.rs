use crate::{
    clause::{Clause, Source},
    codec::FieldCodecs,
    error::Result,
    options::{QueryOptions, SortOrder, TranslatedOptions},
    parser::Condition,
    schema::FieldSchema,
    translate::{Backend, FilterTranslator},
    value::Value,
};

/// SQL engines understand the condition grammar natively, so the template
///  is handed over as written. It is still parsed, so malformed input fails
///  here exactly as it would on the other backends, and bound lists or maps
///  are encoded with the codec configured for their field.
pub struct RelationalTranslator<'a> {
    codecs: FieldCodecs<'a>,
}

impl<'a> RelationalTranslator<'a> {
    pub fn new(schema: &'a FieldSchema) -> Self {
        Self {
            codecs: FieldCodecs::new(schema, Backend::Relational),
        }
    }
}

impl FilterTranslator for RelationalTranslator<'_> {
    type Output = (String, Vec<Value>);

    fn translate_filter(&self, condition: &Condition) -> Result<Option<Self::Output>> {
        let Some(root) = condition.parse()? else {
            return Ok(None);
        };
        if condition.values.iter().all(Value::is_scalar) {
            return Ok(Some((condition.template.clone(), condition.values.clone())));
        }

        // Placeholders were bound left to right, so the n-th placeholder
        //  clause owns the n-th value.
        let bound_fields = root.leaves().into_iter().filter_map(|clause| match clause {
            Clause::Compare {
                field,
                source: Source::Placeholder,
                ..
            } => Some(field.as_str()),
            _ => None,
        });
        let values = bound_fields
            .zip(&condition.values)
            .map(|(field, value)| self.codecs.encode_field(field, value.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some((condition.template.clone(), values)))
    }

    fn translate_options(&self, options: &QueryOptions) -> Result<TranslatedOptions> {
        // validated, then passed on untouched
        options.order_keys()?;
        let order = options
            .order
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(|o| SortOrder::Expression(o.to_string()));
        Ok(TranslatedOptions::from_options(options, order))
    }
}
