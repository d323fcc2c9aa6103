use serde_json::Value;

/// Accepts or rejects a phase output. A rejection counts as a failed attempt.
pub trait OutputValidator: Send + Sync {
    fn validate(&self, output: &Value) -> Result<(), String>;
}

impl<F> OutputValidator for F
where
    F: Fn(&Value) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, output: &Value) -> Result<(), String> {
        self(output)
    }
}

/// Requires an object output carrying non-null values for every listed field.
#[derive(Debug, Clone)]
pub struct RequiredFields {
    fields: Vec<String>,
}

impl RequiredFields {
    pub fn new(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl OutputValidator for RequiredFields {
    fn validate(&self, output: &Value) -> Result<(), String> {
        let Some(object) = output.as_object() else {
            return Err(format!("expected an object output, got {}", kind(output)));
        };

        let missing: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| object.get(f.as_str()).is_none_or(Value::is_null))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing fields: {}", missing.join(", ")))
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
