use std::collections::{BTreeMap, HashMap};
use wfcore::{CompileError, DeclaredInput, TypeHint, Value};

/// Where a resolved input value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    RunArgument,
    Setting,
    Default,
}

/// Input values picked by precedence resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInputs {
    pub values: HashMap<String, Value>,
    pub sources: HashMap<String, InputSource>,
}

impl ResolvedInputs {
    fn set(&mut self, name: &str, value: Value, source: InputSource) {
        self.values.insert(name.to_string(), value);
        self.sources.insert(name.to_string(), source);
    }
}

/// Fill every declared input from the first source that has it: run-time
/// argument, then persisted setting, then the declared default.
///
/// A required input no source supplies yields an error; an optional one is
/// simply left absent.
pub fn resolve_defaults(
    declared: &BTreeMap<String, DeclaredInput>,
    run_args: &HashMap<String, Value>,
    settings: &HashMap<String, String>,
) -> (Vec<CompileError>, ResolvedInputs) {
    let mut errors = Vec::new();
    let mut resolved = ResolvedInputs::default();

    for (name, input) in declared {
        if let Some(value) = run_args.get(name) {
            resolved.set(name, value.clone(), InputSource::RunArgument);
        } else if let Some(raw) = settings.get(name) {
            resolved.set(name, coerce_setting(name, raw, input.type_hint), InputSource::Setting);
        } else if let Some(default) = &input.default {
            resolved.set(name, default.clone(), InputSource::Default);
        } else if input.required {
            errors.push(CompileError::MissingRequiredInput {
                name: name.clone(),
                description: input.description.clone(),
            });
        }
    }

    (errors, resolved)
}

fn coerce_setting(name: &str, raw: &str, hint: Option<TypeHint>) -> Value {
    let Some(hint) = hint else {
        return Value::String(raw.to_string());
    };
    hint.coerce_str(raw).unwrap_or_else(|| {
        tracing::warn!(
            "Setting for input '{}' is not a valid {}; using it as a string",
            name,
            hint
        );
        Value::String(raw.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_input() -> BTreeMap<String, DeclaredInput> {
        BTreeMap::from([(
            "token".to_string(),
            DeclaredInput::required(TypeHint::String).with_default("x"),
        )])
    }

    #[test]
    fn run_argument_beats_setting_beats_default() {
        let declared = token_input();
        let settings = HashMap::from([("token".to_string(), "y".to_string())]);
        let args = HashMap::from([("token".to_string(), json!("z"))]);

        let (errors, resolved) = resolve_defaults(&declared, &args, &settings);
        assert!(errors.is_empty());
        assert_eq!(resolved.values["token"], json!("z"));
        assert_eq!(resolved.sources["token"], InputSource::RunArgument);

        let (_, resolved) = resolve_defaults(&declared, &HashMap::new(), &settings);
        assert_eq!(resolved.values["token"], json!("y"));
        assert_eq!(resolved.sources["token"], InputSource::Setting);

        let (_, resolved) = resolve_defaults(&declared, &HashMap::new(), &HashMap::new());
        assert_eq!(resolved.values["token"], json!("x"));
        assert_eq!(resolved.sources["token"], InputSource::Default);
    }

    #[test]
    fn missing_required_input_is_reported_with_description() {
        let declared = BTreeMap::from([(
            "api_key".to_string(),
            DeclaredInput::required(TypeHint::String).with_description("Service API key"),
        )]);

        let (errors, resolved) = resolve_defaults(&declared, &HashMap::new(), &HashMap::new());
        assert!(resolved.values.is_empty());
        assert_eq!(
            errors,
            vec![CompileError::MissingRequiredInput {
                name: "api_key".to_string(),
                description: Some("Service API key".to_string()),
            }]
        );
        assert!(errors[0].to_string().contains("api_key"));
    }

    #[test]
    fn optional_input_without_value_stays_absent() {
        let declared = BTreeMap::from([("limit".to_string(), DeclaredInput::optional(TypeHint::Number))]);
        let (errors, resolved) = resolve_defaults(&declared, &HashMap::new(), &HashMap::new());
        assert!(errors.is_empty());
        assert!(!resolved.values.contains_key("limit"));
    }

    #[test]
    fn settings_are_coerced_to_the_type_hint() {
        let declared = BTreeMap::from([
            ("limit".to_string(), DeclaredInput::required(TypeHint::Number)),
            ("verbose".to_string(), DeclaredInput::required(TypeHint::Boolean)),
            ("tags".to_string(), DeclaredInput::required(TypeHint::Array)),
            ("ratio".to_string(), DeclaredInput::required(TypeHint::Number)),
        ]);
        let settings = HashMap::from([
            ("limit".to_string(), "20".to_string()),
            ("verbose".to_string(), "true".to_string()),
            ("tags".to_string(), r#"["a","b"]"#.to_string()),
            ("ratio".to_string(), "lots".to_string()),
        ]);

        let (errors, resolved) = resolve_defaults(&declared, &HashMap::new(), &settings);
        assert!(errors.is_empty());
        assert_eq!(resolved.values["limit"], json!(20));
        assert_eq!(resolved.values["verbose"], json!(true));
        assert_eq!(resolved.values["tags"], json!(["a", "b"]));
        assert_eq!(resolved.values["ratio"], json!("lots"));
    }
}
