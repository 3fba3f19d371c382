//! Declarative input schema and validator.
//!
//! The job input arrives as an untyped JSON mapping. The schema below is the
//! de facto request wire format: one `FieldSpec` per field, interpreted by
//! [`validate`], which either produces a normalized [`GenerationInput`] or a
//! list of every violated constraint. No pipeline is touched until
//! validation passes.

use serde_json::Value;
use std::fmt;

use crate::pipelines::scheduler::SchedulerKind;
use crate::types::GenerationInput;

/// Primitive type expected for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Bool,
    /// Non-negative integer. Floats and negative numbers are rejected.
    UInt,
    /// Floating point; integers are accepted and widened.
    Float,
}

impl FieldKind {
    /// Returns the type name used in violation messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Bool => "boolean",
            FieldKind::UInt => "non-negative integer",
            FieldKind::Float => "number",
        }
    }
}

/// Domain constraint applied to a field's value.
#[derive(Debug, Clone, Copy)]
pub enum Constraint {
    /// Any value of the declared type.
    Any,
    /// Integer within an inclusive range.
    UIntRange { min: u64, max: u64 },
    /// Float within an inclusive range.
    FloatRange { min: f64, max: f64 },
    /// Pixel dimension: inclusive range, divisible by `step`.
    Dimension { min: u64, max: u64, step: u64 },
    /// Must name a supported scheduler family.
    SchedulerName,
}

/// Declaration of a single input field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Applied when an optional field is absent. Optional fields without a
    /// default stay unset.
    pub default: Option<Value>,
    pub constraint: Constraint,
}

/// Cross-field dependency: when the boolean field is true, every listed
/// field must be present.
#[derive(Debug, Clone)]
pub struct DependencyRule {
    pub when_true: &'static str,
    pub requires: &'static [&'static str],
}

/// Fields required together with `use_inpaint`.
pub const INPUT_DEPENDENCIES: &[DependencyRule] = &[DependencyRule {
    when_true: "use_inpaint",
    requires: &["image_url", "mask_url"],
}];

/// A single violated constraint, tied to the offending field.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Renders a violation list into a single human-readable error message.
pub fn render_violations(violations: &[Violation]) -> String {
    let parts: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
    format!("Invalid input: {}", parts.join("; "))
}

/// Returns the declared input schema.
pub fn input_schema() -> Vec<FieldSpec> {
    vec![
        FieldSpec {
            name: "prompt",
            kind: FieldKind::String,
            required: true,
            default: None,
            constraint: Constraint::Any,
        },
        FieldSpec {
            name: "negative_prompt",
            kind: FieldKind::String,
            required: false,
            default: Some(Value::String(String::new())),
            constraint: Constraint::Any,
        },
        FieldSpec {
            name: "image_url",
            kind: FieldKind::String,
            required: false,
            default: None,
            constraint: Constraint::Any,
        },
        FieldSpec {
            name: "mask_url",
            kind: FieldKind::String,
            required: false,
            default: None,
            constraint: Constraint::Any,
        },
        FieldSpec {
            name: "use_inpaint",
            kind: FieldKind::Bool,
            required: false,
            default: Some(Value::Bool(false)),
            constraint: Constraint::Any,
        },
        FieldSpec {
            name: "seed",
            kind: FieldKind::UInt,
            required: false,
            default: None,
            constraint: Constraint::Any,
        },
        FieldSpec {
            name: "num_inference_steps",
            kind: FieldKind::UInt,
            required: false,
            default: Some(Value::from(25u64)),
            constraint: Constraint::UIntRange { min: 1, max: 500 },
        },
        FieldSpec {
            name: "refiner_inference_steps",
            kind: FieldKind::UInt,
            required: false,
            default: Some(Value::from(50u64)),
            constraint: Constraint::UIntRange { min: 1, max: 500 },
        },
        FieldSpec {
            name: "guidance_scale",
            kind: FieldKind::Float,
            required: false,
            default: Some(Value::from(7.5f64)),
            constraint: Constraint::FloatRange {
                min: 0.0,
                max: 20.0,
            },
        },
        FieldSpec {
            name: "scheduler",
            kind: FieldKind::String,
            required: false,
            default: Some(Value::String("DDIM".to_string())),
            constraint: Constraint::SchedulerName,
        },
        FieldSpec {
            name: "strength",
            kind: FieldKind::Float,
            required: false,
            default: Some(Value::from(0.3f64)),
            constraint: Constraint::FloatRange { min: 0.0, max: 1.0 },
        },
        FieldSpec {
            name: "width",
            kind: FieldKind::UInt,
            required: false,
            default: Some(Value::from(1024u64)),
            constraint: Constraint::Dimension {
                min: 256,
                max: 1536,
                step: 8,
            },
        },
        FieldSpec {
            name: "height",
            kind: FieldKind::UInt,
            required: false,
            default: Some(Value::from(1024u64)),
            constraint: Constraint::Dimension {
                min: 256,
                max: 1536,
                step: 8,
            },
        },
        FieldSpec {
            name: "num_images",
            kind: FieldKind::UInt,
            required: false,
            default: Some(Value::from(1u64)),
            constraint: Constraint::UIntRange { min: 1, max: 3 },
        },
        FieldSpec {
            name: "high_noise_frac",
            kind: FieldKind::Float,
            required: false,
            default: Some(Value::from(0.8f64)),
            constraint: Constraint::FloatRange { min: 0.0, max: 1.0 },
        },
    ]
}

/// Validates a raw job input against the declared schema.
///
/// Returns the normalized request on success, or every violated constraint
/// on failure. Defaults are applied for absent optional fields; unknown
/// fields are rejected.
pub fn validate(raw: &Value) -> std::result::Result<GenerationInput, Vec<Violation>> {
    let schema = input_schema();
    let mut violations = Vec::new();

    let object = match raw.as_object() {
        Some(o) => o,
        None => {
            return Err(vec![Violation::new(
                "input",
                "job input must be a JSON object",
            )])
        }
    };

    // Unknown fields are violations, not silently dropped
    for key in object.keys() {
        if !schema.iter().any(|spec| spec.name == key) {
            violations.push(Violation::new(key.clone(), "unexpected field"));
        }
    }

    let mut normalized = serde_json::Map::new();
    for spec in &schema {
        let value = match object.get(spec.name) {
            Some(Value::Null) | None => {
                if spec.required {
                    violations.push(Violation::new(spec.name, "is required"));
                    continue;
                }
                match &spec.default {
                    Some(default) => default.clone(),
                    None => continue,
                }
            }
            Some(value) => value.clone(),
        };

        if !type_matches(spec.kind, &value) {
            violations.push(Violation::new(
                spec.name,
                format!("expected {}", spec.kind.as_str()),
            ));
            continue;
        }

        if let Some(message) = check_constraint(&spec.constraint, &value) {
            violations.push(Violation::new(spec.name, message));
            continue;
        }

        normalized.insert(spec.name.to_string(), value);
    }

    for rule in INPUT_DEPENDENCIES {
        let triggered = normalized
            .get(rule.when_true)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if triggered {
            for required in rule.requires {
                if !normalized.contains_key(*required) {
                    violations.push(Violation::new(
                        *required,
                        format!("required when {} is true", rule.when_true),
                    ));
                }
            }
        }
    }

    if !violations.is_empty() {
        return Err(violations);
    }

    Ok(build_input(&normalized))
}

/// Checks that a value has the declared primitive type.
fn type_matches(kind: FieldKind, value: &Value) -> bool {
    match kind {
        FieldKind::String => value.is_string(),
        FieldKind::Bool => value.is_boolean(),
        FieldKind::UInt => value.as_u64().is_some(),
        FieldKind::Float => value.as_f64().is_some(),
    }
}

/// Checks a domain constraint, returning a violation message on failure.
fn check_constraint(constraint: &Constraint, value: &Value) -> Option<String> {
    match constraint {
        Constraint::Any => None,
        Constraint::UIntRange { min, max } => {
            let n = value.as_u64()?;
            if n < *min || n > *max {
                Some(format!("must be between {} and {}, got {}", min, max, n))
            } else {
                None
            }
        }
        Constraint::FloatRange { min, max } => {
            let n = value.as_f64()?;
            if n < *min || n > *max {
                Some(format!("must be between {} and {}, got {}", min, max, n))
            } else {
                None
            }
        }
        Constraint::Dimension { min, max, step } => {
            let n = value.as_u64()?;
            if n < *min || n > *max {
                Some(format!("must be between {} and {}, got {}", min, max, n))
            } else if n % step != 0 {
                Some(format!("must be a multiple of {}, got {}", step, n))
            } else {
                None
            }
        }
        Constraint::SchedulerName => {
            let name = value.as_str()?;
            if SchedulerKind::parse(name).is_none() {
                Some(format!(
                    "unknown scheduler {:?}, supported: {}",
                    name,
                    SchedulerKind::NAMES.join(", ")
                ))
            } else {
                None
            }
        }
    }
}

/// Builds the typed request from a fully validated field map.
fn build_input(fields: &serde_json::Map<String, Value>) -> GenerationInput {
    let get_str = |name: &str| -> String {
        fields
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let get_opt_str = |name: &str| -> Option<String> {
        fields
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let get_u32 = |name: &str| -> u32 {
        fields.get(name).and_then(Value::as_u64).unwrap_or(0) as u32
    };
    let get_f64 =
        |name: &str| -> f64 { fields.get(name).and_then(Value::as_f64).unwrap_or(0.0) };

    GenerationInput {
        prompt: get_str("prompt"),
        negative_prompt: get_str("negative_prompt"),
        image_url: get_opt_str("image_url"),
        mask_url: get_opt_str("mask_url"),
        use_inpaint: fields
            .get("use_inpaint")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        seed: fields.get("seed").and_then(Value::as_u64),
        num_inference_steps: get_u32("num_inference_steps"),
        refiner_inference_steps: get_u32("refiner_inference_steps"),
        guidance_scale: get_f64("guidance_scale"),
        scheduler: get_str("scheduler"),
        strength: get_f64("strength"),
        width: get_u32("width"),
        height: get_u32("height"),
        num_images: get_u32("num_images"),
        high_noise_frac: get_f64("high_noise_frac"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_input_gets_defaults() {
        let input = validate(&json!({"prompt": "a cat"})).unwrap();
        assert_eq!(input.prompt, "a cat");
        assert_eq!(input.negative_prompt, "");
        assert_eq!(input.num_inference_steps, 25);
        assert_eq!(input.refiner_inference_steps, 50);
        assert_eq!(input.guidance_scale, 7.5);
        assert_eq!(input.scheduler, "DDIM");
        assert_eq!(input.width, 1024);
        assert_eq!(input.height, 1024);
        assert_eq!(input.num_images, 1);
        assert_eq!(input.high_noise_frac, 0.8);
        assert!(input.seed.is_none());
        assert!(!input.use_inpaint);
    }

    #[test]
    fn missing_prompt_is_rejected() {
        let err = validate(&json!({"num_inference_steps": 30})).unwrap_err();
        assert!(err.iter().any(|v| v.field == "prompt"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = validate(&json!({
            "prompt": "a cat",
            "num_inference_steps": "thirty"
        }))
        .unwrap_err();
        assert!(err
            .iter()
            .any(|v| v.field == "num_inference_steps" && v.message.contains("integer")));
    }

    #[test]
    fn negative_seed_is_rejected() {
        let err = validate(&json!({"prompt": "a cat", "seed": -1})).unwrap_err();
        assert!(err.iter().any(|v| v.field == "seed"));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = validate(&json!({
            "prompt": "a cat",
            "num_inference_steps": 501,
            "guidance_scale": 30.0,
            "num_images": 9
        }))
        .unwrap_err();
        assert_eq!(err.len(), 3);
        assert!(err.iter().any(|v| v.field == "num_inference_steps"));
        assert!(err.iter().any(|v| v.field == "guidance_scale"));
        assert!(err.iter().any(|v| v.field == "num_images"));
    }

    #[test]
    fn dimension_must_be_multiple_of_8() {
        let err = validate(&json!({"prompt": "a cat", "width": 1001})).unwrap_err();
        assert!(err
            .iter()
            .any(|v| v.field == "width" && v.message.contains("multiple of 8")));

        let err = validate(&json!({"prompt": "a cat", "height": 2048})).unwrap_err();
        assert!(err.iter().any(|v| v.field == "height"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = validate(&json!({"prompt": "a cat", "stylize": 100})).unwrap_err();
        assert!(err
            .iter()
            .any(|v| v.field == "stylize" && v.message == "unexpected field"));
    }

    #[test]
    fn inpaint_requires_both_image_and_mask() {
        let err = validate(&json!({"prompt": "a cat", "use_inpaint": true})).unwrap_err();
        assert!(err.iter().any(|v| v.field == "image_url"));
        assert!(err.iter().any(|v| v.field == "mask_url"));

        let err = validate(&json!({
            "prompt": "a cat",
            "use_inpaint": true,
            "image_url": "https://example.com/init.png"
        }))
        .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].field, "mask_url");

        let input = validate(&json!({
            "prompt": "a cat",
            "use_inpaint": true,
            "image_url": "https://example.com/init.png",
            "mask_url": "https://example.com/mask.png"
        }))
        .unwrap();
        assert!(input.use_inpaint);
    }

    #[test]
    fn scheduler_names_form_a_closed_set() {
        let err = validate(&json!({"prompt": "a cat", "scheduler": "TurboSampler"}))
            .unwrap_err();
        assert!(err
            .iter()
            .any(|v| v.field == "scheduler" && v.message.contains("unknown scheduler")));

        // Legacy aliases are accepted
        let input =
            validate(&json!({"prompt": "a cat", "scheduler": "K_EULER"})).unwrap();
        assert_eq!(input.scheduler, "K_EULER");
    }

    #[test]
    fn all_violations_reported_at_once() {
        let err = validate(&json!({
            "num_inference_steps": 0,
            "width": 13,
            "bogus": true
        }))
        .unwrap_err();
        // prompt missing + steps range + width + unknown field
        assert_eq!(err.len(), 4);
    }

    #[test]
    fn non_object_input_is_rejected() {
        let err = validate(&json!("just a string")).unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].field, "input");
    }

    #[test]
    fn null_optional_field_takes_default() {
        let input = validate(&json!({
            "prompt": "a cat",
            "negative_prompt": null,
            "seed": null
        }))
        .unwrap();
        assert_eq!(input.negative_prompt, "");
        assert!(input.seed.is_none());
    }

    #[test]
    fn full_text_to_image_request_validates() {
        let input = validate(&json!({
            "prompt": "a cat",
            "negative_prompt": "",
            "num_inference_steps": 30,
            "guidance_scale": 7.5,
            "height": 1024,
            "width": 1024,
            "high_noise_frac": 0.8,
            "num_images": 1,
            "scheduler": "DDIM"
        }))
        .unwrap();
        assert!(input.image_url.is_none());
        assert!(!input.use_inpaint);
        assert_eq!(input.num_inference_steps, 30);
    }

    #[test]
    fn render_violations_is_readable() {
        let message = render_violations(&[
            Violation::new("prompt", "is required"),
            Violation::new("width", "must be a multiple of 8, got 13"),
        ]);
        assert!(message.starts_with("Invalid input: "));
        assert!(message.contains("prompt: is required"));
        assert!(message.contains("; width:"));
    }
}
