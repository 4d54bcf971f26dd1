use std::collections::HashMap;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

use crate::annotation::annotations_of;
use crate::error::{SchemaError, SchemaResult};
use crate::pointer;
use crate::pointer_map::PointerMap;

/// Nesting limit for `$ref` chains; guards against self-referential schemas
/// applied to unbounded documents.
const MAX_DEPTH: usize = 128;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// One violated constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// Document location of the offending value.
    pub pointer: String,
    pub message: String,
}

/// Outcome of one validation pass.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    /// Annotated locations reached along valid branches.
    pub pointers: PointerMap,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// First error, if any.
    pub fn first_error(&self) -> Option<&ValidationError> {
        self.errors.first()
    }
}

// ---------------------------------------------------------------------------
// SchemaValidator
// ---------------------------------------------------------------------------

/// A JSON-Schema (draft-4 keyword set) validator that records annotated
/// locations as it walks.
///
/// Supported keywords: `type`, `enum`, `const`, `properties`,
/// `additionalProperties`, `patternProperties`, `required`,
/// `minProperties`, `maxProperties`, `items`, `additionalItems`, `minItems`,
/// `maxItems`, `uniqueItems`, `minLength`, `maxLength`, `pattern`,
/// `minimum`, `maximum`, `exclusiveMinimum`, `exclusiveMaximum`,
/// `multipleOf`, `allOf`, `anyOf`, `oneOf`, `not`, and local `$ref`.
/// `format` is accepted but not enforced.
#[derive(Clone, Debug)]
pub struct SchemaValidator {
    root: Value,
    patterns: HashMap<String, Regex>,
}

impl SchemaValidator {
    /// Compile a schema. Fails if it is not an object/boolean or if any
    /// `pattern` is not a valid regular expression.
    pub fn new(schema: Value) -> SchemaResult<Self> {
        if !schema.is_object() && !schema.is_boolean() {
            return Err(SchemaError::InvalidSchema("schema must be an object".into()));
        }
        let mut patterns = HashMap::new();
        collect_patterns(&schema, &mut patterns)?;
        Ok(Self {
            root: schema,
            patterns,
        })
    }

    pub fn schema(&self) -> &Value {
        &self.root
    }

    /// Validate `instance`, returning violations and the pointer map.
    pub fn validate(&self, instance: &Value) -> ValidationReport {
        let mut walk = Walk::new(self);
        walk.visit(&self.root, instance, "", 0);
        trace!(
            errors = walk.report.errors.len(),
            pointers = walk.report.pointers.len(),
            "schema validation finished"
        );
        walk.report
    }
}

fn collect_patterns(node: &Value, out: &mut HashMap<String, Regex>) -> SchemaResult<()> {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(p)) = map.get("pattern") {
                compile_into(p, out)?;
            }
            if let Some(Value::Object(pp)) = map.get("patternProperties") {
                for key in pp.keys() {
                    compile_into(key, out)?;
                }
            }
            for child in map.values() {
                collect_patterns(child, out)?;
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_patterns(child, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn compile_into(pattern: &str, out: &mut HashMap<String, Regex>) -> SchemaResult<()> {
    if out.contains_key(pattern) {
        return Ok(());
    }
    let regex = Regex::new(pattern)
        .map_err(|e| SchemaError::InvalidSchema(format!("bad pattern {pattern}: {e}")))?;
    out.insert(pattern.to_string(), regex);
    Ok(())
}

// ---------------------------------------------------------------------------
// Walk
// ---------------------------------------------------------------------------

struct Walk<'v> {
    validator: &'v SchemaValidator,
    report: ValidationReport,
}

impl<'v> Walk<'v> {
    fn new(validator: &'v SchemaValidator) -> Self {
        Self {
            validator,
            report: ValidationReport::default(),
        }
    }

    fn fail(&mut self, ptr: &str, message: impl Into<String>) {
        self.report.errors.push(ValidationError {
            pointer: ptr.to_string(),
            message: message.into(),
        });
    }

    /// Validate in a scratch walk; returns the scratch report.
    fn probe(&self, schema: &Value, instance: &Value, ptr: &str, depth: usize) -> ValidationReport {
        let mut scratch = Walk::new(self.validator);
        scratch.visit(schema, instance, ptr, depth);
        scratch.report
    }

    fn visit(&mut self, schema: &Value, instance: &Value, ptr: &str, depth: usize) {
        if depth > MAX_DEPTH {
            self.fail(ptr, "schema nesting too deep");
            return;
        }
        let map = match schema {
            Value::Bool(true) => return,
            Value::Bool(false) => {
                self.fail(ptr, "no value is allowed here");
                return;
            }
            Value::Object(map) => map,
            _ => return,
        };

        let annotations = annotations_of(schema);
        if !annotations.is_empty() {
            self.report.pointers.record(ptr, annotations, schema);
        }

        if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
            match self.resolve_ref(reference) {
                Some(target) => self.visit(target, instance, ptr, depth + 1),
                None => self.fail(ptr, format!("unresolvable $ref {reference}")),
            }
            return;
        }

        self.check_type(map, instance, ptr);
        self.check_enum_const(map, instance, ptr);
        match instance {
            Value::Object(obj) => self.check_object(map, obj, ptr, depth),
            Value::Array(items) => self.check_array(map, items, ptr, depth),
            Value::String(s) => self.check_string(map, s, ptr),
            Value::Number(_) => self.check_number(map, instance, ptr),
            _ => {}
        }
        self.check_combinators(map, instance, ptr, depth);
    }

    fn resolve_ref(&self, reference: &str) -> Option<&'v Value> {
        let fragment = reference.strip_prefix('#')?;
        self.validator.root.pointer(fragment)
    }

    fn check_type(&mut self, map: &Map<String, Value>, instance: &Value, ptr: &str) {
        let allowed: Vec<&str> = match map.get("type") {
            Some(Value::String(t)) => vec![t.as_str()],
            Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
            _ => return,
        };
        if !allowed.iter().any(|t| type_matches(t, instance)) {
            self.fail(
                ptr,
                format!(
                    "instance type ({}) does not match any allowed primitive type (allowed: {:?})",
                    type_name(instance),
                    allowed
                ),
            );
        }
    }

    fn check_enum_const(&mut self, map: &Map<String, Value>, instance: &Value, ptr: &str) {
        if let Some(Value::Array(options)) = map.get("enum") {
            if !options.iter().any(|o| json_equal(o, instance)) {
                self.fail(ptr, "instance value not found in enum");
            }
        }
        if let Some(expected) = map.get("const") {
            if !json_equal(expected, instance) {
                self.fail(ptr, "instance value does not equal const");
            }
        }
    }

    fn check_object(&mut self, map: &Map<String, Value>, obj: &Map<String, Value>, ptr: &str, depth: usize) {
        if let Some(Value::Array(required)) = map.get("required") {
            let missing: Vec<&str> = required
                .iter()
                .filter_map(Value::as_str)
                .filter(|k| !obj.contains_key(*k))
                .collect();
            if !missing.is_empty() {
                self.fail(ptr, format!("object has missing required properties ({missing:?})"));
            }
        }
        if let Some(min) = map.get("minProperties").and_then(Value::as_u64) {
            if (obj.len() as u64) < min {
                self.fail(ptr, format!("object has fewer than {min} properties"));
            }
        }
        if let Some(max) = map.get("maxProperties").and_then(Value::as_u64) {
            if (obj.len() as u64) > max {
                self.fail(ptr, format!("object has more than {max} properties"));
            }
        }

        let properties = map.get("properties").and_then(Value::as_object);
        let pattern_properties = map.get("patternProperties").and_then(Value::as_object);
        let additional = map.get("additionalProperties");

        for (key, value) in obj {
            let child_ptr = pointer::child(ptr, key);
            let mut matched = false;
            if let Some(sub) = properties.and_then(|p| p.get(key)) {
                matched = true;
                self.visit(sub, value, &child_ptr, depth + 1);
            }
            if let Some(pp) = pattern_properties {
                for (pattern, sub) in pp {
                    if self.validator.patterns.get(pattern).is_some_and(|re| re.is_match(key)) {
                        matched = true;
                        self.visit(sub, value, &child_ptr, depth + 1);
                    }
                }
            }
            if !matched {
                match additional {
                    Some(Value::Bool(false)) => {
                        self.fail(&child_ptr, format!("additional property {key:?} is not allowed"))
                    }
                    Some(sub @ Value::Object(_)) => self.visit(sub, value, &child_ptr, depth + 1),
                    _ => {}
                }
            }
        }
    }

    fn check_array(&mut self, map: &Map<String, Value>, items: &[Value], ptr: &str, depth: usize) {
        if let Some(min) = map.get("minItems").and_then(Value::as_u64) {
            if (items.len() as u64) < min {
                self.fail(ptr, format!("array is too short: must have at least {min} elements"));
            }
        }
        if let Some(max) = map.get("maxItems").and_then(Value::as_u64) {
            if (items.len() as u64) > max {
                self.fail(ptr, format!("array is too long: must have at most {max} elements"));
            }
        }
        if map.get("uniqueItems").and_then(Value::as_bool) == Some(true) {
            let duplicated = items
                .iter()
                .enumerate()
                .any(|(i, a)| items[i + 1..].iter().any(|b| json_equal(a, b)));
            if duplicated {
                self.fail(ptr, "array must not contain duplicate elements");
            }
        }
        match map.get("items") {
            Some(Value::Array(tuple)) => {
                for (i, item) in items.iter().enumerate() {
                    let child_ptr = pointer::index_child(ptr, i);
                    match tuple.get(i) {
                        Some(sub) => self.visit(sub, item, &child_ptr, depth + 1),
                        None => match map.get("additionalItems") {
                            Some(Value::Bool(false)) => {
                                self.fail(&child_ptr, "additional items are not allowed")
                            }
                            Some(sub @ Value::Object(_)) => {
                                self.visit(sub, item, &child_ptr, depth + 1)
                            }
                            _ => {}
                        },
                    }
                }
            }
            Some(sub) => {
                for (i, item) in items.iter().enumerate() {
                    self.visit(sub, item, &pointer::index_child(ptr, i), depth + 1);
                }
            }
            None => {}
        }
    }

    fn check_string(&mut self, map: &Map<String, Value>, s: &str, ptr: &str) {
        let length = s.chars().count() as u64;
        if let Some(min) = map.get("minLength").and_then(Value::as_u64) {
            if length < min {
                self.fail(ptr, format!("string is too short (length: {length}, required minimum: {min})"));
            }
        }
        if let Some(max) = map.get("maxLength").and_then(Value::as_u64) {
            if length > max {
                self.fail(ptr, format!("string is too long (length: {length}, maximum allowed: {max})"));
            }
        }
        if let Some(pattern) = map.get("pattern").and_then(Value::as_str) {
            if let Some(re) = self.validator.patterns.get(pattern) {
                if !re.is_match(s) {
                    self.fail(ptr, format!("string does not match pattern {pattern}"));
                }
            }
        }
    }

    fn check_number(&mut self, map: &Map<String, Value>, instance: &Value, ptr: &str) {
        let Some(n) = instance.as_f64() else { return };
        if let Some(min) = map.get("minimum").and_then(Value::as_f64) {
            let exclusive = map.get("exclusiveMinimum").and_then(Value::as_bool) == Some(true);
            if n < min || (exclusive && n == min) {
                self.fail(ptr, format!("numeric instance is lower than the required minimum {min}"));
            }
        }
        if let Some(min) = map.get("exclusiveMinimum").and_then(Value::as_f64) {
            if n <= min {
                self.fail(ptr, format!("numeric instance must be greater than {min}"));
            }
        }
        if let Some(max) = map.get("maximum").and_then(Value::as_f64) {
            let exclusive = map.get("exclusiveMaximum").and_then(Value::as_bool) == Some(true);
            if n > max || (exclusive && n == max) {
                self.fail(ptr, format!("numeric instance is greater than the required maximum {max}"));
            }
        }
        if let Some(max) = map.get("exclusiveMaximum").and_then(Value::as_f64) {
            if n >= max {
                self.fail(ptr, format!("numeric instance must be less than {max}"));
            }
        }
        if let Some(divisor) = map.get("multipleOf").and_then(Value::as_f64) {
            if divisor > 0.0 {
                let quotient = n / divisor;
                if (quotient - quotient.round()).abs() > 1e-9 {
                    self.fail(ptr, format!("numeric instance is not a multiple of {divisor}"));
                }
            }
        }
    }

    fn check_combinators(&mut self, map: &Map<String, Value>, instance: &Value, ptr: &str, depth: usize) {
        if let Some(Value::Array(all)) = map.get("allOf") {
            for sub in all {
                self.visit(sub, instance, ptr, depth + 1);
            }
        }
        if let Some(Value::Array(any)) = map.get("anyOf") {
            let mut satisfied = false;
            for sub in any {
                let probe = self.probe(sub, instance, ptr, depth + 1);
                if probe.is_valid() {
                    self.report.pointers.merge(probe.pointers);
                    satisfied = true;
                    break;
                }
            }
            if !satisfied {
                self.fail(ptr, "instance failed to match at least one required schema among anyOf");
            }
        }
        if let Some(Value::Array(one)) = map.get("oneOf") {
            let mut matching: Vec<ValidationReport> = one
                .iter()
                .map(|sub| self.probe(sub, instance, ptr, depth + 1))
                .filter(ValidationReport::is_valid)
                .collect();
            if matching.len() == 1 {
                if let Some(probe) = matching.pop() {
                    self.report.pointers.merge(probe.pointers);
                }
            } else {
                self.fail(
                    ptr,
                    format!("instance matched {} schemas among oneOf; exactly one required", matching.len()),
                );
            }
        }
        if let Some(sub) = map.get("not") {
            if self.probe(sub, instance, ptr, depth + 1).is_valid() {
                self.fail(ptr, "instance must not match the schema in \"not\"");
            }
        }
    }
}

fn type_matches(name: &str, instance: &Value) -> bool {
    match name {
        "object" => instance.is_object(),
        "array" => instance.is_array(),
        "string" => instance.is_string(),
        "boolean" => instance.is_boolean(),
        "null" => instance.is_null(),
        "number" => instance.is_number(),
        "integer" => match instance {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        },
        _ => false,
    }
}

fn type_name(instance: &Value) -> &'static str {
    match instance {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JSON equality where `1` and `1.0` compare equal.
fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Annotation, AuthKind};
    use serde_json::json;

    fn user_schema() -> Value {
        json!({
            "type": "object",
            "required": ["username", "password"],
            "properties": {
                "id": {"type": "string", "cordra": {"type": {"autoGeneratedField": "handle"}}},
                "username": {"type": "string", "minLength": 1, "cordra": {"auth": "username"}},
                "password": {"type": "string", "cordra": {"auth": "password"}},
                "groups": {
                    "type": "array",
                    "items": {"$ref": "#/definitions/ref"}
                }
            },
            "definitions": {
                "ref": {"type": "string", "cordra": {"type": {"handleReference": {"types": ["Group"]}}}}
            }
        })
    }

    // -----------------------------------------------------------------------
    // Pointer map construction
    // -----------------------------------------------------------------------

    #[test]
    fn valid_document_yields_pointer_map() {
        let v = SchemaValidator::new(user_schema()).unwrap();
        let report = v.validate(&json!({
            "username": "alice",
            "password": "secret",
            "groups": ["test/g1", "test/g2"]
        }));
        assert!(report.is_valid(), "{:?}", report.errors);
        assert_eq!(report.pointers.first_auth_pointer(AuthKind::Username), Some("/username"));
        assert!(report.pointers.get("/groups/0").is_some());
        assert!(report.pointers.get("/groups/1").is_some());
        // The annotated id field is absent from the document, so it is not mapped.
        assert!(report.pointers.get("/id").is_none());
    }

    #[test]
    fn escaped_keys_in_pointers() {
        let schema = json!({
            "type": "object",
            "additionalProperties": {"cordra": {"secureProperty": true}}
        });
        let report = SchemaValidator::new(schema).unwrap().validate(&json!({"a/b": "x"}));
        assert!(report.pointers.get("/a~1b").is_some());
    }

    // -----------------------------------------------------------------------
    // Violations
    // -----------------------------------------------------------------------

    #[test]
    fn missing_required_is_reported_at_parent() {
        let v = SchemaValidator::new(user_schema()).unwrap();
        let report = v.validate(&json!({"username": "alice"}));
        assert!(!report.is_valid());
        let err = report.first_error().unwrap();
        assert_eq!(err.pointer, "");
        assert!(err.message.contains("password"));
    }

    #[test]
    fn type_and_length_violations_carry_pointer() {
        let v = SchemaValidator::new(user_schema()).unwrap();
        let report = v.validate(&json!({"username": "", "password": 5}));
        let pointers: Vec<&str> = report.errors.iter().map(|e| e.pointer.as_str()).collect();
        assert!(pointers.contains(&"/username"));
        assert!(pointers.contains(&"/password"));
    }

    #[test]
    fn additional_properties_false() {
        let schema = json!({"type": "object", "properties": {"a": {}}, "additionalProperties": false});
        let report = SchemaValidator::new(schema).unwrap().validate(&json!({"a": 1, "b": 2}));
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].pointer, "/b");
    }

    #[test]
    fn numeric_bounds_and_enum() {
        let schema = json!({
            "type": "object",
            "properties": {
                "n": {"type": "integer", "minimum": 1, "maximum": 10},
                "c": {"enum": ["red", "green"]}
            }
        });
        let v = SchemaValidator::new(schema).unwrap();
        assert!(v.validate(&json!({"n": 5, "c": "red"})).is_valid());
        assert!(!v.validate(&json!({"n": 11})).is_valid());
        assert!(!v.validate(&json!({"n": 1.5})).is_valid());
        assert!(!v.validate(&json!({"c": "blue"})).is_valid());
    }

    #[test]
    fn pattern_is_enforced_and_bad_patterns_rejected() {
        let v = SchemaValidator::new(json!({"type": "string", "pattern": "^[a-z]+$"})).unwrap();
        assert!(v.validate(&json!("abc")).is_valid());
        assert!(!v.validate(&json!("ABC")).is_valid());
        assert!(SchemaValidator::new(json!({"pattern": "("})).is_err());
    }

    #[test]
    fn unresolvable_ref_is_an_error() {
        let v = SchemaValidator::new(json!({"$ref": "#/definitions/missing"})).unwrap();
        assert!(!v.validate(&json!(1)).is_valid());
    }

    // -----------------------------------------------------------------------
    // Combinators
    // -----------------------------------------------------------------------

    #[test]
    fn one_of_takes_pointers_from_matching_branch_only() {
        let schema = json!({
            "oneOf": [
                {"type": "object", "required": ["kind"], "properties": {"kind": {"const": "a"}, "v": {"cordra": {"secureProperty": true}}}},
                {"type": "object", "required": ["kind"], "properties": {"kind": {"const": "b"}, "v": {"cordra": {"preview": {"isPrimary": true}}}}}
            ]
        });
        let v = SchemaValidator::new(schema).unwrap();
        let report = v.validate(&json!({"kind": "b", "v": "x"}));
        assert!(report.is_valid(), "{:?}", report.errors);
        assert_eq!(report.pointers.get("/v").unwrap().annotations, vec![Annotation::PrimaryPreview]);
        assert!(!v.validate(&json!({"kind": "c"})).is_valid());
    }

    #[test]
    fn any_of_and_not() {
        let schema = json!({"anyOf": [{"type": "string"}, {"type": "number"}], "not": {"const": 0}});
        let v = SchemaValidator::new(schema).unwrap();
        assert!(v.validate(&json!("s")).is_valid());
        assert!(v.validate(&json!(3)).is_valid());
        assert!(!v.validate(&json!(0)).is_valid());
        assert!(!v.validate(&json!(true)).is_valid());
    }

    #[test]
    fn self_referential_schema_terminates() {
        let schema = json!({
            "type": "object",
            "properties": {"child": {"$ref": "#"}}
        });
        let v = SchemaValidator::new(schema).unwrap();
        assert!(v.validate(&json!({"child": {"child": {}}})).is_valid());
    }
}
