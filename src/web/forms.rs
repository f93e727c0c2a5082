//! Submitted-form validation.

use std::collections::HashMap;

/// Validation messages keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct FormErrors(HashMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    /// First message recorded for `field`.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(|messages| messages.first())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A submitted form plus the errors found while validating it.
#[derive(Debug, Clone, Default)]
pub struct Form {
    data: HashMap<String, String>,
    pub errors: FormErrors,
}

impl Form {
    pub fn new(data: HashMap<String, String>) -> Self {
        Self {
            data,
            errors: FormErrors::default(),
        }
    }

    /// Whether `field` was submitted with a non-empty value.
    pub fn has(&self, field: &str) -> bool {
        self.data.get(field).is_some_and(|v| !v.trim().is_empty())
    }

    /// Submitted value, or `""`.
    pub fn get(&self, field: &str) -> &str {
        self.data.get(field).map(String::as_str).unwrap_or_default()
    }

    pub fn required(&mut self, fields: &[&str]) {
        for field in fields {
            if !self.has(field) {
                self.errors.add(field, "This field cannot be blank");
            }
        }
    }

    /// Record `message` against `field` unless `ok`.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.errors.add(field, message);
        }
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_has() {
        let form = Form::default();
        assert!(!form.has("whatever"));

        let form = Form::new(data(&[("a", "a"), ("blank", "  ")]));
        assert!(form.has("a"));
        assert!(!form.has("blank"));
    }

    #[test]
    fn test_required() {
        let mut form = Form::default();
        form.required(&["a", "b", "c"]);
        assert!(!form.valid());
        assert!(form.errors.get("b").is_some());

        let mut form = Form::new(data(&[("a", "a"), ("b", "b"), ("c", "c")]));
        form.required(&["a", "b", "c"]);
        assert!(form.valid());
    }

    #[test]
    fn test_check() {
        let mut form = Form::default();
        form.check(true, "password", "password is required");
        assert!(form.valid());

        form.check(false, "password", "password is required");
        assert!(!form.valid());
    }

    #[test]
    fn test_errors_get() {
        let mut form = Form::default();
        form.check(false, "password", "password is required");
        form.check(false, "password", "second message");

        assert_eq!(form.errors.get("password"), Some("password is required"));
        assert!(form.errors.get("not_exists").is_none());
    }

    #[test]
    fn test_get() {
        let form = Form::new(data(&[("email", "admin@example.com")]));
        assert_eq!(form.get("email"), "admin@example.com");
        assert_eq!(form.get("missing"), "");
    }
}
