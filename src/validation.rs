use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

/// Form fields exactly as submitted.
pub type RawForm = HashMap<String, String>;

/// Violations keyed by field name, in submission-independent order.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Collects every violation of a submission instead of stopping at the first.
///
/// Each check returns `Some(value)` when the field passes and records a
/// message otherwise, so a `None` from any check always comes with an entry
/// in the error map.
pub struct Validator<'a> {
    form: &'a RawForm,
    errors: FieldErrors,
}

impl<'a> Validator<'a> {
    pub fn new(form: &'a RawForm) -> Self {
        Self {
            form,
            errors: FieldErrors::new(),
        }
    }

    pub fn raw(&self, field: &str) -> Option<&'a str> {
        self.form.get(field).map(String::as_str)
    }

    pub fn reject(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Present and not blank.
    pub fn required(&mut self, field: &str, message: &str) -> Option<&'a str> {
        match self.raw(field) {
            Some(v) if !v.trim().is_empty() => Some(v),
            _ => {
                self.reject(field, message);
                None
            }
        }
    }

    /// Coerces the field to a number. A blank value coerces to zero, a missing
    /// or non-numeric one is rejected.
    pub fn number(&mut self, field: &str, message: &str) -> Option<f64> {
        let parsed = self.raw(field).and_then(|v| {
            let v = v.trim();
            if v.is_empty() {
                Some(0.0)
            } else {
                v.parse::<f64>().ok().filter(|n| n.is_finite())
            }
        });
        if parsed.is_none() {
            self.reject(field, message);
        }
        parsed
    }

    pub fn greater_than(
        &mut self,
        field: &str,
        value: Option<f64>,
        bound: f64,
        message: &str,
    ) -> Option<f64> {
        let value = value?;
        if value > bound {
            Some(value)
        } else {
            self.reject(field, message);
            None
        }
    }

    /// Closed-set membership, decided by the target type's `FromStr`.
    pub fn one_of<T: FromStr>(&mut self, field: &str, message: &str) -> Option<T> {
        let parsed = self.raw(field).and_then(|v| v.parse::<T>().ok());
        if parsed.is_none() {
            self.reject(field, message);
        }
        parsed
    }

    /// Length bounds in characters, checked on `value` as the caller will
    /// store it. Violations are recorded under `field`.
    pub fn length(
        &mut self,
        field: &str,
        value: &'a str,
        min: usize,
        max: usize,
        too_short: &str,
        too_long: &str,
    ) -> Option<&'a str> {
        let len = value.chars().count();
        if len < min {
            self.reject(field, too_short);
            None
        } else if len > max {
            self.reject(field, too_long);
            None
        } else {
            Some(value)
        }
    }

    pub fn email(&mut self, field: &str, message: &str) -> Option<&'a str> {
        match self.raw(field).map(str::trim) {
            Some(v) if is_valid_email(v) => Some(v),
            _ => {
                self.reject(field, message);
                None
            }
        }
    }

    /// Runs every rule against `value`; each failing rule adds its own message.
    pub fn patterns(
        &mut self,
        field: &str,
        value: Option<&'a str>,
        rules: &[(&Regex, &str)],
    ) -> Option<&'a str> {
        let value = value?;
        let mut ok = true;
        for (re, message) in rules {
            if !re.is_match(value) {
                self.reject(field, *message);
                ok = false;
            }
        }
        ok.then_some(value)
    }

    /// Cross-field equality. The violation lands on `field`, the dependent one.
    pub fn same_as(&mut self, field: &str, other: &str, message: &str) -> bool {
        let equal = self.raw(field).unwrap_or("") == self.raw(other).unwrap_or("");
        if !equal {
            self.reject(field, message);
        }
        equal
    }

    pub fn finish<T>(self, value: Option<T>) -> Result<T, FieldErrors> {
        if !self.errors.is_empty() {
            return Err(self.errors);
        }
        value.ok_or(self.errors)
    }
}

#[cfg(test)]
pub(crate) fn form(pairs: &[(&str, &str)]) -> RawForm {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
