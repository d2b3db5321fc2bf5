use serde_json::Value;

use crate::gateway::error::OptionError;

/// Merge one option family: seed from `defaults` unless `use_defaults` is an
/// explicit `false`, then union in every entry of `supplied`, keeping
/// first-seen order and dropping duplicates.
///
/// `validate` turns a raw JSON entry into a typed value. It sees the working
/// set as it stands before the entry is added, so cross-entry rules (such as
/// "only one success code") can be enforced in input order.
pub fn coalesce<T, F>(
    family: &str,
    use_defaults: Option<bool>,
    defaults: &[T],
    supplied: Option<&Value>,
    mut validate: F,
) -> Result<Vec<T>, OptionError>
where
    T: Clone + PartialEq,
    F: FnMut(&[T], &Value) -> Result<T, OptionError>,
{
    let mut working = if use_defaults == Some(false) {
        Vec::new()
    } else {
        defaults.to_vec()
    };

    let Some(raw) = supplied else {
        return Ok(working);
    };

    let items = raw.as_array().ok_or_else(|| {
        OptionError::invalid(format!("{family} property must be an array, got {raw}"))
    })?;

    for item in items {
        let value = validate(&working, item)?;
        if !working.contains(&value) {
            working.push(value);
        }
    }
    Ok(working)
}

/// Validator for families whose entries are free-form strings.
pub fn string_entry(family: &'static str) -> impl Fn(&[String], &Value) -> Result<String, OptionError> {
    move |_, item| {
        item.as_str()
            .map(str::to_string)
            .ok_or_else(|| OptionError::invalid(format!("{family} entries must be strings, got {item}")))
    }
}
