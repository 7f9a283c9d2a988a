//! Conversion between JSON and Starlark values

use starlark::values::Heap;
use starlark::values::Value;
use starlark::values::dict::AllocDict;
use starlark::values::list::AllocList;

/// Allocate a mutable Starlark copy of a JSON value.
///
/// Objects become dicts and arrays become lists, so hook code can mutate
/// nested fields in place. Integers outside the `i64` range become floats.
pub(crate) fn json_to_value<'v>(heap: &'v Heap, json: &serde_json::Value) -> Value<'v> {
    match json {
        serde_json::Value::Null => Value::new_none(),
        serde_json::Value::Bool(value) => Value::new_bool(*value),
        serde_json::Value::Number(number) => match number.as_i64() {
            Some(value) => heap.alloc(value),
            None => heap.alloc(number.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(value) => heap.alloc(value.as_str()),
        serde_json::Value::Array(items) => heap.alloc(AllocList(
            items.iter().map(|item| json_to_value(heap, item)),
        )),
        serde_json::Value::Object(fields) => heap.alloc(AllocDict(
            fields
                .iter()
                .map(|(key, value)| (key.as_str(), json_to_value(heap, value))),
        )),
    }
}

/// Read a Starlark value back as JSON. Fails for values with no JSON form
/// (functions, non-string dict keys).
pub(crate) fn value_to_json(value: Value<'_>) -> Result<serde_json::Value, String> {
    value.to_json_value().map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use starlark::environment::Module;

    #[test]
    fn test_json_survives_conversion() {
        let module = Module::new();
        let original = json!({
            "name": "A > B",
            "skip": false,
            "request": {"headers": {"Accept": "application/json"}, "body": ""},
            "codes": [200, 201],
            "ratio": 0.5,
            "id": null
        });

        let value = json_to_value(module.heap(), &original);

        assert_eq!(value.get_type(), "dict");
        assert_eq!(value_to_json(value).unwrap(), original);
    }
}
