//! Closed table of pure functions callable from values
//!
//! Arguments arrive already evaluated. Each function checks its arity and
//! argument shapes before doing anything and fails with a [`FunctionError`]
//! that the evaluator turns into one diagnostic and a `null` result.

use serde_json::{Map, Value as JsonValue};

use super::number_to_json;
use super::variables::json_type_name;
use crate::diagnostics::{suggest, with_suggestion};
use crate::error::FunctionError;

/// Every callable function name
pub const FUNCTION_NAMES: &[&str] = &[
    "if", "coalesce", "default", "merge", "concat", "distinct", "sort", "join", "upper", "lower",
    "replace", "lookup", "keys", "values", "length", "and", "or", "not",
];

type FnResult = Result<JsonValue, FunctionError>;

/// Dispatch `name(args)`
pub fn call(name: &str, args: Vec<JsonValue>, suggestion_threshold: f64) -> FnResult {
    match name {
        "if" => fn_if(args),
        "coalesce" => fn_coalesce(args),
        "default" => fn_default(args),
        "merge" => fn_merge(args),
        "concat" => fn_concat(args),
        "distinct" => fn_distinct(args),
        "sort" => fn_sort(args),
        "join" => fn_join(args),
        "upper" => map_string("upper", args, |s| s.to_uppercase()),
        "lower" => map_string("lower", args, |s| s.to_lowercase()),
        "replace" => fn_replace(args),
        "lookup" => fn_lookup(args),
        "keys" => fn_keys(args),
        "values" => fn_values(args),
        "length" => fn_length(args),
        "and" => fn_bool_fold("and", args, true),
        "or" => fn_bool_fold("or", args, false),
        "not" => fn_not(args),
        _ => {
            let hint = suggest(name, FUNCTION_NAMES.iter().copied(), suggestion_threshold);
            Err(FunctionError::Unknown {
                name: name.to_string(),
                hint: with_suggestion(String::new(), hint),
            })
        }
    }
}

// ============================================================================
// Argument checks
// ============================================================================

fn arity(name: &str, args: &[JsonValue], min: usize, max: Option<usize>) -> Result<(), FunctionError> {
    let found = args.len();
    let ok = found >= min && max.map_or(true, |m| found <= m);
    if ok {
        return Ok(());
    }
    let expected = match max {
        Some(m) if m == min => min.to_string(),
        Some(m) => format!("{} to {}", min, m),
        None => format!("at least {}", min),
    };
    Err(FunctionError::Arity {
        name: name.to_string(),
        expected,
        found,
    })
}

fn shape_error(name: &str, position: usize, expected: &str, found: &JsonValue) -> FunctionError {
    FunctionError::argument(
        name,
        format!(
            "argument {} must be {}, got {}",
            position + 1,
            expected,
            json_type_name(found)
        ),
    )
}

fn as_bool(name: &str, position: usize, value: &JsonValue) -> Result<bool, FunctionError> {
    value
        .as_bool()
        .ok_or_else(|| shape_error(name, position, "a boolean", value))
}

fn as_str<'a>(name: &str, position: usize, value: &'a JsonValue) -> Result<&'a str, FunctionError> {
    value
        .as_str()
        .ok_or_else(|| shape_error(name, position, "a string", value))
}

// ============================================================================
// Functions
// ============================================================================

fn fn_if(mut args: Vec<JsonValue>) -> FnResult {
    arity("if", &args, 3, Some(3))?;
    let condition = as_bool("if", 0, &args[0])?;
    let else_value = args.swap_remove(2);
    let then_value = args.swap_remove(1);
    Ok(if condition { then_value } else { else_value })
}

fn fn_coalesce(args: Vec<JsonValue>) -> FnResult {
    arity("coalesce", &args, 1, None)?;
    Ok(args
        .into_iter()
        .find(|v| !v.is_null())
        .unwrap_or(JsonValue::Null))
}

fn fn_default(mut args: Vec<JsonValue>) -> FnResult {
    arity("default", &args, 2, Some(2))?;
    let fallback = args.swap_remove(1);
    let value = args.swap_remove(0);
    Ok(if value.is_null() { fallback } else { value })
}

fn fn_merge(args: Vec<JsonValue>) -> FnResult {
    arity("merge", &args, 1, None)?;
    let mut merged = Map::new();
    for (i, arg) in args.into_iter().enumerate() {
        match arg {
            JsonValue::Object(map) => merged.extend(map),
            other => return Err(shape_error("merge", i, "a map", &other)),
        }
    }
    Ok(JsonValue::Object(merged))
}

fn fn_concat(args: Vec<JsonValue>) -> FnResult {
    arity("concat", &args, 1, None)?;
    if args.iter().all(JsonValue::is_array) {
        let items = args
            .into_iter()
            .flat_map(|a| match a {
                JsonValue::Array(items) => items,
                _ => Vec::new(),
            })
            .collect();
        return Ok(JsonValue::Array(items));
    }
    if args.iter().all(JsonValue::is_string) {
        let joined: String = args.iter().filter_map(JsonValue::as_str).collect();
        return Ok(JsonValue::String(joined));
    }
    Err(FunctionError::argument(
        "concat",
        "arguments must be all arrays or all strings",
    ))
}

fn fn_distinct(mut args: Vec<JsonValue>) -> FnResult {
    arity("distinct", &args, 1, Some(1))?;
    match args.swap_remove(0) {
        JsonValue::Array(items) => {
            let mut out: Vec<JsonValue> = Vec::with_capacity(items.len());
            for item in items {
                if !out.contains(&item) {
                    out.push(item);
                }
            }
            Ok(JsonValue::Array(out))
        }
        other => Err(shape_error("distinct", 0, "an array", &other)),
    }
}

fn fn_sort(mut args: Vec<JsonValue>) -> FnResult {
    arity("sort", &args, 1, Some(1))?;
    let items = match args.swap_remove(0) {
        JsonValue::Array(items) => items,
        other => return Err(shape_error("sort", 0, "an array", &other)),
    };

    if items.iter().all(JsonValue::is_string) {
        let mut strings: Vec<String> = items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        strings.sort();
        return Ok(JsonValue::Array(
            strings.into_iter().map(JsonValue::String).collect(),
        ));
    }
    if items.iter().all(JsonValue::is_number) {
        let mut numbers: Vec<f64> = items.iter().filter_map(JsonValue::as_f64).collect();
        numbers.sort_by(f64::total_cmp);
        return Ok(JsonValue::Array(
            numbers.into_iter().map(number_to_json).collect(),
        ));
    }
    Err(FunctionError::argument(
        "sort",
        "list must contain only strings or only numbers",
    ))
}

fn fn_join(args: Vec<JsonValue>) -> FnResult {
    arity("join", &args, 2, Some(2))?;
    let separator = as_str("join", 1, &args[1])?;
    let JsonValue::Array(items) = &args[0] else {
        return Err(shape_error("join", 0, "an array", &args[0]));
    };
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        match item {
            JsonValue::String(s) => parts.push(s.clone()),
            JsonValue::Number(n) => parts.push(n.to_string()),
            other => {
                return Err(FunctionError::argument(
                    "join",
                    format!("cannot join a {}", json_type_name(other)),
                ))
            }
        }
    }
    Ok(JsonValue::String(parts.join(separator)))
}

fn map_string(name: &str, args: Vec<JsonValue>, f: impl Fn(&str) -> String) -> FnResult {
    arity(name, &args, 1, Some(1))?;
    let s = as_str(name, 0, &args[0])?;
    Ok(JsonValue::String(f(s)))
}

fn fn_replace(args: Vec<JsonValue>) -> FnResult {
    arity("replace", &args, 3, Some(3))?;
    let s = as_str("replace", 0, &args[0])?;
    let from = as_str("replace", 1, &args[1])?;
    let to = as_str("replace", 2, &args[2])?;
    if from.is_empty() {
        return Err(FunctionError::argument(
            "replace",
            "search string must not be empty",
        ));
    }
    Ok(JsonValue::String(s.replace(from, to)))
}

fn fn_lookup(mut args: Vec<JsonValue>) -> FnResult {
    arity("lookup", &args, 2, Some(3))?;
    let fallback = if args.len() == 3 {
        Some(args.swap_remove(2))
    } else {
        None
    };
    let key = as_str("lookup", 1, &args[1])?;
    let JsonValue::Object(map) = &args[0] else {
        return Err(shape_error("lookup", 0, "a map", &args[0]));
    };
    match (map.get(key), fallback) {
        (Some(v), _) => Ok(v.clone()),
        (None, Some(fallback)) => Ok(fallback),
        (None, None) => Err(FunctionError::argument(
            "lookup",
            format!("key '{}' not found and no default given", key),
        )),
    }
}

fn fn_keys(args: Vec<JsonValue>) -> FnResult {
    arity("keys", &args, 1, Some(1))?;
    match &args[0] {
        JsonValue::Object(map) => Ok(JsonValue::Array(
            map.keys().cloned().map(JsonValue::String).collect(),
        )),
        other => Err(shape_error("keys", 0, "a map", other)),
    }
}

fn fn_values(mut args: Vec<JsonValue>) -> FnResult {
    arity("values", &args, 1, Some(1))?;
    match args.swap_remove(0) {
        JsonValue::Object(map) => Ok(JsonValue::Array(map.into_iter().map(|(_, v)| v).collect())),
        other => Err(shape_error("values", 0, "a map", &other)),
    }
}

fn fn_length(args: Vec<JsonValue>) -> FnResult {
    arity("length", &args, 1, Some(1))?;
    let len = match &args[0] {
        JsonValue::Array(items) => items.len(),
        JsonValue::String(s) => s.chars().count(),
        JsonValue::Object(map) => map.len(),
        other => return Err(shape_error("length", 0, "an array, string or map", other)),
    };
    Ok(JsonValue::from(len))
}

fn fn_bool_fold(name: &str, args: Vec<JsonValue>, is_and: bool) -> FnResult {
    arity(name, &args, 1, None)?;
    let mut acc = is_and;
    for (i, arg) in args.iter().enumerate() {
        let b = as_bool(name, i, arg)?;
        acc = if is_and { acc && b } else { acc || b };
    }
    Ok(JsonValue::Bool(acc))
}

fn fn_not(args: Vec<JsonValue>) -> FnResult {
    arity("not", &args, 1, Some(1))?;
    Ok(JsonValue::Bool(!as_bool("not", 0, &args[0])?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn run(name: &str, args: Vec<JsonValue>) -> FnResult {
        call(name, args, 0.8)
    }

    #[test]
    fn test_conditionals() {
        assert_eq!(run("if", vec![json!(true), json!("a"), json!("b")]).unwrap(), json!("a"));
        assert_eq!(run("if", vec![json!(false), json!("a"), json!("b")]).unwrap(), json!("b"));
        assert_eq!(run("coalesce", vec![json!(null), json!(null), json!(3)]).unwrap(), json!(3));
        assert_eq!(run("default", vec![json!(null), json!("x")]).unwrap(), json!("x"));
        assert!(run("if", vec![json!(1), json!("a"), json!("b")]).is_err());
    }

    #[test]
    fn test_collections() {
        assert_eq!(
            run("merge", vec![json!({"a": 1, "b": 1}), json!({"b": 2})]).unwrap(),
            json!({"a": 1, "b": 2})
        );
        assert_eq!(
            run("concat", vec![json!([1]), json!([2, 3])]).unwrap(),
            json!([1, 2, 3])
        );
        assert_eq!(run("concat", vec![json!("ab"), json!("c")]).unwrap(), json!("abc"));
        assert!(run("concat", vec![json!("ab"), json!([1])]).is_err());
        assert_eq!(
            run("distinct", vec![json!(["a", "b", "a"])]).unwrap(),
            json!(["a", "b"])
        );
        assert_eq!(run("sort", vec![json!([3, 1, 2])]).unwrap(), json!([1, 2, 3]));
        assert_eq!(run("sort", vec![json!(["b", "a"])]).unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn test_sort_rejects_mixed_list() {
        let err = run("sort", vec![json!(["a", 1])]).unwrap_err();
        assert!(matches!(err, FunctionError::Argument { .. }));
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            run("join", vec![json!(["a", "b", 3]), json!(", ")]).unwrap(),
            json!("a, b, 3")
        );
        assert_eq!(run("upper", vec![json!("ab")]).unwrap(), json!("AB"));
        assert_eq!(run("lower", vec![json!("AB")]).unwrap(), json!("ab"));
        assert_eq!(
            run("replace", vec![json!("a-b-c"), json!("-"), json!("_")]).unwrap(),
            json!("a_b_c")
        );
    }

    #[test]
    fn test_maps() {
        let map = json!({"b": 2, "a": 1});
        assert_eq!(run("lookup", vec![map.clone(), json!("a")]).unwrap(), json!(1));
        assert_eq!(
            run("lookup", vec![map.clone(), json!("z"), json!(0)]).unwrap(),
            json!(0)
        );
        assert!(run("lookup", vec![map.clone(), json!("z")]).is_err());
        assert_eq!(run("keys", vec![map.clone()]).unwrap(), json!(["a", "b"]));
        assert_eq!(run("values", vec![map.clone()]).unwrap(), json!([1, 2]));
        assert_eq!(run("length", vec![map]).unwrap(), json!(2));
        assert_eq!(run("length", vec![json!("héllo")]).unwrap(), json!(5));
    }

    #[test]
    fn test_boolean_algebra() {
        assert_eq!(run("and", vec![json!(true), json!(false)]).unwrap(), json!(false));
        assert_eq!(run("or", vec![json!(true), json!(false)]).unwrap(), json!(true));
        assert_eq!(run("not", vec![json!(true)]).unwrap(), json!(false));
    }

    #[test]
    fn test_arity_and_unknown() {
        let err = run("upper", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "upper() expects 1 argument(s), got 0");
        let err = run("lenght", vec![json!([])]).unwrap_err();
        assert!(err.to_string().contains("did you mean 'length'"));
    }
}
