// Built-in Terraform functions organized by category

pub mod collection;
pub mod conversion;
pub mod datetime;
pub mod encoding;
pub mod filesystem;
pub mod network;
pub mod numeric;
pub mod string;

use hcl::eval::{Context, FuncArgs};
use hcl::Value;

/// Create a context with all built-in functions
pub fn create_context() -> Context<'static> {
    let mut ctx = Context::new();

    // String functions
    ctx.declare_func("upper", string::create_upper_func());
    ctx.declare_func("lower", string::create_lower_func());
    ctx.declare_func("title", string::create_title_func());
    ctx.declare_func("trimspace", string::create_trimspace_func());
    ctx.declare_func("trim", string::create_trim_func());
    ctx.declare_func("trimprefix", string::create_trimprefix_func());
    ctx.declare_func("trimsuffix", string::create_trimsuffix_func());
    ctx.declare_func("chomp", string::create_chomp_func());
    ctx.declare_func("replace", string::create_replace_func());
    ctx.declare_func("substr", string::create_substr_func());
    ctx.declare_func("startswith", string::create_startswith_func());
    ctx.declare_func("endswith", string::create_endswith_func());
    ctx.declare_func("strcontains", string::create_strcontains_func());
    ctx.declare_func("strrev", string::create_strrev_func());
    ctx.declare_func("format", string::create_format_func());
    ctx.declare_func("join", string::create_join_func());
    ctx.declare_func("split", string::create_split_func());
    ctx.declare_func("formatlist", string::create_formatlist_func());
    ctx.declare_func("regex", string::create_regex_func());
    ctx.declare_func("regexall", string::create_regexall_func());

    // Collection functions
    ctx.declare_func("length", collection::create_length_func());
    ctx.declare_func("concat", collection::create_concat_func());
    ctx.declare_func("flatten", collection::create_flatten_func());
    ctx.declare_func("distinct", collection::create_distinct_func());
    ctx.declare_func("slice", collection::create_slice_func());
    ctx.declare_func("sort", collection::create_sort_func());
    ctx.declare_func("reverse", collection::create_reverse_func());
    ctx.declare_func("index", collection::create_index_func());
    ctx.declare_func("contains", collection::create_contains_func());
    ctx.declare_func("keys", collection::create_keys_func());
    ctx.declare_func("values", collection::create_values_func());
    ctx.declare_func("lookup", collection::create_lookup_func());
    ctx.declare_func("merge", collection::create_merge_func());
    ctx.declare_func("element", collection::create_element_func());
    ctx.declare_func("zipmap", collection::create_zipmap_func());
    ctx.declare_func("compact", collection::create_compact_func());
    ctx.declare_func("coalesce", collection::create_coalesce_func());
    ctx.declare_func("coalescelist", collection::create_coalescelist_func());
    ctx.declare_func("range", collection::create_range_func());
    ctx.declare_func("setunion", collection::create_setunion_func());
    ctx.declare_func("setintersection", collection::create_setintersection_func());
    ctx.declare_func("setsubtract", collection::create_setsubtract_func());

    // Numeric functions
    ctx.declare_func("min", numeric::create_min_func());
    ctx.declare_func("max", numeric::create_max_func());
    ctx.declare_func("abs", numeric::create_abs_func());
    ctx.declare_func("ceil", numeric::create_ceil_func());
    ctx.declare_func("floor", numeric::create_floor_func());
    ctx.declare_func("signum", numeric::create_signum_func());
    ctx.declare_func("parseint", numeric::create_parseint_func());

    // Type conversion functions
    ctx.declare_func("tostring", conversion::create_tostring_func());
    ctx.declare_func("tonumber", conversion::create_tonumber_func());
    ctx.declare_func("tobool", conversion::create_tobool_func());
    ctx.declare_func("tolist", conversion::create_tolist_func());
    ctx.declare_func("toset", conversion::create_toset_func());
    ctx.declare_func("tomap", conversion::create_tomap_func());
    ctx.declare_func("jsonencode", conversion::create_jsonencode_func());
    ctx.declare_func("jsondecode", conversion::create_jsondecode_func());

    // Hashing and encoding functions
    ctx.declare_func("md5", encoding::create_md5_func());
    ctx.declare_func("sha256", encoding::create_sha256_func());
    ctx.declare_func("sha512", encoding::create_sha512_func());
    ctx.declare_func("base64encode", encoding::create_base64encode_func());
    ctx.declare_func("base64decode", encoding::create_base64decode_func());
    ctx.declare_func("base64sha256", encoding::create_base64sha256_func());

    // Network functions
    ctx.declare_func("cidrsubnet", network::create_cidrsubnet_func());
    ctx.declare_func("cidrhost", network::create_cidrhost_func());
    ctx.declare_func("cidrnetmask", network::create_cidrnetmask_func());

    // Date and time functions
    ctx.declare_func("timestamp", datetime::create_timestamp_func());
    ctx.declare_func("formatdate", datetime::create_formatdate_func());
    ctx.declare_func("timeadd", datetime::create_timeadd_func());
    ctx.declare_func("timecmp", datetime::create_timecmp_func());

    // file, fileexists, filebase64 and templatefile are inlined before
    // evaluation, see `filesystem`

    ctx
}

pub(crate) fn str_arg(args: &FuncArgs, index: usize) -> Result<&str, String> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {} must be a string", index + 1))
}

pub(crate) fn array_arg(args: &FuncArgs, index: usize) -> Result<&Vec<Value>, String> {
    args.get(index)
        .and_then(Value::as_array)
        .ok_or_else(|| format!("argument {} must be a list", index + 1))
}

pub(crate) fn object_arg(
    args: &FuncArgs,
    index: usize,
) -> Result<&hcl::value::Map<String, Value>, String> {
    args.get(index)
        .and_then(Value::as_object)
        .ok_or_else(|| format!("argument {} must be a map", index + 1))
}

pub(crate) fn f64_arg(args: &FuncArgs, index: usize) -> Result<f64, String> {
    args.get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("argument {} must be a number", index + 1))
}

pub(crate) fn i64_arg(args: &FuncArgs, index: usize) -> Result<i64, String> {
    f64_arg(args, index).map(|f| f as i64)
}

/// Builds a number value, preferring an integer representation.
pub(crate) fn number(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        hcl::Number::from_f64(f).map_or(Value::Null, Value::Number)
    }
}

/// Renders a primitive the way string interpolation does.
pub(crate) fn to_plain_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err("cannot convert null to string".to_string()),
        other => Err(format!("cannot convert {other} to string")),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hcl::eval::Evaluate;

    pub(crate) fn eval(expr_str: &str) -> Result<Value, String> {
        let ctx = create_context();
        let body: hcl::Body = hcl::from_str(&format!("test = {}", expr_str)).unwrap();
        let expr = body
            .attributes()
            .find(|a| a.key() == "test")
            .unwrap()
            .expr();
        expr.evaluate(&ctx).map_err(|e| e.to_string())
    }

    #[test]
    fn test_all_functions_registered() {
        let calls = [
            "upper(\"a\")",
            "length([1])",
            "min(1, 2)",
            "tostring(1)",
            "md5(\"a\")",
            "join(\",\", [\"a\"])",
            "keys({a = 1})",
            "formatlist(\"%s\", [\"a\"])",
            "regexall(\"a\", \"a\")",
            "setunion([1], [2])",
            "cidrhost(\"10.0.0.0/8\", 1)",
            "timeadd(timestamp(), \"1h\")",
        ];
        for call in calls {
            assert!(eval(call).is_ok(), "{call} should evaluate");
        }
    }

    #[test]
    fn test_unknown_function_fails() {
        assert!(eval("nope(1)").is_err());
    }
}
