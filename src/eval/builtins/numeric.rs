use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;

use super::{f64_arg, number, str_arg};

fn numbers(args: &FuncArgs) -> Result<Vec<f64>, String> {
    (0..args.len()).map(|i| f64_arg(args, i)).collect()
}

/// Numeric functions
pub fn create_min_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .variadic_param(ParamType::Number)
        .build(|args: FuncArgs| {
            let min = numbers(&args)?.into_iter().fold(f64::INFINITY, f64::min);
            Ok(number(min))
        })
}

pub fn create_max_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .variadic_param(ParamType::Number)
        .build(|args: FuncArgs| {
            let max = numbers(&args)?
                .into_iter()
                .fold(f64::NEG_INFINITY, f64::max);
            Ok(number(max))
        })
}

pub fn create_abs_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .build(|args: FuncArgs| Ok(number(f64_arg(&args, 0)?.abs())))
}

pub fn create_ceil_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .build(|args: FuncArgs| Ok(number(f64_arg(&args, 0)?.ceil())))
}

pub fn create_floor_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .build(|args: FuncArgs| Ok(number(f64_arg(&args, 0)?.floor())))
}

/// -1, 0 or 1 depending on the sign
pub fn create_signum_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let n = f64_arg(&args, 0)?;
            let sign = if n > 0.0 {
                1
            } else if n < 0.0 {
                -1
            } else {
                0
            };
            Ok(Value::from(sign))
        })
}

/// Parse a string as an integer in the given base (2 to 36)
pub fn create_parseint_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let s = str_arg(&args, 0)?;
            let base = f64_arg(&args, 1)? as u32;
            if !(2..=36).contains(&base) {
                return Err(format!("base {base} is not supported"));
            }
            i64::from_str_radix(s, base)
                .map(Value::from)
                .map_err(|_| format!("cannot parse {s:?} as a base {base} integer"))
        })
}
