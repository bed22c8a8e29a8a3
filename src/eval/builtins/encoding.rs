use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;
use sha2::{Digest, Sha256, Sha512};

use super::str_arg;

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn create_md5_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let digest = md5::compute(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(hex(&digest.0)))
        })
}

pub fn create_sha256_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let digest = Sha256::digest(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(hex(&digest)))
        })
}

pub fn create_sha512_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let digest = Sha512::digest(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(hex(&digest)))
        })
}

pub fn create_base64encode_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(STANDARD.encode(str_arg(&args, 0)?))))
}

/// Decodes base64 that must yield valid UTF-8
pub fn create_base64decode_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let bytes = STANDARD
                .decode(str_arg(&args, 0)?)
                .map_err(|e| format!("invalid base64: {e}"))?;
            String::from_utf8(bytes)
                .map(Value::from)
                .map_err(|_| "decoded bytes are not valid UTF-8".to_string())
        })
}

/// Base64 of the raw SHA-256 digest rather than its hex form
pub fn create_base64sha256_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let digest = Sha256::digest(str_arg(&args, 0)?.as_bytes());
            Ok(Value::from(STANDARD.encode(digest)))
        })
}

#[cfg(test)]
mod tests {
    use super::super::tests::eval;
    use hcl::Value;

    #[test]
    fn test_hash_functions() {
        assert_eq!(
            eval("md5(\"hello world\")").unwrap(),
            Value::from("5eb63bbbe01eeed093cb22bb8f5acdc3")
        );
        assert_eq!(
            eval("sha256(\"hello world\")").unwrap(),
            Value::from("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
        );
        let sha512 = eval("sha512(\"x\")").unwrap();
        assert_eq!(sha512.as_str().unwrap().len(), 128);
    }

    #[test]
    fn test_base64_functions() {
        assert_eq!(eval("base64encode(\"Hello World\")").unwrap(), Value::from("SGVsbG8gV29ybGQ="));
        assert_eq!(eval("base64decode(\"SGVsbG8gV29ybGQ=\")").unwrap(), Value::from("Hello World"));
        assert!(eval("base64decode(\"!!!\")").is_err());
        assert_eq!(
            eval("base64sha256(\"hello world\")").unwrap(),
            Value::from("uU0nuZNNPgilLlLX2n2r+sSE7+N6U4DukIj3rOLvzek=")
        );
    }
}
