use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;

use super::{i64_arg, str_arg};

/// An address prefix held as a 128-bit integer.
struct Prefix {
    addr: u128,
    len: u32,
    width: u32,
}

impl Prefix {
    fn parse(raw: &str) -> Result<Self, String> {
        let (addr, len) = raw
            .split_once('/')
            .ok_or_else(|| format!("invalid CIDR address {raw:?}"))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| format!("invalid CIDR address {raw:?}"))?;
        let len: u32 = len
            .parse()
            .map_err(|_| format!("invalid prefix length in {raw:?}"))?;
        let (addr, width) = match addr {
            IpAddr::V4(v4) => (u128::from(u32::from(v4)), 32),
            IpAddr::V6(v6) => (u128::from(v6), 128),
        };
        if len > width {
            return Err(format!("prefix length {len} is too long for {raw:?}"));
        }
        let host_bits = width - len;
        let addr = addr & !low_mask(host_bits);
        Ok(Self { addr, len, width })
    }

    fn host_bits(&self) -> u32 {
        self.width - self.len
    }

    fn render(&self, addr: u128) -> String {
        if self.width == 32 {
            Ipv4Addr::from(addr as u32).to_string()
        } else {
            Ipv6Addr::from(addr).to_string()
        }
    }
}

fn low_mask(bits: u32) -> u128 {
    1u128.checked_shl(bits).map_or(u128::MAX, |v| v - 1)
}

pub fn create_cidrsubnet_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::Number)
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let prefix = Prefix::parse(str_arg(&args, 0)?)?;
            let newbits = u32::try_from(i64_arg(&args, 1)?).map_err(|_| "newbits must not be negative")?;
            let netnum = u128::try_from(i64_arg(&args, 2)?).map_err(|_| "netnum must not be negative")?;
            if newbits > prefix.host_bits() {
                return Err(format!(
                    "insufficient address space to extend prefix of {} by {newbits}",
                    prefix.len
                ));
            }
            if netnum > low_mask(newbits) {
                return Err(format!("prefix extension of {newbits} does not accommodate a subnet numbered {netnum}"));
            }
            let len = prefix.len + newbits;
            let addr = prefix.addr | netnum.checked_shl(prefix.width - len).unwrap_or(0);
            Ok(Value::from(format!("{}/{len}", prefix.render(addr))))
        })
}

/// Host address within a prefix; negative numbers count back from the end.
pub fn create_cidrhost_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let prefix = Prefix::parse(str_arg(&args, 0)?)?;
            let hostnum = i64_arg(&args, 1)?;
            let max = low_mask(prefix.host_bits());
            let offset = if hostnum < 0 {
                max.checked_sub(u128::from(hostnum.unsigned_abs() - 1))
            } else {
                Some(u128::from(hostnum.unsigned_abs())).filter(|n| *n <= max)
            }
            .ok_or_else(|| format!("prefix of {} does not accommodate a host numbered {hostnum}", prefix.len))?;
            Ok(Value::from(prefix.render(prefix.addr | offset)))
        })
}

pub fn create_cidrnetmask_func() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let prefix = Prefix::parse(str_arg(&args, 0)?)?;
            if prefix.width != 32 {
                return Err("only IPv4 prefixes have a netmask".to_string());
            }
            let mask = !low_mask(prefix.host_bits()) & low_mask(32);
            Ok(Value::from(prefix.render(mask)))
        })
}

#[cfg(test)]
mod tests {
    use super::super::tests::eval;
    use hcl::Value;

    #[test]
    fn test_cidrsubnet_function() {
        assert_eq!(
            eval("cidrsubnet(\"10.0.0.0/16\", 8, 2)").unwrap(),
            Value::from("10.0.2.0/24")
        );
        assert_eq!(
            eval("cidrsubnet(\"172.16.0.0/12\", 4, 15)").unwrap(),
            Value::from("172.31.0.0/16")
        );
        assert_eq!(
            eval("cidrsubnet(\"fd00:fd12:3456:7890::/56\", 16, 162)").unwrap(),
            Value::from("fd00:fd12:3456:7800:a200::/72")
        );
        assert!(eval("cidrsubnet(\"10.0.0.0/16\", 8, 256)").is_err());
        assert!(eval("cidrsubnet(\"10.0.0.0/30\", 8, 0)").is_err());
    }

    #[test]
    fn test_cidrhost_function() {
        assert_eq!(eval("cidrhost(\"10.12.112.0/20\", 16)").unwrap(), Value::from("10.12.112.16"));
        assert_eq!(eval("cidrhost(\"10.12.112.0/20\", 268)").unwrap(), Value::from("10.12.113.12"));
        assert_eq!(eval("cidrhost(\"10.0.0.0/24\", -1)").unwrap(), Value::from("10.0.0.255"));
        assert!(eval("cidrhost(\"10.0.0.0/24\", 256)").is_err());
        assert!(eval("cidrhost(\"10.0.0.0\", 1)").is_err());
    }

    #[test]
    fn test_cidrnetmask_function() {
        assert_eq!(eval("cidrnetmask(\"172.16.0.0/12\")").unwrap(), Value::from("255.240.0.0"));
    }
}
