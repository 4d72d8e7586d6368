//! The closed template function table.
//!
//! Functions are plain closures registered by name when an engine is
//! constructed; nothing is registered globally. Functions whose output
//! depends on the clock, randomness, the host, or the environment are
//! flagged non-deterministic, as are the hashing and base64 helpers, so
//! callers can tell plain value templates apart.
//!
//! Piped values arrive as the last argument, so functions taking a
//! "subject" string take it last: `{{ .Name | replace "-" "_" }}`.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use base64::Engine as _;
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Signature shared by every template function.
pub type FunctionImpl = dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync;

const PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*-_=+";
const MAX_PASSWORD_LENGTH: i64 = 128;
const LOOPBACK_FALLBACK: &str = "127.0.0.1";

/// A named template function.
#[derive(Clone)]
pub struct TemplateFunction {
    /// Whether the same arguments always produce the same result.
    pub deterministic: bool,
    func: Arc<FunctionImpl>,
}

impl TemplateFunction {
    /// Invokes the function.
    ///
    /// # Errors
    ///
    /// Returns the function's own error message on bad arguments.
    pub fn call(&self, args: &[Value]) -> Result<Value, String> {
        (self.func)(args)
    }
}

impl fmt::Debug for TemplateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateFunction")
            .field("deterministic", &self.deterministic)
            .finish_non_exhaustive()
    }
}

/// Table of functions available to templates, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: BTreeMap<&'static str, TemplateFunction>,
}

impl FunctionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function, replacing any previous one with the same name.
    pub fn register<F>(&mut self, name: &'static str, deterministic: bool, func: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        let _ = self.functions.insert(
            name,
            TemplateFunction {
                deterministic,
                func: Arc::new(func),
            },
        );
    }

    /// Returns the named function.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TemplateFunction> {
        self.functions.get(name)
    }

    /// Returns whether the named function exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Names of all registered functions, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }

    /// Builds the standard library. `env` only ever reads names in
    /// `env_allow_list`; every other name yields `""`.
    #[must_use]
    pub fn standard(env_allow_list: &[String]) -> Self {
        let mut table = Self::new();
        register_strings(&mut table);
        register_math(&mut table);
        register_logic(&mut table);
        register_encoding(&mut table);
        register_runtime(&mut table, env_allow_list.to_vec());
        table
    }
}

fn register_strings(table: &mut FunctionTable) {
    table.register("upper", true, |args| {
        let [s] = arity::<1>("upper", args)?;
        Ok(text("upper", s)?.to_uppercase().into())
    });
    table.register("lower", true, |args| {
        let [s] = arity::<1>("lower", args)?;
        Ok(text("lower", s)?.to_lowercase().into())
    });
    table.register("trim", true, |args| {
        let [s] = arity::<1>("trim", args)?;
        Ok(text("trim", s)?.trim().into())
    });
    table.register("replace", true, |args| {
        let [old, new, s] = arity::<3>("replace", args)?;
        let (old, new) = (text("replace", old)?, text("replace", new)?);
        Ok(text("replace", s)?.replace(&old, &new).into())
    });
    table.register("contains", true, |args| {
        let [needle, s] = arity::<2>("contains", args)?;
        Ok(text("contains", s)?.contains(&text("contains", needle)?).into())
    });
    table.register("hasPrefix", true, |args| {
        let [prefix, s] = arity::<2>("hasPrefix", args)?;
        Ok(text("hasPrefix", s)?.starts_with(&text("hasPrefix", prefix)?).into())
    });
    table.register("hasSuffix", true, |args| {
        let [suffix, s] = arity::<2>("hasSuffix", args)?;
        Ok(text("hasSuffix", s)?.ends_with(&text("hasSuffix", suffix)?).into())
    });
    table.register("split", true, |args| {
        let [sep, s] = arity::<2>("split", args)?;
        let (sep, s) = (text("split", sep)?, text("split", s)?);
        Ok(Value::Array(s.split(sep.as_str()).map(Value::from).collect()))
    });
    table.register("join", true, |args| {
        let [sep, list] = arity::<2>("join", args)?;
        let sep = text("join", sep)?;
        let Value::Array(items) = list else {
            return Err(format!("join: expected a list, got {}", kind(list)));
        };
        let parts = items
            .iter()
            .map(|item| text("join", item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(&sep).into())
    });
}

fn register_math(table: &mut FunctionTable) {
    table.register("add", true, |args| {
        let [a, b] = arity::<2>("add", args)?;
        arithmetic("add", a, b, i64::checked_add, |x, y| x + y)
    });
    table.register("sub", true, |args| {
        let [a, b] = arity::<2>("sub", args)?;
        arithmetic("sub", a, b, i64::checked_sub, |x, y| x - y)
    });
    table.register("mul", true, |args| {
        let [a, b] = arity::<2>("mul", args)?;
        arithmetic("mul", a, b, i64::checked_mul, |x, y| x * y)
    });
    table.register("div", true, |args| {
        let [a, b] = arity::<2>("div", args)?;
        if number("div", b)?.is_zero() {
            return Err("div: division by zero".into());
        }
        arithmetic("div", a, b, i64::checked_div, |x, y| x / y)
    });
    table.register("mod", true, |args| {
        let [a, b] = arity::<2>("mod", args)?;
        let (Number::Int(a), Number::Int(b)) = (number("mod", a)?, number("mod", b)?) else {
            return Err("mod: expected integer operands".into());
        };
        if b == 0 {
            return Err("mod: division by zero".into());
        }
        a.checked_rem(b)
            .map(Value::from)
            .ok_or_else(|| "mod: integer overflow".to_string())
    });
}

fn register_logic(table: &mut FunctionTable) {
    table.register("default", true, |args| {
        let [fallback, value] = arity::<2>("default", args)?;
        let unset = value.is_null() || value.as_str() == Some("");
        Ok(if unset { fallback } else { value }.clone())
    });
    table.register("eq", true, |args| {
        let [a, b] = arity::<2>("eq", args)?;
        Ok(loose_eq(a, b).into())
    });
    table.register("ne", true, |args| {
        let [a, b] = arity::<2>("ne", args)?;
        Ok((!loose_eq(a, b)).into())
    });
}

fn register_encoding(table: &mut FunctionTable) {
    table.register("hash", false, |args| {
        let [s] = arity::<1>("hash", args)?;
        Ok(hex::encode(Sha256::digest(text("hash", s)?.as_bytes())).into())
    });
    table.register("base64encode", false, |args| {
        let [s] = arity::<1>("base64encode", args)?;
        Ok(base64::engine::general_purpose::STANDARD
            .encode(text("base64encode", s)?)
            .into())
    });
    table.register("base64decode", false, |args| {
        let [s] = arity::<1>("base64decode", args)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(text("base64decode", s)?)
            .map_err(|e| format!("base64decode: {e}"))?;
        String::from_utf8(bytes)
            .map(Value::from)
            .map_err(|e| format!("base64decode: {e}"))
    });
}

fn register_runtime(table: &mut FunctionTable, env_allow_list: Vec<String>) {
    table.register("env", false, move |args| {
        let [name] = arity::<1>("env", args)?;
        let name = text("env", name)?;
        if !env_allow_list.contains(&name) {
            return Ok(Value::from(""));
        }
        Ok(std::env::var(&name).unwrap_or_default().into())
    });
    table.register("uuid", false, |args| {
        let [] = arity::<0>("uuid", args)?;
        Ok(uuid::Uuid::new_v4().to_string().into())
    });
    table.register("timestamp", false, |args| {
        let [] = arity::<0>("timestamp", args)?;
        Ok(chrono::Utc::now().timestamp().into())
    });
    table.register("now", false, |args| {
        let [] = arity::<0>("now", args)?;
        Ok(chrono::Utc::now().to_rfc3339().into())
    });
    table.register("generatePassword", false, |args| {
        let [length] = arity::<1>("generatePassword", args)?;
        let Number::Int(length) = number("generatePassword", length)? else {
            return Err("generatePassword: length must be an integer".into());
        };
        if !(1..=MAX_PASSWORD_LENGTH).contains(&length) {
            return Err(format!(
                "generatePassword: length must be between 1 and {MAX_PASSWORD_LENGTH}, got {length}"
            ));
        }
        let mut rng = rand::rngs::OsRng;
        let password: String = (0..length)
            .map(|_| char::from(PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())]))
            .collect();
        Ok(password.into())
    });
    table.register("randomPort", false, |args| {
        let [min, max] = arity::<2>("randomPort", args)?;
        let (min, max) = (port("randomPort", min)?, port("randomPort", max)?);
        if min > max {
            return Err(format!("randomPort: min {min} is greater than max {max}"));
        }
        Ok(rand::rngs::OsRng.gen_range(min..=max).into())
    });
    table.register("localIP", false, |args| {
        let [] = arity::<0>("localIP", args)?;
        Ok(local_ipv4().into())
    });
}

/// Returns the first non-loopback IPv4 address among the host's interfaces,
/// or `127.0.0.1` when there is none.
fn local_ipv4() -> String {
    first_non_loopback(interface_ipv4s())
        .map_or_else(|| LOOPBACK_FALLBACK.to_string(), |ip| ip.to_string())
}

fn first_non_loopback(addrs: impl IntoIterator<Item = Ipv4Addr>) -> Option<Ipv4Addr> {
    addrs
        .into_iter()
        .find(|ip| !ip.is_loopback() && !ip.is_unspecified())
}

#[cfg(unix)]
fn interface_ipv4s() -> Vec<Ipv4Addr> {
    match nix::ifaddrs::getifaddrs() {
        Ok(interfaces) => interfaces
            .filter_map(|iface| iface.address)
            .filter_map(|addr| addr.as_sockaddr_in().map(|sin| sin.ip()))
            .collect(),
        Err(e) => {
            tracing::debug!(error = %e, "interface enumeration failed");
            Vec::new()
        }
    }
}

/// Stub for platforms without `getifaddrs(3)`.
#[cfg(not(unix))]
const fn interface_ipv4s() -> Vec<Ipv4Addr> {
    Vec::new()
}

fn arity<'a, const N: usize>(name: &str, args: &'a [Value]) -> Result<&'a [Value; N], String> {
    args.try_into().map_err(|_| {
        format!(
            "wrong number of args for {name}: want {N} got {}",
            args.len()
        )
    })
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// Scalars are accepted as text; nil and collections are not.
fn text(name: &str, value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("{name}: expected string, got {}", kind(other))),
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    #[allow(clippy::float_cmp)]
    fn is_zero(self) -> bool {
        match self {
            Self::Int(n) => n == 0,
            Self::Float(f) => f == 0.0,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(f) => f,
        }
    }
}

/// Numbers and numeric strings are accepted.
fn number(name: &str, value: &Value) -> Result<Number, String> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .map(Number::Int)
            .or_else(|| n.as_f64().map(Number::Float)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Number::Int)
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(Number::Float)),
        _ => None,
    };
    parsed.ok_or_else(|| format!("{name}: expected number, got {}", kind(value)))
}

fn port(name: &str, value: &Value) -> Result<u16, String> {
    match number(name, value)? {
        Number::Int(n) if (1..=65535).contains(&n) => {
            u16::try_from(n).map_err(|e| format!("{name}: {e}"))
        }
        _ => Err(format!("{name}: ports must be integers between 1 and 65535")),
    }
}

fn arithmetic(
    name: &str,
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, String> {
    match (number(name, a)?, number(name, b)?) {
        (Number::Int(x), Number::Int(y)) => int_op(x, y)
            .map(Value::from)
            .ok_or_else(|| format!("{name}: integer overflow")),
        (x, y) => serde_json::Number::from_f64(float_op(x.as_f64(), y.as_f64()))
            .map(Value::Number)
            .ok_or_else(|| format!("{name}: result is not a finite number")),
    }
}

/// Equality with numeric widening.
#[allow(clippy::float_cmp)]
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, String> {
        FunctionTable::standard(&["TZ".to_string()])
            .get(name)
            .unwrap_or_else(|| panic!("missing function {name}"))
            .call(args)
    }

    #[test]
    fn string_functions() {
        assert_eq!(call("upper", &[json!("abc")]), Ok(json!("ABC")));
        assert_eq!(call("lower", &[json!("ABC")]), Ok(json!("abc")));
        assert_eq!(call("trim", &[json!("  x ")]), Ok(json!("x")));
        assert_eq!(
            call("replace", &[json!("-"), json!("_"), json!("a-b-c")]),
            Ok(json!("a_b_c"))
        );
        assert_eq!(call("contains", &[json!("b"), json!("abc")]), Ok(json!(true)));
        assert_eq!(call("hasPrefix", &[json!("ab"), json!("abc")]), Ok(json!(true)));
        assert_eq!(call("hasSuffix", &[json!("ab"), json!("abc")]), Ok(json!(false)));
        assert_eq!(call("split", &[json!(","), json!("a,b")]), Ok(json!(["a", "b"])));
        assert_eq!(call("join", &[json!("-"), json!(["a", 1])]), Ok(json!("a-1")));
    }

    #[test]
    fn string_functions_reject_collections() {
        let err = call("upper", &[json!({"a": 1})]).unwrap_err();
        assert!(err.contains("expected string"), "got: {err}");
    }

    #[test]
    fn arity_is_checked() {
        let err = call("upper", &[]).unwrap_err();
        assert_eq!(err, "wrong number of args for upper: want 1 got 0");
    }

    #[test]
    fn arithmetic_keeps_integers() {
        assert_eq!(call("add", &[json!(2), json!(3)]), Ok(json!(5)));
        assert_eq!(call("sub", &[json!(2), json!("3")]), Ok(json!(-1)));
        assert_eq!(call("mul", &[json!(2), json!(1.5)]), Ok(json!(3.0)));
        assert_eq!(call("div", &[json!(7), json!(2)]), Ok(json!(3)));
        assert_eq!(call("mod", &[json!(7), json!(3)]), Ok(json!(1)));
    }

    #[test]
    fn division_by_zero_fails() {
        assert!(call("div", &[json!(1), json!(0)]).is_err());
        assert!(call("div", &[json!(1.0), json!(0.0)]).is_err());
        assert!(call("mod", &[json!(1), json!(0)]).is_err());
    }

    #[test]
    fn default_uses_fallback_for_nil_and_empty() {
        assert_eq!(call("default", &[json!("x"), json!(null)]), Ok(json!("x")));
        assert_eq!(call("default", &[json!("x"), json!("")]), Ok(json!("x")));
        assert_eq!(call("default", &[json!("x"), json!(0)]), Ok(json!(0)));
        assert_eq!(call("default", &[json!("x"), json!("y")]), Ok(json!("y")));
    }

    #[test]
    fn eq_widens_numbers() {
        assert_eq!(call("eq", &[json!(1), json!(1.0)]), Ok(json!(true)));
        assert_eq!(call("ne", &[json!("a"), json!("b")]), Ok(json!(true)));
    }

    #[test]
    fn hash_and_base64() {
        assert_eq!(
            call("hash", &[json!("abc")]),
            Ok(json!(
                "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
            ))
        );
        assert_eq!(call("base64encode", &[json!("hi")]), Ok(json!("aGk=")));
        assert_eq!(call("base64decode", &[json!("aGk=")]), Ok(json!("hi")));
        assert!(call("base64decode", &[json!("!!")]).is_err());
    }

    #[test]
    fn env_only_reads_allowed_names() {
        assert_eq!(call("env", &[json!("PATH")]), Ok(json!("")));
        assert_eq!(call("env", &[json!("AWS_SECRET_ACCESS_KEY")]), Ok(json!("")));
        let tz = std::env::var("TZ").unwrap_or_default();
        assert_eq!(call("env", &[json!("TZ")]), Ok(json!(tz)));
    }

    #[test]
    fn generate_password_bounds() {
        let pw = call("generatePassword", &[json!(24)]).expect("password");
        let pw = pw.as_str().expect("string");
        assert_eq!(pw.len(), 24);
        assert!(pw.bytes().all(|b| PASSWORD_CHARSET.contains(&b)));
        assert!(call("generatePassword", &[json!(0)]).is_err());
        assert!(call("generatePassword", &[json!(129)]).is_err());
        assert!(call("generatePassword", &[json!(128)]).is_ok());
    }

    #[test]
    fn random_port_bounds() {
        let port = call("randomPort", &[json!(8000), json!(8010)]).expect("port");
        let port = port.as_u64().expect("number");
        assert!((8000..=8010).contains(&port));
        assert_eq!(call("randomPort", &[json!(80), json!(80)]), Ok(json!(80)));
        assert!(call("randomPort", &[json!(0), json!(10)]).is_err());
        assert!(call("randomPort", &[json!(10), json!(70000)]).is_err());
        assert!(call("randomPort", &[json!(20), json!(10)]).is_err());
    }

    #[test]
    fn non_deterministic_functions_are_flagged() {
        let table = FunctionTable::standard(&[]);
        for name in [
            "env",
            "uuid",
            "timestamp",
            "now",
            "generatePassword",
            "hash",
            "base64encode",
            "base64decode",
            "randomPort",
            "localIP",
        ] {
            assert!(!table.get(name).expect(name).deterministic, "{name}");
        }
        assert!(table.get("upper").expect("upper").deterministic);
    }

    #[test]
    fn local_ip_skips_loopback_and_falls_back() {
        let lo = Ipv4Addr::LOCALHOST;
        let lan = Ipv4Addr::new(10, 1, 2, 3);
        let wan = Ipv4Addr::new(192, 0, 2, 7);
        assert_eq!(first_non_loopback([lo, lan, wan]), Some(lan));
        assert_eq!(first_non_loopback([lo, Ipv4Addr::new(127, 0, 1, 1)]), None);
        assert_eq!(first_non_loopback([Ipv4Addr::UNSPECIFIED]), None);
    }

    #[test]
    fn uuid_and_local_ip_shapes() {
        let id = call("uuid", &[]).expect("uuid");
        assert_eq!(id.as_str().expect("string").len(), 36);
        let ip = call("localIP", &[]).expect("ip");
        assert!(ip.as_str().expect("string").parse::<Ipv4Addr>().is_ok());
    }
}
