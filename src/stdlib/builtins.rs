//! Built-in Functions Registry
//!
//! The slice of the host base library that generator methods can call:
//! static helpers on `string`, `Enum`, `Math`, `Convert`, `Console`, and
//! instance members of strings, arrays, enums and delegates.

use std::collections::HashMap;

use crate::runtime::value::{convert, CallContext, EnumInfo, Fault, RuntimeType, Value};

/// Native implementation of a static builtin
pub type BuiltinFn = fn(&[RuntimeType], Vec<Value>, &dyn CallContext) -> Result<Value, Fault>;

/// Type that hosts the placeholder bodies of stubs in the execution copy
pub const STUB_HOST_TYPE: &str = "GenerationStub";

/// Built-in function signature
#[derive(Debug, Clone)]
pub struct BuiltinFunc {
    /// `Type.Method`
    pub name: String,
    /// Accepted argument counts
    pub arity: std::ops::RangeInclusive<usize>,
    pub type_params: usize,
    pub func: BuiltinFn,
}

/// Registry of all built-in static functions
pub struct BuiltinRegistry {
    functions: HashMap<String, BuiltinFunc>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        let mut registry = Self { functions: HashMap::new() };
        registry.register_all();
        registry
    }

    fn register_all(&mut self) {
        // Strings
        self.register("string.Join", 2..=usize::MAX, 0, string_join);
        self.register("string.Concat", 0..=usize::MAX, 0, string_concat);
        self.register("string.IsNullOrEmpty", 1..=1, 0, string_is_null_or_empty);

        // Enums
        self.register("Enum.GetNames", 0..=0, 1, enum_get_names);
        self.register("Enum.GetValues", 0..=0, 1, enum_get_values);
        self.register("Enum.Parse", 1..=2, 1, enum_parse);

        // Math
        self.register("Math.Abs", 1..=1, 0, math_abs);
        self.register("Math.Max", 2..=2, 0, math_max);
        self.register("Math.Min", 2..=2, 0, math_min);
        self.register("Math.Pow", 2..=2, 0, math_pow);
        self.register("Math.Sqrt", 1..=1, 0, math_sqrt);
        self.register("Math.Floor", 1..=1, 0, math_floor);

        // Conversions
        self.register("int.Parse", 1..=1, 0, int_parse);
        self.register("Convert.ToInt32", 1..=1, 0, convert_to_int);
        self.register("Convert.ToString", 1..=1, 0, convert_to_string);

        // I/O
        self.register("Console.WriteLine", 0..=1, 0, console_write_line);

        self.register(&format!("{}.Invoked", STUB_HOST_TYPE), 2..=2, 0, stub_invoked);
    }

    fn register(&mut self, name: &str, arity: std::ops::RangeInclusive<usize>, type_params: usize, func: BuiltinFn) {
        self.functions.insert(name.to_string(), BuiltinFunc { name: name.to_string(), arity, type_params, func });
    }

    /// Whether `name` is a type hosting builtin statics
    pub fn is_builtin_type(&self, name: &str) -> bool {
        let name = canonical_type(name);
        let prefix = format!("{}.", name);
        self.functions.keys().any(|k| k.starts_with(&prefix))
    }

    pub fn get(&self, ty: &str, method: &str) -> Option<&BuiltinFunc> {
        self.functions.get(&format!("{}.{}", canonical_type(ty), method))
    }

    /// Constant static properties such as `int.MaxValue`
    pub fn constant(&self, ty: &str, name: &str) -> Option<Value> {
        match (canonical_type(ty), name) {
            ("int", "MaxValue") => Some(Value::Int(i32::MAX as i64)),
            ("int", "MinValue") => Some(Value::Int(i32::MIN as i64)),
            ("string", "Empty") => Some(Value::str("")),
            ("Math", "PI") => Some(Value::Double(std::f64::consts::PI)),
            ("Math", "E") => Some(Value::Double(std::f64::consts::E)),
            _ => None,
        }
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn canonical_type(name: &str) -> &str {
    match name {
        "String" | "System.String" => "string",
        "Int32" | "System.Int32" => "int",
        "System.Math" => "Math",
        "System.Enum" => "Enum",
        "System.Console" => "Console",
        "System.Convert" => "Convert",
        other => other,
    }
}

fn arg(args: &[Value], index: usize) -> Result<&Value, Fault> {
    args.get(index).ok_or_else(|| Fault::Argument(format!("missing argument {}", index)))
}

fn enum_arg(type_args: &[RuntimeType]) -> Result<&std::rc::Rc<EnumInfo>, Fault> {
    match type_args.first() {
        Some(RuntimeType::Enum(info)) => Ok(info),
        Some(other) => Err(Fault::Argument(format!("Type provided must be an Enum, not '{}'.", other))),
        None => Err(Fault::Argument("an enum type argument is required".to_string())),
    }
}

/// Items of an array value; a null sequence faults
pub fn sequence(value: &Value) -> Result<Vec<Value>, Fault> {
    match value {
        Value::Array(items) => Ok(items.borrow().clone()),
        Value::Str(s) => Ok(s.chars().map(Value::Char).collect()),
        Value::Null => Err(Fault::NullReference),
        other => Err(Fault::InvalidCast { value: other.to_string(), target: "IEnumerable".to_string() }),
    }
}

fn text(value: &Value) -> String {
    value.to_display().unwrap_or_default()
}

fn number(value: &Value) -> Result<f64, Fault> {
    match value {
        Value::Int(v) => Ok(*v as f64),
        Value::Double(v) => Ok(*v),
        Value::Char(c) => Ok(*c as u32 as f64),
        Value::Null => Err(Fault::NullReference),
        other => Err(Fault::InvalidCast { value: other.to_string(), target: "double".to_string() }),
    }
}

fn string_join(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    let separator = text(arg(&args, 0)?);
    let parts = match &args[1..] {
        [Value::Array(items)] => items.borrow().iter().map(text).collect::<Vec<_>>(),
        rest => rest.iter().map(text).collect(),
    };
    Ok(Value::str(&parts.join(&separator)))
}

fn string_concat(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    Ok(Value::str(&args.iter().map(text).collect::<String>()))
}

fn string_is_null_or_empty(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    Ok(Value::Bool(match arg(&args, 0)? {
        Value::Null => true,
        Value::Str(s) => s.is_empty(),
        _ => false,
    }))
}

fn enum_get_names(type_args: &[RuntimeType], _: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    let info = enum_arg(type_args)?;
    Ok(Value::array(info.members.iter().map(|m| Value::str(m)).collect()))
}

fn enum_get_values(type_args: &[RuntimeType], _: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    let info = enum_arg(type_args)?;
    Ok(Value::array((0..info.members.len()).map(|i| Value::Enum(info.clone(), i)).collect()))
}

fn enum_parse(type_args: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    let info = enum_arg(type_args)?;
    let name = text(arg(&args, 0)?);
    let ignore_case = matches!(args.get(1), Some(Value::Bool(true)));
    info.ordinal_of(name.trim(), ignore_case)
        .map(|o| Value::Enum(info.clone(), o))
        .ok_or_else(|| Fault::Argument(format!("Requested value '{}' was not found.", name)))
}

fn math_abs(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    match arg(&args, 0)? {
        Value::Int(v) => Ok(Value::Int(v.abs())),
        other => Ok(Value::Double(number(other)?.abs())),
    }
}

fn math_max(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    match (arg(&args, 0)?, arg(&args, 1)?) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(*a.max(b))),
        (a, b) => Ok(Value::Double(number(a)?.max(number(b)?))),
    }
}

fn math_min(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    match (arg(&args, 0)?, arg(&args, 1)?) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(*a.min(b))),
        (a, b) => Ok(Value::Double(number(a)?.min(number(b)?))),
    }
}

fn math_pow(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    Ok(Value::Double(number(arg(&args, 0)?)?.powf(number(arg(&args, 1)?)?)))
}

fn math_sqrt(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    Ok(Value::Double(number(arg(&args, 0)?)?.sqrt()))
}

fn math_floor(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    Ok(Value::Double(number(arg(&args, 0)?)?.floor()))
}

fn int_parse(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    match arg(&args, 0)? {
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| Fault::Thrown {
                type_name: "FormatException".to_string(),
                message: format!("The input string '{}' was not in a correct format.", s),
            }),
        Value::Null => Err(Fault::NullReference),
        other => Err(Fault::InvalidCast { value: other.to_string(), target: "int".to_string() }),
    }
}

fn convert_to_int(_: &[RuntimeType], mut args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    arg(&args, 0)?;
    convert(args.swap_remove(0), &RuntimeType::Int)
}

fn convert_to_string(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    Ok(Value::str(&text(arg(&args, 0)?)))
}

fn console_write_line(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    let line = args.first().map(text).unwrap_or_default();
    println!("{}", line);
    Ok(Value::Null)
}

fn stub_invoked(_: &[RuntimeType], args: Vec<Value>, _: &dyn CallContext) -> Result<Value, Fault> {
    Err(Fault::StubInvoked { type_name: text(arg(&args, 0)?), method: text(arg(&args, 1)?) })
}

// ==================== Instance members ====================

/// Read a property such as `s.Length`
pub fn get_property(target: &Value, name: &str) -> Result<Value, Fault> {
    match (target, name) {
        (Value::Null, _) => Err(Fault::NullReference),
        (Value::Str(s), "Length") => Ok(Value::Int(s.chars().count() as i64)),
        (Value::Array(items), "Length" | "Count") => Ok(Value::Int(items.borrow().len() as i64)),
        (Value::Exception(e), "Message") => Ok(Value::str(&e.message)),
        (other, _) => Err(Fault::MissingMethod { target: other.type_name(), method: name.to_string(), args: 0 }),
    }
}

/// Call an instance method on a value
pub fn call_method(
    target: &Value,
    name: &str,
    type_args: &[RuntimeType],
    args: Vec<Value>,
    ctx: &dyn CallContext,
) -> Result<Value, Fault> {
    if name == "ToString" && args.is_empty() && !matches!(target, Value::Native(_)) {
        return match target {
            Value::Null => Err(Fault::NullReference),
            other => Ok(Value::str(&other.to_string())),
        };
    }
    if name == "Equals" && args.len() == 1 {
        return Ok(Value::Bool(target.equals(&args[0])));
    }
    match target {
        Value::Null => Err(Fault::NullReference),
        Value::Str(s) => string_method(s, name, &args),
        Value::Array(_) => sequence_method(target, name, args, ctx),
        Value::Closure(_) if name == "Invoke" => ctx.invoke(target, args),
        Value::Native(obj) => obj.call_method(name, type_args, args, ctx),
        other => Err(Fault::MissingMethod { target: other.type_name(), method: name.to_string(), args: args.len() }),
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Value, Fault> {
    let missing = || Fault::MissingMethod { target: "string".to_string(), method: name.to_string(), args: args.len() };
    let chars: Vec<char> = s.chars().collect();
    match (name, args) {
        ("ToUpper", []) => Ok(Value::str(&s.to_uppercase())),
        ("ToLower", []) => Ok(Value::str(&s.to_lowercase())),
        ("Trim", []) => Ok(Value::str(s.trim())),
        ("Contains", [needle]) => Ok(Value::Bool(s.contains(&text(needle)))),
        ("StartsWith", [prefix]) => Ok(Value::Bool(s.starts_with(&text(prefix)))),
        ("EndsWith", [suffix]) => Ok(Value::Bool(s.ends_with(&text(suffix)))),
        ("Replace", [from, to]) => Ok(Value::str(&s.replace(&text(from), &text(to)))),
        ("IndexOf", [needle]) => {
            let needle = text(needle);
            Ok(Value::Int(s.find(&needle).map(|byte| s[..byte].chars().count() as i64).unwrap_or(-1)))
        }
        ("Split", [separator]) => {
            Ok(Value::array(s.split(text(separator).as_str()).map(Value::str).collect()))
        }
        ("Substring", [start]) => {
            let start = checked_index(start.as_int()?, chars.len())?;
            Ok(Value::str(&chars[start..].iter().collect::<String>()))
        }
        ("Substring", [start, length]) => {
            let start = checked_index(start.as_int()?, chars.len())?;
            let end = checked_index(start as i64 + length.as_int()?, chars.len())?;
            Ok(Value::str(&chars[start..end].iter().collect::<String>()))
        }
        _ => Err(missing()),
    }
}

fn checked_index(index: i64, length: usize) -> Result<usize, Fault> {
    usize::try_from(index).ok().filter(|i| *i <= length).ok_or(Fault::IndexOutOfRange { index, length })
}

fn sequence_method(target: &Value, name: &str, args: Vec<Value>, ctx: &dyn CallContext) -> Result<Value, Fault> {
    let items = sequence(target)?;
    match (name, args.as_slice()) {
        ("ToArray" | "ToList", []) => Ok(Value::array(items)),
        ("Count", []) => Ok(Value::Int(items.len() as i64)),
        ("Contains", [needle]) => Ok(Value::Bool(items.iter().any(|v| v.equals(needle)))),
        ("First", []) => items.into_iter().next().ok_or_else(|| Fault::Thrown {
            type_name: "InvalidOperationException".to_string(),
            message: "Sequence contains no elements".to_string(),
        }),
        ("Select", [f]) => {
            let mapped = items.into_iter().map(|v| ctx.invoke(f, vec![v])).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::array(mapped))
        }
        ("Where", [f]) => {
            let mut kept = Vec::new();
            for item in items {
                if ctx.invoke(f, vec![item.clone()])?.as_bool()? {
                    kept.push(item);
                }
            }
            Ok(Value::array(kept))
        }
        ("Any", []) => Ok(Value::Bool(!items.is_empty())),
        ("Any", [f]) => {
            for item in items {
                if ctx.invoke(f, vec![item])?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        ("Sum", []) => {
            if items.iter().all(|v| matches!(v, Value::Int(_))) {
                Ok(Value::Int(items.iter().map(|v| v.as_int()).sum::<Result<i64, _>>()?))
            } else {
                Ok(Value::Double(items.iter().map(number).sum::<Result<f64, _>>()?))
            }
        }
        _ => Err(Fault::MissingMethod { target: "array".to_string(), method: name.to_string(), args: args.len() }),
    }
}
