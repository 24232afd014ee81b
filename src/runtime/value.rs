//! Runtime values
//!
//! Values that exist while an artifact executes inside an arena, the
//! runtime view of types used for argument conversion, and the typed
//! faults an execution can end with.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::middle::ir::LambdaId;

/// Members of an enum type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumInfo {
    pub full_name: String,
    pub members: Vec<String>,
}

impl EnumInfo {
    pub fn simple_name(&self) -> &str {
        self.full_name.rsplit('.').next().unwrap_or(&self.full_name)
    }

    /// Member index by name, ignoring case when asked to
    pub fn ordinal_of(&self, name: &str, ignore_case: bool) -> Option<usize> {
        self.members.iter().position(|m| {
            if ignore_case {
                m.eq_ignore_ascii_case(name)
            } else {
                m == name
            }
        })
    }
}

/// Runtime view of a declared type
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeType {
    Int,
    Long,
    Double,
    Bool,
    Char,
    String,
    Object,
    Void,
    Enum(Rc<EnumInfo>),
    Array(Box<RuntimeType>),
    /// `Func<..>` / `Action<..>`
    Delegate,
    /// Any other class or interface, by full name
    Class(String),
}

impl RuntimeType {
    /// The value a variable of this type holds before assignment
    pub fn default_value(&self) -> Value {
        match self {
            RuntimeType::Int | RuntimeType::Long => Value::Int(0),
            RuntimeType::Double => Value::Double(0.0),
            RuntimeType::Bool => Value::Bool(false),
            RuntimeType::Char => Value::Char('\0'),
            RuntimeType::Enum(info) => Value::Enum(info.clone(), 0),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeType::Int => write!(f, "int"),
            RuntimeType::Long => write!(f, "long"),
            RuntimeType::Double => write!(f, "double"),
            RuntimeType::Bool => write!(f, "bool"),
            RuntimeType::Char => write!(f, "char"),
            RuntimeType::String => write!(f, "string"),
            RuntimeType::Object => write!(f, "object"),
            RuntimeType::Void => write!(f, "void"),
            RuntimeType::Enum(info) => write!(f, "{}", info.full_name),
            RuntimeType::Array(elem) => write!(f, "{}[]", elem),
            RuntimeType::Delegate => write!(f, "Func"),
            RuntimeType::Class(name) => write!(f, "{}", name),
        }
    }
}

/// Activation record of a method or lambda
#[derive(Debug)]
pub struct Frame {
    pub slots: RefCell<Vec<Value>>,
    /// Frame of the enclosing method, for lambdas
    pub parent: Option<Rc<Frame>>,
}

impl Frame {
    pub fn new(size: usize, parent: Option<Rc<Frame>>) -> Rc<Self> {
        Rc::new(Self { slots: RefCell::new(vec![Value::Null; size]), parent })
    }

    /// Walk `depth` frames outwards
    pub fn ancestor(self: &Rc<Self>, depth: usize) -> Option<Rc<Frame>> {
        let mut frame = self.clone();
        for _ in 0..depth {
            frame = frame.parent.clone()?;
        }
        Some(frame)
    }
}

/// A lambda together with the frame it captured
pub struct Closure {
    pub lambda: LambdaId,
    pub env: Rc<Frame>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure(#{})", self.lambda)
    }
}

/// Exception object created by `new XException(...)`
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionValue {
    pub type_name: String,
    pub message: String,
}

/// Object implemented natively by a loaded library
pub trait NativeObject: fmt::Debug {
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    fn call_method(
        &self,
        name: &str,
        type_args: &[RuntimeType],
        args: Vec<Value>,
        ctx: &dyn CallContext,
    ) -> Result<Value, Fault>;
}

/// What native code may ask of the executing arena
pub trait CallContext {
    /// Call a delegate value
    fn invoke(&self, callee: &Value, args: Vec<Value>) -> Result<Value, Fault>;

    /// Source text of a lambda's innermost body
    fn lambda_body_text(&self, callee: &Value) -> Option<String>;
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i64),
    Double(f64),
    Bool(bool),
    Char(char),
    Str(Rc<str>),
    Enum(Rc<EnumInfo>, usize),
    Array(Rc<RefCell<Vec<Value>>>),
    Closure(Rc<Closure>),
    Native(Rc<dyn NativeObject>),
    Exception(Rc<ExceptionValue>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the value's runtime type, for messages
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Double(_) => "double".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Char(_) => "char".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Enum(info, _) => info.full_name.clone(),
            Value::Array(_) => "array".to_string(),
            Value::Closure(_) => "Func".to_string(),
            Value::Native(obj) => obj.type_name().to_string(),
            Value::Exception(e) => e.type_name.clone(),
        }
    }

    pub fn as_int(&self) -> Result<i64, Fault> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::Char(c) => Ok(*c as i64),
            Value::Null => Err(Fault::NullReference),
            other => Err(Fault::InvalidCast { value: other.to_string(), target: "int".to_string() }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, Fault> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Null => Err(Fault::NullReference),
            other => Err(Fault::InvalidCast { value: other.to_string(), target: "bool".to_string() }),
        }
    }

    /// Value equality as the `==` operator sees it
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Char(a), Value::Int(b)) | (Value::Int(b), Value::Char(a)) => (*a as i64) == *b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Enum(a, x), Value::Enum(b, y)) => a.full_name == b.full_name && x == y,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Text produced by `ToString()`; `None` stands for a null reference
    pub fn to_display(&self) -> Option<String> {
        match self {
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{}", *v as i64)
                } else {
                    write!(f, "{}", v)
                }
            }
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Char(c) => write!(f, "{}", c),
            Value::Str(s) => write!(f, "{}", s),
            Value::Enum(info, ordinal) => match info.members.get(*ordinal) {
                Some(member) => write!(f, "{}", member),
                None => write!(f, "{}", ordinal),
            },
            Value::Array(items) => {
                let elem = items.borrow().first().map(|v| v.type_name()).unwrap_or_else(|| "object".to_string());
                write!(f, "{}[]", elem)
            }
            Value::Closure(_) => write!(f, "Func"),
            Value::Native(obj) => write!(f, "{}", obj.type_name()),
            Value::Exception(e) => write!(f, "{}: {}", e.type_name, e.message),
        }
    }
}

/// How an execution ended abnormally
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Fault {
    #[error(
        "Stub '{type_name}.{method}' was called during generation. Stubs cannot be invoked inside \
         generator methods because their implementations are what is being generated. \
         Remove the call to '{method}' from your generator method."
    )]
    StubInvoked { type_name: String, method: String },

    #[error("{type_name}: {message}")]
    Thrown { type_name: String, message: String },

    #[error("Attempted to divide by zero.")]
    DivideByZero,

    #[error("Index {index} was outside the bounds of the array (length {length}).")]
    IndexOutOfRange { index: i64, length: usize },

    #[error("Object reference not set to an instance of an object.")]
    NullReference,

    #[error("Cannot convert '{value}' to '{target}'.")]
    InvalidCast { value: String, target: String },

    #[error("'{target}' does not contain a method '{method}' taking {args} argument(s).")]
    MissingMethod { target: String, method: String, args: usize },

    #[error("{0}")]
    Argument(String),

    #[error("Could not load library '{name}': {reason}")]
    LibraryLoad { name: String, reason: String },

    #[error("Call depth exceeded {0}; the generator probably recurses without end.")]
    StackOverflow(usize),
}

/// Convert a value to a declared type, the way an argument is coerced to
/// a parameter
pub fn convert(value: Value, target: &RuntimeType) -> Result<Value, Fault> {
    let fail = |value: &Value| Fault::InvalidCast { value: value.to_string(), target: target.to_string() };
    match (target, &value) {
        (_, Value::Null) => Ok(target.default_value_if_value_type().unwrap_or(Value::Null)),
        (RuntimeType::Int | RuntimeType::Long, Value::Int(_)) => Ok(value),
        (RuntimeType::Int | RuntimeType::Long, Value::Double(d)) => Ok(Value::Int(d.round() as i64)),
        (RuntimeType::Int | RuntimeType::Long, Value::Char(c)) => Ok(Value::Int(*c as i64)),
        (RuntimeType::Int | RuntimeType::Long, Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        (RuntimeType::Int | RuntimeType::Long, Value::Enum(_, ordinal)) => Ok(Value::Int(*ordinal as i64)),
        (RuntimeType::Int | RuntimeType::Long, Value::Str(s)) => {
            s.trim().parse().map(Value::Int).map_err(|_| fail(&value))
        }
        (RuntimeType::Double, Value::Int(v)) => Ok(Value::Double(*v as f64)),
        (RuntimeType::Double, Value::Double(_)) => Ok(value),
        (RuntimeType::Double, Value::Str(s)) => s.trim().parse().map(Value::Double).map_err(|_| fail(&value)),
        (RuntimeType::Bool, Value::Bool(_)) => Ok(value),
        (RuntimeType::Bool, Value::Int(v)) => Ok(Value::Bool(*v != 0)),
        (RuntimeType::Bool, Value::Str(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(fail(&value)),
        },
        (RuntimeType::Char, Value::Char(_)) => Ok(value),
        (RuntimeType::Char, Value::Int(v)) => {
            u32::try_from(*v).ok().and_then(char::from_u32).map(Value::Char).ok_or_else(|| fail(&value))
        }
        (RuntimeType::Char, Value::Str(s)) if s.chars().count() == 1 => {
            s.chars().next().map(Value::Char).ok_or_else(|| fail(&value))
        }
        (RuntimeType::String, _) => Ok(Value::str(&value.to_string())),
        (RuntimeType::Enum(info), Value::Enum(other, _)) if other.full_name == info.full_name => Ok(value),
        (RuntimeType::Enum(info), Value::Int(v)) => usize::try_from(*v)
            .ok()
            .filter(|o| *o < info.members.len())
            .map(|o| Value::Enum(info.clone(), o))
            .ok_or_else(|| fail(&value)),
        (RuntimeType::Enum(info), Value::Str(s)) => {
            info.ordinal_of(s, false).map(|o| Value::Enum(info.clone(), o)).ok_or_else(|| fail(&value))
        }
        (RuntimeType::Array(_), Value::Array(_)) => Ok(value),
        (RuntimeType::Object | RuntimeType::Delegate | RuntimeType::Class(_) | RuntimeType::Void, _) => Ok(value),
        _ => Err(fail(&value)),
    }
}

impl RuntimeType {
    fn default_value_if_value_type(&self) -> Option<Value> {
        match self {
            RuntimeType::Int | RuntimeType::Long | RuntimeType::Double | RuntimeType::Bool | RuntimeType::Char => {
                Some(self.default_value())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn colors() -> Rc<EnumInfo> {
        Rc::new(EnumInfo {
            full_name: "Demo.Colors".to_string(),
            members: vec!["Red".to_string(), "Green".to_string()],
        })
    }

    #[test]
    fn test_display_follows_to_string() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Double(3.0).to_string(), "3");
        assert_eq!(Value::Double(0.5).to_string(), "0.5");
        assert_eq!(Value::Enum(colors(), 1).to_string(), "Green");
        assert_eq!(Value::Null.to_display(), None);
    }

    #[test]
    fn test_convert_key_arguments() {
        assert!(convert(Value::Int(3), &RuntimeType::Double).unwrap().equals(&Value::Double(3.0)));
        assert!(convert(Value::str("Green"), &RuntimeType::Enum(colors())).unwrap().equals(&Value::Enum(colors(), 1)));
        assert!(convert(Value::Int(65), &RuntimeType::Char).unwrap().equals(&Value::Char('A')));
        assert!(convert(Value::Int(5), &RuntimeType::String).unwrap().equals(&Value::str("5")));
        assert!(matches!(
            convert(Value::str("x"), &RuntimeType::Int),
            Err(Fault::InvalidCast { .. })
        ));
    }

    #[test]
    fn test_null_converts_to_default_of_value_types() {
        assert!(convert(Value::Null, &RuntimeType::Int).unwrap().equals(&Value::Int(0)));
        assert!(convert(Value::Null, &RuntimeType::String).unwrap().is_null());
    }

    #[test]
    fn test_frame_ancestor() {
        let outer = Frame::new(1, None);
        let inner = Frame::new(0, Some(outer.clone()));
        assert!(Rc::ptr_eq(&inner.ancestor(1).unwrap(), &outer));
        assert!(inner.ancestor(2).is_none());
    }

    #[test]
    fn test_stub_fault_names_the_stub() {
        let fault = Fault::StubInvoked { type_name: "MyClass".to_string(), method: "GetLabel".to_string() };
        let message = fault.to_string();
        assert!(message.contains("'MyClass.GetLabel' was called during generation"));
        assert!(message.contains("Remove the call to 'GetLabel'"));
    }
}
