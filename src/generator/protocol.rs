//! Case-recording protocol
//!
//! The builder objects behind `Generate.Method()`. A generator method drives
//! them through a fluent chain; when the arena's current factory is a
//! recording one, every `ForCases(..).ReturnConstantValue(..)` appends
//! (key, value) pairs to a shared record and every default-case call sets
//! the fallback marker. The fallback's value is never computed here.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::value::{convert, CallContext, Fault, NativeObject, RuntimeType, Value};
use crate::stdlib::builtins::sequence;

/// Value recorded for one case
#[derive(Debug, Clone)]
pub enum RecordedValue {
    /// Result of running the value factory for the key
    Constant(Value),
    /// Source text of a `UseBody` lambda, spliced instead of a value
    Body(Option<String>),
}

/// Everything one fluent execution recorded
#[derive(Debug, Clone, Default)]
pub struct SwitchBodyRecord {
    pub cases: Vec<(Value, RecordedValue)>,
    pub has_default_case: bool,
    /// Set once the chain reached a switch body or a body call
    pub completed: bool,
}

type SharedRecord = Rc<RefCell<SwitchBodyRecord>>;

/// Factory stored in `Generate.CurrentGenerator`
#[derive(Debug)]
pub struct GeneratorsFactory {
    recording: bool,
    last_record: RefCell<Option<SharedRecord>>,
}

impl GeneratorsFactory {
    pub fn recording() -> Self {
        Self { recording: true, last_record: RefCell::new(None) }
    }

    /// Factory whose builders accept every call and keep nothing
    pub fn empty() -> Self {
        Self { recording: false, last_record: RefCell::new(None) }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Start a new implementation; a recording factory remembers its record
    pub fn create_implementation(&self, param: Option<RuntimeType>, ret: RuntimeType) -> Value {
        let record = SharedRecord::default();
        if self.recording {
            *self.last_record.borrow_mut() = Some(record.clone());
        }
        Value::Native(Rc::new(ImplementationGenerator { record, param, ret }))
    }

    /// Snapshot of the most recently created record, if its chain was
    /// carried past `WithReturnType`
    pub fn last_record(&self) -> Option<SwitchBodyRecord> {
        self.last_record.borrow().as_ref().map(|r| r.borrow().clone()).filter(|r| r.completed)
    }
}

impl NativeObject for GeneratorsFactory {
    fn type_name(&self) -> &str {
        if self.recording {
            "Pregen.Support.RecordingGeneratorsFactory"
        } else {
            "Pregen.Support.EmptyGeneratorsFactory"
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call_method(
        &self,
        name: &str,
        type_args: &[RuntimeType],
        args: Vec<Value>,
        _: &dyn CallContext,
    ) -> Result<Value, Fault> {
        match (name, type_args, args.len()) {
            ("CreateImplementation", [ret], 0) => Ok(self.create_implementation(None, ret.clone())),
            ("CreateImplementation", [param, ret], 0) => {
                Ok(self.create_implementation(Some(param.clone()), ret.clone()))
            }
            _ => Err(missing(self.type_name(), name, args.len())),
        }
    }
}

fn missing(target: &str, method: &str, args: usize) -> Fault {
    Fault::MissingMethod { target: target.to_string(), method: method.to_string(), args }
}

fn single_type_arg<'t>(type_args: &'t [RuntimeType], method: &str) -> Result<&'t RuntimeType, Fault> {
    match type_args {
        [ty] => Ok(ty),
        _ => Err(Fault::Argument(format!("'{}' takes exactly one type argument", method))),
    }
}

/// Result of `Generate.Method()` and `WithParameter<T>()`
#[derive(Debug)]
pub struct MethodBuilder {
    /// The factory current when `Generate.Method()` ran
    pub factory: Value,
    pub param: Option<RuntimeType>,
}

impl NativeObject for MethodBuilder {
    fn type_name(&self) -> &str {
        "Pregen.Support.IMethodBuilder"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call_method(
        &self,
        name: &str,
        type_args: &[RuntimeType],
        args: Vec<Value>,
        _: &dyn CallContext,
    ) -> Result<Value, Fault> {
        if !args.is_empty() {
            return Err(missing(self.type_name(), name, args.len()));
        }
        match name {
            "WithParameter" if self.param.is_none() => Ok(Value::Native(Rc::new(MethodBuilder {
                factory: self.factory.clone(),
                param: Some(single_type_arg(type_args, name)?.clone()),
            }))),
            "WithReturnType" => {
                let ret = single_type_arg(type_args, name)?.clone();
                let factory = match &self.factory {
                    Value::Native(obj) => obj.as_any().downcast_ref::<GeneratorsFactory>(),
                    _ => None,
                };
                let factory = factory.ok_or(Fault::NullReference)?;
                Ok(factory.create_implementation(self.param.clone(), ret))
            }
            _ => Err(missing(self.type_name(), name, 0)),
        }
    }
}

/// `IMethodImplementationGenerator`: the fluent entry type
#[derive(Debug)]
pub struct ImplementationGenerator {
    record: SharedRecord,
    param: Option<RuntimeType>,
    ret: RuntimeType,
}

impl NativeObject for ImplementationGenerator {
    fn type_name(&self) -> &str {
        "Pregen.Support.IMethodImplementationGenerator"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call_method(
        &self,
        name: &str,
        _: &[RuntimeType],
        args: Vec<Value>,
        _: &dyn CallContext,
    ) -> Result<Value, Fault> {
        match (name, args.len(), &self.param) {
            ("WithSwitchBody", 0, Some(param)) => {
                self.record.borrow_mut().completed = true;
                Ok(Value::Native(Rc::new(SwitchBody {
                    record: self.record.clone(),
                    param: param.clone(),
                    ret: self.ret.clone(),
                })))
            }
            // Body of a parameterless method: the lambda is the fallback
            ("WithBody" | "UseBody", 1, _) => {
                let mut record = self.record.borrow_mut();
                record.has_default_case = true;
                record.completed = true;
                drop(record);
                Ok(self.continuation())
            }
            _ => Err(missing(self.type_name(), name, args.len())),
        }
    }
}

impl ImplementationGenerator {
    fn continuation(&self) -> Value {
        Value::Native(Rc::new(ImplementationGenerator {
            record: self.record.clone(),
            param: self.param.clone(),
            ret: self.ret.clone(),
        }))
    }
}

/// Switch body under construction; more cases may follow
#[derive(Debug)]
pub struct SwitchBody {
    record: SharedRecord,
    param: RuntimeType,
    ret: RuntimeType,
}

impl SwitchBody {
    /// Flatten scalars and arrays into keys converted to the parameter type
    fn flatten_cases(&self, args: Vec<Value>) -> Result<Vec<Value>, Fault> {
        let mut keys = Vec::new();
        for arg in args {
            let items = match &arg {
                Value::Array(_) => sequence(&arg)?,
                _ => vec![arg],
            };
            for item in items {
                if item.is_null() {
                    return Err(Fault::Thrown {
                        type_name: "InvalidOperationException".to_string(),
                        message: "Switch case value cannot be null".to_string(),
                    });
                }
                keys.push(convert(item, &self.param)?);
            }
        }
        Ok(keys)
    }
}

impl NativeObject for SwitchBody {
    fn type_name(&self) -> &str {
        "Pregen.Support.IMethodImplementationGeneratorSwitchBody"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call_method(
        &self,
        name: &str,
        _: &[RuntimeType],
        args: Vec<Value>,
        _: &dyn CallContext,
    ) -> Result<Value, Fault> {
        match name {
            "ForCases" => Ok(Value::Native(Rc::new(SwitchBodyCase {
                keys: self.flatten_cases(args)?,
                record: self.record.clone(),
                param: self.param.clone(),
                ret: self.ret.clone(),
            }))),
            "ForDefaultCase" if args.is_empty() => Ok(Value::Native(Rc::new(DefaultCase {
                record: self.record.clone(),
                param: self.param.clone(),
                ret: self.ret.clone(),
            }))),
            _ => Err(missing(self.type_name(), name, args.len())),
        }
    }
}

/// Keys waiting for their value
#[derive(Debug)]
pub struct SwitchBodyCase {
    keys: Vec<Value>,
    record: SharedRecord,
    param: RuntimeType,
    ret: RuntimeType,
}

impl SwitchBodyCase {
    fn switch_body(&self) -> Value {
        Value::Native(Rc::new(SwitchBody {
            record: self.record.clone(),
            param: self.param.clone(),
            ret: self.ret.clone(),
        }))
    }
}

impl NativeObject for SwitchBodyCase {
    fn type_name(&self) -> &str {
        "Pregen.Support.IMethodImplementationGeneratorSwitchBodyCase"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call_method(
        &self,
        name: &str,
        _: &[RuntimeType],
        args: Vec<Value>,
        ctx: &dyn CallContext,
    ) -> Result<Value, Fault> {
        let [factory] = args.as_slice() else {
            return Err(missing(self.type_name(), name, args.len()));
        };
        match name {
            "ReturnConstantValue" => {
                for key in &self.keys {
                    let value = convert(ctx.invoke(factory, vec![key.clone()])?, &self.ret)?;
                    self.record.borrow_mut().cases.push((key.clone(), RecordedValue::Constant(value)));
                }
                Ok(self.switch_body())
            }
            "UseBody" => {
                let body = ctx.lambda_body_text(factory);
                for key in &self.keys {
                    self.record.borrow_mut().cases.push((key.clone(), RecordedValue::Body(body.clone())));
                }
                Ok(self.switch_body())
            }
            _ => Err(missing(self.type_name(), name, args.len())),
        }
    }
}

/// `ForDefaultCase()`: the next body call closes the switch
#[derive(Debug)]
pub struct DefaultCase {
    record: SharedRecord,
    param: RuntimeType,
    ret: RuntimeType,
}

impl NativeObject for DefaultCase {
    fn type_name(&self) -> &str {
        "Pregen.Support.IMethodImplementationGeneratorSwitchBodyDefaultCase"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn call_method(
        &self,
        name: &str,
        _: &[RuntimeType],
        args: Vec<Value>,
        _: &dyn CallContext,
    ) -> Result<Value, Fault> {
        match (name, args.len()) {
            ("WithBody" | "UseBody" | "CompileTimeBody" | "RuntimeBody", 1) => {
                self.record.borrow_mut().has_default_case = true;
                Ok(Value::Native(Rc::new(ImplementationGenerator {
                    record: self.record.clone(),
                    param: Some(self.param.clone()),
                    ret: self.ret.clone(),
                })))
            }
            _ => Err(missing(self.type_name(), name, args.len())),
        }
    }
}

/// Methods that can end a fluent chain with a default case
pub const DEFAULT_CASE_METHODS: &[&str] = &["WithBody", "UseBody", "CompileTimeBody", "RuntimeBody"];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Delegates double integers; every lambda's body reads `k * 2`
    struct Doubling;

    impl CallContext for Doubling {
        fn invoke(&self, _: &Value, args: Vec<Value>) -> Result<Value, Fault> {
            Ok(Value::Int(args[0].as_int()? * 2))
        }

        fn lambda_body_text(&self, _: &Value) -> Option<String> {
            Some("k * 2".to_string())
        }
    }

    fn call(target: &Value, name: &str, type_args: &[RuntimeType], args: Vec<Value>) -> Value {
        match target {
            Value::Native(obj) => obj.call_method(name, type_args, args, &Doubling).unwrap(),
            other => panic!("not a builder: {:?}", other),
        }
    }

    fn recorded(record: &SwitchBodyRecord) -> Vec<(String, String)> {
        record
            .cases
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    RecordedValue::Constant(c) => c.to_string(),
                    RecordedValue::Body(b) => format!("body:{}", b.clone().unwrap_or_default()),
                };
                (k.to_string(), v)
            })
            .collect()
    }

    #[test]
    fn test_recording_chain() {
        let factory = Rc::new(GeneratorsFactory::recording());
        let builder = Value::Native(Rc::new(MethodBuilder { factory: Value::Native(factory.clone()), param: None }));
        let builder = call(&builder, "WithParameter", &[RuntimeType::Int], vec![]);
        let generator = call(&builder, "WithReturnType", &[RuntimeType::Int], vec![]);
        let body = call(&generator, "WithSwitchBody", &[], vec![]);
        let range = Value::array(vec![Value::Int(300), Value::Int(301)]);
        let cases = call(&body, "ForCases", &[], vec![Value::Int(0), Value::Int(1), range]);
        let body = call(&cases, "ReturnConstantValue", &[], vec![Value::Null]);
        let cases = call(&body, "ForCases", &[], vec![Value::Int(7)]);
        let body = call(&cases, "UseBody", &[], vec![Value::Null]);
        let default = call(&body, "ForDefaultCase", &[], vec![]);
        call(&default, "WithBody", &[], vec![Value::Null]);

        let record = factory.last_record().unwrap();
        assert!(record.has_default_case);
        assert_eq!(
            recorded(&record),
            vec![
                ("0".to_string(), "0".to_string()),
                ("1".to_string(), "2".to_string()),
                ("300".to_string(), "600".to_string()),
                ("301".to_string(), "602".to_string()),
                ("7".to_string(), "body:k * 2".to_string()),
            ]
        );
    }

    #[test]
    fn test_keys_convert_to_parameter_type() {
        let factory = GeneratorsFactory::recording();
        let generator = factory.create_implementation(Some(RuntimeType::Double), RuntimeType::String);
        let body = call(&generator, "WithSwitchBody", &[], vec![]);
        let cases = call(&body, "ForCases", &[], vec![Value::Int(2), Value::str("2.5")]);
        call(&cases, "UseBody", &[], vec![Value::Null]);
        let record = factory.last_record().unwrap();
        assert!(matches!(record.cases[0].0, Value::Double(d) if d == 2.0));
        assert!(matches!(record.cases[1].0, Value::Double(d) if d == 2.5));
        assert!(!record.has_default_case);
    }

    #[test]
    fn test_empty_factory_keeps_nothing() {
        let factory = GeneratorsFactory::empty();
        let generator = factory.create_implementation(None, RuntimeType::String);
        call(&generator, "UseBody", &[], vec![Value::Null]);
        assert!(factory.last_record().is_none());
        assert!(!factory.is_recording());
    }

    #[test]
    fn test_parameterless_body_marks_fallback() {
        let factory = GeneratorsFactory::recording();
        let generator = factory.create_implementation(None, RuntimeType::String);
        call(&generator, "UseBody", &[], vec![Value::Null]);
        let record = factory.last_record().unwrap();
        assert!(record.has_default_case);
        assert!(record.cases.is_empty());
    }

    #[test]
    fn test_unfinished_chain_leaves_no_record() {
        let factory = GeneratorsFactory::recording();
        factory.create_implementation(Some(RuntimeType::Int), RuntimeType::Int);
        assert!(factory.last_record().is_none());

        let generator = factory.create_implementation(Some(RuntimeType::Int), RuntimeType::Int);
        call(&generator, "WithSwitchBody", &[], vec![]);
        let record = factory.last_record().unwrap();
        assert!(record.completed);
        assert!(record.cases.is_empty());
    }

    #[test]
    fn test_null_case_key_faults() {
        let factory = GeneratorsFactory::recording();
        let generator = factory.create_implementation(Some(RuntimeType::Int), RuntimeType::Int);
        let Value::Native(body) = call(&generator, "WithSwitchBody", &[], vec![]) else { panic!() };
        let fault = body.call_method("ForCases", &[], vec![Value::Null], &Doubling).unwrap_err();
        assert_eq!(fault.to_string(), "InvalidOperationException: Switch case value cannot be null");
    }
}
