//! `Pregen.Support`
//!
//! The library generator code references: the marker attributes, the
//! `Generate` entry point of the builder protocol and a few helpers. Its
//! metadata is what a compilation binds against; its native side is what an
//! arena loads when a generator runs.

use std::cell::RefCell;
use std::rc::Rc;

use crate::frontend::references::{LibraryMetadata, MetadataKind, MethodMetadata, ParamMetadata, TypeMetadata};
use crate::frontend::semantic::ConstValue;
use crate::generator::protocol::{GeneratorsFactory, MethodBuilder};
use crate::runtime::library::{LibraryInstance, NativeLibrary};
use crate::runtime::value::{CallContext, Fault, RuntimeType, Value};

pub const LIBRARY_NAME: &str = "Pregen.Support";

pub const GENERATES_METHOD_ATTRIBUTE: &str = "Pregen.Support.GeneratesMethod";
pub const SWITCH_CASE_ATTRIBUTE: &str = "Pregen.Support.SwitchCase";
pub const SWITCH_DEFAULT_ATTRIBUTE: &str = "Pregen.Support.SwitchDefault";
pub const IMPLEMENTATION_GENERATOR_TYPE: &str = "Pregen.Support.IMethodImplementationGenerator";
pub const GENERATE_TYPE: &str = "Pregen.Support.Generate";
pub const CURRENT_GENERATOR: &str = "CurrentGenerator";

/// Constructor parameter of `GeneratesMethod` naming the stub
pub const SAME_CLASS_METHOD_NAME: &str = "sameClassMethodName";

const INTEGER_TYPE: &str = "Pregen.Support.Integer";

fn exported(name: &str, kind: MetadataKind, methods: Vec<MethodMetadata>) -> TypeMetadata {
    TypeMetadata { namespace: LIBRARY_NAME.to_string(), name: name.to_string(), kind, methods }
}

fn param(name: &str, ty: &str, default: Option<ConstValue>) -> ParamMetadata {
    ParamMetadata { name: name.to_string(), ty: ty.to_string(), default }
}

fn method(name: &str, params: usize) -> MethodMetadata {
    MethodMetadata { name: name.to_string(), params, type_params: 0 }
}

pub fn metadata() -> LibraryMetadata {
    LibraryMetadata {
        name: LIBRARY_NAME.to_string(),
        types: vec![
            exported(
                "GeneratesMethod",
                MetadataKind::Attribute { params: vec![param(SAME_CLASS_METHOD_NAME, "string", None)] },
                vec![],
            ),
            exported(
                "SwitchCase",
                MetadataKind::Attribute { params: vec![param("arg1", "object", Some(ConstValue::Null))] },
                vec![],
            ),
            exported("SwitchDefault", MetadataKind::Attribute { params: vec![] }, vec![]),
            exported("Generate", MetadataKind::Class, vec![method("Method", 0)]),
            exported("Integer", MetadataKind::Class, vec![method("Range", 2)]),
            exported("IMethodImplementationGenerator", MetadataKind::Interface, vec![]),
        ],
    }
}

/// Native side of `Pregen.Support`
#[derive(Debug, Clone, Copy, Default)]
pub struct SupportLibrary;

impl NativeLibrary for SupportLibrary {
    fn name(&self) -> &str {
        LIBRARY_NAME
    }

    fn instantiate(&self) -> Box<dyn LibraryInstance> {
        Box::new(SupportInstance { current_generator: RefCell::new(empty_factory()) })
    }
}

fn empty_factory() -> Value {
    Value::Native(Rc::new(GeneratorsFactory::empty()))
}

/// Per-arena statics
struct SupportInstance {
    current_generator: RefCell<Value>,
}

impl LibraryInstance for SupportInstance {
    fn call_static(
        &self,
        ty: &str,
        method: &str,
        _: &[RuntimeType],
        args: Vec<Value>,
        _: &dyn CallContext,
    ) -> Result<Value, Fault> {
        match (ty, method, args.as_slice()) {
            (GENERATE_TYPE, "Method", []) => Ok(Value::Native(Rc::new(MethodBuilder {
                factory: self.current_generator.borrow().clone(),
                param: None,
            }))),
            (INTEGER_TYPE, "Range", [start, end]) => range(start.as_int()?, end.as_int()?),
            _ => Err(Fault::MissingMethod { target: ty.to_string(), method: method.to_string(), args: args.len() }),
        }
    }

    fn global(&self, ty: &str, name: &str) -> Option<Value> {
        (ty == GENERATE_TYPE && name == CURRENT_GENERATOR).then(|| self.current_generator.borrow().clone())
    }

    fn set_global(&self, ty: &str, name: &str, value: Value) -> Result<(), Fault> {
        if ty != GENERATE_TYPE || name != CURRENT_GENERATOR {
            return Err(Fault::Argument(format!("'{}' has no settable property '{}'", ty, name)));
        }
        let value = match value {
            Value::Null => empty_factory(),
            Value::Native(obj) if obj.as_any().is::<GeneratorsFactory>() => Value::Native(obj),
            other => {
                return Err(Fault::InvalidCast { value: other.to_string(), target: "IGeneratorsFactory".to_string() })
            }
        };
        *self.current_generator.borrow_mut() = value;
        Ok(())
    }
}

/// Inclusive integer range
fn range(start: i64, end: i64) -> Result<Value, Fault> {
    if end < start {
        return Err(Fault::Argument(format!(
            "Range end {} must not be less than its start {}",
            end, start
        )));
    }
    Ok(Value::array((start..=end).map(Value::Int).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct NoDelegates;

    impl CallContext for NoDelegates {
        fn invoke(&self, _: &Value, _: Vec<Value>) -> Result<Value, Fault> {
            Err(Fault::NullReference)
        }

        fn lambda_body_text(&self, _: &Value) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_metadata_exports() {
        let metadata = metadata();
        let generates = metadata.find_type(GENERATES_METHOD_ATTRIBUTE).unwrap();
        assert!(generates.is_attribute());
        assert!(metadata.find_type(SWITCH_CASE_ATTRIBUTE).unwrap().is_attribute());
        assert!(metadata.find_type(IMPLEMENTATION_GENERATOR_TYPE).is_some());
        assert!(metadata.find_type(GENERATE_TYPE).unwrap().method("Method").is_some());
    }

    #[test]
    fn test_range_is_inclusive() {
        let instance = SupportLibrary.instantiate();
        let value = instance
            .call_static(INTEGER_TYPE, "Range", &[], vec![Value::Int(300), Value::Int(303)], &NoDelegates)
            .unwrap();
        let Value::Array(items) = value else { panic!("not an array") };
        let items: Vec<String> = items.borrow().iter().map(Value::to_string).collect();
        assert_eq!(items, vec!["300", "301", "302", "303"]);
    }

    #[test]
    fn test_current_generator_is_per_instance() {
        let first = SupportLibrary.instantiate();
        let second = SupportLibrary.instantiate();
        first
            .set_global(GENERATE_TYPE, CURRENT_GENERATOR, Value::Native(Rc::new(GeneratorsFactory::recording())))
            .unwrap();
        let current = |instance: &dyn LibraryInstance| match instance.global(GENERATE_TYPE, CURRENT_GENERATOR) {
            Some(Value::Native(obj)) => obj.type_name().to_string(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(current(first.as_ref()), "Pregen.Support.RecordingGeneratorsFactory");
        assert_eq!(current(second.as_ref()), "Pregen.Support.EmptyGeneratorsFactory");

        first.set_global(GENERATE_TYPE, CURRENT_GENERATOR, Value::Null).unwrap();
        assert_eq!(current(first.as_ref()), "Pregen.Support.EmptyGeneratorsFactory");
    }

    #[test]
    fn test_rejects_non_factory_generator() {
        let instance = SupportLibrary.instantiate();
        let err = instance.set_global(GENERATE_TYPE, CURRENT_GENERATOR, Value::Int(1)).unwrap_err();
        assert!(matches!(err, Fault::InvalidCast { .. }));
    }
}
