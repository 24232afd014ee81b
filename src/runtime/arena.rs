//! Execution arena
//!
//! An isolated place to run compiled code: it owns the loaded artifact, the
//! library instances the code has touched, and a resolving hook consulted
//! when code calls into a library that is not loaded yet. Dropping the arena
//! unloads everything it holds; nothing is shared between arenas.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, trace};

use crate::frontend::ast::{BinOp, UnOp};
use crate::middle::ir::{Artifact, FnId, Instr, LambdaCode, Node, Place};
use crate::runtime::library::{LibraryInstance, LibraryLoader};
use crate::runtime::value::{convert, CallContext, Closure, ExceptionValue, Fault, Frame, RuntimeType, Value};
use crate::stdlib::builtins;

/// Nested calls allowed before execution gives up
pub const MAX_CALL_DEPTH: usize = 128;

/// Host stack an arena needs to reach `MAX_CALL_DEPTH` without overflowing.
/// Threads that invoke arena code must be at least this large.
pub const EXECUTION_STACK_SIZE: usize = 32 * 1024 * 1024;

type ResolvingHook = Box<dyn Fn(&str) -> Option<PathBuf>>;

/// How a statement finished
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct ExecutionArena {
    name: String,
    loader: Rc<dyn LibraryLoader>,
    artifact: Option<Rc<Artifact>>,
    resolving: Vec<ResolvingHook>,
    /// Loaded libraries by lowercase name
    libraries: RefCell<HashMap<String, Rc<dyn LibraryInstance>>>,
    depth: Cell<usize>,
}

impl ExecutionArena {
    pub fn new(name: &str, loader: Rc<dyn LibraryLoader>) -> Self {
        debug!("creating execution arena '{}'", name);
        Self {
            name: name.to_string(),
            loader,
            artifact: None,
            resolving: Vec::new(),
            libraries: RefCell::new(HashMap::new()),
            depth: Cell::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a hook that maps a requested library name to a file
    pub fn on_resolving(&mut self, hook: impl Fn(&str) -> Option<PathBuf> + 'static) {
        self.resolving.push(Box::new(hook));
    }

    pub fn load_artifact(&mut self, artifact: Artifact) {
        debug!("arena '{}': loaded artifact '{}' ({} functions)", self.name, artifact.name, artifact.functions.len());
        self.artifact = Some(Rc::new(artifact));
    }

    /// Load a library file and return the name it registered under
    pub fn load_library(&self, path: &Path) -> Result<String, Fault> {
        let library = self.loader.load(path).map_err(|e| Fault::LibraryLoad {
            name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let name = library.name().to_string();
        let instance: Rc<dyn LibraryInstance> = Rc::from(library.instantiate());
        self.libraries.borrow_mut().insert(name.to_lowercase(), instance);
        debug!("arena '{}': loaded library {} from {}", self.name, name, path.display());
        Ok(name)
    }

    /// A loaded library, loading it through the resolving hooks on first use
    pub fn library(&self, name: &str) -> Result<Rc<dyn LibraryInstance>, Fault> {
        if let Some(instance) = self.libraries.borrow().get(&name.to_lowercase()) {
            return Ok(instance.clone());
        }
        let path = self.resolving.iter().find_map(|hook| hook(name)).ok_or_else(|| Fault::LibraryLoad {
            name: name.to_string(),
            reason: "no resolver could locate it".to_string(),
        })?;
        let loaded = self.load_library(&path)?;
        if !loaded.eq_ignore_ascii_case(name) {
            return Err(Fault::LibraryLoad {
                name: name.to_string(),
                reason: format!("{} provides '{}' instead", path.display(), loaded),
            });
        }
        self.libraries.borrow().get(&name.to_lowercase()).cloned().ok_or_else(|| Fault::LibraryLoad {
            name: name.to_string(),
            reason: "library did not register".to_string(),
        })
    }

    /// Locate a method by declaring type's full name and method name
    pub fn find_method(&self, type_full_name: &str, method: &str) -> Option<FnId> {
        self.artifact.as_ref()?.find_method(type_full_name, method)
    }

    /// Run a method to completion
    pub fn invoke(&self, func: FnId, args: Vec<Value>) -> Result<Value, Fault> {
        if let Some(target) = self.artifact()?.functions.get(func) {
            trace!("arena '{}': invoking {}", self.name, target.qualified_name());
        }
        self.call_function(func, args)
    }

    fn artifact(&self) -> Result<Rc<Artifact>, Fault> {
        self.artifact.clone().ok_or_else(|| Fault::Argument("no artifact is loaded".to_string()))
    }

    fn enter_call(&self) -> Result<(), Fault> {
        let depth = self.depth.get() + 1;
        if depth > MAX_CALL_DEPTH {
            return Err(Fault::StackOverflow(MAX_CALL_DEPTH));
        }
        self.depth.set(depth);
        Ok(())
    }

    fn leave_call(&self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }

    fn call_function(&self, id: FnId, args: Vec<Value>) -> Result<Value, Fault> {
        let artifact = self.artifact()?;
        let func = artifact
            .functions
            .get(id)
            .ok_or_else(|| Fault::Argument(format!("no function #{}", id)))?;
        if args.len() != func.params.len() {
            return Err(Fault::MissingMethod { target: func.owner.clone(), method: func.name.clone(), args: args.len() });
        }

        let frame = Frame::new(func.frame_size.max(args.len()), None);
        for (i, (arg, ty)) in args.into_iter().zip(&func.params).enumerate() {
            let value = convert(arg, ty)?;
            frame.slots.borrow_mut()[i] = value;
        }

        self.enter_call()?;
        let flow = self.exec_block(&func.body, &frame);
        self.leave_call();

        match flow? {
            Flow::Return(value) if func.ret != RuntimeType::Void => convert(value, &func.ret),
            _ => Ok(func.ret.default_value()),
        }
    }

    // ==================== Statements ====================

    fn exec_block(&self, instrs: &[Instr], frame: &Rc<Frame>) -> Result<Flow, Fault> {
        for instr in instrs {
            match self.exec(instr, frame)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&self, instr: &Instr, frame: &Rc<Frame>) -> Result<Flow, Fault> {
        match instr {
            Instr::Expr(node) => {
                self.eval(node, frame)?;
                Ok(Flow::Normal)
            }
            Instr::Store { slot, value } => {
                let value = self.eval(value, frame)?;
                frame.slots.borrow_mut()[*slot] = value;
                Ok(Flow::Normal)
            }
            Instr::Return(value) => {
                let value = match value {
                    Some(node) => self.eval(node, frame)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Instr::If { cond, then_branch, else_branch } => {
                if self.eval(cond, frame)?.as_bool()? {
                    self.exec_block(then_branch, frame)
                } else {
                    self.exec_block(else_branch, frame)
                }
            }
            Instr::While { cond, body } => {
                while self.eval(cond, frame)?.as_bool()? {
                    match self.exec_block(body, frame)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Instr::For { cond, step, body } => {
                loop {
                    if let Some(cond) = cond {
                        if !self.eval(cond, frame)?.as_bool()? {
                            break;
                        }
                    }
                    match self.exec_block(body, frame)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    for node in step {
                        self.eval(node, frame)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Instr::Foreach { slot, iter, body } => {
                let items = builtins::sequence(&self.eval(iter, frame)?)?;
                for item in items {
                    frame.slots.borrow_mut()[*slot] = item;
                    match self.exec_block(body, frame)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Instr::Switch { subject, arms } => {
                let subject = self.eval(subject, frame)?;
                let arm = arms
                    .iter()
                    .find(|arm| arm.labels.iter().any(|label| label.equals(&subject)))
                    .or_else(|| arms.iter().find(|arm| arm.is_default));
                match arm {
                    Some(arm) => match self.exec_block(&arm.body, frame)? {
                        Flow::Break => Ok(Flow::Normal),
                        other => Ok(other),
                    },
                    None => Ok(Flow::Normal),
                }
            }
            Instr::Throw(node) => {
                let value = self.eval(node, frame)?;
                Err(thrown(value))
            }
            Instr::Break => Ok(Flow::Break),
            Instr::Continue => Ok(Flow::Continue),
            Instr::Block(instrs) => self.exec_block(instrs, frame),
        }
    }

    // ==================== Expressions ====================

    fn frame_at(&self, frame: &Rc<Frame>, depth: usize) -> Result<Rc<Frame>, Fault> {
        frame.ancestor(depth).ok_or_else(|| Fault::Argument("local refers past the outermost frame".to_string()))
    }

    fn read(&self, place: &ResolvedPlace) -> Result<Value, Fault> {
        match place {
            ResolvedPlace::Local(frame, slot) => Ok(frame.slots.borrow()[*slot].clone()),
            ResolvedPlace::Element(items, index) => {
                let items = items.borrow();
                let i = element_index(*index, items.len())?;
                Ok(items[i].clone())
            }
        }
    }

    fn write(&self, place: &ResolvedPlace, value: Value) -> Result<(), Fault> {
        match place {
            ResolvedPlace::Local(frame, slot) => {
                frame.slots.borrow_mut()[*slot] = value;
                Ok(())
            }
            ResolvedPlace::Element(items, index) => {
                let mut items = items.borrow_mut();
                let i = element_index(*index, items.len())?;
                items[i] = value;
                Ok(())
            }
        }
    }

    fn resolve_place(&self, place: &Place, frame: &Rc<Frame>) -> Result<ResolvedPlace, Fault> {
        match place {
            Place::Local { depth, slot } => Ok(ResolvedPlace::Local(self.frame_at(frame, *depth)?, *slot)),
            Place::Index { target, index } => match self.eval(target, frame)? {
                Value::Array(items) => Ok(ResolvedPlace::Element(items, self.eval(index, frame)?.as_int()?)),
                Value::Null => Err(Fault::NullReference),
                other => Err(Fault::InvalidCast { value: other.to_string(), target: "array".to_string() }),
            },
        }
    }

    fn eval_args(&self, args: &[Node], frame: &Rc<Frame>) -> Result<Vec<Value>, Fault> {
        args.iter().map(|a| self.eval(a, frame)).collect()
    }

    fn eval(&self, node: &Node, frame: &Rc<Frame>) -> Result<Value, Fault> {
        match node {
            Node::Const(value) => Ok(value.clone()),

            Node::Local { depth, slot } => Ok(self.frame_at(frame, *depth)?.slots.borrow()[*slot].clone()),

            Node::Assign { target, op, value } => {
                let place = self.resolve_place(target, frame)?;
                let value = match op {
                    Some(op) => {
                        let current = self.read(&place)?;
                        binary(*op, current, self.eval(value, frame)?)?
                    }
                    None => self.eval(value, frame)?,
                };
                self.write(&place, value.clone())?;
                Ok(value)
            }

            Node::Increment { target, delta, prefix } => {
                let place = self.resolve_place(target, frame)?;
                let old = self.read(&place)?;
                let new = binary(BinOp::Add, old.clone(), Value::Int(*delta))?;
                self.write(&place, new.clone())?;
                Ok(if *prefix { new } else { old })
            }

            Node::Call { func, args } => {
                let args = self.eval_args(args, frame)?;
                self.call_function(*func, args)
            }

            Node::Native { library, ty, method, type_args, args } => {
                let args = self.eval_args(args, frame)?;
                let instance = self.library(library)?;
                instance.call_static(ty, method, type_args, args, self)
            }

            Node::Builtin { func, type_args, args, .. } => {
                let args = self.eval_args(args, frame)?;
                func(type_args, args, self)
            }

            Node::Method { target, name, type_args, args } => {
                let target = self.eval(target, frame)?;
                let args = self.eval_args(args, frame)?;
                builtins::call_method(&target, name, type_args, args, self)
            }

            Node::Invoke { callee, args } => {
                let callee = self.eval(callee, frame)?;
                let args = self.eval_args(args, frame)?;
                CallContext::invoke(self, &callee, args)
            }

            Node::Property { target, name } => builtins::get_property(&self.eval(target, frame)?, name),

            Node::Index { target, index } => {
                let target = self.eval(target, frame)?;
                let index = self.eval(index, frame)?.as_int()?;
                match target {
                    Value::Array(items) => {
                        let items = items.borrow();
                        Ok(items[element_index(index, items.len())?].clone())
                    }
                    Value::Str(s) => {
                        let chars: Vec<char> = s.chars().collect();
                        Ok(Value::Char(chars[element_index(index, chars.len())?]))
                    }
                    Value::Null => Err(Fault::NullReference),
                    other => Err(Fault::InvalidCast { value: other.to_string(), target: "array".to_string() }),
                }
            }

            Node::Unary { op, expr } => match (op, self.eval(expr, frame)?) {
                (UnOp::Neg, Value::Int(v)) => Ok(Value::Int(v.wrapping_neg())),
                (UnOp::Neg, Value::Double(v)) => Ok(Value::Double(-v)),
                (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                (_, Value::Null) => Err(Fault::NullReference),
                (op, other) => Err(Fault::InvalidCast {
                    value: other.to_string(),
                    target: if *op == UnOp::Not { "bool" } else { "number" }.to_string(),
                }),
            },

            Node::Binary { op: BinOp::And, left, right } => {
                Ok(Value::Bool(self.eval(left, frame)?.as_bool()? && self.eval(right, frame)?.as_bool()?))
            }
            Node::Binary { op: BinOp::Or, left, right } => {
                Ok(Value::Bool(self.eval(left, frame)?.as_bool()? || self.eval(right, frame)?.as_bool()?))
            }
            Node::Binary { op: BinOp::Coalesce, left, right } => match self.eval(left, frame)? {
                Value::Null => self.eval(right, frame),
                value => Ok(value),
            },
            Node::Binary { op, left, right } => {
                let left = self.eval(left, frame)?;
                let right = self.eval(right, frame)?;
                binary(*op, left, right)
            }

            Node::Conditional { cond, then_node, else_node } => {
                if self.eval(cond, frame)?.as_bool()? {
                    self.eval(then_node, frame)
                } else {
                    self.eval(else_node, frame)
                }
            }

            Node::Lambda(id) => Ok(Value::Closure(Rc::new(Closure { lambda: *id, env: frame.clone() }))),

            Node::NewArray { elem, size } => {
                let size = self.eval(size, frame)?.as_int()?;
                let size = usize::try_from(size)
                    .map_err(|_| Fault::Argument(format!("Array size cannot be negative ({})", size)))?;
                Ok(Value::array(vec![elem.default_value(); size]))
            }

            Node::ArrayLit { items } => Ok(Value::array(self.eval_args(items, frame)?)),

            Node::NewException { type_name, args } => {
                let message = match self.eval_args(args, frame)?.first() {
                    Some(value) => value.to_display().unwrap_or_default(),
                    None => format!("Exception of type '{}' was thrown.", type_name),
                };
                Ok(Value::Exception(Rc::new(ExceptionValue { type_name: type_name.clone(), message })))
            }

            Node::Throw(value) => Err(thrown(self.eval(value, frame)?)),

            Node::Convert { value, ty } => convert(self.eval(value, frame)?, ty),
        }
    }
}

impl CallContext for ExecutionArena {
    fn invoke(&self, callee: &Value, args: Vec<Value>) -> Result<Value, Fault> {
        let closure = match callee {
            Value::Closure(closure) => closure,
            Value::Null => return Err(Fault::NullReference),
            other => return Err(Fault::InvalidCast { value: other.to_string(), target: "Func".to_string() }),
        };
        let artifact = self.artifact()?;
        let lambda = artifact
            .lambdas
            .get(closure.lambda)
            .ok_or_else(|| Fault::Argument(format!("no lambda #{}", closure.lambda)))?;
        if args.len() != lambda.params {
            return Err(Fault::Argument(format!(
                "Delegate expects {} argument(s) but was given {}",
                lambda.params,
                args.len()
            )));
        }

        let frame = Frame::new(lambda.frame_size.max(args.len()), Some(closure.env.clone()));
        for (i, arg) in args.into_iter().enumerate() {
            frame.slots.borrow_mut()[i] = arg;
        }

        self.enter_call()?;
        let result = match &lambda.body {
            LambdaCode::Expr(node) => self.eval(node, &frame),
            LambdaCode::Block(instrs) => self.exec_block(instrs, &frame).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => Value::Null,
            }),
        };
        self.leave_call();
        result
    }

    fn lambda_body_text(&self, callee: &Value) -> Option<String> {
        match callee {
            Value::Closure(closure) => self.artifact.as_ref()?.lambdas.get(closure.lambda)?.body_text.clone(),
            _ => None,
        }
    }
}

impl Drop for ExecutionArena {
    fn drop(&mut self) {
        debug!(
            "unloading execution arena '{}' ({} libraries)",
            self.name,
            self.libraries.borrow().len()
        );
    }
}

/// Assignable location after its target and index were evaluated
enum ResolvedPlace {
    Local(Rc<Frame>, usize),
    Element(Rc<RefCell<Vec<Value>>>, i64),
}

fn element_index(index: i64, length: usize) -> Result<usize, Fault> {
    usize::try_from(index).ok().filter(|i| *i < length).ok_or(Fault::IndexOutOfRange { index, length })
}

/// Fault raised by `throw value`
fn thrown(value: Value) -> Fault {
    match value {
        Value::Exception(e) => Fault::Thrown { type_name: e.type_name.clone(), message: e.message.clone() },
        Value::Null => Fault::NullReference,
        other => Fault::Thrown { type_name: other.type_name(), message: other.to_string() },
    }
}

enum Num {
    Int(i64),
    Double(f64),
}

fn num(value: &Value, op: BinOp) -> Result<Num, Fault> {
    match value {
        Value::Int(v) => Ok(Num::Int(*v)),
        Value::Char(c) => Ok(Num::Int(*c as i64)),
        Value::Double(v) => Ok(Num::Double(*v)),
        Value::Enum(_, ordinal) if matches!(op, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge) => {
            Ok(Num::Int(*ordinal as i64))
        }
        Value::Null => Err(Fault::NullReference),
        other => Err(Fault::InvalidCast { value: other.to_string(), target: "number".to_string() }),
    }
}

/// Apply a strict binary operator
fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, Fault> {
    match op {
        BinOp::Eq => return Ok(Value::Bool(left.equals(&right))),
        BinOp::Ne => return Ok(Value::Bool(!left.equals(&right))),
        BinOp::Add if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) => {
            let text = format!("{}{}", left, right);
            return Ok(Value::str(&text));
        }
        _ => {}
    }

    match (num(&left, op)?, num(&right, op)?) {
        (Num::Int(a), Num::Int(b)) => match op {
            BinOp::Add => Ok(Value::Int(a.wrapping_add(b))),
            BinOp::Sub => Ok(Value::Int(a.wrapping_sub(b))),
            BinOp::Mul => Ok(Value::Int(a.wrapping_mul(b))),
            BinOp::Div if b == 0 => Err(Fault::DivideByZero),
            BinOp::Div => Ok(Value::Int(a.wrapping_div(b))),
            BinOp::Mod if b == 0 => Err(Fault::DivideByZero),
            BinOp::Mod => Ok(Value::Int(a.wrapping_rem(b))),
            BinOp::Lt => Ok(Value::Bool(a < b)),
            BinOp::Le => Ok(Value::Bool(a <= b)),
            BinOp::Gt => Ok(Value::Bool(a > b)),
            BinOp::Ge => Ok(Value::Bool(a >= b)),
            _ => Err(Fault::Argument(format!("operator {:?} does not apply to numbers", op))),
        },
        (a, b) => {
            let a = match a {
                Num::Int(v) => v as f64,
                Num::Double(v) => v,
            };
            let b = match b {
                Num::Int(v) => v as f64,
                Num::Double(v) => v,
            };
            match op {
                BinOp::Add => Ok(Value::Double(a + b)),
                BinOp::Sub => Ok(Value::Double(a - b)),
                BinOp::Mul => Ok(Value::Double(a * b)),
                BinOp::Div => Ok(Value::Double(a / b)),
                BinOp::Mod => Ok(Value::Double(a % b)),
                BinOp::Lt => Ok(Value::Bool(a < b)),
                BinOp::Le => Ok(Value::Bool(a <= b)),
                BinOp::Gt => Ok(Value::Bool(a > b)),
                BinOp::Ge => Ok(Value::Bool(a >= b)),
                _ => Err(Fault::Argument(format!("operator {:?} does not apply to numbers", op))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::references::MetadataReference;
    use crate::frontend::semantic::Compilation;
    use crate::middle::ir_gen::compile;
    use crate::runtime::library::BuiltinLoader;
    use crate::support;
    use pretty_assertions::assert_eq;

    fn arena(source: &str) -> ExecutionArena {
        let compilation = Compilation::create(
            &[("test.pg".to_string(), source.to_string())],
            vec![MetadataReference::in_memory(support::metadata())],
        )
        .unwrap();
        let artifact = compile(&compilation, "test").unwrap();
        let mut arena = ExecutionArena::new("test", Rc::new(BuiltinLoader));
        arena.load_artifact(artifact);
        arena
    }

    fn run(arena: &ExecutionArena, ty: &str, method: &str, args: Vec<Value>) -> Result<Value, Fault> {
        let func = arena.find_method(ty, method).unwrap();
        arena.invoke(func, args)
    }

    const SPIGOT: &str = "
        namespace Demo;
        static class SlowMath {
            public static int CalculatePiDecimal(int d) {
                int n = d + 10;
                int len = n * 10 / 3 + 1;
                int[] a = new int[len];
                for (int i = 0; i < len; i++) a[i] = 2;
                int nines = 0; int predigit = 0;
                var digits = new int[n + 2];
                int count = 0;
                for (int j = 0; j < n; j++) {
                    int q = 0;
                    for (int i = len; i > 0; i--) {
                        int x = 10 * a[i - 1] + q * i;
                        a[i - 1] = x % (2 * i - 1);
                        q = x / (2 * i - 1);
                    }
                    a[0] = q % 10;
                    q = q / 10;
                    if (q == 9) { nines++; }
                    else if (q == 10) {
                        digits[count++] = predigit + 1;
                        for (int k = 0; k < nines; k++) digits[count++] = 0;
                        predigit = 0; nines = 0;
                    } else {
                        digits[count++] = predigit;
                        predigit = q;
                        for (int k = 0; k < nines; k++) digits[count++] = 9;
                        nines = 0;
                    }
                }
                digits[count] = predigit;
                return digits[d + 1];
            }
        }";

    #[test]
    fn test_pi_spigot() {
        let arena = arena(SPIGOT);
        let digits: Vec<String> = (0..6)
            .map(|d| run(&arena, "Demo.SlowMath", "CalculatePiDecimal", vec![Value::Int(d)]).unwrap().to_string())
            .collect();
        assert_eq!(digits, vec!["3", "1", "4", "1", "5", "9"]);
    }

    #[test]
    fn test_closures_capture_enclosing_frame() {
        let arena = arena(
            "class A {
                static int F() {
                    int total = 0;
                    Func<int, int> add = x => { total += x; return total; };
                    add(2);
                    return add(3);
                }
            }",
        );
        assert_eq!(run(&arena, "A", "F", vec![]).unwrap().to_string(), "5");
    }

    #[test]
    fn test_switch_foreach_and_strings() {
        let arena = arena(
            "enum Pet { Dog, Cat }
             class A {
                static string Name(Pet p) {
                    switch (p) { case Pet.Dog: return \"woof\"; default: return \"meow\"; }
                }
                static string All() {
                    var parts = new string[2];
                    int i = 0;
                    foreach (var p in Enum.GetValues<Pet>()) { parts[i++] = p + \"=\" + Name(p); }
                    return string.Join(\", \", parts);
                }
             }",
        );
        assert_eq!(run(&arena, "A", "All", vec![]).unwrap().to_string(), "Dog=woof, Cat=meow");
    }

    #[test]
    fn test_faults() {
        let arena = arena(
            "class A {
                static int Div(int a) => 10 / a;
                static int Boom() { throw new InvalidOperationException(\"bad\"); }
             }",
        );
        assert_eq!(run(&arena, "A", "Div", vec![Value::Int(0)]).err(), Some(Fault::DivideByZero));
        assert_eq!(
            run(&arena, "A", "Boom", vec![]).err(),
            Some(Fault::Thrown { type_name: "InvalidOperationException".to_string(), message: "bad".to_string() })
        );
    }

    #[test]
    fn test_runaway_recursion_faults() {
        let fault = std::thread::Builder::new()
            .stack_size(EXECUTION_STACK_SIZE)
            .spawn(|| {
                let arena = arena("class A { static int Deep(int n) => Deep(n + 1); }");
                run(&arena, "A", "Deep", vec![Value::Int(0)]).err()
            })
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(fault, Some(Fault::StackOverflow(MAX_CALL_DEPTH)));
    }

    #[test]
    fn test_arguments_convert_to_parameter_types() {
        let arena = arena("class A { static double Half(double x) => x / 2; }");
        assert_eq!(run(&arena, "A", "Half", vec![Value::Int(3)]).unwrap().to_string(), "1.5");
    }

    #[test]
    fn test_libraries_resolve_through_hook() {
        let source = "using Pregen.Support; class A { static int Count() => Integer.Range(1, 4).Length; }";
        let unresolved = arena(source);
        assert!(matches!(run(&unresolved, "A", "Count", vec![]), Err(Fault::LibraryLoad { .. })));

        let mut resolved = arena(source);
        resolved.on_resolving(|name| {
            name.eq_ignore_ascii_case("pregen.support").then(|| PathBuf::from("sdk/Pregen.Support.pglib"))
        });
        assert_eq!(run(&resolved, "A", "Count", vec![]).unwrap().to_string(), "4");
    }
}
