//! Source synthesis
//!
//! One emitter for all three authoring patterns. Values observed during
//! execution become literals; fallback expressions are spliced in as the
//! source text they were written as.

use crate::frontend::ast::{Accessibility, CaseLabel, Expr, LambdaBody, MethodBody, Stmt, TypeKind};
use crate::frontend::semantic::{Compilation, MethodId};
use crate::generator::protocol::{RecordedValue, SwitchBodyRecord, DEFAULT_CASE_METHODS};
use crate::runtime::value::Value;

/// What a generator group produced, per authoring pattern
#[derive(Debug, Clone)]
pub enum GenerationResult {
    /// Value returned by a direct-return generator
    DirectReturn(Value),
    /// Per-key values computed by case-key generators
    CaseTable { cases: Vec<(Value, Value)>, default_expression: Option<String> },
    /// Cases recorded by a fluent generator
    Fluent { record: SwitchBodyRecord, default_expression: Option<String> },
}

pub fn accessibility_keyword(accessibility: Accessibility) -> &'static str {
    match accessibility {
        Accessibility::Public => "public",
        Accessibility::Protected => "protected",
        Accessibility::Internal => "internal",
        Accessibility::ProtectedInternal => "protected internal",
        Accessibility::PrivateProtected => "private protected",
        Accessibility::Private => "private",
    }
}

/// Emit the implementation of `stub`
pub fn synthesize(compilation: &Compilation, stub: MethodId, result: &GenerationResult) -> String {
    let method = compilation.method(stub);
    let ret = compilation.display_type(&method.ret_type, stub);
    let param = method.params.first().map(|p| p.name.name.as_str());
    let mut out = header(compilation, stub);

    match result {
        GenerationResult::DirectReturn(value) => {
            if !method.ret_type.is_void() {
                out.push_str(&format!("        return {};\n", format_literal(value, &ret)));
            }
        }
        GenerationResult::CaseTable { cases, default_expression } => {
            let arms = cases.iter().map(|(k, v)| (format_key(k), format_literal(v, &ret))).collect();
            out.push_str(&switch_body(param, arms, default_expression.as_deref()));
        }
        GenerationResult::Fluent { record, default_expression } => {
            let arms = record
                .cases
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        RecordedValue::Constant(value) => format_literal(value, &ret),
                        RecordedValue::Body(Some(text)) => text.clone(),
                        RecordedValue::Body(None) => "default".to_string(),
                    };
                    (format_key(k), value)
                })
                .collect();
            let fallback = default_expression.as_deref().filter(|_| record.has_default_case);
            out.push_str(&switch_body(param, arms, fallback));
        }
    }

    out.push_str("    }\n");
    out.push_str("}\n");
    out
}

fn header(compilation: &Compilation, stub: MethodId) -> String {
    let method = compilation.method(stub);
    let ty = compilation.type_symbol(method.containing_type);
    let mut out = String::new();

    if let Some(ns) = &ty.namespace {
        out.push_str(&format!("namespace {};\n\n", ns));
    }
    let keyword = match ty.kind {
        TypeKind::Struct => "struct",
        TypeKind::Interface => "interface",
        _ => "class",
    };
    let type_modifiers = if ty.is_static { "static partial" } else { "partial" };
    out.push_str(&format!("{} {} {}\n{{\n", type_modifiers, keyword, ty.name));

    let access = method.accessibility.map(accessibility_keyword).unwrap_or("private");
    let method_modifiers = if method.is_static { "static partial" } else { "partial" };
    let params: Vec<String> = method
        .params
        .iter()
        .map(|p| format!("{} {}", compilation.display_type(&p.ty, stub), p.name.name))
        .collect();
    out.push_str(&format!(
        "    {} {} {} {}({})\n    {{\n",
        access,
        method_modifiers,
        compilation.display_type(&method.ret_type, stub),
        method.name,
        params.join(", ")
    ));
    out
}

fn switch_body(param: Option<&str>, arms: Vec<(String, String)>, default_expression: Option<&str>) -> String {
    let Some(param) = param else {
        return format!("        {}\n", return_statement(default_expression.unwrap_or("default")));
    };
    let mut out = format!("        switch ({})\n        {{\n", param);
    for (key, value) in arms {
        out.push_str(&format!("            case {}: return {};\n", key, value));
    }
    if let Some(expr) = default_expression {
        out.push_str(&format!("            default: {}\n", return_statement(expr)));
    }
    out.push_str("        }\n");
    out
}

/// A throw expression is already a statement on its own
fn return_statement(expr: &str) -> String {
    if expr.starts_with("throw ") {
        format!("{};", expr)
    } else {
        format!("return {};", expr)
    }
}

/// Literal for a value returned from a method declared to return `ret`
pub fn format_literal(value: &Value, ret: &str) -> String {
    match value {
        Value::Null => return "default".to_string(),
        Value::Enum(info, ordinal) => {
            if let Some(member) = info.members.get(*ordinal) {
                return format!("{}.{}", info.full_name, member);
            }
        }
        _ => {}
    }
    let text = value.to_string();
    match ret {
        "string" | "String" => quote(&text, '"'),
        "char" if text.chars().count() == 1 => quote(&text, '\''),
        "bool" | "Boolean" => text.to_lowercase(),
        _ => text,
    }
}

/// Case label for a key, formatted by the key's own type
pub fn format_key(key: &Value) -> String {
    match key {
        Value::Str(s) => quote(s, '"'),
        Value::Char(c) => quote(&c.to_string(), '\''),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => format_literal(other, ""),
    }
}

fn quote(text: &str, delimiter: char) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(delimiter);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

fn source_text(compilation: &Compilation, expr: Option<&Expr>) -> Option<String> {
    let inner = expr?.innermost_lambda_body()?;
    compilation.sources().slice(inner.span()).map(str::to_string)
}

/// Fallback of a `SwitchDefault` generator: its expression body or first
/// top-level `return`, unwrapped through lambdas
pub fn switch_default_expression(compilation: &Compilation, generator: MethodId) -> Option<String> {
    let expr = match compilation.method_syntax(generator).body.as_ref()? {
        MethodBody::Expr(expr) => Some(expr),
        MethodBody::Block(block) => block.stmts.iter().find_map(|stmt| match stmt {
            Stmt::Return { value, .. } => Some(value.as_ref()),
            _ => None,
        })?,
    };
    source_text(compilation, expr)
}

/// Fallback of a fluent generator: the argument of the body call made on
/// `ForDefaultCase()`, or of a parameterless `UseBody`/`WithBody`
pub fn fluent_default_expression(compilation: &Compilation, generator: MethodId) -> Option<String> {
    let call = match compilation.method_syntax(generator).body.as_ref()? {
        MethodBody::Expr(expr) => find_in_expr(expr, &is_default_call),
        MethodBody::Block(block) => block.stmts.iter().find_map(|s| find_in_stmt(s, &is_default_call)),
    }?;
    match call {
        Expr::Call { args, .. } => source_text(compilation, args.first()),
        _ => None,
    }
}

fn called_method(expr: &Expr) -> Option<(&str, &Expr)> {
    match expr {
        Expr::Call { callee, .. } => match callee.as_ref() {
            Expr::Member { target, name, .. } => Some((name.name.as_str(), target.as_ref())),
            _ => None,
        },
        _ => None,
    }
}

fn is_default_call(expr: &Expr) -> bool {
    let Some((name, receiver)) = called_method(expr) else {
        return false;
    };
    let receiver = called_method(receiver).map(|(n, _)| n);
    (DEFAULT_CASE_METHODS.contains(&name) && receiver == Some("ForDefaultCase"))
        || (matches!(name, "UseBody" | "WithBody") && receiver == Some("WithReturnType"))
}

fn find_in_stmt<'e>(stmt: &'e Stmt, pred: &dyn Fn(&Expr) -> bool) -> Option<&'e Expr> {
    match stmt {
        Stmt::Block(block) => block.stmts.iter().find_map(|s| find_in_stmt(s, pred)),
        Stmt::Local { value, .. } => value.as_ref().and_then(|v| find_in_expr(v, pred)),
        Stmt::Expr(expr) | Stmt::Throw { value: expr, .. } => find_in_expr(expr, pred),
        Stmt::Return { value, .. } => value.as_ref().and_then(|v| find_in_expr(v, pred)),
        Stmt::If { cond, then_branch, else_branch, .. } => find_in_expr(cond, pred)
            .or_else(|| find_in_stmt(then_branch, pred))
            .or_else(|| else_branch.as_ref().and_then(|e| find_in_stmt(e, pred))),
        Stmt::While { cond, body, .. } => find_in_expr(cond, pred).or_else(|| find_in_stmt(body, pred)),
        Stmt::For { init, cond, step, body, .. } => init
            .as_ref()
            .and_then(|s| find_in_stmt(s, pred))
            .or_else(|| cond.as_ref().and_then(|c| find_in_expr(c, pred)))
            .or_else(|| step.iter().find_map(|e| find_in_expr(e, pred)))
            .or_else(|| find_in_stmt(body, pred)),
        Stmt::Foreach { iter, body, .. } => find_in_expr(iter, pred).or_else(|| find_in_stmt(body, pred)),
        Stmt::Switch { subject, sections, .. } => find_in_expr(subject, pred).or_else(|| {
            sections.iter().find_map(|section| {
                section
                    .labels
                    .iter()
                    .find_map(|label| match label {
                        CaseLabel::Case(e) => find_in_expr(e, pred),
                        CaseLabel::Default(_) => None,
                    })
                    .or_else(|| section.body.iter().find_map(|s| find_in_stmt(s, pred)))
            })
        }),
        Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Empty { .. } => None,
    }
}

/// First expression, outermost first, that satisfies `pred`
fn find_in_expr<'e>(expr: &'e Expr, pred: &dyn Fn(&Expr) -> bool) -> Option<&'e Expr> {
    if pred(expr) {
        return Some(expr);
    }
    match expr {
        Expr::Literal(_) | Expr::Name(_) | Expr::Default(_) | Expr::NameOf(..) => None,
        Expr::Member { target, .. } => find_in_expr(target, pred),
        Expr::Call { callee, args, .. } => {
            find_in_expr(callee, pred).or_else(|| args.iter().find_map(|a| find_in_expr(a, pred)))
        }
        Expr::Index { target, index, .. } => find_in_expr(target, pred).or_else(|| find_in_expr(index, pred)),
        Expr::Unary { expr, .. } | Expr::Throw(expr, _) => find_in_expr(expr, pred),
        Expr::Binary { left, right, .. } => find_in_expr(left, pred).or_else(|| find_in_expr(right, pred)),
        Expr::Assign { target, value, .. } => find_in_expr(target, pred).or_else(|| find_in_expr(value, pred)),
        Expr::Increment { target, .. } => find_in_expr(target, pred),
        Expr::Conditional { cond, then_expr, else_expr, .. } => find_in_expr(cond, pred)
            .or_else(|| find_in_expr(then_expr, pred))
            .or_else(|| find_in_expr(else_expr, pred)),
        Expr::Lambda { body, .. } => match body.as_ref() {
            LambdaBody::Expr(inner) => find_in_expr(inner, pred),
            LambdaBody::Block(block) => block.stmts.iter().find_map(|s| find_in_stmt(s, pred)),
        },
        Expr::NewArray { size, items, .. } => size
            .as_ref()
            .and_then(|s| find_in_expr(s, pred))
            .or_else(|| items.iter().flatten().find_map(|i| find_in_expr(i, pred))),
        Expr::NewObject { args, .. } => args.iter().find_map(|a| find_in_expr(a, pred)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::references::MetadataReference;
    use crate::runtime::value::EnumInfo;
    use crate::support;
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn compilation(source: &str) -> Compilation {
        Compilation::create(
            &[("demo.pg".to_string(), source.to_string())],
            vec![MetadataReference::in_memory(support::metadata())],
        )
        .unwrap()
    }

    fn method(c: &Compilation, name: &str) -> MethodId {
        c.methods().iter().find(|m| m.name == name).unwrap().id
    }

    #[test]
    fn test_format_literal_by_return_type() {
        assert_eq!(format_literal(&Value::str("Red, Green"), "string"), "\"Red, Green\"");
        assert_eq!(format_literal(&Value::str("a\"b\\c\n\u{1}"), "string"), "\"a\\\"b\\\\c\\n\\u0001\"");
        assert_eq!(format_literal(&Value::Char('\''), "char"), "'\\''");
        assert_eq!(format_literal(&Value::str("ab"), "char"), "ab");
        assert_eq!(format_literal(&Value::Bool(true), "bool"), "true");
        assert_eq!(format_literal(&Value::Int(42), "int"), "42");
        assert_eq!(format_literal(&Value::Double(2.5), "double"), "2.5");
        assert_eq!(format_literal(&Value::Null, "string"), "default");
        let colors = Rc::new(EnumInfo { full_name: "Demo.Color".to_string(), members: vec!["Red".to_string()] });
        assert_eq!(format_literal(&Value::Enum(colors, 0), "Demo.Color"), "Demo.Color.Red");
    }

    #[test]
    fn test_format_key_by_own_type() {
        assert_eq!(format_key(&Value::str("x")), "\"x\"");
        assert_eq!(format_key(&Value::Char('c')), "'c'");
        assert_eq!(format_key(&Value::Bool(false)), "false");
        assert_eq!(format_key(&Value::Int(-3)), "-3");
    }

    const PI: &str = "using Pregen.Support;
namespace Demo;
public static partial class PiExample
{
    public static partial int GetPiDecimal(int decimalNumber);
    internal static partial string Describe();
    public partial void Log();

    [GeneratesMethod(nameof(GetPiDecimal))]
    [SwitchDefault]
    static Func<int, int> Fallback() => decimalNumber => SlowMath.CalculatePiDecimal(decimalNumber);

    [GeneratesMethod(nameof(GetPiDecimal))]
    static Func<int, int> BlockFallback() { var unused = 1; return n => () => n + 1; }
}";

    #[test]
    fn test_case_table_with_default() {
        let c = compilation(PI);
        let result = GenerationResult::CaseTable {
            cases: vec![(Value::Int(0), Value::Int(3)), (Value::Int(1), Value::Int(1))],
            default_expression: switch_default_expression(&c, method(&c, "Fallback")),
        };
        assert_eq!(
            synthesize(&c, method(&c, "GetPiDecimal"), &result),
            "namespace Demo;

static partial class PiExample
{
    public static partial int GetPiDecimal(int decimalNumber)
    {
        switch (decimalNumber)
        {
            case 0: return 3;
            case 1: return 1;
            default: return SlowMath.CalculatePiDecimal(decimalNumber);
        }
    }
}
"
        );
    }

    #[test]
    fn test_unrecorded_fallback_is_not_emitted() {
        let c = compilation(PI);
        let record = SwitchBodyRecord { cases: Vec::new(), has_default_case: false, completed: true };
        let result = GenerationResult::Fluent { record, default_expression: Some("\"ignored\"".to_string()) };
        assert_eq!(
            synthesize(&c, method(&c, "Describe"), &result),
            "namespace Demo;

static partial class PiExample
{
    internal static partial string Describe()
    {
        return default;
    }
}
"
        );
    }

    #[test]
    fn test_direct_return_and_void() {
        let c = compilation(PI);
        let text = synthesize(&c, method(&c, "Describe"), &GenerationResult::DirectReturn(Value::str("pi")));
        assert!(text.contains("        return \"pi\";\n"));
        let text = synthesize(&c, method(&c, "Log"), &GenerationResult::DirectReturn(Value::Null));
        assert!(text.ends_with("    public partial void Log()\n    {\n    }\n}\n"));
    }

    #[test]
    fn test_throwing_fallback_is_not_returned() {
        let c = compilation(PI);
        let result = GenerationResult::CaseTable {
            cases: Vec::new(),
            default_expression: Some("throw new ArgumentException(\"no\")".to_string()),
        };
        let text = synthesize(&c, method(&c, "GetPiDecimal"), &result);
        assert!(text.contains("            default: throw new ArgumentException(\"no\");\n"));
    }

    #[test]
    fn test_switch_default_from_block_body() {
        let c = compilation(PI);
        assert_eq!(switch_default_expression(&c, method(&c, "BlockFallback")).as_deref(), Some("n + 1"));
    }

    #[test]
    fn test_fluent_default_expression() {
        let c = compilation(
            "using Pregen.Support;
static partial class A
{
    static IMethodImplementationGenerator Cases() =>
        Generate.Method().WithParameter<int>().WithReturnType<int>().WithSwitchBody()
            .ForCases(1, 2).UseBody(k => () => k * 2)
            .ForDefaultCase().RuntimeBody(k => () => k - 1);

    static IMethodImplementationGenerator Single()
    {
        return Generate.Method().WithReturnType<string>().UseBody(() => Environment.Name);
    }

    static IMethodImplementationGenerator NoDefault() =>
        Generate.Method().WithParameter<int>().WithReturnType<int>().WithSwitchBody()
            .ForCases(1).UseBody(k => () => k);
}",
        );
        assert_eq!(fluent_default_expression(&c, method(&c, "Cases")).as_deref(), Some("k - 1"));
        assert_eq!(fluent_default_expression(&c, method(&c, "Single")).as_deref(), Some("Environment.Name"));
        assert_eq!(fluent_default_expression(&c, method(&c, "NoDefault")), None);
    }
}
