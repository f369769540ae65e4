use pretty_assertions::assert_eq;
use std::error::Error as _;
use stencil::value::Kind;
use stencil::{
    Context, ErrorKind, Function, HostValue, KeyKind, Mapping, Object, ParamType, Returned,
    Signature, Value,
};

#[derive(Debug)]
struct User {
    name: String,
    tags: Vec<String>,
}

impl Object for User {
    fn type_name(&self) -> &str {
        "User"
    }

    fn field(&self, name: &str) -> Option<HostValue> {
        match name {
            "name" => Some(self.name.clone().into()),
            "tags" => Some(self.tags.clone().into()),
            _ => None,
        }
    }

    fn method(&self, name: &str) -> Option<Function> {
        let owner = self.name.clone();
        match name {
            "greet" => Some(Function::new(
                Signature::new().param(ParamType::Exact(Kind::Str)),
                move |call| Ok(Returned::native(format!("{}, {owner}", call.arg(0)))),
            )),
            "get_attr" => Some(Function::new(
                Signature::new().param(ParamType::Exact(Kind::Str)),
                |call| Ok(Returned::native(format!("attr:{}", call.arg(0)))),
            )),
            _ => None,
        }
    }
}

/// No attribute getter.
#[derive(Debug)]
struct Point;

impl Object for Point {
    fn type_name(&self) -> &str {
        "Point"
    }

    fn field(&self, name: &str) -> Option<HostValue> {
        (name == "x").then(|| 3.into())
    }
}

fn ada() -> HostValue {
    HostValue::object(User {
        name: "Ada".into(),
        tags: vec!["math".into(), "code".into()],
    })
}

fn three_fixed() -> Signature {
    Signature::new()
        .param(ParamType::Exact(Kind::Str))
        .param(ParamType::Exact(Kind::Int))
        .param(ParamType::Exact(Kind::Int))
}

fn count_args() -> impl Fn(stencil::Call<'_>) -> Result<Returned, stencil::errors::BoxError> {
    |call: stencil::Call<'_>| Ok(Returned::native(call.args.len()))
}

fn context() -> Context {
    let ctx = Context::new();
    ctx.set("user", ada());
    ctx.set("point", HostValue::object(Point));
    ctx.set("fixed", Function::new(three_fixed(), count_args()));
    ctx.set("variadic", Function::new(three_fixed().variadic(), count_args()));
    ctx.set(
        "kw",
        Function::new(
            Signature::new().with_kwargs().param(ParamType::Value),
            |call| {
                let sep = call.kwarg("sep").map(Value::to_string).unwrap_or_default();
                Ok(Returned::native(format!("{}{sep}", call.arg(0))))
            },
        ),
    );
    ctx.set(
        "whoami",
        Function::new(Signature::new().with_frame(), |call| {
            let who = call.frame.and_then(|f| f.lookup("who")).unwrap_or_default();
            Ok(Returned::native(who))
        }),
    );
    ctx.set(
        "boom",
        Function::new(Signature::new(), |_| Err("exploded".into())),
    );
    ctx.set(
        "trusted",
        Function::new(Signature::new(), |_| Ok(Value::safe("<b>").into())),
    );
    ctx.set(
        "untrusted",
        Function::new(Signature::new(), |_| Ok(Returned::native("<b>"))),
    );
    ctx.set("who", "me");
    ctx.set("n", 7);
    ctx.set("s", "text");
    ctx
}

fn render(src: &str) -> stencil::Result<String> {
    stencil::from_string(src)?.execute(&context())
}

fn kind_of(src: &str) -> ErrorKind {
    render(src).unwrap_err().kind
}

#[test]
fn test_object_fields_and_methods() {
    assert_eq!(render("{{ user.name }}").unwrap(), "Ada");
    assert_eq!(render("{{ user.tags.1 }}").unwrap(), "code");
    assert_eq!(render("{{ user.greet('Hi') }}").unwrap(), "Hi, Ada");
    assert_eq!(render("{{ point.x }}").unwrap(), "3");
}

#[test]
fn test_attribute_getter_fallback() {
    assert_eq!(render("{{ user.missing }}").unwrap(), "attr:missing");
    assert_eq!(render("{{ user.@color }}").unwrap(), "attr:color");
}

#[test]
fn test_attribute_call_without_getter_is_not_callable() {
    let kind = kind_of("{{ point.@color }}");
    assert!(matches!(kind, ErrorKind::NotCallable { ref path, ref found }
        if path == "point.@color" && found.contains("Point")));
}

#[test]
fn test_missing_field_without_getter() {
    assert!(matches!(kind_of("{{ point.y }}"), ErrorKind::NoValueFound { ref path } if path == "point.y"));
}

#[test]
fn test_arity() {
    assert!(matches!(
        kind_of("{{ fixed('x', 1) }}"),
        ErrorKind::ArityMismatch { expected: 3, given: 2, .. }
    ));
    assert_eq!(render("{{ fixed('x', 1, 2) }}").unwrap(), "3");
    assert_eq!(render("{{ variadic('x', 1) }}").unwrap(), "2");
    assert_eq!(render("{{ variadic('x', 1, 2, 3, 4) }}").unwrap(), "5");
    // Methods referenced without parentheses are still invoked.
    assert!(matches!(kind_of("{{ user.greet }}"), ErrorKind::ArityMismatch { .. }));
}

#[test]
fn test_argument_order_is_checked_first() {
    for src in ["{{ fixed(name=1, 2) }}", "{{ kw(sep=1, 2) }}", "{{ variadic(a=1, 'x') }}"] {
        assert!(
            matches!(kind_of(src), ErrorKind::ArgumentOrderError { .. }),
            "{src}"
        );
    }
}

#[test]
fn test_keyword_arguments() {
    assert_eq!(render("{{ kw(1, sep='-') }}").unwrap(), "1-");
    assert!(matches!(kind_of("{{ fixed('x', 1, z=2) }}"), ErrorKind::TypeMismatch { .. }));
}

#[test]
fn test_argument_types() {
    let kind = kind_of("{{ fixed(1, 2, 3) }}");
    assert!(matches!(kind, ErrorKind::TypeMismatch { ref message, .. }
        if message.contains("argument 0") && message.contains("string")));
    assert!(matches!(kind_of("{{ variadic('x', 1, 'no') }}"), ErrorKind::TypeMismatch { .. }));
}

#[test]
fn test_frame_is_supplied() {
    assert_eq!(render("{{ whoami() }}").unwrap(), "me");
}

#[test]
fn test_host_error_keeps_source() {
    let err = render("{{ boom() }}").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::HostError(_)));
    let source = err.source().and_then(|kind| kind.source()).map(ToString::to_string);
    assert_eq!(source.as_deref(), Some("exploded"));
}

#[test]
fn test_returned_trust_flag() {
    assert_eq!(render("{{ trusted() }}").unwrap(), "<b>");
    assert_eq!(render("{{ untrusted() }}").unwrap(), "&lt;b&gt;");
}

#[test]
fn test_hard_failures_name_type_and_path() {
    let kind = kind_of("{{ n.0 }}");
    assert!(matches!(kind, ErrorKind::TypeMismatch { ref path, ref message }
        if path == "n.0" && message.contains("int")));
    assert!(matches!(kind_of("{{ n.field }}"), ErrorKind::TypeMismatch { .. }));
    assert!(matches!(kind_of("{{ s() }}"), ErrorKind::NotCallable { ref found, .. } if found == "string"));
}

#[test]
fn test_absent_reference_mid_chain_is_nil() {
    let ctx = Context::new();
    ctx.set("r", HostValue::reference(None));
    let some: Mapping = [("b", "inner")].into_iter().collect();
    ctx.set("s", HostValue::reference(Some(some.into())));
    ctx.set("u", HostValue::reference(Some(ada())));

    let tpl = stencil::from_string("[{{ r }}][{{ r.anything.deeper }}][{{ s.b }}][{{ u.greet('Yo') }}]").unwrap();
    assert_eq!(tpl.execute(&ctx).unwrap(), "[][][inner][Yo, Ada]");
}

#[test]
fn test_typed_map_keys() {
    let mut ints = Mapping::new(KeyKind::Int);
    assert!(ints.insert(1i64, "one"));
    assert!(!ints.insert("two", 2));
    let ctx = Context::new();
    ctx.set("m", ints);
    ctx.set("key", 1);

    let tpl = stencil::from_string("{{ m[1] }}|{{ m[key] }}|{{ m['1'] }}|{{ m[9] }}|{{ m[nil] }}").unwrap();
    assert_eq!(tpl.execute(&ctx).unwrap(), "one|one|||");
}
