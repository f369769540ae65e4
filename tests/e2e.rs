use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use stencil::{Config, Context, ErrorKind, HostValue, Mapping, TemplateSet, Value};

fn render(src: &str, ctx: &Context) -> stencil::Result<String> {
    stencil::from_string(src)?.execute(ctx)
}

fn json_ctx(v: serde_json::Value) -> Context {
    Context::from_json(v).unwrap()
}

#[test]
fn test_digit_led_identifiers() {
    let ctx = json_ctx(json!({
        "mydict": {"51232_3": "foo"},
        "12345_123": "bar",
        "995189baz": "baz",
    }));
    let out = render("{{ mydict.51232_3 }}{{ 12345_123 }}{{ 995189baz }}", &ctx).unwrap();
    assert_eq!(out, "foobarbaz");
}

#[test]
fn test_wordwrap_filter() {
    let ctx: Context = [("input", "one two three four five six")].into_iter().collect();
    let out = render("Testing: {{ input|wordwrap:4 }}!", &ctx).unwrap();
    assert_eq!(out, "Testing: one two three four\nfive six!");
}

#[test]
fn test_autoescape_once() {
    let ctx: Context = [("html", "<b>&</b>")].into_iter().collect();
    assert_eq!(render("{{ html }}", &ctx).unwrap(), "&lt;b&gt;&amp;&lt;/b&gt;");
    assert_eq!(render("{{ html|safe }}", &ctx).unwrap(), "<b>&</b>");
    // escape marks its output trusted, so nothing is escaped twice.
    assert_eq!(render("{{ html|escape }}", &ctx).unwrap(), "&lt;b&gt;&amp;&lt;/b&gt;");
    assert_eq!(render("{{ html|e|upper }}", &ctx).unwrap(), "&LT;B&GT;&AMP;&LT;/B&GT;");
}

#[test]
fn test_safe_step_anywhere_in_chain_suppresses_escaping() {
    let ctx: Context = [("html", "<i>")].into_iter().collect();
    assert_eq!(render("{{ html|safe|upper }}", &ctx).unwrap(), "<I>");
}

#[test]
fn test_autoescape_disabled_by_config() {
    let config = Config {
        autoescape: false,
        ..Config::default()
    };
    let set = Arc::new(TemplateSet::new("raw", config).unwrap());
    let ctx: Context = [("html", "<i>")].into_iter().collect();
    let out = set.from_string("{{ html }}").unwrap().execute(&ctx).unwrap();
    assert_eq!(out, "<i>");
}

#[test]
fn test_non_strings_are_not_escaped() {
    let ctx = Context::new();
    ctx.set("n", 5);
    ctx.set("items", vec!["<a>", "b"]);
    // Lists are not strings: their text is written as is.
    assert_eq!(render("{{ n }} {{ items }}", &ctx).unwrap(), "5 <a>, b");
}

#[test]
fn test_trust_preserved_through_mapping() {
    let mapping: Mapping = [("b", Value::safe("<i>x</i>"))].into_iter().collect();
    let ctx: Context = [("a", mapping)].into_iter().collect();
    assert_eq!(render("{{ a.b }}", &ctx).unwrap(), "<i>x</i>");
}

#[test]
fn test_missing_value_policy() {
    let ctx = json_ctx(json!({"a": {"c": 1}}));
    let err = render("{{ a.b }}", &ctx).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::NoValueFound { ref path } if path == "a.b"));
    assert!(err.to_string().contains("Line 1 Col 4 near 'a'"));

    let config = Config {
        allow_missing_values: true,
        ..Config::default()
    };
    let set = Arc::new(TemplateSet::new("lenient", config).unwrap());
    let out = set.from_string("[{{ a.b }}{{ nope.x }}]").unwrap().execute(&ctx).unwrap();
    assert_eq!(out, "[]");
}

#[test]
fn test_present_nil_is_not_missing() {
    let ctx = json_ctx(json!({"a": {"b": null}}));
    assert_eq!(render("[{{ a.b }}][{{ nil }}][{{ a.nil }}]", &ctx).unwrap(), "[][][]");
}

#[test]
fn test_indexing() {
    let ctx = json_ctx(json!({"list": [1, 2, 3], "name": "héllo"}));
    assert_eq!(render("{{ list.1 }}{{ list[2] }}", &ctx).unwrap(), "23");
    assert_eq!(render("[{{ list.999 }}][{{ list[999] }}]", &ctx).unwrap(), "[][]");
    assert_eq!(render("{{ name.1 }}", &ctx).unwrap(), "é");
}

#[test]
fn test_literals_and_arrays() {
    let ctx: Context = [("x", "X")].into_iter().collect();
    assert_eq!(
        render("{{ 1.5 }} {{ -3 }} {{ true }} {{ 'q' }}", &ctx).unwrap(),
        "1.5 -3 True q"
    );
    assert_eq!(render("{{ [1, 'a', x]|join:'-' }}", &ctx).unwrap(), "1-a-X");
    assert_eq!(render("{{ [1, 2, 3]|length }}", &ctx).unwrap(), "3");
}

#[test]
fn test_filter_chain_with_variable_param() {
    let ctx = json_ctx(json!({"fallback": "n/a", "empty": ""}));
    assert_eq!(render("{{ empty|default:fallback|upper }}", &ctx).unwrap(), "N/A");
}

#[test]
fn test_whitespace_trimming() {
    let ctx = Context::new();
    assert_eq!(render("a  {{- 1 -}}  b", &ctx).unwrap(), "a1b");
    assert_eq!(render("x \n{%- comment %} gone {% endcomment -%}\n y", &ctx).unwrap(), "xy");
}

#[test]
fn test_output_before_failure_stays_written() {
    let tpl = stencil::from_string("before{{ missing }}after").unwrap();
    let mut out = String::new();
    assert!(tpl.execute_writer(&Context::new(), &mut out).is_err());
    assert_eq!(out, "before");
}

#[test]
fn test_templates_render_concurrently() {
    let set = Arc::new(TemplateSet::default());
    let tpl = Arc::new(set.from_string("{{ who }}!").unwrap());
    let shared: Arc<Context> = Arc::new([("who", "all")].into_iter().collect());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tpl = Arc::clone(&tpl);
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || tpl.execute(&shared).unwrap())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), "all!");
    }
}

#[test]
fn test_engine_metadata_in_private_scope() {
    let out = render("{{ stencil.version }}", &Context::new()).unwrap();
    assert_eq!(out, env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_host_values_from_json() {
    let v: HostValue = json!({"k": [true, 1.25, null]}).into();
    let ctx: Context = [("v", v)].into_iter().collect();
    assert_eq!(render("{{ v.k }}", &ctx).unwrap(), "True, 1.25, ");
}

#[test]
fn test_referenced_strings_are_escaped() {
    let ctx = Context::new();
    ctx.set("r", HostValue::reference(Some("<script>x</script>".into())));
    ctx.set("p", "<script>x</script>");
    assert_eq!(
        render("{{ r }}|{{ p }}", &ctx).unwrap(),
        "&lt;script&gt;x&lt;/script&gt;|&lt;script&gt;x&lt;/script&gt;"
    );
}

#[test]
fn test_value_helpers_look_through_references() {
    let ctx = Context::new();
    ctx.set("r", HostValue::reference(None));
    ctx.set("l", HostValue::reference(Some(vec![1, 2, 3].into())));
    ctx.set("n", HostValue::reference(Some(HostValue::reference(Some(4.into())))));
    assert_eq!(
        render("[{{ r|default_if_none:'x' }}][{{ l|length }}][{{ l|first }}][{{ n|add:1 }}]", &ctx).unwrap(),
        "[x][3][1][5]"
    );
}

#[test]
fn test_boxed_value_behind_reference() {
    let inner: Mapping = [("b", "<in>")].into_iter().collect();
    let ctx = Context::new();
    ctx.set("r", HostValue::reference(Some(Value::safe(inner).into())));
    ctx.set("t", HostValue::reference(Some(Value::safe("<b>").into())));
    ctx.set("u", HostValue::reference(Some(Value::new("<b>").into())));
    // The trust flag of the boxed map carries over to its field.
    assert_eq!(render("{{ r.b }}", &ctx).unwrap(), "<in>");
    assert_eq!(render("{{ t }}|{{ u }}", &ctx).unwrap(), "<b>|&lt;b&gt;");
}
