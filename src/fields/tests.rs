use std::cell::RefCell;
use std::rc::Rc;

use chrono::NaiveDate;
use rstest::rstest;

use super::*;
use crate::tree::Tree;

const HTML: &str = r#"
<html>
<body>
    <p class="intro">Hello ,   <b>big</b>
     world !</p>
    <span class="word">abc</span>
    <span class="count">#42</span>
    <span class="day">01/03/2024</span>
    <time datetime="2024-03-01T10:30:00">March 1st</time>
    <a class="rel" href="/docs/x">Docs</a>
    <img src="/i.png">
    <span class="link">  https://e.example/a  </span>
    <ol>
        <li>1</li>
        <li>2</li>
        <li>3</li>
        <li>4</li>
    </ol>
    <div class="product" data-id="p1">
        <span class="name">Widget</span>
        <span class="price">9.50</span>
    </div>
    <div class="product" data-id="p2">
        <span class="name">Gadget</span>
        <span class="price">12</span>
    </div>
    <ul class="kv">
        <li data-k="a">1</li>
        <li data-k="b">2</li>
        <li data-k="a">3</li>
    </ul>
</body>
</html>
"#;

fn parse<'t>(field: &mut Field<'t>, tree: &'t Tree) -> Result<Value<'t>> {
    field.parse_root(tree).cloned()
}

fn products<'t>() -> Field<'t> {
    Field::structured_list(
        "div.product",
        [("name", Field::text("span.name")), ("price", Field::float("span.price"))],
    )
}

#[test]
fn test_text_cleans_and_joins() {
    let tree = Tree::parse_document(HTML);

    let mut text = Field::text("p.intro");
    assert_eq!(parse(&mut text, &tree).unwrap(), Value::from("Hello, big world!"));

    let mut piped = Field::text("p.intro").separator("|");
    assert_eq!(parse(&mut piped, &tree).unwrap(), Value::from("Hello,|big|world!"));

    let mut direct = Field::strings("p.intro").recursive(false);
    assert_eq!(
        parse(&mut direct, &tree).unwrap(),
        Value::Strings(vec!["Hello,".into(), "world!".into()])
    );
}

#[test]
fn test_int_over_non_numeric_text() {
    let tree = Tree::parse_document(HTML);

    let err = parse(&mut Field::int("span.word"), &tree).unwrap_err();
    match err {
        Error::Conversion { text, target, .. } => {
            assert_eq!(text, "abc");
            assert_eq!(target, "int");
        }
        other => panic!("unexpected error: {other}"),
    }

    let mut optional = Field::int("span.word").optional(true);
    assert_eq!(parse(&mut optional, &tree).unwrap(), Value::Null);

    let mut defaulted = Field::int("span.word").with_default(7);
    assert_eq!(parse(&mut defaulted, &tree).unwrap(), Value::Int(7));
}

#[test]
fn test_int_over_missing_node() {
    let tree = Tree::parse_document(HTML);

    let err = parse(&mut Field::int("em"), &tree).unwrap_err();
    match err {
        Error::SelectorNotFound { selector, context } => {
            assert_eq!(selector, "em");
            assert_eq!(context, "<document>");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        parse(&mut Field::int("em").optional(true), &tree).unwrap(),
        Value::Null
    );
    assert_eq!(
        parse(&mut Field::int("em").with_default(0), &tree).unwrap(),
        Value::Int(0)
    );
}

#[rstest]
#[case("ol li:first-child", Value::Float(1.0))]
#[case("div.product[data-id=p1] span.price", Value::Float(9.5))]
#[case("div.product[data-id=p2] span.price", Value::Float(12.0))]
fn test_float(#[case] selector: &str, #[case] expected: Value<'static>) {
    let tree = Tree::parse_document(HTML);
    let mut field = Field::float(selector);
    let value = parse(&mut field, &tree).unwrap();
    assert_eq!(value.as_float(), expected.as_float());
    assert_eq!(value, expected);
}

#[rstest]
#[case(Field::date("span.day").format("%d/%m/%Y"), "2024-03-01")]
#[case(Field::date(Origin::literal("2024-03-01")), "2024-03-01")]
#[case(Field::datetime("time @datetime"), "2024-03-01T10:30:00")]
#[case(Field::datetime(Origin::literal("2024-03-01 10:30:00")), "2024-03-01T10:30:00")]
#[case(Field::datetime(Origin::literal("2024-03-01T10:30:00+02:00")), "2024-03-01T10:30:00")]
fn test_dates(#[case] field: Field<'static>, #[case] expected: &str) {
    let mut field = field;
    let tree = Tree::parse_document(HTML);
    let value = parse(&mut field, &tree).unwrap();
    assert_eq!(value.to_json(), serde_json::json!(expected));
}

#[test]
fn test_date_values() {
    let tree = Tree::parse_document(HTML);

    let day = parse(&mut Field::date("span.day").format("%d/%m/%Y"), &tree).unwrap();
    assert_eq!(day.as_date(), NaiveDate::from_ymd_opt(2024, 3, 1));
    assert_eq!(day.as_datetime(), None);

    let stamp = parse(&mut Field::datetime("time @datetime"), &tree).unwrap();
    let expected = NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_opt(10, 30, 0));
    assert_eq!(stamp.as_datetime(), expected);
}

#[test]
fn test_bad_date_is_conversion_error() {
    let tree = Tree::parse_document(HTML);
    let err = parse(&mut Field::date("span.day"), &tree).unwrap_err();
    assert!(matches!(err, Error::Conversion { ref target, .. } if target == "date"));
}

#[test]
fn test_url_sources() {
    let tree = Tree::parse_document(HTML);

    assert_eq!(parse(&mut Field::url("a.rel"), &tree).unwrap(), Value::from("/docs/x"));
    assert_eq!(parse(&mut Field::url("img"), &tree).unwrap(), Value::from("/i.png"));
    assert_eq!(
        parse(&mut Field::url("span.link"), &tree).unwrap(),
        Value::from("https://e.example/a")
    );

    let base = Url::parse("https://example.com/guide/").unwrap();
    let mut absolute = Field::url("a.rel").base_url(base);
    assert_eq!(
        parse(&mut absolute, &tree).unwrap(),
        Value::from("https://example.com/docs/x")
    );

    assert_eq!(
        parse(&mut Field::url("a.missing").optional(true), &tree).unwrap(),
        Value::Null
    );
}

#[test]
fn test_elements_and_element() {
    let tree = Tree::parse_document(HTML);

    let items = parse(&mut Field::elements("ol li"), &tree).unwrap();
    match items {
        Value::Nodes(nodes) => assert_eq!(nodes.len(), 4),
        other => panic!("unexpected value: {other:?}"),
    }

    let link = parse(&mut Field::element("a.rel"), &tree).unwrap();
    assert_eq!(link.as_element().unwrap().value().name(), "a");

    let err = parse(&mut Field::elements(Origin::literal(Value::Null)), &tree).unwrap_err();
    match err {
        Error::SelectorNotFound { selector, .. } => assert_eq!(selector, "<literal>"),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        parse(&mut Field::elements("table").optional(true), &tree).unwrap(),
        Value::Nodes(vec![])
    );
    assert!(matches!(
        parse(&mut Field::elements("table"), &tree),
        Err(Error::SelectorNotFound { .. })
    ));
}

#[test]
fn test_element_narrows_to_first_element() {
    let tree = Tree::parse_document(HTML);
    let link = tree.select(None, "a.rel").unwrap().remove(0);
    let mixed = Value::Nodes(vec![Node::Text("loose".into()), link]);

    let value = parse(&mut Field::element(Origin::literal(mixed)), &tree).unwrap();
    assert_eq!(value.as_element().unwrap().value().attr("class"), Some("rel"));

    // attribute selections have no element to narrow to
    let ids = parse(&mut Field::element("div.product @data-id"), &tree).unwrap();
    match ids {
        Value::Nodes(nodes) => {
            assert!(nodes.iter().all(|node| !node.is_element()));
            assert_eq!(nodes.iter().map(Node::text).collect::<Vec<_>>(), vec!["p1", "p2"]);
        }
        other => panic!("unexpected value: {other:?}"),
    }

    let mut empty = Field::element(Origin::literal(Value::Nodes(vec![])));
    assert!(matches!(parse(&mut empty, &tree), Err(Error::Missing { .. })));
    let mut optional = Field::element(Origin::literal(Value::Nodes(vec![]))).optional(true);
    assert_eq!(parse(&mut optional, &tree).unwrap(), Value::Null);
}

#[test]
fn test_text_over_chained_nodes_uses_separator() {
    let tree = Tree::parse_document(HTML);

    let mut spaced = Field::text(Field::elements("ol li"));
    assert_eq!(parse(&mut spaced, &tree).unwrap(), Value::from("1 2 3 4"));

    let mut dashed = Field::text(Field::elements("ol li")).separator("-");
    assert_eq!(parse(&mut dashed, &tree).unwrap(), Value::from("1-2-3-4"));

    let mut single = Field::text(Field::element("p.intro")).separator("|");
    assert_eq!(parse(&mut single, &tree).unwrap(), Value::from("Hello,|big|world!"));
}

#[test]
fn test_hooks_run_in_order() {
    let tree = Tree::parse_document(HTML);
    let calls = Rc::new(RefCell::new(Vec::new()));

    let (pre, post_a, post_b) = (calls.clone(), calls.clone(), calls.clone());
    let mut field = Field::text("ol li")
        .pre_hook(move |value, _ctx| {
            pre.borrow_mut().push("pre");
            match value {
                Value::Strings(mut strings) => {
                    strings.reverse();
                    Ok(Value::Strings(strings))
                }
                other => Ok(other),
            }
        })
        .post_hook(move |value, _ctx| {
            post_a.borrow_mut().push("post a");
            Ok(Value::Text(format!("[{}]", value.to_text())))
        })
        .post_hook(move |value, _ctx| {
            post_b.borrow_mut().push("post b");
            Ok(Value::Text(value.to_text().replace(' ', ",")))
        });

    assert_eq!(parse(&mut field, &tree).unwrap(), Value::from("[4,3,2,1]"));
    assert_eq!(*calls.borrow(), vec!["pre", "post a", "post b"]);
}

#[test]
fn test_literal_with_hooks() {
    let tree = Tree::parse_document(HTML);
    let mut field = Field::literal(21).post_hook(|value, _ctx| {
        let n = value.as_int().ok_or_else(|| Error::hook("not a number"))?;
        Ok(Value::Int(n * 2))
    });
    assert_eq!(parse(&mut field, &tree).unwrap(), Value::Int(42));
}

#[test]
fn test_error_hooks_first_success_wins() {
    let tree = Tree::parse_document(HTML);
    let seen = Rc::new(RefCell::new(Vec::new()));

    let (declined, recovered) = (seen.clone(), seen.clone());
    let mut field = Field::int("span.word")
        .error_hook(move |_error, _value, _ctx| {
            declined.borrow_mut().push("first");
            Err(Error::hook("not mine"))
        })
        .error_hook(move |error, value, _ctx| {
            recovered.borrow_mut().push("second");
            assert!(matches!(error, Error::Conversion { .. }));
            Ok(Value::Int(value.to_text().len() as i64))
        })
        .error_hook(|_error, _value, _ctx| Ok(Value::Int(-1)));

    assert_eq!(parse(&mut field, &tree).unwrap(), Value::Int(3));
    assert_eq!(*seen.borrow(), vec!["first", "second"]);
}

#[test]
fn test_error_hooks_all_fail() {
    let tree = Tree::parse_document(HTML);
    let mut field = Field::int("span.word").error_hook(|_error, _value, _ctx| Err(Error::hook("no")));
    assert!(matches!(
        parse(&mut field, &tree),
        Err(Error::Conversion { .. })
    ));
}

#[test]
fn test_chained_source() {
    let tree = Tree::parse_document(HTML);
    let count = Field::text("span.count")
        .post_hook(|value, _ctx| Ok(Value::Text(value.to_text().trim_start_matches('#').to_string())));
    let mut field = Field::int(count);
    assert_eq!(parse(&mut field, &tree).unwrap(), Value::Int(42));
    assert_eq!(field.selector(), Some("span.count"));

    // options stop at explicitly supplied sources
    let mut strict = Field::int(Field::text("em")).optional(true);
    assert!(strict.source().is_some_and(|source| !source.is_optional()));
    assert!(matches!(
        parse(&mut strict, &tree),
        Err(Error::SelectorNotFound { .. })
    ));
}

#[test]
fn test_options_propagate_down_default_chain() {
    let field = Field::int("em").optional(true);
    let text = field.source().unwrap();
    let strings = text.source().unwrap();
    let elements = strings.source().unwrap();

    assert_eq!(text.kind(), FieldKind::Text);
    assert_eq!(strings.kind(), FieldKind::Strings);
    assert_eq!(elements.kind(), FieldKind::Elements);
    assert!(text.is_optional() && strings.is_optional() && elements.is_optional());
    assert_eq!(field.selector(), Some("em"));
}

#[test]
fn test_structured_matches_standalone_parse() {
    let tree = Tree::parse_document(HTML);
    let mut product = Field::structured(
        "div.product",
        [("name", Field::text("span.name")), ("price", Field::float("span.price"))],
    );
    let value = parse(&mut product, &tree).unwrap();

    let node = tree.select(None, "div.product").unwrap().remove(0);
    let mut name = Field::text("span.name");
    let standalone = name.parse(&tree, Some(&node), DocumentView::default()).unwrap();

    assert_eq!(value.as_map().unwrap()["name"], *standalone);
    assert_eq!(product.get("name").unwrap(), standalone);
    assert_eq!(product.get("price").unwrap(), &Value::Float(9.5));
}

#[test]
fn test_structured_child_failure_is_wrapped() {
    let tree = Tree::parse_document(HTML);
    let mut product = Field::structured("div.product", [("sku", Field::text("span.sku"))]);

    let err = parse(&mut product, &tree).unwrap_err();
    match &err {
        Error::Child { position, selector, .. } => {
            assert_eq!(position, &Position::Name("sku".into()));
            assert_eq!(selector, "div.product");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(err.root_cause(), Error::SelectorNotFound { .. }));
}

#[test]
fn test_parent_error_hook_recovers_child_failure() {
    let tree = Tree::parse_document(HTML);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let messages = seen.clone();

    let mut product = Field::structured("div.product", [("sku", Field::text("span.sku"))])
        .error_hook(move |error, _value, _ctx| {
            assert!(matches!(error, Error::Child { .. }));
            messages.borrow_mut().push(error.to_string());
            Ok(Value::from("recovered"))
        });

    assert_eq!(parse(&mut product, &tree).unwrap(), Value::from("recovered"));
    let messages = seen.borrow();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("failed to parse \"sku\""));
}

#[test]
fn test_optional_absence_skips_error_hooks() {
    let tree = Tree::parse_document(HTML);
    let calls = Rc::new(RefCell::new(0));
    let counter = calls.clone();

    let mut field = Field::elements("table")
        .optional(true)
        .error_hook(move |_error, _value, _ctx| {
            *counter.borrow_mut() += 1;
            Ok(Value::from("unused"))
        });

    assert_eq!(parse(&mut field, &tree).unwrap(), Value::Nodes(vec![]));
    assert_eq!(*calls.borrow(), 0);
}

#[test]
fn test_structured_hooks_see_context_node() {
    let tree = Tree::parse_document(HTML);
    let ids = Rc::new(RefCell::new(Vec::new()));
    let seen = ids.clone();

    let name = Field::text("span.name").post_hook(move |value, ctx| {
        let id = ctx
            .node
            .and_then(Node::as_element)
            .and_then(|element| element.value().attr("data-id"))
            .unwrap_or_default();
        seen.borrow_mut().push(id.to_string());
        Ok(value)
    });
    let mut list = Field::structured_list("div.product", [("name", name)]);
    parse(&mut list, &tree).unwrap();

    assert_eq!(*ids.borrow(), vec!["p1", "p2"]);
}

#[test]
fn test_list_of_optional_ints() {
    let tree = Tree::parse_fragment("<ul><li>1</li><li>2</li><li>x</li></ul>");
    let mut list = Field::list("li", Field::int(".").optional(true));
    assert_eq!(
        parse(&mut list, &tree).unwrap(),
        Value::List(vec![Value::Int(1), Value::Int(2), Value::Null])
    );

    let mut strict = Field::list("li", Field::int("."));
    let err = parse(&mut strict, &tree).unwrap_err();
    assert!(matches!(
        err,
        Error::Child {
            position: Position::Index(2),
            ..
        }
    ));
}

#[test]
fn test_maps_run_before_filters() {
    let tree = Tree::parse_document(HTML);
    let filtered = Rc::new(RefCell::new(Vec::new()));
    let seen = filtered.clone();

    let mut list = Field::list("ol li", Field::int("."))
        .map(|value, _item| Ok(Value::Int(value.as_int().unwrap_or_default() + 10)))
        .and_then(|list| list.map(|value, _item| Ok(Value::Int(value.as_int().unwrap_or_default() * 2))))
        .and_then(|list| {
            list.filter(move |value, _item| {
                let n = value.as_int().unwrap_or_default();
                seen.borrow_mut().push(n);
                n > 25
            })
        })
        .unwrap();

    assert_eq!(
        parse(&mut list, &tree).unwrap(),
        Value::List(vec![Value::Int(26), Value::Int(28)])
    );
    assert_eq!(*filtered.borrow(), vec![22, 24, 26, 28]);
    assert_eq!(list.len(), 2);
    assert_eq!(list.field(0usize).unwrap().value(), &Value::Int(26));
}

#[test]
fn test_filters_short_circuit() {
    let tree = Tree::parse_document(HTML);
    let calls = Rc::new(RefCell::new(0));
    let counter = calls.clone();

    let mut list = Field::list("ol li", Field::int("."));
    list.add_filter(|value, _item| value.as_int().unwrap_or_default() % 2 == 0)
        .unwrap()
        .add_filter(move |_value, _item| {
            *counter.borrow_mut() += 1;
            true
        })
        .unwrap();

    assert_eq!(
        parse(&mut list, &tree).unwrap(),
        Value::List(vec![Value::Int(2), Value::Int(4)])
    );
    assert_eq!(*calls.borrow(), 2);
}

#[test]
fn test_map_and_filter_need_collections() {
    let result = Field::text("p").map(|value, _item| Ok(value));
    assert!(matches!(result, Err(Error::Config(_))));
    assert!(Field::text("p").filter(|_value, _item| true).is_err());
}

#[test]
fn test_dict_last_write_wins() {
    let tree = Tree::parse_document(HTML);
    let mut dict = Field::dict("ul.kv li", Field::text("@data-k"), Field::int("."));

    let value = parse(&mut dict, &tree).unwrap();
    let map = value.as_map().unwrap();
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    assert_eq!(map["a"], Value::Int(3));
    assert_eq!(map["b"], Value::Int(2));
    assert_eq!(dict.len(), 2);
}

#[test]
fn test_dict_key_path_and_map_sees_key() {
    let tree = Tree::parse_document(HTML);
    let mut dict = Field::structured_dict(
        "div.product",
        "name",
        [("name", Field::text("span.name")), ("price", Field::float("span.price"))],
    )
    .map(|value, item| {
        let mut map = value.as_map().cloned().unwrap_or_default();
        map.insert("key".into(), Value::from(item.key.unwrap_or_default()));
        Ok(Value::Map(map))
    })
    .unwrap();

    parse(&mut dict, &tree).unwrap();
    assert_eq!(dict.get("Gadget").unwrap().as_map().unwrap()["price"], Value::Float(12.0));
    assert_eq!(dict.get("Widget").unwrap().as_map().unwrap()["key"], Value::from("Widget"));
    assert_eq!(dict.field("Widget").unwrap().get("price").unwrap(), &Value::Float(9.5));
}

#[test]
fn test_dict_rejects_unusable_keys() {
    let tree = Tree::parse_document(HTML);
    let mut dict = Field::dict("ul.kv li", Field::element("."), Field::int("."));
    assert!(matches!(
        parse(&mut dict, &tree),
        Err(Error::InvalidKey { .. })
    ));
}

#[test]
fn test_access_axes() {
    let tree = Tree::parse_document(HTML);
    let mut list = products();
    parse(&mut list, &tree).unwrap();

    // value axis
    let second = list.get(1usize).unwrap().as_map().unwrap();
    assert_eq!(second["name"], Value::from("Gadget"));

    // field axis, numeric names included
    let first = list.field("0").unwrap();
    assert_eq!(first.kind(), FieldKind::Structured);
    assert_eq!(first.field("price").unwrap().value(), &Value::Float(9.5));
    assert!(matches!(first.field("sku"), Err(Error::NoSuchKey { .. })));
    assert!(matches!(list.field(5usize), Err(Error::NoSuchIndex { .. })));

    // definition axis returns the template, never parsed
    let template = list.definition("price").unwrap();
    assert!(template.value().is_null());
    assert!(matches!(
        list.definition("sku"),
        Err(Error::NoSuchSubfield { .. })
    ));

    let scalar = first.field("name").unwrap();
    assert!(matches!(scalar.field("x"), Err(Error::NotAContainer { .. })));
    assert!(scalar.is_empty());
}

#[test]
fn test_definition_hooks_apply_to_every_item() {
    let tree = Tree::parse_document(HTML);
    let mut list = products();
    list.definition_mut("name")
        .unwrap()
        .add_post_hook(|value, _ctx| Ok(Value::Text(value.to_text().to_uppercase())));

    let value = parse(&mut list, &tree).unwrap();
    let names: Vec<_> = value
        .as_list()
        .unwrap()
        .iter()
        .map(|item| item.as_map().unwrap()["name"].clone())
        .collect();
    assert_eq!(names, vec![Value::from("WIDGET"), Value::from("GADGET")]);
}

#[test]
fn test_field_mut_writes_child() {
    let tree = Tree::parse_document(HTML);
    let mut list = products();
    parse(&mut list, &tree).unwrap();

    list.field_mut(0usize)
        .unwrap()
        .field_mut("price")
        .unwrap()
        .set_value(10.0);
    assert_eq!(
        list.field(0usize).unwrap().get("price").unwrap(),
        &Value::Float(10.0)
    );
}

#[test]
fn test_parse_twice_replaces_children() {
    let tree = Tree::parse_document(HTML);
    let mut list = products();

    let first = parse(&mut list, &tree).unwrap();
    let second = parse(&mut list, &tree).unwrap();
    assert_eq!(first, second);
    assert_eq!(list.len(), 2);
}

#[test]
fn test_auto_parse_and_order_accessors() {
    let field = Field::text("h1").auto_parse(false);
    assert!(!field.is_auto_parse());
    assert_eq!(field.declaration_order(), None);
    assert_eq!(field.kind().to_string(), "text");
    assert!(field.hooks().is_empty());
    assert!(field.item().is_none() && field.dict_key().is_none());

    let defaulted = Field::int("em").with_default(3);
    assert_eq!(defaulted.default_value(), Some(&Value::Int(3)));
    assert_eq!(Field::int("em").default_value(), None);
}

#[test]
fn test_item_and_key_accessors() {
    let dict = Field::dict("ul.kv li", Field::text("@data-k"), Field::int("."));
    assert_eq!(dict.item().map(Field::kind), Some(FieldKind::Int));
    match dict.dict_key() {
        Some(DictKey::Field(key)) => assert_eq!(key.selector(), Some("@data-k")),
        other => panic!("unexpected key: {other:?}"),
    }

    let by_name = Field::structured_dict("div.product", "name", [("name", Field::text("span.name"))]);
    assert!(matches!(by_name.dict_key(), Some(DictKey::Path(path)) if path == "name"));
    assert_eq!(by_name.item().map(Field::kind), Some(FieldKind::Structured));
    assert_eq!(products().item().map(Field::kind), Some(FieldKind::Structured));
}
