use serde_json::json;

use super::{check, check_with};

#[test]
fn arithmetic() {
    check("POW(input, 2)", json!(3), json!(9));
    check("POWER(2, 10)", json!(null), json!(1024));
    check("MAX(input, 2)", json!(0), json!(2));
    check("MIN(input, 2)", json!([5, -1]), json!(-1));
    check("SUM(1, [2, 3], \"x\")", json!(null), json!(6));
    check("AVERAGE(1, 2, 3)", json!(null), json!(2));
    check("MEDIAN(3, 1, 2, 4)", json!(null), json!(2.5));
    check("ROUND(2.5)", json!(null), json!(3));
    check("ROUND(1.2345, 1)", json!(null), json!(1.2));
    check("MOD(-3, 2)", json!(null), json!(1));
    check("FLOOR(7, 5)", json!(null), json!(5));
    check("CEILING(7, 5)", json!(null), json!(10));
    check("SQRT(-1)", json!(null), json!(null));
    check("COUNT(1, \"a\", [2, null])", json!(null), json!(2));
    check("COUNTA(1, \"a\", [2, null])", json!(null), json!(3));
}

#[test]
fn logic() {
    check("IF(input > 1, \"big\", \"small\")", json!(3), json!("big"));
    check("IF(input > 1, \"big\")", json!(0), json!(null));
    check("AND(true, 1, \"x\")", json!(null), json!(true));
    check("OR(false, 0)", json!(null), json!(false));
    check("XOR(true, true, true)", json!(null), json!(true));
    check("NOT(input)", json!(""), json!(true));
}

#[test]
fn text() {
    check("UPPER(input)", json!("abc"), json!("ABC"));
    check("TRIM(\"  a   b \")", json!(null), json!("a b"));
    check("LEN(input)", json!("héllo"), json!(5));
    check("CONCATENATE(\"a\", 1, true)", json!(null), json!("a1true"));
    check("LEFT(\"hello\", 2)", json!(null), json!("he"));
    check("RIGHT(\"hello\", 3)", json!(null), json!("llo"));
    check("SPLIT(\"a,b\", \",\")", json!(null), json!(["a", "b"]));
    check("JOIN([\"a\", null, \"b\"], \"-\")", json!(null), json!("a--b"));
}

#[test]
fn regex_match() {
    check(
        "REGEX_MATCH(/(@[a-zA-Z0-9-]+)/g, input)",
        json!("Hello @johndoe and @janedoe"),
        json!(["@johndoe", "@janedoe"]),
    );
    check(
        "REGEX_MATCH(/(\\d+)-(\\d+)/, input)",
        json!("from 10-20"),
        json!(["10-20", "10", "20"]),
    );
    check("REGEX_MATCH(/x/g, input)", json!("abc"), json!(null));
    check("REGEX_MATCH(/ABC/i, input)", json!("xabcx"), json!(["abc"]));
}

#[test]
fn property_paths() {
    let doc = json!({ "a": { "b": [5], "c d": 1 } });
    check("PROPERTY(input, \"a.b[0]\")", doc.clone(), json!(5));
    check("PROPERTY(input, [\"a\", \"b\", \"length\"])", doc.clone(), json!(1));
    check("PROPERTY(input, \"a['c d']\")", doc.clone(), json!(1));
    check("PROPERTY(input, \"x.y\", 7)", doc.clone(), json!(7));
    check("GET_PROPERTY(input, \"a.b\")", doc, json!([5]));
}

#[test]
fn partial_application() {
    check(
        "MAP(input, PARTIAL(FLIP(PROPERTY), \"id\"))",
        json!([{ "id": 1 }, { "id": 2 }]),
        json!([1, 2]),
    );
    check("MAP(input, PARTIAL_RIGHT(POW, 2))", json!([1, 2, 3]), json!([1, 4, 9]));
    check("PARTIAL(ADD, 1)(2)", json!(null), json!(3));
    check("FLIP(MINUS)(1, 10)", json!(null), json!(9));
}

#[test]
fn collections() {
    check(
        "UNIQUE(FLATMAP(input, \"mentions\"))",
        json!([{ "mentions": ["foo", "bar"] }, { "mentions": ["bar"] }]),
        json!(["foo", "bar"]),
    );
    check("UNIQUE(input)", json!([1, "1", 1, { "a": 1 }, { "a": 1 }]), json!([1, "1", { "a": 1 }]));
    check("VALUES(input)", json!({ "a": 1, "b": 2 }), json!([1, 2]));
    check("KEYS(input)", json!({ "a": 1, "b": 2 }), json!(["a", "b"]));
    check("SIZE(input)", json!({ "a": 1 }), json!(1));
    check("FIRST(input)", json!([3, 4]), json!(3));
    check("LAST(input)", json!([]), json!(null));
    check("FIND(input, x => x > 1)", json!([1, 2, 3]), json!(2));
    check("REJECT(input, \"done\")", json!([{ "done": true }, { "done": false }]), json!([{ "done": false }]));
}

#[test]
fn every_and_some() {
    let links = json!({
        "links": {
            "has attached": [
                { "type": "improvement@1.0.0", "data": { "status": "completed" } },
                { "type": "improvement@1.0.0", "data": { "status": "completed" } },
                { "type": "pull-request@1.0.0", "data": { "status": "open" } },
            ]
        }
    });
    check_with(
        "EVERY(FILTER(contract.links[\"has attached\"], { type: \"improvement@1.0.0\" }), { data: { status: \"completed\" } })",
        links.clone(),
        json!(4),
        json!(true),
    );
    check_with(
        "EVERY(contract.links[\"has attached\"], [\"data.status\", \"completed\"])",
        links.clone(),
        json!(null),
        json!(false),
    );
    check_with(
        "SOME(contract.links[\"has attached\"], [\"data.status\", \"open\"])",
        links,
        json!(null),
        json!(true),
    );
    check("EVERY(input, \"ok\")", json!([]), json!(true));
    check("SOME(input, \"ok\")", json!([]), json!(false));
}

#[test]
fn ordering_and_grouping() {
    check(
        "MAP(ORDER_BY(input, \"n\", \"desc\"), \"n\")",
        json!([{ "n": 1 }, { "n": 3 }, { "n": 2 }]),
        json!([3, 2, 1]),
    );
    check(
        "MAP(ORDER_BY(input, \"n\"), \"id\")",
        json!([{ "id": "a" }, { "id": "b", "n": 2 }, { "id": "c", "n": 1 }]),
        json!(["c", "b", "a"]),
    );
    check(
        "MAP(ORDER_BY(input, [\"g\", \"n\"], [\"asc\", \"desc\"]), \"id\")",
        json!([
            { "id": 1, "g": "b", "n": 1 },
            { "id": 2, "g": "a", "n": 1 },
            { "id": 3, "g": "a", "n": 2 },
        ]),
        json!([3, 2, 1]),
    );
    check(
        "GROUP_BY(input, \"t\")",
        json!([{ "t": "a", "n": 1 }, { "t": "b", "n": 2 }, { "t": "a", "n": 3 }]),
        json!({
            "a": [{ "t": "a", "n": 1 }, { "t": "a", "n": 3 }],
            "b": [{ "t": "b", "n": 2 }],
        }),
    );
}

#[test]
fn last_message() {
    let formula = r#"
        PROPERTY(contract, [ "links", "has attached element", "length" ])
        ? LAST(
            ORDER_BY(
                FILTER(
                    contract.links["has attached element"],
                    function (c) { return c && (c.type === "message@1.0.0" || c.type === "whisper@1.0.0"); }
                ),
                "data.timestamp"
            )
        )
        : null
    "#;
    let doc = json!({
        "links": {
            "has attached element": [
                { "type": "message@1.0.0", "data": { "timestamp": "2020-01-01T00:00:01.000Z" } },
                { "type": "whisper@1.0.0", "data": { "timestamp": "2020-01-01T00:00:03.000Z" } },
                { "type": "message@1.0.0", "data": { "timestamp": "2020-01-01T00:00:02.000Z" } },
                { "type": "update@1.0.0", "data": { "timestamp": "2020-01-01T00:00:04.000Z" } },
            ]
        }
    });
    check_with(
        formula,
        doc,
        json!(null),
        json!({ "type": "whisper@1.0.0", "data": { "timestamp": "2020-01-01T00:00:03.000Z" } }),
    );

    let quiet = json!({
        "links": {
            "has attached element": [
                { "type": "create@1.0.0", "data": { "timestamp": "2020-01-01T00:00:01.000Z" } },
            ]
        }
    });
    check_with(formula, quiet, json!(null), json!(null));
}

#[test]
fn date_values() {
    check(
        "DATE_VALUE(input, \"ts\")",
        json!([{ "ts": "1970-01-01T00:00:01Z" }, { "ts": "1970-01-01T01:00:00+01:00" }]),
        json!([1000, 0]),
    );
    check("DATE_VALUE(\"1970-01-02\")", json!(null), json!(86_400_000));
    check("DATE_VALUE(input, \"ts\")", json!([{ "ts": "soon" }]), json!([null]));
}

#[test]
fn aggregate() {
    let mentions = json!([
        { "mentions": ["foo", "bar"] },
        { "mentions": ["bar", "baz"] },
        { "mentions": ["baz", "qux"] },
        {},
    ]);
    check("AGGREGATE(input, \"mentions\")", mentions.clone(), json!(["foo", "bar", "baz", "qux"]));
    check(
        "AGGREGATE(input, PARTIAL_RIGHT(GET_PROPERTY, \"mentions\"))",
        mentions.clone(),
        json!(["foo", "bar", "baz", "qux"]),
    );
    check(
        "AGGREGATE(input, PARTIAL(FLIP(PROPERTY), \"mentions\"))",
        mentions.clone(),
        json!(["foo", "bar", "baz", "qux"]),
    );
    check("AGGREGATE(input, \"mentions\", [\"me\", \"foo\"])", mentions, json!(["me", "foo", "bar", "baz", "qux"]));
    check("AGGREGATE(input, \"o\")", json!([{ "o": { "a": 1 } }, { "o": { "a": 1 } }]), json!([{ "a": 1 }]));
    check("AGGREGATE(input, \"m\", \"seed\")", json!([]), json!(["seed"]));
    check("AGGREGATE(input, \"m\")", json!([]), json!(null));
    check("AGGREGATE(input, \"m\", [])", json!([{}]), json!([]));
}

#[test]
fn needs() {
    let doc = json!({
        "data": {
            "$transformer": {
                "backflow": [
                    {
                        "type": "error@1.0.0",
                        "data": { "expectedOutputTypes": ["build@1.0.0"] },
                    },
                    {
                        "type": "image@1.0.0",
                        "data": { "$transformer": { "mergeable": true } },
                    },
                ]
            }
        }
    });
    check_with("NEEDS(contract, \"build\")", doc.clone(), json!(null), json!("never"));
    check_with("NEEDS(contract, \"image@1.0.0\")", doc.clone(), json!(null), json!("mergeable"));
    check_with("NEEDS(contract, \"other\")", doc.clone(), json!(null), json!("pending"));
    check_with(
        "NEEDS(contract, \"image\", { data: { $transformer: { mergeable: false } } })",
        doc.clone(),
        json!(null),
        json!("pending"),
    );
    check_with("NEEDS(contract, \"image\", c => c.type)", doc, json!(null), json!("mergeable"));
    check_with("NEEDS(contract, \"image\")", json!({}), json!(null), json!("pending"));
}

#[test]
fn needs_all() {
    check("NEEDS_ALL(\"mergeable\", \"pending\")", json!(null), json!("pending"));
    check("NEEDS_ALL(\"mergeable\", [\"never\", \"pending\"])", json!(null), json!("never"));
    check("NEEDS_ALL(\"mergeable\")", json!(null), json!("mergeable"));
    check("NEEDS_ALL()", json!(null), json!("mergeable"));
}
