use super::*;
use crate::error::NodeflowError;
use crate::processing::transforms::*;
use anyhow::Result;

fn people() -> Table {
    table(vec![
        ("name", texts(&["ann", "bob", "cy", "di"])),
        ("dept", texts(&["ops", "dev", "ops", "dev"])),
        ("salary", vec![Value::Int(40_000), Value::Int(55_000), Value::Missing, Value::Int(38_000)]),
    ])
}

fn column(t: &Table, name: &str) -> Vec<Value> {
    t.column(name).expect("column exists").values().to_vec()
}

#[test]
fn test_filter_is_idempotent() -> Result<()> {
    let once = filter(&people(), "salary", CompareOp::Ge, &Value::Int(40_000))?;
    let twice = filter(&once, "salary", CompareOp::Ge, &Value::Int(40_000))?;
    assert_eq!(column(&once, "name"), texts(&["ann", "bob"]));
    assert_eq!(once, twice);
    Ok(())
}

#[test]
fn test_filter_coerces_numeric_text() -> Result<()> {
    let t = table(vec![("age", texts(&["20", "31", "abc"]))]);
    let kept = filter(&t, "age", CompareOp::Gt, &Value::Int(25))?;
    assert_eq!(column(&kept, "age"), ints(&[31]));
    Ok(())
}

#[test]
fn test_filter_not_equal_keeps_missing() -> Result<()> {
    let kept = filter(&people(), "salary", CompareOp::Ne, &Value::Int(40_000))?;
    assert_eq!(column(&kept, "name"), texts(&["bob", "cy", "di"]));
    Ok(())
}

#[test]
fn test_filter_unknown_column() {
    let err = filter(&people(), "age", CompareOp::Gt, &Value::Int(1)).expect_err("no such column");
    assert_eq!(
        err.to_string(),
        "Column 'age' not found. Available columns: [name, dept, salary]"
    );
}

#[test]
fn test_fill_missing_strategies() -> Result<()> {
    let t = table(vec![
        ("n", vec![Value::Int(1), Value::Missing, Value::Int(3)]),
        ("s", vec![Value::Missing, Value::text("x"), Value::Missing]),
    ]);

    let dropped = fill_missing(&t, FillStrategy::Drop, None)?;
    assert_eq!(dropped.height(), 0);

    // the float mean widens the integer column
    let filled = fill_missing(&t, FillStrategy::Fill, None)?;
    assert_eq!(
        column(&filled, "n"),
        vec![Value::Float(1.0), Value::Float(2.0), Value::Float(3.0)]
    );
    assert_eq!(column(&filled, "s"), texts(&["x", "x", "x"]));

    let explicit = fill_missing(&t, FillStrategy::Fill, Some(&Value::Int(0)))?;
    assert_eq!(column(&explicit, "n"), ints(&[1, 0, 3]));
    assert_eq!(column(&explicit, "s"), texts(&["0", "x", "0"]));

    let complete = table(vec![("n", ints(&[1, 2]))]);
    assert_eq!(fill_missing(&complete, FillStrategy::Fill, None)?, complete);

    let forward = fill_missing(&t, FillStrategy::Forward, None)?;
    assert_eq!(column(&forward, "n"), ints(&[1, 1, 3]));
    assert_eq!(column(&forward, "s"), vec![Value::Missing, Value::text("x"), Value::text("x")]);

    let backward = fill_missing(&t, FillStrategy::Backward, None)?;
    assert_eq!(column(&backward, "s"), vec![Value::text("x"), Value::text("x"), Value::Missing]);
    Ok(())
}

#[test]
fn test_remove_duplicates_with_subset() -> Result<()> {
    let t = people();
    let by_dept = remove_duplicates(&t, Some(&["dept".to_owned()]))?;
    assert_eq!(column(&by_dept, "name"), texts(&["ann", "bob"]));

    // unknown subset columns fall back to whole-row comparison
    let whole = remove_duplicates(&t, Some(&["nope".to_owned()]))?;
    assert_eq!(whole.height(), 4);

    let repeated = table(vec![("k", ints(&[3, 1, 3, 1])), ("v", texts(&["a", "b", "a", "c"]))]);
    let rows = remove_duplicates(&repeated, None)?;
    assert_eq!(column(&rows, "k"), ints(&[3, 1, 1]), "first occurrences keep their order");
    assert_eq!(column(&rows, "v"), texts(&["a", "b", "c"]));
    Ok(())
}

#[test]
fn test_normalize_methods() -> Result<()> {
    let t = table(vec![("x", ints(&[0, 5, 10]))]);
    assert_eq!(
        column(&normalize(&t, "x", NormalizeMethod::MinMax)?, "x"),
        vec![Value::Float(0.0), Value::Float(0.5), Value::Float(1.0)]
    );
    assert_eq!(
        column(&normalize(&t, "x", NormalizeMethod::ZScore)?, "x"),
        vec![Value::Float(-1.0), Value::Float(0.0), Value::Float(1.0)]
    );
    let unit = column(&normalize(&t, "x", NormalizeMethod::UnitVector)?, "x");
    let norm: f64 = unit.iter().filter_map(Value::as_number).map(|x| x * x).sum();
    assert!((norm - 1.0).abs() < 1e-12);

    // constant column is left as is
    let flat = table(vec![("x", ints(&[4, 4]))]);
    assert_eq!(column(&normalize(&flat, "x", NormalizeMethod::MinMax)?, "x"), ints(&[4, 4]));
    Ok(())
}

#[test]
fn test_normalize_errors() {
    let err = normalize(&people(), "name", NormalizeMethod::MinMax).expect_err("text column");
    assert!(matches!(err, NodeflowError::TypeCoercion { .. }), "got {err}");
    let err = normalize(&people(), "age", NormalizeMethod::MinMax).expect_err("absent column");
    assert!(matches!(err, NodeflowError::ColumnNotFound { .. }), "got {err}");
}

#[test]
fn test_aggregate_groups_in_key_order() -> Result<()> {
    let aggs = vec![
        Aggregation {
            column: "salary".to_owned(),
            function: AggFn::Sum,
        },
        Aggregation {
            column: "name".to_owned(),
            function: AggFn::Count,
        },
    ];
    let out = aggregate(&people(), &["dept".to_owned()], &aggs)?;
    assert_eq!(out.column_names(), vec!["dept", "salary", "name"]);
    assert_eq!(column(&out, "dept"), texts(&["dev", "ops"]));
    assert_eq!(column(&out, "salary"), ints(&[93_000, 40_000]));
    assert_eq!(column(&out, "name"), ints(&[2, 2]));
    Ok(())
}

#[test]
fn test_aggregate_statistics() -> Result<()> {
    let t = table(vec![
        ("g", texts(&["a", "a", "a", "b"])),
        ("v", ints(&[1, 2, 6, 5])),
    ]);
    let agg = |function: AggFn| -> Result<Vec<Value>> {
        let out = aggregate(
            &t,
            &["g".to_owned()],
            &[Aggregation {
                column: "v".to_owned(),
                function,
            }],
        )?;
        Ok(column(&out, "v"))
    };
    assert_eq!(agg(AggFn::Mean)?, vec![Value::Float(3.0), Value::Float(5.0)]);
    assert_eq!(agg(AggFn::Median)?, vec![Value::Float(2.0), Value::Float(5.0)]);
    assert_eq!(agg(AggFn::Max)?, ints(&[6, 5]));
    assert_eq!(agg(AggFn::First)?, ints(&[1, 5]));
    assert_eq!(agg(AggFn::Last)?, ints(&[6, 5]));
    assert_eq!(agg(AggFn::Nunique)?, ints(&[3, 1]));
    let std = agg(AggFn::Std)?;
    assert!(
        std[0].as_number().is_some_and(|s| (s - 7f64.sqrt()).abs() < 1e-12),
        "sample std of a, got {std:?}"
    );
    assert_eq!(std[1], Value::Missing, "a single value has no sample std");
    Ok(())
}

#[test]
fn test_aggregate_unknown_column() {
    let err = aggregate(&people(), &["team".to_owned()], &[]).expect_err("no team column");
    assert!(matches!(err, NodeflowError::ColumnNotFound { .. }));
}

#[test]
fn test_sort_is_stable_with_missing_last() -> Result<()> {
    let by_dept = sort(&people(), &["dept".to_owned()], &[true])?;
    assert_eq!(column(&by_dept, "name"), texts(&["bob", "di", "ann", "cy"]));

    let by_salary = sort(&people(), &["salary".to_owned()], &[false])?;
    assert_eq!(column(&by_salary, "name"), texts(&["bob", "ann", "di", "cy"]));

    let multi = sort(
        &people(),
        &["dept".to_owned(), "salary".to_owned()],
        &[false, true],
    )?;
    assert_eq!(column(&multi, "name"), texts(&["ann", "cy", "di", "bob"]));

    // flag count mismatch sorts everything ascending
    let mismatch = sort(&people(), &["dept".to_owned(), "salary".to_owned()], &[false])?;
    assert_eq!(column(&mismatch, "name"), texts(&["di", "bob", "ann", "cy"]));
    Ok(())
}

#[test]
fn test_text_operations() -> Result<()> {
    let t = table(vec![(
        "raw",
        vec![Value::text("  Item #42 costs 3.50 "), Value::Missing, Value::Int(7)],
    )]);
    let apply = |op: TextOp| -> Result<Vec<Value>> { Ok(column(&apply_text_op(&t, "raw", op)?, "raw")) };

    assert_eq!(
        apply(TextOp::Upper)?,
        vec![Value::text("  ITEM #42 COSTS 3.50 "), Value::Missing, Value::text("7")]
    );
    assert_eq!(apply(TextOp::Trim)?[0], Value::text("Item #42 costs 3.50"));
    assert_eq!(apply(TextOp::ExtractNumbers)?, vec![Value::Int(42), Value::Missing, Value::Int(7)]);
    assert_eq!(apply(TextOp::ExtractStrings)?[0], Value::text("  Item # costs  "));
    assert_eq!(apply(TextOp::RemoveSpecialChars)?[0], Value::text("Item42costs350"));

    // absent column is a no-op
    assert_eq!(apply_text_op(&t, "other", TextOp::Lower)?, t);
    Ok(())
}

#[test]
fn test_round_format_and_convert() -> Result<()> {
    let t = table(vec![
        ("x", vec![Value::Float(2.5), Value::Float(3.14159), Value::Float(7.0)]),
        ("raw", texts(&["2.5", "3.14159", "7"])),
    ]);

    // half to even
    assert_eq!(
        column(&round(&t, "x", 0)?, "x"),
        vec![Value::Float(2.0), Value::Float(3.0), Value::Float(7.0)]
    );
    assert_eq!(column(&round(&t, "x", 2)?, "x")[1], Value::Float(3.14));
    assert_eq!(column(&round(&t, "raw", 1)?, "raw")[1], Value::Float(3.1));
    assert_eq!(
        column(&format_numbers(&t, "x", 2)?, "x"),
        texts(&["2.50", "3.14", "7.00"])
    );
    // formatting only touches numbers
    assert_eq!(column(&format_numbers(&t, "raw", 2)?, "raw"), texts(&["2.5", "3.14159", "7"]));
    assert_eq!(
        column(&convert(&t, "raw", ConvertTarget::Numeric)?, "raw"),
        vec![Value::Float(2.5), Value::Float(3.14159), Value::Float(7.0)]
    );
    assert_eq!(
        column(&convert(&t, "x", ConvertTarget::String)?, "x"),
        texts(&["2.5", "3.14159", "7.0"])
    );
    Ok(())
}

#[test]
fn test_drop_and_rename() {
    let t = people();
    assert_eq!(drop_column(&t, "dept").column_names(), vec!["name", "salary"]);
    assert_eq!(drop_column(&t, "nope"), t);
    assert_eq!(
        rename_column(&t, "dept", "team").column_names(),
        vec!["name", "team", "salary"]
    );
    // target taken: no-op
    assert_eq!(rename_column(&t, "dept", "name"), t);
}

#[test]
fn test_fill_column() -> Result<()> {
    let t = table(vec![
        ("v", vec![Value::Int(2), Value::Missing, Value::Int(4), Value::Int(4)]),
        ("w", vec![Value::text("b"), Value::Missing, Value::text(""), Value::text("a")]),
    ]);

    let mean = column(&fill_column(&t, "v", &ColumnFill::Mean)?, "v");
    assert_eq!(mean[0], Value::Float(2.0));
    assert!(
        mean[1].as_number().is_some_and(|m| (m - 10.0 / 3.0).abs() < 1e-12),
        "got {mean:?}"
    );
    assert_eq!(column(&fill_column(&t, "v", &ColumnFill::Median)?, "v")[1], Value::Float(4.0));
    assert_eq!(column(&fill_column(&t, "v", &ColumnFill::Mode)?, "v"), ints(&[2, 4, 4, 4]));

    // empty text counts as missing; mode ties take the smallest value
    assert_eq!(
        column(&fill_column(&t, "w", &ColumnFill::Value(Value::text("n/a")))?, "w"),
        texts(&["b", "n/a", "n/a", "a"])
    );
    assert_eq!(column(&fill_column(&t, "w", &ColumnFill::Mode)?, "w"), texts(&["b", "a", "a", "a"]));

    assert_eq!(fill_column(&t, "absent", &ColumnFill::Mean)?, t);
    Ok(())
}
