use super::*;
use crate::error::NodeflowError;
use crate::processing::io::*;
use anyhow::Result;

#[test]
fn test_csv_inference_and_headers() -> Result<()> {
    let csv = "name,age,,age\nann,25,x,NA\nbob,3.5,y,true\ncy\n";
    let t = parse_table(csv, PayloadFormat::Csv)?;

    assert_eq!(t.column_names(), vec!["name", "age", "Unnamed: 2", "age.1"]);
    // integers and floats in one column read as floats
    assert_eq!(
        t.column("age").map(|c| c.values().to_vec()),
        Some(vec![Value::Float(25.0), Value::Float(3.5), Value::Missing])
    );
    assert_eq!(
        t.column("age.1").map(|c| c.values().to_vec()),
        Some(vec![Value::Missing, Value::Bool(true), Value::Missing])
    );
    // short rows are padded with missing values
    assert_eq!(t.value(2, 2), Some(Value::Missing));
    Ok(())
}

#[test]
fn test_json_rows_and_columns() -> Result<()> {
    let t = parse_table(r#"[{"a": 1, "b": "x"}, {"a": 2.5, "c": null}]"#, PayloadFormat::Json)?;
    assert_eq!(t.column_names(), vec!["a", "b", "c"]);
    assert_eq!(t.value(1, 0), Some(Value::Float(2.5)));
    assert_eq!(t.value(1, 1), Some(Value::Missing));
    assert_eq!(parse_table("[]", PayloadFormat::Json)?.shape(), (0, 0));

    let cols = parse_records(r#"{"a": [1, 2], "b": [true, false]}"#, PayloadFormat::Json)?;
    assert_eq!(cols.len(), 2);
    assert_eq!(cols[1].get("b"), Some(&Value::Bool(false)));

    let err = parse_records(r#"{"a": [1], "b": [1, 2]}"#, PayloadFormat::Json).expect_err("ragged columns");
    assert!(matches!(err, NodeflowError::InputFormat(_)), "got {err}");
    Ok(())
}

#[test]
fn test_xml_record_shapes() -> Result<()> {
    let flat = "<data><row><id>1</id><city>Leeds</city></row><row><id>2</id><city>York</city></row></data>";
    let records = parse_records(flat, PayloadFormat::Xml)?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(records[1].get("city"), Some(&Value::text("York")));

    // leaves directly under the root are one-field records
    let leaves = parse_records("<list><n>4</n><n>5</n></list>", PayloadFormat::Xml)?;
    assert_eq!(leaves.len(), 2);
    assert_eq!(leaves[1].get("n"), Some(&Value::Int(5)));

    // deeper nesting is searched for record-shaped elements
    let nested = "<root><group><item><v>1.5</v></item><item><v>x &amp; y</v></item></group></root>";
    let records = parse_records(nested, PayloadFormat::Xml)?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("v"), Some(&Value::Float(1.5)));
    assert_eq!(records[1].get("v"), Some(&Value::text("x & y")));
    Ok(())
}

#[test]
fn test_malformed_xml_is_an_input_error() {
    let err = parse_records("<data><row></data>", PayloadFormat::Xml).expect_err("mismatched tags");
    assert!(matches!(err, NodeflowError::InputFormat(_)), "got {err}");
}

#[test]
fn test_read_records_is_lenient() {
    assert!(read_records("not json", PayloadFormat::Json).is_empty());
    assert!(read_records("<open>", PayloadFormat::Xml).is_empty());
    assert_eq!(read_records("a\n1\n", PayloadFormat::Csv).len(), 1);
}

#[test]
fn test_format_from_file_name() {
    assert_eq!(PayloadFormat::from_file_name("people.JSON"), PayloadFormat::Json);
    assert_eq!(PayloadFormat::from_file_name("dump.xml"), PayloadFormat::Xml);
    assert_eq!(PayloadFormat::from_file_name("notes.txt"), PayloadFormat::Csv);
    assert_eq!(PayloadFormat::from_file_name("no_extension"), PayloadFormat::Csv);
    assert_eq!(PayloadFormat::parse("yaml"), None);
}

#[test]
fn test_csv_missing_markers_and_types() -> Result<()> {
    let csv = "id,city,joined,active\n1,Leeds,2023-04-01,true\n2,N/A,NULL,false\n3,York,,\n";
    let t = parse_table(csv, PayloadFormat::Csv)?;

    assert_eq!(t.shape(), (3, 4));
    assert_eq!(t.column("id").map(|c| c.values().to_vec()), Some(ints(&[1, 2, 3])));
    assert_eq!(t.value(1, 1), Some(Value::Missing), "N/A is missing");
    assert_eq!(t.column("joined").map(|c| c.missing_count()), Some(2));
    assert_eq!(t.value(1, 3), Some(Value::Bool(false)));
    assert_eq!(parse_table("", PayloadFormat::Csv)?, Table::default());
    Ok(())
}

#[test]
fn test_load_table_from_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("scores.json");
    std::fs::write(&path, r#"[{"player": "ann", "score": 10}, {"player": "bob", "score": 7}]"#)?;

    let t = load_table(&path)?;
    assert_eq!(t.shape(), (2, 2));
    assert_eq!(t.value(0, 1), Some(Value::Int(10)));

    let missing = load_table(&dir.path().join("absent.csv")).expect_err("file does not exist");
    assert!(
        missing.to_string().starts_with("Failed to read "),
        "read errors name the file, got {missing}"
    );
    assert!(missing.to_string().contains("absent.csv"));
    Ok(())
}
