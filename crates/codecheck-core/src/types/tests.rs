use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_value_accessors() {
    assert!(Value::Null.is_null());
    assert_eq!(Value::Int32(7).as_i64(), Some(7));
    assert_eq!(Value::String("42".into()).as_i64(), Some(42));
    assert_eq!(Value::Decimal("1.50".into()).as_f64(), Some(1.5));
    assert_eq!(Value::Bool(true).as_bool(), Some(true));
    assert_eq!(Value::Int64(1).as_bool(), None);
}

#[test]
fn test_value_from_option() {
    assert_eq!(Value::from(None::<i32>), Value::Null);
    assert_eq!(Value::from(Some("abc")), Value::String("abc".into()));
}

#[test]
fn test_row_lookup_by_name() {
    let row = Row::new(
        vec!["id".into(), "name".into()],
        vec![Value::Int32(1), Value::String("deck".into())],
    );

    assert_eq!(row.get_by_name("name"), Some(&Value::String("deck".into())));
    assert_eq!(row.get_by_name("missing"), None);
    assert_eq!(row.to_map().len(), 2);
}

#[test]
fn test_row_to_json_keeps_plain_values() {
    let row = Row::new(
        vec!["id".into(), "active".into(), "note".into()],
        vec![Value::Int64(9), Value::Bool(false), Value::Null],
    );

    assert_eq!(
        row.to_json(),
        serde_json::json!({ "id": 9, "active": false, "note": null })
    );
}

#[test]
fn test_access_mode_from_flag() {
    assert_eq!(AccessMode::from_read_only(true), AccessMode::ReadOnly);
    assert_eq!(AccessMode::from_read_only(false), AccessMode::ReadWrite);
    assert!(AccessMode::ReadOnly.is_read_only());
    assert_eq!(AccessMode::default(), AccessMode::ReadWrite);
}
