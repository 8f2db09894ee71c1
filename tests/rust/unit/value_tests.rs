//! Unit tests for ECSQL value conversions

#[cfg(test)]
mod value_tests {
    use chrono::NaiveDate;
    use ecdb::statement::value::{from_julian_day, to_julian_day};
    use ecdb::EcValue;
    use serde_json::json;

    #[test]
    fn test_unix_epoch_julian_day() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(to_julian_day(&epoch), 2_440_587.5);
        assert_eq!(from_julian_day(2_440_588.0), epoch.checked_add_signed(chrono::Duration::hours(12)));
    }

    #[test]
    fn test_conversions_from_rust_values() {
        assert_eq!(EcValue::from(true), EcValue::Boolean(true));
        assert_eq!(EcValue::from(7i32), EcValue::Integer(7));
        assert_eq!(EcValue::from("x"), EcValue::String("x".into()));
        assert_eq!(EcValue::from(None::<i64>), EcValue::Null);
        assert_eq!(EcValue::from(Some(2.5)), EcValue::Double(2.5));
        assert_eq!(EcValue::from(vec![1u8, 2]), EcValue::Binary(vec![1, 2]));
    }

    #[test]
    fn test_composite_json_rendering() {
        let value = EcValue::Struct(vec![
            ("Street".into(), EcValue::from("Main")),
            ("Loc".into(), EcValue::Point2d { x: 1.0, y: 2.5 }),
            (
                "Owner".into(),
                EcValue::Navigation {
                    id: 9,
                    rel_class_id: Some(4),
                },
            ),
        ]);
        assert_eq!(
            value.to_json(),
            json!({
                "Street": "Main",
                "Loc": { "x": 1.0, "y": 2.5 },
                "Owner": { "id": 9, "relClassId": 4 }
            })
        );
    }

    #[test]
    fn test_accessors() {
        assert_eq!(EcValue::Integer(3).as_f64(), Some(3.0));
        assert_eq!(EcValue::Double(3.0).as_i64(), None);
        assert_eq!(EcValue::from("a").as_str(), Some("a"));
        assert!(EcValue::Null.is_null());
        let value = EcValue::Struct(vec![("Zip".into(), EcValue::from("123"))]);
        assert_eq!(value.member("zip"), Some(&EcValue::from("123")));
    }
}
