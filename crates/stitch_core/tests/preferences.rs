use std::time::Duration;

use stitch_core::{
    parse_turn_delay, PreferenceError, PreferenceFlag, Preferences, MAX_TURN_DELAY_MS,
};

#[test]
fn delay_input_is_validated() {
    assert_eq!(parse_turn_delay(" 250 "), Ok(250.0));
    assert_eq!(parse_turn_delay("0"), Ok(0.0));
    assert_eq!(parse_turn_delay("12.5"), Ok(12.5));
    assert!(matches!(
        parse_turn_delay("soon"),
        Err(PreferenceError::NotANumber(_))
    ));
    assert!(matches!(
        parse_turn_delay("-1"),
        Err(PreferenceError::OutOfRange(_))
    ));
    assert!(matches!(
        parse_turn_delay("inf"),
        Err(PreferenceError::OutOfRange(_))
    ));
    assert!(matches!(
        parse_turn_delay("NaN"),
        Err(PreferenceError::OutOfRange(_))
    ));
}

#[test]
fn rejected_delay_keeps_previous_value() {
    let mut prefs = Preferences::default();
    prefs.set_turn_delay(1500.0).unwrap();
    assert!(prefs.set_turn_delay(f64::NAN).is_err());
    assert!(prefs.set_turn_delay(-3.0).is_err());
    assert_eq!(prefs.page_turn_delay_ms, 1500.0);
    assert_eq!(prefs.turn_delay(), Duration::from_millis(1500));
}

#[test]
fn flags_round_trip_through_keys() {
    let mut prefs = Preferences::default();
    for flag in PreferenceFlag::ALL {
        assert_eq!(PreferenceFlag::from_key(flag.key()), Some(flag));
        let current = prefs.flag(flag);
        prefs.set_flag(flag, !current);
        assert_eq!(prefs.flag(flag), !current);
    }
    assert_eq!(PreferenceFlag::from_key("unknown"), None);
}

#[test]
fn persisted_preferences_tolerate_missing_and_bad_fields() {
    let prefs: Preferences = serde_json::from_str(r#"{"inline_images": false}"#).unwrap();
    assert!(!prefs.inline_images);
    assert_eq!(prefs.page_turn_delay_ms, 0.0);

    let prefs: Preferences =
        serde_json::from_str(r#"{"page_turn_delay_ms": -50.0}"#).unwrap();
    assert_eq!(prefs.sanitized().page_turn_delay_ms, 0.0);
}

#[test]
fn huge_delays_are_rejected_everywhere() {
    assert!(matches!(
        parse_turn_delay("1e30"),
        Err(PreferenceError::OutOfRange(_))
    ));
    assert_eq!(parse_turn_delay("3600000"), Ok(MAX_TURN_DELAY_MS));

    let mut prefs = Preferences::default();
    prefs.set_turn_delay(800.0).unwrap();
    assert!(prefs.set_turn_delay(1e30).is_err());
    assert_eq!(prefs.turn_delay(), Duration::from_millis(800));

    let stored: Preferences =
        serde_json::from_str(r#"{"page_turn_delay_ms": 1e30}"#).unwrap();
    let prefs = stored.sanitized();
    assert_eq!(prefs.page_turn_delay_ms, 0.0);
    assert_eq!(prefs.turn_delay(), Duration::ZERO);
}
