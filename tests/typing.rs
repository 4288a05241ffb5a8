use backup_reconciler::{
    data::{Value, sniff_value},
    dedupe::equivalent,
    dump::type_field,
    identity::canonical_key,
    policy::KeyKind,
};
use proptest::prelude::*;

#[test]
fn leading_zero_codes_are_not_numbers() {
    assert_eq!(sniff_value("00042"), Value::String("00042".into()));
    assert_eq!(sniff_value("0"), Value::Integer(0));
    assert_eq!(sniff_value("-17"), Value::Integer(-17));
    assert_eq!(sniff_value("3.25"), Value::Float(3.25));
}

#[test]
fn year_prefixed_garbage_stays_text() {
    assert_eq!(sniff_value("2024-Q1"), Value::String("2024-Q1".into()));
    assert!(matches!(sniff_value("2024-01-15"), Value::Timestamp(_)));
}

#[test]
fn uuid_keys_canonicalize_to_lowercase() {
    let key = canonical_key(
        &Value::String("0B6F2A1E-9C8D-4E7F-A6B5-C4D3E2F1A0B9".into()),
        KeyKind::Uuid,
    );
    assert_eq!(key.as_deref(), Some("0b6f2a1e-9c8d-4e7f-a6b5-c4d3e2f1a0b9"));
    assert_eq!(canonical_key(&Value::String("unknown".into()), KeyKind::Uuid), None);
    assert_eq!(canonical_key(&Value::Integer(12345), KeyKind::Uuid), None);
    assert_eq!(
        canonical_key(&Value::String("12".into()), KeyKind::Sequence).as_deref(),
        Some("12")
    );
}

proptest! {
    #[test]
    fn integers_sniff_back_to_themselves(n in any::<i64>()) {
        prop_assert_eq!(sniff_value(&n.to_string()), Value::Integer(n));
    }

    #[test]
    fn plain_words_stay_strings(word in "[g-z][a-z ]{0,15}") {
        prop_assume!(word != "t" && word != "f");
        prop_assert_eq!(type_field(&word), Value::String(word.clone()));
    }

    #[test]
    fn email_comparison_ignores_case(local in "[a-z]{1,10}", domain in "[a-z]{1,10}") {
        let lower = Value::String(format!("{local}@{domain}.com"));
        let upper = Value::String(format!("{}@{}.COM", local.to_uppercase(), domain));
        prop_assert!(equivalent("email", &lower, &upper));
    }

    #[test]
    fn generated_uuids_canonicalize(bytes in any::<[u8; 16]>()) {
        let id = uuid::Builder::from_random_bytes(bytes).into_uuid();
        let upper = id.hyphenated().to_string().to_uppercase();
        prop_assert_eq!(
            canonical_key(&Value::String(upper), KeyKind::Uuid),
            Some(id.hyphenated().to_string())
        );
    }
}
