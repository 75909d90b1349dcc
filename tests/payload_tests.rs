use chrono::{TimeZone, Utc};
use pixvip::domain::amount::Amount;
use pixvip::domain::payload::{self, MerchantProfile, PayloadCodec, PaymentRequest, TransactionId};
use pixvip::error::CheckoutError;
use rust_decimal_macros::dec;

fn dynamic_code(amount: Amount) -> String {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let request = PaymentRequest::Dynamic {
        amount,
        txid: TransactionId::generate("AL", at),
    };
    PayloadCodec::new(MerchantProfile::default())
        .build(&request)
        .unwrap()
}

#[test]
fn test_built_codes_always_validate() {
    for value in [dec!(0.01), dec!(29.9), dec!(49.90), dec!(1234.567), dec!(0)] {
        let code = dynamic_code(Amount::new(value).unwrap());
        assert!(payload::validate(&code), "rejected {code}");
    }
    let static_code = PayloadCodec::new(MerchantProfile::default())
        .with_initiation_method(false)
        .build(&PaymentRequest::Static {
            txid: TransactionId::from("AL123"),
        })
        .unwrap();
    assert!(payload::validate(&static_code));
}

#[test]
fn test_known_fields_present() {
    let code = dynamic_code(Amount::new(dec!(29.90)).unwrap());
    assert!(code.starts_with("000201"));
    assert!(code.contains("5303986"));
    assert!(code.contains("5802BR"));
    assert!(code.contains("540529.90"));

    let (body, crc) = code.split_at(code.len() - 4);
    assert!(body.ends_with("6304"));
    assert!(crc.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
}

#[test]
fn test_any_single_character_change_is_detected() {
    let code = dynamic_code(Amount::new(dec!(79.90)).unwrap());
    let body_len = code.len() - 4;

    for i in 0..body_len {
        let mut bytes = code.clone().into_bytes();
        bytes[i] = if bytes[i] == b'X' { b'Y' } else { b'X' };
        let tampered = String::from_utf8(bytes).unwrap();
        assert!(!payload::validate(&tampered), "flip at {i} went unnoticed");
    }
}

#[test]
fn test_verify_distinguishes_failures() {
    let code = dynamic_code(Amount::new(dec!(49.90)).unwrap());

    assert!(matches!(
        payload::verify(&code[..40]),
        Err(CheckoutError::MalformedPayload(_))
    ));

    let mut tampered = code.clone();
    tampered.replace_range(code.len() - 4.., "0000");
    if tampered != code {
        assert!(matches!(
            payload::verify(&tampered),
            Err(CheckoutError::ChecksumMismatch { .. })
        ));
    }
}

#[test]
fn test_decoded_fields_match_merchant() {
    let code = dynamic_code(Amount::new(dec!(29.90)).unwrap());
    let fields = payload::decode_fields(&code).unwrap();

    let value_of = |tag: &str| {
        fields
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.value.clone())
            .unwrap()
    };
    assert_eq!(value_of("00"), "01");
    assert_eq!(value_of("01"), "12");
    assert_eq!(value_of("54"), "29.90");
    assert_eq!(value_of("59"), "Astral Legacy");
    assert_eq!(value_of("60"), "BRASILIA");
    assert!(value_of("62").starts_with("05"));
}
