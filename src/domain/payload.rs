//! Tag-length-value payment string ("copy and paste" code) builder and validator.
//!
//! Field order is fixed. Wallet parsers are order-sensitive in practice, so
//! [`PayloadCodec::build`] always emits fields in the sequence below, and the
//! trailing checksum covers every preceding character including the `6304`
//! tag and length of the checksum field itself.

use super::amount::Amount;
use super::checksum;
use crate::error::{CheckoutError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

pub const TAG_FORMAT_INDICATOR: &str = "00";
pub const TAG_INITIATION_METHOD: &str = "01";
pub const TAG_MERCHANT_ACCOUNT: &str = "26";
pub const TAG_CATEGORY_CODE: &str = "52";
pub const TAG_CURRENCY: &str = "53";
pub const TAG_AMOUNT: &str = "54";
pub const TAG_COUNTRY: &str = "58";
pub const TAG_MERCHANT_NAME: &str = "59";
pub const TAG_MERCHANT_CITY: &str = "60";
pub const TAG_ADDITIONAL_DATA: &str = "62";
pub const TAG_CHECKSUM: &str = "63";

const SUBTAG_ARRANGEMENT_ID: &str = "00";
const SUBTAG_MERCHANT_KEY: &str = "01";
const SUBTAG_TRANSACTION_ID: &str = "05";

const FORMAT_INDICATOR: &str = "01";
const ARRANGEMENT_ID: &str = "br.gov.bcb.pix";
const CURRENCY_BRL: &str = "986";
const COUNTRY_CODE: &str = "BR";
const INITIATION_STATIC: &str = "11";
const INITIATION_DYNAMIC: &str = "12";

/// Literal that every payment string starts with.
pub const FORMAT_PREFIX: &str = "000201";
/// Tag and length of the checksum field, immediately before the 4 hex digits.
pub const CHECKSUM_PREFIX: &str = "6304";
/// Shortest string accepted by the cheap structural check.
pub const MIN_PAYLOAD_LEN: usize = 50;

pub const MAX_NAME_LEN: usize = 25;
pub const MAX_CITY_LEN: usize = 15;
const MAX_VALUE_LEN: usize = 99;

// Combining diacritical marks left behind by canonical decomposition.
const COMBINING_MARKS: std::ops::RangeInclusive<char> = '\u{0300}'..='\u{036f}';

/// Decomposes accented characters and drops the combining marks, e.g. "Brasília" -> "Brasilia".
pub fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !COMBINING_MARKS.contains(c)).collect()
}

/// Immutable identity of the receiving merchant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantProfile {
    pub name: String,
    pub city: String,
    pub key: String,
    #[serde(default = "default_category_code")]
    pub category_code: String,
}

fn default_category_code() -> String {
    "0000".to_string()
}

impl Default for MerchantProfile {
    fn default() -> Self {
        Self {
            name: "Astral Legacy".to_string(),
            city: "BRASILIA".to_string(),
            key: "3e2c6f86-3e5a-4abe-9200-894843d02454".to_string(),
            category_code: default_category_code(),
        }
    }
}

impl MerchantProfile {
    /// Display name after accent stripping, rejected if longer than 25 characters.
    pub fn normalized_name(&self) -> Result<String> {
        normalize_capped("merchant name", &self.name, MAX_NAME_LEN)
    }

    /// City after accent stripping, rejected if longer than 15 characters.
    pub fn normalized_city(&self) -> Result<String> {
        normalize_capped("merchant city", &self.city, MAX_CITY_LEN)
    }

    pub fn validate(&self) -> Result<()> {
        self.normalized_name()?;
        self.normalized_city()?;
        ensure_ascii("merchant key", &self.key)?;
        if self.key.is_empty() {
            return Err(CheckoutError::EncodingError(
                "merchant key must not be empty".to_string(),
            ));
        }
        if self.category_code.len() != 4 || !self.category_code.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(CheckoutError::EncodingError(format!(
                "category code must be 4 digits, got {:?}",
                self.category_code
            )));
        }
        Ok(())
    }
}

fn normalize_capped(field: &'static str, raw: &str, max: usize) -> Result<String> {
    let normalized = strip_diacritics(raw.trim());
    ensure_ascii(field, &normalized)?;
    if normalized.is_empty() {
        return Err(CheckoutError::EncodingError(format!("{field} is empty")));
    }
    if normalized.len() > max {
        return Err(CheckoutError::FieldTooLong {
            field,
            len: normalized.len(),
            max,
        });
    }
    Ok(normalized)
}

fn ensure_ascii(field: &'static str, value: &str) -> Result<()> {
    if value.is_ascii() {
        Ok(())
    } else {
        Err(CheckoutError::EncodingError(format!(
            "{field} contains characters outside ASCII: {value:?}"
        )))
    }
}

/// One tag-length-value element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentField {
    pub tag: String,
    pub value: String,
}

impl PaymentField {
    pub fn new(tag: &str, value: impl Into<String>) -> Self {
        Self {
            tag: tag.to_string(),
            value: value.into(),
        }
    }

    /// Builds a field whose value is the concatenation of already encoded sub-fields.
    pub fn composite(tag: &str, children: &[PaymentField]) -> Result<Self> {
        let mut value = String::new();
        for child in children {
            value.push_str(&child.encode()?);
        }
        Ok(Self::new(tag, value))
    }

    /// Renders `tag + 2-digit length + value`.
    pub fn encode(&self) -> Result<String> {
        if self.tag.len() != 2 || !self.tag.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CheckoutError::EncodingError(format!(
                "tag must be two ASCII digits, got {:?}",
                self.tag
            )));
        }
        if !self.value.is_ascii() {
            return Err(CheckoutError::EncodingError(format!(
                "field {} holds non-ASCII value",
                self.tag
            )));
        }
        if self.value.len() > MAX_VALUE_LEN {
            return Err(CheckoutError::EncodingError(format!(
                "field {} value is {} characters, length prefix holds at most {MAX_VALUE_LEN}",
                self.tag,
                self.value.len()
            )));
        }
        Ok(format!("{}{:02}{}", self.tag, self.value.len(), self.value))
    }
}

/// Per-request transaction identifier carried in the additional-data field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// `prefix` + base-36 millisecond timestamp + 5 random base-36 characters, upper-cased.
    pub fn generate(prefix: &str, now: DateTime<Utc>) -> Self {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..5)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        let millis = now.timestamp_millis().max(0) as u64;
        Self(format!("{prefix}{}{suffix}", to_base36(millis)).to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.iter().rev().map(|&b| b as char).collect()
}

/// What the payer is asked to transfer.
///
/// A static code is reusable and carries no amount; a dynamic code is one-shot
/// and always carries one.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentRequest {
    Static { txid: TransactionId },
    Dynamic { amount: Amount, txid: TransactionId },
}

impl PaymentRequest {
    pub fn txid(&self) -> &TransactionId {
        match self {
            PaymentRequest::Static { txid } | PaymentRequest::Dynamic { txid, .. } => txid,
        }
    }
}

/// Builds payment strings for one merchant.
#[derive(Debug, Clone)]
pub struct PayloadCodec {
    merchant: MerchantProfile,
    include_initiation_method: bool,
}

impl PayloadCodec {
    pub fn new(merchant: MerchantProfile) -> Self {
        Self {
            merchant,
            include_initiation_method: true,
        }
    }

    /// Toggles the optional point-of-initiation field ("11" static, "12" dynamic).
    pub fn with_initiation_method(mut self, include: bool) -> Self {
        self.include_initiation_method = include;
        self
    }

    pub fn merchant(&self) -> &MerchantProfile {
        &self.merchant
    }

    pub fn build(&self, request: &PaymentRequest) -> Result<String> {
        let name = self.merchant.normalized_name()?;
        let city = self.merchant.normalized_city()?;

        let mut fields = vec![PaymentField::new(TAG_FORMAT_INDICATOR, FORMAT_INDICATOR)];
        if self.include_initiation_method {
            let method = match request {
                PaymentRequest::Static { .. } => INITIATION_STATIC,
                PaymentRequest::Dynamic { .. } => INITIATION_DYNAMIC,
            };
            fields.push(PaymentField::new(TAG_INITIATION_METHOD, method));
        }
        fields.push(PaymentField::composite(
            TAG_MERCHANT_ACCOUNT,
            &[
                PaymentField::new(SUBTAG_ARRANGEMENT_ID, ARRANGEMENT_ID),
                PaymentField::new(SUBTAG_MERCHANT_KEY, self.merchant.key.as_str()),
            ],
        )?);
        fields.push(PaymentField::new(
            TAG_CATEGORY_CODE,
            self.merchant.category_code.as_str(),
        ));
        fields.push(PaymentField::new(TAG_CURRENCY, CURRENCY_BRL));
        if let PaymentRequest::Dynamic { amount, .. } = request {
            fields.push(PaymentField::new(TAG_AMOUNT, amount.to_wire()));
        }
        fields.push(PaymentField::new(TAG_COUNTRY, COUNTRY_CODE));
        fields.push(PaymentField::new(TAG_MERCHANT_NAME, name));
        fields.push(PaymentField::new(TAG_MERCHANT_CITY, city));
        fields.push(PaymentField::composite(
            TAG_ADDITIONAL_DATA,
            &[PaymentField::new(
                SUBTAG_TRANSACTION_ID,
                request.txid().as_str(),
            )],
        )?);

        let mut payload = String::new();
        for field in &fields {
            payload.push_str(&field.encode()?);
        }
        payload.push_str(CHECKSUM_PREFIX);
        let crc = checksum::compute(&payload);
        payload.push_str(&crc);

        if !has_valid_structure(&payload) {
            return Err(CheckoutError::EncodingError(format!(
                "built payload failed structural check: {payload}"
            )));
        }
        Ok(payload)
    }
}

/// Prefix, checksum tag position and minimum length. Does not recompute the checksum.
pub fn has_valid_structure(text: &str) -> bool {
    if !text.is_ascii() || text.len() < MIN_PAYLOAD_LEN || !text.starts_with(FORMAT_PREFIX) {
        return false;
    }
    let (body, crc) = text.split_at(text.len() - 4);
    body.ends_with(CHECKSUM_PREFIX)
        && crc
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}

/// Structural check followed by a checksum recomputation and a full TLV walk.
pub fn verify(text: &str) -> Result<()> {
    if !has_valid_structure(text) {
        return Err(CheckoutError::MalformedPayload(
            "missing format prefix, checksum field or minimum length".to_string(),
        ));
    }
    let (body, found) = text.split_at(text.len() - 4);
    let expected = checksum::compute(body);
    if expected != found {
        return Err(CheckoutError::ChecksumMismatch {
            expected,
            found: found.to_string(),
        });
    }
    decode_fields(text).map(|_| ())
}

pub fn validate(text: &str) -> bool {
    verify(text).is_ok()
}

/// Splits a payment string into its top-level fields, checksum field included.
pub fn decode_fields(text: &str) -> Result<Vec<PaymentField>> {
    if !text.is_ascii() {
        return Err(CheckoutError::MalformedPayload(
            "payload contains non-ASCII characters".to_string(),
        ));
    }
    let mut fields = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if rest.len() < 4 {
            return Err(CheckoutError::MalformedPayload(format!(
                "truncated field header {rest:?}"
            )));
        }
        let (tag, tail) = rest.split_at(2);
        let (len, tail) = tail.split_at(2);
        let len: usize = len.parse().map_err(|_| {
            CheckoutError::MalformedPayload(format!("field {tag} has non-numeric length {len:?}"))
        })?;
        if tail.len() < len {
            return Err(CheckoutError::MalformedPayload(format!(
                "field {tag} declares {len} characters, {} remain",
                tail.len()
            )));
        }
        let (value, tail) = tail.split_at(len);
        fields.push(PaymentField::new(tag, value));
        rest = tail;
    }
    match fields.last() {
        Some(last) if last.tag == TAG_CHECKSUM && last.value.len() == 4 => Ok(fields),
        _ => Err(CheckoutError::MalformedPayload(
            "checksum field is not the final field".to_string(),
        )),
    }
}
