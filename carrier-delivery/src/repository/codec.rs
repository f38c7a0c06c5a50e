//! Mapping between [`EmailRecord`] and the record store's attribute maps.
//!
//! Timestamps are written as fixed-width RFC 3339 UTC strings with
//! microsecond precision, so the store's lexicographic index order is also
//! chronological order. Absent optional fields are absent attributes, never
//! zero values.

use carrier_common::SendStatus;
use carrier_store::{AttributeValue, Item};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::{
    error::CodecError,
    types::{EmailId, EmailRecord},
};

pub(crate) mod attr {
    pub const ID: &str = "id";
    pub const RECIPIENTS: &str = "recipients";
    pub const TEMPLATE: &str = "template";
    pub const SUBSTITUTIONS: &str = "substitutions";
    pub const PROVIDER_ID: &str = "provider_id";
    pub const SEND_STATUS: &str = "send_status";
    pub const SCHEDULED_AT: &str = "scheduled_at";
    pub const ATTEMPTS: &str = "attempts";
    pub const ACCEPTED: &str = "accepted";
    pub const REJECTED: &str = "rejected";
    pub const LAST_ATTEMPT_AT: &str = "last_attempt_at";
    pub const CREATED_AT: &str = "created_at";
    pub const UPDATED_AT: &str = "updated_at";
}

pub(crate) fn timestamp(at: DateTime<Utc>) -> AttributeValue {
    AttributeValue::String(at.to_rfc3339_opts(SecondsFormat::Micros, true))
}

pub(crate) fn status(status: SendStatus) -> AttributeValue {
    AttributeValue::Number(status.code())
}

pub(crate) fn to_item(record: &EmailRecord) -> Item {
    let mut item = Item::new();
    let mut put = |name: &str, value: AttributeValue| {
        item.insert(name.to_string(), value);
    };

    put(attr::ID, AttributeValue::from(record.id.to_string()));
    put(attr::RECIPIENTS, AttributeValue::from(record.recipients.clone()));
    put(attr::TEMPLATE, AttributeValue::from(record.template.as_str()));
    put(
        attr::SUBSTITUTIONS,
        AttributeValue::from(record.substitutions.clone()),
    );
    put(attr::SEND_STATUS, status(record.send_status));
    put(attr::ATTEMPTS, AttributeValue::from(record.attempts));
    put(attr::ACCEPTED, AttributeValue::from(record.accepted));
    put(attr::REJECTED, AttributeValue::from(record.rejected));
    put(attr::CREATED_AT, timestamp(record.created_at));
    put(attr::UPDATED_AT, timestamp(record.updated_at));

    if let Some(provider_id) = &record.provider_id {
        put(attr::PROVIDER_ID, AttributeValue::from(provider_id.as_str()));
    }
    if let Some(at) = record.scheduled_at {
        put(attr::SCHEDULED_AT, timestamp(at));
    }
    if let Some(at) = record.last_attempt_at {
        put(attr::LAST_ATTEMPT_AT, timestamp(at));
    }

    item
}

fn wrong_type(
    attribute: &'static str,
    expected: &'static str,
    found: &AttributeValue,
) -> CodecError {
    CodecError::WrongType {
        attribute,
        expected,
        found: found.type_name(),
    }
}

fn optional<'a>(item: &'a Item, attribute: &'static str) -> Option<&'a AttributeValue> {
    item.get(attribute)
}

fn required<'a>(item: &'a Item, attribute: &'static str) -> Result<&'a AttributeValue, CodecError> {
    item.get(attribute).ok_or(CodecError::Missing(attribute))
}

fn string(value: &AttributeValue, attribute: &'static str) -> Result<String, CodecError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| wrong_type(attribute, "string", value))
}

fn count(value: &AttributeValue, attribute: &'static str) -> Result<u32, CodecError> {
    let n = value
        .as_number()
        .ok_or_else(|| wrong_type(attribute, "number", value))?;
    u32::try_from(n).map_err(|_| CodecError::OutOfRange {
        attribute,
        value: n,
    })
}

fn time(value: &AttributeValue, attribute: &'static str) -> Result<DateTime<Utc>, CodecError> {
    let raw = value
        .as_str()
        .ok_or_else(|| wrong_type(attribute, "string", value))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|source| CodecError::Timestamp { attribute, source })
}

/// Counters default to zero when absent; records written before a counter
/// existed still decode.
fn count_or_zero(item: &Item, attribute: &'static str) -> Result<u32, CodecError> {
    optional(item, attribute).map_or(Ok(0), |value| count(value, attribute))
}

pub(crate) fn from_item(item: &Item) -> Result<EmailRecord, CodecError> {
    let id: EmailId = string(required(item, attr::ID)?, attr::ID)?.parse()?;

    let recipients = required(item, attr::RECIPIENTS)?;
    let recipients = recipients
        .as_string_list()
        .ok_or_else(|| wrong_type(attr::RECIPIENTS, "string list", recipients))?
        .to_vec();

    let substitutions = match optional(item, attr::SUBSTITUTIONS) {
        None => std::collections::BTreeMap::new(),
        Some(value) => value
            .as_string_map()
            .ok_or_else(|| wrong_type(attr::SUBSTITUTIONS, "string map", value))?
            .clone(),
    };

    let status_value = required(item, attr::SEND_STATUS)?;
    let send_status = SendStatus::try_from(
        status_value
            .as_number()
            .ok_or_else(|| wrong_type(attr::SEND_STATUS, "number", status_value))?,
    )?;

    Ok(EmailRecord {
        id,
        recipients,
        template: string(required(item, attr::TEMPLATE)?, attr::TEMPLATE)?,
        substitutions,
        provider_id: optional(item, attr::PROVIDER_ID)
            .map(|value| string(value, attr::PROVIDER_ID))
            .transpose()?,
        send_status,
        scheduled_at: optional(item, attr::SCHEDULED_AT)
            .map(|value| time(value, attr::SCHEDULED_AT))
            .transpose()?,
        attempts: count_or_zero(item, attr::ATTEMPTS)?,
        accepted: count_or_zero(item, attr::ACCEPTED)?,
        rejected: count_or_zero(item, attr::REJECTED)?,
        last_attempt_at: optional(item, attr::LAST_ATTEMPT_AT)
            .map(|value| time(value, attr::LAST_ATTEMPT_AT))
            .transpose()?,
        created_at: time(required(item, attr::CREATED_AT)?, attr::CREATED_AT)?,
        updated_at: time(required(item, attr::UPDATED_AT)?, attr::UPDATED_AT)?,
    })
}
