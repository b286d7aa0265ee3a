//! Companies House JSON → normalized domain records.
//!
//! The registry omits fields freely, so every accessor here is optional and only the
//! identifying fields (company number, transaction id) are required.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use tracing::debug;
use ukci_core::{
    AccountsInfo, Charge, CompanySearchHit, ConfirmationStatementInfo, Filing, Officer, Profile,
    RegisteredAddress, SearchResults,
};
use uuid::Uuid;

use crate::error::RegistryError;

fn json_at<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    if cur.is_null() {
        None
    } else {
        Some(cur)
    }
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    json_at(value, path)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn json_string(value: &JsonValue, path: &[&str]) -> Option<String> {
    json_str(value, path).map(ToString::to_string)
}

fn json_bool(value: &JsonValue, path: &[&str]) -> bool {
    json_at(value, path)
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
}

fn json_date(value: &JsonValue, path: &[&str]) -> Option<NaiveDate> {
    json_str(value, path).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn json_string_vec(value: &JsonValue, path: &[&str]) -> Vec<String> {
    json_at(value, path)
        .and_then(JsonValue::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Items array of a paged list document; missing or malformed means empty.
pub fn list_items(doc: &JsonValue) -> &[JsonValue] {
    doc.get("items")
        .and_then(JsonValue::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Total item count advertised by a paged list document.
pub fn list_total(doc: &JsonValue) -> Option<usize> {
    ["total_count", "total_results"]
        .iter()
        .find_map(|key| doc.get(*key).and_then(JsonValue::as_u64))
        .map(|n| n as usize)
}

fn address(value: &JsonValue) -> RegisteredAddress {
    let field = |name: &str| json_string(value, &["registered_office_address", name]);
    RegisteredAddress {
        address_line_1: field("address_line_1"),
        address_line_2: field("address_line_2"),
        locality: field("locality"),
        region: field("region"),
        postal_code: field("postal_code"),
        country: field("country"),
    }
}

pub fn parse_profile(doc: &JsonValue) -> Result<Profile, RegistryError> {
    let registration_number = json_string(doc, &["company_number"])
        .ok_or_else(|| RegistryError::Decode("profile without company_number".into()))?;
    let name = json_string(doc, &["company_name"]).unwrap_or_else(|| registration_number.clone());

    let accounts = AccountsInfo {
        next_due: json_date(doc, &["accounts", "next_accounts", "due_on"])
            .or_else(|| json_date(doc, &["accounts", "next_due"])),
        overdue: json_bool(doc, &["accounts", "overdue"])
            || json_bool(doc, &["accounts", "next_accounts", "overdue"]),
        last_made_up_to: json_date(doc, &["accounts", "last_accounts", "made_up_to"]),
    };
    let confirmation_statement = ConfirmationStatementInfo {
        next_due: json_date(doc, &["confirmation_statement", "next_due"]),
        overdue: json_bool(doc, &["confirmation_statement", "overdue"]),
        last_made_up_to: json_date(doc, &["confirmation_statement", "last_made_up_to"]),
    };

    Ok(Profile {
        registration_number,
        name,
        status: json_string(doc, &["company_status"]),
        status_detail: json_string(doc, &["company_status_detail"]),
        company_type: json_string(doc, &["type"]),
        incorporation_date: json_date(doc, &["date_of_creation"]),
        dissolution_date: json_date(doc, &["date_of_cessation"]),
        jurisdiction: json_string(doc, &["jurisdiction"]),
        address: address(doc),
        sic_codes: json_string_vec(doc, &["sic_codes"]),
        accounts,
        confirmation_statement,
        has_charges: json_bool(doc, &["has_charges"]),
        has_insolvency_history: json_bool(doc, &["has_insolvency_history"]),
        raw: doc.clone(),
    })
}

pub fn parse_filing(item: &JsonValue) -> Option<Filing> {
    let Some(transaction_id) = json_string(item, &["transaction_id"]) else {
        debug!("dropping filing without transaction_id");
        return None;
    };
    Some(Filing {
        transaction_id,
        category: json_string(item, &["category"]),
        filing_type: json_string(item, &["type"]),
        date: json_date(item, &["date"]),
        description: json_string(item, &["description"]),
        paper_filed: json_bool(item, &["paper_filed"]),
        raw: item.clone(),
    })
}

/// Officer rows are keyed per appointment: the `{id}` of
/// `/company/{number}/appointments/{id}`. One person can hold several appointments
/// at the same company, so the person link alone is not an identity.
fn appointment_id(
    item: &JsonValue,
    name: &str,
    role: Option<&str>,
    appointed: Option<NaiveDate>,
) -> String {
    let from_self_link = json_str(item, &["links", "self"])
        .and_then(|link| link.trim_end_matches('/').split_once("/appointments/"))
        .map(|(_, id)| id)
        .filter(|id| !id.is_empty() && !id.contains('/'));
    if let Some(id) = from_self_link {
        return id.to_string();
    }

    let person = json_str(item, &["links", "officer", "appointments"])
        .map(|link| link.trim_end_matches('/').trim_end_matches("/appointments"))
        .and_then(|link| link.rsplit('/').next())
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| name.to_ascii_lowercase());
    let key = format!(
        "{}|{}|{}",
        person,
        role.unwrap_or_default(),
        appointed.map(|d| d.to_string()).unwrap_or_default()
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

pub fn parse_officer(item: &JsonValue) -> Option<Officer> {
    let name = json_string(item, &["name"])?;
    let role = json_string(item, &["officer_role"]);
    let appointed_on = json_date(item, &["appointed_on"]);
    Some(Officer {
        officer_id: appointment_id(item, &name, role.as_deref(), appointed_on),
        name,
        role,
        appointed_on,
        resigned_on: json_date(item, &["resigned_on"]),
        nationality: json_string(item, &["nationality"]),
        country_of_residence: json_string(item, &["country_of_residence"]),
        occupation: json_string(item, &["occupation"]),
        raw: item.clone(),
    })
}

pub fn parse_charge(item: &JsonValue) -> Option<Charge> {
    let charge_id = json_string(item, &["id"])
        .or_else(|| json_string(item, &["charge_code"]))
        .or_else(|| {
            json_at(item, &["charge_number"])
                .and_then(JsonValue::as_i64)
                .map(|n| n.to_string())
        })?;
    Some(Charge {
        charge_id,
        charge_number: json_at(item, &["charge_number"]).and_then(JsonValue::as_i64),
        status: json_string(item, &["status"]),
        classification: json_string(item, &["classification", "description"]),
        created_on: json_date(item, &["created_on"]),
        delivered_on: json_date(item, &["delivered_on"]),
        satisfied_on: json_date(item, &["satisfied_on"]),
    })
}

pub fn parse_search(doc: &JsonValue) -> SearchResults {
    let items = list_items(doc)
        .iter()
        .filter_map(|item| {
            Some(CompanySearchHit {
                registration_number: json_string(item, &["company_number"])?,
                name: json_string(item, &["title"])?,
                status: json_string(item, &["company_status"]),
                company_type: json_string(item, &["company_type"]),
                incorporation_date: json_date(item, &["date_of_creation"]),
                address: json_string(item, &["address_snippet"]),
            })
        })
        .collect::<Vec<_>>();
    SearchResults {
        total_results: list_total(doc).unwrap_or(items.len()) as u64,
        items,
    }
}

/// Drops filings dated before `since`; undated filings are kept.
pub fn filings_since(filings: Vec<Filing>, since: Option<NaiveDate>) -> Vec<Filing> {
    match since {
        Some(since) => filings
            .into_iter()
            .filter(|f| f.date.map_or(true, |d| d >= since))
            .collect(),
        None => filings,
    }
}
