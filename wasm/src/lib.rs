//! WebAssembly module for the veterinary inventory ledger
//!
//! Provides client-side computation for:
//! - Stock status badges
//! - Movement previews before submission
//! - Expiry countdowns
//! - Offline form validation

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::reconciler::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::log_1(&JsValue::from_str("vet-inventory wasm loaded"));
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|_| format!("{} is not a number: {}", field, value))
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{} is not a YYYY-MM-DD date: {}", field, value))
}

fn classify(current: &str, minimum: &str) -> Result<StockStatus, String> {
    Ok(stock_status(
        parse_decimal("current", current)?,
        parse_decimal("minimum", minimum)?,
    ))
}

fn preview(balance: &str, movement_type: &str, quantity: &str) -> Result<Decimal, String> {
    let balance = parse_decimal("balance", balance)?;
    let quantity = parse_decimal("quantity", quantity)?;
    let movement_type = MovementType::from_str(movement_type)
        .ok_or_else(|| format!("unknown movement type: {}", movement_type))?;
    apply_movement(balance, movement_type, quantity).map_err(|e| e.to_string())
}

fn days_between(expiration: &str, today: &str) -> Result<i64, String> {
    Ok((parse_date("expiration", expiration)? - parse_date("today", today)?).num_days())
}

fn validate_item_json(item_json: &str) -> Result<(), String> {
    let input: CreateStockItemInput =
        serde_json::from_str(item_json).map_err(|e| format!("Invalid stock item JSON: {}", e))?;
    validate_new_item(&input).map_err(|e| {
        serde_json::json!({ "field": e.field, "message": e.message }).to_string()
    })
}

/// Status badge for a balance: "out_of_stock", "low" or "normal"
#[wasm_bindgen]
pub fn classify_stock_status(current: &str, minimum: &str) -> Result<String, JsValue> {
    classify(current, minimum)
        .map(|status| status.as_str().to_string())
        .map_err(|e| JsValue::from_str(&e))
}

/// Balance a movement would leave, or the reason it would be rejected
#[wasm_bindgen]
pub fn preview_movement(balance: &str, movement_type: &str, quantity: &str) -> Result<String, JsValue> {
    preview(balance, movement_type, quantity)
        .map(|balance| balance.to_string())
        .map_err(|e| JsValue::from_str(&e))
}

/// Days from `today` until `expiration`; negative once expired
#[wasm_bindgen]
pub fn days_until_expiry(expiration: &str, today: &str) -> Result<i32, JsValue> {
    days_between(expiration, today)
        .map(|days| days as i32)
        .map_err(|e| JsValue::from_str(&e))
}

/// Expiry badge: "expired", "expiring_soon", "ok" or "no_expiry"
#[wasm_bindgen]
pub fn classify_expiry(expiration: Option<String>, today: &str, window_days: i32) -> Result<String, JsValue> {
    let today = parse_date("today", today).map_err(|e| JsValue::from_str(&e))?;
    let expiration = match expiration.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(value) => Some(parse_date("expiration", value).map_err(|e| JsValue::from_str(&e))?),
    };
    Ok(expiry_status(expiration, today, i64::from(window_days))
        .as_str()
        .to_string())
}

/// Validate a new stock item form; the error is a `{field, message}` JSON object
#[wasm_bindgen]
pub fn validate_stock_item_json(item_json: &str) -> Result<(), JsValue> {
    validate_item_json(item_json).map_err(|e| JsValue::from_str(&e))
}

/// Today's date in the browser as YYYY-MM-DD
#[wasm_bindgen]
pub fn today_iso() -> String {
    let iso: String = js_sys::Date::new_0().to_iso_string().into();
    iso.chars().take(10).collect()
}
