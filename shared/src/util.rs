/// Current UTC timestamp in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Prefix of client-assigned placeholder ids
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Build a placeholder id from a millisecond timestamp (`temp-<millis>`)
pub fn temp_id(millis: i64) -> String {
    format!("{TEMP_ID_PREFIX}{millis}")
}

/// Whether `id` was assigned by the client rather than the server
pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}
