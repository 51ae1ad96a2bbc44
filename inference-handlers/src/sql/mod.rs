//! Natural-language to SQL
//!
//! Prompt construction over a fixed schema description and the static
//! read-only guard applied to generated statements.

use serde_json::{json, Value};
use thiserror::Error;

/// Keywords that disqualify a statement wherever they appear.
pub const FORBIDDEN_KEYWORDS: [&str; 6] = ["update", "delete", "insert", "drop", "alter", "truncate"];

#[derive(Debug, Clone, Error, PartialEq)]
#[error("Unsafe or invalid query generated: {reason}")]
pub struct UnsafeQuery {
    pub sql: String,
    pub reason: String,
}

/// Description of the `Smart` schema embedded in every prompt.
pub fn schema() -> Value {
    json!({
        "schema": "Smart",
        "tables": [
            {
                "name": "network_inventory",
                "columns": {
                    "device_id": "INT PRIMARY KEY",
                    "hostname": "VARCHAR(128)",
                    "vendor": "VARCHAR(64)",
                    "model": "VARCHAR(64)",
                    "device_type": "VARCHAR(64)",
                    "site": "INT",
                    "area": "INT",
                    "mgmt_ip": "VARCHAR(45)",
                    "mac_address": "VARCHAR(32)",
                    "os_version": "VARCHAR(64)",
                    "serial_number": "VARCHAR(64)",
                    "installed_at": "DATETIME",
                    "status": "ENUM('active','maintenance','inactive')",
                    "outlet_id": "INT"
                }
            },
            {
                "name": "outlet_specs",
                "columns": {
                    "outlet_id": "INT PRIMARY KEY",
                    "is_110v": "TINYINT",
                    "is_220v": "TINYINT",
                    "braker_amp": "INT",
                    "max_watts": "INT"
                }
            },
            {
                "name": "raw_shelly_power",
                "columns": {
                    "device_id": "INT",
                    "ts": "TIMESTAMP",
                    "power_w": "DOUBLE",
                    "voltage_v": "DOUBLE",
                    "current_a": "DOUBLE",
                    "relay_on": "TINYINT",
                    "energy_wh_acc": "BIGINT"
                }
            },
            {
                "name": "T_Area",
                "columns": {
                    "Area_id": "INT PRIMARY KEY",
                    "Area": "VARCHAR(45)"
                }
            },
            {
                "name": "T_Site",
                "columns": {
                    "Site_id": "INT PRIMARY KEY",
                    "Site": "VARCHAR(45)"
                }
            }
        ]
    })
}

/// Single user prompt asking for one MySQL `SELECT` answering `question`.
pub fn build_prompt(question: &str) -> String {
    let schema = serde_json::to_string_pretty(&schema()).unwrap_or_default();
    format!(
        "You are an SQL assistant for an IoT energy monitoring system.\n\
         The database schema (simplified JSON) is as follows:\n\
         {schema}\n\n\
         Based on this schema, generate a safe MySQL SELECT query that answers:\n\
         \"{question}\"\n\n\
         Rules:\n\
         - Use INNER JOINs only if necessary.\n\
         - Only use SELECT statements (no modifications).\n\
         - Limit results to 10 rows if unspecified.\n\
         - Output only the SQL query.\n"
    )
}

/// Trim the completion and drop a surrounding markdown code fence.
pub fn extract_sql(completion: &str) -> String {
    let trimmed = completion.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string ("sql", "mysql", ...) on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

/// Accept only statements that start with `select` and contain none of
/// [`FORBIDDEN_KEYWORDS`] anywhere, case-insensitively.
pub fn ensure_read_only(sql: &str) -> Result<(), UnsafeQuery> {
    let lowered = sql.to_lowercase();
    let reject = |reason: String| UnsafeQuery {
        sql: sql.to_string(),
        reason,
    };

    if !lowered.starts_with("select") {
        return Err(reject("statement must start with SELECT".to_string()));
    }
    if let Some(keyword) = FORBIDDEN_KEYWORDS.iter().find(|k| lowered.contains(*k)) {
        return Err(reject(format!("statement contains '{keyword}'")));
    }
    Ok(())
}
