//! Scan endpoint wire types
//!
//! JSON bodies returned by `POST /scan-ticket`. The backend has shipped both
//! snake_case and camelCase keys over time, so every field accepts both.
//! These types are transport-independent: the HTTP worker hands the raw
//! status and body to [`parse_scan_response`].

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::types::{FailureKind, ScanFailure, ScanResult};

// =============================================================================
// SUCCESS BODY
// =============================================================================

/// One played line on the ticket, as matched by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRow {
    pub numbers: Vec<u32>,
    #[serde(default, alias = "matchedNumbers")]
    pub matched_numbers: Vec<u32>,
    #[serde(default, alias = "matchedBonus")]
    pub matched_bonus: Vec<u32>,
}

impl TicketRow {
    /// Whether `number` was matched on this row
    pub fn is_matched(&self, number: u32) -> bool {
        self.matched_numbers.contains(&number)
    }

    /// Whether `number` was matched as a bonus on this row
    pub fn is_bonus_match(&self, number: u32) -> bool {
        self.matched_bonus.contains(&number)
    }

    /// Total matches on this row, bonus included
    pub fn match_count(&self) -> usize {
        self.matched_numbers.len() + self.matched_bonus.len()
    }
}

/// Prize description attached to a winning ticket
///
/// Older backends send a bare string, newer ones a structured object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrizeInfo {
    Text(String),
    Details {
        #[serde(default)]
        tier: Option<String>,
        #[serde(default)]
        amount: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

impl PrizeInfo {
    /// Single-line label for the prize banner
    pub fn label(&self) -> String {
        match self {
            PrizeInfo::Text(text) => text.clone(),
            PrizeInfo::Details {
                tier,
                amount,
                description,
            } => {
                let parts: Vec<&str> = [tier, amount, description]
                    .into_iter()
                    .filter_map(|p| p.as_deref())
                    .filter(|p| !p.is_empty())
                    .collect();
                parts.join(" - ")
            }
        }
    }
}

/// Successful scan body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSuccess {
    #[serde(alias = "lotteryType")]
    pub lottery_type: String,
    #[serde(
        default,
        alias = "drawNumber",
        deserialize_with = "string_or_number"
    )]
    pub draw_number: Option<String>,
    #[serde(default, alias = "drawDate")]
    pub draw_date: Option<String>,
    #[serde(default, alias = "winningNumbers")]
    pub winning_numbers: Vec<u32>,
    #[serde(default, alias = "bonusNumbers")]
    pub bonus_numbers: Vec<u32>,
    #[serde(default, alias = "ticketRows")]
    pub ticket_rows: Vec<TicketRow>,
    #[serde(default, alias = "totalMatched")]
    pub total_matched: u32,
    #[serde(default, alias = "hasPrize")]
    pub has_prize: bool,
    #[serde(default, alias = "prizeInfo")]
    pub prize_info: Option<PrizeInfo>,
}

/// Error body: `{"error": "...", "details": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Message shown to the user, with details appended when present
    pub fn message(&self) -> String {
        match &self.details {
            None | Some(serde_json::Value::Null) => self.error.clone(),
            Some(serde_json::Value::String(s)) if s.is_empty() => self.error.clone(),
            Some(serde_json::Value::String(s)) => format!("{}: {}", self.error, s),
            Some(other) => format!("{}: {}", self.error, other),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Int(n)) => Some(n.to_string()),
        Some(Raw::Float(n)) => Some(n.to_string()),
    })
}

// =============================================================================
// RESPONSE MAPPING
// =============================================================================

/// Map an HTTP status and body to a [`ScanResult`]
///
/// - 2xx with a success body → `Success`
/// - 2xx with an `{error}` body → `Failure(ServerError)` (the backend reports
///   OCR failures this way)
/// - 2xx with anything else → `Failure(ServerError)` (malformed JSON)
/// - non-2xx → `Failure(ServerError)`, using the `{error}` message when the
///   body carries one
pub fn parse_scan_response(status: u16, body: &str) -> ScanResult {
    let is_success = (200..300).contains(&status);

    if is_success {
        if let Ok(success) = serde_json::from_str::<ScanSuccess>(body) {
            return ScanResult::Success(success);
        }
    }

    if let Ok(err) = serde_json::from_str::<ErrorBody>(body) {
        return ScanResult::Failure(ScanFailure::new(FailureKind::ServerError, err.message()));
    }

    let message = if is_success {
        "Malformed response from scan service".to_string()
    } else {
        format!("Scan service returned HTTP {}", status)
    };
    ScanResult::Failure(ScanFailure::new(FailureKind::ServerError, message))
}


// =============================================================================
// TESTS
// =============================================================================
