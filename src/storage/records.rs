//! Contribution record model and datastore row mapping
//!
//! The datastore is the sole source of truth; everything here is either the
//! domain entity, the wire row shape, or the conversion between the two.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A persisted cash-gift contribution
#[derive(Debug, Clone, PartialEq)]
pub struct ContributionRecord {
    /// Datastore-assigned identifier
    pub id: String,
    /// Donor name
    pub name: String,
    /// Amount in won, always positive
    pub amount: i64,
    /// Celebratory/condolence note
    pub memo: Option<String>,
    /// Event date (day precision), distinct from the bookkeeping timestamps
    pub date: NaiveDate,
    /// Row creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp, refreshed on every patch
    pub updated_at: DateTime<Utc>,
    /// Base64 snapshot of the scanned envelope
    pub image_data: Option<String>,
}

/// Field-level validation failures, surfaced to the user verbatim
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("이름을 입력해주세요.")]
    EmptyName,
    #[error("금액은 0보다 커야 합니다.")]
    NonPositiveAmount,
    #[error("날짜를 선택해주세요.")]
    MissingDate,
}

/// A record about to be created; id and timestamps are datastore-assigned
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub name: String,
    pub amount: i64,
    pub memo: Option<String>,
    pub date: NaiveDate,
    pub image_data: Option<String>,
}

impl NewRecord {
    /// Enforce the record invariants before the remote round trip
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.amount <= 0 {
            return Err(ValidationError::NonPositiveAmount);
        }
        Ok(())
    }
}

/// Partial patch for an existing record.
///
/// Unset fields stay out of the PATCH body and are left untouched by the
/// datastore. For `memo` and `image_data` a `Some(None)` writes NULL.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub name: Option<String>,
    pub amount: Option<i64>,
    pub memo: Option<Option<String>>,
    pub date: Option<NaiveDate>,
    pub image_data: Option<Option<String>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.amount.is_none()
            && self.memo.is_none()
            && self.date.is_none()
            && self.image_data.is_none()
    }

    /// Validate the patched fields against the record invariants
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyName);
            }
        }
        if let Some(amount) = self.amount {
            if amount <= 0 {
                return Err(ValidationError::NonPositiveAmount);
            }
        }
        Ok(())
    }

    /// Build the PATCH body: only the set columns, plus a refreshed
    /// `updated_at`.
    pub fn into_row(self, updated_at: DateTime<Utc>) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        if let Some(name) = self.name {
            body.insert("name".into(), serde_json::Value::String(name));
        }
        if let Some(amount) = self.amount {
            body.insert("amount".into(), serde_json::Value::from(amount));
        }
        if let Some(memo) = self.memo {
            body.insert("memo".into(), serde_json::to_value(memo).unwrap_or_default());
        }
        if let Some(date) = self.date {
            body.insert("date".into(), serde_json::Value::String(date.to_string()));
        }
        if let Some(image_data) = self.image_data {
            body.insert(
                "image_data".into(),
                serde_json::to_value(image_data).unwrap_or_default(),
            );
        }
        body.insert(
            "updated_at".into(),
            serde_json::Value::String(updated_at.to_rfc3339()),
        );
        serde_json::Value::Object(body)
    }
}

/// Row shape of the `contributions` table
#[derive(Debug, Clone, Deserialize)]
pub struct ContributionRow {
    pub id: String,
    pub name: String,
    pub amount: i64,
    pub memo: Option<String>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub image_data: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl From<ContributionRow> for ContributionRecord {
    fn from(row: ContributionRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            amount: row.amount,
            memo: row.memo,
            date: row.date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            image_data: row.image_data,
        }
    }
}

/// Insert body for a new row; id and timestamps are server-assigned
#[derive(Debug, Serialize)]
pub struct InsertRow {
    pub name: String,
    pub amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

impl From<NewRecord> for InsertRow {
    fn from(record: NewRecord) -> Self {
        Self {
            name: record.name,
            amount: record.amount,
            memo: record.memo,
            date: record.date,
            image_data: record.image_data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record() -> NewRecord {
        NewRecord {
            name: "김철수".to_string(),
            amount: 50_000,
            memo: Some("결혼".to_string()),
            date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            image_data: None,
        }
    }

    #[test]
    fn test_validation() {
        assert!(new_record().validate().is_ok());

        let mut record = new_record();
        record.name = "   ".to_string();
        assert_eq!(record.validate(), Err(ValidationError::EmptyName));

        let mut record = new_record();
        record.amount = 0;
        assert_eq!(record.validate(), Err(ValidationError::NonPositiveAmount));
    }

    #[test]
    fn test_row_round_trip() {
        let raw = serde_json::json!({
            "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "name": "김철수",
            "amount": 50000,
            "memo": "결혼",
            "date": "2026-03-14",
            "created_at": "2026-03-14T09:30:00Z",
            "updated_at": "2026-03-14T09:30:00Z",
            "image_data": null,
            "user_id": null
        });
        let row: ContributionRow = serde_json::from_value(raw).unwrap();
        let record = ContributionRecord::from(row);

        assert_eq!(record.name, "김철수");
        assert_eq!(record.amount, 50_000);
        assert_eq!(record.memo.as_deref(), Some("결혼"));
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
    }

    #[test]
    fn test_insert_row_serialization() {
        let body = serde_json::to_value(InsertRow::from(new_record())).unwrap();
        assert_eq!(body["name"], "김철수");
        assert_eq!(body["amount"], 50000);
        assert_eq!(body["date"], "2026-03-14");
        // Server-assigned columns never appear in the insert body
        assert!(body.get("id").is_none());
        assert!(body.get("created_at").is_none());
        assert!(body.get("updated_at").is_none());
        // Unset optionals are omitted rather than written as NULL
        assert!(body.get("image_data").is_none());
    }

    #[test]
    fn test_patch_only_carries_set_fields() {
        let patch = RecordPatch {
            amount: Some(70_000),
            ..Default::default()
        };
        let now = Utc::now();
        let body = patch.into_row(now);

        assert_eq!(body["amount"], 70000);
        assert_eq!(body["updated_at"], now.to_rfc3339());
        assert!(body.get("name").is_none());
        assert!(body.get("memo").is_none());
        assert!(body.get("date").is_none());
    }

    #[test]
    fn test_patch_clears_memo_with_null() {
        let patch = RecordPatch {
            memo: Some(None),
            ..Default::default()
        };
        let body = patch.into_row(Utc::now());
        assert!(body["memo"].is_null());
    }

    #[test]
    fn test_patch_validation() {
        let patch = RecordPatch {
            amount: Some(-1),
            ..Default::default()
        };
        assert_eq!(patch.validate(), Err(ValidationError::NonPositiveAmount));

        let patch = RecordPatch {
            name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(patch.validate(), Err(ValidationError::EmptyName));
    }
}
