//! Chat session engine
//!
//! A chat holds a snapshot of a form's popups and the visitor's responses,
//! keyed by popup position. Engagement counters are only recomputed by
//! [`Chat::apply_interaction`]; recording a response never touches them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::types::{Chat, Popup, ResponseEntry};

/// Body of `PUT /chat/:id/interact`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionUpdate {
    /// Added to the stored view count
    pub views: Option<i64>,
    /// Added to the stored count, then usually replaced by the derived value
    pub incomplete_interactions: Option<i64>,
    /// Overwrites the stored rate unless every popup is answered
    pub completion_rate: Option<i32>,
}

/// Analytics view of a chat, as served by `GET /formresponse/:id`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReport {
    pub last_visited: Option<DateTime<Utc>>,
    pub views: i64,
    pub incomplete_interactions: i64,
    pub completion_rate: i32,
    pub responses: Vec<ReportEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub popup_type: String,
    /// Position among reported entries, starting at 1
    pub serial_no: usize,
    pub response: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

pub fn invalid_popup_index() -> AppError {
    AppError::InvalidArgument("Invalid popup index".to_string())
}

impl Chat {
    pub fn new(popups: Vec<Popup>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            popups,
            responses: BTreeMap::new(),
            views: 0,
            incomplete_interactions: 0,
            completion_rate: 0,
            last_visited: None,
            created_at: now,
        }
    }

    /// Build the ledger entry answering the popup at `index`, captured from
    /// that popup. Returns the position it belongs at.
    pub fn response_entry(
        &self,
        index: i64,
        response: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(usize, ResponseEntry), AppError> {
        let position = usize::try_from(index)
            .ok()
            .filter(|&i| i < self.popups.len())
            .ok_or_else(invalid_popup_index)?;

        let popup = &self.popups[position];
        let entry = ResponseEntry {
            popup_type: Some(popup.kind.clone()),
            serial_no: popup.serial_no,
            response,
            submitted_at: now,
        };
        Ok((position, entry))
    }

    /// Store `response` for the popup at `index`, replacing any earlier answer
    pub fn record_response(
        &mut self,
        index: i64,
        response: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let (position, entry) = self.response_entry(index, response, now)?;
        self.responses.insert(position, entry);
        Ok(())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_visited = Some(now);
    }

    /// Number of popups with a recorded response
    pub fn answered(&self) -> usize {
        self.responses.len()
    }

    /// Apply caller-supplied counter changes, then derive the canonical
    /// completion fields from the response ledger. Derived values win.
    pub fn apply_interaction(&mut self, update: &InteractionUpdate) {
        if let Some(delta) = update.views {
            self.views = self.views.saturating_add(delta).max(0);
        }
        if let Some(delta) = update.incomplete_interactions {
            self.incomplete_interactions = self.incomplete_interactions.saturating_add(delta).max(0);
        }
        if let Some(rate) = update.completion_rate {
            self.completion_rate = rate.clamp(0, 100);
        }

        let total_popups = self.popups.len();
        let total_responses = self.answered();

        if total_responses >= total_popups {
            self.completion_rate = 100;
        } else {
            self.incomplete_interactions = total_responses as i64;
        }
    }

    /// Responses in popup order. `serial_no` is renumbered by position in the
    /// report, not taken from the popup answered.
    pub fn report(&self) -> ChatReport {
        let responses = self
            .responses
            .values()
            .filter_map(|entry| {
                entry
                    .popup_type
                    .as_ref()
                    .map(|popup_type| (popup_type, entry))
            })
            .enumerate()
            .map(|(position, (popup_type, entry))| ReportEntry {
                popup_type: popup_type.clone(),
                serial_no: position + 1,
                response: entry.response.clone(),
                submitted_at: entry.submitted_at,
            })
            .collect();

        ChatReport {
            last_visited: self.last_visited,
            views: self.views,
            incomplete_interactions: self.incomplete_interactions,
            completion_rate: self.completion_rate,
            responses,
        }
    }
}
