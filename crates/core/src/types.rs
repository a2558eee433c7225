use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contact target for outbound messaging.
///
/// Leads are created by the ingestion collaborator; the dispatcher only ever
/// flips the outreach flags and their timestamps, and never deletes records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
	pub lead_id: String,
	pub business_name: String,
	#[serde(default)]
	pub contact_number: String,
	#[serde(default)]
	pub email_id: String,
	#[serde(default)]
	pub website: String,
	#[serde(default)]
	pub search_phrase: String,
	#[serde(default)]
	pub category: String,
	pub saved_date: DateTime<Utc>,
	#[serde(default)]
	pub reached: bool,
	#[serde(default)]
	pub message_sent: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reached_date: Option<DateTime<Utc>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message_sent_date: Option<DateTime<Utc>>,
}

/// Two-message sequence for one audience variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePair {
	pub message1: String,
	pub message2: String,
}

/// Per-category message bodies. Type 1 targets leads with a usable website,
/// type 2 the rest. Read-only input to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTemplate {
	pub id: String,
	pub category: String,
	pub type1: MessagePair,
	pub type2: MessagePair,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lead_round_trips_camel_case() {
		let json = r#"{
			"leadId": "lead-1",
			"businessName": "Colombo Bakers",
			"contactNumber": "0771234567",
			"website": "https://colombobakers.lk",
			"category": "bakery",
			"savedDate": "2026-03-01T08:30:00Z"
		}"#;
		let lead: Lead = serde_json::from_str(json).unwrap();
		assert_eq!(lead.lead_id, "lead-1");
		assert!(!lead.reached);
		assert!(lead.reached_date.is_none());

		let back = serde_json::to_value(&lead).unwrap();
		assert_eq!(back["businessName"], "Colombo Bakers");
		// Unset timestamps stay out of the document entirely.
		assert!(back.get("reachedDate").is_none());
	}

	#[test]
	fn template_round_trips_camel_case() {
		let json = r#"{
			"id": "1",
			"category": "bakery",
			"type1": {"message1": "a", "message2": "b"},
			"type2": {"message1": "c", "message2": "d"},
			"createdAt": "2026-03-01T08:30:00Z",
			"updatedAt": "2026-03-01T08:30:00Z"
		}"#;
		let template: MessageTemplate = serde_json::from_str(json).unwrap();
		assert_eq!(template.type2.message1, "c");
	}
}
