//! Durable JSON document store.
//!
//! Every document is small and replaced whole on write: leads, message
//! templates, and the rate-limit window. Missing or unreadable files load as
//! their empty defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::ratelimit::RateWindowDoc;
use crate::types::{Lead, MessageTemplate};

const LEADS_FILE: &str = "leads.json";
const MESSAGES_FILE: &str = "messages.json";
const RATE_LIMIT_FILE: &str = "rate-limit.json";

#[derive(Debug)]
pub struct JsonStore {
	data_dir: PathBuf,
}

impl JsonStore {
	pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
		let data_dir = data_dir.into();
		fs::create_dir_all(&data_dir)?;
		Ok(Self { data_dir })
	}

	pub fn load_leads(&self) -> Vec<Lead> {
		load_json(&self.path(LEADS_FILE)).unwrap_or_default()
	}

	/// Whole-document replace of the lead list.
	pub fn save_leads(&self, leads: &[Lead]) -> Result<()> {
		save_json(&self.path(LEADS_FILE), &leads)
	}

	pub fn load_templates(&self) -> Vec<MessageTemplate> {
		load_json(&self.path(MESSAGES_FILE)).unwrap_or_default()
	}

	pub fn save_templates(&self, templates: &[MessageTemplate]) -> Result<()> {
		save_json(&self.path(MESSAGES_FILE), &templates)
	}

	pub fn load_rate_window(&self) -> RateWindowDoc {
		load_json(&self.path(RATE_LIMIT_FILE)).unwrap_or_default()
	}

	pub fn save_rate_window(&self, doc: &RateWindowDoc) -> Result<()> {
		save_json(&self.path(RATE_LIMIT_FILE), doc)
	}

	fn path(&self, name: &str) -> PathBuf {
		self.data_dir.join(name)
	}
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
	fs::read_to_string(path).ok().and_then(|content| serde_json::from_str(&content).ok())
}

fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	fs::write(path, serde_json::to_string_pretty(data)?)?;
	Ok(())
}
