pub mod scoring;

use serde::{Deserialize, Serialize};

/// Sustainability pillar used to group indicators and sub-scores.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Pillar {
	#[serde(rename = "E")]
	Environmental,
	#[serde(rename = "S")]
	Social,
	#[serde(rename = "G")]
	Governance,
}
impl Pillar {
	pub const ALL: [Pillar; 3] = [Pillar::Environmental, Pillar::Social, Pillar::Governance];

	pub fn code(&self) -> &'static str {
		match self {
			Pillar::Environmental => "E",
			Pillar::Social => "S",
			Pillar::Governance => "G",
		}
	}

	pub fn from_code(code: &str) -> Option<Self> {
		match code {
			"E" => Some(Pillar::Environmental),
			"S" => Some(Pillar::Social),
			"G" => Some(Pillar::Governance),
			_ => None,
		}
	}
}
