use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Pillar;

/// Relative weights combining the three pillar scores into the overall score.
/// Only ratios matter; equal weights yield equal thirds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PillarWeights {
	pub environmental: f64,
	pub social: f64,
	pub governance: f64,
}
impl PillarWeights {
	pub fn get(&self, pillar: Pillar) -> f64 {
		match pillar {
			Pillar::Environmental => self.environmental,
			Pillar::Social => self.social,
			Pillar::Governance => self.governance,
		}
	}
}
impl Default for PillarWeights {
	fn default() -> Self {
		Self { environmental: 1.0, social: 1.0, governance: 1.0 }
	}
}

/// One indicator's contribution to a document score, kept for breakdown transparency.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contribution {
	pub code: String,
	pub pillar: Pillar,
	pub weight: f64,
	pub value_numeric: f64,
	pub normalized: f64,
	pub citations: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PillarScores {
	pub environmental: Option<f64>,
	pub social: Option<f64>,
	pub governance: Option<f64>,
}
impl PillarScores {
	pub fn get(&self, pillar: Pillar) -> Option<f64> {
		match pillar {
			Pillar::Environmental => self.environmental,
			Pillar::Social => self.social,
			Pillar::Governance => self.governance,
		}
	}
}

/// Everything the dashboard needs to explain a score: the weights in effect,
/// each contributing indicator with its citations, and the exclusion list.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoreBreakdown {
	pub pillar_weights: PillarWeights,
	pub pillar_scores: PillarScores,
	pub contributions: Vec<Contribution>,
	pub missing: Vec<String>,
}

/// Maps a raw indicator value onto the 0-100 scale used by pillar scores.
pub fn normalize(value: f64, scale_max: f64) -> f64 {
	if !value.is_finite() || !scale_max.is_finite() || scale_max <= 0.0 {
		return 0.0;
	}

	(value / scale_max * 100.0).clamp(0.0, 100.0)
}

/// Weighted average of one pillar's contributions. Dividing by the sum of
/// present weights redistributes missing indicators' weight proportionally
/// instead of counting them as zero.
pub fn pillar_score(contributions: &[Contribution], pillar: Pillar) -> Option<f64> {
	let mut weighted = 0.0;
	let mut total_weight = 0.0;

	for contribution in contributions.iter().filter(|c| c.pillar == pillar) {
		if contribution.weight <= 0.0 {
			continue;
		}

		weighted += contribution.weight * contribution.normalized;
		total_weight += contribution.weight;
	}

	if total_weight <= 0.0 {
		return None;
	}

	Some(weighted / total_weight)
}

pub fn all_pillar_scores(contributions: &[Contribution]) -> PillarScores {
	PillarScores {
		environmental: pillar_score(contributions, Pillar::Environmental),
		social: pillar_score(contributions, Pillar::Social),
		governance: pillar_score(contributions, Pillar::Governance),
	}
}

/// Weighted combination of the present pillar scores. A pillar without any
/// contribution is excluded and its weight redistributed among the rest.
pub fn overall_score(scores: &PillarScores, weights: &PillarWeights) -> Option<f64> {
	let mut weighted = 0.0;
	let mut total_weight = 0.0;

	for pillar in Pillar::ALL {
		let Some(score) = scores.get(pillar) else {
			continue;
		};
		let weight = weights.get(pillar);

		if weight <= 0.0 {
			continue;
		}

		weighted += weight * score;
		total_weight += weight;
	}

	if total_weight <= 0.0 {
		return None;
	}

	Some(weighted / total_weight)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn contribution(code: &str, pillar: Pillar, weight: f64, normalized: f64) -> Contribution {
		Contribution {
			code: code.to_string(),
			pillar,
			weight,
			value_numeric: normalized,
			normalized,
			citations: Value::Array(Vec::new()),
		}
	}

	#[test]
	fn equal_pillar_weights_average_pillar_scores() {
		let scores =
			PillarScores { environmental: Some(80.0), social: Some(60.0), governance: Some(70.0) };
		let overall = overall_score(&scores, &PillarWeights::default()).unwrap();

		assert!((overall - 70.0).abs() < 1e-9);
	}

	#[test]
	fn missing_indicator_weight_is_redistributed() {
		// Weight 0.2 is absent; the 0.5/0.3 split must be renormalized over 0.8,
		// not diluted as if the missing indicator scored zero.
		let contributions = vec![
			contribution("E1", Pillar::Environmental, 0.5, 90.0),
			contribution("E2", Pillar::Environmental, 0.3, 50.0),
		];
		let score = pillar_score(&contributions, Pillar::Environmental).unwrap();
		let expected = (0.5 * 90.0 + 0.3 * 50.0) / 0.8;

		assert!((score - expected).abs() < 1e-9);
		assert!(score > (0.5 * 90.0 + 0.3 * 50.0));
	}

	#[test]
	fn empty_pillar_is_excluded_from_overall() {
		let scores = PillarScores { environmental: Some(80.0), social: None, governance: Some(40.0) };
		let overall = overall_score(&scores, &PillarWeights::default()).unwrap();

		assert!((overall - 60.0).abs() < 1e-9);
	}

	#[test]
	fn no_contributions_yield_no_score() {
		assert_eq!(pillar_score(&[], Pillar::Social), None);

		let scores = PillarScores { environmental: None, social: None, governance: None };

		assert_eq!(overall_score(&scores, &PillarWeights::default()), None);
	}

	#[test]
	fn normalization_clamps_to_scale() {
		assert_eq!(normalize(50.0, 100.0), 50.0);
		assert_eq!(normalize(250.0, 100.0), 100.0);
		assert_eq!(normalize(-3.0, 100.0), 0.0);
		assert_eq!(normalize(1.0, 0.0), 0.0);
		assert_eq!(normalize(f64::NAN, 100.0), 0.0);
	}
}
