//! Ranked result snapshots handed from the coordinator to the reader.

use std::cmp::Ordering;

/// One ranked item: its stable index in the store and its score for the
/// query the snapshot was built against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Match {
	pub index: u32,
	pub score: f32,
}

/// Ranking order shared by the workers, the merge and the published
/// snapshots: higher score first, ties broken by input order.
pub(crate) fn rank_cmp(a: &Match, b: &Match) -> Ordering {
	b.score
		.total_cmp(&a.score)
		.then_with(|| a.index.cmp(&b.index))
}

/// Immutable-to-the-reader record of one completed scoring pass.
#[derive(Default)]
pub struct Results {
	/// Matches sorted by [`rank_cmp`].
	pub matches: Vec<Match>,
	/// Committed item count the pass covered; every match index is below it.
	pub items_tick: u64,
	/// Query version the pass scored against.
	pub query_tick: u64,
	/// The query string itself, kept so highlights can be recomputed for
	/// exactly the ranking on display.
	pub query: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn higher_scores_rank_first() {
		let a = Match { index: 5, score: 0.9 };
		let b = Match { index: 1, score: 0.2 };
		assert_eq!(rank_cmp(&a, &b), Ordering::Less);
	}

	#[test]
	fn ties_prefer_input_order() {
		let a = Match { index: 2, score: 0.5 };
		let b = Match { index: 7, score: 0.5 };
		assert_eq!(rank_cmp(&a, &b), Ordering::Less);
		assert_eq!(rank_cmp(&b, &a), Ordering::Greater);
	}
}
