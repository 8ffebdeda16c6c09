mod evidence;

pub use evidence::{AlleleEvidence, Pileup, PositionEvidence};
