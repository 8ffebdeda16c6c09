mod cigar;
mod collection;
mod read;

pub use cigar::{parse_cigar_string, push_op, Cigar, CigarOp, CigarOpExt};
pub use collection::{AddOutcome, RegionReadCollection};
pub use read::{Allele, Observation, RawRecord, Read, Sample};
