pub mod assembly;
pub mod error;
pub mod genotype;
pub mod peak;
pub mod pileup;
pub mod read_source;
pub mod reads;
pub mod realign;
pub mod reference;
pub mod workflows;
pub mod writers;
