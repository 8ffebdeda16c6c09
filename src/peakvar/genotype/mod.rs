mod decision;
mod likelihood;
mod variant;

pub use decision::{FilterParams, VariantDecision};
pub use likelihood::{
    diploid_genotypes, AlleleBalance, GenotypeLikelihoods, LikelihoodEngine, LikelihoodParams, MAX_QUAL,
};
pub use variant::{Filter, Genotype, Variant};
