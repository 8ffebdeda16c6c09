//! Local assembly of a region's reads into candidate haplotype sequences.

mod debruijn;

pub use debruijn::{AssemblyParams, DeBruijnAssembler};

/// Assembler contract: read sequences in, consensus sequences out.
///
/// An `Err` is an assembly failure; an empty vector is a valid outcome.
pub trait Assembler: Sync {
    fn assemble(&self, seqs: &[&[u8]]) -> Result<Vec<Vec<u8>>, String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unitig {
    pub id: usize,
    pub seq: Vec<u8>,
}

/// Assembly outcome for a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyResult {
    NoAssembly,
    SingleUnitig(Unitig),
    MultiUnitig(Vec<Unitig>),
}

impl AssemblyResult {
    /// Numbers the sequences in the order given, dropping exact duplicates.
    pub fn from_sequences(seqs: Vec<Vec<u8>>) -> AssemblyResult {
        let mut unitigs: Vec<Unitig> = Vec::with_capacity(seqs.len());
        for seq in seqs {
            if seq.is_empty() || unitigs.iter().any(|u| u.seq == seq) {
                continue;
            }
            unitigs.push(Unitig {
                id: unitigs.len(),
                seq,
            });
        }
        match unitigs.len() {
            0 => AssemblyResult::NoAssembly,
            1 => AssemblyResult::SingleUnitig(unitigs.remove(0)),
            _ => AssemblyResult::MultiUnitig(unitigs),
        }
    }

    pub fn unitigs(&self) -> &[Unitig] {
        match self {
            AssemblyResult::NoAssembly => &[],
            AssemblyResult::SingleUnitig(unitig) => std::slice::from_ref(unitig),
            AssemblyResult::MultiUnitig(unitigs) => unitigs,
        }
    }

    pub fn len(&self) -> usize {
        self.unitigs().len()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, AssemblyResult::NoAssembly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_follow_unitig_count() {
        assert_eq!(
            AssemblyResult::from_sequences(vec![]),
            AssemblyResult::NoAssembly
        );
        let single = AssemblyResult::from_sequences(vec![b"ACGT".to_vec(), b"ACGT".to_vec()]);
        assert!(matches!(single, AssemblyResult::SingleUnitig(ref u) if u.id == 0));
        let multi = AssemblyResult::from_sequences(vec![b"ACGT".to_vec(), b"ACGA".to_vec()]);
        assert_eq!(multi.len(), 2);
        assert_eq!(multi.unitigs()[1].id, 1);
    }
}
