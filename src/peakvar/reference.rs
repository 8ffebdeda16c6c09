use super::error::RegionError;
use crate::utils::{normalize_bases, open_genome_reader, GenomicRegion, Result};
use rust_htslib::faidx;
use std::collections::HashMap;
use std::path::Path;

/// Read-only access to reference sequences.
pub trait ReferenceSource {
    fn contig_len(&self, contig: &str) -> Option<u64>;

    /// Bases of `contig` over the half-open interval `[start, end)`.
    fn fetch(&self, contig: &str, start: u64, end: u64) -> Result<Vec<u8>>;
}

/// Reference slice covering a region and its flanks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceWindow {
    pub contig: String,
    pub start: i64,
    pub seq: Vec<u8>,
}

impl ReferenceWindow {
    /// Fetches `region` extended by `flank` on both sides, clamped to the contig.
    pub fn fetch(
        source: &dyn ReferenceSource,
        region: &GenomicRegion,
        flank: u32,
    ) -> std::result::Result<ReferenceWindow, RegionError> {
        let failure = |reason: String| RegionError::Reference {
            region: region.to_string(),
            reason,
        };
        let contig_len = source
            .contig_len(&region.contig)
            .ok_or_else(|| failure("contig missing from reference".to_string()))?;
        if region.end as u64 > contig_len {
            return Err(failure(format!(
                "region ends past the contig length {}",
                contig_len
            )));
        }

        let start = region.start.saturating_sub(flank) as u64;
        let end = (region.end as u64 + flank as u64).min(contig_len);
        let seq = source.fetch(&region.contig, start, end).map_err(failure)?;
        if seq.len() as u64 != end - start {
            return Err(failure(format!(
                "expected {} bases, fetched {}",
                end - start,
                seq.len()
            )));
        }
        Ok(ReferenceWindow {
            contig: region.contig.clone(),
            start: start as i64,
            seq,
        })
    }

    pub fn end(&self) -> i64 {
        self.start + self.seq.len() as i64
    }

    pub fn base_at(&self, pos: i64) -> Option<u8> {
        if pos < self.start {
            return None;
        }
        self.seq.get((pos - self.start) as usize).copied()
    }
}

/// Indexed FASTA reference.
pub struct FaidxReference {
    reader: faidx::Reader,
    lengths: HashMap<String, u64>,
}

impl FaidxReference {
    pub fn from_path(path: &Path) -> Result<FaidxReference> {
        let reader = open_genome_reader(path)?;
        let num_seqs = reader.n_seqs() as usize;
        let mut lengths = HashMap::with_capacity(num_seqs);
        for i in 0..num_seqs {
            let name = reader.seq_name(i as i32).map_err(|e| e.to_string())?;
            let len = reader.fetch_seq_len(&name);
            let len = u64::try_from(len)
                .map_err(|_| format!("Invalid sequence length for '{}'", name))?;
            lengths.insert(name, len);
        }
        Ok(FaidxReference { reader, lengths })
    }
}

impl ReferenceSource for FaidxReference {
    fn contig_len(&self, contig: &str) -> Option<u64> {
        self.lengths.get(contig).copied()
    }

    fn fetch(&self, contig: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        if end <= start {
            return Ok(Vec::new());
        }
        let seq = self
            .reader
            .fetch_seq_string(contig, start as usize, end as usize - 1)
            .map_err(|e| {
                format!(
                    "Error fetching sequence for region {}:{}-{}: {}",
                    contig, start, end, e
                )
            })?;
        Ok(normalize_bases(seq.as_bytes()))
    }
}

/// Reference held in memory, keyed by contig name.
#[derive(Debug, Clone, Default)]
pub struct MemoryReference {
    contigs: HashMap<String, Vec<u8>>,
}

impl MemoryReference {
    pub fn new() -> Self {
        MemoryReference::default()
    }

    pub fn with_contig(mut self, name: &str, seq: &[u8]) -> Self {
        self.contigs.insert(name.to_string(), normalize_bases(seq));
        self
    }
}

impl ReferenceSource for MemoryReference {
    fn contig_len(&self, contig: &str) -> Option<u64> {
        self.contigs.get(contig).map(|seq| seq.len() as u64)
    }

    fn fetch(&self, contig: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let seq = self
            .contigs
            .get(contig)
            .ok_or_else(|| format!("Unknown contig {}", contig))?;
        seq.get(start as usize..end as usize)
            .map(|s| s.to_vec())
            .ok_or_else(|| format!("Interval {}:{}-{} out of bounds", contig, start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_clamped_to_contig() {
        let reference = MemoryReference::new().with_contig("chr1", b"acgtACGTNNACGTacgt");
        let region = GenomicRegion::new("chr1", 2, 16).unwrap();
        let window = ReferenceWindow::fetch(&reference, &region, 5).unwrap();
        assert_eq!(window.start, 0);
        assert_eq!(window.end(), 18);
        assert_eq!(window.base_at(0), Some(b'A'));
        assert_eq!(window.base_at(18), None);
        assert_eq!(window.base_at(-1), None);
    }

    #[test]
    fn missing_contig_is_a_reference_error() {
        let reference = MemoryReference::new().with_contig("chr1", b"ACGT");
        let region = GenomicRegion::new("chr2", 0, 2).unwrap();
        let err = ReferenceWindow::fetch(&reference, &region, 0).unwrap_err();
        assert!(matches!(err, RegionError::Reference { .. }));

        let region = GenomicRegion::new("chr1", 0, 10).unwrap();
        assert!(ReferenceWindow::fetch(&reference, &region, 0).is_err());
    }
}
