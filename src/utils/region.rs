use crate::utils::Result;
use std::fmt;

/// Zero-based, half-open genomic interval.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GenomicRegion {
    pub contig: String,
    pub start: u32,
    pub end: u32,
}

impl GenomicRegion {
    pub fn new(contig: impl Into<String>, start: u32, end: u32) -> Result<Self> {
        if start >= end {
            return Err(format!("Invalid region: start {} >= end {}", start, end));
        }

        Ok(Self {
            contig: contig.into(),
            start,
            end,
        })
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, position: i64) -> bool {
        position >= self.start as i64 && position < self.end as i64
    }

    /// Number of bases shared with the half-open span `[start, end)`.
    pub fn overlap(&self, start: i64, end: i64) -> i64 {
        let lo = start.max(self.start as i64);
        let hi = end.min(self.end as i64);
        (hi - lo).max(0)
    }
}

impl fmt::Display for GenomicRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::GenomicRegion;

    #[test]
    fn empty_or_inverted_regions_are_rejected() {
        assert_eq!(
            GenomicRegion::new("chr1", 200, 100),
            Err("Invalid region: start 200 >= end 100".to_string())
        );
        assert!(GenomicRegion::new("chr1", 100, 100).is_err());
        assert_eq!(
            GenomicRegion::new("chr1", 100, 200).unwrap().to_string(),
            "chr1:100-200"
        );
    }

    #[test]
    fn overlap_is_clamped_to_zero() {
        let region = GenomicRegion::new("chr1", 100, 200).unwrap();
        assert_eq!(region.overlap(50, 100), 0);
        assert_eq!(region.overlap(50, 101), 1);
        assert_eq!(region.overlap(150, 400), 50);
        assert_eq!(region.overlap(300, 400), 0);
        assert!(region.contains(100));
        assert!(!region.contains(200));
    }
}
