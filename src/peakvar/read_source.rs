use super::reads::{RawRecord, Sample};
use crate::utils::{GenomicRegion, Result};
use rust_htslib::bam::{self, Read as BamRead, Record};
use std::collections::HashMap;
use std::path::Path;

/// Source of alignment records supporting interval queries.
pub trait ReadSource {
    fn sample(&self) -> Sample;

    /// Calls `visit` on every primary, mapped record overlapping `region`.
    fn visit_region(
        &mut self,
        region: &GenomicRegion,
        visit: &mut dyn FnMut(RawRecord),
    ) -> Result<()>;
}

/// Indexed BAM/CRAM file.
pub struct BamReadSource {
    reader: bam::IndexedReader,
    sample: Sample,
}

impl BamReadSource {
    pub fn from_path(path: &Path, sample: Sample) -> Result<BamReadSource> {
        let reader = bam::IndexedReader::from_path(path)
            .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;
        Ok(BamReadSource { reader, sample })
    }
}

fn is_collectable(record: &Record) -> bool {
    !(record.is_unmapped()
        || record.is_secondary()
        || record.is_supplementary()
        || record.is_duplicate()
        || record.is_quality_check_failed())
}

impl ReadSource for BamReadSource {
    fn sample(&self) -> Sample {
        self.sample
    }

    fn visit_region(
        &mut self,
        region: &GenomicRegion,
        visit: &mut dyn FnMut(RawRecord),
    ) -> Result<()> {
        let fetch_region = (region.contig.as_str(), region.start as i64, region.end as i64);
        if let Err(msg) = self.reader.fetch(fetch_region) {
            log::warn!("{}: Fetch error: {}", region, msg);
            return Ok(());
        }

        let mut record = Record::new();
        while let Some(result) = self.reader.read(&mut record) {
            result.map_err(|e| e.to_string())?;
            if is_collectable(&record) {
                visit(RawRecord::from_hts_rec(&record, self.sample));
            }
        }
        Ok(())
    }
}

/// Records held in memory, keyed by contig.
#[derive(Debug, Clone)]
pub struct MemoryReadSource {
    sample: Sample,
    records: HashMap<String, Vec<RawRecord>>,
}

impl MemoryReadSource {
    pub fn new(sample: Sample) -> Self {
        MemoryReadSource {
            sample,
            records: HashMap::new(),
        }
    }

    pub fn push(&mut self, contig: &str, record: RawRecord) {
        self.records
            .entry(contig.to_string())
            .or_default()
            .push(record);
    }
}

impl ReadSource for MemoryReadSource {
    fn sample(&self) -> Sample {
        self.sample
    }

    fn visit_region(
        &mut self,
        region: &GenomicRegion,
        visit: &mut dyn FnMut(RawRecord),
    ) -> Result<()> {
        if let Some(records) = self.records.get(&region.contig) {
            records
                .iter()
                .filter(|record| record.ref_start < region.end as i64)
                .for_each(|record| {
                    visit(RawRecord {
                        sample: self.sample,
                        ..record.clone()
                    })
                });
        }
        Ok(())
    }
}
