use crate::utils::Result;
use rust_htslib::bam::{self, Read};
use std::{collections::BTreeSet, path::Path};

pub fn get_bam_header(bam_path: &Path) -> Result<bam::Header> {
    let bam = bam::IndexedReader::from_path(bam_path)
        .map_err(|e| format!("Failed to create bam reader for {}: {}", bam_path.display(), e))?;
    Ok(bam::Header::from_template(bam.header()))
}

/// Mapped inputs carry `@SQ` lines; without them interval queries are impossible.
pub fn is_bam_mapped(bam_header: &bam::Header) -> bool {
    bam_header.to_hashmap().contains_key("SQ")
}

/// Contig names and lengths from the `@SQ` lines, in header order.
pub fn get_contigs(bam_header: &bam::Header) -> Vec<(String, u64)> {
    let header_hashmap = bam_header.to_hashmap();
    header_hashmap
        .get("SQ")
        .map(|records| {
            records
                .iter()
                .filter_map(|rec| {
                    let name = rec.get("SN")?;
                    let len = rec.get("LN")?.parse().ok()?;
                    Some((name.to_owned(), len))
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn get_sample_name(reads_path: &Path, bam_header: &bam::Header) -> Result<String> {
    let header_hashmap = bam_header.to_hashmap();
    let sample_names: BTreeSet<String> = header_hashmap
        .get("RG")
        .into_iter()
        .flatten()
        .filter_map(|rg_field| rg_field.get("SM").cloned())
        .collect();

    match sample_names.len() {
        1 => {
            if let Some(name) = sample_names.into_iter().next() {
                return Ok(name);
            }
        }
        0 => log::warn!("No sample names found in {}", reads_path.display()),
        _ => log::warn!("Multiple sample names found in {}", reads_path.display()),
    };

    let sample = reads_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or("Invalid reads file name")?
        .to_string();

    Ok(sample)
}
