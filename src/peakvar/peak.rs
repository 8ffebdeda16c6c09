use crate::utils::{open_peaks_reader, GenomicRegion, Result};
use std::io::BufRead;
use std::path::Path;

/// Target interval with the position of maximal enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peak {
    pub id: String,
    pub region: GenomicRegion,
    pub summit: u32,
}

impl Peak {
    /// Parses a BED (3+ columns) or narrowPeak (10 columns) line.
    ///
    /// The summit is taken from the narrowPeak summit offset when present and
    /// non-negative, otherwise it is the interval midpoint.
    pub fn from_line(line: &str) -> Result<Peak> {
        let fields = line.split_whitespace().collect::<Vec<_>>();
        if fields.len() < 3 {
            return Err(format!(
                "Expected at least 3 fields in the format 'chrom start end', found {}: {}",
                fields.len(),
                line
            ));
        }

        let parse_coord = |value: &str| {
            value
                .parse::<u32>()
                .map_err(|_| format!("Invalid coordinate '{}': {}", value, line))
        };
        let region = GenomicRegion::new(fields[0], parse_coord(fields[1])?, parse_coord(fields[2])?)?;

        let midpoint = region.start + region.len() / 2;
        let summit = match fields.get(9) {
            Some(offset) => {
                let offset: i64 = offset
                    .parse()
                    .map_err(|_| format!("Invalid summit offset '{}': {}", offset, line))?;
                if offset < 0 {
                    midpoint
                } else if offset >= region.len() as i64 {
                    return Err(format!("Summit offset {} lies outside the peak: {}", offset, line));
                } else {
                    region.start + offset as u32
                }
            }
            None => midpoint,
        };

        let id = match fields.get(3) {
            Some(name) if *name != "." => name.to_string(),
            _ => region.to_string(),
        };

        Ok(Peak { id, region, summit })
    }

    /// Distance from `pos` to the summit.
    pub fn summit_distance(&self, pos: i64) -> u32 {
        (pos - self.summit as i64).unsigned_abs() as u32
    }
}

fn is_header(line: &str) -> bool {
    line.is_empty() || line.starts_with('#') || line.starts_with("track") || line.starts_with("browser")
}

/// Loads all peaks of a BED or narrowPeak file, keeping file order.
pub fn load_peaks(path: &Path) -> Result<Vec<Peak>> {
    let reader = open_peaks_reader(path)?;
    let mut peaks = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("Error at peak line {}: {}", line_number + 1, e))?;
        if is_header(line.trim_end()) {
            continue;
        }
        let peak = Peak::from_line(line.trim_end())
            .map_err(|e| format!("Error at peak line {}: {}", line_number + 1, e))?;
        peaks.push(peak);
    }
    log::debug!("Loaded {} peaks from {}", peaks.len(), path.display());
    Ok(peaks)
}
