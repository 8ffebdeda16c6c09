//! Writes assembled unitigs as FASTA, one record per unitig.
//!

use crate::peakvar::assembly::AssemblyResult;
use crate::peakvar::peak::Peak;
use crate::utils::Result;
use std::fs::File;
use std::io::{BufWriter, Write};

const LINE_WIDTH: usize = 80;

pub struct FastaWriter {
    writer: BufWriter<File>,
}

impl FastaWriter {
    pub fn new(output_path: &str) -> Result<FastaWriter> {
        let file = File::create(output_path)
            .map_err(|e| format!("Invalid FASTA output path {}: {}", output_path, e))?;
        Ok(FastaWriter {
            writer: BufWriter::new(file),
        })
    }

    /// Writes every unitig of `peak`; regions without unitigs write nothing.
    pub fn write(&mut self, peak: &Peak, assembly: &AssemblyResult) -> Result<()> {
        for unitig in assembly.unitigs() {
            writeln!(
                self.writer,
                ">{}_unitig{} region={} len={}",
                peak.id,
                unitig.id,
                peak.region,
                unitig.seq.len()
            )
            .map_err(|e| e.to_string())?;
            for chunk in unitig.seq.chunks(LINE_WIDTH) {
                self.writer
                    .write_all(chunk)
                    .and_then(|_| self.writer.write_all(b"\n"))
                    .map_err(|e| e.to_string())?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::GenomicRegion;

    #[test]
    fn unitigs_are_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.fa");
        let path = path.to_str().unwrap();
        let peak = Peak {
            id: "peak7".to_string(),
            region: GenomicRegion::new("chr2", 10, 200).unwrap(),
            summit: 100,
        };
        let assembly = AssemblyResult::from_sequences(vec![vec![b'A'; 100], b"ACGT".to_vec()]);

        let mut writer = FastaWriter::new(path).unwrap();
        writer.write(&peak, &assembly).unwrap();
        writer.write(&peak, &AssemblyResult::NoAssembly).unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with(">peak7_unitig0 "));
        assert_eq!(lines[1].len(), 80);
        assert_eq!(lines[2].len(), 20);
        assert_eq!(lines[4], "ACGT");
    }
}
