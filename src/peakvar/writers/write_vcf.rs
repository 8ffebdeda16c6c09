//! Defines the `VcfWriter` struct for writing variant calls to a VCF file.
//!

use crate::peakvar::genotype::{Filter, Variant};
use crate::utils::Result;
use itertools::Itertools;
use rust_htslib::bcf::{self, record::GenotypeAllele, Format, Record};
use std::env;

/// Header lines defining the INFO and FORMAT fields for the VCF file.
const VCF_LINES: [&str; 15] = [
    r#"##INFO=<ID=DP,Number=1,Type=Integer,Description="Total depth of reads supporting any allele">"#,
    r#"##INFO=<ID=AD,Number=R,Type=Integer,Description="Depth per allele, reference first">"#,
    r#"##INFO=<ID=SB,Number=1,Type=Float,Description="Phred-scaled Fisher exact test p-value for strand bias">"#,
    r#"##INFO=<ID=QRS,Number=1,Type=Float,Description="Rank-sum Z-score of alternate versus reference base qualities">"#,
    r#"##INFO=<ID=SUMMITD,Number=1,Type=Integer,Description="Distance to the peak summit">"#,
    r#"##INFO=<ID=DPT,Number=1,Type=Integer,Description="Depth in the treatment sample">"#,
    r#"##INFO=<ID=DPC,Number=1,Type=Integer,Description="Depth in the control sample">"#,
    r#"##INFO=<ID=ASB,Number=0,Type=Flag,Description="Heterozygous call with allele-specific binding in the treatment">"#,
    r#"##INFO=<ID=AFT,Number=1,Type=Float,Description="Treatment fraction of the second genotype allele">"#,
    r#"##INFO=<ID=AFC,Number=1,Type=Float,Description="Control fraction of the second genotype allele">"#,
    r#"##INFO=<ID=DBIC,Number=1,Type=Float,Description="BIC of the balanced model minus BIC of the allele-specific model">"#,
    r#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#,
    r#"##FORMAT=<ID=GQ,Number=1,Type=Integer,Description="Genotype quality">"#,
    r#"##FORMAT=<ID=DP,Number=1,Type=Integer,Description="Read depth">"#,
    r#"##FORMAT=<ID=AD,Number=R,Type=Integer,Description="Depth per allele, reference first">"#,
];

/// Structure for writing VCF records from variant calls.
pub struct VcfWriter {
    writer: bcf::Writer,
}

impl VcfWriter {
    /// Constructs a new `VcfWriter` instance.
    ///
    /// # Arguments
    /// * `output_path` - Path of the output VCF file.
    /// * `sample_name` - The name of the sample to be written to the VCF file.
    /// * `contigs` - Contig names and lengths for the header.
    pub fn new(output_path: &str, sample_name: &str, contigs: &[(String, u64)]) -> Result<VcfWriter> {
        let mut vcf_header = bcf::header::Header::new();

        for filter in Filter::ALL {
            let line = format!(
                r#"##FILTER=<ID={},Description="{}">"#,
                filter.id(),
                filter.description()
            );
            vcf_header.push_record(line.as_bytes());
        }

        for line in VCF_LINES.iter() {
            vcf_header.push_record(line.as_bytes());
        }

        for (name, len) in contigs {
            let contig_line = format!(r#"##contig=<ID={},length={}>"#, name, len);
            vcf_header.push_record(contig_line.as_bytes());
        }

        let line = format!(
            "##{}Version={}",
            env!("CARGO_PKG_NAME"),
            *crate::cli::FULL_VERSION
        );
        vcf_header.push_record(line.as_bytes());

        let args: Vec<String> = env::args().collect();
        let command_line = args.join(" ");
        let line = format!("##{}Command={}", env!("CARGO_PKG_NAME"), command_line);
        vcf_header.push_record(line.as_bytes());

        vcf_header.push_sample(sample_name.as_bytes());

        let format = if output_path.ends_with(".bcf") {
            Format::Bcf
        } else {
            Format::Vcf
        };
        let uncompressed = !(output_path.ends_with(".gz") || output_path.ends_with(".bcf"));
        let writer = bcf::Writer::from_path(output_path, &vcf_header, uncompressed, format)
            .map_err(|_| format!("Invalid VCF output path: {}", output_path))?;

        Ok(VcfWriter { writer })
    }

    /// Writes the calls of one region.
    pub fn write_all(&mut self, variants: &[Variant]) -> Result<()> {
        for variant in variants {
            self.write(variant)?;
        }
        Ok(())
    }

    pub fn write(&mut self, variant: &Variant) -> Result<()> {
        let mut record = self.writer.empty_record();
        self.add_site_info(variant, &mut record)?;
        Self::add_info_fields(variant, &mut record)?;
        Self::add_sample_fields(variant, &mut record)?;
        self.writer
            .write(&record)
            .map_err(|e| format!("Failed to write record at {}:{}: {}", variant.contig, variant.pos + 1, e))
    }

    fn add_site_info(&self, variant: &Variant, record: &mut Record) -> Result<()> {
        let rid = self
            .writer
            .header()
            .name2rid(variant.contig.as_bytes())
            .map_err(|_| format!("Contig {} missing from VCF header", variant.contig))?;
        record.set_rid(Some(rid));

        let (pos, alleles) = variant.vcf_alleles();
        record.set_pos(pos);
        let encoding = alleles.iter().map(|a| &a[..]).collect_vec();
        record.set_alleles(&encoding).map_err(|e| e.to_string())?;
        record.set_qual(variant.quality as f32);

        if variant.is_pass() {
            record
                .push_filter("PASS".as_bytes())
                .map_err(|e| e.to_string())?;
        }
        for filter in &variant.filters {
            record
                .push_filter(filter.id().as_bytes())
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    fn add_info_fields(variant: &Variant, record: &mut Record) -> Result<()> {
        let allele_depths = Self::encode_depths(&variant.allele_depths);
        record
            .push_info_integer(b"DP", &[variant.depth as i32])
            .and_then(|_| record.push_info_integer(b"AD", &allele_depths))
            .and_then(|_| record.push_info_float(b"SB", &[variant.strand_bias as f32]))
            .and_then(|_| {
                record.push_info_integer(b"SUMMITD", &[variant.summit_distance as i32])
            })
            .and_then(|_| record.push_info_integer(b"DPT", &[variant.treatment_depth as i32]))
            .and_then(|_| record.push_info_integer(b"DPC", &[variant.control_depth as i32]))
            .map_err(|e| e.to_string())?;
        if let Some(rank_sum) = variant.rank_sum {
            record
                .push_info_float(b"QRS", &[rank_sum as f32])
                .map_err(|e| e.to_string())?;
        }
        if let Some(balance) = &variant.allele_balance {
            record
                .push_info_float(b"AFT", &[balance.treatment_fraction as f32])
                .and_then(|_| record.push_info_float(b"DBIC", &[balance.delta_bic as f32]))
                .map_err(|e| e.to_string())?;
            if let Some(fraction) = balance.control_fraction {
                record
                    .push_info_float(b"AFC", &[fraction as f32])
                    .map_err(|e| e.to_string())?;
            }
            if balance.allele_specific {
                record.push_info_flag(b"ASB").map_err(|e| e.to_string())?;
            }
        }
        Ok(())
    }

    fn add_sample_fields(variant: &Variant, record: &mut Record) -> Result<()> {
        let genotype = variant
            .genotype
            .iter()
            .map(|&allele| GenotypeAllele::Unphased(allele as i32))
            .collect_vec();
        record
            .push_genotypes(&genotype)
            .and_then(|_| record.push_format_integer(b"GQ", &[variant.genotype_quality()]))
            .and_then(|_| record.push_format_integer(b"DP", &[variant.depth as i32]))
            .and_then(|_| {
                record.push_format_integer(b"AD", &Self::encode_depths(&variant.allele_depths))
            })
            .map_err(|e| e.to_string())
    }

    fn encode_depths(depths: &[u32]) -> Vec<i32> {
        depths.iter().map(|&d| d as i32).collect()
    }
}
