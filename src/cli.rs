use crate::utils::{AlnScoring, GenotypePrior, Result, SummitDiscount, TieBreak};
use chrono::Datelike;
use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use env_logger::fmt::Color;
use log::{Level, LevelFilter};
use once_cell::sync::Lazy;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

pub static FULL_VERSION: Lazy<String> = Lazy::new(|| {
    format!(
        "{}-{}",
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    )
});

#[derive(Parser)]
#[command(name="peakvar",
          version=&**FULL_VERSION,
          about="Local-assembly variant caller for enrichment assays",
          long_about = None,
          disable_help_subcommand = true,
          after_help = format!("Copyright (C) {}. This program comes with ABSOLUTELY NO WARRANTY.", chrono::Utc::now().year()),
          help_template = "{name} {version}\n{about-section}\n{usage-heading}\n    {usage}\n\n{all-args}{after-help}",
          )]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = ArgAction::Count, help = "Specify multiple times to increase verbosity level (e.g., -vv for more verbosity)")]
    pub verbosity: u8,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Call variants within peaks")]
    Call(CallArgs),
    #[clap(about = "Assemble reads within peaks into unitigs")]
    Assemble(AssembleArgs),
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("call")))]
#[command(arg_required_else_help(true))]
pub struct CallArgs {
    #[clap(required = true)]
    #[clap(short = 'g')]
    #[clap(long = "genome")]
    #[clap(help = "Path to reference genome FASTA")]
    #[clap(value_name = "FASTA")]
    #[arg(value_parser = check_file_exists)]
    pub genome_path: PathBuf,

    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reads")]
    #[clap(help = "BAM file with aligned treatment reads")]
    #[clap(value_name = "READS")]
    #[arg(value_parser = check_file_exists)]
    pub reads_path: PathBuf,

    #[clap(short = 'c')]
    #[clap(long = "control")]
    #[clap(help = "BAM file with aligned control reads")]
    #[clap(value_name = "CONTROL")]
    #[arg(value_parser = check_file_exists)]
    pub control_path: Option<PathBuf>,

    #[clap(required = true)]
    #[clap(short = 'b')]
    #[clap(long = "peaks")]
    #[clap(help = "BED or narrowPeak file with peak coordinates")]
    #[clap(value_name = "PEAKS")]
    #[arg(value_parser = check_file_exists)]
    pub peaks_path: PathBuf,

    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output-prefix")]
    #[clap(help = "Prefix for output files")]
    #[clap(value_name = "OUTPUT_PREFIX")]
    #[arg(value_parser = check_prefix_path)]
    pub output_prefix: String,

    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(help = "Number of threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    #[arg(value_parser = threads_in_range)]
    pub num_threads: usize,

    #[clap(long = "write-unitigs")]
    #[clap(help = "Also write the assembled unitigs to <OUTPUT_PREFIX>.unitigs.fa")]
    pub write_unitigs: bool,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "sample-name")]
    #[clap(value_name = "SAMPLE_NAME")]
    #[clap(help = "Sample name")]
    #[clap(default_value = None)]
    #[arg(value_parser = check_sample_name_nonempty)]
    pub sample_name: Option<String>,

    #[command(flatten)]
    pub collection: CollectionArgs,

    #[command(flatten)]
    pub assembly: AssemblyArgs,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "aln-scoring")]
    #[clap(value_name = "SCORING")]
    #[clap(help = "Local alignment scoring (non-negative values): MATCH,MISM,GAPO,GAPE")]
    #[clap(default_value = "2,3,5,2")]
    #[arg(value_parser = scoring_from_string)]
    pub aln_scoring: AlnScoring,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "tie-break")]
    #[clap(value_name = "POLICY")]
    #[clap(help = "Ordering of equal-score alignments (indels or leftmost)")]
    #[clap(default_value = "indels")]
    pub tie_break: TieBreak,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "min-unitig-identity")]
    #[clap(value_name = "PERC")]
    #[clap(help = "Minimum identity of a unitig to the reference")]
    #[clap(default_value = "0.8")]
    #[arg(value_parser = ensure_unit_float)]
    pub min_unitig_identity: f64,

    #[clap(help_heading("Realignment"))]
    #[clap(long = "min-read-identity")]
    #[clap(value_name = "PERC")]
    #[clap(help = "Minimum identity of a read to its best unitig")]
    #[clap(default_value = "0.9")]
    #[arg(value_parser = ensure_unit_float)]
    pub min_read_identity: f64,

    #[clap(help_heading("Genotyping"))]
    #[clap(long = "prior")]
    #[clap(value_name = "PRIOR")]
    #[clap(help = "Genotype prior (flat or population[:THETA])")]
    #[clap(default_value = "flat")]
    pub prior: GenotypePrior,

    #[clap(help_heading("Genotyping"))]
    #[clap(long = "summit-discount")]
    #[clap(value_name = "DISCOUNT")]
    #[clap(help = "Evidence discount by summit distance (none, linear:HALF_WIDTH or exp:SCALE)")]
    #[clap(default_value = "none")]
    pub summit_discount: SummitDiscount,

    #[clap(help_heading("Genotyping"))]
    #[clap(long = "min-base-qual")]
    #[clap(value_name = "QUAL")]
    #[clap(help = "Minimum base quality for a base to count as evidence")]
    #[clap(default_value = "13")]
    pub min_base_qual: u8,

    #[clap(help_heading("Genotyping"))]
    #[clap(long = "min-asb-dbic")]
    #[clap(value_name = "DBIC")]
    #[clap(help = "BIC difference above which a heterozygous call is flagged as allele-specific")]
    #[clap(default_value = "10.0")]
    pub min_asb_delta_bic: f64,

    #[clap(help_heading("Filtering"))]
    #[clap(long = "min-alt-count")]
    #[clap(value_name = "COUNT")]
    #[clap(help = "Minimum number of reads supporting an alternate allele")]
    #[clap(default_value = "2")]
    pub min_alt_count: u32,

    #[clap(help_heading("Filtering"))]
    #[clap(long = "min-depth")]
    #[clap(value_name = "DEPTH")]
    #[clap(help = "Minimum read depth of a passing call")]
    #[clap(default_value = "5")]
    pub min_depth: u32,

    #[clap(help_heading("Filtering"))]
    #[clap(long = "min-quality")]
    #[clap(value_name = "QUAL")]
    #[clap(help = "Minimum variant quality of a passing call")]
    #[clap(default_value = "10")]
    pub min_quality: f64,

    #[clap(help_heading("Filtering"))]
    #[clap(long = "max-strand-bias")]
    #[clap(value_name = "PHRED")]
    #[clap(help = "Maximum Phred-scaled strand bias of a passing call")]
    #[clap(default_value = "60")]
    pub max_strand_bias: f64,

    #[clap(help_heading("Filtering"))]
    #[clap(long = "max-summit-dist")]
    #[clap(value_name = "DIST")]
    #[clap(help = "Maximum distance to the peak summit of a passing call")]
    pub max_summit_dist: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("assemble")))]
#[command(arg_required_else_help(true))]
pub struct AssembleArgs {
    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reads")]
    #[clap(help = "BAM file with aligned treatment reads")]
    #[clap(value_name = "READS")]
    #[arg(value_parser = check_file_exists)]
    pub reads_path: PathBuf,

    #[clap(short = 'c')]
    #[clap(long = "control")]
    #[clap(help = "BAM file with aligned control reads")]
    #[clap(value_name = "CONTROL")]
    #[arg(value_parser = check_file_exists)]
    pub control_path: Option<PathBuf>,

    #[clap(required = true)]
    #[clap(short = 'b')]
    #[clap(long = "peaks")]
    #[clap(help = "BED or narrowPeak file with peak coordinates")]
    #[clap(value_name = "PEAKS")]
    #[arg(value_parser = check_file_exists)]
    pub peaks_path: PathBuf,

    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output-prefix")]
    #[clap(help = "Prefix for output files")]
    #[clap(value_name = "OUTPUT_PREFIX")]
    #[arg(value_parser = check_prefix_path)]
    pub output_prefix: String,

    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(help = "Number of threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    #[arg(value_parser = threads_in_range)]
    pub num_threads: usize,

    #[command(flatten)]
    pub collection: CollectionArgs,

    #[command(flatten)]
    pub assembly: AssemblyArgs,
}

#[derive(Parser, Debug, Clone)]
pub struct CollectionArgs {
    #[clap(help_heading("Advanced"))]
    #[clap(long = "max-reads")]
    #[clap(value_name = "MAX_READS")]
    #[clap(help = "Maximum number of reads per peak (excess reads are down-sampled)")]
    #[clap(default_value = "500")]
    pub max_reads: usize,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "min-mapq")]
    #[clap(value_name = "MAPQ")]
    #[clap(help = "Minimum mapping quality of a read")]
    #[clap(default_value = "1")]
    pub min_mapq: u8,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "flank-len")]
    #[clap(value_name = "FLANK_LEN")]
    #[clap(help = "Reference bases added on each side of a peak")]
    #[clap(default_value = "200")]
    pub flank_len: u32,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "timeout")]
    #[clap(value_name = "SECONDS")]
    #[clap(help = "Time budget per peak in seconds; slower peaks are skipped")]
    pub timeout_secs: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct AssemblyArgs {
    #[clap(help_heading("Assembly"))]
    #[clap(long = "kmer-len")]
    #[clap(value_name = "K")]
    #[clap(help = "k-mer length of the assembly graph")]
    #[clap(default_value = "21")]
    #[arg(value_parser = kmer_len_in_range)]
    pub kmer_len: usize,

    #[clap(help_heading("Assembly"))]
    #[clap(long = "min-kmer-count")]
    #[clap(value_name = "COUNT")]
    #[clap(help = "Minimum number of occurrences of a k-mer")]
    #[clap(default_value = "2")]
    pub min_kmer_count: u32,

    #[clap(help_heading("Assembly"))]
    #[clap(long = "max-paths")]
    #[clap(value_name = "PATHS")]
    #[clap(help = "Maximum number of unitigs per peak before assembly is abandoned")]
    #[clap(default_value = "16")]
    pub max_paths: usize,
}

pub fn init_verbose(args: &Cli) {
    let filter_level: LevelFilter = match args.verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let level = record.level();
            let mut style = buf.style();
            match record.level() {
                Level::Error => style.set_color(Color::Red),
                Level::Warn => style.set_color(Color::Yellow),
                Level::Info => style.set_color(Color::Green),
                Level::Debug => style.set_color(Color::Blue),
                Level::Trace => style.set_color(Color::Cyan),
            };

            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                style.value(level),
                record.args()
            )
        })
        .filter_level(filter_level)
        .init();
}

fn check_prefix_path(s: &str) -> Result<String> {
    let path = Path::new(s);
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            return Err(format!("Path does not exist: {}", parent_dir.display()));
        }
    }
    Ok(s.to_string())
}

fn threads_in_range(s: &str) -> Result<usize> {
    let thread: usize = s
        .parse()
        .map_err(|_| format!("`{}` is not a valid thread number", s))?;
    if thread >= 1 {
        Ok(thread)
    } else {
        Err("Number of threads must be at least 1".into())
    }
}

fn kmer_len_in_range(s: &str) -> Result<usize> {
    let kmer_len: usize = s
        .parse()
        .map_err(|_| format!("`{}` is not a valid k-mer length", s))?;
    if (2..=31).contains(&kmer_len) {
        Ok(kmer_len)
    } else {
        Err(format!("k-mer length must be between 2 and 31, got {}", kmer_len))
    }
}

fn check_file_exists(s: &str) -> Result<PathBuf> {
    let path = Path::new(s);
    if !path.exists() {
        Err(format!("File does not exist: {}", path.display()))
    } else {
        Ok(path.to_path_buf())
    }
}

fn check_sample_name_nonempty(s: &str) -> Result<String> {
    if s.trim().is_empty() {
        Err("Sample name cannot be an empty string".to_string())
    } else {
        Ok(s.to_string())
    }
}

fn ensure_unit_float(s: &str) -> Result<f64> {
    let value = s
        .parse::<f64>()
        .map_err(|e| format!("Could not parse float: {}", e))?;
    if !(0.0..=1.0).contains(&value) {
        Err(format!(
            "The value must be between 0.0 and 1.0, got: {}",
            value
        ))
    } else {
        Ok(value)
    }
}

fn scoring_from_string(s: &str) -> Result<AlnScoring> {
    const NUM_EXPECTED_VALUES: usize = 4;
    let values: Vec<i32> = s.split(',').filter_map(|x| x.parse().ok()).collect();
    if values.len() != NUM_EXPECTED_VALUES {
        return Err(format!(
            "Expected {} comma-separated values in scoring. Got {} -> {}",
            NUM_EXPECTED_VALUES,
            values.len(),
            s
        ));
    }

    if values.iter().any(|&val| val < 0) {
        return Err(format!(
            "Negative values are not allowed in scoring. Got {}.",
            s
        ));
    }

    Ok(AlnScoring {
        match_scr: values[0],
        mism_scr: values[1],
        gapo_scr: values[2],
        gape_scr: values[3],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoring_needs_four_non_negative_values() {
        assert_eq!(
            scoring_from_string("2,3,5,2"),
            Ok(AlnScoring {
                match_scr: 2,
                mism_scr: 3,
                gapo_scr: 5,
                gape_scr: 2,
            })
        );
        assert!(scoring_from_string("2,3,5").is_err());
        assert!(scoring_from_string("2,-3,5,2").is_err());
    }

    #[test]
    fn call_arguments_parse() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("input");
        std::fs::write(&file, "").unwrap();
        let file = file.to_str().unwrap();
        let prefix = dir.path().join("out");
        let cli = Cli::try_parse_from([
            "peakvar",
            "call",
            "-g",
            file,
            "-r",
            file,
            "-b",
            file,
            "-o",
            prefix.to_str().unwrap(),
            "--prior",
            "population:0.01",
            "--max-summit-dist",
            "150",
        ])
        .unwrap();
        match cli.command {
            Command::Call(args) => {
                assert_eq!(args.prior, GenotypePrior::Population { heterozygosity: 0.01 });
                assert_eq!(args.max_summit_dist, Some(150));
                assert_eq!(args.collection.max_reads, 500);
                assert_eq!(args.assembly.kmer_len, 21);
                assert!(args.control_path.is_none());
                assert_eq!(args.min_asb_delta_bic, 10.0);
            }
            Command::Assemble(_) => panic!("expected the call subcommand"),
        }
    }
}
