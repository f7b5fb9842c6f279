use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::defs::{
    ANNOTATE_TAG, DEFAULT_THREADS, DESEQ2_TAG, HTSEQ_COUNT_TAG, INTERSECT_TAG, SAMTOOLS_TAG,
    TOPHAT_TAG, ToolPaths,
};
use crate::utils::command::tophat::{DEFAULT_MATE_INNER_DIST, DEFAULT_MATE_STD_DEV};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ref-diff",
    version,
    about = "Use tophat and DESeq2 to compare RNA-seq results from two reference genome versions \
             and create ready to use read count lists for downstream analysis."
)]
pub struct Arguments {
    #[arg(short = 'v', long = "verbose", action, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Align against the new reference and compare counts with the previous alignment
    Compare(CompareArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    #[arg(help = "Output directory. Must not exist yet; it is created by the run.")]
    pub output_dir: PathBuf,

    #[arg(short = 'b', long = "oldbam", help = "Previous bam alignment")]
    pub old_bam: PathBuf,

    #[arg(short = 'g', long = "oldgtf", help = "Annotation the previous alignment was counted against")]
    pub old_annotation: PathBuf,

    #[arg(short = 'o', long = "oldun", help = "Previous bam unmapped reads")]
    pub old_unmapped: Option<PathBuf>,

    #[arg(short = '1', long = "fq1", help = "Fastq formatted reads, read 1")]
    pub fq1: PathBuf,

    #[arg(short = '2', long = "fq2", help = "Fastq formatted reads, read 2")]
    pub fq2: PathBuf,

    #[arg(short = 'R', long = "newref", help = "New indexed reference (bowtie2/tophat index base)")]
    pub new_genome_index: PathBuf,

    #[arg(short = 'T', long = "newtrans", help = "New indexed transcriptome; its annotation is expected at <newtrans>.gtf")]
    pub new_transcript_index: PathBuf,

    #[arg(
        long,
        default_value_t = DEFAULT_THREADS,
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Number of threads for multithreaded steps"
    )]
    pub threads: u32,

    #[arg(long, default_value_t = DEFAULT_MATE_INNER_DIST)]
    pub mate_inner_dist: i32,

    #[arg(long, default_value_t = DEFAULT_MATE_STD_DEV)]
    pub mate_std_dev: u32,

    #[arg(long, default_value = TOPHAT_TAG)]
    pub tophat: PathBuf,

    #[arg(long, default_value = SAMTOOLS_TAG)]
    pub samtools: PathBuf,

    #[arg(long = "htseq-count", default_value = HTSEQ_COUNT_TAG)]
    pub htseq_count: PathBuf,

    #[arg(long = "intersect-tool", default_value = INTERSECT_TAG, help = "Gene list intersection utility")]
    pub intersect_tool: PathBuf,

    #[arg(long = "deseq-tool", default_value = DESEQ2_TAG, help = "Differential expression engine")]
    pub deseq_tool: PathBuf,

    #[arg(long = "annotate-tool", default_value = ANNOTATE_TAG, help = "Result annotation utility")]
    pub annotate_tool: PathBuf,
}

impl CompareArgs {
    pub fn tool_paths(&self) -> ToolPaths {
        ToolPaths {
            tophat: self.tophat.clone(),
            samtools: self.samtools.clone(),
            htseq_count: self.htseq_count.clone(),
            intersect: self.intersect_tool.clone(),
            deseq2: self.deseq_tool.clone(),
            annotate: self.annotate_tool.clone(),
        }
    }
}
