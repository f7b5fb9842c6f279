use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use lazy_static::lazy_static;
use thiserror::Error;

use crate::utils::command::tophat::TophatConfig;

// External software
pub const TOPHAT_TAG: &str = "tophat";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const HTSEQ_COUNT_TAG: &str = "htseq-count";
pub const INTERSECT_TAG: &str = "intersect_genes";
pub const DESEQ2_TAG: &str = "deseq2_compare";
pub const ANNOTATE_TAG: &str = "annotate_genes";

// Static Filenames
pub const PREVIOUS_BAM: &str = "previous.bam";
pub const TOPHAT_ACCEPTED_HITS: &str = "accepted_hits.bam";
pub const RESULT_LABEL: &str = "DESeq2";
pub const RESULTS_SUFFIX: &str = "results.csv";

// Path qualifiers
pub const NAME_SORT_QUALIFIER: &str = "name";
pub const COUNTS_QUALIFIER: &str = "counts";
pub const COUNTS_EXT: &str = "txt";
pub const INTERSECT_QUALIFIER: &str = "intersect";
pub const ANNOTATED_QUALIFIER: &str = "annotated";
pub const ANNOTATION_EXT: &str = "gtf";

// Bowtie2 small and large index markers; tophat needs one of them next to each index base.
pub const BOWTIE2_INDEX_SUFFIXES: &[&str] = &["1.bt2", "1.bt2l"];

// Static Parameters
pub const DEFAULT_THREADS: u32 = 1;
pub const STDERR_TAIL_LINES: usize = 20;

lazy_static! {
    /// Summary rows htseq-count appends after the per-feature counts.
    pub static ref HTSEQ_SUMMARY_ROWS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("__no_feature");
        s.insert("__ambiguous");
        s.insert("__too_low_aQual");
        s.insert("__not_aligned");
        s.insert("__alignment_not_unique");
        s
    };

    /// First-column names accepted as a count-table header row.
    pub static ref COUNT_TABLE_HEADER_IDS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert("gene_id");
        s.insert("gene");
        s.insert("feature");
        s.insert("feature_id");
        s.insert("id");
        s
    };
}

/// The fixed, linear chain of pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Link,
    Align,
    SortOld,
    SortNew,
    CountOld,
    CountNew,
    Reconcile,
    Compare,
    Annotate,
}

impl Stage {
    pub const ORDER: [Stage; 9] = [
        Stage::Link,
        Stage::Align,
        Stage::SortOld,
        Stage::SortNew,
        Stage::CountOld,
        Stage::CountNew,
        Stage::Reconcile,
        Stage::Compare,
        Stage::Annotate,
    ];

    /// Tag of the external tool this stage drives, if any.
    pub fn tool_tag(self) -> Option<&'static str> {
        match self {
            Stage::Link => None,
            Stage::Align => Some(TOPHAT_TAG),
            Stage::SortOld | Stage::SortNew => Some(SAMTOOLS_TAG),
            Stage::CountOld | Stage::CountNew => Some(HTSEQ_COUNT_TAG),
            Stage::Reconcile => Some(INTERSECT_TAG),
            Stage::Compare => Some(DESEQ2_TAG),
            Stage::Annotate => Some(ANNOTATE_TAG),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Link => "link",
            Stage::Align => "align",
            Stage::SortOld => "sort (previous)",
            Stage::SortNew => "sort (new)",
            Stage::CountOld => "count (previous)",
            Stage::CountNew => "count (new)",
            Stage::Reconcile => "reconcile",
            Stage::Compare => "compare",
            Stage::Annotate => "annotate",
        };
        write!(f, "{}", name)
    }
}

/// How an external tool terminated when it did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolExit {
    pub code: Option<i32>,
}

impl fmt::Display for ToolExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {}", code),
            None => write!(f, "no exit code (terminated by signal)"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Required input does not exist: {0}")]
    MissingInput(PathBuf),

    #[error("Output directory already exists: {0}")]
    OutputDirExists(PathBuf),

    #[error("Cannot find {tool} executable '{path}'")]
    ToolNotFound { tool: String, path: PathBuf },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{stage} stage failed: {tool} returned {exit}")]
    StageFailed {
        stage: Stage,
        tool: String,
        exit: ToolExit,
        diagnostics: String,
    },

    #[error("{stage} stage failed: could not run {tool}: {error}")]
    ToolExecution {
        stage: Stage,
        tool: String,
        error: String,
    },

    #[error("{stage} stage failed: {context}: {source}")]
    Resource {
        stage: Stage,
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} stage failed: expected output {path} was not produced")]
    MissingOutput { stage: Stage, path: PathBuf },

    #[error("{stage} stage failed: {detail}")]
    InvalidOutput { stage: Stage, detail: String },

    #[error("{context}: {source}")]
    IOError {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Stage the failure is attributed to; `None` for pre-flight errors.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::StageFailed { stage, .. }
            | PipelineError::ToolExecution { stage, .. }
            | PipelineError::Resource { stage, .. }
            | PipelineError::MissingOutput { stage, .. }
            | PipelineError::InvalidOutput { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Executables for each external collaborator. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub tophat: PathBuf,
    pub samtools: PathBuf,
    pub htseq_count: PathBuf,
    pub intersect: PathBuf,
    pub deseq2: PathBuf,
    pub annotate: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        ToolPaths {
            tophat: PathBuf::from(TOPHAT_TAG),
            samtools: PathBuf::from(SAMTOOLS_TAG),
            htseq_count: PathBuf::from(HTSEQ_COUNT_TAG),
            intersect: PathBuf::from(INTERSECT_TAG),
            deseq2: PathBuf::from(DESEQ2_TAG),
            annotate: PathBuf::from(ANNOTATE_TAG),
        }
    }
}

impl ToolPaths {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &PathBuf)> {
        [
            (TOPHAT_TAG, &self.tophat),
            (SAMTOOLS_TAG, &self.samtools),
            (HTSEQ_COUNT_TAG, &self.htseq_count),
            (INTERSECT_TAG, &self.intersect),
            (DESEQ2_TAG, &self.deseq2),
            (ANNOTATE_TAG, &self.annotate),
        ]
        .into_iter()
    }
}

/// Absolute, pre-flight-checked inputs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInputs {
    pub old_bam: PathBuf,
    pub old_annotation: PathBuf,
    pub old_unmapped: Option<PathBuf>,
    pub fq1: PathBuf,
    pub fq2: PathBuf,
    pub new_genome_index: PathBuf,
    pub new_transcript_index: PathBuf,
    pub new_annotation: PathBuf,
}

#[derive(Debug)]
pub struct RunConfig {
    pub out_dir: PathBuf,
    pub inputs: RunInputs,
    pub tools: ToolPaths,
    pub tophat: TophatConfig,
    pub threads: u32,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_starts_at_link() {
        assert_eq!(Stage::ORDER.first(), Some(&Stage::Link));
        assert_eq!(Stage::ORDER.last(), Some(&Stage::Annotate));
        assert!(Stage::ORDER.iter().skip(1).all(|s| s.tool_tag().is_some()));
    }

    #[test]
    fn test_stage_tools() {
        assert_eq!(Stage::Link.tool_tag(), None);
        assert_eq!(Stage::SortOld.tool_tag(), Some(SAMTOOLS_TAG));
        assert_eq!(Stage::CountNew.tool_tag(), Some(HTSEQ_COUNT_TAG));
    }

    #[test]
    fn test_stage_failure_message_names_tool_and_code() {
        let err = PipelineError::StageFailed {
            stage: Stage::SortNew,
            tool: SAMTOOLS_TAG.to_string(),
            exit: ToolExit { code: Some(3) },
            diagnostics: String::new(),
        };
        let msg = err.to_string();
        assert!(msg.contains("samtools"), "{}", msg);
        assert!(msg.contains("exit code 3"), "{}", msg);
        assert!(msg.contains("sort (new)"), "{}", msg);
        assert_eq!(err.stage(), Some(Stage::SortNew));
    }

    #[test]
    fn test_signal_exit_display() {
        let exit = ToolExit { code: None };
        assert!(exit.to_string().contains("signal"));
    }

    #[test]
    fn test_preflight_errors_have_no_stage() {
        let err = PipelineError::OutputDirExists(PathBuf::from("out"));
        assert_eq!(err.stage(), None);
    }
}
