//! Functions and structs for building external tool command lines and running them

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use futures::future::try_join;
use log::{info, warn};
use tokio::fs::{File, OpenOptions};
use tokio::process::Command;

use crate::config::defs::{PipelineError, STDERR_TAIL_LINES, Stage, ToolExit, ToolPaths};
use crate::utils::streams::{log_child_output, stream_to_file, ChildStream};


pub mod tophat {
    use std::path::{Path, PathBuf};
    use crate::config::defs::TOPHAT_ACCEPTED_HITS;

    pub const DEFAULT_MATE_INNER_DIST: i32 = 50;
    pub const DEFAULT_MATE_STD_DEV: u32 = 50;

    /// Alignment tuning for the new-reference run.
    #[derive(Debug, Clone, PartialEq)]
    pub struct TophatConfig {
        pub read_mismatches: u32,
        pub read_edit_dist: u32,
        pub max_multihits: u32,
        pub splice_mismatches: u32,
        pub coverage_search: bool,
        pub microexon_search: bool,
        pub mate_inner_dist: i32,
        pub mate_std_dev: u32,
    }

    impl Default for TophatConfig {
        fn default() -> Self {
            TophatConfig {
                read_mismatches: 3,
                read_edit_dist: 3,
                max_multihits: 20,
                splice_mismatches: 1,
                coverage_search: true,
                microexon_search: true,
                mate_inner_dist: DEFAULT_MATE_INNER_DIST,
                mate_std_dev: DEFAULT_MATE_STD_DEV,
            }
        }
    }

    impl TophatConfig {
        pub fn arg_generator(
            &self,
            out_dir: &Path,
            transcript_index: &Path,
            genome_index: &Path,
            fq1: &Path,
            fq2: &Path,
            threads: u32,
        ) -> Vec<String> {
            let mut args_vec: Vec<String> = Vec::new();
            args_vec.push(format!("--read-mismatches={}", self.read_mismatches));
            args_vec.push(format!("--read-edit-dist={}", self.read_edit_dist));
            args_vec.push(format!("--max-multihits={}", self.max_multihits));
            args_vec.push(format!("--splice-mismatches={}", self.splice_mismatches));
            args_vec.push(format!("--output-dir={}", out_dir.display()));
            args_vec.push(format!("--transcriptome-index={}", transcript_index.display()));
            if self.coverage_search {
                args_vec.push("--coverage-search".to_string());
            } else {
                args_vec.push("--no-coverage-search".to_string());
            }
            args_vec.push(format!("--mate-inner-dist={}", self.mate_inner_dist));
            if self.microexon_search {
                args_vec.push("--microexon-search".to_string());
            }
            args_vec.push(format!("--mate-std-dev={}", self.mate_std_dev));
            args_vec.push(format!("--num-threads={}", threads));
            args_vec.push(genome_index.to_string_lossy().to_string());
            args_vec.push(fq1.to_string_lossy().to_string());
            args_vec.push(fq2.to_string_lossy().to_string());
            args_vec
        }
    }

    /// Where tophat leaves its primary mapped-reads file.
    pub fn accepted_hits_path(out_dir: &Path) -> PathBuf {
        out_dir.join(TOPHAT_ACCEPTED_HITS)
    }
}

pub mod samtools {
    use std::path::Path;

    /// `samtools sort -n`: mates end up adjacent for counting by name.
    pub fn sort_by_name_args(input: &Path, output: &Path, threads: u32) -> Vec<String> {
        vec![
            "sort".to_string(),
            "-n".to_string(),
            "-@".to_string(),
            threads.to_string(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
            input.to_string_lossy().to_string(),
        ]
    }
}

pub mod htseq {
    use std::fmt;
    use std::path::Path;

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Strandedness {
        Yes,
        No,
        Reverse,
    }

    impl fmt::Display for Strandedness {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Strandedness::Yes => write!(f, "yes"),
                Strandedness::No => write!(f, "no"),
                Strandedness::Reverse => write!(f, "reverse"),
            }
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct HtseqCountConfig {
        pub format: &'static str,
        pub stranded: Strandedness,
        pub order: &'static str,
    }

    impl Default for HtseqCountConfig {
        fn default() -> Self {
            HtseqCountConfig {
                format: "bam",
                stranded: Strandedness::No,
                order: "name",
            }
        }
    }

    impl HtseqCountConfig {
        pub fn arg_generator(&self, alignment: &Path, annotation: &Path) -> Vec<String> {
            vec![
                "-f".to_string(),
                self.format.to_string(),
                "-s".to_string(),
                self.stranded.to_string(),
                "-r".to_string(),
                self.order.to_string(),
                alignment.to_string_lossy().to_string(),
                annotation.to_string_lossy().to_string(),
            ]
        }
    }
}

/// Argument contracts of the gene-list, DE and annotation utilities.
pub mod compare {
    use std::path::Path;

    fn lossy(path: &Path) -> String {
        path.to_string_lossy().to_string()
    }

    pub fn intersect_args(old_counts: &Path, new_counts: &Path, old_annotation: &Path, new_annotation: &Path) -> Vec<String> {
        vec![lossy(old_counts), lossy(new_counts), lossy(old_annotation), lossy(new_annotation)]
    }

    pub fn deseq2_args(old_counts: &Path, new_counts: &Path, out_dir: &Path, label: &str) -> Vec<String> {
        vec![lossy(old_counts), lossy(new_counts), lossy(out_dir), label.to_string()]
    }

    pub fn annotate_args(results: &Path, old_counts: &Path, new_counts: &Path, new_annotation: &Path) -> Vec<String> {
        vec![lossy(results), lossy(old_counts), lossy(new_counts), lossy(new_annotation)]
    }
}


/// Where a tool's stdout goes.
#[derive(Debug, Clone, PartialEq)]
pub enum StdoutTarget {
    Log,
    File(PathBuf),
}


/// Runs one external tool to completion.
///
/// stdout is either logged or captured into a freshly created file; stderr is logged and its
/// tail kept for the failure report. A capture file is created before the tool starts and is
/// removed again if the tool fails.
///
/// # Arguments
///
/// * `stage` - Stage the invocation belongs to; its tool tag labels logs and errors.
/// * `program` - Executable to run.
/// * `args` - Arguments, passed verbatim.
/// * `stdout` - StdoutTarget.
///
/// # Returns
/// Ok(()) on a zero exit status.
pub async fn run_tool(
    stage: Stage,
    program: &Path,
    args: &[String],
    stdout: StdoutTarget,
) -> Result<(), PipelineError> {
    let tool = stage.tool_tag().ok_or_else(|| {
        PipelineError::InvalidConfig(format!("{} stage does not run an external tool", stage))
    })?;
    info!("[{}] {} {}", stage, program.display(), args.join(" "));

    let (capture_path, capture_file) = match &stdout {
        StdoutTarget::File(path) => {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await
                .map_err(|e| PipelineError::Resource {
                    stage,
                    context: format!("Failed to create {}", path.display()),
                    source: e,
                })?;
            (Some(path.clone()), Some(file))
        }
        StdoutTarget::Log => (None, None),
    };

    let result = spawn_and_wait(stage, tool, program, args, capture_file).await;

    // Nothing a failed stage captured is left behind as an artifact.
    if result.is_err() {
        if let Some(path) = &capture_path {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("[{}] Could not remove partial output {}: {}", stage, path.display(), e);
            }
        }
    }
    result
}

async fn spawn_and_wait(
    stage: Stage,
    tool: &str,
    program: &Path,
    args: &[String],
    capture: Option<File>,
) -> Result<(), PipelineError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipelineError::ToolExecution {
            stage,
            tool: tool.to_string(),
            error: format!("failed to spawn {}: {}", program.display(), e),
        })?;

    let child_stdout = child.stdout.take().ok_or_else(|| PipelineError::ToolExecution {
        stage,
        tool: tool.to_string(),
        error: "failed to get stdout".to_string(),
    })?;
    let child_stderr = child.stderr.take().ok_or_else(|| PipelineError::ToolExecution {
        stage,
        tool: tool.to_string(),
        error: "failed to get stderr".to_string(),
    })?;

    let stdout_task = async {
        match capture {
            Some(file) => stream_to_file(child_stdout, file).await.map(|_| ()).map_err(|e| {
                PipelineError::Resource {
                    stage,
                    context: format!("Failed to write {} output", tool),
                    source: e,
                }
            }),
            None => log_child_output(child_stdout, tool, ChildStream::Stdout, 0)
                .await
                .map(|_| ())
                .map_err(|e| PipelineError::ToolExecution {
                    stage,
                    tool: tool.to_string(),
                    error: format!("failed to read stdout: {}", e),
                }),
        }
    };
    let stderr_task = async {
        log_child_output(child_stderr, tool, ChildStream::Stderr, STDERR_TAIL_LINES)
            .await
            .map_err(|e| PipelineError::ToolExecution {
                stage,
                tool: tool.to_string(),
                error: format!("failed to read stderr: {}", e),
            })
    };

    let ((), stderr_tail) = try_join(stdout_task, stderr_task).await?;

    let status = child.wait().await.map_err(|e| PipelineError::ToolExecution {
        stage,
        tool: tool.to_string(),
        error: format!("failed to wait on child: {}", e),
    })?;

    if !status.success() {
        return Err(PipelineError::StageFailed {
            stage,
            tool: tool.to_string(),
            exit: ToolExit { code: status.code() },
            diagnostics: stderr_tail.join("\n"),
        });
    }
    Ok(())
}


/// Resolves an executable: paths with a separator are taken as given, bare names are searched
/// on `PATH`.
pub fn resolve_executable(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Pre-flight presence check for every external collaborator.
pub fn check_tools(tools: &ToolPaths) -> Result<(), PipelineError> {
    for (tag, program) in tools.iter() {
        match resolve_executable(program) {
            Some(resolved) => info!("Using {} at {}", tag, resolved.display()),
            None => {
                return Err(PipelineError::ToolNotFound {
                    tool: tag.to_string(),
                    path: program.clone(),
                });
            }
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::compare::{annotate_args, deseq2_args, intersect_args};
    use super::htseq::HtseqCountConfig;
    use super::tophat::{accepted_hits_path, TophatConfig};

    #[test]
    fn test_tophat_default_args() {
        let args = TophatConfig::default().arg_generator(
            Path::new("out"),
            Path::new("new_trans"),
            Path::new("new_genome"),
            Path::new("r1.fastq"),
            Path::new("r2.fastq"),
            4,
        );
        assert_eq!(
            args,
            vec![
                "--read-mismatches=3",
                "--read-edit-dist=3",
                "--max-multihits=20",
                "--splice-mismatches=1",
                "--output-dir=out",
                "--transcriptome-index=new_trans",
                "--coverage-search",
                "--mate-inner-dist=50",
                "--microexon-search",
                "--mate-std-dev=50",
                "--num-threads=4",
                "new_genome",
                "r1.fastq",
                "r2.fastq",
            ]
        );
    }

    #[test]
    fn test_tophat_custom_tuning() {
        let config = TophatConfig {
            max_multihits: 1,
            coverage_search: false,
            microexon_search: false,
            mate_inner_dist: -20,
            ..TophatConfig::default()
        };
        let args = config.arg_generator(
            Path::new("out"),
            Path::new("t"),
            Path::new("g"),
            Path::new("a.fq"),
            Path::new("b.fq"),
            1,
        );
        assert!(args.contains(&"--max-multihits=1".to_string()));
        assert!(args.contains(&"--no-coverage-search".to_string()));
        assert!(!args.contains(&"--microexon-search".to_string()));
        assert!(args.contains(&"--mate-inner-dist=-20".to_string()));
    }

    #[test]
    fn test_accepted_hits_path() {
        assert_eq!(accepted_hits_path(Path::new("out")), PathBuf::from("out/accepted_hits.bam"));
    }

    #[test]
    fn test_samtools_sort_args() {
        let args = samtools::sort_by_name_args(Path::new("out/previous.bam"), Path::new("out/previous.name.bam"), 4);
        assert_eq!(args, vec!["sort", "-n", "-@", "4", "-o", "out/previous.name.bam", "out/previous.bam"]);
    }

    #[test]
    fn test_htseq_count_args() {
        let args = HtseqCountConfig::default().arg_generator(Path::new("x.name.bam"), Path::new("old.gtf"));
        assert_eq!(args, vec!["-f", "bam", "-s", "no", "-r", "name", "x.name.bam", "old.gtf"]);
    }

    #[test]
    fn test_compare_arg_contracts() {
        let (a, b) = (Path::new("a.txt"), Path::new("b.txt"));
        assert_eq!(intersect_args(a, b, Path::new("o.gtf"), Path::new("n.gtf")), vec!["a.txt", "b.txt", "o.gtf", "n.gtf"]);
        assert_eq!(deseq2_args(a, b, Path::new("out"), "DESeq2"), vec!["a.txt", "b.txt", "out", "DESeq2"]);
        assert_eq!(
            annotate_args(Path::new("r.csv"), a, b, Path::new("n.gtf")),
            vec!["r.csv", "a.txt", "b.txt", "n.gtf"]
        );
    }

    #[test]
    fn test_resolve_executable() {
        assert!(resolve_executable(Path::new("/definitely/not/here/tool")).is_none());
        assert!(resolve_executable(Path::new("no-such-tool-on-path-xyz")).is_none());
    }

    #[test]
    fn test_check_tools_reports_missing() {
        let tools = ToolPaths {
            tophat: PathBuf::from("/definitely/not/here/tophat"),
            ..ToolPaths::default()
        };
        match check_tools(&tools) {
            Err(PipelineError::ToolNotFound { tool, .. }) => assert_eq!(tool, "tophat"),
            other => panic!("expected ToolNotFound, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_reports_exit_code() -> anyhow::Result<()> {
        let args = vec!["-c".to_string(), "echo boom >&2; exit 7".to_string()];
        let err = run_tool(Stage::Compare, Path::new("sh"), &args, StdoutTarget::Log)
            .await
            .unwrap_err();
        match err {
            PipelineError::StageFailed { stage, tool, exit, diagnostics } => {
                assert_eq!(stage, Stage::Compare);
                assert_eq!(tool, "deseq2_compare");
                assert_eq!(exit.code, Some(7));
                assert_eq!(diagnostics, "boom");
            }
            other => panic!("expected StageFailed, got {:?}", other),
        }
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_captures_stdout() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let out = dir.path().join("counts.txt");
        let args = vec!["-c".to_string(), "printf 'g1\\t1\\n'".to_string()];
        run_tool(Stage::CountOld, Path::new("sh"), &args, StdoutTarget::File(out.clone())).await?;
        assert_eq!(std::fs::read_to_string(&out)?, "g1\t1\n");
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_failure_removes_capture() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let out = dir.path().join("counts.txt");
        let args = vec!["-c".to_string(), "echo partial; exit 1".to_string()];
        let result = run_tool(Stage::CountNew, Path::new("sh"), &args, StdoutTarget::File(out.clone())).await;
        assert!(result.is_err());
        assert!(!out.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_run_tool_capture_target_exists() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let out = dir.path().join("counts.txt");
        std::fs::write(&out, b"keep")?;
        let result = run_tool(Stage::CountOld, Path::new("sh"), &[], StdoutTarget::File(out.clone())).await;
        assert!(matches!(result, Err(PipelineError::Resource { stage: Stage::CountOld, .. })));
        assert_eq!(std::fs::read(&out)?, b"keep");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_tool_spawn_failure() {
        let result = run_tool(
            Stage::Align,
            Path::new("/definitely/not/here/tophat"),
            &[],
            StdoutTarget::Log,
        )
        .await;
        match result {
            Err(PipelineError::ToolExecution { stage, tool, .. }) => {
                assert_eq!(stage, Stage::Align);
                assert_eq!(tool, "tophat");
            }
            other => panic!("expected ToolExecution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_tool_rejects_toolless_stage() {
        let result = run_tool(Stage::Link, Path::new("sh"), &[], StdoutTarget::Log).await;
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_failed_cleanup_keeps_stage_error() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let out = dir.path().join("results.annotated.csv");
        // The tool unlinks its own capture file, so the cleanup removal fails.
        let script = format!("rm -f '{}'; exit 2", out.display());
        let args = vec!["-c".to_string(), script];
        let result = run_tool(Stage::Annotate, Path::new("sh"), &args, StdoutTarget::File(out.clone())).await;
        match result {
            Err(PipelineError::StageFailed { stage, tool, exit, .. }) => {
                assert_eq!(stage, Stage::Annotate);
                assert_eq!(tool, "annotate_genes");
                assert_eq!(exit.code, Some(2));
            }
            other => panic!("expected StageFailed, got {:?}", other),
        }
        assert!(!out.exists());
        Ok(())
    }
}
