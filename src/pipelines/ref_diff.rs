use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::info;

use crate::cli::CompareArgs;
use crate::config::defs::{PipelineError, RESULT_LABEL, RunConfig, Stage};
use crate::utils::command::compare::{annotate_args, deseq2_args, intersect_args};
use crate::utils::command::htseq::HtseqCountConfig;
use crate::utils::command::tophat::{accepted_hits_path, TophatConfig};
use crate::utils::command::{check_tools, run_tool, samtools, StdoutTarget};
use crate::utils::counts::{check_row_aligned, read_feature_ids};
use crate::utils::file::{
    absolute_path, annotated_path, counts_path, create_output_dir, intersect_path,
    previous_alignment_path, results_path, sorted_name_path, symlink_file, validate_file_inputs,
};


/// Pre-flight: validates inputs and tools, then creates the output directory.
/// Nothing is written unless every check passes.
///
/// # Arguments
///
/// * `args` - Parsed compare arguments.
/// * `cwd` - Directory relative paths are resolved against.
///
/// # Returns
/// RunConfig ready for `run`.
pub fn prepare(args: &CompareArgs, cwd: &Path) -> Result<RunConfig, PipelineError> {
    let out_dir = absolute_path(&args.output_dir, cwd);
    if out_dir.exists() {
        return Err(PipelineError::OutputDirExists(out_dir));
    }

    let inputs = validate_file_inputs(args, cwd)?;
    if inputs.fq1 == inputs.fq2 {
        return Err(PipelineError::InvalidConfig(format!(
            "read 1 and read 2 are the same file: {}",
            inputs.fq1.display()
        )));
    }
    if let Some(unmapped) = &inputs.old_unmapped {
        info!("Previous unmapped reads: {}", unmapped.display());
    }

    let tools = args.tool_paths();
    check_tools(&tools)?;

    let tophat = TophatConfig {
        mate_inner_dist: args.mate_inner_dist,
        mate_std_dev: args.mate_std_dev,
        ..TophatConfig::default()
    };

    create_output_dir(&out_dir)?;
    info!("Output directory: {}", out_dir.display());

    Ok(RunConfig {
        out_dir,
        inputs,
        tools,
        tophat,
        threads: args.threads,
    })
}


/// Exposes the previous alignment as `previous.bam` in the output directory.
pub fn link_previous(old_bam: &Path, out_dir: &Path) -> Result<PathBuf, PipelineError> {
    let link = previous_alignment_path(out_dir);
    info!("[{}] {} -> {}", Stage::Link, link.display(), old_bam.display());
    symlink_file(old_bam, &link).map_err(|e| PipelineError::Resource {
        stage: Stage::Link,
        context: format!("Failed to link {} to {}", link.display(), old_bam.display()),
        source: e,
    })?;
    Ok(link)
}

fn require_output(stage: Stage, path: PathBuf) -> Result<PathBuf, PipelineError> {
    if path.exists() {
        Ok(path)
    } else {
        Err(PipelineError::MissingOutput { stage, path })
    }
}

/// Aligns the read pair against the new reference.
///
/// # Returns
/// Path to tophat's accepted_hits.bam.
pub async fn align(config: &RunConfig) -> Result<PathBuf, PipelineError> {
    let inputs = &config.inputs;
    let args = config.tophat.arg_generator(
        &config.out_dir,
        &inputs.new_transcript_index,
        &inputs.new_genome_index,
        &inputs.fq1,
        &inputs.fq2,
        config.threads,
    );
    run_tool(Stage::Align, &config.tools.tophat, &args, StdoutTarget::Log).await?;
    require_output(Stage::Align, accepted_hits_path(&config.out_dir))
}

/// Name-sorts an alignment next to its source.
pub async fn sort_by_name(config: &RunConfig, stage: Stage, alignment: &Path) -> Result<PathBuf, PipelineError> {
    let sorted = sorted_name_path(alignment);
    let args = samtools::sort_by_name_args(alignment, &sorted, config.threads);
    run_tool(stage, &config.tools.samtools, &args, StdoutTarget::Log).await?;
    require_output(stage, sorted)
}

/// Counts reads per feature of `annotation`; the table is htseq-count's stdout.
pub async fn count_features(
    config: &RunConfig,
    stage: Stage,
    sorted: &Path,
    annotation: &Path,
) -> Result<PathBuf, PipelineError> {
    let counts = counts_path(sorted);
    let args = HtseqCountConfig::default().arg_generator(sorted, annotation);
    run_tool(stage, &config.tools.htseq_count, &args, StdoutTarget::File(counts.clone())).await?;
    Ok(counts)
}

/// Restricts both count tables to features present in both annotations.
///
/// The intersection utility writes `<counts>.intersect` next to each input. Both outputs are
/// read back: they must share at least one feature and list the same features in the same
/// order.
///
/// # Returns
/// (old reconciled table, new reconciled table)
pub async fn reconcile(
    config: &RunConfig,
    old_counts: &Path,
    new_counts: &Path,
) -> Result<(PathBuf, PathBuf), PipelineError> {
    let stage = Stage::Reconcile;
    let args = intersect_args(
        old_counts,
        new_counts,
        &config.inputs.old_annotation,
        &config.inputs.new_annotation,
    );
    run_tool(stage, &config.tools.intersect, &args, StdoutTarget::Log).await?;

    let old_intersect = require_output(stage, intersect_path(old_counts))?;
    let new_intersect = require_output(stage, intersect_path(new_counts))?;

    let read_ids = |path: &Path| {
        read_feature_ids(path).map_err(|e| PipelineError::Resource {
            stage,
            context: format!("Failed to read {}", path.display()),
            source: e,
        })
    };
    let old_ids = read_ids(&old_intersect)?;
    let new_ids = read_ids(&new_intersect)?;

    let shared = check_row_aligned(&old_ids, &new_ids)
        .map_err(|detail| PipelineError::InvalidOutput { stage, detail })?;
    if shared == 0 {
        return Err(PipelineError::InvalidOutput {
            stage,
            detail: "the two annotation sets share no feature identifiers".to_string(),
        });
    }
    info!("[{}] {} features comparable across both annotations", stage, shared);

    Ok((old_intersect, new_intersect))
}

/// Runs the differential-expression engine on the reconciled tables.
pub async fn compare(config: &RunConfig, old_intersect: &Path, new_intersect: &Path) -> Result<PathBuf, PipelineError> {
    let args = deseq2_args(old_intersect, new_intersect, &config.out_dir, RESULT_LABEL);
    run_tool(Stage::Compare, &config.tools.deseq2, &args, StdoutTarget::Log).await?;
    require_output(Stage::Compare, results_path(&config.out_dir, RESULT_LABEL))
}

/// Joins the results with gene metadata from the new annotation.
pub async fn annotate(
    config: &RunConfig,
    results: &Path,
    old_intersect: &Path,
    new_intersect: &Path,
) -> Result<PathBuf, PipelineError> {
    let annotated = annotated_path(results);
    let args = annotate_args(results, old_intersect, new_intersect, &config.inputs.new_annotation);
    run_tool(Stage::Annotate, &config.tools.annotate, &args, StdoutTarget::File(annotated.clone())).await?;
    Ok(annotated)
}


/// Run function for the reference comparison pipeline. Stages run strictly one after another;
/// the first failure ends the run and leaves earlier artifacts in place.
///
/// # Arguments
///
/// * `config` - RunConfig from `prepare`.
///
/// # Returns
/// Path to the annotated results table.
pub async fn run(config: Arc<RunConfig>) -> Result<PathBuf, PipelineError> {
    let start = Instant::now();
    let inputs = &config.inputs;

    let previous = link_previous(&inputs.old_bam, &config.out_dir)?;
    let aligned = align(&config).await?;

    let previous_sorted = sort_by_name(&config, Stage::SortOld, &previous).await?;
    let aligned_sorted = sort_by_name(&config, Stage::SortNew, &aligned).await?;

    let previous_counts = count_features(&config, Stage::CountOld, &previous_sorted, &inputs.old_annotation).await?;
    let aligned_counts = count_features(&config, Stage::CountNew, &aligned_sorted, &inputs.new_annotation).await?;

    let (previous_intersect, aligned_intersect) = reconcile(&config, &previous_counts, &aligned_counts).await?;

    let results = compare(&config, &previous_intersect, &aligned_intersect).await?;
    let annotated = annotate(&config, &results, &previous_intersect, &aligned_intersect).await?;

    info!("Reference comparison finished in {} seconds.", start.elapsed().as_secs());
    Ok(annotated)
}
