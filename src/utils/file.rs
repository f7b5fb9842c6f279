use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::defs::{
    ANNOTATED_QUALIFIER, ANNOTATION_EXT, BOWTIE2_INDEX_SUFFIXES, COUNTS_EXT, COUNTS_QUALIFIER, INTERSECT_QUALIFIER,
    NAME_SORT_QUALIFIER, PREVIOUS_BAM, PipelineError, RESULTS_SUFFIX, RunInputs,
};
use crate::cli::CompareArgs;


/// Inserts `qualifier` between a file's stem and its extension, in the same directory.
/// `out/previous.bam` + `name` -> `out/previous.name.bam`. Files without an extension get the
/// qualifier appended.
pub fn qualified_path(path: &Path, qualifier: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    let mut file_name: OsString = stem;
    file_name.push(".");
    file_name.push(qualifier);
    if let Some(ext) = path.extension() {
        file_name.push(".");
        file_name.push(ext);
    }
    path.with_file_name(file_name)
}

/// Replaces the extension with `.<qualifier>.<ext>`.
pub fn requalified_path(path: &Path, qualifier: &str, ext: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_os_string()).unwrap_or_default();
    let mut file_name: OsString = stem;
    file_name.push(format!(".{}.{}", qualifier, ext));
    path.with_file_name(file_name)
}

/// Name-sorted variant of an alignment.
pub fn sorted_name_path(alignment: &Path) -> PathBuf {
    qualified_path(alignment, NAME_SORT_QUALIFIER)
}

/// Count table for a (sorted) alignment.
pub fn counts_path(alignment: &Path) -> PathBuf {
    requalified_path(alignment, COUNTS_QUALIFIER, COUNTS_EXT)
}

/// Reconciled variant of a count table.
pub fn intersect_path(counts: &Path) -> PathBuf {
    qualified_path(counts, INTERSECT_QUALIFIER)
}

/// Final annotated variant of a results table.
pub fn annotated_path(results: &Path) -> PathBuf {
    qualified_path(results, ANNOTATED_QUALIFIER)
}

pub fn previous_alignment_path(out_dir: &Path) -> PathBuf {
    out_dir.join(PREVIOUS_BAM)
}

pub fn results_path(out_dir: &Path, label: &str) -> PathBuf {
    out_dir.join(format!("{}.{}", label, RESULTS_SUFFIX))
}

/// Annotation shipped next to a transcript index: `<index>.gtf`.
pub fn companion_annotation(transcript_index: &Path) -> PathBuf {
    let mut name = transcript_index.as_os_str().to_os_string();
    name.push(".");
    name.push(ANNOTATION_EXT);
    PathBuf::from(name)
}

/// Resolves `path` against `cwd` unless already absolute.
pub fn absolute_path(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// True when `base` names a bowtie2 index prefix, i.e. `<base>.1.bt2` or `<base>.1.bt2l`
/// exists. Other files sharing the prefix, such as the companion `.gtf`, do not count.
pub fn index_exists(base: &Path) -> bool {
    BOWTIE2_INDEX_SUFFIXES.iter().any(|suffix| {
        let mut name = base.as_os_str().to_os_string();
        name.push(".");
        name.push(suffix);
        Path::new(&name).is_file()
    })
}

fn require_file(path: PathBuf) -> Result<PathBuf, PipelineError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(PipelineError::MissingInput(path))
    }
}

fn require_index(path: PathBuf) -> Result<PathBuf, PipelineError> {
    if index_exists(&path) {
        Ok(path)
    } else {
        Err(PipelineError::MissingInput(path))
    }
}

/// Pre-flight check of every input path. Returns the inputs resolved to absolute paths.
///
/// # Arguments
///
/// * `args` - Parsed compare arguments.
/// * `cwd` - Directory relative inputs are resolved against.
///
/// # Returns
/// RunInputs with absolute paths, or MissingInput for the first path not on disk.
pub fn validate_file_inputs(args: &CompareArgs, cwd: &Path) -> Result<RunInputs, PipelineError> {
    let old_bam = require_file(absolute_path(&args.old_bam, cwd))?;
    let old_annotation = require_file(absolute_path(&args.old_annotation, cwd))?;
    let old_unmapped = match &args.old_unmapped {
        Some(path) => Some(require_file(absolute_path(path, cwd))?),
        None => None,
    };
    let fq1 = require_file(absolute_path(&args.fq1, cwd))?;
    let fq2 = require_file(absolute_path(&args.fq2, cwd))?;
    let new_genome_index = require_index(absolute_path(&args.new_genome_index, cwd))?;
    let new_transcript_index = require_index(absolute_path(&args.new_transcript_index, cwd))?;
    let new_annotation = require_file(companion_annotation(&new_transcript_index))?;

    Ok(RunInputs {
        old_bam,
        old_annotation,
        old_unmapped,
        fq1,
        fq2,
        new_genome_index,
        new_transcript_index,
        new_annotation,
    })
}

/// Creates the run's output directory. Fails if it already exists.
pub fn create_output_dir(out_dir: &Path) -> Result<(), PipelineError> {
    fs::create_dir(out_dir).map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            PipelineError::OutputDirExists(out_dir.to_path_buf())
        } else {
            PipelineError::IOError {
                context: format!("Failed to create output directory {}", out_dir.display()),
                source: e,
            }
        }
    })
}

/// Symlinks `source` at `link`, pointing to the canonical source path so the link stays valid
/// regardless of where it lives.
#[cfg(unix)]
pub fn symlink_file(source: &Path, link: &Path) -> io::Result<()> {
    let source = fs::canonicalize(source)?;
    std::os::unix::fs::symlink(source, link)
}

#[cfg(windows)]
pub fn symlink_file(source: &Path, link: &Path) -> io::Result<()> {
    let source = fs::canonicalize(source)?;
    std::os::windows::fs::symlink_file(source, link)
}
