use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::config::defs::{COUNT_TABLE_HEADER_IDS, HTSEQ_SUMMARY_ROWS};

/// Feature ids of a two-column count table, in file order.
///
/// htseq-count summary rows (`__no_feature`, ...) and blank lines are skipped. The first line
/// is skipped as a header only when its id column is a known header name (`gene_id`, ...).
/// Every other row needs a non-negative integer count.
pub fn read_feature_ids(path: &Path) -> io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut ids = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let id = fields.next().unwrap_or_default();
        let count = fields.next().map(str::trim);

        if HTSEQ_SUMMARY_ROWS.contains(id) {
            continue;
        }
        if idx == 0 && COUNT_TABLE_HEADER_IDS.contains(id.to_ascii_lowercase().as_str()) {
            continue;
        }
        match count.map(|c| c.parse::<u64>()) {
            Some(Ok(_)) => ids.push(id.to_string()),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{}: line {} is not '<feature>\\t<count>': {}", path.display(), idx + 1, line),
                ));
            }
        }
    }
    Ok(ids)
}

/// Row-alignment check of two reconciled count tables.
///
/// # Returns
/// Number of shared features, or a description of the first mismatch.
pub fn check_row_aligned(old_ids: &[String], new_ids: &[String]) -> Result<usize, String> {
    if old_ids.len() != new_ids.len() {
        return Err(format!(
            "reconciled tables differ in length ({} vs {} features)",
            old_ids.len(),
            new_ids.len()
        ));
    }
    if let Some((row, (old, new))) = old_ids.iter().zip(new_ids).enumerate().find(|(_, (o, n))| o != n) {
        return Err(format!("reconciled tables disagree at row {}: {} vs {}", row + 1, old, new));
    }
    Ok(old_ids.len())
}
