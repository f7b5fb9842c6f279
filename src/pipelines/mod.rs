pub mod ref_diff;
