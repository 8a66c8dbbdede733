#![no_main]
use aps_verify::io::grid::ReportGrid;
use libfuzzer_sys::fuzz_target;
use std::io::Write;
use tempfile::NamedTempFile;

fuzz_target!(|data: &[u8]| {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(data).unwrap();

    // Should not panic regardless of input; invalid UTF-8 is an I/O error
    let _ = ReportGrid::from_delimited_path(f.path(), ',');
    let _ = ReportGrid::from_delimited_path(f.path(), '\t');
});
