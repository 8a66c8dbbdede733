#![no_main]
use aps_verify::io::grid::ReportGrid;
use aps_verify::qc::blocks::BlockScanner;
use aps_verify::qc::metrics::extract_rows;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let grid = ReportGrid::from_delimited(&text, '\t');

    // Scanning and row extraction must not panic on any grid
    for with_matrix in [false, true] {
        for block in BlockScanner::new().with_matrix(with_matrix).scan(&grid) {
            let _ = extract_rows(&block, &block.sample_name, "Fe");
        }
    }
});
