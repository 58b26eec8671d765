//! Output generation: the per-run spreadsheet and the run history.
//!
//! # Submodules
//!
//! - [`spreadsheet`]: Writes the merged records to a CSV file
//! - [`history`]: Appends a summary of each run to `extraction_history.json`
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── ma_noticias_20250506_040012.csv
//! ├── ma_noticias_20250507_040009.csv
//! └── extraction_history.json
//! ```

pub mod history;
pub mod spreadsheet;
