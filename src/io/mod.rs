pub mod csv_reader;
pub mod csv_writer;
pub mod error;
pub mod record;

// Re-export commonly used types
pub use csv_reader::CsvRecordStream;
pub use csv_writer::write_records;
pub use error::IoError;
pub use record::{RawRecord, Record};
