//! File and network implementations of the core I/O traits.

pub mod http;
pub mod table;
pub mod workbook;

pub use http::HttpDocumentSource;
pub use table::CsvConfigSource;
pub use workbook::CsvWorkbookSink;
