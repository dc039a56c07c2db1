// Page geometry shared by the two export paths.
// PDF: A4 output, raster surface sized like an A4 sheet at 96 dpi.
// DOCX: uniform margins in twips.

pub mod page;

pub use page::{default_docx_layout, default_pdf_layout, fit_to_printable, DocxLayout, PdfLayout};
