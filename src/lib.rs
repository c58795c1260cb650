//! # billow
//!
//! Receipt OCR service: upload a receipt image, get its text recognized and
//! stored, then list or search your receipts.
//!
//! ```text
//! POST /upload ─▶ Ingestion ─┬─▶ BlobStore (uploads/)
//!                            ├─▶ Recognizer ─▶ OcrProvider (tesseract | docling | mistral_ocr)
//!                            └─▶ ReceiptStore (SQLite)
//! GET /receipts, /search ─▶ Retrieval ─▶ ReceiptStore
//! ```
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`api`] | HTTP routes and error mapping |
//! | [`blob`] | Upload byte storage |
//! | [`config`] | Environment configuration |
//! | [`identity`] | Caller resolution |
//! | [`ingest`] | Ingestion pipeline |
//! | [`ocr`] | Recognition engines and best-effort wrapper |
//! | [`receipt`] | Receipt model and store contract |
//! | [`retrieval`] | Listing and search |
//! | [`store`] | SQLite receipt store |

pub mod api;
pub mod blob;
pub mod config;
pub mod identity;
pub mod ingest;
pub mod ocr;
pub mod receipt;
pub mod retrieval;
pub mod store;
