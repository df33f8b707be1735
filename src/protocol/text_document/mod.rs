//! =============================================================================
//! textDocument/* Handlers
//! =============================================================================
//!
//! Houses the document-sync translators and the linked-editing-range adapter.

pub mod did_change;
pub mod did_close;
pub mod did_open;
pub mod linked_editing_range;
