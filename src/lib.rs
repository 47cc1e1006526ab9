#![doc(test(attr(deny(warnings))))]

//! Multi-step creation and edit wizards for a document-management backend:
//! approval groups, circuits, document lines, general accounts, sub-types and
//! user registration, all driven by one generic wizard engine.

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod utils;
pub mod wizard;

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes global tracing and emits a startup info log.
pub fn init() {
    INIT_TRACING.call_once(|| {
        utils::init_tracing();
        tracing::info!("Docflow wizards tracing initialized.");
    });
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_does_not_panic() {
        super::init();
    }
}
