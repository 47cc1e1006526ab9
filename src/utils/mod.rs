use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initializes the global tracing subscriber with sensible defaults.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::from_default_env().add_directive(
            "docflow_wizards=info"
                .parse()
                .unwrap_or_else(|_| tracing::Level::INFO.into()),
        );

        let _ = fmt().with_env_filter(filter).try_init();
    });
}

/// Uppercases and trims a code so comparisons ignore casing and padding.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
