pub mod config;
pub mod pipeline; // Text, geometry, classifier, fusion and the stage driver
pub mod pipeline_config;
pub mod records;

pub use pipeline::processor::{build_processor, ImageProcessor, RunReport};
pub use pipeline::QcError;
pub use pipeline_config::QcConfig;
pub use records::{ImageRecord, RecordTable, Stage};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the
/// default filter. Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    if result.is_ok() {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
