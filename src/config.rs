use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "medimage-qc";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "medimage_qc_lib=info"
}

/// Root data directory: `~/.medimage-qc/`, falling back to the working
/// directory when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".medimage-qc")
}

/// Directory holding trained classifier weights and their sidecar metadata.
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

/// Default visual-problems classifier (ONNX weights; sidecar `.json` alongside).
pub fn default_classifier_path() -> PathBuf {
    models_dir().join("visual_image_problems.onnx")
}

/// Reference logo the template matcher searches for.
pub fn default_logo_template_path() -> PathBuf {
    app_data_dir().join("resources").join("medpix_logo.png")
}
