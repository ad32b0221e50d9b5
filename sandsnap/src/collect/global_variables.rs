/// Directory used when a job does not name an output location.
pub const TEMP_PATH: &str = "./temp";

/// Per-request timeout, in seconds, for every call to the service.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// SandSnap survey feature service (FeatureServer root, without `/query`).
pub const SANDSNAP_SERVICE_URL: &str = "https://services6.arcgis.com/rZL2YPlohtwSQBWu/arcgis/rest/services/survey123_402b0c9d9dfe4bcc8b4b7d6873c710fe_fieldworker/FeatureServer";

/// Layer holding the survey points.
pub const DEFAULT_LAYER: u32 = 0;

/// Keeps only processed samples with a calculated grain size.
pub const DEFAULT_FILTER: &str = "calc_grain_size <> 'Unknown Grain Size' AND calc_grain_size IS NOT NULL AND unknown_error_flag = 'False' AND process_status <> 'Error'";
