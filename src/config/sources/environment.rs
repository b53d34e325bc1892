//! Environment variable source: BRANCHDB prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Add environment variable overlay to builder.
/// Uses BRANCHDB prefix and __ as separator, e.g. `BRANCHDB__CACHE__ENABLED=true`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix("BRANCHDB")
            .separator("__")
            .try_parsing(true),
    );
    Ok(builder)
}
