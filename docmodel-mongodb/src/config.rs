//! Connection settings for the MongoDB store.

use serde::Deserialize;

/// MongoDB connection settings, loadable from an application's own configuration.
///
/// ```ignore
/// let config: MongoDbConfig = serde_json::from_str(r#"{
///     "uri": "mongodb://localhost:27017",
///     "database": "app"
/// }"#)?;
/// let store = MongoDbStoreBuilder::from_config(config).build().await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MongoDbConfig {
    /// Connection string, `mongodb://` or `mongodb+srv://`.
    pub uri: String,
    pub database: String,
    #[serde(default)]
    pub app_name: Option<String>,
    /// Documents per cursor batch; the server default when unset.
    #[serde(default)]
    pub batch_size: Option<u32>,
}
