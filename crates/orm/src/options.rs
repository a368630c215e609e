use anyhow::Context;
use fromenv::FromEnv;

/// Settings used when turning stored values into output values.
///
/// Loaded from the environment with [`tessera_sql::FromEnv`]; every variable
/// is optional.
#[derive(Debug, Clone, FromEnv)]
pub struct MappingOptions {
    /// Base URL prepended to file-reference values.
    #[env(from = "ORM_FILES_URL", default = "/files")]
    pub files_url: String,

    /// `chrono` format of the `{key}Date` output of timestamps.
    #[env(from = "ORM_DATE_FORMAT", default = "%d/%m/%Y")]
    pub date_format: String,

    /// `chrono` format of the `{key}Full` output of timestamps.
    #[env(from = "ORM_DATETIME_FORMAT", default = "%d/%m/%Y %H:%M")]
    pub datetime_format: String,

    /// SQL selecting the clear text of an encrypted column; `{column}` is
    /// replaced with the qualified column.
    #[env(
        from = "ORM_DECRYPT_TEMPLATE",
        default = "CAST(AES_DECRYPT({column}, @encryption_key) AS CHAR)"
    )]
    pub decrypt_template: String,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            files_url: "/files".to_string(),
            date_format: "%d/%m/%Y".to_string(),
            datetime_format: "%d/%m/%Y %H:%M".to_string(),
            decrypt_template: "CAST(AES_DECRYPT({column}, @encryption_key) AS CHAR)".to_string(),
        }
    }
}

impl tessera_sql::FromEnv for MappingOptions {
    fn from_env() -> anyhow::Result<Self> {
        Self::from_env().finalize().context("issue loading mapping options")
    }
}

impl MappingOptions {
    /// Decrypt expression for a qualified column.
    #[must_use]
    pub fn decrypt(&self, column: &str) -> String {
        self.decrypt_template.replace("{column}", column)
    }
}
