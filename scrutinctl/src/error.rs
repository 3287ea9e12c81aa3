use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("failed to read rule file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid rule file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("rule '{key}' has an invalid pattern")]
    Pattern {
        key: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule key must not be blank")]
    BlankKey,
    #[error("duplicate rule key '{0}'")]
    DuplicateKey(String),
    #[error("invalid rule spec '{0}', expected KEY=PATTERN")]
    InlineSpec(String),
}
