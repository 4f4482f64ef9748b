use serde::{de::Visitor, Deserialize};
use std::{
    net::SocketAddr,
    ops::Deref,
    path::{Path, PathBuf},
};
use url::Url;

use crate::error::StartupError;

#[derive(Deserialize, Debug)]
pub struct DbConfig {
    /// Created on first start if it doesn't exist.
    pub sqlite_file: PathBuf,
}

#[derive(Deserialize, Debug)]
pub struct NetConfig {
    pub proto_host: Url,
    pub bind: SocketAddr,
}

#[derive(Deserialize, Debug)]
pub struct SiteConfig {
    pub name: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub default_social_image: Option<Url>,
    #[serde(default)]
    pub static_dir: Option<ValidPath>,
}

#[derive(Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Deserialize, Debug)]
pub struct LogConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    String::from("info")
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: default_filter(),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub db: DbConfig,
    pub net: NetConfig,
    pub site: SiteConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config, StartupError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

/// A path that existed when the config was read, stored canonicalized.
#[derive(Debug)]
pub struct ValidPath(PathBuf);

impl<'de> Deserialize<'de> for ValidPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ValidPathVisitor;
        impl Visitor<'_> for ValidPathVisitor {
            type Value = ValidPath;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "a path to an existing directory")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let path = PathBuf::from(v)
                    .canonicalize()
                    .map_err(|err| E::custom(format!("{}: {}", v, err)))?;
                if !path.is_dir() {
                    return Err(E::custom(format!("{} is not a directory", v)));
                }
                Ok(ValidPath(path))
            }
        }

        deserializer.deserialize_str(ValidPathVisitor)
    }
}

impl Deref for ValidPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.0.as_path()
    }
}
