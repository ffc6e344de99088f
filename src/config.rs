use std::{env, fmt::Display, net::IpAddr, path::PathBuf, str::FromStr};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::image::TargetBox;

#[derive(Error, Debug)]
#[error("Invalid {key} value {value:?}: {reason}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
    reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    /// SQLite file, or `:memory:`.
    pub database: String,
    pub upload_dir: PathBuf,
    pub image_box: TargetBox,
    pub max_image_pixels: u64,
    pub max_upload_bytes: usize,
    pub seed: bool,
    /// Base the stored `/uploads/...` references are served under.
    pub public_url: Url,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let public_url: Url = try_load(&lookup, "TILESMART_PUBLIC_URL", "http://localhost:8080/")?;

        Ok(Self {
            bind: try_load(&lookup, "TILESMART_BIND", "0.0.0.0")?,
            port: try_load(&lookup, "TILESMART_PORT", "8080")?,
            database: try_load(&lookup, "TILESMART_DATABASE", "tilesmart.db")?,
            upload_dir: try_load(&lookup, "TILESMART_UPLOAD_DIR", "uploads")?,
            image_box: TargetBox {
                width: try_load_positive(&lookup, "TILESMART_IMAGE_WIDTH", "800")?,
                height: try_load_positive(&lookup, "TILESMART_IMAGE_HEIGHT", "600")?,
            },
            max_image_pixels: try_load_positive(
                &lookup,
                "TILESMART_MAX_IMAGE_PIXELS",
                "16000000",
            )?,
            max_upload_bytes: try_load(&lookup, "TILESMART_MAX_UPLOAD_BYTES", "10485760")?,
            seed: try_load(&lookup, "TILESMART_SEED", "true")?,
            public_url: with_trailing_slash(public_url),
        })
    }

    /// Public URL of a stored `/uploads/...` reference.
    pub fn public_url_for(&self, stored_path: &str) -> Option<String> {
        self.public_url
            .join(stored_path.trim_start_matches('/'))
            .map(String::from)
            .ok()
    }
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| {
        warn!("Invalid {key} value: {e}");
        ConfigError {
            key,
            reason: e.to_string(),
            value,
        }
    })
}

fn try_load_positive<T: FromStr + Default + PartialEq>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value: T = try_load(lookup, key, default)?;
    if value == T::default() {
        warn!("Invalid {key} value: must be greater than zero");
        return Err(ConfigError {
            key,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

// Url::join drops the last segment of a base without one.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).expect("defaults");

        assert_eq!(config.port, 8080);
        assert_eq!(config.image_box, TargetBox::STANDARD);
        assert_eq!(config.max_image_pixels, crate::image::DEFAULT_MAX_PIXELS);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert!(config.seed);
        assert_eq!(config.public_url.as_str(), "http://localhost:8080/");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("TILESMART_PORT", "9000"),
            ("TILESMART_IMAGE_WIDTH", "1024"),
            ("TILESMART_IMAGE_HEIGHT", " 768 "),
            ("TILESMART_SEED", "false"),
            ("TILESMART_DATABASE", ":memory:"),
        ])
        .expect("config");

        assert_eq!(config.port, 9000);
        assert_eq!(
            config.image_box,
            TargetBox {
                width: 1024,
                height: 768
            }
        );
        assert!(!config.seed);
        assert_eq!(config.database, ":memory:");
    }

    #[test]
    fn invalid_value_is_an_error() {
        let err = config_from(&[("TILESMART_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("TILESMART_PORT"));
    }

    #[test]
    fn zero_sized_box_is_rejected() {
        for key in ["TILESMART_IMAGE_WIDTH", "TILESMART_IMAGE_HEIGHT"] {
            let err = config_from(&[(key, "0")]).unwrap_err();
            assert!(err.to_string().contains(key), "{err}");
        }
        assert!(config_from(&[("TILESMART_MAX_IMAGE_PIXELS", "0")]).is_err());
    }

    #[test]
    fn public_url_keeps_base_path() {
        let config =
            config_from(&[("TILESMART_PUBLIC_URL", "https://cdn.example.com/static")]).expect("config");

        assert_eq!(
            config.public_url_for("/uploads/tiles/1_oak.jpg").as_deref(),
            Some("https://cdn.example.com/static/uploads/tiles/1_oak.jpg")
        );
    }
}
