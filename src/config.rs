use std::{env, fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::loader::DEFAULT_MENU_CANDIDATES;

pub const DEFAULT_TEMPLATE_A_URL: &str = "https://raw.githubusercontent.com/hyeridfd/usability_choicen/main/templates/%EC%8B%9D%EB%8B%A8%ED%91%9C%20A.xlsx";
pub const DEFAULT_TEMPLATE_B_URL: &str = "https://raw.githubusercontent.com/hyeridfd/usability_choicen/main/templates/%EC%8B%9D%EB%8B%A8%ED%91%9C%20B.xlsx";

/// Connection details for the hosted storage/table service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub service_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub log_file: PathBuf,
    pub template_dir: PathBuf,
    pub menu_paths: Vec<PathBuf>,
    /// Argon2 users file; the built-in roster is used when unset.
    pub users_file: Option<PathBuf>,
    /// Present only when URL, key and bucket are all set.
    pub remote: Option<RemoteConfig>,
    pub template_a_url: String,
    pub template_b_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            upload_dir: PathBuf::from("uploads"),
            log_file: PathBuf::from("log.csv"),
            template_dir: PathBuf::from("templates"),
            menu_paths: DEFAULT_MENU_CANDIDATES.iter().map(PathBuf::from).collect(),
            users_file: None,
            remote: None,
            template_a_url: DEFAULT_TEMPLATE_A_URL.to_string(),
            template_b_url: DEFAULT_TEMPLATE_B_URL.to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Config::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; `load` uses the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let menu_paths = match var("PORTAL_MENU_PATHS") {
            Some(paths) => env::split_paths(&paths).collect(),
            None => defaults.menu_paths,
        };

        let remote = match (
            var("SUPABASE_URL"),
            var("SUPABASE_SERVICE_ROLE_KEY"),
            var("SUPABASE_BUCKET"),
        ) {
            (Some(url), Some(service_key), Some(bucket)) => Some(RemoteConfig {
                url: url.trim_end_matches('/').to_string(),
                service_key,
                bucket,
            }),
            (None, None, None) => {
                info!("Remote storage not configured, using local storage only");
                None
            }
            _ => {
                warn!("Remote storage partially configured, using local storage only");
                None
            }
        };

        Config {
            addr: try_load(&var, "PORTAL_ADDR", defaults.addr),
            upload_dir: var("PORTAL_UPLOAD_DIR").map_or(defaults.upload_dir, PathBuf::from),
            log_file: var("PORTAL_LOG_FILE").map_or(defaults.log_file, PathBuf::from),
            template_dir: var("PORTAL_TEMPLATE_DIR").map_or(defaults.template_dir, PathBuf::from),
            menu_paths,
            users_file: var("PORTAL_USERS_FILE").map(PathBuf::from),
            remote,
            template_a_url: var("PORTAL_TEMPLATE_A_URL").unwrap_or(defaults.template_a_url),
            template_b_url: var("PORTAL_TEMPLATE_B_URL").unwrap_or(defaults.template_b_url),
        }
    }
}

fn try_load<T>(var: impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match var(key) {
        None => {
            info!("{key} not set, using default: {default}");
            default
        }
        Some(value) => value.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{value}': {e}, using default: {default}");
            default
        }),
    }
}
