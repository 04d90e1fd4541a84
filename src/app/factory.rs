use crate::{
    app::{backend::AppBackend, local::AppLocal, remote::AppRemote},
    config::Config,
    storage,
};
use anyhow::{Context, Result};
use homedir::my_home;
use std::sync::{Arc, RwLock};

/// Application factory for creating and configuring application components
pub struct AppFactory;

impl AppFactory {
    /// Create the backend for CLI use: remote when COLAUNCH_ADDR is
    /// set, local otherwise.
    pub fn create_backend(paths: &AppPaths) -> Result<Box<dyn AppBackend>> {
        if std::env::var("COLAUNCH_ADDR").is_ok() {
            Self::create_remote_backend()
        } else {
            let config = Self::create_config(&paths.base_path)?;
            Self::create_local_backend(paths, config)
        }
    }

    fn create_local_backend(
        paths: &AppPaths,
        config: Arc<RwLock<Config>>,
    ) -> Result<Box<dyn AppBackend>> {
        let storage_mgr = storage::BackendLocal::new(&paths.uploads_path)?;
        Ok(Box::new(AppLocal::new(config, paths, storage_mgr)?))
    }

    /// Create a local application instance (daemon mode).
    pub fn create_local_app(paths: &AppPaths) -> Result<AppLocal> {
        let config = Self::create_config(&paths.base_path)?;
        let storage_mgr = storage::BackendLocal::new(&paths.uploads_path)?;

        AppLocal::new(config, paths, storage_mgr)
    }

    /// Get application paths with validation
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path()?;

        // Ensure base directory exists
        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Ok(AppPaths::new(&base_path))
    }

    /// Create configuration with validation
    pub fn create_config(base_path: &str) -> Result<Arc<RwLock<Config>>> {
        let config = Config::load_with(base_path)?;

        Ok(Arc::new(RwLock::new(config)))
    }

    /// Get the base path for the application
    fn get_base_path() -> Result<String> {
        let base_path = std::env::var("COLAUNCH_BASE_PATH").unwrap_or_else(|_| {
            let home = my_home()
                .expect("Could not determine home directory")
                .expect("Home directory path is empty");
            format!("{}/.local/share/colaunch", home.to_string_lossy())
        });

        Ok(base_path)
    }

    /// Create remote backend from COLAUNCH_ADDR environment variable
    fn create_remote_backend() -> Result<Box<dyn AppBackend>> {
        let backend_addr =
            std::env::var("COLAUNCH_ADDR").context("COLAUNCH_ADDR not set for remote backend")?;
        log::info!("Using remote backend: {}", backend_addr);
        let basic_auth = Self::parse_basic_auth()?;
        let bearer_token = Self::parse_bearer_token();
        Ok(Box::new(AppRemote::new(
            &backend_addr,
            basic_auth,
            bearer_token,
        )))
    }

    /// Parse basic authentication from environment
    fn parse_basic_auth() -> Result<Option<(String, Option<String>)>> {
        match std::env::var("COLAUNCH_BASIC_AUTH") {
            Ok(ba) => {
                let parts: Vec<_> = ba.split(':').collect();
                match parts.as_slice() {
                    [username] => Ok(Some((username.to_string(), None))),
                    [username, password] => {
                        Ok(Some((username.to_string(), Some(password.to_string()))))
                    }
                    _ => {
                        log::warn!("Invalid COLAUNCH_BASIC_AUTH format. Expected 'username' or 'username:password'");
                        Ok(None)
                    }
                }
            }
            Err(_) => Ok(None),
        }
    }

    /// Parse bearer token from environment
    fn parse_bearer_token() -> Option<String> {
        std::env::var("COLAUNCH_AUTH_TOKEN")
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: String,
    pub ideas_path: String,
    pub offers_path: String,
    pub deals_path: String,
    pub users_path: String,
    pub uploads_path: String,
}

impl AppPaths {
    pub fn new(base_path: &str) -> Self {
        Self {
            base_path: base_path.to_string(),
            ideas_path: format!("{base_path}/ideas.csv"),
            offers_path: format!("{base_path}/offers.csv"),
            deals_path: format!("{base_path}/deals.csv"),
            users_path: format!("{base_path}/users.csv"),
            uploads_path: format!("{base_path}/uploads"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_paths() {
        let paths = AppPaths::new("/test/base");

        assert_eq!(paths.base_path, "/test/base");
        assert_eq!(paths.ideas_path, "/test/base/ideas.csv");
        assert_eq!(paths.offers_path, "/test/base/offers.csv");
        assert_eq!(paths.deals_path, "/test/base/deals.csv");
        assert_eq!(paths.users_path, "/test/base/users.csv");
        assert_eq!(paths.uploads_path, "/test/base/uploads");
    }
}
