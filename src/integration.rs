//! Contracts for the collaborators that heavy initialization drives.
//!
//! The bootstrap controller decides when these run; what they do (seeding,
//! business routes, bundling) lives behind the traits.

use crate::config::AssetsConfig;
use crate::error::{Result, ServerError};
use async_trait::async_trait;
use axum::Router;
use std::path::{Path, PathBuf};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, info};

/// Prepares the database (migrations, seed data) before data routes exist
#[async_trait]
pub trait DatabaseInitializer: Send + Sync {
    async fn initialize(&self) -> Result<()>;
}

/// Adds the business routes to the router being assembled
#[async_trait]
pub trait RouteRegistrar: Send + Sync {
    async fn register(&self, router: Router) -> Result<Router>;
}

/// Client asset serving. Exactly one of the two is used per process.
#[async_trait]
pub trait AssetServer: Send + Sync {
    /// Development tooling (unbundled client sources)
    async fn setup_dev(&self, router: Router) -> Result<Router>;

    /// Production serving of the built bundle
    fn serve_static(&self, router: Router) -> Result<Router>;
}

/// Used when no database is wired into the process
pub struct NoDatabase;

#[async_trait]
impl DatabaseInitializer for NoDatabase {
    async fn initialize(&self) -> Result<()> {
        debug!("No database configured, skipping initialization");
        Ok(())
    }
}

/// Registers nothing; every business path answers 404
pub struct NoRoutes;

#[async_trait]
impl RouteRegistrar for NoRoutes {
    async fn register(&self, router: Router) -> Result<Router> {
        Ok(router)
    }
}

/// Serves the client from a directory, falling back to `index.html` so
/// client-side routing works on deep links.
pub struct DirectoryAssets {
    static_dir: PathBuf,
    dev_dir: PathBuf,
}

impl DirectoryAssets {
    pub fn new(config: &AssetsConfig) -> Self {
        Self {
            static_dir: PathBuf::from(&config.static_dir),
            dev_dir: PathBuf::from(&config.dev_dir),
        }
    }

    fn mount(router: Router, dir: &Path, component: &str) -> Result<Router> {
        if !dir.is_dir() {
            return Err(ServerError::component(
                component,
                format!(
                    "Could not find the build directory: {}, make sure to build the client first",
                    dir.display()
                ),
            ));
        }

        let index = dir.join("index.html");
        let service = ServeDir::new(dir).fallback(ServeFile::new(index));
        Ok(router.fallback_service(service))
    }
}

#[async_trait]
impl AssetServer for DirectoryAssets {
    async fn setup_dev(&self, router: Router) -> Result<Router> {
        let router = Self::mount(router, &self.dev_dir, "dev_assets")?;
        info!("Serving client sources from {}", self.dev_dir.display());
        Ok(router)
    }

    fn serve_static(&self, router: Router) -> Result<Router> {
        let router = Self::mount(router, &self.static_dir, "static_assets")?;
        info!("Serving client bundle from {}", self.static_dir.display());
        Ok(router)
    }
}

/// Mounts `dir` under `/attached_assets`
pub fn attach_assets(router: Router, dir: &str) -> Router {
    router.nest_service("/attached_assets", ServeDir::new(dir))
}
