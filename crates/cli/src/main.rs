//! irodsfuse - mount an iRODS collection as a local filesystem.
//!
//! ```text
//! irodsfuse [flags] <source> <mountpoint>
//!
//! irodsfuse irods://alice@data.example.org:1247/tempZone/home/alice /mnt/irods
//! irodsfuse mappings.yaml /mnt/irods
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 configuration or validation error,
//! 2 mount failure, 3 runtime abort.

mod args;
mod prompt;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::runtime::Handle;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use irods_fuse_client::{MemoryObjectClient, ObjectClient};
use irods_fuse_common::Config;
use irods_fuse_fs::FsContext;

use crate::args::Args;

const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_MOUNT_FAILURE: i32 = 2;
const EXIT_RUNTIME_ABORT: i32 = 3;

#[tokio::main]
async fn main() {
    let args: Args = Args::parse();

    if args.version {
        println!("irodsfuse {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config: Config = match args::build_config(&args) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("irodsfuse: {}", message);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    if let Err(error) = config.validate() {
        eprintln!("irodsfuse: {}", error);
        std::process::exit(EXIT_CONFIG_ERROR);
    }

    if let Err(error) = init_logging(&config) {
        eprintln!("irodsfuse: {}", error);
        std::process::exit(EXIT_CONFIG_ERROR);
    }

    if let Err(error) = config.make_work_dirs() {
        error!(%error, "could not create working directories");
        std::process::exit(EXIT_CONFIG_ERROR);
    }

    let exit_code: i32 = run(config).await;
    std::process::exit(exit_code);
}

async fn run(config: Config) -> i32 {
    let mountpoint: PathBuf = PathBuf::from(&config.mount_path);
    let driver: Arc<dyn ObjectClient> = create_driver(&config);
    let ctx: Arc<FsContext> = FsContext::new(config, driver);

    if let Err(error) = ctx.prepare().await {
        error!(%error, "could not prepare mapped remote roots");
        cleanup(&ctx);
        return EXIT_MOUNT_FAILURE;
    }

    let session = match irods_fuse_fs::spawn_mount(ctx.clone(), Handle::current(), &mountpoint)
    {
        Ok(session) => session,
        Err(error) => {
            error!(%error, mountpoint = %mountpoint.display(), "mount failed");
            cleanup(&ctx);
            return EXIT_MOUNT_FAILURE;
        }
    };

    info!(mountpoint = %mountpoint.display(), "serving; press ctrl-c to unmount");

    let exit_code: i32 = match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("unmounting");
            0
        }
        Err(error) => {
            error!(%error, "signal handling failed");
            EXIT_RUNTIME_ABORT
        }
    };

    ctx.terminate();
    drop(session);
    cleanup(&ctx);
    exit_code
}

/// The bundled in-process driver.
///
/// Native protocol drivers plug in behind `ObjectClient`; the in-memory
/// driver backs tests and local development mounts. It seeds the mapped
/// collections so the mount comes up with its roots in place.
fn create_driver(config: &Config) -> Arc<dyn ObjectClient> {
    let client: MemoryObjectClient = MemoryObjectClient::with_owner(&config.client_user);
    for mapping in &config.path_mappings {
        client.add_dir(&mapping.remote_path);
    }
    Arc::new(client)
}

fn init_logging(config: &Config) -> Result<(), String> {
    let filter: EnvFilter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.debug { "debug" } else { "info" })
    });

    if config.foreground {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| e.to_string())
    } else {
        let log_path: PathBuf = config.log_file_path();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("could not create log directory: {}", e))?;
        }
        let log_file: File = File::create(&log_path)
            .map_err(|e| format!("could not open log file {}: {}", log_path.display(), e))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_ansi(false).with_writer(Arc::new(log_file)))
            .try_init()
            .map_err(|e| e.to_string())
    }
}

fn cleanup(ctx: &FsContext) {
    if let Err(error) = ctx.config().clean_work_dirs() {
        error!(%error, "could not remove working directories");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irods_fuse_common::config::PathMapping;

    #[tokio::test]
    async fn test_driver_seeds_mapping_roots() {
        let config: Config = Config {
            client_user: "alice".to_string(),
            path_mappings: vec![
                PathMapping::new("/tempZone/home/alice", "/"),
                PathMapping::new("/tempZone/shared", "/shared"),
            ],
            ..Default::default()
        };

        let driver: Arc<dyn ObjectClient> = create_driver(&config);
        assert!(driver.exists("/tempZone/home/alice").await.unwrap());
        assert!(driver.exists("/tempZone/shared").await.unwrap());
    }

    #[test]
    fn test_cleanup_is_quiet_on_missing_dirs() {
        let root: tempfile::TempDir = tempfile::TempDir::new().unwrap();
        let config: Config = Config {
            data_root_path: root.path().display().to_string(),
            path_mappings: vec![PathMapping::new("/z", "/")],
            ..Default::default()
        };
        let driver: Arc<dyn ObjectClient> = create_driver(&config);
        let ctx: Arc<FsContext> = FsContext::new(config, driver);
        // nothing was created yet; cleanup must not panic
        cleanup(&ctx);
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        assert_ne!(EXIT_CONFIG_ERROR, EXIT_MOUNT_FAILURE);
        assert_ne!(EXIT_MOUNT_FAILURE, EXIT_RUNTIME_ABORT);
    }
}
