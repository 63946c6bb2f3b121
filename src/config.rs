//! CLI arguments and the immutable server configuration built from them.

use clap::Parser;
use shadow_rs::formatcp;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::auth::AuthGate;
use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_UPLOAD_LIMIT: u64 = 10 * 1024 * 1024;
pub const AUTH_REALM: &str = "Authorization Required";
pub const SHUTDOWN_GRACE_SECS: u64 = 10;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "pico-drive", version = VERSION_INFO, about = "Minimal HTTP file browser")]
pub struct Args {
    #[arg(
        short = 'p',
        long,
        env = "PICO_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Port to listen on"
    )]
    pub port: u16,
    #[arg(
        short = 'b',
        long,
        env = "PICO_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub bind: String,
    #[arg(
        short = 'r',
        long,
        env = "PICO_ROOT",
        default_value = ".",
        help = "Root directory to serve files from"
    )]
    pub root: String,
    #[arg(
        short = 'a',
        long,
        env = "PICO_AUTH",
        help = "Enable basic authentication with username:password"
    )]
    pub auth: Option<String>,
    #[arg(
        short = 'u',
        long = "upload",
        env = "PICO_UPLOAD_LIMIT",
        default_value_t = DEFAULT_UPLOAD_LIMIT,
        help = "Upload limit in bytes (0 to disable uploads)"
    )]
    pub upload_limit: u64,
    #[arg(
        short = 'l',
        long = "log",
        env = "PICO_LOG",
        help = "Request log file (omit to disable request logging)"
    )]
    pub log_file: Option<PathBuf>,
}

/// Process-wide settings, fixed before the router starts.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub root: PathBuf,
    pub auth: AuthGate,
    pub upload_limit: u64,
    pub log_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Validates CLI arguments and resolves the root to an absolute directory.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let bind = args
            .bind
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidBind(args.bind.clone()))?;
        let auth = match args.auth.as_deref() {
            Some(value) => AuthGate::parse(value)?,
            None => AuthGate::Disabled,
        };
        let root = std::fs::canonicalize(&args.root)
            .map_err(|err| ConfigError::InvalidRoot(args.root.clone(), err))?;
        if !root.is_dir() {
            return Err(ConfigError::InvalidRoot(
                args.root,
                io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
            ));
        }

        Ok(Self {
            bind,
            port: args.port,
            root,
            auth,
            upload_limit: args.upload_limit,
            log_file: args.log_file,
        })
    }

    /// Uploads are rejected outright when the limit is zero.
    pub fn uploads_enabled(&self) -> bool {
        self.upload_limit > 0
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidAuth,
    InvalidBind(String),
    InvalidRoot(String, io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidAuth => write!(f, "invalid auth format, use username:password"),
            ConfigError::InvalidBind(value) => write!(f, "invalid bind address: {value}"),
            ConfigError::InvalidRoot(value, err) => {
                write!(f, "invalid root directory {value}: {err}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for io::Error {
    fn from(err: ConfigError) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, err.to_string())
    }
}
