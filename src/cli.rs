//! Command-line interface

use clap::Parser;

/// Home Connect Gateway - device-flow OAuth broker and appliance API proxy
#[derive(Parser, Debug)]
#[command(name = "homeconnect-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "HC_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "HC_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "HC_GATEWAY_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "HC_GATEWAY_LOG_FORMAT")]
    pub log_format: Option<String>,
}
