use clap::Parser;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Browse registered project directories over HTTP"
)]
pub struct Cli {
    /// Settings file (JSON or TOML). Defaults to ./settings.json
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Directory holding one config file per project
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    /// Directory served under /static
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Listen port, overriding server_port from the settings file
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,
}
