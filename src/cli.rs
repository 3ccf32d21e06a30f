//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;
use std::path::PathBuf;

use crate::constants::DEFAULT_API_URL;

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "BROCADE_DEBUG")]
    /// Enable debug logging. Env: BROCADE_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "5000", env = "BROCADE_PORT")]
    /// http listener, defaults to `5000`.
    /// Env: BROCADE_PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "BROCADE_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: BROCADE_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, short, default_value = "./static", env = "BROCADE_STATIC_DIR")]
    /// Where generated images are written and reference images live under `images/`.
    /// Env: BROCADE_STATIC_DIR
    pub static_dir: PathBuf,

    #[clap(long, default_value = DEFAULT_API_URL, env = "HF_API_URL")]
    /// Text-to-image endpoint. Env: HF_API_URL
    pub api_url: String,

    #[clap(long, required = true, env = "HF_API_TOKEN", hide_env_values = true)]
    /// Bearer token for the inference endpoint. Env: HF_API_TOKEN
    pub hf_api_token: String,

    #[clap(long, env = "BROCADE_UPSTREAM_TIMEOUT_SECS")]
    /// Give up on the upstream after this many seconds; waits forever if unset.
    /// Env: BROCADE_UPSTREAM_TIMEOUT_SECS
    pub upstream_timeout_secs: Option<u64>,
}
