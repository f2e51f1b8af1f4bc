//! Command line argument parsing using clap.

use clap::{Parser, ValueEnum};

use aerugo_roles::Config;

/// Drives the surface role engine against a headless backend
#[deny(missing_docs)]
#[derive(Parser, Debug)]
#[clap(about = "Runs scripted clients against the surface role engine", author, version)]
pub struct Args {
    /// Log filter
    ///
    /// Uses the same syntax as `RUST_LOG`, which is used when this is not specified.
    #[clap(long)]
    pub log: Option<String>,

    /// The scripted client to run
    #[clap(value_enum, default_value_t, short, long)]
    pub scenario: Scenario,

    /// Never release buffers right after commit, even if the renderer copied their contents.
    #[clap(long)]
    pub no_early_release: bool,

    /// Do not advertise `_NET_WM_SYNC_REQUEST` on toplevel windows.
    #[clap(long)]
    pub no_sync_request: bool,

    /// Do not advertise `_NET_WM_PING` on toplevel windows.
    #[clap(long)]
    pub no_ping: bool,

    /// Guess toplevel states from earlier window sizes when the window manager announces them late.
    #[clap(long)]
    pub state_workaround: bool,
}

impl Args {
    pub fn config(&self) -> Config {
        Config {
            early_release: !self.no_early_release,
            sync_request: !self.no_sync_request,
            net_wm_ping: !self.no_ping,
            state_workaround: self.state_workaround,
        }
    }
}

/// Enum containing every scripted client.
#[deny(missing_docs)]
#[derive(ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// A toplevel with synchronized subsurfaces which are restacked.
    Subsurfaces,

    /// A toplevel resized by the window manager through the configure handshake.
    Configure,

    /// A toplevel whose replaced buffer is still read by the renderer.
    #[clap(alias("release"))]
    BufferRelease,

    /// Run every scenario in turn.
    #[default]
    All,
}
