/// Tunables of the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Release buffers right after commit when the renderer reports it copied their contents.
    pub early_release: bool,

    /// Advertise `_NET_WM_SYNC_REQUEST` on toplevel windows when the backend supports frame synchronization.
    pub sync_request: bool,

    /// Advertise `_NET_WM_PING` on toplevel windows.
    pub net_wm_ping: bool,

    /// Guess the window manager states of a toplevel from the sizes it had in each combination of maximized and
    /// fullscreen, for window managers which resize a window before announcing its new states.
    pub state_workaround: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            early_release: true,
            sync_request: true,
            net_wm_ping: true,
            state_workaround: false,
        }
    }
}
