//! Shell sessions and liveness checks
//!
//! A window manager checks whether the client behind a toplevel is alive by sending a ping to the window. The
//! ping is forwarded to the client through the session the shell surface was created with, and answered once the
//! client replies. Only one ping per session is forwarded at a time. Pings arriving in the meantime are answered
//! by the same reply, in the order they arrived.
//!
//! The outstanding serial belongs to the session, while the pings waiting for it are queued on each shell surface,
//! since every reply goes to the window the ping was sent to. A reply drains the queues of all shell surfaces of
//! the session, and a shell surface leaving the session drops its queue.

use slotmap::new_key_type;

use crate::{
    backend::{PingEvent, WindowId},
    role::RoleId,
    state::Compositor,
    ClientEvent,
};

new_key_type! {
    /// Identifies a client's shell session.
    pub struct WmBaseId;
}

#[derive(Debug, Default)]
pub(crate) struct WmBase {
    /// Shell surfaces created through the session.
    pub(crate) surfaces: Vec<RoleId>,

    /// The serial of the ping the client has not answered yet.
    ping_serial: Option<u32>,
}

impl Compositor {
    pub fn create_wm_base(&mut self) -> WmBaseId {
        self.wm_bases.insert(WmBase::default())
    }

    /// Destroys the session.
    ///
    /// Pings still waiting for the client are answered, since the client can no longer be asked. The shell
    /// surfaces of the session stay alive but no longer forward pings.
    pub fn destroy_wm_base(&mut self, wm_base: WmBaseId) {
        let Some(base) = self.wm_bases.remove(wm_base) else {
            return;
        };

        for role in base.surfaces {
            self.shell_reply_ping(role);

            if let Some(shell) = self.shell_surface_mut(role) {
                shell.wm_base = None;
            }
        }

        tracing::debug!(?wm_base, "Destroyed wm_base");
    }

    /// Handles the client's reply to a ping.
    pub fn pong(&mut self, wm_base: WmBaseId, serial: u32) {
        let Some(base) = self.wm_bases.get_mut(wm_base) else {
            return;
        };

        if base.ping_serial != Some(serial) {
            tracing::warn!(?wm_base, serial, "Client replied to an unknown ping");
            return;
        }

        base.ping_serial = None;

        for role in base.surfaces.clone() {
            self.shell_reply_ping(role);
        }
    }

    /// Called by the backend when the window manager checks whether the client of a window is alive.
    pub fn ping(&mut self, window: WindowId, event: PingEvent) {
        let Some(role) = self.role_for_window(window) else {
            tracing::trace!(%window, "Ping for unknown window");
            return;
        };

        if self.toplevel(role).is_none() {
            return;
        }

        let Some(shell) = self.shell_surface_mut(role) else {
            return;
        };

        let Some(wm_base) = shell.wm_base else {
            // Nobody to ask, so the client is assumed to be alive.
            self.backend.reply_ping(window, event);
            return;
        };

        shell.pings.push(event);

        let Some(base) = self.wm_bases.get_mut(wm_base) else {
            return;
        };

        if base.ping_serial.is_some() {
            return;
        }

        let serial = self.next_serial();

        if let Some(base) = self.wm_bases.get_mut(wm_base) {
            base.ping_serial = Some(serial);
        }

        tracing::debug!(%window, serial, "Forwarding ping to client");
        self.events.push(ClientEvent::Ping { wm_base, serial });
    }

    /// Answers every ping waiting on the shell surface.
    pub(super) fn shell_reply_ping(&mut self, role: RoleId) {
        let Some(shell) = self.shell_surface_mut(role) else {
            return;
        };

        let window = shell.backing.window;
        let pings = std::mem::take(&mut shell.pings);

        for event in pings {
            self.backend.reply_ping(window, event);
        }
    }
}
