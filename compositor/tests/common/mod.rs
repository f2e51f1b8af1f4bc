#![allow(dead_code)]

use aerugo_roles::{
    backend::{headless::HeadlessBackend, WindowId},
    surface::SurfaceId,
    ClientEvent, Compositor, Config, ShellHandle, ToplevelHandle, WmBaseId,
};

pub fn compositor() -> Compositor {
    Compositor::new(Config::default(), HeadlessBackend::new())
}

pub fn headless(compositor: &Compositor) -> &HeadlessBackend {
    compositor
        .downcast_backend::<HeadlessBackend>()
        .expect("headless backend")
}

pub fn headless_mut(compositor: &mut Compositor) -> &mut HeadlessBackend {
    compositor
        .downcast_backend_mut::<HeadlessBackend>()
        .expect("headless backend")
}

/// Returns the serials of every configure sent for the shell surface.
pub fn configures(events: &[ClientEvent], shell: &ShellHandle) -> Vec<u32> {
    events
        .iter()
        .filter_map(|event| match *event {
            ClientEvent::Configure { role, serial } if role == shell.id() => Some(serial),
            _ => None,
        })
        .collect()
}

pub struct MappedToplevel {
    pub wm_base: WmBaseId,
    pub surface: SurfaceId,
    pub shell: ShellHandle,
    pub toplevel: ToplevelHandle,
    pub window: WindowId,
}

/// Creates a toplevel, answers the initial configure and maps it with a buffer of the given size.
///
/// Events and backend requests made along the way are discarded.
pub fn mapped_toplevel(compositor: &mut Compositor, width: i32, height: i32) -> MappedToplevel {
    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let toplevel = compositor.get_toplevel(&shell).unwrap();

    compositor.commit(surface);

    let events = compositor.drain_events();
    let serial = *configures(&events, &shell).last().expect("initial configure");
    compositor.ack_configure(&shell, serial).unwrap();

    let buffer = compositor.create_buffer(width, height);
    compositor.attach(surface, Some(buffer), 0, 0);
    compositor.commit(surface);

    assert!(compositor.toplevel_mapped(&toplevel));

    let window = compositor.role_window(shell.id()).expect("toplevel window");

    compositor.drain_events();
    headless_mut(compositor).drain_requests();

    MappedToplevel {
        wm_base,
        surface,
        shell,
        toplevel,
        window,
    }
}

/// Creates a surface with a buffer of the given size attached but not committed.
pub fn surface_with_buffer(compositor: &mut Compositor, width: i32, height: i32) -> SurfaceId {
    let surface = compositor.create_surface();
    let buffer = compositor.create_buffer(width, height);
    compositor.attach(surface, Some(buffer), 0, 0);
    surface
}
