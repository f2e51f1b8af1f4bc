use std::process::ExitCode;

use aerugo_roles::{
    backend::{headless::HeadlessBackend, ConfigureEvent},
    error::Result,
    surface::SurfaceId,
    ClientEvent, Compositor, ShellHandle,
};
use clap::Parser;
use euclid::default::{Point2D, Size2D};
use tracing::metadata::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::{Args, Scenario};

mod cli;

fn main() -> ExitCode {
    let args = Args::parse();

    let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());
    let env_filter = match &args.log {
        Some(filter) => builder.parse_lossy(filter),
        None => builder.from_env_lossy(),
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let scenarios: &[Scenario] = match args.scenario {
        Scenario::All => &[Scenario::Subsurfaces, Scenario::Configure, Scenario::BufferRelease],
        ref scenario => std::slice::from_ref(scenario),
    };

    for &scenario in scenarios {
        let _span = tracing::info_span!("scenario", ?scenario).entered();

        let mut compositor = Compositor::new(args.config(), HeadlessBackend::new());

        let result = match scenario {
            Scenario::Subsurfaces => subsurfaces(&mut compositor),
            Scenario::Configure => configure(&mut compositor),
            Scenario::BufferRelease => buffer_release(&mut compositor),
            Scenario::All => Ok(()),
        };

        compositor.shutdown();
        report(&mut compositor);

        if let Err(err) = result {
            tracing::error!(
                interface = err.interface(),
                code = err.code(),
                "Client made an invalid request: {err}"
            );
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}

/// Logs every request made to the backend and every event for clients since the last report.
fn report(compositor: &mut Compositor) {
    if let Some(backend) = compositor.downcast_backend_mut::<HeadlessBackend>() {
        for request in backend.drain_requests() {
            tracing::info!(?request, "Backend request");
        }
    }

    for event in compositor.drain_events() {
        tracing::info!(?event, "Client event");
    }
}

/// Returns the serial of the last configure sent for the shell surface.
fn last_configure(events: &[ClientEvent], shell: &ShellHandle) -> Option<u32> {
    events.iter().rev().find_map(|event| match *event {
        ClientEvent::Configure { role, serial } if role == shell.id() => Some(serial),
        _ => None,
    })
}

/// Creates a toplevel and maps it with a buffer of the given size.
fn map_toplevel(compositor: &mut Compositor, width: i32, height: i32) -> Result<(ShellHandle, SurfaceId)> {
    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface)?;
    let _toplevel = compositor.get_toplevel(&shell)?;

    // The initial commit is answered with a configure.
    compositor.commit(surface);

    let events = compositor.drain_events();
    if let Some(serial) = last_configure(&events, &shell) {
        compositor.ack_configure(&shell, serial)?;
    }

    let buffer = compositor.create_buffer(width, height);
    compositor.attach(surface, Some(buffer), 0, 0);
    compositor.commit(surface);

    report(compositor);
    Ok((shell, surface))
}

fn subsurfaces(compositor: &mut Compositor) -> Result<()> {
    let (_shell, parent) = map_toplevel(compositor, 200, 100)?;

    let above = compositor.create_surface();
    let below = compositor.create_surface();
    let above_role = compositor.get_subsurface(above, parent)?;
    let below_role = compositor.get_subsurface(below, parent)?;

    compositor.set_position(&above_role, 10, 10);
    compositor.set_position(&below_role, -20, -20);

    for (surface, size) in [(above, 50), (below, 40)] {
        let buffer = compositor.create_buffer(size, size);
        compositor.attach(surface, Some(buffer), 0, 0);
        compositor.commit(surface);
    }

    // Synchronized children apply their state with the parent.
    compositor.place_below(&below_role, parent)?;
    compositor.frame(parent);
    compositor.commit(parent);
    report(compositor);

    // The window grows to the west and north, so it is moved to keep the parent in place.
    compositor.set_desync(&below_role);
    compositor.set_position(&below_role, -30, -30);
    compositor.commit(parent);
    report(compositor);

    compositor.destroy_subsurface(above_role);
    compositor.destroy_subsurface(below_role);
    compositor.commit(parent);

    Ok(())
}

fn configure(compositor: &mut Compositor) -> Result<()> {
    let (shell, surface) = map_toplevel(compositor, 200, 100)?;

    let Some(window) = compositor.role_window(shell.id()) else {
        return Ok(());
    };

    compositor.set_window_geometry(&shell, 10, 10, 180, 80);
    compositor.commit(surface);
    report(compositor);

    // The window manager resizes the window.
    compositor.sync_request(window);
    compositor.configure_notify(
        window,
        ConfigureEvent {
            position: Point2D::new(100, 100),
            size: Size2D::new(400, 300),
            synthetic: false,
        },
    );

    let events = compositor.drain_events();
    for event in &events {
        tracing::info!(?event, "Client event");
    }

    if let Some(serial) = last_configure(&events, &shell) {
        compositor.ack_configure(&shell, serial)?;

        let buffer = compositor.create_buffer(400, 300);
        compositor.attach(surface, Some(buffer), 0, 0);
        compositor.commit(surface);
    }

    report(compositor);

    // Acknowledging the same configure twice is a protocol error.
    if let Some(serial) = last_configure(&events, &shell) {
        if let Err(err) = compositor.ack_configure(&shell, serial) {
            tracing::info!("Duplicate acknowledgement rejected: {err}");
        }
    }

    Ok(())
}

fn buffer_release(compositor: &mut Compositor) -> Result<()> {
    let (_shell, surface) = map_toplevel(compositor, 200, 100)?;

    let Some(old) = compositor.current_state(surface).and_then(|state| state.buffer) else {
        return Ok(());
    };

    if let Some(backend) = compositor.downcast_backend_mut::<HeadlessBackend>() {
        backend.set_busy(old, true);
        backend.advance(16_000);
    }

    let buffer = compositor.create_buffer(200, 100);
    compositor.attach(surface, Some(buffer), 0, 0);
    let callback = compositor.frame(surface);
    compositor.commit(surface);

    // The frame callback waits for the renderer to stop reading the replaced buffer.
    let waiting = !compositor
        .drain_events()
        .iter()
        .any(|event| matches!(event, ClientEvent::FrameDone { callback: done, .. } if *done == callback));
    tracing::info!(waiting, "Committed while the replaced buffer is busy");

    if let Some(backend) = compositor.downcast_backend_mut::<HeadlessBackend>() {
        backend.set_busy(old, false);
    }

    compositor.buffer_idle(old);
    report(compositor);

    Ok(())
}
