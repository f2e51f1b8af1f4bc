mod common;

use aerugo_roles::{
    backend::{
        headless::{HeadlessBackend, Request},
        AllowedActions, Capability, ConfigureEvent, MoveResize, Property, ResizeEdge, ShapeKind, SizeHints, WindowId,
        WmProtocols, WmStateAction, WmStates,
    },
    shell::ShellFlags,
    ClientEvent, Compositor, Config, DecorationMode, Positioner, ProtocolError, ShellHandle, ToplevelStates,
    WmCapabilities,
};
use euclid::default::{Point2D, Rect, Size2D};

use common::{compositor, configures, headless, headless_mut, mapped_toplevel};

fn has_property(compositor: &Compositor, window: WindowId, property: Property) -> bool {
    headless(compositor)
        .window(window)
        .map_or(false, |window| window.properties.contains(&property))
}

/// Returns the size and states of every toplevel configure sent for the shell surface.
fn toplevel_configures(events: &[ClientEvent], shell: &ShellHandle) -> Vec<(i32, i32, ToplevelStates)> {
    events
        .iter()
        .filter_map(|event| match *event {
            ClientEvent::ToplevelConfigure {
                role,
                width,
                height,
                states,
            } if role == shell.id() => Some((width, height, states)),
            _ => None,
        })
        .collect()
}

fn resize(compositor: &mut Compositor, window: WindowId, width: i32, height: i32) {
    compositor.configure_notify(
        window,
        ConfigureEvent {
            position: Point2D::zero(),
            size: Size2D::new(width, height),
            synthetic: false,
        },
    );
}

/// The first commit of a toplevel is answered with an empty configure, the window maps after it was acknowledged.
#[test]
fn initial_configure_then_map() {
    let mut compositor = compositor();

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let toplevel = compositor.get_toplevel(&shell).unwrap();

    // A buffer attached before the initial configure is ignored.
    let buffer = compositor.create_buffer(100, 50);
    compositor.attach(surface, Some(buffer), 0, 0);
    compositor.commit(surface);

    let events = compositor.drain_events();
    assert!(events.contains(&ClientEvent::ToplevelConfigure {
        role: shell.id(),
        width: 0,
        height: 0,
        states: ToplevelStates::empty(),
    }));

    let serials = configures(&events, &shell);
    assert_eq!(serials.len(), 1);
    assert!(!compositor.toplevel_mapped(&toplevel));
    assert!(compositor
        .shell_flags(&shell)
        .contains(ShellFlags::WAITING_FOR_ACK_CONFIGURE | ShellFlags::WAITING_FOR_ACK_COMMIT));

    compositor.ack_configure(&shell, serials[0]).unwrap();
    assert!(!compositor.shell_flags(&shell).contains(ShellFlags::WAITING_FOR_ACK_CONFIGURE));

    compositor.commit(surface);
    assert!(compositor.toplevel_mapped(&toplevel));
    assert!(compositor.shell_flags(&shell).is_empty());

    let window = compositor.role_window(shell.id()).unwrap();
    let state = headless(&compositor).window(window).unwrap();
    assert!(state.mapped);
    assert_eq!(state.geometry.size, Size2D::new(100, 50));
    assert_eq!(compositor.toplevel_size(&toplevel), Some(Size2D::new(100, 50)));
}

#[test]
fn duplicate_ack_is_rejected() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    compositor.configure_notify(
        toplevel.window,
        ConfigureEvent {
            position: Point2D::zero(),
            size: Size2D::new(200, 200),
            synthetic: false,
        },
    );

    let events = compositor.drain_events();
    let serial = *configures(&events, &toplevel.shell).last().unwrap();

    compositor.ack_configure(&toplevel.shell, serial).unwrap();
    assert_eq!(
        compositor.ack_configure(&toplevel.shell, serial),
        Err(ProtocolError::InvalidSerial { serial, last: serial })
    );
    assert_eq!(
        compositor.ack_configure(&toplevel.shell, serial - 1),
        Err(ProtocolError::InvalidSerial {
            serial: serial - 1,
            last: serial,
        })
    );
}

/// A serial of zero is always accepted but only the outstanding serial ends the wait.
#[test]
fn ack_zero_is_accepted() {
    let mut compositor = compositor();

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let _toplevel = compositor.get_toplevel(&shell).unwrap();
    compositor.commit(surface);

    let serial = *configures(&compositor.drain_events(), &shell).last().unwrap();
    assert_ne!(serial, 0);

    assert_eq!(compositor.ack_configure(&shell, 0), Ok(()));
    assert_eq!(compositor.ack_configure(&shell, 0), Ok(()));
    assert!(compositor.shell_flags(&shell).contains(ShellFlags::WAITING_FOR_ACK_CONFIGURE));

    assert_eq!(compositor.ack_configure(&shell, serial), Ok(()));
    assert!(!compositor.shell_flags(&shell).contains(ShellFlags::WAITING_FOR_ACK_CONFIGURE));
}

#[test]
fn toplevel_window_properties() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    assert!(has_property(
        &compositor,
        toplevel.window,
        Property::WmProtocols(WmProtocols::DELETE_WINDOW | WmProtocols::PING | WmProtocols::SYNC_REQUEST)
    ));
    assert!(has_property(&compositor, toplevel.window, Property::BypassCompositor(2)));

    let config = Config {
        net_wm_ping: false,
        ..Config::default()
    };
    let mut compositor = Compositor::new(config, HeadlessBackend::new());
    headless_mut(&mut compositor).set_frame_sync(false);
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    assert!(has_property(
        &compositor,
        toplevel.window,
        Property::WmProtocols(WmProtocols::DELETE_WINDOW)
    ));
}

/// The window geometry is reflected in the frame extents, the size hints and the size of configures.
#[test]
fn window_geometry() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 200, 100);

    compositor.set_window_geometry(&toplevel.shell, 10, 10, 180, 80);
    compositor.set_min_size(&toplevel.toplevel, 50, 40).unwrap();
    compositor.commit(toplevel.surface);

    assert_eq!(
        compositor.window_geometry(&toplevel.shell),
        Some(Rect::new(Point2D::new(10, 10), Size2D::new(180, 80)))
    );
    assert!(has_property(
        &compositor,
        toplevel.window,
        Property::GtkFrameExtents {
            left: 10,
            right: 10,
            top: 10,
            bottom: 10,
        }
    ));
    assert_eq!(
        compositor.toplevel_size_hints(&toplevel.toplevel),
        Some(SizeHints {
            min: Some(Size2D::new(70, 60)),
            max: None,
        })
    );

    compositor.configure_notify(
        toplevel.window,
        ConfigureEvent {
            position: Point2D::zero(),
            size: Size2D::new(400, 300),
            synthetic: false,
        },
    );

    // The decorations drawn by the client are taken off the size.
    assert!(compositor.drain_events().contains(&ClientEvent::ToplevelConfigure {
        role: toplevel.shell.id(),
        width: 380,
        height: 280,
        states: ToplevelStates::empty(),
    }));
    assert_eq!(compositor.toplevel_size(&toplevel.toplevel), Some(Size2D::new(400, 300)));
}

#[test]
fn invalid_size() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    assert_eq!(
        compositor.set_min_size(&toplevel.toplevel, -1, 10),
        Err(ProtocolError::InvalidSize {
            which: "min",
            width: -1,
            height: 10,
        })
    );
    assert_eq!(
        compositor.set_max_size(&toplevel.toplevel, 10, -5),
        Err(ProtocolError::InvalidSize {
            which: "max",
            width: 10,
            height: -5,
        })
    );
}

/// A sync request followed by a configure notification which does not change the size waits for nothing.
#[test]
fn rejected_configure_rolls_back() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    compositor.sync_request(toplevel.window);

    let flags = compositor.shell_flags(&toplevel.shell);
    assert!(flags.contains(ShellFlags::MAYBE_CONFIGURE | ShellFlags::WAITING_FOR_ACK_COMMIT));

    compositor.configure_notify(
        toplevel.window,
        ConfigureEvent {
            position: Point2D::zero(),
            size: Size2D::new(100, 100),
            synthetic: false,
        },
    );

    assert!(compositor.shell_flags(&toplevel.shell).is_empty());
    assert!(configures(&compositor.drain_events(), &toplevel.shell).is_empty());
}

/// A resize by the window manager is drawn by the client before the window follows the bounds again.
#[test]
fn resize_waits_for_ack_commit() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    compositor.sync_request(toplevel.window);
    compositor.configure_notify(
        toplevel.window,
        ConfigureEvent {
            position: Point2D::zero(),
            size: Size2D::new(300, 200),
            synthetic: false,
        },
    );

    let events = compositor.drain_events();
    let serial = *configures(&events, &toplevel.shell).last().unwrap();
    assert!(events.contains(&ClientEvent::ToplevelConfigure {
        role: toplevel.shell.id(),
        width: 300,
        height: 200,
        states: ToplevelStates::empty(),
    }));

    let flags = compositor.shell_flags(&toplevel.shell);
    assert!(flags.contains(ShellFlags::WAITING_FOR_ACK_CONFIGURE | ShellFlags::WAITING_FOR_ACK_COMMIT));
    assert!(!flags.contains(ShellFlags::MAYBE_CONFIGURE));

    compositor.ack_configure(&toplevel.shell, serial).unwrap();

    let buffer = compositor.create_buffer(300, 200);
    compositor.attach(toplevel.surface, Some(buffer), 0, 0);
    compositor.commit(toplevel.surface);

    assert!(compositor.shell_flags(&toplevel.shell).is_empty());

    // The window manager already gave the window it's new size.
    assert!(!headless(&compositor)
        .requests()
        .iter()
        .any(|request| matches!(request, Request::ResizeWindow { .. })));
}

/// Content placed to the north west of the surface grows the window without moving the surface on screen.
#[test]
fn bounds_growing_north_west_moves_window() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    let child = compositor.create_surface();
    let subsurface = compositor.get_subsurface(child, toplevel.surface).unwrap();
    compositor.set_position(&subsurface, -10, -20);

    let buffer = compositor.create_buffer(20, 20);
    compositor.attach(child, Some(buffer), 0, 0);
    compositor.commit(child);
    compositor.commit(toplevel.surface);

    let state = headless(&compositor).window(toplevel.window).unwrap();
    assert_eq!(state.geometry.origin, Point2D::new(-10, -20));
    assert_eq!(state.geometry.size, Size2D::new(110, 120));
}

#[test]
fn destroy_shell_surface_with_role() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);
    let role = toplevel.shell.id();

    assert_eq!(
        compositor.destroy_shell_surface(toplevel.shell),
        Err(ProtocolError::DestroyedWithRole)
    );

    assert_eq!(compositor.surface_role(toplevel.surface), None);
    assert_eq!(compositor.role_refcount(role), None);
    assert!(headless(&compositor).window(toplevel.window).is_none());
    assert_eq!(compositor.role_for_window(toplevel.window), None);

    compositor.destroy_toplevel(toplevel.toplevel);
}

#[test]
fn destroy_in_order() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);
    let role = toplevel.shell.id();

    compositor.destroy_toplevel(toplevel.toplevel);
    assert!(!headless(&compositor).window(toplevel.window).unwrap().mapped);

    assert_eq!(compositor.destroy_shell_surface(toplevel.shell), Ok(()));
    assert_eq!(compositor.role_refcount(role), None);
    assert!(headless(&compositor).window(toplevel.window).is_none());

    // The surface may not become anything but a shell surface again.
    let wm_base = compositor.create_wm_base();
    let shell = compositor.get_shell_surface(wm_base, toplevel.surface).unwrap();
    assert_eq!(compositor.surface_role(toplevel.surface), Some(shell.id()));
}

#[test]
fn shell_kind_is_reserved() {
    let mut compositor = compositor();

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let toplevel = compositor.get_toplevel(&shell).unwrap();

    assert_eq!(
        compositor.get_toplevel(&shell).unwrap_err(),
        ProtocolError::AlreadyConstructed
    );

    compositor.destroy_toplevel(toplevel);

    let parent = mapped_toplevel(&mut compositor, 100, 100);
    let positioner = Positioner {
        size: Size2D::new(10, 10),
        ..Default::default()
    };

    assert_eq!(
        compositor.get_popup(&shell, Some(&parent.shell), positioner).unwrap_err(),
        ProtocolError::ShellTypeMismatch("toplevel")
    );

    // A toplevel may be created again.
    let again = compositor.get_toplevel(&shell).unwrap();
    compositor.commit(surface);
    assert!(!compositor.toplevel_mapped(&again));
}

/// A surface destroyed under the shell surface leaves an inert shell surface.
#[test]
fn inert_shell_surface() {
    let mut compositor = compositor();

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let role = shell.id();

    compositor.destroy_surface(surface);
    assert_eq!(compositor.role_refcount(role), Some(1));

    let toplevel = compositor.get_toplevel(&shell).unwrap();
    assert!(!compositor.toplevel_mapped(&toplevel));
    assert_eq!(compositor.ack_configure(&shell, 1), Ok(()));

    compositor.destroy_toplevel(toplevel);
    assert_eq!(compositor.destroy_shell_surface(shell), Ok(()));
    assert_eq!(compositor.role_refcount(role), None);
}

#[test]
fn delete_window_asks_to_close() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    compositor.delete_window(toplevel.window);

    assert_eq!(
        compositor.drain_events(),
        vec![ClientEvent::ToplevelClose {
            role: toplevel.shell.id()
        }]
    );
}

/// A commit without a buffer unmaps the window and starts over with a new configure.
#[test]
fn null_buffer_unmaps() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    compositor.attach(toplevel.surface, None, 0, 0);
    compositor.commit(toplevel.surface);

    assert!(!compositor.toplevel_mapped(&toplevel.toplevel));
    assert!(!headless(&compositor).window(toplevel.window).unwrap().mapped);

    let events = compositor.drain_events();
    let serial = *configures(&events, &toplevel.shell).last().unwrap();
    compositor.ack_configure(&toplevel.shell, serial).unwrap();

    let buffer = compositor.create_buffer(100, 100);
    compositor.attach(toplevel.surface, Some(buffer), 0, 0);
    compositor.commit(toplevel.surface);

    assert!(compositor.toplevel_mapped(&toplevel.toplevel));
}

#[test]
fn shutdown_clears_windows() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    compositor.shutdown();

    assert_eq!(compositor.role_for_window(toplevel.window), None);
    assert_eq!(headless(&compositor).windows().count(), 0);
}

#[test]
fn input_region_shapes_window() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    let region = vec![Rect::new(Point2D::new(10, 10), Size2D::new(50, 50))];
    compositor.set_input_region(toplevel.surface, Some(region.clone()));
    compositor.commit(toplevel.surface);

    assert!(headless(&compositor).requests().contains(&Request::SetShape {
        window: toplevel.window,
        kind: ShapeKind::Input,
        rects: region,
    }));

    // No region accepts input on the whole window.
    compositor.set_input_region(toplevel.surface, None);
    compositor.commit(toplevel.surface);

    assert!(headless(&compositor).requests().contains(&Request::SetShape {
        window: toplevel.window,
        kind: ShapeKind::Input,
        rects: vec![Rect::new(Point2D::zero(), Size2D::new(100, 100))],
    }));
}

#[test]
fn title_and_app_id() {
    let mut compositor = compositor();

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let toplevel = compositor.get_toplevel(&shell).unwrap();
    let window = compositor.role_window(shell.id()).unwrap();

    compositor.set_app_id(&toplevel, "org.example.Editor");
    compositor.set_title(&toplevel, "Caf\u{e9} \u{2713} saved");

    let class = Property::WmClass {
        instance: "org.example.Editor".to_owned(),
        class: "org.example.Editor".to_owned(),
    };
    assert!(has_property(&compositor, window, class.clone()));
    assert!(has_property(
        &compositor,
        window,
        Property::NetWmName("Caf\u{e9} \u{2713} saved".to_owned())
    ));

    // The legacy name stops where Latin-1 does.
    assert!(has_property(&compositor, window, Property::WmName("Caf\u{e9} ".to_owned())));

    let mapped = mapped_toplevel(&mut compositor, 100, 100);
    compositor.set_app_id(&mapped.toplevel, "org.example.Late");

    assert!(!headless(&compositor)
        .requests()
        .iter()
        .any(|request| matches!(request, Request::ChangeProperty { property: Property::WmClass { .. }, .. })));
    assert!(has_property(&compositor, window, class));
}

#[test]
fn transient_for_parent() {
    let mut compositor = compositor();
    let parent = mapped_toplevel(&mut compositor, 100, 100);
    let child = mapped_toplevel(&mut compositor, 50, 50);

    compositor.set_parent(&child.toplevel, Some(&parent.toplevel)).unwrap();

    assert_eq!(compositor.toplevel_parent(&child.toplevel), Some(parent.shell.id()));
    assert!(has_property(
        &compositor,
        child.window,
        Property::WmTransientFor(Some(parent.window))
    ));

    compositor.set_parent(&child.toplevel, None).unwrap();

    assert_eq!(compositor.toplevel_parent(&child.toplevel), None);
    assert!(has_property(&compositor, child.window, Property::WmTransientFor(None)));
}

/// A parent which is not mapped is no parent at all.
#[test]
fn unmapped_parent_is_ignored() {
    let mut compositor = compositor();
    let child = mapped_toplevel(&mut compositor, 50, 50);

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let parent = compositor.get_toplevel(&shell).unwrap();

    compositor.set_parent(&child.toplevel, Some(&parent)).unwrap();

    assert_eq!(compositor.toplevel_parent(&child.toplevel), None);
    assert!(!headless(&compositor).requests().iter().any(|request| matches!(
        request,
        Request::ChangeProperty {
            property: Property::WmTransientFor(_),
            ..
        }
    )));
}

#[test]
fn circular_parent_is_rejected() {
    let mut compositor = compositor();
    let first = mapped_toplevel(&mut compositor, 100, 100);
    let second = mapped_toplevel(&mut compositor, 100, 100);
    let third = mapped_toplevel(&mut compositor, 100, 100);

    compositor.set_parent(&second.toplevel, Some(&first.toplevel)).unwrap();
    compositor.set_parent(&third.toplevel, Some(&second.toplevel)).unwrap();

    assert_eq!(
        compositor.set_parent(&first.toplevel, Some(&third.toplevel)),
        Err(ProtocolError::InvalidParent)
    );
    assert_eq!(
        compositor.set_parent(&first.toplevel, Some(&first.toplevel)),
        Err(ProtocolError::InvalidParent)
    );
    assert_eq!(compositor.toplevel_parent(&first.toplevel), None);
}

/// Children of an unmapped toplevel become transient for it's own parent.
#[test]
fn parent_unmap_reparents_children() {
    let mut compositor = compositor();
    let root = mapped_toplevel(&mut compositor, 200, 200);
    let middle = mapped_toplevel(&mut compositor, 100, 100);
    let leaf = mapped_toplevel(&mut compositor, 50, 50);

    compositor.set_parent(&middle.toplevel, Some(&root.toplevel)).unwrap();
    compositor.set_parent(&leaf.toplevel, Some(&middle.toplevel)).unwrap();

    compositor.attach(middle.surface, None, 0, 0);
    compositor.commit(middle.surface);

    assert!(!compositor.toplevel_mapped(&middle.toplevel));
    assert_eq!(compositor.toplevel_parent(&middle.toplevel), None);
    assert!(has_property(&compositor, middle.window, Property::WmTransientFor(None)));

    assert_eq!(compositor.toplevel_parent(&leaf.toplevel), Some(root.shell.id()));
    assert!(has_property(
        &compositor,
        leaf.window,
        Property::WmTransientFor(Some(root.window))
    ));

    // Nothing is left to be transient for.
    compositor.destroy_toplevel(root.toplevel);

    assert_eq!(compositor.toplevel_parent(&leaf.toplevel), None);
    assert!(has_property(&compositor, leaf.window, Property::WmTransientFor(None)));
}

#[test]
fn wm_states_are_configured() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    compositor.wm_state_changed(toplevel.window, WmStates::MAXIMIZED | WmStates::FOCUSED);

    let states = ToplevelStates::MAXIMIZED | ToplevelStates::ACTIVATED;
    assert_eq!(
        toplevel_configures(&compositor.drain_events(), &toplevel.shell),
        vec![(100, 100, states)]
    );
    assert_eq!(compositor.toplevel_states(&toplevel.toplevel), Some(states));

    // Unchanged states are not sent again.
    compositor.wm_state_changed(toplevel.window, WmStates::MAXIMIZED | WmStates::FOCUSED);
    assert!(compositor.drain_events().is_empty());

    // Resizes carry the states too.
    resize(&mut compositor, toplevel.window, 1920, 1050);
    assert_eq!(
        toplevel_configures(&compositor.drain_events(), &toplevel.shell),
        vec![(1920, 1050, states)]
    );

    compositor.wm_state_changed(toplevel.window, WmStates::FULLSCREEN);
    assert_eq!(
        toplevel_configures(&compositor.drain_events(), &toplevel.shell),
        vec![(1920, 1050, ToplevelStates::FULLSCREEN)]
    );

    // Unmapping forgets the states.
    compositor.attach(toplevel.surface, None, 0, 0);
    compositor.commit(toplevel.surface);
    assert_eq!(
        toplevel_configures(&compositor.drain_events(), &toplevel.shell),
        vec![(0, 0, ToplevelStates::empty())]
    );
}

/// States announced before the first commit go out with the initial configure.
#[test]
fn early_states_wait_for_initial_configure() {
    let mut compositor = compositor();

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let _toplevel = compositor.get_toplevel(&shell).unwrap();
    let window = compositor.role_window(shell.id()).unwrap();

    compositor.wm_state_changed(window, WmStates::FOCUSED);
    assert!(toplevel_configures(&compositor.drain_events(), &shell).is_empty());

    compositor.commit(surface);
    assert_eq!(
        toplevel_configures(&compositor.drain_events(), &shell),
        vec![(0, 0, ToplevelStates::ACTIVATED)]
    );
}

#[test]
fn state_requests_go_to_window_manager() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);
    let window = toplevel.window;

    compositor.set_maximized(&toplevel.toplevel);
    compositor.unset_maximized(&toplevel.toplevel);
    compositor.set_fullscreen(&toplevel.toplevel);
    compositor.unset_fullscreen(&toplevel.toplevel);
    compositor.set_minimized(&toplevel.toplevel);

    assert_eq!(
        headless_mut(&mut compositor).drain_requests(),
        vec![
            Request::ChangeWmState {
                window,
                action: WmStateAction::Add,
                states: WmStates::MAXIMIZED,
            },
            Request::ChangeWmState {
                window,
                action: WmStateAction::Remove,
                states: WmStates::MAXIMIZED,
            },
            Request::ChangeWmState {
                window,
                action: WmStateAction::Add,
                states: WmStates::FULLSCREEN,
            },
            Request::ChangeWmState {
                window,
                action: WmStateAction::Remove,
                states: WmStates::FULLSCREEN,
            },
            Request::IconifyWindow(window),
        ]
    );

    // Nothing changes until the window manager says so.
    assert_eq!(compositor.toplevel_states(&toplevel.toplevel), Some(ToplevelStates::empty()));
    assert!(compositor.drain_events().is_empty());
}

#[test]
fn wm_capabilities() {
    let mut compositor = compositor();
    headless_mut(&mut compositor).set_capability(Capability::WmWindowMenu, false);
    headless_mut(&mut compositor).set_capability(Capability::WmMaximize, false);

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let toplevel = compositor.get_toplevel(&shell).unwrap();

    assert!(compositor
        .drain_events()
        .contains(&ClientEvent::ToplevelWmCapabilities {
            role: shell.id(),
            capabilities: WmCapabilities::MINIMIZE | WmCapabilities::FULLSCREEN,
        }));

    let mapped = mapped_toplevel(&mut compositor, 100, 100);
    assert_eq!(
        compositor.toplevel_capabilities(&mapped.toplevel),
        Some(WmCapabilities::MINIMIZE | WmCapabilities::FULLSCREEN)
    );

    compositor.allowed_actions_changed(mapped.window, AllowedActions::MAXIMIZE | AllowedActions::MINIMIZE);

    let events = compositor.drain_events();
    assert!(events.contains(&ClientEvent::ToplevelWmCapabilities {
        role: mapped.shell.id(),
        capabilities: WmCapabilities::MINIMIZE | WmCapabilities::MAXIMIZE,
    }));
    assert_eq!(
        toplevel_configures(&events, &mapped.shell),
        vec![(100, 100, ToplevelStates::empty())]
    );

    // The same actions change nothing.
    compositor.allowed_actions_changed(mapped.window, AllowedActions::MAXIMIZE | AllowedActions::MINIMIZE);
    assert!(compositor.drain_events().is_empty());

    compositor.destroy_toplevel(toplevel);
}

#[test]
fn interactive_resize_is_resizing() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    compositor.resize_toplevel(&toplevel.toplevel, 10).unwrap();

    assert_eq!(
        headless_mut(&mut compositor).drain_requests(),
        vec![Request::MoveResize {
            window: toplevel.window,
            op: MoveResize::Resize(ResizeEdge::BottomRight),
        }]
    );
    assert_eq!(
        toplevel_configures(&compositor.drain_events(), &toplevel.shell),
        vec![(100, 100, ToplevelStates::RESIZING)]
    );

    compositor.resize_done(toplevel.window);
    assert_eq!(
        toplevel_configures(&compositor.drain_events(), &toplevel.shell),
        vec![(100, 100, ToplevelStates::empty())]
    );

    // A resize that never ended is not ended twice.
    compositor.resize_done(toplevel.window);
    assert!(compositor.drain_events().is_empty());

    compositor.move_toplevel(&toplevel.toplevel);
    assert_eq!(
        headless_mut(&mut compositor).drain_requests(),
        vec![Request::MoveResize {
            window: toplevel.window,
            op: MoveResize::Move,
        }]
    );
    assert!(compositor.drain_events().is_empty());
}

#[test]
fn resize_edges() {
    let mut compositor = compositor();
    let toplevel = mapped_toplevel(&mut compositor, 100, 100);

    assert_eq!(
        compositor.resize_toplevel(&toplevel.toplevel, 3),
        Err(ProtocolError::InvalidResizeEdge(3))
    );
    assert_eq!(
        compositor.resize_toplevel(&toplevel.toplevel, 11),
        Err(ProtocolError::InvalidResizeEdge(11))
    );

    // A resize the window manager could not start is not announced.
    headless_mut(&mut compositor).set_pointer_grab(false);
    compositor.resize_toplevel(&toplevel.toplevel, 1).unwrap();

    assert_eq!(compositor.toplevel_states(&toplevel.toplevel), Some(ToplevelStates::empty()));
    assert!(compositor.drain_events().is_empty());
}

/// A mode chosen before the first commit is sent with the initial configure and applied once the window maps.
#[test]
fn decoration_mode_before_map() {
    let mut compositor = compositor();

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let toplevel = compositor.get_toplevel(&shell).unwrap();
    let window = compositor.role_window(shell.id()).unwrap();

    assert!(has_property(&compositor, window, Property::MotifWmHints { decorated: false }));

    let decoration = compositor.get_toplevel_decoration(&toplevel).unwrap();
    compositor.set_decoration_mode(&decoration, DecorationMode::ServerSide);

    // Nothing is sent before the initial commit.
    assert!(configures(&compositor.drain_events(), &shell).is_empty());

    compositor.commit(surface);

    let events = compositor.drain_events();
    assert!(events.contains(&ClientEvent::DecorationConfigure {
        role: shell.id(),
        mode: DecorationMode::ServerSide,
    }));

    let serial = *configures(&events, &shell).last().unwrap();
    compositor.ack_configure(&shell, serial).unwrap();

    let buffer = compositor.create_buffer(100, 100);
    compositor.attach(surface, Some(buffer), 0, 0);
    compositor.commit(surface);

    assert!(compositor.toplevel_mapped(&toplevel));
    assert!(has_property(&compositor, window, Property::MotifWmHints { decorated: true }));
    assert_eq!(compositor.decoration_mode(&toplevel), Some(DecorationMode::ServerSide));

    assert_eq!(
        compositor.get_toplevel_decoration(&toplevel).unwrap_err(),
        ProtocolError::DecorationAlreadyConstructed
    );
}

/// Once mapped, a new mode is sent right away and written after the client acknowledged it.
#[test]
fn decoration_mode_after_map() {
    let mut compositor = compositor();

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let toplevel = compositor.get_toplevel(&shell).unwrap();
    let window = compositor.role_window(shell.id()).unwrap();
    let decoration = compositor.get_toplevel_decoration(&toplevel).unwrap();

    compositor.commit(surface);
    let serial = *configures(&compositor.drain_events(), &shell).last().unwrap();
    compositor.ack_configure(&shell, serial).unwrap();

    let buffer = compositor.create_buffer(100, 100);
    compositor.attach(surface, Some(buffer), 0, 0);
    compositor.commit(surface);
    assert!(compositor.toplevel_mapped(&toplevel));

    compositor.unset_decoration_mode(&decoration);

    let events = compositor.drain_events();
    assert!(events.contains(&ClientEvent::DecorationConfigure {
        role: shell.id(),
        mode: DecorationMode::ServerSide,
    }));
    assert!(toplevel_configures(&events, &shell).is_empty());

    // Not applied before the client drew it.
    compositor.commit(surface);
    assert!(has_property(&compositor, window, Property::MotifWmHints { decorated: false }));

    let serial = *configures(&events, &shell).last().unwrap();
    compositor.ack_configure(&shell, serial).unwrap();
    compositor.commit(surface);
    assert!(has_property(&compositor, window, Property::MotifWmHints { decorated: true }));

    // A destroyed decoration object no longer changes the mode.
    compositor.destroy_decoration(decoration);
    assert_eq!(compositor.decoration_mode(&toplevel), Some(DecorationMode::ServerSide));

    let other = compositor.get_toplevel_decoration(&toplevel);
    assert_eq!(other.unwrap_err(), ProtocolError::UnconfiguredBuffer);
}

/// With the workaround, a window given back the size it had without states is assumed to have left them.
#[test]
fn state_workaround_restores_states() {
    for workaround in [false, true] {
        let config = Config {
            state_workaround: workaround,
            ..Config::default()
        };
        let mut compositor = Compositor::new(config, HeadlessBackend::new());
        let toplevel = mapped_toplevel(&mut compositor, 100, 100);

        resize(&mut compositor, toplevel.window, 400, 300);
        compositor.wm_state_changed(toplevel.window, WmStates::MAXIMIZED);
        resize(&mut compositor, toplevel.window, 1920, 1050);
        compositor.drain_events();

        // The window manager restores the size before it removes the state.
        resize(&mut compositor, toplevel.window, 400, 300);

        let states = if workaround {
            ToplevelStates::empty()
        } else {
            ToplevelStates::MAXIMIZED
        };

        assert_eq!(
            toplevel_configures(&compositor.drain_events(), &toplevel.shell),
            vec![(400, 300, states)]
        );
    }
}
