mod common;

use aerugo_roles::{
    backend::{ConfigureEvent, Property},
    surface::SurfaceId,
    ClientEvent, Compositor, PopupHandle, Positioner, ProtocolError, ShellHandle,
};
use euclid::default::{Point2D, Rect, Size2D, Vector2D};

use common::{compositor, configures, headless, mapped_toplevel};

struct TestPopup {
    surface: SurfaceId,
    shell: ShellHandle,
    popup: PopupHandle,
}

fn positioner(x: i32, y: i32, reactive: bool) -> Positioner {
    Positioner {
        anchor_rect: Rect::new(Point2D::new(x, y), Size2D::new(1, 1)),
        size: Size2D::new(10, 10),
        offset: Vector2D::zero(),
        reactive,
    }
}

/// Creates a popup of the parent, acknowledges the initial configure and maps it with a 10x10 buffer.
fn mapped_popup(compositor: &mut Compositor, parent: &ShellHandle, positioner: Positioner) -> TestPopup {
    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let popup = compositor.get_popup(&shell, Some(parent), positioner).unwrap();

    let serial = *configures(&compositor.drain_events(), &shell).last().unwrap();
    compositor.ack_configure(&shell, serial).unwrap();

    let buffer = compositor.create_buffer(10, 10);
    compositor.attach(surface, Some(buffer), 0, 0);
    compositor.commit(surface);

    assert!(compositor.popup_mapped(&popup));
    compositor.drain_events();

    TestPopup { surface, shell, popup }
}

fn popup_configures(events: &[ClientEvent], popup: &PopupHandle) -> Vec<Rect<i32>> {
    events
        .iter()
        .filter_map(|event| match *event {
            ClientEvent::PopupConfigure { role, geometry } if role == popup.id() => Some(geometry),
            _ => None,
        })
        .collect()
}

#[test]
fn configure_and_map() {
    let mut compositor = compositor();
    let parent = mapped_toplevel(&mut compositor, 100, 100);

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let popup = compositor.get_popup(&shell, Some(&parent.shell), positioner(5, 5, false)).unwrap();

    // The popup is configured right away.
    let events = compositor.drain_events();
    assert_eq!(
        popup_configures(&events, &popup),
        vec![Rect::new(Point2D::new(5, 5), Size2D::new(10, 10))]
    );

    let serial = *configures(&events, &shell).last().unwrap();

    let window = compositor.role_window(shell.id()).unwrap();
    assert!(headless(&compositor)
        .window(window)
        .unwrap()
        .properties
        .contains(&Property::OverrideRedirect(true)));

    // Not mapped before the configure was acknowledged.
    let buffer = compositor.create_buffer(10, 10);
    compositor.attach(surface, Some(buffer), 0, 0);
    compositor.commit(surface);
    assert!(!compositor.popup_mapped(&popup));

    compositor.ack_configure(&shell, serial).unwrap();
    compositor.commit(surface);

    assert!(compositor.popup_mapped(&popup));
    assert_eq!(compositor.popup_position(&popup), Some(Point2D::new(5, 5)));

    let state = headless(&compositor).window(window).unwrap();
    assert!(state.mapped);
    assert_eq!(state.geometry, Rect::new(Point2D::new(5, 5), Size2D::new(10, 10)));
}

/// The popup is placed relative to the window geometry of the parent, not the parent's window.
#[test]
fn placed_relative_to_parent_geometry() {
    let mut compositor = compositor();
    let parent = mapped_toplevel(&mut compositor, 100, 100);

    compositor.set_window_geometry(&parent.shell, 10, 20, 80, 60);
    compositor.commit(parent.surface);

    let popup = mapped_popup(&mut compositor, &parent.shell, positioner(5, 5, false));
    let window = compositor.role_window(popup.shell.id()).unwrap();

    assert_eq!(
        headless(&compositor).window(window).unwrap().geometry.origin,
        Point2D::new(15, 25)
    );
}

#[test]
fn parent_is_held_while_popup_lives() {
    let mut compositor = compositor();
    let parent = mapped_toplevel(&mut compositor, 100, 100);
    let role = parent.shell.id();

    assert_eq!(compositor.role_refcount(role), Some(2));

    let popup = mapped_popup(&mut compositor, &parent.shell, positioner(5, 5, false));

    assert_eq!(compositor.role_refcount(role), Some(3));
    assert_eq!(compositor.reconstrain_observers(&parent.shell), 1);

    compositor.destroy_popup(popup.popup);

    assert_eq!(compositor.role_refcount(role), Some(2));
    assert_eq!(compositor.reconstrain_observers(&parent.shell), 0);

    let window = compositor.role_window(popup.shell.id()).unwrap();
    assert!(!headless(&compositor).window(window).unwrap().mapped);
}

/// Only reactive popups are configured again when the parent is resized by the window manager.
#[test]
fn reactive_popups_follow_parent() {
    let mut compositor = compositor();
    let parent = mapped_toplevel(&mut compositor, 100, 100);

    let reactive = mapped_popup(&mut compositor, &parent.shell, positioner(5, 5, true));
    let fixed = mapped_popup(&mut compositor, &parent.shell, positioner(5, 5, false));

    compositor.configure_notify(
        parent.window,
        ConfigureEvent {
            position: Point2D::zero(),
            size: Size2D::new(200, 200),
            synthetic: false,
        },
    );

    let events = compositor.drain_events();
    assert_eq!(popup_configures(&events, &reactive.popup).len(), 1);
    assert!(popup_configures(&events, &fixed.popup).is_empty());
}

#[test]
fn reactive_popup_follows_bounds() {
    let mut compositor = compositor();
    let parent = mapped_toplevel(&mut compositor, 100, 100);
    let reactive = mapped_popup(&mut compositor, &parent.shell, positioner(5, 5, true));

    let buffer = compositor.create_buffer(150, 150);
    compositor.attach(parent.surface, Some(buffer), 0, 0);
    compositor.commit(parent.surface);

    assert_eq!(popup_configures(&compositor.drain_events(), &reactive.popup).len(), 1);
}

#[test]
fn reposition() {
    let mut compositor = compositor();
    let parent = mapped_toplevel(&mut compositor, 100, 100);
    let popup = mapped_popup(&mut compositor, &parent.shell, positioner(5, 5, false));

    compositor.reposition_popup(&popup.popup, positioner(20, 30, false), 7).unwrap();

    let events = compositor.drain_events();
    let serial = *configures(&events, &popup.shell).last().unwrap();

    assert_eq!(
        events,
        vec![
            ClientEvent::PopupRepositioned {
                role: popup.popup.id(),
                token: 7,
            },
            ClientEvent::PopupConfigure {
                role: popup.popup.id(),
                geometry: Rect::new(Point2D::new(20, 30), Size2D::new(10, 10)),
            },
            ClientEvent::Configure {
                role: popup.shell.id(),
                serial,
            },
        ]
    );

    // The old position holds until the client acknowledged the new one.
    assert_eq!(compositor.popup_position(&popup.popup), Some(Point2D::new(5, 5)));

    compositor.ack_configure(&popup.shell, serial).unwrap();
    compositor.commit(popup.surface);

    let window = compositor.role_window(popup.shell.id()).unwrap();
    assert_eq!(compositor.popup_position(&popup.popup), Some(Point2D::new(20, 30)));
    assert_eq!(
        headless(&compositor).window(window).unwrap().geometry.origin,
        Point2D::new(20, 30)
    );

    assert_eq!(
        compositor.reposition_popup(&popup.popup, Positioner::default(), 8),
        Err(ProtocolError::IncompletePositioner)
    );
}

#[test]
fn dismiss() {
    let mut compositor = compositor();
    let parent = mapped_toplevel(&mut compositor, 100, 100);
    let outer = mapped_popup(&mut compositor, &parent.shell, positioner(5, 5, false));
    let inner = mapped_popup(&mut compositor, &outer.shell, positioner(2, 2, false));

    compositor.dismiss_popup(&inner.popup, false);

    assert!(!compositor.popup_mapped(&inner.popup));
    assert!(compositor.popup_mapped(&outer.popup));
    assert_eq!(
        compositor.drain_events(),
        vec![ClientEvent::PopupDone {
            role: inner.popup.id()
        }]
    );

    compositor.dismiss_popup(&inner.popup, true);

    assert!(!compositor.popup_mapped(&outer.popup));
    assert_eq!(
        compositor.drain_events(),
        vec![
            ClientEvent::PopupDone {
                role: inner.popup.id()
            },
            ClientEvent::PopupDone {
                role: outer.popup.id()
            },
        ]
    );
}

#[test]
fn invalid_parent() {
    let mut compositor = compositor();

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();

    // A shell surface without a toplevel or popup.
    let other = compositor.create_surface();
    let bare = compositor.get_shell_surface(wm_base, other).unwrap();

    assert_eq!(
        compositor.get_popup(&shell, Some(&bare), positioner(0, 0, false)).unwrap_err(),
        ProtocolError::InvalidPopupParent
    );
    assert_eq!(
        compositor.get_popup(&shell, Some(&shell), positioner(0, 0, false)).unwrap_err(),
        ProtocolError::InvalidPopupParent
    );

    let parent = mapped_toplevel(&mut compositor, 100, 100);
    assert_eq!(
        compositor
            .get_popup(&shell, Some(&parent.shell), Positioner::default())
            .unwrap_err(),
        ProtocolError::IncompletePositioner
    );

    // None of the failed requests reserved the shell surface.
    assert_eq!(compositor.shell_kind(&shell), None);
}

#[test]
fn popup_without_parent_is_not_configured() {
    let mut compositor = compositor();

    let wm_base = compositor.create_wm_base();
    let surface = compositor.create_surface();
    let shell = compositor.get_shell_surface(wm_base, surface).unwrap();
    let _popup = compositor.get_popup(&shell, None, positioner(5, 5, false)).unwrap();

    let buffer = compositor.create_buffer(10, 10);
    compositor.attach(surface, Some(buffer), 0, 0);
    compositor.commit(surface);

    assert!(configures(&compositor.drain_events(), &shell).is_empty());
}
